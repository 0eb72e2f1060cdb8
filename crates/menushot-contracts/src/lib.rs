pub mod chat;
pub mod events;
pub mod menu;
pub mod models;
pub mod providers;
pub mod session;

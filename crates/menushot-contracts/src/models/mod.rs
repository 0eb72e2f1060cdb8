mod registry;
mod selectors;

pub use registry::{ModelRegistry, ModelSpec};
pub use selectors::{ModelSelection, ModelSelector};

pub const CAPABILITY_OCR: &str = "ocr";
pub const CAPABILITY_TEXT: &str = "text";
pub const CAPABILITY_SEARCH: &str = "search";
pub const CAPABILITY_EDIT: &str = "edit";
pub const CAPABILITY_IMAGE: &str = "image";

//! Pure menu-text heuristics. Nothing in here performs I/O.

mod dishes;
mod excerpt;

pub use dishes::heuristic_dish_names;
pub use excerpt::find_menu_excerpt;

/// Currency symbols recognised when stripping prices from menu lines.
pub(crate) const CURRENCY_CLASS: &str = r"[$€£¥₹₩₽¢]";

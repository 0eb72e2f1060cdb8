use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use super::CURRENCY_CLASS;

static PRICE_OR_QUANTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"{CURRENCY_CLASS}|\d")).expect("price marker pattern is valid")
});

static PRICE_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"{CURRENCY_CLASS}?\s*\d+(?:[.,]\d+)*|{CURRENCY_CLASS}"
    ))
    .expect("price token pattern is valid")
});

/// Descriptive text printed next to a dish on the menu.
///
/// Takes the first line mentioning `dish_name` (case-insensitive, literal)
/// plus the following line when that one carries no price or quantity, then
/// removes the dish name itself and any price tokens. `None` means the dish
/// is not on the menu; `Some("")` means it is, but without a description.
pub fn find_menu_excerpt(dish_name: &str, menu_text: &str) -> Option<String> {
    let needle = dish_name.trim();
    if needle.is_empty() {
        return None;
    }
    let pattern = RegexBuilder::new(&regex::escape(needle))
        .case_insensitive(true)
        .build()
        .ok()?;

    let lines: Vec<&str> = menu_text.lines().collect();
    let index = lines.iter().position(|line| pattern.is_match(line))?;

    let mut combined = lines[index].to_string();
    if let Some(next) = lines.get(index + 1) {
        if !PRICE_OR_QUANTITY_RE.is_match(next) {
            combined.push(' ');
            combined.push_str(next);
        }
    }

    let without_name = pattern.replace_all(&combined, " ");
    let without_prices = PRICE_TOKEN_RE.replace_all(&without_name, " ");
    Some(
        without_prices
            .split_whitespace()
            .collect::<Vec<&str>>()
            .join(" "),
    )
}

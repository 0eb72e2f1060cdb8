use once_cell::sync::Lazy;
use regex::Regex;

use super::CURRENCY_CLASS;

const MIN_EXCLUSIVE_CHARS: usize = 3;
const MAX_EXCLUSIVE_CHARS: usize = 50;

static TRAILING_PRICE_RE: Lazy<Regex> = Lazy::new(|| {
    let pattern = format!(
        r"(?:[\s.\-–—:|]*(?:{CURRENCY_CLASS}\s*)?(?:\d{{1,3}}(?:,\d{{3}})+|\d+)(?:\.\d+|,\d{{1,2}})?|\s*{CURRENCY_CLASS})\s*$"
    );
    Regex::new(&pattern).expect("trailing price pattern is valid")
});

/// Offline dish-name guesses: one candidate per menu line, with prices
/// stripped and section headers (all caps) or noise lines dropped.
pub fn heuristic_dish_names(menu_text: &str) -> Vec<String> {
    menu_text
        .lines()
        .map(strip_trailing_price)
        .filter(|line| looks_like_dish(line))
        .collect()
}

fn strip_trailing_price(line: &str) -> String {
    TRAILING_PRICE_RE.replace(line, "").trim().to_string()
}

fn looks_like_dish(line: &str) -> bool {
    let len = line.chars().count();
    if len <= MIN_EXCLUSIVE_CHARS || len >= MAX_EXCLUSIVE_CHARS {
        return false;
    }
    if !line.chars().any(char::is_alphabetic) {
        return false;
    }
    line != line.to_uppercase()
}

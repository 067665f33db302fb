//! Option lists for the card expiry month and year pickers.

use chrono::Datelike;

/// How many years past the current one a card may expire.
pub const MAX_EXPIRY_YEARS_AHEAD: i32 = 30;

/// Which half of an expiry date a picker edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryField {
    Month,
    Year,
}

impl ExpiryField {
    pub fn options(&self, current_year: i32) -> Vec<String> {
        match self {
            ExpiryField::Month => available_months(),
            ExpiryField::Year => available_years(current_year),
        }
    }
}

/// `"01"` through `"12"`.
pub fn available_months() -> Vec<String> {
    (1..=12).map(|m| format!("{m:02}")).collect()
}

/// `current_year` through `current_year + MAX_EXPIRY_YEARS_AHEAD`, inclusive.
pub fn available_years(current_year: i32) -> Vec<String> {
    (current_year..=current_year + MAX_EXPIRY_YEARS_AHEAD)
        .map(|y| y.to_string())
        .collect()
}

/// [`available_years`] starting from the local calendar year.
pub fn available_years_from_now() -> Vec<String> {
    available_years(chrono::Local::now().year())
}

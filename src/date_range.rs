// src/date_range.rs
use chrono::NaiveDate;
use thiserror::Error;

/// Display form used for subjects and ledger keys.
pub const DISPLAY_FORMAT: &str = "%d/%m/%Y";
/// Form used for portal queries and schedule keys.
pub const ISO_FORMAT: &str = "%Y-%m-%d";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateRangeError {
    #[error("'{0}' is not a date (expected DD/MM/YYYY or YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("start date {from} is after end date {to}")]
    Reversed { from: String, to: String },
}

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Accepts `DD/MM/YYYY` or `YYYY-MM-DD`.
pub fn parse_date(input: &str) -> Result<NaiveDate, DateRangeError> {
    let trimmed = input.trim();
    NaiveDate::parse_from_str(trimmed, DISPLAY_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(trimmed, ISO_FORMAT))
        .map_err(|_| DateRangeError::InvalidDate(input.to_string()))
}

pub fn display_key(date: NaiveDate) -> String {
    date.format(DISPLAY_FORMAT).to_string()
}

pub fn iso_key(date: NaiveDate) -> String {
    date.format(ISO_FORMAT).to_string()
}

/// Every calendar date from `from` to `to`, both inclusive, ascending.
pub fn dates_between(from: NaiveDate, to: NaiveDate) -> Result<Vec<NaiveDate>, DateRangeError> {
    if from > to {
        return Err(DateRangeError::Reversed {
            from: display_key(from),
            to: display_key(to),
        });
    }
    Ok(from.iter_days().take_while(|d| *d <= to).collect())
}

/// Resolves optional CLI bounds. No bounds means today only; a single bound means that day.
pub fn resolve_range(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<Vec<NaiveDate>, DateRangeError> {
    match (from, to) {
        (None, None) => Ok(vec![today]),
        (Some(day), None) | (None, Some(day)) => Ok(vec![day]),
        (Some(from), Some(to)) => dates_between(from, to),
    }
}

//! Query-string filtering, ordering and search shared by the list endpoints.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::types::ValidationError;

pub const INVALID_CHOICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";
pub const INVALID_DATETIME: &str = "Enter a valid date/time.";

/// One term of an `ordering` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy<'a> {
    pub field: &'a str,
    pub descending: bool,
}

/// Parses `ordering=a,-b`, keeping only `allowed` fields. Falls back to
/// `default` when nothing usable remains.
pub fn ordering<'a>(param: Option<&'a str>, allowed: &[&str], default: &'a str) -> Vec<OrderBy<'a>> {
    let parse = |term: &'a str| {
        let term = term.trim();
        match term.strip_prefix('-') {
            Some(field) => OrderBy { field, descending: true },
            None => OrderBy { field: term, descending: false },
        }
    };

    let requested: Vec<OrderBy<'a>> = param
        .unwrap_or("")
        .split(',')
        .map(parse)
        .filter(|order| allowed.contains(&order.field))
        .collect();

    if requested.is_empty() {
        default.split(',').map(parse).collect()
    } else {
        requested
    }
}

/// Terms of a `search` parameter, split on whitespace and commas.
pub fn search_terms(param: Option<&str>) -> Vec<String> {
    param
        .unwrap_or("")
        .replace('\0', "")
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|term| !term.is_empty())
        .map(str::to_string)
        .collect()
}

pub const LIKE_ESCAPE: char = '\\';

/// `%term%` with LIKE wildcards in `term` escaped by [`LIKE_ESCAPE`].
pub fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if c == '%' || c == '_' || c == LIKE_ESCAPE {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// An id filter. Blank means "not filtered".
pub fn id_param(name: &str, value: Option<&str>, errors: &mut ValidationError) -> Option<i32> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    match value.parse::<i32>() {
        Ok(id) => Some(id),
        Err(_) => {
            errors.add_error(name, INVALID_CHOICE);
            None
        }
    }
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// An exact timestamp filter, interpreted as UTC when no offset is given.
pub fn datetime_param(
    name: &str,
    value: Option<&str>,
    errors: &mut ValidationError,
) -> Option<NaiveDateTime> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    match parse_datetime(value) {
        Some(dt) => Some(dt),
        None => {
            errors.add_error(name, INVALID_DATETIME);
            None
        }
    }
}

/// An exact text filter. Blank means "not filtered".
pub fn text_param(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

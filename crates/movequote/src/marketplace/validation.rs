use std::fmt;

use serde::Serialize;

use super::domain::normalize_postcode;

/// One rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Every field error found in a submission, collected before anything is stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> &[FieldError] {
        &self.0
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.iter().any(|error| error.field == field)
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for error in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", error.field, error.message)?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Full UK postcode, e.g. "SW1A 1AA" or "m1 4bt".
pub fn is_uk_postcode(raw: &str) -> bool {
    let normalized = normalize_postcode(raw);
    let Some((outward, inward)) = normalized.split_once(' ') else {
        return false;
    };
    let inward: Vec<char> = inward.chars().collect();
    let inward_ok = inward.len() == 3
        && inward[0].is_ascii_digit()
        && inward[1].is_ascii_alphabetic()
        && inward[2].is_ascii_alphabetic();
    inward_ok && is_outward_code(outward)
}

/// Outward code such as "M1", "LS6" or "SW1A".
pub fn is_outward_code(outward: &str) -> bool {
    if !outward.is_ascii() {
        return false;
    }
    let letters = outward
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .count();
    let rest = &outward[letters..];
    (1..=2).contains(&letters)
        && (1..=2).contains(&rest.len())
        && rest.starts_with(|c: char| c.is_ascii_digit())
        && rest.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Coverage entries are a postcode area ("M") or a full outward code ("SW1").
pub fn is_coverage_prefix(raw: &str) -> bool {
    let prefix = raw.trim().to_ascii_uppercase();
    let area = (1..=2).contains(&prefix.len()) && prefix.chars().all(|c| c.is_ascii_alphabetic());
    area || is_outward_code(&prefix)
}

pub fn is_email(raw: &str) -> bool {
    let value = raw.trim();
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

pub fn phone_digits(raw: &str) -> usize {
    raw.chars().filter(char::is_ascii_digit).count()
}

pub fn is_phone(raw: &str) -> bool {
    let allowed = raw
        .chars()
        .all(|c| c.is_ascii_digit() || c.is_whitespace() || matches!(c, '+' | '(' | ')' | '-'));
    allowed && phone_digits(raw) >= 10
}

//! E.164 recipient validation.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::DeliveryError;

/// Optional `+`, a non-zero leading digit, then 1–14 more ASCII digits.
///
/// `\d` is Unicode-aware in `regex`, so the digit class is spelled out.
static E164: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\+?[1-9][0-9]{1,14}$").ok());

/// A trimmed, E.164-shaped recipient identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Addressee(String);

impl Addressee {
    /// Parse a single addressee, trimming surrounding whitespace.
    ///
    /// Returns `None` when the trimmed value is not E.164-shaped.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        is_e164(trimmed).then(|| Self(trimmed.to_owned()))
    }

    /// The validated identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Addressee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Addressee {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn is_e164(candidate: &str) -> bool {
    E164.as_ref().is_some_and(|re| re.is_match(candidate))
}

/// Validate a list of raw addressees.
///
/// Every entry is checked; all offenders are reported together in their
/// original (untrimmed) form. Order is preserved and duplicates are kept.
///
/// # Errors
///
/// [`DeliveryError::EmptyAddresseeList`] for empty input,
/// [`DeliveryError::InvalidAddressees`] when any entry is malformed.
pub fn validate<S: AsRef<str>>(addressees: &[S]) -> Result<Vec<Addressee>, DeliveryError> {
    if addressees.is_empty() {
        return Err(DeliveryError::EmptyAddresseeList);
    }

    let mut valid = Vec::with_capacity(addressees.len());
    let mut offending = Vec::new();
    for raw in addressees {
        let raw = raw.as_ref();
        match Addressee::parse(raw) {
            Some(addressee) => valid.push(addressee),
            None => offending.push(raw.to_owned()),
        }
    }

    if offending.is_empty() {
        Ok(valid)
    } else {
        Err(DeliveryError::InvalidAddressees { offending })
    }
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_owned)
        .collect()
}

//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Messages name the variable, never echo secret values

use std::collections::HashMap;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{var} must contain only digits")]
    NotNumeric { var: &'static str },

    #[error("{var} must be between {min} and {max}, got {value}")]
    OutOfRange {
        var: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("{var} must be one of {allowed}")]
    InvalidChoice {
        var: &'static str,
        allowed: &'static str,
    },

    #[error("{var} is not a valid URL: {reason}")]
    InvalidUrl { var: &'static str, reason: String },

    #[error("{var} is not a valid socket address")]
    InvalidAddress { var: &'static str },
}

/// Environment snapshot that records every problem it encounters.
///
/// Accessors always return a value so loading can continue past the first
/// error; the caller checks `finish` before trusting anything it read.
pub(crate) struct EnvReader {
    vars: HashMap<String, String>,
    errors: Vec<ValidationError>,
}

impl EnvReader {
    pub(crate) fn new<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            errors: Vec::new(),
        }
    }

    fn raw(&self, var: &str) -> Option<&str> {
        self.vars.get(var).map(String::as_str)
    }

    pub(crate) fn fail(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Non-empty string, required.
    pub(crate) fn required(&mut self, var: &'static str) -> String {
        match self.raw(var).map(str::trim) {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => {
                self.fail(ValidationError::Missing(var));
                String::new()
            }
        }
    }

    /// Non-empty string with a default when unset.
    pub(crate) fn string_or(&mut self, var: &'static str, default: &str) -> String {
        match self.raw(var).map(str::trim) {
            None => default.to_string(),
            Some("") => {
                self.fail(ValidationError::Missing(var));
                default.to_string()
            }
            Some(value) => value.to_string(),
        }
    }

    pub(crate) fn optional(&self, var: &str) -> Option<String> {
        self.raw(var)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    /// Digits-only number with a default when unset.
    pub(crate) fn number_or<T>(&mut self, var: &'static str, default: T) -> T
    where
        T: FromStr + Copy,
    {
        let Some(value) = self.raw(var).map(str::trim) else {
            return default;
        };
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            self.fail(ValidationError::NotNumeric { var });
            return default;
        }
        match value.parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                self.fail(ValidationError::NotNumeric { var });
                default
            }
        }
    }

    /// Number constrained to an inclusive range.
    pub(crate) fn bounded_or(&mut self, var: &'static str, default: u64, min: u64, max: u64) -> u64 {
        let value = self.number_or(var, default);
        if value < min || value > max {
            self.fail(ValidationError::OutOfRange { var, value, min, max });
            return default;
        }
        value
    }

    pub(crate) fn url(&mut self, var: &'static str) -> Option<Url> {
        let raw = self.required(var);
        if raw.is_empty() {
            return None;
        }
        self.parse_url(var, &raw)
    }

    pub(crate) fn parse_url(&mut self, var: &'static str, raw: &str) -> Option<Url> {
        match Url::parse(raw) {
            Ok(url) => Some(url),
            Err(e) => {
                self.fail(ValidationError::InvalidUrl {
                    var,
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    pub(crate) fn finish(self) -> Result<(), Vec<ValidationError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

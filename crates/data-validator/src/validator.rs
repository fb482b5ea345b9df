//! Request Field Validator

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Maximum source identifier length
    pub max_source_len: usize,
    /// Maximum log message length
    pub max_message_len: usize,
    /// CPU load valid range (%)
    pub cpu_load_range: (f64, f64),
    /// Upper bound for count fields (log data, user actions)
    pub max_count: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_source_len: 32,
            max_message_len: 16 * 1024,
            cpu_load_range: (0.0, 100.0),
            max_count: 1_000_000,
        }
    }
}

/// Validator for incoming API payloads
#[derive(Debug, Clone)]
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    /// Create a new validator with given config
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate a single value against a range
    pub fn validate_range(
        &self,
        field: &'static str,
        value: f64,
        range: (f64, f64),
    ) -> Result<(), ValidationError> {
        if !value.is_finite() || value < range.0 || value > range.1 {
            Err(ValidationError::OutOfRange {
                field,
                value,
                min: range.0,
                max: range.1,
            })
        } else {
            Ok(())
        }
    }

    /// Source identifiers are 1 to `max_source_len` characters of `[a-z0-9.-]`
    pub fn validate_source(&self, source: &str) -> Result<(), ValidationError> {
        if source.is_empty() {
            return Err(ValidationError::MissingField("source"));
        }
        if source.chars().count() > self.config.max_source_len {
            return Err(ValidationError::TooLong {
                field: "source",
                max: self.config.max_source_len,
            });
        }
        if let Some(bad) = source
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '.' || *c == '-'))
        {
            return Err(ValidationError::InvalidFormat(format!(
                "source contains invalid character '{}'",
                bad
            )));
        }
        Ok(())
    }

    /// Log messages must be non-blank and bounded
    pub fn validate_message(&self, message: &str) -> Result<(), ValidationError> {
        if message.trim().is_empty() {
            return Err(ValidationError::MissingField("message"));
        }
        if message.chars().count() > self.config.max_message_len {
            return Err(ValidationError::TooLong {
                field: "message",
                max: self.config.max_message_len,
            });
        }
        Ok(())
    }

    /// Validate CPU load
    pub fn validate_cpu_load(&self, value: f64) -> Result<(), ValidationError> {
        self.validate_range("value", value, self.config.cpu_load_range)
    }

    /// Counts must be at least one
    pub fn validate_count(&self, field: &'static str, count: i64) -> Result<u32, ValidationError> {
        let max = self.config.max_count;
        if count < 1 || count > i64::from(max) {
            return Err(ValidationError::OutOfRange {
                field,
                value: count as f64,
                min: 1.0,
                max: f64::from(max),
            });
        }
        Ok(count as u32)
    }

    /// Non-negative integer fields such as sizes and durations
    pub fn validate_non_negative(
        &self,
        field: &'static str,
        value: i64,
    ) -> Result<u64, ValidationError> {
        u64::try_from(value).map_err(|_| ValidationError::OutOfRange {
            field,
            value: value as f64,
            min: 0.0,
            max: u64::MAX as f64,
        })
    }

    /// Parses a required enumerated field
    pub fn parse_field<T: FromStr>(
        &self,
        field: &'static str,
        value: &str,
    ) -> Result<T, ValidationError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::MissingField(field));
        }
        trimmed.parse().map_err(|_| ValidationError::UnknownValue {
            field,
            value: value.to_string(),
        })
    }

    /// Parses a comma separated list, ignoring blank items
    pub fn parse_list<T: FromStr>(
        &self,
        field: &'static str,
        value: Option<&str>,
    ) -> Result<Vec<T>, ValidationError> {
        value
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| self.parse_field(field, item))
            .collect()
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_valid_sources() {
        let validator = Validator::default();
        assert!(validator.validate_source("web-1").is_ok());
        assert!(validator.validate_source("api.example.com").is_ok());
        assert!(validator.validate_source(&"a".repeat(32)).is_ok());
    }

    #[test]
    fn test_invalid_sources() {
        let validator = Validator::default();
        assert_eq!(
            validator.validate_source(""),
            Err(ValidationError::MissingField("source"))
        );
        assert!(matches!(
            validator.validate_source(&"a".repeat(33)),
            Err(ValidationError::TooLong { .. })
        ));
        assert!(matches!(
            validator.validate_source("Web-1"),
            Err(ValidationError::InvalidFormat(_))
        ));
        assert!(validator.validate_source("web 1").is_err());
        assert!(validator.validate_source("web_1").is_err());
    }

    #[test]
    fn test_cpu_load_range() {
        let validator = Validator::default();
        assert!(validator.validate_cpu_load(0.0).is_ok());
        assert!(validator.validate_cpu_load(100.0).is_ok());
        assert!(validator.validate_cpu_load(-1.0).is_err());
        assert!(validator.validate_cpu_load(f64::NAN).is_err());
    }

    #[test]
    fn test_message_required() {
        let validator = Validator::default();
        assert!(validator.validate_message("disk full").is_ok());
        assert_eq!(
            validator.validate_message("   "),
            Err(ValidationError::MissingField("message"))
        );
    }

    #[test]
    fn test_counts() {
        let validator = Validator::default();
        assert_eq!(validator.validate_count("count", 3), Ok(3));
        assert!(validator.validate_count("count", 0).is_err());
        assert!(validator.validate_non_negative("sourcesize", -5).is_err());
    }

    #[test]
    fn test_parse_list() {
        let validator = Validator::default();
        let parsed: Vec<i32> = validator.parse_list("categories", Some("1, 2,,3")).unwrap();
        assert_eq!(parsed, vec![1, 2, 3]);

        let empty: Vec<i32> = validator.parse_list("categories", None).unwrap();
        assert!(empty.is_empty());

        let bad: Result<Vec<i32>, _> = validator.parse_list("categories", Some("1,x"));
        assert!(matches!(bad, Err(ValidationError::UnknownValue { .. })));
    }

    proptest! {
        #[test]
        fn prop_accepted_sources_use_allowed_alphabet(source in "[a-zA-Z0-9._ -]{0,40}") {
            let validator = Validator::default();
            if validator.validate_source(&source).is_ok() {
                prop_assert!(!source.is_empty() && source.len() <= 32);
                prop_assert!(source
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-'));
            }
        }
    }
}

use crate::{ConfigError, ConfigResult};

/// Trait for configuration validation
pub trait ConfigValidator {
    fn validate(&self) -> ConfigResult<()>;
}

/// General validation utilities
pub struct ValidationUtils;

impl ValidationUtils {
    /// Validate that a duration-like value is positive and bounded
    pub fn validate_positive(value: u64, max: u64, field_name: &str) -> ConfigResult<()> {
        if value == 0 {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if value > max {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be less than or equal to {max}"
            )));
        }
        Ok(())
    }

    /// Validate that a list has at least one non-blank entry
    pub fn validate_non_empty_list(values: &[String], field_name: &str) -> ConfigResult<()> {
        if values.iter().all(|v| v.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "{field_name} must contain at least one entry"
            )));
        }
        Ok(())
    }
}

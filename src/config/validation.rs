use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

use crate::config::models::{LoggingConfig, ServerConfig};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Server configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire server configuration
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if let Err(e) = Self::validate_logging(&config.logging) {
            errors.push(e);
        }

        if let Some(timeout) = &config.request_timeout {
            if let Err(e) = Self::validate_request_timeout(timeout) {
                errors.push(e);
            }
        }

        errors.extend(Self::validate_parameters(config));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.is_empty() {
            return Err(ValidationError::MissingField {
                field: "listen_addr".to_string(),
            });
        }

        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_logging(logging: &LoggingConfig) -> ValidationResult<()> {
        EnvFilter::try_new(&logging.level)
            .map(|_| ())
            .map_err(|e| ValidationError::InvalidField {
                field: "logging.level".to_string(),
                message: e.to_string(),
            })
    }

    fn validate_request_timeout(timeout: &str) -> ValidationResult<()> {
        let duration =
            humantime::parse_duration(timeout).map_err(|e| ValidationError::InvalidField {
                field: "request_timeout".to_string(),
                message: e.to_string(),
            })?;

        if duration.is_zero() {
            return Err(ValidationError::InvalidField {
                field: "request_timeout".to_string(),
                message: "Must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Parameter names must be non-empty and free of surrounding whitespace.
    fn validate_parameters(config: &ServerConfig) -> Vec<ValidationError> {
        let mut names: Vec<&String> = config.parameters.keys().collect();
        names.sort();

        names
            .into_iter()
            .filter(|name| name.is_empty() || name.trim() != name.as_str())
            .map(|name| ValidationError::InvalidField {
                field: format!("parameters.{name}"),
                message: "Parameter names must be non-empty and not padded with whitespace"
                    .to_string(),
            })
            .collect()
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

pub mod loader;
pub mod manager;
pub mod models;
pub mod validation;

pub use loader::load_config;
pub use manager::{
    ConfigurationDefault, ConfigurationDefinition, ConfigurationError, ConfigurationManager,
    ConfigurationValues,
};
pub use models::*;
pub use validation::{ServerConfigValidator, ValidationError, ValidationResult};

//! Module configuration: parameter definitions and their resolution.
//!
//! Modules declare [`ConfigurationDefinition`]s. Once every module is known, the kernel hands
//! all definitions to a [`ConfigurationManager`] and resolves each parameter in precedence
//! order: explicit value, then environment variable, then default. A default can point at
//! another parameter, which lets one module default to a value declared by another.
use std::collections::{BTreeMap, HashMap};

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Missing required configuration parameter '{parameter}'")]
    MissingRequired { parameter: String },

    #[error("Configuration parameter '{parameter}' is defined more than once")]
    DuplicateDefinition { parameter: String },

    #[error("Configuration parameter '{parameter}' defaults to unknown parameter '{reference}'")]
    UnknownReference { parameter: String, reference: String },

    #[error("Circular configuration default: {chain}")]
    CircularReference { chain: String },

    #[error("Invalid value for configuration parameter '{parameter}': {reason}")]
    InvalidValue { parameter: String, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum ConfigurationDefault {
    #[default]
    None,
    Value(Value),
    /// Take the resolved value of another parameter.
    Reference(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationDefinition {
    pub parameter_name: String,
    pub default: ConfigurationDefault,
    pub is_required: bool,
    pub environment_variable: Option<String>,
}

impl ConfigurationDefinition {
    pub fn new(parameter_name: impl Into<String>) -> Self {
        Self {
            parameter_name: parameter_name.into(),
            default: ConfigurationDefault::None,
            is_required: false,
            environment_variable: None,
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = ConfigurationDefault::Value(value.into());
        self
    }

    pub fn defaulting_to(mut self, parameter_name: impl Into<String>) -> Self {
        self.default = ConfigurationDefault::Reference(parameter_name.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    pub fn from_env(mut self, variable: impl Into<String>) -> Self {
        self.environment_variable = Some(variable.into());
        self
    }
}

/// Resolved parameter values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigurationValues {
    values: BTreeMap<String, Value>,
}

impl ConfigurationValues {
    pub fn raw(&self, parameter_name: &str) -> Option<&Value> {
        self.values.get(parameter_name)
    }

    pub fn contains(&self, parameter_name: &str) -> bool {
        self.values.contains_key(parameter_name)
    }

    /// Deserialize a parameter into `T`. An unset parameter is an error.
    pub fn get<T: DeserializeOwned>(&self, parameter_name: &str) -> Result<T, ConfigurationError> {
        let value = self
            .values
            .get(parameter_name)
            .ok_or_else(|| ConfigurationError::MissingRequired {
                parameter: parameter_name.to_string(),
            })?;

        serde_json::from_value(value.clone()).map_err(|e| ConfigurationError::InvalidValue {
            parameter: parameter_name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Like [`get`](Self::get) but falls back to `fallback` when the parameter is unset.
    pub fn get_or<T: DeserializeOwned>(
        &self,
        parameter_name: &str,
        fallback: T,
    ) -> Result<T, ConfigurationError> {
        if self.contains(parameter_name) {
            self.get(parameter_name)
        } else {
            Ok(fallback)
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

#[derive(Debug, Default)]
pub struct ConfigurationManager {
    definitions: BTreeMap<String, ConfigurationDefinition>,
}

impl ConfigurationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        definition: ConfigurationDefinition,
    ) -> Result<(), ConfigurationError> {
        if self.definitions.contains_key(&definition.parameter_name) {
            return Err(ConfigurationError::DuplicateDefinition {
                parameter: definition.parameter_name,
            });
        }

        tracing::debug!(
            "Registered configuration parameter '{}'",
            definition.parameter_name
        );
        self.definitions
            .insert(definition.parameter_name.clone(), definition);
        Ok(())
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ConfigurationDefinition> {
        self.definitions.values()
    }

    /// Resolve every registered parameter against the explicitly `provided` values.
    pub fn load(
        &self,
        provided: &HashMap<String, Value>,
    ) -> Result<ConfigurationValues, ConfigurationError> {
        for name in provided.keys() {
            if !self.definitions.contains_key(name) {
                tracing::warn!("Ignoring value for unknown configuration parameter '{}'", name);
            }
        }

        let mut resolved = HashMap::new();
        for name in self.definitions.keys() {
            let mut chain = Vec::new();
            self.resolve(name, provided, &mut resolved, &mut chain)?;
        }

        Ok(ConfigurationValues {
            values: resolved
                .into_iter()
                .filter_map(|(name, value)| value.map(|value| (name, value)))
                .collect(),
        })
    }

    fn resolve(
        &self,
        name: &str,
        provided: &HashMap<String, Value>,
        resolved: &mut HashMap<String, Option<Value>>,
        chain: &mut Vec<String>,
    ) -> Result<Option<Value>, ConfigurationError> {
        if let Some(value) = resolved.get(name) {
            return Ok(value.clone());
        }

        if chain.iter().any(|visited| visited == name) {
            chain.push(name.to_string());
            return Err(ConfigurationError::CircularReference {
                chain: chain.join(" -> "),
            });
        }

        let Some(definition) = self.definitions.get(name) else {
            return Err(ConfigurationError::UnknownReference {
                parameter: chain.last().cloned().unwrap_or_default(),
                reference: name.to_string(),
            });
        };

        let mut value = provided
            .get(name)
            .cloned()
            .or_else(|| Self::environment_value(definition));

        if value.is_none() {
            value = match &definition.default {
                ConfigurationDefault::None => None,
                ConfigurationDefault::Value(default) => Some(default.clone()),
                ConfigurationDefault::Reference(reference) => {
                    chain.push(name.to_string());
                    let referenced = self.resolve(reference, provided, resolved, chain)?;
                    chain.pop();
                    referenced
                }
            };
        }

        if value.is_none() && definition.is_required {
            return Err(ConfigurationError::MissingRequired {
                parameter: name.to_string(),
            });
        }

        resolved.insert(name.to_string(), value.clone());
        Ok(value)
    }

    /// Environment values are parsed as JSON when possible, otherwise kept as strings.
    fn environment_value(definition: &ConfigurationDefinition) -> Option<Value> {
        let variable = definition.environment_variable.as_ref()?;
        let raw = std::env::var(variable).ok()?;
        Some(serde_json::from_str(&raw).unwrap_or(Value::String(raw)))
    }
}

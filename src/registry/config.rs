//! Runtime configuration for the statement registry.
//!
//! Configuration can be built in code, deserialized with serde, or parsed
//! from a `key=value&key=value` string:
//!
//! ```
//! # use dsql_rs::registry::RuntimeConfig;
//! # use std::str::FromStr;
//! let config = RuntimeConfig::from_str("max_statements=64&scrollable_cursors=false")?;
//! assert_eq!(config.max_statements, 64);
//! assert!(!config.scrollable_cursors);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::engine::Dialect;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Tunables of a [`StatementRegistry`](crate::registry::StatementRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound on live handles; 0 means unlimited
    pub max_statements: usize,

    /// Allow cursors to negotiate non-forward fetch at prepare time
    pub scrollable_cursors: bool,

    /// Dialect used by `insert` and `execute_immediate` callers that pass none
    pub default_dialect: Dialect,

    /// Roll back a transaction started by execute-immediate when the call fails
    pub rollback_implicit_on_failure: bool,
}

impl RuntimeConfig {
    /// Create a new RuntimeConfigBuilder.
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::new()
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_statements: 0,
            scrollable_cursors: true,
            default_dialect: Dialect::default(),
            rollback_implicit_on_failure: true,
        }
    }
}

impl FromStr for RuntimeConfig {
    type Err = ConfigError;

    /// Parse `key=value` pairs separated by `&`. Keys and values are
    /// url-decoded. Unknown keys are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let params = parse_params(s.trim())?;
        apply_params(RuntimeConfigBuilder::new(), params)?.build()
    }
}

/// Builder for constructing RuntimeConfig with validation.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfigBuilder {
    max_statements: Option<usize>,
    scrollable_cursors: Option<bool>,
    default_dialect: Option<Dialect>,
    rollback_implicit_on_failure: Option<bool>,
}

impl RuntimeConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of live handles (0 for no cap).
    pub fn max_statements(mut self, max: usize) -> Self {
        self.max_statements = Some(max);
        self
    }

    pub fn scrollable_cursors(mut self, allow: bool) -> Self {
        self.scrollable_cursors = Some(allow);
        self
    }

    pub fn default_dialect(mut self, dialect: Dialect) -> Self {
        self.default_dialect = Some(dialect);
        self
    }

    pub fn rollback_implicit_on_failure(mut self, rollback: bool) -> Self {
        self.rollback_implicit_on_failure = Some(rollback);
        self
    }

    /// Build the RuntimeConfig with validation.
    pub fn build(self) -> Result<RuntimeConfig, ConfigError> {
        let defaults = RuntimeConfig::default();
        let default_dialect = self.default_dialect.unwrap_or(defaults.default_dialect);

        if !(Dialect::V1.0..=Dialect::V3.0).contains(&default_dialect.0) {
            return Err(ConfigError::InvalidParameter {
                parameter: "default_dialect".to_string(),
                message: format!("Dialect must be between 1 and 3, got {}", default_dialect),
            });
        }

        Ok(RuntimeConfig {
            max_statements: self.max_statements.unwrap_or(defaults.max_statements),
            scrollable_cursors: self
                .scrollable_cursors
                .unwrap_or(defaults.scrollable_cursors),
            default_dialect,
            rollback_implicit_on_failure: self
                .rollback_implicit_on_failure
                .unwrap_or(defaults.rollback_implicit_on_failure),
        })
    }
}

fn parse_params(query: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut params = HashMap::new();

    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }

        let (key, value) = pair.split_once('=').ok_or_else(|| {
            ConfigError::ParseError(format!("Invalid parameter format: {}", pair))
        })?;

        let key = urlencoding::decode(key)
            .map_err(|e| ConfigError::ParseError(format!("Failed to decode key: {}", e)))?
            .into_owned();
        let value = urlencoding::decode(value)
            .map_err(|e| ConfigError::ParseError(format!("Failed to decode value: {}", e)))?
            .into_owned();

        params.insert(key, value);
    }

    Ok(params)
}

fn apply_params(
    mut builder: RuntimeConfigBuilder,
    params: HashMap<String, String>,
) -> Result<RuntimeConfigBuilder, ConfigError> {
    for (key, value) in params {
        match key.as_str() {
            "max_statements" => {
                let max: usize = value.parse().map_err(|_| ConfigError::InvalidParameter {
                    parameter: key.clone(),
                    message: format!("Invalid statement limit: {}", value),
                })?;
                builder = builder.max_statements(max);
            }
            "scrollable_cursors" | "scrollable" => {
                builder = builder.scrollable_cursors(parse_bool(&key, &value)?);
            }
            "dialect" | "default_dialect" => {
                let dialect: u16 = value.parse().map_err(|_| ConfigError::InvalidParameter {
                    parameter: key.clone(),
                    message: format!("Invalid dialect: {}", value),
                })?;
                builder = builder.default_dialect(Dialect(dialect));
            }
            "rollback_implicit_on_failure" => {
                builder = builder.rollback_implicit_on_failure(parse_bool(&key, &value)?);
            }
            _ => {
                return Err(ConfigError::InvalidParameter {
                    parameter: key.clone(),
                    message: "Unknown configuration key".to_string(),
                });
            }
        }
    }

    Ok(builder)
}

fn parse_bool(key: &str, s: &str) -> Result<bool, ConfigError> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidParameter {
            parameter: key.to_string(),
            message: format!("Invalid boolean value: {}", s),
        }),
    }
}

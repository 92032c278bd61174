//! Configuration file loader for cloud-messaging
//!
//! This module loads messaging configuration files, expands `${VAR}`
//! references in option values and validates the result.

use super::config::*;
use crate::core::error::MessagingError;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::env;
use std::path::Path;
use tokio::fs;

lazy_static! {
    /// Environment variable pattern (${VAR_NAME})
    static ref ENV_VAR_PATTERN: Regex =
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env var pattern is valid");
}

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// Pick the format from the file extension
    pub fn from_path(path: &Path) -> Result<Self, MessagingError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Ok(Self::Yaml),
            Some("toml") => Ok(Self::Toml),
            _ => Err(MessagingError::Config(format!(
                "Unsupported config file extension: {} (expected .yaml, .yml or .toml)",
                path.display()
            ))),
        }
    }
}

/// Configuration validation result
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationResult {
    /// Is configuration valid?
    pub valid: bool,

    /// Validation errors
    pub errors: Vec<ConfigValidationError>,

    /// Validation warnings
    pub warnings: Vec<ConfigValidationWarning>,
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    /// Field path (e.g., "publishers.orders.provider")
    pub field: String,

    /// Error message
    pub message: String,
}

/// Configuration validation warning
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationWarning {
    /// Field path
    pub field: String,

    /// Warning message
    pub message: String,

    /// Suggestion
    pub suggestion: Option<String>,
}

/// Configuration file loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a configuration file and expand `${VAR}` references from `env`
    pub async fn load(
        path: &Path,
        env: &HashMap<String, String>,
    ) -> Result<MessagingConfig, MessagingError> {
        let format = ConfigFormat::from_path(path)?;

        if !fs::try_exists(path).await.unwrap_or(false) {
            return Err(MessagingError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            MessagingError::Config(format!("Failed to read config file: {}", e))
        })?;

        let config = Self::parse(&content, format)?;
        Self::expand_env_vars(config, env)
    }

    /// Snapshot of the process environment
    pub fn process_env() -> HashMap<String, String> {
        env::vars().collect()
    }

    /// Parse configuration text without expanding variables
    pub fn parse(content: &str, format: ConfigFormat) -> Result<MessagingConfig, MessagingError> {
        match format {
            ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| {
                MessagingError::Config(format!("Failed to parse YAML config: {}", e))
            }),
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| {
                MessagingError::Config(format!("Failed to parse TOML config: {}", e))
            }),
        }
    }

    /// Expand environment variables in every option value
    ///
    /// A reference to a variable missing from `env` is an error naming the
    /// variable and the publisher.
    pub fn expand_env_vars(
        mut config: MessagingConfig,
        env: &HashMap<String, String>,
    ) -> Result<MessagingConfig, MessagingError> {
        for (name, publisher) in config.publishers.iter_mut() {
            let Some(options) = publisher.options.as_mut() else {
                continue;
            };

            for (_, value) in options.values_mut() {
                if let Some(text) = value {
                    *text = Self::expand_string(text, env, name)?;
                }
            }
        }

        Ok(config)
    }

    /// Expand environment variables in a single string
    pub fn expand_string(
        input: &str,
        env: &HashMap<String, String>,
        publisher: &str,
    ) -> Result<String, MessagingError> {
        let mut missing = None;

        let expanded = ENV_VAR_PATTERN.replace_all(input, |cap: &regex::Captures| {
            let var_name = &cap[1];
            match env.get(var_name) {
                Some(value) => value.clone(),
                None => {
                    missing.get_or_insert_with(|| var_name.to_string());
                    String::new()
                }
            }
        });

        if let Some(var_name) = missing {
            return Err(MessagingError::Config(format!(
                "Environment variable {} referenced by publisher '{}' is not set",
                var_name, publisher
            )));
        }

        Ok(expanded.into_owned())
    }

    /// Validate configuration against a set of known provider ids
    pub fn validate(config: &MessagingConfig, known_providers: &[&str]) -> ConfigValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // 1. At least one publisher
        if config.publishers.is_empty() {
            warnings.push(ConfigValidationWarning {
                field: "publishers".to_string(),
                message: "No publishers configured".to_string(),
                suggestion: Some("Add a publisher with a provider and options".to_string()),
            });
        }

        // 2. Concurrency bound
        if config.max_concurrency == Some(0) {
            warnings.push(ConfigValidationWarning {
                field: "maxConcurrency".to_string(),
                message: "maxConcurrency of 0 is treated as 1".to_string(),
                suggestion: None,
            });
        }

        // 3. Publishers
        for (name, publisher) in &config.publishers {
            if !known_providers.contains(&publisher.provider.as_str()) {
                errors.push(ConfigValidationError {
                    field: format!("publishers.{}.provider", name),
                    message: format!(
                        "Unknown provider '{}' (known: {})",
                        publisher.provider,
                        known_providers.join(", ")
                    ),
                });
            }

            if publisher.options.is_none() {
                errors.push(ConfigValidationError {
                    field: format!("publishers.{}.options", name),
                    message: "options are required".to_string(),
                });
            }
        }

        ConfigValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Format validation result as human-readable string
    pub fn format_validation_result(result: &ConfigValidationResult) -> String {
        let mut lines = Vec::new();

        if result.valid {
            lines.push("✅ Configuration validation succeeded".to_string());
        } else {
            lines.push("❌ Configuration has errors".to_string());
        }

        if !result.errors.is_empty() {
            lines.push("\n🔴 Errors:".to_string());
            for error in &result.errors {
                lines.push(format!("  - [{}] {}", error.field, error.message));
            }
        }

        if !result.warnings.is_empty() {
            lines.push("\n🟡 Warnings:".to_string());
            for warning in &result.warnings {
                lines.push(format!("  - [{}] {}", warning.field, warning.message));
                if let Some(suggestion) = &warning.suggestion {
                    lines.push(format!("    Suggestion: {}", suggestion));
                }
            }
        }

        lines.join("\n")
    }
}

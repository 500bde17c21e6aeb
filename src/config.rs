//! Configuration handling for Scaffold.
//! Loads placeholder variables from JSON or YAML files and maps output
//! settings onto serializer options.

use crate::error::{Error, Result};
use crate::serializer::{OutputFormat, SerializeOptions};
use indexmap::IndexMap;
use log::debug;
use serde::Deserialize;
use std::path::Path;

/// Output settings as they appear in a configuration record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub preserve_whitespace: bool,
    pub preserve_comments: bool,
    /// Output format; detected from the document when absent
    pub format: Option<OutputFormat>,
}

impl From<OutputConfig> for SerializeOptions {
    fn from(config: OutputConfig) -> Self {
        SerializeOptions {
            preserve_whitespace: config.preserve_whitespace,
            preserve_comments: config.preserve_comments.into(),
            format: config.format,
        }
    }
}

/// Parses variables from file content, trying JSON first and YAML second.
///
/// # Errors
/// * `Error::ConfigError` if the content is neither a JSON nor a YAML mapping
pub fn parse_variables(content: &str) -> Result<IndexMap<String, serde_json::Value>> {
    match serde_json::from_str(content) {
        Ok(variables) => Ok(variables),
        Err(_) => serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigError(format!("Invalid variables format: {}", e))),
    }
}

/// Loads placeholder variables from a JSON or YAML file, keeping the order
/// in which they are written.
///
/// # Arguments
/// * `path` - Path to the variables file
///
/// # Returns
/// * `Result<IndexMap<String, serde_json::Value>>` - Variables by key
///
/// # Errors
/// * `Error::IoError` if the file cannot be read
/// * `Error::ConfigError` if the content is not a mapping
pub fn load_variables<P: AsRef<Path>>(path: P) -> Result<IndexMap<String, serde_json::Value>> {
    let path = path.as_ref();
    debug!("Loading variables from {}", path.display());
    let content = std::fs::read_to_string(path).map_err(Error::IoError)?;
    parse_variables(&content)
}

/// Splits a `key=value` command-line binding.
///
/// # Errors
/// * `Error::ConfigError` if there is no `=` or the key is empty
pub fn parse_assignment(assignment: &str) -> Result<(String, String)> {
    match assignment.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(Error::ConfigError(format!(
            "Expected key=value, got '{}'",
            assignment
        ))),
    }
}

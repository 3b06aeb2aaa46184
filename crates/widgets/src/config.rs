use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid widgets config")]
    Json(#[from] serde_json::Error),
    #[error("`{0}.types` must not be empty")]
    EmptyTypes(&'static str),
    #[error("`{section}.types` lists `{value}` more than once")]
    DuplicateType { section: &'static str, value: String },
    #[error("`{section}.types` entry `{value}` is not a valid type name")]
    InvalidType { section: &'static str, value: String },
}

/// Host configuration for the widget plugins. Missing keys take their
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetsConfig {
    pub placeholder: PlaceholderConfig,
    pub side_card: SideCardConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaceholderConfig {
    pub types: Vec<String>,
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        Self {
            types: vec!["date".into(), "first name".into(), "surname".into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SideCardConfig {
    pub types: Vec<String>,
}

impl Default for SideCardConfig {
    fn default() -> Self {
        Self {
            types: vec!["default".into(), "alternate".into()],
        }
    }
}

impl WidgetsConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_types("placeholder", &self.placeholder.types, |value| {
            !value.trim().is_empty() && !value.contains(['{', '}'])
        })?;
        // Side card types end up in a class name.
        check_types("side_card", &self.side_card.types, |value| {
            !value.is_empty() && !value.contains(char::is_whitespace)
        })
    }
}

fn check_types(
    section: &'static str,
    types: &[String],
    valid: impl Fn(&str) -> bool,
) -> Result<(), ConfigError> {
    if types.is_empty() {
        return Err(ConfigError::EmptyTypes(section));
    }
    for (ix, value) in types.iter().enumerate() {
        if !valid(value) {
            return Err(ConfigError::InvalidType {
                section,
                value: value.clone(),
            });
        }
        if types[..ix].contains(value) {
            return Err(ConfigError::DuplicateType {
                section,
                value: value.clone(),
            });
        }
    }
    Ok(())
}

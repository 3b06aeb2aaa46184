use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::Document;

pub const STORE_FORMAT: &str = "manos-plate";
pub const STORE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid stored document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported store format `{0}`")]
    Format(String),
    #[error("store version {found} is newer than {supported}")]
    Version { found: u32, supported: u32 },
}

/// Content tree persisted as JSON, bypassing the markup pipelines. Missing
/// `format` and `version` keys read as the current ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    #[serde(default = "current_format")]
    pub format: String,
    #[serde(default = "current_version")]
    pub version: u32,
    pub document: Document,
}

fn current_format() -> String {
    STORE_FORMAT.to_string()
}

fn current_version() -> u32 {
    STORE_VERSION
}

impl StoredDocument {
    pub fn new(document: Document) -> Self {
        Self {
            format: current_format(),
            version: current_version(),
            document,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses and checks the envelope, returning the document it carries.
    pub fn load(json: &str) -> Result<Document, StoreError> {
        let stored: Self = serde_json::from_str(json)?;
        if stored.format != STORE_FORMAT {
            return Err(StoreError::Format(stored.format));
        }
        if stored.version > STORE_VERSION {
            return Err(StoreError::Version {
                found: stored.version,
                supported: STORE_VERSION,
            });
        }
        Ok(stored.document)
    }
}

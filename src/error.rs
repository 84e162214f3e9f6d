use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while setting up the renderer.
///
/// Every variant is fatal: the pipeline has no degraded mode, so callers
/// surface the message and stop.
#[derive(Debug, Error)]
pub enum VctError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("failed to load asset {}: {message}", path.display())]
    AssetLoad { path: PathBuf, message: String },

    #[error("failed to decode texture {name}: {message}")]
    TextureDecode { name: String, message: String },

    #[error("presentation failed: {0}")]
    Presentation(String),
}

impl VctError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn asset(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::AssetLoad {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn presentation(message: impl ToString) -> Self {
        Self::Presentation(message.to_string())
    }

    pub(crate) fn texture(name: impl Into<String>, message: impl ToString) -> Self {
        Self::TextureDecode {
            name: name.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T, E = VctError> = std::result::Result<T, E>;

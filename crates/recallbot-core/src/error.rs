//! Error types for Recallbot

use std::path::PathBuf;
use thiserror::Error;

use crate::types::UserId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("user {user} is not allowed to use the alias {alias:?}")]
    Unauthorized { user: UserId, alias: String },

    #[error("invalid alias: {0}")]
    InvalidAlias(String),

    #[error("log write failed for {}: {source}", path.display())]
    StorageWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("log read failed for {}: {source}", path.display())]
    StorageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn unauthorized(user: UserId, alias: impl Into<String>) -> Self {
        Self::Unauthorized {
            user,
            alias: alias.into(),
        }
    }

    pub fn storage_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StorageWrite {
            path: path.into(),
            source,
        }
    }

    pub fn storage_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StorageRead {
            path: path.into(),
            source,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True for the reserved-alias rejection.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

//! Error taxonomy for every kroctl workflow.
//!
//! Every variant renders as a single line; the binary prints it verbatim and
//! exits non-zero. Nothing here is retried.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KroctlError {
    #[error("invalid reference {reference}: {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("failed to create credential store: {0}")]
    CredentialStore(String),

    #[error("failed to access {}: {source}", path.display())]
    PathNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no YAML files found in specified paths")]
    NoInputFiles,

    #[error("failed to pack artifact: {0}")]
    Pack(String),

    #[error("failed to push artifact: {0}")]
    Publish(String),

    #[error("failed to fetch manifest: {0} not found")]
    ReferenceNotFound(String),

    #[error("failed to fetch manifest: {0}")]
    Fetch(String),

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, KroctlError>;

impl KroctlError {
    pub(crate) fn pack(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        KroctlError::Pack(format!("{context}: {err}"))
    }
}

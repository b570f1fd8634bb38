//! Artifact reference parsing.
//!
//! Parses references like `ghcr.io/acme/kro-stack:v1.0.0` into host, repository
//! and tag/digest. Parsing is delegated to `oci_client::Reference`; this type only
//! keeps the user's original spelling and exposes the parts the CLI needs.

use crate::error::{KroctlError, Result};
use oci_client::Reference;
use std::fmt;
use std::str::FromStr;

/// Tag assumed by registries when a reference names neither a tag nor a digest.
pub const DEFAULT_TAG: &str = "latest";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReference {
    raw: String,
    inner: Reference,
}

impl ArtifactReference {
    pub fn parse(reference: &str) -> Result<Self> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(KroctlError::InvalidReference {
                reference: reference.to_string(),
                reason: "reference is empty".to_string(),
            });
        }

        let inner = Reference::try_from(trimmed).map_err(|e| KroctlError::InvalidReference {
            reference: trimmed.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            raw: trimmed.to_string(),
            inner,
        })
    }

    /// Registry host, including the port when one was given.
    pub fn host(&self) -> &str {
        self.inner.registry()
    }

    pub fn repository(&self) -> &str {
        self.inner.repository()
    }

    pub fn tag(&self) -> Option<&str> {
        self.inner.tag()
    }

    pub fn digest(&self) -> Option<&str> {
        self.inner.digest()
    }

    /// Repository plus tag (or digest), e.g. `acme/kro-stack:v1.0.0`.
    pub fn artifact_name(&self) -> String {
        match (self.tag(), self.digest()) {
            (Some(tag), _) => format!("{}:{}", self.repository(), tag),
            (None, Some(digest)) => format!("{}@{}", self.repository(), digest),
            (None, None) => format!("{}:{}", self.repository(), DEFAULT_TAG),
        }
    }

    /// The reference exactly as the user typed it (trimmed).
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn oci(&self) -> &Reference {
        &self.inner
    }
}

impl FromStr for ArtifactReference {
    type Err = KroctlError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ArtifactReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

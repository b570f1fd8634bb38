//! Shared helpers for the workflow tests.

use async_trait::async_trait;
use kroctl::connector::RepositoryHandle;
use kroctl::credentials::{AnonymousProvider, CredentialProvider};
use kroctl::store::sha256_digest;
use kroctl::transfer::{FetchedManifest, Registry, Upload};
use kroctl::{CliConfig, KroctlError, Kroctl, Notifier, Result};
use oci_spec::image::{Descriptor, Digest, MediaType};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

#[derive(Default)]
struct State {
    blobs: HashMap<String, Vec<u8>>,
    manifests: HashMap<String, Vec<u8>>,
    tags: HashMap<String, String>,
    push_calls: usize,
    fetch_calls: usize,
    blob_uploads: usize,
}

/// Registry kept in memory. Clones share state so tests can look inside after
/// handing one to [`Kroctl`].
#[derive(Clone, Default)]
pub struct MemoryRegistry {
    state: Arc<Mutex<State>>,
    fail_push: Option<String>,
    stall_push: bool,
}

#[allow(dead_code)]
impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects every push with `reason`.
    pub fn failing(reason: &str) -> Self {
        Self {
            fail_push: Some(reason.to_string()),
            ..Self::default()
        }
    }

    /// Never completes a push.
    pub fn stalled() -> Self {
        Self {
            stall_push: true,
            ..Self::default()
        }
    }

    /// Stores `bytes` under `digest` and points `reference` at it.
    pub fn insert_manifest(&self, reference: &str, bytes: &[u8], digest: &str) {
        let mut state = self.state.lock().unwrap();
        state.manifests.insert(digest.to_string(), bytes.to_vec());
        state.tags.insert(reference.to_string(), digest.to_string());
    }

    pub fn tagged(&self, reference: &str) -> Option<String> {
        self.state.lock().unwrap().tags.get(reference).cloned()
    }

    pub fn manifest(&self, digest: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().manifests.get(digest).cloned()
    }

    pub fn blob(&self, digest: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().blobs.get(digest).cloned()
    }

    pub fn push_calls(&self) -> usize {
        self.state.lock().unwrap().push_calls
    }

    pub fn fetch_calls(&self) -> usize {
        self.state.lock().unwrap().fetch_calls
    }

    /// Blobs received across all pushes.
    pub fn blob_uploads(&self) -> usize {
        self.state.lock().unwrap().blob_uploads
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn blob_exists(&self, _handle: &RepositoryHandle, digest: &Digest) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .blobs
            .contains_key(&digest.to_string()))
    }

    async fn push(&self, handle: &RepositoryHandle, upload: &Upload) -> Result<()> {
        self.state.lock().unwrap().push_calls += 1;

        if self.stall_push {
            std::future::pending::<()>().await;
        }
        if let Some(reason) = &self.fail_push {
            return Err(KroctlError::Publish(reason.clone()));
        }

        let mut state = self.state.lock().unwrap();
        for blob in &upload.blobs {
            let digest = blob.descriptor.digest().to_string();
            if sha256_digest(&blob.data) != digest {
                return Err(KroctlError::Publish(format!(
                    "blob {digest} does not match its content"
                )));
            }
            state.blobs.insert(digest, blob.data.clone());
            state.blob_uploads += 1;
        }
        for referenced in upload
            .manifest
            .layers
            .iter()
            .chain(std::iter::once(&upload.manifest.config))
        {
            if !state.blobs.contains_key(&referenced.digest) {
                return Err(KroctlError::Publish(format!(
                    "manifest blob unknown: {}",
                    referenced.digest
                )));
            }
        }
        state
            .manifests
            .insert(upload.manifest_digest.clone(), upload.manifest_bytes.clone());
        state.tags.insert(
            handle.reference().as_str().to_string(),
            upload.manifest_digest.clone(),
        );
        Ok(())
    }

    async fn fetch_manifest(&self, handle: &RepositoryHandle) -> Result<FetchedManifest> {
        let mut state = self.state.lock().unwrap();
        state.fetch_calls += 1;

        let reference = handle.reference().as_str();
        let digest = state
            .tags
            .get(reference)
            .cloned()
            .ok_or_else(|| KroctlError::ReferenceNotFound(reference.to_string()))?;
        let bytes = state
            .manifests
            .get(&digest)
            .cloned()
            .ok_or_else(|| KroctlError::ReferenceNotFound(reference.to_string()))?;

        let digest = Digest::try_from(digest).map_err(|e| KroctlError::Fetch(e.to_string()))?;
        Ok(FetchedManifest {
            descriptor: Descriptor::new(
                MediaType::from(MANIFEST_MEDIA_TYPE),
                bytes.len() as u64,
                digest,
            ),
            bytes,
        })
    }
}

/// A quiet [`Kroctl`] over `registry` that never looks for credentials.
pub fn quiet_kroctl(registry: MemoryRegistry) -> Kroctl<MemoryRegistry> {
    kroctl_with(CliConfig::default(), registry)
}

#[allow(dead_code)]
pub fn kroctl_with(config: CliConfig, registry: MemoryRegistry) -> Kroctl<MemoryRegistry> {
    Kroctl::with_notifier(
        config,
        Notifier::silent(),
        registry,
        Box::new(AnonymousProvider),
    )
}

#[allow(dead_code)]
pub fn kroctl_with_credentials(
    registry: MemoryRegistry,
    credentials: Box<dyn CredentialProvider>,
) -> Kroctl<MemoryRegistry> {
    Kroctl::with_notifier(CliConfig::default(), Notifier::silent(), registry, credentials)
}

/// Minimal RGD document named `name`.
pub fn rgd(name: &str) -> String {
    format!(
        "apiVersion: kro.run/v1alpha1\n\
         kind: ResourceGraphDefinition\n\
         metadata:\n  name: {name}\n\
         spec:\n  schema:\n    apiVersion: v1alpha1\n    kind: {name}\n"
    )
}

/// Writes `contents` to `dir/relative`, creating parent directories.
pub fn write_file(dir: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

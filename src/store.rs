//! Invocation-scoped, content-addressed staging store.
//!
//! [`LocalStore`] is an OCI image layout (`oci-layout`, `index.json`,
//! `blobs/sha256/<hex>`) inside a `tempfile::TempDir`. Tags are index entries
//! carrying an `org.opencontainers.image.ref.name` annotation and are resolved
//! by reading `index.json` back. Everything staged disappears when the store is
//! dropped, whichever way the command exits.

use crate::error::{KroctlError, Result};
use oci_spec::image::{
    Descriptor, Digest, DigestAlgorithm, ImageIndex, MediaType, OciLayoutBuilder,
    ANNOTATION_REF_NAME, ANNOTATION_TITLE,
};
use sha2::{Digest as _, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const OCI_LAYOUT_VERSION: &str = "1.0.0";
const OCI_LAYOUT_FILE: &str = "oci-layout";
const INDEX_FILE: &str = "index.json";

/// `sha256:<hex>` digest of `data`.
pub fn sha256_digest(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

/// Descriptor of `data` stored as `media_type`.
pub fn descriptor_for(media_type: &str, data: &[u8]) -> Result<Descriptor> {
    let digest = Digest::try_from(sha256_digest(data))
        .map_err(|e| KroctlError::pack("failed to compute digest", e))?;
    Ok(Descriptor::new(
        MediaType::from(media_type),
        data.len() as u64,
        digest,
    ))
}

/// Returns `descriptor` with the annotation `key` set to `value`.
pub fn annotate(mut descriptor: Descriptor, key: &str, value: impl Into<String>) -> Descriptor {
    let mut annotations = descriptor.annotations().clone().unwrap_or_default();
    annotations.insert(key.to_string(), value.into());
    descriptor.set_annotations(Some(annotations));
    descriptor
}

pub fn annotation<'a>(descriptor: &'a Descriptor, key: &str) -> Option<&'a str> {
    descriptor
        .annotations()
        .as_ref()
        .and_then(|annotations| annotations.get(key))
        .map(String::as_str)
}

pub fn title(descriptor: &Descriptor) -> Option<&str> {
    annotation(descriptor, ANNOTATION_TITLE)
}

pub struct LocalStore {
    dir: TempDir,
}

impl LocalStore {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("kroctl-")
            .tempdir()
            .map_err(|e| KroctlError::pack("failed to create file store", e))?;

        fs::create_dir_all(dir.path().join("blobs").join("sha256"))
            .map_err(|e| KroctlError::pack("failed to create file store", e))?;
        OciLayoutBuilder::default()
            .image_layout_version(OCI_LAYOUT_VERSION)
            .build()
            .and_then(|layout| layout.to_file(dir.path().join(OCI_LAYOUT_FILE)))
            .map_err(|e| KroctlError::pack("failed to create file store", e))?;
        ImageIndex::default()
            .to_file_pretty(dir.path().join(INDEX_FILE))
            .map_err(|e| KroctlError::pack("failed to create file store", e))?;

        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Stages the file at `path` and returns its descriptor, titled `title`.
    pub fn add_file(&self, path: &Path, media_type: &str, title: &str) -> Result<Descriptor> {
        let data = fs::read(path).map_err(|e| {
            KroctlError::pack(format!("failed to add {} to store", path.display()), e)
        })?;
        let descriptor = self.add_bytes(media_type, &data)?;
        Ok(annotate(descriptor, ANNOTATION_TITLE, title))
    }

    pub fn add_bytes(&self, media_type: &str, data: &[u8]) -> Result<Descriptor> {
        let descriptor = descriptor_for(media_type, data)?;
        let blob_path = self.blob_path(descriptor.digest())?;
        if !blob_path.exists() {
            fs::write(&blob_path, data).map_err(|e| {
                KroctlError::pack(format!("failed to write blob {}", descriptor.digest()), e)
            })?;
        }
        Ok(descriptor)
    }

    pub fn read_blob(&self, digest: &Digest) -> Result<Vec<u8>> {
        let blob_path = self.blob_path(digest)?;
        fs::read(&blob_path)
            .map_err(|e| KroctlError::pack(format!("failed to read blob {digest}"), e))
    }

    pub fn contains(&self, digest: &Digest) -> bool {
        self.blob_path(digest).map(|p| p.exists()).unwrap_or(false)
    }

    /// Points `reference` at `manifest` in `index.json`, replacing any previous
    /// entry for the same reference.
    pub fn tag(&self, manifest: &Descriptor, reference: &str) -> Result<()> {
        if !self.contains(manifest.digest()) {
            return Err(KroctlError::Pack(format!(
                "failed to tag manifest: {} not found in store",
                manifest.digest()
            )));
        }

        let mut index = self.load_index()?;
        let mut manifests: Vec<Descriptor> = index
            .manifests()
            .iter()
            .filter(|entry| annotation(entry, ANNOTATION_REF_NAME) != Some(reference))
            .cloned()
            .collect();
        manifests.push(annotate(manifest.clone(), ANNOTATION_REF_NAME, reference));
        index.set_manifests(manifests);

        index
            .to_file_pretty(self.dir.path().join(INDEX_FILE))
            .map_err(|e| KroctlError::pack("failed to tag manifest", e))
    }

    /// Looks `reference` up in `index.json`.
    pub fn resolve(&self, reference: &str) -> Result<Option<Descriptor>> {
        let index = self.load_index()?;
        Ok(index
            .manifests()
            .iter()
            .find(|entry| annotation(entry, ANNOTATION_REF_NAME) == Some(reference))
            .cloned())
    }

    fn load_index(&self) -> Result<ImageIndex> {
        ImageIndex::from_file(self.dir.path().join(INDEX_FILE))
            .map_err(|e| KroctlError::pack("failed to read store index", e))
    }

    fn blob_path(&self, digest: &Digest) -> Result<PathBuf> {
        if !matches!(digest.algorithm(), DigestAlgorithm::Sha256) {
            return Err(KroctlError::Pack(format!("unsupported digest {digest}")));
        }
        Ok(self
            .dir
            .path()
            .join("blobs")
            .join("sha256")
            .join(digest.digest()))
    }
}

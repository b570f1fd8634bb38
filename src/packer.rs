//! Artifact Packer: stages RGD files as layers and builds the stack manifest.
//!
//! Packing is all-or-nothing. Every file is staged before the manifest is
//! built, and the manifest is tagged only once it is itself in the store.

use crate::error::{KroctlError, Result};
use crate::notifier::Notifier;
use crate::reference::ArtifactReference;
use crate::store::LocalStore;
use chrono::{DateTime, SecondsFormat, Utc};
use oci_client::manifest::{OciDescriptor, OciImageManifest};
use oci_spec::image::{Descriptor, ANNOTATION_CREATED};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Artifact type of a kro RGD stack.
pub const ARTIFACT_TYPE: &str = "application/vnd.kro.rgd.stack.v1";
/// Media type of a single RGD YAML layer.
pub const LAYER_MEDIA_TYPE: &str = "application/vnd.kro.rgd.content.v1.yaml";
/// OCI empty descriptor used as the artifact config.
pub const EMPTY_CONFIG_MEDIA_TYPE: &str = "application/vnd.oci.empty.v1+json";
pub const EMPTY_CONFIG_DATA: &[u8] = b"{}";
pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// A packed, tagged artifact living in a [`LocalStore`].
#[derive(Debug, Clone)]
pub struct PackedArtifact {
    pub manifest: OciImageManifest,
    /// Canonical JSON encoding of `manifest`, exactly as uploaded.
    pub manifest_bytes: Vec<u8>,
    pub descriptor: Descriptor,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
}

impl PackedArtifact {
    pub fn digest(&self) -> &str {
        self.descriptor.digest().as_ref()
    }
}

pub struct Packer<'a> {
    store: &'a LocalStore,
    notifier: &'a Notifier,
    created: Option<DateTime<Utc>>,
}

impl<'a> Packer<'a> {
    pub fn new(store: &'a LocalStore, notifier: &'a Notifier) -> Self {
        Self {
            store,
            notifier,
            created: Some(Utc::now()),
        }
    }

    /// Overrides the creation timestamp; `None` omits the annotation.
    pub fn with_created(mut self, created: Option<DateTime<Utc>>) -> Self {
        self.created = created;
        self
    }

    pub fn pack(self, files: &[PathBuf], reference: &ArtifactReference) -> Result<PackedArtifact> {
        let mut layers = Vec::with_capacity(files.len());
        for file in files {
            let title = base_name(file);
            let layer = self.store.add_file(file, LAYER_MEDIA_TYPE, &title)?;
            self.notifier
                .debug(&format!("Added file to artifact: {} ({})", title, layer.digest()));
            layers.push(layer);
        }

        let config = self
            .store
            .add_bytes(EMPTY_CONFIG_MEDIA_TYPE, EMPTY_CONFIG_DATA)?;

        let annotations = self.created.map(|created| {
            [(
                ANNOTATION_CREATED.to_string(),
                created.to_rfc3339_opts(SecondsFormat::Secs, true),
            )]
            .into_iter()
            .collect()
        });

        let manifest = OciImageManifest {
            schema_version: 2,
            media_type: Some(MANIFEST_MEDIA_TYPE.to_string()),
            config: to_oci_descriptor(&config),
            layers: layers.iter().map(to_oci_descriptor).collect(),
            artifact_type: Some(ARTIFACT_TYPE.to_string()),
            annotations,
            ..Default::default()
        };

        let manifest_bytes = canonical_json(&manifest)?;
        let descriptor = self.store.add_bytes(MANIFEST_MEDIA_TYPE, &manifest_bytes)?;
        self.notifier
            .debug(&format!("Packed manifest {}", descriptor.digest()));

        self.store.tag(&descriptor, reference.as_str())?;

        Ok(PackedArtifact {
            manifest,
            manifest_bytes,
            descriptor,
            config,
            layers,
        })
    }
}

/// Canonical JSON (sorted keys, no insignificant whitespace), the encoding
/// registries receive and hash.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut ser =
        serde_json::Serializer::with_formatter(&mut buf, olpc_cjson::CanonicalFormatter::new());
    value
        .serialize(&mut ser)
        .map_err(|e| KroctlError::pack("failed to pack manifest", e))?;
    Ok(buf)
}

fn to_oci_descriptor(descriptor: &Descriptor) -> OciDescriptor {
    let annotations = descriptor
        .annotations()
        .as_ref()
        .filter(|annotations| !annotations.is_empty())
        .map(|annotations| annotations.clone().into_iter().collect());

    OciDescriptor {
        media_type: descriptor.media_type().to_string(),
        digest: descriptor.digest().to_string(),
        size: descriptor.size() as i64,
        annotations,
        ..Default::default()
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

//! Transfer Engine: moves packed artifacts to a registry and reads manifests back.
//!
//! The wire work is behind the [`Registry`] trait. [`OciRegistry`] implements it
//! with `oci-client`, which owns token auth and blob uploads. This module only
//! decides *what* is sent: blobs the registry lacks first, manifest last, so the
//! tag never points at an artifact whose layers are missing.

use crate::connector::{RepositoryHandle, Transport};
use crate::error::{KroctlError, Result};
use crate::notifier::Notifier;
use crate::packer::{PackedArtifact, MANIFEST_MEDIA_TYPE};
use crate::store::{sha256_digest, LocalStore};
use async_trait::async_trait;
use oci_client::client::{ClientConfig, ClientProtocol};
use oci_client::errors::{OciDistributionError, OciErrorCode};
use oci_client::manifest::{OciImageManifest, OciManifest};
use oci_client::Client;
use oci_spec::image::{Descriptor, Digest, DigestAlgorithm, MediaType};

/// A blob and the bytes behind it.
#[derive(Debug, Clone)]
pub struct Blob {
    pub descriptor: Descriptor,
    pub data: Vec<u8>,
}

/// Everything a registry needs to publish one artifact.
#[derive(Debug, Clone)]
pub struct Upload {
    pub manifest: OciImageManifest,
    pub manifest_bytes: Vec<u8>,
    pub manifest_digest: String,
    /// Blobs the registry does not hold yet, layers before config.
    pub blobs: Vec<Blob>,
}

impl Upload {
    /// Loads the `pending` blobs of `artifact` back out of `store`.
    pub fn from_store(
        store: &LocalStore,
        artifact: &PackedArtifact,
        pending: &[&Descriptor],
    ) -> Result<Self> {
        let blobs = pending
            .iter()
            .map(|descriptor| -> Result<Blob> {
                let data = store
                    .read_blob(descriptor.digest())
                    .map_err(|e| KroctlError::Publish(e.to_string()))?;
                Ok(Blob {
                    descriptor: (*descriptor).clone(),
                    data,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            manifest: artifact.manifest.clone(),
            manifest_bytes: artifact.manifest_bytes.clone(),
            manifest_digest: artifact.digest().to_string(),
            blobs,
        })
    }
}

/// Raw manifest returned by a registry, with the descriptor it resolved to.
#[derive(Debug, Clone)]
pub struct FetchedManifest {
    pub descriptor: Descriptor,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait Registry: Send + Sync {
    /// Whether the handle's repository already holds the blob `digest`.
    async fn blob_exists(&self, handle: &RepositoryHandle, digest: &Digest) -> Result<bool>;

    /// Uploads `upload.blobs`, then the manifest under the handle's reference.
    async fn push(&self, handle: &RepositoryHandle, upload: &Upload) -> Result<()>;

    /// Resolves the handle's reference to a manifest.
    async fn fetch_manifest(&self, handle: &RepositoryHandle) -> Result<FetchedManifest>;
}

/// Publishes the artifact tagged as the handle's reference in `store`.
///
/// Blobs the remote repository already has are not sent again. Returns the
/// manifest digest the remote tag now points at.
pub async fn publish<R: Registry + ?Sized>(
    registry: &R,
    store: &LocalStore,
    artifact: &PackedArtifact,
    handle: &RepositoryHandle,
    notifier: &Notifier,
) -> Result<String> {
    let reference = handle.reference().as_str();
    let tagged = store
        .resolve(reference)
        .map_err(|e| KroctlError::Publish(e.to_string()))?
        .ok_or_else(|| {
            KroctlError::Publish(format!("{reference} is not tagged in the local store"))
        })?;
    if tagged.digest().to_string() != artifact.digest() {
        return Err(KroctlError::Publish(format!(
            "{} is tagged as {}, expected {}",
            reference,
            tagged.digest(),
            artifact.digest()
        )));
    }

    let mut pending: Vec<&Descriptor> = Vec::new();
    for descriptor in artifact.layers.iter().chain(std::iter::once(&artifact.config)) {
        if pending.iter().any(|p| p.digest() == descriptor.digest()) {
            continue;
        }
        match registry.blob_exists(handle, descriptor.digest()).await {
            Ok(true) => notifier.debug(&format!(
                "Blob {} already exists in {}",
                descriptor.digest(),
                handle.reference().repository()
            )),
            Ok(false) => pending.push(descriptor),
            Err(e) => {
                notifier.warn(&format!(
                    "Could not check blob {}, uploading it: {}",
                    descriptor.digest(),
                    e
                ));
                pending.push(descriptor);
            }
        }
    }

    let upload = Upload::from_store(store, artifact, &pending)?;
    notifier.debug(&format!(
        "Uploading {} blob(s) and manifest {}",
        upload.blobs.len(),
        upload.manifest_digest
    ));
    registry.push(handle, &upload).await?;

    Ok(upload.manifest_digest)
}

/// Fetches the manifest the handle's reference points at.
pub async fn fetch<R: Registry + ?Sized>(
    registry: &R,
    handle: &RepositoryHandle,
    notifier: &Notifier,
) -> Result<FetchedManifest> {
    let fetched = registry.fetch_manifest(handle).await?;

    let reported = fetched.descriptor.digest();
    if matches!(reported.algorithm(), DigestAlgorithm::Sha256) {
        let actual = sha256_digest(&fetched.bytes);
        if actual != reported.to_string() {
            return Err(KroctlError::Fetch(format!(
                "digest mismatch: registry reported {reported}, content is {actual}"
            )));
        }
    }

    notifier.debug(&format!(
        "Fetched manifest {} ({})",
        reported,
        fetched.descriptor.media_type()
    ));
    Ok(fetched)
}

/// [`Registry`] backed by `oci-client`.
///
/// One client per transport, so tokens obtained while checking blobs are
/// reused for the upload that follows.
pub struct OciRegistry {
    plain: Client,
    tls: Client,
}

impl Default for OciRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OciRegistry {
    pub fn new() -> Self {
        let client = |protocol| {
            Client::new(ClientConfig {
                protocol,
                ..Default::default()
            })
        };
        Self {
            plain: client(ClientProtocol::Http),
            tls: client(ClientProtocol::Https),
        }
    }

    async fn client(&self, handle: &RepositoryHandle) -> &Client {
        let client = match handle.transport() {
            Transport::Plain => &self.plain,
            Transport::Tls => &self.tls,
        };
        client
            .store_auth_if_needed(
                handle.reference().oci().resolve_registry(),
                &handle.credential().to_registry_auth(),
            )
            .await;
        client
    }
}

#[async_trait]
impl Registry for OciRegistry {
    async fn blob_exists(&self, handle: &RepositoryHandle, digest: &Digest) -> Result<bool> {
        let client = self.client(handle).await;
        let digest: &str = digest.as_ref();
        // A one-byte ranged read; the distribution API answers 404 for unknown blobs.
        match client
            .pull_blob_stream_partial(handle.reference().oci(), digest, 0, Some(1))
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if is_not_found(&err, OciErrorCode::BlobUnknown) => Ok(false),
            Err(err) => Err(KroctlError::Publish(err.to_string())),
        }
    }

    async fn push(&self, handle: &RepositoryHandle, upload: &Upload) -> Result<()> {
        let client = self.client(handle).await;
        let reference = handle.reference().oci();

        for blob in &upload.blobs {
            client
                .push_blob(reference, &blob.data, blob.descriptor.digest().as_ref())
                .await
                .map_err(|e| KroctlError::Publish(e.to_string()))?;
        }

        client
            .push_manifest(reference, &OciManifest::Image(upload.manifest.clone()))
            .await
            .map_err(|e| KroctlError::Publish(e.to_string()))?;

        Ok(())
    }

    async fn fetch_manifest(&self, handle: &RepositoryHandle) -> Result<FetchedManifest> {
        let client = self.client(handle).await;
        let auth = handle.credential().to_registry_auth();

        let (bytes, digest) = client
            .pull_manifest_raw(handle.reference().oci(), &auth, &[MANIFEST_MEDIA_TYPE])
            .await
            .map_err(|e| classify_fetch_error(handle, e))?;
        let bytes = bytes.to_vec();

        let media_type = serde_json::from_slice::<serde_json::Value>(&bytes)
            .ok()
            .and_then(|doc| doc.get("mediaType").and_then(|v| v.as_str()).map(String::from))
            .unwrap_or_else(|| MANIFEST_MEDIA_TYPE.to_string());
        let digest = Digest::try_from(digest)
            .map_err(|e| KroctlError::Fetch(format!("invalid manifest digest: {e}")))?;

        Ok(FetchedManifest {
            descriptor: Descriptor::new(
                MediaType::from(media_type.as_str()),
                bytes.len() as u64,
                digest,
            ),
            bytes,
        })
    }
}

fn is_not_found(err: &OciDistributionError, unknown: OciErrorCode) -> bool {
    match err {
        OciDistributionError::ImageManifestNotFoundError(_) => true,
        OciDistributionError::RegistryError { envelope, .. } => envelope
            .errors
            .iter()
            .any(|e| e.code == unknown || e.code == OciErrorCode::NameUnknown),
        OciDistributionError::ServerError { code, .. } => *code == 404,
        _ => false,
    }
}

fn classify_fetch_error(handle: &RepositoryHandle, err: OciDistributionError) -> KroctlError {
    if is_not_found(&err, OciErrorCode::ManifestUnknown) {
        KroctlError::ReferenceNotFound(handle.reference().to_string())
    } else {
        KroctlError::Fetch(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector;
    use crate::credentials::AnonymousProvider;
    use oci_client::errors::{OciEnvelope, OciError};

    fn handle() -> RepositoryHandle {
        connector::connect("localhost:5001/stack:v1", &AnonymousProvider).unwrap()
    }

    fn registry_error(code: OciErrorCode) -> OciDistributionError {
        OciDistributionError::RegistryError {
            envelope: OciEnvelope {
                errors: vec![OciError {
                    code,
                    message: "unknown".to_string(),
                    detail: serde_json::Value::Null,
                }],
            },
            url: "http://localhost:5001/v2/stack/manifests/v1".to_string(),
        }
    }

    fn server_error(code: u16) -> OciDistributionError {
        OciDistributionError::ServerError {
            code,
            url: "http://localhost:5001/v2/stack/manifests/v1".to_string(),
            message: String::new(),
        }
    }

    fn assert_not_found(err: OciDistributionError) {
        match classify_fetch_error(&handle(), err) {
            KroctlError::ReferenceNotFound(reference) => {
                assert_eq!(reference, "localhost:5001/stack:v1")
            }
            other => panic!("expected ReferenceNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_manifest_is_reference_not_found() {
        assert_not_found(OciDistributionError::ImageManifestNotFoundError(
            "stack:v1".to_string(),
        ));
    }

    #[test]
    fn test_unknown_manifest_or_name_is_reference_not_found() {
        assert_not_found(registry_error(OciErrorCode::ManifestUnknown));
        assert_not_found(registry_error(OciErrorCode::NameUnknown));
    }

    #[test]
    fn test_http_404_is_reference_not_found() {
        assert_not_found(server_error(404));
    }

    #[test]
    fn test_other_failures_are_fetch_errors() {
        for err in [server_error(500), registry_error(OciErrorCode::Denied)] {
            let classified = classify_fetch_error(&handle(), err);
            assert!(
                matches!(classified, KroctlError::Fetch(_)),
                "got {classified:?}"
            );
        }
    }

    #[test]
    fn test_unknown_blob_counts_as_missing_only_for_blobs() {
        let err = registry_error(OciErrorCode::BlobUnknown);
        assert!(is_not_found(&err, OciErrorCode::BlobUnknown));
        assert!(!is_not_found(&err, OciErrorCode::ManifestUnknown));
    }
}

//! The `push` and `inspect` workflows.
//!
//! [`Kroctl`] holds everything one invocation needs (configuration, notifier,
//! registry and credential source) and is built once per process in `main`.
//! Tests build it with an in-memory [`Registry`].

use crate::collector;
use crate::config::CliConfig;
use crate::connector::{self, RepositoryHandle};
use crate::credentials::CredentialProvider;
use crate::error::{KroctlError, Result};
use crate::notifier::Notifier;
use crate::packer::Packer;
use crate::reference::ArtifactReference;
use crate::store::LocalStore;
use crate::transfer::{self, FetchedManifest, Registry};
use crate::view::{InspectReport, LayerEntry, PushSummary, View};
use chrono::{DateTime, SecondsFormat};
use oci_spec::image::{ImageManifest, ANNOTATION_CREATED, ANNOTATION_TITLE};
use std::future::Future;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct PushOptions {
    pub reference: String,
    pub filenames: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct InspectOptions {
    pub reference: String,
}

pub struct Kroctl<R: Registry> {
    config: CliConfig,
    notifier: Notifier,
    registry: R,
    credentials: Box<dyn CredentialProvider>,
}

impl<R: Registry> Kroctl<R> {
    pub fn new(config: CliConfig, registry: R, credentials: Box<dyn CredentialProvider>) -> Self {
        let notifier = Notifier::new(&config);
        Self::with_notifier(config, notifier, registry, credentials)
    }

    pub fn with_notifier(
        config: CliConfig,
        notifier: Notifier,
        registry: R,
        credentials: Box<dyn CredentialProvider>,
    ) -> Self {
        Self {
            config,
            notifier,
            registry,
            credentials,
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn view(&self) -> View {
        View::new(self.config.view)
    }

    /// Collects, packs and publishes the RGD files in `opts`.
    pub async fn push(&self, opts: &PushOptions) -> Result<PushSummary> {
        let reference = ArtifactReference::parse(&opts.reference)?;
        let files = collector::collect_files(&opts.filenames)?;

        self.notifier.info(&format!(
            "Preparing to push RGD stack {} ({} file(s))",
            reference,
            files.len()
        ));

        let store = LocalStore::new()?;
        self.notifier
            .debug(&format!("Staging artifact in {}", store.root().display()));
        let packed = Packer::new(&store, &self.notifier).pack(&files, &reference)?;

        let handle = self.connect(reference.as_str())?;

        self.notifier
            .info(&format!("Pushing artifact to registry: {}", reference));
        let digest =
            transfer::publish(&self.registry, &store, &packed, &handle, &self.notifier).await?;
        self.notifier.finish();

        Ok(PushSummary {
            reference: reference.to_string(),
            files: files.len(),
            digest,
        })
    }

    /// Fetches and summarises the manifest behind `opts.reference`.
    pub async fn inspect(&self, opts: &InspectOptions) -> Result<InspectReport> {
        self.notifier
            .info(&format!("Inspecting artifact: {}", opts.reference));

        let handle = self.connect(&opts.reference)?;
        let fetched = transfer::fetch(&self.registry, &handle, &self.notifier).await?;
        self.notifier.finish();

        build_report(&handle, &fetched)
    }

    fn connect(&self, reference: &str) -> Result<RepositoryHandle> {
        let handle = connector::connect(reference, self.credentials.as_ref())?;
        if handle.is_plain_http() {
            self.notifier.debug(&format!(
                "Using plain HTTP for local registry: {}",
                handle.host()
            ));
        }
        Ok(handle)
    }
}

/// Decodes a fetched manifest into an [`InspectReport`].
///
/// The creation time comes from the manifest annotations, falling back to the
/// config descriptor; a missing or malformed value is simply left out.
pub fn build_report(handle: &RepositoryHandle, fetched: &FetchedManifest) -> Result<InspectReport> {
    let manifest = ImageManifest::from_reader(fetched.bytes.as_slice())
        .map_err(|e| KroctlError::Fetch(format!("failed to parse manifest: {e}")))?;

    let created = manifest
        .annotations()
        .as_ref()
        .and_then(|a| a.get(ANNOTATION_CREATED))
        .or_else(|| {
            manifest
                .config()
                .annotations()
                .as_ref()
                .and_then(|a| a.get(ANNOTATION_CREATED))
        })
        .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true));

    let layers = manifest
        .layers()
        .iter()
        .map(|layer| LayerEntry {
            name: layer
                .annotations()
                .as_ref()
                .and_then(|a| a.get(ANNOTATION_TITLE))
                .cloned()
                .unwrap_or_else(|| "unknown".to_string()),
            digest: layer.digest().to_string(),
            media_type: layer.media_type().to_string(),
            size: layer.size() as u64,
        })
        .collect();

    let reference = handle.reference();
    Ok(InspectReport {
        artifact: reference.artifact_name(),
        registry: reference.host().to_string(),
        digest: fetched.descriptor.digest().to_string(),
        created,
        layers,
    })
}

/// Runs `fut` unless `cancel` resolves first, in which case the in-flight
/// work is dropped and [`KroctlError::Cancelled`] is returned.
pub async fn with_cancellation<T, F, C>(fut: F, cancel: C) -> Result<T>
where
    F: Future<Output = Result<T>>,
    C: Future<Output = ()>,
{
    tokio::select! {
        result = fut => result,
        _ = cancel => Err(KroctlError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::AnonymousProvider;
    use crate::store::{descriptor_for, sha256_digest};

    fn fetched(json: &str) -> FetchedManifest {
        FetchedManifest {
            descriptor: descriptor_for(
                "application/vnd.oci.image.manifest.v1+json",
                json.as_bytes(),
            )
            .unwrap(),
            bytes: json.as_bytes().to_vec(),
        }
    }

    const LAYER_DIGEST: &str =
        "sha256:2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae";
    const EMPTY_DIGEST: &str =
        "sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a";

    #[test]
    fn test_build_report_reads_titles_and_created() {
        let json = format!(
            r#"{{"schemaVersion":2,"mediaType":"application/vnd.oci.image.manifest.v1+json",
            "artifactType":"application/vnd.kro.rgd.stack.v1",
            "config":{{"mediaType":"application/vnd.oci.empty.v1+json","digest":"{EMPTY_DIGEST}","size":2}},
            "layers":[
              {{"mediaType":"application/vnd.kro.rgd.content.v1.yaml","digest":"{LAYER_DIGEST}","size":3,
                "annotations":{{"org.opencontainers.image.title":"vpc.yaml"}}}},
              {{"mediaType":"application/vnd.kro.rgd.content.v1.yaml","digest":"{LAYER_DIGEST}","size":3}}
            ],
            "annotations":{{"org.opencontainers.image.created":"2025-01-02T03:04:05Z"}}}}"#
        );
        let handle = connector::connect("localhost:5001/stack:v1", &AnonymousProvider).unwrap();
        let fetched = fetched(&json);

        let report = build_report(&handle, &fetched).unwrap();

        assert_eq!(report.artifact, "stack:v1");
        assert_eq!(report.registry, "localhost:5001");
        assert_eq!(report.digest, sha256_digest(json.as_bytes()));
        assert_eq!(report.created.as_deref(), Some("2025-01-02T03:04:05Z"));
        assert_eq!(report.layers.len(), 2);
        assert_eq!(report.layers[0].name, "vpc.yaml");
        assert_eq!(report.layers[0].digest, LAYER_DIGEST);
        assert_eq!(report.layers[1].name, "unknown");
    }

    #[test]
    fn test_build_report_falls_back_to_config_created_and_skips_garbage() {
        let with_config_created = format!(
            r#"{{"schemaVersion":2,
            "config":{{"mediaType":"application/vnd.oci.empty.v1+json","digest":"{EMPTY_DIGEST}","size":2,
              "annotations":{{"org.opencontainers.image.created":"2024-06-01T10:00:00Z"}}}},
            "layers":[]}}"#
        );
        let malformed_created = format!(
            r#"{{"schemaVersion":2,
            "config":{{"mediaType":"application/vnd.oci.empty.v1+json","digest":"{EMPTY_DIGEST}","size":2}},
            "layers":[],
            "annotations":{{"org.opencontainers.image.created":"yesterday"}}}}"#
        );
        let handle = connector::connect("ghcr.io/acme/stack:v1", &AnonymousProvider).unwrap();

        let report = build_report(&handle, &fetched(&with_config_created)).unwrap();
        assert_eq!(report.created.as_deref(), Some("2024-06-01T10:00:00Z"));
        assert!(report.layers.is_empty());

        let report = build_report(&handle, &fetched(&malformed_created)).unwrap();
        assert_eq!(report.created, None);
    }

    #[test]
    fn test_build_report_rejects_non_manifest() {
        let handle = connector::connect("ghcr.io/acme/stack:v1", &AnonymousProvider).unwrap();
        let err = build_report(&handle, &fetched("[1, 2, 3]")).unwrap_err();
        assert!(matches!(err, KroctlError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_cancellation_wins_over_pending_work() {
        let pending = std::future::pending::<Result<()>>();
        let err = with_cancellation(pending, async {}).await.unwrap_err();
        assert!(matches!(err, KroctlError::Cancelled));
    }

    #[tokio::test]
    async fn test_completed_work_is_returned() {
        let value = with_cancellation(async { Ok(7) }, std::future::pending::<()>())
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}

//! Registry credential resolution.
//!
//! Transfer code only ever sees a [`CredentialProvider`]; where the secret comes
//! from is decided by the caller. Shipped providers:
//! - [`DockerConfigProvider`]: `~/.docker/config.json` (or `$DOCKER_CONFIG`),
//!   including `credHelpers`/`credsStore` helpers.
//! - [`EnvCredentialProvider`]: `REGISTRY_USERNAME` / `REGISTRY_PASSWORD`.
//! - [`AnonymousProvider`]: no credentials.
//! - [`ChainProvider`]: first provider that yields credentials wins.
//! - [`LazyProvider`]: opens another provider on first use.

use crate::error::{KroctlError, Result};
use docker_credential::{CredentialRetrievalError, DockerCredential};
use oci_client::secrets::RegistryAuth;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const DOCKER_HUB_REGISTRIES: [&str; 3] = ["docker.io", "index.docker.io", "registry-1.docker.io"];
const DOCKER_HUB_SERVER: &str = "https://index.docker.io/v1/";

#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Anonymous,
    Basic { username: String, password: String },
    /// OAuth2 identity token as stored by `docker login` for some registries.
    IdentityToken(String),
}

impl Credential {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Credential::Anonymous)
    }

    pub fn to_registry_auth(&self) -> RegistryAuth {
        match self {
            Credential::Anonymous => RegistryAuth::Anonymous,
            Credential::Basic { username, password } => {
                RegistryAuth::Basic(username.clone(), password.clone())
            }
            // Registries accept identity tokens as the password of a fixed user.
            Credential::IdentityToken(token) => {
                RegistryAuth::Basic("<token>".to_string(), token.clone())
            }
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Anonymous => f.write_str("Anonymous"),
            Credential::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Credential::IdentityToken(_) => f.write_str("IdentityToken(***)"),
        }
    }
}

/// Source of registry credentials, resolved per registry host.
pub trait CredentialProvider: Send + Sync {
    fn name(&self) -> &str;

    fn resolve(&self, registry: &str) -> Result<Credential>;
}

pub struct AnonymousProvider;

impl CredentialProvider for AnonymousProvider {
    fn name(&self) -> &str {
        "anonymous"
    }

    fn resolve(&self, _registry: &str) -> Result<Credential> {
        Ok(Credential::Anonymous)
    }
}

/// Reads `REGISTRY_USERNAME` and `REGISTRY_PASSWORD` for every registry.
pub struct EnvCredentialProvider {
    username: Option<String>,
    password: Option<String>,
}

impl EnvCredentialProvider {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            username: lookup("REGISTRY_USERNAME"),
            password: lookup("REGISTRY_PASSWORD"),
        }
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn name(&self) -> &str {
        "environment"
    }

    fn resolve(&self, _registry: &str) -> Result<Credential> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Ok(Credential::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => Ok(Credential::Anonymous),
        }
    }
}

/// Credentials from a Docker CLI config file.
///
/// The file is read once when the provider is opened; a missing file behaves
/// like an empty store, an unreadable one is a [`KroctlError::CredentialStore`].
pub struct DockerConfigProvider {
    config: Option<Vec<u8>>,
}

impl DockerConfigProvider {
    /// Opens the config at `$DOCKER_CONFIG/config.json`, else `~/.docker/config.json`.
    pub fn open() -> Result<Self> {
        let dir = match std::env::var_os("DOCKER_CONFIG") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .ok_or_else(|| {
                    KroctlError::CredentialStore(
                        "cannot determine home directory for docker config".to_string(),
                    )
                })?
                .join(".docker"),
        };
        Self::open_path(dir.join("config.json"))
    }

    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("no docker config at {}, using anonymous access", path.display());
            return Ok(Self { config: None });
        }

        let config = std::fs::read(path).map_err(|e| {
            KroctlError::CredentialStore(format!("failed to read {}: {}", path.display(), e))
        })?;

        Ok(Self {
            config: Some(config),
        })
    }

    fn server_key(registry: &str) -> &str {
        if DOCKER_HUB_REGISTRIES.contains(&registry) {
            DOCKER_HUB_SERVER
        } else {
            registry
        }
    }
}

impl CredentialProvider for DockerConfigProvider {
    fn name(&self) -> &str {
        "docker-config"
    }

    fn resolve(&self, registry: &str) -> Result<Credential> {
        let Some(config) = &self.config else {
            return Ok(Credential::Anonymous);
        };

        let server = Self::server_key(registry);
        match docker_credential::get_credential_from_reader(config.as_slice(), server) {
            Ok(DockerCredential::UsernamePassword(username, password)) => {
                Ok(Credential::Basic { username, password })
            }
            Ok(DockerCredential::IdentityToken(token)) => Ok(Credential::IdentityToken(token)),
            Err(CredentialRetrievalError::NoCredentialConfigured) => Ok(Credential::Anonymous),
            // Helpers report an unknown server as a failure.
            Err(CredentialRetrievalError::HelperFailure { stdout, .. })
                if stdout.contains("credentials not found") =>
            {
                Ok(Credential::Anonymous)
            }
            Err(e) => Err(KroctlError::CredentialStore(format!(
                "failed to resolve credentials for {}: {}",
                registry,
                e.to_string().trim()
            ))),
        }
    }
}

pub struct ChainProvider {
    providers: Vec<Box<dyn CredentialProvider>>,
}

impl ChainProvider {
    pub fn new(providers: Vec<Box<dyn CredentialProvider>>) -> Self {
        Self { providers }
    }

    /// Environment variables first, then the Docker config.
    pub fn default_chain() -> Result<Self> {
        Ok(Self::new(vec![
            Box::new(EnvCredentialProvider::from_env()),
            Box::new(DockerConfigProvider::open()?),
        ]))
    }
}

impl CredentialProvider for ChainProvider {
    fn name(&self) -> &str {
        "chain"
    }

    fn resolve(&self, registry: &str) -> Result<Credential> {
        for provider in &self.providers {
            let credential = provider.resolve(registry)?;
            if !credential.is_anonymous() {
                log::debug!("using {} credentials for {}", provider.name(), registry);
                return Ok(credential);
            }
        }
        Ok(Credential::Anonymous)
    }
}

type Opener = Box<dyn Fn() -> Result<Box<dyn CredentialProvider>> + Send + Sync>;

/// Defers opening a provider until a registry actually needs credentials, so
/// an unreadable credential store never masks input errors.
pub struct LazyProvider {
    open: Opener,
    inner: OnceLock<Box<dyn CredentialProvider>>,
}

impl LazyProvider {
    pub fn new<F>(open: F) -> Self
    where
        F: Fn() -> Result<Box<dyn CredentialProvider>> + Send + Sync + 'static,
    {
        Self {
            open: Box::new(open),
            inner: OnceLock::new(),
        }
    }

    /// [`ChainProvider::default_chain`], opened on first use.
    pub fn default_chain() -> Self {
        Self::new(|| {
            let chain: Box<dyn CredentialProvider> = Box::new(ChainProvider::default_chain()?);
            Ok(chain)
        })
    }

    fn provider(&self) -> Result<&dyn CredentialProvider> {
        if let Some(provider) = self.inner.get() {
            return Ok(provider.as_ref());
        }
        let opened = (self.open)()?;
        Ok(self.inner.get_or_init(|| opened).as_ref())
    }
}

impl CredentialProvider for LazyProvider {
    fn name(&self) -> &str {
        self.inner.get().map_or("lazy", |provider| provider.name())
    }

    fn resolve(&self, registry: &str) -> Result<Credential> {
        self.provider()?.resolve(registry)
    }
}

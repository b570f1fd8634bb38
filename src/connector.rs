//! Repository Connector.
//!
//! Turns a reference string into a [`RepositoryHandle`]: parsed reference,
//! transport mode, and the credentials to present. The decision is made once
//! per invocation; there is no fallback between plain and encrypted transport.

use crate::credentials::{Credential, CredentialProvider};
use crate::error::Result;
use crate::reference::ArtifactReference;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Plain HTTP.
    Plain,
    /// HTTPS.
    Tls,
}

/// Loopback hosts that are reached over plain HTTP.
const LOOPBACK_PREFIXES: [&str; 3] = ["localhost:", "127.0.0.1:", "::1:"];

/// Transport policy for a registry host.
///
/// Local registries (`localhost:<port>`, `127.0.0.1:<port>`, `::1:<port>`) are
/// assumed to serve plain HTTP; everything else must use TLS.
pub fn transport_for_host(host: &str) -> Transport {
    if LOOPBACK_PREFIXES
        .iter()
        .any(|prefix| host.starts_with(prefix))
    {
        Transport::Plain
    } else {
        Transport::Tls
    }
}

#[derive(Debug, Clone)]
pub struct RepositoryHandle {
    reference: ArtifactReference,
    transport: Transport,
    credential: Credential,
}

impl RepositoryHandle {
    pub fn reference(&self) -> &ArtifactReference {
        &self.reference
    }

    pub fn host(&self) -> &str {
        self.reference.host()
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn is_plain_http(&self) -> bool {
        self.transport == Transport::Plain
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }
}

/// Parses `reference` and resolves transport and credentials for its host.
///
/// Fails with `InvalidReference` before any credential lookup when the
/// reference is malformed, and with `CredentialStore` when the provider fails.
pub fn connect(reference: &str, credentials: &dyn CredentialProvider) -> Result<RepositoryHandle> {
    let reference = ArtifactReference::parse(reference)?;
    let transport = transport_for_host(reference.host());
    let credential = credentials.resolve(reference.host())?;

    Ok(RepositoryHandle {
        reference,
        transport,
        credential,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::AnonymousProvider;
    use crate::error::KroctlError;

    struct FailingProvider;

    impl CredentialProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        fn resolve(&self, _registry: &str) -> Result<Credential> {
            Err(KroctlError::CredentialStore("Unable to read config".to_string()))
        }
    }

    #[test]
    fn test_loopback_hosts_use_plain_transport() {
        assert_eq!(transport_for_host("localhost:5001"), Transport::Plain);
        assert_eq!(transport_for_host("127.0.0.1:5000"), Transport::Plain);
        assert_eq!(transport_for_host("::1:5000"), Transport::Plain);
    }

    #[test]
    fn test_remote_hosts_use_tls() {
        assert_eq!(transport_for_host("ghcr.io"), Transport::Tls);
        assert_eq!(transport_for_host("registry.example.com:5000"), Transport::Tls);
        // No port, no match.
        assert_eq!(transport_for_host("localhost"), Transport::Tls);
        assert_eq!(transport_for_host("localhost.example.com:443"), Transport::Tls);
    }

    #[test]
    fn test_connect_local_registry() {
        let handle = connect("localhost:5001/stack:v1", &AnonymousProvider).unwrap();
        assert!(handle.is_plain_http());
        assert_eq!(handle.host(), "localhost:5001");
        assert!(handle.credential().is_anonymous());
    }

    #[test]
    fn test_connect_remote_registry() {
        let handle = connect("ghcr.io/acme/stack:v1", &AnonymousProvider).unwrap();
        assert_eq!(handle.transport(), Transport::Tls);
        assert_eq!(handle.reference().repository(), "acme/stack");
    }

    #[test]
    fn test_invalid_reference_is_rejected_before_credentials() {
        let err = connect("ghcr.io/UPPER/case:v1", &FailingProvider).unwrap_err();
        assert!(matches!(err, KroctlError::InvalidReference { .. }));
    }

    #[test]
    fn test_credential_store_failure() {
        let err = connect("ghcr.io/acme/stack:v1", &FailingProvider).unwrap_err();
        assert!(matches!(err, KroctlError::CredentialStore(_)));
    }
}

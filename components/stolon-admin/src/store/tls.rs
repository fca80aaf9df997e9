//! TLS material for store connections.
//!
//! TLS is on as soon as any of the cert, key or CA paths is given. The CA
//! bundle is then mandatory; the client cert and key must come together.

// External crates
use anyhow::{Context, Result, bail};
use std::{fs, path::Path, sync::Arc};
use tokio_rustls::{
    TlsConnector,
    rustls::{
        ClientConfig, RootCertStore,
        crypto::ring,
        pki_types::{CertificateDer, PrivateKeyDer},
    },
};

/// File paths of the store TLS material.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsPaths<'a> {
    /// Client certificate chain (PEM).
    pub cert: Option<&'a Path>,
    /// Client private key (PEM).
    pub key: Option<&'a Path>,
    /// Trusted CA bundle (PEM).
    pub ca_cert: Option<&'a Path>,
}

impl TlsPaths<'_> {
    /// Whether any TLS path was given.
    pub fn is_enabled(&self) -> bool {
        self.cert.is_some() || self.key.is_some() || self.ca_cert.is_some()
    }
}

/// Build a connector from `paths`, or `None` when TLS is not configured.
pub fn load_connector(paths: &TlsPaths<'_>) -> Result<Option<TlsConnector>> {
    if !paths.is_enabled() {
        return Ok(None);
    }

    let Some(ca_path) = paths.ca_cert else {
        bail!("a trusted CA bundle (--store-cacert) is required when store TLS is configured");
    };
    let roots = load_roots(ca_path)?;

    let builder = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .context("no usable TLS protocol versions")?
        .with_root_certificates(roots);

    let config = match (paths.cert, paths.key) {
        (Some(cert_path), Some(key_path)) => {
            let chain = load_certs(cert_path)?;
            let key = load_key(key_path)?;
            builder
                .with_client_auth_cert(chain, key)
                .context("client certificate and key do not form a valid identity")?
        }
        (None, None) => builder.with_no_client_auth(),
        (Some(_), None) => bail!("--store-cert was given without --store-key"),
        (None, Some(_)) => bail!("--store-key was given without --store-cert"),
    };

    Ok(Some(TlsConnector::from(Arc::new(config))))
}

fn load_roots(path: &Path) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots
            .add(cert)
            .with_context(|| format!("invalid CA certificate in {}", path.display()))?;
    }
    Ok(roots)
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let pem = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let certs = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("failed to parse certificates in {}", path.display()))?;

    if certs.is_empty() {
        bail!("no certificates found in {}", path.display());
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let pem = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    rustls_pemfile::private_key(&mut pem.as_slice())
        .with_context(|| format!("failed to parse private key in {}", path.display()))?
        .with_context(|| format!("no private key found in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_paths_means_plain_connections() {
        let connector = load_connector(&TlsPaths::default()).unwrap();
        assert!(connector.is_none());
    }

    #[test]
    fn ca_is_required_once_tls_is_configured() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("client.pem");
        fs::write(&cert, "irrelevant").unwrap();

        let paths = TlsPaths {
            cert: Some(&cert),
            ..TlsPaths::default()
        };
        let Err(err) = load_connector(&paths) else {
            panic!("connector loaded without usable TLS material");
        };
        assert!(err.to_string().contains("--store-cacert"));
    }

    #[test]
    fn unreadable_ca_is_reported_with_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let ca = dir.path().join("missing-ca.pem");

        let paths = TlsPaths {
            ca_cert: Some(&ca),
            ..TlsPaths::default()
        };
        let Err(err) = load_connector(&paths) else {
            panic!("connector loaded without usable TLS material");
        };
        assert!(format!("{err:#}").contains("missing-ca.pem"));
    }

    #[test]
    fn ca_without_certificates_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ca = dir.path().join("ca.pem");
        fs::write(&ca, "not a pem bundle\n").unwrap();

        let paths = TlsPaths {
            ca_cert: Some(&ca),
            ..TlsPaths::default()
        };
        let Err(err) = load_connector(&paths) else {
            panic!("connector loaded without usable TLS material");
        };
        assert!(err.to_string().contains("no certificates found"));
    }
}

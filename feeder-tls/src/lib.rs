use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use rustls::{ClientConfig, RootCertStore, pki_types::CertificateDer};
use serde::Deserialize;

/// Errors that can occur while loading the broker TLS material
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to open file {path}: {source}")]
    CertFileIo {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read certificate PEM")]
    CertPem(std::io::Error),
    #[error("failed to parse private key PEM")]
    KeyPem(std::io::Error),
    #[error("no certificates found in {0}")]
    NoCertificate(PathBuf),
    #[error("no private keys found in {0}")]
    NoPrivateKey(PathBuf),
    #[error("failed to add root CA certificate")]
    RootCertError(rustls::Error),
    #[error("failed to build client config")]
    ClientConfigError(rustls::Error),
}

/// Paths to the CA certificate and the device's client certificate/key pair.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    pub root_ca: PathBuf,
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            root_ca: PathBuf::from("./certs/rootCA.pem"),
            cert: PathBuf::from("./certs/certificate.pem.crt"),
            key: PathBuf::from("./certs/private.pem.key"),
        }
    }
}

/// Raw PEM bytes for a mutually authenticated broker connection.
///
/// MQTT clients take the PEM blobs as-is; [`load_identity`] only hands them
/// out after they have been checked by building a [`ClientConfig`] from them.
#[derive(Clone)]
pub struct ClientIdentity {
    pub ca_pem: Vec<u8>,
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("ca_pem", &self.ca_pem.len())
            .field("cert_pem", &self.cert_pem.len())
            .field("key_pem", &"<redacted>")
            .finish()
    }
}

pub fn client_config(config: &TlsConfig) -> Result<ClientConfig, TlsError> {
    let mut root_store = RootCertStore::empty();
    let mut ca_reader = open(&config.root_ca)?;

    for cert in rustls_pemfile::certs(&mut ca_reader) {
        root_store
            .add(cert.map_err(TlsError::CertPem)?)
            .map_err(TlsError::RootCertError)?;
    }
    if root_store.is_empty() {
        return Err(TlsError::NoCertificate(config.root_ca.clone()));
    }

    let mut cert_reader = open(&config.cert)?;
    let cert_chain: Vec<CertificateDer> = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(TlsError::CertPem)?;
    if cert_chain.is_empty() {
        return Err(TlsError::NoCertificate(config.cert.clone()));
    }

    let mut key_reader = open(&config.key)?;
    let key = rustls_pemfile::private_key(&mut key_reader)
        .map_err(TlsError::KeyPem)?
        .ok_or_else(|| TlsError::NoPrivateKey(config.key.clone()))?;

    // with_client_auth_cert automatically handles presenting the cert to the server
    let client_config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_client_auth_cert(cert_chain, key)
        .map_err(TlsError::ClientConfigError)?;

    Ok(client_config)
}

/// Validate the configured files and return their PEM contents.
///
/// Requires a process-wide rustls crypto provider to be installed.
pub fn load_identity(config: &TlsConfig) -> Result<ClientIdentity, TlsError> {
    client_config(config)?;

    Ok(ClientIdentity {
        ca_pem: read(&config.root_ca)?,
        cert_pem: read(&config.cert)?,
        key_pem: read(&config.key)?,
    })
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    let file = File::open(path).map_err(|source| TlsError::CertFileIo {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

fn read(path: &Path) -> Result<Vec<u8>, TlsError> {
    std::fs::read(path).map_err(|source| TlsError::CertFileIo {
        path: path.to_path_buf(),
        source,
    })
}

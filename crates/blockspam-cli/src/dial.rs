//! Connection setup for node endpoints.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};
use tracing::{debug, trace};

use blockspam_proto::{BeaconClient, ConsensusClient, RegistryClient, RootHashClient, RuntimeClient};

/// Errors that can occur while dialing a node.
#[derive(Debug, Error)]
pub enum DialError {
    /// The endpoint is not a valid URI.
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// The CA bundle could not be read.
    #[error("failed to read CA certificate {}: {source}", path.display())]
    CaCert {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TLS configuration or the transport itself failed.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

/// How the transport is secured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsMode {
    /// No TLS.
    Plaintext,
    /// TLS verified against the system trust store.
    NativeRoots,
    /// TLS verified against the given PEM bundle.
    CustomCa(Vec<u8>),
}

impl TlsMode {
    /// TLS with the PEM bundle at `path`.
    pub fn from_ca_file(path: &Path) -> Result<Self, DialError> {
        let pem = std::fs::read(path).map_err(|source| DialError::CaCert {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::CustomCa(pem))
    }

    /// Returns true unless the transport is plaintext.
    pub fn is_tls(&self) -> bool {
        !matches!(self, Self::Plaintext)
    }
}

/// Where and how to dial. Shared read-only by every task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialConfig {
    /// Endpoint as given by the operator (`host:port` or a full URI).
    pub endpoint: String,
    pub tls: TlsMode,
}

impl DialConfig {
    pub fn new(endpoint: impl Into<String>, tls: TlsMode) -> Self {
        Self {
            endpoint: endpoint.into(),
            tls,
        }
    }

    /// Endpoint as a URI, defaulting the scheme from the TLS mode.
    pub fn uri(&self) -> String {
        normalize_endpoint(&self.endpoint, self.tls.is_tls())
    }

    /// Build the tonic endpoint, including TLS settings.
    pub fn to_endpoint(&self) -> Result<Endpoint, DialError> {
        let uri = self.uri();
        let endpoint =
            Endpoint::from_shared(uri.clone()).map_err(|e| DialError::InvalidEndpoint {
                endpoint: uri,
                reason: e.to_string(),
            })?;

        let endpoint = match &self.tls {
            TlsMode::Plaintext => endpoint,
            TlsMode::NativeRoots => {
                endpoint.tls_config(ClientTlsConfig::new().with_native_roots())?
            }
            TlsMode::CustomCa(pem) => endpoint
                .tls_config(ClientTlsConfig::new().ca_certificate(Certificate::from_pem(pem)))?,
        };
        Ok(endpoint)
    }
}

/// Prefix a scheme when the operator gave a bare `host:port`.
pub fn normalize_endpoint(raw: &str, tls: bool) -> String {
    let raw = raw.trim();
    if raw.contains("://") {
        raw.to_string()
    } else if tls {
        format!("https://{raw}")
    } else {
        format!("http://{raw}")
    }
}

/// A dedicated connection to one node.
///
/// Never shared between tasks; the transport closes once this value and the
/// clients created from it are dropped.
#[derive(Debug)]
pub struct NodeConnection {
    channel: Channel,
    uri: String,
}

impl NodeConnection {
    /// Open a new connection.
    pub async fn dial(config: &DialConfig) -> Result<Self, DialError> {
        let endpoint = config.to_endpoint()?;
        let channel = endpoint.connect().await?;
        let uri = config.uri();
        debug!(endpoint = %uri, tls = config.tls.is_tls(), "Connected");
        Ok(Self { channel, uri })
    }

    pub fn runtime(&self) -> RuntimeClient<Channel> {
        RuntimeClient::new(self.channel.clone())
    }

    pub fn consensus(&self) -> ConsensusClient<Channel> {
        ConsensusClient::new(self.channel.clone())
    }

    pub fn beacon(&self) -> BeaconClient<Channel> {
        BeaconClient::new(self.channel.clone())
    }

    pub fn registry(&self) -> RegistryClient<Channel> {
        RegistryClient::new(self.channel.clone())
    }

    pub fn roothash(&self) -> RootHashClient<Channel> {
        RootHashClient::new(self.channel.clone())
    }
}

impl Drop for NodeConnection {
    fn drop(&mut self) {
        trace!(endpoint = %self.uri, "Releasing connection");
    }
}

//! # Connection Options
//!
//! The settings a session is opened with. They are immutable once handed to
//! [`crate::Engine::connect`] and are persisted (as JSON) after every successful connect so
//! the last workspace can be restored on the next start.
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// `host:port` or a full URI (`http://host:port`).
    pub address: String,
    /// Discover services through the server reflection protocol.
    #[serde(default = "default_reflect")]
    pub reflect: bool,
    #[serde(default)]
    pub tls: Option<TlsOptions>,
    /// Metadata (headers) attached to every user call.
    #[serde(default)]
    pub metadata: Vec<(String, String)>,
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct TlsOptions {
    /// Overrides the name checked against the server certificate.
    pub domain_name: Option<String>,
    /// PEM file with the CA to trust. Native roots are used when absent.
    pub ca_certificate: Option<PathBuf>,
}

fn default_reflect() -> bool {
    true
}

impl ConnectionOptions {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            reflect: true,
            tls: None,
            metadata: Vec::new(),
            connect_timeout_ms: None,
        }
    }

    pub fn with_reflection(mut self, reflect: bool) -> Self {
        self.reflect = reflect;
        self
    }

    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// The URI the transport dials. A bare `host:port` gets a scheme matching the TLS setting.
    pub fn uri(&self) -> String {
        if self.address.contains("://") {
            return self.address.clone();
        }

        let scheme = if self.tls.is_some() { "https" } else { "http" };
        format!("{scheme}://{}", self.address)
    }
}

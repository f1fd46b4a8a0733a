//! # Connection Manager
//!
//! A [`Session`] is one live transport connection together with the schema discovered over it
//! and the telemetry of the calls it carries. The engine owns at most one session and replaces
//! it wholesale on reconnect.
//!
//! While a session is open, a background watcher publishes its connectivity changes as
//! [`crate::Event::ConnectionStateChanged`]. Closing the session stops the watcher and waits
//! for it to exit.
use crate::events::EventSink;
use crate::grpc::client::GrpcClient;
use crate::options::{ConnectionOptions, TlsOptions};
use crate::reflection::client::ReflectionClient;
use crate::schema::{DiscoveryError, SchemaRegistry};
use crate::telemetry::{StatsHandler, Telemetry};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tonic::transport::{Certificate, ClientTlsConfig, Endpoint};

mod channel;
mod watcher;

pub use channel::{ChannelShutdown, MonitoredChannel};
use watcher::StateWatcher;

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Invalid address '{0}': {1}")]
    InvalidAddress(String, #[source] tonic::transport::Error),
    #[error("Failed to read CA certificate '{}': {source}", path.display())]
    CaCertificate {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid TLS configuration: {0}")]
    Tls(#[source] tonic::transport::Error),
    #[error("Failed to connect to '{0}': {1}")]
    ConnectionFailed(String, #[source] tonic::transport::Error),
    #[error("Failed to close the previous session: {0}")]
    Close(#[source] tokio::task::JoinError),
}

/// gRPC connectivity states.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectivityState {
    Idle,
    Connecting,
    Ready,
    TransientFailure,
    Shutdown,
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectivityState::Idle => "IDLE",
            ConnectivityState::Connecting => "CONNECTING",
            ConnectivityState::Ready => "READY",
            ConnectivityState::TransientFailure => "TRANSIENT_FAILURE",
            ConnectivityState::Shutdown => "SHUTDOWN",
        };
        f.write_str(name)
    }
}

pub struct Session {
    options: ConnectionOptions,
    channel: MonitoredChannel,
    telemetry: Telemetry,
    registry: RwLock<SchemaRegistry>,
    watcher: Mutex<Option<StateWatcher>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.options.address)
            .field("state", &self.channel.state())
            .finish()
    }
}

impl Session {
    /// Connects to `options.address`. The connection is established before this returns.
    pub async fn open(options: ConnectionOptions) -> Result<Self, ConnectionError> {
        let uri = options.uri();

        let mut endpoint = Endpoint::new(uri.clone())
            .map_err(|e| ConnectionError::InvalidAddress(uri.clone(), e))?;

        if let Some(timeout) = options.connect_timeout() {
            endpoint = endpoint.connect_timeout(timeout);
        }

        // An explicit https:// address gets TLS with native roots.
        let tls = options
            .tls
            .clone()
            .or_else(|| uri.starts_with("https://").then(TlsOptions::default));

        if let Some(tls) = &tls {
            endpoint = endpoint
                .tls_config(tls_config(tls).await?)
                .map_err(ConnectionError::Tls)?;
        }

        let channel = endpoint
            .connect()
            .await
            .map_err(|e| ConnectionError::ConnectionFailed(uri.clone(), e))?;

        tracing::debug!(address = %uri, "connected");

        Ok(Self {
            options,
            channel: MonitoredChannel::new(channel, ConnectivityState::Ready),
            telemetry: Telemetry::new(),
            registry: RwLock::new(SchemaRegistry::default()),
            watcher: Mutex::new(None),
        })
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    pub fn state(&self) -> ConnectivityState {
        self.channel.state()
    }

    pub fn grpc_client(&self) -> GrpcClient<MonitoredChannel> {
        GrpcClient::new(self.channel.clone(), self.telemetry.clone())
    }

    pub fn reflection_client(&self) -> ReflectionClient<MonitoredChannel> {
        ReflectionClient::new(self.channel.clone(), self.telemetry.clone())
    }

    /// Registers a listener for the telemetry of every call made over this session.
    pub fn add_stats_handler(&self, handler: Arc<dyn StatsHandler>) {
        self.telemetry.register(handler);
    }

    /// A snapshot of the schema discovered so far.
    pub fn registry(&self) -> SchemaRegistry {
        self.registry
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn install_registry(&self, registry: SchemaRegistry) {
        *self
            .registry
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = registry;
    }

    /// Fetches the server schema through reflection and installs it.
    pub async fn discover(&self) -> Result<SchemaRegistry, DiscoveryError> {
        let mut client = self.reflection_client();
        let registry = SchemaRegistry::discover(&mut client).await?;
        self.install_registry(registry.clone());
        Ok(registry)
    }

    /// Starts publishing connectivity changes to `events`, replacing any previous watcher.
    pub async fn start_watcher(&self, events: Arc<dyn EventSink>) -> Result<(), ConnectionError> {
        let mut slot = self.watcher.lock().await;

        if let Some(previous) = slot.take() {
            previous.stop().await.map_err(ConnectionError::Close)?;
        }

        *slot = Some(StateWatcher::spawn(self.channel.subscribe(), events));
        Ok(())
    }

    /// Moves the session to `SHUTDOWN` and stops its watcher. From then on every call over the
    /// session fails, including calls from clients taken earlier. Closing twice is a no-op.
    pub async fn close(&self) -> Result<(), ConnectionError> {
        self.channel.shutdown();

        if let Some(watcher) = self.watcher.lock().await.take() {
            watcher.stop().await.map_err(ConnectionError::Close)?;
        }

        tracing::debug!(address = %self.options.address, "session closed");
        Ok(())
    }
}

async fn tls_config(tls: &TlsOptions) -> Result<ClientTlsConfig, ConnectionError> {
    let mut config = ClientTlsConfig::new().with_native_roots();

    if let Some(domain) = &tls.domain_name {
        config = config.domain_name(domain.clone());
    }

    if let Some(path) = &tls.ca_certificate {
        let pem = tokio::fs::read(path)
            .await
            .map_err(|source| ConnectionError::CaCertificate {
                path: path.clone(),
                source,
            })?;
        config = config.ca_certificate(Certificate::from_pem(pem));
    }

    Ok(config)
}

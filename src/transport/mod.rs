//! Transport boundary
//!
//! The publish/subscribe client is an external collaborator. This module
//! defines the seam the connection wrapper drives: one-shot setup setters,
//! a connect call, a background network task that reports connection
//! changes through [`ConnectionCallbacks`], and non-blocking publishing.

use crate::event::{ConnectFlags, ConnectReturnCode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod mqtt;

pub use rumqttc::QoS;

/// Transport-level failures
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection to MQTT broker failed")]
    Connect(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("error publishing message: {0}")]
    Publish(String),
    #[error("MQTT client is not connected")]
    NotConnected,
    #[error("invalid TLS configuration: {0}")]
    Tls(String),
    #[error("MQTT network loop already started")]
    AlreadyStarted,
}

/// TLS material already loaded into memory
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TlsMaterial {
    /// PEM encoded CA certificate(s); `None` uses the platform trust store
    pub ca: Option<Vec<u8>>,
    /// PEM encoded client certificate and private key
    pub client_auth: Option<(Vec<u8>, Vec<u8>)>,
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("ca", &self.ca.as_ref().map(Vec::len))
            .field("client_auth", &self.client_auth.is_some())
            .finish()
    }
}

/// A message with topic, payload, QoS and retain flag (will or birth message)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// Publishing half of a transport, usable from the network task
pub trait Publisher: Send + Sync {
    /// Queue a message for delivery. Never blocks.
    fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS, retain: bool)
        -> Result<(), TransportError>;
}

/// Hooks invoked from the transport's background network task
pub trait ConnectionCallbacks: Send + Sync {
    /// A connect attempt completed, successfully or not
    fn on_connect(&self, publisher: &dyn Publisher, flags: ConnectFlags, code: ConnectReturnCode);

    /// An established connection was lost. `None` means a requested disconnect.
    fn on_disconnect(&self, reason: Option<&str>);
}

/// Publish/subscribe client driven by the connection wrapper
#[async_trait::async_trait]
pub trait Transport: Publisher + 'static {
    /// Install TLS material; must precede `connect`
    fn set_tls(&mut self, tls: TlsMaterial) -> Result<(), TransportError>;

    /// `password` is `None` when only a username is configured
    fn set_credentials(&mut self, username: &str, password: Option<&str>);

    fn set_will(&mut self, will: StoredMessage);

    /// Upper bound for the transport's own reconnect backoff
    fn set_max_reconnect_delay(&mut self, delay: Duration);

    /// Perform the initial socket-level connection attempt.
    ///
    /// The MQTT handshake runs on the network task once `loop_start` is
    /// called. Its outcome, including a broker refusal, reaches
    /// `callbacks.on_connect`.
    async fn connect(
        &mut self,
        host: &str,
        port: u16,
        keepalive: Duration,
        callbacks: Arc<dyn ConnectionCallbacks>,
    ) -> Result<(), TransportError>;

    /// Start the background network task
    fn loop_start(&mut self) -> Result<(), TransportError>;

    /// Stop the background network task. Idempotent.
    async fn loop_stop(&mut self);
}

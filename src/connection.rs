//! Connection lifecycle wrapper
//!
//! Owns the transport, applies TLS, credentials, will and reconnect settings
//! before connecting, publishes the birth message on every successful
//! connect, and turns connect callbacks into [`Event::Connect`] entries on
//! the event queue. Disconnects are logged only: the transport reconnects on
//! its own and the application is not told.

use crate::config::BaseConfig;
use crate::discovery::{DiscoveryEntity, DiscoverySettings};
use crate::error::ConfigurationError;
use crate::event::{ConnectEvent, ConnectFlags, ConnectReturnCode, Event, EventSender};
use crate::transport::{
    ConnectionCallbacks, Publisher, QoS, StoredMessage, TlsMaterial, Transport, TransportError,
};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// State shared with the transport's network task
struct ConnectionShared<E> {
    connected: AtomicBool,
    birth: Option<StoredMessage>,
    events: EventSender<E>,
}

impl<E: Send + 'static> ConnectionCallbacks for ConnectionShared<E> {
    fn on_connect(&self, publisher: &dyn Publisher, flags: ConnectFlags, code: ConnectReturnCode) {
        if !code.is_success() {
            error!(code = code.code(), "connection to MQTT broker failed: {}", code);
        } else {
            self.connected.store(true, Ordering::Relaxed);
            info!(
                session_present = flags.session_present,
                "connection to MQTT broker established"
            );

            if let Some(birth) = &self.birth {
                info!(topic = %birth.topic, "publishing birth message");
                if let Err(e) =
                    publisher.publish(&birth.topic, birth.payload.clone(), birth.qos, birth.retain)
                {
                    error!(topic = %birth.topic, "could not publish birth message: {}", e);
                }
            }
        }
        self.events.push(Event::Connect(ConnectEvent::new(flags, code)));
    }

    fn on_disconnect(&self, reason: Option<&str>) {
        self.connected.store(false, Ordering::Relaxed);
        match reason {
            Some(reason) => warn!("disconnected from MQTT broker: {}", reason),
            None => info!("disconnected from MQTT broker"),
        }
    }
}

/// Owner of the transport and of the connection lifecycle
pub struct Connection<E> {
    transport: Box<dyn Transport>,
    shared: Arc<ConnectionShared<E>>,
    discovery: Option<DiscoverySettings>,
    stopped: bool,
}

impl<E> fmt::Debug for Connection<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("connected", &self.shared.connected.load(Ordering::Relaxed))
            .field("discovery", &self.discovery)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl<E: Send + 'static> Connection<E> {
    /// Apply TLS, credentials, will and reconnect bound to `transport`, in
    /// that order. Birth and discovery settings are kept for publish time.
    pub fn new(
        config: &BaseConfig,
        mut transport: Box<dyn Transport>,
        events: EventSender<E>,
    ) -> Result<Self, ConfigurationError> {
        if config.tls {
            info!("enabling TLS");
            if config.tls_insecure {
                warn!("--tls-insecure is not supported, certificates are always verified");
            }
            transport
                .set_tls(load_tls_material(config)?)
                .map_err(ConfigurationError::Tls)?;
        }

        if let Some(username) = &config.username {
            let password = resolve_password(config)?;
            transport.set_credentials(username, password.as_deref());
        }

        let birth = match &config.birth_topic {
            Some(topic) => Some(stored_message(
                topic,
                config.birth_payload.as_deref(),
                config.birth_qos,
                config.birth_retain,
            )?),
            None => None,
        };

        if let Some(topic) = &config.will_topic {
            info!("enabling will message on MQTT broker");
            transport.set_will(stored_message(
                topic,
                config.will_payload.as_deref(),
                config.will_qos,
                config.will_retain,
            )?);
        }

        if let Some(delay) = config.max_reconnect_delay() {
            transport.set_max_reconnect_delay(delay);
        }

        let discovery = config.mqtt_discovery.then(|| {
            DiscoverySettings::new(
                config.mqtt_discovery_topic.clone(),
                config.mqtt_discovery_object_id.clone(),
            )
        });

        Ok(Self {
            transport,
            shared: Arc::new(ConnectionShared {
                connected: AtomicBool::new(false),
                birth,
                events,
            }),
            discovery,
            stopped: false,
        })
    }

    /// Register the callbacks, connect, then start the network task
    pub async fn connect(
        &mut self,
        host: &str,
        port: u16,
        keepalive: Duration,
    ) -> Result<(), TransportError> {
        info!("connecting to MQTT broker {}:{}", host, port);
        let callbacks: Arc<dyn ConnectionCallbacks> = self.shared.clone();
        self.transport
            .connect(host, port, keepalive, callbacks)
            .await?;
        self.transport.loop_start()
    }

    /// True between a successful connect callback and the next disconnect
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Relaxed)
    }

    pub fn discovery(&self) -> Option<&DiscoverySettings> {
        self.discovery.as_ref()
    }

    /// Publish a message; failures are logged and reported as `false`
    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>, qos: QoS, retain: bool) -> bool {
        let payload = payload.into();
        debug!(
            topic,
            qos = qos as u8,
            retain,
            "publishing msg: {}",
            String::from_utf8_lossy(&payload)
        );
        match self.transport.publish(topic, payload, qos, retain) {
            Ok(()) => true,
            Err(e) => {
                error!(topic, "could not publish to MQTT broker: {}", e);
                false
            }
        }
    }

    /// Publish discovery configs for `entities`. Returns the number published.
    pub fn publish_discovery(&self, device: &Value, entities: Vec<DiscoveryEntity>) -> usize {
        let Some(settings) = &self.discovery else {
            return 0;
        };

        let messages = match settings.build_messages(device, entities) {
            Ok(messages) => messages,
            Err(e) => {
                error!("cannot serialize MQTT discovery config: {}", e);
                return 0;
            }
        };

        info!(count = messages.len(), "publishing MQTT discovery config");
        messages
            .into_iter()
            .filter(|message| {
                self.publish(&message.topic, message.payload.clone(), message.qos, message.retain)
            })
            .count()
    }

    /// Stop the transport's network task. Idempotent.
    pub async fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        info!("shutting down MQTT client");
        self.transport.loop_stop().await;
    }
}

/// Explicit password wins; otherwise read the password file, if any
fn resolve_password(config: &BaseConfig) -> Result<Option<String>, ConfigurationError> {
    if let Some(password) = &config.password {
        return Ok(Some(password.clone()));
    }
    config
        .password_file
        .as_ref()
        .map(|path| {
            std::fs::read_to_string(path)
                .map(|content| content.trim_end().to_string())
                .map_err(|source| ConfigurationError::PasswordFile {
                    path: path.display().to_string(),
                    source,
                })
        })
        .transpose()
}

fn load_tls_material(config: &BaseConfig) -> Result<TlsMaterial, ConfigurationError> {
    let ca = config.ca_certs.as_deref().map(read_tls_file).transpose()?;
    let client_auth = match (&config.certfile, &config.keyfile) {
        (Some(cert), Some(key)) => Some((read_tls_file(cert)?, read_tls_file(key)?)),
        _ => None,
    };
    Ok(TlsMaterial { ca, client_auth })
}

fn read_tls_file(path: &Path) -> Result<Vec<u8>, ConfigurationError> {
    std::fs::read(path).map_err(|source| ConfigurationError::TlsFile {
        path: path.display().to_string(),
        source,
    })
}

fn stored_message(
    topic: &str,
    payload: Option<&str>,
    qos: u8,
    retain: bool,
) -> Result<StoredMessage, ConfigurationError> {
    Ok(StoredMessage {
        topic: topic.to_string(),
        payload: payload.unwrap_or_default().as_bytes().to_vec(),
        qos: rumqttc::qos(qos).map_err(|_| ConfigurationError::InvalidQos(qos))?,
        retain,
    })
}

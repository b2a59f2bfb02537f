//! Pure connection configuration for the rumqttc transport
//!
//! This module turns the settings collected by the transport setters into
//! `MqttOptions`, and holds the reconnect backoff policy.

use crate::transport::{StoredMessage, TlsMaterial, TransportError};
use rumqttc::{LastWill, MqttOptions, TlsConfiguration, Transport as RumqttcTransport};
use std::time::Duration;

/// Settings accumulated before `connect`
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub client_id: String,
    pub clean_session: bool,
    pub tls: Option<TlsMaterial>,
    pub credentials: Option<(String, Option<String>)>,
    pub will: Option<StoredMessage>,
}

impl TransportSettings {
    pub fn new(client_id: impl Into<String>, clean_session: bool) -> Self {
        Self {
            client_id: client_id.into(),
            clean_session,
            tls: None,
            credentials: None,
            will: None,
        }
    }
}

/// Reconnect backoff owned by the network task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt
    pub min_delay: Duration,
    /// Ceiling for the doubling backoff
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(120),
        }
    }
}

impl ReconnectPolicy {
    /// Backoff before reconnect attempt `attempt` (1-based): doubles from
    /// `min_delay`, capped at `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self
            .min_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay);
        delay.min(self.max_delay)
    }
}

/// Build rumqttc options from the accumulated settings
pub fn configure_mqtt_options(
    settings: &TransportSettings,
    host: &str,
    port: u16,
    keepalive: Duration,
) -> Result<MqttOptions, TransportError> {
    let mut options = MqttOptions::new(settings.client_id.clone(), host, port);
    options.set_keep_alive(keepalive);
    options.set_clean_session(settings.clean_session);

    if let Some(tls) = &settings.tls {
        options.set_transport(tls_transport(tls)?);
    }

    if let Some((username, password)) = &settings.credentials {
        // An empty password leaves the CONNECT password flag unset
        options.set_credentials(username.clone(), password.clone().unwrap_or_default());
    }

    if let Some(will) = &settings.will {
        options.set_last_will(LastWill::new(
            will.topic.clone(),
            will.payload.clone(),
            will.qos,
            will.retain,
        ));
    }

    Ok(options)
}

fn tls_transport(tls: &TlsMaterial) -> Result<RumqttcTransport, TransportError> {
    match (&tls.ca, &tls.client_auth) {
        (Some(ca), client_auth) => Ok(RumqttcTransport::tls_with_config(
            TlsConfiguration::Simple {
                ca: ca.clone(),
                alpn: None,
                client_auth: client_auth.clone(),
            },
        )),
        (None, None) => Ok(RumqttcTransport::tls_with_default_config()),
        (None, Some(_)) => Err(TransportError::Tls(
            "a client certificate requires a CA certificate".to_string(),
        )),
    }
}

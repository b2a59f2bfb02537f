//! Error taxonomy for the control loop
//!
//! Startup failures (`Config`, `Configuration`, `Connection`) abort before the
//! loop runs; `ConnectTimeout` and `Event` terminate a running loop. Publish
//! failures never appear here: they are logged and reported as `false`.

use crate::config::ConfigError;
use crate::transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// Error type returned by application hooks
pub type AppError = Box<dyn std::error::Error + Send + Sync>;

/// Invalid TLS, credential or will setup detected while building the connection
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("cannot read password file {path}")]
    PasswordFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot read TLS file {path}")]
    TlsFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TLS setup")]
    Tls(#[source] TransportError),
    #[error("invalid QoS {0}")]
    InvalidQos(u8),
}

/// Main error type for agent startup and the main loop
#[derive(Debug, Error)]
pub enum MqttBaseError {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    #[error("invalid connection setup")]
    Configuration(#[from] ConfigurationError),

    #[error("cannot start MQTT connection")]
    Connection(#[source] TransportError),

    #[error("connection to MQTT broker timed out after {}s", .timeout.as_secs())]
    ConnectTimeout { timeout: Duration },

    #[error("application setup failed")]
    Setup(#[source] AppError),

    #[error("event handler failed on {event}")]
    Event {
        event: &'static str,
        #[source]
        source: AppError,
    },
}

/// Result type for agent operations
pub type MqttBaseResult<T> = Result<T, MqttBaseError>;

/// Render an error with its full `source()` chain, outermost first
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_timeout_display() {
        let error = MqttBaseError::ConnectTimeout {
            timeout: Duration::from_secs(10),
        };
        assert_eq!(
            error.to_string(),
            "connection to MQTT broker timed out after 10s"
        );
    }

    #[test]
    fn test_error_chain_includes_sources() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "No such file");
        let error = MqttBaseError::from(ConfigurationError::PasswordFile {
            path: "/run/secrets/mqtt".to_string(),
            source: io,
        });

        let chain = error_chain(&error);
        assert!(chain.contains("cannot read password file /run/secrets/mqtt"));
        assert!(chain.ends_with("No such file"));
    }

    #[test]
    fn test_event_error_names_event() {
        let error = MqttBaseError::Event {
            event: "RefreshEvent",
            source: "sensor offline".into(),
        };
        assert_eq!(error.to_string(), "event handler failed on RefreshEvent");
        assert_eq!(
            error_chain(&error),
            "event handler failed on RefreshEvent: sensor offline"
        );
    }
}

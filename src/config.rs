//! Configuration for MQTT publishing agents
//!
//! [`BaseConfig`] is both a TOML-loadable serde structure and a clap argument
//! group, so applications can `#[command(flatten)]` it into their own CLI or
//! ship a config file. Defaults follow the broker conventions: port 1883
//! (8883 with TLS), 65 second keepalive, 10 second initial connect timeout.

use clap::{ArgAction, Args};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MQTT_HOST: &str = "localhost";
pub const DEFAULT_MQTT_PORT: u16 = 1883;
pub const DEFAULT_MQTT_PORT_TLS: u16 = 8883;
pub const DEFAULT_KEEPALIVE_SECS: u64 = 65;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_DISCOVERY_PREFIX: &str = "homeassistant";
pub const DEFAULT_DISCOVERY_OBJECT_ID: &str = "object";

/// Connection, publishing and runtime settings shared by all agents
#[derive(Clone, Serialize, Deserialize, PartialEq, Args)]
#[serde(default)]
pub struct BaseConfig {
    /// Hostname for the MQTT broker
    #[arg(short = 'H', long, default_value = DEFAULT_MQTT_HOST)]
    pub host: String,

    /// Port for the MQTT broker [default: 1883, or 8883 with --tls]
    #[arg(short = 'P', long)]
    pub port: Option<u16>,

    /// Timeout in seconds for the initial connection to the MQTT broker
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS)]
    pub connect_timeout: u64,

    /// Maximum broker reconnect delay in seconds (0 keeps the transport default)
    #[arg(long, default_value_t = 0)]
    pub max_reconnect_delay: u64,

    /// Username to authenticate with the MQTT broker
    #[arg(short, long)]
    pub username: Option<String>,

    /// Password to authenticate with the MQTT broker
    #[arg(short, long, env = "MQTT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Path to file to read the password from
    #[arg(long)]
    pub password_file: Option<PathBuf>,

    /// Client ID to use when connecting to the MQTT broker
    #[arg(short, long)]
    pub client_id: Option<String>,

    /// Passing the flag disables the clean session, so the broker resumes the
    /// previous session for this client id
    #[arg(short = 'C', long = "clean-session", action = ArgAction::SetFalse)]
    pub clean_session: bool,

    /// MQTT topic for published messages
    #[arg(short, long, default_value = "")]
    pub topic: String,

    /// MQTT QoS for published messages
    #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub qos: u8,

    /// Set MQTT retain flag for published messages
    #[arg(short = 'R', long)]
    pub retain: bool,

    /// Keepalive interval in seconds for the MQTT client
    #[arg(long, default_value_t = DEFAULT_KEEPALIVE_SECS)]
    pub keepalive: u64,

    /// Enable SSL/TLS support
    #[arg(long)]
    pub tls: bool,

    /// Disable certificate verification (not supported, accepted for compatibility)
    #[arg(long)]
    pub tls_insecure: bool,

    /// Path to the Certificate Authority certificate files to be treated as trusted
    #[arg(long)]
    pub ca_certs: Option<PathBuf>,

    /// Path to the PEM encoded client certificate
    #[arg(long)]
    pub certfile: Option<PathBuf>,

    /// Path to the PEM encoded client private key
    #[arg(long)]
    pub keyfile: Option<PathBuf>,

    /// Topic of the birth message published after every successful connect
    #[arg(long)]
    pub birth_topic: Option<String>,

    /// Payload of the birth message
    #[arg(long)]
    pub birth_payload: Option<String>,

    /// QoS of the birth message
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub birth_qos: u8,

    /// Set retain flag for the birth message
    #[arg(long)]
    pub birth_retain: bool,

    /// Topic of the will message published by the broker on unclean disconnect
    #[arg(long)]
    pub will_topic: Option<String>,

    /// Payload of the will message
    #[arg(long)]
    pub will_payload: Option<String>,

    /// QoS of the will message
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub will_qos: u8,

    /// Set retain flag for the will message
    #[arg(long)]
    pub will_retain: bool,

    /// Interval in seconds for republishing current content
    #[arg(long, default_value_t = DEFAULT_REFRESH_INTERVAL_SECS)]
    pub refresh_interval: u64,

    /// Enable sending of Home Assistant MQTT discovery config
    #[arg(long)]
    pub mqtt_discovery: bool,

    /// Topic prefix for Home Assistant discovery messages
    #[arg(long, default_value = DEFAULT_DISCOVERY_PREFIX)]
    pub mqtt_discovery_topic: String,

    /// Object ID for MQTT discovery
    #[arg(long, default_value = DEFAULT_DISCOVERY_OBJECT_ID)]
    pub mqtt_discovery_object_id: String,

    /// Increase log verbosity (-d info, -dd debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub debug: u8,

    /// File to log messages to
    #[arg(long)]
    pub logfile: Option<PathBuf>,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_MQTT_HOST.to_string(),
            port: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            max_reconnect_delay: 0,
            username: None,
            password: None,
            password_file: None,
            client_id: None,
            clean_session: true,
            topic: String::new(),
            qos: 0,
            retain: false,
            keepalive: DEFAULT_KEEPALIVE_SECS,
            tls: false,
            tls_insecure: false,
            ca_certs: None,
            certfile: None,
            keyfile: None,
            birth_topic: None,
            birth_payload: None,
            birth_qos: 0,
            birth_retain: false,
            will_topic: None,
            will_payload: None,
            will_qos: 0,
            will_retain: false,
            refresh_interval: DEFAULT_REFRESH_INTERVAL_SECS,
            mqtt_discovery: false,
            mqtt_discovery_topic: DEFAULT_DISCOVERY_PREFIX.to_string(),
            mqtt_discovery_object_id: DEFAULT_DISCOVERY_OBJECT_ID.to_string(),
            debug: 0,
            logfile: None,
        }
    }
}

impl std::fmt::Debug for BaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseConfig")
            .field("host", &self.host)
            .field("port", &self.port())
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("password_file", &self.password_file)
            .field("topic", &self.topic)
            .field("qos", &self.qos)
            .field("retain", &self.retain)
            .field("tls", &self.tls)
            .field("birth_topic", &self.birth_topic)
            .field("will_topic", &self.will_topic)
            .field("mqtt_discovery", &self.mqtt_discovery)
            .field("connect_timeout", &self.connect_timeout)
            .field("refresh_interval", &self.refresh_interval)
            .finish_non_exhaustive()
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BaseConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: BaseConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and option combinations
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("connect_timeout", self.connect_timeout),
            ("keepalive", self.keepalive),
            ("refresh_interval", self.refresh_interval),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(invalid(format!("{name} must be a positive integer")));
            }
        }

        if self.port == Some(0) {
            return Err(invalid("port must be a positive integer"));
        }

        for (name, qos) in [
            ("qos", self.qos),
            ("birth_qos", self.birth_qos),
            ("will_qos", self.will_qos),
        ] {
            if qos > 2 {
                return Err(invalid(format!("{name} must be 0, 1 or 2, got {qos}")));
            }
        }

        if self.topic.trim().is_empty() {
            return Err(invalid("topic is required"));
        }

        if self.certfile.is_some() != self.keyfile.is_some() {
            return Err(invalid("certfile and keyfile must be given together"));
        }

        Ok(())
    }

    /// Broker port, defaulting by TLS mode
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(if self.tls {
            DEFAULT_MQTT_PORT_TLS
        } else {
            DEFAULT_MQTT_PORT
        })
    }

    /// Configured client id, or a freshly generated one
    pub fn resolve_client_id(&self) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| format!("mqtt-base-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval)
    }

    /// Upper bound for reconnect backoff, if configured
    pub fn max_reconnect_delay(&self) -> Option<Duration> {
        (self.max_reconnect_delay > 0).then(|| Duration::from_secs(self.max_reconnect_delay))
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            topic: "test/state".to_string(),
            ..Self::default()
        }
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidConfig(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        base: BaseConfig,
    }

    #[test]
    fn test_full_toml_config() {
        let toml_content = r#"
host = "broker.example.com"
port = 1884
username = "agent"
password = "hunter2"
topic = "home/sensor/state"
qos = 1
retain = true
tls = true
birth_topic = "home/sensor/status"
birth_payload = "online"
will_topic = "home/sensor/status"
will_payload = "offline"
will_retain = true
refresh_interval = 30
mqtt_discovery = true
mqtt_discovery_object_id = "sensor1"
"#;

        let config: BaseConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.host, "broker.example.com");
        assert_eq!(config.port(), 1884);
        assert_eq!(config.qos, 1);
        assert!(config.retain);
        assert_eq!(config.birth_payload.as_deref(), Some("online"));
        assert!(config.will_retain);
        assert_eq!(config.refresh_interval(), Duration::from_secs(30));
        assert_eq!(config.mqtt_discovery_topic, DEFAULT_DISCOVERY_PREFIX);
        assert_eq!(config.mqtt_discovery_object_id, "sensor1");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_minimal_toml_config_defaults() {
        let config: BaseConfig = toml::from_str(r#"topic = "a/b""#).unwrap();

        assert_eq!(config.host, "localhost");
        assert_eq!(config.port(), DEFAULT_MQTT_PORT);
        assert_eq!(config.keepalive(), Duration::from_secs(65));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert!(config.clean_session);
        assert_eq!(config.max_reconnect_delay(), None);
    }

    #[test]
    fn test_tls_changes_default_port() {
        let config = BaseConfig {
            tls: true,
            ..BaseConfig::test_config()
        };
        assert_eq!(config.port(), DEFAULT_MQTT_PORT_TLS);

        let explicit = BaseConfig {
            tls: true,
            port: Some(9999),
            ..BaseConfig::test_config()
        };
        assert_eq!(explicit.port(), 9999);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases = [
            BaseConfig {
                topic: String::new(),
                ..BaseConfig::test_config()
            },
            BaseConfig {
                refresh_interval: 0,
                ..BaseConfig::test_config()
            },
            BaseConfig {
                connect_timeout: 0,
                ..BaseConfig::test_config()
            },
            BaseConfig {
                will_qos: 3,
                ..BaseConfig::test_config()
            },
            BaseConfig {
                port: Some(0),
                ..BaseConfig::test_config()
            },
            BaseConfig {
                certfile: Some(PathBuf::from("client.crt")),
                ..BaseConfig::test_config()
            },
        ];

        for config in cases {
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidConfig(_))),
                "expected rejection for {config:?}"
            );
        }
    }

    #[test]
    fn test_generated_client_id_is_unique() {
        let config = BaseConfig::test_config();
        let first = config.resolve_client_id();
        let second = config.resolve_client_id();

        assert!(first.starts_with("mqtt-base-"));
        assert_ne!(first, second);

        let named = BaseConfig {
            client_id: Some("sensor".to_string()),
            ..BaseConfig::test_config()
        };
        assert_eq!(named.resolve_client_id(), "sensor");
    }

    #[test]
    fn test_debug_output_redacts_password() {
        let config = BaseConfig {
            password: Some("hunter2".to_string()),
            ..BaseConfig::test_config()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn test_cli_arguments() {
        let cli = TestCli::parse_from([
            "agent",
            "-t",
            "x/y",
            "-H",
            "broker",
            "-q",
            "2",
            "-R",
            "-C",
            "--tls",
            "-dd",
        ]);

        assert_eq!(cli.base.topic, "x/y");
        assert_eq!(cli.base.host, "broker");
        assert_eq!(cli.base.qos, 2);
        assert!(cli.base.retain);
        assert!(!cli.base.clean_session);
        assert_eq!(cli.base.port(), DEFAULT_MQTT_PORT_TLS);
        assert_eq!(cli.base.debug, 2);
    }

    #[test]
    fn test_clean_session_long_flag_disables_clean_session() {
        let cli = TestCli::parse_from(["test", "-t", "x/y", "--clean-session"]);
        assert!(!cli.base.clean_session);

        let cli = TestCli::parse_from(["test", "-t", "x/y"]);
        assert!(cli.base.clean_session);
    }

    #[test]
    fn test_cli_rejects_out_of_range_qos() {
        let result = TestCli::try_parse_from(["agent", "-t", "x", "-q", "3"]);
        assert!(result.is_err());
    }
}

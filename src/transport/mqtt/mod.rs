//! rumqttc-backed MQTT transport
//!
//! The module separates pure functions from I/O operations:
//!
//! - [`connection`] - Pure option building and reconnect backoff policy
//! - [`message_handler`] - Pure routing of poll results to lifecycle decisions
//! - [`client`] - Impure I/O: connect, background network task, publishing
//!
//! # Usage
//!
//! ```rust,no_run
//! # tokio_test::block_on(async {
//! use mqtt_base::event::{ConnectFlags, ConnectReturnCode};
//! use mqtt_base::transport::mqtt::RumqttTransport;
//! use mqtt_base::transport::{ConnectionCallbacks, Publisher, Transport};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct Log;
//!
//! impl ConnectionCallbacks for Log {
//!     fn on_connect(&self, _: &dyn Publisher, _: ConnectFlags, code: ConnectReturnCode) {
//!         println!("connect: {code}");
//!     }
//!     fn on_disconnect(&self, reason: Option<&str>) {
//!         println!("disconnect: {reason:?}");
//!     }
//! }
//!
//! let mut transport = RumqttTransport::new("my-agent", true);
//! transport.set_credentials("user", Some("secret"));
//! transport.set_max_reconnect_delay(Duration::from_secs(30));
//! transport
//!     .connect("localhost", 1883, Duration::from_secs(65), Arc::new(Log))
//!     .await?;
//! transport.loop_start()?;
//! # Ok::<(), mqtt_base::transport::TransportError>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::{RumqttPublisher, RumqttTransport};
pub use connection::{configure_mqtt_options, ReconnectPolicy, TransportSettings};
pub use message_handler::{EventRoute, MessageHandler};

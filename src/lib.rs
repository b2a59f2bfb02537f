//! mqtt-base - event-driven core for MQTT publishing agents
//!
//! A long-running agent publishes periodic or event-triggered data to an
//! MQTT broker. This crate owns the hard part: reconciling asynchronous
//! broker connection callbacks, a periodic refresh and an initial connect
//! timeout into one ordered stream of application callbacks.
//!
//! # Overview
//!
//! - [`event`] - event taxonomy and the queue between the network task and the loop
//! - [`transport`] - transport boundary and the rumqttc-backed implementation
//! - [`connection`] - TLS, credentials, will, birth and discovery around a transport
//! - [`app`] - the application trait, the main loop and process lifecycle
//! - [`config`] - TOML and command line configuration
//! - [`observability`] - tracing subscriber setup
//!
//! # Quick Start
//!
//! ```rust
//! use mqtt_base::{Event, EventQueue};
//!
//! let queue: EventQueue<&str> = EventQueue::new();
//! let sender = queue.sender();
//! sender.send("file changed");
//! sender.send("file removed");
//!
//! assert!(queue.check());
//! assert_eq!(queue.pop(), Some(Event::App("file changed")));
//! assert_eq!(queue.pop(), Some(Event::App("file removed")));
//! assert_eq!(queue.pop(), None);
//! ```

pub mod app;
pub mod config;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod event;
pub mod observability;
pub mod testing;
pub mod transport;

pub use app::{run_app, AppContext, MqttApp, ShutdownHandle};
pub use config::{BaseConfig, ConfigError};
pub use connection::Connection;
pub use discovery::{DiscoveryEntity, DiscoverySettings};
pub use error::{AppError, MqttBaseError, MqttBaseResult};
pub use event::{ConnectEvent, ConnectFlags, ConnectReturnCode, Event, EventQueue, EventSender};
pub use transport::QoS;

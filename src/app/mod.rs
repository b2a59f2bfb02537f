//! Application boundary
//!
//! An agent implements [`MqttApp`] and hands itself to [`run_app`]. The
//! runner owns the connection and the event queue and calls back into the
//! app from a single task:
//!
//! 1. `setup` once, before connecting
//! 2. `handle_event` for every connect result, application event and refresh
//! 3. `shutdown` once, on every exit path
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use mqtt_base::app::{run_app, AppContext, MqttApp};
//! use mqtt_base::error::AppError;
//! use mqtt_base::{BaseConfig, Event};
//!
//! struct Uptime;
//!
//! #[async_trait]
//! impl MqttApp for Uptime {
//!     type Event = ();
//!
//!     async fn handle_event(
//!         &mut self,
//!         event: Event<()>,
//!         ctx: &AppContext<'_, ()>,
//!     ) -> Result<(), AppError> {
//!         if matches!(event, Event::Refresh) {
//!             ctx.publish_default("still here");
//!         }
//!         Ok(())
//!     }
//! }
//!
//! # async fn example(config: BaseConfig) {
//! std::process::exit(run_app(Uptime, config).await);
//! # }
//! ```

pub mod lifecycle;
pub mod scheduler;

pub use lifecycle::{run_app, AppRunner, ShutdownHandle, EXIT_FAILURE, EXIT_SUCCESS};
pub use scheduler::Scheduler;

use crate::config::BaseConfig;
use crate::connection::Connection;
use crate::discovery::DiscoveryEntity;
use crate::error::AppError;
use crate::event::{Event, EventSender};
use crate::transport::QoS;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::info;

/// A long-running agent driven by the main loop
#[async_trait]
pub trait MqttApp: Send {
    /// Application-defined events, enqueued through [`AppContext::events`]
    type Event: Send + fmt::Debug + 'static;

    /// Called once before the broker connection is started
    async fn setup(&mut self, _ctx: &AppContext<'_, Self::Event>) -> Result<(), AppError> {
        Ok(())
    }

    /// Handle one event. An error terminates the loop with exit code 255.
    async fn handle_event(
        &mut self,
        event: Event<Self::Event>,
        ctx: &AppContext<'_, Self::Event>,
    ) -> Result<(), AppError>;

    /// Wait interval for the next iteration; queried after every iteration
    fn refresh_interval(&self, configured: Duration) -> Duration {
        configured
    }

    /// Device block merged into every discovery config
    fn mqtt_device_config(&self) -> Value {
        Value::Null
    }

    /// Entities announced once after the first successful connect
    fn mqtt_discovery_config(&self, _device: &Value) -> Vec<DiscoveryEntity> {
        Vec::new()
    }

    /// Called once on every exit path, before the connection is stopped
    async fn shutdown(&mut self) {
        info!("shutting down application");
    }
}

/// What an application can reach while handling events
pub struct AppContext<'a, E> {
    connection: &'a Connection<E>,
    config: &'a BaseConfig,
    events: EventSender<E>,
    shutdown: ShutdownHandle,
}

impl<'a, E: Send + 'static> AppContext<'a, E> {
    pub(crate) fn new(
        connection: &'a Connection<E>,
        config: &'a BaseConfig,
        events: EventSender<E>,
        shutdown: ShutdownHandle,
    ) -> Self {
        Self {
            connection,
            config,
            events,
            shutdown,
        }
    }

    /// Publish a message; `false` if the transport rejected it
    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>, qos: QoS, retain: bool) -> bool {
        self.connection.publish(topic, payload, qos, retain)
    }

    /// Publish to the configured topic with the configured QoS and retain flag
    pub fn publish_default(&self, payload: impl Into<Vec<u8>>) -> bool {
        let qos = rumqttc::qos(self.config.qos).unwrap_or(QoS::AtMostOnce);
        self.connection
            .publish(&self.config.topic, payload, qos, self.config.retain)
    }

    /// Producer handle for application-defined events
    pub fn events(&self) -> &EventSender<E> {
        &self.events
    }

    pub fn config(&self) -> &BaseConfig {
        self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Request a clean exit with `code` at the next loop boundary
    pub fn exit(&self, code: i32) {
        self.shutdown.exit(code);
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub(crate) fn discovery_enabled(&self) -> bool {
        self.connection.discovery().is_some()
    }

    pub(crate) fn publish_discovery(&self, device: &Value, entities: Vec<DiscoveryEntity>) -> usize {
        self.connection.publish_discovery(device, entities)
    }
}

//! Impure I/O operations for the rumqttc transport
//!
//! This module owns the rumqttc client and event loop, checks that the broker
//! socket is reachable, and runs the background network task. That task sends
//! CONNECT, waits for CONNACK, reports connection changes to the registered
//! callbacks and backs off between reconnects.

use super::connection::{configure_mqtt_options, ReconnectPolicy, TransportSettings};
use super::message_handler::{EventRoute, MessageHandler};
use crate::event::{ConnectFlags, ConnectReturnCode};
use crate::transport::{
    ConnectionCallbacks, Publisher, StoredMessage, TlsMaterial, Transport, TransportError,
};
use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, Outgoing, QoS};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Capacity of the rumqttc request channel; a full channel fails publishes
const REQUEST_CHANNEL_CAPACITY: usize = 64;
const DISCONNECT_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);
/// Bound for the socket reachability check in `connect`
const SOCKET_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Event loop prepared by `connect` and not yet handed to the network task
struct PendingLoop {
    event_loop: EventLoop,
    callbacks: Arc<dyn ConnectionCallbacks>,
}

/// MQTT transport backed by rumqttc
pub struct RumqttTransport {
    settings: TransportSettings,
    reconnect: ReconnectPolicy,
    client: Option<AsyncClient>,
    // EventLoop is Send but not Sync; the mutex keeps the transport Sync
    pending: Mutex<Option<PendingLoop>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    event_loop_handle: Option<JoinHandle<()>>,
}

impl RumqttTransport {
    pub fn new(client_id: impl Into<String>, clean_session: bool) -> Self {
        Self {
            settings: TransportSettings::new(client_id, clean_session),
            reconnect: ReconnectPolicy::default(),
            client: None,
            pending: Mutex::new(None),
            shutdown_tx: None,
            event_loop_handle: None,
        }
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    pub fn reconnect_policy(&self) -> &ReconnectPolicy {
        &self.reconnect
    }

    fn pending_slot(&mut self) -> &mut Option<PendingLoop> {
        self.pending
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Perform interruptible sleep with shutdown monitoring
    /// Returns true if sleep completed, false if shutdown requested
    async fn interruptible_sleep(shutdown_rx: &mut watch::Receiver<bool>, delay: Duration) -> bool {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Shutdown signal received during reconnection delay, stopping");
                    return false;
                }
                true
            }
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Open and drop a TCP connection to prove the broker socket is reachable
    async fn check_socket(host: &str, port: u16) -> Result<(), TransportError> {
        match tokio::time::timeout(SOCKET_CONNECT_TIMEOUT, TcpStream::connect((host, port))).await
        {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(TransportError::Connect(Box::new(e))),
            Err(elapsed) => Err(TransportError::Connect(Box::new(elapsed))),
        }
    }

    /// Background network task: poll, report, back off, repeat.
    ///
    /// Each handshake attempt is bounded by rumqttc's network timeout. A failed
    /// attempt backs off and retries, so how long to wait for the first
    /// CONNACK is left to the caller.
    async fn run_event_loop(
        mut event_loop: EventLoop,
        publisher: RumqttPublisher,
        callbacks: Arc<dyn ConnectionCallbacks>,
        reconnect: ReconnectPolicy,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut connected = false;
        let mut attempts = 0u32;

        loop {
            let result: Result<Event, ConnectionError> = tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        if connected {
                            Self::flush_disconnect(&mut event_loop).await;
                        }
                        break;
                    }
                    continue;
                }
                result = event_loop.poll() => result,
            };

            match MessageHandler::route_poll_result(&result) {
                EventRoute::ConnectionAcknowledged { flags } => {
                    connected = true;
                    attempts = 0;
                    callbacks.on_connect(&publisher, flags, ConnectReturnCode::Accepted);
                }
                EventRoute::ConnectionRefused { code } => {
                    callbacks.on_connect(&publisher, ConnectFlags::default(), code);
                    attempts += 1;
                    if !Self::back_off(&reconnect, attempts, &mut shutdown_rx).await {
                        break;
                    }
                }
                EventRoute::Disconnected => {
                    if std::mem::take(&mut connected) {
                        callbacks.on_disconnect(Some("broker closed the connection"));
                    }
                }
                EventRoute::NetworkError(reason) => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if std::mem::take(&mut connected) {
                        callbacks.on_disconnect(Some(&reason));
                    } else {
                        debug!(target: "mqtt_transport", "reconnect attempt failed: {}", reason);
                    }
                    attempts += 1;
                    if !Self::back_off(&reconnect, attempts, &mut shutdown_rx).await {
                        break;
                    }
                }
                EventRoute::InfrastructureEvent(event) => {
                    debug!(target: "mqtt_transport", "MQTT event: {}", event);
                }
                EventRoute::OutgoingEvent => {}
            }
        }

        if connected {
            callbacks.on_disconnect(None);
        }
        info!("MQTT network loop stopped");
    }

    /// Poll until the queued DISCONNECT is written, so the broker drops the will
    async fn flush_disconnect(event_loop: &mut EventLoop) {
        let flushed = tokio::time::timeout(DISCONNECT_FLUSH_TIMEOUT, async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;
        if flushed.is_err() {
            warn!("DISCONNECT not sent before shutdown");
        }
    }

    async fn back_off(
        reconnect: &ReconnectPolicy,
        attempt: u32,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> bool {
        let delay = reconnect.delay_for(attempt);
        info!(
            attempt,
            delay_secs = delay.as_secs_f64(),
            "reconnecting to MQTT broker after delay"
        );
        Self::interruptible_sleep(shutdown_rx, delay).await
    }
}

/// Publishing handle shared with the network task
#[derive(Clone)]
pub struct RumqttPublisher {
    client: AsyncClient,
}

impl Publisher for RumqttPublisher {
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), TransportError> {
        self.client
            .try_publish(topic, qos, retain, payload)
            .map_err(|e| TransportError::Publish(e.to_string()))
    }
}

impl Publisher for RumqttTransport {
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), TransportError> {
        let client = self.client.as_ref().ok_or(TransportError::NotConnected)?;
        RumqttPublisher {
            client: client.clone(),
        }
        .publish(topic, payload, qos, retain)
    }
}

#[async_trait]
impl Transport for RumqttTransport {
    fn set_tls(&mut self, tls: TlsMaterial) -> Result<(), TransportError> {
        if tls.ca.is_none() && tls.client_auth.is_some() {
            return Err(TransportError::Tls(
                "a client certificate requires a CA certificate".to_string(),
            ));
        }
        self.settings.tls = Some(tls);
        Ok(())
    }

    fn set_credentials(&mut self, username: &str, password: Option<&str>) {
        self.settings.credentials = Some((username.to_string(), password.map(str::to_string)));
    }

    fn set_will(&mut self, will: StoredMessage) {
        self.settings.will = Some(will);
    }

    fn set_max_reconnect_delay(&mut self, delay: Duration) {
        self.reconnect.max_delay = delay.max(self.reconnect.min_delay);
    }

    async fn connect(
        &mut self,
        host: &str,
        port: u16,
        keepalive: Duration,
        callbacks: Arc<dyn ConnectionCallbacks>,
    ) -> Result<(), TransportError> {
        if self.client.is_some() {
            return Err(TransportError::AlreadyStarted);
        }

        let options = configure_mqtt_options(&self.settings, host, port, keepalive)?;

        if let Err(e) = Self::check_socket(host, port).await {
            error!("connection to MQTT broker {}:{} failed: {}", host, port, e);
            return Err(e);
        }
        debug!("MQTT broker {}:{} is reachable", host, port);

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        self.client = Some(client);
        *self.pending_slot() = Some(PendingLoop {
            event_loop,
            callbacks,
        });
        Ok(())
    }

    fn loop_start(&mut self) -> Result<(), TransportError> {
        let pending = self
            .pending_slot()
            .take()
            .ok_or(TransportError::AlreadyStarted)?;
        let client = self.client.clone().ok_or(TransportError::NotConnected)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);

        let handle = tokio::spawn(Self::run_event_loop(
            pending.event_loop,
            RumqttPublisher { client },
            pending.callbacks,
            self.reconnect.clone(),
            shutdown_rx,
        ));
        self.event_loop_handle = Some(handle);
        debug!("MQTT network loop started");
        Ok(())
    }

    async fn loop_stop(&mut self) {
        if self.event_loop_handle.is_some() {
            if let Some(client) = &self.client {
                if let Err(e) = client.try_disconnect() {
                    debug!("disconnect request not queued: {}", e);
                }
            }
        }

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }

        if let Some(handle) = self.event_loop_handle.take() {
            match tokio::time::timeout(Duration::from_secs(2), handle).await {
                Ok(Ok(())) => info!("MQTT network loop shut down gracefully"),
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!("MQTT network loop ended with error: {}", e)
                }
                Err(_) => warn!("MQTT network loop didn't shut down gracefully, aborting"),
                _ => {}
            }
        }
        self.pending_slot().take();
    }
}

impl Drop for RumqttTransport {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
    }
}

//! Mock implementations for testing
//!
//! Provides a mock [`Transport`] that records setup calls and publishes, and
//! lets tests drive connect and disconnect callbacks the way the network task
//! of a real transport would.

use crate::event::{ConnectFlags, ConnectReturnCode};
use crate::transport::{
    ConnectionCallbacks, Publisher, QoS, StoredMessage, TlsMaterial, Transport, TransportError,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct MockState {
    published: Vec<StoredMessage>,
    setup_calls: Vec<&'static str>,
    tls: Option<TlsMaterial>,
    credentials: Option<(String, Option<String>)>,
    will: Option<StoredMessage>,
    max_reconnect_delay: Option<Duration>,
    connected_to: Option<(String, u16, Duration)>,
    loop_started: bool,
    loop_stop_count: usize,
    auto_connect: Vec<ConnectReturnCode>,
}

/// Mock transport for testing
///
/// Clones share state, so a test keeps one handle while the connection
/// wrapper owns another.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    callbacks: Arc<Mutex<Option<Arc<dyn ConnectionCallbacks>>>>,
    fail_connect: Arc<AtomicBool>,
    reject_publishes: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `codes` as connect callbacks from a spawned task once the
    /// network loop is started
    pub fn with_auto_connect(codes: Vec<ConnectReturnCode>) -> Self {
        let mock = Self::new();
        mock.state().auto_connect = codes;
        mock
    }

    /// Make the initial `connect` call fail
    pub fn fail_connect(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }

    /// Make every later publish fail
    pub fn reject_publishes(&self) {
        self.reject_publishes.store(true, Ordering::SeqCst);
    }

    /// Invoke the registered connect callback, as the network task would
    pub fn fire_connect(&self, code: ConnectReturnCode) {
        if let Some(callbacks) = self.registered_callbacks() {
            callbacks.on_connect(self, ConnectFlags::default(), code);
        }
    }

    /// Invoke the registered disconnect callback
    pub fn fire_disconnect(&self, reason: Option<&str>) {
        if let Some(callbacks) = self.registered_callbacks() {
            callbacks.on_disconnect(reason);
        }
    }

    pub fn get_published_messages(&self) -> Vec<StoredMessage> {
        self.state().published.clone()
    }

    pub fn published_topics(&self) -> Vec<String> {
        self.state()
            .published
            .iter()
            .map(|message| message.topic.clone())
            .collect()
    }

    /// Names of the setup setters in call order
    pub fn setup_calls(&self) -> Vec<&'static str> {
        self.state().setup_calls.clone()
    }

    pub fn tls(&self) -> Option<TlsMaterial> {
        self.state().tls.clone()
    }

    pub fn credentials(&self) -> Option<(String, Option<String>)> {
        self.state().credentials.clone()
    }

    pub fn will(&self) -> Option<StoredMessage> {
        self.state().will.clone()
    }

    pub fn max_reconnect_delay(&self) -> Option<Duration> {
        self.state().max_reconnect_delay
    }

    /// Host, port and keepalive of the last `connect` call
    pub fn connected_to(&self) -> Option<(String, u16, Duration)> {
        self.state().connected_to.clone()
    }

    pub fn loop_started(&self) -> bool {
        self.state().loop_started
    }

    pub fn loop_stop_count(&self) -> usize {
        self.state().loop_stop_count
    }

    pub fn clear_history(&self) {
        self.state().published.clear();
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn registered_callbacks(&self) -> Option<Arc<dyn ConnectionCallbacks>> {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Publisher for MockTransport {
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), TransportError> {
        if self.reject_publishes.load(Ordering::SeqCst) {
            return Err(TransportError::Publish("Mock publish failure".to_string()));
        }

        self.state().published.push(StoredMessage {
            topic: topic.to_string(),
            payload,
            qos,
            retain,
        });
        Ok(())
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn set_tls(&mut self, tls: TlsMaterial) -> Result<(), TransportError> {
        let mut state = self.state();
        state.setup_calls.push("tls");
        state.tls = Some(tls);
        Ok(())
    }

    fn set_credentials(&mut self, username: &str, password: Option<&str>) {
        let mut state = self.state();
        state.setup_calls.push("credentials");
        state.credentials = Some((username.to_string(), password.map(str::to_string)));
    }

    fn set_will(&mut self, will: StoredMessage) {
        let mut state = self.state();
        state.setup_calls.push("will");
        state.will = Some(will);
    }

    fn set_max_reconnect_delay(&mut self, delay: Duration) {
        let mut state = self.state();
        state.setup_calls.push("max_reconnect_delay");
        state.max_reconnect_delay = Some(delay);
    }

    async fn connect(
        &mut self,
        host: &str,
        port: u16,
        keepalive: Duration,
        callbacks: Arc<dyn ConnectionCallbacks>,
    ) -> Result<(), TransportError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("Mock connection failure".into()));
        }

        self.state().connected_to = Some((host.to_string(), port, keepalive));
        *self.callbacks.lock().unwrap_or_else(PoisonError::into_inner) = Some(callbacks);
        Ok(())
    }

    fn loop_start(&mut self) -> Result<(), TransportError> {
        let codes = {
            let mut state = self.state();
            if state.loop_started {
                return Err(TransportError::AlreadyStarted);
            }
            state.loop_started = true;
            std::mem::take(&mut state.auto_connect)
        };

        if !codes.is_empty() {
            let mock = self.clone();
            tokio::spawn(async move {
                for code in codes {
                    tokio::task::yield_now().await;
                    mock.fire_connect(code);
                }
            });
        }
        Ok(())
    }

    async fn loop_stop(&mut self) {
        let mut state = self.state();
        state.loop_started = false;
        state.loop_stop_count += 1;
    }
}

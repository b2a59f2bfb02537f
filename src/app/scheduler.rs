//! Main loop state machine
//!
//! Each iteration waits on the event queue for the current interval, then
//! either drains everything queued, synthesizes a refresh when connected, or
//! fails with a connect timeout when the first connection never completed.

use super::{AppContext, MqttApp};
use crate::error::{MqttBaseError, MqttBaseResult};
use crate::event::{Event, EventQueue};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Loop state: whether a successful connect was observed, and how long to
/// wait next
#[derive(Debug)]
pub struct Scheduler {
    connected: bool,
    connect_timeout: Duration,
    sleep_interval: Duration,
}

impl Scheduler {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connected: false,
            connect_timeout,
            sleep_interval: connect_timeout,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn sleep_interval(&self) -> Duration {
        self.sleep_interval
    }

    /// Run until an exit is requested (returns its code) or a fatal error
    pub async fn run<A: MqttApp>(
        &mut self,
        app: &mut A,
        ctx: &AppContext<'_, A::Event>,
        queue: &EventQueue<A::Event>,
        mut exit_requests: watch::Receiver<Option<i32>>,
    ) -> MqttBaseResult<i32> {
        loop {
            if let Some(code) = *exit_requests.borrow() {
                info!(code, "exit requested");
                return Ok(code);
            }

            let exit_requested = tokio::select! {
                biased;
                Ok(()) = exit_requests.changed() => true,
                _ = queue.wait(self.sleep_interval) => false,
            };
            if exit_requested {
                continue;
            }

            self.step(app, ctx, queue).await?;
        }
    }

    /// One iteration after the wait: drain, refresh or time out
    pub async fn step<A: MqttApp>(
        &mut self,
        app: &mut A,
        ctx: &AppContext<'_, A::Event>,
        queue: &EventQueue<A::Event>,
    ) -> MqttBaseResult<()> {
        if queue.check() {
            while let Some(event) = queue.pop() {
                if event.is_successful_connect() && !self.connected {
                    self.connected = true;
                    publish_discovery(app, ctx);
                }
                dispatch(app, ctx, event).await?;
            }
        } else if self.connected {
            dispatch(app, ctx, Event::Refresh).await?;
        } else {
            return Err(MqttBaseError::ConnectTimeout {
                timeout: self.connect_timeout,
            });
        }

        self.sleep_interval = app.refresh_interval(ctx.config().refresh_interval());
        debug!(
            sleep_interval = self.sleep_interval.as_secs_f64(),
            "waiting for next event"
        );
        Ok(())
    }
}

fn publish_discovery<A: MqttApp>(app: &A, ctx: &AppContext<'_, A::Event>) {
    if ctx.discovery_enabled() {
        let device = app.mqtt_device_config();
        let entities = app.mqtt_discovery_config(&device);
        ctx.publish_discovery(&device, entities);
    }
}

async fn dispatch<A: MqttApp>(
    app: &mut A,
    ctx: &AppContext<'_, A::Event>,
    event: Event<A::Event>,
) -> MqttBaseResult<()> {
    let kind = event.kind();
    debug!(event = kind, "dispatching {:?}", event);
    app.handle_event(event, ctx)
        .await
        .map_err(|source| MqttBaseError::Event { event: kind, source })
}

//! Application lifecycle: startup, main loop and guaranteed shutdown

use super::{AppContext, MqttApp, Scheduler};
use crate::config::BaseConfig;
use crate::connection::Connection;
use crate::error::{error_chain, MqttBaseError, MqttBaseResult};
use crate::event::EventQueue;
use crate::transport::mqtt::RumqttTransport;
use crate::transport::Transport;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Exit code for a clean or interrupted shutdown
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for any startup failure or loop error
pub const EXIT_FAILURE: i32 = 255;

/// Cooperative exit request shared by signal handling and the application.
///
/// The first requested code wins; later requests are ignored.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    requests: Arc<watch::Sender<Option<i32>>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (requests, _) = watch::channel(None);
        Self {
            requests: Arc::new(requests),
        }
    }

    /// Ask the main loop to stop and exit with `code`
    pub fn exit(&self, code: i32) {
        self.requests.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(code);
                true
            } else {
                false
            }
        });
    }

    pub fn requested(&self) -> Option<i32> {
        *self.requests.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<i32>> {
        self.requests.subscribe()
    }
}

/// Owns an application, its connection and its event queue for one run
pub struct AppRunner<A: MqttApp> {
    app: A,
    config: BaseConfig,
    connection: Connection<A::Event>,
    queue: EventQueue<A::Event>,
    shutdown: ShutdownHandle,
    stopped: bool,
}

impl<A: MqttApp> AppRunner<A> {
    /// Validate `config` and prepare the connection on `transport`
    pub fn new(app: A, config: BaseConfig, transport: Box<dyn Transport>) -> MqttBaseResult<Self> {
        config.validate()?;
        let queue = EventQueue::new();
        let connection = Connection::new(&config, transport, queue.sender())?;

        Ok(Self {
            app,
            config,
            connection,
            queue,
            shutdown: ShutdownHandle::new(),
            stopped: false,
        })
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Run to completion and return the process exit code.
    ///
    /// The shutdown sequence runs on every path out of the loop.
    pub async fn run(mut self) -> i32 {
        let result = self.execute().await;
        self.shutdown().await;

        match result {
            Ok(code) => {
                info!(code, "application stopped");
                code
            }
            Err(e) => {
                error!("{}", error_chain(&e));
                EXIT_FAILURE
            }
        }
    }

    async fn execute(&mut self) -> MqttBaseResult<i32> {
        let Self {
            app,
            config,
            connection,
            queue,
            shutdown,
            ..
        } = self;
        let exit_requests = shutdown.subscribe();

        {
            let ctx = AppContext::new(&*connection, &*config, queue.sender(), shutdown.clone());
            app.setup(&ctx).await.map_err(MqttBaseError::Setup)?;
        }

        connection
            .connect(&config.host, config.port(), config.keepalive())
            .await
            .map_err(MqttBaseError::Connection)?;

        let ctx = AppContext::new(&*connection, &*config, queue.sender(), shutdown.clone());
        let mut scheduler = Scheduler::new(config.connect_timeout());
        scheduler.run(app, &ctx, queue, exit_requests).await
    }

    /// Stop the application, then the connection. Runs once.
    pub async fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        self.app.shutdown().await;
        self.connection.shutdown().await;
    }
}

/// Run `app` against the configured broker and return the exit code:
/// 0 on a clean or interrupted exit, 255 on any error, or the code the
/// application requested through [`ShutdownHandle::exit`].
pub async fn run_app<A: MqttApp>(app: A, config: BaseConfig) -> i32 {
    let transport = RumqttTransport::new(config.resolve_client_id(), config.clean_session);

    let runner = match AppRunner::new(app, config, Box::new(transport)) {
        Ok(runner) => runner,
        Err(e) => {
            error!("{}", error_chain(&e));
            return EXIT_FAILURE;
        }
    };

    let signals = spawn_signal_listener(runner.shutdown_handle());
    let code = runner.run().await;
    signals.abort();
    code
}

/// Translate SIGINT and SIGTERM into a clean exit request
fn spawn_signal_listener(shutdown: ShutdownHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (mut sigint, mut sigterm) = match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
            (Err(e), _) | (_, Err(e)) => {
                warn!("cannot install signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
        }
        shutdown.exit(EXIT_SUCCESS);
    })
}

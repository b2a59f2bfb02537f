//! Integration tests for the rumqttc transport against a local fake broker
//!
//! The broker is a plain TCP listener that answers CONNECT with a fixed
//! CONNACK (or stays silent) and records every byte a session sent, so the
//! tests can check the full runner path over a real socket:
//! - socket check on connect, MQTT handshake on the network task
//! - birth publish and connect events after CONNACK
//! - refused and unanswered handshakes
//! - DISCONNECT written on shutdown


use mqtt_base::app::{AppRunner, EXIT_FAILURE};
use mqtt_base::config::BaseConfig;
use mqtt_base::event::ConnectReturnCode;
use mqtt_base::transport::mqtt::RumqttTransport;
use std::time::Duration;
use test_helpers::{test_config, RecordingApp, Seen};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

const TEST_DEADLINE: Duration = Duration::from_secs(15);
const CONNECT_PACKET: u8 = 0x10;
const DISCONNECT_PACKET: [u8; 2] = [0xE0, 0x00];

#[derive(Debug, Clone, Copy)]
enum Reply {
    /// CONNACK with the given return code
    ConnAck(u8),
    /// Read CONNECT and never answer
    Silent,
}

struct FakeBroker {
    port: u16,
    sessions: mpsc::UnboundedReceiver<Vec<u8>>,
    accept_loop: JoinHandle<()>,
}

impl FakeBroker {
    async fn start(reply: Reply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, sessions) = mpsc::unbounded_channel();

        let accept_loop = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(Self::session(stream, reply, tx.clone()));
            }
        });

        Self {
            port,
            sessions,
            accept_loop,
        }
    }

    /// Serve one connection until the client closes it, then report its bytes.
    /// Connections that never sent anything (socket checks) are not reported.
    async fn session(mut stream: TcpStream, reply: Reply, tx: mpsc::UnboundedSender<Vec<u8>>) {
        let mut received = Vec::new();
        let mut answered = false;
        let mut buf = [0u8; 1024];

        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => received.extend_from_slice(&buf[..n]),
            }
            if !answered && received.first() == Some(&CONNECT_PACKET) {
                answered = true;
                if let Reply::ConnAck(code) = reply {
                    if stream.write_all(&[0x20, 0x02, 0x00, code]).await.is_err() {
                        break;
                    }
                }
            }
        }

        if !received.is_empty() {
            let _ = tx.send(received);
        }
    }

    fn config(&self) -> BaseConfig {
        BaseConfig {
            host: "127.0.0.1".to_string(),
            port: Some(self.port),
            ..test_config()
        }
    }

    async fn next_session(&mut self) -> Vec<u8> {
        timeout(Duration::from_secs(5), self.sessions.recv())
            .await
            .expect("session reported in time")
            .expect("broker still running")
    }
}

impl Drop for FakeBroker {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

fn runner(app: RecordingApp, config: BaseConfig) -> AppRunner<RecordingApp> {
    let transport = RumqttTransport::new(config.resolve_client_id(), config.clean_session);
    AppRunner::new(app, config, Box::new(transport)).expect("valid runner")
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[tokio::test]
async fn test_accepted_connect_publishes_birth_then_refreshes() {
    let mut broker = FakeBroker::start(Reply::ConnAck(0)).await;
    let mut app = RecordingApp::new();
    app.exit_after_refreshes = Some((1, 0));
    let records = app.records();
    let config = BaseConfig {
        refresh_interval: 1,
        birth_topic: Some("test/status".to_string()),
        birth_payload: Some("online".to_string()),
        ..broker.config()
    };

    let code = timeout(TEST_DEADLINE, runner(app, config).run())
        .await
        .expect("runner finished");

    assert_eq!(code, 0);
    let seen: Vec<Seen> = records.lock().unwrap().iter().map(|r| r.seen.clone()).collect();
    assert_eq!(
        seen,
        vec![Seen::Connect(ConnectReturnCode::Accepted), Seen::Refresh]
    );

    let session = broker.next_session().await;
    assert_eq!(session[0], CONNECT_PACKET);
    assert!(contains(&session, b"test-agent"), "CONNECT carries the client id");
    assert!(contains(&session, b"test/status"), "birth published");
    assert!(contains(&session, b"online"));
    assert!(
        contains(&session, &DISCONNECT_PACKET),
        "shutdown writes DISCONNECT so the will is dropped"
    );
}

#[tokio::test]
async fn test_refused_connack_is_reported_as_connect_event() {
    let mut broker = FakeBroker::start(Reply::ConnAck(5)).await;
    let app = RecordingApp::new();
    let records = app.records();
    let runner = runner(app, broker.config());
    let shutdown = runner.shutdown_handle();

    let watch_records = async {
        while records.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        shutdown.exit(0);
    };
    let (code, ()) = timeout(TEST_DEADLINE, async { tokio::join!(runner.run(), watch_records) })
        .await
        .expect("runner finished");

    assert_eq!(code, 0);
    let records = records.lock().unwrap();
    assert_eq!(
        records[0].seen,
        Seen::Connect(ConnectReturnCode::NotAuthorized)
    );
    assert!(
        records.iter().all(|r| r.seen != Seen::Refresh),
        "no refresh before a successful connect"
    );
    assert_eq!(broker.next_session().await[0], CONNECT_PACKET);
}

#[tokio::test]
async fn test_silent_broker_times_out_at_connect_timeout() {
    let mut broker = FakeBroker::start(Reply::Silent).await;
    let app = RecordingApp::new();
    let records = app.records();
    let config = BaseConfig {
        connect_timeout: 2,
        ..broker.config()
    };

    let started = Instant::now();
    let code = timeout(TEST_DEADLINE, runner(app, config).run())
        .await
        .expect("runner finished");
    let elapsed = started.elapsed();

    assert_eq!(code, EXIT_FAILURE);
    assert!(
        elapsed >= Duration::from_millis(1900) && elapsed < Duration::from_secs(4),
        "failed after {elapsed:?}, expected the 2s connect timeout"
    );
    assert!(records.lock().unwrap().is_empty());
    assert_eq!(broker.next_session().await[0], CONNECT_PACKET);
}

#[tokio::test]
async fn test_unreachable_broker_fails_before_the_loop() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let app = RecordingApp::new();
    let setup_calls = app.setup_calls.clone();
    let config = BaseConfig {
        host: "127.0.0.1".to_string(),
        port: Some(port),
        connect_timeout: 10,
        ..test_config()
    };

    let started = Instant::now();
    let code = timeout(TEST_DEADLINE, runner(app, config).run())
        .await
        .expect("runner finished");

    assert_eq!(code, EXIT_FAILURE);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(setup_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

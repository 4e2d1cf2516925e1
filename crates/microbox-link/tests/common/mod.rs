//! In-process fake MicroBox device for integration tests.
//!
//! Serves the poll endpoints, the command endpoints and the `/ws` push
//! endpoint on `127.0.0.1:0`, and records what the link sent.

#![allow(dead_code)]

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::Instant;

use microbox_link::LinkConfig;

pub const DATA_SERVER_BODY: &str = r#"{"status":200,
    "data_server":{"dht":{"temp":24.5,"hum":60},"soil_moisture":40,"watering_state":true},
    "data_relay":{"r1":{"id":"relay1","status":true}}}"#;

#[derive(Debug, Clone)]
enum PushAction {
    Text(String),
    Close,
}

pub struct DeviceState {
    poll_body: Mutex<String>,
    poll_status: AtomicU16,
    /// Number of upcoming polls that never answer.
    hang_polls: AtomicUsize,
    poll_hits: AtomicUsize,

    command_status: AtomicU16,
    command_delay_ms: AtomicU64,
    commands_received: Mutex<Vec<String>>,
    commands_answered: AtomicUsize,

    ws_connections: AtomicUsize,
    /// (connection index, text) of every message the link sent on `/ws`.
    ws_inbound: Mutex<Vec<(usize, String)>>,
    push_tx: broadcast::Sender<PushAction>,
}

pub struct FakeDevice {
    pub addr: SocketAddr,
    state: Arc<DeviceState>,
}

impl FakeDevice {
    pub async fn start() -> Self {
        let (push_tx, _) = broadcast::channel(64);
        let state = Arc::new(DeviceState {
            poll_body: Mutex::new(DATA_SERVER_BODY.to_string()),
            poll_status: AtomicU16::new(200),
            hang_polls: AtomicUsize::new(0),
            poll_hits: AtomicUsize::new(0),
            command_status: AtomicU16::new(200),
            command_delay_ms: AtomicU64::new(0),
            commands_received: Mutex::new(Vec::new()),
            commands_answered: AtomicUsize::new(0),
            ws_connections: AtomicUsize::new(0),
            ws_inbound: Mutex::new(Vec::new()),
            push_tx,
        });

        let app = Router::new()
            .route("/data-server", get(poll_handler))
            .route("/datetime", get(poll_handler))
            .route("/check", get(command_handler))
            .route("/auto-watering", get(command_handler))
            .route("/manual-watering", get(command_handler))
            .route("/ws", get(ws_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        FakeDevice { addr, state }
    }

    /// Link config pointed at this device with test-friendly timings.
    pub fn config(&self) -> LinkConfig {
        let mut config = LinkConfig::for_host(self.addr.to_string());
        config.poll.interval_ms = 100;
        config.push.reconnect_delay_ms = Some(100);
        config.push.connect_timeout_secs = 2;
        config.push.ping_interval_secs = 0;
        config
    }

    // -------------------------------------------------------------------------
    // Poll endpoint
    // -------------------------------------------------------------------------

    pub fn set_poll_body(&self, body: &str) {
        *self.state.poll_body.lock().unwrap() = body.to_string();
    }

    pub fn set_poll_status(&self, status: u16) {
        self.state.poll_status.store(status, Ordering::SeqCst);
    }

    pub fn hang_next_polls(&self, count: usize) {
        self.state.hang_polls.store(count, Ordering::SeqCst);
    }

    pub fn poll_hits(&self) -> usize {
        self.state.poll_hits.load(Ordering::SeqCst)
    }

    // -------------------------------------------------------------------------
    // Command endpoints
    // -------------------------------------------------------------------------

    pub fn set_command_status(&self, status: u16) {
        self.state.command_status.store(status, Ordering::SeqCst);
    }

    pub fn set_command_delay(&self, delay: Duration) {
        self.state
            .command_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Path and query of every command request received.
    pub fn commands(&self) -> Vec<String> {
        self.state.commands_received.lock().unwrap().clone()
    }

    pub fn commands_answered(&self) -> usize {
        self.state.commands_answered.load(Ordering::SeqCst)
    }

    // -------------------------------------------------------------------------
    // Push endpoint
    // -------------------------------------------------------------------------

    pub fn ws_connections(&self) -> usize {
        self.state.ws_connections.load(Ordering::SeqCst)
    }

    pub fn ws_inbound(&self) -> Vec<(usize, String)> {
        self.state.ws_inbound.lock().unwrap().clone()
    }

    /// Sends `text` to every open push connection.
    pub fn push(&self, text: &str) {
        let _ = self.state.push_tx.send(PushAction::Text(text.to_string()));
    }

    /// Closes every open push connection from the device side.
    pub fn close_push_connections(&self) {
        let _ = self.state.push_tx.send(PushAction::Close);
    }
}

async fn poll_handler(State(state): State<Arc<DeviceState>>) -> (StatusCode, String) {
    state.poll_hits.fetch_add(1, Ordering::SeqCst);

    let hang = state
        .hang_polls
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if hang {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }

    let status = StatusCode::from_u16(state.poll_status.load(Ordering::SeqCst)).unwrap();
    let body = state.poll_body.lock().unwrap().clone();
    (status, body)
}

async fn command_handler(State(state): State<Arc<DeviceState>>, uri: Uri) -> StatusCode {
    state.commands_received.lock().unwrap().push(uri.to_string());

    let delay = state.command_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    state.commands_answered.fetch_add(1, Ordering::SeqCst);
    StatusCode::from_u16(state.command_status.load(Ordering::SeqCst)).unwrap()
}

async fn ws_handler(State(state): State<Arc<DeviceState>>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<DeviceState>) {
    let index = state.ws_connections.fetch_add(1, Ordering::SeqCst);
    let mut actions = state.push_tx.subscribe();

    loop {
        tokio::select! {
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    state.ws_inbound.lock().unwrap().push((index, text.as_str().to_string()));
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            action = actions.recv() => match action {
                Ok(PushAction::Text(text)) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Ok(PushAction::Close) => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

/// Polls `condition` every 10 ms until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

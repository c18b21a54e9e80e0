//! Mock execution engine for integration tests.
//!
//! Speaks the framed envelope protocol: answers heartbeats with
//! heartbeat replies, answers status requests with a configurable
//! payload, and records every SIGNAL envelope it receives.

use parking_lot::Mutex;
use relay_proto::{codec, decode, Envelope, MessageType};
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

pub struct MockEngine {
    addr: String,
    connections: Arc<AtomicU32>,
    signals: Arc<Mutex<Vec<Envelope>>>,
    status_payload: Arc<Mutex<Value>>,
    shutdown: CancellationToken,
}

impl MockEngine {
    /// Bind a listener on an ephemeral port and start accepting.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let connections = Arc::new(AtomicU32::new(0));
        let signals = Arc::new(Mutex::new(Vec::new()));
        let status_payload = Arc::new(Mutex::new(Value::Null));
        let shutdown = CancellationToken::new();

        {
            let connections = Arc::clone(&connections);
            let signals = Arc::clone(&signals);
            let status_payload = Arc::clone(&status_payload);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        () = shutdown.cancelled() => return,
                        accepted = listener.accept() => {
                            let Ok((socket, _)) = accepted else { return };
                            connections.fetch_add(1, Ordering::SeqCst);
                            tokio::spawn(handle_connection(
                                socket,
                                Arc::clone(&signals),
                                Arc::clone(&status_payload),
                                shutdown.clone(),
                            ));
                        }
                    }
                }
            });
        }

        Self {
            addr,
            connections,
            signals,
            status_payload,
            shutdown,
        }
    }

    /// `host:port` of the listener.
    pub fn endpoint(&self) -> String {
        self.addr.clone()
    }

    /// Connections accepted so far.
    pub fn connection_count(&self) -> u32 {
        self.connections.load(Ordering::SeqCst)
    }

    /// SIGNAL envelopes received so far.
    pub fn received_signals(&self) -> Vec<Envelope> {
        self.signals.lock().clone()
    }

    /// Payload returned for every STATUS_REQUEST.
    pub fn set_status_payload(&self, payload: Value) {
        *self.status_payload.lock() = payload;
    }

    /// Stop accepting and close all connection tasks.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    signals: Arc<Mutex<Vec<Envelope>>>,
    status_payload: Arc<Mutex<Value>>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            frame = decode(&mut socket) => {
                let Ok(envelope) = frame else { return };
                match envelope.kind {
                    MessageType::Heartbeat => {
                        let reply = Envelope::heartbeat_reply("mock-engine", &envelope);
                        if codec::write_frame(&mut socket, &reply).await.is_err() {
                            return;
                        }
                    }
                    MessageType::StatusRequest => {
                        let payload = status_payload.lock().clone();
                        let reply = Envelope::status_response("mock-engine", &envelope, payload);
                        if codec::write_frame(&mut socket, &reply).await.is_err() {
                            return;
                        }
                    }
                    MessageType::Signal => {
                        signals.lock().push(envelope);
                    }
                    MessageType::StatusResponse => {}
                }
            }
        }
    }
}

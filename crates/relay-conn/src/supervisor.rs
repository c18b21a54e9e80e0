//! Connection supervisor.
//!
//! Owns the TCP transport to the execution engine and exposes
//! `send`/`receive` under a state machine. Two loops run against the shared
//! state: the heartbeat loop (degrades the connection on missed replies)
//! and the reconnect loop (re-dials on a fixed interval until the attempt
//! budget is spent, then parks in the terminal FAILED state).

use crate::error::{ConnError, ConnResult};
use crate::heartbeat::HeartbeatMonitor;
use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};
use relay_proto::{codec, ConnectionError, Envelope, FrameCodec, FrameError, MessageType};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Slice used when polling the transport while waiting for a heartbeat
/// reply, so the wait stays responsive to shutdown and lock contention.
const HEARTBEAT_POLL_SLICE_MS: u64 = 250;

type Reader = FramedRead<OwnedReadHalf, FrameCodec>;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnState {
    Disconnected,
    Connecting,
    Connected,
    /// Transport is up but a heartbeat reply was missed.
    Degraded,
    Reconnecting,
    /// Terminal: reconnect budget spent. Only `reset()` re-arms.
    Failed,
}

impl std::fmt::Display for ConnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Connected => write!(f, "CONNECTED"),
            Self::Degraded => write!(f, "DEGRADED"),
            Self::Reconnecting => write!(f, "RECONNECTING"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Supervisor configuration. All timeouts are finite.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Execution engine endpoint, `host:port`.
    pub endpoint: String,
    /// Reconnect attempts before the terminal FAILED state.
    pub max_reconnect_attempts: u32,
    /// Reconnect loop period.
    pub retry_interval_ms: u64,
    /// Heartbeat loop period.
    pub heartbeat_interval_ms: u64,
    /// A heartbeat reply must arrive within this window.
    pub heartbeat_timeout_ms: u64,
    /// Handshake round-trip deadline during `connect()`.
    pub handshake_timeout_ms: u64,
    /// TCP connect deadline.
    pub connect_timeout_ms: u64,
    /// Source tag stamped on outgoing envelopes.
    pub source: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            max_reconnect_attempts: 5,
            retry_interval_ms: 5000,
            heartbeat_interval_ms: 30000,
            heartbeat_timeout_ms: 10000,
            handshake_timeout_ms: 5000,
            connect_timeout_ms: 5000,
            source: "relay-bridge".to_string(),
        }
    }
}

/// Snapshot of connection health for display layers.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub state: ConnState,
    pub attempt_count: u32,
    pub last_heartbeat_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Connection supervisor.
pub struct ConnectionSupervisor {
    config: SupervisorConfig,
    state: RwLock<ConnState>,
    attempt_count: AtomicU32,
    heartbeat: HeartbeatMonitor,
    /// Write half; single-writer discipline via this lock.
    writer: TokioMutex<Option<OwnedWriteHalf>>,
    /// Framed read half; single-reader discipline via this lock.
    reader: TokioMutex<Option<Reader>>,
    /// Envelopes pulled off the wire by the heartbeat loop while waiting
    /// for a reply; drained by `receive()` before touching the transport.
    pending: Mutex<VecDeque<Envelope>>,
    shutdown: CancellationToken,
}

impl ConnectionSupervisor {
    /// Create a new supervisor. No transport is opened until `connect()`.
    pub fn new(config: SupervisorConfig) -> Self {
        let heartbeat = HeartbeatMonitor::new(config.heartbeat_timeout_ms);
        Self {
            config,
            state: RwLock::new(ConnState::Disconnected),
            attempt_count: AtomicU32::new(0),
            heartbeat,
            writer: TokioMutex::new(None),
            reader: TokioMutex::new(None),
            pending: Mutex::new(VecDeque::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnState {
        *self.state.read()
    }

    fn set_state(&self, next: ConnState) {
        let mut guard = self.state.write();
        if *guard != next {
            debug!(from = %*guard, to = %next, "Connection state changed");
            *guard = next;
        }
    }

    /// Reconnect attempts consumed since the last successful connect.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count.load(Ordering::SeqCst)
    }

    /// Connection health snapshot for display layers.
    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            state: self.state(),
            attempt_count: self.attempt_count(),
            last_heartbeat_at: self.heartbeat.last_heartbeat_at(),
        }
    }

    /// Signal both loops to exit at their next iteration boundary.
    pub fn shutdown(&self) {
        info!("Connection supervisor shutdown requested");
        self.shutdown.cancel();
    }

    /// Re-arm a FAILED supervisor. No-op in any other state.
    pub fn reset(&self) {
        if self.state() == ConnState::Failed {
            info!("Supervisor reset; reconnection re-armed");
            self.attempt_count.store(0, Ordering::SeqCst);
            self.set_state(ConnState::Disconnected);
        }
    }

    /// Open the transport and perform one handshake round-trip.
    ///
    /// Success resets `attempt_count` and sets CONNECTED. Failure closes
    /// the socket and leaves DISCONNECTED; the reconnect loop, not this
    /// call, increments `attempt_count`.
    pub async fn connect(&self) -> ConnResult<()> {
        if self.state() == ConnState::Failed {
            return Err(ConnError::Failed);
        }

        self.set_state(ConnState::Connecting);
        match self.try_connect().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.set_state(ConnState::Disconnected);
                Err(e)
            }
        }
    }

    async fn try_connect(&self) -> ConnResult<()> {
        info!(endpoint = %self.config.endpoint, "Connecting to execution engine");

        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(&self.config.endpoint))
            .await
            .map_err(|_| {
                ConnError::ConnectFailed(format!(
                    "connect timed out after {}ms",
                    self.config.connect_timeout_ms
                ))
            })?
            .map_err(|e| ConnError::ConnectFailed(e.to_string()))?;

        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "Failed to set TCP_NODELAY");
        }

        let (read_half, write_half) = stream.into_split();
        let mut reader = FramedRead::new(read_half, FrameCodec);
        let mut writer = write_half;

        // Handshake: send one HEARTBEAT, any reply within the deadline.
        let ping = Envelope::heartbeat(&self.config.source);
        codec::write_frame(&mut writer, &ping).await?;

        let handshake_timeout = Duration::from_millis(self.config.handshake_timeout_ms);
        match tokio::time::timeout(handshake_timeout, reader.next()).await {
            Err(_) => {
                return Err(ConnError::HandshakeTimeout(self.config.handshake_timeout_ms));
            }
            Ok(None) => return Err(ConnError::Connection(ConnectionError::PeerClosed)),
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(Some(Ok(reply))) => {
                debug!(kind = %reply.kind, "Handshake reply received");
            }
        }

        *self.reader.lock().await = Some(reader);
        *self.writer.lock().await = Some(writer);
        self.pending.lock().clear();
        self.heartbeat.reset();
        self.heartbeat.record_reply();
        self.attempt_count.store(0, Ordering::SeqCst);
        self.set_state(ConnState::Connected);
        info!("Connected to execution engine");
        Ok(())
    }

    /// Close the transport and return to DISCONNECTED.
    pub async fn disconnect(&self) {
        self.drop_transport().await;
        self.set_state(ConnState::Disconnected);
        info!("Disconnected from execution engine");
    }

    async fn drop_transport(&self) {
        *self.writer.lock().await = None;
        *self.reader.lock().await = None;
    }

    /// Send one envelope. Permitted only in CONNECTED; any other state
    /// fails immediately without waiting for reconnection.
    pub async fn send(&self, envelope: &Envelope) -> ConnResult<()> {
        let state = self.state();
        if state != ConnState::Connected {
            return Err(ConnError::NotConnected(state));
        }

        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(ConnError::NotConnected(self.state()));
        };

        match codec::write_frame(writer, envelope).await {
            Ok(()) => Ok(()),
            // Oversized/malformed outgoing frame: the connection is fine.
            Err(FrameError::Protocol(e)) => Err(e.into()),
            Err(FrameError::Connection(e)) => {
                *guard = None;
                drop(guard);
                *self.reader.lock().await = None;
                self.set_state(ConnState::Disconnected);
                error!(error = %e, "Transport write failed");
                Err(ConnError::Connection(e))
            }
        }
    }

    /// Receive one envelope, blocking up to `timeout`.
    ///
    /// Expiry returns `Ok(None)` so polling callers can spin without
    /// treating silence as an error. Heartbeat envelopes are recorded on
    /// the monitor and never surfaced. Transport failure sets DISCONNECTED
    /// and returns the error.
    pub async fn receive(&self, timeout: Duration) -> ConnResult<Option<Envelope>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(envelope) = self.pending.lock().pop_front() {
                return Ok(Some(envelope));
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            match self.poll_transport(remaining).await? {
                Some(envelope) => return Ok(Some(envelope)),
                None => {}
            }
        }
    }

    /// Read one frame with a deadline. `Ok(None)` means the deadline
    /// passed or a heartbeat was consumed internally.
    async fn poll_transport(&self, timeout: Duration) -> ConnResult<Option<Envelope>> {
        match tokio::time::timeout(timeout, self.read_next()).await {
            Ok(result) => result,
            Err(_) => Ok(None),
        }
    }

    async fn read_next(&self) -> ConnResult<Option<Envelope>> {
        let mut guard = self.reader.lock().await;
        let Some(reader) = guard.as_mut() else {
            return Err(ConnError::NotConnected(self.state()));
        };

        match reader.next().await {
            Some(Ok(envelope)) => {
                self.heartbeat.record_message();
                if envelope.kind == MessageType::Heartbeat {
                    self.heartbeat.record_reply();
                    return Ok(None);
                }
                Ok(Some(envelope))
            }
            // Malformed frame: surface it, keep the connection.
            Some(Err(FrameError::Protocol(e))) => {
                warn!(error = %e, "Dropped malformed frame");
                Err(e.into())
            }
            Some(Err(FrameError::Connection(e))) => {
                *guard = None;
                drop(guard);
                *self.writer.lock().await = None;
                self.set_state(ConnState::Disconnected);
                error!(error = %e, "Transport read failed");
                Err(ConnError::Connection(e))
            }
            None => {
                *guard = None;
                drop(guard);
                *self.writer.lock().await = None;
                self.set_state(ConnState::Disconnected);
                warn!("Peer closed connection");
                Err(ConnError::Connection(ConnectionError::PeerClosed))
            }
        }
    }

    /// Spawn the heartbeat and reconnect loops.
    pub fn spawn_loops(self: &Arc<Self>) -> (JoinHandle<()>, JoinHandle<()>) {
        let heartbeat = {
            let sup = Arc::clone(self);
            tokio::spawn(async move { sup.heartbeat_loop().await })
        };
        let reconnect = {
            let sup = Arc::clone(self);
            tokio::spawn(async move { sup.reconnect_loop().await })
        };
        (heartbeat, reconnect)
    }

    async fn heartbeat_loop(&self) {
        let interval = Duration::from_millis(self.config.heartbeat_interval_ms);
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    info!("Heartbeat loop exiting");
                    return;
                }
                () = tokio::time::sleep(interval) => {}
            }

            if self.state() != ConnState::Connected {
                continue;
            }

            let ping = Envelope::heartbeat(&self.config.source);
            if let Err(e) = self.send(&ping).await {
                warn!(error = %e, "Heartbeat send failed");
                continue;
            }
            self.heartbeat.record_ping();

            let replied = self.await_heartbeat_reply().await;
            if !replied && self.state() == ConnState::Connected {
                // Transport stays up; the reconnect loop decides whether
                // to replace it.
                warn!("Heartbeat reply missed; connection DEGRADED");
                self.set_state(ConnState::Degraded);
            }
        }
    }

    /// Wait up to the response timeout for the outstanding ping to be
    /// answered, pulling frames off the transport when no other reader
    /// is. Non-heartbeat envelopes read here are buffered for `receive()`.
    async fn await_heartbeat_reply(&self) -> bool {
        let deadline = tokio::time::Instant::now()
            + Duration::from_millis(self.config.heartbeat_timeout_ms);
        loop {
            if !self.heartbeat.awaiting_reply() {
                return true;
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return false;
            }

            let slice = remaining.min(Duration::from_millis(HEARTBEAT_POLL_SLICE_MS));
            match self.poll_transport(slice).await {
                Ok(Some(envelope)) => self.pending.lock().push_back(envelope),
                Ok(None) => {}
                Err(_) => return false,
            }
        }
    }

    async fn reconnect_loop(&self) {
        let interval = Duration::from_millis(self.config.retry_interval_ms);
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    info!("Reconnect loop exiting");
                    return;
                }
                () = tokio::time::sleep(interval) => {}
            }

            let state = self.state();
            if matches!(
                state,
                ConnState::Connected | ConnState::Connecting | ConnState::Failed
            ) {
                continue;
            }

            let attempts = self.attempt_count.load(Ordering::SeqCst);
            if attempts >= self.config.max_reconnect_attempts {
                error!(
                    attempts,
                    max = self.config.max_reconnect_attempts,
                    "Reconnect budget exhausted; supervisor FAILED"
                );
                self.set_state(ConnState::Failed);
                continue;
            }

            let attempt = self.attempt_count.fetch_add(1, Ordering::SeqCst) + 1;
            self.set_state(ConnState::Reconnecting);
            info!(attempt, max = self.config.max_reconnect_attempts, "Reconnecting");

            match self.connect().await {
                Ok(()) => info!("Reconnected to execution engine"),
                Err(e) => warn!(error = %e, attempt, "Reconnect attempt failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_proto::decode;
    use tokio::net::TcpListener;

    /// Minimal engine stand-in: answers every inbound frame that is a
    /// heartbeat with a heartbeat reply, then keeps the socket open.
    async fn spawn_heartbeat_engine() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    loop {
                        let Ok(envelope) = decode(&mut socket).await else {
                            return;
                        };
                        if envelope.kind == MessageType::Heartbeat {
                            let reply = Envelope::heartbeat_reply("mock-engine", &envelope);
                            if codec::write_frame(&mut socket, &reply).await.is_err() {
                                return;
                            }
                        }
                    }
                });
            }
        });

        addr
    }

    fn config_for(endpoint: String) -> SupervisorConfig {
        SupervisorConfig {
            endpoint,
            max_reconnect_attempts: 3,
            retry_interval_ms: 30,
            heartbeat_interval_ms: 10_000,
            heartbeat_timeout_ms: 500,
            handshake_timeout_ms: 1000,
            connect_timeout_ms: 1000,
            source: "test-bridge".to_string(),
        }
    }

    #[tokio::test]
    async fn test_connect_handshake_success() {
        let endpoint = spawn_heartbeat_engine().await;
        let sup = ConnectionSupervisor::new(config_for(endpoint));

        sup.connect().await.unwrap();
        assert_eq!(sup.state(), ConnState::Connected);
        assert_eq!(sup.attempt_count(), 0);
        assert!(sup.connection_info().last_heartbeat_at.is_some());
    }

    #[tokio::test]
    async fn test_send_fails_immediately_when_disconnected() {
        let sup = ConnectionSupervisor::new(config_for("127.0.0.1:9".to_string()));

        let envelope = Envelope::status_request("test-bridge");
        match sup.send(&envelope).await {
            Err(ConnError::NotConnected(state)) => assert_eq!(state, ConnState::Disconnected),
            other => panic!("expected NotConnected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_receive_timeout_returns_no_message() {
        let endpoint = spawn_heartbeat_engine().await;
        let sup = ConnectionSupervisor::new(config_for(endpoint));
        sup.connect().await.unwrap();

        let started = tokio::time::Instant::now();
        let result = sup.receive(Duration::from_millis(200)).await.unwrap();
        let elapsed = started.elapsed();

        assert!(result.is_none(), "silence must be Ok(None), not an error");
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(1000));
        assert_eq!(sup.state(), ConnState::Connected);
    }

    #[tokio::test]
    async fn test_receive_surfaces_data_and_swallows_heartbeats() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // Handshake reply, then an unsolicited heartbeat, then data.
            let hello = decode(&mut socket).await.unwrap();
            let reply = Envelope::heartbeat_reply("mock-engine", &hello);
            codec::write_frame(&mut socket, &reply).await.unwrap();
            let ping = Envelope::heartbeat("mock-engine");
            codec::write_frame(&mut socket, &ping).await.unwrap();
            let status = Envelope::status_request("mock-engine");
            codec::write_frame(&mut socket, &status).await.unwrap();
            // Hold the socket open until the test finishes.
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let sup = ConnectionSupervisor::new(config_for(endpoint));
        sup.connect().await.unwrap();

        let envelope = sup
            .receive(Duration::from_millis(1000))
            .await
            .unwrap()
            .expect("data frame expected");
        assert_eq!(envelope.kind, MessageType::StatusRequest);
    }

    #[tokio::test]
    async fn test_reconnect_exhaustion_reaches_failed_and_stops() {
        // Bind then drop to reserve an address with no listener behind it.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        drop(listener);

        let sup = Arc::new(ConnectionSupervisor::new(config_for(endpoint)));
        let (hb, rc) = sup.spawn_loops();

        let failed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if sup.state() == ConnState::Failed {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(failed.is_ok(), "supervisor should reach FAILED");
        assert_eq!(sup.attempt_count(), 3);

        // No fourth automatic attempt while FAILED.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(sup.attempt_count(), 3);
        assert_eq!(sup.state(), ConnState::Failed);

        // connect() refuses until an explicit reset.
        match sup.connect().await {
            Err(ConnError::Failed) => {}
            other => panic!("expected Failed, got {:?}", other),
        }

        sup.reset();
        assert_eq!(sup.state(), ConnState::Disconnected);
        assert_eq!(sup.attempt_count(), 0);

        sup.shutdown();
        let _ = hb.await;
        let _ = rc.await;
    }

    #[tokio::test]
    async fn test_missed_heartbeat_degrades_without_teardown() {
        // Engine that answers the handshake but never the later pings.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let hello = decode(&mut socket).await.unwrap();
            let reply = Envelope::heartbeat_reply("mock-engine", &hello);
            codec::write_frame(&mut socket, &reply).await.unwrap();
            // Swallow everything else without replying.
            loop {
                if decode(&mut socket).await.is_err() {
                    return;
                }
            }
        });

        let mut config = config_for(endpoint);
        config.heartbeat_interval_ms = 50;
        config.heartbeat_timeout_ms = 100;
        // Keep the reconnect loop quiet so DEGRADED is observable.
        config.retry_interval_ms = 60_000;

        let sup = Arc::new(ConnectionSupervisor::new(config));
        sup.connect().await.unwrap();
        let (hb, rc) = sup.spawn_loops();

        let degraded = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if sup.state() == ConnState::Degraded {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(degraded.is_ok(), "missed heartbeat should degrade");
        // A degraded period is not a reconnect attempt.
        assert_eq!(sup.attempt_count(), 0);

        sup.shutdown();
        let _ = hb.await;
        let _ = rc.await;
    }
}

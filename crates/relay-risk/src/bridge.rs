//! Trading bridge trait: close-all-positions command path.
//!
//! The governor must be able to flatten the account even when the main
//! process is deadlocked, so the wire implementation opens its own
//! short-lived framed connection to the execution engine.

use crate::error::{RiskError, RiskResult};
use crate::BoxFuture;
use relay_proto::{codec, Envelope};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Issues position-closure commands to the execution engine.
pub trait TradingBridge: Send + Sync {
    /// Request closure of all open positions.
    fn close_all_positions(&self) -> BoxFuture<'_, RiskResult<()>>;
}

/// Sends the close-all command over a dedicated framed TCP connection.
pub struct WireTradingBridge {
    endpoint: String,
    source: String,
    timeout_ms: u64,
}

impl WireTradingBridge {
    pub fn new(endpoint: impl Into<String>, source: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            endpoint: endpoint.into(),
            source: source.into(),
            timeout_ms,
        }
    }

    async fn send_close_all(&self) -> RiskResult<()> {
        let timeout = Duration::from_millis(self.timeout_ms);

        let mut stream = tokio::time::timeout(timeout, TcpStream::connect(&self.endpoint))
            .await
            .map_err(|_| RiskError::BridgeFailed("connect timed out".to_string()))?
            .map_err(|e| RiskError::BridgeFailed(e.to_string()))?;

        let command = Envelope::signal(
            &self.source,
            serde_json::json!({ "command": "close_all_positions" }),
        );
        codec::write_frame(&mut stream, &command)
            .await
            .map_err(|e| RiskError::BridgeFailed(e.to_string()))?;
        debug!(endpoint = %self.endpoint, "Close-all command sent");

        // The engine acknowledges with any envelope; silence is a failure
        // worth logging by the shutdown step.
        let ack = tokio::time::timeout(timeout, codec::decode(&mut stream))
            .await
            .map_err(|_| RiskError::BridgeFailed("close-all ack timed out".to_string()))?
            .map_err(|e| RiskError::BridgeFailed(e.to_string()))?;

        info!(ack_kind = %ack.kind, "Close-all acknowledged");
        Ok(())
    }
}

impl TradingBridge for WireTradingBridge {
    fn close_all_positions(&self) -> BoxFuture<'_, RiskResult<()>> {
        Box::pin(self.send_close_all())
    }
}

/// Counting mock for tests.
#[derive(Debug, Default)]
pub struct MockTradingBridge {
    calls: AtomicU32,
    fail: AtomicBool,
}

impl MockTradingBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent calls fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of close-all calls observed.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TradingBridge for MockTradingBridge {
    fn close_all_positions(&self) -> BoxFuture<'_, RiskResult<()>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(RiskError::BridgeFailed("mock failure".to_string()));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_proto::{decode, MessageType};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_wire_bridge_sends_close_all_and_reads_ack() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();

        let engine = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let command = decode(&mut socket).await.unwrap();
            assert_eq!(command.kind, MessageType::Signal);
            assert_eq!(command.payload["command"], "close_all_positions");

            let ack = Envelope::status_response(
                "mock-engine",
                &command,
                serde_json::json!({ "closed": 3 }),
            );
            codec::write_frame(&mut socket, &ack).await.unwrap();
        });

        let bridge = WireTradingBridge::new(endpoint, "riskd", 1000);
        bridge.close_all_positions().await.unwrap();
        engine.await.unwrap();
    }

    #[tokio::test]
    async fn test_wire_bridge_unreachable_engine_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        drop(listener);

        let bridge = WireTradingBridge::new(endpoint, "riskd", 200);
        match bridge.close_all_positions().await {
            Err(RiskError::BridgeFailed(_)) => {}
            other => panic!("expected BridgeFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mock_bridge_counts_calls() {
        let bridge = MockTradingBridge::new();
        bridge.close_all_positions().await.unwrap();
        bridge.close_all_positions().await.unwrap();
        assert_eq!(bridge.call_count(), 2);
    }
}

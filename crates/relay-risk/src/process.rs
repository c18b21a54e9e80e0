//! Governor child-process handle.
//!
//! The governor runs in its own address space so a hang or crash in the
//! main process cannot prevent risk evaluation. The only channels across
//! the boundary are the start/stop signal handled here and the durable
//! marker/metrics files.

use crate::error::{RiskError, RiskResult};
use std::time::Duration;
use sysinfo::{Pid, Signal, System};
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// Handle to a spawned `riskd` process.
pub struct GovernorProcess {
    child: Child,
}

impl GovernorProcess {
    /// Spawn the governor binary with the given config file.
    pub fn spawn(riskd_path: &str, config_path: &str) -> RiskResult<Self> {
        let child = Command::new(riskd_path)
            .arg("--config")
            .arg(config_path)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RiskError::Process(format!("spawn {}: {}", riskd_path, e)))?;

        info!(pid = ?child.id(), riskd = riskd_path, "Risk governor process started");
        Ok(Self { child })
    }

    /// OS pid of the governor, if still running.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Stop the governor: cooperative SIGTERM first (the loop exits at
    /// its next iteration boundary), then a bounded wait, then SIGKILL.
    pub async fn stop(mut self, grace: Duration) -> RiskResult<()> {
        if let Some(pid) = self.child.id() {
            let mut sys = System::new();
            sys.refresh_processes();
            match sys.process(Pid::from_u32(pid)) {
                Some(process) => {
                    if process.kill_with(Signal::Term).is_none() {
                        warn!(pid, "SIGTERM unsupported on this platform; will force kill");
                    }
                }
                None => info!(pid, "Risk governor already exited"),
            }
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!(%status, "Risk governor exited");
                Ok(())
            }
            Ok(Err(e)) => Err(RiskError::Process(e.to_string())),
            Err(_) => {
                warn!(grace_ms = grace.as_millis() as u64, "Risk governor did not exit in time; force killing");
                self.child
                    .kill()
                    .await
                    .map_err(|e| RiskError::Process(e.to_string()))?;
                Ok(())
            }
        }
    }
}

//! Auxiliary worker termination.
//!
//! Trading workers advertise themselves through `<name>.pid` files in a
//! configured directory. During emergency shutdown the reaper kills each
//! advertised process and removes the stale pid file.

use std::path::PathBuf;
use sysinfo::{Pid, System};
use tracing::{info, warn};

/// Terminates auxiliary worker processes advertised via pid files.
#[derive(Debug, Clone)]
pub struct WorkerReaper {
    pid_dir: PathBuf,
}

impl WorkerReaper {
    pub fn new(pid_dir: impl Into<PathBuf>) -> Self {
        Self {
            pid_dir: pid_dir.into(),
        }
    }

    /// Parse the pids currently advertised. Unreadable entries are
    /// skipped with a warning.
    pub fn advertised_pids(&self) -> Vec<u32> {
        let Ok(entries) = std::fs::read_dir(&self.pid_dir) else {
            return Vec::new();
        };

        let mut pids = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "pid") {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(content) => match content.trim().parse::<u32>() {
                    Ok(pid) => pids.push(pid),
                    Err(_) => warn!(path = %path.display(), "Unparseable pid file"),
                },
                Err(e) => warn!(path = %path.display(), error = %e, "Unreadable pid file"),
            }
        }
        pids
    }

    /// Kill every advertised worker still running, then remove all pid
    /// files. Returns the number of processes terminated.
    pub fn terminate_all(&self) -> usize {
        let pids = self.advertised_pids();
        if pids.is_empty() {
            return 0;
        }

        let mut sys = System::new();
        sys.refresh_processes();

        let mut terminated = 0;
        for pid in &pids {
            match sys.process(Pid::from_u32(*pid)) {
                Some(process) => {
                    if process.kill() {
                        info!(pid, "Terminated auxiliary worker");
                        terminated += 1;
                    } else {
                        warn!(pid, "Failed to terminate auxiliary worker");
                    }
                }
                None => info!(pid, "Auxiliary worker already gone"),
            }
        }

        self.remove_pid_files();
        terminated
    }

    fn remove_pid_files(&self) {
        let Ok(entries) = std::fs::read_dir(&self.pid_dir) else {
            return;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "pid") {
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "Failed to remove pid file");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_dir_is_empty() {
        let reaper = WorkerReaper::new("/nonexistent/pids");
        assert!(reaper.advertised_pids().is_empty());
        assert_eq!(reaper.terminate_all(), 0);
    }

    #[test]
    fn test_parses_only_pid_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("worker-a.pid"), "12345\n").unwrap();
        std::fs::write(dir.path().join("worker-b.pid"), "garbage").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "67890").unwrap();

        let reaper = WorkerReaper::new(dir.path());
        assert_eq!(reaper.advertised_pids(), vec![12345]);
    }

    #[test]
    fn test_terminate_removes_pid_files_for_dead_processes() {
        let dir = tempfile::tempdir().unwrap();
        // A pid that cannot exist keeps the test from killing anything real.
        std::fs::write(dir.path().join("worker.pid"), u32::MAX.to_string()).unwrap();

        let reaper = WorkerReaper::new(dir.path());
        assert_eq!(reaper.terminate_all(), 0);
        assert!(reaper.advertised_pids().is_empty());
    }
}

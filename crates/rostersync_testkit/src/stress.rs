//! Stress helpers for concurrent writers.
//!
//! These drive many clients writing at once and check that the version
//! counter accounts for every accepted write.

use crate::fixtures::TestCluster;
use rostersync_engine::SyncError;
use rostersync_protocol::RecordPatch;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Writes each client attempts.
    pub writes_per_client: usize,
    /// Records the writes cycle through.
    pub records: Vec<String>,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            writes_per_client: 20,
            records: vec!["stu-001".into(), "stu-002".into(), "stu-003".into()],
        }
    }
}

/// Result of a stress run.
#[derive(Debug, Clone, Default)]
pub struct StressTestResult {
    /// Writes the server accepted.
    pub accepted: usize,
    /// Writes that stayed stale after the resync.
    pub stale: usize,
    /// Writes that failed for any other reason.
    pub failed: usize,
    /// Server version before the run.
    pub start_version: u64,
    /// Server version after the run.
    pub final_version: u64,
    /// Total duration.
    pub duration: Duration,
}

impl StressTestResult {
    /// Returns true if every accepted write got its own version and nothing
    /// else moved the counter.
    pub fn versions_accounted_for(&self) -> bool {
        self.final_version - self.start_version == self.accepted as u64
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Accepted: {}", self.accepted);
        println!("Stale after resync: {}", self.stale);
        println!("Failed: {}", self.failed);
        println!("Versions: v{} -> v{}", self.start_version, self.final_version);
        println!("Duration: {:?}", self.duration);
    }
}

/// Every client writes concurrently; all start at the same instant.
pub fn stress_concurrent_writes(cluster: &TestCluster, config: &StressConfig) -> StressTestResult {
    let start_version = cluster.server_version().get();
    let barrier = Arc::new(Barrier::new(cluster.clients.len()));
    let start = Instant::now();

    let handles: Vec<_> = cluster
        .clients
        .iter()
        .enumerate()
        .map(|(c, client)| {
            let client = client.clone();
            let barrier = Arc::clone(&barrier);
            let config = config.clone();
            thread::spawn(move || {
                barrier.wait();
                let mut result = StressTestResult::default();
                for i in 0..config.writes_per_client {
                    let record = &config.records[(c + i) % config.records.len()];
                    let patch = RecordPatch {
                        attendance: Some(((c * 31 + i) % 101) as u8),
                        ..RecordPatch::default()
                    };
                    match client.write(record, patch) {
                        Ok(_) => result.accepted += 1,
                        Err(SyncError::StaleVersion { .. }) => result.stale += 1,
                        Err(_) => result.failed += 1,
                    }
                }
                result
            })
        })
        .collect();

    let mut total = StressTestResult {
        start_version,
        ..StressTestResult::default()
    };
    for handle in handles {
        let part = handle.join().expect("Stress writer panicked");
        total.accepted += part.accepted;
        total.stale += part.stale;
        total.failed += part.failed;
    }
    total.final_version = cluster.server_version().get();
    total.duration = start.elapsed();
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_writers_never_share_a_version() {
        let cluster = TestCluster::new(4);
        cluster.load_all();

        let config = StressConfig {
            writes_per_client: 10,
            ..StressConfig::default()
        };
        let result = stress_concurrent_writes(&cluster, &config);

        assert!(result.accepted > 0);
        assert_eq!(result.failed, 0);
        assert_eq!(result.accepted + result.stale, 40);
        assert!(result.versions_accounted_for());
    }

    #[test]
    fn clients_converge_after_stress() {
        let cluster = TestCluster::new(3);
        cluster.load_all();
        let mut sessions = cluster.connect_all();

        stress_concurrent_writes(&cluster, &StressConfig::default());
        cluster.drain_all(&mut sessions);
        for client in &cluster.clients {
            client.refresh().unwrap();
        }
        assert!(cluster.converged());
    }
}

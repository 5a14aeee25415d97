//! Running counters of a crawl.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the crawl loop, the traversal and the workers.
#[derive(Debug, Default)]
pub struct CrawlStats {
    rounds: AtomicU64,
    skipped_rounds: AtomicU64,
    visited: AtomicU64,
    queued: AtomicU64,
    resolve_failures: AtomicU64,
    expansion_failures: AtomicU64,
    connected: AtomicU64,
    dial_failures: AtomicU64,
    backoff_exhausted: AtomicU64,
    anomalies: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl CrawlStats {
    pub fn round_completed(&self) {
        bump(&self.rounds);
    }

    pub fn round_skipped(&self) {
        bump(&self.skipped_rounds);
    }

    pub fn peer_visited(&self) {
        bump(&self.visited);
    }

    pub fn peer_queued(&self) {
        bump(&self.queued);
    }

    pub fn resolve_failed(&self) {
        bump(&self.resolve_failures);
    }

    pub fn expansion_failed(&self) {
        bump(&self.expansion_failures);
    }

    pub fn peer_connected(&self) {
        bump(&self.connected);
    }

    pub fn dial_failed(&self) {
        bump(&self.dial_failures);
    }

    pub fn backoff_exhausted(&self) {
        bump(&self.backoff_exhausted);
    }

    /// A dial reported success but the host shows no live connection.
    pub fn connection_anomaly(&self) {
        bump(&self.anomalies);
    }

    /// Point in time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            rounds: self.rounds.load(Ordering::Relaxed),
            skipped_rounds: self.skipped_rounds.load(Ordering::Relaxed),
            visited: self.visited.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            resolve_failures: self.resolve_failures.load(Ordering::Relaxed),
            expansion_failures: self.expansion_failures.load(Ordering::Relaxed),
            connected: self.connected.load(Ordering::Relaxed),
            dial_failures: self.dial_failures.load(Ordering::Relaxed),
            backoff_exhausted: self.backoff_exhausted.load(Ordering::Relaxed),
            anomalies: self.anomalies.load(Ordering::Relaxed),
        }
    }
}

/// Counters of a crawl at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Anchor rounds that ran to completion.
    pub rounds: u64,
    /// Anchor rounds abandoned because the closest peers lookup failed.
    pub skipped_rounds: u64,
    /// Distinct peers taken up by the traversal.
    pub visited: u64,
    /// Resolved peers handed to the connection workers.
    pub queued: u64,
    /// Peers the DHT could not resolve.
    pub resolve_failures: u64,
    /// Peers whose connected peers could not be listed.
    pub expansion_failures: u64,
    /// Successful connections reported downstream.
    pub connected: u64,
    /// Dials that failed with a non-backoff error.
    pub dial_failures: u64,
    /// Dials abandoned after exhausting backoff retries.
    pub backoff_exhausted: u64,
    /// Connections reported successful without a live connection.
    pub anomalies: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rounds ({} skipped), {} peers visited, {} queued, {} connected, {} dial failures, {} gave up in backoff",
            self.rounds,
            self.skipped_rounds,
            self.visited,
            self.queued,
            self.connected,
            self.dial_failures,
            self.backoff_exhausted
        )
    }
}

//! Connection attempts with dial backoff retries.

use crate::builder::{
    DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_STEP, DEFAULT_DIAL_TIMEOUT, DEFAULT_MAX_BACKOFF_RETRIES,
};
use crate::shutdown::Shutdown;
use crate::stats::CrawlStats;
use dht_peers_network::{DialError, Host, PeerAddressInfo};
use log::{debug, warn};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Uniformly random duration in `[0, bound)`, zero if `bound` is zero.
pub fn random_below(bound: Duration) -> Duration {
    let millis = u64::try_from(bound.as_millis()).unwrap_or(u64::MAX);
    if millis == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..millis))
}

/// Retry policy for dials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialPolicy {
    /// Time bound of a single connection attempt.
    pub dial_timeout: Duration,
    /// Retries allowed after the first attempt while the host reports dial backoff.
    pub max_backoff_retries: u32,
    /// Fixed part of every backoff sleep.
    pub backoff_base: Duration,
    /// Growth of the random part of the backoff sleep per retry.
    pub backoff_step: Duration,
}

impl Default for DialPolicy {
    fn default() -> Self {
        Self {
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            max_backoff_retries: DEFAULT_MAX_BACKOFF_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_step: DEFAULT_BACKOFF_STEP,
        }
    }
}

impl DialPolicy {
    /// Sleep before the given retry, counting from 1.
    ///
    /// Uniform in `[base, base + retry * step)`, so later retries tend to wait longer.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        self.backoff_base + random_below(self.backoff_step.saturating_mul(retry))
    }
}

/// How a dial ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialOutcome {
    /// Connected and reported downstream.
    Connected {
        attempts: u32,
        /// Live connections the host showed right after reporting.
        live_connections: usize,
    },
    /// Every attempt hit dial backoff.
    BackoffExhausted { attempts: u32 },
    /// An attempt failed with an error that is not worth retrying.
    Failed { attempts: u32 },
    /// The shutdown signal stopped the dial.
    Cancelled,
    /// Connected, but nobody is listening for discovered peers anymore.
    ConsumerGone,
}

/// Connects to resolved peers and reports the successes.
pub struct Dialer<H> {
    host: Arc<H>,
    policy: DialPolicy,
    discovered_tx: mpsc::Sender<PeerAddressInfo>,
    shutdown: Shutdown,
    stats: Arc<CrawlStats>,
}

impl<H> Clone for Dialer<H> {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            policy: self.policy.clone(),
            discovered_tx: self.discovered_tx.clone(),
            shutdown: self.shutdown.clone(),
            stats: self.stats.clone(),
        }
    }
}

impl<H: Host> Dialer<H> {
    pub fn new(
        host: Arc<H>,
        policy: DialPolicy,
        discovered_tx: mpsc::Sender<PeerAddressInfo>,
        shutdown: Shutdown,
        stats: Arc<CrawlStats>,
    ) -> Self {
        Self {
            host,
            policy,
            discovered_tx,
            shutdown,
            stats,
        }
    }

    /// Connect to `info`, retrying while the host reports dial backoff.
    ///
    /// Only [`DialError::Backoff`] is retried, at most
    /// [`DialPolicy::max_backoff_retries`] times. On success the peer is sent
    /// to the discovered channel, waiting for room if the consumer is slow.
    pub async fn try_connect(&self, info: PeerAddressInfo) -> DialOutcome {
        let mut attempts = 0;
        let mut retries = 0;

        loop {
            attempts += 1;
            debug!(
                "Connecting to {} ({} addresses, attempt {attempts})",
                info.id,
                info.addresses.len()
            );

            let attempt = timeout(self.policy.dial_timeout, self.host.connect(&info));
            let result = match self.shutdown.run(attempt).await {
                Some(result) => result.unwrap_or_else(|_| Err(DialError::Timeout)),
                None => return DialOutcome::Cancelled,
            };

            match result {
                Ok(()) => return self.report(info, attempts).await,
                Err(DialError::Backoff) if retries < self.policy.max_backoff_retries => {
                    retries += 1;
                    let delay = self.policy.backoff_delay(retries);
                    debug!("Backing off dialing {} for {delay:?}", info.id);
                    if !self.shutdown.sleep(delay).await {
                        return DialOutcome::Cancelled;
                    }
                }
                Err(DialError::Backoff) => {
                    debug!(
                        "Failed to connect to {}, giving up after {attempts} attempts in dial backoff",
                        info.id
                    );
                    self.stats.backoff_exhausted();
                    return DialOutcome::BackoffExhausted { attempts };
                }
                Err(e) => {
                    debug!("Failed to connect to {}: {e}", info.id);
                    self.stats.dial_failed();
                    return DialOutcome::Failed { attempts };
                }
            }
        }
    }

    async fn report(&self, info: PeerAddressInfo, attempts: u32) -> DialOutcome {
        debug!("Connected to {}", info.id);
        let id = info.id.clone();

        match self.shutdown.run(self.discovered_tx.send(info)).await {
            Some(Ok(())) => self.stats.peer_connected(),
            Some(Err(_)) => return DialOutcome::ConsumerGone,
            None => return DialOutcome::Cancelled,
        }

        // The host may already consider the connection closed, only record it.
        let live_connections = self.host.live_connections_to(&id);
        if live_connections == 0 {
            warn!("Supposedly connected to {id}, but no live connections to peer");
            self.stats.connection_anomaly();
        }

        DialOutcome::Connected {
            attempts,
            live_connections,
        }
    }
}

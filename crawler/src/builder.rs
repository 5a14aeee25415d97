//! Builder pattern for configuring and creating crawler instances.

use crate::crawler::Crawler;
use crate::dialer::DialPolicy;
use crate::session::{LookupFailurePolicy, SessionConfig};
use dht_peers_network::{Dht, Host};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default number of connection workers, also the pending work capacity.
pub const DEFAULT_WORKERS: usize = 16;
/// Default capacity of the discovered peers channel.
pub const DEFAULT_DISCOVERED_CAPACITY: usize = 256;
/// Default time bound of each DHT lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(60);
/// Default time bound of each connection attempt.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(60);
/// Default upper bound of the random delay before each dial.
pub const DEFAULT_MAX_DIAL_JITTER: Duration = Duration::from_secs(60);
/// Default pause between anchor rounds.
pub const DEFAULT_ROUND_DELAY: Duration = Duration::from_secs(5);
/// Default retries after the first attempt while in dial backoff.
pub const DEFAULT_MAX_BACKOFF_RETRIES: u32 = 6;
/// Default fixed part of each backoff sleep.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(1000);
/// Default per-retry growth of the random part of each backoff sleep.
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_millis(10_000);
/// Default period of the status log line.
pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// Errors that can occur during crawler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlerBuilderError {
    /// At least one connection worker is required.
    ZeroWorkers,
    /// The discovered peers channel needs room for at least one peer.
    ZeroDiscoveredCapacity,
}

impl fmt::Display for CrawlerBuilderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlerBuilderError::ZeroWorkers => {
                write!(f, "Crawler needs at least one connection worker")
            }
            CrawlerBuilderError::ZeroDiscoveredCapacity => {
                write!(f, "Discovered peers channel capacity must be non-zero")
            }
        }
    }
}

impl std::error::Error for CrawlerBuilderError {}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            workers: DEFAULT_WORKERS,
            discovered_capacity: DEFAULT_DISCOVERED_CAPACITY,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            max_dial_jitter: DEFAULT_MAX_DIAL_JITTER,
            round_delay: DEFAULT_ROUND_DELAY,
            dial_policy: DialPolicy::default(),
            lookup_failure_policy: LookupFailurePolicy::SkipRound,
            max_rounds: None,
            status_interval: DEFAULT_STATUS_INTERVAL,
        }
    }
}

/// Builder for creating a customized [`Crawler`] instance.
///
/// # Example
///
/// ```
/// # fn main() -> Result<(), dht_peers_crawler::CrawlerBuilderError> {
/// use dht_peers_crawler::{CrawlerBuilder, LookupFailurePolicy};
/// use std::time::Duration;
///
/// let builder = CrawlerBuilder::new()
///     .with_workers(32)?
///     .with_max_dial_jitter(Duration::from_secs(10))
///     .with_lookup_failure_policy(LookupFailurePolicy::Abort);
/// # let _ = builder;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct CrawlerBuilder {
    config: SessionConfig,
}

impl CrawlerBuilder {
    /// Create a new crawler builder with default settings.
    pub fn new() -> Self {
        CrawlerBuilder {
            config: SessionConfig::default(),
        }
    }

    /// Set the number of connection workers.
    ///
    /// This is the maximum number of dials in progress at once, and also the
    /// capacity of the pending work queue. A traversal that discovers peers
    /// faster than the workers can dial them waits for room in the queue.
    ///
    /// # Arguments
    ///
    /// * `workers` - Number of workers (defaults to 16).
    ///
    /// # Returns
    ///
    /// * `Ok(Self)` - The builder for method chaining.
    /// * `Err(CrawlerBuilderError)` - If `workers` is zero.
    pub fn with_workers(mut self, workers: usize) -> Result<Self, CrawlerBuilderError> {
        if workers == 0 {
            return Err(CrawlerBuilderError::ZeroWorkers);
        }
        self.config.workers = workers;
        Ok(self)
    }

    /// Set the capacity of the discovered peers channel.
    ///
    /// Workers wait for room when the channel is full, so a slow consumer
    /// throttles dialing.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Buffered peers (defaults to 256).
    ///
    /// # Returns
    ///
    /// * `Ok(Self)` - The builder for method chaining.
    /// * `Err(CrawlerBuilderError)` - If `capacity` is zero.
    pub fn with_discovered_capacity(mut self, capacity: usize) -> Result<Self, CrawlerBuilderError> {
        if capacity == 0 {
            return Err(CrawlerBuilderError::ZeroDiscoveredCapacity);
        }
        self.config.discovered_capacity = capacity;
        Ok(self)
    }

    /// Set the time bound of each DHT lookup.
    ///
    /// Applies to closest peers lookups, peer resolution and connected peer listing.
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.config.lookup_timeout = timeout;
        self
    }

    /// Set the time bound of each connection attempt.
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.config.dial_policy.dial_timeout = timeout;
        self
    }

    /// Set the upper bound of the random delay a worker waits before each dial.
    ///
    /// Peers found in the same traversal burst are spread over this window
    /// instead of being dialed all at once. Zero disables the delay.
    pub fn with_max_dial_jitter(mut self, jitter: Duration) -> Self {
        self.config.max_dial_jitter = jitter;
        self
    }

    /// Set the pause between anchor rounds.
    pub fn with_round_delay(mut self, delay: Duration) -> Self {
        self.config.round_delay = delay;
        self
    }

    /// Set the dial backoff retry policy.
    ///
    /// After the n-th consecutive backoff error the dialer sleeps a uniform
    /// random duration in `[base, base + n * step)` and tries again, up to
    /// `max_retries` times.
    ///
    /// # Arguments
    ///
    /// * `max_retries` - Retries after the first attempt (defaults to 6).
    /// * `base` - Fixed part of each sleep (defaults to 1 second).
    /// * `step` - Per-retry growth of the random part (defaults to 10 seconds).
    pub fn with_backoff(mut self, max_retries: u32, base: Duration, step: Duration) -> Self {
        self.config.dial_policy.max_backoff_retries = max_retries;
        self.config.dial_policy.backoff_base = base;
        self.config.dial_policy.backoff_step = step;
        self
    }

    /// Set what happens when a round's closest peers lookup fails.
    ///
    /// Defaults to [`LookupFailurePolicy::SkipRound`].
    pub fn with_lookup_failure_policy(mut self, policy: LookupFailurePolicy) -> Self {
        self.config.lookup_failure_policy = policy;
        self
    }

    /// Stop the crawl after `rounds` anchor rounds instead of running until shutdown.
    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.config.max_rounds = Some(rounds);
        self
    }

    /// Set how often crawl progress is logged.
    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.config.status_interval = interval;
        self
    }

    /// Build the crawler with the configured options.
    ///
    /// # Arguments
    ///
    /// * `dht` - The DHT lookup service to crawl.
    /// * `host` - The network host to connect through.
    ///
    /// # Returns
    ///
    /// A configured `Crawler` instance.
    pub fn build<D: Dht, H: Host>(self, dht: D, host: H) -> Crawler<D, H> {
        Crawler::new(self.config, Arc::new(dht), Arc::new(host))
    }
}

//! Internal crawl loop.
//!
//! This module contains the [`CrawlSession`] which repeatedly draws a random
//! anchor key and drives one frontier traversal from it, pacing the rounds
//! with a fixed delay.

use crate::anchor::AnchorKey;
use crate::crawler::CrawlError;
use crate::dialer::DialPolicy;
use crate::shutdown::{Shutdown, ShutdownTrigger};
use crate::stats::CrawlStats;
use crate::traversal::{Traversal, TraversalOutcome};
use dht_peers_network::Dht;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// What to do when a round's closest peers lookup fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupFailurePolicy {
    /// Log the failure and move on to the next anchor round.
    SkipRound,
    /// Stop the crawl with [`CrawlError::ClosestPeers`].
    ///
    /// Suits deployments where a supervisor restarts the crawler.
    Abort,
}

/// Configuration for a crawl session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub workers: usize,
    pub discovered_capacity: usize,
    pub lookup_timeout: Duration,
    pub max_dial_jitter: Duration,
    pub round_delay: Duration,
    pub dial_policy: DialPolicy,
    pub lookup_failure_policy: LookupFailurePolicy,
    pub max_rounds: Option<usize>,
    pub status_interval: Duration,
}

/// Source of anchor keys, swappable so tests can starve it of randomness.
type AnchorSource = fn() -> Result<AnchorKey, rand::Error>;

/// Drives anchor rounds on a single task.
///
/// Rounds never overlap: one traversal runs to completion before the next
/// anchor is drawn.
pub struct CrawlSession<D> {
    config: SessionConfig,
    traversal: Traversal<D>,
    shutdown: Shutdown,
    /// Raised when the session stops on a fatal error, taking the workers down with it.
    trigger: ShutdownTrigger,
    stats: Arc<CrawlStats>,
    anchors: AnchorSource,
}

impl<D: Dht> CrawlSession<D> {
    pub fn new(
        config: SessionConfig,
        traversal: Traversal<D>,
        shutdown: Shutdown,
        trigger: ShutdownTrigger,
        stats: Arc<CrawlStats>,
    ) -> Self {
        Self {
            config,
            traversal,
            shutdown,
            trigger,
            stats,
            anchors: AnchorKey::generate,
        }
    }

    /// Run anchor rounds until shutdown, the round limit, or a fatal error.
    ///
    /// # Termination Conditions
    ///
    /// 1. **Shutdown** - The signal is raised, the in-flight round is abandoned.
    /// 2. **Round limit** - `max_rounds` rounds have run.
    /// 3. **Fatal error** - No randomness for an anchor, or a failed closest
    ///    peers lookup under [`LookupFailurePolicy::Abort`]. The shutdown
    ///    signal is raised so the workers stop too.
    pub async fn run(mut self) -> Result<(), CrawlError> {
        let result = self.rounds().await;
        if let Err(e) = &result {
            error!("Crawl aborted: {e}");
            self.trigger.trigger();
        }
        // Dropping the traversal closes the work queue, idle workers exit.
        result
    }

    async fn rounds(&mut self) -> Result<(), CrawlError> {
        let mut round = 0;
        let mut last_status = Instant::now();

        loop {
            if self.shutdown.is_triggered() {
                debug!("Shutdown signalled, stopping crawl loop");
                return Ok(());
            }
            if self.config.max_rounds.is_some_and(|max| round >= max) {
                info!("Crawl finished after {round} rounds");
                return Ok(());
            }
            round += 1;

            let anchor = (self.anchors)().map_err(CrawlError::Randomness)?;
            debug!("Crawling from anchor {anchor}");

            match self.traversal.explore(&anchor).await {
                Ok(TraversalOutcome::Completed(summary)) => {
                    self.stats.round_completed();
                    info!("Round {round}: {summary}");
                }
                Ok(TraversalOutcome::Cancelled) => {
                    debug!("Round {round} cancelled");
                    return Ok(());
                }
                Err(e) => match self.config.lookup_failure_policy {
                    LookupFailurePolicy::Abort => return Err(CrawlError::ClosestPeers(e)),
                    LookupFailurePolicy::SkipRound => {
                        self.stats.round_skipped();
                        warn!("Closest peers lookup failed in round {round}, skipping: {e}");
                    }
                },
            }

            if last_status.elapsed() >= self.config.status_interval {
                info!(
                    "{}, {} unique peers seen",
                    self.stats.snapshot(),
                    self.traversal.visited_count()
                );
                last_status = Instant::now();
            }

            if self.config.max_rounds.is_some_and(|max| round >= max) {
                continue;
            }
            if !self.shutdown.sleep(self.config.round_delay).await {
                debug!("Shutdown signalled, stopping crawl loop");
                return Ok(());
            }
        }
    }
}

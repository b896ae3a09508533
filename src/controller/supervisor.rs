//! Watch session supervisor
//!
//! Restarts the pod watch whenever a session ends. A session that ends
//! before the reconnect threshold counts as a fast reconnect; after too many
//! in a row the supervisor gives up with [`Error::Unstable`] so the process
//! exits and gets rescheduled instead of spinning against the API server.

use std::convert::Infallible;
use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use super::dispatcher::SessionSummary;
use super::WatcherConfig;
use crate::error::{Error, Result};

/// Verdict on a finished watch session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionVerdict {
    /// Lasted at least the threshold; `reset` is set if tries were restored
    Healthy { reset: bool },
    Fast { tries_left: u32 },
    /// No tries left
    Exhausted { fast_count: u32 },
}

/// Counts consecutive fast reconnects
#[derive(Debug, Clone)]
pub struct ReconnectBudget {
    max: u32,
    tries_left: u32,
    fast_count: u32,
    threshold: Duration,
}

impl ReconnectBudget {
    pub fn new(threshold: Duration, max_fast_reconnects: u32) -> Self {
        Self {
            max: max_fast_reconnects,
            tries_left: max_fast_reconnects,
            fast_count: 0,
            threshold,
        }
    }

    pub fn from_config(config: &WatcherConfig) -> Self {
        Self::new(config.reconnect_threshold, config.max_fast_reconnects)
    }

    pub fn tries_left(&self) -> u32 {
        self.tries_left
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Record a session that lasted `elapsed`
    pub fn record(&mut self, elapsed: Duration) -> SessionVerdict {
        if elapsed >= self.threshold {
            let reset = self.tries_left < self.max;
            self.tries_left = self.max;
            self.fast_count = 0;
            return SessionVerdict::Healthy { reset };
        }

        self.tries_left = self.tries_left.saturating_sub(1);
        self.fast_count += 1;
        if self.tries_left == 0 {
            SessionVerdict::Exhausted {
                fast_count: self.fast_count,
            }
        } else {
            SessionVerdict::Fast {
                tries_left: self.tries_left,
            }
        }
    }
}

/// Run watch sessions until a fatal error or too many fast reconnects
///
/// `session` opens one watch and drives it to the end. Fatal errors
/// (failed patches) are returned at once; other session errors count as a
/// session that ended when the error came back.
pub async fn supervise<F, Fut>(mut budget: ReconnectBudget, mut session: F) -> Result<Infallible>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<SessionSummary>>,
{
    info!(
        "Starting watch supervisor (reconnect threshold: {:?}, max fast reconnects: {})",
        budget.threshold(),
        budget.tries_left()
    );
    #[cfg(feature = "metrics")]
    super::metrics::set_fast_reconnect_tries_left(budget.tries_left());

    loop {
        let started = Instant::now();
        let elapsed = match session().await {
            Ok(summary) => {
                info!(
                    "Watch session ended after {:.1}s ({} events, {:?})",
                    summary.duration.as_secs_f64(),
                    summary.events,
                    summary.ended_by
                );
                summary.duration
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("Watch session failed: {}", e);
                started.elapsed()
            }
        };

        let verdict = budget.record(elapsed);
        #[cfg(feature = "metrics")]
        super::metrics::record_session(&verdict, budget.tries_left());

        match verdict {
            SessionVerdict::Healthy { reset: true } => {
                info!("Watch session was stable; fast reconnect budget restored")
            }
            SessionVerdict::Healthy { reset: false } => {}
            SessionVerdict::Fast { tries_left } => warn!(
                "Watch session ended within {:?}; {} tries left",
                budget.threshold(),
                tries_left
            ),
            SessionVerdict::Exhausted { fast_count } => {
                error!(
                    "Watch reconnected too fast {} times in a row; giving up",
                    fast_count
                );
                return Err(Error::Unstable {
                    fast_reconnects: fast_count,
                });
            }
        }
    }
}

//! Controller module for VIP placement
//! This module contains the watch supervisor, the event dispatcher and the
//! balancing logic that keeps each VIP on its highest-priority healthy node.

pub mod balance;
mod cluster;
pub mod dispatcher;
mod health;
pub mod inventory;
#[cfg(feature = "metrics")]
pub mod metrics;
mod resolvers;
pub mod supervisor;
#[cfg(test)]
mod testing;

use std::time::Duration;

pub use balance::{
    balance, BalanceOutcome, BalanceTrigger, Migration, MigrationKind, ServiceBalance,
};
pub use cluster::{ClusterApi, KubeClusterApi, PodWatchStream, FIELD_MANAGER};
pub use dispatcher::{DispatchOutcome, Dispatcher, IgnoreReason, SessionEnd, SessionSummary};
pub use health::{are_all_containers_ready, is_node_ready};
pub use inventory::{collect_inventory, InventoryEntry};
pub use resolvers::{resolve_lease_holder, resolve_ready_peer_pods, resolve_services};
pub use supervisor::{supervise, ReconnectBudget, SessionVerdict};

use crate::error::{Error, Result};

/// Upper bound (exclusive) the API server accepts for a watch timeout
pub const MAX_WATCH_TIMEOUT_SECS: u32 = 295;

/// Runtime settings for the watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Idle timeout passed to the pod watch; 0 leaves it to the server
    pub watch_timeout_secs: u32,
    /// Sessions shorter than this count as fast reconnects
    pub reconnect_threshold: Duration,
    /// Consecutive fast reconnects tolerated before giving up
    pub max_fast_reconnects: u32,
    /// Log migrations without patching anything
    pub dry_run: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            watch_timeout_secs: 0,
            reconnect_threshold: Duration::from_secs(10),
            max_fast_reconnects: 5,
            dry_run: false,
        }
    }
}

impl WatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.watch_timeout_secs >= MAX_WATCH_TIMEOUT_SECS {
            return Err(Error::ConfigError(format!(
                "watch timeout must be below {} seconds, got {}",
                MAX_WATCH_TIMEOUT_SECS, self.watch_timeout_secs
            )));
        }
        if self.max_fast_reconnects == 0 {
            return Err(Error::ConfigError(
                "max fast reconnects must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Shared state handed to every component
pub struct Context<C> {
    pub api: C,
    pub config: WatcherConfig,
}

impl<C: ClusterApi> Context<C> {
    pub fn new(api: C, config: WatcherConfig) -> Self {
        Self { api, config }
    }
}

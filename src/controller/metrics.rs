//! Prometheus metrics for kube-vip-watcher
//!
//! # Exported metrics
//! The `/metrics` endpoint (when built with `--features metrics`) exports the following metrics:
//! - `kube_vip_watcher_events_total` (counter): pod watch events labeled by event type.
//! - `kube_vip_watcher_balance_outcomes_total` (counter): balancing results labeled by namespace/service/outcome.
//! - `kube_vip_watcher_migrations_total` (counter): VIP moves labeled by namespace/service/kind.
//! - `kube_vip_watcher_watch_sessions_total` (counter): finished watch sessions labeled `fast` or `healthy`.
//! - `kube_vip_watcher_fast_reconnect_tries_left` (gauge): fast reconnects left before the watcher exits.
//! - `kube_vip_watcher_balance_duration_seconds` (histogram): time spent balancing one service.

use std::sync::atomic::{AtomicI64, AtomicU64};
use std::time::Duration;

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

use super::balance::BalanceOutcome;
use super::supervisor::SessionVerdict;

/// Labels for watch events
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EventLabels {
    /// ADDED, MODIFIED, DELETED, BOOKMARK or ERROR
    pub event_type: String,
}

/// Labels for per-service balancing outcomes
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    pub namespace: String,
    pub service: String,
    pub outcome: String,
}

/// Labels for migrations
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct MigrationLabels {
    pub namespace: String,
    pub service: String,
    /// "returned_to_primary" or "failed_over_to_secondary"
    pub kind: String,
}

/// Labels for finished watch sessions
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SessionLabels {
    pub kind: String,
}

/// Counter tracking pod watch events
pub static EVENTS_TOTAL: Lazy<Family<EventLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Counter tracking balancing outcomes
pub static BALANCE_OUTCOMES_TOTAL: Lazy<Family<OutcomeLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Counter tracking VIP migrations, dry runs included
pub static MIGRATIONS_TOTAL: Lazy<Family<MigrationLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Counter tracking finished watch sessions
pub static WATCH_SESSIONS_TOTAL: Lazy<Family<SessionLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Gauge tracking the remaining fast reconnect budget
pub static FAST_RECONNECT_TRIES_LEFT: Lazy<Gauge<i64, AtomicI64>> = Lazy::new(Gauge::default);

/// Histogram tracking per-service balancing time (seconds)
pub static BALANCE_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    // 1ms .. ~16s across 15 buckets.
    Histogram::new(exponential_buckets(0.001, 2.0, 15))
});

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();

    registry.register(
        "kube_vip_watcher_events",
        "Pod watch events received",
        EVENTS_TOTAL.clone(),
    );
    registry.register(
        "kube_vip_watcher_balance_outcomes",
        "Balancing results per service",
        BALANCE_OUTCOMES_TOTAL.clone(),
    );
    registry.register(
        "kube_vip_watcher_migrations",
        "VIP migrations per service",
        MIGRATIONS_TOTAL.clone(),
    );
    registry.register(
        "kube_vip_watcher_watch_sessions",
        "Finished pod watch sessions",
        WATCH_SESSIONS_TOTAL.clone(),
    );
    registry.register(
        "kube_vip_watcher_fast_reconnect_tries_left",
        "Fast reconnects left before the watcher exits",
        FAST_RECONNECT_TRIES_LEFT.clone(),
    );
    registry.register(
        "kube_vip_watcher_balance_duration_seconds",
        "Time spent balancing one service in seconds",
        BALANCE_DURATION_SECONDS.clone(),
    );

    registry
});

/// Increment the watch event counter.
pub fn inc_event(event_type: &str) {
    let labels = EventLabels {
        event_type: event_type.to_string(),
    };
    EVENTS_TOTAL.get_or_create(&labels).inc();
}

/// Record the result of balancing one service.
pub fn observe_balance(namespace: &str, service: &str, outcome: &BalanceOutcome, elapsed: Duration) {
    BALANCE_DURATION_SECONDS.observe(elapsed.as_secs_f64());

    let labels = OutcomeLabels {
        namespace: namespace.to_string(),
        service: service.to_string(),
        outcome: outcome.as_str().to_string(),
    };
    BALANCE_OUTCOMES_TOTAL.get_or_create(&labels).inc();

    if let BalanceOutcome::Migrated(migration) = outcome {
        let labels = MigrationLabels {
            namespace: namespace.to_string(),
            service: service.to_string(),
            kind: migration.kind.as_str().to_string(),
        };
        MIGRATIONS_TOTAL.get_or_create(&labels).inc();
    }
}

pub fn set_fast_reconnect_tries_left(tries_left: u32) {
    FAST_RECONNECT_TRIES_LEFT.set(i64::from(tries_left));
}

/// Record a finished watch session and the budget left after it.
pub fn record_session(verdict: &SessionVerdict, tries_left: u32) {
    let kind = match verdict {
        SessionVerdict::Healthy { .. } => "healthy",
        SessionVerdict::Fast { .. } | SessionVerdict::Exhausted { .. } => "fast",
    };
    let labels = SessionLabels {
        kind: kind.to_string(),
    };
    WATCH_SESSIONS_TOTAL.get_or_create(&labels).inc();
    set_fast_reconnect_tries_left(tries_left);
}

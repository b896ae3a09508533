//! Pod watch event dispatcher
//!
//! Pulls events off one watch session and hands opted-in pods to the
//! balancing logic, one event at a time. Each event is handled on its own;
//! nothing is carried over between events.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::WatchEvent;
use tracing::{debug, info, instrument, warn};

use super::balance::{balance, BalanceTrigger, ServiceBalance};
use super::resolvers::resolve_services;
use super::{ClusterApi, Context};
use crate::error::Result;
use crate::model::{BalanceGate, PodEvent, WatchEventType, BALANCE_IP_ANNOTATION};

/// Why an opted-in pod event was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    GateDisabled,
    InvalidGate(String),
    MissingAppLabel,
}

/// What happened to a single pod event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The pod carries no `kubeVipBalanceIP` annotation
    NotApplicable,
    Ignored(IgnoreReason),
    /// No service in the pod's namespace carries its `app` label
    NoServices,
    Balanced(Vec<ServiceBalance>),
}

/// How a watch session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The server closed the stream, usually on its idle timeout
    StreamClosed,
    /// The server sent an error event
    WatchError(String),
    /// Reading the stream failed
    StreamFailed(String),
}

/// Summary of one watch session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub events: u64,
    /// Pod events handed to [`Dispatcher::dispatch`]
    pub dispatched: u64,
    pub ended_by: SessionEnd,
    pub duration: Duration,
}

enum Step {
    Skipped,
    Dispatched,
    End(SessionEnd),
}

/// Consumes pod watch sessions and dispatches their events
pub struct Dispatcher<C> {
    ctx: Arc<Context<C>>,
}

impl<C: ClusterApi> Dispatcher<C> {
    pub fn new(ctx: Arc<Context<C>>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Context<C> {
        &self.ctx
    }

    /// Open a watch and process events until the stream ends
    ///
    /// Failing to open the watch returns the error; a failure while reading
    /// ends the session normally. Mutation errors propagate.
    pub async fn run_session(&self) -> Result<SessionSummary> {
        let started = Instant::now();
        let mut stream = self
            .ctx
            .api
            .watch_pods(self.ctx.config.watch_timeout_secs)
            .await?;
        info!(
            "Watching pods in all namespaces (timeout: {}s)",
            self.ctx.config.watch_timeout_secs
        );

        let mut events = 0;
        let mut dispatched = 0;
        let mut ended_by = SessionEnd::StreamClosed;

        while let Some(item) = stream.next().await {
            let event = match item {
                Ok(event) => event,
                Err(e) => {
                    warn!("Pod watch stream failed: {}", e);
                    ended_by = SessionEnd::StreamFailed(e.to_string());
                    break;
                }
            };
            events += 1;
            match self.handle_event(event).await? {
                Step::Skipped => {}
                Step::Dispatched => dispatched += 1,
                Step::End(end) => {
                    ended_by = end;
                    break;
                }
            }
        }

        let summary = SessionSummary {
            events,
            dispatched,
            ended_by,
            duration: started.elapsed(),
        };
        debug!("Watch session ended: {:?}", summary);
        Ok(summary)
    }

    async fn handle_event(&self, event: WatchEvent<Pod>) -> Result<Step> {
        let (event_type, pod) = match event {
            WatchEvent::Added(pod) => (WatchEventType::Added, pod),
            WatchEvent::Modified(pod) => (WatchEventType::Modified, pod),
            WatchEvent::Deleted(pod) => (WatchEventType::Deleted, pod),
            WatchEvent::Bookmark(_) => {
                #[cfg(feature = "metrics")]
                super::metrics::inc_event("BOOKMARK");
                return Ok(Step::Skipped);
            }
            WatchEvent::Error(e) => {
                #[cfg(feature = "metrics")]
                super::metrics::inc_event("ERROR");
                warn!("Pod watch returned error {}: {}", e.code, e.message);
                return Ok(Step::End(SessionEnd::WatchError(format!(
                    "{} {}: {}",
                    e.code, e.reason, e.message
                ))));
            }
        };

        #[cfg(feature = "metrics")]
        super::metrics::inc_event(event_type.as_str());

        let event = PodEvent::from_pod(event_type, &pod);
        self.dispatch(&event).await?;
        Ok(Step::Dispatched)
    }

    /// Evaluate one pod event and balance the services it backs
    #[instrument(skip_all, fields(pod = %event.name, namespace = %event.namespace, event_type = %event.event_type))]
    pub async fn dispatch(&self, event: &PodEvent) -> Result<DispatchOutcome> {
        match &event.gate {
            BalanceGate::Absent => return Ok(DispatchOutcome::NotApplicable),
            BalanceGate::Disabled => {
                debug!("Pod {} has balancing disabled", event.name);
                return Ok(DispatchOutcome::Ignored(IgnoreReason::GateDisabled));
            }
            BalanceGate::Invalid(value) => {
                warn!(
                    "Ignoring pod {} in namespace {}: {}={:?} is not a boolean",
                    event.name, event.namespace, BALANCE_IP_ANNOTATION, value
                );
                return Ok(DispatchOutcome::Ignored(IgnoreReason::InvalidGate(
                    value.clone(),
                )));
            }
            BalanceGate::Enabled => {}
        }

        let Some(app) = event.app.as_deref() else {
            warn!(
                "Ignoring {} in namespace {} because the app label is not set",
                event.name, event.namespace
            );
            return Ok(DispatchOutcome::Ignored(IgnoreReason::MissingAppLabel));
        };

        info!(
            "Namespace {} - Pod: {} - App: {} - Node: {} - Phase: {} - Event: {}",
            event.namespace,
            event.name,
            app,
            event.node.as_deref().unwrap_or("<unscheduled>"),
            event.phase.as_deref().unwrap_or("<unknown>"),
            event.event_type
        );

        let services = resolve_services(&self.ctx.api, &event.namespace, app, &event.name).await;
        if services.is_empty() {
            info!(
                "No services found for app {} in namespace {}",
                app, event.namespace
            );
            return Ok(DispatchOutcome::NoServices);
        }

        let trigger = BalanceTrigger {
            pod_name: &event.name,
            container_ready: event.readiness(),
            node: event.node.as_deref(),
            app,
        };
        let results = balance(self.context(), &services, &trigger).await?;
        Ok(DispatchOutcome::Balanced(results))
    }
}

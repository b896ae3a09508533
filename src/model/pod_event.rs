//! Pod events extracted from the watch stream

use std::fmt;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

use super::{annotation, app_label, BALANCE_IP_ANNOTATION};

/// Kind of change reported by the pod watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
}

impl WatchEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchEventType::Added => "ADDED",
            WatchEventType::Modified => "MODIFIED",
            WatchEventType::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for WatchEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of the `kubeVipBalanceIP` opt-in annotation on a pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceGate {
    Enabled,
    Disabled,
    /// No annotation: the pod is not managed
    Absent,
    /// Annotation present but not a boolean
    Invalid(String),
}

impl BalanceGate {
    pub fn parse(value: Option<&str>) -> Self {
        let Some(raw) = value else {
            return BalanceGate::Absent;
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => BalanceGate::Enabled,
            "false" | "no" | "off" | "0" => BalanceGate::Disabled,
            _ => BalanceGate::Invalid(raw.to_string()),
        }
    }
}

/// Fields of a watched pod the dispatcher and engine care about
#[derive(Debug, Clone, PartialEq)]
pub struct PodEvent {
    pub event_type: WatchEventType,
    pub name: String,
    pub namespace: String,
    pub node: Option<String>,
    pub phase: Option<String>,
    /// `None` when the pod reports no container statuses at all
    pub container_ready: Option<Vec<bool>>,
    pub app: Option<String>,
    pub gate: BalanceGate,
}

impl PodEvent {
    pub fn from_pod(event_type: WatchEventType, pod: &Pod) -> Self {
        Self {
            event_type,
            name: pod.name_any(),
            namespace: pod.namespace().unwrap_or_else(|| "default".to_string()),
            node: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
            phase: pod.status.as_ref().and_then(|s| s.phase.clone()),
            container_ready: container_readiness(pod),
            app: app_label(&pod.metadata).map(String::from),
            gate: BalanceGate::parse(annotation(&pod.metadata, BALANCE_IP_ANNOTATION)),
        }
    }

    /// Readiness flags of the triggering pod's containers
    ///
    /// A pod without container statuses yields an empty slice, which counts
    /// as all-ready.
    pub fn readiness(&self) -> &[bool] {
        self.container_ready.as_deref().unwrap_or(&[])
    }
}

/// Per-container ready flags, or `None` if the status list is absent
pub fn container_readiness(pod: &Pod) -> Option<Vec<bool>> {
    let statuses = pod.status.as_ref()?.container_statuses.as_ref()?;
    Some(statuses.iter().map(|c| c.ready).collect())
}

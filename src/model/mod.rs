//! Data model for VIP balancing
//!
//! Wire-level label and annotation keys, typed accessors over Kubernetes
//! object metadata, and the values the controller derives from watched pods
//! and services.
//!
//! Accessors return `Option` for absent labels and annotations. API failures
//! are reported separately as `Result` errors by the cluster client, so the
//! two cases never collapse into one.

mod pod_event;
mod priority;
mod service;

use kube::api::ObjectMeta;

pub use pod_event::{container_readiness, BalanceGate, PodEvent, WatchEventType};
pub use priority::{PriorityError, PriorityOrder};
pub use service::ServiceTarget;

/// Pod annotation that opts a pod into VIP balancing
pub const BALANCE_IP_ANNOTATION: &str = "kubeVipBalanceIP";

/// Service annotation holding the comma separated node priority list
pub const BALANCE_PRIORITY_ANNOTATION: &str = "kubeVipBalancePriority";

/// Service annotation kube-vip reads to place the VIP
pub const VIP_HOST_ANNOTATION: &str = "kube-vip.io/vipHost";

/// Label correlating pods with their services
pub const APP_LABEL: &str = "app";

/// Prefix kube-vip uses for per-service leases
pub const LEASE_PREFIX: &str = "kubevip-";

/// Name of the lease recording VIP ownership for a service
pub fn lease_name(service_name: &str) -> String {
    format!("{}{}", LEASE_PREFIX, service_name)
}

/// Read a label value
pub fn label<'a>(meta: &'a ObjectMeta, key: &str) -> Option<&'a str> {
    meta.labels.as_ref()?.get(key).map(String::as_str)
}

/// Read an annotation value
pub fn annotation<'a>(meta: &'a ObjectMeta, key: &str) -> Option<&'a str> {
    meta.annotations.as_ref()?.get(key).map(String::as_str)
}

/// Read the `app` label
pub fn app_label(meta: &ObjectMeta) -> Option<&str> {
    label(meta, APP_LABEL)
}

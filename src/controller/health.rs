//! Health probes for nodes and pods
//!
//! Both probes answer with a plain `bool`. A node that cannot be read is
//! reported as not ready; the next event re-evaluates it.

use tracing::{debug, warn};

use super::cluster::ClusterApi;

/// Node condition type checked for readiness
pub const CONDITION_TYPE_READY: &str = "Ready";

/// Condition status meaning the condition holds
pub const CONDITION_STATUS_TRUE: &str = "True";

/// Check whether a node reports `Ready=True`
pub async fn is_node_ready<C: ClusterApi + ?Sized>(api: &C, node_name: &str) -> bool {
    let conditions = match api.get_node(node_name).await {
        Ok(node) => node.status.and_then(|s| s.conditions).unwrap_or_default(),
        Err(e) => {
            warn!("Failed to read status of node {}: {}", node_name, e);
            Vec::new()
        }
    };

    let ready = conditions
        .iter()
        .any(|c| c.type_ == CONDITION_TYPE_READY && c.status == CONDITION_STATUS_TRUE);

    debug!("Node {} ready={}", node_name, ready);
    ready
}

/// Whether every container is ready
///
/// An empty list is vacuously ready (0 of 0).
pub fn are_all_containers_ready(container_ready: &[bool]) -> bool {
    container_ready.iter().all(|ready| *ready)
}

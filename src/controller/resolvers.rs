//! Resource resolvers
//!
//! Map a pod event to the services it backs, a service to its current lease
//! holder, and an app label to the ready replicas on a given node. Read
//! failures are logged and degrade to "nothing found".

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use super::cluster::ClusterApi;
use super::health::are_all_containers_ready;
use crate::model::{app_label, container_readiness, lease_name, ServiceTarget};

/// Services in `namespace` whose `app` label equals `app`
///
/// A service named exactly like the pod is returned on its own.
pub async fn resolve_services<C: ClusterApi + ?Sized>(
    api: &C,
    namespace: &str,
    app: &str,
    pod_name: &str,
) -> Vec<ServiceTarget> {
    let services = match api.list_services(namespace).await {
        Ok(services) => services,
        Err(e) => {
            warn!("Failed to list services in namespace {}: {}", namespace, e);
            return Vec::new();
        }
    };

    let matched: Vec<ServiceTarget> = services
        .iter()
        .filter(|svc| app_label(&svc.metadata) == Some(app))
        .filter_map(ServiceTarget::from_service)
        .collect();

    if let Some(explicit) = matched.iter().find(|svc| svc.name == pod_name) {
        info!(
            "Service {}/{} is explicitly paired with pod {}",
            namespace, explicit.name, pod_name
        );
        return vec![explicit.clone()];
    }

    debug!(
        "Found {} service(s) with app={} in namespace {}",
        matched.len(),
        app,
        namespace
    );
    matched
}

/// Current holder of lease `kubevip-<service_name>`
pub async fn resolve_lease_holder<C: ClusterApi + ?Sized>(
    api: &C,
    service_name: &str,
    namespace: &str,
) -> Option<String> {
    let name = lease_name(service_name);
    match api.get_lease(namespace, &name).await {
        Ok(lease) => {
            let holder = lease.spec.and_then(|s| s.holder_identity);
            debug!("Lease {}/{} held by {:?}", namespace, name, holder);
            holder
        }
        Err(e) if e.is_not_found() => {
            warn!("No lease {}/{} found", namespace, name);
            None
        }
        Err(e) => {
            warn!("Failed to read lease {}/{}: {}", namespace, name, e);
            None
        }
    }
}

/// Pods labelled `app` on `node_name` whose containers are all ready
///
/// Listing order is kept. Pods without the label, a node name or a container
/// status list never match.
pub async fn resolve_ready_peer_pods<C: ClusterApi + ?Sized>(
    api: &C,
    namespace: &str,
    app: &str,
    node_name: &str,
) -> Vec<Pod> {
    let pods = match api.list_pods(namespace).await {
        Ok(pods) => pods,
        Err(e) => {
            warn!("Failed to list pods in namespace {}: {}", namespace, e);
            return Vec::new();
        }
    };

    let ready: Vec<Pod> = pods
        .into_iter()
        .filter(|pod| is_ready_peer(pod, app, node_name))
        .collect();

    debug!(
        "{} ready pod(s) with app={} on node {}: {:?}",
        ready.len(),
        app,
        node_name,
        ready.iter().map(|p| p.name_any()).collect::<Vec<_>>()
    );
    ready
}

fn is_ready_peer(pod: &Pod, app: &str, node_name: &str) -> bool {
    if app_label(&pod.metadata) != Some(app) {
        return false;
    }
    let on_node = pod
        .spec
        .as_ref()
        .and_then(|s| s.node_name.as_deref())
        .is_some_and(|n| n == node_name);
    if !on_node {
        return false;
    }
    container_readiness(pod).is_some_and(|ready| are_all_containers_ready(&ready))
}

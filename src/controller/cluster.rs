//! Cluster API access
//!
//! Every read and write the controller performs goes through [`ClusterApi`],
//! so the decision logic can run against an in-memory cluster in tests and
//! against kube-rs in production.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::coordination::v1::Lease;
use k8s_openapi::api::core::v1::{Node, Pod, Service};
use kube::api::{Api, ListParams, Patch, PatchParams, WatchEvent, WatchParams};
use kube::Client;
use serde_json::json;
use tracing::debug;

use crate::error::Result;
use crate::model::VIP_HOST_ANNOTATION;

/// Field manager recorded on every patch
pub const FIELD_MANAGER: &str = "kube-vip-watcher";

/// Resource version that makes the API server replay current pods as ADDED
const WATCH_FROM_START: &str = "0";

/// Stream of pod watch events for one session
pub type PodWatchStream = BoxStream<'static, Result<WatchEvent<Pod>>>;

/// Trait abstracting the Kubernetes calls the controller makes
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Watch pods in all namespaces
    ///
    /// `timeout_secs` of 0 leaves the idle timeout to the API server.
    async fn watch_pods(&self, timeout_secs: u32) -> Result<PodWatchStream>;

    /// Read a node, including its status conditions
    async fn get_node(&self, name: &str) -> Result<Node>;

    /// List services in a namespace
    async fn list_services(&self, namespace: &str) -> Result<Vec<Service>>;

    /// List services in every namespace
    async fn list_all_services(&self) -> Result<Vec<Service>>;

    /// List pods in a namespace
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>>;

    /// Read a lease
    async fn get_lease(&self, namespace: &str, name: &str) -> Result<Lease>;

    /// Set the `kube-vip.io/vipHost` annotation on a service
    async fn patch_service_vip_host(&self, namespace: &str, service: &str, node: &str)
        -> Result<()>;

    /// Set `spec.holderIdentity` on a lease
    async fn patch_lease_holder(&self, namespace: &str, lease: &str, node: &str) -> Result<()>;
}

/// [`ClusterApi`] backed by a kube-rs client
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn watch_pods(&self, timeout_secs: u32) -> Result<PodWatchStream> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let mut params = WatchParams::default();
        if timeout_secs > 0 {
            params = params.timeout(timeout_secs);
        }

        let stream = pods.watch(&params, WATCH_FROM_START).await?;
        Ok(stream.map_err(Into::into).boxed())
    }

    async fn get_node(&self, name: &str) -> Result<Node> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        Ok(nodes.get_status(name).await?)
    }

    async fn list_services(&self, namespace: &str) -> Result<Vec<Service>> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        Ok(services.list(&ListParams::default()).await?.items)
    }

    async fn list_all_services(&self) -> Result<Vec<Service>> {
        let services: Api<Service> = Api::all(self.client.clone());
        Ok(services.list(&ListParams::default()).await?.items)
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        Ok(pods.list(&ListParams::default()).await?.items)
    }

    async fn get_lease(&self, namespace: &str, name: &str) -> Result<Lease> {
        let leases: Api<Lease> = Api::namespaced(self.client.clone(), namespace);
        Ok(leases.get(name).await?)
    }

    async fn patch_service_vip_host(
        &self,
        namespace: &str,
        service: &str,
        node: &str,
    ) -> Result<()> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({
            "metadata": {
                "annotations": {
                    VIP_HOST_ANNOTATION: node
                }
            }
        });
        services
            .patch(service, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        debug!("Patched {} on {}/{} to {}", VIP_HOST_ANNOTATION, namespace, service, node);
        Ok(())
    }

    async fn patch_lease_holder(&self, namespace: &str, lease: &str, node: &str) -> Result<()> {
        let leases: Api<Lease> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({
            "spec": {
                "holderIdentity": node
            }
        });
        leases
            .patch(lease, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        debug!("Patched holderIdentity on lease {}/{} to {}", namespace, lease, node);
        Ok(())
    }
}

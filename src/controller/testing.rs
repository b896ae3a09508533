//! In-memory cluster for controller tests
//!
//! Patches are applied to the stored objects so a second reconciliation sees
//! the post-migration state, and every patch is recorded in order.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::api::core::v1::{
    ContainerStatus, Node, NodeCondition, NodeStatus, Pod, PodSpec, PodStatus, Service,
};
use kube::api::{ObjectMeta, WatchEvent};

use super::cluster::{ClusterApi, PodWatchStream};
use crate::error::{Error, Result};
use crate::model::{
    lease_name, APP_LABEL, BALANCE_IP_ANNOTATION, BALANCE_PRIORITY_ANNOTATION,
    VIP_HOST_ANNOTATION,
};

/// A patch the controller issued
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    VipHost {
        namespace: String,
        service: String,
        node: String,
    },
    LeaseHolder {
        namespace: String,
        lease: String,
        node: String,
    },
}

impl Mutation {
    pub fn vip_host(namespace: &str, service: &str, node: &str) -> Self {
        Mutation::VipHost {
            namespace: namespace.to_string(),
            service: service.to_string(),
            node: node.to_string(),
        }
    }

    pub fn lease_holder(namespace: &str, service: &str, node: &str) -> Self {
        Mutation::LeaseHolder {
            namespace: namespace.to_string(),
            lease: lease_name(service),
            node: node.to_string(),
        }
    }
}

#[derive(Default)]
struct FakeState {
    nodes: BTreeMap<String, Vec<(String, String)>>,
    services: Vec<Service>,
    pods: Vec<Pod>,
    leases: BTreeMap<(String, String), Option<String>>,
    mutations: Vec<Mutation>,
    sessions: VecDeque<Vec<Result<WatchEvent<Pod>>>>,
    watch_opens: usize,
    fail_service_patch: bool,
    fail_lease_patch: bool,
    fail_pod_list: bool,
    fail_service_list: bool,
}

#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<FakeState>,
}

fn injected(what: &str) -> Error {
    Error::ConfigError(format!("injected {} failure", what))
}

fn not_found(kind: &str, namespace: &str, name: &str) -> Error {
    Error::NotFound {
        kind: kind.to_string(),
        name: name.to_string(),
        namespace: namespace.to_string(),
    }
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(self, f: impl FnOnce(&mut FakeState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn with_node(self, name: &str, ready: bool) -> Self {
        let status = if ready { "True" } else { "False" };
        self.with_node_conditions(name, vec![("Ready", status)])
    }

    pub fn with_node_conditions(self, name: &str, conditions: Vec<(&str, &str)>) -> Self {
        let conditions = conditions
            .into_iter()
            .map(|(t, s)| (t.to_string(), s.to_string()))
            .collect();
        self.with(|s| {
            s.nodes.insert(name.to_string(), conditions);
        })
    }

    pub fn with_service(self, service: Service) -> Self {
        self.with(|s| s.services.push(service))
    }

    /// Preset `kube-vip.io/vipHost` on a stored service without recording a patch
    pub fn with_vip_host(self, namespace: &str, service: &str, node: &str) -> Self {
        self.with(|s| {
            if let Some(svc) = s.services.iter_mut().find(|svc| {
                svc.metadata.namespace.as_deref() == Some(namespace)
                    && svc.metadata.name.as_deref() == Some(service)
            }) {
                svc.metadata
                    .annotations
                    .get_or_insert_with(BTreeMap::new)
                    .insert(VIP_HOST_ANNOTATION.to_string(), node.to_string());
            }
        })
    }

    pub fn with_pod(self, pod: Pod) -> Self {
        self.with(|s| s.pods.push(pod))
    }

    /// Add the `kubevip-<service>` lease
    pub fn with_lease(self, namespace: &str, service: &str, holder: Option<&str>) -> Self {
        self.with(|s| {
            s.leases.insert(
                (namespace.to_string(), lease_name(service)),
                holder.map(String::from),
            );
        })
    }

    /// Queue the events one watch session will yield
    pub fn with_session(self, events: Vec<Result<WatchEvent<Pod>>>) -> Self {
        self.with(|s| s.sessions.push_back(events))
    }

    pub fn failing_service_patch(self) -> Self {
        self.with(|s| s.fail_service_patch = true)
    }

    pub fn failing_lease_patch(self) -> Self {
        self.with(|s| s.fail_lease_patch = true)
    }

    pub fn failing_pod_list(self) -> Self {
        self.with(|s| s.fail_pod_list = true)
    }

    pub fn failing_service_list(self) -> Self {
        self.with(|s| s.fail_service_list = true)
    }

    pub fn set_node_ready(&self, name: &str, ready: bool) {
        let status = if ready { "True" } else { "False" };
        self.state.lock().unwrap().nodes.insert(
            name.to_string(),
            vec![("Ready".to_string(), status.to_string())],
        );
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.state.lock().unwrap().mutations.clone()
    }

    pub fn lease_holder(&self, namespace: &str, service: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .leases
            .get(&(namespace.to_string(), lease_name(service)))
            .cloned()
            .flatten()
    }

    pub fn watch_opens(&self) -> usize {
        self.state.lock().unwrap().watch_opens
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn watch_pods(&self, _timeout_secs: u32) -> Result<PodWatchStream> {
        let mut state = self.state.lock().unwrap();
        state.watch_opens += 1;
        let events = state
            .sessions
            .pop_front()
            .ok_or_else(|| injected("watch"))?;
        Ok(futures::stream::iter(events).boxed())
    }

    async fn get_node(&self, name: &str) -> Result<Node> {
        let state = self.state.lock().unwrap();
        let conditions = state
            .nodes
            .get(name)
            .ok_or_else(|| not_found("Node", "", name))?;
        Ok(Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: None,
            status: Some(NodeStatus {
                conditions: Some(
                    conditions
                        .iter()
                        .map(|(type_, status)| NodeCondition {
                            type_: type_.clone(),
                            status: status.clone(),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
        })
    }

    async fn list_services(&self, namespace: &str) -> Result<Vec<Service>> {
        let state = self.state.lock().unwrap();
        if state.fail_service_list {
            return Err(injected("service list"));
        }
        Ok(state
            .services
            .iter()
            .filter(|s| s.metadata.namespace.as_deref() == Some(namespace))
            .cloned()
            .collect())
    }

    async fn list_all_services(&self) -> Result<Vec<Service>> {
        Ok(self.state.lock().unwrap().services.clone())
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        let state = self.state.lock().unwrap();
        if state.fail_pod_list {
            return Err(injected("pod list"));
        }
        Ok(state
            .pods
            .iter()
            .filter(|p| p.metadata.namespace.as_deref() == Some(namespace))
            .cloned()
            .collect())
    }

    async fn get_lease(&self, namespace: &str, name: &str) -> Result<Lease> {
        let state = self.state.lock().unwrap();
        let holder = state
            .leases
            .get(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| not_found("Lease", namespace, name))?;
        Ok(Lease {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: holder.clone(),
                ..Default::default()
            }),
        })
    }

    async fn patch_service_vip_host(
        &self,
        namespace: &str,
        service: &str,
        node: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_service_patch {
            return Err(injected("service patch"));
        }
        let svc = state
            .services
            .iter_mut()
            .find(|s| {
                s.metadata.namespace.as_deref() == Some(namespace)
                    && s.metadata.name.as_deref() == Some(service)
            })
            .ok_or_else(|| not_found("Service", namespace, service))?;
        svc.metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(VIP_HOST_ANNOTATION.to_string(), node.to_string());
        state
            .mutations
            .push(Mutation::vip_host(namespace, service, node));
        Ok(())
    }

    async fn patch_lease_holder(&self, namespace: &str, lease: &str, node: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_lease_patch {
            return Err(injected("lease patch"));
        }
        let holder = state
            .leases
            .get_mut(&(namespace.to_string(), lease.to_string()))
            .ok_or_else(|| not_found("Lease", namespace, lease))?;
        *holder = Some(node.to_string());
        state.mutations.push(Mutation::LeaseHolder {
            namespace: namespace.to_string(),
            lease: lease.to_string(),
            node: node.to_string(),
        });
        Ok(())
    }
}

fn string_map(pairs: &[(&str, &str)]) -> Option<BTreeMap<String, String>> {
    if pairs.is_empty() {
        return None;
    }
    Some(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

/// Service with an optional `app` label and priority annotation
pub fn service(namespace: &str, name: &str, app: Option<&str>, priority: Option<&str>) -> Service {
    let labels: Vec<(&str, &str)> = app.map(|a| (APP_LABEL, a)).into_iter().collect();
    let annotations: Vec<(&str, &str)> = priority
        .map(|p| (BALANCE_PRIORITY_ANNOTATION, p))
        .into_iter()
        .collect();
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: string_map(&labels),
            annotations: string_map(&annotations),
            ..Default::default()
        },
        spec: None,
        status: None,
    }
}

/// Pod scheduled on `node` with one container status per entry of `ready`
pub fn pod(namespace: &str, name: &str, app: Option<&str>, node: &str, ready: &[bool]) -> Pod {
    let labels: Vec<(&str, &str)> = app.map(|a| (APP_LABEL, a)).into_iter().collect();
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: string_map(&labels),
            ..Default::default()
        },
        spec: Some(PodSpec {
            node_name: Some(node.to_string()),
            ..Default::default()
        }),
        status: Some(PodStatus {
            phase: Some("Running".to_string()),
            container_statuses: Some(
                ready
                    .iter()
                    .enumerate()
                    .map(|(i, r)| ContainerStatus {
                        name: format!("c{}", i),
                        ready: *r,
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
    }
}

/// Like [`pod`] but opted into balancing with `kubeVipBalanceIP`
pub fn balanced_pod(namespace: &str, name: &str, app: Option<&str>, node: &str, ready: &[bool]) -> Pod {
    with_gate(pod(namespace, name, app, node, ready), "true")
}

/// Set the `kubeVipBalanceIP` annotation to `value`
pub fn with_gate(mut pod: Pod, value: &str) -> Pod {
    pod.metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(BALANCE_IP_ANNOTATION.to_string(), value.to_string());
    pod
}

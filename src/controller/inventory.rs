//! Read-only report of balanced services

use std::fmt;

use tracing::warn;

use super::resolvers::resolve_lease_holder;
use super::ClusterApi;
use crate::error::Result;
use crate::model::{annotation, ServiceTarget, BALANCE_PRIORITY_ANNOTATION};

/// One service carrying a `kubeVipBalancePriority` annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEntry {
    pub namespace: String,
    pub service: String,
    pub app: Option<String>,
    /// Parsed priority order, or the parse error
    pub priority: std::result::Result<Vec<String>, String>,
    pub lease_holder: Option<String>,
    pub vip_host: Option<String>,
    pub load_balancer_ip: Option<String>,
}

impl InventoryEntry {
    /// Whether the lease sits on the first node of the priority order
    pub fn on_primary(&self) -> bool {
        match (&self.priority, &self.lease_holder) {
            (Ok(order), Some(holder)) => order.first() == Some(holder),
            _ => false,
        }
    }
}

impl fmt::Display for InventoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let priority = match &self.priority {
            Ok(order) => order.join(","),
            Err(e) => format!("<{}>", e),
        };
        write!(
            f,
            "{}/{} app={} priority={} holder={} vipHost={} ip={}",
            self.namespace,
            self.service,
            self.app.as_deref().unwrap_or("-"),
            priority,
            self.lease_holder.as_deref().unwrap_or("-"),
            self.vip_host.as_deref().unwrap_or("-"),
            self.load_balancer_ip.as_deref().unwrap_or("-"),
        )
    }
}

/// Collect every service with a priority annotation
///
/// `namespace` of `None` scans all namespaces.
pub async fn collect_inventory<C: ClusterApi + ?Sized>(
    api: &C,
    namespace: Option<&str>,
) -> Result<Vec<InventoryEntry>> {
    let services = match namespace {
        Some(ns) => api.list_services(ns).await?,
        None => api.list_all_services().await?,
    };

    let mut entries = Vec::new();
    for svc in &services {
        if annotation(&svc.metadata, BALANCE_PRIORITY_ANNOTATION).is_none() {
            continue;
        }
        let Some(target) = ServiceTarget::from_service(svc) else {
            warn!("Skipping service without name or namespace");
            continue;
        };
        let lease_holder = resolve_lease_holder(api, &target.name, &target.namespace).await;
        let priority = target
            .priority()
            .map(|order| order.iter().map(String::from).collect())
            .map_err(|e| e.to_string());

        entries.push(InventoryEntry {
            namespace: target.namespace,
            service: target.name,
            app: target.app,
            priority,
            lease_holder,
            vip_host: target.vip_host,
            load_balancer_ip: target.load_balancer_ip,
        });
    }

    entries.sort_by(|a, b| (&a.namespace, &a.service).cmp(&(&b.namespace, &b.service)));
    Ok(entries)
}

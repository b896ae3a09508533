//! Services that carry a balanced VIP

use k8s_openapi::api::core::v1::Service;

use super::{
    annotation, app_label, PriorityError, PriorityOrder, BALANCE_PRIORITY_ANNOTATION,
    VIP_HOST_ANNOTATION,
};

/// The parts of a Service the engine reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTarget {
    pub name: String,
    pub namespace: String,
    pub app: Option<String>,
    /// Raw `kubeVipBalancePriority` value
    pub balance_priority: Option<String>,
    pub load_balancer_ip: Option<String>,
    pub traffic_policy: Option<String>,
    /// Current `kube-vip.io/vipHost` value
    pub vip_host: Option<String>,
}

impl ServiceTarget {
    /// Returns `None` for services without a name or namespace
    pub fn from_service(service: &Service) -> Option<Self> {
        let meta = &service.metadata;
        let spec = service.spec.as_ref();
        Some(Self {
            name: meta.name.clone()?,
            namespace: meta.namespace.clone()?,
            app: app_label(meta).map(String::from),
            balance_priority: annotation(meta, BALANCE_PRIORITY_ANNOTATION).map(String::from),
            load_balancer_ip: spec.and_then(|s| s.load_balancer_ip.clone()),
            traffic_policy: spec.and_then(|s| s.external_traffic_policy.clone()),
            vip_host: annotation(meta, VIP_HOST_ANNOTATION).map(String::from),
        })
    }

    pub fn priority(&self) -> Result<PriorityOrder, PriorityError> {
        PriorityOrder::from_annotation(self.balance_priority.as_deref())
    }
}

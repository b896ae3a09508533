//! VIP balancing
//!
//! For each service backing a triggering pod, decide whether the VIP sits on
//! the right node and move it when it does not. The decision walks the
//! service's priority order and picks the first Ready node that runs at least
//! one fully ready replica of the app.
//!
//! A migration writes the service's `kube-vip.io/vipHost` annotation first
//! and the lease holder second. If the process dies between the two, the
//! lease still names the old node, so the next event sees a wrong holder and
//! finishes the move. Any patch failure is returned as [`Error::Mutation`],
//! which ends the process.
//!
//! A lease that already names the chosen node is still patched unless the
//! service's `vipHost` names it too; kube-vip may drop the VIP otherwise.

use std::fmt;

use kube::ResourceExt;
use tracing::{info, instrument, warn};

use super::health::{are_all_containers_ready, is_node_ready};
use super::resolvers::{resolve_lease_holder, resolve_ready_peer_pods};
use super::{ClusterApi, Context};
use crate::error::{Error, Result};
use crate::model::{
    lease_name, PriorityError, PriorityOrder, ServiceTarget, BALANCE_PRIORITY_ANNOTATION,
    VIP_HOST_ANNOTATION,
};

/// The pod event a balancing pass reacts to
#[derive(Debug, Clone, Copy)]
pub struct BalanceTrigger<'a> {
    pub pod_name: &'a str,
    pub container_ready: &'a [bool],
    pub node: Option<&'a str>,
    pub app: &'a str,
}

/// How a migration relates to the priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationKind {
    /// The VIP moved back to the first node of the priority order
    ReturnedToPrimary,
    /// The VIP moved to a lower-priority node
    FailedOverToSecondary,
}

impl MigrationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationKind::ReturnedToPrimary => "returned_to_primary",
            MigrationKind::FailedOverToSecondary => "failed_over_to_secondary",
        }
    }
}

impl fmt::Display for MigrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub from: Option<String>,
    pub to: String,
    pub kind: MigrationKind,
    /// False in dry-run mode
    pub applied: bool,
}

/// Result of balancing one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceOutcome {
    /// The primary holds the lease and the triggering pod and node are healthy
    Stable { holder: String },
    /// No patch needed: a ready sibling runs on the primary that holds the
    /// lease, or the chosen node already holds the lease and `vipHost`
    Retained { holder: String },
    Migrated(Migration),
    /// No Ready node in the priority order runs a ready replica
    Unresolved { holder: Option<String> },
    /// The priority annotation is missing or empty
    Skipped(PriorityError),
}

impl BalanceOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceOutcome::Stable { .. } => "stable",
            BalanceOutcome::Retained { .. } => "retained",
            BalanceOutcome::Migrated(_) => "migrated",
            BalanceOutcome::Unresolved { .. } => "unresolved",
            BalanceOutcome::Skipped(_) => "skipped",
        }
    }
}

/// Outcome for a single service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceBalance {
    pub namespace: String,
    pub service: String,
    pub outcome: BalanceOutcome,
}

/// Balance every service in `services`
///
/// Services are handled one after another and independently; only a failed
/// patch stops the pass.
pub async fn balance<C: ClusterApi>(
    ctx: &Context<C>,
    services: &[ServiceTarget],
    trigger: &BalanceTrigger<'_>,
) -> Result<Vec<ServiceBalance>> {
    let mut results = Vec::with_capacity(services.len());

    for service in services {
        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();

        let outcome = balance_service(ctx, service, trigger).await?;

        #[cfg(feature = "metrics")]
        super::metrics::observe_balance(
            &service.namespace,
            &service.name,
            &outcome,
            started.elapsed(),
        );

        results.push(ServiceBalance {
            namespace: service.namespace.clone(),
            service: service.name.clone(),
            outcome,
        });
    }

    Ok(results)
}

#[instrument(skip_all, fields(service = %service.name, namespace = %service.namespace, pod = %trigger.pod_name))]
async fn balance_service<C: ClusterApi>(
    ctx: &Context<C>,
    service: &ServiceTarget,
    trigger: &BalanceTrigger<'_>,
) -> Result<BalanceOutcome> {
    let priority = match service.priority() {
        Ok(priority) => priority,
        Err(e) => {
            warn!(
                "Skipping service {}/{}: {} {}",
                service.namespace,
                service.name,
                BALANCE_PRIORITY_ANNOTATION,
                e
            );
            return Ok(BalanceOutcome::Skipped(e));
        }
    };

    info!(
        "Service {}/{} - priority: {} - traffic policy: {}",
        service.namespace,
        service.name,
        priority,
        service.traffic_policy.as_deref().unwrap_or("<unset>")
    );

    let holder = resolve_lease_holder(&ctx.api, &service.name, &service.namespace).await;

    if is_stable(ctx, &priority, holder.as_deref(), trigger).await {
        info!(
            "Lease holder {} is the primary and pod {} is healthy",
            priority.primary(),
            trigger.pod_name
        );
        return Ok(BalanceOutcome::Stable {
            holder: priority.primary().to_string(),
        });
    }

    info!(
        "Lease holder {} is not the primary or pod {} / its node is unhealthy; checking placement",
        display_holder(holder.as_deref()),
        trigger.pod_name
    );

    for node in priority.iter() {
        if !is_node_ready(&ctx.api, node).await {
            info!("Node {} not ready, trying next node", node);
            continue;
        }

        let peers =
            resolve_ready_peer_pods(&ctx.api, &service.namespace, trigger.app, node).await;
        let Some(peer) = peers.first() else {
            info!("No ready pods for app {} on node {}, trying next node", trigger.app, node);
            continue;
        };

        if trigger.node == Some(node) && holder.as_deref() == Some(priority.primary()) {
            if priority.is_primary(node) {
                info!(
                    "Healthy pod {} on primary node {} next to pod {}; lease holder unchanged",
                    peer.name_any(),
                    node,
                    trigger.pod_name
                );
                return Ok(BalanceOutcome::Retained {
                    holder: node.to_string(),
                });
            }
            warn!(
                "Lease holder {} is the primary but not usable; pod {} on node {} takes over",
                priority.primary(),
                peer.name_any(),
                node
            );
        }

        if holder.as_deref() == Some(node) && service.vip_host.as_deref() == Some(node) {
            info!(
                "Healthy pod {} on node {}; lease holder and {} already name it",
                peer.name_any(),
                node,
                VIP_HOST_ANNOTATION
            );
            return Ok(BalanceOutcome::Retained {
                holder: node.to_string(),
            });
        }

        info!(
            "Healthy pod {} on node {}; moving VIP for {}/{}",
            peer.name_any(),
            node,
            service.namespace,
            service.name
        );
        return migrate(ctx, service, &priority, holder, node).await;
    }

    warn!(
        "No suitable node found for service {}/{} (priority: {}); VIP stays on {}",
        service.namespace,
        service.name,
        priority,
        display_holder(holder.as_deref())
    );
    Ok(BalanceOutcome::Unresolved { holder })
}

async fn is_stable<C: ClusterApi>(
    ctx: &Context<C>,
    priority: &PriorityOrder,
    holder: Option<&str>,
    trigger: &BalanceTrigger<'_>,
) -> bool {
    if holder != Some(priority.primary()) {
        return false;
    }
    if !are_all_containers_ready(trigger.container_ready) {
        return false;
    }
    match trigger.node {
        Some(node) => is_node_ready(&ctx.api, node).await,
        None => false,
    }
}

async fn migrate<C: ClusterApi>(
    ctx: &Context<C>,
    service: &ServiceTarget,
    priority: &PriorityOrder,
    from: Option<String>,
    to: &str,
) -> Result<BalanceOutcome> {
    let kind = if priority.is_primary(to) {
        MigrationKind::ReturnedToPrimary
    } else {
        MigrationKind::FailedOverToSecondary
    };
    let namespace = service.namespace.as_str();
    let lease = lease_name(&service.name);

    if ctx.config.dry_run {
        info!(
            "Dry run: would move VIP for {}/{} from {} to {} ({})",
            namespace,
            service.name,
            display_holder(from.as_deref()),
            to,
            kind
        );
        return Ok(BalanceOutcome::Migrated(Migration {
            from,
            to: to.to_string(),
            kind,
            applied: false,
        }));
    }

    ctx.api
        .patch_service_vip_host(namespace, &service.name, to)
        .await
        .map_err(|e| Error::mutation("Service", namespace, &service.name, e))?;

    ctx.api
        .patch_lease_holder(namespace, &lease, to)
        .await
        .map_err(|e| Error::mutation("Lease", namespace, &lease, e))?;

    match kind {
        MigrationKind::ReturnedToPrimary => info!(
            "HOLDER CHANGED TO PRIMARY NODE {} for {}/{} (was {}); {} updated",
            to,
            namespace,
            service.name,
            display_holder(from.as_deref()),
            VIP_HOST_ANNOTATION
        ),
        MigrationKind::FailedOverToSecondary => warn!(
            "HOLDER CHANGED TO ALTERNATIVE NODE {} for {}/{} (was {}, primary {}); {} updated",
            to,
            namespace,
            service.name,
            display_holder(from.as_deref()),
            priority.primary(),
            VIP_HOST_ANNOTATION
        ),
    }

    Ok(BalanceOutcome::Migrated(Migration {
        from,
        to: to.to_string(),
        kind,
        applied: true,
    }))
}

fn display_holder(holder: Option<&str>) -> &str {
    holder.unwrap_or("<none>")
}

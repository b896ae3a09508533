//! kube-vip-watcher: keeps kube-vip floating IPs on the highest-priority healthy node
//!
//! Watches pods that opt in with the `kubeVipBalanceIP` annotation and moves
//! the `kubevip-<service>` lease and the service's `kube-vip.io/vipHost`
//! annotation to the first Ready node in the service's
//! `kubeVipBalancePriority` list that runs a ready replica.

pub mod controller;
pub mod error;
pub mod lock;
pub mod logging;
pub mod model;
pub mod probe;

#[cfg(feature = "rest-api")]
pub mod rest_api;

pub use crate::error::{Error, Result};

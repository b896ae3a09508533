//! Node priority order parsed from `kubeVipBalancePriority`

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Why a priority annotation could not be used
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriorityError {
    #[error("annotation is missing")]
    Missing,
    #[error("annotation {0:?} names no nodes")]
    Empty(String),
}

/// Ordered failover list of node names
///
/// Never empty. The first entry is the primary node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityOrder(Vec<String>);

impl PriorityOrder {
    /// Parse an optional annotation value
    pub fn from_annotation(value: Option<&str>) -> Result<Self, PriorityError> {
        value.ok_or(PriorityError::Missing)?.parse()
    }

    /// The preferred VIP holder
    pub fn primary(&self) -> &str {
        &self.0[0]
    }

    pub fn is_primary(&self, node: &str) -> bool {
        self.primary() == node
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl FromStr for PriorityOrder {
    type Err = PriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let nodes: Vec<String> = s
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from)
            .collect();

        if nodes.is_empty() {
            return Err(PriorityError::Empty(s.to_string()));
        }
        Ok(Self(nodes))
    }
}

impl fmt::Display for PriorityOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}

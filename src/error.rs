//! Central error types for kube-vip-watcher
//!
//! Uses `thiserror` for the error enum. Reads against the cluster API degrade
//! locally and rarely surface here; what does surface is either a startup
//! problem or one of the fatal escalation classes that end the process.

use thiserror::Error;

/// Exit code for a failed service or lease patch
pub const EXIT_MUTATION_FAILED: u8 = 10;

/// Exit code for a watch that keeps reconnecting too fast
pub const EXIT_UNSTABLE_WATCH: u8 = 11;

/// Exit code when another instance already holds the process lock
pub const EXIT_LOCK_HELD: u8 = 253;

/// Exit code for any other startup or runtime failure
pub const EXIT_FAILURE: u8 = 1;

/// Central error type for kube-vip-watcher
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error from kube-rs
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Local I/O error (sockets, log files, /proc)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid flags or environment
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Resource not found in the cluster
    #[error("Resource not found: {kind}/{name} in namespace {namespace}")]
    NotFound {
        kind: String,
        name: String,
        namespace: String,
    },

    /// A patch issued while migrating a VIP failed
    #[error("Failed to patch {kind} {namespace}/{name}: {source}")]
    Mutation {
        kind: String,
        name: String,
        namespace: String,
        #[source]
        source: Box<Error>,
    },

    /// The pod watch reconnected too fast too many times in a row
    #[error("Pod watch unstable: {fast_reconnects} consecutive fast reconnects")]
    Unstable { fast_reconnects: u32 },

    /// Another instance already holds the process lock
    #[error("{0} already running")]
    LockHeld(String),
}

/// Result type alias for watcher operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Wrap a failed patch call into the fatal mutation error
    pub fn mutation(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        source: Error,
    ) -> Self {
        Error::Mutation {
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error must terminate the process instead of degrading
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Mutation { .. } | Error::Unstable { .. } | Error::LockHeld(_)
        )
    }

    /// Whether the underlying API call answered 404
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::KubeError(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Mutation { .. } => EXIT_MUTATION_FAILED,
            Error::Unstable { .. } => EXIT_UNSTABLE_WATCH,
            Error::LockHeld(_) => EXIT_LOCK_HELD,
            _ => EXIT_FAILURE,
        }
    }
}

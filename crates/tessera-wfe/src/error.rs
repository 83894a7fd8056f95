//! Error types for the workflow engine.

use tessera_rpc::RpcError;
use tessera_value::ValueError;
use thiserror::Error;

use crate::config::ConfigError;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, WfeError>;

/// Error type for the workflow engine.
#[derive(Debug, Error)]
pub enum WfeError {
    // ── Protocol ────────────────────────────────────────────────────
    /// RPC failure outside a resource handler (unexpected message id,
    /// stream closed, transport errors).
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// A plugin answered with a value of the wrong shape.
    #[error("bad response shape: {0}")]
    BadResponseShape(String),

    // ── Validation ──────────────────────────────────────────────────
    #[error("cycle in workflow '{workflow}' involving {activities:?}")]
    CycleInWorkflow {
        workflow: String,
        activities: Vec<String>,
    },

    #[error("unknown reference '{0}'")]
    UnknownReference(String),

    #[error("{activity}: missing required input '{key}'")]
    MissingInput { activity: String, key: String },

    #[error("{activity}: no such attribute '{name}'")]
    NoSuchAttribute { activity: String, name: String },

    #[error("duplicate activity name '{0}'")]
    DuplicateActivity(String),

    #[error("key '{key}' is produced by both '{first}' and '{second}'")]
    AmbiguousOutput {
        key: String,
        first: String,
        second: String,
    },

    #[error("invalid condition '{text}': {reason}")]
    InvalidCondition { text: String, reason: String },

    /// A value failed a schema assertion.
    #[error(transparent)]
    Value(#[from] ValueError),

    // ── Runtime ─────────────────────────────────────────────────────
    #[error("handler {handler} failed in '{method}': {source}")]
    HandlerFailure {
        handler: String,
        method: String,
        #[source]
        source: RpcError,
    },

    #[error("failed to load plugin '{path}': {message}")]
    PluginLoadFailure { path: String, message: String },

    #[error("no identity recorded for '{0}'")]
    MissingIdentity(String),

    #[error("illegal operation '{0}'")]
    IllegalOperation(String),

    #[error("identity store error: {0}")]
    Identity(#[from] rusqlite::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ── Lifecycle ───────────────────────────────────────────────────
    #[error("cancelled")]
    Cancelled,

    #[error("timed out")]
    Timeout,

    /// An activity failed while the workflow was running.
    #[error("{activity} failed: {source}")]
    Activity {
        activity: String,
        #[source]
        source: Box<WfeError>,
    },
}

impl WfeError {
    pub fn bad_shape(msg: impl Into<String>) -> Self {
        Self::BadResponseShape(msg.into())
    }

    pub fn plugin_load(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PluginLoadFailure {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn handler_failure(handler: impl Into<String>, method: impl Into<String>, source: RpcError) -> Self {
        Self::HandlerFailure {
            handler: handler.into(),
            method: method.into(),
            source,
        }
    }

    /// Attach the failing activity's label.
    pub fn in_activity(self, activity: impl Into<String>) -> Self {
        Self::Activity {
            activity: activity.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping activity wrappers.
    pub fn root(&self) -> &WfeError {
        match self {
            Self::Activity { source, .. } => source.root(),
            other => other,
        }
    }
}

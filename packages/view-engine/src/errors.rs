//! Engine Errors
//!
//! Every error carries enough identity (view, node index, binding index,
//! token) to pinpoint its source; structural errors are reported
//! synchronously to the caller of the check/resolve entry point and are
//! never swallowed.

use thiserror::Error;

use crate::types::{Value, ViewId};

#[derive(Debug, Error)]
pub enum EngineError {
    /// A view-definition factory failed. The factory is re-invoked once so
    /// the failure is reported against the factory itself rather than a
    /// shared internal helper.
    #[error("view definition construction failed: {source}")]
    Definition {
        #[source]
        source: anyhow::Error,
    },

    /// Dependency resolution exhausted the provider chain.
    #[error("no provider for {token} (requested on node {node_index} of view {})", .view.index())]
    NoProvider {
        view: ViewId,
        node_index: usize,
        token: String,
    },

    /// A binding evaluator or update function failed mid-traversal. The
    /// view is marked errored and excluded from future cycles.
    #[error("check cycle failed at node {node_index} of view {}: {source}", .view.index())]
    CheckFailed {
        view: ViewId,
        node_index: usize,
        #[source]
        source: Box<EngineError>,
    },

    /// No-changes verification found a binding whose recomputed value
    /// differs from the cached one.
    #[error(
        "expression changed after it was checked: view {}, node {node_index}, \
         binding {binding_index}: previous {previous:?}, current {current:?}",
        .view.index()
    )]
    ExpressionChanged {
        view: ViewId,
        node_index: usize,
        binding_index: usize,
        previous: Value,
        current: Value,
    },

    /// Operation attempted on a view after destruction.
    #[error("view {} is destroyed", .0.index())]
    DestroyedView(ViewId),

    /// Operation attempted on a view whose errored state has not been
    /// cleared by re-instantiation.
    #[error("view {} is in an errored state and refuses further checks", .0.index())]
    ErroredView(ViewId),

    /// A check was triggered while another check cycle was running.
    #[error("a check cycle is already in progress; re-entrant checks are rejected")]
    RecursiveCheck,

    /// A view definition or update function violated a structural
    /// requirement.
    #[error("malformed view definition: {0}")]
    Misconfigured(String),
}

impl EngineError {
    /// Wrap an error encountered while checking `node_index`, unless it
    /// already carries check identity.
    pub(crate) fn into_check_failed(self, view: ViewId, node_index: usize) -> EngineError {
        match self {
            e @ EngineError::CheckFailed { .. } | e @ EngineError::ExpressionChanged { .. } => e,
            other => EngineError::CheckFailed { view, node_index, source: Box::new(other) },
        }
    }
}

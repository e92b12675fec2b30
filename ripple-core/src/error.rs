//! Error types for graph construction and change propagation.

use thiserror::Error;

use crate::graph::NodeId;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building or wiring the dependency graph.
///
/// These are reported before any registration takes effect, so a failed
/// build never leaves a half-connected node behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Registering `dependent` on `node` would close a cycle.
    #[error("registering {dependent} as a dependent of {node} would create a cycle")]
    Cycle { node: NodeId, dependent: NodeId },

    /// An operator was built without an input it requires.
    #[error("operator `{operator}` requires at least one predecessor")]
    MissingPredecessor { operator: &'static str },

    /// The property behind a leaf adapter no longer exists.
    #[error("the observed property has been dropped")]
    PropertyGone,
}

/// Errors surfaced by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// An aggregate without an inverse was asked to remove an item and has
    /// no fallback registered.
    #[error("aggregate `{aggregate}` cannot remove items incrementally and has no fallback")]
    UnsupportedIncrementalOperation { aggregate: &'static str },

    /// A maintained value diverged from a from-scratch evaluation.
    ///
    /// This always indicates an operator bug; the subgraph must be rebuilt.
    #[error("consistency violation at {node}: {detail}")]
    ConsistencyViolation { node: NodeId, detail: String },

    /// A collaborator mutation addressed a position outside the sequence.
    #[error("index {index} out of range for sequence of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// A fallible projection rejected its input.
    ///
    /// `node` is `None` until the operator running the projection claims it.
    #[error("evaluation failed{}: {message}", at_node(.node))]
    Evaluation {
        node: Option<NodeId>,
        message: String,
    },

    #[error("propagation exceeded the depth limit of {limit}")]
    PropagationDepthExceeded { limit: usize },
}

impl Error {
    /// Build an evaluation error for a projection that failed.
    ///
    /// The node id is filled in by the operator that ran the projection.
    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation {
            node: None,
            message: message.into(),
        }
    }

    /// Attribute an unclaimed evaluation error to the node that raised it.
    pub(crate) fn at(self, node: NodeId) -> Self {
        match self {
            Self::Evaluation {
                node: None,
                message,
            } => Self::Evaluation {
                node: Some(node),
                message,
            },
            other => other,
        }
    }

    /// Whether the error is fatal for the subgraph that produced it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConsistencyViolation { .. })
    }
}

fn at_node(node: &Option<NodeId>) -> String {
    node.map(|node| format!(" at {node}")).unwrap_or_default()
}

//! Error taxonomy for the schedule subsystem.
//!
//! Every fallible public entry point returns [`ScheduleError`]. Each variant
//! carries enough identity (handle id, node id, argument position) to let a
//! caller reconstruct what was rejected without re-deriving it from a string.

use crate::ids::{HandleId, NodeId};
use thiserror::Error;

/// Errors produced while building or driving a [`Schedule`](crate::schedule::Schedule).
///
/// This is the sole error type returned from fallible public APIs in this
/// crate; `FunctorError` is the one variant that wraps a caller-supplied
/// numeric kernel's failure unchanged, per the propagation rule in the
/// error-handling design.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("handle {0:?} is not registered with this schedule")]
    UnknownHandle(HandleId),

    #[error("handle {0:?} is already registered with this schedule")]
    DuplicateHandle(HandleId),

    #[error("handle {0:?} is abstract and cannot be used as a source")]
    AbstractSource(HandleId),

    #[error(
        "operation rejected: argument {arg:?} at position {position} conflicts with deletion by node {deleter:?}"
    )]
    OperationNotAllowed {
        arg: HandleId,
        position: usize,
        deleter: NodeId,
    },

    #[error("operator producing handle {result:?} cannot execute: one or more arguments are still abstract")]
    NotReady { result: HandleId },

    #[error("operator producing handle {result:?} has already executed")]
    AlreadyExecuted { result: HandleId },

    #[error("operator functor failed: {0}")]
    FunctorError(#[from] anyhow::Error),

    #[error("handle {0:?} cannot be rebound: new argument has a different variable set")]
    IncompatibleVariables(HandleId),

    #[error("handle {0:?} is already concrete and cannot be materialized again")]
    AlreadyConcrete(HandleId),

    #[error("node {0:?} is not present in the schedule's active DAG")]
    UnknownNode(NodeId),

    #[error("node {0:?} cannot be marked executed: it still has unexecuted parents")]
    NotAvailable(NodeId),
}

pub type Result<T> = std::result::Result<T, ScheduleError>;

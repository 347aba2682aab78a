//! Error types for the mikado library
//!
//! User mistakes never show up here: they are reported through the message
//! side channel and leave the graph untouched. These errors describe broken
//! internal state or corrupted persisted data.

use crate::domain::GoalId;

/// An invariant of the goal graph (or one of its layers) does not hold
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsistencyError {
    #[error("Root goal {0} is missing or deleted")]
    MissingRoot(GoalId),

    #[error("All goals must be reachable from the root goal, unreachable: {0:?}")]
    Unreachable(Vec<GoalId>),

    #[error("Closed goal {lower} must not depend on open goal {upper}")]
    ClosedDependsOnOpen { lower: GoalId, upper: GoalId },

    #[error("Deleted goal {0} must have no edges")]
    DeletedHasEdges(GoalId),

    #[error("Forward and backward edges must always match each other")]
    EdgeIndexMismatch,

    #[error("Goal {0} must have at most one parent")]
    MultipleParents(GoalId),

    #[error("Circular dependency through goal {0}")]
    Cycle(GoalId),

    #[error("Edge {lower} -> {upper} refers to an unknown goal")]
    DanglingEdge { lower: GoalId, upper: GoalId },

    #[error("Duplicate goal id {0}")]
    DuplicateGoal(GoalId),

    #[error("Invalid goal id {0}")]
    InvalidGoalId(GoalId),

    #[error("Selection '{key}' points to {id}, which is not a live goal")]
    InvalidSelection { key: String, id: GoalId },

    #[error("Unknown selection key '{0}'")]
    UnknownSelectionKey(String),

    #[error("Zoom stack is malformed: {0}")]
    InvalidZoom(String),

    #[error("Autolink table is malformed: {0}")]
    InvalidAutolink(String),

    #[error("Event {index} can't be replayed: {reason}")]
    Replay { index: usize, reason: String },
}

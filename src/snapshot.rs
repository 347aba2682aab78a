//! Whole-state export and import of the persistent layers

use serde::{Deserialize, Serialize};

use crate::autolink::AutoLink;
use crate::domain::{GoalId, MessageFn};
use crate::error::ConsistencyError;
use crate::goaltree::{EdgeRecord, GoalRecord, Goals};
use crate::graph::Graph;
use crate::layers::{base, PersistentStack};
use crate::selectable::Selectable;
use crate::zoom::Zoom;

/// Every table needed to rebuild the persistent layers
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// (id, name or `null` for a deleted goal, open)
    pub goals: Vec<GoalRecord>,
    /// (source, target, edge type)
    pub edges: Vec<EdgeRecord>,
    /// (key, goal id)
    pub selection: Vec<(String, GoalId)>,
    /// (depth, goal id)
    pub zoom: Vec<(usize, GoalId)>,
    /// (goal id, keyword)
    pub autolink: Vec<(GoalId, String)>,
}

pub fn export(stack: &PersistentStack) -> Snapshot {
    let autolink = stack.goaltree();
    let selectable = autolink.goaltree();
    let goals = base(stack);
    Snapshot {
        goals: goals.goals_table(),
        edges: goals.edges_table(),
        selection: selectable.export(),
        zoom: stack.export(),
        autolink: autolink.export(),
    }
}

/// Rebuilds the persistent layers, failing if any table breaks an invariant
pub fn import(
    snapshot: Snapshot,
    message_fn: Option<MessageFn>,
) -> Result<PersistentStack, ConsistencyError> {
    let Snapshot {
        goals,
        edges,
        selection,
        zoom,
        autolink,
    } = snapshot;
    let goals = Goals::from_parts(goals, edges, message_fn)?;
    let selectable = Selectable::restore(goals, &selection)?;
    let autolink = AutoLink::restore(selectable, &autolink)?;
    let stack = Zoom::restore(autolink, &zoom)?;
    stack.verify()?;
    Ok(stack)
}

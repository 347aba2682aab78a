//! Complexity metrics of a goal graph

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::domain::{GoalId, ROOT_ID};
use crate::goaltree::Goals;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stats {
    /// Live goals
    pub goals: usize,
    /// Closed live goals
    pub closed: usize,
    pub edges: usize,
    /// Distinct paths from the root, summed over every other live goal
    pub paths: u64,
}

impl Stats {
    pub fn collect(goals: &Goals) -> Self {
        let live: Vec<GoalId> = goals.live_ids().collect();
        let counts = paths_count(goals, &live);
        Self {
            goals: live.len(),
            closed: live.iter().filter(|id| !goals.is_open(**id)).count(),
            edges: goals.edge_count(),
            paths: live
                .iter()
                .filter(|id| **id != ROOT_ID)
                .filter_map(|id| counts.get(id))
                .fold(0u64, |sum, count| sum.saturating_add(*count)),
        }
    }
}

/// Number of distinct paths from the root to each goal. A goal is finalized
/// only after every goal linking to it.
fn paths_count(goals: &Goals, live: &[GoalId]) -> BTreeMap<GoalId, u64> {
    let mut incoming: BTreeMap<GoalId, usize> = live
        .iter()
        .map(|id| (*id, goals.back_edges(*id).count()))
        .collect();
    let mut counts: BTreeMap<GoalId, u64> = live.iter().map(|id| (*id, 0)).collect();
    counts.insert(ROOT_ID, 1);

    let mut ready: VecDeque<GoalId> = incoming
        .iter()
        .filter(|(_, pending)| **pending == 0)
        .map(|(id, _)| *id)
        .collect();
    while let Some(goal_id) = ready.pop_front() {
        let current = counts.get(&goal_id).copied().unwrap_or(0);
        for (target, _) in goals.forward_edges(goal_id) {
            if let Some(count) = counts.get_mut(&target) {
                *count = count.saturating_add(current);
            }
            if let Some(pending) = incoming.get_mut(&target) {
                *pending -= 1;
                if *pending == 0 {
                    ready.push_back(target);
                }
            }
        }
    }
    counts
}

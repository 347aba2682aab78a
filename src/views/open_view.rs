use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::domain::{Command, EdgeType, Event, EventLog, GoalId, RenderResult};
use crate::error::ConsistencyError;
use crate::graph::Graph;

/// Hides closed goals when enabled. The selected goals stay visible and
/// edges leading through hidden goals are bridged to the next visible ones
/// as relations.
pub struct OpenView<G: Graph> {
    goaltree: G,
    open_only: bool,
}

impl<G: Graph> OpenView<G> {
    pub fn new(goaltree: G) -> Self {
        Self {
            goaltree,
            open_only: false,
        }
    }

    pub fn goaltree(&self) -> &G {
        &self.goaltree
    }

    pub fn goaltree_mut(&mut self) -> &mut G {
        &mut self.goaltree
    }

    pub fn is_enabled(&self) -> bool {
        self.open_only
    }
}

impl<G: Graph> Graph for OpenView<G> {
    fn accept(&mut self, command: Command) {
        match command {
            Command::ToggleOpenView => {
                self.open_only = !self.open_only;
                tracing::debug!(open_only = self.open_only, "open view toggled");
            }
            other => self.goaltree.accept(other),
        }
    }

    fn q(&self) -> RenderResult {
        let mut result = self.goaltree.q();
        if !self.open_only {
            return result;
        }
        let selected = result.selected_ids();
        let keep: BTreeSet<GoalId> = result
            .rows
            .iter()
            .filter(|row| row.is_open || selected.contains(&row.goal_id))
            .map(|row| row.goal_id)
            .collect();
        let forward: BTreeMap<GoalId, Vec<(GoalId, EdgeType)>> = result
            .rows
            .iter()
            .map(|row| (row.goal_id, row.edges.clone()))
            .collect();

        result.rows.retain(|row| keep.contains(&row.goal_id));
        for row in &mut result.rows {
            let mut bridged: BTreeMap<GoalId, EdgeType> = BTreeMap::new();
            for (target, edge_type) in &row.edges {
                if keep.contains(target) {
                    let slot = bridged.entry(*target).or_insert(*edge_type);
                    *slot = (*slot).max(*edge_type);
                    continue;
                }
                for reached in visible_through(&forward, &keep, *target) {
                    if reached != row.goal_id {
                        bridged.entry(reached).or_insert(EdgeType::Relation);
                    }
                }
            }
            row.edges = bridged.into_iter().collect();
        }
        result.roots.retain(|goal_id| keep.contains(goal_id));
        if result.roots.is_empty() {
            result.recompute_roots();
        }
        result
    }

    fn settings(&self, key: &str) -> Option<GoalId> {
        self.goaltree.settings(key)
    }

    fn events(&self) -> &EventLog {
        self.goaltree.events()
    }

    fn events_mut(&mut self) -> &mut EventLog {
        self.goaltree.events_mut()
    }

    fn error(&mut self, message: &str) {
        self.goaltree.error(message)
    }

    fn verify(&self) -> Result<(), ConsistencyError> {
        self.goaltree.verify()
    }

    fn replay(&mut self, event: &Event) -> Result<(), ConsistencyError> {
        self.goaltree.replay(event)
    }
}

/// The first visible goals met when walking from `start` through hidden ones
fn visible_through(
    forward: &BTreeMap<GoalId, Vec<(GoalId, EdgeType)>>,
    keep: &BTreeSet<GoalId>,
    start: GoalId,
) -> BTreeSet<GoalId> {
    let mut found = BTreeSet::new();
    let mut seen = BTreeSet::from([start]);
    let mut queue = VecDeque::from([start]);
    while let Some(goal_id) = queue.pop_front() {
        if keep.contains(&goal_id) {
            found.insert(goal_id);
            continue;
        }
        for (target, _) in forward.get(&goal_id).into_iter().flatten() {
            if seen.insert(*target) {
                queue.push_back(*target);
            }
        }
    }
    found
}

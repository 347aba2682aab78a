use std::collections::BTreeSet;

use serde_json::Value;

use crate::domain::{
    Command, Event, EventLog, GoalId, RenderResult, RenderRow, FILTER_PLACEHOLDER_ID,
};
use crate::error::ConsistencyError;
use crate::graph::Graph;

pub const FILTER_OPT: &str = "filter";

/// Shows only goals whose names contain a pattern, ignoring case
pub struct FilterView<G: Graph> {
    goaltree: G,
    pattern: String,
}

impl<G: Graph> FilterView<G> {
    pub fn new(goaltree: G) -> Self {
        Self {
            goaltree,
            pattern: String::new(),
        }
    }

    pub fn goaltree(&self) -> &G {
        &self.goaltree
    }

    pub fn goaltree_mut(&mut self) -> &mut G {
        &mut self.goaltree
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl<G: Graph> Graph for FilterView<G> {
    fn accept(&mut self, command: Command) {
        match command {
            Command::FilterBy { pattern } => {
                self.pattern = pattern.trim().to_lowercase();
                tracing::debug!(pattern = %self.pattern, "filter changed");
            }
            other => self.goaltree.accept(other),
        }
    }

    fn q(&self) -> RenderResult {
        let mut result = self.goaltree.q();
        if self.pattern.is_empty() {
            return result;
        }
        let matching: BTreeSet<GoalId> = result
            .rows
            .iter()
            .filter(|row| row.goal_id > 0 && row.name.to_lowercase().contains(&self.pattern))
            .map(|row| row.goal_id)
            .collect();
        let mut keep = matching.clone();
        keep.extend(result.selected_ids());
        super::retain_rows(&mut result, &keep);
        if matching.is_empty() {
            result.rows.push(RenderRow::new(
                FILTER_PLACEHOLDER_ID,
                format!("There are no goals matching filter '{}'", self.pattern),
                true,
                false,
            ));
        }
        result.recompute_roots();
        result
            .global_opts
            .insert(FILTER_OPT.to_string(), Value::from(self.pattern.clone()));
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

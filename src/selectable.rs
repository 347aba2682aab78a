//! Current and previous selection
//!
//! Commands that name no goal (id `0`) act on the selection: single-target
//! commands use the current selection, two-goal commands use the previous
//! selection as the lower end and the current one as the upper end.

use std::collections::{BTreeSet, VecDeque};

use serde_json::Value;

use crate::domain::{Command, Event, EventLog, GoalId, RenderResult, ROOT_ID, UNSPECIFIED};
use crate::error::ConsistencyError;
use crate::graph::{accept_tracked, Graph};

pub const SELECTION: &str = "selection";
pub const PREVIOUS_SELECTION: &str = "previous_selection";

pub struct Selectable<G: Graph> {
    goaltree: G,
    selection: GoalId,
    previous: GoalId,
}

impl<G: Graph> Selectable<G> {
    pub fn new(goaltree: G) -> Self {
        Self {
            goaltree,
            selection: ROOT_ID,
            previous: ROOT_ID,
        }
    }

    /// Restores the selection pairs of a snapshot
    pub fn restore(goaltree: G, pairs: &[(String, GoalId)]) -> Result<Self, ConsistencyError> {
        let mut layer = Self::new(goaltree);
        for (key, id) in pairs {
            match key.as_str() {
                SELECTION => layer.selection = *id,
                PREVIOUS_SELECTION => layer.previous = *id,
                other => return Err(ConsistencyError::UnknownSelectionKey(other.to_string())),
            }
        }
        layer.verify()?;
        Ok(layer)
    }

    pub fn goaltree(&self) -> &G {
        &self.goaltree
    }

    pub fn goaltree_mut(&mut self) -> &mut G {
        &mut self.goaltree
    }

    pub fn selection(&self) -> GoalId {
        self.selection
    }

    pub fn previous_selection(&self) -> GoalId {
        self.previous
    }

    /// Selection state as stored in a snapshot
    pub fn export(&self) -> Vec<(String, GoalId)> {
        vec![
            (SELECTION.to_string(), self.selection),
            (PREVIOUS_SELECTION.to_string(), self.previous),
        ]
    }

    fn or_selection(&self, goal_id: GoalId) -> GoalId {
        if goal_id == UNSPECIFIED {
            self.selection
        } else {
            goal_id
        }
    }

    fn or_previous(&self, goal_id: GoalId) -> GoalId {
        if goal_id == UNSPECIFIED {
            self.previous
        } else {
            goal_id
        }
    }

    fn select(&mut self, goal_id: GoalId) {
        self.selection = goal_id;
        self.goaltree.events_mut().push(Event::Select { id: goal_id });
    }

    fn hold_select(&mut self) {
        self.previous = self.selection;
        self.goaltree.events_mut().push(Event::HoldSelect {
            id: self.selection,
        });
    }

    fn accept_select(&mut self, goal_id: GoalId) {
        if self.goaltree.q().by_id(goal_id).is_none() {
            self.error(&format!("Goal {} does not exist", goal_id));
            return;
        }
        if goal_id != self.selection {
            self.select(goal_id);
        }
    }

    fn accept_toggle_close(&mut self, goal_id: GoalId, root: GoalId) {
        let goal_id = self.or_selection(goal_id);
        let command = Command::ToggleClose { goal_id, root };
        if accept_tracked(&mut self.goaltree, command).is_none() || goal_id != self.selection {
            return;
        }
        let result = self.goaltree.q();
        if result.by_id(goal_id).map_or(true, |row| row.is_open) {
            return;
        }
        let root = if root == UNSPECIFIED { ROOT_ID } else { root };
        let target = if self.previous != self.selection && result.by_id(self.previous).is_some() {
            self.previous
        } else {
            first_switchable_open(&result, root).unwrap_or(root)
        };
        self.select(target);
        self.hold_select();
    }

    fn accept_delete(&mut self, goal_id: GoalId) {
        let goal_id = self.or_selection(goal_id);
        let before = self.goaltree.q();
        let parent = before
            .rows
            .iter()
            .find(|row| row.children().any(|child| child == goal_id))
            .map(|row| row.goal_id)
            .unwrap_or(ROOT_ID);
        if accept_tracked(&mut self.goaltree, Command::Delete { goal_id }).is_none() {
            return;
        }
        let after = self.goaltree.q();
        if after.by_id(self.selection).is_none() {
            let target = if after.by_id(parent).is_some() {
                parent
            } else {
                ROOT_ID
            };
            self.select(target);
        }
        if after.by_id(self.previous).is_none() {
            self.hold_select();
        }
    }
}

/// The smallest open and switchable goal in the PARENT subtree of `root`
fn first_switchable_open(result: &RenderResult, root: GoalId) -> Option<GoalId> {
    let mut seen = BTreeSet::from([root]);
    let mut queue = VecDeque::from([root]);
    let mut candidates = BTreeSet::new();
    while let Some(goal_id) = queue.pop_front() {
        let Some(row) = result.by_id(goal_id) else {
            continue;
        };
        if row.is_open && row.is_switchable {
            candidates.insert(goal_id);
        }
        for child in row.children() {
            if seen.insert(child) {
                queue.push_back(child);
            }
        }
    }
    candidates.into_iter().next()
}

impl<G: Graph> Graph for Selectable<G> {
    fn accept(&mut self, command: Command) {
        match command {
            Command::Select { goal_id } => self.accept_select(goal_id),
            Command::HoldSelect => self.hold_select(),
            Command::Add {
                name,
                parent,
                edge_type,
            } => {
                let parent = self.or_selection(parent);
                self.goaltree.accept(Command::Add {
                    name,
                    parent,
                    edge_type,
                });
            }
            Command::Insert { name, lower, upper } => {
                let (lower, upper) = (self.or_previous(lower), self.or_selection(upper));
                self.goaltree.accept(Command::Insert { name, lower, upper });
            }
            Command::Rename { new_name, goal_id } => {
                let goal_id = self.or_selection(goal_id);
                self.goaltree.accept(Command::Rename { new_name, goal_id });
            }
            Command::ToggleClose { goal_id, root } => self.accept_toggle_close(goal_id, root),
            Command::Delete { goal_id } => self.accept_delete(goal_id),
            Command::ToggleLink {
                lower,
                upper,
                edge_type,
            } => {
                let (lower, upper) = (self.or_previous(lower), self.or_selection(upper));
                self.goaltree.accept(Command::ToggleLink {
                    lower,
                    upper,
                    edge_type,
                });
            }
            Command::ToggleZoom { goal_id } => {
                let goal_id = self.or_selection(goal_id);
                self.goaltree.accept(Command::ToggleZoom { goal_id });
            }
            Command::ToggleAutoLink { keyword, goal_id } => {
                let goal_id = self.or_selection(goal_id);
                self.goaltree
                    .accept(Command::ToggleAutoLink { keyword, goal_id });
            }
            other => self.goaltree.accept(other),
        }
    }

    fn q(&self) -> RenderResult {
        let mut result = self.goaltree.q();
        result
            .global_opts
            .insert(SELECTION.to_string(), Value::from(self.selection));
        result
            .global_opts
            .insert(PREVIOUS_SELECTION.to_string(), Value::from(self.previous));
        result
    }

    fn settings(&self, key: &str) -> Option<GoalId> {
        match key {
            SELECTION => Some(self.selection),
            PREVIOUS_SELECTION => Some(self.previous),
            _ => self.goaltree.settings(key),
        }
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
        self.goaltree.verify()?;
        let result = self.goaltree.q();
        for (key, id) in [(SELECTION, self.selection), (PREVIOUS_SELECTION, self.previous)] {
            if result.by_id(id).is_none() {
                return Err(ConsistencyError::InvalidSelection {
                    key: key.to_string(),
                    id,
                });
            }
        }
        Ok(())
    }

    fn replay(&mut self, event: &Event) -> Result<(), ConsistencyError> {
        match event {
            Event::Select { id } => self.selection = *id,
            Event::HoldSelect { id } => self.previous = *id,
            other => self.goaltree.replay(other)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{collect_messages, EdgeType};
    use crate::goaltree::Goals;
    use pretty_assertions::assert_eq;

    fn build() -> Selectable<Goals> {
        Selectable::new(Goals::new("Root", None))
    }

    #[test]
    fn test_root_is_selected_by_default() {
        let goals = build();
        let result = goals.q();
        assert_eq!(result.selection(), Some(1));
        assert_eq!(result.previous_selection(), Some(1));
        goals.verify().unwrap();
    }

    #[test]
    fn test_add_uses_selection_as_parent() {
        let mut goals = build();
        goals.accept(Command::add("A", UNSPECIFIED));
        goals.accept(Command::select(2));
        goals.accept(Command::add("B", UNSPECIFIED));

        let result = goals.q();
        assert_eq!(result.by_id(2).unwrap().edges, vec![(3, EdgeType::Parent)]);
        assert_eq!(result.selection(), Some(2));
    }

    #[test]
    fn test_select_unknown_goal_is_rejected() {
        let (message_fn, messages) = collect_messages();
        let mut goals = Selectable::new(Goals::new("Root", Some(message_fn)));
        goals.accept(Command::select(5));
        assert_eq!(goals.selection(), 1);
        assert_eq!(
            messages.lock().unwrap().last().map(String::as_str),
            Some("Goal 5 does not exist")
        );
    }

    #[test]
    fn test_link_uses_previous_and_current_selection() {
        let mut goals = build();
        goals.accept(Command::add("A", 1));
        goals.accept(Command::add("B", 1));
        goals.accept(Command::select(2));
        goals.accept(Command::HoldSelect);
        goals.accept(Command::select(3));
        goals.accept(Command::toggle_link(UNSPECIFIED, UNSPECIFIED, EdgeType::Blocker));

        assert_eq!(goals.goaltree().edge(2, 3), Some(EdgeType::Blocker));
    }

    #[test]
    fn test_closing_selection_prefers_previous() {
        let mut goals = build();
        goals.accept(Command::add("A", 1));
        goals.accept(Command::add("B", 1));
        goals.accept(Command::select(3));
        goals.accept(Command::HoldSelect);
        goals.accept(Command::select(2));

        goals.accept(Command::toggle_close(UNSPECIFIED));
        assert_eq!(goals.selection(), 3);
        assert_eq!(goals.previous_selection(), 3);
    }

    #[test]
    fn test_closing_selection_picks_smallest_switchable() {
        let mut goals = build();
        goals.accept(Command::add("A", 1)); // 2
        goals.accept(Command::add("B", 1)); // 3
        goals.accept(Command::add("C", 1)); // 4
        goals.accept(Command::select(3));
        goals.accept(Command::HoldSelect);

        goals.accept(Command::toggle_close(UNSPECIFIED));
        assert_eq!(goals.selection(), 2);
        assert_eq!(goals.previous_selection(), 2);
        goals.verify().unwrap();
    }

    #[test]
    fn test_closing_last_subgoal_falls_back_to_root() {
        let mut goals = build();
        goals.accept(Command::add("A", 1));
        goals.accept(Command::select(2));
        goals.accept(Command::HoldSelect);

        goals.accept(Command::toggle_close(UNSPECIFIED));
        // the root became switchable once its only child closed
        assert_eq!(goals.selection(), 1);
    }

    #[test]
    fn test_closing_other_goal_keeps_selection() {
        let mut goals = build();
        goals.accept(Command::add("A", 1));
        goals.accept(Command::add("B", 1));
        goals.accept(Command::select(3));

        goals.accept(Command::toggle_close(2));
        assert_eq!(goals.selection(), 3);
    }

    #[test]
    fn test_delete_selected_goal_selects_parent() {
        let mut goals = build();
        goals.accept(Command::add("A", 1));
        goals.accept(Command::select(2));
        goals.accept(Command::add("B", 2));
        goals.accept(Command::select(3));
        goals.accept(Command::HoldSelect);

        goals.accept(Command::delete(UNSPECIFIED));
        assert_eq!(goals.selection(), 2);
        assert_eq!(goals.previous_selection(), 2);
        goals.verify().unwrap();
    }

    #[test]
    fn test_delete_ancestor_of_selection() {
        let mut goals = build();
        goals.accept(Command::add("A", 1));
        goals.accept(Command::add("B", 2));
        goals.accept(Command::select(3));

        goals.accept(Command::delete(2));
        assert_eq!(goals.selection(), 1);
        goals.verify().unwrap();
    }

    #[test]
    fn test_replay_restores_selection() {
        let mut goals = build();
        goals.accept(Command::add("A", 1));
        goals.accept(Command::add("B", 1));
        goals.accept(Command::select(2));
        goals.accept(Command::HoldSelect);
        goals.accept(Command::select(3));

        let mut replayed = Selectable::new(Goals::empty(None));
        for event in goals.events().iter() {
            replayed.replay(event).unwrap();
        }
        replayed.verify().unwrap();
        assert_eq!(replayed.q(), goals.q());
    }

    #[test]
    fn test_restore_rejects_dead_selection() {
        let mut base = Goals::new("Root", None);
        base.accept(Command::add("A", 1));
        base.accept(Command::delete(2));

        let restored = Selectable::restore(base, &[(SELECTION.to_string(), 2)]);
        assert_eq!(
            restored.err(),
            Some(ConsistencyError::InvalidSelection {
                key: SELECTION.to_string(),
                id: 2
            })
        );

        let unknown = Selectable::restore(Goals::new("Root", None), &[("focus".to_string(), 1)]);
        assert_eq!(
            unknown.err(),
            Some(ConsistencyError::UnknownSelectionKey("focus".to_string()))
        );
    }
}

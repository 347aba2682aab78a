use std::collections::BTreeSet;

use crate::domain::{Command, Event, EventLog, GoalId, RenderResult};
use crate::error::ConsistencyError;
use crate::graph::Graph;

/// Shows only the goals that can be closed or reopened right now
pub struct SwitchableView<G: Graph> {
    goaltree: G,
    only_switchable: bool,
}

impl<G: Graph> SwitchableView<G> {
    pub fn new(goaltree: G) -> Self {
        Self {
            goaltree,
            only_switchable: false,
        }
    }

    pub fn goaltree(&self) -> &G {
        &self.goaltree
    }

    pub fn goaltree_mut(&mut self) -> &mut G {
        &mut self.goaltree
    }

    pub fn is_enabled(&self) -> bool {
        self.only_switchable
    }
}

impl<G: Graph> Graph for SwitchableView<G> {
    fn accept(&mut self, command: Command) {
        match command {
            Command::ToggleSwitchableView => {
                self.only_switchable = !self.only_switchable;
                tracing::debug!(only_switchable = self.only_switchable, "switchable view toggled");
            }
            other => self.goaltree.accept(other),
        }
    }

    fn q(&self) -> RenderResult {
        let mut result = self.goaltree.q();
        if !self.only_switchable {
            return result;
        }
        let mut keep: BTreeSet<GoalId> = result
            .rows
            .iter()
            .filter(|row| row.is_switchable)
            .map(|row| row.goal_id)
            .collect();
        keep.extend(result.selected_ids());
        super::retain_rows(&mut result, &keep);
        result.recompute_roots();
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EdgeType;
    use crate::goaltree::Goals;
    use crate::selectable::Selectable;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_only_switchable_goals_and_selection_remain() {
        let mut goals = SwitchableView::new(Selectable::new(Goals::new("Root", None)));
        goals.accept(Command::add("A", 1)); // 2
        goals.accept(Command::add("A1", 2)); // 3
        goals.accept(Command::add("B", 1)); // 4
        goals.accept(Command::toggle_link(4, 3, EdgeType::Blocker));
        goals.accept(Command::ToggleSwitchableView);

        let result = goals.q();
        // 2 and 4 wait for 3, the root waits for everything
        assert_eq!(result.ids(), BTreeSet::from([1, 3]));
        assert_eq!(result.roots, BTreeSet::from([1, 3]));

        goals.accept(Command::ToggleSwitchableView);
        assert_eq!(goals.q().ids(), BTreeSet::from([1, 2, 3, 4]));
    }
}

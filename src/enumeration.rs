//! Compact display numbering
//!
//! Goal ids grow forever because deleted goals keep their ids. This layer
//! renumbers the rendered goals `1..N` in id order so front ends can show
//! short numbers, and maps the numbers in incoming commands back.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::domain::{Command, Event, EventLog, GoalId, RenderResult, UNSPECIFIED};
use crate::error::ConsistencyError;
use crate::graph::Graph;
use crate::selectable::{PREVIOUS_SELECTION, SELECTION};

pub struct Enumeration<G: Graph> {
    goaltree: G,
}

/// Display number to goal id and back
struct Numbering {
    to_raw: BTreeMap<GoalId, GoalId>,
    to_display: BTreeMap<GoalId, GoalId>,
}

impl Numbering {
    fn of(result: &RenderResult) -> Self {
        let mut ids: Vec<GoalId> = result
            .rows
            .iter()
            .map(|row| row.goal_id)
            .filter(|id| *id > 0)
            .collect();
        ids.sort_unstable();
        let to_display: BTreeMap<GoalId, GoalId> = ids
            .into_iter()
            .zip(1..)
            .collect();
        let to_raw = to_display.iter().map(|(raw, shown)| (*shown, *raw)).collect();
        Self { to_raw, to_display }
    }

    fn display(&self, goal_id: GoalId) -> Option<GoalId> {
        if goal_id <= 0 {
            Some(goal_id)
        } else {
            self.to_display.get(&goal_id).copied()
        }
    }
}

impl<G: Graph> Enumeration<G> {
    pub fn new(goaltree: G) -> Self {
        Self { goaltree }
    }

    pub fn goaltree(&self) -> &G {
        &self.goaltree
    }

    pub fn goaltree_mut(&mut self) -> &mut G {
        &mut self.goaltree
    }

    pub fn into_inner(self) -> G {
        self.goaltree
    }

    /// Maps every id in `command` from display numbers to goal ids
    fn translate(&mut self, command: Command) -> Option<Command> {
        let numbering = Numbering::of(&self.goaltree.q());
        let mut missing = None;
        let mut raw = |goal_id: GoalId| -> GoalId {
            if goal_id == UNSPECIFIED {
                return goal_id;
            }
            match numbering.to_raw.get(&goal_id) {
                Some(raw) => *raw,
                None => {
                    missing.get_or_insert(goal_id);
                    goal_id
                }
            }
        };
        let command = match command {
            Command::Add {
                name,
                parent,
                edge_type,
            } => Command::Add {
                name,
                parent: raw(parent),
                edge_type,
            },
            Command::Insert { name, lower, upper } => Command::Insert {
                name,
                lower: raw(lower),
                upper: raw(upper),
            },
            Command::Rename { new_name, goal_id } => Command::Rename {
                new_name,
                goal_id: raw(goal_id),
            },
            Command::ToggleClose { goal_id, root } => Command::ToggleClose {
                goal_id: raw(goal_id),
                root: raw(root),
            },
            Command::Delete { goal_id } => Command::Delete {
                goal_id: raw(goal_id),
            },
            Command::ToggleLink {
                lower,
                upper,
                edge_type,
            } => Command::ToggleLink {
                lower: raw(lower),
                upper: raw(upper),
                edge_type,
            },
            Command::Select { goal_id } => Command::Select {
                goal_id: raw(goal_id),
            },
            Command::ToggleZoom { goal_id } => Command::ToggleZoom {
                goal_id: raw(goal_id),
            },
            Command::ToggleAutoLink { keyword, goal_id } => Command::ToggleAutoLink {
                keyword,
                goal_id: raw(goal_id),
            },
            other => other,
        };
        match missing {
            Some(number) => {
                self.error(&format!("No goal with number {}", number));
                None
            }
            None => Some(command),
        }
    }
}

impl<G: Graph> Graph for Enumeration<G> {
    fn accept(&mut self, command: Command) {
        if let Some(command) = self.translate(command) {
            self.goaltree.accept(command);
        }
    }

    fn q(&self) -> RenderResult {
        let mut result = self.goaltree.q();
        let numbering = Numbering::of(&result);
        for row in &mut result.rows {
            row.raw_id = row.goal_id;
            row.goal_id = numbering.display(row.goal_id).unwrap_or(row.goal_id);
            row.edges = row
                .edges
                .iter()
                .filter_map(|(target, edge_type)| {
                    numbering.display(*target).map(|shown| (shown, *edge_type))
                })
                .collect();
        }
        result.roots = result
            .roots
            .iter()
            .filter_map(|goal_id| numbering.display(*goal_id))
            .collect();
        for key in [SELECTION, PREVIOUS_SELECTION] {
            let shown = result
                .global_opts
                .get(key)
                .and_then(Value::as_i64)
                .and_then(|goal_id| numbering.display(goal_id));
            if let Some(shown) = shown {
                result.global_opts.insert(key.to_string(), Value::from(shown));
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{collect_messages, EdgeType};
    use crate::goaltree::Goals;
    use crate::selectable::Selectable;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    #[test]
    fn test_numbers_skip_deleted_goals() {
        let mut goals = Enumeration::new(Selectable::new(Goals::new("Root", None)));
        goals.accept(Command::add("A", 1)); // raw 2
        goals.accept(Command::add("B", 1)); // raw 3
        goals.accept(Command::add("C", 1)); // raw 4
        goals.accept(Command::delete(2));

        let result = goals.q();
        assert_eq!(result.ids(), BTreeSet::from([1, 2, 3]));
        let c = result.by_id(3).unwrap();
        assert_eq!(c.name, "C");
        assert_eq!(c.raw_id, 4);
        assert_eq!(
            result.by_id(1).unwrap().edges,
            vec![(2, EdgeType::Parent), (3, EdgeType::Parent)]
        );

        // number 3 now means raw goal 4
        goals.accept(Command::select(3));
        assert_eq!(goals.settings(SELECTION), Some(4));
        assert_eq!(goals.q().selection(), Some(3));
    }

    #[test]
    fn test_unknown_number_is_rejected() {
        let (message_fn, messages) = collect_messages();
        let mut goals = Enumeration::new(Selectable::new(Goals::new("Root", Some(message_fn))));
        let before = goals.events().len();
        goals.accept(Command::add("A", 7));
        assert_eq!(goals.events().len(), before);
        assert_eq!(
            messages.lock().unwrap().last().map(String::as_str),
            Some("No goal with number 7")
        );
    }
}

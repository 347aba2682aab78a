use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::domain::{Command, Event, EventLog, GoalId, RenderResult};
use crate::error::ConsistencyError;
use crate::graph::Graph;

pub const PROGRESS_ATTR: &str = "Progress";

/// Annotates each row with "closed/total" over its rendered PARENT subtree
pub struct ProgressView<G: Graph> {
    goaltree: G,
    show_progress: bool,
}

impl<G: Graph> ProgressView<G> {
    pub fn new(goaltree: G) -> Self {
        Self {
            goaltree,
            show_progress: false,
        }
    }

    pub fn goaltree(&self) -> &G {
        &self.goaltree
    }

    pub fn goaltree_mut(&mut self) -> &mut G {
        &mut self.goaltree
    }

    pub fn is_enabled(&self) -> bool {
        self.show_progress
    }
}

/// Closed and total counts for every row, children resolved before parents
fn progress(result: &RenderResult) -> BTreeMap<GoalId, (usize, usize)> {
    let present: BTreeSet<GoalId> = result.ids();
    let children: BTreeMap<GoalId, (bool, Vec<GoalId>)> = result
        .rows
        .iter()
        .map(|row| {
            let kids = row
                .children()
                .filter(|child| present.contains(child))
                .collect();
            (row.goal_id, (row.is_open, kids))
        })
        .collect();

    let mut done: BTreeMap<GoalId, (usize, usize)> = BTreeMap::new();
    let mut queue: VecDeque<GoalId> = children.keys().copied().collect();
    let mut stalled = 0;
    while let Some(goal_id) = queue.pop_front() {
        let Some((is_open, kids)) = children.get(&goal_id) else {
            continue;
        };
        if kids.iter().all(|kid| done.contains_key(kid)) {
            let (closed, total) = kids
                .iter()
                .filter_map(|kid| done.get(kid))
                .fold((usize::from(!is_open), 1), |(c, t), (kc, kt)| (c + kc, t + kt));
            done.insert(goal_id, (closed, total));
            stalled = 0;
        } else {
            queue.push_back(goal_id);
            stalled += 1;
            if stalled > queue.len() {
                tracing::warn!(pending = queue.len(), "progress aggregation made no progress");
                break;
            }
        }
    }
    done
}

impl<G: Graph> Graph for ProgressView<G> {
    fn accept(&mut self, command: Command) {
        match command {
            Command::ToggleProgress => {
                self.show_progress = !self.show_progress;
                tracing::debug!(show_progress = self.show_progress, "progress view toggled");
            }
            other => self.goaltree.accept(other),
        }
    }

    fn q(&self) -> RenderResult {
        let mut result = self.goaltree.q();
        if !self.show_progress {
            return result;
        }
        let counts = progress(&result);
        for row in &mut result.rows {
            if let Some((closed, total)) = counts.get(&row.goal_id) {
                row.attrs
                    .insert(PROGRESS_ATTR.to_string(), format!("{}/{}", closed, total));
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

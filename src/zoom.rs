//! Focus on a part of the goal tree
//!
//! The zoom stack always starts with the real root. When its top is some
//! other goal, queries only show that goal's PARENT subtree, the goals one hop
//! away from it, and a ghost copy of the real root linked to the zoom root.

use std::collections::{BTreeSet, VecDeque};

use crate::domain::{
    Command, EdgeType, Event, EventLog, GoalId, RenderResult, RenderRow, ROOT_ID, UNSPECIFIED,
};
use crate::error::ConsistencyError;
use crate::graph::{accept_tracked, Graph};
use crate::selectable::{PREVIOUS_SELECTION, SELECTION};

pub const ZOOM_ATTR: &str = "Zoom";
pub const ZOOM_ROOT: &str = "zoom_root";

pub struct Zoom<G: Graph> {
    goaltree: G,
    zoom_root: Vec<GoalId>,
}

impl<G: Graph> Zoom<G> {
    pub fn new(goaltree: G) -> Self {
        Self {
            goaltree,
            zoom_root: vec![ROOT_ID],
        }
    }

    /// Restores a zoom stack stored as (depth, goal) pairs, depth 1 being the root
    pub fn restore(goaltree: G, pairs: &[(usize, GoalId)]) -> Result<Self, ConsistencyError> {
        let mut layer = Self::new(goaltree);
        let mut pairs = pairs.to_vec();
        pairs.sort();
        for (index, (depth, goal_id)) in pairs.into_iter().enumerate() {
            if depth != index + 1 {
                return Err(ConsistencyError::InvalidZoom(format!(
                    "unexpected depth {} at position {}",
                    depth,
                    index + 1
                )));
            }
            if depth == 1 {
                if goal_id != ROOT_ID {
                    return Err(ConsistencyError::InvalidZoom(format!(
                        "stack must start with the root goal, found {}",
                        goal_id
                    )));
                }
                continue;
            }
            layer.zoom_root.push(goal_id);
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

    /// Current zoom root
    pub fn top(&self) -> GoalId {
        self.zoom_root.last().copied().unwrap_or(ROOT_ID)
    }

    /// Zoom stack as stored in a snapshot
    pub fn export(&self) -> Vec<(usize, GoalId)> {
        self.zoom_root
            .iter()
            .enumerate()
            .map(|(index, goal_id)| (index + 1, *goal_id))
            .collect()
    }

    /// Goals a user may interact with while zoomed, `None` when not zoomed
    fn visible_ids(&self, result: &RenderResult) -> Option<BTreeSet<GoalId>> {
        let top = self.top();
        if top == ROOT_ID {
            return None;
        }
        let mut visible = BTreeSet::from([top]);
        let mut queue = VecDeque::from([top]);
        while let Some(goal_id) = queue.pop_front() {
            if let Some(row) = result.by_id(goal_id) {
                for child in row.children() {
                    if visible.insert(child) {
                        queue.push_back(child);
                    }
                }
            }
        }
        let one_hop: Vec<GoalId> = visible
            .iter()
            .filter_map(|goal_id| result.by_id(*goal_id))
            .flat_map(|row| row.edges.iter().map(|(target, _)| *target))
            .collect();
        visible.extend(one_hop);
        Some(visible)
    }

    fn accept_toggle_zoom(&mut self, goal_id: GoalId) {
        let goal_id = if goal_id == UNSPECIFIED {
            self.goaltree.settings(SELECTION).unwrap_or(ROOT_ID)
        } else {
            goal_id
        };
        if goal_id == self.top() {
            if self.zoom_root.len() > 1 {
                self.zoom_root.pop();
                self.goaltree.events_mut().push(Event::Unzoom { id: goal_id });
            }
        } else if !self.zoom_root.contains(&goal_id) {
            if self.goaltree.q().by_id(goal_id).is_none() {
                self.error(&format!("Goal {} does not exist", goal_id));
                return;
            }
            self.zoom_root.push(goal_id);
            self.goaltree.events_mut().push(Event::Zoom {
                depth: self.zoom_root.len(),
                id: goal_id,
            });
        }
        self.fix_selection();
    }

    fn accept_select(&mut self, goal_id: GoalId) {
        let result = self.goaltree.q();
        if let Some(visible) = self.visible_ids(&result) {
            if result.by_id(goal_id).is_some() && !visible.contains(&goal_id) {
                self.error(&format!("Goal {} is outside of the zoomed area", goal_id));
                return;
            }
        }
        self.goaltree.accept(Command::Select { goal_id });
    }

    /// Passes a command through and then repairs the stack and the selection
    fn accept_and_fix(&mut self, command: Command) {
        if accept_tracked(&mut self.goaltree, command).is_some() {
            self.drop_dead_roots();
            self.fix_selection();
        }
    }

    fn drop_dead_roots(&mut self) {
        let result = self.goaltree.q();
        while self.zoom_root.len() > 1 {
            let top = self.top();
            if result.by_id(top).is_some() {
                break;
            }
            self.zoom_root.pop();
            self.goaltree.events_mut().push(Event::Unzoom { id: top });
        }
        let dead: Vec<GoalId> = self
            .zoom_root
            .iter()
            .copied()
            .filter(|goal_id| result.by_id(*goal_id).is_none())
            .collect();
        for goal_id in dead {
            self.zoom_root.retain(|id| *id != goal_id);
            self.goaltree.events_mut().push(Event::Unzoom { id: goal_id });
        }
    }

    fn fix_selection(&mut self) {
        let result = self.goaltree.q();
        let Some(visible) = self.visible_ids(&result) else {
            return;
        };
        let top = self.top();
        if let Some(selection) = self.goaltree.settings(SELECTION) {
            if !visible.contains(&selection) {
                self.goaltree.accept(Command::Select { goal_id: top });
            }
        }
        if let Some(previous) = self.goaltree.settings(PREVIOUS_SELECTION) {
            if !visible.contains(&previous) {
                self.goaltree.accept(Command::HoldSelect);
            }
        }
    }
}

impl<G: Graph> Graph for Zoom<G> {
    fn accept(&mut self, command: Command) {
        match command {
            Command::ToggleZoom { goal_id } => self.accept_toggle_zoom(goal_id),
            Command::Select { goal_id } => self.accept_select(goal_id),
            Command::ToggleClose { goal_id, .. } => {
                let root = self.top();
                self.accept_and_fix(Command::ToggleClose { goal_id, root })
            }
            command @ (Command::Delete { .. }
            | Command::Insert { .. }
            | Command::ToggleLink { .. }) => self.accept_and_fix(command),
            other => self.goaltree.accept(other),
        }
    }

    fn q(&self) -> RenderResult {
        let mut result = self.goaltree.q();
        let Some(visible) = self.visible_ids(&result) else {
            return result;
        };
        let top = self.top();
        let zoom_name = result
            .by_id(top)
            .map(|row| row.name.clone())
            .unwrap_or_default();
        let ghost = result.by_id(ROOT_ID).map(|root| {
            let mut ghost = RenderRow::new(ROOT_ID, root.name.clone(), root.is_open, false);
            ghost.edges = vec![(top, EdgeType::Blocker)];
            ghost.attrs.insert(ZOOM_ATTR.to_string(), zoom_name);
            ghost
        });
        result.rows.retain(|row| visible.contains(&row.goal_id));
        for row in &mut result.rows {
            row.edges.retain(|(target, _)| visible.contains(target));
        }
        result.rows.extend(ghost);
        result.rows.sort_by_key(|row| row.goal_id);
        result.roots = BTreeSet::from([ROOT_ID]);
        result
    }

    fn settings(&self, key: &str) -> Option<GoalId> {
        match key {
            ZOOM_ROOT => Some(self.top()),
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
        if self.zoom_root.first() != Some(&ROOT_ID) {
            return Err(ConsistencyError::InvalidZoom(
                "stack must start with the root goal".to_string(),
            ));
        }
        let result = self.goaltree.q();
        let mut seen = BTreeSet::new();
        for goal_id in &self.zoom_root {
            if result.by_id(*goal_id).is_none() {
                return Err(ConsistencyError::InvalidZoom(format!(
                    "goal {} is not alive",
                    goal_id
                )));
            }
            if !seen.insert(*goal_id) {
                return Err(ConsistencyError::InvalidZoom(format!(
                    "goal {} is zoomed twice",
                    goal_id
                )));
            }
        }
        Ok(())
    }

    fn replay(&mut self, event: &Event) -> Result<(), ConsistencyError> {
        match event {
            Event::Zoom { depth, id } => {
                if *depth < 2 {
                    return Err(ConsistencyError::InvalidZoom(format!(
                        "zoom depth {} is below the root",
                        depth
                    )));
                }
                self.zoom_root.truncate(depth - 1);
                self.zoom_root.push(*id);
            }
            Event::Unzoom { id } => {
                if *id != ROOT_ID {
                    self.zoom_root.retain(|goal_id| goal_id != id);
                }
            }
            other => self.goaltree.replay(other)?,
        }
        Ok(())
    }
}

//! Keyword based automatic linking
//!
//! A goal may own a keyword. Every goal created or renamed later whose name
//! contains that keyword (ignoring case) receives a RELATION edge from it.

use std::collections::BTreeMap;

use crate::domain::{
    Command, EdgeType, Event, EventLog, GoalId, RenderResult, ROOT_ID, UNSPECIFIED,
};
use crate::error::ConsistencyError;
use crate::graph::{accept_tracked, Graph};

pub const AUTOLINK_ATTR: &str = "Autolink";

pub struct AutoLink<G: Graph> {
    goaltree: G,
    keywords: BTreeMap<String, GoalId>,
    back_kw: BTreeMap<GoalId, String>,
}

impl<G: Graph> AutoLink<G> {
    pub fn new(goaltree: G) -> Self {
        Self {
            goaltree,
            keywords: BTreeMap::new(),
            back_kw: BTreeMap::new(),
        }
    }

    /// Restores the autolink table of a snapshot
    pub fn restore(goaltree: G, pairs: &[(GoalId, String)]) -> Result<Self, ConsistencyError> {
        let mut layer = Self::new(goaltree);
        for (goal_id, keyword) in pairs {
            let keyword = normalize(keyword);
            if keyword.is_empty() {
                return Err(ConsistencyError::InvalidAutolink(format!(
                    "empty keyword for goal {}",
                    goal_id
                )));
            }
            if layer.keywords.contains_key(&keyword) || layer.back_kw.contains_key(goal_id) {
                return Err(ConsistencyError::InvalidAutolink(format!(
                    "duplicate entry '{}' for goal {}",
                    keyword, goal_id
                )));
            }
            layer.keywords.insert(keyword.clone(), *goal_id);
            layer.back_kw.insert(*goal_id, keyword);
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

    pub fn keyword(&self, goal_id: GoalId) -> Option<&str> {
        self.back_kw.get(&goal_id).map(String::as_str)
    }

    /// Autolink table as stored in a snapshot
    pub fn export(&self) -> Vec<(GoalId, String)> {
        self.back_kw
            .iter()
            .map(|(goal_id, keyword)| (*goal_id, keyword.clone()))
            .collect()
    }

    fn remove_keyword_of(&mut self, goal_id: GoalId) {
        if let Some(keyword) = self.back_kw.remove(&goal_id) {
            self.keywords.remove(&keyword);
            self.goaltree
                .events_mut()
                .push(Event::RemoveAutolink { id: goal_id });
        }
    }

    fn accept_toggle_autolink(&mut self, keyword: String, goal_id: GoalId) {
        let goal_id = if goal_id == UNSPECIFIED {
            self.goaltree.settings("selection").unwrap_or(ROOT_ID)
        } else {
            goal_id
        };
        let is_open = match self.goaltree.q().by_id(goal_id) {
            Some(row) => row.is_open,
            None => {
                self.error(&format!("Goal {} does not exist", goal_id));
                return;
            }
        };
        if !is_open {
            self.error("Autolink cannot be set for closed goals");
            return;
        }
        if goal_id == ROOT_ID {
            self.error("Autolink cannot be set for the root goal");
            return;
        }
        let keyword = normalize(&keyword);
        if self.keyword(goal_id) == Some(keyword.as_str()) {
            return;
        }
        self.remove_keyword_of(goal_id);
        if keyword.is_empty() {
            return;
        }
        if let Some(owner) = self.keywords.get(&keyword).copied() {
            self.remove_keyword_of(owner);
        }
        self.keywords.insert(keyword.clone(), goal_id);
        self.back_kw.insert(goal_id, keyword.clone());
        self.goaltree.events_mut().push(Event::AddAutolink {
            id: goal_id,
            keyword,
        });
    }

    /// Links every keyword owner whose keyword occurs in `name` to `goal_id`
    fn make_links(&mut self, goal_id: GoalId, name: &str) {
        let name = name.to_lowercase();
        let owners: Vec<GoalId> = self
            .keywords
            .iter()
            .filter(|(keyword, owner)| **owner != goal_id && name.contains(keyword.as_str()))
            .map(|(_, owner)| *owner)
            .collect();
        if owners.is_empty() {
            return;
        }
        let result = self.goaltree.q();
        for owner in owners {
            let linked = result
                .by_id(owner)
                .map_or(true, |row| row.edges.iter().any(|(target, _)| *target == goal_id));
            if !linked {
                tracing::debug!(owner, goal_id, "autolink creates a relation");
                self.goaltree
                    .accept(Command::toggle_link(owner, goal_id, EdgeType::Relation));
            }
        }
    }

    fn accept_and_link(&mut self, command: Command) {
        let Some(before) = accept_tracked(&mut self.goaltree, command) else {
            return;
        };
        let created: Vec<(GoalId, String)> = self
            .goaltree
            .events()
            .since(before)
            .filter_map(|event| match event {
                Event::Add { id, name, .. } | Event::Rename { id, new_name: name } => {
                    Some((*id, name.clone()))
                }
                _ => None,
            })
            .collect();
        for (goal_id, name) in created {
            self.make_links(goal_id, &name);
        }
    }

    fn accept_delete(&mut self, command: Command) {
        let Some(before) = accept_tracked(&mut self.goaltree, command) else {
            return;
        };
        let deleted: Vec<GoalId> = self
            .goaltree
            .events()
            .since(before)
            .filter_map(|event| match event {
                Event::Delete { id } => Some(*id),
                _ => None,
            })
            .collect();
        for goal_id in deleted {
            self.remove_keyword_of(goal_id);
        }
    }
}

fn normalize(keyword: &str) -> String {
    keyword.trim().to_lowercase()
}

impl<G: Graph> Graph for AutoLink<G> {
    fn accept(&mut self, command: Command) {
        match command {
            Command::ToggleAutoLink { keyword, goal_id } => {
                self.accept_toggle_autolink(keyword, goal_id)
            }
            command @ (Command::Add { .. } | Command::Insert { .. } | Command::Rename { .. }) => {
                self.accept_and_link(command)
            }
            command @ Command::Delete { .. } => self.accept_delete(command),
            other => self.goaltree.accept(other),
        }
    }

    fn q(&self) -> RenderResult {
        let mut result = self.goaltree.q();
        if self.back_kw.is_empty() {
            return result;
        }
        for row in &mut result.rows {
            if let Some(keyword) = self.back_kw.get(&row.raw_id) {
                row.attrs
                    .insert(AUTOLINK_ATTR.to_string(), keyword.clone());
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
        self.goaltree.verify()?;
        if self.keywords.len() != self.back_kw.len() {
            return Err(ConsistencyError::InvalidAutolink(
                "keyword indexes differ in size".to_string(),
            ));
        }
        let result = self.goaltree.q();
        for (goal_id, keyword) in &self.back_kw {
            if self.keywords.get(keyword) != Some(goal_id) {
                return Err(ConsistencyError::InvalidAutolink(format!(
                    "keyword '{}' is not bound to goal {}",
                    keyword, goal_id
                )));
            }
            if *goal_id == ROOT_ID || result.by_id(*goal_id).is_none() {
                return Err(ConsistencyError::InvalidAutolink(format!(
                    "goal {} can't own a keyword",
                    goal_id
                )));
            }
        }
        Ok(())
    }

    fn replay(&mut self, event: &Event) -> Result<(), ConsistencyError> {
        match event {
            Event::AddAutolink { id, keyword } => {
                self.keywords.insert(keyword.clone(), *id);
                self.back_kw.insert(*id, keyword.clone());
            }
            Event::RemoveAutolink { id } => {
                if let Some(keyword) = self.back_kw.remove(id) {
                    self.keywords.remove(&keyword);
                }
            }
            other => self.goaltree.replay(other)?,
        }
        Ok(())
    }
}

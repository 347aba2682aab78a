//! The base goal graph
//!
//! `Goals` owns every goal, the typed edges between them, the closed set and
//! the event log. It enforces the structural rules of the Mikado graph: a
//! single parent per goal, no cycles, closed goals never depending on open
//! ones, and tombstones instead of real removal.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::domain::{
    Command, EdgeType, Event, EventLog, GoalId, MessageFn, RenderResult, RenderRow, ROOT_ID,
};
use crate::error::ConsistencyError;
use crate::graph::Graph;

/// Adjacency by source, then target
pub type EdgeMap = BTreeMap<GoalId, BTreeMap<GoalId, EdgeType>>;

type Adjacency = BTreeMap<GoalId, BTreeSet<GoalId>>;

/// A goal as stored in a snapshot: id, name (`None` for a tombstone), open flag
pub type GoalRecord = (GoalId, Option<String>, bool);

/// An edge as stored in a snapshot: source, target, type
pub type EdgeRecord = (GoalId, GoalId, EdgeType);

pub struct Goals {
    goals: BTreeMap<GoalId, Option<String>>,
    closed: BTreeSet<GoalId>,
    edges_forward: EdgeMap,
    edges_backward: EdgeMap,
    events: EventLog,
    message_fn: Option<MessageFn>,
}

impl Goals {
    /// Creates a graph holding only the open root goal
    pub fn new(name: impl Into<String>, message_fn: Option<MessageFn>) -> Self {
        let mut goals = Self::empty(message_fn);
        goals.add_no_link(name.into(), true);
        goals
    }

    /// Creates a graph without any goal, the starting point of a replay
    pub fn empty(message_fn: Option<MessageFn>) -> Self {
        Self {
            goals: BTreeMap::new(),
            closed: BTreeSet::new(),
            edges_forward: BTreeMap::new(),
            edges_backward: BTreeMap::new(),
            events: EventLog::new(),
            message_fn,
        }
    }

    /// Rebuilds a graph from snapshot tables and verifies it
    pub fn from_parts(
        goals: Vec<GoalRecord>,
        edges: Vec<EdgeRecord>,
        message_fn: Option<MessageFn>,
    ) -> Result<Self, ConsistencyError> {
        let mut result = Self::empty(message_fn);
        for (id, name, open) in goals {
            if id <= 0 {
                return Err(ConsistencyError::InvalidGoalId(id));
            }
            if result.goals.contains_key(&id) {
                return Err(ConsistencyError::DuplicateGoal(id));
            }
            if name.is_none() || !open {
                result.closed.insert(id);
            }
            result.goals.insert(id, name);
        }
        for (lower, upper, edge_type) in edges {
            if !result.goals.contains_key(&lower) || !result.goals.contains_key(&upper) {
                return Err(ConsistencyError::DanglingEdge { lower, upper });
            }
            result.insert_edge(lower, upper, edge_type);
        }
        result.verify()?;
        Ok(result)
    }

    pub fn set_message_fn(&mut self, message_fn: Option<MessageFn>) {
        self.message_fn = message_fn;
    }

    // Read access

    /// Name of a live goal
    pub fn name(&self, goal_id: GoalId) -> Option<&str> {
        self.goals.get(&goal_id).and_then(|name| name.as_deref())
    }

    pub fn is_live(&self, goal_id: GoalId) -> bool {
        self.name(goal_id).is_some()
    }

    pub fn is_open(&self, goal_id: GoalId) -> bool {
        self.is_live(goal_id) && !self.closed.contains(&goal_id)
    }

    /// Ids of every goal that is not a tombstone
    pub fn live_ids(&self) -> impl Iterator<Item = GoalId> + '_ {
        self.goals
            .iter()
            .filter(|(_, name)| name.is_some())
            .map(|(id, _)| *id)
    }

    pub fn forward_edges(&self, goal_id: GoalId) -> impl Iterator<Item = (GoalId, EdgeType)> + '_ {
        self.edges_forward
            .get(&goal_id)
            .into_iter()
            .flat_map(|targets| targets.iter().map(|(id, t)| (*id, *t)))
    }

    pub fn back_edges(&self, goal_id: GoalId) -> impl Iterator<Item = (GoalId, EdgeType)> + '_ {
        self.edges_backward
            .get(&goal_id)
            .into_iter()
            .flat_map(|sources| sources.iter().map(|(id, t)| (*id, *t)))
    }

    pub fn edge(&self, lower: GoalId, upper: GoalId) -> Option<EdgeType> {
        self.edges_forward
            .get(&lower)
            .and_then(|targets| targets.get(&upper))
            .copied()
    }

    pub fn edge_count(&self) -> usize {
        self.edges_forward.values().map(BTreeMap::len).sum()
    }

    /// Source of the PARENT edge pointing at `goal_id`
    pub fn parent(&self, goal_id: GoalId) -> Option<GoalId> {
        self.back_edges(goal_id)
            .find(|(_, edge_type)| *edge_type == EdgeType::Parent)
            .map(|(source, _)| source)
    }

    /// Goal table for export, tombstones included
    pub fn goals_table(&self) -> Vec<GoalRecord> {
        self.goals
            .iter()
            .map(|(id, name)| (*id, name.clone(), name.is_some() && !self.closed.contains(id)))
            .collect()
    }

    /// Edge table for export
    pub fn edges_table(&self) -> Vec<EdgeRecord> {
        self.edges_forward
            .iter()
            .flat_map(|(lower, targets)| {
                targets
                    .iter()
                    .map(move |(upper, edge_type)| (*lower, *upper, *edge_type))
            })
            .collect()
    }

    /// Whether the open/closed state of a goal may be flipped right now
    pub fn is_switchable(&self, goal_id: GoalId) -> bool {
        if self.closed.contains(&goal_id) {
            !self.back_edges(goal_id).any(|(source, edge_type)| {
                edge_type.is_blocking() && self.closed.contains(&source)
            })
        } else {
            self.forward_edges(goal_id)
                .filter(|(_, edge_type)| edge_type.is_blocking())
                .all(|(target, _)| self.closed.contains(&target))
                && !self.blocked_by_parent(goal_id)
        }
    }

    /// Walks up the PARENT chain looking for an ancestor blocked by an open
    /// goal from outside of its own subtree
    fn blocked_by_parent(&self, goal_id: GoalId) -> bool {
        let mut visited = BTreeSet::new();
        let mut current = self.parent(goal_id);
        while let Some(ancestor) = current {
            if !visited.insert(ancestor) {
                break;
            }
            let open_blockers: Vec<GoalId> = self
                .forward_edges(ancestor)
                .filter(|(target, edge_type)| {
                    *edge_type == EdgeType::Blocker && !self.closed.contains(target)
                })
                .map(|(target, _)| target)
                .collect();
            if !open_blockers.is_empty() {
                let descendants = parent_descendants(&self.edges_forward, ancestor);
                if open_blockers.iter().any(|b| !descendants.contains(b)) {
                    return true;
                }
            }
            current = self.parent(ancestor);
        }
        false
    }

    // Command handlers

    fn ensure_live(&mut self, goal_id: GoalId) -> bool {
        if self.is_live(goal_id) {
            true
        } else {
            self.error(&format!("Goal {} does not exist", goal_id));
            false
        }
    }

    fn accept_add(&mut self, name: String, parent: GoalId, edge_type: EdgeType) -> Option<GoalId> {
        if !self.ensure_live(parent) {
            return None;
        }
        if self.closed.contains(&parent) {
            self.error("A new subgoal cannot be added to the closed one");
            return None;
        }
        let goal_id = self.add_no_link(name, true);
        self.link(parent, goal_id, edge_type);
        Some(goal_id)
    }

    fn accept_insert(&mut self, name: String, lower: GoalId, upper: GoalId) {
        if lower == upper {
            self.error("A new goal can be inserted only between two different goals");
            return;
        }
        if !self.ensure_live(lower) || !self.ensure_live(upper) {
            return;
        }
        if self.closed.contains(&lower) {
            self.error("A new subgoal cannot be added to the closed one");
            return;
        }
        let existing = self.edge(lower, upper);
        let edge_type = existing.unwrap_or(EdgeType::Blocker);
        if existing.is_none() {
            if let Err(message) = self.check_new_link(lower, upper, edge_type) {
                self.error(message);
                return;
            }
        }
        let goal_id = self.add_no_link(name, true);
        self.link(lower, goal_id, edge_type);
        if existing.is_some() {
            self.unlink(lower, upper);
        }
        self.link(goal_id, upper, edge_type);
    }

    fn accept_rename(&mut self, new_name: String, goal_id: GoalId) {
        if !self.ensure_live(goal_id) {
            return;
        }
        self.goals.insert(goal_id, Some(new_name.clone()));
        self.events.push(Event::Rename {
            new_name,
            id: goal_id,
        });
    }

    fn accept_toggle_close(&mut self, goal_id: GoalId) {
        if !self.ensure_live(goal_id) {
            return;
        }
        let is_closed = self.closed.contains(&goal_id);
        if !self.is_switchable(goal_id) {
            if is_closed {
                self.error("This goal can't be reopened because other subgoals block it");
            } else {
                self.error("This goal can't be closed because it has open subgoals");
            }
            return;
        }
        if is_closed {
            self.closed.remove(&goal_id);
        } else {
            self.closed.insert(goal_id);
        }
        self.events.push(Event::ToggleClose {
            will_be_open: is_closed,
            id: goal_id,
        });
    }

    fn accept_delete(&mut self, goal_id: GoalId) {
        if goal_id == ROOT_ID {
            self.error("Root goal can't be deleted");
            return;
        }
        if !self.ensure_live(goal_id) {
            return;
        }
        let heir = self
            .parent(goal_id)
            .or_else(|| self.back_edges(goal_id).map(|(source, _)| source).next())
            .unwrap_or(ROOT_ID);
        let subtree = self.subtree_postorder(goal_id);
        let members: BTreeSet<GoalId> = subtree.iter().copied().collect();

        let mut relinks: BTreeMap<GoalId, EdgeType> = BTreeMap::new();
        for member in &subtree {
            for (target, edge_type) in self.forward_edges(*member) {
                if edge_type == EdgeType::Parent || members.contains(&target) || target == heir {
                    continue;
                }
                let slot = relinks.entry(target).or_insert(edge_type);
                *slot = (*slot).max(edge_type);
            }
        }
        let heir_closed = self.closed.contains(&heir);
        for member in &subtree {
            self.tombstone(*member);
        }
        for (target, mut edge_type) in relinks {
            if heir_closed && !self.closed.contains(&target) {
                edge_type = EdgeType::Relation;
            }
            if edge_type == EdgeType::Blocker
                && self.would_block_own_blocker(heir, target, edge_type)
            {
                edge_type = EdgeType::Relation;
            }
            match self.edge(heir, target) {
                Some(existing) if existing >= edge_type => continue,
                Some(_) => self.unlink(heir, target),
                None => {}
            }
            self.link(heir, target, edge_type);
        }
        for member in subtree {
            self.events.push(Event::Delete { id: member });
        }
    }

    fn accept_toggle_link(&mut self, lower: GoalId, upper: GoalId, edge_type: EdgeType) {
        if lower == upper {
            self.error("Goal can't be linked to itself");
            return;
        }
        if !self.ensure_live(lower) || !self.ensure_live(upper) {
            return;
        }
        match self.edge(lower, upper) {
            Some(current) if current == edge_type => self.remove_existing_link(lower, upper),
            current => self.create_new_link(lower, upper, edge_type, current),
        }
    }

    fn remove_existing_link(&mut self, lower: GoalId, upper: GoalId) {
        if self.back_edges(upper).count() == 1 {
            self.error("Can't remove the last link");
            return;
        }
        self.unlink(lower, upper);
    }

    fn create_new_link(
        &mut self,
        lower: GoalId,
        upper: GoalId,
        edge_type: EdgeType,
        current: Option<EdgeType>,
    ) {
        if let Err(message) = self.check_new_link(lower, upper, edge_type) {
            self.error(message);
            return;
        }
        if edge_type == EdgeType::Parent {
            if let Some(old_parent) = self.parent(upper).filter(|p| *p != lower) {
                self.unlink(old_parent, upper);
                self.link(old_parent, upper, EdgeType::Relation);
            }
        }
        if current.is_some() {
            self.unlink(lower, upper);
        }
        self.link(lower, upper, edge_type);
    }

    /// Validates a new (or retyped) edge without touching the graph
    fn check_new_link(
        &self,
        lower: GoalId,
        upper: GoalId,
        edge_type: EdgeType,
    ) -> Result<(), &'static str> {
        if edge_type.is_blocking()
            && self.closed.contains(&lower)
            && !self.closed.contains(&upper)
        {
            return Err("An open goal can't block already closed one");
        }
        if reaches(&self.edges_forward, upper, lower) {
            return Err("Circular dependencies between goals are not allowed");
        }
        if edge_type.is_blocking() && self.would_block_own_blocker(lower, upper, edge_type) {
            return Err("This link would make a goal block its own blocker");
        }
        Ok(())
    }

    /// Whether the new edge closes a cycle in the depends-on relation.
    /// Only dependencies the edge introduces are followed, so a cycle
    /// elsewhere in the graph doesn't decide the outcome.
    fn would_block_own_blocker(&self, lower: GoalId, upper: GoalId, edge_type: EdgeType) -> bool {
        let current = DependsOn::new(self);
        let mut hypothetical = DependsOn::new(self).with(lower, upper, edge_type);
        if edge_type == EdgeType::Parent {
            if let Some(old_parent) = self.parent(upper).filter(|p| *p != lower) {
                hypothetical = hypothetical.with(old_parent, upper, EdgeType::Relation);
            }
        }

        // Without PARENT changes only `lower` and its subtree gain dependencies
        let reshapes_tree =
            edge_type == EdgeType::Parent || self.edge(lower, upper) == Some(EdgeType::Parent);
        let sources: Vec<GoalId> = if reshapes_tree {
            self.live_ids().collect()
        } else {
            std::iter::once(lower)
                .chain(hypothetical.descendants(lower))
                .collect()
        };

        sources.into_iter().any(|source| {
            let before = current.dependencies(source);
            hypothetical
                .dependencies(source)
                .into_iter()
                .filter(|target| !before.contains(target))
                .any(|target| hypothetical.reaches(target, source))
        })
    }

    // Low level mutations

    fn add_no_link(&mut self, name: String, is_open: bool) -> GoalId {
        let goal_id = self.goals.keys().next_back().copied().unwrap_or(0) + 1;
        self.goals.insert(goal_id, Some(name.clone()));
        if !is_open {
            self.closed.insert(goal_id);
        }
        self.events.push(Event::Add {
            id: goal_id,
            name,
            open: is_open,
        });
        goal_id
    }

    fn insert_edge(&mut self, lower: GoalId, upper: GoalId, edge_type: EdgeType) {
        self.edges_forward
            .entry(lower)
            .or_default()
            .insert(upper, edge_type);
        self.edges_backward
            .entry(upper)
            .or_default()
            .insert(lower, edge_type);
    }

    fn remove_edge(&mut self, lower: GoalId, upper: GoalId) -> Option<EdgeType> {
        let removed = self
            .edges_forward
            .get_mut(&lower)
            .and_then(|targets| targets.remove(&upper));
        if let Some(sources) = self.edges_backward.get_mut(&upper) {
            sources.remove(&lower);
        }
        removed
    }

    fn link(&mut self, lower: GoalId, upper: GoalId, edge_type: EdgeType) {
        self.insert_edge(lower, upper, edge_type);
        self.events.push(Event::Link {
            lower,
            upper,
            edge_type,
        });
    }

    fn unlink(&mut self, lower: GoalId, upper: GoalId) {
        if let Some(edge_type) = self.remove_edge(lower, upper) {
            self.events.push(Event::Unlink {
                lower,
                upper,
                edge_type,
            });
        }
    }

    /// Turns a goal into a tombstone and drops every edge touching it
    fn tombstone(&mut self, goal_id: GoalId) {
        self.goals.insert(goal_id, None);
        self.closed.insert(goal_id);
        if let Some(targets) = self.edges_forward.remove(&goal_id) {
            for target in targets.keys() {
                if let Some(sources) = self.edges_backward.get_mut(target) {
                    sources.remove(&goal_id);
                }
            }
        }
        if let Some(sources) = self.edges_backward.remove(&goal_id) {
            for source in sources.keys() {
                if let Some(targets) = self.edges_forward.get_mut(source) {
                    targets.remove(&goal_id);
                }
            }
        }
    }

    /// The PARENT subtree of `goal_id`, children before their parents
    fn subtree_postorder(&self, goal_id: GoalId) -> Vec<GoalId> {
        let mut order = Vec::new();
        let mut stack = vec![(goal_id, false)];
        let mut visited = BTreeSet::new();
        while let Some((current, expanded)) = stack.pop() {
            if expanded {
                order.push(current);
                continue;
            }
            if !visited.insert(current) {
                continue;
            }
            stack.push((current, true));
            for (child, edge_type) in self.forward_edges(current) {
                if edge_type == EdgeType::Parent && !visited.contains(&child) {
                    stack.push((child, false));
                }
            }
        }
        order
    }
}

impl Graph for Goals {
    fn accept(&mut self, command: Command) {
        tracing::debug!(command = command.name(), "goal graph accepts command");
        match command {
            Command::Add {
                name,
                parent,
                edge_type,
            } => {
                self.accept_add(name, parent, edge_type);
            }
            Command::Insert { name, lower, upper } => self.accept_insert(name, lower, upper),
            Command::Rename { new_name, goal_id } => self.accept_rename(new_name, goal_id),
            Command::ToggleClose { goal_id, .. } => self.accept_toggle_close(goal_id),
            Command::Delete { goal_id } => self.accept_delete(goal_id),
            Command::ToggleLink {
                lower,
                upper,
                edge_type,
            } => self.accept_toggle_link(lower, upper, edge_type),
            other => {
                tracing::debug!(command = other.name(), "command ignored by the goal graph");
            }
        }
    }

    fn q(&self) -> RenderResult {
        let rows = self
            .goals
            .iter()
            .filter_map(|(id, name)| {
                name.as_ref().map(|name| {
                    let mut row = RenderRow::new(
                        *id,
                        name.clone(),
                        !self.closed.contains(id),
                        self.is_switchable(*id),
                    );
                    row.edges = self.forward_edges(*id).collect();
                    row
                })
            })
            .collect();
        RenderResult::new(rows, BTreeSet::from([ROOT_ID]))
    }

    fn settings(&self, key: &str) -> Option<GoalId> {
        match key {
            "root" => Some(ROOT_ID),
            _ => None,
        }
    }

    fn events(&self) -> &EventLog {
        &self.events
    }

    fn events_mut(&mut self) -> &mut EventLog {
        &mut self.events
    }

    fn error(&mut self, message: &str) {
        match self.message_fn.as_mut() {
            Some(message_fn) => message_fn(message),
            None => tracing::info!(target: "mikado::messages", "{}", message),
        }
    }

    fn verify(&self) -> Result<(), ConsistencyError> {
        if !self.is_live(ROOT_ID) {
            return Err(ConsistencyError::MissingRoot(ROOT_ID));
        }

        for lower in &self.closed {
            for (upper, edge_type) in self.forward_edges(*lower) {
                if edge_type.is_blocking() && !self.closed.contains(&upper) {
                    return Err(ConsistencyError::ClosedDependsOnOpen {
                        lower: *lower,
                        upper,
                    });
                }
            }
        }

        let mut visited = BTreeSet::from([ROOT_ID]);
        let mut queue = VecDeque::from([ROOT_ID]);
        while let Some(goal_id) = queue.pop_front() {
            for (target, _) in self.forward_edges(goal_id) {
                if self.is_live(target) && visited.insert(target) {
                    queue.push_back(target);
                }
            }
        }
        let unreachable: Vec<GoalId> = self.live_ids().filter(|id| !visited.contains(id)).collect();
        if !unreachable.is_empty() {
            return Err(ConsistencyError::Unreachable(unreachable));
        }

        for (goal_id, name) in &self.goals {
            if name.is_none()
                && (self.forward_edges(*goal_id).next().is_some()
                    || self.back_edges(*goal_id).next().is_some())
            {
                return Err(ConsistencyError::DeletedHasEdges(*goal_id));
            }
        }

        let forward: BTreeSet<EdgeRecord> = self.edges_table().into_iter().collect();
        let backward: BTreeSet<EdgeRecord> = self
            .edges_backward
            .iter()
            .flat_map(|(upper, sources)| {
                sources
                    .iter()
                    .map(move |(lower, edge_type)| (*lower, *upper, *edge_type))
            })
            .collect();
        if forward != backward {
            return Err(ConsistencyError::EdgeIndexMismatch);
        }

        let mut parents: BTreeMap<GoalId, usize> = BTreeMap::new();
        for (_, upper, edge_type) in &forward {
            if *edge_type == EdgeType::Parent {
                *parents.entry(*upper).or_default() += 1;
            }
        }
        if let Some((goal_id, _)) = parents.iter().find(|(_, count)| **count > 1) {
            return Err(ConsistencyError::MultipleParents(*goal_id));
        }

        let adjacency: Adjacency = self
            .edges_forward
            .iter()
            .map(|(source, targets)| (*source, targets.keys().copied().collect()))
            .collect();
        if let Some(goal_id) = find_cycle(&adjacency) {
            return Err(ConsistencyError::Cycle(goal_id));
        }
        Ok(())
    }

    fn replay(&mut self, event: &Event) -> Result<(), ConsistencyError> {
        match event {
            Event::Add { id, name, open } => {
                if *id <= 0 {
                    return Err(ConsistencyError::InvalidGoalId(*id));
                }
                if self.goals.contains_key(id) {
                    return Err(ConsistencyError::DuplicateGoal(*id));
                }
                self.goals.insert(*id, Some(name.clone()));
                if !open {
                    self.closed.insert(*id);
                }
            }
            Event::Rename { new_name, id } => {
                if !self.is_live(*id) {
                    return Err(ConsistencyError::InvalidGoalId(*id));
                }
                self.goals.insert(*id, Some(new_name.clone()));
            }
            Event::ToggleClose { will_be_open, id } => {
                if !self.is_live(*id) {
                    return Err(ConsistencyError::InvalidGoalId(*id));
                }
                if *will_be_open {
                    self.closed.remove(id);
                } else {
                    self.closed.insert(*id);
                }
            }
            Event::Link {
                lower,
                upper,
                edge_type,
            } => {
                if !self.is_live(*lower) || !self.is_live(*upper) {
                    return Err(ConsistencyError::DanglingEdge {
                        lower: *lower,
                        upper: *upper,
                    });
                }
                self.insert_edge(*lower, *upper, *edge_type);
            }
            Event::Unlink { lower, upper, .. } => {
                self.remove_edge(*lower, *upper);
            }
            Event::Delete { id } => {
                if !self.goals.contains_key(id) {
                    return Err(ConsistencyError::InvalidGoalId(*id));
                }
                self.tombstone(*id);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Whether `to` is reachable from `from` over edges of any type
pub fn reaches(forward: &EdgeMap, from: GoalId, to: GoalId) -> bool {
    let mut visited = BTreeSet::from([from]);
    let mut queue = VecDeque::from([from]);
    while let Some(current) = queue.pop_front() {
        if current == to {
            return true;
        }
        if let Some(targets) = forward.get(&current) {
            for target in targets.keys() {
                if visited.insert(*target) {
                    queue.push_back(*target);
                }
            }
        }
    }
    false
}

/// Strict PARENT descendants of `goal_id`
pub fn parent_descendants(forward: &EdgeMap, goal_id: GoalId) -> BTreeSet<GoalId> {
    let mut result = BTreeSet::new();
    let mut queue = VecDeque::from([goal_id]);
    while let Some(current) = queue.pop_front() {
        if let Some(targets) = forward.get(&current) {
            for (target, edge_type) in targets {
                if *edge_type == EdgeType::Parent && *target != goal_id && result.insert(*target) {
                    queue.push_back(*target);
                }
            }
        }
    }
    result
}

/// The depends-on relation of a goal graph with some edges replaced.
///
/// A goal depends on the targets of its blocking edges and on the BLOCKER
/// targets of its PARENT ancestors that lie outside that ancestor's subtree.
/// Dependencies are computed on demand.
struct DependsOn<'a> {
    forward: &'a EdgeMap,
    backward: &'a EdgeMap,
    overrides: BTreeMap<(GoalId, GoalId), EdgeType>,
}

impl<'a> DependsOn<'a> {
    fn new(goals: &'a Goals) -> Self {
        Self {
            forward: &goals.edges_forward,
            backward: &goals.edges_backward,
            overrides: BTreeMap::new(),
        }
    }

    fn with(mut self, lower: GoalId, upper: GoalId, edge_type: EdgeType) -> Self {
        self.overrides.insert((lower, upper), edge_type);
        self
    }

    fn forward_edges(&self, goal_id: GoalId) -> BTreeMap<GoalId, EdgeType> {
        let mut edges = self.forward.get(&goal_id).cloned().unwrap_or_default();
        for ((lower, upper), edge_type) in &self.overrides {
            if *lower == goal_id {
                edges.insert(*upper, *edge_type);
            }
        }
        edges
    }

    fn parent(&self, goal_id: GoalId) -> Option<GoalId> {
        let stored = self
            .backward
            .get(&goal_id)
            .into_iter()
            .flatten()
            .map(|(source, edge_type)| {
                let edge_type = self
                    .overrides
                    .get(&(*source, goal_id))
                    .copied()
                    .unwrap_or(*edge_type);
                (*source, edge_type)
            });
        let added = self
            .overrides
            .iter()
            .filter(|((_, upper), _)| *upper == goal_id)
            .map(|((lower, _), edge_type)| (*lower, *edge_type));
        stored
            .chain(added)
            .find(|(_, edge_type)| *edge_type == EdgeType::Parent)
            .map(|(source, _)| source)
    }

    /// Strict PARENT ancestors, nearest first
    fn ancestors(&self, goal_id: GoalId) -> Vec<GoalId> {
        let mut result = Vec::new();
        let mut current = self.parent(goal_id);
        while let Some(ancestor) = current {
            if ancestor == goal_id || result.contains(&ancestor) {
                break;
            }
            result.push(ancestor);
            current = self.parent(ancestor);
        }
        result
    }

    fn descendants(&self, goal_id: GoalId) -> BTreeSet<GoalId> {
        let mut result = BTreeSet::new();
        let mut queue = VecDeque::from([goal_id]);
        while let Some(current) = queue.pop_front() {
            for (target, edge_type) in self.forward_edges(current) {
                if edge_type == EdgeType::Parent && target != goal_id && result.insert(target) {
                    queue.push_back(target);
                }
            }
        }
        result
    }

    fn dependencies(&self, goal_id: GoalId) -> BTreeSet<GoalId> {
        let mut deps: BTreeSet<GoalId> = self
            .forward_edges(goal_id)
            .into_iter()
            .filter(|(_, edge_type)| edge_type.is_blocking())
            .map(|(target, _)| target)
            .collect();
        for ancestor in self.ancestors(goal_id) {
            for (target, edge_type) in self.forward_edges(ancestor) {
                if edge_type == EdgeType::Blocker && !self.ancestors(target).contains(&ancestor) {
                    deps.insert(target);
                }
            }
        }
        deps
    }

    fn reaches(&self, from: GoalId, to: GoalId) -> bool {
        let mut visited = BTreeSet::from([from]);
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            for next in self.dependencies(current) {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        false
    }
}

/// Returns a goal lying on a cycle of `adjacency`, if any
fn find_cycle(adjacency: &Adjacency) -> Option<GoalId> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Active,
        Done,
    }

    let neighbours = |goal_id: GoalId| -> Vec<GoalId> {
        adjacency
            .get(&goal_id)
            .map(|targets| targets.iter().copied().collect())
            .unwrap_or_default()
    };

    let mut marks: BTreeMap<GoalId, Mark> = BTreeMap::new();
    for start in adjacency.keys() {
        if marks.contains_key(start) {
            continue;
        }
        marks.insert(*start, Mark::Active);
        let mut stack = vec![(*start, neighbours(*start))];
        loop {
            let Some(frame) = stack.last_mut() else {
                break;
            };
            match frame.1.pop() {
                Some(next) => match marks.get(&next) {
                    Some(Mark::Active) => return Some(next),
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(next, Mark::Active);
                        stack.push((next, neighbours(next)));
                    }
                },
                None => {
                    let finished = frame.0;
                    marks.insert(finished, Mark::Done);
                    stack.pop();
                }
            }
        }
    }
    None
}

//! Core domain types for the mikado library
//!
//! This module contains the command vocabulary, the event log, edge kinds and the
//! render result shared by every layer of the goal graph.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};

/// Identifier of a goal. Real goals are positive, `0` means "unspecified" in
/// command payloads and negative ids belong to synthetic rows.
pub type GoalId = i64;

/// The id of the root goal, which always exists and cannot be deleted
pub const ROOT_ID: GoalId = 1;

/// Placeholder value for command fields that should be resolved by a layer
pub const UNSPECIFIED: GoalId = 0;

/// Id of the synthetic row shown when a filter matches nothing
pub const FILTER_PLACEHOLDER_ID: GoalId = -1;

/// Kind of a directed edge between two goals
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// Informational link without closure semantics
    Relation,
    /// The source can't be closed until the target is closed
    #[default]
    Blocker,
    /// Hierarchy link; every goal has at most one parent
    Parent,
}

impl EdgeType {
    /// Whether edges of this kind take part in closure rules
    pub fn is_blocking(self) -> bool {
        self != EdgeType::Relation
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EdgeType::Relation => "relation",
            EdgeType::Blocker => "blocker",
            EdgeType::Parent => "parent",
        }
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EdgeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "relation" | "r" => Ok(EdgeType::Relation),
            "blocker" | "b" => Ok(EdgeType::Blocker),
            "parent" | "p" => Ok(EdgeType::Parent),
            other => Err(format!("unknown edge type '{}'", other)),
        }
    }
}

fn default_parent_edge() -> EdgeType {
    EdgeType::Parent
}

/// Every command a goal graph stack understands.
///
/// Id fields left at [`UNSPECIFIED`] are filled in by the Selectable layer
/// from the current (or previous) selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Add {
        name: String,
        #[serde(default)]
        parent: GoalId,
        #[serde(default = "default_parent_edge")]
        edge_type: EdgeType,
    },
    Insert {
        name: String,
        #[serde(default)]
        lower: GoalId,
        #[serde(default)]
        upper: GoalId,
    },
    Rename {
        new_name: String,
        #[serde(default)]
        goal_id: GoalId,
    },
    ToggleClose {
        #[serde(default)]
        goal_id: GoalId,
        #[serde(default)]
        root: GoalId,
    },
    Delete {
        #[serde(default)]
        goal_id: GoalId,
    },
    ToggleLink {
        #[serde(default)]
        lower: GoalId,
        #[serde(default)]
        upper: GoalId,
        #[serde(default)]
        edge_type: EdgeType,
    },
    Select {
        goal_id: GoalId,
    },
    HoldSelect,
    ToggleZoom {
        #[serde(default)]
        goal_id: GoalId,
    },
    ToggleAutoLink {
        keyword: String,
        #[serde(default)]
        goal_id: GoalId,
    },
    FilterBy {
        pattern: String,
    },
    ToggleOpenView,
    ToggleProgress,
    ToggleSwitchableView,
}

impl Command {
    /// Adds a new subgoal under `parent`
    pub fn add(name: impl Into<String>, parent: GoalId) -> Self {
        Command::Add {
            name: name.into(),
            parent,
            edge_type: EdgeType::Parent,
        }
    }

    /// Adds a new goal linked from `parent` with the given edge type
    pub fn add_with(name: impl Into<String>, parent: GoalId, edge_type: EdgeType) -> Self {
        Command::Add {
            name: name.into(),
            parent,
            edge_type,
        }
    }

    pub fn insert(name: impl Into<String>, lower: GoalId, upper: GoalId) -> Self {
        Command::Insert {
            name: name.into(),
            lower,
            upper,
        }
    }

    pub fn rename(new_name: impl Into<String>, goal_id: GoalId) -> Self {
        Command::Rename {
            new_name: new_name.into(),
            goal_id,
        }
    }

    pub fn toggle_close(goal_id: GoalId) -> Self {
        Command::ToggleClose {
            goal_id,
            root: UNSPECIFIED,
        }
    }

    pub fn delete(goal_id: GoalId) -> Self {
        Command::Delete { goal_id }
    }

    pub fn toggle_link(lower: GoalId, upper: GoalId, edge_type: EdgeType) -> Self {
        Command::ToggleLink {
            lower,
            upper,
            edge_type,
        }
    }

    pub fn select(goal_id: GoalId) -> Self {
        Command::Select { goal_id }
    }

    pub fn toggle_zoom(goal_id: GoalId) -> Self {
        Command::ToggleZoom { goal_id }
    }

    pub fn toggle_autolink(keyword: impl Into<String>, goal_id: GoalId) -> Self {
        Command::ToggleAutoLink {
            keyword: keyword.into(),
            goal_id,
        }
    }

    pub fn filter_by(pattern: impl Into<String>) -> Self {
        Command::FilterBy {
            pattern: pattern.into(),
        }
    }

    /// Short name of the command, used in log records
    pub fn name(&self) -> &'static str {
        match self {
            Command::Add { .. } => "add",
            Command::Insert { .. } => "insert",
            Command::Rename { .. } => "rename",
            Command::ToggleClose { .. } => "toggle_close",
            Command::Delete { .. } => "delete",
            Command::ToggleLink { .. } => "toggle_link",
            Command::Select { .. } => "select",
            Command::HoldSelect => "hold_select",
            Command::ToggleZoom { .. } => "toggle_zoom",
            Command::ToggleAutoLink { .. } => "toggle_autolink",
            Command::FilterBy { .. } => "filter_by",
            Command::ToggleOpenView => "toggle_open_view",
            Command::ToggleProgress => "toggle_progress",
            Command::ToggleSwitchableView => "toggle_switchable_view",
        }
    }
}

/// A single entry of the append-only event log. Replaying the log onto an
/// empty stack reconstructs the persistent state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    Add {
        id: GoalId,
        name: String,
        open: bool,
    },
    Rename {
        new_name: String,
        id: GoalId,
    },
    ToggleClose {
        will_be_open: bool,
        id: GoalId,
    },
    Link {
        lower: GoalId,
        upper: GoalId,
        edge_type: EdgeType,
    },
    Unlink {
        lower: GoalId,
        upper: GoalId,
        edge_type: EdgeType,
    },
    Delete {
        id: GoalId,
    },
    Select {
        id: GoalId,
    },
    HoldSelect {
        id: GoalId,
    },
    Zoom {
        depth: usize,
        id: GoalId,
    },
    Unzoom {
        id: GoalId,
    },
    AddAutolink {
        id: GoalId,
        keyword: String,
    },
    RemoveAutolink {
        id: GoalId,
    },
}

/// Owned, append-only queue of events. It is drained by the persistence
/// collaborator; entries are never edited after being pushed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    entries: VecDeque<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        self.entries.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.entries.iter()
    }

    /// Events appended after the log had `len` entries
    pub fn since(&self, len: usize) -> impl Iterator<Item = &Event> {
        self.entries.iter().skip(len)
    }

    /// Removes and returns every pending event, oldest first
    pub fn drain(&mut self) -> Vec<Event> {
        self.entries.drain(..).collect()
    }
}

/// Side channel for user-facing rejections
pub type MessageFn = Box<dyn FnMut(&str) + Send>;

/// Builds a [`MessageFn`] that appends every message to `buffer`
pub fn message_sink(buffer: Arc<Mutex<Vec<String>>>) -> MessageFn {
    Box::new(move |message: &str| {
        let mut guard = match buffer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(message.to_string());
    })
}

/// Builds a [`MessageFn`] together with the buffer it writes to
pub fn collect_messages() -> (MessageFn, Arc<Mutex<Vec<String>>>) {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    (message_sink(Arc::clone(&buffer)), buffer)
}

/// One rendered goal, recomputed on every query and never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderRow {
    /// Id as seen by the consumer of this result
    pub goal_id: GoalId,
    /// Id of the underlying goal
    pub raw_id: GoalId,
    pub name: String,
    pub is_open: bool,
    pub is_switchable: bool,
    /// Outgoing edges as (target, type) pairs
    pub edges: Vec<(GoalId, EdgeType)>,
    /// Annotations contributed by layers ("Progress", "Autolink", ...)
    pub attrs: BTreeMap<String, String>,
}

impl RenderRow {
    pub fn new(goal_id: GoalId, name: impl Into<String>, is_open: bool, is_switchable: bool) -> Self {
        Self {
            goal_id,
            raw_id: goal_id,
            name: name.into(),
            is_open,
            is_switchable,
            edges: Vec::new(),
            attrs: BTreeMap::new(),
        }
    }

    /// Targets of the PARENT edges of this row
    pub fn children(&self) -> impl Iterator<Item = GoalId> + '_ {
        self.edges
            .iter()
            .filter(|(_, edge_type)| *edge_type == EdgeType::Parent)
            .map(|(target, _)| *target)
    }
}

/// Result of a query over a layer stack
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RenderResult {
    pub rows: Vec<RenderRow>,
    pub roots: BTreeSet<GoalId>,
    pub global_opts: BTreeMap<String, Value>,
}

impl RenderResult {
    pub fn new(rows: Vec<RenderRow>, roots: BTreeSet<GoalId>) -> Self {
        Self {
            rows,
            roots,
            global_opts: BTreeMap::new(),
        }
    }

    pub fn by_id(&self, goal_id: GoalId) -> Option<&RenderRow> {
        self.rows.iter().find(|row| row.goal_id == goal_id)
    }

    pub fn ids(&self) -> BTreeSet<GoalId> {
        self.rows.iter().map(|row| row.goal_id).collect()
    }

    fn opt_id(&self, key: &str) -> Option<GoalId> {
        self.global_opts.get(key).and_then(Value::as_i64)
    }

    /// Current selection, if a Selectable layer contributed it
    pub fn selection(&self) -> Option<GoalId> {
        self.opt_id("selection")
    }

    /// Previous selection, if a Selectable layer contributed it
    pub fn previous_selection(&self) -> Option<GoalId> {
        self.opt_id("previous_selection")
    }

    /// Both selection ids, skipping the ones that are absent
    pub fn selected_ids(&self) -> BTreeSet<GoalId> {
        self.selection()
            .into_iter()
            .chain(self.previous_selection())
            .collect()
    }

    /// Rows without incoming edges from other rendered rows become roots
    pub fn recompute_roots(&mut self) {
        let targets: BTreeSet<GoalId> = self
            .rows
            .iter()
            .flat_map(|row| row.edges.iter().map(|(target, _)| *target))
            .collect();
        self.roots = self
            .rows
            .iter()
            .map(|row| row.goal_id)
            .filter(|id| !targets.contains(id))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_command_json_defaults() {
        let cmd: Command =
            serde_json::from_str(r#"{"command": "add", "name": "A"}"#).unwrap();
        assert_eq!(cmd, Command::add("A", UNSPECIFIED));

        let cmd: Command =
            serde_json::from_str(r#"{"command": "toggle_link", "lower": 2, "upper": 3}"#).unwrap();
        assert_eq!(cmd, Command::toggle_link(2, 3, EdgeType::Blocker));

        let cmd: Command = serde_json::from_str(r#"{"command": "hold_select"}"#).unwrap();
        assert_eq!(cmd, Command::HoldSelect);
    }

    #[test]
    fn test_event_log_drain() {
        let mut log = EventLog::new();
        log.push(Event::Select { id: 2 });
        log.push(Event::HoldSelect { id: 2 });
        assert_eq!(log.len(), 2);
        assert_eq!(log.since(1).count(), 1);

        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert!(log.is_empty());
    }

    #[test]
    fn test_edge_type_parsing() {
        assert_eq!("Parent".parse::<EdgeType>(), Ok(EdgeType::Parent));
        assert_eq!("b".parse::<EdgeType>(), Ok(EdgeType::Blocker));
        assert!("sibling".parse::<EdgeType>().is_err());
        assert!(EdgeType::Relation < EdgeType::Blocker);
        assert!(EdgeType::Blocker < EdgeType::Parent);
    }

    #[test]
    fn test_recompute_roots() {
        let mut a = RenderRow::new(2, "A", true, true);
        a.edges.push((3, EdgeType::Parent));
        let b = RenderRow::new(3, "B", true, true);
        let mut result = RenderResult::new(vec![a, b], BTreeSet::new());
        result.recompute_roots();
        assert_eq!(result.roots, BTreeSet::from([2]));
    }
}

//! The capability set shared by the base goal graph and every decorator layer
//!
//! Layers are generic wrappers around another [`Graph`]. Each one matches on
//! the commands it understands and forwards everything else to the graph it
//! wraps, so a command percolates inward until some layer handles it, ending
//! at the base [`Goals`](crate::goaltree::Goals).

use crate::domain::{Command, Event, EventLog, GoalId, RenderResult};
use crate::error::ConsistencyError;

pub trait Graph {
    /// Applies a command. Rejections are reported through [`Graph::error`]
    /// and leave the state unchanged.
    fn accept(&mut self, command: Command);

    /// Renders the current state, including every transformation of this
    /// layer and the ones below it
    fn q(&self) -> RenderResult;

    /// Integer setting exposed by some layer (`root`, `selection`,
    /// `previous_selection`, `zoom_root`)
    fn settings(&self, key: &str) -> Option<GoalId>;

    /// The event log owned by the base graph
    fn events(&self) -> &EventLog;

    fn events_mut(&mut self) -> &mut EventLog;

    /// Reports a user-facing rejection
    fn error(&mut self, message: &str);

    /// Checks the invariants of this layer and all inner ones
    fn verify(&self) -> Result<(), ConsistencyError>;

    /// Applies a persisted event without validation or logging
    fn replay(&mut self, event: &Event) -> Result<(), ConsistencyError>;
}

/// Runs `command` on `graph` and returns the log length it started from if
/// the command appended any event.
///
/// The base graph only reports failures through the message channel, so log
/// growth is the success signal layers rely on.
pub fn accept_tracked<G: Graph + ?Sized>(graph: &mut G, command: Command) -> Option<usize> {
    let before = graph.events().len();
    graph.accept(command);
    (graph.events().len() > before).then_some(before)
}

//! Composition of the layer stack
//!
//! Layers wrap each other in a fixed order, innermost first: the goal graph,
//! Selectable, AutoLink, Zoom, and then the view-only layers OpenView,
//! ProgressView, FilterView and SwitchableView.

use crate::autolink::AutoLink;
use crate::domain::{Event, MessageFn};
use crate::error::ConsistencyError;
use crate::goaltree::Goals;
use crate::graph::Graph;
use crate::selectable::Selectable;
use crate::views::{FilterView, OpenView, ProgressView, SwitchableView};
use crate::zoom::Zoom;

/// Layers whose state is persisted through the event log
pub type PersistentStack = Zoom<AutoLink<Selectable<Goals>>>;

/// Every layer, views included
pub type ViewStack = SwitchableView<FilterView<ProgressView<OpenView<PersistentStack>>>>;

pub fn persistent_layers(goals: Goals) -> PersistentStack {
    Zoom::new(AutoLink::new(Selectable::new(goals)))
}

pub fn view_layers(persistent: PersistentStack) -> ViewStack {
    SwitchableView::new(FilterView::new(ProgressView::new(OpenView::new(persistent))))
}

pub fn all_layers(goals: Goals) -> ViewStack {
    view_layers(persistent_layers(goals))
}

/// The persistent part of a full stack
pub fn persistent(stack: &ViewStack) -> &PersistentStack {
    stack.goaltree().goaltree().goaltree().goaltree()
}

pub fn persistent_mut(stack: &mut ViewStack) -> &mut PersistentStack {
    stack
        .goaltree_mut()
        .goaltree_mut()
        .goaltree_mut()
        .goaltree_mut()
}

/// The base goal graph below the persistent layers
pub fn base(stack: &PersistentStack) -> &Goals {
    stack.goaltree().goaltree().goaltree()
}

pub fn base_mut(stack: &mut PersistentStack) -> &mut Goals {
    stack.goaltree_mut().goaltree_mut().goaltree_mut()
}

/// Applies `events` on top of `graph`, stopping at the first broken one
pub fn replay_onto<G: Graph + ?Sized>(graph: &mut G, events: &[Event]) -> Result<(), ConsistencyError> {
    for (index, event) in events.iter().enumerate() {
        graph
            .replay(event)
            .map_err(|source| ConsistencyError::Replay {
                index,
                reason: source.to_string(),
            })?;
    }
    Ok(())
}

/// Rebuilds the full stack from an event log and verifies the result
pub fn replay(events: &[Event], message_fn: Option<MessageFn>) -> Result<ViewStack, ConsistencyError> {
    let mut stack = all_layers(Goals::empty(message_fn));
    replay_onto(&mut stack, events)?;
    stack.verify()?;
    tracing::debug!(events = events.len(), "event log replayed");
    Ok(stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Command, EdgeType};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_replay_matches_live_stack() {
        let mut live = all_layers(Goals::new("Root", None));
        live.accept(Command::add("A", 0));
        live.accept(Command::select(2));
        live.accept(Command::add("B", 0));
        live.accept(Command::toggle_autolink("b", 3));
        live.accept(Command::add("C with b", 1));
        live.accept(Command::toggle_zoom(2));
        live.accept(Command::toggle_link(2, 4, EdgeType::Blocker));

        let events: Vec<Event> = live.events().iter().cloned().collect();
        let replayed = replay(&events, None).unwrap();
        assert_eq!(replayed.q(), live.q());
        assert_eq!(base(persistent(&replayed)).edge(3, 4), Some(EdgeType::Relation));
    }

    #[test]
    fn test_replay_reports_broken_event() {
        let events = vec![
            Event::Add {
                id: 1,
                name: "Root".to_string(),
                open: true,
            },
            Event::Rename {
                new_name: "Ghost".to_string(),
                id: 5,
            },
        ];
        let error = replay(&events, None).err();
        assert!(matches!(error, Some(ConsistencyError::Replay { index: 1, .. })));
    }

    #[test]
    fn test_replay_of_empty_log_fails_verification() {
        let error = replay(&[], None).err();
        assert_eq!(error, Some(ConsistencyError::MissingRoot(1)));
    }
}

//! View-only layers
//!
//! These layers transform query results and keep a transient toggle. They
//! never write to the event log, so their state is lost on reload.

pub mod filter_view;
pub mod open_view;
pub mod progress_view;
pub mod switchable_view;

pub use filter_view::FilterView;
pub use open_view::OpenView;
pub use progress_view::ProgressView;
pub use switchable_view::SwitchableView;

use std::collections::BTreeSet;

use crate::domain::{GoalId, RenderResult};

/// Keeps only the rows in `keep` and drops edges pointing elsewhere
pub(crate) fn retain_rows(result: &mut RenderResult, keep: &BTreeSet<GoalId>) {
    result.rows.retain(|row| keep.contains(&row.goal_id));
    for row in &mut result.rows {
        row.edges.retain(|(target, _)| keep.contains(target));
    }
}

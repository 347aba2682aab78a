//! Mikado library crate
//!
//! A goal dependency tracker for the Mikado Method. The goal graph is a base
//! [`Goals`] DAG wrapped by decorator layers (selection, autolink, zoom and
//! the view-only layers), all driven through the [`Graph`] trait. On top of
//! that sit persistence, an HTTP API and a CLI.

pub mod api;
pub mod autolink;
pub mod cli;
pub mod domain;
pub mod enumeration;
pub mod error;
pub mod goaltree;
pub mod graph;
pub mod guide;
pub mod layers;
pub mod selectable;
pub mod session;
pub mod snapshot;
pub mod stats;
pub mod store;
pub mod views;
pub mod zoom;

// Re-export the types most consumers need
pub use api::{Client, ClientConfig, ServerConfig};
pub use domain::{
    Command, EdgeType, Event, EventLog, GoalId, MessageFn, RenderResult, RenderRow, ROOT_ID,
    UNSPECIFIED,
};
pub use error::ConsistencyError;
pub use goaltree::Goals;
pub use graph::Graph;
pub use layers::{all_layers, persistent_layers, replay, PersistentStack, ViewStack};
pub use session::{Core, GoalsResponse, Session, SessionError};
pub use snapshot::Snapshot;
pub use stats::Stats;
pub use store::{FileStore, StoreError};

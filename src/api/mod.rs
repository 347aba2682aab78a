//! API module
//!
//! This module provides the HTTP surface of the goal tracker: an axum server
//! over a shared [`Core`](crate::Core) and a reqwest client for it.

pub mod client;
pub mod server;

// Re-export commonly used types
pub use client::{Client, ClientConfig, ClientError};
pub use server::{router, serve, ServerConfig};

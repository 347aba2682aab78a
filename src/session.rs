//! A live goal graph shared between front ends
//!
//! [`Session`] owns the full layer stack, the buffer of user-facing messages
//! and the optional file store. [`Core`] wraps it for concurrent access and
//! notifies subscribers after every change.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::domain::{message_sink, Command, RenderResult};
use crate::enumeration::Enumeration;
use crate::error::ConsistencyError;
use crate::goaltree::Goals;
use crate::graph::Graph;
use crate::layers::{all_layers, base, persistent, persistent_mut, view_layers, ViewStack};
use crate::snapshot::{self, Snapshot};
use crate::stats::Stats;
use crate::store::{FileStore, StoreError};

pub const DEFAULT_ROOT_NAME: &str = "Rename me";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
}

/// A result together with the messages produced while computing it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalsResponse<T> {
    pub res: T,
    pub messages: Vec<String>,
}

impl<T> GoalsResponse<T> {
    pub fn new(res: T, messages: Vec<String>) -> Self {
        Self { res, messages }
    }

    pub fn inner(&self) -> &T {
        &self.res
    }

    pub fn into_inner(self) -> T {
        self.res
    }
}

pub struct Session {
    stack: Enumeration<ViewStack>,
    messages: Arc<Mutex<Vec<String>>>,
    store: Option<FileStore>,
}

impl Session {
    /// An in-memory session starting from a single root goal
    pub fn new(root_name: &str) -> Self {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let goals = Goals::new(root_name, Some(message_sink(Arc::clone(&messages))));
        Self {
            stack: Enumeration::new(all_layers(goals)),
            messages,
            store: None,
        }
    }

    /// A session backed by a store directory. An empty store is initialized
    /// with a fresh root goal.
    pub fn open(store: FileStore, root_name: &str) -> Result<Self, SessionError> {
        if store.is_empty() {
            let mut session = Self::new(root_name);
            store.save(&mut session.stack)?;
            session.store = Some(store);
            return Ok(session);
        }
        let messages = Arc::new(Mutex::new(Vec::new()));
        let persistent = store.load(Some(message_sink(Arc::clone(&messages))))?;
        Ok(Self {
            stack: Enumeration::new(view_layers(persistent)),
            messages,
            store: Some(store),
        })
    }

    fn take_messages(&self) -> Vec<String> {
        let mut guard = match self.messages.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::take(&mut *guard)
    }

    pub fn render(&self) -> RenderResult {
        self.stack.q()
    }

    /// Applies commands in order and persists the resulting events
    pub fn apply(
        &mut self,
        commands: Vec<Command>,
    ) -> Result<GoalsResponse<RenderResult>, SessionError> {
        for command in commands {
            tracing::debug!(command = command.name(), "applying command");
            self.stack.accept(command);
        }
        if cfg!(debug_assertions) {
            self.stack.verify()?;
        }
        match &self.store {
            Some(store) => {
                store.save(&mut self.stack)?;
            }
            None => {
                self.stack.events_mut().drain();
            }
        }
        Ok(GoalsResponse::new(self.render(), self.take_messages()))
    }

    pub fn stats(&self) -> Stats {
        Stats::collect(base(persistent(self.stack.goaltree())))
    }

    pub fn export(&self) -> Snapshot {
        snapshot::export(persistent(self.stack.goaltree()))
    }

    /// Replaces the persistent state. View toggles are reset.
    pub fn import(&mut self, snapshot: Snapshot) -> Result<RenderResult, SessionError> {
        let message_fn = message_sink(Arc::clone(&self.messages));
        let mut imported = snapshot::import(snapshot, Some(message_fn))?;
        if let Some(store) = &self.store {
            store.compact(&mut imported)?;
        }
        self.stack = Enumeration::new(view_layers(imported));
        tracing::info!("snapshot imported");
        Ok(self.render())
    }

    /// Rewrites the store as a single snapshot
    pub fn compact(&mut self) -> Result<(), SessionError> {
        if let Some(store) = &self.store {
            store.compact(persistent_mut(self.stack.goaltree_mut()))?;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct Core {
    inner: Arc<Mutex<Session>>,
    update_tx: Arc<tokio::sync::broadcast::Sender<()>>,
}

impl Core {
    pub fn new(session: Session) -> Self {
        let (tx, _rx) = tokio::sync::broadcast::channel(100);

        Self {
            inner: Arc::new(Mutex::new(session)),
            update_tx: Arc::new(tx),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Session> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // Runs a mutation and notifies observers
    fn with_session<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Session) -> R,
    {
        let result = f(&mut self.lock());
        let _ = self.update_tx.send(());
        result
    }

    pub fn render(&self) -> RenderResult {
        self.lock().render()
    }

    pub fn apply(
        &self,
        commands: Vec<Command>,
    ) -> Result<GoalsResponse<RenderResult>, SessionError> {
        self.with_session(|session| session.apply(commands))
    }

    pub fn stats(&self) -> Stats {
        self.lock().stats()
    }

    pub fn export(&self) -> Snapshot {
        self.lock().export()
    }

    pub fn import(&self, snapshot: Snapshot) -> Result<RenderResult, SessionError> {
        self.with_session(|session| session.import(snapshot))
    }

    pub fn compact(&self) -> Result<(), SessionError> {
        self.lock().compact()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.update_tx.subscribe()
    }
}

impl Default for Core {
    fn default() -> Self {
        Self::new(Session::new(DEFAULT_ROOT_NAME))
    }
}

//! Client sessions.
//!
//! A [`Session`] is one connected API client. Modules push events to it and
//! tear down their per-client state when it disconnects.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use horizon_relay_core::Signal;
use horizon_relay_core::logging::targets;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ApiError, Result};

/// Identifier of a session.
pub type SessionId = u64;

/// An event pushed to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    pub event: String,
    pub data: Value,
}

/// A connected API client.
pub struct Session {
    id: SessionId,
    connected: AtomicBool,
    push: Signal<PushMessage>,
    disconnected: Arc<Signal<()>>,
}

impl Session {
    pub fn new() -> Arc<Self> {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Arc::new(Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            connected: AtomicBool::new(true),
            push: Signal::new(),
            disconnected: Arc::new(Signal::new()),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Outgoing events; the transport connects here.
    pub fn push(&self) -> &Signal<PushMessage> {
        &self.push
    }

    /// Emitted once when the client goes away.
    pub fn disconnected(&self) -> &Arc<Signal<()>> {
        &self.disconnected
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Push an event. Dropped after disconnection.
    pub fn send(&self, event: impl Into<String>, data: Value) {
        if !self.is_connected() {
            return;
        }
        self.push.emit(PushMessage {
            event: event.into(),
            data,
        });
    }

    /// Mark the client gone and notify the modules. Later calls do nothing.
    pub fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(target: targets::API, session = self.id, "session disconnected");
        self.disconnected.emit(());
        self.push.disconnect_all();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Event subscriptions of a module.
///
/// Clients opt in to plain events (as opposed to view updates, which are
/// always pushed for active views) by name.
#[derive(Debug)]
pub struct Subscriptions {
    known: &'static [&'static str],
    active: Mutex<HashSet<&'static str>>,
}

impl Subscriptions {
    pub fn new(known: &'static [&'static str]) -> Self {
        Self {
            known,
            active: Mutex::new(HashSet::new()),
        }
    }

    pub fn subscribe(&self, name: &str) -> Result<()> {
        let name = self.lookup(name)?;
        self.active.lock().insert(name);
        Ok(())
    }

    pub fn unsubscribe(&self, name: &str) -> Result<()> {
        let name = self.lookup(name)?;
        self.active.lock().remove(name);
        Ok(())
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.active.lock().contains(name)
    }

    pub fn clear(&self) {
        self.active.lock().clear();
    }

    fn lookup(&self, name: &str) -> Result<&'static str> {
        self.known
            .iter()
            .copied()
            .find(|known| *known == name)
            .ok_or_else(|| ApiError::NotFound(format!("No such subscription: {name}")))
    }
}

static_assertions::assert_impl_all!(Session: Send, Sync);

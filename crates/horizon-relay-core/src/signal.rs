//! Signal/slot system for Horizon Relay.
//!
//! Managers such as the download queue or the favorite hub list notify any
//! number of listeners about state changes. Instead of listener interfaces
//! the managers own a [`Signal`] per event and listeners connect closures to
//! it. Subscriptions are first-class values: connecting returns a
//! [`ConnectionId`] (or a [`ConnectionGuard`]) that removes the slot again.
//!
//! # Key Types
//!
//! - [`Signal<Args>`]: one event, carrying `Args` to every slot
//! - [`ConnectionId`]: handle of a connected slot
//! - [`ConnectionGuard`]: a connection that ends when the guard is dropped
//!
//! # Thread Safety
//!
//! Slots are invoked synchronously on the emitting thread. Item sources emit
//! from whatever worker thread mutated the item, so slots must be
//! `Send + Sync` and should do as little as possible (the view engine only
//! appends to its task queue).
//!
//! The slot list is snapshotted before invocation, so a slot may connect or
//! disconnect slots of the same signal without deadlocking.
//!
//! # Example
//!
//! ```
//! use horizon_relay_core::Signal;
//!
//! let bundle_added = Signal::<u32>::new();
//!
//! let conn_id = bundle_added.connect(|token| {
//!     println!("Bundle {} added", token);
//! });
//!
//! bundle_added.emit(42);
//! bundle_added.disconnect(conn_id);
//! ```

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

new_key_type! {
    /// Handle of one connected slot, for [`Signal::disconnect`].
    pub struct ConnectionId;
}

type Slot<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

/// An event with any number of connected slots.
///
/// Slots receive `&Args`. Events without a payload use `()`.
pub struct Signal<Args> {
    slots: Mutex<SlotMap<ConnectionId, Slot<Args>>>,
}

impl<Args> std::fmt::Debug for Signal<Args> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("slots", &self.slots.lock().len())
            .finish()
    }
}

impl<Args: Send + 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: Send + 'static> Signal<Args> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(SlotMap::with_key()),
        }
    }

    /// Add a slot. It stays connected until disconnected by id.
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.slots.lock().insert(Arc::new(slot))
    }

    /// Add a slot that is removed when the returned guard is dropped.
    ///
    /// The guard holds the signal weakly and may outlive it.
    pub fn connect_scoped<F>(self: &Arc<Self>, slot: F) -> ConnectionGuard<Args>
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        ConnectionGuard {
            id: Some(self.connect(slot)),
            signal: Arc::downgrade(self),
        }
    }

    /// Remove a slot. Returns `false` if it was already gone.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.slots.lock().remove(id).is_some()
    }

    pub fn disconnect_all(&self) {
        self.slots.lock().clear();
    }

    pub fn connection_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Call every slot with `args` on the current thread.
    #[tracing::instrument(skip_all, target = "horizon_relay_core::signal", level = "trace")]
    pub fn emit(&self, args: Args) {
        let slots: Vec<Slot<Args>> = self.slots.lock().values().cloned().collect();
        tracing::trace!(target: "horizon_relay_core::signal", slots = slots.len(), "emitting");

        for slot in slots {
            slot(&args);
        }
    }
}

/// A connection made with [`Signal::connect_scoped`].
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU64, Ordering};
/// use horizon_relay_core::Signal;
///
/// let bytes_downloaded = Arc::new(Signal::<u64>::new());
/// let total = Arc::new(AtomicU64::new(0));
/// {
///     let sink = total.clone();
///     let _guard = bytes_downloaded.connect_scoped(move |&n| {
///         sink.fetch_add(n, Ordering::SeqCst);
///     });
///     bytes_downloaded.emit(1024);
/// }
/// bytes_downloaded.emit(2048);
/// assert_eq!(total.load(Ordering::SeqCst), 1024);
/// ```
pub struct ConnectionGuard<Args: Send + 'static> {
    signal: Weak<Signal<Args>>,
    id: Option<ConnectionId>,
}

impl<Args: Send + 'static> Drop for ConnectionGuard<Args> {
    fn drop(&mut self) {
        if let (Some(id), Some(signal)) = (self.id.take(), self.signal.upgrade()) {
            signal.disconnect(id);
        }
    }
}

impl<Args: Send + 'static> std::fmt::Debug for ConnectionGuard<Args> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionGuard").field("id", &self.id).finish()
    }
}

static_assertions::assert_impl_all!(Signal<u32>: Send, Sync);
static_assertions::assert_impl_all!(ConnectionGuard<u32>: Send, Sync);

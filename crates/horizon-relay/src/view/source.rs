//! The interface between item owners and views.

use horizon_relay_core::Signal;

use super::property::PropertyIdSet;

/// A change reported by an item source.
#[derive(Debug, Clone)]
pub enum ItemEvent<T> {
    Added(T),
    Removed(T),
    /// The item changed; the set names the affected properties.
    Updated(T, PropertyIdSet),
}

/// An owner of items that views can mirror.
///
/// Events are emitted synchronously on whatever thread made the change.
/// Sources must not hold their own item lock while emitting, since view
/// slots take the view lock and views call [`list_all`](Self::list_all).
pub trait ItemSource<T>: Send + Sync {
    /// All current items.
    fn list_all(&self) -> Vec<T>;

    /// Change notifications.
    fn events(&self) -> &Signal<ItemEvent<T>>;
}

//! Horizon Relay: live list views over the state of a P2P file-sharing client.
//!
//! The [`view`] module holds the list view engine. The other modules are the
//! item sources it mirrors: download queue bundles, share roots, favorite
//! hubs and search results. Each source owns its items, reports changes
//! through a [`Signal`](horizon_relay_core::Signal) and implements
//! [`ItemSource`](view::ItemSource).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use horizon_relay::queue::{BundleHandler, NewBundle, QueueManager};
//! use horizon_relay::view::{ListViewController, ViewConfig};
//!
//! let queue = Arc::new(QueueManager::new());
//! let view = ListViewController::new(ViewConfig::new("bundle_view"), BundleHandler, queue.clone());
//!
//! view.updated().connect(|update| println!("{}", update.to_json()));
//! view.configure_json(&serde_json::json!({ "sort_property": "name", "max_count": 20 })).unwrap();
//!
//! queue.add_bundle(NewBundle::directory("Linux ISOs", "/downloads/Linux ISOs/", 4096)).unwrap();
//! # view.stop();
//! ```

mod error;
pub mod favorites;
pub mod queue;
pub mod search;
pub mod share;
pub mod view;

pub use error::{Result, SourceError};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as Unix seconds.
pub(crate) fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
pub(crate) mod test_util {
    use parking_lot::Mutex;
    use std::sync::Arc;

    use crate::view::{ItemEvent, ItemSource, ViewItem};

    /// Records `(kind, key)` pairs for every event of a source.
    pub fn record_events<T, S>(source: &S) -> Arc<Mutex<Vec<(&'static str, T::Key)>>>
    where
        T: ViewItem,
        S: ItemSource<T> + ?Sized,
    {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        source.events().connect(move |event: &ItemEvent<T>| {
            let entry = match event {
                ItemEvent::Added(item) => ("added", item.key()),
                ItemEvent::Removed(item) => ("removed", item.key()),
                ItemEvent::Updated(item, _) => ("updated", item.key()),
            };
            sink.lock().push(entry);
        });
        log
    }
}

//! Live list views.
//!
//! A list view takes a large, constantly changing collection, applies a
//! client-chosen filter and sort, and keeps the client's copy of a window
//! into the result up to date with small periodic diffs.
//!
//! # Components
//!
//! - [`Property`] tables describe the fields of an item type
//! - [`PropertyItemHandler`] reads, compares and serializes those fields
//! - [`FilterList`] holds the client's filters (all must match)
//! - [`ItemTasks`] collects source changes between flushes
//! - [`ListViewController`] ties it together and emits [`ViewUpdate`]s
//!
//! # Example
//!
//! ```ignore
//! let view = ListViewController::new(ViewConfig::new("bundle_view"), BundleHandler, queue);
//! view.updated().connect(|update| send(update.to_json()));
//! view.configure_json(&json!({ "sort_property": "name", "max_count": 50 }))?;
//! ```

mod controller;
mod error;
mod filter;
mod handler;
mod property;
mod settings;
mod source;
mod tasks;
mod update;

pub use controller::{DEFAULT_UPDATE_INTERVAL, ListViewController, ViewConfig, ViewState};
pub use error::{ErrorKind, Result, ViewError};
pub use filter::{
    ANY_PROPERTY, FilterId, FilterList, FilterMatcher, FilterMethod, FilterPattern, FilterTarget,
    NumericComparison, NumericMatcher, PropertyFilter, matches_all,
};
pub use handler::{
    PropertyItemHandler, ViewItem, compare_items, compare_text, number_value, serialize_item,
    serialize_properties,
};
pub use property::{
    Property, PropertyId, PropertyIdSet, PropertyType, SerializeMethod, SortMethod,
    all_property_ids, find_property_by_name, to_property_set,
};
pub use settings::{SettingsUpdate, ViewSettings};
pub use source::{ItemEvent, ItemSource};
pub use tasks::{ItemTask, ItemTasks, TaskBatch, TaskKind};
pub use update::{ItemUpdate, ViewUpdate};

//! The download queue.
//!
//! A [`Bundle`] is a file or directory being downloaded. The
//! [`QueueManager`] owns the bundles and reports additions, removals and
//! property changes to views through its event signal. Download progress is
//! recorded silently and published in batches by [`QueueManager::tick`].

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering as AtomicOrdering};

use horizon_relay_core::Signal;
use horizon_relay_core::logging::targets;
use parking_lot::RwLock;
use serde_json::{Value, json};

use crate::error::{Result, SourceError};
use crate::unix_time;
use crate::view::{
    ItemEvent, ItemSource, Property, PropertyId, PropertyIdSet, PropertyItemHandler, PropertyType,
    SerializeMethod, SortMethod, ViewItem, compare_text, to_property_set,
};

/// Identifier of a bundle.
pub type BundleToken = u32;

/// Shared handle to a bundle.
pub type BundlePtr = Arc<Bundle>;

/// Download priority of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i8)]
pub enum Priority {
    PausedForce = -1,
    Paused = 0,
    Lowest = 1,
    Low = 2,
    Normal = 3,
    High = 4,
    Highest = 5,
}

impl Priority {
    /// Parse the numeric wire id.
    pub fn from_id(id: i64) -> Option<Self> {
        Some(match id {
            -1 => Self::PausedForce,
            0 => Self::Paused,
            1 => Self::Lowest,
            2 => Self::Low,
            3 => Self::Normal,
            4 => Self::High,
            5 => Self::Highest,
            _ => return None,
        })
    }

    /// Numeric wire id.
    pub fn id(self) -> i8 {
        self as i8
    }

    /// Display name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PausedForce => "Paused (forced)",
            Self::Paused => "Paused",
            Self::Lowest => "Lowest",
            Self::Low => "Low",
            Self::Normal => "Normal",
            Self::High => "High",
            Self::Highest => "Highest",
        }
    }

    /// Whether downloads are suspended at this priority.
    pub fn is_paused(self) -> bool {
        self <= Self::Paused
    }
}

/// Lifecycle state of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BundleStatus {
    Queued,
    Downloaded,
    Hashing,
    Finished,
    Shared,
    Failed,
}

impl BundleStatus {
    /// Wire id.
    pub fn id(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Downloaded => "downloaded",
            Self::Hashing => "hashing",
            Self::Finished => "finished",
            Self::Shared => "shared",
            Self::Failed => "failed",
        }
    }

    /// Whether the download part is over.
    pub fn is_finished(self) -> bool {
        self >= Self::Downloaded && self != Self::Failed
    }
}

#[derive(Debug, Clone)]
struct BundleState {
    size: u64,
    downloaded_bytes: u64,
    speed: u64,
    priority: Priority,
    status: BundleStatus,
    time_finished: u64,
    online_sources: u32,
    total_sources: u32,
}

/// A file or directory in the download queue.
#[derive(Debug)]
pub struct Bundle {
    token: BundleToken,
    name: String,
    target: String,
    is_file: bool,
    time_added: u64,
    state: RwLock<BundleState>,
    progress_dirty: AtomicBool,
}

impl Bundle {
    pub fn token(&self) -> BundleToken {
        self.token
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Download target path.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Whether this is a single file rather than a directory.
    pub fn is_file(&self) -> bool {
        self.is_file
    }

    pub fn time_added(&self) -> u64 {
        self.time_added
    }

    pub fn size(&self) -> u64 {
        self.state.read().size
    }

    pub fn downloaded_bytes(&self) -> u64 {
        self.state.read().downloaded_bytes
    }

    /// Bytes per second.
    pub fn speed(&self) -> u64 {
        self.state.read().speed
    }

    pub fn priority(&self) -> Priority {
        self.state.read().priority
    }

    pub fn status(&self) -> BundleStatus {
        self.state.read().status
    }

    /// Completion time, 0 while downloading.
    pub fn time_finished(&self) -> u64 {
        self.state.read().time_finished
    }

    /// `(online, total)` source counts.
    pub fn sources(&self) -> (u32, u32) {
        let state = self.state.read();
        (state.online_sources, state.total_sources)
    }

    /// Estimated seconds until completion, 0 when idle.
    pub fn seconds_left(&self) -> u64 {
        let state = self.state.read();
        if state.speed == 0 {
            return 0;
        }
        state.size.saturating_sub(state.downloaded_bytes) / state.speed
    }

    pub fn is_finished(&self) -> bool {
        self.status().is_finished()
    }

    fn status_text(&self) -> String {
        let state = self.state.read();
        match state.status {
            BundleStatus::Queued if state.priority.is_paused() => "Paused".to_string(),
            BundleStatus::Queued if state.speed > 0 => {
                let percent = if state.size == 0 {
                    0.0
                } else {
                    state.downloaded_bytes as f64 * 100.0 / state.size as f64
                };
                format!("Downloading ({percent:.1}%)")
            }
            BundleStatus::Queued => "Queued".to_string(),
            BundleStatus::Downloaded => "Downloaded".to_string(),
            BundleStatus::Hashing => "Hashing".to_string(),
            BundleStatus::Finished => "Finished".to_string(),
            BundleStatus::Shared => "Shared".to_string(),
            BundleStatus::Failed => "Failed".to_string(),
        }
    }

    fn type_text(&self) -> String {
        if !self.is_file {
            return "Directory".to_string();
        }
        match self.name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => ext.to_lowercase(),
            _ => "File".to_string(),
        }
    }

    fn sources_text(&self) -> String {
        let (online, total) = self.sources();
        format!("{online}/{total} online")
    }
}

impl ViewItem for BundlePtr {
    type Key = BundleToken;

    fn key(&self) -> BundleToken {
        self.token
    }
}

/// Parameters of a new bundle.
#[derive(Debug, Clone)]
pub struct NewBundle {
    pub name: String,
    pub target: String,
    pub size: u64,
    pub is_file: bool,
    pub priority: Priority,
}

impl NewBundle {
    /// A directory bundle at normal priority.
    pub fn directory(name: impl Into<String>, target: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            size,
            is_file: false,
            priority: Priority::Normal,
        }
    }

    /// A single-file bundle at normal priority.
    pub fn file(name: impl Into<String>, target: impl Into<String>, size: u64) -> Self {
        Self {
            is_file: true,
            ..Self::directory(name, target, size)
        }
    }

    /// Set the initial priority.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// Owner of the download queue.
#[derive(Debug)]
pub struct QueueManager {
    bundles: RwLock<BTreeMap<BundleToken, BundlePtr>>,
    next_token: AtomicU32,
    events: Signal<ItemEvent<BundlePtr>>,
}

impl Default for QueueManager {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueManager {
    pub fn new() -> Self {
        Self {
            bundles: RwLock::new(BTreeMap::new()),
            next_token: AtomicU32::new(1),
            events: Signal::new(),
        }
    }

    /// Queue a new bundle. Targets must be unique.
    pub fn add_bundle(&self, params: NewBundle) -> Result<BundlePtr> {
        if params.name.is_empty() {
            return Err(SourceError::invalid_field("name", "the name can't be empty"));
        }
        if params.target.is_empty() {
            return Err(SourceError::invalid_field("target", "the target can't be empty"));
        }

        let bundle = {
            let mut bundles = self.bundles.write();
            if bundles.values().any(|b| b.target == params.target) {
                return Err(SourceError::duplicate("target", params.target));
            }

            let bundle = Arc::new(Bundle {
                token: self.next_token.fetch_add(1, AtomicOrdering::Relaxed),
                name: params.name,
                target: params.target,
                is_file: params.is_file,
                time_added: unix_time(),
                state: RwLock::new(BundleState {
                    size: params.size,
                    downloaded_bytes: 0,
                    speed: 0,
                    priority: params.priority,
                    status: BundleStatus::Queued,
                    time_finished: 0,
                    online_sources: 0,
                    total_sources: 0,
                }),
                progress_dirty: AtomicBool::new(false),
            });
            bundles.insert(bundle.token, bundle.clone());
            bundle
        };

        tracing::debug!(target: targets::SOURCE, token = bundle.token, name = %bundle.name, "bundle added");
        self.events.emit(ItemEvent::Added(bundle.clone()));
        Ok(bundle)
    }

    /// Remove a bundle from the queue.
    pub fn remove_bundle(&self, token: BundleToken) -> Result<BundlePtr> {
        let bundle = self
            .bundles
            .write()
            .remove(&token)
            .ok_or_else(|| SourceError::not_found("Bundle", token))?;

        tracing::debug!(target: targets::SOURCE, token, "bundle removed");
        self.events.emit(ItemEvent::Removed(bundle.clone()));
        Ok(bundle)
    }

    /// Remove every finished bundle, returning how many were removed.
    pub fn remove_finished_bundles(&self) -> usize {
        let removed: Vec<BundlePtr> = {
            let mut bundles = self.bundles.write();
            let finished: Vec<BundleToken> = bundles
                .values()
                .filter(|b| b.is_finished())
                .map(|b| b.token)
                .collect();
            finished.iter().filter_map(|t| bundles.remove(t)).collect()
        };

        for bundle in &removed {
            self.events.emit(ItemEvent::Removed(bundle.clone()));
        }
        removed.len()
    }

    pub fn find_bundle(&self, token: BundleToken) -> Option<BundlePtr> {
        self.bundles.read().get(&token).cloned()
    }

    /// All bundles ordered by token.
    pub fn bundles(&self) -> Vec<BundlePtr> {
        self.bundles.read().values().cloned().collect()
    }

    pub fn bundle_count(&self) -> usize {
        self.bundles.read().len()
    }

    /// Change the priority of a bundle.
    pub fn set_bundle_priority(&self, token: BundleToken, priority: Priority) -> Result<()> {
        let bundle = self.get(token)?;
        {
            let mut state = bundle.state.write();
            if state.priority == priority {
                return Ok(());
            }
            state.priority = priority;
            if priority.is_paused() {
                state.speed = 0;
            }
        }

        self.emit_updated(&bundle, &[PROP_PRIORITY, PROP_STATUS]);
        Ok(())
    }

    /// Change the priority of every unfinished bundle.
    pub fn set_priority_all(&self, priority: Priority) -> usize {
        let mut changed = 0;
        for bundle in self.bundles() {
            if !bundle.is_finished() && self.set_bundle_priority(bundle.token, priority).is_ok() {
                changed += 1;
            }
        }
        changed
    }

    /// Set the source counts of a bundle.
    pub fn set_sources(&self, token: BundleToken, online: u32, total: u32) -> Result<()> {
        let bundle = self.get(token)?;
        {
            let mut state = bundle.state.write();
            state.online_sources = online.min(total);
            state.total_sources = total;
        }

        self.emit_updated(&bundle, &[PROP_SOURCES]);
        Ok(())
    }

    /// Record received bytes and the current speed of a bundle.
    ///
    /// Progress is published by the next [`tick`](Self::tick). Completing
    /// the download publishes the status change right away.
    pub fn record_progress(&self, token: BundleToken, received: u64, speed: u64) -> Result<()> {
        let bundle = self.get(token)?;
        let completed = {
            let mut state = bundle.state.write();
            if state.status != BundleStatus::Queued {
                return Err(SourceError::InvalidState(format!(
                    "Bundle {token} isn't downloading"
                )));
            }
            if state.priority.is_paused() {
                return Err(SourceError::InvalidState(format!("Bundle {token} is paused")));
            }

            state.downloaded_bytes = state.downloaded_bytes.saturating_add(received).min(state.size);
            state.speed = speed;
            if state.downloaded_bytes == state.size {
                state.status = BundleStatus::Downloaded;
                state.speed = 0;
                state.time_finished = unix_time();
                true
            } else {
                false
            }
        };

        bundle.progress_dirty.store(true, AtomicOrdering::Release);
        if completed {
            tracing::info!(target: targets::SOURCE, token, name = %bundle.name, "bundle downloaded");
            self.emit_updated(&bundle, &[PROP_STATUS, PROP_TIME_FINISHED]);
        }
        Ok(())
    }

    /// Move a bundle through the post-download states.
    pub fn set_bundle_status(&self, token: BundleToken, status: BundleStatus) -> Result<()> {
        let bundle = self.get(token)?;
        {
            let mut state = bundle.state.write();
            if state.status == status {
                return Ok(());
            }
            state.status = status;
            if status.is_finished() && state.time_finished == 0 {
                state.time_finished = unix_time();
            }
        }

        self.emit_updated(&bundle, &[PROP_STATUS, PROP_TIME_FINISHED]);
        Ok(())
    }

    /// Publish the progress recorded since the previous tick.
    ///
    /// Returns the number of bundles reported.
    pub fn tick(&self) -> usize {
        let ticked: Vec<BundlePtr> = self
            .bundles
            .read()
            .values()
            .filter(|b| b.progress_dirty.swap(false, AtomicOrdering::AcqRel))
            .cloned()
            .collect();

        let changed = tick_properties();
        for bundle in &ticked {
            self.events
                .emit(ItemEvent::Updated(bundle.clone(), changed.clone()));
        }
        ticked.len()
    }

    fn get(&self, token: BundleToken) -> Result<BundlePtr> {
        self.find_bundle(token)
            .ok_or_else(|| SourceError::not_found("Bundle", token))
    }

    fn emit_updated(&self, bundle: &BundlePtr, properties: &[PropertyId]) {
        self.events
            .emit(ItemEvent::Updated(bundle.clone(), to_property_set(properties)));
    }
}

impl ItemSource<BundlePtr> for QueueManager {
    fn list_all(&self) -> Vec<BundlePtr> {
        self.bundles()
    }

    fn events(&self) -> &Signal<ItemEvent<BundlePtr>> {
        &self.events
    }
}

pub const PROP_NAME: PropertyId = 0;
pub const PROP_TARGET: PropertyId = 1;
pub const PROP_TYPE: PropertyId = 2;
pub const PROP_SIZE: PropertyId = 3;
pub const PROP_STATUS: PropertyId = 4;
pub const PROP_BYTES_DOWNLOADED: PropertyId = 5;
pub const PROP_PRIORITY: PropertyId = 6;
pub const PROP_TIME_ADDED: PropertyId = 7;
pub const PROP_TIME_FINISHED: PropertyId = 8;
pub const PROP_SPEED: PropertyId = 9;
pub const PROP_SECONDS_LEFT: PropertyId = 10;
pub const PROP_SOURCES: PropertyId = 11;

/// Bundle property table.
pub static BUNDLE_PROPERTIES: [Property; 12] = [
    Property::new(PROP_NAME, "name", PropertyType::Text, SortMethod::Custom, SerializeMethod::Text),
    Property::text(PROP_TARGET, "target"),
    Property::custom(PROP_TYPE, "type", SortMethod::Custom),
    Property::numeric(PROP_SIZE, "size", PropertyType::Size),
    Property::custom(PROP_STATUS, "status", SortMethod::Custom),
    Property::numeric(PROP_BYTES_DOWNLOADED, "downloaded_bytes", PropertyType::Size),
    Property::custom(PROP_PRIORITY, "priority", SortMethod::Custom),
    Property::numeric(PROP_TIME_ADDED, "time_added", PropertyType::Time),
    Property::numeric(PROP_TIME_FINISHED, "time_finished", PropertyType::Time),
    Property::numeric(PROP_SPEED, "speed", PropertyType::Speed),
    Property::numeric(PROP_SECONDS_LEFT, "seconds_left", PropertyType::Time),
    Property::custom(PROP_SOURCES, "sources", SortMethod::Custom),
];

/// Properties reported by each progress tick.
pub fn tick_properties() -> PropertyIdSet {
    to_property_set(&[PROP_SPEED, PROP_SECONDS_LEFT, PROP_BYTES_DOWNLOADED, PROP_STATUS])
}

/// Property access for bundles.
#[derive(Debug, Clone, Copy, Default)]
pub struct BundleHandler;

impl PropertyItemHandler for BundleHandler {
    type Item = BundlePtr;

    fn properties(&self) -> &[Property] {
        &BUNDLE_PROPERTIES
    }

    fn number(&self, bundle: &BundlePtr, property: PropertyId) -> f64 {
        match property {
            PROP_SIZE => bundle.size() as f64,
            PROP_BYTES_DOWNLOADED => bundle.downloaded_bytes() as f64,
            PROP_PRIORITY => f64::from(bundle.priority().id()),
            PROP_TIME_ADDED => bundle.time_added as f64,
            PROP_TIME_FINISHED => bundle.time_finished() as f64,
            PROP_SPEED => bundle.speed() as f64,
            PROP_SECONDS_LEFT => bundle.seconds_left() as f64,
            _ => 0.0,
        }
    }

    fn text(&self, bundle: &BundlePtr, property: PropertyId) -> String {
        match property {
            PROP_NAME => bundle.name.clone(),
            PROP_TARGET => bundle.target.clone(),
            PROP_TYPE => bundle.type_text(),
            PROP_STATUS => bundle.status_text(),
            PROP_PRIORITY => bundle.priority().as_str().to_string(),
            PROP_SOURCES => bundle.sources_text(),
            _ => self.number(bundle, property).to_string(),
        }
    }

    fn compare_custom(&self, a: &BundlePtr, b: &BundlePtr, property: PropertyId) -> Ordering {
        match property {
            // Directories first
            PROP_NAME | PROP_TYPE => a
                .is_file
                .cmp(&b.is_file)
                .then_with(|| compare_text(&self.text(a, property), &self.text(b, property))),
            PROP_STATUS => a.status().cmp(&b.status()).then_with(|| {
                let progress = |x: &BundlePtr| {
                    let size = x.size();
                    if size == 0 { 0.0 } else { x.downloaded_bytes() as f64 / size as f64 }
                };
                progress(a).total_cmp(&progress(b))
            }),
            PROP_PRIORITY => a.priority().cmp(&b.priority()),
            PROP_SOURCES => {
                let (a_online, a_total) = a.sources();
                let (b_online, b_total) = b.sources();
                a_online.cmp(&b_online).then(a_total.cmp(&b_total))
            }
            _ => Ordering::Equal,
        }
    }

    fn serialize_custom(&self, bundle: &BundlePtr, property: PropertyId) -> Value {
        match property {
            PROP_TYPE => json!({
                "id": if bundle.is_file { "file" } else { "directory" },
                "str": bundle.type_text(),
            }),
            PROP_STATUS => {
                let status = bundle.status();
                json!({
                    "id": status.id(),
                    "finished": status.is_finished(),
                    "str": bundle.status_text(),
                })
            }
            PROP_PRIORITY => {
                let priority = bundle.priority();
                json!({ "id": priority.id(), "str": priority.as_str() })
            }
            PROP_SOURCES => {
                let (online, total) = bundle.sources();
                json!({ "online": online, "total": total, "str": bundle.sources_text() })
            }
            _ => Value::Null,
        }
    }
}

static_assertions::assert_impl_all!(QueueManager: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::record_events;
    use crate::view::{FilterMatcher, ListViewController, ViewConfig, serialize_item};
    use std::time::Duration;

    fn queue_with(names: &[(&str, u64)]) -> (QueueManager, Vec<BundlePtr>) {
        let queue = QueueManager::new();
        let bundles = names
            .iter()
            .map(|(name, size)| {
                queue
                    .add_bundle(NewBundle::directory(*name, format!("/dl/{name}/"), *size))
                    .unwrap()
            })
            .collect();
        (queue, bundles)
    }

    #[test]
    fn test_add_and_remove_emit_events() {
        let queue = QueueManager::new();
        let events = record_events::<BundlePtr, _>(&queue);

        let bundle = queue.add_bundle(NewBundle::file("a.iso", "/dl/a.iso", 100)).unwrap();
        queue.remove_bundle(bundle.token()).unwrap();

        assert_eq!(
            *events.lock(),
            vec![("added", bundle.token()), ("removed", bundle.token())]
        );
        assert!(queue.find_bundle(bundle.token()).is_none());
    }

    #[test]
    fn test_duplicate_target_rejected() {
        let queue = QueueManager::new();
        queue.add_bundle(NewBundle::directory("a", "/dl/a/", 1)).unwrap();
        let err = queue.add_bundle(NewBundle::directory("b", "/dl/a/", 1)).unwrap_err();
        assert!(matches!(err, SourceError::Duplicate { field: "target", .. }));
        assert_eq!(queue.bundle_count(), 1);
    }

    #[test]
    fn test_remove_unknown_bundle() {
        let queue = QueueManager::new();
        assert!(matches!(
            queue.remove_bundle(42),
            Err(SourceError::NotFound { .. })
        ));
    }

    #[test]
    fn test_progress_is_published_by_tick() {
        let (queue, bundles) = queue_with(&[("a", 1000), ("b", 1000)]);
        let events = record_events::<BundlePtr, _>(&queue);

        queue.record_progress(bundles[0].token(), 250, 50).unwrap();
        assert!(events.lock().is_empty());
        assert_eq!(bundles[0].seconds_left(), 15);

        assert_eq!(queue.tick(), 1);
        assert_eq!(*events.lock(), vec![("updated", bundles[0].token())]);

        // Nothing new since the last tick
        assert_eq!(queue.tick(), 0);
    }

    #[test]
    fn test_completion_finishes_bundle() {
        let (queue, bundles) = queue_with(&[("a", 100)]);
        let token = bundles[0].token();

        queue.record_progress(token, 500, 10).unwrap();
        assert_eq!(bundles[0].downloaded_bytes(), 100);
        assert_eq!(bundles[0].status(), BundleStatus::Downloaded);
        assert!(bundles[0].time_finished() > 0);
        assert_eq!(bundles[0].speed(), 0);

        assert!(matches!(
            queue.record_progress(token, 1, 1),
            Err(SourceError::InvalidState(_))
        ));
    }

    #[test]
    fn test_paused_bundle_rejects_progress() {
        let (queue, bundles) = queue_with(&[("a", 100)]);
        let token = bundles[0].token();
        queue.set_bundle_priority(token, Priority::Paused).unwrap();

        assert!(queue.record_progress(token, 1, 1).is_err());
        assert_eq!(BundleHandler.text(&bundles[0], PROP_STATUS), "Paused");
    }

    #[test]
    fn test_remove_finished_bundles() {
        let (queue, bundles) = queue_with(&[("a", 10), ("b", 10), ("c", 10)]);
        queue.record_progress(bundles[0].token(), 10, 1).unwrap();
        queue
            .set_bundle_status(bundles[2].token(), BundleStatus::Shared)
            .unwrap();

        assert_eq!(queue.remove_finished_bundles(), 2);
        let left: Vec<_> = queue.bundles().iter().map(|b| b.token()).collect();
        assert_eq!(left, vec![bundles[1].token()]);
    }

    #[test]
    fn test_priority_update_reports_changed_properties() {
        let (queue, bundles) = queue_with(&[("a", 10)]);
        let changed = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = changed.clone();
        queue.events().connect(move |event| {
            if let ItemEvent::Updated(_, props) = event {
                sink.lock().push(props.clone());
            }
        });

        queue
            .set_bundle_priority(bundles[0].token(), Priority::High)
            .unwrap();
        // Unchanged priority is not reported
        queue
            .set_bundle_priority(bundles[0].token(), Priority::High)
            .unwrap();

        assert_eq!(
            *changed.lock(),
            vec![to_property_set(&[PROP_PRIORITY, PROP_STATUS])]
        );
    }

    #[test]
    fn test_priority_from_id() {
        assert_eq!(Priority::from_id(4), Some(Priority::High));
        assert_eq!(Priority::from_id(-1), Some(Priority::PausedForce));
        assert_eq!(Priority::from_id(9), None);
        assert!(Priority::PausedForce.is_paused());
        assert!(!Priority::Lowest.is_paused());
    }

    #[test]
    fn test_directories_sort_before_files() {
        let queue = QueueManager::new();
        let file = queue.add_bundle(NewBundle::file("a.iso", "/dl/a.iso", 1)).unwrap();
        let dir = queue.add_bundle(NewBundle::directory("z", "/dl/z/", 1)).unwrap();

        assert_eq!(
            BundleHandler.compare_custom(&dir, &file, PROP_NAME),
            Ordering::Less
        );
        assert_eq!(BundleHandler.text(&file, PROP_TYPE), "iso");
    }

    #[test]
    fn test_serialize_bundle() {
        let (queue, bundles) = queue_with(&[("Linux", 2048)]);
        queue.set_sources(bundles[0].token(), 5, 3).unwrap();

        let value = serialize_item(&BundleHandler, &bundles[0]);
        assert_eq!(value["id"], bundles[0].token());
        assert_eq!(value["name"], "Linux");
        assert_eq!(value["size"], 2048);
        assert_eq!(value["type"]["id"], "directory");
        assert_eq!(value["priority"]["id"], 3);
        assert_eq!(value["status"]["id"], "queued");
        assert_eq!(value["sources"]["online"], 3);
        assert_eq!(value["sources"]["str"], "3/3 online");
    }

    #[test]
    fn test_filter_on_custom_property() {
        let (queue, bundles) = queue_with(&[("a", 10)]);
        queue
            .set_bundle_priority(bundles[0].token(), Priority::Highest)
            .unwrap();

        let matcher = FilterMatcher::from_json(
            &json!({ "property": "priority", "pattern": "high" }),
            &BUNDLE_PROPERTIES,
        )
        .unwrap()
        .unwrap();
        assert!(matcher.matches(&BundleHandler, &bundles[0]));
    }

    #[test]
    fn test_bundle_view_follows_ticks() {
        let (queue, bundles) = queue_with(&[("a", 1000), ("b", 1000)]);
        let queue = Arc::new(queue);
        let view = ListViewController::new(
            ViewConfig::new("bundle_view").update_interval(Duration::from_secs(3600)),
            BundleHandler,
            queue.clone(),
        );
        view.configure_json(&json!({ "sort_property": "downloaded_bytes", "sort_ascending": false, "max_count": 10 }))
            .unwrap();
        assert!(view.run_tasks().is_some());

        queue.record_progress(bundles[1].token(), 600, 100).unwrap();
        queue.tick();

        let update = view.run_tasks().unwrap();
        assert_eq!(update.item_ids(), vec![json!(bundles[1].token()), json!(bundles[0].token())]);
        let first = &update.items.as_ref().unwrap()[0];
        let props = first.properties.as_ref().unwrap();
        assert_eq!(props["downloaded_bytes"], 600);
        assert!(props.contains_key("seconds_left"));
        assert!(!props.contains_key("name"));

        view.stop();
    }
}

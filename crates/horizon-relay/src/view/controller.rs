//! The list view controller.
//!
//! A [`ListViewController`] mirrors one item source for one subscriber. It
//! keeps every known item, the subset passing the filters in sorted order,
//! and a window into that subset. Changes from the source are queued and
//! applied once per timer tick, producing a [`ViewUpdate`] that describes
//! only what changed in the window.
//!
//! # Locking
//!
//! All view state sits behind one `RwLock`. Source notifications and control
//! requests take the write lock for a queue append or a settings change.
//! Sorting and diffing happen during the flush on the timer thread. Page
//! requests take the read lock. Updates are emitted after the lock is
//! released.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use horizon_relay_core::logging::{span_names, targets};
use horizon_relay_core::{ConnectionId, PerfSpan, Signal, Timer};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use serde_json::Value;

use super::error::{Result, ViewError};
use super::filter::{FilterId, FilterMatcher, FilterList, matches_all};
use super::handler::{PropertyItemHandler, ViewItem, compare_items, serialize_item, serialize_properties};
use super::property::{PropertyId, PropertyIdSet, all_property_ids};
use super::settings::{SettingsUpdate, ViewSettings};
use super::source::{ItemEvent, ItemSource};
use super::tasks::{ItemTasks, TaskKind};
use super::update::{ItemUpdate, ViewUpdate};

/// Default interval between two flushes.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(200);

/// Configuration of a view.
#[derive(Debug, Clone)]
pub struct ViewConfig {
    /// View name, used for the push event and in logs.
    pub name: String,
    /// Interval between two flushes.
    pub update_interval: Duration,
}

impl ViewConfig {
    /// A config with the default interval.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            update_interval: DEFAULT_UPDATE_INTERVAL,
        }
    }

    /// Set the flush interval.
    pub fn update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }
}

/// Lifecycle state of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    /// Not activated, or torn down.
    Inactive,
    /// Flushing on every tick.
    Active,
    /// Collecting changes without flushing.
    Paused,
}

type ItemKey<H> = <<H as PropertyItemHandler>::Item as ViewItem>::Key;

/// Items known to the view.
struct ViewData<T: ViewItem> {
    /// All items by arrival sequence, so rebuilds keep a stable base order.
    all_items: BTreeMap<u64, T>,
    index: HashMap<T::Key, u64>,
    next_seq: u64,
    /// Items passing the filters, sorted.
    matching: Vec<T>,
    matching_keys: HashSet<T::Key>,
    /// Set when `matching` was rebuilt and needs a full sort.
    list_changed: bool,
    prev_sort: Option<(PropertyId, bool)>,
    prev_window: Vec<T::Key>,
    prev_matching_count: Option<usize>,
    prev_total_count: Option<usize>,
    prev_range_start: Option<usize>,
}

impl<T: ViewItem> ViewData<T> {
    fn new() -> Self {
        Self {
            all_items: BTreeMap::new(),
            index: HashMap::new(),
            next_seq: 0,
            matching: Vec::new(),
            matching_keys: HashSet::new(),
            list_changed: false,
            prev_sort: None,
            prev_window: Vec::new(),
            prev_matching_count: None,
            prev_total_count: None,
            prev_range_start: None,
        }
    }

    /// Returns `false` for an item that is already known.
    fn insert(&mut self, item: T) -> bool {
        let key = item.key();
        if self.index.contains_key(&key) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(key, seq);
        self.all_items.insert(seq, item);
        true
    }

    fn remove_matching(&mut self, key: &T::Key) -> Option<usize> {
        if !self.matching_keys.remove(key) {
            return None;
        }
        let pos = self.matching.iter().position(|i| i.key() == *key)?;
        self.matching.remove(pos);
        Some(pos)
    }

    fn clear_items(&mut self) {
        self.all_items.clear();
        self.index.clear();
        self.matching.clear();
        self.matching_keys.clear();
    }
}

struct ViewInner<T: ViewItem> {
    state: ViewState,
    settings: ViewSettings,
    filters: FilterList,
    tasks: ItemTasks<T>,
    data: ViewData<T>,
}

impl<T: ViewItem> ViewInner<T> {
    fn new() -> Self {
        Self {
            state: ViewState::Inactive,
            settings: ViewSettings::default(),
            filters: FilterList::new(),
            tasks: ItemTasks::new(),
            data: ViewData::new(),
        }
    }
}

/// A filtered, sorted and windowed live view over an item source.
pub struct ListViewController<H: PropertyItemHandler> {
    name: String,
    handler: H,
    source: Arc<dyn ItemSource<H::Item>>,
    inner: RwLock<ViewInner<H::Item>>,
    timer: Timer,
    source_connection: Mutex<Option<ConnectionId>>,
    this: Weak<Self>,
    /// Emitted with `true` on activation and `false` on teardown.
    state_changed: Signal<bool>,
    /// Emitted after every flush that produced a non-empty diff.
    updated: Arc<Signal<ViewUpdate>>,
}

impl<H: PropertyItemHandler> ListViewController<H> {
    /// Create an inactive view over `source`.
    pub fn new(config: ViewConfig, handler: H, source: Arc<dyn ItemSource<H::Item>>) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let weak = this.clone();
            let timer = Timer::new(config.name.clone(), config.update_interval, move || {
                if let Some(view) = weak.upgrade() {
                    view.run_tasks();
                }
            });

            Self {
                name: config.name,
                handler,
                source,
                inner: RwLock::new(ViewInner::new()),
                timer,
                source_connection: Mutex::new(None),
                this: this.clone(),
                state_changed: Signal::new(),
                updated: Arc::new(Signal::new()),
            }
        })
    }

    /// The view name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The property handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Activation and teardown notifications.
    pub fn state_changed(&self) -> &Signal<bool> {
        &self.state_changed
    }

    /// Diff notifications. Shared so that bindings can hold scoped
    /// connections to it.
    pub fn updated(&self) -> &Arc<Signal<ViewUpdate>> {
        &self.updated
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ViewState {
        self.inner.read().state
    }

    /// Whether the view has been activated and not torn down.
    pub fn is_active(&self) -> bool {
        self.state() != ViewState::Inactive
    }

    /// A copy of the current settings.
    pub fn settings(&self) -> ViewSettings {
        self.inner.read().settings.clone()
    }

    /// Number of known items.
    pub fn total_count(&self) -> usize {
        self.inner.read().data.all_items.len()
    }

    /// Number of items passing the filters.
    pub fn matching_count(&self) -> usize {
        self.inner.read().data.matching.len()
    }

    /// Keys of the matching items, in view order.
    pub fn matching_keys(&self) -> Vec<ItemKey<H>> {
        self.inner.read().data.matching.iter().map(ViewItem::key).collect()
    }

    /// Keys of the window reported by the last flush.
    pub fn visible_keys(&self) -> Vec<ItemKey<H>> {
        self.inner.read().data.prev_window.clone()
    }

    /// Number of items with queued changes.
    pub fn pending_tasks(&self) -> usize {
        self.inner.read().tasks.len()
    }

    /// Number of filters, empty ones included.
    pub fn filter_count(&self) -> usize {
        self.inner.read().filters.len()
    }

    // ---- control surface ----

    /// Parse and apply a `configure` request body.
    pub fn configure_json(&self, body: &Value) -> Result<()> {
        let update = SettingsUpdate::from_json(body, self.handler.properties())?;
        self.configure(&update)
    }

    /// Apply validated settings, activating the view on first use.
    pub fn configure(&self, update: &SettingsUpdate) -> Result<()> {
        let activate = {
            let mut inner = self.inner.write();
            inner.settings.apply(update);
            inner.state == ViewState::Inactive
        };

        if activate {
            return self.activate(update.paused == Some(true));
        }

        match update.paused {
            Some(true) => self.pause(),
            Some(false) => self.resume()?,
            None => {}
        }
        Ok(())
    }

    fn activate(&self, paused: bool) -> Result<()> {
        {
            let mut inner = self.inner.write();
            if inner.state != ViewState::Inactive {
                return Ok(());
            }
            inner.state = if paused {
                ViewState::Paused
            } else {
                ViewState::Active
            };
        }

        // Subscribe before listing so no change falls in between; duplicates
        // are dropped when the queued additions are applied.
        self.connect_source();
        let items = self.source.list_all();

        {
            let mut inner = self.inner.write();
            if inner.state == ViewState::Inactive {
                return Ok(());
            }
            for item in items {
                inner.data.insert(item);
            }
            self.rebuild_matching(&mut inner);
            tracing::debug!(
                target: targets::VIEW,
                view = %self.name,
                items = inner.data.all_items.len(),
                "view activated"
            );
        }

        self.state_changed.emit(true);
        if !paused {
            self.timer.start(false)?;
        }
        Ok(())
    }

    fn pause(&self) {
        {
            let mut inner = self.inner.write();
            if inner.state != ViewState::Active {
                return;
            }
            inner.state = ViewState::Paused;
        }
        self.timer.stop(true);
        tracing::debug!(target: targets::VIEW, view = %self.name, "view paused");
    }

    fn resume(&self) -> Result<()> {
        {
            let mut inner = self.inner.write();
            if inner.state != ViewState::Paused {
                return Ok(());
            }
            inner.state = ViewState::Active;
            inner.data.list_changed = true;
        }
        tracing::debug!(target: targets::VIEW, view = %self.name, "view resumed");
        self.timer.start(true)?;
        Ok(())
    }

    /// Add an empty filter.
    pub fn add_filter(&self) -> FilterId {
        self.inner.write().filters.add()
    }

    /// Add a filter from a request body. An empty body adds an empty filter.
    pub fn add_filter_json(&self, body: &Value) -> Result<FilterId> {
        let matcher = match body {
            Value::Object(map) if !map.is_empty() => {
                FilterMatcher::from_json(body, self.handler.properties())?
            }
            _ => None,
        };

        let mut inner = self.inner.write();
        let id = inner.filters.add();
        if matcher.is_some() {
            inner.filters.set(id, matcher)?;
            self.on_filter_updated(&mut inner);
        }
        Ok(id)
    }

    /// Replace the pattern of a filter.
    pub fn set_filter(&self, id: FilterId, matcher: Option<FilterMatcher>) -> Result<()> {
        let mut inner = self.inner.write();
        inner.filters.set(id, matcher)?;
        self.on_filter_updated(&mut inner);
        Ok(())
    }

    /// Replace the pattern of a filter from a request body.
    pub fn set_filter_json(&self, id: FilterId, body: &Value) -> Result<()> {
        if !self.inner.read().filters.contains(id) {
            return Err(ViewError::FilterNotFound(id));
        }
        let matcher = FilterMatcher::from_json(body, self.handler.properties())?;
        self.set_filter(id, matcher)
    }

    /// Remove a filter.
    pub fn remove_filter(&self, id: FilterId) -> Result<()> {
        let mut inner = self.inner.write();
        inner.filters.remove(id)?;
        self.on_filter_updated(&mut inner);
        Ok(())
    }

    /// Remove every filter.
    pub fn clear_filters(&self) {
        let mut inner = self.inner.write();
        inner.filters.clear();
        self.on_filter_updated(&mut inner);
    }

    fn on_filter_updated(&self, inner: &mut ViewInner<H::Item>) {
        self.rebuild_matching(inner);
        inner.settings.set_range_start(0);
    }

    fn rebuild_matching(&self, inner: &mut ViewInner<H::Item>) {
        let _perf = PerfSpan::new("view_refilter");
        let matchers = inner.filters.matchers();
        let handler = &self.handler;
        let items: Vec<&H::Item> = inner.data.all_items.values().collect();
        let matching: Vec<H::Item> = items
            .par_iter()
            .filter(|&&item| matches_all(handler, item, &matchers))
            .map(|item| (*item).clone())
            .collect();

        inner.data.matching_keys = matching.iter().map(ViewItem::key).collect();
        inner.data.matching = matching;
        inner.data.list_changed = true;
    }

    /// Tear the view down, reporting an error if it was never activated.
    pub fn reset(&self) -> Result<()> {
        if !self.is_active() {
            return Err(ViewError::NotActive);
        }
        self.stop();
        Ok(())
    }

    /// Tear the view down: stop the timer, wait for a running flush, drop
    /// the source subscription and clear all state.
    pub fn stop(&self) {
        self.timer.stop(true);
        self.disconnect_source();

        let was_active = {
            let mut inner = self.inner.write();
            let was_active = inner.state != ViewState::Inactive;
            *inner = ViewInner::new();
            was_active
        };

        if was_active {
            tracing::debug!(target: targets::VIEW, view = %self.name, "view stopped");
            self.state_changed.emit(false);
        }
    }

    /// Reload every item from the source, dropping queued changes.
    pub fn reset_items(&self) {
        if !self.is_active() {
            return;
        }
        let items = self.source.list_all();

        let mut inner = self.inner.write();
        if inner.state == ViewState::Inactive {
            return;
        }
        inner.tasks.clear();
        inner.data.clear_items();
        for item in items {
            inner.data.insert(item);
        }
        self.rebuild_matching(&mut inner);
        inner.settings.set_range_start(0);
    }

    // ---- source notifications ----

    /// Queue an added item.
    pub fn on_item_added(&self, item: H::Item) {
        let mut inner = self.inner.write();
        if inner.state != ViewState::Inactive {
            inner.tasks.add_item(item);
        }
    }

    /// Queue a removed item.
    pub fn on_item_removed(&self, item: H::Item) {
        let mut inner = self.inner.write();
        if inner.state != ViewState::Inactive {
            inner.tasks.remove_item(item);
        }
    }

    /// Queue a changed item.
    pub fn on_item_updated(&self, item: H::Item, changed: PropertyIdSet) {
        let mut inner = self.inner.write();
        if inner.state != ViewState::Inactive {
            inner.tasks.update_item(item, changed);
        }
    }

    /// Queue several items that changed the same properties.
    pub fn on_items_updated<I>(&self, items: I, changed: &PropertyIdSet)
    where
        I: IntoIterator<Item = H::Item>,
    {
        let mut inner = self.inner.write();
        if inner.state == ViewState::Inactive {
            return;
        }
        for item in items {
            inner.tasks.update_item(item, changed.clone());
        }
    }

    fn handle_event(&self, event: &ItemEvent<H::Item>) {
        match event {
            ItemEvent::Added(item) => self.on_item_added(item.clone()),
            ItemEvent::Removed(item) => self.on_item_removed(item.clone()),
            ItemEvent::Updated(item, changed) => self.on_item_updated(item.clone(), changed.clone()),
        }
    }

    fn connect_source(&self) {
        let mut connection = self.source_connection.lock();
        if connection.is_some() {
            return;
        }
        let weak = self.this.clone();
        *connection = Some(self.source.events().connect(move |event| {
            if let Some(view) = weak.upgrade() {
                view.handle_event(event);
            }
        }));
    }

    fn disconnect_source(&self) {
        if let Some(id) = self.source_connection.lock().take() {
            self.source.events().disconnect(id);
        }
    }

    // ---- queries ----

    /// Serialize `matching[start..end]` with every property.
    pub fn get_items(&self, start: usize, end: usize) -> Vec<Value> {
        let inner = self.inner.read();
        let matching = &inner.data.matching;
        let end = end.min(matching.len());
        if start >= end {
            return Vec::new();
        }
        matching[start..end]
            .iter()
            .map(|item| serialize_item(&self.handler, item))
            .collect()
    }

    // ---- flush ----

    /// Run one flush pass and emit the resulting diff, if any.
    ///
    /// Called by the timer; may also be called directly.
    pub fn run_tasks(&self) -> Option<ViewUpdate> {
        let update = self.flush()?;
        self.updated.emit(update.clone());
        Some(update)
    }

    fn flush(&self) -> Option<ViewUpdate> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        if inner.state != ViewState::Active {
            return None;
        }

        // Without a sort property the view isn't ready; keep the tasks.
        let sort_property = inner.settings.sort_property()?;
        if inner.tasks.is_empty() && !inner.settings.is_changed() && !inner.data.list_changed {
            return None;
        }

        let _span = tracing::trace_span!(
            target: targets::VIEW,
            span_names::VIEW_FLUSH,
            view = %self.name
        )
        .entered();

        let settings_changed = inner.settings.take_changed();
        let ascending = inner.settings.sort_ascending();
        let sort = (sort_property, ascending);
        let batch = inner.tasks.take();
        let matchers = inner.filters.matchers();
        let start_at_begin = inner.settings.range_start();
        let mut range_start = start_at_begin;
        let handler = &self.handler;
        let data = &mut inner.data;

        let need_sort = batch.updated_properties.contains(&sort_property)
            || data.prev_sort != Some(sort)
            || data.list_changed;
        if need_sort {
            let started = Instant::now();
            data.matching
                .par_sort_by(|a, b| compare_items(handler, a, b, sort_property, ascending));
            tracing::debug!(
                target: targets::VIEW,
                view = %self.name,
                items = data.matching.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "table sorted"
            );
            data.list_changed = false;
            data.prev_sort = Some(sort);
        }

        let mut updated: HashMap<ItemKey<H>, PropertyIdSet> = HashMap::new();
        for task in batch.tasks {
            match task.kind {
                TaskKind::Add => {
                    if task.replaces {
                        self.apply_remove(data, &task.item, &mut range_start);
                    }
                    self.apply_add(data, task.item, &matchers, sort, &mut range_start)
                }
                TaskKind::Remove => self.apply_remove(data, &task.item, &mut range_start),
                TaskKind::Update => self.apply_update(
                    data,
                    task.item,
                    task.changed,
                    &matchers,
                    sort,
                    &mut range_start,
                    &mut updated,
                ),
            }
        }

        let matching_count = data.matching.len();
        if range_start >= matching_count {
            range_start = 0;
        }
        inner.settings.adjust_range_start(range_start);

        let end = range_start
            .saturating_add(inner.settings.max_count())
            .min(matching_count);
        let window = &data.matching[range_start..end];
        let window_keys: Vec<ItemKey<H>> = window.iter().map(ViewItem::key).collect();

        let mut update = ViewUpdate::default();
        let window_changed = window_keys != data.prev_window;
        let has_updates = window_keys.iter().any(|k| updated.contains_key(k));
        if window_changed || has_updates || settings_changed {
            let previous: HashSet<&ItemKey<H>> = data.prev_window.iter().collect();
            let all_properties = all_property_ids(handler.properties());
            let items = window
                .iter()
                .zip(&window_keys)
                .enumerate()
                .map(|(position, (item, key))| {
                    let properties = if !previous.contains(key) {
                        Some(serialize_properties(handler, item, &all_properties))
                    } else {
                        updated
                            .get(key)
                            .map(|changed| serialize_properties(handler, item, changed))
                    };
                    ItemUpdate {
                        id: serde_json::to_value(key).unwrap_or(Value::Null),
                        position,
                        properties,
                    }
                })
                .collect();
            update.items = Some(items);
        }

        let offset = range_start as i64 - start_at_begin as i64;
        if offset != 0 {
            update.range_offset = Some(offset);
        }
        if settings_changed || data.prev_range_start != Some(range_start) {
            update.range_start = Some(range_start);
            data.prev_range_start = Some(range_start);
        }
        if data.prev_matching_count != Some(matching_count) {
            update.matching_items = Some(matching_count);
            data.prev_matching_count = Some(matching_count);
        }
        let total_count = data.all_items.len();
        if data.prev_total_count != Some(total_count) {
            update.total_items = Some(total_count);
            data.prev_total_count = Some(total_count);
        }
        data.prev_window = window_keys;

        if update.is_empty() {
            None
        } else {
            Some(update)
        }
    }

    fn insert_matching(
        &self,
        data: &mut ViewData<H::Item>,
        item: H::Item,
        (property, ascending): (PropertyId, bool),
        range_start: &mut usize,
    ) {
        // Upper bound keeps equal keys in arrival order.
        let pos = data.matching.partition_point(|x| {
            compare_items(&self.handler, x, &item, property, ascending) != Ordering::Greater
        });
        data.matching_keys.insert(item.key());
        data.matching.insert(pos, item);
        if pos <= *range_start {
            *range_start += 1;
        }
    }

    fn remove_matching(&self, data: &mut ViewData<H::Item>, key: &ItemKey<H>, range_start: &mut usize) {
        if let Some(pos) = data.remove_matching(key) {
            if pos < *range_start {
                *range_start -= 1;
            }
        }
    }

    fn apply_add(
        &self,
        data: &mut ViewData<H::Item>,
        item: H::Item,
        matchers: &[Arc<FilterMatcher>],
        sort: (PropertyId, bool),
        range_start: &mut usize,
    ) {
        if !data.insert(item.clone()) {
            tracing::debug!(
                target: targets::VIEW,
                view = %self.name,
                item = ?item.key(),
                "ignoring duplicate item"
            );
            return;
        }
        if matches_all(&self.handler, &item, matchers) {
            self.insert_matching(data, item, sort, range_start);
        }
    }

    fn apply_remove(&self, data: &mut ViewData<H::Item>, item: &H::Item, range_start: &mut usize) {
        let key = item.key();
        let Some(seq) = data.index.remove(&key) else {
            tracing::debug!(
                target: targets::VIEW,
                view = %self.name,
                item = ?key,
                "dropping removal of unknown item"
            );
            return;
        };
        data.all_items.remove(&seq);
        self.remove_matching(data, &key, range_start);
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_update(
        &self,
        data: &mut ViewData<H::Item>,
        item: H::Item,
        changed: PropertyIdSet,
        matchers: &[Arc<FilterMatcher>],
        sort: (PropertyId, bool),
        range_start: &mut usize,
        updated: &mut HashMap<ItemKey<H>, PropertyIdSet>,
    ) {
        let key = item.key();
        let Some(&seq) = data.index.get(&key) else {
            tracing::debug!(
                target: targets::VIEW,
                view = %self.name,
                item = ?key,
                "dropping update of unknown item"
            );
            return;
        };
        data.all_items.insert(seq, item.clone());

        let matches = matches_all(&self.handler, &item, matchers);
        let in_matching = data.matching_keys.contains(&key);
        match (in_matching, matches) {
            (true, false) => self.remove_matching(data, &key, range_start),
            (false, true) => self.insert_matching(data, item, sort, range_start),
            (true, true) => updated.entry(key).or_default().extend(changed),
            (false, false) => {}
        }
    }
}

impl<H: PropertyItemHandler> Drop for ListViewController<H> {
    fn drop(&mut self) {
        self.disconnect_source();
    }
}

impl<H: PropertyItemHandler> std::fmt::Debug for ListViewController<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListViewController")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("timer", &self.timer)
            .finish()
    }
}

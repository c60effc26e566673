//! Shared directories.
//!
//! A [`ShareRoot`] is a directory published to other users under a virtual
//! name, in one or more share profiles. Roots are refreshed (rescanned) in
//! the background; the refresh results update the root's size and content
//! counts.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

use horizon_relay_core::Signal;
use horizon_relay_core::logging::targets;
use parking_lot::RwLock;
use serde_json::{Value, json};

use crate::error::{Result, SourceError};
use crate::unix_time;
use crate::view::{
    ItemEvent, ItemSource, Property, PropertyId, PropertyIdSet, PropertyItemHandler, PropertyType,
    SortMethod, ViewItem, compare_text, to_property_set,
};

/// Identifier of a share root.
pub type RootToken = u32;

/// Identifier of a share profile.
pub type ProfileToken = u32;

/// Shared handle to a root.
pub type ShareRootPtr = Arc<ShareRoot>;

/// Scan state of a root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RefreshState {
    Normal,
    Pending,
    Running,
}

impl RefreshState {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Pending => "Refresh pending",
            Self::Running => "Refreshing",
        }
    }
}

#[derive(Debug, Clone)]
struct RootState {
    virtual_name: String,
    profiles: BTreeSet<ProfileToken>,
    incoming: bool,
    size: u64,
    files: u64,
    directories: u64,
    last_refresh_time: u64,
    refresh_state: RefreshState,
}

/// A shared directory.
#[derive(Debug)]
pub struct ShareRoot {
    token: RootToken,
    path: String,
    state: RwLock<RootState>,
}

impl ShareRoot {
    pub fn token(&self) -> RootToken {
        self.token
    }

    /// Real path on disk.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Name shown to other users.
    pub fn virtual_name(&self) -> String {
        self.state.read().virtual_name.clone()
    }

    pub fn profiles(&self) -> BTreeSet<ProfileToken> {
        self.state.read().profiles.clone()
    }

    /// Whether finished downloads may be moved here.
    pub fn incoming(&self) -> bool {
        self.state.read().incoming
    }

    pub fn size(&self) -> u64 {
        self.state.read().size
    }

    /// `(files, directories)` found by the last refresh.
    pub fn content(&self) -> (u64, u64) {
        let state = self.state.read();
        (state.files, state.directories)
    }

    pub fn last_refresh_time(&self) -> u64 {
        self.state.read().last_refresh_time
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.state.read().refresh_state
    }

    fn content_text(&self) -> String {
        let (files, directories) = self.content();
        format!("{directories} folders, {files} files")
    }

    fn profiles_text(&self) -> String {
        let profiles = self.profiles();
        profiles
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl ViewItem for ShareRootPtr {
    type Key = RootToken;

    fn key(&self) -> RootToken {
        self.token
    }
}

/// Editable fields of a root. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootUpdate {
    pub virtual_name: Option<String>,
    pub profiles: Option<BTreeSet<ProfileToken>>,
    pub incoming: Option<bool>,
}

impl RootUpdate {
    /// Whether no field is set.
    pub fn is_empty(&self) -> bool {
        self.virtual_name.is_none() && self.profiles.is_none() && self.incoming.is_none()
    }
}

/// Owner of the share roots.
#[derive(Debug)]
pub struct ShareManager {
    roots: RwLock<BTreeMap<RootToken, ShareRootPtr>>,
    next_token: AtomicU32,
    events: Signal<ItemEvent<ShareRootPtr>>,
}

impl Default for ShareManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ShareManager {
    pub fn new() -> Self {
        Self {
            roots: RwLock::new(BTreeMap::new()),
            next_token: AtomicU32::new(1),
            events: Signal::new(),
        }
    }

    /// Share a new directory.
    ///
    /// The path must be unique and the root must belong to at least one
    /// profile. The root starts out pending a refresh.
    pub fn add_root(&self, path: impl Into<String>, update: RootUpdate) -> Result<ShareRootPtr> {
        let path = path.into();
        if path.is_empty() {
            return Err(SourceError::invalid_field("path", "the path can't be empty"));
        }
        let virtual_name = match update.virtual_name {
            Some(name) => validate_virtual_name(name)?,
            None => default_virtual_name(&path),
        };
        let profiles = validate_profiles(update.profiles.unwrap_or_default())?;

        let root = {
            let mut roots = self.roots.write();
            if roots.values().any(|r| paths_overlap(&r.path, &path)) {
                return Err(SourceError::duplicate("path", path));
            }

            let root = Arc::new(ShareRoot {
                token: self.next_token.fetch_add(1, AtomicOrdering::Relaxed),
                path,
                state: RwLock::new(RootState {
                    virtual_name,
                    profiles,
                    incoming: update.incoming.unwrap_or(false),
                    size: 0,
                    files: 0,
                    directories: 0,
                    last_refresh_time: 0,
                    refresh_state: RefreshState::Pending,
                }),
            });
            roots.insert(root.token, root.clone());
            root
        };

        tracing::info!(target: targets::SOURCE, token = root.token, path = %root.path, "share root added");
        self.events.emit(ItemEvent::Added(root.clone()));
        Ok(root)
    }

    /// Change the editable fields of a root.
    ///
    /// Returns the properties that actually changed.
    pub fn update_root(&self, token: RootToken, update: RootUpdate) -> Result<PropertyIdSet> {
        let root = self.get(token)?;
        let virtual_name = update.virtual_name.map(validate_virtual_name).transpose()?;
        let profiles = update.profiles.map(validate_profiles).transpose()?;

        let mut changed = PropertyIdSet::new();
        {
            let mut state = root.state.write();
            if let Some(name) = virtual_name.filter(|n| *n != state.virtual_name) {
                state.virtual_name = name;
                changed.insert(PROP_VIRTUAL_NAME);
            }
            if let Some(profiles) = profiles.filter(|p| *p != state.profiles) {
                state.profiles = profiles;
                changed.insert(PROP_PROFILES);
            }
            if let Some(incoming) = update.incoming.filter(|i| *i != state.incoming) {
                state.incoming = incoming;
                changed.insert(PROP_INCOMING);
            }
        }

        if !changed.is_empty() {
            self.events
                .emit(ItemEvent::Updated(root.clone(), changed.clone()));
        }
        Ok(changed)
    }

    /// Stop sharing a directory.
    pub fn remove_root(&self, token: RootToken) -> Result<ShareRootPtr> {
        let root = self
            .roots
            .write()
            .remove(&token)
            .ok_or_else(|| SourceError::not_found("Share root", token))?;

        tracing::info!(target: targets::SOURCE, token, path = %root.path, "share root removed");
        self.events.emit(ItemEvent::Removed(root.clone()));
        Ok(root)
    }

    pub fn find_root(&self, token: RootToken) -> Option<ShareRootPtr> {
        self.roots.read().get(&token).cloned()
    }

    pub fn find_root_by_path(&self, path: &str) -> Option<ShareRootPtr> {
        self.roots.read().values().find(|r| r.path == path).cloned()
    }

    /// All roots ordered by token.
    pub fn roots(&self) -> Vec<ShareRootPtr> {
        self.roots.read().values().cloned().collect()
    }

    /// Mark a root as being rescanned.
    pub fn begin_refresh(&self, token: RootToken) -> Result<()> {
        let root = self.get(token)?;
        {
            let mut state = root.state.write();
            if state.refresh_state == RefreshState::Running {
                return Err(SourceError::InvalidState(format!(
                    "Share root {token} is already being refreshed"
                )));
            }
            state.refresh_state = RefreshState::Running;
        }

        self.events.emit(ItemEvent::Updated(
            root.clone(),
            to_property_set(&[PROP_REFRESH_STATE]),
        ));
        Ok(())
    }

    /// Store the results of a rescan.
    pub fn finish_refresh(&self, token: RootToken, size: u64, files: u64, directories: u64) -> Result<()> {
        let root = self.get(token)?;
        {
            let mut state = root.state.write();
            state.size = size;
            state.files = files;
            state.directories = directories;
            state.last_refresh_time = unix_time();
            state.refresh_state = RefreshState::Normal;
        }

        tracing::debug!(target: targets::SOURCE, token, size, files, directories, "share root refreshed");
        self.events.emit(ItemEvent::Updated(
            root.clone(),
            to_property_set(&[PROP_SIZE, PROP_TYPE, PROP_LAST_REFRESH_TIME, PROP_REFRESH_STATE]),
        ));
        Ok(())
    }

    fn get(&self, token: RootToken) -> Result<ShareRootPtr> {
        self.find_root(token)
            .ok_or_else(|| SourceError::not_found("Share root", token))
    }
}

impl ItemSource<ShareRootPtr> for ShareManager {
    fn list_all(&self) -> Vec<ShareRootPtr> {
        self.roots()
    }

    fn events(&self) -> &Signal<ItemEvent<ShareRootPtr>> {
        &self.events
    }
}

fn validate_virtual_name(name: String) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(SourceError::invalid_field(
            "virtual_name",
            "the virtual name can't be empty",
        ));
    }
    if trimmed.contains(['/', '\\']) {
        return Err(SourceError::invalid_field(
            "virtual_name",
            "the virtual name can't contain path separators",
        ));
    }
    Ok(trimmed.to_string())
}

fn validate_profiles(profiles: BTreeSet<ProfileToken>) -> Result<BTreeSet<ProfileToken>> {
    if profiles.is_empty() {
        return Err(SourceError::invalid_field(
            "profiles",
            "at least one share profile is required",
        ));
    }
    Ok(profiles)
}

fn default_virtual_name(path: &str) -> String {
    path.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .filter(|n| !n.is_empty())
        .unwrap_or(path)
        .to_string()
}

/// Whether one path contains the other, ignoring case and trailing separators.
fn paths_overlap(a: &str, b: &str) -> bool {
    let normalize = |p: &str| {
        let mut p = p.trim_end_matches(['/', '\\']).to_lowercase();
        p.push('/');
        p
    };
    let (a, b) = (normalize(a), normalize(b));
    a.starts_with(&b) || b.starts_with(&a)
}

pub const PROP_PATH: PropertyId = 0;
pub const PROP_VIRTUAL_NAME: PropertyId = 1;
pub const PROP_SIZE: PropertyId = 2;
pub const PROP_PROFILES: PropertyId = 3;
pub const PROP_INCOMING: PropertyId = 4;
pub const PROP_LAST_REFRESH_TIME: PropertyId = 5;
pub const PROP_REFRESH_STATE: PropertyId = 6;
pub const PROP_TYPE: PropertyId = 7;

/// Share root property table.
pub static ROOT_PROPERTIES: [Property; 8] = [
    Property::text(PROP_PATH, "path"),
    Property::text(PROP_VIRTUAL_NAME, "virtual_name"),
    Property::numeric(PROP_SIZE, "size", PropertyType::Size),
    Property::custom(PROP_PROFILES, "profiles", SortMethod::None),
    Property::boolean(PROP_INCOMING, "incoming"),
    Property::numeric(PROP_LAST_REFRESH_TIME, "last_refresh_time", PropertyType::Time),
    Property::custom(PROP_REFRESH_STATE, "refresh_state", SortMethod::Numeric),
    Property::custom(PROP_TYPE, "type", SortMethod::Custom),
];

/// Property access for share roots.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShareRootHandler;

impl PropertyItemHandler for ShareRootHandler {
    type Item = ShareRootPtr;

    fn properties(&self) -> &[Property] {
        &ROOT_PROPERTIES
    }

    fn number(&self, root: &ShareRootPtr, property: PropertyId) -> f64 {
        match property {
            PROP_SIZE => root.size() as f64,
            PROP_INCOMING => f64::from(u8::from(root.incoming())),
            PROP_LAST_REFRESH_TIME => root.last_refresh_time() as f64,
            PROP_REFRESH_STATE => f64::from(root.refresh_state().id()),
            _ => 0.0,
        }
    }

    fn text(&self, root: &ShareRootPtr, property: PropertyId) -> String {
        match property {
            PROP_PATH => root.path.clone(),
            PROP_VIRTUAL_NAME => root.virtual_name(),
            PROP_PROFILES => root.profiles_text(),
            PROP_REFRESH_STATE => root.refresh_state().as_str().to_string(),
            PROP_TYPE => root.content_text(),
            _ => self.number(root, property).to_string(),
        }
    }

    fn compare_custom(&self, a: &ShareRootPtr, b: &ShareRootPtr, property: PropertyId) -> Ordering {
        match property {
            PROP_TYPE => {
                let (a_files, a_dirs) = a.content();
                let (b_files, b_dirs) = b.content();
                a_dirs
                    .cmp(&b_dirs)
                    .then(a_files.cmp(&b_files))
                    .then_with(|| compare_text(&a.path, &b.path))
            }
            _ => Ordering::Equal,
        }
    }

    fn serialize_custom(&self, root: &ShareRootPtr, property: PropertyId) -> Value {
        match property {
            PROP_PROFILES => json!(root.profiles()),
            PROP_REFRESH_STATE => {
                let state = root.refresh_state();
                json!({ "id": state.id(), "str": state.as_str() })
            }
            PROP_TYPE => {
                let (files, directories) = root.content();
                json!({ "files": files, "directories": directories, "str": root.content_text() })
            }
            _ => Value::Null,
        }
    }
}

static_assertions::assert_impl_all!(ShareManager: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::record_events;
    use crate::view::{ListViewController, ViewConfig, serialize_item};
    use std::time::Duration;

    fn profiles(ids: &[ProfileToken]) -> Option<BTreeSet<ProfileToken>> {
        Some(ids.iter().copied().collect())
    }

    fn add(share: &ShareManager, path: &str) -> ShareRootPtr {
        share
            .add_root(
                path,
                RootUpdate {
                    profiles: profiles(&[1]),
                    ..Default::default()
                },
            )
            .unwrap()
    }

    #[test]
    fn test_add_root_defaults() {
        let share = ShareManager::new();
        let root = add(&share, "/srv/media/Music/");

        assert_eq!(root.virtual_name(), "Music");
        assert_eq!(root.refresh_state(), RefreshState::Pending);
        assert!(!root.incoming());
        assert_eq!(share.find_root_by_path("/srv/media/Music/").map(|r| r.token()), Some(root.token()));
    }

    #[test]
    fn test_overlapping_roots_rejected() {
        let share = ShareManager::new();
        add(&share, "/srv/media/");

        for path in ["/srv/media", "/SRV/Media/Music/"] {
            let err = share
                .add_root(path, RootUpdate { profiles: profiles(&[1]), ..Default::default() })
                .unwrap_err();
            assert!(matches!(err, SourceError::Duplicate { field: "path", .. }), "{path}");
        }
        assert!(
            share
                .add_root("/srv/mediafiles/", RootUpdate { profiles: profiles(&[1]), ..Default::default() })
                .is_ok()
        );
    }

    #[test]
    fn test_root_requires_profile() {
        let share = ShareManager::new();
        let err = share.add_root("/srv", RootUpdate::default()).unwrap_err();
        assert!(matches!(err, SourceError::InvalidField { field: "profiles", .. }));
    }

    #[test]
    fn test_update_reports_changed_fields_only() {
        let share = ShareManager::new();
        let root = add(&share, "/srv/a/");
        let events = record_events::<ShareRootPtr, _>(&share);

        let changed = share
            .update_root(
                root.token(),
                RootUpdate {
                    virtual_name: Some("a".into()),
                    incoming: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(changed, to_property_set(&[PROP_INCOMING]));

        let changed = share.update_root(root.token(), RootUpdate::default()).unwrap();
        assert!(changed.is_empty());
        assert_eq!(events.lock().len(), 1);
    }

    #[test]
    fn test_invalid_virtual_name() {
        let share = ShareManager::new();
        let root = add(&share, "/srv/a/");
        let err = share
            .update_root(
                root.token(),
                RootUpdate {
                    virtual_name: Some("a/b".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, SourceError::InvalidField { field: "virtual_name", .. }));
        assert_eq!(root.virtual_name(), "a");
    }

    #[test]
    fn test_refresh_cycle() {
        let share = ShareManager::new();
        let root = add(&share, "/srv/a/");

        share.begin_refresh(root.token()).unwrap();
        assert!(share.begin_refresh(root.token()).is_err());

        share.finish_refresh(root.token(), 4096, 10, 2).unwrap();
        assert_eq!(root.refresh_state(), RefreshState::Normal);
        assert_eq!(root.size(), 4096);
        assert!(root.last_refresh_time() > 0);

        let value = serialize_item(&ShareRootHandler, &root);
        assert_eq!(value["type"]["files"], 10);
        assert_eq!(value["type"]["str"], "2 folders, 10 files");
        assert_eq!(value["refresh_state"]["id"], 0);
        assert_eq!(value["profiles"], json!([1]));
        assert_eq!(value["incoming"], false);
    }

    #[test]
    fn test_remove_root() {
        let share = ShareManager::new();
        let root = add(&share, "/srv/a/");
        share.remove_root(root.token()).unwrap();
        assert!(share.roots().is_empty());
        assert!(matches!(
            share.remove_root(root.token()),
            Err(SourceError::NotFound { .. })
        ));
    }

    #[test]
    fn test_root_view_sorted_by_size() {
        let share = Arc::new(ShareManager::new());
        let a = add(&share, "/srv/a/");
        let b = add(&share, "/srv/b/");
        share.finish_refresh(a.token(), 500, 1, 1).unwrap();
        share.finish_refresh(b.token(), 100, 1, 1).unwrap();

        let view = ListViewController::new(
            ViewConfig::new("share_root_view").update_interval(Duration::from_secs(3600)),
            ShareRootHandler,
            share.clone(),
        );
        view.configure_json(&json!({ "sort_property": "size", "max_count": 10 }))
            .unwrap();
        let update = view.run_tasks().unwrap();
        assert_eq!(update.item_ids(), vec![json!(b.token()), json!(a.token())]);

        share.remove_root(b.token()).unwrap();
        let update = view.run_tasks().unwrap();
        assert_eq!(update.item_ids(), vec![json!(a.token())]);
        assert_eq!(update.total_items, Some(1));

        view.stop();
    }

    #[test]
    fn test_unsortable_profiles() {
        let view = ListViewController::new(
            ViewConfig::new("share_root_view"),
            ShareRootHandler,
            Arc::new(ShareManager::new()),
        );
        assert!(
            view.configure_json(&json!({ "sort_property": "profiles" }))
                .is_err()
        );
    }
}

//! Favorite hubs.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

use horizon_relay_core::Signal;
use horizon_relay_core::logging::targets;
use parking_lot::RwLock;
use serde_json::{Value, json};

use crate::error::{Result, SourceError};
use crate::view::{
    ItemEvent, ItemSource, Property, PropertyId, PropertyItemHandler, PropertyType,
    SerializeMethod, SortMethod, ViewItem, all_property_ids, to_property_set,
};

/// Identifier of a favorite hub.
pub type HubToken = u32;

/// Shared handle to a favorite hub.
pub type FavoriteHubEntryPtr = Arc<FavoriteHubEntry>;

/// Connection state of a favorite hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectState {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
        }
    }
}

#[derive(Debug, Clone)]
struct HubState {
    name: String,
    hub_url: String,
    hub_description: String,
    auto_connect: bool,
    share_profile: Option<u32>,
    connect_state: ConnectState,
    nick: String,
    password: String,
    user_description: String,
    ignore_private_messages: bool,
}

/// A saved hub with per-hub settings.
#[derive(Debug)]
pub struct FavoriteHubEntry {
    token: HubToken,
    state: RwLock<HubState>,
}

impl FavoriteHubEntry {
    pub fn token(&self) -> HubToken {
        self.token
    }

    pub fn name(&self) -> String {
        self.state.read().name.clone()
    }

    pub fn hub_url(&self) -> String {
        self.state.read().hub_url.clone()
    }

    pub fn hub_description(&self) -> String {
        self.state.read().hub_description.clone()
    }

    pub fn auto_connect(&self) -> bool {
        self.state.read().auto_connect
    }

    /// Share profile override; `None` uses the default profile.
    pub fn share_profile(&self) -> Option<u32> {
        self.state.read().share_profile
    }

    pub fn connect_state(&self) -> ConnectState {
        self.state.read().connect_state
    }

    /// Nick override; empty uses the global nick.
    pub fn nick(&self) -> String {
        self.state.read().nick.clone()
    }

    pub fn has_password(&self) -> bool {
        !self.state.read().password.is_empty()
    }

    pub fn user_description(&self) -> String {
        self.state.read().user_description.clone()
    }

    pub fn ignore_private_messages(&self) -> bool {
        self.state.read().ignore_private_messages
    }

    /// Whether the hub speaks ADC rather than NMDC.
    pub fn is_adc(&self) -> bool {
        is_adc_url(&self.state.read().hub_url)
    }
}

impl ViewItem for FavoriteHubEntryPtr {
    type Key = HubToken;

    fn key(&self) -> HubToken {
        self.token
    }
}

/// Editable fields of a favorite hub. `None` leaves a field untouched.
///
/// For `share_profile`, `Some(None)` resets to the default profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FavoriteHubUpdate {
    pub name: Option<String>,
    pub hub_url: Option<String>,
    pub hub_description: Option<String>,
    pub auto_connect: Option<bool>,
    pub share_profile: Option<Option<u32>>,
    pub nick: Option<String>,
    pub password: Option<String>,
    pub user_description: Option<String>,
    pub ignore_private_messages: Option<bool>,
}

/// Owner of the favorite hub list.
#[derive(Debug)]
pub struct FavoriteManager {
    hubs: RwLock<BTreeMap<HubToken, FavoriteHubEntryPtr>>,
    next_token: AtomicU32,
    events: Signal<ItemEvent<FavoriteHubEntryPtr>>,
}

impl Default for FavoriteManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FavoriteManager {
    pub fn new() -> Self {
        Self {
            hubs: RwLock::new(BTreeMap::new()),
            next_token: AtomicU32::new(1),
            events: Signal::new(),
        }
    }

    /// Save a new favorite hub. Name and address are required and the
    /// address must not be in the list yet.
    pub fn add_favorite_hub(&self, update: FavoriteHubUpdate) -> Result<FavoriteHubEntryPtr> {
        let name = update
            .name
            .clone()
            .ok_or_else(|| SourceError::invalid_field("name", "field is required"))?;
        let hub_url = update
            .hub_url
            .clone()
            .ok_or_else(|| SourceError::invalid_field("hub_url", "field is required"))?;

        let mut state = HubState {
            name,
            hub_url,
            hub_description: String::new(),
            auto_connect: false,
            share_profile: None,
            connect_state: ConnectState::Disconnected,
            nick: String::new(),
            password: String::new(),
            user_description: String::new(),
            ignore_private_messages: false,
        };
        apply_update(&mut state, update)?;

        let entry = {
            let mut hubs = self.hubs.write();
            if !is_unique(&hubs, &state.hub_url, None) {
                return Err(SourceError::duplicate("hub_url", state.hub_url));
            }

            let entry = Arc::new(FavoriteHubEntry {
                token: self.next_token.fetch_add(1, AtomicOrdering::Relaxed),
                state: RwLock::new(state),
            });
            hubs.insert(entry.token, entry.clone());
            entry
        };

        tracing::debug!(target: targets::SOURCE, token = entry.token, "favorite hub added");
        self.events.emit(ItemEvent::Added(entry.clone()));
        Ok(entry)
    }

    /// Change the settings of a favorite hub.
    ///
    /// Nothing is changed if any field is invalid. Every property is
    /// reported as changed.
    pub fn update_favorite_hub(&self, token: HubToken, update: FavoriteHubUpdate) -> Result<()> {
        let entry = {
            let hubs = self.hubs.read();
            let entry = hubs
                .get(&token)
                .cloned()
                .ok_or_else(|| SourceError::not_found("Hub", token))?;
            if let Some(url) = &update.hub_url
                && !is_unique(&hubs, url, Some(token))
            {
                return Err(SourceError::duplicate("hub_url", url.clone()));
            }

            {
                let mut state = entry.state.write();
                let mut updated = state.clone();
                apply_update(&mut updated, update)?;
                *state = updated;
            }
            entry
        };

        self.events.emit(ItemEvent::Updated(
            entry.clone(),
            all_property_ids(&FAVORITE_HUB_PROPERTIES),
        ));
        Ok(())
    }

    /// Delete a favorite hub.
    pub fn remove_favorite_hub(&self, token: HubToken) -> Result<FavoriteHubEntryPtr> {
        let entry = self
            .hubs
            .write()
            .remove(&token)
            .ok_or_else(|| SourceError::not_found("Hub", token))?;

        tracing::debug!(target: targets::SOURCE, token, "favorite hub removed");
        self.events.emit(ItemEvent::Removed(entry.clone()));
        Ok(entry)
    }

    /// Record a connection state change of a favorite hub.
    pub fn set_connect_state(&self, token: HubToken, connect_state: ConnectState) -> Result<()> {
        let entry = self.get(token)?;
        {
            let mut state = entry.state.write();
            if state.connect_state == connect_state {
                return Ok(());
            }
            state.connect_state = connect_state;
        }

        self.events.emit(ItemEvent::Updated(
            entry.clone(),
            to_property_set(&[PROP_CONNECT_STATE]),
        ));
        Ok(())
    }

    pub fn find(&self, token: HubToken) -> Option<FavoriteHubEntryPtr> {
        self.hubs.read().get(&token).cloned()
    }

    pub fn find_by_url(&self, hub_url: &str) -> Option<FavoriteHubEntryPtr> {
        self.hubs
            .read()
            .values()
            .find(|e| e.state.read().hub_url.eq_ignore_ascii_case(hub_url))
            .cloned()
    }

    /// All favorite hubs ordered by token.
    pub fn favorite_hubs(&self) -> Vec<FavoriteHubEntryPtr> {
        self.hubs.read().values().cloned().collect()
    }

    fn get(&self, token: HubToken) -> Result<FavoriteHubEntryPtr> {
        self.find(token)
            .ok_or_else(|| SourceError::not_found("Hub", token))
    }
}

impl ItemSource<FavoriteHubEntryPtr> for FavoriteManager {
    fn list_all(&self) -> Vec<FavoriteHubEntryPtr> {
        self.favorite_hubs()
    }

    fn events(&self) -> &Signal<ItemEvent<FavoriteHubEntryPtr>> {
        &self.events
    }
}

fn is_unique(hubs: &BTreeMap<HubToken, FavoriteHubEntryPtr>, url: &str, except: Option<HubToken>) -> bool {
    !hubs
        .values()
        .filter(|e| Some(e.token) != except)
        .any(|e| e.state.read().hub_url.eq_ignore_ascii_case(url))
}

fn is_adc_url(url: &str) -> bool {
    let url = url.to_ascii_lowercase();
    url.starts_with("adc://") || url.starts_with("adcs://")
}

fn apply_update(state: &mut HubState, update: FavoriteHubUpdate) -> Result<()> {
    if let Some(name) = update.name {
        if name.trim().is_empty() {
            return Err(SourceError::invalid_field("name", "the name can't be empty"));
        }
        state.name = name;
    }
    if let Some(url) = update.hub_url {
        if url.trim().is_empty() {
            return Err(SourceError::invalid_field("hub_url", "the address can't be empty"));
        }
        state.hub_url = url;
    }
    if let Some(profile) = update.share_profile {
        if profile.is_some() && !is_adc_url(&state.hub_url) {
            return Err(SourceError::invalid_field(
                "share_profile",
                "share profiles can't be changed for NMDC hubs",
            ));
        }
        state.share_profile = profile;
    }
    if let Some(description) = update.hub_description {
        state.hub_description = description;
    }
    if let Some(auto_connect) = update.auto_connect {
        state.auto_connect = auto_connect;
    }
    if let Some(nick) = update.nick {
        state.nick = nick;
    }
    if let Some(password) = update.password {
        state.password = password;
    }
    if let Some(description) = update.user_description {
        state.user_description = description;
    }
    if let Some(ignore) = update.ignore_private_messages {
        state.ignore_private_messages = ignore;
    }
    Ok(())
}

pub const PROP_NAME: PropertyId = 0;
pub const PROP_HUB_URL: PropertyId = 1;
pub const PROP_HUB_DESCRIPTION: PropertyId = 2;
pub const PROP_AUTO_CONNECT: PropertyId = 3;
pub const PROP_SHARE_PROFILE: PropertyId = 4;
pub const PROP_CONNECT_STATE: PropertyId = 5;
pub const PROP_NICK: PropertyId = 6;
pub const PROP_HAS_PASSWORD: PropertyId = 7;
pub const PROP_USER_DESCRIPTION: PropertyId = 8;
pub const PROP_IGNORE_PM: PropertyId = 9;

/// Favorite hub property table.
pub static FAVORITE_HUB_PROPERTIES: [Property; 10] = [
    Property::text(PROP_NAME, "name"),
    Property::text(PROP_HUB_URL, "hub_url"),
    Property::text(PROP_HUB_DESCRIPTION, "hub_description"),
    Property::boolean(PROP_AUTO_CONNECT, "auto_connect"),
    Property::new(PROP_SHARE_PROFILE, "share_profile", PropertyType::Text, SortMethod::Text, SerializeMethod::Custom),
    Property::new(PROP_CONNECT_STATE, "connect_state", PropertyType::Numeric, SortMethod::Numeric, SerializeMethod::Custom),
    Property::text(PROP_NICK, "nick"),
    Property::boolean(PROP_HAS_PASSWORD, "has_password"),
    Property::text(PROP_USER_DESCRIPTION, "user_description"),
    Property::boolean(PROP_IGNORE_PM, "ignore_private_messages"),
];

/// Property access for favorite hubs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FavoriteHubHandler;

impl PropertyItemHandler for FavoriteHubHandler {
    type Item = FavoriteHubEntryPtr;

    fn properties(&self) -> &[Property] {
        &FAVORITE_HUB_PROPERTIES
    }

    fn number(&self, entry: &FavoriteHubEntryPtr, property: PropertyId) -> f64 {
        let flag = |value: bool| f64::from(u8::from(value));
        match property {
            PROP_AUTO_CONNECT => flag(entry.auto_connect()),
            PROP_CONNECT_STATE => f64::from(entry.connect_state().id()),
            PROP_HAS_PASSWORD => flag(entry.has_password()),
            PROP_IGNORE_PM => flag(entry.ignore_private_messages()),
            _ => 0.0,
        }
    }

    fn text(&self, entry: &FavoriteHubEntryPtr, property: PropertyId) -> String {
        match property {
            PROP_NAME => entry.name(),
            PROP_HUB_URL => entry.hub_url(),
            PROP_HUB_DESCRIPTION => entry.hub_description(),
            PROP_SHARE_PROFILE => share_profile_text(entry),
            PROP_CONNECT_STATE => entry.connect_state().as_str().to_string(),
            PROP_NICK => entry.nick(),
            PROP_USER_DESCRIPTION => entry.user_description(),
            _ => self.number(entry, property).to_string(),
        }
    }

    fn serialize_custom(&self, entry: &FavoriteHubEntryPtr, property: PropertyId) -> Value {
        match property {
            PROP_SHARE_PROFILE => json!({
                "id": entry.share_profile(),
                "str": share_profile_text(entry),
            }),
            PROP_CONNECT_STATE => {
                let state = entry.connect_state();
                json!({ "id": state.id(), "str": state.as_str() })
            }
            _ => Value::Null,
        }
    }
}

fn share_profile_text(entry: &FavoriteHubEntry) -> String {
    match entry.share_profile() {
        Some(profile) => format!("Profile {profile}"),
        None => "Default".to_string(),
    }
}

static_assertions::assert_impl_all!(FavoriteManager: Send, Sync);

//! Search results.
//!
//! A [`SearchInstance`] collects the results of one search. Results for the
//! same content (same TTH) from different users are merged into one entry
//! whose hit count grows with every additional user.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

use horizon_relay_core::Signal;
use horizon_relay_core::logging::targets;
use parking_lot::RwLock;
use serde_json::{Value, json};

use crate::view::{
    ItemEvent, ItemSource, Property, PropertyId, PropertyItemHandler, PropertyType, SortMethod,
    ViewItem, compare_text, to_property_set,
};

/// Identifier of a search result within its instance.
pub type ResultToken = u32;

/// Shared handle to a search result.
pub type SearchResultPtr = Arc<SearchResult>;

/// A result as reported by a remote user.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingResult {
    pub tth: String,
    /// Full remote path; directories end with a separator.
    pub path: String,
    pub size: u64,
    pub is_directory: bool,
    pub user: String,
    pub hub_url: String,
    pub free_slots: u32,
    pub total_slots: u32,
    /// Upload speed of the user in bytes per second.
    pub connection: f64,
    /// Modification time as Unix seconds.
    pub date: u64,
}

#[derive(Debug, Clone)]
struct ResultSource {
    user: String,
    hub_url: String,
    free_slots: u32,
    total_slots: u32,
    connection: f64,
}

/// A merged search result.
#[derive(Debug)]
pub struct SearchResult {
    token: ResultToken,
    tth: String,
    name: String,
    path: String,
    size: u64,
    is_directory: bool,
    date: u64,
    match_relevance: f64,
    sources: RwLock<Vec<ResultSource>>,
}

impl SearchResult {
    pub fn token(&self) -> ResultToken {
        self.token
    }

    pub fn tth(&self) -> &str {
        &self.tth
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remote path of the containing directory.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    pub fn date(&self) -> u64 {
        self.date
    }

    /// Number of users sharing this result.
    pub fn hits(&self) -> usize {
        self.sources.read().len()
    }

    /// Nicks of the users sharing this result, in arrival order.
    pub fn users(&self) -> Vec<String> {
        self.sources.read().iter().map(|s| s.user.clone()).collect()
    }

    /// Hubs the result was received from.
    pub fn hub_urls(&self) -> Vec<String> {
        self.sources.read().iter().map(|s| s.hub_url.clone()).collect()
    }

    /// How well the name matches the search terms, from 0 to 1.
    pub fn match_relevance(&self) -> f64 {
        self.match_relevance
    }

    /// Match relevance weighted with the hit count.
    pub fn total_relevance(&self) -> f64 {
        self.hits() as f64 * 0.3 + self.match_relevance * 0.7
    }

    /// Best `(free, total)` slot counts among the users.
    pub fn slots(&self) -> (u32, u32) {
        self.sources
            .read()
            .iter()
            .map(|s| (s.free_slots, s.total_slots))
            .max()
            .unwrap_or((0, 0))
    }

    /// Fastest connection among the users.
    pub fn connection(&self) -> f64 {
        self.sources
            .read()
            .iter()
            .map(|s| s.connection)
            .fold(0.0, f64::max)
    }

    fn has_user(&self, user: &str, hub_url: &str) -> bool {
        self.sources
            .read()
            .iter()
            .any(|s| s.user == user && s.hub_url == hub_url)
    }

    fn type_text(&self) -> String {
        if self.is_directory {
            return "Directory".to_string();
        }
        match self.name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => ext.to_lowercase(),
            _ => "File".to_string(),
        }
    }

    fn users_text(&self) -> String {
        let sources = self.sources.read();
        match sources.as_slice() {
            [] => String::new(),
            [only] => only.user.clone(),
            [first, rest @ ..] => format!("{} users ({}, ...)", rest.len() + 1, first.user),
        }
    }
}

impl ViewItem for SearchResultPtr {
    type Key = ResultToken;

    fn key(&self) -> ResultToken {
        self.token
    }
}

/// Why an incoming result was not added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// The name matches none of the search terms.
    #[error("The result doesn't match the search terms")]
    NoMatch,
    /// The user already reported this result.
    #[error("The result has been received from this user already")]
    Duplicate,
}

#[derive(Debug, Default)]
struct InstanceState {
    terms: Vec<String>,
    results: BTreeMap<ResultToken, SearchResultPtr>,
    by_tth: HashMap<String, ResultToken>,
}

/// The results of one search.
#[derive(Debug)]
pub struct SearchInstance {
    state: RwLock<InstanceState>,
    next_token: AtomicU32,
    events: Signal<ItemEvent<SearchResultPtr>>,
}

impl Default for SearchInstance {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchInstance {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(InstanceState::default()),
            next_token: AtomicU32::new(1),
            events: Signal::new(),
        }
    }

    /// Start a new search, dropping the results of the previous one.
    pub fn start_search(&self, query: &str) {
        let removed = {
            let mut state = self.state.write();
            state.terms = query
                .split_whitespace()
                .map(str::to_lowercase)
                .collect();
            take_results(&mut state)
        };

        tracing::debug!(target: targets::SOURCE, query, dropped = removed.len(), "search started");
        self.emit_removed(removed);
    }

    /// Current search terms, lowercased.
    pub fn terms(&self) -> Vec<String> {
        self.state.read().terms.clone()
    }

    /// Add a result, merging it with an earlier result for the same content.
    pub fn add_result(&self, incoming: IncomingResult) -> Result<SearchResultPtr, Rejection> {
        let name = result_name(&incoming.path, incoming.is_directory);
        let source = ResultSource {
            user: incoming.user,
            hub_url: incoming.hub_url,
            free_slots: incoming.free_slots,
            total_slots: incoming.total_slots,
            connection: incoming.connection,
        };

        let (result, added) = {
            let mut state = self.state.write();
            let existing = state
                .by_tth
                .get(&incoming.tth)
                .and_then(|token| state.results.get(token))
                .cloned();

            match existing {
                Some(result) => {
                    if result.has_user(&source.user, &source.hub_url) {
                        return Err(Rejection::Duplicate);
                    }
                    result.sources.write().push(source);
                    (result, false)
                }
                None => {
                    let relevance = match_relevance(&state.terms, &name);
                    if relevance == 0.0 {
                        return Err(Rejection::NoMatch);
                    }

                    let result = Arc::new(SearchResult {
                        token: self.next_token.fetch_add(1, AtomicOrdering::Relaxed),
                        path: parent_path(&incoming.path, &name),
                        tth: incoming.tth,
                        name,
                        size: incoming.size,
                        is_directory: incoming.is_directory,
                        date: incoming.date,
                        match_relevance: relevance,
                        sources: RwLock::new(vec![source]),
                    });
                    state.by_tth.insert(result.tth.clone(), result.token);
                    state.results.insert(result.token, result.clone());
                    (result, true)
                }
            }
        };

        if added {
            self.events.emit(ItemEvent::Added(result.clone()));
        } else {
            self.events.emit(ItemEvent::Updated(
                result.clone(),
                to_property_set(&[PROP_HITS, PROP_USERS, PROP_RELEVANCE, PROP_SLOTS, PROP_CONNECTION]),
            ));
        }
        Ok(result)
    }

    /// Drop every result, keeping the search terms.
    pub fn clear(&self) -> usize {
        let removed = take_results(&mut self.state.write());
        let count = removed.len();
        self.emit_removed(removed);
        count
    }

    pub fn find(&self, token: ResultToken) -> Option<SearchResultPtr> {
        self.state.read().results.get(&token).cloned()
    }

    /// All results ordered by token.
    pub fn results(&self) -> Vec<SearchResultPtr> {
        self.state.read().results.values().cloned().collect()
    }

    pub fn result_count(&self) -> usize {
        self.state.read().results.len()
    }

    fn emit_removed(&self, removed: Vec<SearchResultPtr>) {
        for result in removed {
            self.events.emit(ItemEvent::Removed(result));
        }
    }
}

impl ItemSource<SearchResultPtr> for SearchInstance {
    fn list_all(&self) -> Vec<SearchResultPtr> {
        self.results()
    }

    fn events(&self) -> &Signal<ItemEvent<SearchResultPtr>> {
        &self.events
    }
}

fn take_results(state: &mut InstanceState) -> Vec<SearchResultPtr> {
    state.by_tth.clear();
    std::mem::take(&mut state.results).into_values().collect()
}

/// Share of the terms found in the name. Without terms everything matches.
fn match_relevance(terms: &[String], name: &str) -> f64 {
    if terms.is_empty() {
        return 1.0;
    }
    let name = name.to_lowercase();
    let matched = terms.iter().filter(|t| name.contains(t.as_str())).count();
    matched as f64 / terms.len() as f64
}

fn result_name(path: &str, is_directory: bool) -> String {
    let trimmed = if is_directory {
        path.trim_end_matches(['/', '\\'])
    } else {
        path
    };
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed)
        .to_string()
}

fn parent_path(path: &str, name: &str) -> String {
    match path.rfind(name) {
        Some(pos) if pos > 0 => path[..pos].to_string(),
        _ => String::new(),
    }
}

pub const PROP_NAME: PropertyId = 0;
pub const PROP_PATH: PropertyId = 1;
pub const PROP_SIZE: PropertyId = 2;
pub const PROP_TYPE: PropertyId = 3;
pub const PROP_RELEVANCE: PropertyId = 4;
pub const PROP_HITS: PropertyId = 5;
pub const PROP_USERS: PropertyId = 6;
pub const PROP_DATE: PropertyId = 7;
pub const PROP_SLOTS: PropertyId = 8;
pub const PROP_CONNECTION: PropertyId = 9;

/// Search result property table.
pub static RESULT_PROPERTIES: [Property; 10] = [
    Property::text(PROP_NAME, "name"),
    Property::text(PROP_PATH, "path"),
    Property::numeric(PROP_SIZE, "size", PropertyType::Size),
    Property::custom(PROP_TYPE, "type", SortMethod::Custom),
    Property::numeric(PROP_RELEVANCE, "relevance", PropertyType::Numeric),
    Property::numeric(PROP_HITS, "hits", PropertyType::Numeric),
    Property::custom(PROP_USERS, "users", SortMethod::Custom),
    Property::numeric(PROP_DATE, "date", PropertyType::Time),
    Property::custom(PROP_SLOTS, "slots", SortMethod::Custom),
    Property::numeric(PROP_CONNECTION, "connection", PropertyType::Speed),
];

/// Property access for search results.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchResultHandler;

impl PropertyItemHandler for SearchResultHandler {
    type Item = SearchResultPtr;

    fn properties(&self) -> &[Property] {
        &RESULT_PROPERTIES
    }

    fn number(&self, result: &SearchResultPtr, property: PropertyId) -> f64 {
        match property {
            PROP_SIZE => result.size as f64,
            PROP_RELEVANCE => result.total_relevance(),
            PROP_HITS => result.hits() as f64,
            PROP_DATE => result.date as f64,
            PROP_CONNECTION => result.connection(),
            _ => 0.0,
        }
    }

    fn text(&self, result: &SearchResultPtr, property: PropertyId) -> String {
        match property {
            PROP_NAME => result.name.clone(),
            PROP_PATH => result.path.clone(),
            PROP_TYPE => result.type_text(),
            PROP_USERS => result.users_text(),
            PROP_SLOTS => {
                let (free, total) = result.slots();
                format!("{free}/{total}")
            }
            _ => self.number(result, property).to_string(),
        }
    }

    fn compare_custom(&self, a: &SearchResultPtr, b: &SearchResultPtr, property: PropertyId) -> Ordering {
        match property {
            PROP_TYPE => b
                .is_directory
                .cmp(&a.is_directory)
                .then_with(|| compare_text(&a.type_text(), &b.type_text())),
            PROP_USERS => a
                .hits()
                .cmp(&b.hits())
                .then_with(|| compare_text(&a.users_text(), &b.users_text())),
            PROP_SLOTS => a.slots().cmp(&b.slots()),
            _ => Ordering::Equal,
        }
    }

    fn serialize_custom(&self, result: &SearchResultPtr, property: PropertyId) -> Value {
        match property {
            PROP_TYPE => json!({
                "id": if result.is_directory { "directory" } else { "file" },
                "str": result.type_text(),
            }),
            PROP_USERS => {
                let users = result.users();
                json!({
                    "count": users.len(),
                    "user": users.first(),
                    "str": result.users_text(),
                })
            }
            PROP_SLOTS => {
                let (free, total) = result.slots();
                json!({ "free": free, "total": total, "str": format!("{free}/{total}") })
            }
            _ => Value::Null,
        }
    }
}

static_assertions::assert_impl_all!(SearchInstance: Send, Sync);

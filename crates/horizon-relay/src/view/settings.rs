//! Client-controlled view settings.

use serde_json::Value;

use super::error::{Result, ViewError};
use super::property::{Property, PropertyId, find_property_by_name};

/// A validated `configure` request. Absent fields leave settings untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub range_start: Option<usize>,
    pub max_count: Option<usize>,
    pub sort_property: Option<PropertyId>,
    pub sort_ascending: Option<bool>,
    pub paused: Option<bool>,
}

impl SettingsUpdate {
    /// Parse and validate a request body.
    ///
    /// Any invalid field rejects the whole request.
    pub fn from_json(body: &Value, properties: &[Property]) -> Result<Self> {
        let mut update = Self::default();

        if let Some(value) = field(body, "range_start") {
            let start = value
                .as_i64()
                .ok_or_else(|| ViewError::invalid_value("range_start", "expected an integer"))?;
            if start < 0 {
                return Err(ViewError::NegativeRangeStart);
            }
            update.range_start = Some(start as usize);
        }

        if let Some(value) = field(body, "max_count") {
            let count = value
                .as_u64()
                .ok_or_else(|| ViewError::invalid_value("max_count", "expected a non-negative integer"))?;
            update.max_count = Some(count as usize);
        }

        if let Some(value) = field(body, "sort_property") {
            let name = value
                .as_str()
                .ok_or_else(|| ViewError::InvalidSortProperty(value.to_string()))?;
            let prop = find_property_by_name(name, properties)
                .filter(|p| p.is_sortable())
                .ok_or_else(|| ViewError::InvalidSortProperty(name.to_string()))?;
            update.sort_property = Some(prop.id);
        }

        if let Some(value) = field(body, "sort_ascending") {
            update.sort_ascending = Some(
                value
                    .as_bool()
                    .ok_or_else(|| ViewError::invalid_value("sort_ascending", "expected a boolean"))?,
            );
        }

        if let Some(value) = field(body, "paused") {
            update.paused = Some(
                value
                    .as_bool()
                    .ok_or_else(|| ViewError::invalid_value("paused", "expected a boolean"))?,
            );
        }

        Ok(update)
    }
}

fn field<'a>(body: &'a Value, name: &str) -> Option<&'a Value> {
    body.get(name).filter(|v| !v.is_null())
}

/// Current settings of a view, with change tracking.
///
/// A setting is marked changed only when its value actually differs. The
/// flush reads and clears the flag once per pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSettings {
    sort_property: Option<PropertyId>,
    sort_ascending: bool,
    range_start: usize,
    max_count: usize,
    paused: bool,
    changed: bool,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            sort_property: None,
            sort_ascending: true,
            range_start: 0,
            max_count: 0,
            paused: false,
            changed: false,
        }
    }
}

impl ViewSettings {
    /// Apply a validated update.
    pub fn apply(&mut self, update: &SettingsUpdate) {
        if let Some(v) = update.range_start {
            self.set_range_start(v);
        }
        if let Some(v) = update.max_count {
            self.changed |= self.max_count != v;
            self.max_count = v;
        }
        if let Some(v) = update.sort_property {
            self.changed |= self.sort_property != Some(v);
            self.sort_property = Some(v);
        }
        if let Some(v) = update.sort_ascending {
            self.changed |= self.sort_ascending != v;
            self.sort_ascending = v;
        }
        if let Some(v) = update.paused {
            self.paused = v;
        }
    }

    /// Set the range start as a client-visible change.
    pub fn set_range_start(&mut self, start: usize) {
        self.changed |= self.range_start != start;
        self.range_start = start;
    }

    /// Record a range start adjusted by the view itself.
    pub fn adjust_range_start(&mut self, start: usize) {
        self.range_start = start;
    }

    /// Return whether anything changed since the last call, and clear the flag.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    /// Whether something changed since the last [`take_changed`](Self::take_changed).
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn sort_property(&self) -> Option<PropertyId> {
        self.sort_property
    }

    pub fn sort_ascending(&self) -> bool {
        self.sort_ascending
    }

    pub fn range_start(&self) -> usize {
        self.range_start
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    pub fn paused(&self) -> bool {
        self.paused
    }
}

//! Push payloads of list views.

use serde::Serialize;
use serde_json::{Map, Value};

/// One row of the visible window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemUpdate {
    /// Item identity.
    pub id: Value,
    /// Index within the visible window.
    pub position: usize,
    /// Property values; absent when only the position is reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
}

/// A diff of a view since the previous push.
///
/// Absent fields mean "unchanged".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewUpdate {
    /// The complete visible window, in order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ItemUpdate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_start: Option<usize>,
    /// Shift of the range start caused by the view itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matching_items: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_items: Option<usize>,
}

impl ViewUpdate {
    /// Whether there is nothing to send.
    pub fn is_empty(&self) -> bool {
        self.items.is_none()
            && self.range_start.is_none()
            && self.range_offset.is_none()
            && self.matching_items.is_none()
            && self.total_items.is_none()
    }

    /// Ids of the reported window rows, in order.
    pub fn item_ids(&self) -> Vec<Value> {
        self.items
            .iter()
            .flatten()
            .map(|item| item.id.clone())
            .collect()
    }

    /// Serialize for the wire.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

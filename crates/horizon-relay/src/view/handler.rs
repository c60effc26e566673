//! Item identity and property access for list views.
//!
//! A view is generic over a [`PropertyItemHandler`], which knows the
//! property table of one item type and how to read, compare and serialize
//! each property of an item.

use std::cmp::Ordering;
use std::fmt::Debug;
use std::hash::Hash;

use serde::Serialize;
use serde_json::{Map, Value};

use super::filter::FilterMatcher;
use super::property::{Property, PropertyId, PropertyIdSet, SerializeMethod, SortMethod};

/// An item that can be shown in a list view.
///
/// Items are cheap handles (usually `Arc`s) to state owned by an item
/// source. The view clones handles, never the underlying state.
pub trait ViewItem: Clone + Send + Sync + 'static {
    /// Stable identity of the item.
    type Key: Clone + Eq + Hash + Ord + Debug + Send + Sync + Serialize + 'static;

    /// The item's identity.
    fn key(&self) -> Self::Key;
}

/// Property access for one item type.
pub trait PropertyItemHandler: Send + Sync + 'static {
    /// The item type.
    type Item: ViewItem;

    /// The property table. A property's id is its index in this slice.
    fn properties(&self) -> &[Property];

    /// Numeric value of a property.
    ///
    /// Called for properties that sort or serialize numerically.
    fn number(&self, item: &Self::Item, property: PropertyId) -> f64;

    /// Text value of a property.
    ///
    /// Called for text properties and for text filtering of any property.
    fn text(&self, item: &Self::Item, property: PropertyId) -> String;

    /// Ordering for properties with [`SortMethod::Custom`].
    fn compare_custom(&self, _a: &Self::Item, _b: &Self::Item, _property: PropertyId) -> Ordering {
        Ordering::Equal
    }

    /// Filter matching for properties with [`SerializeMethod::Custom`].
    fn matches_custom(&self, item: &Self::Item, property: PropertyId, matcher: &FilterMatcher) -> bool {
        matcher.matches_text(&self.text(item, property))
    }

    /// Wire value for properties with [`SerializeMethod::Custom`].
    fn serialize_custom(&self, _item: &Self::Item, _property: PropertyId) -> Value {
        Value::Null
    }
}

/// Compare two items by a property.
///
/// Text is compared case-insensitively. Incomparable numbers (NaN) are
/// treated as equal so the sort stays total.
pub fn compare_items<H: PropertyItemHandler>(
    handler: &H,
    a: &H::Item,
    b: &H::Item,
    property: PropertyId,
    ascending: bool,
) -> Ordering {
    let Some(prop) = handler.properties().get(property) else {
        return Ordering::Equal;
    };

    let cmp = match prop.sort_method {
        SortMethod::None => Ordering::Equal,
        SortMethod::Numeric => handler
            .number(a, property)
            .partial_cmp(&handler.number(b, property))
            .unwrap_or(Ordering::Equal),
        SortMethod::Text => compare_text(&handler.text(a, property), &handler.text(b, property)),
        SortMethod::Custom => handler.compare_custom(a, b, property),
    };

    if ascending { cmp } else { cmp.reverse() }
}

/// Case-insensitive lexical comparison.
pub fn compare_text(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

/// Serialize the given properties of an item into a JSON object keyed by
/// property name. Unknown ids are skipped.
pub fn serialize_properties<H: PropertyItemHandler>(
    handler: &H,
    item: &H::Item,
    properties: &PropertyIdSet,
) -> Map<String, Value> {
    let table = handler.properties();
    let mut map = Map::new();
    for &id in properties {
        if let Some(prop) = table.get(id) {
            map.insert(prop.name.to_string(), serialize_property(handler, item, prop));
        }
    }
    map
}

/// Serialize an item with every property plus its `id`.
pub fn serialize_item<H: PropertyItemHandler>(handler: &H, item: &H::Item) -> Value {
    let mut map = Map::new();
    map.insert("id".to_string(), serde_json::to_value(item.key()).unwrap_or(Value::Null));
    for prop in handler.properties() {
        map.insert(prop.name.to_string(), serialize_property(handler, item, prop));
    }
    Value::Object(map)
}

fn serialize_property<H: PropertyItemHandler>(handler: &H, item: &H::Item, prop: &Property) -> Value {
    match prop.serialize_method {
        SerializeMethod::Text => Value::String(handler.text(item, prop.id)),
        SerializeMethod::Numeric => number_value(handler.number(item, prop.id)),
        SerializeMethod::Bool => Value::Bool(handler.number(item, prop.id) != 0.0),
        SerializeMethod::Custom => handler.serialize_custom(item, prop.id),
    }
}

/// Whole numbers are written as integers.
pub fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::view::property::to_property_set;

    #[test]
    fn test_compare_numeric() {
        let handler = EntryHandler;
        let a = entry(1, "a", 10.0);
        let b = entry(2, "b", 20.0);
        assert_eq!(compare_items(&handler, &a, &b, PROP_SIZE, true), Ordering::Less);
        assert_eq!(compare_items(&handler, &a, &b, PROP_SIZE, false), Ordering::Greater);
    }

    #[test]
    fn test_compare_text_ignores_case() {
        let handler = EntryHandler;
        let a = entry(1, "alpha", 0.0);
        let b = entry(2, "Beta", 0.0);
        assert_eq!(compare_items(&handler, &a, &b, PROP_NAME, true), Ordering::Less);
        assert_eq!(compare_text("ABC", "abc"), Ordering::Equal);
    }

    #[test]
    fn test_compare_nan_is_equal() {
        let handler = EntryHandler;
        let a = entry(1, "a", f64::NAN);
        let b = entry(2, "b", 1.0);
        assert_eq!(compare_items(&handler, &a, &b, PROP_SIZE, true), Ordering::Equal);
    }

    #[test]
    fn test_compare_custom() {
        let handler = EntryHandler;
        let a = entry(1, "a", 0.0);
        let b = entry(2, "b", 0.0);
        *a.tag.write() = 5;
        assert_eq!(compare_items(&handler, &a, &b, PROP_TAG, true), Ordering::Greater);
    }

    #[test]
    fn test_serialize_item() {
        let handler = EntryHandler;
        let item = entry(7, "seven", 1024.0);
        let value = serialize_item(&handler, &item);
        assert_eq!(value["id"], 7);
        assert_eq!(value["name"], "seven");
        assert_eq!(value["size"], 1024);
        assert_eq!(value["tag"]["str"], "tag0");
    }

    #[test]
    fn test_serialize_selected_properties() {
        let handler = EntryHandler;
        let item = entry(7, "seven", 1.5);
        let map = serialize_properties(&handler, &item, &to_property_set(&[PROP_SIZE, 99]));
        assert_eq!(map.len(), 1);
        assert_eq!(map["size"], 1.5);
    }
}

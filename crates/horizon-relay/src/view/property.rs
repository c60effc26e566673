//! Property descriptors for list views.
//!
//! Every view type declares a fixed table of [`Property`] values. The
//! position of a property in the table is its [`PropertyId`], so handlers
//! usually declare their ids as constants next to the table.

use std::collections::BTreeSet;

/// Index of a property in a handler's property table.
pub type PropertyId = usize;

/// A set of property ids, ordered so serialized output is deterministic.
pub type PropertyIdSet = BTreeSet<PropertyId>;

/// The kind of value a property holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    /// Free text.
    Text,
    /// Plain number.
    Numeric,
    /// Byte count.
    Size,
    /// Unix timestamp in seconds.
    Time,
    /// Bytes per second.
    Speed,
    /// True or false, stored as a number.
    Bool,
    /// Structured value rendered by the handler.
    Custom,
}

impl PropertyType {
    /// Whether values of this type are numbers.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Numeric | Self::Size | Self::Time | Self::Speed | Self::Bool
        )
    }
}

/// How items are ordered by a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortMethod {
    /// The property can't be sorted by.
    None,
    /// Compare the numeric values.
    Numeric,
    /// Compare the text values, ignoring case.
    Text,
    /// Let the handler compare.
    Custom,
}

/// How a property value is written to the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializeMethod {
    /// As a JSON string.
    Text,
    /// As a JSON number.
    Numeric,
    /// As a JSON boolean.
    Bool,
    /// As whatever the handler returns.
    Custom,
}

/// Static description of one property of a view item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Property {
    /// Position in the property table.
    pub id: PropertyId,
    /// Name used in requests and payloads.
    pub name: &'static str,
    /// Value kind.
    pub property_type: PropertyType,
    /// Sort strategy.
    pub sort_method: SortMethod,
    /// Wire representation.
    pub serialize_method: SerializeMethod,
}

impl Property {
    /// Describe a property.
    pub const fn new(
        id: PropertyId,
        name: &'static str,
        property_type: PropertyType,
        sort_method: SortMethod,
        serialize_method: SerializeMethod,
    ) -> Self {
        Self {
            id,
            name,
            property_type,
            sort_method,
            serialize_method,
        }
    }

    /// A text property that sorts lexically.
    pub const fn text(id: PropertyId, name: &'static str) -> Self {
        Self::new(
            id,
            name,
            PropertyType::Text,
            SortMethod::Text,
            SerializeMethod::Text,
        )
    }

    /// A numeric property of the given type that sorts numerically.
    pub const fn numeric(id: PropertyId, name: &'static str, property_type: PropertyType) -> Self {
        Self::new(
            id,
            name,
            property_type,
            SortMethod::Numeric,
            SerializeMethod::Numeric,
        )
    }

    /// A boolean property, sorted as 0/1.
    pub const fn boolean(id: PropertyId, name: &'static str) -> Self {
        Self::new(
            id,
            name,
            PropertyType::Bool,
            SortMethod::Numeric,
            SerializeMethod::Bool,
        )
    }

    /// A property whose value and ordering come from the handler.
    pub const fn custom(id: PropertyId, name: &'static str, sort_method: SortMethod) -> Self {
        Self::new(
            id,
            name,
            PropertyType::Custom,
            sort_method,
            SerializeMethod::Custom,
        )
    }

    /// Whether the property can be used as a sort key.
    pub fn is_sortable(&self) -> bool {
        self.sort_method != SortMethod::None
    }
}

/// Look a property up by its wire name.
pub fn find_property_by_name<'a>(name: &str, properties: &'a [Property]) -> Option<&'a Property> {
    properties.iter().find(|p| p.name == name)
}

/// Ids of every property in the table.
pub fn all_property_ids(properties: &[Property]) -> PropertyIdSet {
    properties.iter().map(|p| p.id).collect()
}

/// Build a property id set from a list of ids.
pub fn to_property_set(ids: &[PropertyId]) -> PropertyIdSet {
    ids.iter().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROPS: [Property; 3] = [
        Property::text(0, "name"),
        Property::numeric(1, "size", PropertyType::Size),
        Property::new(
            2,
            "tag",
            PropertyType::Text,
            SortMethod::None,
            SerializeMethod::Text,
        ),
    ];

    #[test]
    fn test_find_property_by_name() {
        assert_eq!(find_property_by_name("size", &PROPS).map(|p| p.id), Some(1));
        assert!(find_property_by_name("missing", &PROPS).is_none());
    }

    #[test]
    fn test_all_property_ids() {
        assert_eq!(all_property_ids(&PROPS), to_property_set(&[0, 1, 2]));
    }

    #[test]
    fn test_sortable() {
        assert!(PROPS[0].is_sortable());
        assert!(!PROPS[2].is_sortable());
        assert!(PROPS[1].property_type.is_numeric());
    }
}

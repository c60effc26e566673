//! Property filters for list views.
//!
//! A view holds a [`FilterList`]. An item is visible iff it passes every
//! non-empty filter in the list. Each filter targets one property, or any
//! text property, and is compiled into a [`FilterMatcher`] when it is set.
//!
//! Patterns for numeric properties may carry a comparison operator and a
//! size unit, e.g. `">=15"` or `"< 2 MiB"`. A JSON number pattern means
//! equality.

use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use serde_json::Value;

use super::error::{Result, ViewError};
use super::handler::PropertyItemHandler;
use super::property::{Property, PropertyId, SerializeMethod, SortMethod, find_property_by_name};

/// Identifier of a filter within one view.
pub type FilterId = u32;

/// Property name that matches against every text property.
pub const ANY_PROPERTY: &str = "any";

/// How a text pattern is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMethod {
    /// Case-insensitive substring.
    Partial = 0,
    /// Case-insensitive equality.
    Exact = 1,
    /// Regular expression, case-insensitive.
    Regex = 2,
    /// `*` and `?` wildcards over the whole value, case-insensitive.
    Wildcard = 3,
}

impl FilterMethod {
    /// Map a wire id to a method.
    pub fn from_id(id: u64) -> Option<Self> {
        match id {
            0 => Some(Self::Partial),
            1 => Some(Self::Exact),
            2 => Some(Self::Regex),
            3 => Some(Self::Wildcard),
            _ => None,
        }
    }

    /// Map a method name to a method.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "partial" => Some(Self::Partial),
            "exact" => Some(Self::Exact),
            "regex" => Some(Self::Regex),
            "wildcard" => Some(Self::Wildcard),
            _ => None,
        }
    }

    /// Parse a method given either as a number or as a name.
    pub fn from_json(value: &Value) -> Result<Self> {
        let method = match value {
            Value::Number(n) => n.as_u64().and_then(Self::from_id),
            Value::String(s) => Self::from_name(s),
            _ => None,
        };
        method.ok_or_else(|| ViewError::InvalidFilterMethod(value.to_string()))
    }
}

/// A filter pattern as received from the client.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterPattern {
    /// A string pattern.
    Text(String),
    /// A JSON number pattern.
    Number(f64),
}

impl FilterPattern {
    /// Read a pattern, keeping whether the client sent a string or a number.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(Self::Text(s.clone())),
            Value::Number(n) => n
                .as_f64()
                .map(Self::Number)
                .ok_or_else(|| ViewError::invalid_value("pattern", "number out of range")),
            Value::Null => Ok(Self::Text(String::new())),
            _ => Err(ViewError::invalid_value(
                "pattern",
                "expected a string or a number",
            )),
        }
    }

    /// Empty patterns make a filter inert.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Text(s) if s.is_empty())
    }

    /// The pattern as text.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
        }
    }
}

/// Comparison operator of a numeric pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericComparison {
    Less,
    LessOrEqual,
    Equal,
    GreaterOrEqual,
    Greater,
    NotEqual,
}

impl NumericComparison {
    fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Less => lhs < rhs,
            Self::LessOrEqual => lhs <= rhs,
            Self::Equal => lhs == rhs,
            Self::GreaterOrEqual => lhs >= rhs,
            Self::Greater => lhs > rhs,
            Self::NotEqual => lhs != rhs,
        }
    }
}

/// A compiled numeric pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericMatcher {
    pub comparison: NumericComparison,
    pub value: f64,
}

// Longest operators first so "<=" isn't read as "<".
const OPERATORS: [(&str, NumericComparison); 7] = [
    ("<=", NumericComparison::LessOrEqual),
    (">=", NumericComparison::GreaterOrEqual),
    ("!=", NumericComparison::NotEqual),
    ("==", NumericComparison::Equal),
    ("<", NumericComparison::Less),
    (">", NumericComparison::Greater),
    ("=", NumericComparison::Equal),
];

impl NumericMatcher {
    /// Parse `[op] number [unit]`. Returns `None` if the text isn't numeric.
    pub fn parse(pattern: &str) -> Option<Self> {
        let mut rest = pattern.trim();
        let mut comparison = NumericComparison::Equal;
        for (op, cmp) in OPERATORS {
            if let Some(stripped) = rest.strip_prefix(op) {
                comparison = cmp;
                rest = stripped.trim_start();
                break;
            }
        }

        let split = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
            .unwrap_or(rest.len());
        let (number, unit) = rest.split_at(split);
        let number: f64 = number.parse().ok()?;
        let multiplier = unit_multiplier(unit.trim())?;

        Some(Self {
            comparison,
            value: number * multiplier,
        })
    }

    /// Whether `value` satisfies the pattern.
    pub fn matches(&self, value: f64) -> bool {
        self.comparison.apply(value, self.value)
    }
}

fn unit_multiplier(unit: &str) -> Option<f64> {
    let exponent = match unit.to_ascii_lowercase().as_str() {
        "" | "b" => 0,
        "k" | "kb" | "kib" => 1,
        "m" | "mb" | "mib" => 2,
        "g" | "gb" | "gib" => 3,
        "t" | "tb" | "tib" => 4,
        _ => return None,
    };
    Some(1024f64.powi(exponent))
}

#[derive(Debug, Clone)]
enum TextMatcher {
    Partial(String),
    Exact(String),
    Regex(Regex),
}

/// The property a filter looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterTarget {
    /// Every text property; one match is enough.
    Any,
    /// A single property.
    Property(PropertyId),
}

/// A compiled filter.
#[derive(Debug, Clone)]
pub struct FilterMatcher {
    target: FilterTarget,
    method: FilterMethod,
    pattern: FilterPattern,
    text: TextMatcher,
    numeric: Option<NumericMatcher>,
}

impl FilterMatcher {
    /// Compile a pattern.
    pub fn new(target: FilterTarget, method: FilterMethod, pattern: FilterPattern) -> Result<Self> {
        let text_pattern = pattern.as_text();
        let text = match method {
            FilterMethod::Partial => TextMatcher::Partial(text_pattern.to_lowercase()),
            FilterMethod::Exact => TextMatcher::Exact(text_pattern.to_lowercase()),
            FilterMethod::Regex => TextMatcher::Regex(compile_regex(&text_pattern, &text_pattern)?),
            FilterMethod::Wildcard => {
                TextMatcher::Regex(compile_regex(&wildcard_to_regex(&text_pattern), &text_pattern)?)
            }
        };

        let numeric = match &pattern {
            FilterPattern::Number(n) => Some(NumericMatcher {
                comparison: NumericComparison::Equal,
                value: *n,
            }),
            FilterPattern::Text(s) => NumericMatcher::parse(s),
        };

        Ok(Self {
            target,
            method,
            pattern,
            text,
            numeric,
        })
    }

    /// Compile a filter from a request body `{property, method, pattern}`.
    ///
    /// Returns `Ok(None)` for an empty pattern.
    pub fn from_json(body: &Value, properties: &[Property]) -> Result<Option<Self>> {
        let property = body
            .get("property")
            .and_then(Value::as_str)
            .ok_or_else(|| ViewError::invalid_value("property", "field is missing"))?;
        let target = if property == ANY_PROPERTY {
            FilterTarget::Any
        } else {
            let prop = find_property_by_name(property, properties)
                .ok_or_else(|| ViewError::InvalidProperty(property.to_string()))?;
            FilterTarget::Property(prop.id)
        };

        let method = match body.get("method") {
            Some(value) => FilterMethod::from_json(value)?,
            None => FilterMethod::Partial,
        };
        let pattern = FilterPattern::from_json(body.get("pattern").unwrap_or(&Value::Null))?;
        if pattern.is_empty() {
            return Ok(None);
        }

        Self::new(target, method, pattern).map(Some)
    }

    /// The filtered property.
    pub fn target(&self) -> FilterTarget {
        self.target
    }

    /// The match method.
    pub fn method(&self) -> FilterMethod {
        self.method
    }

    /// The pattern as received.
    pub fn pattern(&self) -> &FilterPattern {
        &self.pattern
    }

    /// Match a text value.
    pub fn matches_text(&self, value: &str) -> bool {
        match &self.text {
            TextMatcher::Partial(p) => value.to_lowercase().contains(p.as_str()),
            TextMatcher::Exact(p) => value.to_lowercase() == *p,
            TextMatcher::Regex(re) => re.is_match(value),
        }
    }

    /// Match a numeric value. `None` if the pattern isn't numeric.
    pub fn matches_number(&self, value: f64) -> Option<bool> {
        self.numeric.map(|n| n.matches(value))
    }

    /// Match an item.
    pub fn matches<H: PropertyItemHandler>(&self, handler: &H, item: &H::Item) -> bool {
        let properties = handler.properties();
        match self.target {
            FilterTarget::Any => properties
                .iter()
                .filter(|p| p.sort_method == SortMethod::Text)
                .any(|p| self.matches_text(&handler.text(item, p.id))),
            FilterTarget::Property(id) => {
                let Some(prop) = properties.get(id) else {
                    return false;
                };
                if prop.serialize_method == SerializeMethod::Custom {
                    return handler.matches_custom(item, id, self);
                }
                if prop.property_type.is_numeric() {
                    if let Some(result) = self.matches_number(handler.number(item, id)) {
                        return result;
                    }
                }
                self.matches_text(&handler.text(item, id))
            }
        }
    }
}

fn compile_regex(source: &str, pattern: &str) -> Result<Regex> {
    RegexBuilder::new(source)
        .case_insensitive(true)
        .build()
        .map_err(|e| ViewError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

fn wildcard_to_regex(pattern: &str) -> String {
    let mut re = String::with_capacity(pattern.len() + 2);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            _ => re.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');
    re
}

/// Whether an item passes every matcher.
pub fn matches_all<H: PropertyItemHandler>(
    handler: &H,
    item: &H::Item,
    matchers: &[Arc<FilterMatcher>],
) -> bool {
    matchers.iter().all(|m| m.matches(handler, item))
}

/// One entry of a view's filter list.
#[derive(Debug, Clone)]
pub struct PropertyFilter {
    id: FilterId,
    matcher: Option<Arc<FilterMatcher>>,
}

impl PropertyFilter {
    /// The filter's id.
    pub fn id(&self) -> FilterId {
        self.id
    }

    /// A filter without a pattern matches everything.
    pub fn is_empty(&self) -> bool {
        self.matcher.is_none()
    }

    /// The compiled matcher, if any.
    pub fn matcher(&self) -> Option<&Arc<FilterMatcher>> {
        self.matcher.as_ref()
    }
}

/// The filters of one view.
#[derive(Debug)]
pub struct FilterList {
    next_id: FilterId,
    filters: Vec<PropertyFilter>,
}

impl Default for FilterList {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterList {
    /// An empty list.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            filters: Vec::new(),
        }
    }

    /// Add an empty filter and return its id.
    pub fn add(&mut self) -> FilterId {
        let id = self.next_id;
        self.next_id += 1;
        self.filters.push(PropertyFilter { id, matcher: None });
        id
    }

    /// Replace the matcher of a filter.
    pub fn set(&mut self, id: FilterId, matcher: Option<FilterMatcher>) -> Result<()> {
        let filter = self
            .filters
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or(ViewError::FilterNotFound(id))?;
        filter.matcher = matcher.map(Arc::new);
        Ok(())
    }

    /// Remove a filter.
    pub fn remove(&mut self, id: FilterId) -> Result<()> {
        let pos = self
            .filters
            .iter()
            .position(|f| f.id == id)
            .ok_or(ViewError::FilterNotFound(id))?;
        self.filters.remove(pos);
        Ok(())
    }

    /// Remove every filter.
    pub fn clear(&mut self) {
        self.filters.clear();
    }

    /// Whether a filter with this id exists.
    pub fn contains(&self, id: FilterId) -> bool {
        self.filters.iter().any(|f| f.id == id)
    }

    /// Number of filters, empty ones included.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether the list has no filters.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Iterate over the filters.
    pub fn iter(&self) -> impl Iterator<Item = &PropertyFilter> {
        self.filters.iter()
    }

    /// Matchers of all non-empty filters.
    pub fn matchers(&self) -> Vec<Arc<FilterMatcher>> {
        self.filters.iter().filter_map(|f| f.matcher.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::handler::test_support::*;
    use serde_json::json;

    fn matcher(property: &str, method: u64, pattern: Value) -> FilterMatcher {
        FilterMatcher::from_json(
            &json!({ "property": property, "method": method, "pattern": pattern }),
            &PROPERTIES,
        )
        .unwrap()
        .unwrap()
    }

    #[test]
    fn test_numeric_pattern_parsing() {
        assert_eq!(
            NumericMatcher::parse(">=15"),
            Some(NumericMatcher {
                comparison: NumericComparison::GreaterOrEqual,
                value: 15.0
            })
        );
        assert_eq!(
            NumericMatcher::parse("< 2 MiB").map(|m| m.value),
            Some(2.0 * 1024.0 * 1024.0)
        );
        assert_eq!(
            NumericMatcher::parse("42").map(|m| m.comparison),
            Some(NumericComparison::Equal)
        );
        assert!(NumericMatcher::parse("abc").is_none());
        assert!(NumericMatcher::parse("10 parsecs").is_none());
    }

    #[test]
    fn test_numeric_filter() {
        let handler = EntryHandler;
        let m = matcher("size", 0, json!(">=15"));
        assert!(!m.matches(&handler, &entry(1, "a", 10.0)));
        assert!(m.matches(&handler, &entry(2, "b", 15.0)));
        assert!(m.matches(&handler, &entry(3, "c", 30.0)));
    }

    #[test]
    fn test_json_number_pattern_is_equality() {
        let handler = EntryHandler;
        let m = matcher("size", 0, json!(20));
        assert!(m.matches(&handler, &entry(1, "a", 20.0)));
        assert!(!m.matches(&handler, &entry(2, "b", 21.0)));
    }

    #[test]
    fn test_text_methods() {
        let handler = EntryHandler;
        let item = entry(1, "Ubuntu-24.04.iso", 0.0);

        assert!(matcher("name", 0, json!("ubuntu")).matches(&handler, &item));
        assert!(!matcher("name", 1, json!("ubuntu")).matches(&handler, &item));
        assert!(matcher("name", 1, json!("UBUNTU-24.04.ISO")).matches(&handler, &item));
        assert!(matcher("name", 2, json!(r"^ubuntu-\d+")).matches(&handler, &item));
        assert!(matcher("name", 3, json!("*.iso")).matches(&handler, &item));
        assert!(!matcher("name", 3, json!("*.img")).matches(&handler, &item));
        assert!(matcher("name", 3, json!("ubuntu-??.04.iso")).matches(&handler, &item));
    }

    #[test]
    fn test_any_property() {
        let handler = EntryHandler;
        let m = matcher("any", 0, json!("needle"));
        assert!(m.matches(&handler, &entry(1, "haystack needle", 0.0)));
        assert!(!m.matches(&handler, &entry(2, "haystack", 0.0)));
    }

    #[test]
    fn test_custom_property_uses_handler() {
        let handler = EntryHandler;
        let item = entry(1, "a", 0.0);
        *item.tag.write() = 3;
        assert!(matcher("tag", 1, json!("tag3")).matches(&handler, &item));
    }

    #[test]
    fn test_invalid_requests() {
        let err = FilterMatcher::from_json(
            &json!({ "property": "nope", "method": 0, "pattern": "x" }),
            &PROPERTIES,
        )
        .unwrap_err();
        assert_eq!(err, ViewError::InvalidProperty("nope".to_string()));

        let err = FilterMatcher::from_json(
            &json!({ "property": "name", "method": 9, "pattern": "x" }),
            &PROPERTIES,
        )
        .unwrap_err();
        assert!(matches!(err, ViewError::InvalidFilterMethod(_)));

        let err = FilterMatcher::from_json(
            &json!({ "property": "name", "method": 2, "pattern": "(" }),
            &PROPERTIES,
        )
        .unwrap_err();
        assert!(matches!(err, ViewError::InvalidPattern { .. }));
    }

    #[test]
    fn test_empty_pattern_is_inert() {
        let parsed = FilterMatcher::from_json(
            &json!({ "property": "name", "method": 0, "pattern": "" }),
            &PROPERTIES,
        )
        .unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn test_filter_list() {
        let handler = EntryHandler;
        let mut list = FilterList::new();
        let first = list.add();
        let second = list.add();
        assert_ne!(first, second);
        assert!(list.matchers().is_empty());

        list.set(first, Some(matcher("size", 0, json!(">10")))).unwrap();
        list.set(second, Some(matcher("name", 0, json!("b")))).unwrap();
        let matchers = list.matchers();
        assert!(matches_all(&handler, &entry(1, "b", 20.0), &matchers));
        assert!(!matches_all(&handler, &entry(2, "a", 20.0), &matchers));
        assert!(!matches_all(&handler, &entry(3, "b", 5.0), &matchers));

        list.remove(second).unwrap();
        assert_eq!(list.remove(second), Err(ViewError::FilterNotFound(second)));
        assert_eq!(list.set(99, None), Err(ViewError::FilterNotFound(99)));

        list.clear();
        assert!(list.is_empty());
        assert!(matches_all(&handler, &entry(4, "z", 0.0), &list.matchers()));
    }
}

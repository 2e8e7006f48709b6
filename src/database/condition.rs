// file: src/database/condition.rs
// description: Condition expressions, partial-update change sets and record keys
// reference: conditional writes for optimistic concurrency

use crate::error::{StoreError, StoreResult};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Raw stored item: a JSON object keyed by attribute name.
pub type Record = Map<String, Value>;

/// Primary key of a record. `sort` is present only for tables with a sort key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    pub partition: String,
    pub sort: Option<String>,
}

impl Key {
    pub fn partition(value: impl Into<String>) -> Self {
        Self {
            partition: value.into(),
            sort: None,
        }
    }

    pub fn composite(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: Some(sort.into()),
        }
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.sort {
            Some(sort) => write!(f, "{}/{}", self.partition, sort),
            None => write!(f, "{}", self.partition),
        }
    }
}

/// Precondition on the current state of a record, checked atomically with the
/// write it guards. `Exists`/`NotExists` test the record itself; the attribute
/// variants test a top-level attribute of the stored JSON object.
///
/// Equality is JSON equality on scalars. `NotEquals` holds when the attribute is
/// absent, so `NotEquals("deleted", true)` matches records that never had the flag.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Exists,
    NotExists,
    AttributeExists(String),
    AttributeNotExists(String),
    Equals(String, Value),
    NotEquals(String, Value),
    In(String, Vec<Value>),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn attribute_exists(attribute: impl Into<String>) -> Self {
        Condition::AttributeExists(attribute.into())
    }

    pub fn attribute_not_exists(attribute: impl Into<String>) -> Self {
        Condition::AttributeNotExists(attribute.into())
    }

    pub fn equals(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Equals(attribute.into(), value.into())
    }

    pub fn not_equals(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::NotEquals(attribute.into(), value.into())
    }

    pub fn is_in<V: Into<Value>>(
        attribute: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Condition::In(attribute.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn and(self, other: Condition) -> Self {
        match self {
            Condition::And(mut parts) => {
                parts.push(other);
                Condition::And(parts)
            }
            first => Condition::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Condition) -> Self {
        match self {
            Condition::Or(mut parts) => {
                parts.push(other);
                Condition::Or(parts)
            }
            first => Condition::Or(vec![first, other]),
        }
    }

    pub fn negate(self) -> Self {
        Condition::Not(Box::new(self))
    }

    /// Evaluate against the current record, `None` meaning the key is absent.
    pub fn evaluate(&self, current: Option<&Record>) -> bool {
        let attribute = |name: &str| current.and_then(|record| record.get(name));

        match self {
            Condition::Exists => current.is_some(),
            Condition::NotExists => current.is_none(),
            Condition::AttributeExists(name) => attribute(name).is_some(),
            Condition::AttributeNotExists(name) => attribute(name).is_none(),
            Condition::Equals(name, value) => attribute(name) == Some(value),
            Condition::NotEquals(name, value) => attribute(name) != Some(value),
            Condition::In(name, values) => attribute(name).is_some_and(|v| values.contains(v)),
            Condition::And(parts) => parts.iter().all(|part| part.evaluate(current)),
            Condition::Or(parts) => parts.iter().any(|part| part.evaluate(current)),
            Condition::Not(inner) => !inner.evaluate(current),
        }
    }

    /// Every attribute name referenced by this condition.
    pub fn attributes(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_attributes(&mut names);
        names
    }

    fn collect_attributes<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Condition::Exists | Condition::NotExists => {}
            Condition::AttributeExists(name)
            | Condition::AttributeNotExists(name)
            | Condition::Equals(name, _)
            | Condition::NotEquals(name, _)
            | Condition::In(name, _) => names.push(name),
            Condition::And(parts) | Condition::Or(parts) => {
                for part in parts {
                    part.collect_attributes(names);
                }
            }
            Condition::Not(inner) => inner.collect_attributes(names),
        }
    }
}

/// Attribute-level partial update: values to set and attributes to remove.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changes {
    set: Vec<(String, Value)>,
    remove: Vec<String>,
}

impl Changes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(attribute, value);
        self
    }

    pub fn remove(mut self, attribute: impl Into<String>) -> Self {
        let attribute = attribute.into();
        self.set.retain(|(name, _)| *name != attribute);
        if !self.remove.contains(&attribute) {
            self.remove.push(attribute);
        }
        self
    }

    /// Set when `Some`, remove when `None`.
    pub fn set_optional(self, attribute: impl Into<String>, value: Option<Value>) -> Self {
        match value {
            Some(value) => self.set(attribute, value),
            None => self.remove(attribute),
        }
    }

    pub fn insert(&mut self, attribute: impl Into<String>, value: impl Into<Value>) {
        let attribute = attribute.into();
        self.remove.retain(|name| *name != attribute);
        match self.set.iter_mut().find(|(name, _)| *name == attribute) {
            Some(entry) => entry.1 = value.into(),
            None => self.set.push((attribute, value.into())),
        }
    }

    pub fn sets(&self) -> &[(String, Value)] {
        &self.set
    }

    pub fn removals(&self) -> &[String] {
        &self.remove
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }

    pub fn touches(&self, attribute: &str) -> bool {
        self.set.iter().any(|(name, _)| name == attribute)
            || self.remove.iter().any(|name| name == attribute)
    }

    pub fn apply(&self, record: &mut Record) {
        for (name, value) in &self.set {
            record.insert(name.clone(), value.clone());
        }
        for name in &self.remove {
            record.remove(name);
        }
    }
}

/// Attribute names end up inside SQL JSON paths, so they are restricted to
/// identifier characters.
pub fn check_attribute_name(name: &str) -> StoreResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidRequest(format!(
            "Invalid attribute name: {:?}",
            name
        )))
    }
}

/// Ordering used for index sort keys: absent < null < bool < number < string,
/// then arrays and objects by their serialized form.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(Value::Array(_)) => 5,
            Some(Value::Object(_)) => 6,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x @ Value::Array(_)), Some(y @ Value::Array(_)))
        | (Some(x @ Value::Object(_)), Some(y @ Value::Object(_))) => {
            x.to_string().cmp(&y.to_string())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

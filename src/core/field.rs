//! Field descriptors, semantic types and identifier values

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Semantic type of a declared field
///
/// The type is used to check incoming payloads and to convert search
/// parameters from their query-string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Uuid,
    /// RFC 3339 timestamp carried as a string
    DateTime,
    /// Any JSON value
    Json,
}

impl FieldType {
    /// Check whether a JSON value (other than `null`) has this semantic type
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Float => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Uuid => value.as_str().is_some_and(|s| Uuid::parse_str(s).is_ok()),
            FieldType::DateTime => value
                .as_str()
                .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok()),
            FieldType::Json => true,
        }
    }

    /// Convert a raw query-string value into a JSON value of this type
    pub fn parse_str(&self, raw: &str) -> Option<Value> {
        match self {
            FieldType::String | FieldType::Json => Some(Value::String(raw.to_string())),
            FieldType::Integer => raw.parse::<i64>().ok().map(Value::from),
            FieldType::Float => raw.parse::<f64>().ok().map(Value::from),
            FieldType::Boolean => raw.parse::<bool>().ok().map(Value::from),
            FieldType::Uuid => Uuid::parse_str(raw)
                .ok()
                .map(|u| Value::String(u.to_string())),
            FieldType::DateTime => DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| Value::String(dt.to_rfc3339())),
        }
    }

    /// Whether fields of this type can serve as an entity identifier
    pub fn is_identifier_type(&self) -> bool {
        matches!(self, FieldType::String | FieldType::Integer | FieldType::Uuid)
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Uuid => "uuid",
            FieldType::DateTime => "date-time",
            FieldType::Json => "json",
        }
    }
}

/// A declared scalar field of an entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Identifier value of an entity instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    Integer(i64),
    Uuid(Uuid),
    Text(String),
}

impl EntityId {
    /// Parse a path segment according to the identifier field's type
    pub fn parse(segment: &str, field_type: FieldType) -> Option<Self> {
        match field_type {
            FieldType::Integer => segment.parse().ok().map(EntityId::Integer),
            FieldType::Uuid => Uuid::parse_str(segment).ok().map(EntityId::Uuid),
            FieldType::String if !segment.is_empty() => Some(EntityId::Text(segment.to_string())),
            _ => None,
        }
    }

    /// Read an identifier from a stored JSON value
    pub fn from_value(value: &Value, field_type: FieldType) -> Option<Self> {
        match (field_type, value) {
            (FieldType::Integer, Value::Number(n)) => n.as_i64().map(EntityId::Integer),
            (FieldType::Uuid, Value::String(s)) => Uuid::parse_str(s).ok().map(EntityId::Uuid),
            (FieldType::String, Value::String(s)) => Some(EntityId::Text(s.clone())),
            (_, Value::String(s)) => Self::parse(s, field_type),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            EntityId::Integer(i) => Value::from(*i),
            EntityId::Uuid(u) => Value::String(u.to_string()),
            EntityId::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Integer(i) => write!(f, "{}", i),
            EntityId::Uuid(u) => write!(f, "{}", u),
            EntityId::Text(s) => write!(f, "{}", s),
        }
    }
}

//! Entity descriptors and dynamic entity records
//!
//! An [`EntityDescriptor`] is the descriptor-table form of a persistent type:
//! its identifier, scalar fields and associations. Instances travel between
//! the framework and the persistence collaborator as [`Record`]s.

use crate::core::field::{EntityId, FieldDescriptor, FieldType};
use indexmap::IndexMap;
use serde_json::Value;

/// How many target instances an association holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// Declared target of an association
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationTarget {
    /// A concrete entity type, referenced by its type name
    Concrete(String),

    /// An abstract capability that must be mapped to exactly one concrete
    /// type before payloads can be read
    Abstract(String),
}

impl AssociationTarget {
    pub fn name(&self) -> &str {
        match self {
            AssociationTarget::Concrete(name) | AssociationTarget::Abstract(name) => name,
        }
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self, AssociationTarget::Abstract(_))
    }
}

/// An association field of an entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationDescriptor {
    pub name: String,
    pub target: AssociationTarget,
    pub cardinality: Cardinality,
    pub nullable: bool,
}

impl AssociationDescriptor {
    /// A single-valued association to a concrete type
    pub fn one(name: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: AssociationTarget::Concrete(target_type.into()),
            cardinality: Cardinality::One,
            nullable: true,
        }
    }

    /// A collection-valued association to a concrete type
    pub fn many(name: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: AssociationTarget::Concrete(target_type.into()),
            cardinality: Cardinality::Many,
            nullable: true,
        }
    }

    /// A single-valued association declared by an abstract capability
    pub fn abstract_one(name: impl Into<String>, capability: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: AssociationTarget::Abstract(capability.into()),
            cardinality: Cardinality::One,
            nullable: true,
        }
    }

    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Descriptor of a persistent entity type
///
/// # Example
///
/// ```
/// use halrest::core::entity::{AssociationDescriptor, EntityDescriptor};
/// use halrest::core::field::FieldType;
///
/// let person = EntityDescriptor::new("Person")
///     .id("id", FieldType::Integer)
///     .field("firstName", FieldType::String)
///     .nullable_field("lastName", FieldType::String)
///     .association(AssociationDescriptor::one("address", "Address"));
///
/// assert_eq!(person.id_field().map(|f| f.name.as_str()), Some("id"));
/// assert!(person.declares("lastName"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    type_name: String,
    id_field: Option<String>,
    version_field: Option<String>,
    fields: Vec<FieldDescriptor>,
    associations: Vec<AssociationDescriptor>,
}

impl EntityDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id_field: None,
            version_field: None,
            fields: Vec::new(),
            associations: Vec::new(),
        }
    }

    /// Declare the identifier field
    pub fn id(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        self.id_field = Some(name.clone());
        self.fields.push(FieldDescriptor::new(name, field_type));
        self
    }

    /// Declare an integer optimistic-lock version field
    pub fn version(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.version_field = Some(name.clone());
        self.fields
            .push(FieldDescriptor::new(name, FieldType::Integer).nullable());
        self
    }

    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldDescriptor::new(name, field_type));
        self
    }

    pub fn nullable_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields
            .push(FieldDescriptor::new(name, field_type).nullable());
        self
    }

    pub fn association(mut self, association: AssociationDescriptor) -> Self {
        self.associations.push(association);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The identifier field, if one was declared
    pub fn id_field(&self) -> Option<&FieldDescriptor> {
        let name = self.id_field.as_deref()?;
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn version_field(&self) -> Option<&str> {
        self.version_field.as_deref()
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn associations(&self) -> &[AssociationDescriptor] {
        &self.associations
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn find_association(&self, name: &str) -> Option<&AssociationDescriptor> {
        self.associations.iter().find(|a| a.name == name)
    }

    /// Whether `name` is a declared field or association
    pub fn declares(&self, name: &str) -> bool {
        self.find_field(name).is_some() || self.find_association(name).is_some()
    }

    pub fn is_id_field(&self, name: &str) -> bool {
        self.id_field.as_deref() == Some(name)
    }

    pub fn is_version_field(&self, name: &str) -> bool {
        self.version_field.as_deref() == Some(name)
    }

    /// Read the identifier of a record of this type
    pub fn id_of(&self, record: &Record) -> Option<EntityId> {
        let field = self.id_field()?;
        match record.get(&field.name)? {
            Property::Scalar(value) => EntityId::from_value(value, field.field_type),
            _ => None,
        }
    }

    /// Read the version of a record of this type
    pub fn version_of(&self, record: &Record) -> Option<i64> {
        let name = self.version_field.as_deref()?;
        record.scalar(name).and_then(Value::as_i64)
    }
}

/// Value of one property of a [`Record`]
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    /// A scalar field value (including `null`)
    Scalar(Value),

    /// A single embedded association value
    Embedded(Box<Record>),

    /// A collection of embedded association values
    EmbeddedList(Vec<Record>),

    /// A single association exposed as a link, stored by target identifier
    Reference(EntityId),

    /// A collection association exposed as links
    References(Vec<EntityId>),
}

/// A dynamic entity instance
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    type_name: String,
    properties: IndexMap<String, Property>,
}

impl Record {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: IndexMap::new(),
        }
    }

    /// Builder-style scalar setter
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties
            .insert(name.into(), Property::Scalar(value.into()));
        self
    }

    /// Builder-style property setter
    pub fn with_property(mut self, name: impl Into<String>, property: Property) -> Self {
        self.properties.insert(name.into(), property);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    /// Scalar value of a property, `None` for missing or non-scalar ones
    pub fn scalar(&self, name: &str) -> Option<&Value> {
        match self.properties.get(name)? {
            Property::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// Embedded record of a single-valued association
    pub fn embedded(&self, name: &str) -> Option<&Record> {
        match self.properties.get(name)? {
            Property::Embedded(record) => Some(record),
            _ => None,
        }
    }

    pub fn set(&mut self, name: impl Into<String>, property: Property) {
        self.properties.insert(name.into(), property);
    }

    pub fn set_scalar(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties
            .insert(name.into(), Property::Scalar(value.into()));
    }

    pub fn remove(&mut self, name: &str) -> Option<Property> {
        self.properties.shift_remove(name)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &Property)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Overlay every property of `patch` onto this record
    pub fn merge(&mut self, patch: Record) {
        for (name, property) in patch.properties {
            self.properties.insert(name, property);
        }
    }

    /// Scalar properties as a flat JSON object, used as template context
    pub fn scalars_as_json(&self) -> serde_json::Map<String, Value> {
        self.properties
            .iter()
            .filter_map(|(name, property)| match property {
                Property::Scalar(value) => Some((name.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person() -> EntityDescriptor {
        EntityDescriptor::new("Person")
            .id("id", FieldType::Integer)
            .version("version")
            .field("firstName", FieldType::String)
            .nullable_field("lastName", FieldType::String)
            .association(AssociationDescriptor::abstract_one("address", "Address"))
    }

    #[test]
    fn test_descriptor_lookup() {
        let desc = person();
        assert_eq!(desc.type_name(), "Person");
        assert!(desc.is_id_field("id"));
        assert!(desc.is_version_field("version"));
        assert!(desc.declares("firstName"));
        assert!(desc.declares("address"));
        assert!(!desc.declares("email"));
        assert!(desc.find_field("lastName").unwrap().nullable);
        assert!(desc.find_association("address").unwrap().target.is_abstract());
    }

    #[test]
    fn test_descriptor_without_identifier() {
        let desc = EntityDescriptor::new("Note").field("text", FieldType::String);
        assert!(desc.id_field().is_none());
    }

    #[test]
    fn test_record_id_and_version() {
        let desc = person();
        let record = Record::new("Person")
            .with("id", 1)
            .with("version", 4)
            .with("firstName", "Ivan");
        assert_eq!(desc.id_of(&record), Some(EntityId::Integer(1)));
        assert_eq!(desc.version_of(&record), Some(4));
    }

    #[test]
    fn test_record_merge_overlays_properties() {
        let mut record = Record::new("Person")
            .with("firstName", "Ivan")
            .with("lastName", "Ivanov");
        record.merge(Record::new("Person").with("lastName", "Petrov"));
        assert_eq!(record.scalar("firstName"), Some(&json!("Ivan")));
        assert_eq!(record.scalar("lastName"), Some(&json!("Petrov")));
    }

    #[test]
    fn test_scalars_as_json_skips_associations() {
        let record = Record::new("Person")
            .with("firstName", "Ivan")
            .with_property("address", Property::Reference(EntityId::Integer(2)));
        let scalars = record.scalars_as_json();
        assert_eq!(scalars.len(), 1);
        assert_eq!(scalars["firstName"], json!("Ivan"));
    }
}

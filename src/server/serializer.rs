//! Serialization layer
//!
//! Turns records into HAL representations and inbound JSON payloads into
//! records. Both directions read the immutable registries only.

use crate::config::ExposureConfig;
use crate::core::entity::{Cardinality, EntityDescriptor, Property, Record};
use crate::core::error::{DeserializationError, ExposureError};
use crate::core::field::EntityId;
use crate::core::projection::ProjectionDescriptor;
use crate::core::query::PageMetadata;
use crate::core::repository::RepositoryBinding;
use crate::links::{AssociationExposure, LinkBuilder, Links};
use crate::server::entity_registry::MetadataRegistry;
use crate::server::projection_registry::ProjectionRegistry;
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Already-rendered targets of link associations selected by a projection
pub type InlinedAssociations = IndexMap<String, Value>;

/// A HAL resource: top-level fields, `_embedded`, `_links` and `page`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Representation {
    pub properties: Map<String, Value>,
    pub embedded: IndexMap<String, Vec<Value>>,
    pub links: Links,
    pub page: Option<PageMetadata>,
}

impl Representation {
    /// A resource consisting of links only (root, search listing)
    pub fn from_links(links: Links) -> Self {
        Self {
            links,
            ..Self::default()
        }
    }

    pub fn to_json(&self) -> Value {
        let mut body = self.properties.clone();
        if !self.embedded.is_empty() {
            let embedded: Map<String, Value> = self
                .embedded
                .iter()
                .map(|(rel, items)| (rel.clone(), Value::Array(items.clone())))
                .collect();
            body.insert("_embedded".to_string(), Value::Object(embedded));
        }
        body.insert(
            "_links".to_string(),
            serde_json::to_value(&self.links).unwrap_or(Value::Null),
        );
        if let Some(page) = &self.page {
            body.insert(
                "page".to_string(),
                serde_json::to_value(page).unwrap_or(Value::Null),
            );
        }
        Value::Object(body)
    }
}

/// How a payload maps onto an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadMode {
    /// POST: every non-nullable field is required
    Create,
    /// PUT: full replacement, same rules as create
    Replace,
    /// PATCH: only supplied properties are read and checked
    Merge,
}

impl PayloadMode {
    fn is_complete(&self) -> bool {
        !matches!(self, PayloadMode::Merge)
    }
}

/// Record <-> representation conversion over the registries
pub struct Serializer<'a> {
    config: &'a ExposureConfig,
    metadata: &'a MetadataRegistry,
    projections: &'a ProjectionRegistry,
    links: &'a LinkBuilder,
}

impl<'a> Serializer<'a> {
    pub fn new(
        config: &'a ExposureConfig,
        metadata: &'a MetadataRegistry,
        projections: &'a ProjectionRegistry,
        links: &'a LinkBuilder,
    ) -> Self {
        Self {
            config,
            metadata,
            projections,
            links,
        }
    }

    /// Item representation of a record
    ///
    /// The identifier always drives the links; it appears in the body only
    /// when identifier exposure is enabled for the type. The version field
    /// never appears in the body.
    pub fn to_representation(
        &self,
        binding: &RepositoryBinding,
        record: &Record,
        projection: Option<&ProjectionDescriptor>,
        inlined: &InlinedAssociations,
    ) -> Result<Representation, ExposureError> {
        let entity = &binding.entity;
        let id = entity.id_of(record).ok_or_else(|| {
            ExposureError::Internal(format!(
                "{} record without a valid identifier",
                entity.type_name()
            ))
        })?;

        let mut links = self.links.item_links(
            binding,
            &id,
            self.projections.has_projections(entity.type_name()),
        );
        for association in entity.associations() {
            if let Some(AssociationExposure::Link { .. }) =
                self.metadata.association(entity.type_name(), &association.name)
            {
                links.insert(
                    association.name.clone(),
                    self.links.association_link(binding, &id, &association.name),
                );
            }
        }

        let projected;
        let source = match projection {
            Some(descriptor) => {
                projected = self.projections.apply(record, descriptor)?;
                &projected
            }
            None => record,
        };

        let properties = self.render_properties(entity, source, inlined);
        Ok(Representation {
            properties,
            links,
            ..Representation::default()
        })
    }

    /// Collection-shaped representation: items under the binding's
    /// collection relation
    pub fn collection(
        &self,
        binding: &RepositoryBinding,
        items: Vec<Representation>,
        links: Links,
        page: Option<PageMetadata>,
    ) -> Representation {
        let mut embedded = IndexMap::new();
        embedded.insert(
            binding.collection_rel.clone(),
            items.iter().map(Representation::to_json).collect(),
        );
        Representation {
            properties: Map::new(),
            embedded,
            links,
            page,
        }
    }

    fn render_properties(
        &self,
        entity: &EntityDescriptor,
        record: &Record,
        inlined: &InlinedAssociations,
    ) -> Map<String, Value> {
        let mut properties = Map::new();
        for (name, property) in record.properties() {
            if entity.is_version_field(name) {
                continue;
            }
            if entity.is_id_field(name) && !self.config.exposes_id(entity.type_name()) {
                continue;
            }

            let linked = matches!(
                self.metadata.association(entity.type_name(), name),
                Some(AssociationExposure::Link { .. })
            );
            if linked {
                if let Some(value) = inlined.get(name) {
                    properties.insert(name.to_string(), value.clone());
                }
                continue;
            }

            if let Some(value) = self.property_value(property) {
                properties.insert(name.to_string(), value);
            }
        }
        properties
    }

    fn property_value(&self, property: &Property) -> Option<Value> {
        match property {
            Property::Scalar(value) => Some(value.clone()),
            Property::Embedded(record) => Some(self.embedded_value(record)),
            Property::EmbeddedList(records) => Some(Value::Array(
                records.iter().map(|r| self.embedded_value(r)).collect(),
            )),
            // Link-exposed associations only appear inline through projections
            Property::Reference(_) | Property::References(_) => None,
        }
    }

    /// Inline JSON of an embedded association value
    ///
    /// Link associations of the embedded type are rendered as target hrefs.
    pub fn embedded_value(&self, record: &Record) -> Value {
        let descriptor = self.metadata.entity(record.type_name());
        let mut object = Map::new();
        for (name, property) in record.properties() {
            if let Some(entity) = descriptor {
                if entity.is_version_field(name) {
                    continue;
                }
                if entity.is_id_field(name) && !self.config.exposes_id(entity.type_name()) {
                    continue;
                }
            }

            let value = match property {
                Property::Reference(id) => self.reference_href(record.type_name(), name, id),
                Property::References(ids) => Value::Array(
                    ids.iter()
                        .map(|id| self.reference_href(record.type_name(), name, id))
                        .collect(),
                ),
                other => match self.property_value(other) {
                    Some(value) => value,
                    None => continue,
                },
            };
            object.insert(name.to_string(), value);
        }
        Value::Object(object)
    }

    fn reference_href(&self, source_type: &str, association: &str, id: &EntityId) -> Value {
        match self.metadata.association(source_type, association) {
            Some(AssociationExposure::Link { target_path, .. }) => {
                Value::String(self.links.item_href_for_path(target_path, id))
            }
            _ => id.to_value(),
        }
    }

    /// Read a payload into a record of `entity`
    ///
    /// Identifier and version fields in the payload are ignored, as are
    /// undeclared properties and HAL control keys.
    pub fn from_payload(
        &self,
        entity: &EntityDescriptor,
        payload: &Value,
        mode: PayloadMode,
    ) -> Result<Record, DeserializationError> {
        let object = payload
            .as_object()
            .ok_or(DeserializationError::NotAnObject)?;
        let mut record = Record::new(entity.type_name());

        for field in entity.fields() {
            if entity.is_id_field(&field.name) || entity.is_version_field(&field.name) {
                continue;
            }
            match object.get(&field.name) {
                None if mode.is_complete() && !field.nullable => {
                    return Err(DeserializationError::MissingField {
                        field: field.name.clone(),
                    });
                }
                None if mode.is_complete() => record.set_scalar(field.name.clone(), Value::Null),
                None => {}
                Some(Value::Null) if !field.nullable => {
                    return Err(DeserializationError::MissingField {
                        field: field.name.clone(),
                    });
                }
                Some(Value::Null) => record.set_scalar(field.name.clone(), Value::Null),
                Some(value) => {
                    if !field.field_type.accepts(value) {
                        return Err(DeserializationError::TypeMismatch {
                            field: field.name.clone(),
                            expected: field.field_type.name().to_string(),
                        });
                    }
                    record.set_scalar(field.name.clone(), value.clone());
                }
            }
        }

        for association in entity.associations() {
            let name = &association.name;
            let value = match object.get(name) {
                Some(Value::Null) if association.nullable => {
                    record.set_scalar(name.clone(), Value::Null);
                    continue;
                }
                None if association.nullable || !mode.is_complete() => continue,
                None | Some(Value::Null) => {
                    return Err(DeserializationError::MissingField {
                        field: name.clone(),
                    });
                }
                Some(value) => value,
            };

            let exposure = self
                .metadata
                .association(entity.type_name(), name)
                .cloned()
                .ok_or_else(|| DeserializationError::TypeMismatch {
                    field: name.clone(),
                    expected: association.target.name().to_string(),
                })?;

            let property = match exposure {
                AssociationExposure::Link {
                    target_type,
                    target_path,
                    cardinality,
                } => match cardinality {
                    Cardinality::One => Property::Reference(self.parse_reference(
                        name,
                        value,
                        &target_type,
                        &target_path,
                    )?),
                    Cardinality::Many => Property::References(
                        as_array(name, value)?
                            .iter()
                            .map(|v| self.parse_reference(name, v, &target_type, &target_path))
                            .collect::<Result<_, _>>()?,
                    ),
                },
                AssociationExposure::Embedded {
                    concrete_type: None,
                    ..
                } => {
                    return Err(DeserializationError::UnresolvedAbstractType {
                        field: name.clone(),
                        capability: association.target.name().to_string(),
                    });
                }
                AssociationExposure::Embedded {
                    concrete_type: Some(concrete),
                    cardinality,
                } => {
                    let target = self.metadata.entity(&concrete).ok_or_else(|| {
                        DeserializationError::UnresolvedAbstractType {
                            field: name.clone(),
                            capability: concrete.clone(),
                        }
                    })?;
                    match cardinality {
                        Cardinality::One => Property::Embedded(Box::new(self.from_payload(
                            target,
                            value,
                            PayloadMode::Create,
                        )?)),
                        Cardinality::Many => Property::EmbeddedList(
                            as_array(name, value)?
                                .iter()
                                .map(|v| self.from_payload(target, v, PayloadMode::Create))
                                .collect::<Result<_, _>>()?,
                        ),
                    }
                }
            };
            record.set(name.clone(), property);
        }

        Ok(record)
    }

    /// Accepts a target item URI (with or without the base path, optionally
    /// absolute with scheme and host) or a bare identifier
    fn parse_reference(
        &self,
        field: &str,
        value: &Value,
        target_type: &str,
        target_path: &str,
    ) -> Result<EntityId, DeserializationError> {
        let invalid = || DeserializationError::InvalidReference {
            field: field.to_string(),
            value: value
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string()),
        };

        let id_type = self
            .metadata
            .entity(target_type)
            .and_then(|e| e.id_field())
            .map(|f| f.field_type)
            .ok_or_else(invalid)?;

        match value {
            Value::String(raw) if raw.contains('/') => {
                let path = match url::Url::parse(raw) {
                    Ok(url) => url.path().to_string(),
                    Err(_) => raw.clone(),
                };
                let with_base = format!("{}/{}/", self.links.base_path(), target_path);
                let without_base = format!("/{}/", target_path);
                let segment = path
                    .strip_prefix(&with_base)
                    .or_else(|| path.strip_prefix(&without_base))
                    .filter(|s| !s.is_empty() && !s.contains('/'))
                    .ok_or_else(invalid)?;
                let segment = urlencoding::decode(segment).map_err(|_| invalid())?;
                EntityId::parse(&segment, id_type).ok_or_else(invalid)
            }
            Value::String(raw) => EntityId::parse(raw, id_type).ok_or_else(invalid),
            other => EntityId::from_value(other, id_type).ok_or_else(invalid),
        }
    }
}

fn as_array<'v>(field: &str, value: &'v Value) -> Result<&'v Vec<Value>, DeserializationError> {
    value
        .as_array()
        .ok_or_else(|| DeserializationError::TypeMismatch {
            field: field.to_string(),
            expected: "array".to_string(),
        })
}

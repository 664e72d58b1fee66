//! Projection registry
//!
//! Holds every named projection keyed by (source type, name). Derived fields
//! are compiled into a shared `tera` instance at registration, so rendering at
//! request time never parses templates.

use crate::core::entity::{EntityDescriptor, Property, Record};
use crate::core::error::{ConfigurationError, ExposureError};
use crate::core::projection::{ProjectedField, ProjectionDescriptor};
use crate::server::entity_registry::{MetadataRegistry, validate_name};
use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tera::{Context, Tera};

/// Registry of projections by source type
#[derive(Default)]
pub struct ProjectionRegistry {
    projections: HashMap<(String, String), Arc<ProjectionDescriptor>>,
    names_by_type: IndexMap<String, Vec<String>>,
    templates: Tera,
}

impl ProjectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a projection over `entity`
    ///
    /// Rejects duplicate names for the same source type, fields the source
    /// type does not declare, and derived templates that fail to parse or read
    /// undeclared fields.
    pub fn register(
        &mut self,
        descriptor: ProjectionDescriptor,
        entity: &EntityDescriptor,
    ) -> Result<(), ConfigurationError> {
        validate_name("projection name", &descriptor.name)?;

        let key = (descriptor.source_type.clone(), descriptor.name.clone());
        if self.projections.contains_key(&key) {
            return Err(ConfigurationError::DuplicateProjection {
                entity_type: descriptor.source_type,
                name: descriptor.name,
            });
        }

        for field in &descriptor.fields {
            match field {
                ProjectedField::Field(name) => {
                    if !entity.declares(name) {
                        return Err(ConfigurationError::UnknownProjectionField {
                            projection: descriptor.name.clone(),
                            entity_type: entity.type_name().to_string(),
                            field: name.clone(),
                        });
                    }
                }
                ProjectedField::Derived { name, template } => {
                    for variable in template_variables(template)? {
                        if entity.find_field(&variable).is_none() {
                            return Err(ConfigurationError::UnknownProjectionField {
                                projection: descriptor.name.clone(),
                                entity_type: entity.type_name().to_string(),
                                field: variable,
                            });
                        }
                    }
                    self.templates
                        .add_raw_template(
                            &template_name(&descriptor.source_type, &descriptor.name, name),
                            template,
                        )
                        .map_err(|e| ConfigurationError::InvalidTemplate {
                            projection: descriptor.name.clone(),
                            field: name.clone(),
                            message: e.to_string(),
                        })?;
                }
            }
        }

        tracing::debug!(
            projection = %descriptor.name,
            source_type = %descriptor.source_type,
            "Projection registered"
        );

        self.names_by_type
            .entry(descriptor.source_type.clone())
            .or_default()
            .push(descriptor.name.clone());
        self.projections.insert(key, Arc::new(descriptor));
        Ok(())
    }

    /// Check that every excerpt projection named by a binding exists
    pub fn validate_excerpts(&self, registry: &MetadataRegistry) -> Result<(), ConfigurationError> {
        for binding in registry.bindings() {
            if let Some(excerpt) = &binding.excerpt_projection
                && self.resolve(binding.entity_type(), excerpt).is_none()
            {
                return Err(ConfigurationError::UnknownExcerpt {
                    repository: binding.name.clone(),
                    projection: excerpt.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn resolve(&self, entity_type: &str, name: &str) -> Option<&Arc<ProjectionDescriptor>> {
        self.projections
            .get(&(entity_type.to_string(), name.to_string()))
    }

    /// Projection names of a type in registration order
    pub fn names_for(&self, entity_type: &str) -> &[String] {
        self.names_by_type
            .get(entity_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn has_projections(&self, entity_type: &str) -> bool {
        !self.names_for(entity_type).is_empty()
    }

    /// Restrict a record to the projected fields, rendering derived ones
    pub fn apply(
        &self,
        record: &Record,
        descriptor: &ProjectionDescriptor,
    ) -> Result<Record, ExposureError> {
        let mut projected = Record::new(record.type_name());

        for field in &descriptor.fields {
            match field {
                ProjectedField::Field(name) => {
                    if let Some(property) = record.get(name) {
                        projected.set(name.clone(), property.clone());
                    }
                }
                ProjectedField::Derived { name, template } => {
                    let context = template_context(record, template)?;
                    let rendered = self
                        .templates
                        .render(
                            &template_name(&descriptor.source_type, &descriptor.name, name),
                            &context,
                        )
                        .map_err(|e| {
                            ExposureError::Internal(format!(
                                "Failed to render '{}' of projection '{}': {}",
                                name, descriptor.name, e
                            ))
                        })?;
                    projected.set(name.clone(), Property::Scalar(Value::String(rendered)));
                }
            }
        }

        Ok(projected)
    }
}

fn template_name(source_type: &str, projection: &str, field: &str) -> String {
    format!("{}::{}::{}", source_type, projection, field)
}

/// Scalars of the record, with every variable the template reads defined
fn template_context(record: &Record, template: &str) -> Result<Context, ExposureError> {
    let mut values = record.scalars_as_json();
    let variables = template_variables(template).map_err(|e| ExposureError::Internal(e.to_string()))?;
    for variable in variables {
        values.entry(variable).or_insert(Value::Null);
    }
    Context::from_serialize(&values)
        .map_err(|e| ExposureError::Internal(format!("Failed to build template context: {}", e)))
}

/// Names read by `{{ name }}` expressions, including filtered ones like
/// `{{ name | upper }}`
fn template_variables(template: &str) -> Result<Vec<String>, ConfigurationError> {
    static VARIABLE_REGEX: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    let regex = VARIABLE_REGEX
        .get_or_init(|| Regex::new(r"\{\{-?\s*([A-Za-z_][A-Za-z0-9_]*)"))
        .as_ref()
        .map_err(|e| ConfigurationError::Invalid(e.to_string()))?;

    let mut variables: Vec<String> = Vec::new();
    for captures in regex.captures_iter(template) {
        if let Some(name) = captures.get(1)
            && !variables.iter().any(|v| v == name.as_str())
        {
            variables.push(name.as_str().to_string());
        }
    }
    Ok(variables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::AssociationDescriptor;
    use crate::core::field::FieldType;

    fn person() -> EntityDescriptor {
        EntityDescriptor::new("Person")
            .id("id", FieldType::Integer)
            .field("firstName", FieldType::String)
            .nullable_field("lastName", FieldType::String)
            .association(AssociationDescriptor::one("address", "Address"))
    }

    fn frodo() -> Record {
        Record::new("Person")
            .with("id", 1)
            .with("firstName", "Frodo")
            .with("lastName", "Baggins")
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = ProjectionRegistry::new();
        registry
            .register(ProjectionDescriptor::new("last-name", "Person").field("lastName"), &person())
            .unwrap();
        assert!(registry.resolve("Person", "last-name").is_some());
        assert!(registry.resolve("Person", "first-name").is_none());
        assert!(registry.resolve("Address", "last-name").is_none());
        assert_eq!(registry.names_for("Person"), ["last-name".to_string()]);
        assert!(registry.names_for("Address").is_empty());
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let mut registry = ProjectionRegistry::new();
        let projection = ProjectionDescriptor::new("last-name", "Person").field("lastName");
        registry.register(projection.clone(), &person()).unwrap();
        let err = registry.register(projection, &person()).unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateProjection { .. }));
    }

    #[test]
    fn test_undeclared_field_is_rejected() {
        let mut registry = ProjectionRegistry::new();
        let err = registry
            .register(ProjectionDescriptor::new("nick", "Person").field("nickname"), &person())
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownProjectionField { .. }));
    }

    #[test]
    fn test_derived_template_must_read_declared_fields() {
        let mut registry = ProjectionRegistry::new();
        let err = registry
            .register(
                ProjectionDescriptor::new("full", "Person").derived("fullName", "{{ nickname }}"),
                &person(),
            )
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownProjectionField { .. }));
    }

    #[test]
    fn test_broken_template_is_rejected() {
        let mut registry = ProjectionRegistry::new();
        let err = registry
            .register(
                ProjectionDescriptor::new("full", "Person").derived("fullName", "{{ firstName "),
                &person(),
            )
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidTemplate { .. }));
    }

    #[test]
    fn test_apply_selects_subset() {
        let mut registry = ProjectionRegistry::new();
        registry
            .register(ProjectionDescriptor::new("last-name", "Person").field("lastName"), &person())
            .unwrap();
        let projection = registry.resolve("Person", "last-name").unwrap().clone();
        let projected = registry.apply(&frodo(), &projection).unwrap();
        let names: Vec<_> = projected.properties().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["lastName"]);
    }

    #[test]
    fn test_apply_renders_derived_fields() {
        let mut registry = ProjectionRegistry::new();
        registry
            .register(
                ProjectionDescriptor::new("full", "Person")
                    .derived("fullName", "{{ firstName }} {{ lastName }}"),
                &person(),
            )
            .unwrap();
        let projection = registry.resolve("Person", "full").unwrap().clone();
        let projected = registry.apply(&frodo(), &projection).unwrap();
        assert_eq!(
            projected.scalar("fullName"),
            Some(&Value::String("Frodo Baggins".into()))
        );

        let no_last_name = Record::new("Person").with("id", 2).with("firstName", "Sam");
        let projected = registry.apply(&no_last_name, &projection).unwrap();
        assert_eq!(projected.scalar("fullName"), Some(&Value::String("Sam ".into())));
    }

    #[test]
    fn test_template_variables() {
        assert_eq!(
            template_variables("{{ a }} and {{b|upper}} {{ a }} {%- if c %}x{% endif %}").unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}

//! Entity metadata registry
//!
//! Collects entity descriptors and repository declarations at startup, applies
//! the detection strategy, and produces the immutable [`MetadataRegistry`]
//! that the request handler reads without synchronization.

use crate::config::{DetectionStrategy, ExposureConfig};
use crate::core::entity::EntityDescriptor;
use crate::core::error::ConfigurationError;
use crate::core::pluralize::Pluralizer;
use crate::core::repository::{
    DeclarationVisibility, Operation, RepositoryBinding, RepositoryDeclaration,
};
use crate::links::registry::{AssociationExposure, AssociationRegistry};
use crate::server::exposure::rest::HEALTH_PATHS;
use indexmap::IndexMap;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Check a path segment or relation name
pub(crate) fn validate_name(kind: &'static str, name: &str) -> Result<(), ConfigurationError> {
    static NAME_REGEX: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    let regex = NAME_REGEX
        .get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$"))
        .as_ref()
        .map_err(|e| ConfigurationError::Invalid(e.to_string()))?;
    if regex.is_match(name) {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidName {
            kind,
            name: name.to_string(),
        })
    }
}

/// Whether a declaration is exposed under a detection strategy
pub fn is_detected(strategy: DetectionStrategy, declaration: &RepositoryDeclaration) -> bool {
    let public = declaration.visibility == DeclarationVisibility::Public;
    match strategy {
        DetectionStrategy::All => true,
        DetectionStrategy::Default => declaration.exported.unwrap_or(public),
        DetectionStrategy::Visibility => public,
        DetectionStrategy::Annotated => declaration.exported == Some(true),
    }
}

/// Startup-time collector for entity and repository declarations
pub struct MetadataRegistryBuilder {
    strategy: DetectionStrategy,
    at_server_root: bool,
    type_mappings: IndexMap<String, String>,
    entities: IndexMap<String, Arc<EntityDescriptor>>,
    bindings: IndexMap<String, Arc<RepositoryBinding>>,
    paths_by_type: HashMap<String, String>,
}

impl MetadataRegistryBuilder {
    pub fn new(config: &ExposureConfig) -> Self {
        Self {
            strategy: config.detection_strategy,
            at_server_root: config.base_path.trim_matches('/').is_empty(),
            type_mappings: config.type_mappings.clone(),
            entities: IndexMap::new(),
            bindings: IndexMap::new(),
            paths_by_type: HashMap::new(),
        }
    }

    /// Register a repository-less entity type (e.g. an embeddable value type)
    pub fn register_entity(
        &mut self,
        descriptor: EntityDescriptor,
    ) -> Result<Arc<EntityDescriptor>, ConfigurationError> {
        let type_name = descriptor.type_name().to_string();
        if let Some(existing) = self.entities.get(&type_name) {
            if **existing == descriptor {
                return Ok(existing.clone());
            }
            return Err(ConfigurationError::DuplicateEntityType {
                entity_type: type_name,
            });
        }

        if let Some(id_field) = descriptor.id_field()
            && !id_field.field_type.is_identifier_type()
        {
            return Err(ConfigurationError::InvalidIdentifierType {
                entity_type: type_name,
                field: id_field.name.clone(),
                field_type: id_field.field_type.name().to_string(),
            });
        }

        let descriptor = Arc::new(descriptor);
        self.entities.insert(type_name, descriptor.clone());
        Ok(descriptor)
    }

    /// Register a repository declaration
    ///
    /// Returns the binding, or `None` when the detection strategy does not
    /// expose the declaration. The entity type is known to the registry either
    /// way, so associations to it are embedded rather than linked.
    pub fn register(
        &mut self,
        declaration: RepositoryDeclaration,
    ) -> Result<Option<Arc<RepositoryBinding>>, ConfigurationError> {
        if declaration.entity.id_field().is_none() {
            return Err(ConfigurationError::MissingIdentifier {
                entity_type: declaration.entity.type_name().to_string(),
            });
        }

        let entity = self.register_entity(declaration.entity.clone())?;

        if !is_detected(self.strategy, &declaration) {
            tracing::debug!(
                repository = %declaration.name,
                strategy = ?self.strategy,
                "Repository not exposed by detection strategy"
            );
            return Ok(None);
        }

        let path = declaration
            .path
            .clone()
            .unwrap_or_else(|| Pluralizer::resource_path(entity.type_name()));
        validate_name("resource path", &path)?;
        if self.at_server_root && HEALTH_PATHS.contains(&path.as_str()) {
            return Err(ConfigurationError::ReservedPath {
                path,
                repository: declaration.name,
            });
        }

        if let Some(existing) = self.bindings.get(&path) {
            return Err(ConfigurationError::DuplicatePath {
                path,
                first: existing.name.clone(),
                second: declaration.name,
            });
        }

        let collection_rel = declaration.collection_rel.clone().unwrap_or_else(|| path.clone());
        let item_rel = declaration
            .item_rel
            .clone()
            .unwrap_or_else(|| Pluralizer::uncapitalize(entity.type_name()));
        validate_name("collection relation", &collection_rel)?;
        validate_name("item relation", &item_rel)?;

        let mut search_methods = Vec::new();
        for method in declaration.search_methods.iter().filter(|m| m.exported) {
            validate_name("search relation", &method.rel)?;
            if search_methods
                .iter()
                .any(|m: &crate::core::repository::SearchMethodDescriptor| m.rel == method.rel)
            {
                return Err(ConfigurationError::DuplicateSearchRel {
                    repository: declaration.name.clone(),
                    rel: method.rel.clone(),
                });
            }
            search_methods.push(method.clone());
        }

        let binding = Arc::new(RepositoryBinding {
            name: declaration.name.clone(),
            entity: entity.clone(),
            path: path.clone(),
            collection_rel,
            item_rel,
            paging: declaration.paging,
            search_methods,
            operations: declaration.effective_operations(),
            excerpt_projection: declaration.excerpt_projection.clone(),
        });

        tracing::debug!(
            repository = %binding.name,
            path = %binding.path,
            entity_type = %entity.type_name(),
            "Repository exposed"
        );

        self.paths_by_type
            .entry(entity.type_name().to_string())
            .or_insert_with(|| path.clone());
        self.bindings.insert(path, binding.clone());
        Ok(Some(binding))
    }

    /// Freeze the registry, deciding association exposure for every pair
    pub fn build(self) -> Result<MetadataRegistry, ConfigurationError> {
        for (capability, concrete) in &self.type_mappings {
            if !self.entities.contains_key(concrete) {
                return Err(ConfigurationError::UnknownEntityType {
                    referenced_by: format!("type mapping '{}'", capability),
                    entity_type: concrete.clone(),
                });
            }
        }

        let associations =
            AssociationRegistry::build(&self.entities, &self.paths_by_type, &self.type_mappings)?;

        Ok(MetadataRegistry {
            entities: self.entities,
            bindings: self.bindings,
            paths_by_type: self.paths_by_type,
            associations,
        })
    }
}

/// Immutable registry of entity types and exposed repositories
#[derive(Debug)]
pub struct MetadataRegistry {
    entities: IndexMap<String, Arc<EntityDescriptor>>,
    bindings: IndexMap<String, Arc<RepositoryBinding>>,
    paths_by_type: HashMap<String, String>,
    associations: AssociationRegistry,
}

impl MetadataRegistry {
    pub fn builder(config: &ExposureConfig) -> MetadataRegistryBuilder {
        MetadataRegistryBuilder::new(config)
    }

    /// Binding exposed at a resource path segment
    pub fn resolve(&self, path: &str) -> Option<&Arc<RepositoryBinding>> {
        self.bindings.get(path)
    }

    /// Binding of an entity type, if the type is exposed
    pub fn binding_for_type(&self, entity_type: &str) -> Option<&Arc<RepositoryBinding>> {
        self.paths_by_type
            .get(entity_type)
            .and_then(|path| self.bindings.get(path))
    }

    /// Whether an operation is exposed for a binding
    ///
    /// Declaration-level switches and method-level overrides are folded into
    /// one set at registration, so this is the only visibility check.
    pub fn is_exposed(&self, binding: &RepositoryBinding, operation: Operation) -> bool {
        binding.operations.contains(operation)
    }

    pub fn entity(&self, entity_type: &str) -> Option<&Arc<EntityDescriptor>> {
        self.entities.get(entity_type)
    }

    pub fn association(&self, source_type: &str, name: &str) -> Option<&AssociationExposure> {
        self.associations.resolve(source_type, name)
    }

    /// Exposed bindings in registration order
    pub fn bindings(&self) -> impl Iterator<Item = &Arc<RepositoryBinding>> {
        self.bindings.values()
    }
}

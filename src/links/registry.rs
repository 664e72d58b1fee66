//! Association exposure table
//!
//! Decides, once per (source type, association) pair, whether an association
//! is rendered as a link to the target's resource or embedded inline. The
//! decision is made while the metadata registry is built and never changes
//! afterwards.

use crate::core::entity::{AssociationTarget, Cardinality, EntityDescriptor};
use crate::core::error::ConfigurationError;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// How an association is exposed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationExposure {
    /// Rendered as a link; the target type has a repository binding
    Link {
        target_type: String,
        target_path: String,
        cardinality: Cardinality,
    },

    /// Rendered inline. `concrete_type` is `None` for an abstract capability
    /// without a type mapping.
    Embedded {
        concrete_type: Option<String>,
        cardinality: Cardinality,
    },
}

impl AssociationExposure {
    pub fn is_link(&self) -> bool {
        matches!(self, AssociationExposure::Link { .. })
    }
}

/// Registry for resolving (source type, association) to its exposure
#[derive(Debug, Default)]
pub struct AssociationRegistry {
    /// Maps (source_type, association_name) -> exposure
    routes: HashMap<(String, String), AssociationExposure>,
}

impl AssociationRegistry {
    /// Build the table for every association of every known entity type
    ///
    /// * `entities` - all known entity types by type name
    /// * `bound_paths` - resource path of each entity type that has a binding
    /// * `type_mappings` - abstract capability -> concrete type
    pub fn build(
        entities: &IndexMap<String, Arc<EntityDescriptor>>,
        bound_paths: &HashMap<String, String>,
        type_mappings: &IndexMap<String, String>,
    ) -> Result<Self, ConfigurationError> {
        let mut routes = HashMap::new();

        for (source_type, descriptor) in entities {
            for association in descriptor.associations() {
                let concrete = match &association.target {
                    AssociationTarget::Concrete(target) => Some(target.clone()),
                    AssociationTarget::Abstract(capability) => type_mappings.get(capability).cloned(),
                };

                if let Some(target) = &concrete
                    && !entities.contains_key(target)
                {
                    return Err(ConfigurationError::UnknownEntityType {
                        referenced_by: format!("{}.{}", source_type, association.name),
                        entity_type: target.clone(),
                    });
                }

                let exposure = match concrete
                    .as_ref()
                    .and_then(|t| bound_paths.get(t).map(|p| (t, p)))
                {
                    Some((target_type, target_path)) => AssociationExposure::Link {
                        target_type: target_type.clone(),
                        target_path: target_path.clone(),
                        cardinality: association.cardinality,
                    },
                    None => AssociationExposure::Embedded {
                        concrete_type: concrete,
                        cardinality: association.cardinality,
                    },
                };

                routes.insert((source_type.clone(), association.name.clone()), exposure);
            }
        }

        Ok(Self { routes })
    }

    /// Resolve the exposure of an association
    pub fn resolve(&self, source_type: &str, association: &str) -> Option<&AssociationExposure> {
        self.routes
            .get(&(source_type.to_string(), association.to_string()))
    }
}

//! Module system: bundles of declarations registered together

use crate::core::entity::EntityDescriptor;
use crate::core::projection::ProjectionDescriptor;
use crate::core::repository::RepositoryDeclaration;

/// A group of entity, repository and projection declarations
///
/// Modules let an application split its domain into units that each register
/// their own descriptors with the [`ServerBuilder`](crate::server::ServerBuilder).
pub trait Module: Send + Sync {
    /// Unique module name
    fn name(&self) -> &str;

    /// Module version
    fn version(&self) -> &str {
        "1.0.0"
    }

    /// Repository declarations owned by this module
    fn repositories(&self) -> Vec<RepositoryDeclaration>;

    /// Repository-less entity types, such as embeddable value types
    fn entities(&self) -> Vec<EntityDescriptor> {
        Vec::new()
    }

    /// Projections over this module's entity types
    fn projections(&self) -> Vec<ProjectionDescriptor> {
        Vec::new()
    }
}

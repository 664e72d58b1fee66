//! Server host for transport-agnostic API exposure
//!
//! `ServerHost` holds every piece of state the request handler needs: the
//! configuration, the immutable registries, the link builder and the external
//! collaborators. It is built once by the `ServerBuilder` and shared behind an
//! `Arc`; nothing in it is mutated while requests are served.

use crate::config::ExposureConfig;
use crate::core::auth::{AccessPolicy, PrincipalExtractor};
use crate::core::service::RepositoryService;
use crate::links::LinkBuilder;
use crate::server::entity_registry::MetadataRegistry;
use crate::server::projection_registry::ProjectionRegistry;
use crate::server::serializer::Serializer;
use std::sync::Arc;

/// Host context containing all framework state
///
/// # Example
///
/// ```rust,ignore
/// let host = Arc::new(builder.build_host()?);
/// let app = RestExposure::build_router(host, vec![])?;
/// ```
pub struct ServerHost {
    /// Validated, normalized configuration
    pub config: Arc<ExposureConfig>,

    /// Entity types and exposed repositories
    pub metadata: Arc<MetadataRegistry>,

    /// Named projections per entity type
    pub projections: Arc<ProjectionRegistry>,

    /// Persistence collaborator
    pub repository_service: Arc<dyn RepositoryService>,

    /// Optional policy collaborator; absent means every operation is allowed
    pub access_policy: Option<Arc<dyn AccessPolicy>>,

    /// Reads the calling principal from request headers
    pub principal_extractor: Arc<dyn PrincipalExtractor>,

    /// Link construction rooted at the configured base path
    pub links: LinkBuilder,
}

impl ServerHost {
    /// Build the host from builder components
    pub fn from_builder_components(
        config: ExposureConfig,
        metadata: MetadataRegistry,
        projections: ProjectionRegistry,
        repository_service: Arc<dyn RepositoryService>,
        access_policy: Option<Arc<dyn AccessPolicy>>,
        principal_extractor: Arc<dyn PrincipalExtractor>,
    ) -> Self {
        let links = LinkBuilder::new(config.base_path.clone());
        Self {
            config: Arc::new(config),
            metadata: Arc::new(metadata),
            projections: Arc::new(projections),
            repository_service,
            access_policy,
            principal_extractor,
            links,
        }
    }

    /// Serializer reading this host's registries
    pub fn serializer(&self) -> Serializer<'_> {
        Serializer::new(&self.config, &self.metadata, &self.projections, &self.links)
    }
}

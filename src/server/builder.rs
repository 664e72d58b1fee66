//! ServerBuilder for fluent API to build HTTP servers

use super::entity_registry::MetadataRegistry;
use super::exposure::RestExposure;
use super::host::ServerHost;
use super::projection_registry::ProjectionRegistry;
use crate::config::ExposureConfig;
use crate::core::auth::{AccessPolicy, HeaderPrincipalExtractor, PrincipalExtractor, RuleBasedPolicy};
use crate::core::entity::EntityDescriptor;
use crate::core::error::ConfigurationError;
use crate::core::module::Module;
use crate::core::projection::ProjectionDescriptor;
use crate::core::repository::RepositoryDeclaration;
use crate::core::service::RepositoryService;
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Builder for creating HTTP servers exposing repositories
///
/// # Example
///
/// ```ignore
/// let app = ServerBuilder::new()
///     .with_config(ExposureConfig::default().with_base_path("/api"))
///     .with_repository_service(InMemoryRepositoryService::new())
///     .register_module(PeopleModule)
///     .build()?;
/// ```
pub struct ServerBuilder {
    config: ExposureConfig,
    repository_service: Option<Arc<dyn RepositoryService>>,
    entities: Vec<EntityDescriptor>,
    repositories: Vec<RepositoryDeclaration>,
    projections: Vec<ProjectionDescriptor>,
    modules: Vec<Arc<dyn Module>>,
    access_policy: Option<Arc<dyn AccessPolicy>>,
    principal_extractor: Arc<dyn PrincipalExtractor>,
    custom_routes: Vec<Router>,
}

impl ServerBuilder {
    /// Create a new ServerBuilder
    pub fn new() -> Self {
        Self {
            config: ExposureConfig::default(),
            repository_service: None,
            entities: Vec::new(),
            repositories: Vec::new(),
            projections: Vec::new(),
            modules: Vec::new(),
            access_policy: None,
            principal_extractor: Arc::new(HeaderPrincipalExtractor),
            custom_routes: Vec::new(),
        }
    }

    /// Set the process-wide exposure configuration
    pub fn with_config(mut self, config: ExposureConfig) -> Self {
        self.config = config;
        self
    }

    /// Load the exposure configuration from a YAML file
    pub fn with_config_file(self, path: &str) -> Result<Self> {
        let config = ExposureConfig::from_yaml_file(path)?;
        Ok(self.with_config(config))
    }

    /// Set the persistence collaborator (required)
    pub fn with_repository_service(mut self, service: impl RepositoryService + 'static) -> Self {
        self.repository_service = Some(Arc::new(service));
        self
    }

    /// Set an already shared persistence collaborator
    pub fn with_shared_repository_service(mut self, service: Arc<dyn RepositoryService>) -> Self {
        self.repository_service = Some(service);
        self
    }

    /// Register a repository-less entity type (e.g. an embeddable value type)
    pub fn register_entity(mut self, entity: EntityDescriptor) -> Self {
        self.entities.push(entity);
        self
    }

    /// Register a repository declaration
    pub fn register_repository(mut self, declaration: RepositoryDeclaration) -> Self {
        self.repositories.push(declaration);
        self
    }

    /// Register a projection
    pub fn register_projection(mut self, projection: ProjectionDescriptor) -> Self {
        self.projections.push(projection);
        self
    }

    /// Register a module
    ///
    /// Its entities, repositories and projections are registered together
    /// when the host is built.
    pub fn register_module(mut self, module: impl Module + 'static) -> Self {
        let module = Arc::new(module);
        tracing::debug!(module = %module.name(), version = %module.version(), "Module registered");
        self.modules.push(module);
        self
    }

    /// Set the policy collaborator
    ///
    /// Without one, `access_rules` from the configuration are used; with
    /// neither, every operation is allowed.
    pub fn with_access_policy(mut self, policy: impl AccessPolicy + 'static) -> Self {
        self.access_policy = Some(Arc::new(policy));
        self
    }

    /// Replace the header-based principal extractor
    pub fn with_principal_extractor(mut self, extractor: impl PrincipalExtractor + 'static) -> Self {
        self.principal_extractor = Arc::new(extractor);
        self
    }

    /// Add custom routes to the server
    ///
    /// Use this for endpoints outside the exposed repositories, such as
    /// authentication or webhooks. Custom routes take precedence over
    /// resource paths.
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Build the transport-agnostic host
    ///
    /// Every declaration is validated here; the first configuration error
    /// aborts startup.
    pub fn build_host(mut self) -> Result<ServerHost> {
        let config = self.config.normalized();
        config.validate()?;

        let repository_service = self.repository_service.take().ok_or_else(|| {
            anyhow::anyhow!("RepositoryService is required. Call .with_repository_service()")
        })?;

        let mut entities = std::mem::take(&mut self.entities);
        let mut repositories = std::mem::take(&mut self.repositories);
        let mut projections = std::mem::take(&mut self.projections);
        for module in &self.modules {
            entities.extend(module.entities());
            repositories.extend(module.repositories());
            projections.extend(module.projections());
        }

        let mut metadata = MetadataRegistry::builder(&config);
        for entity in entities {
            metadata.register_entity(entity)?;
        }
        for declaration in repositories {
            metadata.register(declaration)?;
        }
        let metadata = metadata.build()?;

        let mut projection_registry = ProjectionRegistry::new();
        for projection in projections {
            let entity = metadata.entity(&projection.source_type).ok_or_else(|| {
                ConfigurationError::UnknownEntityType {
                    referenced_by: format!("projection '{}'", projection.name),
                    entity_type: projection.source_type.clone(),
                }
            })?;
            projection_registry.register(projection, entity)?;
        }
        projection_registry.validate_excerpts(&metadata)?;

        let access_policy = match self.access_policy.take() {
            Some(policy) => Some(policy),
            None if !config.access_rules.is_empty() => {
                Some(Arc::new(RuleBasedPolicy::from_rules(&config.access_rules))
                    as Arc<dyn AccessPolicy>)
            }
            None => None,
        };

        tracing::info!(
            base_path = %config.base_path,
            repositories = metadata.bindings().count(),
            strategy = ?config.detection_strategy,
            "Exposure host built"
        );

        Ok(ServerHost::from_builder_components(
            config,
            metadata,
            projection_registry,
            repository_service,
            access_policy,
            self.principal_extractor.clone(),
        ))
    }

    /// Build the final REST router
    pub fn build(mut self) -> Result<Router> {
        let custom_routes = std::mem::take(&mut self.custom_routes);
        let host = Arc::new(self.build_host()?);
        RestExposure::build_router(host, custom_routes)
    }

    /// Serve the application with graceful shutdown
    ///
    /// This will:
    /// - Bind to the provided address
    /// - Start serving requests
    /// - Handle SIGTERM and SIGINT (Ctrl+C) for graceful shutdown
    ///
    /// # Example
    ///
    /// ```ignore
    /// ServerBuilder::new()
    ///     .with_repository_service(service)
    ///     .register_module(module)
    ///     .serve("127.0.0.1:3000").await?;
    /// ```
    pub async fn serve(self, addr: &str) -> Result<()> {
        let app = self.build()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}

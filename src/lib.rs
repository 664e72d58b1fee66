//! # halrest
//!
//! Expose entity repositories as hypermedia (HAL) REST resources, driven by
//! descriptor tables instead of per-endpoint handlers.
//!
//! ## Features
//!
//! - **Descriptor-Driven**: Entities, repositories and projections are plain data
//! - **HAL Representations**: `_links`, `_embedded` and page metadata on every response
//! - **Detection Strategies**: Decide which repositories are exposed (ALL, DEFAULT, VISIBILITY, ANNOTATED)
//! - **Association Links**: Link-exposed or inlined associations, abstract types via type mappings
//! - **Projections**: Named field subsets with templated derived fields
//! - **Search Methods**: Repository queries exposed under `/{path}/search/{rel}`
//! - **Optimistic Locking**: ETag / If-Match on versioned entities
//! - **Pluggable Storage**: Any [`RepositoryService`](core::service::RepositoryService) implementation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use halrest::prelude::*;
//!
//! let person = EntityDescriptor::new("Person")
//!     .id("id", FieldType::Integer)
//!     .field("firstName", FieldType::String)
//!     .nullable_field("lastName", FieldType::String);
//!
//! let app = ServerBuilder::new()
//!     .with_config(ExposureConfig::default().with_base_path("/api"))
//!     .with_repository_service(InMemoryRepositoryService::new())
//!     .register_repository(RepositoryDeclaration::new("PersonRepository", person).paging())
//!     .build()?;
//!
//! // GET /api/persons -> HAL collection under _embedded.persons
//! ```

pub mod config;
pub mod core;
pub mod links;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Metadata ===
    pub use crate::core::{
        entity::{AssociationDescriptor, AssociationTarget, Cardinality, EntityDescriptor, Property, Record},
        field::{EntityId, FieldType},
        module::Module,
        pluralize::Pluralizer,
        projection::{ProjectedField, ProjectionDescriptor},
        repository::{
            DeclarationVisibility, Operation, OperationSet, RepositoryBinding,
            RepositoryDeclaration, RepositoryMethod, ReturnShape, SearchMethodDescriptor,
        },
    };

    // === Collaborators ===
    pub use crate::core::{
        auth::{
            AccessPolicy, AuthPolicy, HeaderPrincipalExtractor, Principal, PrincipalExtractor,
            RuleBasedPolicy,
        },
        query::{Page, PageRequest, SortOrder},
        service::{Listing, RepositoryService, SearchArguments, SearchResult, StoreError},
    };

    // === Errors ===
    pub use crate::core::error::{ConfigurationError, ExposureError};

    // === Links ===
    pub use crate::links::{AssociationExposure, Link, Links};

    // === Storage ===
    pub use crate::storage::InMemoryRepositoryService;

    // === Config ===
    pub use crate::config::{AccessRule, DetectionStrategy, ExposureConfig};

    // === Server ===
    pub use crate::server::{ResourceHandler, ResourceRequest, ServerBuilder, ServerHost};

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use serde_json::{Value, json};

    // === Axum ===
    pub use axum::{
        Router,
        extract::{Path, State},
        http::HeaderMap,
        routing::{delete, get, post, put},
    };
}

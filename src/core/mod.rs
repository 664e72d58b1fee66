//! Core module containing the metadata model and the collaborator contracts

pub mod auth;
pub mod entity;
pub mod error;
pub mod field;
pub mod module;
pub mod pluralize;
pub mod projection;
pub mod query;
pub mod repository;
pub mod service;

pub use auth::{
    AccessPolicy, AuthPolicy, HeaderPrincipalExtractor, Principal, PrincipalExtractor,
    RuleBasedPolicy,
};
pub use entity::{AssociationDescriptor, AssociationTarget, Cardinality, EntityDescriptor, Property, Record};
pub use error::{ConfigurationError, DeserializationError, ErrorResponse, ExposureError, NotFoundError};
pub use field::{EntityId, FieldDescriptor, FieldType};
pub use module::Module;
pub use pluralize::Pluralizer;
pub use projection::{ProjectedField, ProjectionDescriptor};
pub use query::{Direction, Page, PageMetadata, PageRequest, SortOrder};
pub use repository::{
    Operation, OperationSet, RepositoryBinding, RepositoryDeclaration, RepositoryMethod,
    ReturnShape, SearchMethodDescriptor,
};
pub use service::{Listing, RepositoryService, SearchArguments, SearchResult, StoreError};

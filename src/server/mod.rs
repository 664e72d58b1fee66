//! Server module for building the HAL resource server
//!
//! This module provides a `ServerBuilder` that:
//! - Resolves repository declarations into exposed bindings
//! - Compiles projections and association exposure
//! - Routes every request under the base path through the resource handler

pub mod builder;
pub mod entity_registry;
pub mod exposure;
pub mod handler;
pub mod host;
pub mod projection_registry;
pub mod router;
pub mod serializer;

pub use builder::ServerBuilder;
pub use entity_registry::{MetadataRegistry, MetadataRegistryBuilder};
pub use exposure::RestExposure;
pub use handler::{HAL_JSON, ResourceHandler, ResourceRequest, ResourceResponse, Target};
pub use host::ServerHost;
pub use projection_registry::ProjectionRegistry;
pub use serializer::{PayloadMode, Representation, Serializer};

//! Storage implementations of the persistence collaborator

pub mod in_memory;
pub mod query_method;

pub use in_memory::InMemoryRepositoryService;
pub use query_method::{QueryMethod, QueryMethodError};

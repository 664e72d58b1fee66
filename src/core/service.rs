//! Persistence collaborator contract
//!
//! The framework never stores anything itself. Every read and write goes
//! through a [`RepositoryService`], which receives the binding it acts on so a
//! single implementation can serve all exposed repositories.

use crate::core::entity::Record;
use crate::core::field::EntityId;
use crate::core::query::{Page, PageRequest};
use crate::core::repository::{RepositoryBinding, SearchMethodDescriptor};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

/// Errors reported by the persistence collaborator
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{resource} with id '{id}' not found")]
    NotFound { resource: String, id: String },

    /// Optimistic-lock violation or other concurrent write conflict
    #[error("{message}")]
    Conflict { message: String },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Result of a collection read
#[derive(Debug, Clone, PartialEq)]
pub enum Listing {
    Items(Vec<Record>),
    Page(Page<Record>),
}

/// Result of a search method invocation
#[derive(Debug, Clone, PartialEq)]
pub enum SearchResult {
    Single(Option<Record>),
    Items(Vec<Record>),
    Page(Page<Record>),
}

/// Search arguments bound by parameter name, in declaration order
pub type SearchArguments = IndexMap<String, Value>;

/// Service trait implemented by the persistence collaborator
///
/// Implementations may be backed by any storage. The framework issues at most
/// one write call per request and never retries.
#[async_trait]
pub trait RepositoryService: Send + Sync {
    /// Find a single entity by identifier
    async fn find(
        &self,
        binding: &RepositoryBinding,
        id: &EntityId,
    ) -> Result<Option<Record>, StoreError>;

    /// List entities, paged when a page request is supplied
    async fn list(
        &self,
        binding: &RepositoryBinding,
        page: Option<&PageRequest>,
    ) -> Result<Listing, StoreError>;

    /// Invoke a declared search method with bound arguments
    async fn invoke_search(
        &self,
        binding: &RepositoryBinding,
        method: &SearchMethodDescriptor,
        arguments: &SearchArguments,
        page: Option<&PageRequest>,
    ) -> Result<SearchResult, StoreError>;

    /// Persist a new entity; an identifier already set on the record is kept
    async fn create(&self, binding: &RepositoryBinding, record: Record)
    -> Result<Record, StoreError>;

    /// Replace an existing entity
    ///
    /// `expected_version` carries the client's `If-Match` value; a mismatch
    /// must be reported as [`StoreError::Conflict`].
    async fn update(
        &self,
        binding: &RepositoryBinding,
        id: &EntityId,
        record: Record,
        expected_version: Option<i64>,
    ) -> Result<Record, StoreError>;

    /// Delete an entity by identifier
    async fn delete(&self, binding: &RepositoryBinding, id: &EntityId) -> Result<(), StoreError>;
}

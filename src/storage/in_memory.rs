//! In-memory implementation of RepositoryService for testing and development

use crate::core::entity::{EntityDescriptor, Record};
use crate::core::field::{EntityId, FieldType};
use crate::core::query::{Direction, Page, PageRequest, SortOrder, compare_values};
use crate::core::repository::{RepositoryBinding, ReturnShape, SearchMethodDescriptor};
use crate::core::service::{Listing, RepositoryService, SearchArguments, SearchResult, StoreError};
use crate::storage::query_method::QueryMethod;
use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Store {
    records: BTreeMap<EntityId, Record>,
    last_id: i64,
}

/// In-memory repository service implementation
///
/// Keeps one store per entity type, so a single instance serves every
/// binding. Writes are serialized behind an `RwLock`; entities with a version
/// field get optimistic locking.
#[derive(Clone, Default)]
pub struct InMemoryRepositoryService {
    stores: Arc<RwLock<HashMap<String, Store>>>,
}

impl InMemoryRepositoryService {
    /// Create a new in-memory repository service
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record of `entity`, generating its identifier when missing
    pub fn insert(&self, entity: &EntityDescriptor, mut record: Record) -> Result<Record, StoreError> {
        let id_field = entity
            .id_field()
            .ok_or_else(|| anyhow!("{} has no identifier field", entity.type_name()))?;

        let mut stores = self
            .stores
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;
        let store = stores.entry(entity.type_name().to_string()).or_default();

        let id = match entity.id_of(&record) {
            Some(id) => id,
            None => generate_id(store, id_field.field_type)?,
        };
        if store.records.contains_key(&id) {
            return Err(StoreError::Conflict {
                message: format!("{} with id '{}' already exists", entity.type_name(), id),
            });
        }
        if let EntityId::Integer(n) = id {
            store.last_id = store.last_id.max(n);
        }

        record.set_scalar(id_field.name.clone(), id.to_value());
        if let Some(version) = entity.version_field() {
            record.set_scalar(version, 0);
        }
        store.records.insert(id, record.clone());
        Ok(record)
    }

    /// Number of stored records of an entity type
    pub fn count(&self, entity_type: &str) -> Result<usize, StoreError> {
        let stores = self
            .stores
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;
        Ok(stores.get(entity_type).map_or(0, |s| s.records.len()))
    }

    fn snapshot(&self, binding: &RepositoryBinding) -> Result<Vec<Record>, StoreError> {
        let stores = self
            .stores
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;
        Ok(stores
            .get(binding.entity_type())
            .map(|s| s.records.values().cloned().collect())
            .unwrap_or_default())
    }
}

fn generate_id(store: &mut Store, id_type: FieldType) -> Result<EntityId, StoreError> {
    let id = match id_type {
        FieldType::Integer => {
            store.last_id = store
                .last_id
                .checked_add(1)
                .ok_or_else(|| anyhow!("identifier space exhausted"))?;
            EntityId::Integer(store.last_id)
        }
        FieldType::Uuid => EntityId::Uuid(Uuid::new_v4()),
        _ => EntityId::Text(Uuid::new_v4().to_string()),
    };
    Ok(id)
}

fn sort_records(records: &mut [Record], orders: &[SortOrder]) {
    if orders.is_empty() {
        return;
    }
    records.sort_by(|a, b| {
        for order in orders {
            let left = a.scalar(&order.property).unwrap_or(&Value::Null);
            let right = b.scalar(&order.property).unwrap_or(&Value::Null);
            let ordering = match order.direction {
                Direction::Asc => compare_values(left, right),
                Direction::Desc => compare_values(right, left),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn paged(mut records: Vec<Record>, page: &PageRequest) -> Page<Record> {
    sort_records(&mut records, &page.sort);
    Page::from_all(records, page.clone())
}

#[async_trait]
impl RepositoryService for InMemoryRepositoryService {
    async fn find(
        &self,
        binding: &RepositoryBinding,
        id: &EntityId,
    ) -> Result<Option<Record>, StoreError> {
        let stores = self
            .stores
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        Ok(stores
            .get(binding.entity_type())
            .and_then(|s| s.records.get(id))
            .cloned())
    }

    async fn list(
        &self,
        binding: &RepositoryBinding,
        page: Option<&PageRequest>,
    ) -> Result<Listing, StoreError> {
        let records = self.snapshot(binding)?;
        Ok(match page {
            Some(page) => Listing::Page(paged(records, page)),
            None => Listing::Items(records),
        })
    }

    async fn invoke_search(
        &self,
        binding: &RepositoryBinding,
        method: &SearchMethodDescriptor,
        arguments: &SearchArguments,
        page: Option<&PageRequest>,
    ) -> Result<SearchResult, StoreError> {
        let query = QueryMethod::parse(&method.method_name).map_err(anyhow::Error::from)?;
        let bound: Vec<Option<&Value>> = method
            .parameters
            .iter()
            .map(|p| arguments.get(&p.name))
            .collect();

        let matching: Vec<Record> = self
            .snapshot(binding)?
            .into_iter()
            .filter(|record| query.matches(record, &bound))
            .collect();

        Ok(match (method.return_shape, page) {
            (ReturnShape::Single, _) => SearchResult::Single(matching.into_iter().next()),
            (_, Some(page)) => SearchResult::Page(paged(matching, page)),
            (_, None) => SearchResult::Items(matching),
        })
    }

    async fn create(&self, binding: &RepositoryBinding, record: Record) -> Result<Record, StoreError> {
        self.insert(&binding.entity, record)
    }

    async fn update(
        &self,
        binding: &RepositoryBinding,
        id: &EntityId,
        mut record: Record,
        expected_version: Option<i64>,
    ) -> Result<Record, StoreError> {
        let entity = &binding.entity;
        let mut stores = self
            .stores
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        let existing = stores
            .get_mut(entity.type_name())
            .and_then(|s| s.records.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                resource: binding.path.clone(),
                id: id.to_string(),
            })?;

        if let Some(version_field) = entity.version_field() {
            let current = entity.version_of(existing).unwrap_or(0);
            if let Some(expected) = expected_version
                && expected != current
            {
                return Err(StoreError::Conflict {
                    message: format!(
                        "{} '{}' is at version {}, not {}",
                        entity.type_name(),
                        id,
                        current,
                        expected
                    ),
                });
            }
            record.set_scalar(version_field, current + 1);
        }
        if let Some(id_field) = entity.id_field() {
            record.set_scalar(id_field.name.clone(), id.to_value());
        }

        *existing = record.clone();
        Ok(record)
    }

    async fn delete(&self, binding: &RepositoryBinding, id: &EntityId) -> Result<(), StoreError> {
        let mut stores = self
            .stores
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        stores
            .get_mut(binding.entity_type())
            .and_then(|s| s.records.remove(id))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                resource: binding.path.clone(),
                id: id.to_string(),
            })
    }
}

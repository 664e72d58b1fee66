//! Repository declarations and the bindings derived from them
//!
//! A [`RepositoryDeclaration`] is what an application writes down: the entity
//! it manages, an optional path override, exported flags and search methods.
//! The metadata registry turns each exposed declaration into an immutable
//! [`RepositoryBinding`] that the request handler consults.

use crate::core::entity::EntityDescriptor;
use crate::core::field::FieldType;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Resource-level operation guarded by visibility and policy checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ReadCollection,
    ReadItem,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::ReadCollection,
        Operation::ReadItem,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
    ];

    /// Key used for this operation in configuration files
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::ReadCollection => "read_collection",
            Operation::ReadItem => "read_item",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of enabled operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSet {
    bits: u8,
}

impl OperationSet {
    pub fn all() -> Self {
        Self { bits: 0b1_1111 }
    }

    pub fn none() -> Self {
        Self { bits: 0 }
    }

    fn bit(op: Operation) -> u8 {
        match op {
            Operation::ReadCollection => 1,
            Operation::ReadItem => 1 << 1,
            Operation::Create => 1 << 2,
            Operation::Update => 1 << 3,
            Operation::Delete => 1 << 4,
        }
    }

    pub fn contains(&self, op: Operation) -> bool {
        self.bits & Self::bit(op) != 0
    }

    pub fn set(&mut self, op: Operation, enabled: bool) {
        if enabled {
            self.bits |= Self::bit(op);
        } else {
            self.bits &= !Self::bit(op);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Operation> + '_ {
        Operation::ALL.into_iter().filter(|op| self.contains(*op))
    }
}

impl Default for OperationSet {
    fn default() -> Self {
        Self::all()
    }
}

/// Built-in repository method that an export override can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryMethod {
    FindAll,
    FindById,
    Save,
    DeleteById,
}

impl RepositoryMethod {
    /// Operations served by this method
    pub fn operations(&self) -> &'static [Operation] {
        match self {
            RepositoryMethod::FindAll => &[Operation::ReadCollection],
            RepositoryMethod::FindById => &[Operation::ReadItem],
            RepositoryMethod::Save => &[Operation::Create, Operation::Update],
            RepositoryMethod::DeleteById => &[Operation::Delete],
        }
    }
}

/// Shape of a search method's result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnShape {
    Single,
    List,
    Page,
}

impl ReturnShape {
    pub fn is_collection(&self) -> bool {
        matches!(self, ReturnShape::List | ReturnShape::Page)
    }
}

/// Declared parameter of a search method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParameter {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
}

/// A query method declared on a repository and exposed under `/search`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchMethodDescriptor {
    /// Name of the method as invoked on the persistence collaborator
    pub method_name: String,

    /// Relation name, also the path segment after `/search/`
    pub rel: String,

    pub parameters: Vec<SearchParameter>,
    pub return_shape: ReturnShape,
    pub exported: bool,
}

impl SearchMethodDescriptor {
    /// New search method whose relation name defaults to the method name
    pub fn new(method_name: impl Into<String>, return_shape: ReturnShape) -> Self {
        let method_name = method_name.into();
        Self {
            rel: method_name.clone(),
            method_name,
            parameters: Vec::new(),
            return_shape,
            exported: true,
        }
    }

    pub fn rel(mut self, rel: impl Into<String>) -> Self {
        self.rel = rel.into();
        self
    }

    pub fn param(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.parameters.push(SearchParameter {
            name: name.into(),
            field_type,
            required: true,
        });
        self
    }

    pub fn optional_param(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.parameters.push(SearchParameter {
            name: name.into(),
            field_type,
            required: false,
        });
        self
    }

    pub fn exported(mut self, exported: bool) -> Self {
        self.exported = exported;
        self
    }
}

/// Visibility of the repository declaration itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeclarationVisibility {
    #[default]
    Public,
    Private,
}

/// A repository as declared by the application
#[derive(Debug, Clone)]
pub struct RepositoryDeclaration {
    pub name: String,
    pub entity: EntityDescriptor,
    pub path: Option<String>,
    pub collection_rel: Option<String>,
    pub item_rel: Option<String>,

    /// Explicit export annotation; `None` means unannotated
    pub exported: Option<bool>,
    pub visibility: DeclarationVisibility,

    /// Whether the repository supports paging and sorting
    pub paging: bool,
    pub search_methods: Vec<SearchMethodDescriptor>,

    /// Declaration-level operation switches
    pub operations: OperationSet,

    /// Method-level export overrides
    pub method_exports: IndexMap<RepositoryMethod, bool>,

    /// Projection applied to items of collection responses
    pub excerpt_projection: Option<String>,
}

impl RepositoryDeclaration {
    pub fn new(name: impl Into<String>, entity: EntityDescriptor) -> Self {
        Self {
            name: name.into(),
            entity,
            path: None,
            collection_rel: None,
            item_rel: None,
            exported: None,
            visibility: DeclarationVisibility::Public,
            paging: false,
            search_methods: Vec::new(),
            operations: OperationSet::all(),
            method_exports: IndexMap::new(),
            excerpt_projection: None,
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn collection_rel(mut self, rel: impl Into<String>) -> Self {
        self.collection_rel = Some(rel.into());
        self
    }

    pub fn item_rel(mut self, rel: impl Into<String>) -> Self {
        self.item_rel = Some(rel.into());
        self
    }

    pub fn exported(mut self, exported: bool) -> Self {
        self.exported = Some(exported);
        self
    }

    pub fn private(mut self) -> Self {
        self.visibility = DeclarationVisibility::Private;
        self
    }

    pub fn paging(mut self) -> Self {
        self.paging = true;
        self
    }

    pub fn search(mut self, method: SearchMethodDescriptor) -> Self {
        self.search_methods.push(method);
        self
    }

    /// Switch a whole operation off (or back on) for this repository
    pub fn operation(mut self, op: Operation, enabled: bool) -> Self {
        self.operations.set(op, enabled);
        self
    }

    /// Override the export flag of a single repository method
    pub fn method_exported(mut self, method: RepositoryMethod, exported: bool) -> Self {
        self.method_exports.insert(method, exported);
        self
    }

    pub fn excerpt(mut self, projection: impl Into<String>) -> Self {
        self.excerpt_projection = Some(projection.into());
        self
    }

    /// Effective operation set: declaration switches and method overrides
    /// folded together
    pub fn effective_operations(&self) -> OperationSet {
        let mut ops = self.operations;
        for (method, exported) in &self.method_exports {
            if !exported {
                for op in method.operations() {
                    ops.set(*op, false);
                }
            }
        }
        ops
    }
}

/// An exposed repository, immutable after startup
#[derive(Debug, Clone)]
pub struct RepositoryBinding {
    pub name: String,
    pub entity: Arc<EntityDescriptor>,
    pub path: String,
    pub collection_rel: String,
    pub item_rel: String,
    pub paging: bool,
    pub search_methods: Vec<SearchMethodDescriptor>,
    pub operations: OperationSet,
    pub excerpt_projection: Option<String>,
}

impl RepositoryBinding {
    pub fn entity_type(&self) -> &str {
        self.entity.type_name()
    }

    pub fn find_search(&self, rel: &str) -> Option<&SearchMethodDescriptor> {
        self.search_methods.iter().find(|m| m.rel == rel)
    }

    pub fn has_search_methods(&self) -> bool {
        !self.search_methods.is_empty()
    }

    /// Identifier field type, every binding has one
    pub fn id_type(&self) -> FieldType {
        self.entity
            .id_field()
            .map(|f| f.field_type)
            .unwrap_or(FieldType::String)
    }
}

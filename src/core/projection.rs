//! Projection descriptors: named, restricted views of an entity type

/// One field exposed by a projection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectedField {
    /// A declared field or association of the source type, copied as-is
    Field(String),

    /// A value computed from source fields with a `tera` template,
    /// e.g. `"{{ firstName }} {{ lastName }}"`
    Derived { name: String, template: String },
}

impl ProjectedField {
    /// Name of the key in the projected representation
    pub fn name(&self) -> &str {
        match self {
            ProjectedField::Field(name) => name,
            ProjectedField::Derived { name, .. } => name,
        }
    }
}

/// A named projection over one source entity type
///
/// # Example
///
/// ```
/// use halrest::core::projection::ProjectionDescriptor;
///
/// let last_name = ProjectionDescriptor::new("last-name", "Person").field("lastName");
/// assert_eq!(last_name.field_names().collect::<Vec<_>>(), vec!["lastName"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionDescriptor {
    pub name: String,
    pub source_type: String,
    pub fields: Vec<ProjectedField>,
}

impl ProjectionDescriptor {
    pub fn new(name: impl Into<String>, source_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_type: source_type.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(ProjectedField::Field(name.into()));
        self
    }

    pub fn derived(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.fields.push(ProjectedField::Derived {
            name: name.into(),
            template: template.into(),
        });
        self
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(ProjectedField::name)
    }

    pub fn selects(&self, name: &str) -> bool {
        self.fields
            .iter()
            .any(|f| matches!(f, ProjectedField::Field(n) if n == name))
    }
}

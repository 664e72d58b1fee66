//! People module: persons, the companies they work for, and their addresses

use halrest::prelude::*;

pub struct PeopleModule;

impl PeopleModule {
    pub fn person() -> EntityDescriptor {
        EntityDescriptor::new("Person")
            .id("id", FieldType::Integer)
            .version("version")
            .field("firstName", FieldType::String)
            .nullable_field("lastName", FieldType::String)
            .association(AssociationDescriptor::abstract_one("address", "Address"))
            .association(AssociationDescriptor::one("employer", "Company"))
    }

    pub fn company() -> EntityDescriptor {
        EntityDescriptor::new("Company")
            .id("id", FieldType::Integer)
            .field("name", FieldType::String)
    }

    /// Concrete type behind the `Address` capability
    pub fn base_address() -> EntityDescriptor {
        EntityDescriptor::new("BaseAddress")
            .field("street", FieldType::String)
            .nullable_field("city", FieldType::String)
    }
}

impl Module for PeopleModule {
    fn name(&self) -> &str {
        "people"
    }

    fn repositories(&self) -> Vec<RepositoryDeclaration> {
        vec![
            RepositoryDeclaration::new("PersonRepository", Self::person())
                .paging()
                .search(
                    SearchMethodDescriptor::new("findByFirstNameStartsWith", ReturnShape::Page)
                        .rel("nameStartsWith")
                        .param("name", FieldType::String),
                )
                .search(
                    SearchMethodDescriptor::new("findByLastName", ReturnShape::List)
                        .param("lastName", FieldType::String),
                )
                .excerpt("full-name"),
            RepositoryDeclaration::new("CompanyRepository", Self::company())
                .path("companies")
                .operation(Operation::Delete, false),
        ]
    }

    fn entities(&self) -> Vec<EntityDescriptor> {
        vec![Self::base_address()]
    }

    fn projections(&self) -> Vec<ProjectionDescriptor> {
        vec![
            ProjectionDescriptor::new("last-name", "Person").field("lastName"),
            ProjectionDescriptor::new("full-name", "Person")
                .derived("fullName", "{{ firstName }} {{ lastName }}")
                .field("employer"),
        ]
    }
}

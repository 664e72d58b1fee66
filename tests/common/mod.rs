//! Shared fixture for the HTTP-level tests
//!
//! A small people domain served under `/api`:
//! - `Person` (integer id, versioned) with a paging repository, two search
//!   methods and two projections
//! - `Company`, linked from `Person.employer`, delete not exposed
//! - `BaseAddress`, embedded through the `Address` type mapping

#![allow(dead_code)]

use axum_test::TestServer;
use halrest::prelude::*;

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

pub fn base_address() -> EntityDescriptor {
    EntityDescriptor::new("BaseAddress")
        .field("street", FieldType::String)
        .nullable_field("city", FieldType::String)
}

pub fn person_repository() -> RepositoryDeclaration {
    RepositoryDeclaration::new("PersonRepository", person())
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
        .search(
            SearchMethodDescriptor::new("findByFirstName", ReturnShape::Single)
                .rel("byFirstName")
                .param("firstName", FieldType::String),
        )
}

pub fn company_repository() -> RepositoryDeclaration {
    RepositoryDeclaration::new("CompanyRepository", company()).operation(Operation::Delete, false)
}

pub fn default_config() -> ExposureConfig {
    ExposureConfig::default()
        .with_base_path("/api")
        .with_type_mapping("Address", "BaseAddress")
}

pub fn builder(config: ExposureConfig, service: InMemoryRepositoryService) -> ServerBuilder {
    ServerBuilder::new()
        .with_config(config)
        .with_repository_service(service)
        .register_entity(base_address())
        .register_repository(person_repository())
        .register_repository(company_repository())
        .register_projection(ProjectionDescriptor::new("last-name", "Person").field("lastName"))
        .register_projection(
            ProjectionDescriptor::new("with-employer", "Person")
                .field("firstName")
                .field("employer")
                .derived("fullName", "{{ firstName }} {{ lastName }}"),
        )
}

pub fn server_with(config: ExposureConfig) -> (TestServer, InMemoryRepositoryService) {
    let service = InMemoryRepositoryService::new();
    let app = builder(config, service.clone())
        .build()
        .expect("Failed to build app");
    let server = TestServer::try_new(app).expect("Failed to create test server");
    (server, service)
}

pub fn create_test_server() -> (TestServer, InMemoryRepositoryService) {
    server_with(default_config())
}

/// Store a company directly, returning its id
pub fn seed_company(service: &InMemoryRepositoryService, name: &str) -> EntityId {
    let stored = service
        .insert(&company(), Record::new("Company").with("name", name))
        .expect("seed company");
    company().id_of(&stored).expect("company id")
}

/// Store a person directly, returning its id
pub fn seed_person(
    service: &InMemoryRepositoryService,
    first: &str,
    last: Option<&str>,
    employer: Option<&EntityId>,
) -> EntityId {
    let mut record = Record::new("Person")
        .with("firstName", first)
        .with("lastName", last)
        .with_property(
            "address",
            Property::Embedded(Box::new(
                Record::new("BaseAddress")
                    .with("street", "Bagshot Row")
                    .with("city", "Hobbiton"),
            )),
        );
    if let Some(employer) = employer {
        record = record.with_property("employer", Property::Reference(employer.clone()));
    }
    let stored = service.insert(&person(), record).expect("seed person");
    person().id_of(&stored).expect("person id")
}

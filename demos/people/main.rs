//! People Example
//!
//! Exposes two repositories as HAL resources:
//! - `/api/persons` with paging, two search methods and projections
//! - `/api/companies`, linked from each person's `employer`
//!
//! Addresses have no repository and are embedded inline through the
//! `Address -> BaseAddress` type mapping.

mod module;

use halrest::prelude::*;
use module::PeopleModule;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,halrest=debug")),
        )
        .init();

    let service = InMemoryRepositoryService::new();
    populate_test_data(&service)?;

    let config = ExposureConfig::default()
        .with_base_path("/api")
        .expose_ids_for("Company")
        .with_type_mapping("Address", "BaseAddress");

    println!("\n🌐 Server running on http://127.0.0.1:3000/api");
    println!("\n  GET    /api/persons?page=0&size=2&sort=firstName,desc");
    println!("  GET    /api/persons/1?projection=last-name");
    println!("  GET    /api/persons/1/employer");
    println!("  GET    /api/persons/search/nameStartsWith?name=Fr");
    println!("  POST   /api/persons      {{\"firstName\": \"Pippin\", \"employer\": \"/api/companies/1\"}}");
    println!("  PATCH  /api/persons/1    (If-Match: \"0\")");

    ServerBuilder::new()
        .with_config(config)
        .with_repository_service(service)
        .register_module(PeopleModule)
        .serve("127.0.0.1:3000")
        .await
}

fn populate_test_data(service: &InMemoryRepositoryService) -> Result<()> {
    let company = service.insert(
        &PeopleModule::company(),
        Record::new("Company").with("name", "Bag End Holdings"),
    )?;
    let company_id = PeopleModule::company()
        .id_of(&company)
        .ok_or_else(|| anyhow::anyhow!("company was stored without an id"))?;

    let people = [
        ("Frodo", Some("Baggins"), "Bagshot Row"),
        ("Samwise", Some("Gamgee"), "Bagshot Row"),
        ("Meriadoc", Some("Brandybuck"), "Brandy Hall"),
        ("Gandalf", None, "Unknown"),
    ];
    for (first, last, street) in people {
        let address = Record::new("BaseAddress")
            .with("street", street)
            .with("city", "Hobbiton");
        let person = Record::new("Person")
            .with("firstName", first)
            .with("lastName", last)
            .with_property("address", Property::Embedded(Box::new(address)))
            .with_property("employer", Property::Reference(company_id.clone()));
        service.insert(&PeopleModule::person(), person)?;
    }
    Ok(())
}

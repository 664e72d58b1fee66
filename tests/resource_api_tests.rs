//! End-to-end tests of the resource API: root, collections, items, writes
//! and associations.

mod common;

use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum_test::TestServer;
use common::*;
use halrest::prelude::*;
use serde_json::{Value, json};

fn if_match(version: &'static str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("if-match"),
        HeaderValue::from_static(version),
    )
}

// =============================================================================
// Health and Root
// =============================================================================

mod root_tests {
    use super::*;

    #[tokio::test]
    async fn test_health_endpoints() {
        let (server, _) = create_test_server();

        for path in ["/health", "/healthz"] {
            let response = server.get(path).await;
            response.assert_status_ok();
            let body: Value = response.json();
            assert_eq!(body["status"], "ok");
        }
    }

    #[tokio::test]
    async fn test_root_lists_collections() {
        let (server, _) = create_test_server();

        let response = server.get("/api").await;
        response.assert_status_ok();
        assert_eq!(response.header("content-type"), "application/hal+json");

        let body: Value = response.json();
        let links = &body["_links"];
        assert_eq!(links["persons"]["href"], "/api/persons{?page,size,sort}");
        assert_eq!(links["persons"]["templated"], true);
        assert_eq!(links["companies"]["href"], "/api/companies");
        assert_eq!(links["companies"]["templated"], false);
        assert_eq!(links["self"]["href"], "/api/");
    }

    #[tokio::test]
    async fn test_root_with_trailing_slash() {
        let (server, _) = create_test_server();
        server.get("/api/").await.assert_status_ok();
    }

    #[tokio::test]
    async fn test_post_to_root_not_allowed() {
        let (server, _) = create_test_server();
        let response = server.post("/api").json(&json!({})).await;
        response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_unknown_resource() {
        let (server, _) = create_test_server();
        let response = server.get("/api/dragons").await;
        response.assert_status_not_found();
        let body: Value = response.json();
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_custom_routes_take_precedence() {
        let custom = Router::new().route("/api/persons/stats", get(|| async { "custom" }));
        let app = builder(default_config(), InMemoryRepositoryService::new())
            .with_custom_routes(custom)
            .build()
            .expect("Failed to build app");
        let server = TestServer::try_new(app).expect("Failed to create test server");

        let response = server.get("/api/persons/stats").await;
        response.assert_status_ok();
        assert_eq!(response.text(), "custom");
    }
}

// =============================================================================
// Reads
// =============================================================================

mod read_tests {
    use super::*;

    #[tokio::test]
    async fn test_non_paging_collection() {
        let (server, service) = create_test_server();
        seed_company(&service, "Bag End Holdings");
        seed_company(&service, "Green Dragon Inn");

        let response = server.get("/api/companies").await;
        response.assert_status_ok();

        let body: Value = response.json();
        let items = body["_embedded"]["companies"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["name"], "Bag End Holdings");
        assert_eq!(items[0]["_links"]["self"]["href"], "/api/companies/1");
        assert_eq!(body["_links"]["self"]["href"], "/api/companies");
        assert!(body.get("page").is_none());
    }

    #[tokio::test]
    async fn test_empty_collection_still_has_relation() {
        let (server, _) = create_test_server();
        let body: Value = server.get("/api/companies").await.json();
        assert_eq!(body["_embedded"]["companies"], json!([]));
    }

    #[tokio::test]
    async fn test_item_representation() {
        let (server, service) = create_test_server();
        let company = seed_company(&service, "Bag End Holdings");
        let id = seed_person(&service, "Frodo", Some("Baggins"), Some(&company));

        let response = server.get(&format!("/api/persons/{}", id)).await;
        response.assert_status_ok();
        assert_eq!(response.header("etag"), "\"0\"");

        let body: Value = response.json();
        assert_eq!(body["firstName"], "Frodo");
        assert_eq!(body["lastName"], "Baggins");
        assert_eq!(body["address"]["street"], "Bagshot Row");
        assert!(body.get("id").is_none());
        assert!(body.get("version").is_none());
        assert!(body.get("employer").is_none());

        let links = &body["_links"];
        assert_eq!(links["self"]["href"], "/api/persons/1");
        assert_eq!(links["person"]["href"], "/api/persons/1{?projection}");
        assert_eq!(links["person"]["templated"], true);
        assert_eq!(links["employer"]["href"], "/api/persons/1/employer");
        assert!(links.get("address").is_none());
    }

    #[tokio::test]
    async fn test_exposed_identifier() {
        let (server, service) = server_with(default_config().expose_ids_for("Company"));
        seed_company(&service, "Bag End Holdings");

        let body: Value = server.get("/api/companies/1").await.json();
        assert_eq!(body["id"], 1);
        assert_eq!(body["name"], "Bag End Holdings");
    }

    #[tokio::test]
    async fn test_missing_item() {
        let (server, _) = create_test_server();
        let response = server.get("/api/persons/42").await;
        response.assert_status_not_found();
        let body: Value = response.json();
        assert_eq!(body["details"]["id"], "42");
    }

    #[tokio::test]
    async fn test_malformed_identifier() {
        let (server, _) = create_test_server();
        let response = server.get("/api/persons/frodo").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["code"], "MALFORMED_REQUEST");
    }

    #[tokio::test]
    async fn test_broken_percent_encoding() {
        let (server, _) = create_test_server();
        let response = server.get("/api/persons?page=%zz").await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_link_association() {
        let (server, service) = create_test_server();
        let company = seed_company(&service, "Bag End Holdings");
        seed_person(&service, "Frodo", None, Some(&company));

        let response = server.get("/api/persons/1/employer").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["name"], "Bag End Holdings");
        assert_eq!(body["_links"]["self"]["href"], "/api/companies/1");
    }

    #[tokio::test]
    async fn test_unset_and_embedded_associations_are_not_resources() {
        let (server, service) = create_test_server();
        seed_person(&service, "Frodo", None, None);

        server
            .get("/api/persons/1/employer")
            .await
            .assert_status_not_found();
        server
            .get("/api/persons/1/address")
            .await
            .assert_status_not_found();
    }
}

// =============================================================================
// Writes
// =============================================================================

mod write_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_person() {
        let (server, service) = create_test_server();
        seed_company(&service, "Bag End Holdings");

        let response = server
            .post("/api/persons")
            .json(&json!({
                "firstName": "Pippin",
                "lastName": "Took",
                "employer": "/api/companies/1",
                "address": { "street": "Great Smials" }
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        assert_eq!(response.header("location"), "/api/persons/1");
        assert_eq!(response.header("etag"), "\"0\"");

        let body: Value = response.json();
        assert_eq!(body["firstName"], "Pippin");
        assert_eq!(body["address"]["street"], "Great Smials");
        assert_eq!(body["address"]["city"], Value::Null);

        let employer: Value = server.get("/api/persons/1/employer").await.json();
        assert_eq!(employer["name"], "Bag End Holdings");
    }

    #[tokio::test]
    async fn test_create_accepts_absolute_reference() {
        let (server, service) = create_test_server();
        seed_company(&service, "Bag End Holdings");

        let response = server
            .post("/api/persons")
            .json(&json!({
                "firstName": "Merry",
                "employer": "http://localhost:8080/api/companies/1"
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        server
            .get("/api/persons/1/employer")
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn test_create_ignores_client_identifier() {
        let (server, _) = create_test_server();
        let response = server
            .post("/api/persons")
            .json(&json!({ "id": 99, "firstName": "Sam", "nickname": "Samwise" }))
            .await;
        response.assert_status(StatusCode::CREATED);
        assert_eq!(response.header("location"), "/api/persons/1");
    }

    #[tokio::test]
    async fn test_create_without_body_in_response() {
        let config = ExposureConfig {
            return_body_on_create: false,
            ..default_config()
        };
        let (server, _) = server_with(config);

        let response = server
            .post("/api/persons")
            .json(&json!({ "firstName": "Sam" }))
            .await;
        response.assert_status(StatusCode::CREATED);
        assert_eq!(response.header("location"), "/api/persons/1");
        assert!(response.text().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_payloads() {
        let (server, _) = create_test_server();

        let missing = server
            .post("/api/persons")
            .json(&json!({ "lastName": "Took" }))
            .await;
        missing.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = missing.json();
        assert_eq!(body["code"], "DESERIALIZATION_ERROR");

        let mismatch = server
            .post("/api/persons")
            .json(&json!({ "firstName": 42 }))
            .await;
        mismatch.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = mismatch.json();
        assert_eq!(body["details"]["field"], "firstName");

        server
            .post("/api/persons")
            .json(&json!([1, 2]))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let broken = server.post("/api/persons").text("{ not json").await;
        broken.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = broken.json();
        assert_eq!(body["code"], "MALFORMED_REQUEST");

        server
            .post("/api/persons")
            .json(&json!({ "firstName": "Sam", "employer": "/api/companies/oops" }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_abstract_type_without_mapping() {
        let (server, _) = server_with(ExposureConfig::default().with_base_path("/api"));

        let response = server
            .post("/api/persons")
            .json(&json!({ "firstName": "Frodo", "address": { "street": "Bagshot Row" } }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["details"]["type"], "Address");
    }

    #[tokio::test]
    async fn test_put_replaces_existing() {
        let (server, service) = create_test_server();
        seed_person(&service, "Frodo", Some("Baggins"), None);

        let response = server
            .put("/api/persons/1")
            .json(&json!({ "firstName": "Mr. Underhill" }))
            .await;
        response.assert_status_ok();
        assert_eq!(response.header("etag"), "\"1\"");

        let body: Value = response.json();
        assert_eq!(body["firstName"], "Mr. Underhill");
        assert_eq!(body["lastName"], Value::Null);
    }

    #[tokio::test]
    async fn test_put_creates_missing() {
        let (server, _) = create_test_server();

        let response = server
            .put("/api/persons/7")
            .json(&json!({ "firstName": "Bilbo" }))
            .await;
        response.assert_status(StatusCode::CREATED);
        assert_eq!(response.header("location"), "/api/persons/7");

        server.get("/api/persons/7").await.assert_status_ok();
    }

    #[tokio::test]
    async fn test_text_identifier_round_trips_through_path() {
        let tag = EntityDescriptor::new("Tag")
            .id("code", FieldType::String)
            .field("label", FieldType::String);
        let app = ServerBuilder::new()
            .with_config(ExposureConfig::default().with_base_path("/api").expose_ids_for("Tag"))
            .with_repository_service(InMemoryRepositoryService::new())
            .register_repository(RepositoryDeclaration::new("TagRepository", tag))
            .build()
            .expect("Failed to build app");
        let server = TestServer::try_new(app).expect("Failed to create test server");

        let response = server
            .put("/api/tags/bag%20end%2Fwest")
            .json(&json!({ "label": "Home" }))
            .await;
        response.assert_status(StatusCode::CREATED);
        assert_eq!(response.header("location"), "/api/tags/bag%20end%2Fwest");

        let body: Value = server.get("/api/tags/bag%20end%2Fwest").await.json();
        assert_eq!(body["code"], "bag end/west");
        assert_eq!(
            body["_links"]["self"]["href"],
            "/api/tags/bag%20end%2Fwest"
        );
    }

    #[tokio::test]
    async fn test_create_after_largest_identifier_fails_cleanly() {
        let (server, service) = create_test_server();

        server
            .put(&format!("/api/persons/{}", i64::MAX))
            .json(&json!({ "firstName": "Bilbo" }))
            .await
            .assert_status(StatusCode::CREATED);

        let response = server
            .post("/api/persons")
            .json(&json!({ "firstName": "Frodo" }))
            .await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json();
        assert_eq!(body["code"], "INTERNAL_ERROR");
        assert_eq!(service.count("Person").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_put_missing_without_create_exposed() {
        let app = ServerBuilder::new()
            .with_config(ExposureConfig::default().with_base_path("/api"))
            .with_repository_service(InMemoryRepositoryService::new())
            .register_repository(
                RepositoryDeclaration::new("CompanyRepository", company())
                    .operation(Operation::Create, false),
            )
            .build()
            .expect("Failed to build app");
        let server = TestServer::try_new(app).expect("Failed to create test server");

        server
            .put("/api/companies/3")
            .json(&json!({ "name": "Sackville-Baggins Ltd" }))
            .await
            .assert_status_not_found();
        server
            .post("/api/companies")
            .json(&json!({ "name": "Sackville-Baggins Ltd" }))
            .await
            .assert_status(StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_patch_merges_and_checks_version() {
        let (server, service) = create_test_server();
        seed_person(&service, "Frodo", Some("Baggins"), None);

        let (name, value) = if_match("\"0\"");
        let response = server
            .patch("/api/persons/1")
            .add_header(name, value)
            .json(&json!({ "lastName": "Underhill" }))
            .await;
        response.assert_status_ok();
        assert_eq!(response.header("etag"), "\"1\"");
        let body: Value = response.json();
        assert_eq!(body["firstName"], "Frodo");
        assert_eq!(body["lastName"], "Underhill");
        assert_eq!(body["address"]["city"], "Hobbiton");

        let (name, value) = if_match("\"0\"");
        let stale = server
            .patch("/api/persons/1")
            .add_header(name, value)
            .json(&json!({ "lastName": "Baggins" }))
            .await;
        stale.assert_status(StatusCode::CONFLICT);
        let body: Value = stale.json();
        assert_eq!(body["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn test_patch_cannot_null_required_field() {
        let (server, service) = create_test_server();
        seed_person(&service, "Frodo", None, None);

        server
            .patch("/api/persons/1")
            .json(&json!({ "firstName": null }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_without_body_in_response() {
        let config = ExposureConfig {
            return_body_on_update: false,
            ..default_config()
        };
        let (server, service) = server_with(config);
        seed_person(&service, "Frodo", None, None);

        let response = server
            .patch("/api/persons/1")
            .json(&json!({ "lastName": "Baggins" }))
            .await;
        response.assert_status(StatusCode::NO_CONTENT);
        assert_eq!(response.header("etag"), "\"1\"");
    }

    #[tokio::test]
    async fn test_delete() {
        let (server, service) = create_test_server();
        seed_person(&service, "Frodo", None, None);

        server
            .delete("/api/persons/1")
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server.get("/api/persons/1").await.assert_status_not_found();
        server
            .delete("/api/persons/1")
            .await
            .assert_status_not_found();
        assert_eq!(service.count("Person").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_method_level_export_denies_like_declaration_level() {
        let app = ServerBuilder::new()
            .with_config(ExposureConfig::default().with_base_path("/api"))
            .with_repository_service(InMemoryRepositoryService::new())
            .register_repository(
                RepositoryDeclaration::new("CompanyRepository", company())
                    .method_exported(RepositoryMethod::DeleteById, false)
                    .method_exported(RepositoryMethod::Save, false),
            )
            .build()
            .expect("Failed to build app");
        let server = TestServer::try_new(app).expect("Failed to create test server");

        let response = server.delete("/api/companies/1").await;
        response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
        let body: Value = response.json();
        assert_eq!(body["code"], "METHOD_NOT_ALLOWED");

        server
            .post("/api/companies")
            .json(&json!({ "name": "Bag End Holdings" }))
            .await
            .assert_status(StatusCode::METHOD_NOT_ALLOWED);
        server
            .patch("/api/companies/1")
            .json(&json!({ "name": "Bag End Holdings" }))
            .await
            .assert_status(StatusCode::METHOD_NOT_ALLOWED);
        server.get("/api/companies").await.assert_status_ok();
    }

    #[tokio::test]
    async fn test_delete_not_exposed() {
        let (server, service) = create_test_server();
        seed_company(&service, "Bag End Holdings");

        let response = server.delete("/api/companies/1").await;
        response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(service.count("Company").unwrap(), 1);
    }
}

// =============================================================================
// OPTIONS
// =============================================================================

mod options_tests {
    use super::*;

    #[tokio::test]
    async fn test_options_lists_exposed_verbs() {
        let (server, _) = create_test_server();

        let response = server.method(Method::OPTIONS, "/api/persons/1").await;
        response.assert_status(StatusCode::NO_CONTENT);
        assert_eq!(response.header("allow"), "GET, PUT, PATCH, DELETE");

        let response = server.method(Method::OPTIONS, "/api/companies/1").await;
        assert_eq!(response.header("allow"), "GET, PUT, PATCH");

        let response = server.method(Method::OPTIONS, "/api/persons").await;
        assert_eq!(response.header("allow"), "GET, POST");
    }

    #[tokio::test]
    async fn test_options_on_unknown_resource() {
        let (server, _) = create_test_server();
        server
            .method(Method::OPTIONS, "/api/dragons")
            .await
            .assert_status_not_found();
    }
}

//! Paging, sorting and search method tests

mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use common::*;
use halrest::prelude::*;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

fn seeded_server() -> TestServer {
    let (server, service) = create_test_server();
    for (first, last) in [
        ("Frodo", Some("Baggins")),
        ("Bilbo", Some("Baggins")),
        ("Sam", Some("Gamgee")),
        ("Merry", Some("Brandybuck")),
        ("Pippin", Some("Took")),
    ] {
        seed_person(&service, first, last, None);
    }
    server
}

fn first_names(body: &Value) -> Vec<String> {
    body["_embedded"]["persons"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["firstName"].as_str().unwrap().to_string())
        .collect()
}

// =============================================================================
// Paging
// =============================================================================

mod paging_tests {
    use super::*;

    #[tokio::test]
    async fn test_default_page() {
        let server = seeded_server();

        let response = server.get("/api/persons").await;
        response.assert_status_ok();
        let body: Value = response.json();

        assert_eq!(first_names(&body).len(), 5);
        assert_eq!(body["page"]["size"], 20);
        assert_eq!(body["page"]["totalElements"], 5);
        assert_eq!(body["page"]["totalPages"], 1);
        assert_eq!(body["page"]["number"], 0);

        let links = &body["_links"];
        assert_eq!(links["self"]["href"], "/api/persons?page=0&size=20");
        assert!(links.get("first").is_none());
        assert!(links.get("next").is_none());
        assert_eq!(links["search"]["href"], "/api/persons/search");
        assert_eq!(
            links["last-name"]["href"],
            "/api/persons?projection=last-name{&page,size,sort}"
        );
    }

    #[tokio::test]
    async fn test_middle_page_links() {
        let server = seeded_server();

        let body: Value = server
            .get("/api/persons")
            .add_query_param("page", 1)
            .add_query_param("size", 2)
            .add_query_param("sort", "firstName,asc")
            .await
            .json();

        assert_eq!(first_names(&body), vec!["Merry", "Pippin"]);
        assert_eq!(body["page"]["totalPages"], 3);
        assert_eq!(body["page"]["number"], 1);

        let links = &body["_links"];
        assert_eq!(
            links["first"]["href"],
            "/api/persons?page=0&size=2&sort=firstName%2Casc"
        );
        assert_eq!(
            links["prev"]["href"],
            "/api/persons?page=0&size=2&sort=firstName%2Casc"
        );
        assert_eq!(
            links["self"]["href"],
            "/api/persons?page=1&size=2&sort=firstName%2Casc"
        );
        assert_eq!(
            links["next"]["href"],
            "/api/persons?page=2&size=2&sort=firstName%2Casc"
        );
        assert_eq!(
            links["last"]["href"],
            "/api/persons?page=2&size=2&sort=firstName%2Casc"
        );
    }

    #[tokio::test]
    async fn test_descending_sort() {
        let server = seeded_server();
        let body: Value = server
            .get("/api/persons")
            .add_query_param("sort", "firstName,desc")
            .await
            .json();
        assert_eq!(
            first_names(&body),
            vec!["Sam", "Pippin", "Merry", "Frodo", "Bilbo"]
        );
    }

    #[tokio::test]
    async fn test_page_past_the_end_is_empty() {
        let server = seeded_server();
        let body: Value = server
            .get("/api/persons")
            .add_query_param("page", 10)
            .add_query_param("size", 2)
            .await
            .json();
        assert!(first_names(&body).is_empty());
        assert_eq!(body["page"]["totalElements"], 5);
        assert!(body["_links"].get("next").is_none());
        assert!(body["_links"].get("prev").is_some());
    }

    #[tokio::test]
    async fn test_largest_page_number_is_answered() {
        let server = seeded_server();
        let response = server
            .get("/api/persons")
            .add_query_param("page", usize::MAX.to_string())
            .await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert!(first_names(&body).is_empty());
        assert_eq!(body["page"]["number"], json!(usize::MAX));
        assert!(body["_links"].get("next").is_none());
        assert_eq!(
            body["_links"]["prev"]["href"],
            format!("/api/persons?page={}&size=20", usize::MAX - 1)
        );
    }

    #[tokio::test]
    async fn test_size_is_clamped() {
        let config = ExposureConfig {
            max_page_size: 3,
            default_page_size: 2,
            ..default_config()
        };
        let (server, service) = server_with(config);
        for name in ["Frodo", "Sam", "Merry", "Pippin"] {
            seed_person(&service, name, None, None);
        }

        let body: Value = server
            .get("/api/persons")
            .add_query_param("size", 500)
            .await
            .json();
        assert_eq!(body["page"]["size"], 3);
        assert_eq!(first_names(&body).len(), 3);

        let body: Value = server.get("/api/persons").await.json();
        assert_eq!(body["page"]["size"], 2);
    }

    #[tokio::test]
    async fn test_invalid_paging_parameters() {
        let server = seeded_server();

        server
            .get("/api/persons")
            .add_query_param("page", "first")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        server
            .get("/api/persons")
            .add_query_param("sort", "firstName,sideways")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        server
            .get("/api/persons")
            .add_query_param("sort", "shoeSize")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_paging_parameters_ignored_without_paging() {
        let (server, service) = create_test_server();
        seed_company(&service, "Bag End Holdings");

        let response = server
            .get("/api/companies")
            .add_query_param("page", "first")
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert!(body.get("page").is_none());
    }
}

// =============================================================================
// Search
// =============================================================================

mod search_tests {
    use super::*;

    #[tokio::test]
    async fn test_search_index() {
        let server = seeded_server();

        let response = server.get("/api/persons/search").await;
        response.assert_status_ok();
        let links = response.json::<Value>()["_links"].clone();

        assert_eq!(
            links["nameStartsWith"]["href"],
            "/api/persons/search/nameStartsWith{?name,page,size,sort}"
        );
        assert_eq!(links["nameStartsWith"]["templated"], true);
        assert_eq!(
            links["findByLastName"]["href"],
            "/api/persons/search/findByLastName{?lastName,page,size,sort}"
        );
        assert_eq!(
            links["byFirstName"]["href"],
            "/api/persons/search/byFirstName{?firstName}"
        );
        assert_eq!(links["self"]["href"], "/api/persons/search");
    }

    #[tokio::test]
    async fn test_search_index_without_methods() {
        let (server, _) = create_test_server();
        server
            .get("/api/companies/search")
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn test_paged_search_repeats_arguments() {
        let server = seeded_server();

        let response = server
            .get("/api/persons/search/findByLastName")
            .add_query_param("lastName", "Baggins")
            .add_query_param("size", 1)
            .await;
        response.assert_status_ok();
        let body: Value = response.json();

        assert_eq!(first_names(&body).len(), 1);
        assert_eq!(body["page"]["totalElements"], 2);
        assert_eq!(
            body["_links"]["self"]["href"],
            "/api/persons/search/findByLastName?lastName=Baggins&page=0&size=1"
        );
        assert_eq!(
            body["_links"]["next"]["href"],
            "/api/persons/search/findByLastName?lastName=Baggins&page=1&size=1"
        );
    }

    #[tokio::test]
    async fn test_prefix_search() {
        let server = seeded_server();
        let body: Value = server
            .get("/api/persons/search/nameStartsWith")
            .add_query_param("name", "P")
            .await
            .json();
        assert_eq!(first_names(&body), vec!["Pippin"]);
    }

    #[tokio::test]
    async fn test_single_result_search() {
        let server = seeded_server();

        let response = server
            .get("/api/persons/search/byFirstName")
            .add_query_param("firstName", "Sam")
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["lastName"], "Gamgee");
        assert_eq!(body["_links"]["self"]["href"], "/api/persons/3");

        server
            .get("/api/persons/search/byFirstName")
            .add_query_param("firstName", "Gandalf")
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn test_missing_required_argument() {
        let server = seeded_server();
        let response = server.get("/api/persons/search/byFirstName").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["code"], "MALFORMED_REQUEST");
    }

    #[tokio::test]
    async fn test_unknown_search_relation() {
        let server = seeded_server();
        let response = server.get("/api/persons/search/byShoeSize").await;
        response.assert_status_not_found();
        let body: Value = response.json();
        assert_eq!(body["details"]["rel"], "byShoeSize");
    }

    #[tokio::test]
    async fn test_unexported_search_is_not_bound() {
        let hobbit = EntityDescriptor::new("Hobbit")
            .id("id", FieldType::Integer)
            .field("firstName", FieldType::String);
        let app = ServerBuilder::new()
            .with_config(ExposureConfig::default().with_base_path("/api"))
            .with_repository_service(InMemoryRepositoryService::new())
            .register_repository(
                RepositoryDeclaration::new("HobbitRepository", hobbit).search(
                    SearchMethodDescriptor::new("findByFirstName", ReturnShape::List)
                        .param("firstName", FieldType::String)
                        .exported(false),
                ),
            )
            .build()
            .expect("Failed to build app");
        let server = TestServer::try_new(app).expect("Failed to create test server");

        server
            .get("/api/hobbits/search/findByFirstName")
            .add_query_param("firstName", "Sam")
            .await
            .assert_status_not_found();
        server
            .get("/api/hobbits/search")
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn test_search_is_read_only() {
        let server = seeded_server();
        server
            .post("/api/persons/search/byFirstName")
            .await
            .assert_status(StatusCode::METHOD_NOT_ALLOWED);
    }

    type Invocation = (String, SearchArguments, Option<PageRequest>);

    /// Records search invocations before delegating
    struct RecordingService {
        inner: InMemoryRepositoryService,
        invocations: Arc<Mutex<Vec<Invocation>>>,
    }

    #[async_trait]
    impl RepositoryService for RecordingService {
        async fn find(
            &self,
            binding: &RepositoryBinding,
            id: &EntityId,
        ) -> Result<Option<Record>, StoreError> {
            self.inner.find(binding, id).await
        }

        async fn list(
            &self,
            binding: &RepositoryBinding,
            page: Option<&PageRequest>,
        ) -> Result<Listing, StoreError> {
            self.inner.list(binding, page).await
        }

        async fn invoke_search(
            &self,
            binding: &RepositoryBinding,
            method: &SearchMethodDescriptor,
            arguments: &SearchArguments,
            page: Option<&PageRequest>,
        ) -> Result<SearchResult, StoreError> {
            self.invocations.lock().unwrap().push((
                method.method_name.clone(),
                arguments.clone(),
                page.cloned(),
            ));
            self.inner.invoke_search(binding, method, arguments, page).await
        }

        async fn create(
            &self,
            binding: &RepositoryBinding,
            record: Record,
        ) -> Result<Record, StoreError> {
            self.inner.create(binding, record).await
        }

        async fn update(
            &self,
            binding: &RepositoryBinding,
            id: &EntityId,
            record: Record,
            expected_version: Option<i64>,
        ) -> Result<Record, StoreError> {
            self.inner.update(binding, id, record, expected_version).await
        }

        async fn delete(&self, binding: &RepositoryBinding, id: &EntityId) -> Result<(), StoreError> {
            self.inner.delete(binding, id).await
        }
    }

    #[tokio::test]
    async fn test_search_binds_arguments_and_page() {
        let inner = InMemoryRepositoryService::new();
        for name in ["Ivan", "Ivy", "Sam"] {
            seed_person(&inner, name, None, None);
        }
        let invocations = Arc::new(Mutex::new(Vec::new()));
        let app = ServerBuilder::new()
            .with_config(default_config())
            .with_repository_service(RecordingService {
                inner,
                invocations: invocations.clone(),
            })
            .register_entity(base_address())
            .register_entity(company())
            .register_repository(person_repository())
            .build()
            .expect("Failed to build app");
        let server = TestServer::try_new(app).expect("Failed to create test server");

        let response = server
            .get("/api/persons/search/nameStartsWith")
            .add_query_param("name", "Iv")
            .add_query_param("page", 0)
            .add_query_param("size", 5)
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(first_names(&body), vec!["Ivan", "Ivy"]);

        let invocations = invocations.lock().unwrap();
        assert_eq!(invocations.len(), 1);
        let (method, arguments, page) = &invocations[0];
        assert_eq!(method, "findByFirstNameStartsWith");
        assert_eq!(arguments.get("name"), Some(&json!("Iv")));
        assert_eq!(page.as_ref(), Some(&PageRequest::new(0, 5)));
    }
}

//! Resource request handler
//!
//! Every request runs through the same phases: PARSE, RESOLVE_BINDING,
//! CHECK_VISIBILITY, CHECK_POLICY, EXECUTE and SERIALIZE. Any phase may fail
//! with an [`ExposureError`], which the REST layer renders as a structured
//! error body.

use crate::core::auth::Principal;
use crate::core::entity::{Property, Record};
use crate::core::error::{ExposureError, NotFoundError};
use crate::core::field::EntityId;
use crate::core::projection::ProjectionDescriptor;
use crate::core::query::{PROJECTION_PARAM, PageRequest, PagingParams};
use crate::core::repository::{Operation, RepositoryBinding, SearchMethodDescriptor};
use crate::core::service::{Listing, SearchArguments, SearchResult};
use crate::links::{AssociationExposure, Link, Links, UriTemplate};
use crate::server::host::ServerHost;
use crate::server::serializer::{InlinedAssociations, PayloadMode, Representation};
use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::future::try_join_all;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Media type of every successful response body
pub const HAL_JSON: &str = "application/hal+json";

/// A request as seen by the handler, independent of the HTTP framework
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ResourceRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// Status, headers and optional HAL body of a successful request
#[derive(Debug, Clone)]
pub struct ResourceResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl ResourceResponse {
    fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    fn ok(body: Value) -> Self {
        Self::new(StatusCode::OK).with_body(body)
    }

    fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    fn with_header(mut self, name: header::HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }
}

impl IntoResponse for ResourceResponse {
    fn into_response(self) -> Response {
        let mut headers = self.headers;
        match self.body {
            Some(body) => {
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(HAL_JSON));
                (self.status, headers, body.to_string()).into_response()
            }
            None => (self.status, headers).into_response(),
        }
    }
}

/// Addressed resource, after the base path is stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Root,
    Collection { resource: String },
    Item { resource: String, id: String },
    Association { resource: String, id: String, name: String },
    SearchIndex { resource: String },
    Search { resource: String, rel: String },
}

impl Target {
    /// Split a request path into a target
    ///
    /// A single trailing slash is tolerated; empty interior segments are
    /// malformed. `None` means the path is outside the exposed space.
    pub fn parse(base_path: &str, path: &str) -> Result<Option<Self>, ExposureError> {
        let Some(rest) = path.strip_prefix(base_path) else {
            return Ok(None);
        };
        if !rest.is_empty() && !rest.starts_with('/') {
            return Ok(None);
        }
        let rest = rest.strip_prefix('/').unwrap_or(rest);
        let rest = rest.strip_suffix('/').unwrap_or(rest);

        let raw_segments: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split('/').collect()
        };
        if raw_segments.iter().any(|s| s.is_empty()) {
            return Err(ExposureError::malformed(format!(
                "empty segment in path '{}'",
                path
            )));
        }
        let decoded = raw_segments
            .into_iter()
            .map(|s| urlencoding::decode(s).map(|d| d.into_owned()))
            .collect::<Result<Vec<String>, _>>()
            .map_err(|_| {
                ExposureError::malformed(format!("invalid percent-encoding in path '{}'", path))
            })?;
        let segments: Vec<&str> = decoded.iter().map(String::as_str).collect();

        let target = match segments.as_slice() {
            [] => Target::Root,
            [resource] => Target::Collection {
                resource: resource.to_string(),
            },
            [resource, "search"] => Target::SearchIndex {
                resource: resource.to_string(),
            },
            [resource, "search", rel] => Target::Search {
                resource: resource.to_string(),
                rel: rel.to_string(),
            },
            [resource, id] => Target::Item {
                resource: resource.to_string(),
                id: id.to_string(),
            },
            [resource, id, name] => Target::Association {
                resource: resource.to_string(),
                id: id.to_string(),
                name: name.to_string(),
            },
            _ => return Ok(None),
        };
        Ok(Some(target))
    }

    pub fn resource(&self) -> Option<&str> {
        match self {
            Target::Root => None,
            Target::Collection { resource }
            | Target::Item { resource, .. }
            | Target::Association { resource, .. }
            | Target::SearchIndex { resource }
            | Target::Search { resource, .. } => Some(resource),
        }
    }

    fn is_search(&self) -> bool {
        matches!(self, Target::SearchIndex { .. } | Target::Search { .. })
    }

    /// Operation a verb maps to on this target, `None` for unsupported
    /// combinations
    pub fn operation(&self, method: &Method) -> Option<Operation> {
        match (self, method) {
            (Target::Collection { .. }, &Method::GET) => Some(Operation::ReadCollection),
            (Target::Collection { .. }, &Method::POST) => Some(Operation::Create),
            (Target::Item { .. }, &Method::GET) => Some(Operation::ReadItem),
            (Target::Item { .. }, &Method::PUT) | (Target::Item { .. }, &Method::PATCH) => {
                Some(Operation::Update)
            }
            (Target::Item { .. }, &Method::DELETE) => Some(Operation::Delete),
            (Target::Association { .. }, &Method::GET) => Some(Operation::ReadItem),
            (Target::SearchIndex { .. }, &Method::GET) | (Target::Search { .. }, &Method::GET) => {
                Some(Operation::ReadCollection)
            }
            _ => None,
        }
    }
}

struct ParsedRequest {
    target: Target,
    query: Vec<(String, String)>,
    projection: Option<String>,
    body: Option<Value>,
    principal: Principal,
}

/// Executes resource requests against a [`ServerHost`]
#[derive(Clone)]
pub struct ResourceHandler {
    host: Arc<ServerHost>,
}

impl ResourceHandler {
    pub fn new(host: Arc<ServerHost>) -> Self {
        Self { host }
    }

    /// Handle one request, bounded by the configured timeout
    ///
    /// On expiry the in-flight collaborator calls are dropped, which cancels
    /// them; registries are immutable so nothing needs undoing.
    pub async fn handle(&self, request: ResourceRequest) -> Result<ResourceResponse, ExposureError> {
        let method = request.method.clone();
        let path = request.path.clone();

        let result = match self.host.config.request_timeout_ms {
            Some(ms) => tokio::time::timeout(Duration::from_millis(ms), self.dispatch(request))
                .await
                .unwrap_or_else(|_| Err(ExposureError::Timeout)),
            None => self.dispatch(request).await,
        };

        if let Err(e) = &result {
            tracing::warn!(
                method = %method,
                path = %path,
                status = e.status_code().as_u16(),
                error = %e,
                "Request failed"
            );
        }
        result
    }

    async fn dispatch(&self, request: ResourceRequest) -> Result<ResourceResponse, ExposureError> {
        let parsed = self.parse(&request)?;
        tracing::debug!(phase = "parse", method = %request.method, target = ?parsed.target);

        if request.method == Method::OPTIONS {
            return self.options(&parsed.target);
        }

        if parsed.projection.is_some() && is_write(&request.method) {
            return Err(ExposureError::bad_request(
                "projections are not supported on write requests",
            ));
        }

        let Some(resource) = parsed.target.resource() else {
            return match request.method {
                Method::GET => Ok(self.root()),
                _ => Err(ExposureError::MethodNotAllowed {
                    resource: "/".to_string(),
                    method: request.method.to_string(),
                }),
            };
        };

        let binding = self
            .host
            .metadata
            .resolve(resource)
            .cloned()
            .ok_or_else(|| NotFoundError::Resource(resource.to_string()))?;
        tracing::debug!(phase = "resolve_binding", repository = %binding.name);

        let method_not_allowed = || ExposureError::MethodNotAllowed {
            resource: binding.path.clone(),
            method: request.method.to_string(),
        };
        let operation = parsed
            .target
            .operation(&request.method)
            .ok_or_else(method_not_allowed)?;
        if !parsed.target.is_search() && !self.host.metadata.is_exposed(&binding, operation) {
            return Err(method_not_allowed());
        }
        tracing::debug!(phase = "check_visibility", operation = %operation);

        self.check_policy(&parsed.principal, &binding, operation)
            .await?;
        tracing::debug!(phase = "check_policy", principal = ?parsed.principal);

        let response = match (&parsed.target, &request.method) {
            (Target::Collection { .. }, &Method::GET) => {
                self.get_collection(&binding, &parsed).await
            }
            (Target::Collection { .. }, &Method::POST) => {
                self.post_collection(&binding, &parsed).await
            }
            (Target::Item { id, .. }, &Method::GET) => self.get_item(&binding, id, &parsed).await,
            (Target::Item { id, .. }, &Method::PUT) => {
                self.put_item(&binding, id, &parsed, &request.headers)
                    .await
            }
            (Target::Item { id, .. }, &Method::PATCH) => {
                self.patch_item(&binding, id, &parsed, &request.headers)
                    .await
            }
            (Target::Item { id, .. }, &Method::DELETE) => self.delete_item(&binding, id).await,
            (Target::Association { id, name, .. }, &Method::GET) => {
                self.get_association(&binding, id, name, &parsed).await
            }
            (Target::SearchIndex { .. }, _) => self.search_index(&binding),
            (Target::Search { rel, .. }, _) => self.search(&binding, rel, &parsed).await,
            _ => Err(method_not_allowed()),
        }?;
        tracing::debug!(phase = "serialize", status = response.status.as_u16());
        Ok(response)
    }

    fn parse(&self, request: &ResourceRequest) -> Result<ParsedRequest, ExposureError> {
        let target = Target::parse(self.host.links.base_path(), &request.path)?
            .ok_or_else(|| NotFoundError::Resource(request.path.clone()))?;

        let query = match request.query.as_deref() {
            Some(raw) => decode_query(raw)?,
            None => Vec::new(),
        };
        let projection = query
            .iter()
            .find(|(k, _)| k == PROJECTION_PARAM)
            .map(|(_, v)| v.clone());

        let body = if request.body.is_empty() {
            None
        } else {
            Some(
                serde_json::from_slice(&request.body)
                    .map_err(|e| ExposureError::malformed(format!("invalid JSON body: {}", e)))?,
            )
        };

        Ok(ParsedRequest {
            target,
            query,
            projection,
            body,
            principal: self.host.principal_extractor.extract(&request.headers),
        })
    }

    async fn check_policy(
        &self,
        principal: &Principal,
        binding: &RepositoryBinding,
        operation: Operation,
    ) -> Result<(), ExposureError> {
        if let Some(policy) = &self.host.access_policy
            && !policy.allow(principal, binding, operation).await
        {
            return Err(ExposureError::Forbidden {
                resource: binding.path.clone(),
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    /// Visibility and policy gate for reading items of a bound association
    /// target
    async fn authorize_read(
        &self,
        principal: &Principal,
        target: &RepositoryBinding,
    ) -> Result<(), ExposureError> {
        if !self.host.metadata.is_exposed(target, Operation::ReadItem) {
            return Err(ExposureError::MethodNotAllowed {
                resource: target.path.clone(),
                method: Method::GET.to_string(),
            });
        }
        self.check_policy(principal, target, Operation::ReadItem)
            .await
    }

    fn root(&self) -> ResourceResponse {
        let links = self
            .host
            .links
            .root_links(self.host.metadata.bindings().map(|b| b.as_ref()));
        ResourceResponse::ok(Representation::from_links(links).to_json())
    }

    fn options(&self, target: &Target) -> Result<ResourceResponse, ExposureError> {
        let mut allowed: Vec<&'static str> = Vec::new();
        if let Some(resource) = target.resource() {
            let binding = self
                .host
                .metadata
                .resolve(resource)
                .ok_or_else(|| NotFoundError::Resource(resource.to_string()))?;
            if let Target::Search { rel, .. } = target
                && binding.find_search(rel).is_none()
            {
                return Err(NotFoundError::SearchMethod {
                    resource: binding.path.clone(),
                    rel: rel.clone(),
                }
                .into());
            }
            for (method, name) in [
                (Method::GET, "GET"),
                (Method::POST, "POST"),
                (Method::PUT, "PUT"),
                (Method::PATCH, "PATCH"),
                (Method::DELETE, "DELETE"),
            ] {
                let exposed = target.operation(&method).is_some_and(|op| {
                    target.is_search() || self.host.metadata.is_exposed(binding, op)
                });
                if exposed {
                    allowed.push(name);
                }
            }
        } else {
            allowed.push("GET");
        }

        Ok(ResourceResponse::new(StatusCode::NO_CONTENT)
            .with_header(header::ALLOW, &allowed.join(", ")))
    }

    // --- collection ---------------------------------------------------------

    async fn get_collection(
        &self,
        binding: &RepositoryBinding,
        parsed: &ParsedRequest,
    ) -> Result<ResourceResponse, ExposureError> {
        let projection = self.listing_projection(binding, parsed.projection.as_deref())?;
        let page_request = if binding.paging {
            Some(self.page_request(binding, &parsed.query)?)
        } else {
            None
        };

        let listing = self
            .host
            .repository_service
            .list(binding, page_request.as_ref())
            .await?;
        tracing::debug!(phase = "execute", repository = %binding.name);

        let mut links = self.host.links.collection_links(
            binding,
            self.host
                .projections
                .names_for(binding.entity_type())
                .iter()
                .map(String::as_str),
        );

        let representation = match listing {
            Listing::Items(records) => {
                let items = self
                    .render_all(binding, &records, projection.as_deref(), &parsed.principal)
                    .await?;
                self.host.serializer().collection(binding, items, links, None)
            }
            Listing::Page(page) => {
                let metadata = page.metadata();
                let extra = projection_pair(parsed);
                links.extend(self.host.links.page_links(
                    &self.host.links.collection_href(binding),
                    &extra,
                    &page.request,
                    &metadata,
                ));
                let items = self
                    .render_all(binding, &page.content, projection.as_deref(), &parsed.principal)
                    .await?;
                self.host
                    .serializer()
                    .collection(binding, items, links, Some(metadata))
            }
        };

        Ok(ResourceResponse::ok(representation.to_json()))
    }

    async fn post_collection(
        &self,
        binding: &RepositoryBinding,
        parsed: &ParsedRequest,
    ) -> Result<ResourceResponse, ExposureError> {
        let body = require_body(parsed)?;
        let record = self
            .host
            .serializer()
            .from_payload(&binding.entity, body, PayloadMode::Create)?;

        let created = self.host.repository_service.create(binding, record).await?;
        tracing::debug!(phase = "execute", repository = %binding.name, "Entity created");

        self.written_response(
            binding,
            &created,
            StatusCode::CREATED,
            self.host.config.return_body_on_create,
        )
    }

    // --- item ---------------------------------------------------------------

    async fn get_item(
        &self,
        binding: &RepositoryBinding,
        raw_id: &str,
        parsed: &ParsedRequest,
    ) -> Result<ResourceResponse, ExposureError> {
        let projection = self.explicit_projection(binding, parsed.projection.as_deref())?;
        let id = parse_id(binding, raw_id)?;
        let record = self.find_existing(binding, &id).await?;
        tracing::debug!(phase = "execute", repository = %binding.name, id = %id);

        let representation = self
            .render_item(binding, &record, projection.as_deref(), &parsed.principal)
            .await?;
        Ok(self.with_etag(
            binding,
            &record,
            ResourceResponse::ok(representation.to_json()),
        ))
    }

    async fn put_item(
        &self,
        binding: &RepositoryBinding,
        raw_id: &str,
        parsed: &ParsedRequest,
        headers: &HeaderMap,
    ) -> Result<ResourceResponse, ExposureError> {
        let id = parse_id(binding, raw_id)?;
        let expected_version = expected_version(headers)?;
        let mut record = self.host.serializer().from_payload(
            &binding.entity,
            require_body(parsed)?,
            PayloadMode::Replace,
        )?;
        set_id(binding, &mut record, &id)?;

        let existing = self.host.repository_service.find(binding, &id).await?;
        if existing.is_none() {
            if !self.host.metadata.is_exposed(binding, Operation::Create) {
                return Err(not_found(binding, &id));
            }
            self.check_policy(&parsed.principal, binding, Operation::Create)
                .await?;
            let created = self.host.repository_service.create(binding, record).await?;
            tracing::debug!(phase = "execute", repository = %binding.name, id = %id, "Entity created by PUT");
            return self.written_response(
                binding,
                &created,
                StatusCode::CREATED,
                self.host.config.return_body_on_create,
            );
        }

        let updated = self
            .host
            .repository_service
            .update(binding, &id, record, expected_version)
            .await?;
        tracing::debug!(phase = "execute", repository = %binding.name, id = %id, "Entity replaced");
        self.written_response(
            binding,
            &updated,
            StatusCode::OK,
            self.host.config.return_body_on_update,
        )
    }

    async fn patch_item(
        &self,
        binding: &RepositoryBinding,
        raw_id: &str,
        parsed: &ParsedRequest,
        headers: &HeaderMap,
    ) -> Result<ResourceResponse, ExposureError> {
        let id = parse_id(binding, raw_id)?;
        let expected_version = expected_version(headers)?;
        let patch = self.host.serializer().from_payload(
            &binding.entity,
            require_body(parsed)?,
            PayloadMode::Merge,
        )?;

        let mut merged = self.find_existing(binding, &id).await?;
        merged.merge(patch);

        let updated = self
            .host
            .repository_service
            .update(binding, &id, merged, expected_version)
            .await?;
        tracing::debug!(phase = "execute", repository = %binding.name, id = %id, "Entity patched");
        self.written_response(
            binding,
            &updated,
            StatusCode::OK,
            self.host.config.return_body_on_update,
        )
    }

    async fn delete_item(
        &self,
        binding: &RepositoryBinding,
        raw_id: &str,
    ) -> Result<ResourceResponse, ExposureError> {
        let id = parse_id(binding, raw_id)?;
        self.host.repository_service.delete(binding, &id).await?;
        tracing::debug!(phase = "execute", repository = %binding.name, id = %id, "Entity deleted");
        Ok(ResourceResponse::new(StatusCode::NO_CONTENT))
    }

    async fn get_association(
        &self,
        binding: &RepositoryBinding,
        raw_id: &str,
        name: &str,
        parsed: &ParsedRequest,
    ) -> Result<ResourceResponse, ExposureError> {
        let id = parse_id(binding, raw_id)?;
        let association_missing = || {
            ExposureError::from(NotFoundError::Association {
                resource: binding.path.clone(),
                name: name.to_string(),
            })
        };

        let Some(AssociationExposure::Link { target_type, .. }) =
            self.host.metadata.association(binding.entity_type(), name)
        else {
            return Err(association_missing());
        };
        let target = self
            .host
            .metadata
            .binding_for_type(target_type)
            .cloned()
            .ok_or_else(association_missing)?;
        self.authorize_read(&parsed.principal, &target).await?;

        let owner = self.find_existing(binding, &id).await?;
        match owner.get(name) {
            Some(Property::Reference(target_id)) => {
                let record = self.find_existing(&target, target_id).await?;
                let representation = self
                    .render_item(&target, &record, None, &parsed.principal)
                    .await?;
                Ok(self.with_etag(
                    &target,
                    &record,
                    ResourceResponse::ok(representation.to_json()),
                ))
            }
            Some(Property::References(target_ids)) => {
                let records = self.find_all(&target, target_ids).await?;
                let items = self
                    .render_all(&target, &records, None, &parsed.principal)
                    .await?;
                let mut links = Links::new();
                links.insert(
                    "self".to_string(),
                    self.host.links.association_link(binding, &id, name),
                );
                let representation = self.host.serializer().collection(&target, items, links, None);
                Ok(ResourceResponse::ok(representation.to_json()))
            }
            _ => Err(association_missing()),
        }
    }

    // --- search -------------------------------------------------------------

    fn search_index(&self, binding: &RepositoryBinding) -> Result<ResourceResponse, ExposureError> {
        if !binding.has_search_methods() {
            return Err(NotFoundError::Resource(self.host.links.search_href(binding)).into());
        }
        let links = self.host.links.search_links(binding);
        Ok(ResourceResponse::ok(
            Representation::from_links(links).to_json(),
        ))
    }

    async fn search(
        &self,
        binding: &RepositoryBinding,
        rel: &str,
        parsed: &ParsedRequest,
    ) -> Result<ResourceResponse, ExposureError> {
        let method = binding
            .find_search(rel)
            .ok_or_else(|| NotFoundError::SearchMethod {
                resource: binding.path.clone(),
                rel: rel.to_string(),
            })?;

        let (arguments, mut extra) = bind_arguments(method, &parsed.query)?;
        let page_request = if binding.paging && method.return_shape.is_collection() {
            Some(self.page_request(binding, &parsed.query)?)
        } else {
            None
        };

        let result = self
            .host
            .repository_service
            .invoke_search(binding, method, &arguments, page_request.as_ref())
            .await?;
        tracing::debug!(
            phase = "execute",
            repository = %binding.name,
            search = %method.method_name,
            "Search invoked"
        );

        let href = format!("{}/{}", self.host.links.search_href(binding), method.rel);
        extra.extend(projection_pair(parsed));

        match result {
            SearchResult::Single(Some(record)) => {
                let projection = self.explicit_projection(binding, parsed.projection.as_deref())?;
                let representation = self
                    .render_item(binding, &record, projection.as_deref(), &parsed.principal)
                    .await?;
                Ok(ResourceResponse::ok(representation.to_json()))
            }
            SearchResult::Single(None) => Err(NotFoundError::NoResult {
                resource: binding.path.clone(),
                rel: method.rel.clone(),
            }
            .into()),
            SearchResult::Items(records) => {
                let projection = self.listing_projection(binding, parsed.projection.as_deref())?;
                let items = self
                    .render_all(binding, &records, projection.as_deref(), &parsed.principal)
                    .await?;
                let template = UriTemplate::new(href)
                    .variables_from(extra.iter().map(|(k, _)| k.clone()));
                let pairs: Vec<(&str, &str)> =
                    extra.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
                let mut links = Links::new();
                links.insert("self".to_string(), Link::new(template.expand(&pairs)));
                Ok(ResourceResponse::ok(
                    self.host
                        .serializer()
                        .collection(binding, items, links, None)
                        .to_json(),
                ))
            }
            SearchResult::Page(page) => {
                let projection = self.listing_projection(binding, parsed.projection.as_deref())?;
                let metadata = page.metadata();
                let links = self
                    .host
                    .links
                    .page_links(&href, &extra, &page.request, &metadata);
                let items = self
                    .render_all(binding, &page.content, projection.as_deref(), &parsed.principal)
                    .await?;
                Ok(ResourceResponse::ok(
                    self.host
                        .serializer()
                        .collection(binding, items, links, Some(metadata))
                        .to_json(),
                ))
            }
        }
    }

    // --- helpers ------------------------------------------------------------

    fn page_request(
        &self,
        binding: &RepositoryBinding,
        query: &[(String, String)],
    ) -> Result<PageRequest, ExposureError> {
        let params = PagingParams::from_pairs(query)?;
        for order in &params.sort {
            if binding.entity.find_field(&order.property).is_none() {
                return Err(ExposureError::malformed(format!(
                    "cannot sort {} by undeclared field '{}'",
                    binding.entity_type(),
                    order.property
                )));
            }
        }
        Ok(params.to_request(
            self.host.config.default_page_size,
            self.host.config.max_page_size,
        ))
    }

    /// The requested projection; unknown names are a bad request
    fn explicit_projection(
        &self,
        binding: &RepositoryBinding,
        requested: Option<&str>,
    ) -> Result<Option<Arc<ProjectionDescriptor>>, ExposureError> {
        let Some(name) = requested else {
            return Ok(None);
        };
        self.host
            .projections
            .resolve(binding.entity_type(), name)
            .cloned()
            .map(Some)
            .ok_or_else(|| {
                ExposureError::bad_request(format!(
                    "unknown projection '{}' for {}",
                    name,
                    binding.entity_type()
                ))
            })
    }

    /// The requested projection, falling back to the binding's excerpt
    fn listing_projection(
        &self,
        binding: &RepositoryBinding,
        requested: Option<&str>,
    ) -> Result<Option<Arc<ProjectionDescriptor>>, ExposureError> {
        if requested.is_some() {
            return self.explicit_projection(binding, requested);
        }
        Ok(binding
            .excerpt_projection
            .as_deref()
            .and_then(|name| self.host.projections.resolve(binding.entity_type(), name))
            .cloned())
    }

    async fn find_existing(
        &self,
        binding: &RepositoryBinding,
        id: &EntityId,
    ) -> Result<Record, ExposureError> {
        self.host
            .repository_service
            .find(binding, id)
            .await?
            .ok_or_else(|| not_found(binding, id))
    }

    /// Fetch several targets, skipping dangling references
    async fn find_all(
        &self,
        binding: &RepositoryBinding,
        ids: &[EntityId],
    ) -> Result<Vec<Record>, ExposureError> {
        let service = &self.host.repository_service;
        let found = try_join_all(ids.iter().map(|id| service.find(binding, id))).await?;
        Ok(found.into_iter().flatten().collect())
    }

    async fn render_all(
        &self,
        binding: &RepositoryBinding,
        records: &[Record],
        projection: Option<&ProjectionDescriptor>,
        principal: &Principal,
    ) -> Result<Vec<Representation>, ExposureError> {
        try_join_all(
            records
                .iter()
                .map(|record| self.render_item(binding, record, projection, principal)),
        )
        .await
    }

    async fn render_item(
        &self,
        binding: &RepositoryBinding,
        record: &Record,
        projection: Option<&ProjectionDescriptor>,
        principal: &Principal,
    ) -> Result<Representation, ExposureError> {
        let inlined = match projection {
            Some(descriptor) => {
                self.inline_associations(binding, record, descriptor, principal)
                    .await?
            }
            None => InlinedAssociations::new(),
        };
        self.host
            .serializer()
            .to_representation(binding, record, projection, &inlined)
    }

    /// Fetch and render link-exposed associations selected by a projection
    ///
    /// Targets the principal could not read directly are left out.
    async fn inline_associations(
        &self,
        binding: &RepositoryBinding,
        record: &Record,
        projection: &ProjectionDescriptor,
        principal: &Principal,
    ) -> Result<InlinedAssociations, ExposureError> {
        let mut inlined = InlinedAssociations::new();
        for name in projection.field_names() {
            let Some(AssociationExposure::Link { target_type, .. }) =
                self.host.metadata.association(binding.entity_type(), name)
            else {
                continue;
            };
            let Some(target) = self.host.metadata.binding_for_type(target_type).cloned() else {
                continue;
            };
            if self.authorize_read(principal, &target).await.is_err() {
                tracing::debug!(association = %name, target = %target.name, "Association not inlined");
                continue;
            }

            let value = match record.get(name) {
                Some(Property::Reference(id)) => {
                    match self.host.repository_service.find(&target, id).await? {
                        Some(found) => self
                            .host
                            .serializer()
                            .to_representation(&target, &found, None, &InlinedAssociations::new())?
                            .to_json(),
                        None => continue,
                    }
                }
                Some(Property::References(ids)) => {
                    let serializer = self.host.serializer();
                    let rendered = self
                        .find_all(&target, ids)
                        .await?
                        .iter()
                        .map(|found| {
                            serializer
                                .to_representation(&target, found, None, &InlinedAssociations::new())
                                .map(|r| r.to_json())
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    Value::Array(rendered)
                }
                Some(Property::Scalar(Value::Null)) => Value::Null,
                _ => continue,
            };
            inlined.insert(name.to_string(), value);
        }
        Ok(inlined)
    }

    /// Response of a successful create or update
    fn written_response(
        &self,
        binding: &RepositoryBinding,
        record: &Record,
        status: StatusCode,
        return_body: bool,
    ) -> Result<ResourceResponse, ExposureError> {
        let id = binding.entity.id_of(record).ok_or_else(|| {
            ExposureError::Internal(format!(
                "persisted {} has no identifier",
                binding.entity_type()
            ))
        })?;

        let mut response = if return_body {
            let representation = self.host.serializer().to_representation(
                binding,
                record,
                None,
                &InlinedAssociations::new(),
            )?;
            ResourceResponse::new(status).with_body(representation.to_json())
        } else if status == StatusCode::CREATED {
            ResourceResponse::new(status)
        } else {
            ResourceResponse::new(StatusCode::NO_CONTENT)
        };

        if status == StatusCode::CREATED {
            response = response.with_header(
                header::LOCATION,
                &self.host.links.item_href(binding, &id),
            );
        }
        Ok(self.with_etag(binding, record, response))
    }

    fn with_etag(
        &self,
        binding: &RepositoryBinding,
        record: &Record,
        response: ResourceResponse,
    ) -> ResourceResponse {
        match binding.entity.version_of(record) {
            Some(version) => response.with_header(header::ETAG, &format!("\"{}\"", version)),
            None => response,
        }
    }
}

fn is_write(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

fn not_found(binding: &RepositoryBinding, id: &EntityId) -> ExposureError {
    NotFoundError::Item {
        resource: binding.path.clone(),
        id: id.to_string(),
    }
    .into()
}

fn parse_id(binding: &RepositoryBinding, raw: &str) -> Result<EntityId, ExposureError> {
    EntityId::parse(raw, binding.id_type()).ok_or_else(|| {
        ExposureError::malformed(format!(
            "'{}' is not a valid {} identifier",
            raw,
            binding.id_type().name()
        ))
    })
}

fn set_id(binding: &RepositoryBinding, record: &mut Record, id: &EntityId) -> Result<(), ExposureError> {
    let field = binding.entity.id_field().ok_or_else(|| {
        ExposureError::Internal(format!("{} has no identifier field", binding.entity_type()))
    })?;
    record.set_scalar(field.name.clone(), id.to_value());
    Ok(())
}

fn require_body(parsed: &ParsedRequest) -> Result<&Value, ExposureError> {
    parsed
        .body
        .as_ref()
        .ok_or_else(|| ExposureError::malformed("request body is required"))
}

fn projection_pair(parsed: &ParsedRequest) -> Vec<(String, String)> {
    parsed
        .projection
        .iter()
        .map(|p| (PROJECTION_PARAM.to_string(), p.clone()))
        .collect()
}

/// Decode a query string, rejecting broken percent escapes
fn decode_query(raw: &str) -> Result<Vec<(String, String)>, ExposureError> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                return Err(ExposureError::malformed(format!(
                    "invalid percent-encoding in query '{}'",
                    raw
                )));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    Ok(url::form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect())
}

/// Convert query values to the declared parameter types
///
/// Returns the typed arguments plus the raw pairs to repeat in links.
fn bind_arguments(
    method: &SearchMethodDescriptor,
    query: &[(String, String)],
) -> Result<(SearchArguments, Vec<(String, String)>), ExposureError> {
    let mut arguments = SearchArguments::new();
    let mut raw_pairs = Vec::new();
    for parameter in &method.parameters {
        match query.iter().find(|(k, _)| *k == parameter.name) {
            Some((_, raw)) => {
                let value = parameter.field_type.parse_str(raw).ok_or_else(|| {
                    ExposureError::malformed(format!(
                        "parameter '{}' expects a {} value, got '{}'",
                        parameter.name,
                        parameter.field_type.name(),
                        raw
                    ))
                })?;
                arguments.insert(parameter.name.clone(), value);
                raw_pairs.push((parameter.name.clone(), raw.clone()));
            }
            None if parameter.required => {
                return Err(ExposureError::malformed(format!(
                    "missing required parameter '{}' for search '{}'",
                    parameter.name, method.rel
                )));
            }
            None => {}
        }
    }
    Ok((arguments, raw_pairs))
}

/// Version expected by an `If-Match` header; `*` matches any version
fn expected_version(headers: &HeaderMap) -> Result<Option<i64>, ExposureError> {
    let Some(raw) = headers.get(header::IF_MATCH) else {
        return Ok(None);
    };
    let raw = raw
        .to_str()
        .map_err(|_| ExposureError::malformed("If-Match header is not valid text"))?
        .trim();
    if raw == "*" {
        return Ok(None);
    }
    let value = raw.trim_start_matches("W/").trim_matches('"');
    value
        .parse()
        .map(Some)
        .map_err(|_| ExposureError::malformed(format!("invalid If-Match value '{}'", raw)))
}

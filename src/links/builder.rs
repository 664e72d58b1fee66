//! Link construction for exposed repositories
//!
//! All hrefs are absolute paths rooted at the configured base path, e.g.
//! `/api/persons/1`. Templates follow [`UriTemplate`].

use crate::core::field::EntityId;
use crate::core::query::{PAGE_PARAM, PROJECTION_PARAM, PageMetadata, PageRequest, SIZE_PARAM, SORT_PARAM};
use crate::core::repository::{RepositoryBinding, SearchMethodDescriptor};
use crate::links::link::{Link, Links, UriTemplate};

const PAGING_VARIABLES: [&str; 3] = [PAGE_PARAM, SIZE_PARAM, SORT_PARAM];

/// Builds links for bindings, items, searches and pages
#[derive(Debug, Clone)]
pub struct LinkBuilder {
    base_path: String,
}

impl LinkBuilder {
    /// `base_path` must already be normalized (see `ExposureConfig::normalized`)
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// `{base}/{path}`
    pub fn collection_href(&self, binding: &RepositoryBinding) -> String {
        format!("{}/{}", self.base_path, binding.path)
    }

    /// `{base}/{path}/{id}`, the id percent-encoded as one segment
    pub fn item_href(&self, binding: &RepositoryBinding, id: &EntityId) -> String {
        self.item_href_for_path(&binding.path, id)
    }

    /// Item href for a target resource known only by its path
    pub fn item_href_for_path(&self, path: &str, id: &EntityId) -> String {
        format!(
            "{}/{}/{}",
            self.base_path,
            path,
            urlencoding::encode(&id.to_string())
        )
    }

    pub fn self_link(&self, binding: &RepositoryBinding, id: &EntityId) -> Link {
        Link::new(self.item_href(binding, id))
    }

    /// `self` plus the item relation, templated with `{?projection}` when the
    /// type has projections
    pub fn item_links(
        &self,
        binding: &RepositoryBinding,
        id: &EntityId,
        has_projections: bool,
    ) -> Links {
        let mut links = Links::new();
        links.insert("self".to_string(), self.self_link(binding, id));

        let mut template = UriTemplate::new(self.item_href(binding, id));
        if has_projections {
            template = template.variable(PROJECTION_PARAM);
        }
        links.insert(binding.item_rel.clone(), Link::from_template(&template));
        links
    }

    /// `{base}/{path}/{id}/{association}`
    pub fn association_link(
        &self,
        binding: &RepositoryBinding,
        id: &EntityId,
        association: &str,
    ) -> Link {
        Link::new(format!("{}/{}", self.item_href(binding, id), association))
    }

    /// Collection template: templated with paging variables when the
    /// repository pages
    pub fn collection_template(&self, binding: &RepositoryBinding) -> UriTemplate {
        let template = UriTemplate::new(self.collection_href(binding));
        if binding.paging {
            template.variables_from(PAGING_VARIABLES)
        } else {
            template
        }
    }

    /// `self`, `search` when search methods exist, and one templated link per
    /// projection
    pub fn collection_links<'a>(
        &self,
        binding: &RepositoryBinding,
        projections: impl IntoIterator<Item = &'a str>,
    ) -> Links {
        let mut links = Links::new();
        links.insert(
            "self".to_string(),
            Link::from_template(&self.collection_template(binding)),
        );

        if binding.has_search_methods() {
            links.insert("search".to_string(), Link::new(self.search_href(binding)));
        }

        for projection in projections {
            let mut template = UriTemplate::new(format!(
                "{}?{}={}",
                self.collection_href(binding),
                PROJECTION_PARAM,
                projection
            ));
            if binding.paging {
                template = template.variables_from(PAGING_VARIABLES);
            }
            links.insert(projection.to_string(), Link::from_template(&template));
        }

        links
    }

    /// `{base}/{path}/search`
    pub fn search_href(&self, binding: &RepositoryBinding) -> String {
        format!("{}/search", self.collection_href(binding))
    }

    /// Template of a search method
    ///
    /// Placeholders are the declared parameters in declaration order, followed
    /// by `page`, `size`, `sort` when the method returns a page or list.
    pub fn search_template(
        &self,
        binding: &RepositoryBinding,
        method: &SearchMethodDescriptor,
    ) -> UriTemplate {
        let template = UriTemplate::new(format!("{}/{}", self.search_href(binding), method.rel))
            .variables_from(method.parameters.iter().map(|p| p.name.clone()));
        if method.return_shape.is_collection() {
            template.variables_from(PAGING_VARIABLES)
        } else {
            template
        }
    }

    pub fn search_link(&self, binding: &RepositoryBinding, method: &SearchMethodDescriptor) -> Link {
        Link::from_template(&self.search_template(binding, method))
    }

    /// Links of the search resource: every method plus `self`
    pub fn search_links(&self, binding: &RepositoryBinding) -> Links {
        let mut links = Links::new();
        for method in &binding.search_methods {
            links.insert(method.rel.clone(), self.search_link(binding, method));
        }
        links.insert("self".to_string(), Link::new(self.search_href(binding)));
        links
    }

    /// `first`/`prev`/`self`/`next`/`last` for a page of `href`
    ///
    /// `extra` holds non-paging query parameters (search arguments,
    /// projection) that every page link must repeat.
    pub fn page_links(
        &self,
        href: &str,
        extra: &[(String, String)],
        request: &PageRequest,
        metadata: &PageMetadata,
    ) -> Links {
        let mut links = Links::new();
        let last_page = metadata.total_pages.saturating_sub(1);

        if metadata.total_pages > 1 {
            links.insert(
                "first".to_string(),
                Link::new(Self::paged_href(href, extra, &request.with_page(0))),
            );
        }
        if metadata.has_prev() {
            links.insert(
                "prev".to_string(),
                Link::new(Self::paged_href(
                    href,
                    extra,
                    &request.with_page(metadata.number - 1),
                )),
            );
        }
        links.insert(
            "self".to_string(),
            Link::new(Self::paged_href(href, extra, request)),
        );
        if metadata.has_next()
            && let Some(next) = metadata.number.checked_add(1)
        {
            links.insert(
                "next".to_string(),
                Link::new(Self::paged_href(href, extra, &request.with_page(next))),
            );
        }
        if metadata.total_pages > 1 {
            links.insert(
                "last".to_string(),
                Link::new(Self::paged_href(href, extra, &request.with_page(last_page))),
            );
        }
        links
    }

    fn paged_href(href: &str, extra: &[(String, String)], request: &PageRequest) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in extra {
            query.append_pair(key, value);
        }
        query.append_pair(PAGE_PARAM, &request.page.to_string());
        query.append_pair(SIZE_PARAM, &request.size.to_string());
        for order in &request.sort {
            query.append_pair(SORT_PARAM, &order.to_query_value());
        }
        format!("{}?{}", href, query.finish())
    }

    /// Links of the root resource: one collection link per binding
    pub fn root_links<'a>(&self, bindings: impl IntoIterator<Item = &'a RepositoryBinding>) -> Links {
        let mut links = Links::new();
        for binding in bindings {
            links.insert(
                binding.collection_rel.clone(),
                Link::from_template(&self.collection_template(binding)),
            );
        }
        links.insert("self".to_string(), Link::new(format!("{}/", self.base_path)));
        links
    }
}

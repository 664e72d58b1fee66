//! Hypermedia link descriptors and URI templates

use indexmap::IndexMap;
use serde::Serialize;

/// A named, addressable reference rendered under `_links`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub href: String,
    pub templated: bool,
}

impl Link {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            templated: false,
        }
    }

    pub fn from_template(template: &UriTemplate) -> Self {
        Self {
            href: template.to_string(),
            templated: template.is_templated(),
        }
    }
}

/// Relation name -> link, in insertion order
pub type Links = IndexMap<String, Link>;

/// A URI with RFC 6570 form-style query variables
///
/// `/persons/search/nameStartsWith` with variables `name, page, size, sort`
/// renders as `/persons/search/nameStartsWith{?name,page,size,sort}`. When the
/// base already has a query string the continuation form `{&...}` is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    base: String,
    variables: Vec<String>,
}

impl UriTemplate {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            variables: Vec::new(),
        }
    }

    pub fn variable(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.variables.contains(&name) {
            self.variables.push(name);
        }
        self
    }

    pub fn variables_from<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self = self.variable(name);
        }
        self
    }

    /// Placeholder names in declaration order
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn is_templated(&self) -> bool {
        !self.variables.is_empty()
    }

    /// Substitute the given values; variables without a value are dropped
    pub fn expand(&self, values: &[(&str, &str)]) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        let mut any = false;
        for name in &self.variables {
            for (key, value) in values.iter().filter(|(k, _)| k == name) {
                query.append_pair(key, value);
                any = true;
            }
        }
        if !any {
            return self.base.clone();
        }
        let separator = if self.base.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.base, separator, query.finish())
    }
}

impl std::fmt::Display for UriTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.variables.is_empty() {
            return f.write_str(&self.base);
        }
        let operator = if self.base.contains('?') { '&' } else { '?' };
        write!(f, "{}{{{}{}}}", self.base, operator, self.variables.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_template_is_not_templated() {
        let template = UriTemplate::new("/persons/1");
        assert!(!template.is_templated());
        assert_eq!(template.to_string(), "/persons/1");
        assert_eq!(Link::from_template(&template), Link::new("/persons/1"));
    }

    #[test]
    fn test_query_template_rendering() {
        let template = UriTemplate::new("/persons/search/nameStartsWith")
            .variables_from(["name", "page", "size", "sort"]);
        assert_eq!(
            template.to_string(),
            "/persons/search/nameStartsWith{?name,page,size,sort}"
        );
        assert!(Link::from_template(&template).templated);
    }

    #[test]
    fn test_continuation_template() {
        let template = UriTemplate::new("/persons?projection=last-name").variables_from(["page"]);
        assert_eq!(template.to_string(), "/persons?projection=last-name{&page}");
    }

    #[test]
    fn test_duplicate_variables_are_ignored() {
        let template = UriTemplate::new("/x").variable("page").variable("page");
        assert_eq!(template.variables(), ["page".to_string()]);
    }

    #[test]
    fn test_expand() {
        let template = UriTemplate::new("/persons/search/byName").variables_from(["name", "page"]);
        assert_eq!(
            template.expand(&[("name", "Iv an"), ("page", "1")]),
            "/persons/search/byName?name=Iv+an&page=1"
        );
        assert_eq!(template.expand(&[]), "/persons/search/byName");
    }
}

//! Paging and sorting parameters and paged results

use serde::Serialize;
use std::cmp::Ordering;
use thiserror::Error;

/// Query parameter names reserved by the framework
pub const PAGE_PARAM: &str = "page";
pub const SIZE_PARAM: &str = "size";
pub const SORT_PARAM: &str = "sort";
pub const PROJECTION_PARAM: &str = "projection";

/// Errors raised while reading paging parameters
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("invalid value '{value}' for parameter '{param}'")]
    InvalidNumber { param: &'static str, value: String },

    #[error("invalid sort expression '{0}'")]
    InvalidSort(String),
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

/// One `sort=property,direction` clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    pub property: String,
    pub direction: Direction,
}

impl SortOrder {
    /// Parse `property` or `property,asc|desc`
    pub fn parse(raw: &str) -> Result<Self, QueryError> {
        let mut parts = raw.split(',').map(str::trim);
        let property = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| QueryError::InvalidSort(raw.to_string()))?;

        let direction = match parts.next() {
            None => Direction::Asc,
            Some(dir) if dir.eq_ignore_ascii_case("asc") => Direction::Asc,
            Some(dir) if dir.eq_ignore_ascii_case("desc") => Direction::Desc,
            Some(_) => return Err(QueryError::InvalidSort(raw.to_string())),
        };

        if parts.next().is_some() {
            return Err(QueryError::InvalidSort(raw.to_string()));
        }

        Ok(Self {
            property: property.to_string(),
            direction,
        })
    }

    pub fn to_query_value(&self) -> String {
        match self.direction {
            Direction::Asc => format!("{},asc", self.property),
            Direction::Desc => format!("{},desc", self.property),
        }
    }
}

/// Paging parameters as they appeared on the request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PagingParams {
    pub page: Option<usize>,
    pub size: Option<usize>,
    pub sort: Vec<SortOrder>,
}

impl PagingParams {
    /// Pick `page`, `size` and `sort` out of decoded query pairs
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self, QueryError> {
        let mut params = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                PAGE_PARAM => params.page = Some(parse_number(PAGE_PARAM, value)?),
                SIZE_PARAM => params.size = Some(parse_number(SIZE_PARAM, value)?),
                SORT_PARAM => params.sort.push(SortOrder::parse(value)?),
                _ => {}
            }
        }
        Ok(params)
    }

    pub fn is_empty(&self) -> bool {
        self.page.is_none() && self.size.is_none() && self.sort.is_empty()
    }

    /// Resolve defaults and the size cap into a page request
    pub fn to_request(&self, default_size: usize, max_size: usize) -> PageRequest {
        PageRequest {
            page: self.page.unwrap_or(0),
            size: self.size.unwrap_or(default_size).clamp(1, max_size.max(1)),
            sort: self.sort.clone(),
        }
    }
}

fn parse_number(param: &'static str, value: &str) -> Result<usize, QueryError> {
    value.trim().parse().map_err(|_| QueryError::InvalidNumber {
        param,
        value: value.to_string(),
    })
}

/// Zero-based page request handed to the persistence collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub size: usize,
    pub sort: Vec<SortOrder>,
}

impl PageRequest {
    pub fn new(page: usize, size: usize) -> Self {
        Self {
            page,
            size: size.max(1),
            sort: Vec::new(),
        }
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.size)
    }

    /// Same request pointing at another page number
    pub fn with_page(&self, page: usize) -> Self {
        Self {
            page,
            size: self.size,
            sort: self.sort.clone(),
        }
    }
}

/// A page of results plus the total count
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub request: PageRequest,
    pub total_elements: usize,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: PageRequest, total_elements: usize) -> Self {
        Self {
            content,
            request,
            total_elements,
        }
    }

    /// Slice a fully materialized result according to the request
    pub fn from_all(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len();
        let content = all
            .into_iter()
            .skip(request.offset())
            .take(request.size)
            .collect();
        Self::new(content, request, total)
    }

    pub fn metadata(&self) -> PageMetadata {
        PageMetadata::new(self.request.page, self.request.size, self.total_elements)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            request: self.request,
            total_elements: self.total_elements,
        }
    }
}

/// Page metadata rendered in collection responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub size: usize,
    pub total_elements: usize,
    pub total_pages: usize,
    pub number: usize,
}

impl PageMetadata {
    pub fn new(number: usize, size: usize, total_elements: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            total_elements,
            total_pages: total_elements.div_ceil(size),
            number,
        }
    }

    pub fn has_next(&self) -> bool {
        self.number < self.total_pages.saturating_sub(1)
    }

    pub fn has_prev(&self) -> bool {
        self.number > 0
    }
}

/// Order two JSON values for sorting; `null` sorts first
pub fn compare_values(a: &serde_json::Value, b: &serde_json::Value) -> Ordering {
    use serde_json::Value;
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

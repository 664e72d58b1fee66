//! Configuration loading and management
//!
//! [`ExposureConfig`] is read once at startup and is immutable afterwards. It
//! is passed explicitly to the registries and the handler.

use crate::core::error::ConfigurationError;
use crate::core::repository::Operation;
use anyhow::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Which repository declarations are exposed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectionStrategy {
    /// Every repository
    All,

    /// Explicit annotation decides; unannotated declarations fall back to
    /// their visibility
    #[default]
    Default,

    /// Public declarations only, annotations ignored
    Visibility,

    /// Only declarations annotated as exported
    Annotated,
}

/// Per-resource authorization rules, one policy string per operation
///
/// Policy strings use the syntax of [`AuthPolicy::parse_policy`](crate::core::auth::AuthPolicy::parse_policy).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    /// Resource path, e.g. `persons`
    pub resource: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_collection: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_item: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<String>,
}

impl AccessRule {
    /// Configured (operation, policy) pairs
    pub fn policies(&self) -> impl Iterator<Item = (Operation, &str)> {
        [
            (Operation::ReadCollection, &self.read_collection),
            (Operation::ReadItem, &self.read_item),
            (Operation::Create, &self.create),
            (Operation::Update, &self.update),
            (Operation::Delete, &self.delete),
        ]
        .into_iter()
        .filter_map(|(op, policy)| policy.as_deref().map(|p| (op, p)))
    }
}

/// Process-wide exposure configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposureConfig {
    /// Prefix of every exposed path, e.g. `/api`; empty for the root
    pub base_path: String,

    pub detection_strategy: DetectionStrategy,

    /// Entity types whose identifier is rendered in representations
    pub expose_ids_for: Vec<String>,

    /// Abstract capability name -> concrete entity type
    pub type_mappings: IndexMap<String, String>,

    pub default_page_size: usize,
    pub max_page_size: usize,

    /// Whether POST responses carry the created representation
    pub return_body_on_create: bool,

    /// Whether PUT/PATCH responses carry the updated representation
    pub return_body_on_update: bool,

    /// Upper bound for policy + persistence calls of one request
    pub request_timeout_ms: Option<u64>,

    /// Origins allowed by the CORS layer; empty disables CORS handling
    pub cors_allowed_origins: Vec<String>,

    pub access_rules: Vec<AccessRule>,
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            base_path: String::new(),
            detection_strategy: DetectionStrategy::Default,
            expose_ids_for: Vec::new(),
            type_mappings: IndexMap::new(),
            default_page_size: 20,
            max_page_size: 1000,
            return_body_on_create: true,
            return_body_on_update: true,
            request_timeout_ms: None,
            cors_allowed_origins: Vec::new(),
            access_rules: Vec::new(),
        }
    }
}

impl ExposureConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self.normalized()
    }

    pub fn with_detection_strategy(mut self, strategy: DetectionStrategy) -> Self {
        self.detection_strategy = strategy;
        self
    }

    pub fn expose_ids_for(mut self, entity_type: impl Into<String>) -> Self {
        self.expose_ids_for.push(entity_type.into());
        self
    }

    pub fn with_type_mapping(
        mut self,
        capability: impl Into<String>,
        concrete: impl Into<String>,
    ) -> Self {
        self.type_mappings.insert(capability.into(), concrete.into());
        self
    }

    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_access_rule(mut self, rule: AccessRule) -> Self {
        self.access_rules.push(rule);
        self
    }

    /// Whether representations of `entity_type` include the identifier
    pub fn exposes_id(&self, entity_type: &str) -> bool {
        self.expose_ids_for.iter().any(|t| t == entity_type)
    }

    /// Canonical form: leading slash, no trailing slash, empty for root
    pub fn normalized(mut self) -> Self {
        let trimmed = self.base_path.trim().trim_matches('/');
        self.base_path = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        };
        self
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.default_page_size == 0 {
            return Err(ConfigurationError::Invalid(
                "default_page_size must be positive".to_string(),
            ));
        }
        if self.max_page_size < self.default_page_size {
            return Err(ConfigurationError::Invalid(format!(
                "max_page_size ({}) is smaller than default_page_size ({})",
                self.max_page_size, self.default_page_size
            )));
        }
        if self.base_path.contains("//") || self.base_path.contains(['?', '#', ' ']) {
            return Err(ConfigurationError::Invalid(format!(
                "invalid base path '{}'",
                self.base_path
            )));
        }
        for (capability, concrete) in &self.type_mappings {
            if capability.is_empty() || concrete.is_empty() {
                return Err(ConfigurationError::Invalid(
                    "type mappings need both a capability and a concrete type".to_string(),
                ));
            }
        }
        Ok(())
    }
}

//! Authorization collaborator for exposed repositories
//!
//! Provides:
//! - [`Principal`] extracted from the request by a [`PrincipalExtractor`]
//! - [`AccessPolicy`], the `allow(principal, binding, operation)` contract
//! - [`RuleBasedPolicy`], a policy driven by per-resource configuration rules

use crate::config::AccessRule;
use crate::core::repository::{Operation, RepositoryBinding};
use async_trait::async_trait;
use axum::http::HeaderMap;
use std::collections::HashMap;

/// Header carrying the caller's user id
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the caller's comma-separated roles
pub const USER_ROLES_HEADER: &str = "x-user-roles";
/// Header identifying a calling service
pub const SERVICE_NAME_HEADER: &str = "x-service-name";

/// Caller identity attached to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// Authenticated user
    User { user_id: String, roles: Vec<String> },

    /// Service-to-service communication
    Service { service_name: String },

    /// No authentication (public access)
    Anonymous,
}

impl Principal {
    pub fn is_service(&self) -> bool {
        matches!(self, Principal::Service { .. })
    }

    pub fn has_role(&self, role: &str) -> bool {
        match self {
            Principal::User { roles, .. } => roles.iter().any(|r| r == role),
            _ => false,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.has_role("admin")
    }
}

/// Authorization policy for an operation
#[derive(Debug, Clone)]
pub enum AuthPolicy {
    /// Public access (no auth required)
    Public,

    /// Any authenticated caller
    Authenticated,

    /// User must have one of these roles
    HasRole(Vec<String>),

    /// Service-to-service only
    ServiceOnly,

    /// Admin only
    AdminOnly,

    /// Nobody
    Deny,

    /// Combination of policies (AND)
    And(Vec<AuthPolicy>),

    /// Combination of policies (OR)
    Or(Vec<AuthPolicy>),
}

impl AuthPolicy {
    /// Check if a principal satisfies this policy
    pub fn check(&self, principal: &Principal) -> bool {
        match self {
            AuthPolicy::Public => true,

            AuthPolicy::Authenticated => !matches!(principal, Principal::Anonymous),

            AuthPolicy::HasRole(required) => required.iter().any(|r| principal.has_role(r)),

            AuthPolicy::ServiceOnly => principal.is_service(),

            AuthPolicy::AdminOnly => principal.is_admin(),

            AuthPolicy::Deny => false,

            AuthPolicy::And(policies) => policies.iter().all(|p| p.check(principal)),

            AuthPolicy::Or(policies) => policies.iter().any(|p| p.check(principal)),
        }
    }

    /// Parse policy from string (for YAML config)
    pub fn parse_policy(s: &str) -> Self {
        match s {
            "public" => AuthPolicy::Public,
            "authenticated" => AuthPolicy::Authenticated,
            "service_only" => AuthPolicy::ServiceOnly,
            "admin_only" => AuthPolicy::AdminOnly,
            "deny" => AuthPolicy::Deny,
            s if s.starts_with("role:") => {
                let roles = s["role:".len()..]
                    .split('|')
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .collect();
                AuthPolicy::HasRole(roles)
            }
            s if s.starts_with("service_or_role:") => {
                let role = s["service_or_role:".len()..].trim().to_string();
                AuthPolicy::Or(vec![AuthPolicy::ServiceOnly, AuthPolicy::HasRole(vec![role])])
            }
            _ => AuthPolicy::Authenticated, // Default
        }
    }
}

/// External policy collaborator consulted before each operation
#[async_trait]
pub trait AccessPolicy: Send + Sync {
    async fn allow(
        &self,
        principal: &Principal,
        binding: &RepositoryBinding,
        operation: Operation,
    ) -> bool;
}

/// Policy built from configured [`AccessRule`]s
///
/// Operations without a rule fall back to `default_policy`.
pub struct RuleBasedPolicy {
    rules: HashMap<(String, Operation), AuthPolicy>,
    default_policy: AuthPolicy,
}

impl RuleBasedPolicy {
    pub fn new(default_policy: AuthPolicy) -> Self {
        Self {
            rules: HashMap::new(),
            default_policy,
        }
    }

    /// Build from configuration rules, keyed by resource path
    pub fn from_rules(rules: &[AccessRule]) -> Self {
        let mut policy = Self::new(AuthPolicy::Public);
        for rule in rules {
            for (op, raw) in rule.policies() {
                policy
                    .rules
                    .insert((rule.resource.clone(), op), AuthPolicy::parse_policy(raw));
            }
        }
        policy
    }

    pub fn with_rule(mut self, resource: &str, op: Operation, policy: AuthPolicy) -> Self {
        self.rules.insert((resource.to_string(), op), policy);
        self
    }

    fn policy_for(&self, resource: &str, op: Operation) -> &AuthPolicy {
        self.rules
            .get(&(resource.to_string(), op))
            .unwrap_or(&self.default_policy)
    }
}

#[async_trait]
impl AccessPolicy for RuleBasedPolicy {
    async fn allow(
        &self,
        principal: &Principal,
        binding: &RepositoryBinding,
        operation: Operation,
    ) -> bool {
        self.policy_for(&binding.path, operation).check(principal)
    }
}

/// Extracts the principal of a request from its headers
pub trait PrincipalExtractor: Send + Sync {
    fn extract(&self, headers: &HeaderMap) -> Principal;
}

/// Default extractor reading the `x-user-*` and `x-service-name` headers
///
/// Authentication itself happens upstream; these headers are trusted.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderPrincipalExtractor;

impl PrincipalExtractor for HeaderPrincipalExtractor {
    fn extract(&self, headers: &HeaderMap) -> Principal {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        if let Some(service_name) = header(SERVICE_NAME_HEADER) {
            return Principal::Service {
                service_name: service_name.to_string(),
            };
        }

        match header(USER_ID_HEADER) {
            Some(user_id) => Principal::User {
                user_id: user_id.to_string(),
                roles: header(USER_ROLES_HEADER)
                    .map(|roles| {
                        roles
                            .split(',')
                            .map(|r| r.trim().to_string())
                            .filter(|r| !r.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            None => Principal::Anonymous,
        }
    }
}

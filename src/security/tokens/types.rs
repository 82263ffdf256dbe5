use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scope::Scope;
use crate::security::rate_limit::RateLimits;

fn default_true() -> bool {
    true
}

/// One issued token as persisted in the token file.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub token_id: String,
    pub name: String,
    /// Bearer secret. Never logged; see [`crate::security::fingerprint`].
    pub token: String,
    #[serde(default)]
    pub scopes: BTreeSet<Scope>,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_allowlist: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_denylist: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_allowlist: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_denylist: Option<Vec<String>>,

    #[serde(default)]
    pub rate_limits: RateLimits,
    /// Per-operation limits, checked after `rate_limits` in their own buckets.
    #[serde(default)]
    pub operation_limits: std::collections::BTreeMap<String, RateLimits>,
    #[serde(default)]
    pub require_approval: BTreeSet<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl TokenRecord {
    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }

    pub fn is_admin(&self) -> bool {
        self.has_scope(Scope::Admin)
    }

    /// The expiry instant, if it lies before `now`.
    pub fn expired_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires.filter(|expires| now > *expires)
    }

    pub fn summary(&self) -> TokenSummary {
        TokenSummary {
            token_id: self.token_id.clone(),
            name: self.name.clone(),
            scopes: self.scopes.clone(),
            enabled: self.enabled,
            created: self.created,
            expires: self.expires,
            last_used: self.last_used,
            metadata: self.metadata.clone(),
        }
    }
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("token_id", &self.token_id)
            .field("name", &self.name)
            .field("token", &"<redacted>")
            .field("scopes", &self.scopes)
            .field("created", &self.created)
            .field("expires", &self.expires)
            .field("last_used", &self.last_used)
            .field("enabled", &self.enabled)
            .field("path_allowlist", &self.path_allowlist)
            .field("path_denylist", &self.path_denylist)
            .field("command_allowlist", &self.command_allowlist)
            .field("command_denylist", &self.command_denylist)
            .field("rate_limits", &self.rate_limits)
            .field("operation_limits", &self.operation_limits)
            .field("require_approval", &self.require_approval)
            .finish_non_exhaustive()
    }
}

/// Token metadata safe to hand to an admin surface (no secret).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSummary {
    pub token_id: String,
    pub name: String,
    pub scopes: BTreeSet<Scope>,
    pub enabled: bool,
    pub created: DateTime<Utc>,
    pub expires: Option<DateTime<Utc>>,
    pub last_used: Option<DateTime<Utc>>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Process-wide rules applied on top of every token's own rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalRules {
    #[serde(default)]
    pub global_denylist: Vec<String>,
    #[serde(default)]
    pub require_approval_operations: BTreeSet<String>,
}

/// On-disk layout of the token file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenFile {
    #[serde(default)]
    pub tokens: Vec<TokenRecord>,
    #[serde(default)]
    pub global_rules: GlobalRules,
}

/// Parameters for issuing a token. Unset fields mean "no restriction".
#[derive(Debug, Clone, Default)]
pub struct NewToken {
    pub name: String,
    pub scopes: BTreeSet<Scope>,
    pub expires_in_days: Option<u32>,
    /// Use this secret instead of generating one (legacy migration).
    pub secret: Option<String>,
    /// Use this id instead of generating one.
    pub token_id: Option<String>,
    pub path_allowlist: Option<Vec<String>>,
    pub path_denylist: Option<Vec<String>>,
    pub command_allowlist: Option<Vec<String>>,
    pub command_denylist: Option<Vec<String>>,
    pub rate_limits: RateLimits,
    pub operation_limits: std::collections::BTreeMap<String, RateLimits>,
    pub require_approval: BTreeSet<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl NewToken {
    pub fn new(name: impl Into<String>, scopes: impl IntoIterator<Item = Scope>) -> Self {
        Self {
            name: name.into(),
            scopes: scopes.into_iter().collect(),
            ..Self::default()
        }
    }
}

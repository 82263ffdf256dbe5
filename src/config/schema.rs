use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::security::rate_limit::RateLimits;

// ── Gateway access-control config ─────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Path to config.toml - set by the loader, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    /// Token file location; `~` is expanded (default: ~/.agentgate/tokens.json)
    #[serde(default = "default_tokens_path")]
    pub tokens_path: String,
    /// Upper bound on an approval wait, in seconds (default: 30)
    #[serde(default = "default_approval_timeout_secs")]
    pub approval_timeout_secs: u64,
    /// Limits given to tokens created without any of their own
    #[serde(default = "default_rate_limits")]
    pub default_rate_limits: RateLimits,
    /// Seed legacy secrets as admin tokens when no token file exists (default: true)
    #[serde(default = "default_true")]
    pub auto_migrate: bool,
    /// Legacy single or comma-separated secret (env: AUTH_TOKEN)
    #[serde(skip)]
    pub legacy_auth_token: Option<String>,
    /// Legacy one-secret-per-line file (env: AUTH_TOKEN_FILE)
    #[serde(skip)]
    pub legacy_auth_token_file: Option<PathBuf>,
}

fn default_tokens_path() -> String {
    "~/.agentgate/tokens.json".into()
}

fn default_approval_timeout_secs() -> u64 {
    30
}

fn default_rate_limits() -> RateLimits {
    [("requests_per_minute".to_string(), 120)].into()
}

fn default_true() -> bool {
    true
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            tokens_path: default_tokens_path(),
            approval_timeout_secs: default_approval_timeout_secs(),
            default_rate_limits: default_rate_limits(),
            auto_migrate: true,
            legacy_auth_token: None,
            legacy_auth_token_file: None,
        }
    }
}

impl GatewayConfig {
    pub fn resolved_tokens_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.tokens_path).as_ref())
    }

    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.approval_timeout_secs)
    }
}

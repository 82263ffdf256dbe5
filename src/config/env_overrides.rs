use super::GatewayConfig;
use std::path::PathBuf;

impl GatewayConfig {
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("AGENTGATE_TOKENS_PATH")
            && !path.is_empty()
        {
            self.tokens_path = path;
        }

        if let Ok(secs_str) = std::env::var("AGENTGATE_APPROVAL_TIMEOUT_SECS")
            && let Ok(secs) = secs_str.parse::<u64>()
            && secs > 0
        {
            self.approval_timeout_secs = secs;
        }

        if let Ok(token) = std::env::var("AUTH_TOKEN")
            && !token.trim().is_empty()
        {
            self.legacy_auth_token = Some(token);
        }

        if let Ok(file) = std::env::var("AUTH_TOKEN_FILE")
            && !file.is_empty()
        {
            self.legacy_auth_token_file = Some(PathBuf::from(shellexpand::tilde(&file).as_ref()));
        }
    }
}

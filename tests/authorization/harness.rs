#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use agentgate::Authorizer;
use agentgate::security::tokens::{NewToken, TokenStore};
use tempfile::TempDir;

pub struct Gate {
    pub dir: TempDir,
    pub authorizer: Arc<Authorizer>,
}

impl Gate {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(5))
    }

    pub fn with_timeout(approval_timeout: Duration) -> Self {
        let dir = TempDir::new().expect("temp dir should be created");
        let store = TokenStore::load(dir.path().join("tokens.json"))
            .expect("empty token store should load");
        let authorizer = Authorizer::new(store).with_approval_timeout(approval_timeout);
        Self {
            dir,
            authorizer: Arc::new(authorizer),
        }
    }

    /// Issue a token and return its Authorization header value.
    pub fn issue(&self, spec: NewToken) -> String {
        let token = self
            .authorizer
            .tokens()
            .create(spec)
            .expect("token should be created");
        bearer(&token.token)
    }
}

pub fn bearer(secret: &str) -> String {
    format!("Bearer {secret}")
}

/// Poll until an approval request shows up, then return its id.
pub async fn next_pending(authorizer: &Authorizer) -> String {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(pending) = authorizer.list_pending_approvals().first() {
                return pending.request_id.clone();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("an approval request should be queued")
}

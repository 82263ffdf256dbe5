use std::fs;
use std::time::Duration;

use agentgate::security::tokens::Scope;
use agentgate::{AccessRequest, Authorizer, FailureKind, GatewayConfig};
use tempfile::TempDir;

fn config_in(dir: &TempDir) -> GatewayConfig {
    GatewayConfig {
        config_path: dir.path().join("config.toml"),
        tokens_path: dir.path().join("state/tokens.json").display().to_string(),
        ..GatewayConfig::default()
    }
}

#[tokio::test]
async fn first_run_migrates_legacy_secrets() {
    let dir = TempDir::new().unwrap();
    let legacy_file = dir.path().join("legacy.txt");
    fs::write(&legacy_file, "from-file\n\n").unwrap();
    let config = GatewayConfig {
        legacy_auth_token: Some("from-env-a, from-env-b".into()),
        legacy_auth_token_file: Some(legacy_file),
        approval_timeout_secs: 7,
        ..config_in(&dir)
    };

    let authorizer = Authorizer::bootstrap(&config).unwrap();
    assert_eq!(authorizer.approval_timeout(), Duration::from_secs(7));

    let tokens = authorizer.list_tokens();
    assert_eq!(tokens.len(), 3);
    assert!(tokens.iter().all(|t| t.scopes.contains(&Scope::Admin)));
    assert!(tokens.iter().all(|t| t.metadata["migrated"] == true));

    let identity = authorizer
        .authorize(Some("Bearer from-file"), &AccessRequest::new("fs_rm"))
        .await
        .unwrap();
    assert!(identity.scopes.contains(&Scope::Admin));
}

#[test]
fn existing_token_file_is_not_reseeded() {
    let dir = TempDir::new().unwrap();
    let config = GatewayConfig {
        legacy_auth_token: Some("first".into()),
        ..config_in(&dir)
    };
    assert_eq!(Authorizer::bootstrap(&config).unwrap().list_tokens().len(), 1);

    let config = GatewayConfig {
        legacy_auth_token: Some("second".into()),
        ..config
    };
    let authorizer = Authorizer::bootstrap(&config).unwrap();
    assert_eq!(authorizer.list_tokens().len(), 1);
}

#[tokio::test]
async fn unconfigured_gateway_rejects_everything() {
    let dir = TempDir::new().unwrap();
    let config = GatewayConfig {
        legacy_auth_token: Some("ignored".into()),
        auto_migrate: false,
        ..config_in(&dir)
    };

    let authorizer = Authorizer::bootstrap(&config).unwrap();
    assert!(authorizer.is_unconfigured());

    let err = authorizer
        .authorize(Some("Bearer ignored"), &AccessRequest::new("fs_ls"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Unauthenticated);
}

#[test]
fn config_file_drives_bootstrap() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");
    let tokens_path = dir.path().join("tokens.json");
    fs::write(
        &config_path,
        format!(
            "tokens_path = {:?}\napproval_timeout_secs = 3\nauto_migrate = false\n",
            tokens_path.display().to_string()
        ),
    )
    .unwrap();

    let mut config = GatewayConfig::load(Some(config_path.as_path())).unwrap();
    config.legacy_auth_token = None;
    config.legacy_auth_token_file = None;
    assert_eq!(config.resolved_tokens_path(), tokens_path);

    let authorizer = Authorizer::bootstrap(&config).unwrap();
    assert_eq!(authorizer.approval_timeout(), Duration::from_secs(3));
    assert_eq!(authorizer.tokens().path(), tokens_path);
}

use std::fs;
use std::sync::Arc;

use agentgate::security::RateWindow;
use agentgate::security::tokens::{GlobalRules, NewToken, Scope};
use agentgate::{AccessRequest, AuthFailure, Denial, FailureKind};

use super::harness::{Gate, next_pending};

#[tokio::test]
async fn denylist_wins_inside_allowed_tree() {
    let gate = Gate::new();
    let project = gate.dir.path().join("project");
    fs::create_dir_all(project.join(".git")).unwrap();

    let mut spec = NewToken::new("editor", [Scope::Read, Scope::Write]);
    spec.path_allowlist = Some(vec![project.display().to_string()]);
    spec.path_denylist = Some(vec![project.join(".git").display().to_string()]);
    spec.rate_limits.insert("requests_per_minute".into(), 10);
    let header = gate.issue(spec);
    let auth = &gate.authorizer;

    let ok = AccessRequest::new("fs_write").with_path(project.join("src/main.rs"));
    let identity = auth.authorize(Some(header.as_str()), &ok).await.unwrap();

    let denied = AccessRequest::new("fs_write").with_path(project.join(".git/config"));
    let err = auth.authorize(Some(header.as_str()), &denied).await.unwrap_err();
    assert!(matches!(
        err,
        AuthFailure::Forbidden(Denial::PathNotAllowed { .. })
    ));

    let outside = AccessRequest::new("fs_read").with_path("/var/log/syslog");
    let err = auth.authorize(Some(header.as_str()), &outside).await.unwrap_err();
    assert_eq!(err.status_code(), 403);

    // only the successful request was counted
    assert_eq!(
        auth.limiter()
            .usage(&identity.fingerprint, None, RateWindow::Minute),
        1
    );
}

#[tokio::test]
async fn traversal_out_of_allowlist_is_denied() {
    let gate = Gate::new();
    let project = gate.dir.path().join("project");
    fs::create_dir_all(&project).unwrap();

    let mut spec = NewToken::new("reader", [Scope::Read]);
    spec.path_allowlist = Some(vec![project.display().to_string()]);
    let header = gate.issue(spec);

    let sneaky = AccessRequest::new("fs_read").with_path(project.join("../../etc/passwd"));
    let err = gate
        .authorizer
        .authorize(Some(header.as_str()), &sneaky)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Forbidden);
}

#[tokio::test]
async fn global_denylist_applies_to_unrestricted_tokens() {
    let gate = Gate::new();
    let vault = gate.dir.path().join("vault");
    gate.authorizer
        .tokens()
        .set_global_rules(GlobalRules {
            global_denylist: vec![vault.display().to_string()],
            ..GlobalRules::default()
        })
        .unwrap();
    let header = gate.issue(NewToken::new("reader", [Scope::Read]));

    let request = AccessRequest::new("fs_read").with_path(vault.join("keys.json"));
    let err = gate
        .authorizer
        .authorize(Some(header.as_str()), &request)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("path not allowed"));
}

#[tokio::test]
async fn command_allowlist_and_sudo_scope() {
    let gate = Gate::new();
    let mut spec = NewToken::new("deployer", [Scope::Exec]);
    spec.command_allowlist = Some(vec!["git".into(), "npm".into()]);
    let header = gate.issue(spec);
    let auth = &gate.authorizer;

    let git = AccessRequest::new("exec").with_command(["git", "pull"]);
    auth.authorize(Some(header.as_str()), &git).await.unwrap();

    let curl = AccessRequest::new("exec").with_command(["curl", "https://example.com"]);
    let err = auth.authorize(Some(header.as_str()), &curl).await.unwrap_err();
    assert_eq!(err.to_string(), "forbidden: command not allowed: curl");

    let sudo = AccessRequest::new("exec").with_command(["sudo", "git", "pull"]);
    let err = auth.authorize(Some(header.as_str()), &sudo).await.unwrap_err();
    assert!(matches!(
        err,
        AuthFailure::Forbidden(Denial::MissingScope {
            scope: Scope::ExecSudo,
            ..
        })
    ));
}

#[tokio::test]
async fn global_sudo_approval_escalates_exec() {
    let gate = Gate::new();
    gate.authorizer
        .tokens()
        .set_global_rules(GlobalRules {
            require_approval_operations: ["exec:sudo".to_string()].into(),
            ..GlobalRules::default()
        })
        .unwrap();
    let header = gate.issue(NewToken::new("ops", [Scope::Exec, Scope::ExecSudo]));
    let auth = Arc::clone(&gate.authorizer);

    // plain exec is not held for approval
    auth.authorize(
        Some(header.as_str()),
        &AccessRequest::new("exec").with_command(["uptime"]),
    )
    .await
    .unwrap();

    let waiter = {
        let auth = Arc::clone(&auth);
        let header = header.clone();
        tokio::spawn(async move {
            let request =
                AccessRequest::new("exec").with_command(["sudo", "systemctl", "restart", "nginx"]);
            auth.authorize(Some(header.as_str()), &request).await
        })
    };

    let request_id = next_pending(&auth).await;
    let pending = auth.list_pending_approvals();
    assert_eq!(pending[0].details["command"][0], "sudo");
    assert!(pending[0].age_seconds >= 0.0);
    auth.approve(&request_id).unwrap();

    waiter.await.unwrap().unwrap();
    assert!(auth.approvals().is_empty());
}

#[tokio::test]
async fn expired_token_is_rejected_with_401() {
    let gate = Gate::new();
    let path = gate.dir.path().join("expired.json");
    fs::write(
        &path,
        r#"{
  "tokens": [
    {
      "token_id": "stale",
      "name": "Stale",
      "token": "stale-secret",
      "scopes": ["admin"],
      "created": "2020-01-01T00:00:00Z",
      "expires": "2021-01-01T00:00:00Z"
    }
  ]
}"#,
    )
    .unwrap();
    let store = agentgate::security::TokenStore::load(&path).unwrap();
    let auth = agentgate::Authorizer::new(store);

    let err = auth
        .authorize(Some("Bearer stale-secret"), &AccessRequest::new("fs_ls"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Expired);
    assert_eq!(err.status_code(), 401);
}

use std::sync::Arc;
use std::time::Duration;

use agentgate::security::tokens::{NewToken, Scope};
use agentgate::{AccessRequest, FailureKind};

use super::harness::{Gate, bearer, next_pending};

#[test]
fn admin_surface_requires_admin_scope() {
    let gate = Gate::new();
    let admin = gate.issue(NewToken::new("root", [Scope::Admin]));
    let reader = gate.issue(NewToken::new("reader", [Scope::Read]));

    let identity = gate.authorizer.authorize_admin(Some(admin.as_str())).unwrap();
    assert_eq!(identity.name, "root");

    let err = gate.authorizer.authorize_admin(Some(reader.as_str())).unwrap_err();
    assert_eq!(err.status_code(), 403);
    let err = gate.authorizer.authorize_admin(None).unwrap_err();
    assert_eq!(err.status_code(), 401);
}

#[test]
fn token_listing_hides_secrets() {
    let gate = Gate::new();
    let header = gate.issue(NewToken::new("reader", [Scope::Read]));
    let secret = header.trim_start_matches("Bearer ");

    let listing = serde_json::to_string(&gate.authorizer.list_tokens()).unwrap();
    assert!(listing.contains("reader"));
    assert!(!listing.contains(secret));
}

#[tokio::test]
async fn rotation_retires_old_secret() {
    let gate = Gate::new();
    let token = gate
        .authorizer
        .tokens()
        .create(NewToken::new("bot", [Scope::Read]))
        .unwrap();
    let request = AccessRequest::new("fs_read");

    let new_secret = gate.authorizer.rotate_token(&token.token_id).unwrap();

    let err = gate
        .authorizer
        .authorize(Some(bearer(&token.token).as_str()), &request)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Unauthenticated);

    let identity = gate
        .authorizer
        .authorize(Some(bearer(&new_secret).as_str()), &request)
        .await
        .unwrap();
    assert_eq!(identity.token_id, token.token_id);
    assert_eq!(
        gate.authorizer
            .rotate_token("missing")
            .unwrap_err()
            .status_code(),
        404
    );
}

#[tokio::test]
async fn disabled_token_stays_disabled() {
    let gate = Gate::new();
    let token = gate
        .authorizer
        .tokens()
        .create(NewToken::new("bot", [Scope::Read]))
        .unwrap();

    gate.authorizer.disable_token(&token.token_id).unwrap();
    gate.authorizer.disable_token(&token.token_id).unwrap();

    let err = gate
        .authorizer
        .authorize(Some(bearer(&token.token).as_str()), &AccessRequest::new("fs_read"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Forbidden);
    assert!(err.to_string().contains("disabled"));
    assert_eq!(
        gate.authorizer
            .disable_token("missing")
            .unwrap_err()
            .kind(),
        FailureKind::NotFound
    );
}

#[tokio::test]
async fn first_decision_wins() {
    let gate = Gate::new();
    let mut spec = NewToken::new("cleaner", [Scope::WriteDestructive]);
    spec.require_approval = ["fs_rm".to_string()].into();
    let header = gate.issue(spec);
    let auth = Arc::clone(&gate.authorizer);

    let waiter = {
        let auth = Arc::clone(&auth);
        tokio::spawn(async move {
            auth.authorize(Some(header.as_str()), &AccessRequest::new("fs_rm"))
                .await
        })
    };

    let request_id = next_pending(&auth).await;
    auth.approve(&request_id).unwrap();
    assert_eq!(
        auth.deny(&request_id).unwrap_err().kind(),
        FailureKind::NotFound
    );
    assert_eq!(
        auth.approve(&request_id).unwrap_err().kind(),
        FailureKind::NotFound
    );

    waiter.await.unwrap().unwrap();
    assert!(auth.list_pending_approvals().is_empty());
}

#[tokio::test]
async fn per_call_timeout_bounds_the_wait() {
    let gate = Gate::with_timeout(Duration::from_secs(60));
    let mut spec = NewToken::new("cleaner", [Scope::WriteDestructive]);
    spec.require_approval = ["fs_rm".to_string()].into();
    let header = gate.issue(spec);

    let started = std::time::Instant::now();
    let err = gate
        .authorizer
        .authorize_with_timeout(
            Some(header.as_str()),
            &AccessRequest::new("fs_rm"),
            Duration::from_millis(30),
        )
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(err.to_string().contains("approval denied or timed out for fs_rm"));
    assert!(gate.authorizer.approvals().is_empty());
}

#[tokio::test]
async fn dropped_caller_leaves_no_pending_approval() {
    let gate = Gate::new();
    let mut spec = NewToken::new("cleaner", [Scope::WriteDestructive]);
    spec.require_approval = ["fs_rm".to_string()].into();
    let header = gate.issue(spec);
    let auth = Arc::clone(&gate.authorizer);

    let caller = {
        let auth = Arc::clone(&auth);
        tokio::spawn(async move {
            auth.authorize(Some(header.as_str()), &AccessRequest::new("fs_rm"))
                .await
        })
    };

    let request_id = next_pending(&auth).await;
    caller.abort();
    assert!(caller.await.unwrap_err().is_cancelled());

    assert!(auth.approvals().is_empty());
    assert!(auth.list_pending_approvals().is_empty());
    assert_eq!(
        auth.approve(&request_id).unwrap_err().kind(),
        FailureKind::NotFound
    );
}

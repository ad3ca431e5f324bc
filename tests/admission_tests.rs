//! Route admission tests
//!
//! Covers the admission rules end to end through the credential provider:
//! - logged out → login redirect with return path
//! - ANY-of role matching
//! - `decide_admin` agreeing with `decide(["ADMIN"])`
//! - fail-closed behavior when the provider check fails

use std::collections::BTreeSet;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use storefront_auth::config::Config;
use storefront_auth::credentials::{CredentialProvider, InitState};
use storefront_auth::gate::{ADMIN_ROLE, AuthDecision, AuthorizationGate, RouteRequirement};
use storefront_auth::identity::MemoryIdentityProvider;

async fn gate_for(idp: MemoryIdentityProvider) -> (Arc<MemoryIdentityProvider>, AuthorizationGate) {
    let idp = Arc::new(idp);
    let config = Config::default();
    let creds = CredentialProvider::bootstrap(idp.clone(), Arc::new(config.clone()), None).await;
    (idp, AuthorizationGate::new(creds, &config.app))
}

const ROLE_SETS: &[&[&str]] = &[
    &[],
    &["USER"],
    &["ADMIN"],
    &["ADMIN", "USER"],
    &["ANALYST", "SUPPORT"],
];

const REQUIREMENTS: &[&[&str]] = &[
    &[],
    &["ADMIN"],
    &["USER"],
    &["ADMIN", "ANALYST"],
    &["SUPPORT", "USER"],
];

#[tokio::test]
async fn unauthenticated_cart_redirects_to_login() {
    let (idp, gate) = gate_for(MemoryIdentityProvider::anonymous()).await;

    let decision = gate
        .decide(&RouteRequirement {
            required_roles: vec![],
            target_path: "/cart".to_string(),
        })
        .await;

    assert_eq!(
        decision,
        AuthDecision::RedirectToLogin {
            return_path: "/cart".to_string()
        }
    );
    assert_eq!(idp.login_redirects(), vec!["http://localhost:4200/cart"]);
}

#[tokio::test]
async fn user_without_admin_is_unauthorized() {
    let (idp, gate) = gate_for(MemoryIdentityProvider::signed_in("bob", ["USER"])).await;

    let decision = gate
        .decide(&RouteRequirement::with_roles("/admin", ["ADMIN"]))
        .await;

    assert_eq!(decision, AuthDecision::RedirectToUnauthorized);
    assert_eq!(
        decision.navigation_target(gate.unauthorized_path()),
        Some("/unauthorized")
    );
    assert!(idp.login_redirects().is_empty());
}

#[tokio::test]
async fn admin_is_admitted_by_decide_admin() {
    let (_idp, gate) =
        gate_for(MemoryIdentityProvider::signed_in("alice", ["ADMIN", "USER"])).await;

    let decision = gate
        .decide_admin(&RouteRequirement::authenticated("/admin"))
        .await;

    assert_eq!(decision, AuthDecision::Allow);
}

#[tokio::test]
async fn failed_silent_check_fails_closed() {
    // The provider would report an admin session, but init never succeeds.
    let (_idp, gate) = gate_for(
        MemoryIdentityProvider::signed_in("alice", ["ADMIN"]).with_init_failure("connection refused"),
    )
    .await;

    let decision = gate.decide(&RouteRequirement::authenticated("/orders")).await;
    assert_eq!(
        decision,
        AuthDecision::RedirectToLogin {
            return_path: "/orders".to_string()
        }
    );

    let admin = gate.decide_admin(&RouteRequirement::authenticated("/admin")).await;
    assert!(!admin.is_allowed());
}

#[tokio::test]
async fn empty_requirement_admits_iff_authenticated() {
    for roles in ROLE_SETS {
        let (_idp, gate) = gate_for(MemoryIdentityProvider::signed_in("u", roles.iter().copied())).await;
        assert_eq!(
            gate.decide(&RouteRequirement::authenticated("/profile")).await,
            AuthDecision::Allow,
            "roles {roles:?}"
        );
    }

    let (_idp, gate) = gate_for(MemoryIdentityProvider::anonymous()).await;
    assert!(matches!(
        gate.decide(&RouteRequirement::authenticated("/profile")).await,
        AuthDecision::RedirectToLogin { .. }
    ));
}

#[tokio::test]
async fn role_requirement_admits_iff_intersection_non_empty() {
    for held in ROLE_SETS {
        let (_idp, gate) = gate_for(MemoryIdentityProvider::signed_in("u", held.iter().copied())).await;
        let held_set: BTreeSet<&str> = held.iter().copied().collect();

        for required in REQUIREMENTS.iter().filter(|r| !r.is_empty()) {
            let expected = if required.iter().any(|r| held_set.contains(r)) {
                AuthDecision::Allow
            } else {
                AuthDecision::RedirectToUnauthorized
            };
            let req = RouteRequirement::with_roles("/area", required.iter().copied());
            assert_eq!(
                gate.decide(&req).await,
                expected,
                "held {held:?}, required {required:?}"
            );
        }
    }
}

#[tokio::test]
async fn decide_admin_matches_decide_with_admin_role() {
    for held in ROLE_SETS {
        let (_idp, gate) = gate_for(MemoryIdentityProvider::signed_in("u", held.iter().copied())).await;

        for required in REQUIREMENTS {
            let req = RouteRequirement::with_roles("/admin/x", required.iter().copied());
            let via_admin = gate.decide_admin(&req).await;
            let via_decide = gate
                .decide(&RouteRequirement::with_roles("/admin/x", [ADMIN_ROLE]))
                .await;
            assert_eq!(via_admin, via_decide, "held {held:?}, required {required:?}");
        }
    }

    let (_idp, gate) = gate_for(MemoryIdentityProvider::anonymous()).await;
    let req = RouteRequirement::authenticated("/admin");
    assert_eq!(
        gate.decide_admin(&req).await,
        gate.decide(&RouteRequirement::with_roles("/admin", [ADMIN_ROLE])).await
    );
}

#[tokio::test]
async fn decide_is_idempotent() {
    for idp in [
        MemoryIdentityProvider::anonymous(),
        MemoryIdentityProvider::signed_in("bob", ["USER"]),
        MemoryIdentityProvider::signed_in("alice", ["ADMIN"]),
    ] {
        let (_idp, gate) = gate_for(idp).await;
        let req = RouteRequirement::with_roles("/admin", ["ADMIN"]);
        let first = gate.decide(&req).await;
        let second = gate.decide(&req).await;
        assert_eq!(first, second);
    }
}

#[tokio::test]
async fn logout_turns_allow_into_login() {
    let idp = Arc::new(MemoryIdentityProvider::signed_in("alice", ["USER"]));
    let config = Config::default();
    let creds = CredentialProvider::bootstrap(idp.clone(), Arc::new(config.clone()), None).await;
    let gate = AuthorizationGate::new(creds.clone(), &config.app);
    assert_eq!(creds.init_state(), &InitState::Ready);

    let req = RouteRequirement::authenticated("/orders");
    assert_eq!(gate.decide(&req).await, AuthDecision::Allow);

    let _ = creds.logout().await.unwrap();
    assert!(matches!(
        gate.decide(&req).await,
        AuthDecision::RedirectToLogin { .. }
    ));
}

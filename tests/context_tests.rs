//! Auth context tests
//!
//! Wires the whole stack the way a host application does:
//! - reqwest transport against a local axum server
//! - pending login recorded on redirect and resumed after it
//! - fail-closed startup when the provider is unreachable

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::routing::{any, get};
use axum::Json;
use pretty_assertions::assert_eq;
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use storefront_auth::Error;
use storefront_auth::config::{Config, RouteConfig};
use storefront_auth::context::AuthContext;
use storefront_auth::credentials::InitState;
use storefront_auth::gate::AuthDecision;
use storefront_auth::identity::MemoryIdentityProvider;
use storefront_auth::transport::{HttpTransport, ReqwestTransport};
use tempfile::TempDir;
use tokio::net::TcpListener;

async fn echo_authorization(headers: HeaderMap) -> Json<Value> {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    Json(json!({ "authorization": authorization }))
}

/// Start a local API and return its origin
async fn serve() -> String {
    let app = Router::new()
        .route("/api/echo", any(echo_authorization))
        .route("/open/echo", any(echo_authorization))
        .route(
            "/api/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "late"
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn config_for(origin: &str) -> Config {
    let mut config = Config::default();
    config.api.base_url = format!("{origin}/api");
    config.api.bearer_url_prefixes = vec![format!("{origin}/api")];
    config.app.routes = vec![
        RouteConfig {
            path: "/cart".to_string(),
            roles: vec![],
        },
        RouteConfig {
            path: "/admin".to_string(),
            roles: vec!["ADMIN".to_string()],
        },
    ];
    config
}

fn transport(timeout: Duration) -> Arc<dyn HttpTransport> {
    Arc::new(ReqwestTransport::new(timeout).unwrap())
}

#[tokio::test]
async fn bearer_reaches_the_server() {
    let origin = serve().await;
    let ctx = AuthContext::start_ephemeral(
        config_for(&origin),
        Arc::new(MemoryIdentityProvider::signed_in("alice", ["USER"])),
        transport(Duration::from_secs(5)),
    )
    .await
    .unwrap();

    let token = ctx.credentials().current_token().await.unwrap();
    let echoed: Value = ctx.client().get_json("echo").await.unwrap();
    assert_eq!(echoed, json!({ "authorization": format!("Bearer {token}") }));

    let posted: Value = ctx
        .client()
        .post_json("echo", &json!({ "sku": "A1" }))
        .await
        .unwrap();
    assert_eq!(posted["authorization"], format!("Bearer {token}"));
}

#[tokio::test]
async fn dispatch_keeps_token_off_other_hosts_paths() {
    let origin = serve().await;
    let ctx = AuthContext::start_ephemeral(
        config_for(&origin),
        Arc::new(MemoryIdentityProvider::signed_in("alice", ["USER"])),
        transport(Duration::from_secs(5)),
    )
    .await
    .unwrap();

    let open = ctx
        .client()
        .dispatch(Method::GET, &format!("{origin}/open/echo"), None)
        .await
        .unwrap();
    assert_eq!(open.status, StatusCode::OK);
    assert_eq!(open.json::<Value>().unwrap(), json!({ "authorization": null }));

    let api = ctx
        .client()
        .dispatch(Method::GET, "echo", None)
        .await
        .unwrap();
    assert!(api.json::<Value>().unwrap()["authorization"].is_string());
}

#[tokio::test]
async fn error_status_comes_back_as_response() {
    let origin = serve().await;
    let ctx = AuthContext::start_ephemeral(
        config_for(&origin),
        Arc::new(MemoryIdentityProvider::signed_in("alice", ["USER"])),
        Arc::new(ReqwestTransport::with_client(reqwest::Client::new())),
    )
    .await
    .unwrap();

    let response = ctx.client().get("missing").await.unwrap();
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(!response.is_success());
}

#[tokio::test]
async fn transport_timeout_is_a_transport_error() {
    let origin = serve().await;
    let ctx = AuthContext::start_ephemeral(
        config_for(&origin),
        Arc::new(MemoryIdentityProvider::signed_in("alice", ["USER"])),
        transport(Duration::from_millis(100)),
    )
    .await
    .unwrap();

    let err = ctx.client().get("slow").await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "{err}");
    assert!(ctx.credentials().is_authenticated());
}

#[tokio::test]
async fn pending_login_resumes_after_redirect() {
    let dir = TempDir::new().unwrap();
    let mut config = config_for("http://127.0.0.1:9");
    config.app.redirect_store_dir = Some(dir.path().display().to_string());

    // Before the redirect: logged out, guarded navigation sends us to login.
    let idp = Arc::new(MemoryIdentityProvider::anonymous());
    let before = AuthContext::start(config.clone(), idp.clone(), transport(Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(
        before.gate().decide_path("/cart?step=2").await,
        AuthDecision::RedirectToLogin {
            return_path: "/cart?step=2".to_string()
        }
    );
    assert_eq!(idp.login_redirects(), vec!["http://localhost:4200/cart?step=2"]);

    // After the redirect: the provider has a session, the path is handed out once.
    let mut after = AuthContext::start(
        config.clone(),
        Arc::new(MemoryIdentityProvider::signed_in("alice", ["USER"])),
        transport(Duration::from_secs(1)),
    )
    .await
    .unwrap();
    assert_eq!(after.pending_return_path().as_deref(), Some("/cart?step=2"));
    assert_eq!(after.pending_return_path(), None);
    assert_eq!(after.gate().decide_path("/cart").await, AuthDecision::Allow);

    let again = AuthContext::start(
        config,
        Arc::new(MemoryIdentityProvider::signed_in("alice", ["USER"])),
        transport(Duration::from_secs(1)),
    )
    .await
    .unwrap();
    assert!(again.credentials().take_pending_login().is_none());
}

#[tokio::test]
async fn abandoned_login_is_not_resumed() {
    let dir = TempDir::new().unwrap();
    let mut config = config_for("http://127.0.0.1:9");
    config.app.redirect_store_dir = Some(dir.path().display().to_string());

    let first = AuthContext::start(
        config.clone(),
        Arc::new(MemoryIdentityProvider::anonymous()),
        transport(Duration::from_secs(1)),
    )
    .await
    .unwrap();
    let _ = first.gate().decide_path("/admin").await;

    // Came back without logging in: the record is consumed and dropped.
    let mut second = AuthContext::start(
        config,
        Arc::new(MemoryIdentityProvider::anonymous()),
        transport(Duration::from_secs(1)),
    )
    .await
    .unwrap();
    assert_eq!(second.pending_return_path(), None);
    assert!(second.credentials().take_pending_login().is_none());
}

#[tokio::test]
async fn unreachable_provider_starts_logged_out() {
    let ctx = AuthContext::start_ephemeral(
        config_for("http://127.0.0.1:9"),
        Arc::new(
            MemoryIdentityProvider::signed_in("alice", ["ADMIN"])
                .with_init_failure("connection refused"),
        ),
        transport(Duration::from_secs(1)),
    )
    .await
    .unwrap();

    assert!(matches!(ctx.init_state(), InitState::Failed(_)));
    assert!(!ctx.credentials().is_authenticated());
    assert!(!ctx.gate().decide_path("/admin").await.is_allowed());
    assert_eq!(ctx.gate().decide_path("/").await, AuthDecision::Allow);

    let err = ctx.client().get("echo").await.unwrap_err();
    assert!(matches!(err, Error::NotAuthenticated));
}

#[tokio::test]
async fn unparsable_base_url_is_rejected() {
    let mut config = Config::default();
    config.api.base_url = "not a url".to_string();

    let result = AuthContext::start_ephemeral(
        config,
        Arc::new(MemoryIdentityProvider::anonymous()),
        transport(Duration::from_secs(1)),
    )
    .await;
    assert!(matches!(result, Err(Error::Config(_))));
}

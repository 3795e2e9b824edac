// HTTP wiring for the auth gateway

use axum::{
    Extension, Router,
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{
    AuthError, AuthGateway, PermissionLevel, RequestAuthContext, RouteRequirements, SessionStore,
    StaticToken,
};
use crate::types::SessionId;

/// State of the per-route auth middleware.
#[derive(Clone)]
pub struct AuthLayerState {
    gateway: Arc<AuthGateway>,
    route: Arc<RouteRequirements>,
}

impl AuthLayerState {
    pub fn new(gateway: Arc<AuthGateway>, route: RouteRequirements) -> Self {
        Self {
            gateway,
            route: Arc::new(route),
        }
    }
}

/// Run the gateway in front of a route.
///
/// On success the [`RequestAuthContext`] is available to handlers as an
/// extension. Cookies issued by the gateway are set on the response either way.
pub async fn require_auth(
    State(state): State<AuthLayerState>,
    mut req: Request,
    next: Next,
) -> Response {
    let mut cookie_headers = HeaderMap::new();
    let outcome = state
        .gateway
        .authenticate(req.headers(), &mut cookie_headers, &state.route)
        .await;

    let mut response = match outcome {
        Ok(ctx) => {
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Err(e) => denial_response(&e),
    };
    for value in cookie_headers.get_all(SET_COOKIE) {
        response.headers_mut().append(SET_COOKIE, value.clone());
    }
    response
}

/// Map an auth error to the response the caller sees. Only the error kind
/// is exposed; the detail stays in the logs.
pub fn denial_response(err: &AuthError) -> Response {
    let kind = err.kind();
    (
        kind.status(),
        Json(serde_json::json!({ "error": kind.message() })),
    )
        .into_response()
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<dyn SessionStore>,
}

/// Build the HTTP router. `status_token` enables `GET /status`.
pub fn create_router(
    gateway: Arc<AuthGateway>,
    sessions: Arc<dyn SessionStore>,
    status_token: Option<StaticToken>,
) -> Router {
    let guard = |route: RouteRequirements| {
        middleware::from_fn_with_state(AuthLayerState::new(gateway.clone(), route), require_auth)
    };

    let mut router = Router::new()
        .route("/health", get(health_check))
        .route(
            "/me",
            get(whoami).route_layer(guard(RouteRequirements::authenticated())),
        )
        .route(
            "/me/touch",
            post(touch).route_layer(guard(
                RouteRequirements::authenticated().with_permission(PermissionLevel::Write),
            )),
        )
        .route(
            "/admin/sessions/{id}",
            get(admin_session).route_layer(guard(RouteRequirements::admin())),
        );

    if let Some(token) = status_token {
        router = router.route(
            "/status",
            get(status).route_layer(guard(RouteRequirements::authenticated().with_static_token(token))),
        );
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(AppState { sessions })
}

async fn health_check() -> Result<Json<Value>, StatusCode> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

async fn whoami(Extension(ctx): Extension<RequestAuthContext>) -> Result<Json<Value>, StatusCode> {
    let consumer = ctx.consumer().ok_or(StatusCode::UNAUTHORIZED)?;

    Ok(Json(serde_json::json!({
        "consumer_id": consumer.id,
        "name": consumer.name,
        "scopes": consumer.scopes,
        "admin": consumer.is_admin(),
        "session_id": ctx.session().map(|s| s.id.clone()),
    })))
}

async fn touch(Extension(ctx): Extension<RequestAuthContext>) -> Result<Json<Value>, StatusCode> {
    let session = ctx.session().ok_or(StatusCode::UNAUTHORIZED)?;

    Ok(Json(serde_json::json!({
        "status": "ok",
        "session_id": session.id,
    })))
}

async fn admin_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let session_id = SessionId::new(id);
    let session = state
        .sessions
        .load_session(&session_id)
        .await
        .map_err(|_e| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(serde_json::json!({ "session": session })))
}

async fn status() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        AuthenticatedUser, Consumer, JwtSessionCodec, MemoryAuthStore, MemoryCache, Ring, Session,
    };
    use crate::config::GatewayConfig;
    use crate::types::ConsumerId;
    use axum::body::Body;
    use http::Request as HttpRequest;
    use http::header::{AUTHORIZATION, COOKIE};
    use tower::ServiceExt;

    const SECRET: &str = "api-test-secret-api-test-secret";

    async fn setup() -> (Router, JwtSessionCodec, Session) {
        let store = MemoryAuthStore::new();
        let session = Session::new(SessionId::new("s1"), ConsumerId::new("c1"), 600);
        store.insert_session(session.clone()).await;
        store
            .insert_consumer(
                Consumer::new(ConsumerId::new("c1"), "alice")
                    .with_user(AuthenticatedUser::new("alice", Ring::User)),
            )
            .await;

        let config = GatewayConfig::with_secret(SECRET);
        let gateway = Arc::new(AuthGateway::new(
            &config,
            Arc::new(JwtSessionCodec::from_secret(SECRET.as_bytes())),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(MemoryCache::new()),
        ));
        let router = create_router(
            gateway,
            Arc::new(store),
            Some(StaticToken::new("X-Status-Token", "let-me-in")),
        );
        (router, JwtSessionCodec::from_secret(SECRET.as_bytes()), session)
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let (router, _, _) = setup().await;
        let response = router
            .oneshot(HttpRequest::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_me_requires_auth() {
        let (router, _, _) = setup().await;
        let response = router
            .oneshot(HttpRequest::builder().uri("/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn test_me_with_bearer() {
        let (router, codec, session) = setup().await;
        let token = codec.sign(&session).unwrap();
        let response = router
            .oneshot(
                HttpRequest::builder()
                    .uri("/me")
                    .header(AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(SET_COOKIE).is_none());

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["consumer_id"], "c1");
        assert_eq!(json["admin"], false);
    }

    #[tokio::test]
    async fn test_cookie_session_gets_xsrf_cookie() {
        let (router, codec, session) = setup().await;
        let token = codec.sign(&session).unwrap();
        let response = router
            .oneshot(
                HttpRequest::builder()
                    .uri("/me")
                    .header(COOKIE, format!("jwt_token={}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("xsrf_token="));
    }

    #[tokio::test]
    async fn test_cookie_write_without_xsrf_is_rejected() {
        let (router, codec, session) = setup().await;
        let token = codec.sign(&session).unwrap();
        let response = router
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/me/touch")
                    .header(COOKIE, format!("jwt_token={}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_route_forbidden_for_user() {
        let (router, codec, session) = setup().await;
        let token = codec.sign(&session).unwrap();
        let response = router
            .oneshot(
                HttpRequest::builder()
                    .uri("/admin/sessions/s1")
                    .header(AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_status_static_token() {
        let (router, _, _) = setup().await;
        let granted = router
            .clone()
            .oneshot(
                HttpRequest::builder()
                    .uri("/status")
                    .header("X-Status-Token", "let-me-in")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(granted.status(), StatusCode::OK);

        let denied = router
            .oneshot(
                HttpRequest::builder()
                    .uri("/status")
                    .header("X-Status-Token", "nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_handler_cookies_survive_xsrf_cookie() {
        let store = MemoryAuthStore::new();
        let session = Session::new(SessionId::new("s1"), ConsumerId::new("c1"), 600);
        store.insert_session(session.clone()).await;
        store.insert_consumer(Consumer::new(ConsumerId::new("c1"), "alice")).await;

        let gateway = Arc::new(AuthGateway::new(
            &GatewayConfig::with_secret(SECRET),
            Arc::new(JwtSessionCodec::from_secret(SECRET.as_bytes())),
            Arc::new(store.clone()),
            Arc::new(store),
            Arc::new(MemoryCache::new()),
        ));
        let router = Router::new().route(
            "/prefs",
            get(|| async { ([(SET_COOKIE, "app_pref=dark; Path=/")], "ok") }).route_layer(
                middleware::from_fn_with_state(
                    AuthLayerState::new(gateway, RouteRequirements::authenticated()),
                    require_auth,
                ),
            ),
        );

        let token = JwtSessionCodec::from_secret(SECRET.as_bytes())
            .sign(&session)
            .unwrap();
        let response = router
            .oneshot(
                HttpRequest::builder()
                    .uri("/prefs")
                    .header(COOKIE, format!("jwt_token={}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let cookies: Vec<&str> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies.contains(&"app_pref=dark; Path=/"));
        assert!(cookies.iter().any(|c| c.starts_with("xsrf_token=")));
    }
}

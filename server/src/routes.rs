use axum::{extract::DefaultBodyLimit, middleware, routing::get, routing::post, Router};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::auth::middleware::JwtSecret;
use crate::chat::{messages, presence};
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Authenticated routes (JWT required, the Claims extractor validates the token)
    let message_routes = Router::new()
        .route(
            "/api/messages/{peer_user_id}",
            get(messages::get_messages),
        )
        .route(
            "/api/messages/send/{peer_user_id}",
            post(messages::send_message),
        )
        .route("/api/presence", get(presence::get_presence))
        .layer(DefaultBodyLimit::max(state.max_body_bytes));

    // WebSocket endpoint (auth via query param, not JWT header)
    let ws_routes = Router::new().route("/ws", get(ws_handler::ws_upgrade));

    // Health check
    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(message_routes)
        .merge(ws_routes)
        .merge(health)
        .nest_service(
            &state.media_public_path,
            ServeDir::new(&state.media_dir),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

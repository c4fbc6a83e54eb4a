use axum::{
    extract::{rejection::JsonRejection, ws::WebSocketUpgrade, Query, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use application::{AuthorizeUserRequest, RegisterUserRequest};
use domain::User;

use crate::{
    auth::{authenticate, CurrentUser},
    error::ApiError,
    state::AppState,
    ws_connection::WebSocketConnection,
};

#[derive(Debug, Deserialize)]
struct CredentialsPayload {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    #[serde(default)]
    token: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/register", post(register_user))
        .route("/auth", post(authorize_user))
        .route("/profile", get(profile))
        .route("/ws", get(websocket_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn register_user(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsPayload>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    let Json(payload) = payload?;
    let user = state
        .account_service
        .register(RegisterUserRequest {
            email: payload.email,
            password: payload.password,
        })
        .await?;

    Ok(Json(user))
}

async fn authorize_user(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsPayload>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    let Json(payload) = payload?;
    let user = state
        .account_service
        .authorize(AuthorizeUserRequest {
            email: payload.email,
            password: payload.password,
        })
        .await?;

    Ok(Json(user))
}

async fn profile(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

/// 升级前完成认证，失败时直接返回 401，不会登记任何会话
async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let user = authenticate(&state, &query.token).await?;
    let connection = WebSocketConnection::new(state.hub.clone(), user);
    Ok(ws.on_upgrade(move |socket| connection.run(socket)))
}

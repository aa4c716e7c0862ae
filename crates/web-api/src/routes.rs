use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use domain::{
    AudiencePayloads, PushSubscription, Role, SelectionCriteria, StatusPreference, UserId,
};

use crate::{error::ApiError, state::AppState, ws_connection::WebSocketConnection};

#[derive(Debug, Deserialize, Default)]
struct PeopleSelection {
    #[serde(default)]
    role: Vec<String>,
    #[serde(default)]
    id: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
struct IgnitePayload {
    #[serde(default)]
    people: PeopleSelection,
    #[serde(default)]
    online_only: bool,
    #[serde(default)]
    payloads: AudiencePayloads,
}

#[derive(Debug, Deserialize)]
struct SubscribePayload {
    sub: PushSubscription,
}

#[derive(Debug, Deserialize)]
struct UnsubscribePayload {
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    status: String,
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/notify/ignite", post(ignite))
        .route("/notify/subscribe", post(subscribe))
        .route("/notify/unsubscribe", post(unsubscribe))
        .route("/users/me/status", put(update_status))
        .route("/ws", get(websocket_upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// 触发一次批量通知：按角色/按 id 两个受众独立扇出。
async fn ignite(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<IgnitePayload>,
) -> Result<StatusCode, ApiError> {
    state.jwt_service.extract_user_from_headers(&headers)?;

    let roles = payload
        .people
        .role
        .into_iter()
        .map(Role::parse)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| ApiError::bad_request(err.to_string()))?;
    let criteria = SelectionCriteria {
        roles,
        ids: payload.people.id.into_iter().map(UserId::from).collect(),
        online_only: payload.online_only,
    };

    state
        .notification_service
        .ignite(criteria, payload.payloads)
        .await?;

    Ok(StatusCode::ACCEPTED)
}

async fn subscribe(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SubscribePayload>,
) -> Result<StatusCode, ApiError> {
    let user_id = state.jwt_service.extract_user_from_headers(&headers)?;
    state
        .notification_service
        .subscribe(user_id, payload.sub)
        .await?;
    Ok(StatusCode::OK)
}

async fn unsubscribe(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UnsubscribePayload>,
) -> Result<StatusCode, ApiError> {
    let user_id = state.jwt_service.extract_user_from_headers(&headers)?;
    state
        .notification_service
        .unsubscribe(user_id, &payload.endpoint)
        .await?;
    Ok(StatusCode::OK)
}

/// 修改状态偏好，走与连接事件相同的重算路径。
async fn update_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<StatusPayload>,
) -> Result<StatusCode, ApiError> {
    let user_id = state.jwt_service.extract_user_from_headers(&headers)?;
    let preference = StatusPreference::parse(&payload.status)
        .map_err(|err| ApiError::bad_request(err.to_string()))?;

    state
        .presence_service
        .set_status_preference(user_id, preference)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn websocket_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Result<Response, ApiError> {
    let claims = state.jwt_service.verify_token(&query.token)?;
    let user_id = UserId::from(claims.user_id);

    Ok(ws.on_upgrade(move |socket| async move {
        WebSocketConnection::new(socket, state, user_id)
            .await
            .run()
            .await;
    }))
}

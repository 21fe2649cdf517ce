use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::StatusCode,
    response::Response,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use validator::Validate;

use application::{
    NotificationEffect, ReactionOutcome, ReactionState, SendMessageRequest,
    StartConversationRequest, ToggleReactionRequest,
};
use domain::{ConversationId, DiscussionId, NotificationId, ReplyId, SubjectRef, UserId};

use crate::{auth::AuthUser, error::ApiError, state::AppState, ws_connection::WebSocketConnection};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartConversationPayload {
    recipient_id: UserId,
}

#[derive(Debug, Deserialize, Validate)]
struct SendMessagePayload {
    #[validate(length(min = 1, max = 5000))]
    content: String,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: String,
}

/// 点赞切换的响应体
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LikeResponse {
    success: bool,
    liked: bool,
    likes: u64,
    notification: &'static str,
}

impl From<ReactionOutcome> for LikeResponse {
    fn from(outcome: ReactionOutcome) -> Self {
        let notification = match outcome.notification {
            NotificationEffect::NotRequested => "none",
            NotificationEffect::Created(_) => "created",
            NotificationEffect::DuplicateSuppressed => "suppressed",
            NotificationEffect::Failed(_) => "failed",
        };
        Self {
            success: true,
            liked: outcome.reacted,
            likes: outcome.count,
            notification,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/messages/conversations",
            get(list_conversations).post(start_conversation),
        )
        .route(
            "/messages/conversations/{conversation_id}",
            get(get_conversation).delete(leave_conversation),
        )
        .route(
            "/messages/conversations/{conversation_id}/messages",
            post(send_message),
        )
        .route(
            "/messages/conversations/{conversation_id}/read",
            put(mark_conversation_read),
        )
        .route("/messages/unread-count", get(message_unread_count))
        .route("/forum/discussions/{discussion_id}/like", post(like_discussion))
        .route("/forum/discussions/{discussion_id}/likes", get(discussion_likes))
        .route("/forum/replies/{reply_id}/like", post(like_reply))
        .route("/forum/replies/{reply_id}/likes", get(reply_likes))
        .route("/notifications", get(list_notifications))
        .route("/notifications/unread-count", get(notification_unread_count))
        .route("/notifications/read-all", put(mark_all_notifications_read))
        .route(
            "/notifications/{notification_id}/read",
            put(mark_notification_read),
        )
        .route(
            "/notifications/{notification_id}",
            delete(dismiss_notification),
        )
        .route("/presence/{user_id}", get(presence))
        .route("/ws", get(websocket_upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn list_conversations(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Value>, ApiError> {
    let conversations = state
        .conversation_service
        .list_conversations(user_id)
        .await?;
    Ok(Json(json!({ "conversations": conversations })))
}

async fn start_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<StartConversationPayload>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let conversation = state
        .conversation_service
        .start_conversation(StartConversationRequest {
            requester_id: user_id,
            recipient_id: payload.recipient_id,
        })
        .await?;
    let detail = state
        .conversation_service
        .get_conversation(conversation.id, user_id)
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "conversation": detail }))))
}

async fn get_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(conversation_id): Path<ConversationId>,
) -> Result<Json<Value>, ApiError> {
    let detail = state
        .conversation_service
        .get_conversation(conversation_id, user_id)
        .await?;
    Ok(Json(json!({ "conversation": detail })))
}

async fn send_message(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(conversation_id): Path<ConversationId>,
    Json(payload): Json<SendMessagePayload>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    payload.validate()?;
    let message = state
        .conversation_service
        .send_message(SendMessageRequest {
            conversation_id,
            sender_id: user_id,
            content: payload.content,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "message": message }))))
}

async fn mark_conversation_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(conversation_id): Path<ConversationId>,
) -> Result<Json<Value>, ApiError> {
    state
        .conversation_service
        .mark_read(conversation_id, user_id)
        .await?;
    Ok(Json(json!({ "success": true })))
}

async fn leave_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(conversation_id): Path<ConversationId>,
) -> Result<Json<Value>, ApiError> {
    let outcome = state
        .conversation_service
        .leave_conversation(conversation_id, user_id)
        .await?;
    Ok(Json(json!({
        "success": true,
        "conversationDeleted": outcome.conversation_deleted,
        "remainingParticipants": outcome.remaining_participants,
    })))
}

async fn message_unread_count(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Value>, ApiError> {
    let unread = state.unread_tracker.total_unread(user_id).await?;
    Ok(Json(json!({ "unread": unread })))
}

async fn toggle_like(
    state: &AppState,
    subject: SubjectRef,
    user_id: UserId,
) -> Result<Json<LikeResponse>, ApiError> {
    let outcome = state
        .reaction_service
        .toggle(ToggleReactionRequest { subject, user_id })
        .await?;
    Ok(Json(outcome.into()))
}

async fn like_discussion(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(discussion_id): Path<DiscussionId>,
) -> Result<Json<LikeResponse>, ApiError> {
    toggle_like(&state, SubjectRef::discussion(discussion_id), user_id).await
}

async fn like_reply(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(reply_id): Path<ReplyId>,
) -> Result<Json<LikeResponse>, ApiError> {
    toggle_like(&state, SubjectRef::reply(reply_id), user_id).await
}

async fn discussion_likes(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(discussion_id): Path<DiscussionId>,
) -> Result<Json<ReactionState>, ApiError> {
    let reaction_state = state
        .reaction_service
        .state(SubjectRef::discussion(discussion_id), Some(user_id))
        .await?;
    Ok(Json(reaction_state))
}

async fn reply_likes(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(reply_id): Path<ReplyId>,
) -> Result<Json<ReactionState>, ApiError> {
    let reaction_state = state
        .reaction_service
        .state(SubjectRef::reply(reply_id), Some(user_id))
        .await?;
    Ok(Json(reaction_state))
}

async fn list_notifications(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Value>, ApiError> {
    let notifications = state.notification_service.list(user_id).await?;
    Ok(Json(json!({ "notifications": notifications })))
}

async fn notification_unread_count(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Value>, ApiError> {
    let unread = state.notification_service.unread_count(user_id).await?;
    Ok(Json(json!({ "unread": unread })))
}

async fn mark_all_notifications_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Value>, ApiError> {
    let updated = state.notification_service.mark_all_read(user_id).await?;
    Ok(Json(json!({ "success": true, "updated": updated })))
}

async fn mark_notification_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(notification_id): Path<NotificationId>,
) -> Result<Json<Value>, ApiError> {
    let notification = state
        .notification_service
        .mark_read(notification_id, user_id)
        .await?;
    Ok(Json(json!({ "notification": notification })))
}

async fn dismiss_notification(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(notification_id): Path<NotificationId>,
) -> Result<Json<Value>, ApiError> {
    let notification = state
        .notification_service
        .dismiss(notification_id, user_id)
        .await?;
    Ok(Json(json!({ "notification": notification })))
}

async fn presence(
    State(state): State<AppState>,
    AuthUser(_viewer): AuthUser,
    Path(user_id): Path<UserId>,
) -> Json<Value> {
    Json(json!({
        "userId": user_id,
        "online": state.registry.is_online(user_id),
    }))
}

async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    // 浏览器无法为 WebSocket 握手设置请求头，token 走查询参数
    let user_id = state.jwt_service.verify_token(&query.token)?;
    Ok(ws.on_upgrade(move |socket| WebSocketConnection::new(socket, state, user_id).run()))
}

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use stride_db::queries::ChatOverview;
use stride_types::api::{ChatView, Claims, CreateChatRequest, SendMessageRequest};
use stride_types::models::UserSummary;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::{blocking, required_text};

const MAX_MESSAGE_CHARS: usize = 4000;
const MAX_PAGE: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor: `created_at` of the oldest message already shown.
    pub before: Option<DateTime<Utc>>,
}

fn default_limit() -> u32 {
    50
}

fn to_view(overview: ChatOverview) -> ChatView {
    ChatView {
        chat: overview.chat,
        participants: overview.participants.iter().map(UserSummary::from).collect(),
        last_message: overview.last_message,
        unread_count: overview.unread_count,
    }
}

/// POST /chats. An existing DIRECT chat between the same two users comes back
/// with 200 instead of a new one with 201.
pub async fn create_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<CreateChatRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let name = match req.name.as_deref() {
        Some(name) => Some(required_text("name", name, 100)?),
        None => None,
    };

    let me = claims.sub;
    let (overview, created) = blocking(&state, move |db| {
        db.create_chat(me, &req.participant_ids, req.chat_type, name.as_deref())
    })
    .await?;

    let status = if created {
        info!("Chat {} ({}) created by {}", overview.chat.id, overview.chat.chat_type, me);
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(to_view(overview))))
}

pub async fn list_chats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    let chats = blocking(&state, move |db| db.list_chats(me)).await?;
    Ok(Json(chats.into_iter().map(to_view).collect::<Vec<_>>()))
}

pub async fn get_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(chat_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    let chat = blocking(&state, move |db| db.get_chat(chat_id, me)).await?;
    Ok(Json(to_view(chat)))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(chat_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(req), _): WithRejection<Json<SendMessageRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let content = required_text("content", &req.content, MAX_MESSAGE_CHARS)?;

    let me = claims.sub;
    let message = blocking(&state, move |db| db.send_message(chat_id, me, &content)).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(chat_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Query(query), _): WithRejection<Query<MessageQuery>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.clamp(1, MAX_PAGE);

    let me = claims.sub;
    let messages =
        blocking(&state, move |db| db.get_messages(chat_id, me, limit, query.before)).await?;
    Ok(Json(messages))
}

pub mod activities;
pub mod auth;
pub mod calendar;
pub mod chats;
pub mod connections;
pub mod error;
pub mod middleware;
pub mod proposals;
pub mod races;
pub mod users;
pub mod workouts;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post, put},
};
use serde_json::{Value, json};
use tracing::error;

use stride_db::Database;

use crate::auth::AppState;
use crate::error::ApiError;

/// All API routes with their state attached. CORS, tracing and static file
/// serving are layered on by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        // Users
        .route("/users/me", get(users::me))
        .route("/users/search", get(users::search))
        .route("/users/profile", put(users::update_profile))
        .route(
            "/users/profile/upload-image",
            post(users::upload_image).layer(DefaultBodyLimit::max(users::UPLOAD_BODY_LIMIT)),
        )
        .route("/users/{user_id}/profile", get(users::get_profile))
        // Connections
        .route(
            "/connections",
            get(connections::list_connections).post(connections::create_connection),
        )
        .route(
            "/connections/{connection_id}",
            get(connections::get_connection)
                .put(connections::respond_to_connection)
                .delete(connections::delete_connection),
        )
        // Proposals
        .route(
            "/proposals/activities",
            get(proposals::list_activity_proposals).post(proposals::propose_activity),
        )
        .route(
            "/proposals/workouts",
            get(proposals::list_workout_proposals).post(proposals::propose_workout),
        )
        .route("/proposals/respond", put(proposals::respond_to_proposal))
        // Own records
        .route(
            "/activities",
            get(activities::list_activities).post(activities::create_activity),
        )
        .route(
            "/activities/{activity_id}",
            get(activities::get_activity)
                .put(activities::update_activity)
                .delete(activities::delete_activity),
        )
        .route(
            "/workouts",
            get(workouts::list_workouts).post(workouts::create_workout),
        )
        .route(
            "/workouts/{workout_id}",
            get(workouts::get_workout)
                .put(workouts::update_workout)
                .delete(workouts::delete_workout),
        )
        .route("/races", get(races::list_races).post(races::create_race))
        .route(
            "/races/{race_id}",
            get(races::get_race)
                .put(races::update_race)
                .delete(races::delete_race),
        )
        // Calendar
        .route("/calendar", get(calendar::day))
        .route("/calendar/range", get(calendar::range))
        // Chats
        .route("/chats", get(chats::list_chats).post(chats::create_chat))
        .route("/chats/{chat_id}", get(chats::get_chat))
        .route(
            "/chats/{chat_id}/messages",
            get(chats::get_messages).post(chats::send_message),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Runs a database call off the async runtime.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
        .map_err(ApiError::from)
}

/// Trimmed text, refused when blank or longer than `max` characters.
pub(crate) fn required_text(field: &str, value: &str, max: usize) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::bad_request(format!("{field} must not be empty")));
    }
    if value.chars().count() > max {
        return Err(ApiError::bad_request(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(value.to_string())
}

pub(crate) fn check_range(field: &str, value: Option<i64>, min: i64, max: i64) -> Result<(), ApiError> {
    match value {
        Some(v) if v < min || v > max => Err(ApiError::bad_request(format!(
            "{field} must be between {min} and {max}"
        ))),
        _ => Ok(()),
    }
}

pub(crate) fn check_non_negative(field: &str, value: Option<f64>) -> Result<(), ApiError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(ApiError::bad_request(format!(
            "{field} must not be negative"
        ))),
        _ => Ok(()),
    }
}

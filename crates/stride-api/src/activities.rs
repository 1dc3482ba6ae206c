use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use uuid::Uuid;

use stride_types::api::{Claims, CreateActivityRequest, DateRangeQuery, UpdateActivityRequest};
use stride_types::models::{MAX_DURATION_MINUTES, MAX_TITLE_CHARS};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::{blocking, check_range, required_text};

fn not_found() -> ApiError {
    ApiError::NotFound("activity not found".into())
}

pub async fn list_activities(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Query(range), _): WithRejection<Query<DateRangeQuery>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    let activities =
        blocking(&state, move |db| db.list_activities(me, range.from, range.to)).await?;
    Ok(Json(activities))
}

pub async fn create_activity(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(mut req), _): WithRejection<Json<CreateActivityRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    req.title = required_text("title", &req.title, MAX_TITLE_CHARS)?;
    check_range("duration", req.duration, 1, MAX_DURATION_MINUTES)?;

    let me = claims.sub;
    let activity = blocking(&state, move |db| db.create_activity(me, &req)).await?;
    Ok((StatusCode::CREATED, Json(activity)))
}

pub async fn get_activity(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(activity_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    let activity = blocking(&state, move |db| db.get_activity(activity_id, me))
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(activity))
}

pub async fn update_activity(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(activity_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(mut changes), _): WithRejection<Json<UpdateActivityRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(title) = changes.title.as_deref() {
        changes.title = Some(required_text("title", title, MAX_TITLE_CHARS)?);
    }
    check_range("duration", changes.duration, 1, MAX_DURATION_MINUTES)?;

    let me = claims.sub;
    let activity = blocking(&state, move |db| db.update_activity(activity_id, me, &changes))
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(activity))
}

pub async fn delete_activity(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(activity_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    if !blocking(&state, move |db| db.delete_activity(activity_id, me)).await? {
        return Err(not_found());
    }
    Ok(StatusCode::NO_CONTENT)
}

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use uuid::Uuid;

use stride_types::api::{Claims, CreateWorkoutRequest, DateRangeQuery, UpdateWorkoutRequest};
use stride_types::models::{MAX_DURATION_MINUTES, MAX_TITLE_CHARS};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::{blocking, check_non_negative, check_range, required_text};

fn not_found() -> ApiError {
    ApiError::NotFound("workout not found".into())
}

fn check_metrics(
    duration: Option<i64>,
    distance: Option<f64>,
    calories: Option<i64>,
    rpe: Option<i64>,
) -> Result<(), ApiError> {
    check_range("duration", duration, 1, MAX_DURATION_MINUTES)?;
    check_non_negative("distance", distance)?;
    check_range("calories", calories, 0, i64::MAX)?;
    check_range("rpe", rpe, 1, 10)
}

pub async fn list_workouts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Query(range), _): WithRejection<Query<DateRangeQuery>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    let workouts = blocking(&state, move |db| db.list_workouts(me, range.from, range.to)).await?;
    Ok(Json(workouts))
}

pub async fn create_workout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(mut req), _): WithRejection<Json<CreateWorkoutRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    req.title = required_text("title", &req.title, MAX_TITLE_CHARS)?;
    check_metrics(req.duration, req.distance, req.calories, req.rpe)?;

    let me = claims.sub;
    let workout = blocking(&state, move |db| db.create_workout(me, &req)).await?;
    Ok((StatusCode::CREATED, Json(workout)))
}

pub async fn get_workout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(workout_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    let workout = blocking(&state, move |db| db.get_workout(workout_id, me))
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(workout))
}

pub async fn update_workout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(workout_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(mut changes), _): WithRejection<Json<UpdateWorkoutRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(title) = changes.title.as_deref() {
        changes.title = Some(required_text("title", title, MAX_TITLE_CHARS)?);
    }
    check_metrics(changes.duration, changes.distance, changes.calories, changes.rpe)?;

    let me = claims.sub;
    let workout = blocking(&state, move |db| db.update_workout(workout_id, me, &changes))
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(workout))
}

pub async fn delete_workout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(workout_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    if !blocking(&state, move |db| db.delete_workout(workout_id, me)).await? {
        return Err(not_found());
    }
    Ok(StatusCode::NO_CONTENT)
}

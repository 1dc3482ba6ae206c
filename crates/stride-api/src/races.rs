use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use uuid::Uuid;

use stride_types::api::{Claims, CreateRaceRequest, DateRangeQuery, UpdateRaceRequest};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::{blocking, check_non_negative, check_range, required_text};

fn not_found() -> ApiError {
    ApiError::NotFound("race result not found".into())
}

/// A finishing position can't exceed the field size when both are known.
fn check_placing(position: Option<i64>, total: Option<i64>) -> Result<(), ApiError> {
    check_range("position", position, 1, i64::MAX)?;
    check_range("total_participants", total, 1, i64::MAX)?;
    if let (Some(position), Some(total)) = (position, total) {
        if position > total {
            return Err(ApiError::bad_request(
                "position cannot exceed total_participants",
            ));
        }
    }
    Ok(())
}

pub async fn list_races(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Query(range), _): WithRejection<Query<DateRangeQuery>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    let races = blocking(&state, move |db| db.list_races(me, range.from, range.to)).await?;
    Ok(Json(races))
}

pub async fn create_race(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(mut req), _): WithRejection<Json<CreateRaceRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    req.event_name = required_text("event_name", &req.event_name, 200)?;
    req.event_type = required_text("event_type", &req.event_type, 64)?;
    check_non_negative("distance", req.distance)?;
    check_placing(req.position, req.total_participants)?;

    let me = claims.sub;
    let race = blocking(&state, move |db| db.create_race(me, &req)).await?;
    Ok((StatusCode::CREATED, Json(race)))
}

pub async fn get_race(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(race_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    let race = blocking(&state, move |db| db.get_race(race_id, me))
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(race))
}

pub async fn update_race(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(race_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(mut changes), _): WithRejection<Json<UpdateRaceRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(name) = changes.event_name.as_deref() {
        changes.event_name = Some(required_text("event_name", name, 200)?);
    }
    if let Some(kind) = changes.event_type.as_deref() {
        changes.event_type = Some(required_text("event_type", kind, 64)?);
    }
    check_non_negative("distance", changes.distance)?;
    check_placing(changes.position, changes.total_participants)?;

    let me = claims.sub;
    let race = blocking(&state, move |db| db.update_race(race_id, me, &changes))
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(race))
}

pub async fn delete_race(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(race_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    if !blocking(&state, move |db| db.delete_race(race_id, me)).await? {
        return Err(not_found());
    }
    Ok(StatusCode::NO_CONTENT)
}

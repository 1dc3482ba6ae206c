use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use tracing::info;

use stride_types::api::{
    Claims, ProposalQuery, ProposeActivityRequest, ProposeWorkoutRequest, RespondProposalRequest,
    RespondProposalResponse,
};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

const MAX_NOTES: usize = 2000;

fn check_notes(notes: Option<&str>) -> Result<(), ApiError> {
    match notes {
        Some(n) if n.chars().count() > MAX_NOTES => Err(ApiError::bad_request(format!(
            "notes must be at most {MAX_NOTES} characters"
        ))),
        _ => Ok(()),
    }
}

// -- Activity proposals --

pub async fn propose_activity(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<ProposeActivityRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    check_notes(req.notes.as_deref())?;

    let me = claims.sub;
    let proposal = blocking(&state, move |db| db.create_activity_proposal(me, &req)).await?;

    info!(
        "Activity proposal {} ({}) from {} to {}",
        proposal.id, proposal.action, proposal.proposed_by_id, proposal.proposed_for_id
    );
    Ok((StatusCode::CREATED, Json(proposal)))
}

pub async fn list_activity_proposals(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Query(query), _): WithRejection<Query<ProposalQuery>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    let proposals = blocking(&state, move |db| {
        db.list_activity_proposals(me, query.direction, query.status)
    })
    .await?;
    Ok(Json(proposals))
}

// -- Workout proposals --

pub async fn propose_workout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<ProposeWorkoutRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    check_notes(req.notes.as_deref())?;

    let me = claims.sub;
    let proposal = blocking(&state, move |db| db.create_workout_proposal(me, &req)).await?;

    info!(
        "Workout proposal {} ({}) from {} to {}",
        proposal.id, proposal.action, proposal.proposed_by_id, proposal.proposed_for_id
    );
    Ok((StatusCode::CREATED, Json(proposal)))
}

pub async fn list_workout_proposals(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Query(query), _): WithRejection<Query<ProposalQuery>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    let proposals = blocking(&state, move |db| {
        db.list_workout_proposals(me, query.direction, query.status)
    })
    .await?;
    Ok(Json(proposals))
}

// -- Responding --

pub async fn respond_to_proposal(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<RespondProposalRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    check_notes(req.notes.as_deref())?;

    let me = claims.sub;
    let resolution = blocking(&state, move |db| {
        db.respond_to_proposal(
            req.proposal_type,
            req.proposal_id,
            me,
            req.response,
            req.notes.as_deref(),
        )
    })
    .await?;

    Ok(Json(RespondProposalResponse {
        proposal_id: resolution.proposal_id,
        status: resolution.status,
        applied: resolution.applied,
        record_id: resolution.record_id,
    }))
}

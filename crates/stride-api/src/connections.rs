use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use tracing::info;
use uuid::Uuid;

use stride_db::{Database, Rejection};
use stride_types::api::{
    Claims, ConnectionQuery, ConnectionView, CreateConnectionRequest, RespondConnectionRequest,
};
use stride_types::models::{Connection, UserSummary};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

fn view(db: &Database, connection: Connection, viewer: Uuid) -> anyhow::Result<ConnectionView> {
    let counterpart = db
        .get_user(connection.counterpart(viewer))?
        .ok_or(Rejection::NotFound("user"))?;
    Ok(ConnectionView {
        is_initiator: connection.initiator_id == viewer,
        counterpart: UserSummary::from(&counterpart),
        connection,
    })
}

pub async fn create_connection(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<CreateConnectionRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    let created = blocking(&state, move |db| {
        let connection = db.create_connection(me, req.recipient_id)?;
        view(db, connection, me)
    })
    .await?;

    info!(
        "Connection {} requested by {} for {}",
        created.connection.id, me, created.counterpart.id
    );
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_connections(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Query(query), _): WithRejection<Query<ConnectionQuery>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    let rows = blocking(&state, move |db| db.list_connections(me, query.status)).await?;

    let views: Vec<ConnectionView> = rows
        .into_iter()
        .map(|(connection, counterpart)| ConnectionView {
            is_initiator: connection.initiator_id == me,
            counterpart: UserSummary::from(&counterpart),
            connection,
        })
        .collect();
    Ok(Json(views))
}

/// Connections are only visible to their two parties; anyone else gets 404.
pub async fn get_connection(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(connection_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    let found = blocking(&state, move |db| {
        match db.get_connection(connection_id)? {
            Some(connection) if connection.is_party(me) => view(db, connection, me).map(Some),
            _ => Ok(None),
        }
    })
    .await?
    .ok_or_else(|| ApiError::NotFound("connection not found".into()))?;

    Ok(Json(found))
}

pub async fn respond_to_connection(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(connection_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(req), _): WithRejection<Json<RespondConnectionRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    let updated = blocking(&state, move |db| {
        let connection = db.respond_to_connection(connection_id, me, req.action, req.version)?;
        view(db, connection, me)
    })
    .await?;

    Ok(Json(updated))
}

pub async fn delete_connection(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(connection_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    blocking(&state, move |db| db.delete_connection(connection_id, me)).await?;
    Ok(StatusCode::NO_CONTENT)
}

use anyhow::Result;
use chrono::{Local, Utc};
use rusqlite::Connection;
use tracing::{info, warn};
use uuid::Uuid;

use stride_types::api::{
    CreateActivityRequest, CreateWorkoutRequest, ProposalDirection, ProposeActivityRequest,
    ProposeWorkoutRequest, UpdateActivityRequest, UpdateWorkoutRequest,
};
use stride_types::models::{
    ActivityPayload, ActivityProposal, ActivityStatus, DEFAULT_DURATION_MINUTES,
    MAX_DURATION_MINUTES, MAX_TITLE_CHARS, PlanStatus, ProposalAction, ProposalKind,
    ProposalResponse, ProposalStatus, WorkoutProposal,
};

use super::{
    are_connected, delete_activity, delete_workout, fetch_all, fetch_one, insert_activity,
    insert_workout, query_activity, query_user_by_id, query_workout, update_activity,
    update_workout,
};
use crate::Database;
use crate::error::Rejection;
use crate::models::{FromRow, select_list};

/// Outcome of an approve/reject.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub proposal_id: Uuid,
    pub status: ProposalStatus,
    /// Whether approval changed a record; false for rejections and for
    /// UPDATE/DELETE proposals whose target no longer exists.
    pub applied: bool,
    /// The created record, or the UPDATE/DELETE target.
    pub record_id: Option<Uuid>,
}

impl Database {
    // -- Activity proposals --

    pub fn create_activity_proposal(
        &self,
        author: Uuid,
        req: &ProposeActivityRequest,
    ) -> Result<ActivityProposal> {
        self.with_tx(|tx| {
            authorize_author(tx, author, req.proposed_for_id)?;
            check_original(req.action, req.original_activity_id, |id| {
                Ok(query_activity(tx, id, req.proposed_for_id)?.is_some())
            })?;
            check_title(req.action, req.payload.title.as_deref())?;

            let payload = &req.payload;
            if let (Some(start), Some(end)) = (payload.start_time, payload.end_time) {
                if end < start {
                    return Err(Rejection::invalid("end_time is before start_time").into());
                }
            }
            check_duration(payload.duration_minutes())?;

            let id = Uuid::new_v4();
            tx.execute(
                "INSERT INTO activity_proposals
                    (id, action, status, proposed_by_id, proposed_for_id, original_activity_id,
                     title, description, activity_type, start_time, end_time, location, notes, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                rusqlite::params![
                    id.to_string(),
                    req.action.as_str(),
                    ProposalStatus::PendingApproval.as_str(),
                    author.to_string(),
                    req.proposed_for_id.to_string(),
                    req.original_activity_id.map(|u| u.to_string()),
                    payload.title,
                    payload.description,
                    payload.activity_type.map(|t| t.as_str()),
                    payload.start_time,
                    payload.end_time,
                    payload.location,
                    req.notes,
                    Utc::now()
                ],
            )?;

            info!(
                "Activity proposal {} ({}) from {} for {}",
                id, req.action, author, req.proposed_for_id
            );
            query_activity_proposal(tx, id)?
                .ok_or_else(|| anyhow::anyhow!("activity proposal {} vanished after insert", id))
        })
    }

    pub fn get_activity_proposal(&self, id: Uuid) -> Result<Option<ActivityProposal>> {
        self.with_conn(|conn| query_activity_proposal(conn, id))
    }

    pub fn list_activity_proposals(
        &self,
        user: Uuid,
        direction: ProposalDirection,
        status: Option<ProposalStatus>,
    ) -> Result<Vec<ActivityProposal>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM activity_proposals p WHERE {}",
                select_list::<ActivityProposal>("p"),
                LIST_FILTER
            );
            let (sent, received) = direction_flags(direction);
            fetch_all(
                conn,
                &sql,
                rusqlite::params![user.to_string(), sent, received, status.map(|s| s.as_str())],
            )
        })
    }

    // -- Workout proposals --

    pub fn create_workout_proposal(
        &self,
        author: Uuid,
        req: &ProposeWorkoutRequest,
    ) -> Result<WorkoutProposal> {
        self.with_tx(|tx| {
            authorize_author(tx, author, req.proposed_for_id)?;
            check_original(req.action, req.original_workout_id, |id| {
                Ok(query_workout(tx, id, req.proposed_for_id)?.is_some())
            })?;
            check_title(req.action, req.payload.title.as_deref())?;

            let payload = &req.payload;
            check_duration(payload.duration)?;
            if payload.distance.is_some_and(|d| !d.is_finite() || d < 0.0)
                || payload.calories.is_some_and(|c| c < 0)
            {
                return Err(Rejection::invalid("distance and calories cannot be negative").into());
            }

            let id = Uuid::new_v4();
            tx.execute(
                "INSERT INTO workout_proposals
                    (id, action, status, proposed_by_id, proposed_for_id, original_workout_id,
                     title, description, workout_type, date, duration, distance, calories, notes, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                rusqlite::params![
                    id.to_string(),
                    req.action.as_str(),
                    ProposalStatus::PendingApproval.as_str(),
                    author.to_string(),
                    req.proposed_for_id.to_string(),
                    req.original_workout_id.map(|u| u.to_string()),
                    payload.title,
                    payload.description,
                    payload.workout_type.map(|t| t.as_str()),
                    payload.date,
                    payload.duration,
                    payload.distance,
                    payload.calories,
                    req.notes,
                    Utc::now()
                ],
            )?;

            info!(
                "Workout proposal {} ({}) from {} for {}",
                id, req.action, author, req.proposed_for_id
            );
            query_workout_proposal(tx, id)?
                .ok_or_else(|| anyhow::anyhow!("workout proposal {} vanished after insert", id))
        })
    }

    pub fn get_workout_proposal(&self, id: Uuid) -> Result<Option<WorkoutProposal>> {
        self.with_conn(|conn| query_workout_proposal(conn, id))
    }

    pub fn list_workout_proposals(
        &self,
        user: Uuid,
        direction: ProposalDirection,
        status: Option<ProposalStatus>,
    ) -> Result<Vec<WorkoutProposal>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM workout_proposals p WHERE {}",
                select_list::<WorkoutProposal>("p"),
                LIST_FILTER
            );
            let (sent, received) = direction_flags(direction);
            fetch_all(
                conn,
                &sql,
                rusqlite::params![user.to_string(), sent, received, status.map(|s| s.as_str())],
            )
        })
    }

    // -- Responding --

    /// Approves or rejects a pending proposal.
    ///
    /// The status change and, on approval, the materialization of the change run in
    /// one transaction: either both land or neither does.
    pub fn respond_to_proposal(
        &self,
        kind: ProposalKind,
        id: Uuid,
        actor: Uuid,
        response: ProposalResponse,
        notes: Option<&str>,
    ) -> Result<Resolution> {
        self.with_tx(|tx| {
            let resolution = match kind {
                ProposalKind::Activity => {
                    let proposal =
                        query_activity_proposal(tx, id)?.ok_or(Rejection::NotFound("proposal"))?;
                    let next = next_status(proposal.proposed_for_id, proposal.status, actor, response)?;
                    mark_responded(tx, "activity_proposals", id, next, notes, proposal.version)?;

                    let (applied, record_id) = match next {
                        ProposalStatus::Approved => materialize_activity(tx, &proposal)?,
                        _ => (false, None),
                    };
                    Resolution { proposal_id: id, status: next, applied, record_id }
                }
                ProposalKind::Workout => {
                    let proposal =
                        query_workout_proposal(tx, id)?.ok_or(Rejection::NotFound("proposal"))?;
                    let next = next_status(proposal.proposed_for_id, proposal.status, actor, response)?;
                    mark_responded(tx, "workout_proposals", id, next, notes, proposal.version)?;

                    let (applied, record_id) = match next {
                        ProposalStatus::Approved => materialize_workout(tx, &proposal)?,
                        _ => (false, None),
                    };
                    Resolution { proposal_id: id, status: next, applied, record_id }
                }
            };

            info!(
                "{} proposal {} {} by {} (applied: {})",
                kind, id, resolution.status, actor, resolution.applied
            );
            Ok(resolution)
        })
    }
}

const LIST_FILTER: &str = "((?2 AND p.proposed_by_id = ?1) OR (?3 AND p.proposed_for_id = ?1))
       AND (?4 IS NULL OR p.status = ?4)
     ORDER BY p.created_at DESC";

fn direction_flags(direction: ProposalDirection) -> (bool, bool) {
    match direction {
        ProposalDirection::Sent => (true, false),
        ProposalDirection::Received => (false, true),
        ProposalDirection::All => (true, true),
    }
}

/// Author must hold a coaching role and an ACCEPTED connection with the target.
fn authorize_author(conn: &Connection, author: Uuid, target: Uuid) -> Result<()> {
    let user = query_user_by_id(conn, author)?.ok_or(Rejection::NotFound("user"))?;
    if !user.role.can_propose() {
        return Err(Rejection::forbidden("only coaches and professionals can propose changes").into());
    }
    if !are_connected(conn, author, target)? {
        return Err(Rejection::forbidden("an accepted connection with this user is required").into());
    }
    Ok(())
}

fn check_original<F>(action: ProposalAction, original: Option<Uuid>, exists: F) -> Result<()>
where
    F: FnOnce(Uuid) -> Result<bool>,
{
    match (action.needs_original(), original) {
        (true, None) => Err(Rejection::invalid(format!("{action} proposals must name the record to change")).into()),
        (false, Some(_)) => Err(Rejection::invalid("CREATE proposals cannot reference an existing record").into()),
        (true, Some(id)) => {
            if exists(id)? {
                Ok(())
            } else {
                Err(Rejection::invalid("the referenced record does not belong to this user").into())
            }
        }
        (false, None) => Ok(()),
    }
}

/// Same bounds the owner's direct writes enforce.
fn check_title(action: ProposalAction, title: Option<&str>) -> Result<()> {
    match title.map(str::trim) {
        Some("") => Err(Rejection::invalid("title cannot be blank").into()),
        Some(t) if t.chars().count() > MAX_TITLE_CHARS => Err(Rejection::invalid(format!(
            "title must be at most {MAX_TITLE_CHARS} characters"
        ))
        .into()),
        None if action == ProposalAction::Create => Err(Rejection::invalid("title is required").into()),
        _ => Ok(()),
    }
}

fn check_duration(minutes: Option<i64>) -> Result<()> {
    match minutes {
        Some(m) if !(1..=MAX_DURATION_MINUTES).contains(&m) => Err(Rejection::invalid(format!(
            "duration must be between 1 and {MAX_DURATION_MINUTES} minutes"
        ))
        .into()),
        _ => Ok(()),
    }
}

fn next_status(
    proposed_for: Uuid,
    current: ProposalStatus,
    actor: Uuid,
    response: ProposalResponse,
) -> Result<ProposalStatus> {
    if proposed_for != actor {
        return Err(Rejection::forbidden("only the recipient can respond to this proposal").into());
    }
    current.respond(response).ok_or_else(|| {
        Rejection::invalid(format!("proposal is already {}", current.as_str().to_lowercase())).into()
    })
}

/// Compare-and-set from PENDING_APPROVAL; losing a concurrent response is a conflict.
fn mark_responded(
    conn: &Connection,
    table: &'static str,
    id: Uuid,
    next: ProposalStatus,
    notes: Option<&str>,
    version: i64,
) -> Result<()> {
    let changed = conn.execute(
        &format!(
            "UPDATE {table} SET status = ?1, response_notes = ?2, responded_at = ?3, version = version + 1
             WHERE id = ?4 AND status = ?5 AND version = ?6"
        ),
        rusqlite::params![
            next.as_str(),
            notes,
            Utc::now(),
            id.to_string(),
            ProposalStatus::PendingApproval.as_str(),
            version
        ],
    )?;
    if changed == 0 {
        warn!("Proposal {} response lost a race", id);
        return Err(Rejection::conflict("proposal was answered concurrently").into());
    }
    Ok(())
}

fn materialize_activity(conn: &Connection, p: &ActivityProposal) -> Result<(bool, Option<Uuid>)> {
    let owner = p.proposed_for_id;
    let payload = &p.payload;

    let target = match (p.action, p.original_activity_id) {
        (ProposalAction::Create, _) => {
            let req = CreateActivityRequest {
                title: payload.title.clone().unwrap_or_default(),
                description: payload.description.clone(),
                date: payload.date_or(Local::now().date_naive()),
                time: Some(payload.time().unwrap_or_else(ActivityPayload::default_start)),
                duration: Some(payload.duration_minutes().unwrap_or(DEFAULT_DURATION_MINUTES)),
                activity_type: payload.activity_type,
                status: Some(ActivityStatus::Scheduled),
                location: payload.location.clone(),
            };
            let created = insert_activity(conn, owner, &req, Some(p.proposed_by_id))?;
            return Ok((true, Some(created.id)));
        }
        (_, Some(target)) => target,
        (_, None) => {
            warn!("Proposal {} has no original activity; nothing to apply", p.id);
            return Ok((false, None));
        }
    };

    let applied = if p.action == ProposalAction::Update {
        let changes = UpdateActivityRequest {
            title: payload.title.clone(),
            description: payload.description.clone(),
            date: payload.start_time.map(|t| t.date()),
            time: payload.time(),
            duration: payload.duration_minutes(),
            activity_type: payload.activity_type,
            status: None,
            location: payload.location.clone(),
        };
        update_activity(conn, target, owner, &changes)?.is_some()
    } else {
        delete_activity(conn, target, owner)?
    };

    if !applied {
        warn!(
            "Approved proposal {} targets activity {} which no longer exists",
            p.id, target
        );
    }
    Ok((applied, Some(target)))
}

fn materialize_workout(conn: &Connection, p: &WorkoutProposal) -> Result<(bool, Option<Uuid>)> {
    let owner = p.proposed_for_id;
    let payload = &p.payload;

    let target = match (p.action, p.original_workout_id) {
        (ProposalAction::Create, _) => {
            let req = CreateWorkoutRequest {
                title: payload.title.clone().unwrap_or_default(),
                description: payload.description.clone(),
                date: payload.date.unwrap_or_else(|| Local::now().date_naive()),
                duration: Some(payload.duration.unwrap_or(DEFAULT_DURATION_MINUTES)),
                distance: payload.distance,
                calories: payload.calories,
                rpe: None,
                workout_type: payload.workout_type,
                status: Some(PlanStatus::Planned),
            };
            let created = insert_workout(conn, owner, &req)?;
            return Ok((true, Some(created.id)));
        }
        (_, Some(target)) => target,
        (_, None) => {
            warn!("Proposal {} has no original workout; nothing to apply", p.id);
            return Ok((false, None));
        }
    };

    let applied = if p.action == ProposalAction::Update {
        let changes = UpdateWorkoutRequest {
            title: payload.title.clone(),
            description: payload.description.clone(),
            date: payload.date,
            duration: payload.duration,
            distance: payload.distance,
            calories: payload.calories,
            workout_type: payload.workout_type,
            ..Default::default()
        };
        update_workout(conn, target, owner, &changes)?.is_some()
    } else {
        delete_workout(conn, target, owner)?
    };

    if !applied {
        warn!(
            "Approved proposal {} targets workout {} which no longer exists",
            p.id, target
        );
    }
    Ok((applied, Some(target)))
}

fn query_activity_proposal(conn: &Connection, id: Uuid) -> Result<Option<ActivityProposal>> {
    let sql = format!(
        "SELECT {} FROM activity_proposals p WHERE p.id = ?1",
        select_list::<ActivityProposal>("p")
    );
    fetch_one(conn, &sql, [id.to_string()])
}

fn query_workout_proposal(conn: &Connection, id: Uuid) -> Result<Option<WorkoutProposal>> {
    let sql = format!(
        "SELECT {} FROM workout_proposals p WHERE p.id = ?1",
        select_list::<WorkoutProposal>("p")
    );
    fetch_one(conn, &sql, [id.to_string()])
}

// Column counts must match the decoders in models.rs.
const _: () = assert!(ActivityProposal::COLUMNS.len() == 17);
const _: () = assert!(WorkoutProposal::COLUMNS.len() == 18);

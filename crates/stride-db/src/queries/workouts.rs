use anyhow::Result;
use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use stride_types::api::{CreateWorkoutRequest, UpdateWorkoutRequest};
use stride_types::models::{DEFAULT_DURATION_MINUTES, PlanStatus, Workout, WorkoutType};

use super::{fetch_all, fetch_one};
use crate::Database;
use crate::models::select_list;

impl Database {
    pub fn create_workout(&self, owner: Uuid, req: &CreateWorkoutRequest) -> Result<Workout> {
        self.with_conn(|conn| insert_workout(conn, owner, req))
    }

    pub fn get_workout(&self, id: Uuid, owner: Uuid) -> Result<Option<Workout>> {
        self.with_conn(|conn| query_workout(conn, id, owner))
    }

    pub fn list_workouts(
        &self,
        owner: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Workout>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM workouts w
                 WHERE w.owner_id = ?1
                   AND (?2 IS NULL OR w.date >= ?2)
                   AND (?3 IS NULL OR w.date <= ?3)
                 ORDER BY w.date, w.created_at",
                select_list::<Workout>("w")
            );
            fetch_all(conn, &sql, rusqlite::params![owner.to_string(), from, to])
        })
    }

    pub fn update_workout(
        &self,
        id: Uuid,
        owner: Uuid,
        changes: &UpdateWorkoutRequest,
    ) -> Result<Option<Workout>> {
        self.with_conn(|conn| update_workout(conn, id, owner, changes))
    }

    pub fn delete_workout(&self, id: Uuid, owner: Uuid) -> Result<bool> {
        self.with_conn(|conn| delete_workout(conn, id, owner))
    }
}

pub(crate) fn insert_workout(
    conn: &Connection,
    owner: Uuid,
    req: &CreateWorkoutRequest,
) -> Result<Workout> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    conn.execute(
        "INSERT INTO workouts
            (id, owner_id, title, description, date, duration, distance, calories, rpe,
             workout_type, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
        rusqlite::params![
            id.to_string(),
            owner.to_string(),
            req.title,
            req.description,
            req.date,
            req.duration.unwrap_or(DEFAULT_DURATION_MINUTES),
            req.distance,
            req.calories,
            req.rpe,
            req.workout_type.unwrap_or(WorkoutType::Other).as_str(),
            req.status.unwrap_or(PlanStatus::Planned).as_str(),
            now
        ],
    )?;

    query_workout(conn, id, owner)?
        .ok_or_else(|| anyhow::anyhow!("workout {} vanished after insert", id))
}

pub(crate) fn query_workout(conn: &Connection, id: Uuid, owner: Uuid) -> Result<Option<Workout>> {
    let sql = format!(
        "SELECT {} FROM workouts w WHERE w.id = ?1 AND w.owner_id = ?2",
        select_list::<Workout>("w")
    );
    fetch_one(conn, &sql, [id.to_string(), owner.to_string()])
}

pub(crate) fn update_workout(
    conn: &Connection,
    id: Uuid,
    owner: Uuid,
    changes: &UpdateWorkoutRequest,
) -> Result<Option<Workout>> {
    let changed = conn.execute(
        "UPDATE workouts SET
            title = COALESCE(?1, title),
            description = COALESCE(?2, description),
            date = COALESCE(?3, date),
            duration = COALESCE(?4, duration),
            distance = COALESCE(?5, distance),
            calories = COALESCE(?6, calories),
            rpe = COALESCE(?7, rpe),
            workout_type = COALESCE(?8, workout_type),
            status = COALESCE(?9, status),
            updated_at = ?10
         WHERE id = ?11 AND owner_id = ?12",
        rusqlite::params![
            changes.title,
            changes.description,
            changes.date,
            changes.duration,
            changes.distance,
            changes.calories,
            changes.rpe,
            changes.workout_type.map(|t| t.as_str()),
            changes.status.map(|s| s.as_str()),
            Utc::now(),
            id.to_string(),
            owner.to_string()
        ],
    )?;

    if changed == 0 {
        return Ok(None);
    }
    query_workout(conn, id, owner)
}

pub(crate) fn delete_workout(conn: &Connection, id: Uuid, owner: Uuid) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM workouts WHERE id = ?1 AND owner_id = ?2",
        [id.to_string(), owner.to_string()],
    )?;
    Ok(deleted > 0)
}

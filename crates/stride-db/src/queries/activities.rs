use anyhow::Result;
use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use stride_types::api::{CreateActivityRequest, UpdateActivityRequest};
use stride_types::models::{
    ActivityPayload, ActivityStatus, ActivityType, DEFAULT_DURATION_MINUTES, ScheduledActivity,
};

use super::{fetch_all, fetch_one};
use crate::Database;
use crate::models::select_list;

impl Database {
    pub fn create_activity(
        &self,
        owner: Uuid,
        req: &CreateActivityRequest,
    ) -> Result<ScheduledActivity> {
        self.with_conn(|conn| insert_activity(conn, owner, req, None))
    }

    pub fn get_activity(&self, id: Uuid, owner: Uuid) -> Result<Option<ScheduledActivity>> {
        self.with_conn(|conn| query_activity(conn, id, owner))
    }

    /// Owner's activities ordered by date then time, optionally bounded (inclusive).
    pub fn list_activities(
        &self,
        owner: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<ScheduledActivity>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM activities a
                 WHERE a.owner_id = ?1
                   AND (?2 IS NULL OR a.date >= ?2)
                   AND (?3 IS NULL OR a.date <= ?3)
                 ORDER BY a.date, a.time",
                select_list::<ScheduledActivity>("a")
            );
            fetch_all(conn, &sql, rusqlite::params![owner.to_string(), from, to])
        })
    }

    pub fn update_activity(
        &self,
        id: Uuid,
        owner: Uuid,
        changes: &UpdateActivityRequest,
    ) -> Result<Option<ScheduledActivity>> {
        self.with_conn(|conn| update_activity(conn, id, owner, changes))
    }

    pub fn delete_activity(&self, id: Uuid, owner: Uuid) -> Result<bool> {
        self.with_conn(|conn| delete_activity(conn, id, owner))
    }
}

pub(crate) fn insert_activity(
    conn: &Connection,
    owner: Uuid,
    req: &CreateActivityRequest,
    assigned_by: Option<Uuid>,
) -> Result<ScheduledActivity> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    conn.execute(
        "INSERT INTO activities
            (id, owner_id, title, description, date, time, duration, activity_type, status,
             location, assigned_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
        rusqlite::params![
            id.to_string(),
            owner.to_string(),
            req.title,
            req.description,
            req.date,
            req.time.unwrap_or_else(ActivityPayload::default_start),
            req.duration.unwrap_or(DEFAULT_DURATION_MINUTES),
            req.activity_type.unwrap_or(ActivityType::Training).as_str(),
            req.status.unwrap_or(ActivityStatus::Scheduled).as_str(),
            req.location,
            assigned_by.map(|u| u.to_string()),
            now
        ],
    )?;

    query_activity(conn, id, owner)?
        .ok_or_else(|| anyhow::anyhow!("activity {} vanished after insert", id))
}

pub(crate) fn query_activity(
    conn: &Connection,
    id: Uuid,
    owner: Uuid,
) -> Result<Option<ScheduledActivity>> {
    let sql = format!(
        "SELECT {} FROM activities a WHERE a.id = ?1 AND a.owner_id = ?2",
        select_list::<ScheduledActivity>("a")
    );
    fetch_one(conn, &sql, [id.to_string(), owner.to_string()])
}

/// Overwrites the fields present in `changes`; `None` when no row matched.
pub(crate) fn update_activity(
    conn: &Connection,
    id: Uuid,
    owner: Uuid,
    changes: &UpdateActivityRequest,
) -> Result<Option<ScheduledActivity>> {
    let changed = conn.execute(
        "UPDATE activities SET
            title = COALESCE(?1, title),
            description = COALESCE(?2, description),
            date = COALESCE(?3, date),
            time = COALESCE(?4, time),
            duration = COALESCE(?5, duration),
            activity_type = COALESCE(?6, activity_type),
            status = COALESCE(?7, status),
            location = COALESCE(?8, location),
            updated_at = ?9
         WHERE id = ?10 AND owner_id = ?11",
        rusqlite::params![
            changes.title,
            changes.description,
            changes.date,
            changes.time,
            changes.duration,
            changes.activity_type.map(|t| t.as_str()),
            changes.status.map(|s| s.as_str()),
            changes.location,
            Utc::now(),
            id.to_string(),
            owner.to_string()
        ],
    )?;

    if changed == 0 {
        return Ok(None);
    }
    query_activity(conn, id, owner)
}

pub(crate) fn delete_activity(conn: &Connection, id: Uuid, owner: Uuid) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM activities WHERE id = ?1 AND owner_id = ?2",
        [id.to_string(), owner.to_string()],
    )?;
    Ok(deleted > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::user;
    use chrono::NaiveTime;
    use stride_types::models::Role;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn request(title: &str, date: NaiveDate) -> CreateActivityRequest {
        CreateActivityRequest {
            title: title.into(),
            description: None,
            date,
            time: None,
            duration: None,
            activity_type: None,
            status: None,
            location: None,
        }
    }

    #[test]
    fn test_create_applies_defaults() {
        let db = Database::open_in_memory().unwrap();
        let me = user(&db, "ana", Role::Athlete);

        let a = db.create_activity(me.id, &request("Physio", day(3))).unwrap();
        assert_eq!(a.time, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(a.duration, DEFAULT_DURATION_MINUTES);
        assert_eq!(a.status, ActivityStatus::Scheduled);
        assert_eq!(a.assigned_by, None);
    }

    #[test]
    fn test_list_is_owner_scoped_and_date_bounded() {
        let db = Database::open_in_memory().unwrap();
        let me = user(&db, "ana", Role::Athlete);
        let other = user(&db, "ben", Role::Athlete);

        db.create_activity(me.id, &request("a", day(1))).unwrap();
        db.create_activity(me.id, &request("b", day(5))).unwrap();
        db.create_activity(me.id, &request("c", day(9))).unwrap();
        db.create_activity(other.id, &request("x", day(5))).unwrap();

        let all = db.list_activities(me.id, None, None).unwrap();
        assert_eq!(all.len(), 3);

        let window = db.list_activities(me.id, Some(day(2)), Some(day(9))).unwrap();
        let titles: Vec<_> = window.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "c"]);
    }

    #[test]
    fn test_update_and_delete_hide_foreign_rows() {
        let db = Database::open_in_memory().unwrap();
        let me = user(&db, "ana", Role::Athlete);
        let other = user(&db, "ben", Role::Athlete);
        let a = db.create_activity(me.id, &request("Swim", day(2))).unwrap();

        let changes = UpdateActivityRequest {
            duration: Some(30),
            status: Some(ActivityStatus::Completed),
            ..Default::default()
        };
        assert!(db.update_activity(a.id, other.id, &changes).unwrap().is_none());

        let updated = db.update_activity(a.id, me.id, &changes).unwrap().unwrap();
        assert_eq!(updated.title, "Swim");
        assert_eq!(updated.duration, 30);
        assert_eq!(updated.status, ActivityStatus::Completed);

        assert!(!db.delete_activity(a.id, other.id).unwrap());
        assert!(db.delete_activity(a.id, me.id).unwrap());
        assert!(db.get_activity(a.id, me.id).unwrap().is_none());
    }
}

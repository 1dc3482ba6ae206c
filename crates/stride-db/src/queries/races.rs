use anyhow::Result;
use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use stride_types::api::{CreateRaceRequest, UpdateRaceRequest};
use stride_types::models::{PlanStatus, RaceResult};

use super::{fetch_all, fetch_one};
use crate::Database;
use crate::models::select_list;

impl Database {
    pub fn create_race(&self, owner: Uuid, req: &CreateRaceRequest) -> Result<RaceResult> {
        self.with_conn(|conn| {
            let id = Uuid::new_v4();
            conn.execute(
                "INSERT INTO races
                    (id, owner_id, event_name, event_type, date, finish_time, distance, position,
                     total_participants, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
                rusqlite::params![
                    id.to_string(),
                    owner.to_string(),
                    req.event_name,
                    req.event_type,
                    req.date,
                    req.finish_time,
                    req.distance,
                    req.position,
                    req.total_participants,
                    req.status.unwrap_or(PlanStatus::Planned).as_str(),
                    Utc::now()
                ],
            )?;
            query_race(conn, id, owner)?
                .ok_or_else(|| anyhow::anyhow!("race {} vanished after insert", id))
        })
    }

    pub fn get_race(&self, id: Uuid, owner: Uuid) -> Result<Option<RaceResult>> {
        self.with_conn(|conn| query_race(conn, id, owner))
    }

    pub fn list_races(
        &self,
        owner: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<RaceResult>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM races r
                 WHERE r.owner_id = ?1
                   AND (?2 IS NULL OR r.date >= ?2)
                   AND (?3 IS NULL OR r.date <= ?3)
                 ORDER BY r.date, r.created_at",
                select_list::<RaceResult>("r")
            );
            fetch_all(conn, &sql, rusqlite::params![owner.to_string(), from, to])
        })
    }

    pub fn update_race(
        &self,
        id: Uuid,
        owner: Uuid,
        changes: &UpdateRaceRequest,
    ) -> Result<Option<RaceResult>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE races SET
                    event_name = COALESCE(?1, event_name),
                    event_type = COALESCE(?2, event_type),
                    date = COALESCE(?3, date),
                    finish_time = COALESCE(?4, finish_time),
                    distance = COALESCE(?5, distance),
                    position = COALESCE(?6, position),
                    total_participants = COALESCE(?7, total_participants),
                    status = COALESCE(?8, status),
                    updated_at = ?9
                 WHERE id = ?10 AND owner_id = ?11",
                rusqlite::params![
                    changes.event_name,
                    changes.event_type,
                    changes.date,
                    changes.finish_time,
                    changes.distance,
                    changes.position,
                    changes.total_participants,
                    changes.status.map(|s| s.as_str()),
                    Utc::now(),
                    id.to_string(),
                    owner.to_string()
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_race(conn, id, owner)
        })
    }

    pub fn delete_race(&self, id: Uuid, owner: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM races WHERE id = ?1 AND owner_id = ?2",
                [id.to_string(), owner.to_string()],
            )?;
            Ok(deleted > 0)
        })
    }
}

fn query_race(conn: &Connection, id: Uuid, owner: Uuid) -> Result<Option<RaceResult>> {
    let sql = format!(
        "SELECT {} FROM races r WHERE r.id = ?1 AND r.owner_id = ?2",
        select_list::<RaceResult>("r")
    );
    fetch_one(conn, &sql, [id.to_string(), owner.to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::user;
    use stride_types::models::Role;

    #[test]
    fn test_race_result_lifecycle() {
        let db = Database::open_in_memory().unwrap();
        let me = user(&db, "ana", Role::Athlete);
        let date = NaiveDate::from_ymd_opt(2024, 9, 29).unwrap();

        let race = db
            .create_race(
                me.id,
                &CreateRaceRequest {
                    event_name: "Berlin Marathon".into(),
                    event_type: "MARATHON".into(),
                    date,
                    finish_time: None,
                    distance: Some(42.195),
                    position: None,
                    total_participants: None,
                    status: None,
                },
            )
            .unwrap();
        assert_eq!(race.status, PlanStatus::Planned);

        let done = db
            .update_race(
                race.id,
                me.id,
                &UpdateRaceRequest {
                    finish_time: Some("03:12:45".into()),
                    position: Some(4120),
                    total_participants: Some(44000),
                    status: Some(PlanStatus::Completed),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(done.event_name, "Berlin Marathon");
        assert_eq!(done.finish_time.as_deref(), Some("03:12:45"));
        assert_eq!(done.status, PlanStatus::Completed);

        assert_eq!(db.list_races(me.id, Some(date), None).unwrap().len(), 1);
        assert!(db.delete_race(race.id, me.id).unwrap());
        assert!(db.get_race(race.id, me.id).unwrap().is_none());
    }
}

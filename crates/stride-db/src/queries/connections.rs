use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection as SqlConnection;
use tracing::{info, warn};
use uuid::Uuid;

use stride_types::models::{
    Connection, ConnectionAction, ConnectionStatus, User, ordered_pair,
};

use super::{OptionalExt, fetch_all, fetch_one, query_user_by_id};
use crate::error::{Rejection, is_unique_violation};
use crate::models::{FromRow, select_list};
use crate::Database;

impl Database {
    /// Opens a PENDING request from `initiator` to `recipient`.
    ///
    /// A previously REJECTED row for the pair is replaced; a live one is a conflict.
    pub fn create_connection(&self, initiator: Uuid, recipient: Uuid) -> Result<Connection> {
        if initiator == recipient {
            return Err(Rejection::invalid("cannot connect to yourself").into());
        }

        self.with_tx(|tx| {
            if query_user_by_id(tx, recipient)?.is_none() {
                return Err(Rejection::NotFound("user").into());
            }

            if let Some(existing) = query_pair(tx, initiator, recipient)? {
                if existing.status.is_live() {
                    return Err(Rejection::conflict(format!(
                        "a {} connection already exists between these users",
                        existing.status.as_str().to_lowercase()
                    ))
                    .into());
                }
                tx.execute("DELETE FROM connections WHERE id = ?1", [existing.id.to_string()])?;
            }

            let id = Uuid::new_v4();
            let (low, high) = ordered_pair(initiator, recipient);
            let now = Utc::now();
            let inserted = tx.execute(
                "INSERT INTO connections
                    (id, initiator_id, recipient_id, pair_low, pair_high, status, version, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)",
                rusqlite::params![
                    id.to_string(),
                    initiator.to_string(),
                    recipient.to_string(),
                    low.to_string(),
                    high.to_string(),
                    ConnectionStatus::Pending.as_str(),
                    now
                ],
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {
                    return Err(Rejection::conflict("a connection already exists between these users").into());
                }
                Err(e) => return Err(e.into()),
            }

            info!("Connection {} requested: {} -> {}", id, initiator, recipient);
            query_connection(tx, id)?.ok_or_else(|| Rejection::NotFound("connection").into())
        })
    }

    pub fn get_connection(&self, id: Uuid) -> Result<Option<Connection>> {
        self.with_conn(|conn| query_connection(conn, id))
    }

    /// Recipient accepts or rejects a PENDING connection.
    ///
    /// The update is a compare-and-set on `status = 'PENDING'` (and on `version`
    /// when the caller supplies one), so a second concurrent response gets a conflict.
    pub fn respond_to_connection(
        &self,
        id: Uuid,
        actor: Uuid,
        action: ConnectionAction,
        expected_version: Option<i64>,
    ) -> Result<Connection> {
        self.with_tx(|tx| {
            let current = query_connection(tx, id)?.ok_or(Rejection::NotFound("connection"))?;

            if current.recipient_id != actor {
                return Err(Rejection::forbidden("only the recipient can respond to a connection request").into());
            }

            let Some(next) = current.status.respond(action) else {
                return Err(Rejection::invalid(format!(
                    "connection is already {}",
                    current.status.as_str().to_lowercase()
                ))
                .into());
            };

            if let Some(version) = expected_version {
                if version != current.version {
                    return Err(Rejection::conflict("connection was modified; reload and retry").into());
                }
            }

            let changed = tx.execute(
                "UPDATE connections SET status = ?1, version = version + 1, updated_at = ?2
                 WHERE id = ?3 AND status = ?4 AND version = ?5",
                rusqlite::params![
                    next.as_str(),
                    Utc::now(),
                    id.to_string(),
                    ConnectionStatus::Pending.as_str(),
                    current.version
                ],
            )?;
            if changed == 0 {
                warn!("Connection {} response lost a race", id);
                return Err(Rejection::conflict("connection was answered concurrently").into());
            }

            info!("Connection {} {} by {}", id, next.as_str(), actor);
            query_connection(tx, id)?.ok_or_else(|| Rejection::NotFound("connection").into())
        })
    }

    /// Either party may remove a connection in any state.
    pub fn delete_connection(&self, id: Uuid, actor: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            let current = query_connection(conn, id)?.ok_or(Rejection::NotFound("connection"))?;
            if !current.is_party(actor) {
                return Err(Rejection::forbidden("not a party to this connection").into());
            }
            conn.execute("DELETE FROM connections WHERE id = ?1", [id.to_string()])?;
            info!("Connection {} removed by {}", id, actor);
            Ok(())
        })
    }

    /// Connections involving `user`, each paired with the user on the other side.
    pub fn list_connections(
        &self,
        user: Uuid,
        status: Option<ConnectionStatus>,
    ) -> Result<Vec<(Connection, User)>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {}, {} FROM connections c
                 JOIN users u ON u.id = CASE WHEN c.initiator_id = ?1 THEN c.recipient_id ELSE c.initiator_id END
                 WHERE (c.initiator_id = ?1 OR c.recipient_id = ?1)
                   AND (?2 IS NULL OR c.status = ?2)
                 ORDER BY c.updated_at DESC",
                select_list::<Connection>("c"),
                select_list::<User>("u")
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![user.to_string(), status.map(|s| s.as_str())],
                    |row| {
                        Ok((
                            Connection::from_row(row, 0)?,
                            User::from_row(row, Connection::COLUMNS.len())?,
                        ))
                    },
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Status of the most recent connection between two users, if any.
    pub fn connection_status_between(&self, a: Uuid, b: Uuid) -> Result<Option<ConnectionStatus>> {
        self.with_conn(|conn| Ok(query_pair(conn, a, b)?.map(|c| c.status)))
    }

    pub fn are_connected(&self, a: Uuid, b: Uuid) -> Result<bool> {
        self.with_conn(|conn| are_connected(conn, a, b))
    }

    /// Ids of every user holding an ACCEPTED connection with `user`.
    pub fn connected_user_ids(&self, user: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT CASE WHEN initiator_id = ?1 THEN recipient_id ELSE initiator_id END
                 FROM connections
                 WHERE (initiator_id = ?1 OR recipient_id = ?1) AND status = ?2",
            )?;
            let ids = stmt
                .query_map(
                    rusqlite::params![user.to_string(), ConnectionStatus::Accepted.as_str()],
                    |row| crate::models::uuid_at(row, 0),
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }
}

/// ACCEPTED connection in either direction.
pub(crate) fn are_connected(conn: &SqlConnection, a: Uuid, b: Uuid) -> Result<bool> {
    let (low, high) = ordered_pair(a, b);
    let found = conn
        .query_row(
            "SELECT 1 FROM connections WHERE pair_low = ?1 AND pair_high = ?2 AND status = ?3",
            rusqlite::params![low.to_string(), high.to_string(), ConnectionStatus::Accepted.as_str()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn query_connection(conn: &SqlConnection, id: Uuid) -> Result<Option<Connection>> {
    let sql = format!(
        "SELECT {} FROM connections c WHERE c.id = ?1",
        select_list::<Connection>("c")
    );
    fetch_one(conn, &sql, [id.to_string()])
}

/// Newest row for the unordered pair; live rows win over rejected ones.
fn query_pair(conn: &SqlConnection, a: Uuid, b: Uuid) -> Result<Option<Connection>> {
    let (low, high) = ordered_pair(a, b);
    let sql = format!(
        "SELECT {} FROM connections c
         WHERE c.pair_low = ?1 AND c.pair_high = ?2
         ORDER BY CASE WHEN c.status IN ('PENDING', 'ACCEPTED') THEN 0 ELSE 1 END, c.updated_at DESC",
        select_list::<Connection>("c")
    );
    let rows: Vec<Connection> = fetch_all(conn, &sql, [low.to_string(), high.to_string()])?;
    Ok(rows.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::user;
    use stride_types::models::Role;

    fn rejection(err: &anyhow::Error) -> &Rejection {
        err.downcast_ref::<Rejection>().expect("expected a Rejection")
    }

    #[test]
    fn test_accept_flow_and_initiator_perspective() {
        let db = Database::open_in_memory().unwrap();
        let u1 = user(&db, "u1", Role::Athlete);
        let u2 = user(&db, "u2", Role::Athlete);

        let pending = db.create_connection(u1.id, u2.id).unwrap();
        assert_eq!(pending.status, ConnectionStatus::Pending);

        let accepted = db
            .respond_to_connection(pending.id, u2.id, ConnectionAction::Accept, None)
            .unwrap();
        assert_eq!(accepted.status, ConnectionStatus::Accepted);
        assert_eq!(accepted.version, pending.version + 1);

        let from_u2 = db.list_connections(u2.id, None).unwrap();
        assert_eq!(from_u2.len(), 1);
        assert_ne!(from_u2[0].0.initiator_id, u2.id);
        assert_eq!(from_u2[0].1.id, u1.id);

        let from_u1 = db.list_connections(u1.id, Some(ConnectionStatus::Accepted)).unwrap();
        assert_eq!(from_u1[0].0.initiator_id, u1.id);
        assert_eq!(from_u1[0].1.id, u2.id);

        assert!(db.are_connected(u2.id, u1.id).unwrap());
        assert_eq!(db.connected_user_ids(u1.id).unwrap(), vec![u2.id]);
    }

    #[test]
    fn test_self_connection_is_invalid() {
        let db = Database::open_in_memory().unwrap();
        let u1 = user(&db, "u1", Role::Athlete);
        let err = db.create_connection(u1.id, u1.id).unwrap_err();
        assert!(matches!(rejection(&err), Rejection::Invalid(_)));
    }

    #[test]
    fn test_duplicate_request_in_either_direction_conflicts() {
        let db = Database::open_in_memory().unwrap();
        let u1 = user(&db, "u1", Role::Athlete);
        let u2 = user(&db, "u2", Role::Athlete);

        db.create_connection(u1.id, u2.id).unwrap();
        let err = db.create_connection(u2.id, u1.id).unwrap_err();
        assert!(matches!(rejection(&err), Rejection::Conflict(_)));
    }

    #[test]
    fn test_database_refuses_second_live_row_for_pair() {
        let db = Database::open_in_memory().unwrap();
        let u1 = user(&db, "u1", Role::Athlete);
        let u2 = user(&db, "u2", Role::Athlete);
        db.create_connection(u1.id, u2.id).unwrap();

        // Bypass the application pre-check and insert directly.
        let (low, high) = ordered_pair(u1.id, u2.id);
        let err = db
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO connections
                        (id, initiator_id, recipient_id, pair_low, pair_high, status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, 'ACCEPTED', ?6, ?6)",
                    rusqlite::params![
                        Uuid::new_v4().to_string(),
                        u2.id.to_string(),
                        u1.id.to_string(),
                        low.to_string(),
                        high.to_string(),
                        Utc::now()
                    ],
                )?;
                Ok(())
            })
            .unwrap_err();
        let sqlite = err.downcast_ref::<rusqlite::Error>().unwrap();
        assert!(is_unique_violation(sqlite));
    }

    #[test]
    fn test_rejected_pair_can_request_again() {
        let db = Database::open_in_memory().unwrap();
        let u1 = user(&db, "u1", Role::Athlete);
        let u2 = user(&db, "u2", Role::Athlete);

        let first = db.create_connection(u1.id, u2.id).unwrap();
        db.respond_to_connection(first.id, u2.id, ConnectionAction::Reject, None)
            .unwrap();

        let second = db.create_connection(u1.id, u2.id).unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(second.status, ConnectionStatus::Pending);
        assert!(db.get_connection(first.id).unwrap().is_none());
    }

    #[test]
    fn test_only_recipient_responds_and_only_once() {
        let db = Database::open_in_memory().unwrap();
        let u1 = user(&db, "u1", Role::Athlete);
        let u2 = user(&db, "u2", Role::Athlete);
        let c = db.create_connection(u1.id, u2.id).unwrap();

        let err = db
            .respond_to_connection(c.id, u1.id, ConnectionAction::Accept, None)
            .unwrap_err();
        assert!(matches!(rejection(&err), Rejection::Forbidden(_)));

        db.respond_to_connection(c.id, u2.id, ConnectionAction::Reject, None)
            .unwrap();
        let err = db
            .respond_to_connection(c.id, u2.id, ConnectionAction::Accept, None)
            .unwrap_err();
        assert!(matches!(rejection(&err), Rejection::Invalid(_)));
        assert_eq!(
            db.get_connection(c.id).unwrap().unwrap().status,
            ConnectionStatus::Rejected
        );
    }

    #[test]
    fn test_stale_version_conflicts() {
        let db = Database::open_in_memory().unwrap();
        let u1 = user(&db, "u1", Role::Athlete);
        let u2 = user(&db, "u2", Role::Athlete);
        let c = db.create_connection(u1.id, u2.id).unwrap();

        let err = db
            .respond_to_connection(c.id, u2.id, ConnectionAction::Accept, Some(c.version + 3))
            .unwrap_err();
        assert!(matches!(rejection(&err), Rejection::Conflict(_)));
        assert_eq!(
            db.get_connection(c.id).unwrap().unwrap().status,
            ConnectionStatus::Pending
        );
    }

    #[test]
    fn test_delete_requires_party() {
        let db = Database::open_in_memory().unwrap();
        let u1 = user(&db, "u1", Role::Athlete);
        let u2 = user(&db, "u2", Role::Athlete);
        let outsider = user(&db, "u3", Role::Athlete);
        let c = db.create_connection(u1.id, u2.id).unwrap();

        let err = db.delete_connection(c.id, outsider.id).unwrap_err();
        assert!(matches!(rejection(&err), Rejection::Forbidden(_)));

        db.delete_connection(c.id, u2.id).unwrap();
        let err = db.delete_connection(c.id, u2.id).unwrap_err();
        assert!(matches!(rejection(&err), Rejection::NotFound(_)));
    }

    #[test]
    fn test_request_to_unknown_user_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let u1 = user(&db, "u1", Role::Athlete);
        let err = db.create_connection(u1.id, Uuid::new_v4()).unwrap_err();
        assert!(matches!(rejection(&err), Rejection::NotFound("user")));
    }
}

mod activities;
mod chats;
mod connections;
mod proposals;
mod races;
mod users;
mod workouts;

pub use chats::ChatOverview;
pub use proposals::Resolution;
pub use users::ProfileChanges;

pub(crate) use activities::{delete_activity, insert_activity, query_activity, update_activity};
pub(crate) use connections::are_connected;
pub(crate) use users::query_user_by_id;
pub(crate) use workouts::{delete_workout, insert_workout, query_workout, update_workout};

use anyhow::Result;
use rusqlite::{Connection, Params};

use crate::models::FromRow;

/// First row of `sql` decoded as `T`, if any.
pub(crate) fn fetch_one<T, P>(conn: &Connection, sql: &str, params: P) -> Result<Option<T>>
where
    T: FromRow,
    P: Params,
{
    let mut stmt = conn.prepare(sql)?;
    let row = stmt.query_row(params, |row| T::from_row(row, 0)).optional()?;
    Ok(row)
}

pub(crate) fn fetch_all<T, P>(conn: &Connection, sql: &str, params: P) -> Result<Vec<T>>
where
    T: FromRow,
    P: Params,
{
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| T::from_row(row, 0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

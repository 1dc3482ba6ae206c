//! Row mapping between SQLite and the `stride-types` records.
//!
//! Ids are stored as TEXT UUIDs and enums by their `as_str()` spelling, so
//! every decode goes through the helpers below instead of `FromSql` impls.

use std::str::FromStr;

use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

use stride_types::models::{
    ActivityPayload, ActivityProposal, Chat, ChatMessage, Connection, Profile, RaceResult,
    ScheduledActivity, UnknownVariant, User, Workout, WorkoutPayload, WorkoutProposal,
};

/// A record that can be read from a contiguous run of columns starting at `at`.
pub trait FromRow: Sized {
    const COLUMNS: &'static [&'static str];

    fn from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Self>;
}

/// `a.id, a.title, ...` for a table aliased as `alias`.
pub fn select_list<T: FromRow>(alias: &str) -> String {
    T::COLUMNS
        .iter()
        .map(|c| format!("{alias}.{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// User plus the stored argon2 hash, only ever handed to the login path.
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub(crate) fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

pub(crate) fn opt_uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| raw.parse().map_err(|e| conversion_error(idx, e)))
        .transpose()
}

pub(crate) fn enum_at<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = UnknownVariant>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

pub(crate) fn opt_enum_at<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = UnknownVariant>,
{
    row.get::<_, Option<String>>(idx)?
        .map(|raw| raw.parse().map_err(|e| conversion_error(idx, e)))
        .transpose()
}

/// JSON array column; NULL reads as empty.
fn list_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e)),
        None => Ok(Vec::new()),
    }
}

impl FromRow for User {
    const COLUMNS: &'static [&'static str] = &["id", "username", "display_name", "role", "created_at"];

    fn from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
        Ok(User {
            id: uuid_at(row, at)?,
            username: row.get(at + 1)?,
            display_name: row.get(at + 2)?,
            role: enum_at(row, at + 3)?,
            created_at: row.get(at + 4)?,
        })
    }
}

impl FromRow for Profile {
    const COLUMNS: &'static [&'static str] = &[
        "bio",
        "location",
        "sports",
        "tags",
        "avatar_url",
        "cover_url",
        "updated_at",
    ];

    fn from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
        Ok(Profile {
            bio: row.get(at)?,
            location: row.get(at + 1)?,
            sports: list_at(row, at + 2)?,
            tags: list_at(row, at + 3)?,
            avatar_url: row.get(at + 4)?,
            cover_url: row.get(at + 5)?,
            updated_at: row.get(at + 6)?,
        })
    }
}

impl FromRow for Connection {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "initiator_id",
        "recipient_id",
        "status",
        "version",
        "created_at",
        "updated_at",
    ];

    fn from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
        Ok(Connection {
            id: uuid_at(row, at)?,
            initiator_id: uuid_at(row, at + 1)?,
            recipient_id: uuid_at(row, at + 2)?,
            status: enum_at(row, at + 3)?,
            version: row.get(at + 4)?,
            created_at: row.get(at + 5)?,
            updated_at: row.get(at + 6)?,
        })
    }
}

impl FromRow for ScheduledActivity {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "owner_id",
        "title",
        "description",
        "date",
        "time",
        "duration",
        "activity_type",
        "status",
        "location",
        "assigned_by",
        "created_at",
        "updated_at",
    ];

    fn from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
        Ok(ScheduledActivity {
            id: uuid_at(row, at)?,
            owner_id: uuid_at(row, at + 1)?,
            title: row.get(at + 2)?,
            description: row.get(at + 3)?,
            date: row.get(at + 4)?,
            time: row.get(at + 5)?,
            duration: row.get(at + 6)?,
            activity_type: enum_at(row, at + 7)?,
            status: enum_at(row, at + 8)?,
            location: row.get(at + 9)?,
            assigned_by: opt_uuid_at(row, at + 10)?,
            created_at: row.get(at + 11)?,
            updated_at: row.get(at + 12)?,
        })
    }
}

impl FromRow for Workout {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "owner_id",
        "title",
        "description",
        "date",
        "duration",
        "distance",
        "calories",
        "rpe",
        "workout_type",
        "status",
        "created_at",
        "updated_at",
    ];

    fn from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
        Ok(Workout {
            id: uuid_at(row, at)?,
            owner_id: uuid_at(row, at + 1)?,
            title: row.get(at + 2)?,
            description: row.get(at + 3)?,
            date: row.get(at + 4)?,
            duration: row.get(at + 5)?,
            distance: row.get(at + 6)?,
            calories: row.get(at + 7)?,
            rpe: row.get(at + 8)?,
            workout_type: enum_at(row, at + 9)?,
            status: enum_at(row, at + 10)?,
            created_at: row.get(at + 11)?,
            updated_at: row.get(at + 12)?,
        })
    }
}

impl FromRow for RaceResult {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "owner_id",
        "event_name",
        "event_type",
        "date",
        "finish_time",
        "distance",
        "position",
        "total_participants",
        "status",
        "created_at",
        "updated_at",
    ];

    fn from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
        Ok(RaceResult {
            id: uuid_at(row, at)?,
            owner_id: uuid_at(row, at + 1)?,
            event_name: row.get(at + 2)?,
            event_type: row.get(at + 3)?,
            date: row.get(at + 4)?,
            finish_time: row.get(at + 5)?,
            distance: row.get(at + 6)?,
            position: row.get(at + 7)?,
            total_participants: row.get(at + 8)?,
            status: enum_at(row, at + 9)?,
            created_at: row.get(at + 10)?,
            updated_at: row.get(at + 11)?,
        })
    }
}

impl FromRow for ActivityProposal {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "action",
        "status",
        "proposed_by_id",
        "proposed_for_id",
        "original_activity_id",
        "title",
        "description",
        "activity_type",
        "start_time",
        "end_time",
        "location",
        "notes",
        "response_notes",
        "responded_at",
        "version",
        "created_at",
    ];

    fn from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
        Ok(ActivityProposal {
            id: uuid_at(row, at)?,
            action: enum_at(row, at + 1)?,
            status: enum_at(row, at + 2)?,
            proposed_by_id: uuid_at(row, at + 3)?,
            proposed_for_id: uuid_at(row, at + 4)?,
            original_activity_id: opt_uuid_at(row, at + 5)?,
            payload: ActivityPayload {
                title: row.get(at + 6)?,
                description: row.get(at + 7)?,
                activity_type: opt_enum_at(row, at + 8)?,
                start_time: row.get(at + 9)?,
                end_time: row.get(at + 10)?,
                location: row.get(at + 11)?,
            },
            notes: row.get(at + 12)?,
            response_notes: row.get(at + 13)?,
            responded_at: row.get(at + 14)?,
            version: row.get(at + 15)?,
            created_at: row.get(at + 16)?,
        })
    }
}

impl FromRow for WorkoutProposal {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "action",
        "status",
        "proposed_by_id",
        "proposed_for_id",
        "original_workout_id",
        "title",
        "description",
        "workout_type",
        "date",
        "duration",
        "distance",
        "calories",
        "notes",
        "response_notes",
        "responded_at",
        "version",
        "created_at",
    ];

    fn from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
        Ok(WorkoutProposal {
            id: uuid_at(row, at)?,
            action: enum_at(row, at + 1)?,
            status: enum_at(row, at + 2)?,
            proposed_by_id: uuid_at(row, at + 3)?,
            proposed_for_id: uuid_at(row, at + 4)?,
            original_workout_id: opt_uuid_at(row, at + 5)?,
            payload: WorkoutPayload {
                title: row.get(at + 6)?,
                description: row.get(at + 7)?,
                workout_type: opt_enum_at(row, at + 8)?,
                date: row.get(at + 9)?,
                duration: row.get(at + 10)?,
                distance: row.get(at + 11)?,
                calories: row.get(at + 12)?,
            },
            notes: row.get(at + 13)?,
            response_notes: row.get(at + 14)?,
            responded_at: row.get(at + 15)?,
            version: row.get(at + 16)?,
            created_at: row.get(at + 17)?,
        })
    }
}

impl FromRow for Chat {
    const COLUMNS: &'static [&'static str] = &["id", "chat_type", "name", "created_by", "created_at"];

    fn from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
        Ok(Chat {
            id: uuid_at(row, at)?,
            chat_type: enum_at(row, at + 1)?,
            name: row.get(at + 2)?,
            created_by: uuid_at(row, at + 3)?,
            created_at: row.get(at + 4)?,
        })
    }
}

impl FromRow for ChatMessage {
    const COLUMNS: &'static [&'static str] =
        &["id", "chat_id", "sender_id", "content", "status", "created_at"];

    fn from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
        Ok(ChatMessage {
            id: uuid_at(row, at)?,
            chat_id: uuid_at(row, at + 1)?,
            sender_id: uuid_at(row, at + 2)?,
            content: row.get(at + 3)?,
            status: enum_at(row, at + 4)?,
            created_at: row.get(at + 5)?,
        })
    }
}

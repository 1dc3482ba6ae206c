use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use stride_types::api::ImageKind;
use stride_types::models::{Profile, Role, User};

use super::{OptionalExt, fetch_all, fetch_one};
use crate::error::{Rejection, is_unique_violation};
use crate::models::{FromRow, UserCredentials, select_list};
use crate::Database;

/// Partial profile update; `None` keeps the stored value.
#[derive(Debug, Default)]
pub struct ProfileChanges {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub sports: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: Uuid,
        username: &str,
        display_name: &str,
        role: Role,
        password_hash: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, username, display_name, role, password, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id.to_string(),
                    username,
                    display_name,
                    role.as_str(),
                    password_hash,
                    Utc::now()
                ],
            );

            match inserted {
                Ok(_) => Ok(()),
                Err(e) if is_unique_violation(&e) => {
                    Err(Rejection::conflict("username already taken").into())
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserCredentials>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {}, u.password FROM users u WHERE u.username = ?1",
                select_list::<User>("u")
            );
            let row = conn
                .query_row(&sql, [username], |row| {
                    Ok(UserCredentials {
                        user: User::from_row(row, 0)?,
                        password_hash: row.get(User::COLUMNS.len())?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// Case-insensitive substring match on username or display name.
    pub fn search_users(&self, query: &str, exclude: Uuid, limit: u32) -> Result<Vec<User>> {
        let pattern = format!("%{}%", escape_like(query));
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM users u
                 WHERE (u.username LIKE ?1 ESCAPE '\\' OR u.display_name LIKE ?1 ESCAPE '\\')
                   AND u.id != ?2
                 ORDER BY u.username
                 LIMIT ?3",
                select_list::<User>("u")
            );
            fetch_all(conn, &sql, rusqlite::params![pattern, exclude.to_string(), limit])
        })
    }

    // -- Profiles --

    /// Profiles are created lazily; a user without a row gets the empty profile.
    pub fn get_profile(&self, user_id: Uuid) -> Result<Profile> {
        self.with_conn(|conn| query_profile(conn, user_id))
    }

    pub fn update_profile(&self, user_id: Uuid, changes: ProfileChanges) -> Result<Profile> {
        let sports = changes.sports.map(|s| serde_json::to_string(&s)).transpose()?;
        let tags = changes.tags.map(|t| serde_json::to_string(&t)).transpose()?;

        self.with_tx(|tx| {
            if let Some(display_name) = &changes.display_name {
                tx.execute(
                    "UPDATE users SET display_name = ?1 WHERE id = ?2",
                    (display_name, user_id.to_string()),
                )?;
            }

            tx.execute(
                "INSERT INTO profiles (user_id, bio, location, sports, tags, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(user_id) DO UPDATE SET
                    bio = COALESCE(excluded.bio, profiles.bio),
                    location = COALESCE(excluded.location, profiles.location),
                    sports = COALESCE(excluded.sports, profiles.sports),
                    tags = COALESCE(excluded.tags, profiles.tags),
                    updated_at = excluded.updated_at",
                rusqlite::params![
                    user_id.to_string(),
                    changes.bio,
                    changes.location,
                    sports,
                    tags,
                    Utc::now()
                ],
            )?;

            query_profile(tx, user_id)
        })
    }

    pub fn set_profile_image(&self, user_id: Uuid, kind: ImageKind, url: &str) -> Result<()> {
        let column = match kind {
            ImageKind::Avatar => "avatar_url",
            ImageKind::Cover => "cover_url",
        };
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO profiles (user_id, {column}, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(user_id) DO UPDATE SET {column} = excluded.{column},
                        updated_at = excluded.updated_at"
                ),
                rusqlite::params![user_id.to_string(), url, Utc::now()],
            )?;
            Ok(())
        })
    }
}

pub(crate) fn query_user_by_id(conn: &Connection, id: Uuid) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users u WHERE u.id = ?1", select_list::<User>("u"));
    fetch_one(conn, &sql, [id.to_string()])
}

fn query_profile(conn: &Connection, user_id: Uuid) -> Result<Profile> {
    let sql = format!(
        "SELECT {} FROM profiles p WHERE p.user_id = ?1",
        select_list::<Profile>("p")
    );
    Ok(fetch_one(conn, &sql, [user_id.to_string()])?.unwrap_or_default())
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

use std::collections::BTreeSet;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use stride_types::models::{
    Chat, ChatMessage, ChatType, MessageStatus, User, ordered_pair,
};

use super::{OptionalExt, are_connected, fetch_all, fetch_one, query_user_by_id};
use crate::Database;
use crate::error::Rejection;
use crate::models::select_list;

/// A chat as shown in a user's chat list.
#[derive(Debug, Clone)]
pub struct ChatOverview {
    pub chat: Chat,
    pub participants: Vec<User>,
    pub last_message: Option<ChatMessage>,
    /// Messages from other participants the viewer has not read yet.
    pub unread_count: i64,
}

impl Database {
    /// Creates a chat between `initiator` and `participant_ids`.
    ///
    /// Returns the chat plus `true` when it was newly created. A DIRECT chat
    /// between two users who already have one returns the existing chat.
    pub fn create_chat(
        &self,
        initiator: Uuid,
        participant_ids: &[Uuid],
        chat_type: ChatType,
        name: Option<&str>,
    ) -> Result<(ChatOverview, bool)> {
        let mut members: BTreeSet<Uuid> = participant_ids.iter().copied().collect();
        members.insert(initiator);

        if members.len() < 2 {
            return Err(Rejection::invalid("a chat needs at least one other participant").into());
        }
        if chat_type == ChatType::Direct && members.len() != 2 {
            return Err(Rejection::invalid("a direct chat has exactly two participants").into());
        }

        self.with_tx(|tx| {
            for &member in &members {
                if query_user_by_id(tx, member)?.is_none() {
                    return Err(Rejection::invalid(format!("participant {member} does not exist")).into());
                }
            }
            for &member in members.iter().filter(|&&m| m != initiator) {
                if !are_connected(tx, initiator, member)? {
                    return Err(Rejection::forbidden(format!(
                        "an accepted connection with {member} is required"
                    ))
                    .into());
                }
            }

            let direct_key = match chat_type {
                ChatType::Direct => {
                    let other = members.iter().copied().find(|&m| m != initiator).unwrap_or(initiator);
                    let (low, high) = ordered_pair(initiator, other);
                    Some(format!("{low}:{high}"))
                }
                ChatType::Group => None,
            };

            if let Some(key) = &direct_key {
                let existing: Option<String> = tx
                    .query_row("SELECT id FROM chats WHERE direct_key = ?1", [key], |row| row.get(0))
                    .optional()?;
                if let Some(existing) = existing {
                    let chat_id: Uuid = existing.parse()?;
                    return Ok((overview(tx, chat_id, initiator)?, false));
                }
            }

            let chat_id = Uuid::new_v4();
            let now = Utc::now();
            tx.execute(
                "INSERT INTO chats (id, chat_type, name, direct_key, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    chat_id.to_string(),
                    chat_type.as_str(),
                    name,
                    direct_key,
                    initiator.to_string(),
                    now
                ],
            )?;
            for member in &members {
                tx.execute(
                    "INSERT INTO chat_participants (chat_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
                    rusqlite::params![chat_id.to_string(), member.to_string(), now],
                )?;
            }

            info!("{} chat {} created by {} ({} members)", chat_type, chat_id, initiator, members.len());
            Ok((overview(tx, chat_id, initiator)?, true))
        })
    }

    /// Chats `user` belongs to, most recently active first.
    ///
    /// Listing counts as delivery: SENT messages from others become DELIVERED.
    pub fn list_chats(&self, user: Uuid) -> Result<Vec<ChatOverview>> {
        self.with_tx(|tx| {
            tx.execute(
                "UPDATE messages SET status = ?1
                 WHERE status = ?2 AND sender_id != ?3
                   AND chat_id IN (SELECT chat_id FROM chat_participants WHERE user_id = ?3)",
                rusqlite::params![
                    MessageStatus::Delivered.as_str(),
                    MessageStatus::Sent.as_str(),
                    user.to_string()
                ],
            )?;

            let mut stmt = tx.prepare(
                "SELECT c.id FROM chats c
                 JOIN chat_participants p ON p.chat_id = c.id AND p.user_id = ?1
                 ORDER BY COALESCE((SELECT MAX(m.created_at) FROM messages m WHERE m.chat_id = c.id), c.created_at) DESC",
            )?;
            let ids = stmt
                .query_map([user.to_string()], |row| crate::models::uuid_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            ids.into_iter().map(|id| overview(tx, id, user)).collect()
        })
    }

    /// A single chat, visible to its participants only.
    pub fn get_chat(&self, chat_id: Uuid, viewer: Uuid) -> Result<ChatOverview> {
        self.with_conn(|conn| {
            ensure_participant(conn, chat_id, viewer)?;
            overview(conn, chat_id, viewer)
        })
    }

    pub fn send_message(&self, chat_id: Uuid, sender: Uuid, content: &str) -> Result<ChatMessage> {
        self.with_conn(|conn| {
            ensure_participant(conn, chat_id, sender)?;

            let id = Uuid::new_v4();
            conn.execute(
                "INSERT INTO messages (id, chat_id, sender_id, content, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id.to_string(),
                    chat_id.to_string(),
                    sender.to_string(),
                    content,
                    MessageStatus::Sent.as_str(),
                    Utc::now()
                ],
            )?;

            let sql = format!(
                "SELECT {} FROM messages m WHERE m.id = ?1",
                select_list::<ChatMessage>("m")
            );
            fetch_one(conn, &sql, [id.to_string()])?
                .ok_or_else(|| anyhow::anyhow!("message {} vanished after insert", id))
        })
    }

    /// Newest-first page of messages; messages from others on the returned page become READ.
    pub fn get_messages(
        &self,
        chat_id: Uuid,
        reader: Uuid,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<ChatMessage>> {
        self.with_tx(|tx| {
            ensure_participant(tx, chat_id, reader)?;

            tx.execute(
                &format!(
                    "UPDATE messages SET status = ?4
                     WHERE sender_id != ?5 AND status != ?4
                       AND id IN (SELECT m.id FROM messages m WHERE {PAGE})"
                ),
                rusqlite::params![
                    chat_id.to_string(),
                    before,
                    limit,
                    MessageStatus::Read.as_str(),
                    reader.to_string()
                ],
            )?;

            let sql = format!(
                "SELECT {} FROM messages m WHERE {PAGE}",
                select_list::<ChatMessage>("m")
            );
            fetch_all(tx, &sql, rusqlite::params![chat_id.to_string(), before, limit])
        })
    }
}

/// One page of a chat's messages: ?1 chat id, ?2 cursor, ?3 limit.
const PAGE: &str = "m.chat_id = ?1 AND (?2 IS NULL OR m.created_at < ?2)
     ORDER BY m.created_at DESC, m.id DESC
     LIMIT ?3";

fn ensure_participant(conn: &Connection, chat_id: Uuid, user: Uuid) -> Result<()> {
    let exists = conn
        .query_row("SELECT 1 FROM chats WHERE id = ?1", [chat_id.to_string()], |_| Ok(()))
        .optional()?;
    if exists.is_none() {
        return Err(Rejection::NotFound("chat").into());
    }

    let member = conn
        .query_row(
            "SELECT 1 FROM chat_participants WHERE chat_id = ?1 AND user_id = ?2",
            [chat_id.to_string(), user.to_string()],
            |_| Ok(()),
        )
        .optional()?;
    if member.is_none() {
        return Err(Rejection::forbidden("not a participant in this chat").into());
    }
    Ok(())
}

fn overview(conn: &Connection, chat_id: Uuid, viewer: Uuid) -> Result<ChatOverview> {
    let chat_sql = format!("SELECT {} FROM chats c WHERE c.id = ?1", select_list::<Chat>("c"));
    let chat: Chat = fetch_one(conn, &chat_sql, [chat_id.to_string()])?
        .ok_or(Rejection::NotFound("chat"))?;

    let participants_sql = format!(
        "SELECT {} FROM users u
         JOIN chat_participants p ON p.user_id = u.id
         WHERE p.chat_id = ?1
         ORDER BY p.joined_at, u.username",
        select_list::<User>("u")
    );
    let participants = fetch_all(conn, &participants_sql, [chat_id.to_string()])?;

    let last_sql = format!(
        "SELECT {} FROM messages m WHERE m.chat_id = ?1 ORDER BY m.created_at DESC LIMIT 1",
        select_list::<ChatMessage>("m")
    );
    let last_message = fetch_one(conn, &last_sql, [chat_id.to_string()])?;

    let unread_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE chat_id = ?1 AND sender_id != ?2 AND status != ?3",
        rusqlite::params![chat_id.to_string(), viewer.to_string(), MessageStatus::Read.as_str()],
        |row| row.get(0),
    )?;

    Ok(ChatOverview {
        chat,
        participants,
        last_message,
        unread_count,
    })
}

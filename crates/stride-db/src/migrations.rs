use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub const CURRENT_VERSION: i64 = 2;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                username        TEXT NOT NULL UNIQUE COLLATE NOCASE,
                display_name    TEXT NOT NULL,
                role            TEXT NOT NULL,
                password        TEXT NOT NULL,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE profiles (
                user_id         TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                bio             TEXT,
                location        TEXT,
                sports          TEXT,
                tags            TEXT,
                avatar_url      TEXT,
                cover_url       TEXT,
                updated_at      TEXT
            );

            CREATE TABLE connections (
                id              TEXT PRIMARY KEY,
                initiator_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                recipient_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                pair_low        TEXT NOT NULL,
                pair_high       TEXT NOT NULL,
                status          TEXT NOT NULL DEFAULT 'PENDING',
                version         INTEGER NOT NULL DEFAULT 1,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            -- At most one PENDING/ACCEPTED row per unordered pair
            CREATE UNIQUE INDEX idx_connections_live_pair
                ON connections(pair_low, pair_high)
                WHERE status IN ('PENDING', 'ACCEPTED');

            CREATE INDEX idx_connections_initiator ON connections(initiator_id);
            CREATE INDEX idx_connections_recipient ON connections(recipient_id);

            CREATE TABLE activities (
                id              TEXT PRIMARY KEY,
                owner_id        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title           TEXT NOT NULL,
                description     TEXT,
                date            TEXT NOT NULL,
                time            TEXT NOT NULL,
                duration        INTEGER NOT NULL,
                activity_type   TEXT NOT NULL,
                status          TEXT NOT NULL,
                location        TEXT,
                assigned_by     TEXT REFERENCES users(id) ON DELETE SET NULL,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_activities_owner_date ON activities(owner_id, date);

            CREATE TABLE workouts (
                id              TEXT PRIMARY KEY,
                owner_id        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title           TEXT NOT NULL,
                description     TEXT,
                date            TEXT NOT NULL,
                duration        INTEGER NOT NULL,
                distance        REAL,
                calories        INTEGER,
                rpe             INTEGER,
                workout_type    TEXT NOT NULL,
                status          TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_workouts_owner_date ON workouts(owner_id, date);

            CREATE TABLE races (
                id                  TEXT PRIMARY KEY,
                owner_id            TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                event_name          TEXT NOT NULL,
                event_type          TEXT NOT NULL,
                date                TEXT NOT NULL,
                finish_time         TEXT,
                distance            REAL,
                position            INTEGER,
                total_participants  INTEGER,
                status              TEXT NOT NULL,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE INDEX idx_races_owner_date ON races(owner_id, date);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (proposals and chat)");
        conn.execute_batch(
            "
            -- original_*_id carries no FK: the target may be deleted while the proposal is open
            CREATE TABLE activity_proposals (
                id                      TEXT PRIMARY KEY,
                action                  TEXT NOT NULL,
                status                  TEXT NOT NULL DEFAULT 'PENDING_APPROVAL',
                proposed_by_id          TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                proposed_for_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                original_activity_id    TEXT,
                title                   TEXT,
                description             TEXT,
                activity_type           TEXT,
                start_time              TEXT,
                end_time                TEXT,
                location                TEXT,
                notes                   TEXT,
                response_notes          TEXT,
                responded_at            TEXT,
                version                 INTEGER NOT NULL DEFAULT 1,
                created_at              TEXT NOT NULL
            );

            CREATE INDEX idx_activity_proposals_for ON activity_proposals(proposed_for_id, created_at);
            CREATE INDEX idx_activity_proposals_by ON activity_proposals(proposed_by_id, created_at);

            CREATE TABLE workout_proposals (
                id                      TEXT PRIMARY KEY,
                action                  TEXT NOT NULL,
                status                  TEXT NOT NULL DEFAULT 'PENDING_APPROVAL',
                proposed_by_id          TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                proposed_for_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                original_workout_id     TEXT,
                title                   TEXT,
                description             TEXT,
                workout_type            TEXT,
                date                    TEXT,
                duration                INTEGER,
                distance                REAL,
                calories                INTEGER,
                notes                   TEXT,
                response_notes          TEXT,
                responded_at            TEXT,
                version                 INTEGER NOT NULL DEFAULT 1,
                created_at              TEXT NOT NULL
            );

            CREATE INDEX idx_workout_proposals_for ON workout_proposals(proposed_for_id, created_at);
            CREATE INDEX idx_workout_proposals_by ON workout_proposals(proposed_by_id, created_at);

            CREATE TABLE chats (
                id              TEXT PRIMARY KEY,
                chat_type       TEXT NOT NULL,
                name            TEXT,
                -- ordered participant pair for DIRECT chats, NULL for groups
                direct_key      TEXT UNIQUE,
                created_by      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE chat_participants (
                chat_id         TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                joined_at       TEXT NOT NULL,
                PRIMARY KEY (chat_id, user_id)
            );

            CREATE INDEX idx_chat_participants_user ON chat_participants(user_id);

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                chat_id         TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                sender_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content         TEXT NOT NULL,
                status          TEXT NOT NULL DEFAULT 'SENT',
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_messages_chat ON messages(chat_id, created_at);

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete (schema v{})", CURRENT_VERSION);
    Ok(())
}

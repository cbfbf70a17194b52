// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite handle: one connection on a dedicated thread, async callers.

use tokio_rusqlite::Connection;

/// System room ids seeded by the schema. User-created rooms start above
/// [`MIN_USER_ROOM_ID`].
pub mod system_rooms {
    pub const LOBBY: i64 = 1;
    pub const MAIL: i64 = 2;
    pub const AIDES: i64 = 3;
    pub const SYSOP: i64 = 4;
    pub const TWIT: i64 = 5;
    pub const MIN_USER_ROOM_ID: i64 = 6;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT UNIQUE NOT NULL COLLATE NOCASE,
    password_hash TEXT NOT NULL,
    salt BLOB NOT NULL,
    display_name TEXT,
    last_login INTEGER,
    permission TEXT NOT NULL CHECK(permission IN (
        'unverified', 'twit', 'user', 'aide', 'sysop'
    )),
    status TEXT NOT NULL DEFAULT 'active' CHECK(status IN (
        'provisional', 'active'
    ))
);

CREATE TABLE IF NOT EXISTS user_blocks (
    blocker TEXT NOT NULL,
    blocked TEXT NOT NULL,
    PRIMARY KEY (blocker, blocked)
);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sender TEXT NOT NULL,
    recipient TEXT,
    content TEXT NOT NULL,
    timestamp TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS rooms (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT UNIQUE NOT NULL COLLATE NOCASE,
    description TEXT NOT NULL DEFAULT '',
    read_only INTEGER NOT NULL DEFAULT 0,
    permission_level TEXT NOT NULL DEFAULT 'user',
    next_neighbor INTEGER,
    prev_neighbor INTEGER
);

CREATE TABLE IF NOT EXISTS room_messages (
    room_id INTEGER NOT NULL,
    message_id INTEGER NOT NULL,
    timestamp TEXT NOT NULL,
    PRIMARY KEY (room_id, message_id)
);

CREATE TABLE IF NOT EXISTS user_room_state (
    username TEXT NOT NULL,
    room_id INTEGER NOT NULL,
    last_seen_message_id INTEGER,
    PRIMARY KEY (username, room_id)
);

CREATE TABLE IF NOT EXISTS room_ignores (
    username TEXT NOT NULL,
    room_id INTEGER NOT NULL,
    PRIMARY KEY (username, room_id)
);

CREATE TABLE IF NOT EXISTS pending_validations (
    username TEXT PRIMARY KEY,
    submitted_at TEXT NOT NULL,
    intro_text TEXT,
    transport_engine TEXT,
    transport_metadata TEXT
);

CREATE TABLE IF NOT EXISTS mc_chat_contacts (
    node_id TEXT PRIMARY KEY,
    public_key TEXT NOT NULL,
    name TEXT,
    node_type INTEGER NOT NULL DEFAULT 1,
    latitude REAL,
    longitude REAL,
    first_seen INTEGER NOT NULL,
    last_seen INTEGER NOT NULL,
    raw_advert_data TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS mc_passwd_cache (
    node_id TEXT PRIMARY KEY,
    username TEXT,
    last_pw_use INTEGER NOT NULL
);
";

/// Cheap-to-clone async handle over the SQLite connection.
#[derive(Clone)]
pub struct Db {
    conn: Connection,
}

impl Db {
    pub async fn open(path: &str) -> anyhow::Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory().await?
        } else {
            Connection::open(path.to_owned()).await?
        };
        Ok(Self { conn })
    }

    pub async fn open_in_memory() -> anyhow::Result<Self> {
        Ok(Self { conn: Connection::open_in_memory().await? })
    }

    /// Run a closure against the underlying connection on its thread.
    pub async fn call<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&mut tokio_rusqlite::rusqlite::Connection) -> Result<T, tokio_rusqlite::Error>
            + Send
            + 'static,
        T: Send + 'static,
    {
        Ok(self.conn.call(f).await?)
    }

    /// Create all tables and seed the system rooms. Idempotent.
    pub async fn init_schema(&self) -> anyhow::Result<()> {
        self.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            seed_system_rooms(conn)?;
            Ok(())
        })
        .await?;
        tracing::info!("database schema initialized");
        Ok(())
    }
}

fn seed_system_rooms(
    conn: &mut tokio_rusqlite::rusqlite::Connection,
) -> Result<(), tokio_rusqlite::Error> {
    use tokio_rusqlite::rusqlite::params;

    let count: i64 = conn.query_row("SELECT COUNT(*) FROM rooms", [], |row| row.get(0))?;
    if count > 0 {
        return Ok(());
    }

    // (id, name, permission_level) chained in id order.
    let rooms: &[(i64, &str, &str)] = &[
        (system_rooms::LOBBY, "Lobby", "user"),
        (system_rooms::MAIL, "Mail", "user"),
        (system_rooms::AIDES, "Aides", "aide"),
        (system_rooms::SYSOP, "Sysop", "sysop"),
        (system_rooms::TWIT, "Twit", "twit"),
    ];
    for (i, (id, name, level)) in rooms.iter().enumerate() {
        let prev = if i == 0 { None } else { Some(rooms[i - 1].0) };
        let next = rooms.get(i + 1).map(|r| r.0);
        conn.execute(
            "INSERT INTO rooms (id, name, description, read_only, permission_level,
                 next_neighbor, prev_neighbor)
             VALUES (?1, ?2, '', 0, ?3, ?4, ?5)",
            params![id, name, level, next, prev],
        )?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "db_tests.rs"]
mod tests;

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use rusqlite::types::Value;
use rusqlite::{params, Connection};

use crate::storage::{StoreError, UserStore};
use crate::users::{Bot, Role, User, UserUpdate};

const USER_COLUMNS: &str = "bot, createdAt, firstMessageTime, firstSeenTime, id, isBanned, isWhitelisted, \
     lastMessageTime, login, name, note, numMessages, role, timeout, totalViewTime, watching";

/// User store backed by a SQLite database with one row per user and a
/// separate table of retained chat lines.
pub struct SqliteUserStore {
    path: PathBuf,
    conn: Option<Connection>,
}

impl SqliteUserStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            conn: None,
        }
    }

    fn conn(&self) -> Result<&Connection, StoreError> {
        self.conn.as_ref().ok_or(StoreError::NotOpen)
    }

    fn insert_chat(conn: &Connection, id: i64, line: &str, max_lines: usize) -> Result<(), StoreError> {
        conn.prepare_cached("INSERT INTO chat (userid, message) VALUES (?1, ?2)")?
            .execute(params![id, line])?;
        conn.prepare_cached(
            "DELETE FROM chat WHERE userid = ?1 AND seq NOT IN \
             (SELECT seq FROM chat WHERE userid = ?1 ORDER BY seq DESC LIMIT ?2)",
        )?
        .execute(params![id, max_lines as i64])?;
        Ok(())
    }
}

fn update_value(update: &UserUpdate) -> Value {
    match update {
        UserUpdate::Bot(bot) => Value::Integer(bot.code()),
        UserUpdate::Role(role) => Value::Integer(role.code()),
        UserUpdate::CreatedAt(time)
        | UserUpdate::FirstMessageTime(time)
        | UserUpdate::FirstSeenTime(time)
        | UserUpdate::LastMessageTime(time)
        | UserUpdate::Timeout(time)
        | UserUpdate::TotalViewTime(time) => Value::Real(*time),
        UserUpdate::IsBanned(flag) | UserUpdate::IsWhitelisted(flag) | UserUpdate::Watching(flag) => {
            Value::Integer(i64::from(*flag))
        }
        UserUpdate::Login(text) | UserUpdate::Name(text) | UserUpdate::Note(text) => Value::Text(text.clone()),
        UserUpdate::NumMessages(count) => Value::Integer(*count as i64),
    }
}

/// Opens the database at `path` and makes sure both tables exist.
fn open_database(path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            bot INTEGER NOT NULL DEFAULT 0,
            createdAt REAL NOT NULL DEFAULT 0,
            firstMessageTime REAL NOT NULL DEFAULT 0,
            firstSeenTime REAL NOT NULL DEFAULT 0,
            id INTEGER PRIMARY KEY,
            isBanned INTEGER NOT NULL DEFAULT 0,
            isWhitelisted INTEGER NOT NULL DEFAULT 0,
            lastMessageTime REAL NOT NULL DEFAULT 0,
            login TEXT NOT NULL DEFAULT '',
            name TEXT NOT NULL DEFAULT '',
            note TEXT NOT NULL DEFAULT '',
            numMessages INTEGER NOT NULL DEFAULT 0,
            role INTEGER NOT NULL DEFAULT 0,
            timeout REAL NOT NULL DEFAULT 0,
            totalViewTime REAL NOT NULL DEFAULT 0,
            watching INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS chat (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            userid INTEGER NOT NULL,
            message TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

impl UserStore for SqliteUserStore {
    fn open(&mut self) -> Result<(), StoreError> {
        let conn = match open_database(&self.path) {
            Ok(conn) => conn,
            Err(e) if self.path.exists() => {
                // Keep the unreadable file around and start over with an empty database.
                let mut backup = self.path.clone().into_os_string();
                backup.push(".corrupt");
                let backup = PathBuf::from(backup);
                warn!(
                    "Unable to open user database {}: {}; moving it to {}",
                    self.path.display(),
                    e,
                    backup.display()
                );
                fs::rename(&self.path, &backup)?;
                open_database(&self.path)?
            }
            Err(e) => return Err(e.into()),
        };
        info!("Opened user database {}", self.path.display());
        self.conn = Some(conn);
        Ok(())
    }

    fn load_all(&mut self) -> Result<Vec<User>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))?;
        let rows = stmt.query_map([], |row| {
            Ok(User {
                bot: Bot::from_code(row.get(0)?),
                created_at: row.get(1)?,
                first_message_time: row.get(2)?,
                first_seen_time: row.get(3)?,
                id: row.get(4)?,
                is_banned: row.get(5)?,
                is_whitelisted: row.get(6)?,
                last_message_time: row.get(7)?,
                login: row.get(8)?,
                name: row.get(9)?,
                note: row.get(10)?,
                num_messages: row.get::<_, i64>(11)?.max(0) as u64,
                role: Role::from_code(row.get(12)?),
                timeout: row.get(13)?,
                total_view_time: row.get(14)?,
                watching: row.get(15)?,
                ..User::default()
            })
        })?;
        let mut users = rows.collect::<Result<Vec<User>, _>>()?;

        let mut chat = conn.prepare_cached("SELECT userid, message FROM chat ORDER BY seq")?;
        let lines = chat.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
        for line in lines {
            let (id, message) = line?;
            if let Ok(index) = users.binary_search_by_key(&id, |user| user.id) {
                users[index].last_chat.push_back(message);
            }
        }
        Ok(users)
    }

    fn create_user(&mut self, user: &User) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.prepare_cached(&format!(
            "INSERT OR REPLACE INTO users ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            USER_COLUMNS
        ))?
        .execute(params![
            user.bot.code(),
            user.created_at,
            user.first_message_time,
            user.first_seen_time,
            user.id,
            user.is_banned,
            user.is_whitelisted,
            user.last_message_time,
            user.login,
            user.name,
            user.note,
            user.num_messages as i64,
            user.role.code(),
            user.timeout,
            user.total_view_time,
            user.watching,
        ])?;
        conn.prepare_cached("DELETE FROM chat WHERE userid = ?1")?
            .execute(params![user.id])?;
        let retained = user.last_chat.len();
        for line in &user.last_chat {
            Self::insert_chat(conn, user.id, line, retained)?;
        }
        Ok(())
    }

    fn update_user(&mut self, id: i64, update: &UserUpdate) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let query = format!("UPDATE users SET {} = ?1 WHERE id = ?2", update.column());
        let changed = conn.prepare_cached(&query)?.execute(params![update_value(update), id])?;
        if changed == 0 {
            return Err(StoreError::UnknownUser(id));
        }
        Ok(())
    }

    fn add_chat(&mut self, id: i64, line: &str, max_lines: usize) -> Result<(), StoreError> {
        let conn = self.conn()?;
        Self::insert_chat(conn, id, line, max_lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store(dir: &tempfile::TempDir) -> SqliteUserStore {
        let mut store = SqliteUserStore::new(dir.path().join("users.db"));
        store.open().unwrap();
        store
    }

    #[test]
    fn operations_fail_before_open() {
        let mut store = SqliteUserStore::new("unused.db");
        assert!(matches!(store.load_all(), Err(StoreError::NotOpen)));
    }

    #[test]
    fn users_survive_reopen_with_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let mut user = User::new(42, "alice");
        user.name = "Alice".into();
        user.created_at = 1_500_000_000.5;
        user.role = Role::Moderator;
        user.bot = Bot::No;
        user.is_whitelisted = true;
        user.num_messages = 3;
        {
            let mut store = open_store(&dir);
            store.create_user(&user).unwrap();
            store.update_user(42, &UserUpdate::Note("regular".into())).unwrap();
            store.update_user(42, &UserUpdate::TotalViewTime(99.0)).unwrap();
        }
        let mut store = open_store(&dir);
        let users = store.load_all().unwrap();
        user.note = "regular".into();
        user.total_view_time = 99.0;
        assert_eq!(users, vec![user]);
    }

    #[test]
    fn chat_lines_keep_only_the_newest() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir);
        store.create_user(&User::new(7, "bob")).unwrap();
        for i in 0..5 {
            store.add_chat(7, &format!("line {}", i), 3).unwrap();
        }
        let users = store.load_all().unwrap();
        let lines: Vec<&str> = users[0].last_chat.iter().map(String::as_str).collect();
        assert_eq!(lines, vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn recreating_a_user_replaces_their_chat() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir);
        let mut user = User::new(7, "bob");
        user.last_chat = vec!["old 1".to_string(), "old 2".to_string()].into();
        store.create_user(&user).unwrap();

        user.last_chat.clear();
        store.create_user(&user).unwrap();
        assert!(store.load_all().unwrap()[0].last_chat.is_empty());

        user.last_chat.push_back("new".into());
        store.create_user(&user).unwrap();
        let users = store.load_all().unwrap();
        assert_eq!(users[0].last_chat, vec!["new".to_string()]);
    }

    #[test]
    fn corrupt_database_is_set_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.db");
        std::fs::write(&path, vec![0x5a_u8; 4096]).unwrap();

        let mut store = SqliteUserStore::new(&path);
        store.open().unwrap();
        assert!(store.load_all().unwrap().is_empty());
        store.create_user(&User::new(1, "alice")).unwrap();
        assert!(dir.path().join("users.db.corrupt").exists());
    }

    #[test]
    fn updating_a_missing_user_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir);
        assert!(matches!(
            store.update_user(5, &UserUpdate::IsBanned(true)),
            Err(StoreError::UnknownUser(5))
        ));
    }
}

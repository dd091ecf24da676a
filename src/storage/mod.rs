//! Persistent backends for the user directory.

pub mod errors;
pub mod json;
pub mod legacy;
pub mod sqlite;

pub use errors::StoreError;
pub use json::JsonUserStore;
pub use sqlite::SqliteUserStore;

use crate::users::{User, UserUpdate};

/// The storage facade the user directory persists through.
///
/// `open` must succeed before any other method is called.
pub trait UserStore: Send {
    fn open(&mut self) -> Result<(), StoreError>;

    /// Every known user, with `last_chat` holding their retained lines oldest first.
    fn load_all(&mut self) -> Result<Vec<User>, StoreError>;

    fn create_user(&mut self, user: &User) -> Result<(), StoreError>;

    fn update_user(&mut self, id: i64, update: &UserUpdate) -> Result<(), StoreError>;

    /// Appends a chat line and drops all but the newest `max_lines` for that user.
    fn add_chat(&mut self, id: i64, line: &str, max_lines: usize) -> Result<(), StoreError>;

    /// Makes buffered changes durable. Backends that write through may ignore it.
    fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// A store that keeps nothing; used when no backend was configured.
#[derive(Debug, Default)]
pub struct NullUserStore;

impl UserStore for NullUserStore {
    fn open(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    fn load_all(&mut self) -> Result<Vec<User>, StoreError> {
        Ok(Vec::new())
    }

    fn create_user(&mut self, _user: &User) -> Result<(), StoreError> {
        Ok(())
    }

    fn update_user(&mut self, _id: i64, _update: &UserUpdate) -> Result<(), StoreError> {
        Ok(())
    }

    fn add_chat(&mut self, _id: i64, _line: &str, _max_lines: usize) -> Result<(), StoreError> {
        Ok(())
    }
}

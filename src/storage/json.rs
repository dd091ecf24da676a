use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::storage::{StoreError, UserStore};
use crate::users::{User, UserUpdate};

#[derive(Debug, Default, Serialize, Deserialize)]
struct UsersDocument {
    #[serde(default)]
    users: Vec<User>,
}

/// User store that keeps every user in one JSON document, rewritten on flush.
pub struct JsonUserStore {
    path: PathBuf,
    users: BTreeMap<i64, User>,
    opened: bool,
    dirty: bool,
}

impl JsonUserStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            users: BTreeMap::new(),
            opened: false,
            dirty: false,
        }
    }

    fn user_mut(&mut self, id: i64) -> Result<&mut User, StoreError> {
        if !self.opened {
            return Err(StoreError::NotOpen);
        }
        self.users.get_mut(&id).ok_or(StoreError::UnknownUser(id))
    }
}

impl UserStore for JsonUserStore {
    fn open(&mut self) -> Result<(), StoreError> {
        self.users.clear();
        if self.path.exists() {
            let contents = fs::read_to_string(&self.path)?;
            match serde_json::from_str::<UsersDocument>(&contents) {
                Ok(document) => {
                    self.users = document.users.into_iter().map(|user| (user.id, user)).collect();
                }
                Err(e) => {
                    // Keep the unreadable file around rather than overwrite it on the next flush.
                    let backup = self.path.with_extension("json.corrupt");
                    error!(
                        "Unable to parse user store {}: {}; moving it to {}",
                        self.path.display(),
                        e,
                        backup.display()
                    );
                    fs::rename(&self.path, &backup)?;
                }
            }
        }
        info!("Opened user store {} with {} users", self.path.display(), self.users.len());
        self.opened = true;
        self.dirty = false;
        Ok(())
    }

    fn load_all(&mut self) -> Result<Vec<User>, StoreError> {
        if !self.opened {
            return Err(StoreError::NotOpen);
        }
        Ok(self.users.values().cloned().collect())
    }

    fn create_user(&mut self, user: &User) -> Result<(), StoreError> {
        if !self.opened {
            return Err(StoreError::NotOpen);
        }
        let mut stored = user.clone();
        stored.presence = Default::default();
        self.users.insert(user.id, stored);
        self.dirty = true;
        Ok(())
    }

    fn update_user(&mut self, id: i64, update: &UserUpdate) -> Result<(), StoreError> {
        update.apply(self.user_mut(id)?);
        self.dirty = true;
        Ok(())
    }

    fn add_chat(&mut self, id: i64, line: &str, max_lines: usize) -> Result<(), StoreError> {
        let user = self.user_mut(id)?;
        user.last_chat.push_back(line.to_string());
        while user.last_chat.len() > max_lines {
            user.last_chat.pop_front();
        }
        self.dirty = true;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        if !self.opened || !self.dirty {
            return Ok(());
        }
        let document = UsersDocument {
            users: self.users.values().cloned().collect(),
        };
        fs::write(&self.path, serde_json::to_string_pretty(&document)?)?;
        self.dirty = false;
        Ok(())
    }
}

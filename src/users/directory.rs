use std::collections::HashMap;

use serde_json::Value;

use crate::diagnostics::{self, Diagnostics};
use crate::storage::legacy::legacy_users;
use crate::storage::{StoreError, UserStore};
use crate::users::{Bot, Presence, Role, User, UserUpdate};

/// In-memory index of every known user, persisted through a [`UserStore`].
///
/// All mutation goes through the directory so the login index, the id map
/// and the store never disagree. Unknown ids are ignored by every setter.
pub struct UserDirectory {
    users_by_id: HashMap<i64, User>,
    ids_by_login: HashMap<String, i64>,
    store: Box<dyn UserStore>,
    max_chat_lines: usize,
    diagnostics: Diagnostics,
}

impl UserDirectory {
    pub fn new(store: Box<dyn UserStore>, max_chat_lines: usize, diagnostics: Diagnostics) -> Self {
        Self {
            users_by_id: HashMap::new(),
            ids_by_login: HashMap::new(),
            store,
            max_chat_lines,
            diagnostics,
        }
    }

    /// Opens the store and loads every user it holds. Returns the number loaded.
    pub fn open(&mut self) -> Result<usize, StoreError> {
        self.store.open()?;
        let users = self.store.load_all()?;
        self.users_by_id.clear();
        self.ids_by_login.clear();
        for mut user in users {
            while user.last_chat.len() > self.max_chat_lines {
                user.last_chat.pop_front();
            }
            if !user.login.is_empty() {
                self.ids_by_login.insert(user.login.clone(), user.id);
            }
            self.users_by_id.insert(user.id, user);
        }
        Ok(self.users_by_id.len())
    }

    pub fn len(&self) -> usize {
        self.users_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users_by_id.is_empty()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.users_by_id.contains_key(&id)
    }

    pub fn find_by_id(&self, id: i64) -> Option<&User> {
        self.users_by_id.get(&id)
    }

    pub fn find_by_login(&self, login: &str) -> Option<&User> {
        self.id_for_login(login).and_then(|id| self.users_by_id.get(&id))
    }

    pub fn id_for_login(&self, login: &str) -> Option<i64> {
        self.ids_by_login.get(login).copied()
    }

    pub fn with_all<F: FnMut(&User)>(&self, mut f: F) {
        for user in self.users_by_id.values() {
            f(user);
        }
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users_by_id.values()
    }

    pub fn joined_ids(&self) -> Vec<i64> {
        self.users_by_id
            .values()
            .filter(|user| user.presence.is_joined)
            .map(|user| user.id)
            .collect()
    }

    /// Run-local state is not persisted, so it can be changed directly.
    pub fn presence_mut(&mut self, id: i64) -> Option<&mut Presence> {
        self.users_by_id.get_mut(&id).map(|user| &mut user.presence)
    }

    /// Inserts a user, replacing the persistent fields of any existing
    /// record with the same id while keeping its presence.
    pub fn add(&mut self, mut user: User) {
        if let Some(existing) = self.users_by_id.get(&user.id) {
            user.presence = existing.presence.clone();
            if existing.login != user.login && self.ids_by_login.get(&existing.login) == Some(&user.id) {
                self.ids_by_login.remove(&existing.login);
            }
        }
        while user.last_chat.len() > self.max_chat_lines {
            user.last_chat.pop_front();
        }
        let id = user.id;
        if let Err(e) = self.store.create_user(&user) {
            self.report_store_error(id, "create", &e);
        }
        let login = user.login.clone();
        self.users_by_id.insert(id, user);
        if !login.is_empty() {
            self.claim_login(&login, id);
        }
    }

    /// Records that `login` belongs to `id`, creating a bare user for ids
    /// not seen before.
    pub fn set_login(&mut self, login: &str, id: i64) {
        let Some(user) = self.users_by_id.get(&id) else {
            self.add(User::new(id, login));
            return;
        };
        if user.login == login {
            return;
        }
        let old_login = user.login.clone();
        if !old_login.is_empty() {
            self.diagnostics.post(
                diagnostics::STATUS,
                format!("User {} login changed from {} to {}", id, old_login, login),
                id,
            );
            if self.ids_by_login.get(&old_login) == Some(&id) {
                self.ids_by_login.remove(&old_login);
            }
        }
        self.update(id, UserUpdate::Login(login.to_string()));
        self.claim_login(login, id);
    }

    fn claim_login(&mut self, login: &str, id: i64) {
        if let Some(previous) = self.ids_by_login.insert(login.to_string(), id) {
            if previous != id {
                self.diagnostics.post(
                    diagnostics::STATUS,
                    format!("Login {} moved from user {} to user {}", login, previous, id),
                    id,
                );
                self.update(previous, UserUpdate::Login(String::new()));
            }
        }
    }

    pub fn set_name(&mut self, id: i64, name: &str) {
        self.update(id, UserUpdate::Name(name.to_string()));
    }

    pub fn set_created_at(&mut self, id: i64, created_at: f64) {
        self.update(id, UserUpdate::CreatedAt(created_at));
    }

    pub fn set_first_seen_time(&mut self, id: i64, time: f64) {
        self.update(id, UserUpdate::FirstSeenTime(time));
    }

    pub fn set_first_message_time(&mut self, id: i64, time: f64) {
        self.update(id, UserUpdate::FirstMessageTime(time));
    }

    pub fn set_last_message_time(&mut self, id: i64, time: f64) {
        self.update(id, UserUpdate::LastMessageTime(time));
    }

    pub fn set_num_messages(&mut self, id: i64, count: u64) {
        self.update(id, UserUpdate::NumMessages(count));
    }

    pub fn set_total_view_time(&mut self, id: i64, total: f64) {
        self.update(id, UserUpdate::TotalViewTime(total));
    }

    pub fn set_timeout(&mut self, id: i64, expiry: f64) {
        self.update(id, UserUpdate::Timeout(expiry));
    }

    pub fn set_banned(&mut self, id: i64, banned: bool) {
        self.update(id, UserUpdate::IsBanned(banned));
    }

    pub fn set_whitelisted(&mut self, id: i64, whitelisted: bool) {
        self.update(id, UserUpdate::IsWhitelisted(whitelisted));
    }

    pub fn set_bot(&mut self, id: i64, bot: Bot) {
        self.update(id, UserUpdate::Bot(bot));
    }

    pub fn set_role(&mut self, id: i64, role: Role) {
        self.update(id, UserUpdate::Role(role));
    }

    pub fn set_note(&mut self, id: i64, note: &str) {
        self.update(id, UserUpdate::Note(note.to_string()));
    }

    pub fn set_watching(&mut self, id: i64, watching: bool) {
        self.update(id, UserUpdate::Watching(watching));
    }

    /// Appends to the user's recent chat, dropping the oldest line once full.
    pub fn add_chat_line(&mut self, id: i64, line: &str) {
        let max_lines = self.max_chat_lines;
        let Some(user) = self.users_by_id.get_mut(&id) else {
            return;
        };
        user.last_chat.push_back(line.to_string());
        while user.last_chat.len() > max_lines {
            user.last_chat.pop_front();
        }
        if let Err(e) = self.store.add_chat(id, line, max_lines) {
            self.report_store_error(id, "add chat for", &e);
        }
    }

    /// Applies one field change in memory, then persists it. A store failure
    /// is reported but the in-memory value stands.
    pub fn update(&mut self, id: i64, update: UserUpdate) -> bool {
        let Some(user) = self.users_by_id.get_mut(&id) else {
            return false;
        };
        update.apply(user);
        if let Err(e) = self.store.update_user(id, &update) {
            self.report_store_error(id, &format!("update {} of", update.column()), &e);
        }
        true
    }

    /// Imports users from a legacy document. Users already known by id are
    /// left alone. Returns the number imported.
    pub fn migrate(&mut self, document: &Value) -> usize {
        let (users, skipped) = legacy_users(document);
        if skipped > 0 {
            self.diagnostics
                .warning(format!("Skipped {} malformed users in legacy document", skipped));
        }
        let mut imported = 0;
        for user in users {
            if self.contains(user.id) {
                continue;
            }
            self.add(user);
            imported += 1;
        }
        imported
    }

    pub fn flush(&mut self) {
        if let Err(e) = self.store.flush() {
            self.diagnostics.error(format!("Unable to save users: {}", e));
        }
    }

    fn report_store_error(&self, id: i64, action: &str, error: &StoreError) {
        self.diagnostics
            .post(diagnostics::ERROR, format!("Unable to {} user {}: {}", action, id, error), id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NullUserStore;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Default)]
    struct Journal {
        entries: Vec<String>,
        fail_updates: bool,
    }

    struct JournalStore(Arc<Mutex<Journal>>);

    impl UserStore for JournalStore {
        fn open(&mut self) -> Result<(), StoreError> {
            Ok(())
        }

        fn load_all(&mut self) -> Result<Vec<User>, StoreError> {
            let mut user = User::new(1, "existing");
            user.last_chat = (0..15).map(|i| i.to_string()).collect();
            Ok(vec![user])
        }

        fn create_user(&mut self, user: &User) -> Result<(), StoreError> {
            self.0.lock().entries.push(format!("create {} {}", user.id, user.login));
            Ok(())
        }

        fn update_user(&mut self, id: i64, update: &UserUpdate) -> Result<(), StoreError> {
            let mut journal = self.0.lock();
            if journal.fail_updates {
                return Err(StoreError::NotOpen);
            }
            journal.entries.push(format!("update {} {}", id, update.column()));
            Ok(())
        }

        fn add_chat(&mut self, id: i64, line: &str, max_lines: usize) -> Result<(), StoreError> {
            self.0.lock().entries.push(format!("chat {} {} {}", id, line, max_lines));
            Ok(())
        }
    }

    fn journaled() -> (UserDirectory, Arc<Mutex<Journal>>, Diagnostics) {
        let journal = Arc::new(Mutex::new(Journal::default()));
        let diagnostics = Diagnostics::new();
        let mut directory = UserDirectory::new(Box::new(JournalStore(journal.clone())), 10, diagnostics.clone());
        directory.open().unwrap();
        (directory, journal, diagnostics)
    }

    #[test]
    fn open_indexes_and_trims_loaded_users() {
        let (directory, _, _) = journaled();
        let user = directory.find_by_login("existing").unwrap();
        assert_eq!(user.id, 1);
        assert_eq!(user.last_chat.len(), 10);
        assert_eq!(user.last_chat.front().map(String::as_str), Some("5"));
        assert!(directory.find_by_login("nobody").is_none());
        assert!(directory.find_by_id(2).is_none());
    }

    #[test]
    fn set_login_creates_placeholder_for_unknown_id() {
        let (mut directory, journal, _) = journaled();
        directory.set_login("newcomer", 2);
        assert_eq!(directory.find_by_login("newcomer").map(|user| user.id), Some(2));
        assert_eq!(journal.lock().entries, vec!["create 2 newcomer"]);
    }

    #[test]
    fn set_login_reindexes_a_renamed_user() {
        let (mut directory, journal, _) = journaled();
        directory.set_login("renamed", 1);
        assert!(directory.find_by_login("existing").is_none());
        assert_eq!(directory.find_by_login("renamed").map(|user| user.id), Some(1));
        assert_eq!(journal.lock().entries, vec!["update 1 login"]);
        directory.set_login("renamed", 1);
        assert_eq!(journal.lock().entries.len(), 1);
    }

    #[test]
    fn a_login_belongs_to_one_user_at_a_time() {
        let (mut directory, _, _) = journaled();
        directory.add(User::new(2, "existing"));
        assert_eq!(directory.id_for_login("existing"), Some(2));
        assert_eq!(directory.find_by_id(1).map(|user| user.login.as_str()), Some(""));
    }

    #[test]
    fn setters_persist_one_field_each() {
        let (mut directory, journal, _) = journaled();
        directory.set_role(1, Role::VIP);
        directory.set_note(1, "hello");
        directory.set_note(404, "ignored");
        let user = directory.find_by_id(1).unwrap();
        assert_eq!(user.role, Role::VIP);
        assert_eq!(user.note, "hello");
        assert_eq!(journal.lock().entries, vec!["update 1 role", "update 1 note"]);
    }

    #[test]
    fn store_failures_keep_the_in_memory_change() {
        let (mut directory, journal, diagnostics) = journaled();
        journal.lock().fail_updates = true;
        directory.set_banned(1, true);
        assert!(directory.find_by_id(1).unwrap().is_banned);
        let messages = diagnostics.drain();
        assert!(messages.iter().any(|m| m.level == diagnostics::ERROR && m.user_id == 1));
    }

    #[test]
    fn chat_lines_are_bounded() {
        let mut directory = UserDirectory::new(Box::new(NullUserStore), 3, Diagnostics::new());
        directory.add(User::new(5, "chatty"));
        for i in 0..5 {
            directory.add_chat_line(5, &format!("line {}", i));
        }
        let lines: Vec<&str> = directory.find_by_id(5).unwrap().last_chat.iter().map(String::as_str).collect();
        assert_eq!(lines, vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn migrate_skips_known_users() {
        let (mut directory, _, _) = journaled();
        let imported = directory.migrate(&json!({
            "users": [
                {"id": 1, "login": "existing", "note": "from legacy"},
                {"id": 3, "login": "legacy", "role": "vip"}
            ]
        }));
        assert_eq!(imported, 1);
        assert_eq!(directory.find_by_id(1).unwrap().note, "");
        let legacy = directory.find_by_login("legacy").unwrap();
        assert!(legacy.is_whitelisted);
    }
}

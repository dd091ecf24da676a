//! The moderation and analytics agent itself.
//!
//! [`Bouncer`] owns one worker thread that drives the chat connection,
//! resolves identities through the rate-limited API scheduler and applies the
//! moderation policies. Every entry point, collaborator callback and worker
//! iteration runs under the same core lock, so events are handled strictly one
//! at a time. Collaborators must never call back into the bouncer from inside
//! one of its calls to them; the lock is not re-entrant.

mod connection;
mod engine;
mod moderation;
mod pending;
mod scheduler;
pub mod template;
mod worker;


use std::fs;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use log::error;
use parking_lot::{Condvar, Mutex};

pub use self::connection::{format_duration, ConnectionState};
use self::engine::{Core, CoreParts};

use crate::clock::Clock;
use crate::config::{BouncerOptions, ConfigError, Configuration, PersistedState};
use crate::diagnostics::{Diagnostics, DiagnosticsPublisher, Host};
use crate::stats::Stats;
use crate::storage::UserStore;
use crate::transport::{
    ApiError, ApiResponse, ChatEvents, ChatMessage, ChatTransport, HttpClient, Membership, ModerationClear, NameList,
    Notice, Whisper,
};
use crate::users::{Bot, User, UserDirectory, UserUpdate};

pub(crate) struct Shared {
    pub(crate) core: Mutex<Core>,
    pub(crate) wake: Condvar,
}

impl Shared {
    fn notify(&self) {
        self.wake.notify_all();
    }

    /// Runs `f` under the core lock, then wakes the worker so it can act on
    /// whatever `f` queued.
    fn with_core<R>(&self, f: impl FnOnce(&mut Core, f64) -> R) -> R {
        let result = {
            let mut core = self.core.lock();
            let now = core.clock.now();
            f(&mut core, now)
        };
        self.notify();
        result
    }

    pub(crate) fn api_call_completed(&self, id: u64, result: Result<ApiResponse, ApiError>) {
        self.with_core(|core, _| core.api_call_completed(id, result));
    }
}

/// Forwards chat transport callbacks into the core for as long as the
/// bouncer exists.
pub(crate) struct ChatRelay {
    shared: Weak<Shared>,
}

impl ChatRelay {
    pub(crate) fn new(shared: Weak<Shared>) -> Self {
        Self { shared }
    }

    fn deliver(&self, f: impl FnOnce(&mut Core, f64)) {
        if let Some(shared) = self.shared.upgrade() {
            shared.with_core(f);
        }
    }
}

impl ChatEvents for ChatRelay {
    fn logged_in(&self) {
        self.deliver(|core, now| core.on_logged_in(now));
    }

    fn logged_out(&self) {
        self.deliver(|core, now| core.on_logged_out(now));
    }

    fn doom(&self) {
        self.deliver(|core, _| core.on_doom());
    }

    fn joined(&self, membership: Membership) {
        self.deliver(|core, now| core.on_joined(membership, now));
    }

    fn left(&self, membership: Membership) {
        self.deliver(|core, now| core.on_left(membership, now));
    }

    fn name_list(&self, names: NameList) {
        self.deliver(|core, now| core.users_joined(&names.names, now));
    }

    fn message(&self, message: ChatMessage) {
        self.deliver(|core, now| core.on_message(message, now));
    }

    fn whisper(&self, whisper: Whisper) {
        self.deliver(|core, now| core.on_whisper(whisper, now));
    }

    fn notice(&self, notice: Notice) {
        self.deliver(|core, _| core.on_notice(notice));
    }

    fn clear(&self, clear: ModerationClear) {
        self.deliver(|core, now| core.on_clear(clear, now));
    }
}

/// The outside world as the bouncer sees it.
pub struct Collaborators {
    pub transport: Arc<dyn ChatTransport>,
    pub http: Arc<dyn HttpClient>,
    pub store: Box<dyn UserStore>,
    pub clock: Arc<dyn Clock>,
}

pub struct Bouncer {
    shared: Arc<Shared>,
    diagnostics: Diagnostics,
    worker: Option<JoinHandle<()>>,
    publisher: Option<DiagnosticsPublisher>,
}

impl Bouncer {
    /// Loads the persisted configuration from `options.config_path`. A
    /// missing file starts unconfigured; an unreadable one is reported and
    /// set aside.
    pub fn new(options: BouncerOptions, collaborators: Collaborators) -> Self {
        let diagnostics = Diagnostics::new();
        let persisted = load_persisted_state(&options, &diagnostics);
        let users = UserDirectory::new(collaborators.store, options.max_chat_lines, diagnostics.clone());
        let parts = CoreParts {
            options,
            persisted,
            users,
            clock: collaborators.clock,
            diagnostics: diagnostics.clone(),
            transport: collaborators.transport,
            http: collaborators.http,
        };
        let shared = Arc::new_cyclic(|weak| Shared {
            core: Mutex::new(Core::new(parts, weak.clone())),
            wake: Condvar::new(),
        });
        Self {
            shared,
            diagnostics,
            worker: None,
            publisher: None,
        }
    }

    /// Starts delivering status messages to `host` and starts the worker.
    pub fn start(&mut self, host: Arc<dyn Host>) {
        if self.worker.is_some() {
            return;
        }
        self.publisher = Some(self.diagnostics.start_publisher(host));
        self.shared.core.lock().stop = false;
        let shared = Arc::clone(&self.shared);
        match thread::Builder::new()
            .name("bouncer-worker".into())
            .spawn(move || worker::run(shared))
        {
            Ok(handle) => self.worker = Some(handle),
            Err(e) => self.diagnostics.error(format!("Unable to start worker thread: {}", e)),
        }
    }

    /// Stops the worker, which logs out and saves everything, then flushes
    /// the remaining status messages.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.shared.core.lock().stop = true;
            self.shared.notify();
            if worker.join().is_err() {
                error!("Bouncer worker thread panicked");
            }
        }
        if let Some(publisher) = self.publisher.take() {
            publisher.stop();
        }
    }

    pub fn ban(&self, id: i64, reason: Option<&str>) {
        self.shared.with_core(|core, _| core.ban_user(id, reason));
    }

    pub fn unban(&self, id: i64) {
        self.shared.with_core(|core, _| core.unban_user(id));
    }

    pub fn time_out(&self, id: i64, seconds: u64) {
        self.shared.with_core(|core, now| core.time_out_user(id, seconds, now));
    }

    pub fn whitelist(&self, id: i64) {
        self.update_user(id, UserUpdate::IsWhitelisted(true));
    }

    pub fn unwhitelist(&self, id: i64) {
        self.update_user(id, UserUpdate::IsWhitelisted(false));
    }

    pub fn set_note(&self, id: i64, note: &str) {
        self.update_user(id, UserUpdate::Note(note.to_string()));
    }

    pub fn start_watching(&self, id: i64) {
        self.update_user(id, UserUpdate::Watching(true));
    }

    pub fn stop_watching(&self, id: i64) {
        self.update_user(id, UserUpdate::Watching(false));
    }

    fn update_user(&self, id: i64, update: UserUpdate) {
        self.shared.with_core(|core, _| {
            core.users.update(id, update);
        });
    }

    pub fn set_bot_status(&self, id: i64, bot: Bot) {
        self.shared.with_core(|core, now| core.set_bot_status(id, bot, now));
    }

    pub fn mark_greeted(&self, id: i64) {
        self.shared.with_core(|core, _| core.clear_needs_greeting(id));
    }

    pub fn start_view_timer(&self) {
        self.shared.with_core(|core, now| core.start_view_timer(now));
    }

    pub fn stop_view_timer(&self) {
        self.shared.with_core(|core, now| core.stop_view_timer(now));
    }

    pub fn configuration(&self) -> Configuration {
        self.shared.core.lock().configuration.clone()
    }

    /// Replaces the configuration and saves it. The worker reconnects or
    /// goes idle as the new values require.
    pub fn set_configuration(&self, configuration: Configuration) {
        self.shared.with_core(|core, _| {
            core.configuration = configuration;
            core.configuration_changed = true;
            core.save_configuration();
        });
    }

    pub fn stats(&self) -> Stats {
        self.shared.with_core(|core, now| core.stats_snapshot(now))
    }

    /// Every known user, with view time counted up to now.
    pub fn users(&self) -> Vec<User> {
        self.shared.with_core(|core, now| core.users_snapshot(now))
    }

    pub fn user(&self, id: i64) -> Option<User> {
        self.shared
            .with_core(|core, now| core.users.find_by_id(id).map(|user| core.user_snapshot(user, now)))
    }

    pub fn user_by_login(&self, login: &str) -> Option<User> {
        self.shared
            .with_core(|core, now| core.users.find_by_login(login).map(|user| core.user_snapshot(user, now)))
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.core.lock().state
    }

    pub fn stream_title(&self) -> Option<String> {
        self.shared.core.lock().stream_title.clone()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}

impl Drop for Bouncer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn load_persisted_state(options: &BouncerOptions, diagnostics: &Diagnostics) -> PersistedState {
    let path = &options.config_path;
    if !path.exists() {
        return PersistedState::default();
    }
    match PersistedState::load(path) {
        Ok(state) => state,
        Err(e) => {
            diagnostics.error(format!("Unable to load configuration from {}: {}", path.display(), e));
            if matches!(e, ConfigError::Parse(_)) {
                let aside = path.with_extension("toml.corrupt");
                if let Err(e) = fs::rename(path, &aside) {
                    error!("Unable to move {} aside: {}", path.display(), e);
                }
            }
            PersistedState::default()
        }
    }
}

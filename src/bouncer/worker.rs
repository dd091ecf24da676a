use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::MutexGuard;
use serde_json::Value;

use crate::bouncer::connection::ConnectionState;
use crate::bouncer::engine::Core;
use crate::bouncer::Shared;
use crate::storage::errors::StoreError;
use crate::twitch::api::models::parse_streams;
use crate::twitch::api::requests;
use crate::transport::ApiResponse;

/// Longest the worker sleeps without a due task or wake-up.
const MAX_SLEEP: f64 = 3600.0;

impl Core {
    /// Opens the user store and imports the legacy document, if any.
    pub(crate) fn startup(&mut self, now: f64) -> Result<(), StoreError> {
        let loaded = self.users.open()?;
        self.status(format!("Loaded {} users", loaded));
        if let Some(path) = self.options.legacy_import_path.clone() {
            if path.exists() {
                let document = fs::read_to_string(&path)
                    .map_err(StoreError::from)
                    .and_then(|text| serde_json::from_str::<Value>(&text).map_err(StoreError::from));
                match document {
                    Ok(document) => {
                        let imported = self.users.migrate(&document);
                        self.status(format!("Imported {} users from {}", imported, path.display()));
                    }
                    Err(e) => self
                        .diagnostics
                        .error(format!("Unable to import users from {}: {}", path.display(), e)),
                }
            }
        }
        self.next_autosave = now + self.options.config_autosave_cooldown;
        self.configuration_changed = true;
        self.started = true;
        Ok(())
    }

    /// Runs everything due at `now` and returns when the worker should next wake.
    pub(crate) fn iterate(&mut self, now: f64) -> f64 {
        if self.configuration_changed {
            self.configuration_changed = false;
            self.check_configuration();
        }

        if now >= self.next_autosave {
            self.autosave(now);
            self.next_autosave = now + self.options.config_autosave_cooldown;
        }

        if self.state == ConnectionState::InsideRoom && now >= self.next_stream_check {
            self.post_stream_check();
            self.next_stream_check = now + self.options.stream_check_cooldown;
        }

        self.run_api_calls(now);

        if self.state == ConnectionState::Unconnected
            && self.configuration.is_configured()
            && now >= self.next_reconnect
        {
            self.log_in();
        }

        let mut next = self.next_autosave;
        if self.state == ConnectionState::InsideRoom {
            next = next.min(self.next_stream_check);
        }
        if let Some(due) = self.scheduler.next_due() {
            next = next.min(due);
        }
        if self.state == ConnectionState::Unconnected && self.configuration.is_configured() {
            next = next.min(self.next_reconnect);
        }
        next
    }

    fn autosave(&mut self, now: f64) {
        self.accrue_all(now);
        self.save_configuration();
        self.users.flush();
    }

    fn post_stream_check(&mut self) {
        if self.stream_check_queued || self.configuration.channel.is_empty() {
            return;
        }
        self.stream_check_queued = true;
        let request = requests::stream_status(&self.options.helix_api_base, &self.configuration.channel);
        self.post_api_call(
            request,
            Box::new(|core, call, response| core.stream_check_completed(call, response)),
        );
    }

    fn stream_check_completed(&mut self, call: u64, response: Option<&ApiResponse>) {
        self.stream_check_queued = false;
        let Some(response) = response else {
            return;
        };
        let streams = match parse_streams(&response.body) {
            Ok(streams) => streams,
            Err(e) => {
                self.diagnostics.warning(format!("Twitch API call {}: {}", call, e));
                return;
            }
        };
        let title = streams
            .live()
            .map(|stream| stream.title.clone())
            .filter(|title| !title.is_empty());
        if title == self.stream_title {
            return;
        }
        match &title {
            Some(title) => self.status(format!("Stream title is now \"{}\"", title)),
            None => self.status("Stream is offline"),
        }
        self.stream_title = title;
    }
}

/// Body of the worker thread.
pub(crate) fn run(shared: Arc<Shared>) {
    let mut core = shared.core.lock();
    let now = core.clock.now();
    if let Err(e) = core.startup(now) {
        core.diagnostics.error(format!("Unable to open user store: {}", e));
        return;
    }
    while !core.stop {
        let now = core.clock.now();
        let next = core.iterate(now);
        if core.stop {
            break;
        }
        let wait = (next - now).clamp(0.0, MAX_SLEEP);
        if wait > 0.0 {
            shared.wake.wait_for(&mut core, Duration::from_secs_f64(wait));
        }
    }
    shutdown(&shared, &mut core);
}

/// Logs out (waiting a bounded time for confirmation), then persists
/// configuration and users unconditionally.
pub(crate) fn shutdown(shared: &Shared, core: &mut MutexGuard<'_, Core>) {
    if core.state.is_logged_in() {
        core.status("Logging out");
        core.logged_out = false;
        core.transport.log_out("Bye");
        let deadline = Instant::now() + Duration::from_secs_f64(core.options.logout_wait_seconds);
        while !core.logged_out {
            if shared.wake.wait_until(core, deadline).timed_out() {
                core.diagnostics.warning("Timed out waiting for logout");
                break;
            }
        }
    }
    let now = core.clock.now();
    core.part_all(now);
    core.state = ConnectionState::Unconnected;
    core.save_configuration();
    core.users.flush();
    core.status("Stopped");
}

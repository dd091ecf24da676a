use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Weak};

use crate::bouncer::connection::{ConnectionMonitor, ConnectionState};
use crate::bouncer::pending::PendingIdentityQueue;
use crate::bouncer::scheduler::{ApiHandler, ApiScheduler};
use crate::bouncer::{ChatRelay, Shared};
use crate::clock::Clock;
use crate::config::{BouncerOptions, Configuration, PersistedState};
use crate::diagnostics::{self, Diagnostics};
use crate::stats::{Stats, StatsAccumulator};
use crate::transport::{
    ApiError, ApiRequest, ApiResponse, ChatEvents, ChatMessage, ChatTransport, ClearKind, HttpClient, ModerationClear,
    Notice, Whisper,
};
use crate::twitch::api::models::{parse_legacy_user, parse_legacy_users, LegacyUser};
use crate::twitch::api::requests;
use crate::users::{Bot, Role, User, UserDirectory};

/// Everything the worker and the public entry points share, guarded by one lock.
pub(crate) struct Core {
    pub(crate) configuration: Configuration,
    pub(crate) configuration_changed: bool,
    pub(crate) options: BouncerOptions,
    pub(crate) state: ConnectionState,
    pub(crate) monitor: ConnectionMonitor,
    pub(crate) users: UserDirectory,
    pub(crate) stats: StatsAccumulator,
    pub(crate) scheduler: ApiScheduler,
    pub(crate) pending: PendingIdentityQueue,
    login_lookups: VecDeque<String>,
    login_joins: HashMap<String, f64>,
    login_lookup_pending: bool,
    self_lookup_pending: bool,
    pub(crate) stream_title: Option<String>,
    pub(crate) stream_check_queued: bool,
    pub(crate) next_autosave: f64,
    pub(crate) next_stream_check: f64,
    pub(crate) next_reconnect: f64,
    pub(crate) started: bool,
    pub(crate) stop: bool,
    pub(crate) logged_out: bool,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) transport: Arc<dyn ChatTransport>,
    pub(crate) http: Arc<dyn HttpClient>,
    shared: Weak<Shared>,
}

pub(crate) struct CoreParts {
    pub options: BouncerOptions,
    pub persisted: PersistedState,
    pub users: UserDirectory,
    pub clock: Arc<dyn Clock>,
    pub diagnostics: Diagnostics,
    pub transport: Arc<dyn ChatTransport>,
    pub http: Arc<dyn HttpClient>,
}

impl Core {
    pub(crate) fn new(parts: CoreParts, shared: Weak<Shared>) -> Self {
        Self {
            stats: StatsAccumulator::from_baseline(&parts.persisted.stats),
            scheduler: ApiScheduler::new(parts.options.api_lookup_cooldown),
            configuration: parts.persisted.configuration,
            configuration_changed: true,
            options: parts.options,
            state: ConnectionState::Unconfigured,
            monitor: ConnectionMonitor::new(),
            users: parts.users,
            pending: PendingIdentityQueue::default(),
            login_lookups: VecDeque::new(),
            login_joins: HashMap::new(),
            login_lookup_pending: false,
            self_lookup_pending: false,
            stream_title: None,
            stream_check_queued: false,
            next_autosave: 0.0,
            next_stream_check: 0.0,
            next_reconnect: 0.0,
            started: false,
            stop: false,
            logged_out: false,
            clock: parts.clock,
            diagnostics: parts.diagnostics,
            transport: parts.transport,
            http: parts.http,
            shared,
        }
    }

    pub(crate) fn relay(&self) -> Arc<dyn ChatEvents> {
        Arc::new(ChatRelay::new(self.shared.clone()))
    }

    pub(crate) fn status(&self, message: impl Into<String>) {
        self.diagnostics.status(message);
    }

    pub(crate) fn is_self(&self, login: &str) -> bool {
        login.eq_ignore_ascii_case(&self.configuration.account)
    }

    // Presence and view time

    pub(crate) fn user_joined(&mut self, id: i64, time: f64) {
        let Some(user) = self.users.find_by_id(id) else {
            return;
        };
        if user.presence.is_joined {
            return;
        }
        let is_bot = user.is_bot();
        let first_seen = user.first_seen_time;
        let account_age = time - user.created_at;
        let login = user.login.clone();
        if let Some(presence) = self.users.presence_mut(id) {
            presence.is_joined = true;
            presence.join_time = time;
            presence.view_time_mark = time;
        }
        if first_seen == 0.0 {
            self.users.set_first_seen_time(id, time);
        }
        if !is_bot {
            self.stats.viewer_count_up();
        }
        self.diagnostics.post(
            diagnostics::DEBUG,
            format!("User {} ({}) has joined (account age: {:.0}s)", id, login, account_age),
            id,
        );
    }

    pub(crate) fn user_parted(&mut self, id: i64, time: f64) {
        let Some(user) = self.users.find_by_id(id) else {
            return;
        };
        if !user.presence.is_joined {
            return;
        }
        let is_bot = user.is_bot();
        let login = user.login.clone();
        self.accrue_view_time(id, time);
        if let Some(presence) = self.users.presence_mut(id) {
            presence.is_joined = false;
            presence.part_time = time;
        }
        if !is_bot {
            self.stats.viewer_count_down();
        }
        self.diagnostics
            .post(diagnostics::DEBUG, format!("User {} ({}) has parted", id, login), id);
    }

    pub(crate) fn part_all(&mut self, time: f64) {
        for id in self.users.joined_ids() {
            self.user_parted(id, time);
        }
    }

    /// Adds view time a joined viewer has built up since their last accrual point.
    pub(crate) fn accrue_view_time(&mut self, id: i64, now: f64) {
        let Some(user) = self.users.find_by_id(id) else {
            return;
        };
        if !user.presence.is_joined || user.is_bot() {
            return;
        }
        let mark = user.presence.view_time_mark;
        let total = user.total_view_time;
        let elapsed = self.stats.accrue(mark, now);
        if let Some(presence) = self.users.presence_mut(id) {
            presence.view_time_mark = now.max(mark);
        }
        if elapsed > 0.0 {
            self.users.set_total_view_time(id, total + elapsed);
        }
    }

    pub(crate) fn accrue_all(&mut self, now: f64) {
        for id in self.users.joined_ids() {
            self.accrue_view_time(id, now);
        }
    }

    fn pending_view_time(&self, user: &User, now: f64) -> f64 {
        if user.presence.is_joined && !user.is_bot() {
            self.stats.pending(user.presence.view_time_mark, now)
        } else {
            0.0
        }
    }

    pub(crate) fn start_view_timer(&mut self, now: f64) {
        if !self.stats.is_timer_running() {
            self.stats.start_timer(now);
            self.status("View timer started");
        }
    }

    pub(crate) fn stop_view_timer(&mut self, now: f64) {
        if self.stats.is_timer_running() {
            self.accrue_all(now);
            self.stats.stop_timer();
            self.status("View timer stopped");
        }
    }

    /// Reclassifies a user, keeping the viewer count in step when a joined
    /// user starts or stops counting as a viewer.
    pub(crate) fn set_bot_status(&mut self, id: i64, bot: Bot, now: f64) {
        let Some(user) = self.users.find_by_id(id) else {
            return;
        };
        if user.bot == bot {
            return;
        }
        let joined = user.presence.is_joined;
        let was_viewer = joined && !user.is_bot();
        if was_viewer {
            self.accrue_view_time(id, now);
        }
        self.users.set_bot(id, bot);
        let is_viewer = joined && bot != Bot::Yes;
        match (was_viewer, is_viewer) {
            (true, false) => self.stats.viewer_count_down(),
            (false, true) => {
                self.stats.viewer_count_up();
                if let Some(presence) = self.users.presence_mut(id) {
                    presence.view_time_mark = now;
                }
            }
            _ => {}
        }
    }

    // Identity resolution

    pub(crate) fn users_joined(&mut self, logins: &[String], now: f64) {
        for login in logins {
            if self.is_self(login) {
                continue;
            }
            match self.users.id_for_login(login) {
                Some(id) => self.user_joined(id, now),
                None => {
                    if !self.login_joins.contains_key(login) {
                        self.login_joins.insert(login.clone(), now);
                        self.login_lookups.push_back(login.clone());
                    }
                }
            }
        }
        if !self.login_lookup_pending && !self.login_lookups.is_empty() {
            self.post_login_lookups();
        }
    }

    /// Drops a login waiting for lookup, e.g. because its user left.
    pub(crate) fn forget_login_join(&mut self, login: &str) {
        self.login_joins.remove(login);
    }

    pub(crate) fn post_login_lookups(&mut self) {
        let mut batch = BTreeSet::new();
        while batch.len() < self.options.max_logins_per_lookup {
            let Some(login) = self.login_lookups.pop_front() else {
                break;
            };
            let Some(&join_time) = self.login_joins.get(&login) else {
                continue;
            };
            if let Some(id) = self.users.id_for_login(&login) {
                self.login_joins.remove(&login);
                self.user_joined(id, join_time);
                continue;
            }
            batch.insert(login);
        }
        if batch.is_empty() {
            return;
        }
        self.login_lookup_pending = true;
        let batch: Vec<String> = batch.into_iter().collect();
        let request = requests::users_by_login(&self.options.legacy_api_base, &batch);
        self.post_api_call(
            request,
            Box::new(move |core, call, response| core.login_lookup_completed(call, batch, response)),
        );
    }

    fn login_lookup_completed(&mut self, call: u64, batch: Vec<String>, response: Option<&ApiResponse>) {
        self.login_lookup_pending = false;
        if let Some(response) = response {
            match parse_legacy_users(&response.body) {
                Ok(found) => {
                    for (index, profile) in found.users.iter().enumerate() {
                        let Some(id) = profile.numeric_id() else {
                            self.diagnostics.warning(format!(
                                "Twitch API call {} returned user {} with invalid ID",
                                call, index
                            ));
                            continue;
                        };
                        if profile.name.is_empty() {
                            self.diagnostics.warning(format!(
                                "Twitch API call {} returned user {} with missing login",
                                call, index
                            ));
                            continue;
                        }
                        let Some(join_time) = self.login_joins.remove(&profile.name) else {
                            self.diagnostics.warning(format!(
                                "Twitch API call {} returned user {} with unexpected login ({})",
                                call, index, profile.name
                            ));
                            continue;
                        };
                        self.apply_profile(id, profile);
                        self.user_joined(id, join_time);
                    }
                }
                Err(e) => self.diagnostics.warning(format!("Twitch API call {}: {}", call, e)),
            }
        }
        // Whatever was not resolved can be queued again by its next join.
        for login in &batch {
            self.login_joins.remove(login);
        }
    }

    /// Looks up the channel account itself so whispers can go through the API.
    pub(crate) fn post_self_lookup(&mut self) {
        if self.self_lookup_pending || self.users.id_for_login(&self.configuration.account).is_some() {
            return;
        }
        self.self_lookup_pending = true;
        let account = vec![self.configuration.account.to_lowercase()];
        let request = requests::users_by_login(&self.options.legacy_api_base, &account);
        self.post_api_call(
            request,
            Box::new(|core, call, response| {
                core.self_lookup_pending = false;
                let Some(response) = response else {
                    return;
                };
                match parse_legacy_users(&response.body) {
                    Ok(found) => {
                        for profile in &found.users {
                            if let Some(id) = profile.numeric_id() {
                                core.apply_profile(id, profile);
                            }
                        }
                    }
                    Err(e) => core.diagnostics.warning(format!("Twitch API call {}: {}", call, e)),
                }
            }),
        );
    }

    /// Creates or refreshes a user from a looked-up profile.
    pub(crate) fn apply_profile(&mut self, id: i64, profile: &LegacyUser) {
        let created_at = profile.created_at_seconds();
        let Some(existing) = self.users.find_by_id(id) else {
            let mut user = User::new(id, profile.name.clone());
            user.name = profile.display_name.clone();
            user.created_at = created_at.unwrap_or(0.0);
            self.users.add(user);
            return;
        };
        let old_name = existing.name.clone();
        let old_created_at = existing.created_at;
        self.users.set_login(&profile.name, id);
        if !profile.display_name.is_empty() && profile.display_name != old_name {
            if !old_name.is_empty() {
                self.diagnostics.post(
                    diagnostics::STATUS,
                    format!(
                        "User {} display name changed from {} to {}",
                        id, old_name, profile.display_name
                    ),
                    id,
                );
            }
            self.users.set_name(id, &profile.display_name);
        }
        if let Some(created_at) = created_at {
            if created_at != old_created_at {
                self.users.set_created_at(id, created_at);
            }
        }
    }

    fn post_id_lookup(&mut self, id: i64) {
        let request = requests::user_by_id(&self.options.legacy_api_base, id);
        self.post_api_call(
            request,
            Box::new(move |core, call, response| core.id_lookup_completed(call, id, response)),
        );
    }

    fn id_lookup_completed(&mut self, call: u64, id: i64, response: Option<&ApiResponse>) {
        let profile = match response.map(|response| parse_legacy_user(&response.body)) {
            Some(Ok(profile)) => profile,
            Some(Err(e)) => {
                self.diagnostics.warning(format!("Twitch API call {}: {}", call, e));
                self.pending.lookup_failed(id);
                return;
            }
            None => {
                self.pending.lookup_failed(id);
                return;
            }
        };
        if profile.numeric_id() != Some(id) || profile.name.is_empty() {
            self.diagnostics.warning(format!(
                "Twitch API call {} returned an unusable profile for user {}",
                call, id
            ));
            self.pending.lookup_failed(id);
            return;
        }
        self.apply_profile(id, &profile);
        self.replay(id);
    }

    /// Runs everything held back for `id` through the normal path, messages
    /// first, each at its original arrival time.
    pub(crate) fn replay(&mut self, id: i64) {
        let Some(replay) = self.pending.take(id) else {
            return;
        };
        for (message, time) in replay.messages {
            self.process_message(message, time);
        }
        for (whisper, time) in replay.whispers {
            self.process_whisper(whisper, time);
        }
    }

    // Chat events

    pub(crate) fn on_message(&mut self, message: ChatMessage, time: f64) {
        let id = message.user_id;
        if id == 0 {
            self.diagnostics
                .debug(format!("Ignoring message from {} without a user id", message.login));
            return;
        }
        if self.users.contains(id) {
            self.replay(id);
            self.process_message(message, time);
        } else if self.pending.enqueue_message(id, message, time) {
            self.post_id_lookup(id);
        }
    }

    pub(crate) fn on_whisper(&mut self, whisper: Whisper, time: f64) {
        let id = whisper.user_id;
        if id == 0 {
            return;
        }
        if self.users.contains(id) {
            self.replay(id);
            self.process_whisper(whisper, time);
        } else if self.pending.enqueue_whisper(id, whisper, time) {
            self.post_id_lookup(id);
        }
    }

    fn refresh_identity(&mut self, id: i64, login: &str, display_name: &str) {
        if !login.is_empty() {
            self.users.set_login(login, id);
        }
        let stale = self
            .users
            .find_by_id(id)
            .map_or(false, |user| !display_name.is_empty() && user.name != display_name);
        if stale {
            self.users.set_name(id, display_name);
        }
    }

    pub(crate) fn process_message(&mut self, message: ChatMessage, time: f64) {
        let id = message.user_id;
        self.refresh_identity(id, &message.login, &message.display_name);
        let Some(user) = self.users.find_by_id(id) else {
            return;
        };
        let first_seen = user.first_seen_time;
        let first_message = user.first_message_time;
        let num_messages = user.num_messages;
        let current_role = user.role;
        let whitelisted = user.is_whitelisted;

        if first_seen == 0.0 {
            self.users.set_first_seen_time(id, time);
        }
        if first_message == 0.0 {
            self.users.set_first_message_time(id, time);
        }
        self.users.set_last_message_time(id, time);
        self.users.set_num_messages(id, num_messages + 1);
        self.users.add_chat_line(id, &message.content);

        match message.badges.iter().find_map(|badge| Role::from_badge(badge)) {
            Some(role) => {
                if role != current_role {
                    self.users.set_role(id, role);
                }
                if !whitelisted {
                    self.users.set_whitelisted(id, true);
                }
            }
            None => {
                if current_role != Role::Pleb {
                    self.users.set_role(id, Role::Pleb);
                }
            }
        }

        // Events replayed after the room was lost only count toward the
        // user's history.
        let in_room = self.state == ConnectionState::InsideRoom;
        if in_room {
            self.user_joined(id, time);
        }

        let threshold = self.configuration.new_account_age_threshold;
        let Some(user) = self.users.find_by_id(id) else {
            return;
        };
        let greet = !user.is_bot() && !self.is_self(&user.login);
        let is_new_account = time - user.created_at < threshold;
        let line = if message.is_action {
            format!("* {} {}", user.display_name(), message.content)
        } else {
            format!("{}: {}", user.display_name(), message.content)
        };
        if let Some(presence) = self.users.presence_mut(id) {
            if presence.first_message_time_this_instance == 0.0 {
                presence.first_message_time_this_instance = time;
            }
            presence.num_messages_this_instance += 1;
            if presence.num_messages_this_instance == 1 && greet {
                presence.needs_greeting = true;
            }
            presence.is_new_account = is_new_account;
        }
        self.diagnostics.post(diagnostics::STATUS, line, id);

        if in_room {
            self.moderate(id, &message, time);
        }
    }

    pub(crate) fn process_whisper(&mut self, whisper: Whisper, _time: f64) {
        let id = whisper.user_id;
        self.refresh_identity(id, &whisper.login, &whisper.display_name);
        let Some(user) = self.users.find_by_id(id) else {
            return;
        };
        let line = format!("Whisper from {}: {}", user.display_name(), whisper.content);
        self.diagnostics.post(diagnostics::STATUS, line, id);
    }

    pub(crate) fn on_notice(&mut self, notice: Notice) {
        match notice.id {
            Some(id) => self.status(format!("Notice ({}): {}", id, notice.text)),
            None => self.status(format!("Notice: {}", notice.text)),
        }
    }

    pub(crate) fn on_clear(&mut self, clear: ModerationClear, now: f64) {
        let ClearKind::User {
            login,
            user_id,
            duration,
        } = clear.kind
        else {
            self.status(format!("Chat in #{} was cleared", clear.channel));
            return;
        };
        let id = user_id
            .filter(|id| self.users.contains(*id))
            .or_else(|| self.users.id_for_login(&login));
        let Some(id) = id else {
            self.status(format!("{} was removed from chat", login));
            return;
        };
        match duration {
            None => {
                self.users.set_banned(id, true);
                self.diagnostics
                    .post(diagnostics::STATUS, format!("{} was banned", login), id);
            }
            Some(seconds) => {
                self.users.set_timeout(id, now + seconds);
                self.diagnostics.post(
                    diagnostics::STATUS,
                    format!("{} was timed out for {} seconds", login, seconds),
                    id,
                );
            }
        }
    }

    // API calls

    pub(crate) fn post_api_call(&mut self, request: ApiRequest, handler: ApiHandler) {
        self.scheduler.post(request, handler);
    }

    /// Starts the next queued call if nothing is in flight and the cooldown has passed.
    pub(crate) fn run_api_calls(&mut self, now: f64) {
        let Some((id, mut request)) = self.scheduler.start_next(now) else {
            return;
        };
        request.client_id = self.configuration.client_id.clone();
        request.token = self.configuration.api_token().to_string();
        self.diagnostics
            .debug(format!("Twitch API call {}: {} {}", id, request.method, request.url));
        let shared = self.shared.clone();
        self.http.request(
            request,
            Box::new(move |result| {
                if let Some(shared) = shared.upgrade() {
                    shared.api_call_completed(id, result);
                }
            }),
        );
    }

    pub(crate) fn api_call_completed(&mut self, id: u64, result: Result<ApiResponse, ApiError>) {
        let now = self.clock.now();
        let Some(handler) = self.scheduler.complete(id, now) else {
            self.diagnostics
                .warning(format!("Completion for unknown Twitch API call {}", id));
            return;
        };
        let response = match result {
            Ok(response) => {
                if let (Some(limit), Some(remaining)) =
                    (response.header("Ratelimit-Limit"), response.header("Ratelimit-Remaining"))
                {
                    self.diagnostics.debug(format!(
                        "Twitch API call {}: rate limit {}, remaining {}",
                        id, limit, remaining
                    ));
                }
                if response.is_success() {
                    Some(response)
                } else {
                    self.diagnostics
                        .warning(format!("Twitch API call {} returned code {}", id, response.status));
                    None
                }
            }
            Err(e) => {
                self.diagnostics.warning(format!("Twitch API call {} failed: {}", id, e));
                None
            }
        };
        handler(self, id, response.as_ref());
        if !self.login_lookup_pending && !self.login_lookups.is_empty() {
            self.post_login_lookups();
        }
    }

    // Snapshots

    pub(crate) fn user_snapshot(&self, user: &User, now: f64) -> User {
        let mut snapshot = user.clone();
        snapshot.total_view_time += self.pending_view_time(user, now);
        snapshot.presence.is_recent_chatter = user.last_message_time > 0.0
            && now - user.last_message_time < self.configuration.recent_chat_threshold;
        snapshot
    }

    pub(crate) fn users_snapshot(&self, now: f64) -> Vec<User> {
        let mut users = Vec::with_capacity(self.users.len());
        self.users.with_all(|user| users.push(self.user_snapshot(user, now)));
        users.sort_by_key(|user| user.id);
        users
    }

    pub(crate) fn stats_snapshot(&self, now: f64) -> Stats {
        let pending: f64 = self.users.users().map(|user| self.pending_view_time(user, now)).sum();
        self.stats.snapshot(pending, self.users.len())
    }

    pub(crate) fn save_configuration(&self) {
        let state = PersistedState {
            configuration: self.configuration.clone(),
            stats: self.stats.baseline(),
        };
        if let Err(e) = state.save(&self.options.config_path) {
            self.diagnostics.error(format!(
                "Unable to save configuration to {}: {}",
                self.options.config_path.display(),
                e
            ));
        }
    }
}

use crate::bouncer::connection::ConnectionState;
use crate::bouncer::engine::Core;
use crate::bouncer::template;
use crate::diagnostics;
use crate::transport::ChatMessage;
use crate::twitch::api::requests;
use crate::users::Role;

/// First entry of `words` found in `text`, ignoring ASCII case. Empty
/// entries never match.
pub(crate) fn find_forbidden_word<'a>(text: &str, words: &'a [String]) -> Option<&'a str> {
    let text = text.to_lowercase();
    words
        .iter()
        .map(|word| word.trim())
        .filter(|word| !word.is_empty())
        .find(|word| text.contains(&word.to_lowercase()))
}

/// Whole seconds left until an account of age `age` reaches `threshold`.
pub(crate) fn new_account_timeout(threshold: f64, age: f64, cap: f64) -> u64 {
    (threshold - age).ceil().clamp(1.0, cap) as u64
}

impl Core {
    /// Applies the configured policies to a chat message whose sender is
    /// already in the directory. Each policy is evaluated on its own.
    pub(crate) fn moderate(&mut self, id: i64, message: &ChatMessage, time: f64) {
        if self.state != ConnectionState::InsideRoom {
            return;
        }
        let Some(user) = self.users.find_by_id(id) else {
            return;
        };
        let role = user.role;
        let exposed = role == Role::Pleb && !user.is_whitelisted;
        let created_at = user.created_at;
        let config = &self.configuration;

        if role == Role::Broadcaster && !config.greeting_pattern.is_empty() {
            if let Some(rest) = message.content.strip_prefix(config.greeting_pattern.as_str()) {
                let target = rest.trim().trim_start_matches('@').to_lowercase();
                self.greeted(&target);
            }
        }

        let config = &self.configuration;
        let age = time - created_at;
        if config.auto_timeout_new_account_chatters && exposed && age < config.new_account_age_threshold {
            let seconds = new_account_timeout(
                config.new_account_age_threshold,
                age,
                self.options.max_timeout_seconds,
            );
            self.clear_needs_greeting(id);
            self.send_explanation(id);
            self.send_timeout(id, seconds, time);
        }

        let title_scam = self.configuration.auto_ban_title_scammers
            && exposed
            && self
                .stream_title
                .as_deref()
                .map_or(false, |title| !title.is_empty() && message.content.contains(title));
        if title_scam {
            self.clear_needs_greeting(id);
            self.send_ban(id, Some("Stream title scam"));
        }

        if self.configuration.auto_ban_forbidden_words && exposed {
            let word = find_forbidden_word(&message.content, &self.configuration.forbidden_words).map(str::to_owned);
            if let Some(word) = word {
                self.send_ban(id, Some(&format!("Forbidden word: {}", word)));
            }
        }
    }

    fn greeted(&mut self, login: &str) {
        if let Some(target) = self.users.id_for_login(login) {
            self.clear_needs_greeting(target);
        }
    }

    pub(crate) fn clear_needs_greeting(&mut self, id: i64) {
        if let Some(presence) = self.users.presence_mut(id) {
            presence.needs_greeting = false;
        }
    }

    /// Whispers the rendered timeout explanation, through the API when the
    /// channel account's own id is known and through chat otherwise.
    fn send_explanation(&mut self, id: i64) {
        if self.configuration.new_account_chatter_timeout_explanation.is_empty() {
            return;
        }
        let Some(user) = self.users.find_by_id(id) else {
            return;
        };
        let text = template::render(&self.configuration.new_account_chatter_timeout_explanation, user);
        let login = user.login.clone();
        match self.users.id_for_login(&self.configuration.account) {
            Some(own_id) => {
                let request = requests::send_whisper(&self.options.helix_api_base, own_id, id, &text);
                self.post_api_call(
                    request,
                    Box::new(move |core, call, response| {
                        if response.is_none() {
                            core.diagnostics.post(
                                diagnostics::WARNING,
                                format!("Twitch API call {}: unable to whisper {}", call, login),
                                id,
                            );
                        }
                    }),
                );
            }
            None => self.transport.send_whisper(&login, &text),
        }
    }

    fn send_timeout(&mut self, id: i64, seconds: u64, now: f64) {
        if !self.in_room_for("time out", id) {
            return;
        }
        let Some(user) = self.users.find_by_id(id) else {
            return;
        };
        let command = format!("/timeout {} {}", user.login, seconds);
        self.transport.send_message(&self.configuration.channel, &command);
        self.users.set_timeout(id, now + seconds as f64);
        self.diagnostics.post(
            diagnostics::STATUS,
            format!("Timed out {} for {} seconds", user_label(self, id), seconds),
            id,
        );
    }

    fn send_ban(&mut self, id: i64, reason: Option<&str>) {
        if !self.in_room_for("ban", id) {
            return;
        }
        let Some(user) = self.users.find_by_id(id) else {
            return;
        };
        let command = match reason {
            Some(reason) => format!("/ban {} {}", user.login, reason),
            None => format!("/ban {}", user.login),
        };
        self.transport.send_message(&self.configuration.channel, &command);
        self.users.set_banned(id, true);
        let line = match reason {
            Some(reason) => format!("Banned {} ({})", user_label(self, id), reason),
            None => format!("Banned {}", user_label(self, id)),
        };
        self.diagnostics.post(diagnostics::STATUS, line, id);
    }

    fn in_room_for(&self, action: &str, id: i64) -> bool {
        if self.state == ConnectionState::InsideRoom {
            return true;
        }
        self.diagnostics.post(
            diagnostics::WARNING,
            format!("Cannot {} {}: not in the room", action, user_label(self, id)),
            id,
        );
        false
    }

    pub(crate) fn ban_user(&mut self, id: i64, reason: Option<&str>) {
        if self.users.contains(id) {
            self.send_ban(id, reason);
        }
    }

    pub(crate) fn unban_user(&mut self, id: i64) {
        if !self.users.contains(id) || !self.in_room_for("unban", id) {
            return;
        }
        let Some(user) = self.users.find_by_id(id) else {
            return;
        };
        let command = format!("/unban {}", user.login);
        self.transport.send_message(&self.configuration.channel, &command);
        self.users.set_banned(id, false);
        self.users.set_timeout(id, 0.0);
        self.diagnostics
            .post(diagnostics::STATUS, format!("Unbanned {}", user_label(self, id)), id);
    }

    pub(crate) fn time_out_user(&mut self, id: i64, seconds: u64, now: f64) {
        if self.users.contains(id) {
            let seconds = seconds.min(self.options.max_timeout_seconds as u64);
            self.send_timeout(id, seconds, now);
        }
    }
}

fn user_label(core: &Core, id: i64) -> String {
    core.users
        .find_by_id(id)
        .map(|user| user.display_name().to_string())
        .unwrap_or_else(|| id.to_string())
}

//! Import of users from the older single-document JSON format.

use serde::Deserialize;
use serde_json::Value;

use crate::users::{Bot, Role, User};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LegacyUser {
    id: i64,
    login: String,
    name: String,
    created_at: f64,
    total_view_time: f64,
    first_seen_time: f64,
    first_message_time: f64,
    last_message_time: f64,
    num_messages: u64,
    timeout: f64,
    is_banned: bool,
    is_whitelisted: bool,
    watching: bool,
    note: String,
    bot: Option<String>,
    role: Option<String>,
    last_chat: Vec<String>,
}

impl From<LegacyUser> for User {
    fn from(legacy: LegacyUser) -> Self {
        let bot = match legacy.bot.as_deref() {
            Some("yes") => Bot::Yes,
            Some("no") => Bot::No,
            _ => Bot::Unknown,
        };
        let role = legacy
            .role
            .as_deref()
            .and_then(|role| role.parse::<Role>().ok())
            .unwrap_or_default();
        User {
            id: legacy.id,
            login: legacy.login,
            name: legacy.name,
            created_at: legacy.created_at,
            total_view_time: legacy.total_view_time,
            first_seen_time: legacy.first_seen_time,
            first_message_time: legacy.first_message_time,
            last_message_time: legacy.last_message_time,
            num_messages: legacy.num_messages,
            timeout: legacy.timeout,
            is_banned: legacy.is_banned,
            is_whitelisted: legacy.is_whitelisted || role.is_privileged(),
            watching: legacy.watching,
            note: legacy.note,
            bot,
            role,
            last_chat: legacy.last_chat.into(),
            ..User::default()
        }
    }
}

/// Extracts users from a legacy document, which is either a bare array of
/// users or an object holding one under `users`. Entries that cannot be
/// decoded are skipped and reported in the second element.
pub fn legacy_users(document: &Value) -> (Vec<User>, usize) {
    let entries = match document {
        Value::Array(entries) => entries.as_slice(),
        Value::Object(fields) => match fields.get("users") {
            Some(Value::Array(entries)) => entries.as_slice(),
            _ => &[],
        },
        _ => &[],
    };
    let mut users = Vec::with_capacity(entries.len());
    let mut skipped = 0;
    for entry in entries {
        match LegacyUser::deserialize(entry) {
            Ok(legacy) if legacy.id != 0 => users.push(User::from(legacy)),
            _ => skipped += 1,
        }
    }
    (users, skipped)
}

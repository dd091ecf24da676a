use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Unknown,
    Pleb,
    #[serde(rename = "vip")]
    VIP,
    Moderator,
    Broadcaster,
    Admin,
    Staff,
}

impl Role {
    /// Privileged roles are exempt from automatic moderation.
    pub fn is_privileged(self) -> bool {
        !matches!(self, Role::Unknown | Role::Pleb)
    }

    pub fn from_badge(badge: &str) -> Option<Role> {
        match badge {
            "vip" => Some(Role::VIP),
            "moderator" => Some(Role::Moderator),
            "broadcaster" => Some(Role::Broadcaster),
            "admin" => Some(Role::Admin),
            "staff" => Some(Role::Staff),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Role::Unknown => 0,
            Role::Pleb => 1,
            Role::VIP => 2,
            Role::Moderator => 3,
            Role::Broadcaster => 4,
            Role::Admin => 5,
            Role::Staff => 6,
        }
    }

    pub fn from_code(code: i64) -> Role {
        match code {
            1 => Role::Pleb,
            2 => Role::VIP,
            3 => Role::Moderator,
            4 => Role::Broadcaster,
            5 => Role::Admin,
            6 => Role::Staff,
            _ => Role::Unknown,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Role::Unknown => write!(f, "unknown"),
            Role::Pleb => write!(f, "pleb"),
            Role::VIP => write!(f, "vip"),
            Role::Moderator => write!(f, "moderator"),
            Role::Broadcaster => write!(f, "broadcaster"),
            Role::Admin => write!(f, "admin"),
            Role::Staff => write!(f, "staff"),
        }
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "staff" => Ok(Role::Staff),
            "admin" => Ok(Role::Admin),
            "broadcaster" => Ok(Role::Broadcaster),
            "moderator" => Ok(Role::Moderator),
            "vip" => Ok(Role::VIP),
            "pleb" => Ok(Role::Pleb),
            "unknown" => Ok(Role::Unknown),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bot {
    #[default]
    Unknown,
    Yes,
    No,
}

impl Bot {
    pub fn code(self) -> i64 {
        match self {
            Bot::Unknown => 0,
            Bot::Yes => 1,
            Bot::No => 2,
        }
    }

    pub fn from_code(code: i64) -> Bot {
        match code {
            1 => Bot::Yes,
            2 => Bot::No,
            _ => Bot::Unknown,
        }
    }
}

/// Per-run state of a user; never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Presence {
    pub is_joined: bool,
    pub join_time: f64,
    pub part_time: f64,
    pub first_message_time_this_instance: f64,
    pub num_messages_this_instance: u64,
    pub is_recent_chatter: bool,
    pub is_new_account: bool,
    pub needs_greeting: bool,
    /// Point up to which this user's view time has been accrued.
    pub(crate) view_time_mark: f64,
}

/// A single chat participant known by the bouncer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub login: String,
    pub name: String,
    pub created_at: f64,
    pub first_seen_time: f64,
    pub first_message_time: f64,
    pub last_message_time: f64,
    pub num_messages: u64,
    pub total_view_time: f64,
    pub timeout: f64,
    pub is_banned: bool,
    pub is_whitelisted: bool,
    pub bot: Bot,
    pub role: Role,
    pub note: String,
    pub last_chat: VecDeque<String>,
    pub watching: bool,
    #[serde(skip)]
    pub presence: Presence,
}

impl User {
    pub fn new(id: i64, login: impl Into<String>) -> Self {
        Self {
            id,
            login: login.into(),
            ..Self::default()
        }
    }

    pub fn is_bot(&self) -> bool {
        self.bot == Bot::Yes
    }

    /// Display name if one is known, otherwise the login.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.login
        } else {
            &self.name
        }
    }
}

/// A change to one persistent attribute of a user.
#[derive(Debug, Clone, PartialEq)]
pub enum UserUpdate {
    Bot(Bot),
    CreatedAt(f64),
    FirstMessageTime(f64),
    FirstSeenTime(f64),
    IsBanned(bool),
    IsWhitelisted(bool),
    LastMessageTime(f64),
    Login(String),
    Name(String),
    Note(String),
    NumMessages(u64),
    Role(Role),
    Timeout(f64),
    TotalViewTime(f64),
    Watching(bool),
}

impl UserUpdate {
    /// Name of the persistent column this update touches.
    pub fn column(&self) -> &'static str {
        match self {
            UserUpdate::Bot(_) => "bot",
            UserUpdate::CreatedAt(_) => "createdAt",
            UserUpdate::FirstMessageTime(_) => "firstMessageTime",
            UserUpdate::FirstSeenTime(_) => "firstSeenTime",
            UserUpdate::IsBanned(_) => "isBanned",
            UserUpdate::IsWhitelisted(_) => "isWhitelisted",
            UserUpdate::LastMessageTime(_) => "lastMessageTime",
            UserUpdate::Login(_) => "login",
            UserUpdate::Name(_) => "name",
            UserUpdate::Note(_) => "note",
            UserUpdate::NumMessages(_) => "numMessages",
            UserUpdate::Role(_) => "role",
            UserUpdate::Timeout(_) => "timeout",
            UserUpdate::TotalViewTime(_) => "totalViewTime",
            UserUpdate::Watching(_) => "watching",
        }
    }

    pub fn apply(&self, user: &mut User) {
        match self {
            UserUpdate::Bot(bot) => user.bot = *bot,
            UserUpdate::CreatedAt(time) => user.created_at = *time,
            UserUpdate::FirstMessageTime(time) => user.first_message_time = *time,
            UserUpdate::FirstSeenTime(time) => user.first_seen_time = *time,
            UserUpdate::IsBanned(banned) => user.is_banned = *banned,
            UserUpdate::IsWhitelisted(whitelisted) => user.is_whitelisted = *whitelisted,
            UserUpdate::LastMessageTime(time) => user.last_message_time = *time,
            UserUpdate::Login(login) => user.login = login.clone(),
            UserUpdate::Name(name) => user.name = name.clone(),
            UserUpdate::Note(note) => user.note = note.clone(),
            UserUpdate::NumMessages(count) => user.num_messages = *count,
            UserUpdate::Role(role) => user.role = *role,
            UserUpdate::Timeout(time) => user.timeout = *time,
            UserUpdate::TotalViewTime(time) => user.total_view_time = *time,
            UserUpdate::Watching(watching) => user.watching = *watching,
        }
    }
}

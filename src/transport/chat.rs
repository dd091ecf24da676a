use std::sync::Arc;

/// A user entering or leaving the channel. `user` is a login.
#[derive(Debug, Clone, PartialEq)]
pub struct Membership {
    pub channel: String,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NameList {
    pub channel: String,
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatMessage {
    pub channel: String,
    pub user_id: i64,
    pub login: String,
    pub display_name: String,
    /// Badge names in the order the service sent them, e.g. `moderator`.
    pub badges: Vec<String>,
    pub content: String,
    pub is_action: bool,
    pub message_id: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Whisper {
    pub user_id: i64,
    pub login: String,
    pub display_name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub channel: Option<String>,
    pub id: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClearKind {
    /// All chat in the channel was cleared.
    All,
    /// A user was banned (`duration` is `None`) or timed out.
    User {
        login: String,
        user_id: Option<i64>,
        duration: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModerationClear {
    pub channel: String,
    pub kind: ClearKind,
}

/// Callbacks a chat transport delivers. Implementations may be invoked from
/// any thread but never from inside a [`ChatTransport`] method call.
pub trait ChatEvents: Send + Sync {
    fn logged_in(&self);
    fn logged_out(&self);
    /// The service asked us to reconnect; a logout will follow.
    fn doom(&self);
    fn joined(&self, membership: Membership);
    fn left(&self, membership: Membership);
    fn name_list(&self, names: NameList);
    fn message(&self, message: ChatMessage);
    fn whisper(&self, whisper: Whisper);
    fn notice(&self, notice: Notice);
    fn clear(&self, clear: ModerationClear);
}

/// The chat session collaborator. All operations are fire-and-forget.
pub trait ChatTransport: Send + Sync {
    fn log_in(&self, account: &str, token: &str, events: Arc<dyn ChatEvents>);
    fn log_out(&self, farewell: &str);
    fn join(&self, channel: &str);
    fn leave(&self, channel: &str);
    fn send_message(&self, channel: &str, message: &str);
    fn send_whisper(&self, login: &str, message: &str);
}

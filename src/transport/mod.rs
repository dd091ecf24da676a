//! Interfaces to the chat and HTTP collaborators the bouncer drives.

pub mod chat;
pub mod http;

pub use chat::{ChatEvents, ChatMessage, ChatTransport, ClearKind, Membership, ModerationClear, NameList, Notice, Whisper};
pub use http::{ApiCompletion, ApiError, ApiFamily, ApiRequest, ApiResponse, HttpClient, Method};

//! Production collaborators talking to Twitch.

pub mod api;
pub mod irc;

pub use api::ReqwestHttpClient;
pub use irc::TwitchIrcTransport;

pub mod client;
pub mod message_handler;

pub use client::TwitchIrcTransport;

use log::{debug, trace};
use twitch_irc::message::{ClearChatAction, IRCMessage, ServerMessage};

use crate::transport::{ChatEvents, ChatMessage, ClearKind, Membership, ModerationClear, NameList, Notice, Whisper};

const RPL_NAMREPLY: &str = "353";

fn parse_id(id: &str) -> i64 {
    id.parse().unwrap_or(0)
}

fn strip_channel(channel: &str) -> String {
    channel.trim_start_matches('#').to_string()
}

/// Translates one message from the IRC connection into a [`ChatEvents`] call.
pub fn dispatch(events: &dyn ChatEvents, message: ServerMessage) {
    trace!("IRC: {:?}", message);
    match message {
        ServerMessage::GlobalUserState(state) => {
            debug!("Logged in as {} ({})", state.user_name, state.user_id);
            events.logged_in();
        }
        ServerMessage::Reconnect(_) => events.doom(),
        ServerMessage::Join(join) => events.joined(Membership {
            channel: join.channel_login,
            user: join.user_login,
        }),
        ServerMessage::Part(part) => events.left(Membership {
            channel: part.channel_login,
            user: part.user_login,
        }),
        ServerMessage::Privmsg(msg) => events.message(ChatMessage {
            channel: msg.channel_login,
            user_id: parse_id(&msg.sender.id),
            login: msg.sender.login,
            display_name: msg.sender.name,
            badges: msg.badges.into_iter().map(|badge| badge.name).collect(),
            content: msg.message_text,
            is_action: msg.is_action,
            message_id: msg.message_id,
        }),
        ServerMessage::Whisper(whisper) => events.whisper(Whisper {
            user_id: parse_id(&whisper.sender.id),
            login: whisper.sender.login,
            display_name: whisper.sender.name,
            content: whisper.message_text,
        }),
        ServerMessage::Notice(notice) => events.notice(Notice {
            channel: notice.channel_login,
            id: notice.message_id,
            text: notice.message_text,
        }),
        ServerMessage::ClearChat(clear) => {
            let kind = match clear.action {
                ClearChatAction::ChatCleared => ClearKind::All,
                ClearChatAction::UserBanned { user_login, user_id } => ClearKind::User {
                    login: user_login,
                    user_id: Some(parse_id(&user_id)),
                    duration: None,
                },
                ClearChatAction::UserTimedOut {
                    user_login,
                    user_id,
                    timeout_length,
                } => ClearKind::User {
                    login: user_login,
                    user_id: Some(parse_id(&user_id)),
                    duration: Some(timeout_length.as_secs_f64()),
                },
            };
            events.clear(ModerationClear {
                channel: clear.channel_login,
                kind,
            });
        }
        other => {
            let source = IRCMessage::from(other);
            if source.command == RPL_NAMREPLY {
                // :server 353 <nick> = #channel :name1 name2 ...
                if let (Some(channel), Some(names)) = (source.params.get(2), source.params.get(3)) {
                    events.name_list(NameList {
                        channel: strip_channel(channel),
                        names: names.split_whitespace().map(str::to_string).collect(),
                    });
                }
            }
        }
    }
}

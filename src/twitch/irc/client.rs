use std::sync::{Arc, Weak};

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use twitch_irc::login::StaticLoginCredentials;
use twitch_irc::message::{IRCMessage, ServerMessage};
use twitch_irc::{ClientConfig, SecureTCPTransport, TwitchIRCClient};

use crate::transport::{ChatEvents, ChatTransport};
use crate::twitch::irc::message_handler::dispatch;

pub type TwitchIRCClientType = TwitchIRCClient<SecureTCPTransport, StaticLoginCredentials>;

struct Session {
    client: Arc<TwitchIRCClientType>,
    forwarder: JoinHandle<()>,
}

/// [`ChatTransport`] over a twitch-irc connection on a tokio runtime.
///
/// Logging out drops the client, which ends its message stream; the
/// forwarding task then reports the logout.
pub struct TwitchIrcTransport {
    runtime: Handle,
    session: Mutex<Option<Session>>,
}

impl TwitchIrcTransport {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            session: Mutex::new(None),
        }
    }

    fn client(&self) -> Option<Arc<TwitchIRCClientType>> {
        self.session.lock().as_ref().map(|session| Arc::clone(&session.client))
    }

    fn privmsg(&self, channel: &str, message: &str) {
        let Some(client) = self.client() else {
            warn!("Not connected; dropping message to #{}", channel);
            return;
        };
        let channel = channel.to_string();
        let message = message.to_string();
        self.runtime.spawn(async move {
            if let Err(e) = client.privmsg(channel, message).await {
                error!("Error sending message: {:?}", e);
            }
        });
    }
}

/// Hands each incoming message to `events` in order, then reports the
/// logout once the stream ends. Callbacks take the bouncer's lock, so they run
/// on the blocking pool instead of a runtime worker.
async fn forward(events: Arc<dyn ChatEvents>, mut incoming: UnboundedReceiver<ServerMessage>) {
    while let Some(message) = incoming.recv().await {
        let events = Arc::clone(&events);
        if tokio::task::spawn_blocking(move || dispatch(events.as_ref(), message))
            .await
            .is_err()
        {
            error!("IRC event handler panicked");
        }
    }
    debug!("IRC message stream ended");
    if tokio::task::spawn_blocking(move || events.logged_out()).await.is_err() {
        error!("IRC logout handler panicked");
    }
}

impl ChatTransport for TwitchIrcTransport {
    fn log_in(&self, account: &str, token: &str, events: Arc<dyn ChatEvents>) {
        let mut session = self.session.lock();
        if let Some(previous) = session.take() {
            warn!("Replacing existing IRC session");
            previous.forwarder.abort();
        }

        let token = token.trim_start_matches("oauth:").to_string();
        let client_config = ClientConfig::new_simple(StaticLoginCredentials::new(account.to_string(), Some(token)));
        let _guard = self.runtime.enter();
        let (mut incoming_messages, client) = TwitchIRCClientType::new(client_config);
        let client = Arc::new(client);
        let connecting: Weak<TwitchIRCClientType> = Arc::downgrade(&client);

        info!("Connecting to Twitch IRC as {}", account);
        let forwarder = self.runtime.spawn(async move {
            if let Some(client) = connecting.upgrade() {
                client.connect().await;
            }
            forward(events, incoming_messages).await;
        });

        *session = Some(Session { client, forwarder });
    }

    fn log_out(&self, farewell: &str) {
        let Some(session) = self.session.lock().take() else {
            return;
        };
        let quit = IRCMessage::new_simple("QUIT".to_string(), vec![farewell.to_string()]);
        self.runtime.spawn(async move {
            if let Err(e) = session.client.send_message(quit).await {
                warn!("Error sending QUIT: {:?}", e);
            }
            // The forwarder finishes once the last client handle is gone.
            drop(session.client);
        });
    }

    fn join(&self, channel: &str) {
        let Some(client) = self.client() else {
            warn!("Not connected; cannot join #{}", channel);
            return;
        };
        if let Err(e) = client.join(channel.to_string()) {
            error!("Invalid channel name {}: {}", channel, e);
        }
    }

    fn leave(&self, channel: &str) {
        if let Some(client) = self.client() {
            client.part(channel.to_string());
        }
    }

    fn send_message(&self, channel: &str, message: &str) {
        self.privmsg(channel, message);
    }

    fn send_whisper(&self, login: &str, message: &str) {
        let command = format!("/w {} {}", login, message);
        let Some(client) = self.client() else {
            warn!("Not connected; dropping whisper to {}", login);
            return;
        };
        // Whispers over chat go through the service's own pseudo-channel.
        self.runtime.spawn(async move {
            if let Err(e) = client.privmsg("jtv".to_string(), command).await {
                error!("Error sending whisper: {:?}", e);
            }
        });
    }
}

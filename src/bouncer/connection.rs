use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bouncer::engine::Core;
use crate::transport::Membership;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Account, token, client id or channel is missing.
    #[default]
    Unconfigured,
    Unconnected,
    Connecting,
    OutsideRoom,
    InsideRoom,
}

impl ConnectionState {
    pub fn is_logged_in(self) -> bool {
        matches!(self, ConnectionState::OutsideRoom | ConnectionState::InsideRoom)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectionState::Unconfigured => write!(f, "unconfigured"),
            ConnectionState::Unconnected => write!(f, "unconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::OutsideRoom => write!(f, "outside room"),
            ConnectionState::InsideRoom => write!(f, "inside room"),
        }
    }
}

/// Tracks login attempts and uptime of the chat session.
#[derive(Debug, Default)]
pub struct ConnectionMonitor {
    last_connected: Option<f64>,
    pub(crate) attempts_since_connect: u32,
    pub(crate) disconnection_count: u32,
    pub(crate) total_uptime: f64,
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the attempt number, starting at 1 after every successful login.
    pub fn on_attempt(&mut self) -> u32 {
        self.attempts_since_connect += 1;
        self.attempts_since_connect
    }

    pub fn on_connect(&mut self, now: f64) -> String {
        self.attempts_since_connect = 0;
        self.last_connected = Some(now);
        format!(
            "Logged in. Total uptime: {}, Disconnection count: {}",
            format_duration(self.total_uptime),
            self.disconnection_count
        )
    }

    pub fn on_disconnect(&mut self, now: f64) -> String {
        self.disconnection_count += 1;
        if let Some(last) = self.last_connected.take() {
            self.total_uptime += (now - last).max(0.0);
        }
        format!(
            "Logged out. Total uptime: {}, Disconnection count: {}",
            format_duration(self.total_uptime),
            self.disconnection_count
        )
    }
}

pub fn format_duration(seconds: f64) -> String {
    let seconds = seconds.max(0.0) as u64;
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let seconds = seconds % 60;
    format!("{}h {}m {}s", hours, minutes, seconds)
}

impl Core {
    /// Re-evaluates whether a login should be attempted after the
    /// configuration changed.
    pub(crate) fn check_configuration(&mut self) {
        self.diagnostics.set_min_level(self.configuration.min_diagnostics_level);
        if self.configuration.is_configured() {
            if matches!(self.state, ConnectionState::Unconfigured | ConnectionState::Unconnected) {
                self.log_in();
            }
        } else if self.state != ConnectionState::Unconfigured {
            self.state = ConnectionState::Unconfigured;
            self.status("Configuration incomplete, not connecting");
        }
    }

    pub(crate) fn log_in(&mut self) {
        let attempt = self.monitor.on_attempt();
        self.state = ConnectionState::Connecting;
        self.logged_out = false;
        if attempt > 1 {
            self.status(format!("Logging in as {} (attempt {})", self.configuration.account, attempt));
        } else {
            self.status(format!("Logging in as {}", self.configuration.account));
        }
        let events = self.relay();
        self.transport
            .log_in(&self.configuration.account, &self.configuration.token, events);
    }

    pub(crate) fn on_logged_in(&mut self, now: f64) {
        if self.state != ConnectionState::Connecting {
            return;
        }
        self.state = ConnectionState::OutsideRoom;
        let report = self.monitor.on_connect(now);
        self.status(report);
        self.transport.join(&self.configuration.channel);
    }

    pub(crate) fn on_logged_out(&mut self, now: f64) {
        self.logged_out = true;
        self.part_all(now);
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::OutsideRoom | ConnectionState::InsideRoom
        ) {
            self.state = ConnectionState::Unconnected;
            self.next_reconnect = now + self.options.reconnect_cooldown;
            let report = self.monitor.on_disconnect(now);
            self.status(report);
        }
    }

    pub(crate) fn on_doom(&mut self) {
        self.status("Chat server requested a reconnect");
    }

    pub(crate) fn on_joined(&mut self, membership: Membership, now: f64) {
        if !self.is_self(&membership.user) {
            self.users_joined(&[membership.user], now);
            return;
        }
        if !self.state.is_logged_in() {
            return;
        }
        self.state = ConnectionState::InsideRoom;
        self.part_all(now);
        self.status(format!("Joined #{}", membership.channel));
        self.next_stream_check = now;
        self.post_self_lookup();
    }

    pub(crate) fn on_left(&mut self, membership: Membership, now: f64) {
        if !self.is_self(&membership.user) {
            self.forget_login_join(&membership.user);
            if let Some(id) = self.users.id_for_login(&membership.user) {
                self.user_parted(id, now);
            }
            return;
        }
        if self.state == ConnectionState::InsideRoom {
            self.state = ConnectionState::OutsideRoom;
        }
        self.part_all(now);
        self.status(format!("Left #{}", membership.channel));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_accumulates_across_sessions() {
        let mut monitor = ConnectionMonitor::new();
        assert_eq!(monitor.on_attempt(), 1);
        assert_eq!(monitor.on_attempt(), 2);
        monitor.on_connect(100.0);
        assert_eq!(monitor.on_attempt(), 1);
        let report = monitor.on_disconnect(3761.0);
        assert_eq!(report, "Logged out. Total uptime: 1h 1m 1s, Disconnection count: 1");
    }
}

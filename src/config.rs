use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Unable to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unable to encode configuration: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// Settings the operator can adjust at runtime; persisted alongside the stats baseline.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Configuration {
    pub account: String,
    pub token: String,
    pub client_id: String,
    pub channel: String,
    pub greeting_pattern: String,
    pub new_account_chatter_timeout_explanation: String,
    pub new_account_age_threshold: f64,
    pub recent_chat_threshold: f64,
    pub min_diagnostics_level: usize,
    pub auto_timeout_new_account_chatters: bool,
    pub auto_ban_title_scammers: bool,
    pub auto_ban_forbidden_words: bool,
    pub forbidden_words: Vec<String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            account: String::new(),
            token: String::new(),
            client_id: String::new(),
            channel: String::new(),
            greeting_pattern: String::new(),
            new_account_chatter_timeout_explanation: String::new(),
            new_account_age_threshold: 604800.0,
            recent_chat_threshold: 1800.0,
            min_diagnostics_level: 0,
            auto_timeout_new_account_chatters: false,
            auto_ban_title_scammers: false,
            auto_ban_forbidden_words: false,
            forbidden_words: Vec::new(),
        }
    }
}

impl Configuration {
    pub fn is_configured(&self) -> bool {
        !self.account.is_empty()
            && !self.token.is_empty()
            && !self.client_id.is_empty()
            && !self.channel.is_empty()
    }

    /// The token without the `oauth:` prefix chat logins expect.
    pub fn api_token(&self) -> &str {
        self.token.trim_start_matches("oauth:")
    }
}

/// Accumulated statistics that survive restarts.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct StatsBaseline {
    pub total_view_time: f64,
    pub max_viewer_count: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct PersistedState {
    pub configuration: Configuration,
    pub stats: StatsBaseline,
}

impl PersistedState {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let encoded = toml::to_string_pretty(self)?;
        fs::write(path, encoded)?;
        Ok(())
    }
}

/// Constants injected into the bouncer at construction.
#[derive(Debug, Clone)]
pub struct BouncerOptions {
    pub config_path: PathBuf,
    pub legacy_import_path: Option<PathBuf>,
    pub api_lookup_cooldown: f64,
    pub config_autosave_cooldown: f64,
    pub reconnect_cooldown: f64,
    pub stream_check_cooldown: f64,
    pub max_logins_per_lookup: usize,
    pub max_chat_lines: usize,
    pub max_timeout_seconds: f64,
    pub logout_wait_seconds: f64,
    pub legacy_api_base: String,
    pub helix_api_base: String,
}

impl Default for BouncerOptions {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("bouncer.toml"),
            legacy_import_path: None,
            api_lookup_cooldown: 1.0,
            config_autosave_cooldown: 60.0,
            reconnect_cooldown: 5.0,
            stream_check_cooldown: 60.0,
            max_logins_per_lookup: 100,
            max_chat_lines: 10,
            max_timeout_seconds: 1_209_600.0,
            logout_wait_seconds: 1.0,
            legacy_api_base: "https://api.twitch.tv/kraken".to_string(),
            helix_api_base: "https://api.twitch.tv/helix".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_only_when_credentials_and_channel_are_present() {
        let mut configuration = Configuration {
            account: "bouncerbot".into(),
            token: "oauth:abc".into(),
            client_id: "client".into(),
            channel: "somechannel".into(),
            ..Configuration::default()
        };
        assert!(configuration.is_configured());
        assert_eq!(configuration.api_token(), "abc");
        configuration.client_id.clear();
        assert!(!configuration.is_configured());
    }

    #[test]
    fn state_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bouncer.toml");
        let state = PersistedState {
            configuration: Configuration {
                account: "bouncerbot".into(),
                greeting_pattern: "!greet ".into(),
                auto_ban_forbidden_words: true,
                forbidden_words: vec!["spam".into(), "scam".into()],
                min_diagnostics_level: 3,
                ..Configuration::default()
            },
            stats: StatsBaseline {
                total_view_time: 1234.5,
                max_viewer_count: 17,
            },
        };
        state.save(&path).unwrap();
        assert_eq!(PersistedState::load(&path).unwrap(), state);
    }

    #[test]
    fn partial_documents_fill_in_defaults() {
        let state: PersistedState = toml::from_str("[configuration]\nchannel = \"abc\"\n").unwrap();
        assert_eq!(state.configuration.channel, "abc");
        assert_eq!(state.configuration.new_account_age_threshold, 604800.0);
        assert_eq!(state.stats, StatsBaseline::default());
    }
}

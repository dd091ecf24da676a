use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bouncer::clock::SystemClock;
use bouncer::config::PersistedState;
use bouncer::diagnostics;
use bouncer::storage::{JsonUserStore, SqliteUserStore, UserStore};
use bouncer::transport::{ApiCompletion, ApiRequest, ChatEvents, ChatTransport, HttpClient};
use bouncer::{Bot, Bouncer, BouncerOptions, Collaborators, ConnectionState, Host, Role};
use parking_lot::Mutex;
use serde_json::json;

struct IdleTransport;

impl ChatTransport for IdleTransport {
    fn log_in(&self, _account: &str, _token: &str, _events: Arc<dyn ChatEvents>) {}
    fn log_out(&self, _farewell: &str) {}
    fn join(&self, _channel: &str) {}
    fn leave(&self, _channel: &str) {}
    fn send_message(&self, _channel: &str, _message: &str) {}
    fn send_whisper(&self, _login: &str, _message: &str) {}
}

struct IdleHttp;

impl HttpClient for IdleHttp {
    fn request(&self, _request: ApiRequest, _on_complete: ApiCompletion) {}
}

#[derive(Default)]
struct RecordingHost {
    messages: Mutex<Vec<(usize, String, i64)>>,
}

impl Host for RecordingHost {
    fn status_message(&self, level: usize, message: &str, user_id: i64) {
        self.messages.lock().push((level, message.to_string(), user_id));
    }
}

fn start(dir: &Path, store: Box<dyn UserStore>, import: bool) -> (Bouncer, Arc<RecordingHost>) {
    let options = BouncerOptions {
        config_path: dir.join("bouncer.toml"),
        legacy_import_path: import.then(|| dir.join("legacy.json")),
        ..BouncerOptions::default()
    };
    let mut bouncer = Bouncer::new(
        options,
        Collaborators {
            transport: Arc::new(IdleTransport),
            http: Arc::new(IdleHttp),
            store,
            clock: Arc::new(SystemClock),
        },
    );
    let host = Arc::new(RecordingHost::default());
    bouncer.start(host.clone());
    (bouncer, host)
}

fn wait_for_users(bouncer: &Bouncer, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while bouncer.users().len() < count {
        assert!(Instant::now() < deadline, "users never loaded");
        thread::sleep(Duration::from_millis(10));
    }
}

fn write_legacy_document(dir: &Path) {
    let last_chat: Vec<String> = (0..12).map(|i| format!("m{}", i)).collect();
    let document = json!({
        "users": [
            {
                "id": 1,
                "login": "alice",
                "name": "Alice",
                "createdAt": 1_400_000_000.0,
                "totalViewTime": 120.5,
                "numMessages": 3,
                "role": "moderator",
                "bot": "no",
                "note": "regular",
                "lastChat": last_chat,
            },
            {"id": 2, "login": "bob", "bot": "yes"},
            {"id": 0, "login": "nobody"},
        ]
    });
    std::fs::write(dir.join("legacy.json"), document.to_string()).unwrap();
}

fn survives_restart(open_store: impl Fn(&Path) -> Box<dyn UserStore>) {
    let dir = tempfile::tempdir().unwrap();
    write_legacy_document(dir.path());

    let (mut bouncer, _) = start(dir.path(), open_store(dir.path()), true);
    wait_for_users(&bouncer, 2);
    assert_eq!(bouncer.connection_state(), ConnectionState::Unconfigured);

    let alice = bouncer.user_by_login("alice").unwrap();
    assert_eq!(alice.role, Role::Moderator);
    assert!(alice.is_whitelisted);
    assert_eq!(alice.last_chat.len(), 10);
    assert_eq!(alice.last_chat.front().map(String::as_str), Some("m2"));

    bouncer.set_note(2, "known bot");
    bouncer.whitelist(2);
    bouncer.ban(2, None);
    bouncer.stop();
    drop(bouncer);
    assert!(dir.path().join("bouncer.toml").exists());

    let (mut bouncer, host) = start(dir.path(), open_store(dir.path()), false);
    wait_for_users(&bouncer, 2);
    let alice = bouncer.user(1).unwrap();
    assert_eq!(alice.name, "Alice");
    assert_eq!(alice.total_view_time, 120.5);
    assert_eq!(alice.num_messages, 3);
    assert_eq!(alice.note, "regular");
    assert_eq!(alice.bot, Bot::No);
    let chat: Vec<&str> = alice.last_chat.iter().map(String::as_str).collect();
    assert_eq!(chat, vec!["m2", "m3", "m4", "m5", "m6", "m7", "m8", "m9", "m10", "m11"]);

    let bob = bouncer.user(2).unwrap();
    assert_eq!(bob.note, "known bot");
    assert!(bob.is_whitelisted);
    assert!(bob.is_bot());
    assert!(!bob.is_banned);
    bouncer.stop();

    assert!(host
        .messages
        .lock()
        .iter()
        .any(|(_, message, _)| message == "Loaded 2 users"));
}

#[test]
fn json_store_survives_restart() {
    survives_restart(|dir| Box::new(JsonUserStore::new(dir.join("users.json"))));
}

#[test]
fn sqlite_store_survives_restart() {
    survives_restart(|dir| Box::new(SqliteUserStore::new(dir.join("users.db"))));
}

#[test]
fn unreadable_configuration_is_set_aside() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bouncer.toml"), "account = [not toml").unwrap();
    let (mut bouncer, host) = start(dir.path(), Box::new(JsonUserStore::new(dir.path().join("users.json"))), false);
    assert!(!bouncer.configuration().is_configured());
    bouncer.stop();

    assert!(dir.path().join("bouncer.toml.corrupt").exists());
    let saved = PersistedState::load(&dir.path().join("bouncer.toml")).unwrap();
    assert_eq!(saved.configuration, bouncer.configuration());
    assert!(host
        .messages
        .lock()
        .iter()
        .any(|(level, message, _)| *level == diagnostics::ERROR
            && message.starts_with("Unable to load configuration")));
}

#[test]
fn unreadable_database_is_set_aside() {
    let dir = tempfile::tempdir().unwrap();
    let database = dir.path().join("users.db");
    std::fs::write(&database, "this is not a database, just some text that is long enough to look like one").unwrap();

    let (mut bouncer, host) = start(dir.path(), Box::new(SqliteUserStore::new(&database)), false);
    let deadline = Instant::now() + Duration::from_secs(5);
    while !host.messages.lock().iter().any(|(_, message, _)| message.starts_with("Loaded")) {
        assert!(Instant::now() < deadline, "store never opened");
        thread::sleep(Duration::from_millis(10));
    }
    bouncer.stop();

    assert!(dir.path().join("users.db.corrupt").exists());
    let messages = host.messages.lock();
    assert!(messages.iter().any(|(_, message, _)| message == "Loaded 0 users"));
    assert!(!messages
        .iter()
        .any(|(_, message, _)| message.starts_with("Unable to open user store")));
}

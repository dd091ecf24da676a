use std::path::PathBuf;
use std::sync::Arc;

use bouncer::clock::SystemClock;
use bouncer::diagnostics::{self, Host};
use bouncer::logging::setup_logging;
use bouncer::storage::{JsonUserStore, SqliteUserStore, UserStore};
use bouncer::twitch::{ReqwestHttpClient, TwitchIrcTransport};
use bouncer::{Bouncer, BouncerOptions, Collaborators};
use clap::Parser;
use log::{info, warn, LevelFilter};
use tokio::runtime::Handle;

#[derive(Parser, Debug)]
#[command(name = "bouncer", version, about = "Twitch chat moderation and viewer statistics")]
struct Cli {
    /// Configuration and statistics file.
    #[arg(long, default_value = "bouncer.toml")]
    config: PathBuf,

    /// SQLite database holding the user directory.
    #[arg(long, default_value = "bouncer.db")]
    database: PathBuf,

    /// Keep users in a JSON document instead of the database.
    #[arg(long)]
    json_store: Option<PathBuf>,

    /// Legacy users document to import on start.
    #[arg(long)]
    import_legacy: Option<PathBuf>,

    #[arg(long)]
    log_file: Option<PathBuf>,

    /// error, warn, info, debug or trace.
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Prints status messages as a running feed on stdout.
struct ConsoleHost;

impl Host for ConsoleHost {
    fn status_message(&self, level: usize, message: &str, _user_id: i64) {
        if level >= diagnostics::WARNING {
            println!("[{}] {}", diagnostics::log_level(level), message);
        } else {
            println!("{}", message);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let level = cli.log_level.parse().unwrap_or(LevelFilter::Info);
    setup_logging(level, cli.log_file.as_deref())?;

    let store: Box<dyn UserStore> = match &cli.json_store {
        Some(path) => Box::new(JsonUserStore::new(path)),
        None => Box::new(SqliteUserStore::new(&cli.database)),
    };
    let options = BouncerOptions {
        config_path: cli.config.clone(),
        legacy_import_path: cli.import_legacy,
        ..BouncerOptions::default()
    };
    let runtime = Handle::current();
    let collaborators = Collaborators {
        transport: Arc::new(TwitchIrcTransport::new(runtime.clone())),
        http: Arc::new(ReqwestHttpClient::new(runtime)),
        store,
        clock: Arc::new(SystemClock),
    };

    let mut bouncer = Bouncer::new(options, collaborators);
    if !bouncer.configuration().is_configured() {
        warn!(
            "Account, token, client id and channel must be set in {} before connecting",
            cli.config.display()
        );
    }
    bouncer.start(Arc::new(ConsoleHost));
    info!("Bouncer running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    tokio::task::spawn_blocking(move || bouncer.stop()).await?;

    Ok(())
}

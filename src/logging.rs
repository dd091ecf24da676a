use std::path::Path;

use colored::Colorize;
use log::{Level, LevelFilter};

// Dependencies that are too chatty below warn.
const QUIET_TARGETS: [&str; 4] = ["twitch_irc", "reqwest", "hyper", "rustls"];

fn colored_level(level: Level) -> String {
    match level {
        Level::Error => "ERROR".red().bold().to_string(),
        Level::Warn => "WARN".yellow().to_string(),
        Level::Info => "INFO".green().to_string(),
        Level::Debug => "DEBUG".blue().to_string(),
        Level::Trace => "TRACE".dimmed().to_string(),
    }
}

/// Installs the process logger: coloured lines on stderr, and a plain copy in
/// `log_file` when one is given.
pub fn setup_logging(level: LevelFilter, log_file: Option<&Path>) -> Result<(), fern::InitError> {
    let mut dispatch = fern::Dispatch::new().level(level);
    for target in QUIET_TARGETS {
        dispatch = dispatch.level_for(target, LevelFilter::Warn.min(level));
    }

    let console = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} {} [{}] {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                colored_level(record.level()),
                record.target(),
                message
            ))
        })
        .chain(std::io::stderr());
    dispatch = dispatch.chain(console);

    if let Some(path) = log_file {
        let file = fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "{} {:<5} [{}] {}",
                    chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                    record.level(),
                    record.target(),
                    message
                ))
            })
            .chain(fern::log_file(path)?);
        dispatch = dispatch.chain(file);
    }

    dispatch.apply()?;
    Ok(())
}

use crate::error::{Result, SyncError};
use log::LevelFilter;
use simplelog::{Config, WriteLogger};
use std::fs::{self, OpenOptions};
use std::io::{Error, ErrorKind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

static INIT: Once = Once::new();
static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Directory holding `app.log`: `$HOME/.local/share/beatsyncrs/logs`
pub fn log_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| Error::new(ErrorKind::NotFound, "HOME environment variable not set"))?;

    Ok(PathBuf::from(home)
        .join(".local")
        .join("share")
        .join("beatsyncrs")
        .join("logs"))
}

/// Log everything at debug level and above to the application log file
pub fn init_logger() -> Result<()> {
    let log_dir = log_dir()?;
    fs::create_dir_all(&log_dir)?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("app.log"))?;

    INIT.call_once(|| {
        if WriteLogger::init(LevelFilter::Debug, Config::default(), log_file).is_ok() {
            LOGGER_INITIALIZED.store(true, Ordering::SeqCst);
        }
    });

    if LOGGER_INITIALIZED.load(Ordering::SeqCst) {
        Ok(())
    } else {
        Err(SyncError::Io(Error::new(
            ErrorKind::Other,
            "Logger initialization failed",
        )))
    }
}

/// Log to stderr for interactive runs. `RUST_LOG` overrides the level.
pub fn init_stderr_logger(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    INIT.call_once(|| {
        let installed = env_logger::Builder::new()
            .filter_level(level)
            .parse_default_env()
            .try_init()
            .is_ok();
        LOGGER_INITIALIZED.store(installed, Ordering::SeqCst);
    });

    if LOGGER_INITIALIZED.load(Ordering::SeqCst) {
        Ok(())
    } else {
        Err(SyncError::Io(Error::new(
            ErrorKind::Other,
            "Logger initialization failed",
        )))
    }
}

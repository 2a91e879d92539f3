use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod logger {
    use super::*;

    /// Console output plus an append-only log file.
    pub fn init(path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .append(true)
            .create(true)
            .open(path)?;

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        // A second init (tests, embedding) keeps the first subscriber.
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .try_init();

        Ok(())
    }
}

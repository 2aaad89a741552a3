use std::io;
use std::path::PathBuf;
use std::sync::Arc;

pub mod clock;
pub mod compactor;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod public;
pub mod wal;

pub use engine::{Engine, EngineError, SlotConflict};
pub use public::{CalendarSync, NullCalendar, PublicDesk};

/// Runtime configuration, read from `BOOKD_*` environment variables.
pub struct Config {
    pub data_dir: PathBuf,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
}

impl Config {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("BOOKD_DATA_DIR").unwrap_or_else(|_| "./data".into());
        let compact_threshold = std::env::var("BOOKD_COMPACT_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);
        let metrics_port = std::env::var("BOOKD_METRICS_PORT")
            .ok()
            .and_then(|s| s.parse().ok());
        Self {
            data_dir: PathBuf::from(data_dir),
            compact_threshold,
            metrics_port,
        }
    }
}

/// Open (or create) the data directory and start the engine plus its
/// background WAL compactor. Must be called inside a tokio runtime.
pub fn open(config: &Config) -> io::Result<Arc<Engine>> {
    std::fs::create_dir_all(&config.data_dir)?;
    let wal_path = config.data_dir.join("bookd.wal");
    let engine = Arc::new(Engine::new(wal_path)?);
    tokio::spawn(compactor::run(engine.clone(), config.compact_threshold));
    Ok(engine)
}

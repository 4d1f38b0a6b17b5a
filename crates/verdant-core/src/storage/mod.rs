mod config;
pub mod database;
pub mod store;

pub use config::{
    Config, ScoringConfig, SessionConfig, TabSwitchPolicy, TimersConfig, WildfireConfig,
};
pub use database::Database;
pub use store::{
    Document, DocumentKey, MemoryBackend, SharedStateStore, StoreBackend, Versioned,
};

use std::path::PathBuf;

/// Returns `~/.config/verdant[-dev]/` based on VERDANT_ENV.
///
/// Set VERDANT_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the data directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("VERDANT_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("verdant-dev")
    } else {
        base_dir.join("verdant")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

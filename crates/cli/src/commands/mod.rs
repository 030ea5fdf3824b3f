//! Subcommand implementations and the wiring they share.

pub mod allocate;
pub mod chat;
pub mod components;
pub mod config_cmd;
pub mod memory;
pub mod thread;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mnemo_config::{AppConfig, StorageBackend};
use mnemo_engine::EngineStores;
use mnemo_memory::{FileStore, InMemoryStore};

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// The config file the CLI reads: `--config` when given, else the default.
pub fn config_file(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

pub fn load_config(path: Option<&Path>) -> CliResult<AppConfig> {
    let config = match path {
        Some(p) => AppConfig::load_from(p),
        None => AppConfig::load(),
    };
    Ok(config.map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Open the configured backend once and use it for all three stores.
pub async fn open_stores(config: &AppConfig) -> CliResult<EngineStores> {
    let path = config.storage.resolved_path();
    let stores = match config.storage.backend {
        #[cfg(feature = "sqlite")]
        StorageBackend::Sqlite => {
            EngineStores::shared(Arc::new(mnemo_memory::SqliteStore::open(&path).await?))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageBackend::Sqlite => {
            return Err("this build has no SQLite support; set storage.backend = \"file\"".into());
        }
        StorageBackend::File => EngineStores::shared(Arc::new(FileStore::open(path)?)),
        StorageBackend::Memory => {
            tracing::warn!("In-memory storage: nothing will persist after this command");
            EngineStores::shared(Arc::new(InMemoryStore::new()))
        }
    };
    Ok(stores)
}

/// First `max` characters of `s`, with an ellipsis when cut.
pub fn preview(s: &str, max: usize) -> String {
    let mut chars = s.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_cuts_on_char_boundaries() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("héllo wörld", 5), "héllo…");
    }

    #[test]
    fn explicit_config_path_wins() {
        let p = Path::new("/tmp/mnemo-test.toml");
        assert_eq!(config_file(Some(p)), p.to_path_buf());
        assert!(config_file(None).ends_with("config.toml"));
    }

    #[tokio::test]
    async fn memory_backend_opens_without_touching_disk() {
        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::Memory;
        let stores = open_stores(&config).await.unwrap();
        assert_eq!(stores.memory.name(), "in_memory");
    }

    #[tokio::test]
    async fn file_backend_opens_in_configured_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::File;
        config.storage.path = Some(dir.path().join("data"));
        let stores = open_stores(&config).await.unwrap();
        assert_eq!(stores.memory.count().await.unwrap(), 0);
    }
}

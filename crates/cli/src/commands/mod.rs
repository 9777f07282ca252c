pub mod chat;
pub mod classify;
pub mod config_cmd;
pub mod export;
pub mod tools;

use careclaw_config::AppConfig;
use careclaw_core::repository::SessionRepository;
use careclaw_memory::{FileRepository, InMemoryRepository};

/// The session repository selected by `storage.backend`.
pub fn open_repository(config: &AppConfig) -> Box<dyn SessionRepository> {
    match config.storage.backend.as_str() {
        "file" => Box::new(FileRepository::new(&config.storage.path)),
        _ => Box::new(InMemoryRepository::new()),
    }
}

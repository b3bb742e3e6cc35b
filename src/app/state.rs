//! Application state shared across routes

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use crate::config::{Config, StoreBackend};
use crate::store::{DocumentStore, MemoryStore, StoreError, SupabaseClient};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn DocumentStore>,
    pub views: Arc<ViewRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, StateError> {
        let store: Arc<dyn DocumentStore> = match &config.store {
            StoreBackend::Supabase {
                url,
                service_role_key,
            } => {
                info!(url = %url, "Using Supabase document store");
                Arc::new(SupabaseClient::new(
                    url,
                    service_role_key,
                    config.live_poll_interval,
                ))
            }
            StoreBackend::Memory { seed_file } => {
                let memory = MemoryStore::new();
                if let Some(path) = seed_file {
                    let seeded = seed_from_file(&memory, path)?;
                    info!(path = %path.display(), documents = seeded, "Seeded in-memory store");
                } else {
                    info!("Using empty in-memory document store");
                }
                Arc::new(memory)
            }
        };

        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: Config, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            views: Arc::new(ViewRegistry::default()),
        }
    }
}

fn seed_from_file(memory: &MemoryStore, path: &Path) -> Result<usize, StateError> {
    let raw = std::fs::read_to_string(path).map_err(|source| StateError::SeedRead {
        path: path.to_path_buf(),
        source,
    })?;
    let seed: serde_json::Value = serde_json::from_str(&raw).map_err(StoreError::from)?;
    Ok(memory.seed(&seed)?)
}

/// Product views currently mounted, keyed by WebSocket session
#[derive(Debug, Default)]
pub struct ViewRegistry {
    sessions: DashMap<Uuid, String>,
}

impl ViewRegistry {
    pub fn open(&self, session_id: Uuid, product_id: &str) {
        self.sessions.insert(session_id, product_id.to_string());
    }

    pub fn close(&self, session_id: &Uuid) {
        self.sessions.remove(session_id);
    }

    /// Number of mounted views
    pub fn mounted(&self) -> usize {
        self.sessions.len()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to read seed file {path}: {source}")]
    SeedRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid seed data: {0}")]
    Seed(#[from] StoreError),
}

//! Model manager for lazy loading and caching.
//!
//! ONNX sessions are keyed by model source and execution device and loaded
//! at most once, with double-checked locking.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use ort::session::Session;
use tracing::info;

use super::onnx::build_session;
use super::source::ModelSource;
use crate::device::ExecutionDevice;
use crate::{HuginnError, Result};

/// A loaded session. `Session::run` needs exclusive access.
pub type SharedSession = Arc<Mutex<Session>>;

/// Configuration for the model manager.
#[derive(Debug, Clone)]
pub struct ModelManagerConfig {
    /// Cache directory for downloaded models.
    pub cache_dir: PathBuf,
}

impl Default for ModelManagerConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::var("HUGINN_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    dirs::cache_dir()
                        .unwrap_or_else(|| PathBuf::from(".cache"))
                        .join("huginn")
                        .join("models")
                }),
        }
    }
}

type SessionKey = (String, ExecutionDevice);

/// Lazily loads and caches ONNX sessions.
///
/// Thread-safe with double-checked locking to ensure each (model, device)
/// pair is loaded at most once.
pub struct ModelManager {
    sessions: RwLock<HashMap<SessionKey, SharedSession>>,
    config: ModelManagerConfig,
}

impl ModelManager {
    /// Create a new model manager with the given configuration.
    pub fn new(config: ModelManagerConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Create a model manager with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ModelManagerConfig::default())
    }

    /// Get or lazily load the session for `source` on `device`.
    pub fn session(&self, source: &ModelSource, device: &ExecutionDevice) -> Result<SharedSession> {
        let key = (source.cache_key(), device.clone());

        // Fast path: check if already loaded (read lock)
        {
            let sessions = self.sessions.read().map_err(|e| {
                HuginnError::Configuration(format!("Failed to acquire read lock: {e}"))
            })?;

            if let Some(session) = sessions.get(&key) {
                return Ok(Arc::clone(session));
            }
        }

        // Slow path: need to load (write lock)
        let mut sessions = self.sessions.write().map_err(|e| {
            HuginnError::Configuration(format!("Failed to acquire write lock: {e}"))
        })?;

        // Double-check after acquiring write lock
        if let Some(session) = sessions.get(&key) {
            return Ok(Arc::clone(session));
        }

        let path = source.resolve(&self.config.cache_dir)?;
        let session = Arc::new(Mutex::new(build_session(&path, device)?));
        info!(model = %source, device = %device, "loaded model");
        sessions.insert(key, Arc::clone(&session));

        Ok(session)
    }

    /// Get the configuration.
    pub fn config(&self) -> &ModelManagerConfig {
        &self.config
    }

    #[cfg(test)]
    fn cached_sessions(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cache_dir_mentions_huginn() {
        let config = ModelManagerConfig::default();
        if std::env::var("HUGINN_CACHE_DIR").is_err() {
            assert!(config.cache_dir.to_string_lossy().contains("huginn"));
        }
    }

    #[test]
    fn missing_model_fails_without_caching() {
        let manager = ModelManager::with_defaults();
        let source = ModelSource::local("/definitely/not/here.onnx");
        assert_eq!(manager.cached_sessions(), 0);
        assert!(manager.session(&source, &ExecutionDevice::cpu()).is_err());
        assert!(manager.session(&source, &ExecutionDevice::cpu()).is_err());
        assert_eq!(manager.cached_sessions(), 0);
    }
}

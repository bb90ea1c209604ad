//! Local prediction cache and history, stored as one JSON file.
//!
use std::{
    collections::VecDeque,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use common::protocol::PredictResponse;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of predictions kept in the history.
pub const HISTORY_LEN: usize = 10;

/// Number of cached predictions; the least recently used one is evicted first.
pub const CACHE_LEN: usize = 100;

const STORE_FILE: &str = "predictions.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("corrupt prediction store {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub class: String,
    pub confidence: f32,
    /// Where the image came from, e.g. a file path.
    pub source: String,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    pub cached: bool,
}

impl HistoryEntry {
    pub fn new(prediction: &PredictResponse, source: impl Into<String>, cached: bool) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        Self {
            class: prediction.class.clone(),
            confidence: prediction.confidence,
            source: source.into(),
            timestamp,
            cached,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
struct CacheEntry {
    key: u64,
    prediction: PredictResponse,
}

/// Cached predictions keyed by image hash, plus the most recent predictions.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PredictionStore {
    /// Most recently used first.
    #[serde(default)]
    cache: VecDeque<CacheEntry>,
    #[serde(default)]
    history: VecDeque<HistoryEntry>,
}

impl PredictionStore {
    /// Load the store from `dir`, starting empty if it does not exist yet.
    pub fn load(dir: &Path) -> Result<Self, StoreError> {
        let path = dir.join(STORE_FILE);
        match fs::read(&path) {
            Ok(data) => serde_json::from_slice(&data).map_err(|source| StoreError::Json { path, source }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    pub fn save(&self, dir: &Path) -> Result<(), StoreError> {
        fs::create_dir_all(dir).map_err(|source| StoreError::Io {
            path: dir.to_owned(),
            source,
        })?;

        let path = dir.join(STORE_FILE);
        let data = serde_json::to_vec_pretty(self).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, data).map_err(|source| StoreError::Io { path, source })
    }

    /// Look up a cached prediction and mark it as recently used.
    pub fn cached(&mut self, key: u64) -> Option<&PredictResponse> {
        let pos = self.cache.iter().position(|entry| entry.key == key)?;
        let entry = self.cache.remove(pos)?;
        self.cache.push_front(entry);
        self.cache.front().map(|entry| &entry.prediction)
    }

    pub fn insert(&mut self, key: u64, prediction: PredictResponse) {
        self.cache.retain(|entry| entry.key != key);
        self.cache.push_front(CacheEntry { key, prediction });
        self.cache.truncate(CACHE_LEN);
    }

    /// Record a prediction as the newest history entry.
    pub fn record(&mut self, entry: HistoryEntry) {
        self.history.push_front(entry);
        self.history.truncate(HISTORY_LEN);
    }

    /// History, newest first.
    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Drop cached predictions, keep the history.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

/// Default location of the store under the user cache directory.
pub fn default_state_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("classify"))
}

//! Settings persistence
//!
//! The settings record lives under one fixed key in a page-scoped
//! key/value store. [`SettingsBackend`] abstracts that store so the
//! scheduler stack can run against the real page's `localStorage`
//! (see [`crate::host::cdp::LocalStorageBackend`]) or against the
//! in-memory backend in tests.
//!
//! Failure semantics follow the keepalive design goal that nothing in
//! this subsystem interrupts the host page: a malformed or unreadable
//! record loads as the defaults, and a failed write is logged and
//! dropped, leaving the new value in memory for this page lifetime.

use crate::error::StorageError;
use crate::settings::Settings;
use parking_lot::RwLock;
use std::future::Future;
use tracing::{debug, instrument, warn};

/// Fixed key the serialized settings record is stored under.
pub const SETTINGS_KEY: &str = "sessionpulse.settings";

/// A page-scoped key/value store holding the one settings record.
pub trait SettingsBackend: Send + Sync + 'static {
    /// Read the raw serialized record, `None` when absent.
    fn read(&self) -> impl Future<Output = Result<Option<String>, StorageError>> + Send;

    /// Write the raw serialized record, replacing any prior value.
    fn write(&self, raw: &str) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// Loads and saves the settings record through a [`SettingsBackend`].
#[derive(Debug)]
pub struct SettingsStore<B> {
    backend: B,
}

impl<B: SettingsBackend> SettingsStore<B> {
    /// Create a store over the given backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Load the persisted settings record.
    ///
    /// Missing, unreadable, or malformed data all yield
    /// [`Settings::default`]; this never errors.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Settings {
        let raw = match self.backend.read().await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("no stored settings record, using defaults");
                return Settings::default();
            }
            Err(err) => {
                warn!("settings read failed, using defaults: {err}");
                return Settings::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(err) => {
                warn!("malformed settings record, using defaults: {err}");
                Settings::default()
            }
        }
    }

    /// Persist the full settings record, replacing any prior value.
    ///
    /// A storage write failure is logged and otherwise ignored; the
    /// caller keeps the value in memory for this page lifetime.
    #[instrument(skip(self, settings))]
    pub async fn save(&self, settings: &Settings) {
        let raw = match serde_json::to_string(settings) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("settings serialization failed, record not persisted: {err}");
                return;
            }
        };

        if let Err(err) = self.backend.write(&raw).await {
            warn!("settings write failed, keeping value in memory only: {err}");
        }
    }
}

/// In-memory backend for tests and storage-less environments.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    value: RwLock<Option<String>>,
    fail_writes: RwLock<bool>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend pre-seeded with a raw record.
    pub fn with_value<S: Into<String>>(raw: S) -> Self {
        Self {
            value: RwLock::new(Some(raw.into())),
            fail_writes: RwLock::new(false),
        }
    }

    /// Make subsequent writes fail, to exercise the swallow path.
    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.write() = fail;
    }

    /// The currently stored raw record, if any.
    pub fn raw(&self) -> Option<String> {
        self.value.read().clone()
    }
}

impl<B: SettingsBackend> SettingsBackend for std::sync::Arc<B> {
    async fn read(&self) -> Result<Option<String>, StorageError> {
        B::read(self).await
    }

    async fn write(&self, raw: &str) -> Result<(), StorageError> {
        B::write(self, raw).await
    }
}

impl SettingsBackend for MemoryBackend {
    async fn read(&self) -> Result<Option<String>, StorageError> {
        Ok(self.value.read().clone())
    }

    async fn write(&self, raw: &str) -> Result<(), StorageError> {
        if *self.fail_writes.read() {
            return Err(StorageError::WriteFailed("backend disabled".to_string()));
        }
        *self.value.write() = Some(raw.to_string());
        Ok(())
    }
}

//! CLI command implementations

pub mod crypto;
pub mod history;
pub mod keys;

use crate::api::HttpKeyDirectory;
use crate::config::{Settings, SettingsManager};
use anyhow::{Context, Result};
use dashkey_core::{HybridEngine, KeyStore, SecureSession};
use dashkey_store::{FileSecureStorage, SqlitePlaintextStore};
use std::sync::Arc;

/// This device's settings and key storage
pub struct Device {
    pub settings: Settings,
    storage: Arc<FileSecureStorage>,
}

impl Device {
    pub fn load() -> Result<Self> {
        let settings = SettingsManager::load()?;
        let keys_dir = SettingsManager::keys_dir()?;
        let storage = FileSecureStorage::open(&keys_dir)
            .with_context(|| format!("Failed to open key directory {:?}", keys_dir))?;
        Ok(Self {
            settings,
            storage: Arc::new(storage),
        })
    }

    pub fn key_store(&self) -> KeyStore {
        KeyStore::new(self.storage.clone(), self.settings.crypto.clone())
    }

    pub fn engine(&self) -> HybridEngine {
        HybridEngine::new(&self.settings.crypto)
    }

    pub fn directory(&self) -> HttpKeyDirectory {
        HttpKeyDirectory::from_settings(&self.settings)
    }

    /// Full session over the local history database and the HTTP directory
    pub async fn session(&self) -> Result<SecureSession> {
        let db_path = SettingsManager::database_path(&self.settings)?;
        let store = SqlitePlaintextStore::open(&db_path)
            .await
            .with_context(|| format!("Failed to open message database {:?}", db_path))?;

        let session = SecureSession::new(
            self.settings.crypto.clone(),
            self.storage.clone(),
            Arc::new(store),
            Arc::new(self.directory()),
        )?;
        Ok(session)
    }
}

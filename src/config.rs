use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, de::DeserializeOwned};

/// The env vars needed to reach the portal and place the mirror.
#[derive(Debug, Deserialize)]
pub struct SyncEnv {
    portal_base_url: String,
    portal_username: String,
    portal_password: String,
    sync_root: PathBuf,
    old_prefix: Option<String>,
    conflict_suffix: Option<String>,
    delete_old: Option<bool>,
}

pub struct SyncConfig {
    pub portal_base_url: String,
    pub portal_username: String,
    pub portal_password: String,
    pub sync_root: PathBuf,
    /// Prepended to local entries that disappeared upstream.
    pub old_prefix: String,
    /// Dropbox appends this to names it failed to reconcile; entries
    /// carrying it get renamed back before and after a sync pass.
    pub conflict_suffix: String,
    /// Remove vanished entries outright instead of deprecating them.
    pub delete_old: bool,
}

impl SyncConfig {
    pub fn new() -> anyhow::Result<Self> {
        let env = SyncEnv::load_from_env()?;
        Ok(Self {
            portal_base_url: env.portal_base_url,
            portal_username: env.portal_username,
            portal_password: env.portal_password,
            sync_root: env.sync_root,
            old_prefix: env.old_prefix.unwrap_or_else(|| "(OLD) ".to_string()),
            conflict_suffix: env
                .conflict_suffix
                .unwrap_or_else(|| " (Unicode Encoding Conflict)".to_string()),
            delete_old: env.delete_old.unwrap_or(false),
        })
    }
}

// Extension trait.
pub trait LoadFromEnv: DeserializeOwned {
    fn load_from_env() -> anyhow::Result<Self> {
        // Don't throw an error if .env file doesn't exist.
        let _ = dotenv::dotenv();
        let config =
            envy::from_env::<Self>().context("failed to load env variables into config struct")?;
        Ok(config)
    }
}

impl<T: DeserializeOwned> LoadFromEnv for T {}

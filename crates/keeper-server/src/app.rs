//! Process wiring: config, store, master key and the rotation controller.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Duration;
use keeper_core::ledger::Ledger;
use keeper_core::storage::{KeyVersionStore, SqliteStore};
use keeper_core::{AesGcmCodec, Codec, MasterKey, RotationController, RotationPolicy, SecretService};

use crate::cli::Cli;
use crate::config::{default_config_path, default_store_path, load_config, KeeperConfig};
use crate::master::{load_master_key, KeySourceContext};

pub struct App {
    pub config: KeeperConfig,
    pub store_path: PathBuf,
}

impl App {
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let config_path = match cli.config.as_deref() {
            Some(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => default_config_path()?,
        };
        let config = load_config(&config_path)?;

        let store_path = match (cli.store.as_deref(), config.store.path.as_deref()) {
            (Some(path), _) if !path.trim().is_empty() => PathBuf::from(path),
            (_, Some(path)) => PathBuf::from(path),
            _ => default_store_path()?,
        };

        Ok(Self { config, store_path })
    }

    pub fn policy(&self) -> RotationPolicy {
        RotationPolicy::new(Duration::days(i64::from(self.config.rotation.interval_days)))
    }

    pub fn open_store(&self) -> anyhow::Result<Arc<SqliteStore>> {
        let store = SqliteStore::open(&self.store_path).map_err(|e| {
            anyhow::anyhow!("Failed to open store {}: {}", self.store_path.display(), e)
        })?;
        Ok(Arc::new(store))
    }

    pub fn master_key(&self) -> anyhow::Result<MasterKey> {
        let lookup = |name: &str| std::env::var(name).ok();
        let ctx = KeySourceContext {
            env: &lookup,
            interactive: std::io::stdin().is_terminal(),
        };
        load_master_key(&self.config.master_key, &ctx)
    }

    /// Load the ledger and rotate if due. Failure here is fatal for every
    /// command that needs keys.
    pub fn bootstrap(&self) -> anyhow::Result<(RotationController, Arc<SqliteStore>)> {
        let store = self.open_store()?;
        let master = self.master_key()?;
        let controller =
            RotationController::bootstrap(master, self.policy(), codec(), store.clone())
                .map_err(|e| anyhow::anyhow!("Bootstrap failed: {}", e))?;
        Ok((controller, store))
    }

    /// Load the ledger without rotating, for read-only inspection.
    pub fn load_ledger(&self) -> anyhow::Result<Ledger> {
        let store = self.open_store()?;
        let master = self.master_key()?;
        let wrapped = store.list_all()?;
        Ledger::load(&wrapped, &master, codec(), store)
            .map_err(|e| anyhow::anyhow!("Failed to load key ledger: {}", e))
    }

    pub fn secret_service(&self) -> anyhow::Result<SecretService> {
        let (controller, store) = self.bootstrap()?;
        Ok(SecretService::new(controller.envelope(), store))
    }
}

fn codec() -> Arc<dyn Codec> {
    Arc::new(AesGcmCodec::new())
}

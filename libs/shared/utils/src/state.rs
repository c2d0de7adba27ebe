use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use shared_config::{AppConfig, ClinicSettings};
use shared_database::{ClinicStore, InMemoryClinicStore, SupabaseClinicStore};

use crate::clock::{Clock, SystemClock};

/// Shared state handed to every cell router.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn ClinicStore>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn ClinicStore>, clock: Arc<dyn Clock>) -> Self {
        Self { config, store, clock }
    }

    /// Supabase when it is configured, otherwise the in-memory store (seeded from
    /// `CLINIC_SEED_FILE` when given).
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let store: Arc<dyn ClinicStore> = if config.is_configured() {
            info!("Using Supabase clinic store at {}", config.supabase_url);
            Arc::new(SupabaseClinicStore::new(&config))
        } else if let Some(path) = &config.seed_file {
            info!("Using in-memory clinic store seeded from {}", path);
            Arc::new(
                InMemoryClinicStore::from_seed_file(path)
                    .with_context(|| format!("Failed to load seed file {}", path))?,
            )
        } else {
            info!("Using empty in-memory clinic store");
            Arc::new(InMemoryClinicStore::new())
        };

        Ok(Self::new(Arc::new(config), store, Arc::new(SystemClock)))
    }

    pub fn settings(&self) -> &ClinicSettings {
        &self.config.clinic
    }
}

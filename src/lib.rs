//! Core engine for the marketing metrics dashboard: typed domain model,
//! clone-on-write state store, hybrid remote/local persistence with
//! debounced autosave, and spreadsheet import/export.

pub mod codec;
pub mod config;
pub mod errors;
pub mod kpis;
pub mod local;
pub mod migrate;
pub mod model;
pub mod numeric;
pub mod remote;
pub mod store;
pub mod sync;
pub mod workbook;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use crate::config::{AppConfig, PublicAppConfig};
pub use crate::errors::{AppError, AppResult};
pub use crate::model::{AppState, CellValue, MonthKey, Segment, ViewMode};
pub use crate::store::DashboardStore;
pub use crate::sync::SyncStatus;

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,dashboard_core=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}

/// Wires the store, the persistence backends, and the sync engine together.
/// One instance per running app.
pub struct Dashboard {
    config: AppConfig,
    store: Arc<DashboardStore>,
    engine: Arc<sync::SyncEngine>,
    autosave: Mutex<Option<JoinHandle<()>>>,
}

impl Dashboard {
    /// Builds the engine without touching the network. Remote sync is active
    /// only when the config carries an endpoint and key AND a user identity
    /// is given; otherwise everything lands in the local store.
    pub fn initialize(
        config: AppConfig,
        user_id: Option<String>,
        data_dir: &Path,
    ) -> AppResult<Self> {
        init_tracing();
        let local = Arc::new(local::LocalStore::open(
            data_dir,
            &config.database_file_name,
        )?);
        let remote = remote::SupabaseRestStore::maybe_new(&config)
            .map(|store| Arc::new(store) as Arc<dyn remote::DocumentStore>);
        let store = Arc::new(DashboardStore::new(AppState::initial(config.years())));
        let engine = Arc::new(sync::SyncEngine::new(
            Arc::clone(&store),
            remote,
            Some(local),
            user_id,
            config.local_storage_key.clone(),
            Duration::from_millis(config.save_debounce_ms),
            config.years(),
        ));
        Ok(Self {
            config,
            store,
            engine,
            autosave: Mutex::new(None),
        })
    }

    /// Loads the persisted document and starts the autosave loop.
    pub async fn start(&self) {
        self.engine.load().await;
        let handle = Arc::clone(&self.engine).spawn_autosave();
        if let Some(previous) = self.autosave.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Final save, then stops the autosave loop. Pending debounce windows
    /// are superseded by this write.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.autosave.lock().take() {
            handle.abort();
        }
        self.engine.persist().await;
    }

    pub fn store(&self) -> &Arc<DashboardStore> {
        &self.store
    }

    pub fn status(&self) -> SyncStatus {
        self.engine.status()
    }

    pub fn subscribe_status(&self) -> tokio::sync::watch::Receiver<SyncStatus> {
        self.engine.subscribe_status()
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        self.config.public_profile()
    }

    pub fn export_xlsx(&self, path: &Path) -> AppResult<()> {
        workbook::write_workbook(&self.store.snapshot(), path)
    }

    /// Partial overlay: rows that decode cleanly are applied, the rest of
    /// the state is untouched. A file that cannot be read at all leaves the
    /// state exactly as it was.
    pub fn import_xlsx(&self, path: &Path) -> AppResult<usize> {
        let rows = workbook::read_workbook(path)?;
        let merged = codec::decode(&rows, &self.store.snapshot(), self.config.years());
        self.store.install(merged);
        Ok(rows.len())
    }
}

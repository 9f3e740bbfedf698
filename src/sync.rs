//! Hybrid persistence: a user-scoped document in the remote store when an
//! identity is present, the local key-value store otherwise. Saves are
//! debounced on the trailing edge so a burst of edits produces exactly one
//! write, always of the latest state.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::errors::AppResult;
use crate::local::LocalStore;
use crate::migrate::migrate;
use crate::model::AppState;
use crate::remote::DocumentStore;
use crate::store::DashboardStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// No remote sync configured; local-only operation. A steady state, not
    /// a failure.
    Disconnected,
    Connected,
    Syncing,
    Error,
}

pub struct SyncEngine {
    store: Arc<DashboardStore>,
    remote: Option<Arc<dyn DocumentStore>>,
    local: Option<Arc<LocalStore>>,
    user_id: Option<String>,
    local_key: String,
    debounce: Duration,
    years: RangeInclusive<i32>,
    status: watch::Sender<SyncStatus>,
}

impl SyncEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<DashboardStore>,
        remote: Option<Arc<dyn DocumentStore>>,
        local: Option<Arc<LocalStore>>,
        user_id: Option<String>,
        local_key: String,
        debounce: Duration,
        years: RangeInclusive<i32>,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus::Disconnected);
        Self {
            store,
            remote,
            local,
            user_id,
            local_key,
            debounce,
            years,
            status,
        }
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    fn remote_identity(&self) -> Option<(&Arc<dyn DocumentStore>, &str)> {
        match (&self.remote, &self.user_id) {
            (Some(remote), Some(user)) => Some((remote, user.as_str())),
            _ => None,
        }
    }

    /// Initial load. Remote documents are merged into the generated
    /// defaults: only `data` and the site registry come from the payload,
    /// the UI selection and view mode stay local.
    pub async fn load(&self) {
        if let Some((remote, user)) = self.remote_identity() {
            self.set_status(SyncStatus::Syncing);
            match self.load_remote(remote.as_ref(), user).await {
                Ok(()) => self.set_status(SyncStatus::Connected),
                Err(err) => {
                    error!(target: "sync", %err, "initial remote load failed");
                    self.set_status(SyncStatus::Error);
                }
            }
            return;
        }

        self.load_local();
        self.set_status(SyncStatus::Disconnected);
    }

    async fn load_remote(&self, remote: &dyn DocumentStore, user: &str) -> AppResult<()> {
        match remote.fetch_document(user).await? {
            Some(payload) => {
                match serde_json::from_value::<AppState>(payload) {
                    Ok(loaded) => {
                        self.merge_loaded(loaded);
                        info!(target: "sync", user, "remote document loaded");
                    }
                    Err(err) => {
                        // A document we cannot read is kept server-side and
                        // replaced on the next save; defaults win locally.
                        warn!(target: "sync", %err, "remote document unreadable; keeping defaults");
                    }
                }
                Ok(())
            }
            None => {
                let payload = serde_json::to_value(self.store.snapshot())?;
                remote.insert_document(user, &payload).await?;
                info!(target: "sync", user, "seeded fresh remote document");
                Ok(())
            }
        }
    }

    fn load_local(&self) {
        let Some(local) = &self.local else {
            return;
        };
        match local.get(&self.local_key) {
            Ok(Some(text)) => match serde_json::from_str::<AppState>(&text) {
                Ok(loaded) => {
                    self.merge_loaded(loaded);
                    info!(target: "sync", "local document loaded");
                }
                Err(err) => {
                    warn!(target: "sync", %err, "local document unreadable; keeping defaults");
                }
            },
            Ok(None) => {}
            Err(err) => warn!(target: "sync", %err, "local store read failed"),
        }
    }

    fn merge_loaded(&self, loaded: AppState) {
        let mut merged = self.store.snapshot();
        merged.data = loaded.data;
        merged.site_registry = loaded.site_registry;
        merged.schema_version = loaded.schema_version;
        migrate(&mut merged, self.years.clone());
        self.store.install(merged);
    }

    /// Runs the autosave loop until the store goes away. Call after
    /// [`load`]: subscribing here marks the load-time install as seen, and
    /// every revision from this point on starts or restarts a window.
    pub fn spawn_autosave(self: Arc<Self>) -> JoinHandle<()> {
        let mut revisions = self.store.subscribe();
        tokio::spawn(async move {
            loop {
                if revisions.changed().await.is_err() {
                    return;
                }
                // Trailing-edge debounce: every further change restarts the
                // window, so at most one timer is ever pending.
                loop {
                    let window = tokio::time::sleep(self.debounce);
                    tokio::pin!(window);
                    tokio::select! {
                        _ = &mut window => break,
                        changed = revisions.changed() => {
                            if changed.is_err() {
                                return;
                            }
                        }
                    }
                }
                self.persist().await;
            }
        })
    }

    /// Persists the latest snapshot. No retry on failure; the next edit
    /// starts a fresh debounce cycle anyway.
    pub async fn persist(&self) {
        let snapshot = self.store.snapshot();

        if let Some((remote, user)) = self.remote_identity() {
            self.set_status(SyncStatus::Syncing);
            let result = async {
                let payload = serde_json::to_value(&snapshot)?;
                remote
                    .upsert_document(user, &payload, &Utc::now().to_rfc3339())
                    .await
            }
            .await;
            match result {
                Ok(()) => self.set_status(SyncStatus::Connected),
                Err(err) => {
                    error!(target: "sync", %err, "remote save failed");
                    self.set_status(SyncStatus::Error);
                }
            }
            return;
        }

        let Some(local) = &self.local else {
            return;
        };
        let result = serde_json::to_string(&snapshot)
            .map_err(crate::errors::AppError::from)
            .and_then(|text| local.set(&self.local_key, &text));
        match result {
            Ok(()) => self.set_status(SyncStatus::Disconnected),
            Err(err) => {
                error!(target: "sync", %err, "local save failed");
                self.set_status(SyncStatus::Error);
            }
        }
    }

    fn set_status(&self, status: SyncStatus) {
        self.status.send_replace(status);
    }
}

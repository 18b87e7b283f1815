use std::sync::Arc;

use tokio::sync::watch;

use crate::mirror::MirrorStore;
use crate::observability::{Metrics, SyncStatus};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MirrorStore>,
    pub status: watch::Receiver<SyncStatus>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn MirrorStore>,
        status: watch::Receiver<SyncStatus>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            status,
            metrics,
        }
    }
}

use crate::{config::RuntimeConfiguration, store::Store};
use std::{ops::Deref, sync::Arc, time::Duration};
use tokio::time::Instant;

#[derive(Clone, Debug)]
pub struct AppState {
    store: Arc<dyn Store>,
    config: RuntimeConfiguration,
    started_at: Instant,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: RuntimeConfiguration) -> Self {
        Self {
            store,
            config,
            started_at: Instant::now(),
        }
    }

    pub const fn config(&self) -> &RuntimeConfiguration {
        &self.config
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub async fn sensible_shutdown(&self) {
        self.store.close().await;
    }
}

impl Deref for AppState {
    type Target = dyn Store;

    fn deref(&self) -> &Self::Target {
        &*self.store
    }
}

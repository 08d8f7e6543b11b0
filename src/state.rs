use std::sync::Arc;

use crate::config::Config;
use crate::directory::MemoryDirectory;
use crate::engine::lifecycle::{EngineSettings, ShipmentEngine};
use crate::engine::tracker::LocationTracker;
use crate::geo::Geofence;
use crate::observability::metrics::Metrics;
use crate::store::{Store, StoreOptions};

pub struct AppState {
    pub engine: ShipmentEngine,
    pub store: Arc<Store>,
    pub directory: Arc<MemoryDirectory>,
    pub tracker: Arc<LocationTracker>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let store = Arc::new(Store::open(StoreOptions {
            lock_timeout: config.lock_timeout,
        }));
        let directory = Arc::new(MemoryDirectory::new());
        let tracker = Arc::new(LocationTracker::new());
        let metrics = Metrics::new();

        let engine = ShipmentEngine::new(
            store.clone(),
            directory.clone(),
            directory.clone(),
            tracker.clone(),
            metrics.clone(),
            EngineSettings {
                geofence: Geofence::new(config.gate_meters),
                retry: config.retry_policy(),
                pickup_from_waiting: config.pickup_from_waiting,
                event_buffer_size: config.event_buffer_size,
            },
        );

        Self {
            engine,
            store,
            directory,
            tracker,
            metrics,
        }
    }
}

//! Latest measurement per station.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::{Measurement, StationId};

/// In-memory store of the most recent [`Measurement`] per station.
///
/// Cheap to clone; clones share the same map. Readers never block each other.
#[derive(Debug, Clone, Default)]
pub struct StationDataCache {
    inner: Arc<RwLock<HashMap<StationId, Arc<Measurement>>>>,
}

impl StationDataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the cached measurement for `station_id`.
    pub fn record_measurement(&self, station_id: StationId, measurement: Measurement) {
        self.inner.write().insert(station_id, Arc::new(measurement));
    }

    /// Latest measurement for a station, if one has been seen.
    pub fn latest(&self, station_id: &StationId) -> Option<Arc<Measurement>> {
        self.inner.read().get(station_id).cloned()
    }

    /// Remove a station's entry. Returns false if there was none.
    pub fn remove(&self, station_id: &StationId) -> bool {
        self.inner.write().remove(station_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

//! Live per-connection listeners for raw station updates.
//!
//! The listener list is copy-on-write: `register`/`unregister` swap in a new
//! `Arc<Vec<_>>` under a short write lock, and `publish` iterates a snapshot
//! without holding any lock, so listeners can (un)register from inside a
//! callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::cache::StationDataCache;
use crate::error::ListenerError;
use crate::types::{Measurement, StationId};

/// A live observer of one station's measurement stream.
pub trait MeasurementListener: Send + Sync {
    /// Station this listener is interested in.
    fn station_id(&self) -> &StationId;

    /// Called synchronously for every update of that station.
    fn on_measurement(&self, measurement: &Measurement) -> Result<(), ListenerError>;
}

/// Handle returned by [`SubscriberRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

#[derive(Clone)]
struct Entry {
    id: ListenerId,
    listener: Arc<dyn MeasurementListener>,
}

/// Outcome of one [`SubscriberRegistry::publish`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub failed: Vec<(ListenerId, ListenerError)>,
}

impl PublishReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct SubscriberRegistry {
    cache: StationDataCache,
    listeners: RwLock<Arc<Vec<Entry>>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    /// Create a registry that replays from `cache` on registration.
    pub fn new(cache: StationDataCache) -> Self {
        Self {
            cache,
            listeners: RwLock::new(Arc::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Add a listener and, if the station already has a measurement, hand it
    /// the latest one before returning.
    ///
    /// Not atomic with a concurrent [`publish`](Self::publish) of the same
    /// station; [`MeteoUpdatePipeline`](crate::pipeline::MeteoUpdatePipeline)
    /// serializes the two per station.
    pub fn register(&self, listener: Arc<dyn MeasurementListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let station_id = listener.station_id().clone();

        {
            let mut guard = self.listeners.write();
            let mut next: Vec<Entry> = guard.iter().cloned().collect();
            next.push(Entry {
                id,
                listener: Arc::clone(&listener),
            });
            *guard = Arc::new(next);
        }

        tracing::debug!(listener = %id, station_id = %station_id, "Listener registered");

        if let Some(latest) = self.cache.latest(&station_id) {
            if let Err(e) = listener.on_measurement(&latest) {
                tracing::warn!(
                    listener = %id,
                    station_id = %station_id,
                    error = %e,
                    "Listener failed during replay"
                );
            }
        }

        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut guard = self.listeners.write();
        if !guard.iter().any(|e| e.id == id) {
            return false;
        }

        let next: Vec<Entry> = guard.iter().filter(|e| e.id != id).cloned().collect();
        *guard = Arc::new(next);

        tracing::debug!(listener = %id, "Listener unregistered");
        true
    }

    /// Deliver `measurement` to every listener of `station_id`, in
    /// registration order. A failing listener does not stop the others.
    pub fn publish(&self, station_id: &StationId, measurement: &Measurement) -> PublishReport {
        let snapshot: Arc<Vec<Entry>> = self.listeners.read().clone();
        let mut report = PublishReport::default();

        for entry in snapshot.iter().filter(|e| e.listener.station_id() == station_id) {
            match entry.listener.on_measurement(measurement) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        listener = %entry.id,
                        station_id = %station_id,
                        error = %e,
                        "Listener failed to handle measurement"
                    );
                    report.failed.push((entry.id, e));
                }
            }
        }

        report
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Number of listeners for one station.
    pub fn count_for(&self, station_id: &StationId) -> usize {
        self.listeners
            .read()
            .iter()
            .filter(|e| e.listener.station_id() == station_id)
            .count()
    }
}

/// Listener that forwards measurements into an unbounded channel, e.g. to a
/// connection task.
pub struct ChannelListener {
    station_id: StationId,
    tx: mpsc::UnboundedSender<Measurement>,
}

impl ChannelListener {
    pub fn new(station_id: StationId) -> (Self, mpsc::UnboundedReceiver<Measurement>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { station_id, tx }, rx)
    }
}

impl MeasurementListener for ChannelListener {
    fn station_id(&self) -> &StationId {
        &self.station_id
    }

    fn on_measurement(&self, measurement: &Measurement) -> Result<(), ListenerError> {
        self.tx
            .send(measurement.clone())
            .map_err(|_| ListenerError::new("receiver dropped"))
    }
}

//! Update → cache → decision → delivery hand-off → listener fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use piwind_core::MessageConfig;

use crate::cache::StationDataCache;
use crate::decision::{ActiveAlertSet, DecisionEngine};
use crate::delivery::DeliveryQueue;
use crate::lookup::SubscriptionSource;
use crate::registry::{ListenerId, MeasurementListener, PublishReport, SubscriberRegistry};
use crate::types::{Measurement, MeteoUpdate, StationId};

/// What one [`MeteoUpdatePipeline::handle_update`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Notification requests handed to the delivery queue
    pub enqueued: usize,
    /// Notification requests the queue refused
    pub dropped: usize,
    /// True when the subscription lookup failed and the notification pass was skipped
    pub lookup_skipped: bool,
    pub publish: PublishReport,
}

pub struct MeteoUpdatePipeline {
    cache: StationDataCache,
    engine: DecisionEngine,
    registry: Arc<SubscriberRegistry>,
    subscriptions: Arc<dyn SubscriptionSource>,
    queue: DeliveryQueue,
    // Reentrant so a listener may register from inside its own callback
    station_gates: Mutex<HashMap<StationId, Arc<ReentrantMutex<()>>>>,
}

impl MeteoUpdatePipeline {
    pub fn new(
        messages: MessageConfig,
        subscriptions: Arc<dyn SubscriptionSource>,
        queue: DeliveryQueue,
    ) -> Self {
        let cache = StationDataCache::new();
        let registry = Arc::new(SubscriberRegistry::new(cache.clone()));

        Self {
            cache,
            engine: DecisionEngine::new(messages),
            registry,
            subscriptions,
            queue,
            station_gates: Mutex::new(HashMap::new()),
        }
    }

    /// Process one inbound update to completion.
    ///
    /// Updates for the same station are applied one at a time in call order;
    /// different stations proceed in parallel. Never blocks on the push
    /// backend.
    pub fn handle_update(&self, update: MeteoUpdate) -> UpdateReport {
        let MeteoUpdate {
            station_id,
            measurement,
        } = update;

        let gate = self.station_gate(&station_id);
        let _serialized = gate.lock();

        self.cache
            .record_measurement(station_id.clone(), measurement.clone());

        let mut report = UpdateReport::default();

        match self.subscriptions.subscriptions_for_station(&station_id) {
            Ok(subscriptions) => {
                for request in self.engine.evaluate(&station_id, &measurement, &subscriptions) {
                    match self.queue.enqueue(request) {
                        Ok(()) => report.enqueued += 1,
                        Err(_) => report.dropped += 1,
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    station_id = %station_id,
                    error = %e,
                    "Subscription lookup failed, skipping notification pass"
                );
                report.lookup_skipped = true;
            }
        }

        report.publish = self.registry.publish(&station_id, &measurement);
        report
    }

    /// Add a live listener; it immediately receives the station's latest
    /// measurement if one is cached.
    ///
    /// Waits for any in-flight update of the listener's station, so the
    /// listener sees that update exactly once: by replay, never also by
    /// publish.
    pub fn register(&self, listener: Arc<dyn MeasurementListener>) -> ListenerId {
        let gate = self.station_gate(listener.station_id());
        let _serialized = gate.lock();
        self.registry.register(listener)
    }

    pub fn unregister(&self, id: ListenerId) -> bool {
        self.registry.unregister(id)
    }

    pub fn latest(&self, station_id: &StationId) -> Option<Arc<Measurement>> {
        self.cache.latest(station_id)
    }

    pub fn active_alerts(&self) -> &ActiveAlertSet {
        self.engine.active_alerts()
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Drop everything held for a station that is no longer reported:
    /// its cached measurement, its active alerts and its update gate.
    ///
    /// Live listeners stay registered. Returns true if the station had a
    /// cached measurement.
    pub fn forget_station(&self, station_id: &StationId) -> bool {
        let gate = self.station_gate(station_id);
        let removed = {
            let _serialized = gate.lock();
            let cleared = self.engine.active_alerts().clear_station(station_id);
            let removed = self.cache.remove(station_id);
            tracing::info!(
                station_id = %station_id,
                cleared_alerts = cleared,
                "Station forgotten"
            );
            removed
        };
        drop(gate);

        // Only drop the gate if no concurrent caller holds a clone of it
        let mut gates = self.station_gates.lock();
        if gates
            .get(station_id)
            .is_some_and(|g| Arc::strong_count(g) == 1)
        {
            gates.remove(station_id);
        }
        removed
    }

    /// Number of stations with an update gate, i.e. stations seen and not
    /// forgotten.
    pub fn tracked_stations(&self) -> usize {
        self.station_gates.lock().len()
    }

    fn station_gate(&self, station_id: &StationId) -> Arc<ReentrantMutex<()>> {
        let mut gates = self.station_gates.lock();
        Arc::clone(gates.entry(station_id.clone()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::DeliveryPool;
    use crate::error::{DeliveryError, ListenerError};
    use crate::gateway::{PushGateway, PushTransport};
    use crate::lookup::InMemoryDirectory;
    use crate::payload::PushPayload;
    use crate::registry::ChannelListener;
    use crate::types::{StationInfo, Subscription, WindSpeed};
    use piwind_core::{DeliveryConfig, LookupError};
    use std::sync::{OnceLock, Weak};
    use tokio::runtime::Handle;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct NullTransport;

    impl PushTransport for NullTransport {
        async fn send(&self, _payload: &PushPayload) -> Result<String, DeliveryError> {
            Ok(String::new())
        }
    }

    struct BrokenSource;

    impl SubscriptionSource for BrokenSource {
        fn subscriptions_for_station(
            &self,
            station_id: &StationId,
        ) -> Result<Vec<Subscription>, LookupError> {
            Err(LookupError::SubscriptionsUnavailable {
                station_id: station_id.to_string(),
                reason: "db offline".into(),
            })
        }
    }

    fn update(station: &str, v: f64) -> MeteoUpdate {
        MeteoUpdate {
            station_id: StationId::new(station),
            measurement: Measurement::new(
                WindSpeed::new(v).unwrap(),
                StationInfo {
                    name: "Hel".into(),
                    base_url: "http://hel.example".into(),
                },
            ),
        }
    }

    fn pipeline(source: Arc<dyn SubscriptionSource>) -> (MeteoUpdatePipeline, DeliveryPool) {
        let (queue, pool) = DeliveryPool::spawn(
            &Handle::current(),
            PushGateway::new(Arc::new(NullTransport)),
            &DeliveryConfig::default(),
        );
        (
            MeteoUpdatePipeline::new(MessageConfig::default(), source, queue),
            pool,
        )
    }

    #[tokio::test]
    async fn test_lookup_failure_skips_pass_but_updates_cache_and_listeners() {
        let (pipeline, pool) = pipeline(Arc::new(BrokenSource));
        let (listener, mut rx) = ChannelListener::new(StationId::new("s1"));
        pipeline.register(Arc::new(listener));

        let report = pipeline.handle_update(update("s1", 20.0));

        assert!(report.lookup_skipped);
        assert_eq!(report.enqueued, 0);
        assert_eq!(report.publish.delivered, 1);
        assert_eq!(rx.try_recv().unwrap().wind_speed.value(), 20.0);
        assert_eq!(
            pipeline.latest(&StationId::new("s1")).unwrap().wind_speed.value(),
            20.0
        );

        drop(pipeline);
        pool.join().await;
    }

    #[tokio::test]
    async fn test_lookup_failure_for_one_station_leaves_others_alone() {
        struct OnlyS2;
        impl SubscriptionSource for OnlyS2 {
            fn subscriptions_for_station(
                &self,
                station_id: &StationId,
            ) -> Result<Vec<Subscription>, LookupError> {
                if station_id.as_str() == "s2" {
                    Ok(vec![Subscription::new("s2", "bob", WindSpeed::new(5.0).unwrap())])
                } else {
                    Err(LookupError::Backend("s1 shard down".into()))
                }
            }
        }

        let (pipeline, pool) = pipeline(Arc::new(OnlyS2));

        assert!(pipeline.handle_update(update("s1", 50.0)).lookup_skipped);
        let report = pipeline.handle_update(update("s2", 6.0));
        assert!(!report.lookup_skipped);
        assert_eq!(report.enqueued, 1);

        drop(pipeline);
        let stats = pool.join().await;
        assert_eq!(stats.delivered, 1);
    }

    #[tokio::test]
    async fn test_replay_then_live_updates() {
        let directory = Arc::new(InMemoryDirectory::new());
        let (pipeline, pool) = pipeline(directory);

        pipeline.handle_update(update("s1", 4.0));
        let (listener, mut rx) = ChannelListener::new(StationId::new("s1"));
        let id = pipeline.register(Arc::new(listener));
        assert_eq!(rx.try_recv().unwrap().wind_speed.value(), 4.0);
        assert!(rx.try_recv().is_err());

        pipeline.handle_update(update("s1", 7.0));
        assert_eq!(rx.try_recv().unwrap().wind_speed.value(), 7.0);

        assert!(pipeline.unregister(id));
        assert!(!pipeline.unregister(id));
        pipeline.handle_update(update("s1", 9.0));
        assert!(rx.try_recv().is_err());

        drop(pipeline);
        pool.join().await;
    }

    #[tokio::test]
    async fn test_forget_station_releases_its_state() {
        let directory = Arc::new(InMemoryDirectory::new());
        let alice = Subscription::new("s1", "alice", WindSpeed::new(10.0).unwrap());
        directory.subscribe(alice.clone());
        let (pipeline, pool) = pipeline(directory);

        pipeline.handle_update(update("s1", 12.0));
        pipeline.handle_update(update("s2", 1.0));
        assert_eq!(pipeline.tracked_stations(), 2);
        assert!(pipeline.active_alerts().contains(&alice));

        assert!(pipeline.forget_station(&StationId::new("s1")));
        assert!(pipeline.latest(&StationId::new("s1")).is_none());
        assert!(!pipeline.active_alerts().contains(&alice));
        assert_eq!(pipeline.tracked_stations(), 1);
        assert!(!pipeline.forget_station(&StationId::new("s1")));

        // A returning station starts from a clean alert state
        let report = pipeline.handle_update(update("s1", 12.0));
        assert_eq!(report.enqueued, 1);

        drop(pipeline);
        let stats = pool.join().await;
        assert_eq!(stats.delivered, 2);
    }

    struct Recruiter {
        station_id: StationId,
        pipeline: OnceLock<Weak<MeteoUpdatePipeline>>,
        recruit: Mutex<Option<UnboundedReceiver<Measurement>>>,
    }

    impl MeasurementListener for Recruiter {
        fn station_id(&self) -> &StationId {
            &self.station_id
        }

        fn on_measurement(&self, _measurement: &Measurement) -> Result<(), ListenerError> {
            let Some(pipeline) = self.pipeline.get().and_then(Weak::upgrade) else {
                return Ok(());
            };
            let mut recruit = self.recruit.lock();
            if recruit.is_none() {
                let (listener, rx) = ChannelListener::new(self.station_id.clone());
                pipeline.register(Arc::new(listener));
                *recruit = Some(rx);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_register_from_inside_callback() {
        let (pipeline, pool) = pipeline(Arc::new(InMemoryDirectory::new()));
        let pipeline = Arc::new(pipeline);
        let recruiter = Arc::new(Recruiter {
            station_id: StationId::new("s1"),
            pipeline: OnceLock::new(),
            recruit: Mutex::new(None),
        });
        let _ = recruiter.pipeline.set(Arc::downgrade(&pipeline));
        pipeline.register(recruiter.clone());

        pipeline.handle_update(update("s1", 9.0));

        let mut rx = recruiter.recruit.lock().take().unwrap();
        assert_eq!(rx.try_recv().unwrap().wind_speed.value(), 9.0);
        assert!(rx.try_recv().is_err());

        drop(pipeline);
        pool.join().await;
    }
}

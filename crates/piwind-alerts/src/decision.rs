//! Edge-triggered wind alert decisions.
//!
//! A subscription is either idle or active. It becomes active, emitting a
//! "picked up" request, when a measurement reaches its limit, and idle again,
//! emitting a "dropped" request, when a measurement falls below it. Repeated
//! readings on the same side of the limit emit nothing.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use piwind_core::MessageConfig;

use crate::types::{Measurement, NotificationRequest, StationId, Subscription, Transition};

/// Subscriptions whose "picked up" notification has been sent and not yet
/// cleared by a "dropped" one.
///
/// Keyed by the subscription's value, so equal subscriptions loaded by
/// separate lookups share one entry. Lives only for the process lifetime.
#[derive(Debug, Clone, Default)]
pub struct ActiveAlertSet {
    inner: Arc<Mutex<HashSet<Subscription>>>,
}

impl ActiveAlertSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, subscription: &Subscription) -> bool {
        self.inner.lock().contains(subscription)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Forget every active alert of one station. Returns how many were removed.
    pub fn clear_station(&self, station_id: &StationId) -> usize {
        let mut set = self.inner.lock();
        let before = set.len();
        set.retain(|s| &s.station_id != station_id);
        before - set.len()
    }

    /// Apply one measurement to one subscription, atomically.
    fn transition(&self, subscription: &Subscription, reached: bool) -> Option<Transition> {
        let mut set = self.inner.lock();
        if reached {
            if set.contains(subscription) {
                None
            } else {
                set.insert(subscription.clone());
                Some(Transition::PickedUp)
            }
        } else if set.remove(subscription) {
            Some(Transition::Dropped)
        } else {
            None
        }
    }
}

/// Turns measurements into notification requests.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    active: ActiveAlertSet,
    messages: MessageConfig,
}

impl DecisionEngine {
    pub fn new(messages: MessageConfig) -> Self {
        Self::with_alert_set(messages, ActiveAlertSet::new())
    }

    pub fn with_alert_set(messages: MessageConfig, active: ActiveAlertSet) -> Self {
        Self { active, messages }
    }

    pub fn active_alerts(&self) -> &ActiveAlertSet {
        &self.active
    }

    /// Evaluate every subscription of `station_id` against `measurement`.
    ///
    /// Subscriptions for other stations are ignored. The alert set is updated
    /// before the requests are returned; a later delivery failure does not
    /// undo it.
    pub fn evaluate(
        &self,
        station_id: &StationId,
        measurement: &Measurement,
        subscriptions: &[Subscription],
    ) -> Vec<NotificationRequest> {
        subscriptions
            .iter()
            .filter(|s| &s.station_id == station_id)
            .filter_map(|subscription| {
                let reached = subscription.is_reached_by(measurement.wind_speed);
                let transition = self.active.transition(subscription, reached)?;

                tracing::info!(
                    station_id = %station_id,
                    username = %subscription.username,
                    wind_speed = %measurement.wind_speed,
                    limit = %subscription.min_wind_limit,
                    transition = %transition,
                    "Wind alert transition"
                );

                Some(NotificationRequest {
                    station_id: station_id.clone(),
                    username: subscription.username.clone(),
                    transition,
                    message: transition.message(&self.messages).to_string(),
                    station: measurement.station.clone(),
                    wind_speed: measurement.wind_speed,
                })
            })
            .collect()
    }
}

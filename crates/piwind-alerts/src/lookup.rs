//! Read-only collaborators consulted by the pipeline.
//!
//! Real deployments back these with the account and station repositories;
//! [`InMemoryDirectory`] serves development seeding and tests.

use std::collections::HashMap;

use parking_lot::RwLock;
use piwind_core::{DevConfig, LookupError};

use crate::error::IngestError;
use crate::types::{StationId, StationInfo, Subscription, WindSpeed};

/// "Subscriptions for station" lookup.
pub trait SubscriptionSource: Send + Sync {
    fn subscriptions_for_station(
        &self,
        station_id: &StationId,
    ) -> Result<Vec<Subscription>, LookupError>;
}

/// "Station metadata" lookup.
pub trait StationDirectory: Send + Sync {
    fn station_info(&self, station_id: &StationId) -> Result<StationInfo, LookupError>;
}

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    stations: RwLock<HashMap<StationId, StationInfo>>,
    subscriptions: RwLock<Vec<Subscription>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from the `[dev]` config section.
    pub fn from_dev_config(dev: &DevConfig) -> Result<Self, IngestError> {
        let directory = Self::new();

        for station in &dev.stations {
            directory.add_station(
                StationId::new(station.id.as_str()),
                StationInfo {
                    name: station.name.clone(),
                    base_url: station.base_url.clone(),
                },
            );
        }

        for sub in &dev.subscriptions {
            directory.subscribe(Subscription::new(
                sub.station_id.as_str(),
                sub.username.as_str(),
                WindSpeed::new(sub.min_wind_limit)?,
            ));
        }

        tracing::info!(
            stations = dev.stations.len(),
            subscriptions = dev.subscriptions.len(),
            "Seeded development directory"
        );
        Ok(directory)
    }

    pub fn add_station(&self, station_id: StationId, info: StationInfo) {
        self.stations.write().insert(station_id, info);
    }

    /// Add a subscription. Returns false if an equal one already exists.
    pub fn subscribe(&self, subscription: Subscription) -> bool {
        let mut subs = self.subscriptions.write();
        if subs.contains(&subscription) {
            return false;
        }
        subs.push(subscription);
        true
    }

    /// Remove a subscription. Returns false if it was not present.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut subs = self.subscriptions.write();
        let before = subs.len();
        subs.retain(|s| s != subscription);
        subs.len() != before
    }
}

impl SubscriptionSource for InMemoryDirectory {
    fn subscriptions_for_station(
        &self,
        station_id: &StationId,
    ) -> Result<Vec<Subscription>, LookupError> {
        Ok(self
            .subscriptions
            .read()
            .iter()
            .filter(|s| &s.station_id == station_id)
            .cloned()
            .collect())
    }
}

impl StationDirectory for InMemoryDirectory {
    fn station_info(&self, station_id: &StationId) -> Result<StationInfo, LookupError> {
        self.stations
            .read()
            .get(station_id)
            .cloned()
            .ok_or_else(|| LookupError::StationNotFound(station_id.to_string()))
    }
}

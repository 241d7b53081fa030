//! Wind alert pipeline for PiWind.
//!
//! Caches the latest measurement per station, decides when a subscriber's
//! wind limit is crossed, delivers push notifications through a bounded
//! worker pool, and fans raw measurements out to live listeners.

pub mod cache;
pub mod decision;
pub mod delivery;
pub mod error;
pub mod gateway;
pub mod lookup;
pub mod payload;
pub mod pipeline;
pub mod registry;
pub mod types;

pub use cache::StationDataCache;
pub use decision::{ActiveAlertSet, DecisionEngine};
pub use delivery::{DeliveryPool, DeliveryQueue, DeliveryStatsSnapshot};
pub use error::{DeliveryError, IngestError, ListenerError};
pub use gateway::{FcmClient, PushGateway, PushTransport};
pub use lookup::{InMemoryDirectory, StationDirectory, SubscriptionSource};
pub use payload::{PushData, PushNotification, PushPayload};
pub use pipeline::{MeteoUpdatePipeline, UpdateReport};
pub use registry::{
    ChannelListener, ListenerId, MeasurementListener, PublishReport, SubscriberRegistry,
};
pub use types::{
    Measurement, MeteoUpdate, NotificationRequest, StationId, StationInfo, Subscription,
    Transition, WindSpeed,
};

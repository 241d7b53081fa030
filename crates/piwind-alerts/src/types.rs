use std::fmt;
use std::hash::{Hash, Hasher};

use piwind_core::MessageConfig;
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// Opaque weather station identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(String);

impl StationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for StationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A validated wind speed: finite and non-negative.
///
/// Compared and hashed by bit pattern so it can key a `HashSet`; `-0.0` is
/// folded into `0.0` on construction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct WindSpeed(f64);

impl WindSpeed {
    pub const ZERO: WindSpeed = WindSpeed(0.0);

    pub fn new(value: f64) -> Result<Self, IngestError> {
        if !value.is_finite() {
            return Err(IngestError::NonFiniteWindSpeed);
        }
        if value < 0.0 {
            return Err(IngestError::NegativeWindSpeed(value));
        }
        // 0.0 + -0.0 == 0.0
        Ok(Self(value + 0.0))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for WindSpeed {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for WindSpeed {}

impl Hash for WindSpeed {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl TryFrom<f64> for WindSpeed {
    type Error = IngestError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<WindSpeed> for f64 {
    fn from(speed: WindSpeed) -> Self {
        speed.0
    }
}

impl fmt::Display for WindSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.0)
    }
}

/// Display metadata needed to format a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationInfo {
    pub name: String,
    #[serde(rename = "stationBaseURL")]
    pub base_url: String,
}

/// Immutable snapshot of the latest reading for one station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub wind_speed: WindSpeed,
    pub station: StationInfo,
}

impl Measurement {
    pub fn new(wind_speed: WindSpeed, station: StationInfo) -> Self {
        Self { wind_speed, station }
    }
}

/// "Notify `username` when wind at `station_id` crosses `min_wind_limit`."
///
/// Identity is the value of the whole triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscription {
    pub station_id: StationId,
    pub username: String,
    pub min_wind_limit: WindSpeed,
}

impl Subscription {
    pub fn new(
        station_id: impl Into<StationId>,
        username: impl Into<String>,
        min_wind_limit: WindSpeed,
    ) -> Self {
        Self {
            station_id: station_id.into(),
            username: username.into(),
            min_wind_limit,
        }
    }

    /// Inclusive threshold: a reading equal to the limit counts as above it.
    pub fn is_reached_by(&self, speed: WindSpeed) -> bool {
        speed.value() >= self.min_wind_limit.value()
    }
}

/// Direction of an alert state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    PickedUp,
    Dropped,
}

impl Transition {
    pub fn message<'a>(&self, messages: &'a MessageConfig) -> &'a str {
        match self {
            Transition::PickedUp => &messages.picked_up,
            Transition::Dropped => &messages.dropped,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::PickedUp => f.write_str("picked up"),
            Transition::Dropped => f.write_str("dropped"),
        }
    }
}

/// One push notification to hand to the delivery pool.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRequest {
    pub station_id: StationId,
    pub username: String,
    pub transition: Transition,
    pub message: String,
    pub station: StationInfo,
    pub wind_speed: WindSpeed,
}

impl NotificationRequest {
    /// Topic the mobile client subscribes to: `/topics/<stationId><username>`.
    pub fn topic(&self) -> String {
        format!("/topics/{}{}", self.station_id, self.username)
    }
}

/// Inbound event from the ingestion collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeteoUpdate {
    pub station_id: StationId,
    pub measurement: Measurement,
}

impl MeteoUpdate {
    /// Parse and validate one JSON-encoded update.
    ///
    /// The wind speed is read as a plain number first so range violations
    /// surface as their own [`IngestError`] variants rather than `Malformed`.
    pub fn from_json(line: &str) -> Result<Self, IngestError> {
        let wire: WireUpdate =
            serde_json::from_str(line).map_err(|e| IngestError::Malformed(e.to_string()))?;

        let update = MeteoUpdate {
            station_id: wire.station_id,
            measurement: Measurement::new(
                WindSpeed::new(wire.measurement.wind_speed)?,
                wire.measurement.station,
            ),
        };
        update.validate()?;
        Ok(update)
    }

    /// Boundary checks not already enforced by [`WindSpeed`].
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.station_id.as_str().trim().is_empty() {
            return Err(IngestError::EmptyStationId);
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUpdate {
    station_id: StationId,
    measurement: WireMeasurement,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMeasurement {
    wind_speed: f64,
    station: StationInfo,
}

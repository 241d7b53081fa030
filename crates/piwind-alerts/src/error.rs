//! Alert pipeline error types.

use piwind_core::{LookupError, NetworkError};
use thiserror::Error;

/// Why a single push notification was not delivered.
///
/// Every variant is terminal for that notification: delivery is at-most-once.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Push backend rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Delivery timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Station lookup failed: {0}")]
    Lookup(#[from] LookupError),

    #[error("Failed to encode payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Delivery queue is full")]
    QueueFull,

    #[error("Delivery queue is closed")]
    QueueClosed,
}

impl DeliveryError {
    /// Whether the attempt was abandoned because it ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Network(NetworkError::Timeout))
    }

    /// Whether the notification never reached a worker.
    pub fn is_dropped(&self) -> bool {
        matches!(self, Self::QueueFull | Self::QueueClosed)
    }
}

/// Failure reported by a live listener while handling a measurement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Listener failed: {0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Inbound update rejected at the ingestion boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestError {
    #[error("Wind speed must be non-negative, got {0}")]
    NegativeWindSpeed(f64),

    #[error("Wind speed must be a finite number")]
    NonFiniteWindSpeed,

    #[error("Station id must not be empty")]
    EmptyStationId,

    #[error("Malformed update: {0}")]
    Malformed(String),
}

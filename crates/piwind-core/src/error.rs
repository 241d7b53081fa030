//! Centralized error types for the PiWind service.
//!
//! This module provides a typed error hierarchy that:
//! - Enables precise error handling throughout the alert pipeline
//! - Provides short operator-facing messages for logs and diagnostics
//! - Preserves full error context for debugging

use thiserror::Error;

/// Top-level service error type.
///
/// All errors surfaced by the PiWind binary should be convertible to this type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a short summary suitable for an operator log line.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Network(e) => e.user_message(),
            AppError::Config(e) => e.user_message(),
            AppError::Lookup(e) => e.user_message(),
            AppError::Io(_) => "A file operation failed.",
            AppError::Other(_) => "An unexpected error occurred.",
        }
    }
}

/// Network-related errors (HTTP, connectivity).
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("TLS/SSL error: {0}")]
    TlsError(String),
}

impl NetworkError {
    pub fn user_message(&self) -> &'static str {
        match self {
            NetworkError::ConnectionFailed(_) => "Unable to reach the push backend.",
            NetworkError::Timeout => "The push backend did not answer in time.",
            NetworkError::ServerError { status, .. } if *status >= 500 => {
                "The push backend is experiencing issues."
            }
            NetworkError::ServerError { .. } => "The push backend rejected the request.",
            NetworkError::InvalidResponse(_) => "Received an unexpected response from the push backend.",
            NetworkError::TlsError(_) => "Secure connection to the push backend failed.",
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),

    #[error("Missing required setting: {0}")]
    MissingSetting(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::NotFound(_) => "Configuration not found. Using defaults.",
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
            ConfigError::MissingSetting(_) => "A required setting is missing. Check your settings.",
        }
    }
}

/// Failures of the read-only collaborators the pipeline consults
/// (subscription store, station metadata repository).
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Subscriptions unavailable for station {station_id}: {reason}")]
    SubscriptionsUnavailable { station_id: String, reason: String },

    #[error("Station not found: {0}")]
    StationNotFound(String),

    #[error("Lookup backend error: {0}")]
    Backend(String),
}

impl LookupError {
    pub fn user_message(&self) -> &'static str {
        match self {
            LookupError::SubscriptionsUnavailable { .. } => {
                "Subscriptions could not be loaded; notification pass skipped."
            }
            LookupError::StationNotFound(_) => "Station metadata is missing.",
            LookupError::Backend(_) => "The station repository is unavailable.",
        }
    }
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_network_error(self) -> NetworkError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_network_error(self) -> NetworkError {
        if self.is_timeout() {
            NetworkError::Timeout
        } else if self.is_connect() {
            NetworkError::ConnectionFailed(self.to_string())
        } else if let Some(status) = self.status() {
            NetworkError::ServerError {
                status: status.as_u16(),
                message: self.to_string(),
            }
        } else if self.is_decode() || self.is_body() {
            NetworkError::InvalidResponse(self.to_string())
        } else {
            NetworkError::ConnectionFailed(self.to_string())
        }
    }
}

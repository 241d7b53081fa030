//! Push backend request body.

use serde::Serialize;

use crate::types::{NotificationRequest, StationInfo};

/// Body POSTed to the push-messaging backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushPayload {
    pub to: String,
    pub priority: &'static str,
    pub notification: PushNotification,
    pub data: PushData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushNotification {
    pub title: String,
    pub body: String,
    pub sound: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushData {
    pub id: String,
    pub name: String,
    #[serde(rename = "stationBaseURL")]
    pub station_base_url: String,
}

impl PushPayload {
    /// Build the payload using the station snapshot carried by the request.
    pub fn from_request(request: &NotificationRequest) -> Self {
        Self::with_station(request, &request.station)
    }

    /// Build the payload with explicitly supplied station metadata.
    pub fn with_station(request: &NotificationRequest, station: &StationInfo) -> Self {
        Self {
            to: request.topic(),
            priority: "high",
            notification: PushNotification {
                title: station.name.clone(),
                body: request.message.clone(),
                sound: "default",
            },
            data: PushData {
                id: request.station_id.to_string(),
                name: station.name.clone(),
                station_base_url: station.base_url.clone(),
            },
        }
    }
}

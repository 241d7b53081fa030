//! Push backend client and the per-request delivery step.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use piwind_core::{ConfigError, PushConfig, ReqwestErrorExt};
use reqwest::{header, Client};
use url::Url;

use crate::error::DeliveryError;
use crate::lookup::StationDirectory;
use crate::payload::PushPayload;
use crate::types::NotificationRequest;

/// Outbound channel to a push-messaging backend.
///
/// Returns the backend's response body on success.
pub trait PushTransport: Send + Sync + 'static {
    fn send(
        &self,
        payload: &PushPayload,
    ) -> impl Future<Output = Result<String, DeliveryError>> + Send;
}

/// Firebase Cloud Messaging legacy HTTP client.
#[derive(Debug, Clone)]
pub struct FcmClient {
    api_url: Url,
    client: Arc<Client>,
    server_key: String,
}

impl FcmClient {
    /// Create a client from the `[push]` config section.
    pub fn new(config: &PushConfig) -> Result<Self, ConfigError> {
        let server_key = config
            .server_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::MissingSetting("push.server_key".to_string()))?;

        let api_url = Url::parse(&config.api_url)
            .map_err(|e| ConfigError::Invalid(format!("push.api_url: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_url,
            client: Arc::new(client),
            server_key,
        })
    }
}

impl PushTransport for FcmClient {
    async fn send(&self, payload: &PushPayload) -> Result<String, DeliveryError> {
        let body = serde_json::to_vec(payload)?;

        let response = self
            .client
            .post(self.api_url.clone())
            .header(header::AUTHORIZATION, format!("key={}", self.server_key))
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.into_network_error()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DeliveryError::Network(e.into_network_error()))?;

        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(text)
    }
}

/// Turns a [`NotificationRequest`] into one backend call.
pub struct PushGateway<T> {
    transport: Arc<T>,
    directory: Option<Arc<dyn StationDirectory>>,
}

impl<T: PushTransport> PushGateway<T> {
    /// Gateway that formats payloads from the request's station snapshot.
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            directory: None,
        }
    }

    /// Gateway that re-reads station metadata right before each send.
    pub fn with_directory(transport: Arc<T>, directory: Arc<dyn StationDirectory>) -> Self {
        Self {
            transport,
            directory: Some(directory),
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Build the payload and perform a single send. No retries.
    pub async fn deliver(&self, request: &NotificationRequest) -> Result<String, DeliveryError> {
        let payload = match &self.directory {
            Some(directory) => {
                let station = directory.station_info(&request.station_id)?;
                PushPayload::with_station(request, &station)
            }
            None => PushPayload::from_request(request),
        };

        self.transport.send(&payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::InMemoryDirectory;
    use crate::types::{StationId, StationInfo, Transition, WindSpeed};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Capture {
        sent: Mutex<Vec<PushPayload>>,
    }

    impl PushTransport for Capture {
        async fn send(&self, payload: &PushPayload) -> Result<String, DeliveryError> {
            self.sent.lock().push(payload.clone());
            Ok("ok".to_string())
        }
    }

    fn request() -> NotificationRequest {
        NotificationRequest {
            station_id: StationId::new("s1"),
            username: "alice".into(),
            transition: Transition::Dropped,
            message: "calm".into(),
            station: StationInfo {
                name: "Snapshot".into(),
                base_url: "http://snapshot".into(),
            },
            wind_speed: WindSpeed::new(3.0).unwrap(),
        }
    }

    #[test]
    fn test_new_requires_server_key() {
        let config = PushConfig {
            api_url: "https://fcm.example/send".into(),
            server_key: None,
            request_timeout_secs: 5,
        };
        assert!(matches!(
            FcmClient::new(&config),
            Err(ConfigError::MissingSetting(_))
        ));
    }

    #[test]
    fn test_new_rejects_bad_url() {
        let config = PushConfig {
            api_url: "::nope".into(),
            server_key: Some("k".into()),
            request_timeout_secs: 5,
        };
        assert!(matches!(FcmClient::new(&config), Err(ConfigError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_deliver_uses_snapshot_by_default() {
        let gateway = PushGateway::new(Arc::new(Capture::default()));
        let response = gateway.deliver(&request()).await.unwrap();

        assert_eq!(response, "ok");
        let sent = gateway.transport().sent.lock();
        assert_eq!(sent[0].notification.title, "Snapshot");
        assert_eq!(sent[0].notification.body, "calm");
    }

    #[tokio::test]
    async fn test_deliver_refreshes_from_directory() {
        let directory = Arc::new(InMemoryDirectory::new());
        directory.add_station(
            StationId::new("s1"),
            StationInfo {
                name: "Fresh".into(),
                base_url: "http://fresh".into(),
            },
        );
        let gateway = PushGateway::with_directory(Arc::new(Capture::default()), directory);

        gateway.deliver(&request()).await.unwrap();

        let sent = gateway.transport().sent.lock();
        assert_eq!(sent[0].notification.title, "Fresh");
        assert_eq!(sent[0].data.station_base_url, "http://fresh");
    }

    #[tokio::test]
    async fn test_deliver_fails_when_station_unknown() {
        let gateway = PushGateway::with_directory(
            Arc::new(Capture::default()),
            Arc::new(InMemoryDirectory::new()),
        );

        let result = gateway.deliver(&request()).await;

        assert!(matches!(result, Err(DeliveryError::Lookup(_))));
        assert!(gateway.transport().sent.lock().is_empty());
    }
}

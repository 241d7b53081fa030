//! Bounded delivery queue drained by a fixed pool of workers.
//!
//! Enqueueing never waits: a full queue drops the notification. Each worker
//! bounds every attempt with a timeout and never retries, so delivery is
//! at-most-once and a stuck backend only ever occupies its own worker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use piwind_core::DeliveryConfig;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::error::DeliveryError;
use crate::gateway::{PushGateway, PushTransport};
use crate::types::NotificationRequest;

#[derive(Debug, Default)]
struct DeliveryStats {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of the delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStatsSnapshot {
    pub enqueued: u64,
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
}

impl DeliveryStats {
    fn snapshot(&self) -> DeliveryStatsSnapshot {
        DeliveryStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Sending side of the work queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DeliveryQueue {
    tx: mpsc::Sender<NotificationRequest>,
    stats: Arc<DeliveryStats>,
}

impl DeliveryQueue {
    /// Hand a request to the pool without waiting.
    pub fn enqueue(&self, request: NotificationRequest) -> Result<(), DeliveryError> {
        match self.tx.try_send(request) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(request)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    station_id = %request.station_id,
                    username = %request.username,
                    message = %request.message,
                    "Delivery queue full, notification dropped"
                );
                Err(DeliveryError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(request)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    station_id = %request.station_id,
                    username = %request.username,
                    message = %request.message,
                    "Delivery queue closed, notification dropped"
                );
                Err(DeliveryError::QueueClosed)
            }
        }
    }

    pub fn stats(&self) -> DeliveryStatsSnapshot {
        self.stats.snapshot()
    }
}

/// The worker tasks draining a [`DeliveryQueue`].
pub struct DeliveryPool {
    workers: Vec<JoinHandle<()>>,
    stats: Arc<DeliveryStats>,
}

impl DeliveryPool {
    /// Start `config.workers` workers on `handle`.
    pub fn spawn<T: PushTransport>(
        handle: &Handle,
        gateway: PushGateway<T>,
        config: &DeliveryConfig,
    ) -> (DeliveryQueue, DeliveryPool) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let gateway = Arc::new(gateway);
        let stats = Arc::new(DeliveryStats::default());
        let timeout = Duration::from_secs(config.timeout_secs);

        let workers = (0..config.workers.max(1))
            .map(|worker| {
                handle.spawn(run_worker(
                    worker,
                    Arc::clone(&rx),
                    Arc::clone(&gateway),
                    Arc::clone(&stats),
                    timeout,
                ))
            })
            .collect();

        tracing::info!(
            workers = config.workers.max(1),
            capacity = config.queue_capacity.max(1),
            "Delivery pool started"
        );

        (
            DeliveryQueue {
                tx,
                stats: Arc::clone(&stats),
            },
            DeliveryPool { workers, stats },
        )
    }

    pub fn stats(&self) -> DeliveryStatsSnapshot {
        self.stats.snapshot()
    }

    /// Wait until every queue handle is dropped and the queue is drained.
    pub async fn join(self) -> DeliveryStatsSnapshot {
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::error!("Delivery worker terminated abnormally: {}", e);
            }
        }
        tracing::info!("Delivery pool stopped");
        self.stats.snapshot()
    }
}

async fn run_worker<T: PushTransport>(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<NotificationRequest>>>,
    gateway: Arc<PushGateway<T>>,
    stats: Arc<DeliveryStats>,
    timeout: Duration,
) {
    loop {
        let next = rx.lock().await.recv().await;
        let Some(request) = next else {
            break;
        };

        let outcome = match tokio::time::timeout(timeout, gateway.deliver(&request)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(timeout)),
        };

        match outcome {
            Ok(response) => {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    worker,
                    station_id = %request.station_id,
                    username = %request.username,
                    transition = %request.transition,
                    "Notification sent"
                );
                tracing::debug!(worker, response = %response, "Push backend response");
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    worker,
                    station_id = %request.station_id,
                    username = %request.username,
                    message = %request.message,
                    error = %e,
                    "Notification delivery failed"
                );
            }
        }
    }

    tracing::debug!(worker, "Delivery worker exiting");
}

//! Notification dispatch adapters.
//!
//! [`NotificationDispatcher`] queues notifications for a background
//! [`NotificationWorker`] that POSTs them as signed JSON. Enqueueing never
//! waits on the network. [`LogNotifier`] only logs.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

use gifting_repo::security::{SIGNATURE_HEADER, signature_header};
use gifting_types::{Notification, NotificationDispatch, NotifyError};

const MAX_ATTEMPTS: u32 = 3;

/// Queue side of the HTTP notification adapter.
#[derive(Clone)]
pub struct NotificationDispatcher {
    sender: mpsc::Sender<Notification>,
}

impl NotificationDispatcher {
    /// Creates a dispatcher and the worker draining its queue.
    pub fn channel(
        capacity: usize,
        target_url: String,
        secret: String,
    ) -> (Self, NotificationWorker) {
        let (sender, receiver) = mpsc::channel(capacity);
        let worker = NotificationWorker {
            receiver,
            client: reqwest::Client::new(),
            target_url,
            secret,
        };
        (Self { sender }, worker)
    }

    /// Creates a dispatcher and spawns its worker on the current runtime.
    pub fn spawn(capacity: usize, target_url: String, secret: String) -> (Self, JoinHandle<()>) {
        let (dispatcher, worker) = Self::channel(capacity, target_url, secret);
        (dispatcher, tokio::spawn(worker.run()))
    }
}

#[async_trait]
impl NotificationDispatch for NotificationDispatcher {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sender
            .try_send(notification)
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => NotifyError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => NotifyError::Closed,
            })
    }
}

/// Delivers queued notifications until every dispatcher is dropped.
pub struct NotificationWorker {
    receiver: mpsc::Receiver<Notification>,
    client: reqwest::Client,
    target_url: String,
    secret: String,
}

impl NotificationWorker {
    #[instrument(skip(self), fields(target_url = %self.target_url))]
    pub async fn run(mut self) {
        info!("Starting notification worker");
        while let Some(notification) = self.receiver.recv().await {
            self.deliver(&notification).await;
        }
        info!("Notification queue closed, worker stopping");
    }

    async fn deliver(&self, notification: &Notification) {
        let body = match serde_json::to_vec(notification) {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "Failed to serialize notification");
                return;
            }
        };

        for attempt in 1..=MAX_ATTEMPTS {
            match self.send(&body).await {
                Ok(()) => return,
                Err(e) if attempt < MAX_ATTEMPTS => {
                    warn!(attempt, error = %e, "Notification delivery failed, retrying");
                    sleep(Duration::from_millis(200 * u64::from(attempt))).await;
                }
                Err(e) => {
                    error!(attempt, error = %e, "Notification delivery gave up");
                }
            }
        }
    }

    async fn send(&self, body: &[u8]) -> Result<(), NotifyError> {
        let signature = signature_header(Utc::now().timestamp(), body, &self.secret);

        let response = self
            .client
            .post(&self.target_url)
            .header(SIGNATURE_HEADER, signature)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifyError::Delivery(format!("HTTP {}", response.status())))
        }
    }
}

/// Waits for a spawned worker to finish once every dispatcher is dropped.
///
/// Returns `false` when the grace period ran out first; whatever was still
/// queued is lost.
pub async fn wait_for_drain(worker: JoinHandle<()>, grace: Duration) -> bool {
    match tokio::time::timeout(grace, worker).await {
        Ok(Ok(())) => {
            info!("Notification queue drained");
            true
        }
        Ok(Err(e)) => {
            error!(error = %e, "Notification worker aborted");
            false
        }
        Err(_) => {
            warn!(
                grace_ms = grace.as_millis() as u64,
                "Notification queue not drained before shutdown, pending notifications dropped"
            );
            false
        }
    }
}

/// Notifier used when no endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationDispatch for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        info!(?notification, "Notification (no endpoint configured)");
        Ok(())
    }
}

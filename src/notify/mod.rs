//! Notification dispatch: an ordered list of adapters, fanned out in
//! parallel with independent failure isolation.
//!
//! Grounded on the teacher's `async-trait` usage for adapter-shaped
//! interfaces; the console adapter reuses the Ring Buffer Logger's `tracing`
//! sink rather than writing to stdout directly, and the webhook adapter
//! reuses the teacher's existing `reqwest` dependency instead of introducing
//! a new HTTP client.

use crate::logger::{LogLevel, RingBufferLogger};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub phase: Option<String>,
}

#[async_trait]
pub trait NotificationAdapter: Send + Sync {
    async fn send(&self, notification: &Notification) -> bool;
}

pub struct ConsoleNotificationAdapter {
    logger: Arc<RingBufferLogger>,
}

impl ConsoleNotificationAdapter {
    pub fn new(logger: Arc<RingBufferLogger>) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl NotificationAdapter for ConsoleNotificationAdapter {
    async fn send(&self, notification: &Notification) -> bool {
        self.logger
            .log(
                LogLevel::Info,
                "notify",
                format!("{}: {}", notification.title, notification.message),
                notification.phase.clone(),
                None,
                None,
            )
            .await;
        true
    }
}

pub struct WebhookNotificationAdapter {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotificationAdapter {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationAdapter for WebhookNotificationAdapter {
    async fn send(&self, notification: &Notification) -> bool {
        self.client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map(|resp| resp.status().is_success())
            .unwrap_or(false)
    }
}

pub struct NotificationDispatcher {
    adapters: Vec<Arc<dyn NotificationAdapter>>,
}

impl NotificationDispatcher {
    /// Always carries a console adapter; a webhook adapter is added only
    /// when a URL is configured.
    pub fn new(logger: Arc<RingBufferLogger>, webhook_url: Option<String>) -> Self {
        let mut adapters: Vec<Arc<dyn NotificationAdapter>> =
            vec![Arc::new(ConsoleNotificationAdapter::new(logger))];
        if let Some(url) = webhook_url {
            adapters.push(Arc::new(WebhookNotificationAdapter::new(url)));
        }
        Self { adapters }
    }

    /// Every adapter runs in parallel; one adapter's failure never prevents
    /// another from running.
    pub async fn dispatch(&self, notification: Notification) -> Vec<bool> {
        let futures = self
            .adapters
            .iter()
            .map(|adapter| adapter.send(&notification));
        futures::future::join_all(futures).await
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.

//! Fan-out push dispatch with dead-endpoint pruning.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::registry::{PushError, SubscriptionSet};
use super::transport::{Delivery, PushTransport};
use crate::metrics;

/// Notification body, serialized to JSON for the push payload.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub url: String,
}

impl NotificationPayload {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }
}

impl Default for NotificationPayload {
    fn default() -> Self {
        Self {
            title: "GlowSync".to_string(),
            body: "Test notification".to_string(),
            url: "/".to_string(),
        }
    }
}

/// Counts from one dispatch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Deliveries attempted
    pub sent: usize,
    /// Subscriptions still registered after pruning
    pub kept: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Registry was empty; nothing attempted.
    NoSubscribers,
    Sent(DispatchReport),
}

/// Fans a payload out to every registered subscription.
///
/// Deliveries run concurrently, each bounded by `push_timeout`. Endpoints
/// the push service reports gone are pruned from the registry; transient
/// failures keep the subscription for next time.
pub struct PushDispatcher {
    registry: Arc<dyn SubscriptionSet>,
    transport: Arc<dyn PushTransport>,
    push_timeout: Duration,
}

impl PushDispatcher {
    pub fn new(
        registry: Arc<dyn SubscriptionSet>,
        transport: Arc<dyn PushTransport>,
        push_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            transport,
            push_timeout,
        }
    }

    #[tracing::instrument(skip(self, payload), fields(title = %payload.title))]
    pub async fn dispatch(
        &self,
        payload: &NotificationPayload,
    ) -> Result<DispatchOutcome, PushError> {
        let subscriptions = self.registry.all().await?;
        if subscriptions.is_empty() {
            debug!("no subscriptions registered, nothing to dispatch");
            return Ok(DispatchOutcome::NoSubscribers);
        }

        let bytes =
            serde_json::to_vec(payload).map_err(|e| PushError::Backend(e.to_string()))?;

        let bytes = &bytes;
        let deliveries = subscriptions.iter().map(|subscription| async move {
            let delivery =
                match tokio::time::timeout(self.push_timeout, self.transport.deliver(subscription, &bytes))
                    .await
                {
                    Ok(delivery) => delivery,
                    Err(_) => Delivery::Failed("delivery timed out".to_string()),
                };
            (subscription, delivery)
        });
        let results = futures::future::join_all(deliveries).await;

        let mut gone = Vec::new();
        for (subscription, delivery) in results {
            match delivery {
                Delivery::Delivered => {
                    metrics::record_push_delivery("delivered");
                }
                Delivery::Gone => {
                    info!(endpoint = %subscription.endpoint, "pruning dead push endpoint");
                    metrics::record_push_delivery("gone");
                    gone.push(subscription.endpoint.clone());
                }
                Delivery::Failed(reason) => {
                    warn!(endpoint = %subscription.endpoint, reason, "push delivery failed, subscription kept");
                    metrics::record_push_delivery("failed");
                }
            }
        }

        if !gone.is_empty() {
            self.registry.remove(&gone).await?;
        }

        let kept = subscriptions.len() - gone.len();
        metrics::set_subscriptions(kept);

        Ok(DispatchOutcome::Sent(DispatchReport {
            sent: subscriptions.len(),
            kept,
        }))
    }
}

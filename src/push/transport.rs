//! Web Push delivery transport.

use async_trait::async_trait;
use web_push::{
    ContentEncoding, HyperWebPushClient, SubscriptionInfo, VapidSignatureBuilder, WebPushClient,
    WebPushError, WebPushMessageBuilder,
};

use super::registry::{PushError, Subscription};
use crate::config::SyncConfig;

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The push service says this endpoint no longer exists. The
    /// subscription should be pruned, not retried.
    Gone,
    /// Transient or unknown failure; the subscription is kept.
    Failed(String),
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn deliver(&self, subscription: &Subscription, payload: &[u8]) -> Delivery;
}

/// VAPID-signed Web Push over HTTP.
pub struct WebPushTransport {
    client: HyperWebPushClient,
    private_key: String,
    subject: String,
}

impl WebPushTransport {
    pub fn new(config: &SyncConfig) -> Result<Self, PushError> {
        let private_key = config
            .vapid_private_key
            .clone()
            .ok_or_else(|| PushError::Transport("vapid_private_key not configured".to_string()))?;
        Ok(Self {
            client: HyperWebPushClient::new(),
            private_key,
            subject: config.vapid_subject.clone(),
        })
    }

    fn is_gone(error: &WebPushError) -> bool {
        matches!(
            error,
            WebPushError::EndpointNotValid | WebPushError::EndpointNotFound
        )
    }
}

#[async_trait]
impl PushTransport for WebPushTransport {
    async fn deliver(&self, subscription: &Subscription, payload: &[u8]) -> Delivery {
        let Some(keys) = &subscription.keys else {
            return Delivery::Failed("subscription has no encryption keys".to_string());
        };
        let info = SubscriptionInfo::new(&subscription.endpoint, &keys.p256dh, &keys.auth);

        let mut signature = match VapidSignatureBuilder::from_base64(
            &self.private_key,
            web_push::URL_SAFE_NO_PAD,
            &info,
        ) {
            Ok(builder) => builder,
            Err(e) => return Delivery::Failed(format!("vapid signature: {e}")),
        };
        signature.add_claim("sub", self.subject.clone());
        let signature = match signature.build() {
            Ok(sig) => sig,
            Err(e) => return Delivery::Failed(format!("vapid signature: {e}")),
        };

        let mut message = WebPushMessageBuilder::new(&info);
        message.set_payload(ContentEncoding::Aes128Gcm, payload);
        message.set_vapid_signature(signature);

        let message = match message.build() {
            Ok(message) => message,
            Err(e) => return Delivery::Failed(format!("message build: {e}")),
        };

        match self.client.send(message).await {
            Ok(_) => Delivery::Delivered,
            Err(e) if Self::is_gone(&e) => Delivery::Gone,
            Err(e) => Delivery::Failed(e.to_string()),
        }
    }
}

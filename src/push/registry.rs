//! Push subscription registry.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sqlx::{AnyPool, Row};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PushError {
    #[error("subscription storage error: {0}")]
    Backend(String),
    #[error("push transport misconfigured: {0}")]
    Transport(String),
}

/// Encryption keys the browser hands out alongside the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// One registered push target. The endpoint URL is the identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<SubscriptionKeys>,
}

/// Durable set of push subscriptions, keyed by endpoint.
///
/// `insert` is idempotent: re-registering an endpoint replaces nothing and
/// double-counts nothing.
#[async_trait]
pub trait SubscriptionSet: Send + Sync {
    /// Register a subscription. Returns the total count afterwards.
    async fn insert(&self, subscription: Subscription) -> Result<usize, PushError>;

    /// Snapshot of every registered subscription.
    async fn all(&self) -> Result<Vec<Subscription>, PushError>;

    /// Drop subscriptions by endpoint. Returns how many were removed.
    async fn remove(&self, endpoints: &[String]) -> Result<usize, PushError>;

    async fn count(&self) -> Result<usize, PushError>;
}

/// In-memory registry.
#[derive(Default)]
pub struct MemorySubscriptionSet {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl MemorySubscriptionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionSet for MemorySubscriptionSet {
    async fn insert(&self, subscription: Subscription) -> Result<usize, PushError> {
        let mut subs = self.subscriptions.write();
        if !subs.iter().any(|s| s.endpoint == subscription.endpoint) {
            subs.push(subscription);
        }
        Ok(subs.len())
    }

    async fn all(&self) -> Result<Vec<Subscription>, PushError> {
        Ok(self.subscriptions.read().clone())
    }

    async fn remove(&self, endpoints: &[String]) -> Result<usize, PushError> {
        let mut subs = self.subscriptions.write();
        let before = subs.len();
        subs.retain(|s| !endpoints.contains(&s.endpoint));
        Ok(before - subs.len())
    }

    async fn count(&self) -> Result<usize, PushError> {
        Ok(self.subscriptions.read().len())
    }
}

/// SQL-backed registry sharing a pool with the server-side stores.
pub struct SqlSubscriptionSet {
    pool: AnyPool,
    is_sqlite: bool,
}

impl SqlSubscriptionSet {
    pub async fn new(pool: AnyPool, is_sqlite: bool) -> Result<Self, PushError> {
        let table = if is_sqlite {
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                endpoint TEXT PRIMARY KEY,
                keys TEXT
            )
            "#
        } else {
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                endpoint VARCHAR(512) PRIMARY KEY,
                keys TEXT
            )
            "#
        };
        sqlx::query(table)
            .execute(&pool)
            .await
            .map_err(|e| PushError::Backend(e.to_string()))?;
        Ok(Self { pool, is_sqlite })
    }

    fn row_to_subscription(row: &sqlx::any::AnyRow) -> Result<Subscription, PushError> {
        let endpoint = row
            .try_get::<String, _>("endpoint")
            .map_err(|e| PushError::Backend(e.to_string()))?;
        let keys = row
            .try_get::<Option<String>, _>("keys")
            .map_err(|e| PushError::Backend(e.to_string()))?
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(|e| PushError::Backend(e.to_string()))?;
        Ok(Subscription { endpoint, keys })
    }

    async fn count_rows(&self) -> Result<usize, PushError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM subscriptions")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PushError::Backend(e.to_string()))?;
        let n = row
            .try_get::<i64, _>("n")
            .map_err(|e| PushError::Backend(e.to_string()))?;
        Ok(n as usize)
    }
}

#[async_trait]
impl SubscriptionSet for SqlSubscriptionSet {
    async fn insert(&self, subscription: Subscription) -> Result<usize, PushError> {
        let keys = subscription
            .keys
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| PushError::Backend(e.to_string()))?;

        // Idempotent by endpoint: an existing row is left untouched
        let sql = if self.is_sqlite {
            "INSERT INTO subscriptions (endpoint, keys) VALUES (?, ?) \
             ON CONFLICT (endpoint) DO NOTHING"
        } else {
            "INSERT IGNORE INTO subscriptions (endpoint, keys) VALUES (?, ?)"
        };
        sqlx::query(sql)
            .bind(&subscription.endpoint)
            .bind(keys)
            .execute(&self.pool)
            .await
            .map_err(|e| PushError::Backend(e.to_string()))?;

        self.count_rows().await
    }

    async fn all(&self) -> Result<Vec<Subscription>, PushError> {
        let rows = sqlx::query("SELECT endpoint, keys FROM subscriptions")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PushError::Backend(e.to_string()))?;
        rows.iter().map(Self::row_to_subscription).collect()
    }

    async fn remove(&self, endpoints: &[String]) -> Result<usize, PushError> {
        if endpoints.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; endpoints.len()].join(", ");
        let sql = format!("DELETE FROM subscriptions WHERE endpoint IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for endpoint in endpoints {
            query = query.bind(endpoint);
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| PushError::Backend(e.to_string()))?;
        Ok(result.rows_affected() as usize)
    }

    async fn count(&self) -> Result<usize, PushError> {
        self.count_rows().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(endpoint: &str) -> Subscription {
        Subscription {
            endpoint: endpoint.to_string(),
            keys: Some(SubscriptionKeys {
                p256dh: "key".to_string(),
                auth: "auth".to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn test_insert_is_idempotent_by_endpoint() {
        let set = MemorySubscriptionSet::new();
        assert_eq!(set.insert(sub("https://push/a")).await.unwrap(), 1);
        assert_eq!(set.insert(sub("https://push/a")).await.unwrap(), 1);
        assert_eq!(set.insert(sub("https://push/b")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_remove_by_endpoint() {
        let set = MemorySubscriptionSet::new();
        set.insert(sub("https://push/a")).await.unwrap();
        set.insert(sub("https://push/b")).await.unwrap();

        let removed = set
            .remove(&["https://push/a".to_string(), "https://push/missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(set.count().await.unwrap(), 1);
        assert_eq!(set.all().await.unwrap()[0].endpoint, "https://push/b");
    }

    #[test]
    fn test_subscription_wire_format() {
        let json = r#"{"endpoint":"https://push/a","keys":{"p256dh":"pk","auth":"ak"}}"#;
        let parsed: Subscription = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.endpoint, "https://push/a");
        assert_eq!(parsed.keys.unwrap().auth, "ak");

        // Keys are optional on the wire
        let bare: Subscription = serde_json::from_str(r#"{"endpoint":"https://push/b"}"#).unwrap();
        assert!(bare.keys.is_none());
    }
}

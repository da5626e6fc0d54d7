//! Version-tagged cache buckets.

use async_trait::async_trait;
use dashmap::DashMap;

use super::request::PageResponse;

/// A cache generation. Bucket names embed the version so a new deploy
/// writes into fresh buckets and activation can sweep everything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    prefix: String,
    version: String,
}

impl Generation {
    pub fn new(prefix: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            version: version.into(),
        }
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// App-shell bucket, populated once at install.
    #[must_use]
    pub fn static_bucket(&self) -> String {
        format!("{}-static-{}", self.prefix, self.version)
    }

    /// Runtime bucket, written by strategies as responses flow through.
    #[must_use]
    pub fn dynamic_bucket(&self) -> String {
        format!("{}-dynamic-{}", self.prefix, self.version)
    }

    /// Whether a bucket name belongs to this generation.
    #[must_use]
    pub fn owns(&self, bucket: &str) -> bool {
        bucket == self.static_bucket() || bucket == self.dynamic_bucket()
    }
}

/// Named-bucket response storage.
///
/// Keys are exact request URLs. Concurrent writers to the same key are
/// last-writer-wins; every stored value is a complete response so readers
/// never observe a torn entry.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Store a response under `key`, creating the bucket if needed.
    async fn put(&self, bucket: &str, key: &str, response: PageResponse);

    /// Exact-key lookup in one bucket.
    async fn lookup(&self, bucket: &str, key: &str) -> Option<PageResponse>;

    /// Exact-key lookup across every bucket.
    async fn lookup_any(&self, key: &str) -> Option<PageResponse>;

    /// Names of all existing buckets.
    async fn bucket_names(&self) -> Vec<String>;

    /// Drop a bucket and everything in it. Returns whether it existed.
    async fn delete_bucket(&self, bucket: &str) -> bool;
}

/// In-memory bucket store on nested concurrent maps.
#[derive(Default)]
pub struct MemoryBucketStore {
    buckets: DashMap<String, DashMap<String, PageResponse>>,
}

impl MemoryBucketStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BucketStore for MemoryBucketStore {
    async fn put(&self, bucket: &str, key: &str, response: PageResponse) {
        self.buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), response);
    }

    async fn lookup(&self, bucket: &str, key: &str) -> Option<PageResponse> {
        self.buckets
            .get(bucket)
            .and_then(|b| b.get(key).map(|r| r.clone()))
    }

    async fn lookup_any(&self, key: &str) -> Option<PageResponse> {
        for bucket in self.buckets.iter() {
            if let Some(response) = bucket.get(key) {
                return Some(response.clone());
            }
        }
        None
    }

    async fn bucket_names(&self) -> Vec<String> {
        self.buckets.iter().map(|b| b.key().clone()).collect()
    }

    async fn delete_bucket(&self, bucket: &str) -> bool {
        self.buckets.remove(bucket).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &str) -> PageResponse {
        PageResponse::new(200, Some("text/plain".to_string()), body.to_string())
    }

    #[test]
    fn test_generation_bucket_names() {
        let generation = Generation::new("glowsync", "v11");
        assert_eq!(generation.static_bucket(), "glowsync-static-v11");
        assert_eq!(generation.dynamic_bucket(), "glowsync-dynamic-v11");
        assert!(generation.owns("glowsync-static-v11"));
        assert!(!generation.owns("glowsync-static-v10"));
    }

    #[tokio::test]
    async fn test_put_and_lookup() {
        let store = MemoryBucketStore::new();
        store.put("a", "https://x/1", response("one")).await;

        assert_eq!(store.lookup("a", "https://x/1").await, Some(response("one")));
        assert_eq!(store.lookup("a", "https://x/2").await, None);
        assert_eq!(store.lookup("b", "https://x/1").await, None);
    }

    #[tokio::test]
    async fn test_lookup_any_spans_buckets() {
        let store = MemoryBucketStore::new();
        store.put("a", "https://x/1", response("one")).await;
        store.put("b", "https://x/2", response("two")).await;

        assert_eq!(store.lookup_any("https://x/2").await, Some(response("two")));
        assert_eq!(store.lookup_any("https://x/3").await, None);
    }

    #[tokio::test]
    async fn test_delete_bucket() {
        let store = MemoryBucketStore::new();
        store.put("a", "https://x/1", response("one")).await;

        assert!(store.delete_bucket("a").await);
        assert!(!store.delete_bucket("a").await);
        assert_eq!(store.lookup_any("https://x/1").await, None);
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let store = MemoryBucketStore::new();
        store.put("a", "https://x/1", response("old")).await;
        store.put("a", "https://x/1", response("new")).await;

        assert_eq!(store.lookup("a", "https://x/1").await, Some(response("new")));
    }
}

use moka::future::Cache;
use std::time::Duration;

/// Records known to be settled, so replays and redelivered events can skip the
/// database round trip. A miss proves nothing; the conditional claim in storage decides.
pub struct SettledCache {
    inner: Cache<u64, ()>,
}

impl SettledCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(Duration::from_secs(86400)) // 24h TTL
                .build(),
        }
    }

    pub async fn mark_settled(&self, record_id: u64) {
        self.inner.insert(record_id, ()).await;
    }

    pub async fn is_settled(&self, record_id: u64) -> bool {
        self.inner.get(&record_id).await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn remembers_marked_records() {
        let cache = SettledCache::new(16);
        assert!(!cache.is_settled(1).await);
        cache.mark_settled(1).await;
        assert!(cache.is_settled(1).await);
        assert!(!cache.is_settled(2).await);
    }
}

//! C5 EphemeralStore: an in-process `dashmap` implementation. Sufficient for
//! a single-process coordinator; a Redis-backed implementation would satisfy
//! the same trait for a multi-process deployment without the rest of the
//! system noticing (the point of the trait seam).

use crate::store::EphemeralStore;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

pub struct DashMapEphemeralStore {
    entries: DashMap<String, Entry>,
}

impl DashMapEphemeralStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    fn is_live(entry: &Entry) -> bool {
        Instant::now() < entry.expires_at
    }
}

impl Default for DashMapEphemeralStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EphemeralStore for DashMapEphemeralStore {
    async fn get(&self, key: &str) -> eyre::Result<Option<Vec<u8>>> {
        match self.entries.get(key) {
            Some(entry) if Self::is_live(&entry) => Ok(Some(entry.value.clone())),
            Some(_) => {
                self.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> eyre::Result<()> {
        self.entries.insert(
            key.to_owned(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> eyre::Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> eyre::Result<i64> {
        let mut entry = self.entries.entry(key.to_owned()).or_insert_with(|| Entry {
            value: 0i64.to_le_bytes().to_vec(),
            expires_at: Instant::now() + ttl,
        });

        if !Self::is_live(&entry) {
            entry.value = 0i64.to_le_bytes().to_vec();
            entry.expires_at = Instant::now() + ttl;
        }

        let current = i64::from_le_bytes(entry.value.clone().try_into().unwrap_or([0; 8]));
        let next = current + 1;
        entry.value = next.to_le_bytes().to_vec();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn incr_starts_at_one_and_accumulates() {
        let store = DashMapEphemeralStore::new();
        assert_eq!(store.incr("k", Duration::from_secs(60)).await.unwrap(), 1);
        assert_eq!(store.incr("k", Duration::from_secs(60)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn get_set_delete_round_trip() {
        let store = DashMapEphemeralStore::new();
        store
            .set("k", b"v".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entry_reads_as_absent() {
        let store = DashMapEphemeralStore::new();
        store
            .set("k", b"v".to_vec(), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}

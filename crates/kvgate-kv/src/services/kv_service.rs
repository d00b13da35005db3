//! KV Service implementation over an injected store client

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use utoipa::ToSchema;

use super::KvConfig;
use crate::error::{KvError, StoreError};
use crate::store::KvStore;

/// Expiry applied to every upsert
pub const UPSERT_TTL: Duration = Duration::from_secs(60 * 60);
/// COUNT hint passed to each SCAN
pub const SCAN_PAGE_SIZE: usize = 10;
/// MATCH pattern used when enumerating
pub const SCAN_PATTERN: &str = "*";

/// A stored key and its value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct KeyValue {
    #[schema(example = "session:42")]
    pub key: String,
    #[schema(example = "active")]
    pub value: String,
}

/// Result of a FetchAll.
///
/// Enumeration is best-effort: a key found by the scan but gone (or
/// unreadable) by the time it is fetched lands in `skipped` instead of
/// failing the call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enumeration {
    /// Readable entries, in scan order. Duplicates from the scan are kept.
    pub entries: Vec<KeyValue>,
    /// Keys discovered by the scan that could not be read.
    pub skipped: Vec<String>,
}

impl Enumeration {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Cursor-driven iteration over the keyspace, one SCAN page at a time.
pub struct KeyScan<'a> {
    store: &'a dyn KvStore,
    cursor: u64,
    finished: bool,
    timeout: Duration,
}

impl<'a> KeyScan<'a> {
    fn new(store: &'a dyn KvStore, timeout: Duration) -> Self {
        Self {
            store,
            cursor: 0,
            finished: false,
            timeout,
        }
    }

    /// Fetch the next page. `Ok(None)` once the store has returned cursor 0.
    pub async fn next_page(&mut self) -> Result<Option<Vec<String>>, StoreError> {
        if self.finished {
            return Ok(None);
        }

        let page = bounded(
            self.timeout,
            self.store.scan(self.cursor, SCAN_PATTERN, SCAN_PAGE_SIZE),
        )
        .await?;

        self.cursor = page.cursor;
        self.finished = page.is_last();

        Ok(Some(page.keys))
    }

    /// Drain every remaining page into a single list.
    pub async fn collect_keys(mut self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        while let Some(page) = self.next_page().await? {
            keys.extend(page);
        }
        Ok(keys)
    }
}

async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}

fn require_key(key: &str) -> Result<(), KvError> {
    if key.is_empty() {
        return Err(KvError::Validation("Key must not be empty".to_string()));
    }
    Ok(())
}

/// Stateless access layer: every call is one or more round trips to the
/// store, nothing is cached in process.
pub struct KvService {
    store: Arc<dyn KvStore>,
    config: KvConfig,
}

impl KvService {
    pub fn new(store: Arc<dyn KvStore>, config: KvConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &KvConfig {
        &self.config
    }

    /// Write a value, replacing any previous value and resetting its expiry
    /// to [`UPSERT_TTL`].
    pub async fn upsert(&self, key: &str, value: &str) -> Result<(), KvError> {
        require_key(key)?;

        debug!("KV UPSERT {}", key);

        bounded(
            self.config.operation_timeout(),
            self.store.set_ex(key, value, UPSERT_TTL),
        )
        .await?;

        Ok(())
    }

    /// Read a value. Does not touch the key's expiry.
    pub async fn fetch(&self, key: &str) -> Result<String, KvError> {
        require_key(key)?;

        debug!("KV FETCH {}", key);

        bounded(self.config.operation_timeout(), self.store.get(key))
            .await?
            .ok_or_else(|| KvError::KeyNotFound(key.to_string()))
    }

    /// Start a page-by-page scan of the whole keyspace.
    pub fn scan(&self) -> KeyScan<'_> {
        KeyScan::new(self.store.as_ref(), self.config.operation_timeout())
    }

    /// Enumerate every key with its value, bounded by the configured
    /// fetch-all timeout.
    pub async fn fetch_all(&self) -> Result<Enumeration, KvError> {
        self.fetch_all_with_cancel(&CancellationToken::new()).await
    }

    /// Like [`fetch_all`](Self::fetch_all), but stops as soon as `cancel`
    /// fires.
    ///
    /// The deadline and `cancel` abort the scan phase with an error. Once the
    /// scan is complete they only cut the fetch phase short: keys not read yet
    /// are reported in [`Enumeration::skipped`].
    pub async fn fetch_all_with_cancel(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Enumeration, KvError> {
        let limit = self.config.fetch_all_timeout();
        let deadline = Instant::now() + limit;

        // A failed page discards everything scanned so far.
        let keys = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("KV FETCH ALL cancelled during scan");
                return Err(StoreError::Cancelled.into());
            }
            result = tokio::time::timeout_at(deadline, self.scan().collect_keys()) => match result {
                Ok(keys) => keys?,
                Err(_) => {
                    warn!("KV FETCH ALL scan exceeded {:?}", limit);
                    return Err(StoreError::Timeout(limit).into());
                }
            },
        };

        debug!("KV FETCH ALL scanned {} keys", keys.len());

        let mut enumeration = Enumeration::default();
        let mut keys = keys.into_iter();
        while let Some(key) = keys.next() {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = tokio::time::timeout_at(
                    deadline,
                    bounded(self.config.operation_timeout(), self.store.get(&key)),
                ) => result.ok(),
            };

            match read {
                Some(Ok(Some(value))) => enumeration.entries.push(KeyValue { key, value }),
                Some(Ok(None)) => {
                    debug!("KV FETCH ALL key {} vanished before read", key);
                    enumeration.skipped.push(key);
                }
                Some(Err(e)) => {
                    warn!("KV FETCH ALL could not read {}: {}", key, e);
                    enumeration.skipped.push(key);
                }
                None => {
                    warn!(
                        "KV FETCH ALL stopped early, {} keys left unread",
                        keys.len() + 1
                    );
                    enumeration.skipped.push(key);
                    enumeration.skipped.extend(keys.by_ref());
                    break;
                }
            }
        }

        Ok(enumeration)
    }

    /// Delete a key. The store's deletion count decides whether it existed.
    pub async fn remove(&self, key: &str) -> Result<(), KvError> {
        require_key(key)?;

        debug!("KV REMOVE {}", key);

        let deleted = bounded(self.config.operation_timeout(), self.store.del(key)).await?;
        if deleted == 0 {
            return Err(KvError::KeyNotFound(key.to_string()));
        }

        Ok(())
    }

    /// Check that the store answers.
    pub async fn health(&self) -> Result<(), KvError> {
        bounded(self.config.operation_timeout(), self.store.ping()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ScanPage;
    use crate::test_utils::MemoryStore;
    use async_trait::async_trait;
    use mockall::mock;

    mock! {
        Store {}
        #[async_trait]
        impl KvStore for Store {
            async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
            async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
            async fn del(&self, key: &str) -> Result<u64, StoreError>;
            async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<ScanPage, StoreError>;
            async fn ping(&self) -> Result<(), StoreError>;
        }
    }

    /// Store whose commands never complete
    struct StalledStore;

    #[async_trait]
    impl KvStore for StalledStore {
        async fn set_ex(&self, _: &str, _: &str, _: Duration) -> Result<(), StoreError> {
            std::future::pending().await
        }
        async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
            std::future::pending().await
        }
        async fn del(&self, _: &str) -> Result<u64, StoreError> {
            std::future::pending().await
        }
        async fn scan(&self, _: u64, _: &str, _: usize) -> Result<ScanPage, StoreError> {
            std::future::pending().await
        }
        async fn ping(&self) -> Result<(), StoreError> {
            std::future::pending().await
        }
    }

    /// Scans to a fixed key list; only `a` can be read, every other GET hangs
    struct HangingReadStore;

    #[async_trait]
    impl KvStore for HangingReadStore {
        async fn set_ex(&self, _: &str, _: &str, _: Duration) -> Result<(), StoreError> {
            Ok(())
        }
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            if key == "a" {
                return Ok(Some("1".to_string()));
            }
            std::future::pending().await
        }
        async fn del(&self, _: &str) -> Result<u64, StoreError> {
            Ok(0)
        }
        async fn scan(&self, _: u64, _: &str, _: usize) -> Result<ScanPage, StoreError> {
            Ok(ScanPage {
                keys: vec!["a".to_string(), "b".to_string(), "c".to_string()],
                cursor: 0,
            })
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn memory_service() -> (Arc<MemoryStore>, KvService) {
        let store = Arc::new(MemoryStore::new());
        let service = KvService::new(store.clone(), KvConfig::default());
        (store, service)
    }

    fn connection_refused() -> StoreError {
        StoreError::ConnectionFailed("connection refused".to_string())
    }

    #[tokio::test]
    async fn test_upsert_then_fetch_round_trip() {
        let (_, service) = memory_service();

        service.upsert("user:1", "alice").await.unwrap();

        assert_eq!(service.fetch("user:1").await.unwrap(), "alice");
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let (store, service) = memory_service();

        service.upsert("k", "v").await.unwrap();
        service.upsert("k", "v").await.unwrap();

        assert_eq!(service.fetch("k").await.unwrap(), "v");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_overwrite_remove_scenario() {
        let (_, service) = memory_service();

        service.upsert("a", "1").await.unwrap();
        assert_eq!(service.fetch("a").await.unwrap(), "1");

        service.upsert("a", "2").await.unwrap();
        assert_eq!(service.fetch("a").await.unwrap(), "2");

        service.remove("a").await.unwrap();
        assert!(matches!(
            service.fetch("a").await,
            Err(KvError::KeyNotFound(k)) if k == "a"
        ));

        assert!(matches!(
            service.remove("a").await,
            Err(KvError::KeyNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_never_inserted_key_is_not_found() {
        let (_, service) = memory_service();
        assert!(matches!(
            service.remove("ghost").await,
            Err(KvError::KeyNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_upsert_uses_one_hour_ttl() {
        let mut store = MockStore::new();
        store
            .expect_set_ex()
            .withf(|key, value, ttl| key == "k" && value == "v" && *ttl == Duration::from_secs(3600))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let service = KvService::new(Arc::new(store), KvConfig::default());
        service.upsert("k", "v").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_upsert_resets_expiry_and_fetch_does_not_extend_it() {
        let (store, service) = memory_service();

        service.upsert("k", "v1").await.unwrap();
        tokio::time::advance(Duration::from_secs(1800)).await;

        service.fetch("k").await.unwrap();
        assert_eq!(store.ttl("k"), Some(Duration::from_secs(1800)));

        service.upsert("k", "v2").await.unwrap();
        assert_eq!(store.ttl("k"), Some(UPSERT_TTL));

        tokio::time::advance(UPSERT_TTL + Duration::from_secs(1)).await;
        assert!(matches!(
            service.fetch("k").await,
            Err(KvError::KeyNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_key_rejected_before_store() {
        // No expectations: any store call would panic.
        let service = KvService::new(Arc::new(MockStore::new()), KvConfig::default());

        assert!(matches!(
            service.upsert("", "v").await,
            Err(KvError::Validation(_))
        ));
        assert!(matches!(service.fetch("").await, Err(KvError::Validation(_))));
        assert!(matches!(service.remove("").await, Err(KvError::Validation(_))));
    }

    #[tokio::test]
    async fn test_store_failures_propagate() {
        let mut store = MockStore::new();
        store
            .expect_set_ex()
            .returning(|_, _, _| Err(connection_refused()));
        store.expect_get().returning(|_| Err(connection_refused()));
        store.expect_del().returning(|_| Err(connection_refused()));

        let service = KvService::new(Arc::new(store), KvConfig::default());

        assert!(matches!(
            service.upsert("k", "v").await,
            Err(KvError::Store(StoreError::ConnectionFailed(_)))
        ));
        assert!(matches!(service.fetch("k").await, Err(KvError::Store(_))));
        assert!(matches!(service.remove("k").await, Err(KvError::Store(_))));
    }

    #[tokio::test]
    async fn test_remove_uses_deletion_count() {
        let mut store = MockStore::new();
        store.expect_del().withf(|key| key == "k").returning(|_| Ok(1));
        store.expect_get().never();

        let service = KvService::new(Arc::new(store), KvConfig::default());
        service.remove("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_all_on_empty_store() {
        let (_, service) = memory_service();

        let enumeration = service.fetch_all().await.unwrap();

        assert!(enumeration.entries.is_empty());
        assert!(enumeration.is_complete());
    }

    #[tokio::test]
    async fn test_fetch_all_returns_every_key_across_pages() {
        let (_, service) = memory_service();
        for i in 0..37 {
            service
                .upsert(&format!("key:{}", i), &format!("value:{}", i))
                .await
                .unwrap();
        }
        service.upsert("key:3", "rewritten").await.unwrap();

        let enumeration = service.fetch_all().await.unwrap();

        assert!(enumeration.is_complete());
        assert_eq!(enumeration.entries.len(), 37);
        for entry in &enumeration.entries {
            let expected = if entry.key == "key:3" {
                "rewritten".to_string()
            } else {
                entry.key.replace("key", "value")
            };
            assert_eq!(entry.value, expected);
        }
    }

    #[tokio::test]
    async fn test_fetch_all_follows_cursor_with_fixed_pattern_and_count() {
        let mut store = MockStore::new();
        store
            .expect_scan()
            .withf(|cursor, pattern, count| *cursor == 0 && pattern == "*" && *count == 10)
            .times(1)
            .returning(|_, _, _| {
                Ok(ScanPage {
                    keys: vec!["a".to_string()],
                    cursor: 17,
                })
            });
        store
            .expect_scan()
            .withf(|cursor, pattern, count| *cursor == 17 && pattern == "*" && *count == 10)
            .times(1)
            .returning(|_, _, _| {
                Ok(ScanPage {
                    keys: vec!["a".to_string(), "b".to_string()],
                    cursor: 0,
                })
            });
        store
            .expect_get()
            .returning(|key| Ok(Some(format!("{}-value", key))));

        let service = KvService::new(Arc::new(store), KvConfig::default());
        let enumeration = service.fetch_all().await.unwrap();

        let keys: Vec<&str> = enumeration
            .entries
            .iter()
            .map(|kv| kv.key.as_str())
            .collect();
        // Duplicates across pages are passed through.
        assert_eq!(keys, vec!["a", "a", "b"]);
    }

    #[tokio::test]
    async fn test_fetch_all_skips_vanished_and_failed_keys() {
        let mut store = MockStore::new();
        store.expect_scan().returning(|_, _, _| {
            Ok(ScanPage {
                keys: vec!["a".to_string(), "b".to_string(), "c".to_string()],
                cursor: 0,
            })
        });
        store.expect_get().returning(|key| match key {
            "a" => Ok(Some("1".to_string())),
            "b" => Ok(None),
            _ => Err(connection_refused()),
        });

        let service = KvService::new(Arc::new(store), KvConfig::default());
        let enumeration = service.fetch_all().await.unwrap();

        assert_eq!(
            enumeration.entries,
            vec![KeyValue {
                key: "a".to_string(),
                value: "1".to_string()
            }]
        );
        assert_eq!(enumeration.skipped, vec!["b".to_string(), "c".to_string()]);
        assert!(!enumeration.is_complete());
    }

    #[tokio::test]
    async fn test_fetch_all_aborts_on_scan_failure() {
        let mut store = MockStore::new();
        store
            .expect_scan()
            .withf(|cursor, _, _| *cursor == 0)
            .returning(|_, _, _| {
                Ok(ScanPage {
                    keys: vec!["a".to_string()],
                    cursor: 4,
                })
            });
        store
            .expect_scan()
            .withf(|cursor, _, _| *cursor == 4)
            .returning(|_, _, _| Err(connection_refused()));
        store.expect_get().never();

        let service = KvService::new(Arc::new(store), KvConfig::default());

        assert!(matches!(
            service.fetch_all().await,
            Err(KvError::Store(StoreError::ConnectionFailed(_)))
        ));
    }

    #[tokio::test]
    async fn test_fetch_all_honours_cancellation() {
        let service = KvService::new(Arc::new(StalledStore), KvConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(
            service.fetch_all_with_cancel(&cancel).await,
            Err(KvError::Store(StoreError::Cancelled))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_all_deadline() {
        let config = KvConfig {
            operation_timeout_ms: 60_000,
            fetch_all_timeout_ms: 100,
        };
        let service = KvService::new(Arc::new(StalledStore), config);

        assert!(matches!(
            service.fetch_all().await,
            Err(KvError::Store(StoreError::Timeout(limit))) if limit == Duration::from_millis(100)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_all_deadline_during_reads_keeps_entries() {
        let config = KvConfig {
            operation_timeout_ms: 60_000,
            fetch_all_timeout_ms: 100,
        };
        let service = KvService::new(Arc::new(HangingReadStore), config);

        let enumeration = service.fetch_all().await.unwrap();

        assert_eq!(
            enumeration.entries,
            vec![KeyValue {
                key: "a".to_string(),
                value: "1".to_string()
            }]
        );
        assert_eq!(enumeration.skipped, vec!["b".to_string(), "c".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_all_cancelled_during_reads_keeps_entries() {
        let config = KvConfig {
            operation_timeout_ms: 60_000,
            ..Default::default()
        };
        let service = KvService::new(Arc::new(HangingReadStore), config);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let enumeration = service.fetch_all_with_cancel(&cancel).await.unwrap();

        assert_eq!(enumeration.entries.len(), 1);
        assert_eq!(enumeration.entries[0].key, "a");
        assert_eq!(enumeration.skipped, vec!["b".to_string(), "c".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_operation_timeout() {
        let config = KvConfig {
            operation_timeout_ms: 50,
            ..Default::default()
        };
        let service = KvService::new(Arc::new(StalledStore), config);

        assert!(matches!(
            service.fetch("k").await,
            Err(KvError::Store(StoreError::Timeout(_)))
        ));
        assert!(matches!(
            service.health().await,
            Err(KvError::Store(StoreError::Timeout(_)))
        ));
    }

    #[tokio::test]
    async fn test_key_scan_yields_pages_until_done() {
        let (_, service) = memory_service();
        for i in 0..15 {
            service.upsert(&format!("k{}", i), "v").await.unwrap();
        }

        let mut scan = service.scan();
        let first = scan.next_page().await.unwrap().unwrap();
        let second = scan.next_page().await.unwrap().unwrap();

        assert_eq!(first.len(), 10);
        assert_eq!(second.len(), 5);
        assert!(scan.next_page().await.unwrap().is_none());
    }
}

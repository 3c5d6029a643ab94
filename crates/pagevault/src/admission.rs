//! Traffic-sampling admission policy
//!
//! Decides whether a request should regenerate its page. Pages that see
//! little traffic near their expiry keep being served from the store
//! instead of costing an origin render.

use tracing::debug;

use pagevault_core::{CacheSettings, KvStore, PageEntry};

use crate::key::CacheKeys;

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Admission {
    pub regenerate: bool,
    /// A counter call failed along the way
    pub store_failed: bool,
}

impl Admission {
    fn regenerate(regenerate: bool) -> Self {
        Self {
            regenerate,
            store_failed: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    min_hits: u64,
    window: u64,
    schema_version: u64,
    samples: bool,
}

impl AdmissionPolicy {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            min_hits: settings.min_hits_before_cache,
            window: settings.sampling_window,
            schema_version: settings.schema_version,
            samples: settings.samples_traffic(),
        }
    }

    pub async fn evaluate<S: KvStore + ?Sized>(
        &self,
        store: &S,
        entry: Option<&PageEntry>,
        keys: &CacheKeys,
        document_version: u64,
        now: u64,
    ) -> Admission {
        let Some(entry) = entry else {
            return Admission::regenerate(true);
        };

        if entry.schema_version != self.schema_version
            || entry.document_version != document_version
        {
            debug!(key = %keys.cache_key, "entry version is outdated");
            return Admission::regenerate(true);
        }

        let expired = !entry.is_fresh(now);
        if !self.samples {
            return Admission::regenerate(expired);
        }

        if now < entry.sampling_starts_at(self.window) {
            return Admission::regenerate(false);
        }

        match store.increment(&keys.counter, 1).await {
            Ok(hits) if hits >= i64::try_from(self.min_hits).unwrap_or(i64::MAX) && expired => {
                debug!(key = %keys.cache_key, hits, "sampling threshold met");
                let store_failed = store.delete(&keys.counter).await.is_err();
                Admission {
                    regenerate: true,
                    store_failed,
                }
            }
            Ok(_) => Admission::regenerate(false),
            Err(_) => Admission {
                regenerate: expired,
                store_failed: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{KeyBuilder, VariantRegistry};
    use pagevault_core::{HeaderList, ManualClock};
    use pagevault_storage::{MemoryConfig, MemoryStore};

    fn entry(captured_at: u64) -> PageEntry {
        PageEntry {
            body: b"page".to_vec(),
            captured_at,
            generation_secs: 0.1,
            headers: HeaderList::new(),
            status: 200,
            status_line: None,
            redirect_status: None,
            redirect_location: None,
            max_age: 300,
            schema_version: 1,
            document_version: 0,
        }
    }

    fn keys() -> CacheKeys {
        let builder = KeyBuilder::new(&CacheSettings::default(), VariantRegistry::new());
        let request = http::Request::get("http://a.test/").body(()).unwrap();
        let view = pagevault_http::RequestView::from_request(&request);
        builder.keys(&builder.identity(&view)).unwrap()
    }

    fn store() -> MemoryStore {
        MemoryStore::with_clock(MemoryConfig::default(), ManualClock::starting_at(0))
    }

    #[tokio::test]
    async fn test_absent_entry_regenerates() {
        let policy = AdmissionPolicy::new(&CacheSettings::default());
        let a = policy.evaluate(&store(), None, &keys(), 0, 0).await;
        assert!(a.regenerate);
        assert!(!a.store_failed);
    }

    #[tokio::test]
    async fn test_version_mismatch_regenerates() {
        let policy = AdmissionPolicy::new(&CacheSettings::default());
        let store = store();
        let e = entry(0);
        assert!(policy.evaluate(&store, Some(&e), &keys(), 1, 10).await.regenerate);

        let bumped = AdmissionPolicy::new(&CacheSettings::builder().schema_version(2).build());
        assert!(bumped.evaluate(&store, Some(&e), &keys(), 0, 10).await.regenerate);
    }

    #[tokio::test]
    async fn test_sampling_timeline() {
        let policy = AdmissionPolicy::new(&CacheSettings::default());
        let store = store();
        let keys = keys();
        let e = entry(0);

        // Before the window the counter is untouched
        assert!(!policy.evaluate(&store, Some(&e), &keys, 0, 100).await.regenerate);
        assert!(store.get(&keys.counter).await.unwrap().is_none());

        assert!(!policy.evaluate(&store, Some(&e), &keys, 0, 181).await.regenerate);
        assert!(!policy.evaluate(&store, Some(&e), &keys, 0, 182).await.regenerate);
        assert_eq!(store.get(&keys.counter).await.unwrap(), Some(b"2".to_vec()));

        assert!(policy.evaluate(&store, Some(&e), &keys, 0, 300).await.regenerate);
        assert!(store.get(&keys.counter).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_below_threshold_keeps_serving_stale() {
        let policy = AdmissionPolicy::new(&CacheSettings::builder().sampling(5, 120).build());
        let store = store();
        let e = entry(0);
        let a = policy.evaluate(&store, Some(&e), &keys(), 0, 310).await;
        assert!(!a.regenerate);
    }

    #[tokio::test]
    async fn test_huge_threshold_never_met() {
        let policy =
            AdmissionPolicy::new(&CacheSettings::builder().sampling(u64::MAX, 120).build());
        let store = store();
        let keys = keys();
        let e = entry(0);
        for now in [200, 310, 320] {
            assert!(!policy.evaluate(&store, Some(&e), &keys, 0, now).await.regenerate);
        }
        assert_eq!(store.get(&keys.counter).await.unwrap(), Some(b"3".to_vec()));
    }

    #[tokio::test]
    async fn test_always_cache_regenerates_only_when_stale() {
        let policy = AdmissionPolicy::new(&CacheSettings::builder().always_cache().build());
        let store = store();
        let keys = keys();
        let e = entry(0);
        assert!(!policy.evaluate(&store, Some(&e), &keys, 0, 299).await.regenerate);
        assert!(policy.evaluate(&store, Some(&e), &keys, 0, 300).await.regenerate);
        assert!(store.get(&keys.counter).await.unwrap().is_none());
    }
}

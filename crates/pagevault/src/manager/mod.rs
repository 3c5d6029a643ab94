//! Page cache manager

use std::sync::Arc;
use tracing::{debug, warn};

use http::HeaderMap;
use pagevault_core::{
    BypassReason, CacheError, CacheMetrics, CacheSettings, CacheStatus, Clock, Compressor,
    EntryCodec, JsonSerializer, KvStore, NoopMetrics, PageEntry, Result, Serializer, SystemClock,
};
use pagevault_http::{BypassRules, HeaderFilter, RequestView, response::set_header};

use crate::admission::AdmissionPolicy;
use crate::key::{CacheKeys, KeyBuilder, VariantRegistry, VariantValue};
use crate::lock::RegenerationLock;

mod bounded;
use bounded::BoundedStore;

mod capture;
pub use capture::{CaptureOutcome, RenderedResponse};

mod dispatch;
pub use dispatch::{Action, CacheDecision, Dispatch};

/// Full-page response cache over a key-value store
///
/// Generic over:
/// - `S`: The store (memory, Redis, or a guarded store)
/// - `Ser`: The serializer for stored entries (JSON, MessagePack, Bincode)
/// - `M`: The metrics collector
///
/// Cloning is cheap; clones share the store and configuration.
pub struct PageCache<S, Ser = JsonSerializer, M = NoopMetrics>
where
    S: KvStore,
    Ser: Serializer,
    M: CacheMetrics,
{
    inner: Arc<Inner<S, Ser, M>>,
}

struct Inner<S, Ser, M> {
    store: BoundedStore<S, M>,
    codec: EntryCodec<Ser>,
    metrics: Arc<M>,
    settings: CacheSettings,
    rules: BypassRules,
    headers: HeaderFilter,
    keys: KeyBuilder,
    admission: AdmissionPolicy,
    lock: RegenerationLock,
    clock: Arc<dyn Clock>,
}

impl<S: KvStore> PageCache<S, JsonSerializer, NoopMetrics> {
    /// Create a cache with default settings, JSON entries and no metrics
    pub fn new(store: S) -> Result<Self> {
        Self::builder(store).build()
    }

    pub fn with_settings(store: S, settings: CacheSettings) -> Result<Self> {
        Self::builder(store).settings(settings).build()
    }

    pub fn builder(store: S) -> PageCacheBuilder<S> {
        PageCacheBuilder::new(store)
    }
}

impl<S, Ser, M> PageCache<S, Ser, M>
where
    S: KvStore,
    Ser: Serializer,
    M: CacheMetrics,
{
    pub fn settings(&self) -> &CacheSettings {
        &self.inner.settings
    }

    /// The wrapped store, without timeout bounds
    pub fn store(&self) -> &S {
        self.inner.store.inner()
    }

    pub fn metrics(&self) -> &M {
        &self.inner.metrics
    }

    pub fn variants(&self) -> &VariantRegistry {
        self.inner.keys.variants()
    }

    /// Store keys a request would be cached under
    pub fn keys_for(&self, request: &RequestView) -> Result<CacheKeys> {
        let keys = &self.inner.keys;
        keys.keys(&keys.identity(request))
    }

    /// Force regeneration of every cached variant of one document
    ///
    /// Stores a new document version; entries captured under any other
    /// version regenerate on their next request. Versions are unix seconds,
    /// bumped past the current one when expired twice within a second, so a
    /// version key that lapses from the store never brings an old version
    /// back. Returns the new version.
    pub async fn expire_document(&self, host: &str, path: &str) -> Result<u64> {
        let host = host.to_ascii_lowercase();
        let path = if path.is_empty() { "/" } else { path };
        let key = self.inner.keys.document_version_key(&host, path)?;

        let current = self.read_version(&key).await?;
        let version = self.now().max(current.saturating_add(1));
        let settings = &self.inner.settings;
        self.inner
            .store
            .set(&key, version.to_string().into_bytes(), settings.entry_ttl(settings.max_age))
            .await?;
        debug!(%host, path, version, "document expired");
        Ok(version)
    }

    fn now(&self) -> u64 {
        self.inner.clock.now()
    }

    /// Write the status signal, if enabled
    fn signal(&self, headers: &mut HeaderMap, status: CacheStatus, reason: Option<BypassReason>) {
        let settings = &self.inner.settings;
        if !settings.add_status_header {
            return;
        }
        set_header(headers, &settings.status_header, status.as_str());
        if let Some(reason) = reason {
            set_header(headers, &settings.reason_header, reason.as_str());
        }
    }

    /// Current version of a document; a missing key is version 0
    async fn document_version(&self, keys: &CacheKeys) -> Result<u64> {
        self.read_version(&keys.document_version).await
    }

    async fn read_version(&self, key: &str) -> Result<u64> {
        let Some(raw) = self.inner.store.get(key).await? else {
            return Ok(0);
        };
        let version = std::str::from_utf8(&raw)
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok());
        Ok(version.unwrap_or_else(|| {
            warn!(key, "unreadable document version");
            0
        }))
    }

    /// Fetch and decode the stored entry; a malformed entry reads as absent
    async fn load_entry(&self, keys: &CacheKeys) -> Result<Option<PageEntry>> {
        let Some(raw) = self.inner.store.get(&keys.entry).await? else {
            return Ok(None);
        };
        match self.inner.codec.decode(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!(key = %keys.cache_key, error = %e, "discarding malformed entry");
                Ok(None)
            }
        }
    }
}

impl<S, Ser, M> Clone for PageCache<S, Ser, M>
where
    S: KvStore,
    Ser: Serializer,
    M: CacheMetrics,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S, Ser, M> std::fmt::Debug for PageCache<S, Ser, M>
where
    S: KvStore,
    Ser: Serializer,
    M: CacheMetrics,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageCache")
            .field("store", &self.inner.store.name())
            .field("codec", &self.inner.codec)
            .field("group", &self.inner.settings.group)
            .field("variants", self.inner.keys.variants())
            .finish()
    }
}

/// Assembles a [`PageCache`]
pub struct PageCacheBuilder<S, Ser = JsonSerializer, M = NoopMetrics> {
    store: S,
    serializer: Ser,
    metrics: M,
    settings: CacheSettings,
    variants: VariantRegistry,
    variant_error: Option<CacheError>,
    compressor: Option<Arc<dyn Compressor>>,
    clock: Arc<dyn Clock>,
}

impl<S: KvStore> PageCacheBuilder<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            serializer: JsonSerializer,
            metrics: NoopMetrics,
            settings: CacheSettings::default(),
            variants: VariantRegistry::new(),
            variant_error: None,
            compressor: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl<S, Ser, M> PageCacheBuilder<S, Ser, M>
where
    S: KvStore,
    Ser: Serializer,
    M: CacheMetrics,
{
    pub fn settings(mut self, settings: CacheSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Register a variant dimension
    ///
    /// Registration errors surface from [`build`](Self::build).
    pub fn variant<F>(mut self, name: impl Into<String>, evaluator: F) -> Self
    where
        F: Fn(&RequestView) -> VariantValue + Send + Sync + 'static,
    {
        if let Err(e) = self.variants.register(name, evaluator) {
            self.variant_error.get_or_insert(e);
        }
        self
    }

    pub fn variants(mut self, registry: VariantRegistry) -> Self {
        self.variants = registry;
        self
    }

    pub fn serializer<T: Serializer>(self, serializer: T) -> PageCacheBuilder<S, T, M> {
        PageCacheBuilder {
            store: self.store,
            serializer,
            metrics: self.metrics,
            settings: self.settings,
            variants: self.variants,
            variant_error: self.variant_error,
            compressor: self.compressor,
            clock: self.clock,
        }
    }

    pub fn metrics<T: CacheMetrics>(self, metrics: T) -> PageCacheBuilder<S, Ser, T> {
        PageCacheBuilder {
            store: self.store,
            serializer: self.serializer,
            metrics,
            settings: self.settings,
            variants: self.variants,
            variant_error: self.variant_error,
            compressor: self.compressor,
            clock: self.clock,
        }
    }

    pub fn compressor(mut self, compressor: impl Compressor) -> Self {
        self.compressor = Some(Arc::new(compressor));
        self
    }

    pub fn clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Validate settings and compile rules
    pub fn build(self) -> Result<PageCache<S, Ser, M>> {
        if let Some(e) = self.variant_error {
            return Err(e);
        }
        let settings = self.settings;
        settings.validate()?;

        let rules = BypassRules::new(&settings)?;
        let variants = self.variants.with_settings(&settings)?;
        let metrics = Arc::new(self.metrics);
        let mut codec = EntryCodec::new(self.serializer);
        if let Some(compressor) = self.compressor {
            codec = codec.with_shared_compressor(compressor);
        }

        let inner = Inner {
            store: BoundedStore::new(self.store, metrics.clone(), settings.store_timeout()),
            codec,
            metrics,
            rules,
            headers: HeaderFilter::new(&settings),
            keys: KeyBuilder::new(&settings, variants),
            admission: AdmissionPolicy::new(&settings),
            lock: RegenerationLock::new(settings.lock_ttl()),
            clock: self.clock,
            settings,
        };
        Ok(PageCache {
            inner: Arc::new(inner),
        })
    }
}

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;
use trellis_conf::MarkupSettings;
use trellis_markup::merge;
use trellis_markup::requires_base_markup;
use trellis_markup::FilterChain;
use trellis_markup::Markup;
use trellis_markup::MarkupError;
use trellis_markup::MarkupParser;
use trellis_source::FxDashMap;
use trellis_source::SourceId;

use crate::hierarchy::ancestry;
use crate::hierarchy::ClassHierarchy;
use crate::hierarchy::StaticHierarchy;
use crate::identity::CacheKey;
use crate::identity::CacheKeyProvider;
use crate::identity::DefaultCacheKeyProvider;
use crate::identity::MarkupOrigin;
use crate::identity::ViewIdentity;
use crate::locator::SourceLocator;
use crate::watcher::ChangeWatcher;

/// Adjusts the filter chain of every parser the cache creates.
pub type FilterSetup = Arc<dyn Fn(&mut FilterChain) + Send + Sync>;

/// A resolved cache slot. A key without an entry has not been loaded yet.
#[derive(Debug, Clone)]
pub enum CacheEntry {
    Cached(Arc<Markup>),
    /// Resolution found no source. Kept until the key is invalidated.
    Absent,
}

impl CacheEntry {
    #[must_use]
    pub fn markup(&self) -> Option<&Arc<Markup>> {
        match self {
            Self::Cached(markup) => Some(markup),
            Self::Absent => None,
        }
    }
}

/// Concurrent cache of assembled markup, keyed by [`CacheKey`].
///
/// Hits are served without blocking. A miss takes the key's load lock, so a
/// key is resolved by one thread while the others wait for its result.
/// Derived markup is registered against the key of the base it was merged
/// with; invalidating a base evicts everything built on top of it.
#[derive(Clone)]
pub struct MarkupCache {
    inner: Arc<CacheInner>,
}

impl MarkupCache {
    #[must_use]
    pub fn builder(locator: impl SourceLocator + 'static) -> MarkupCacheBuilder {
        MarkupCacheBuilder::new(Arc::new(locator))
    }

    /// Markup of `origin`, resolving and caching it on a miss.
    ///
    /// `Ok(None)` means the view has no markup; with `fail_on_miss` that is
    /// reported as [`MarkupError::MarkupNotFound`] instead.
    pub fn get(
        &self,
        origin: &MarkupOrigin,
        fail_on_miss: bool,
    ) -> Result<Option<Arc<Markup>>, MarkupError> {
        let markup = match &origin.cache_key {
            Some(key) => self.inner.get_or_load(&origin.view, key)?,
            None => {
                let chain = ancestry(self.inner.hierarchy.as_ref(), &origin.view.class)?;
                self.inner
                    .resolve(&origin.view, None, &chain)?
                    .map(|resolved| resolved.markup)
            }
        };

        if markup.is_none() && fail_on_miss {
            return Err(MarkupError::MarkupNotFound {
                view: origin.view.to_string(),
            });
        }
        Ok(markup)
    }

    /// Like [`MarkupCache::get`], with the key from the configured provider.
    pub fn markup_for(
        &self,
        view: &ViewIdentity,
        fail_on_miss: bool,
    ) -> Result<Option<Arc<Markup>>, MarkupError> {
        let origin = MarkupOrigin::new(view.clone(), self.inner.keys.cache_key(view));
        self.get(&origin, fail_on_miss)
    }

    /// Evict the markup of `origin`; returns the number of entries removed.
    pub fn invalidate(&self, origin: &MarkupOrigin) -> usize {
        origin
            .cache_key
            .as_ref()
            .map_or(0, |key| self.inner.invalidate_key(key))
    }

    /// Evict `key` and every markup merged from it, transitively. Returns
    /// the number of entries removed.
    pub fn invalidate_key(&self, key: &CacheKey) -> usize {
        self.inner.invalidate_key(key)
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    /// Number of entries, absent ones included.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.entries.len()
    }

    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.entries.contains_key(key)
    }

    #[must_use]
    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.inner.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Keys of the markup merged directly from `base`.
    #[must_use]
    pub fn dependents(&self, base: &CacheKey) -> Vec<CacheKey> {
        let registry = self.inner.registry.lock();
        let mut keys: Vec<CacheKey> = registry
            .dependents
            .get(base)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

impl fmt::Debug for MarkupCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkupCache")
            .field("entries", &self.inner.entries.len())
            .finish_non_exhaustive()
    }
}

pub struct MarkupCacheBuilder {
    locator: Arc<dyn SourceLocator>,
    hierarchy: Arc<dyn ClassHierarchy>,
    keys: Arc<dyn CacheKeyProvider>,
    watcher: Option<Arc<dyn ChangeWatcher>>,
    settings: MarkupSettings,
    filters: Option<FilterSetup>,
}

impl MarkupCacheBuilder {
    fn new(locator: Arc<dyn SourceLocator>) -> Self {
        Self {
            locator,
            hierarchy: Arc::new(StaticHierarchy::new()),
            keys: Arc::new(DefaultCacheKeyProvider),
            watcher: None,
            settings: MarkupSettings::default(),
            filters: None,
        }
    }

    #[must_use]
    pub fn hierarchy(mut self, hierarchy: impl ClassHierarchy + 'static) -> Self {
        self.hierarchy = Arc::new(hierarchy);
        self
    }

    #[must_use]
    pub fn key_provider(mut self, keys: impl CacheKeyProvider + 'static) -> Self {
        self.keys = Arc::new(keys);
        self
    }

    #[must_use]
    pub fn watcher(mut self, watcher: Arc<dyn ChangeWatcher>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    #[must_use]
    pub fn settings(mut self, settings: MarkupSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn filters(mut self, setup: impl Fn(&mut FilterChain) + Send + Sync + 'static) -> Self {
        self.filters = Some(Arc::new(setup));
        self
    }

    #[must_use]
    pub fn build(self) -> MarkupCache {
        MarkupCache {
            inner: Arc::new(CacheInner {
                entries: FxDashMap::default(),
                load_locks: FxDashMap::default(),
                registry: Mutex::new(Registry::default()),
                locator: self.locator,
                hierarchy: self.hierarchy,
                keys: self.keys,
                watcher: self.watcher,
                settings: self.settings,
                filters: self.filters,
            }),
        }
    }
}

/// Bookkeeping mutated together with cache entries. Always the innermost
/// lock: taken after load locks, never held while waiting for one.
#[derive(Default)]
struct Registry {
    /// Base key to the keys of markup merged from it.
    dependents: FxHashMap<CacheKey, FxHashSet<CacheKey>>,
    sources: FxHashMap<SourceId, FxHashSet<CacheKey>>,
    key_sources: FxHashMap<CacheKey, SourceId>,
}

struct CacheInner {
    entries: FxDashMap<CacheKey, CacheEntry>,
    load_locks: FxDashMap<CacheKey, Arc<Mutex<()>>>,
    registry: Mutex<Registry>,
    locator: Arc<dyn SourceLocator>,
    hierarchy: Arc<dyn ClassHierarchy>,
    keys: Arc<dyn CacheKeyProvider>,
    watcher: Option<Arc<dyn ChangeWatcher>>,
    settings: MarkupSettings,
    filters: Option<FilterSetup>,
}

struct Resolved {
    markup: Arc<Markup>,
    source: SourceId,
    base: Option<BaseLink>,
}

struct BaseLink {
    key: Option<CacheKey>,
    markup: Arc<Markup>,
}

impl CacheInner {
    fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn load_lock(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        Arc::clone(self.load_locks.entry(key.clone()).or_default().value())
    }

    /// Drop `key`'s load lock unless another thread holds or waits on it.
    /// Clones are handed out under the map's shard lock, so the count
    /// cannot grow while `remove_if` inspects it.
    fn release_load_lock(&self, key: &CacheKey, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.load_locks.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    fn get_or_load(
        self: &Arc<Self>,
        view: &ViewIdentity,
        key: &CacheKey,
    ) -> Result<Option<Arc<Markup>>, MarkupError> {
        if let Some(entry) = self.lookup(key) {
            tracing::trace!(%key, "Markup cache hit");
            return Ok(entry.markup().cloned());
        }

        // Before any lock: a cyclic hierarchy would otherwise come back for
        // a key this thread already holds.
        let chain = ancestry(self.hierarchy.as_ref(), &view.class)?;

        let lock = self.load_lock(key);
        let loaded = {
            let _guard = lock.lock();
            self.load(view, key, &chain)
        };
        self.release_load_lock(key, lock);
        loaded
    }

    /// Second half of [`CacheInner::get_or_load`], run under the key's load
    /// lock.
    fn load(
        self: &Arc<Self>,
        view: &ViewIdentity,
        key: &CacheKey,
        chain: &[String],
    ) -> Result<Option<Arc<Markup>>, MarkupError> {
        if let Some(entry) = self.lookup(key) {
            tracing::trace!(%key, "Markup loaded by another thread");
            return Ok(entry.markup().cloned());
        }

        tracing::debug!(%key, view = %view, "Loading markup");
        match self.resolve(view, Some(key), chain) {
            Ok(Some(resolved)) => Ok(Some(self.store(key, resolved))),
            Ok(None) => {
                tracing::debug!(%key, "No markup found, caching absence");
                self.entries.insert(key.clone(), CacheEntry::Absent);
                Ok(None)
            }
            Err(err) => {
                self.entries.remove(key);
                tracing::debug!(%key, error = %err, "Failed to load markup");
                Err(err)
            }
        }
    }

    /// Locate, parse and merge the markup of `view`. `chain` is the view's
    /// class followed by its superclasses; the first class with a source
    /// provides the markup.
    fn resolve(
        self: &Arc<Self>,
        view: &ViewIdentity,
        key: Option<&CacheKey>,
        chain: &[String],
    ) -> Result<Option<Resolved>, MarkupError> {
        let mut found = None;
        for (depth, class) in chain.iter().enumerate() {
            let candidate = view.for_class(class.clone());
            match self.locator.locate(&candidate) {
                Ok(Some(source)) => {
                    found = Some((depth, source));
                    break;
                }
                Ok(None) => {}
                Err(err) => return Err(MarkupError::io(class.clone(), err)),
            }
        }
        let Some((depth, source)) = found else {
            return Ok(None);
        };
        let class = &chain[depth];

        let mut parser = MarkupParser::new(&source, &self.settings)?
            .with_view_class(class.clone())
            .with_cache_key(key.map(ToString::to_string));
        if let Some(setup) = &self.filters {
            setup(parser.filters_mut());
        }
        let markup = parser.parse()?;

        let Some(extend_index) = requires_base_markup(&markup) else {
            return Ok(Some(Resolved {
                markup: Arc::new(markup),
                source: source.id().clone(),
                base: None,
            }));
        };

        let Some(base_class) = chain.get(depth + 1) else {
            return Err(MarkupError::BaseMarkupNotFound {
                view: class.clone(),
                base: "<none>".to_string(),
            });
        };
        let base_view = view.for_class(base_class.clone());
        let base_key = self.keys.cache_key(&base_view);
        if base_key.is_some() && base_key.as_ref() == key {
            let key = base_key.map(|key| key.to_string()).unwrap_or_default();
            return Err(MarkupError::InheritanceCycle {
                chain: vec![key.clone(), key],
            });
        }

        let base_markup = match &base_key {
            Some(base_key) => self.get_or_load(&base_view, base_key)?,
            None => self
                .resolve(&base_view, None, &chain[depth + 1..])?
                .map(|resolved| resolved.markup),
        };
        let Some(base_markup) = base_markup else {
            return Err(MarkupError::BaseMarkupNotFound {
                view: class.clone(),
                base: base_class.clone(),
            });
        };

        let merged = merge(
            &markup,
            &base_markup,
            extend_index,
            base_key.as_ref().map(ToString::to_string),
        )?;
        Ok(Some(Resolved {
            markup: Arc::new(merged),
            source: source.id().clone(),
            base: Some(BaseLink {
                key: base_key,
                markup: base_markup,
            }),
        }))
    }

    /// Publish `resolved` under `key`, unless the base it was merged with
    /// is no longer the cached one.
    fn store(self: &Arc<Self>, key: &CacheKey, resolved: Resolved) -> Arc<Markup> {
        let Resolved {
            markup,
            source,
            base,
        } = resolved;

        {
            let mut registry = self.registry.lock();
            match &base {
                Some(BaseLink {
                    key: Some(base_key),
                    markup: base_markup,
                }) => {
                    let current = self.lookup(base_key);
                    let base_is_current = current
                        .as_ref()
                        .and_then(CacheEntry::markup)
                        .is_some_and(|current| Arc::ptr_eq(current, base_markup));
                    if !base_is_current {
                        tracing::warn!(
                            %key,
                            base = %base_key,
                            "Base markup was evicted while merging, not caching"
                        );
                        return markup;
                    }
                    registry
                        .dependents
                        .entry(base_key.clone())
                        .or_default()
                        .insert(key.clone());
                }
                Some(BaseLink { key: None, .. }) => {
                    tracing::debug!(%key, "Base markup is never cached, not caching");
                    return markup;
                }
                None => {}
            }

            self.entries
                .insert(key.clone(), CacheEntry::Cached(Arc::clone(&markup)));
            registry
                .sources
                .entry(source.clone())
                .or_default()
                .insert(key.clone());
            registry.key_sources.insert(key.clone(), source.clone());
        }

        tracing::debug!(%key, elements = markup.len(), "Cached markup");
        self.watch(&source);
        markup
    }

    fn watch(self: &Arc<Self>, source: &SourceId) {
        let Some(watcher) = &self.watcher else {
            return;
        };
        let cache = Arc::downgrade(self);
        watcher.watch(
            source,
            Box::new(move |source| {
                if let Some(cache) = cache.upgrade() {
                    cache.source_changed(source);
                }
            }),
        );
    }

    fn source_changed(&self, source: &SourceId) {
        let keys: Vec<CacheKey> = self
            .registry
            .lock()
            .sources
            .get(source)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        tracing::info!(%source, keys = keys.len(), "Markup source changed, invalidating");
        for key in &keys {
            self.invalidate_key(key);
        }
    }

    fn invalidate_key(&self, key: &CacheKey) -> usize {
        let mut queue = VecDeque::from([key.clone()]);
        let mut seen = FxHashSet::default();
        let mut unwatch = Vec::new();
        let mut evicted = 0;

        while let Some(key) = queue.pop_front() {
            if !seen.insert(key.clone()) {
                continue;
            }

            let lock = self.load_lock(&key);
            {
                let _guard = lock.lock();
                let mut registry = self.registry.lock();

                if self.entries.remove(&key).is_some() {
                    tracing::debug!(%key, "Evicted markup");
                    evicted += 1;
                }
                if let Some(dependents) = registry.dependents.remove(&key) {
                    queue.extend(dependents);
                }
                if let Some(source) = registry.key_sources.remove(&key) {
                    let now_unused = registry.sources.get_mut(&source).is_some_and(|keys| {
                        keys.remove(&key);
                        keys.is_empty()
                    });
                    if now_unused {
                        registry.sources.remove(&source);
                        unwatch.push(source);
                    }
                }
            }
            self.release_load_lock(&key, lock);
        }

        if let Some(watcher) = &self.watcher {
            for source in &unwatch {
                watcher.unwatch(source);
            }
        }
        evicted
    }

    fn clear(&self) {
        let sources: Vec<SourceId> = {
            let mut registry = self.registry.lock();
            self.entries.clear();
            registry.dependents.clear();
            registry.key_sources.clear();
            registry.sources.drain().map(|(source, _)| source).collect()
        };
        self.load_locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        tracing::debug!("Cleared markup cache");

        if let Some(watcher) = &self.watcher {
            for source in &sources {
                watcher.unwatch(source);
            }
        }
    }
}

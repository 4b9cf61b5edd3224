use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

use camino::Utf8PathBuf;
use rustc_hash::FxHashMap;
use trellis_cache::CacheEntry;
use trellis_cache::CacheKey;
use trellis_cache::ChangeListener;
use trellis_cache::ChangeWatcher;
use trellis_cache::FileSystemLocator;
use trellis_cache::ManualWatcher;
use trellis_cache::MarkupCache;
use trellis_cache::SourceLocator;
use trellis_cache::StaticHierarchy;
use trellis_cache::ViewIdentity;
use trellis_markup::MarkupError;
use trellis_markup::MarkupStream;
use trellis_source::InMemoryFileSystem;
use trellis_source::MarkupSource;
use trellis_source::OsFileSystem;
use trellis_source::SourceId;

/// Serves markup from memory, counting lookups per class.
#[derive(Clone, Default)]
struct CountingLocator {
    sources: Arc<FxHashMap<String, String>>,
    lookups: Arc<parking_lot::Mutex<FxHashMap<String, usize>>>,
    delay: Duration,
}

impl CountingLocator {
    fn new(sources: &[(&str, &str)]) -> Self {
        Self {
            sources: Arc::new(
                sources
                    .iter()
                    .map(|(class, text)| ((*class).to_string(), (*text).to_string()))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn lookups(&self, class: &str) -> usize {
        self.lookups.lock().get(class).copied().unwrap_or(0)
    }
}

impl SourceLocator for CountingLocator {
    fn locate(&self, view: &ViewIdentity) -> io::Result<Option<MarkupSource>> {
        *self.lookups.lock().entry(view.class.clone()).or_default() += 1;
        thread::sleep(self.delay);
        Ok(self.sources.get(&view.class).map(|text| {
            MarkupSource::from_text(SourceId::Named(format!("{}.html", view.class)), text.clone())
        }))
    }
}

struct FailingLocator {
    calls: AtomicUsize,
}

impl SourceLocator for FailingLocator {
    fn locate(&self, _view: &ViewIdentity) -> io::Result<Option<MarkupSource>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        } else {
            Ok(Some(MarkupSource::from_text(
                SourceId::Named("Home.html".to_string()),
                "<p>ok</p>",
            )))
        }
    }
}

/// Records unwatch calls. With a pause set, the first watch of that source
/// blocks between two waits on the barrier, i.e. right after the markup was
/// cached and before the load that cached it returns.
#[derive(Default)]
struct RecordingWatcher {
    unwatched: parking_lot::Mutex<Vec<SourceId>>,
    pause: Option<(SourceId, Arc<Barrier>)>,
    paused: AtomicBool,
}

impl RecordingWatcher {
    fn pausing_on(source: &str, barrier: Arc<Barrier>) -> Self {
        Self {
            pause: Some((SourceId::Named(source.to_string()), barrier)),
            ..Self::default()
        }
    }

    fn unwatch_count(&self, source: &str) -> usize {
        let source = SourceId::Named(source.to_string());
        self.unwatched.lock().iter().filter(|s| **s == source).count()
    }
}

impl ChangeWatcher for RecordingWatcher {
    fn watch(&self, source: &SourceId, _listener: ChangeListener) {
        if let Some((target, barrier)) = &self.pause {
            if target == source && !self.paused.swap(true, Ordering::SeqCst) {
                barrier.wait();
                barrier.wait();
            }
        }
    }

    fn unwatch(&self, source: &SourceId) {
        self.unwatched.lock().push(source.clone());
    }
}

fn home_on_base() -> CountingLocator {
    CountingLocator::new(&[
        ("Base", "<div><wicket:child/></div>"),
        ("Home", "<wicket:extend>home</wicket:extend>"),
    ])
}

#[test]
fn concurrent_misses_load_once() {
    const THREADS: usize = 8;

    let locator = CountingLocator::new(&[("Home", "<p wicket:id=\"p\">home</p>")])
        .with_delay(Duration::from_millis(20));
    let cache = MarkupCache::builder(locator.clone()).build();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let cache = cache.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache
                    .markup_for(&ViewIdentity::html("Home"), true)
                    .unwrap()
                    .unwrap()
            })
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(locator.lookups("Home"), 1);
    assert!(results.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
}

#[test]
fn concurrent_derived_views_share_base() {
    const THREADS: usize = 6;

    let locator = CountingLocator::new(&[
        ("Base", "<div><wicket:child/></div>"),
        ("A", "<wicket:extend>a</wicket:extend>"),
        ("B", "<wicket:extend>b</wicket:extend>"),
    ])
    .with_delay(Duration::from_millis(10));
    let cache = MarkupCache::builder(locator.clone())
        .hierarchy(
            StaticHierarchy::new()
                .with_parent("A", "Base")
                .with_parent("B", "Base"),
        )
        .build();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let cache = cache.clone();
            let barrier = Arc::clone(&barrier);
            let class = if i % 2 == 0 { "A" } else { "B" };
            thread::spawn(move || {
                barrier.wait();
                cache
                    .markup_for(&ViewIdentity::html(class), true)
                    .unwrap()
                    .unwrap()
                    .to_string()
            })
        })
        .collect();
    for handle in handles {
        let text = handle.join().unwrap();
        assert!(text == "<div>a</div>" || text == "<div>b</div>");
    }

    assert_eq!(locator.lookups("Base"), 1);
    assert_eq!(locator.lookups("A"), 1);
    assert_eq!(locator.lookups("B"), 1);
    assert_eq!(
        cache.dependents(&CacheKey::from("Base.html")),
        [CacheKey::from("A.html"), CacheKey::from("B.html")]
    );
}

#[test]
fn io_failure_is_retried() {
    let cache = MarkupCache::builder(FailingLocator {
        calls: AtomicUsize::new(0),
    })
    .build();
    let view = ViewIdentity::html("Home");

    let err = cache.markup_for(&view, true).unwrap_err();
    assert!(matches!(err, MarkupError::Io { .. }));
    assert_eq!(cache.size(), 0);

    let markup = cache.markup_for(&view, true).unwrap().unwrap();
    assert_eq!(markup.to_string(), "<p>ok</p>");
}

#[test]
fn derived_merged_with_evicted_base_is_not_cached() {
    let locator = home_on_base();
    let barrier = Arc::new(Barrier::new(2));
    let watcher = Arc::new(RecordingWatcher::pausing_on(
        "Base.html",
        Arc::clone(&barrier),
    ));
    let cache = MarkupCache::builder(locator.clone())
        .hierarchy(StaticHierarchy::new().with_parent("Home", "Base"))
        .watcher(watcher.clone())
        .build();

    let loader = {
        let cache = cache.clone();
        thread::spawn(move || {
            cache
                .markup_for(&ViewIdentity::html("Home"), true)
                .unwrap()
                .unwrap()
        })
    };

    // The base is cached; the derived markup is not merged yet.
    barrier.wait();
    assert!(cache.contains(&CacheKey::from("Base.html")));
    assert!(!cache.contains(&CacheKey::from("Home.html")));
    cache.clear();
    barrier.wait();

    let home = loader.join().unwrap();
    assert_eq!(home.to_string(), "<div>home</div>");
    assert!(!cache.contains(&CacheKey::from("Home.html")));
    assert!(cache.dependents(&CacheKey::from("Base.html")).is_empty());
    assert_eq!(locator.lookups("Home"), 1);

    let reloaded = cache
        .markup_for(&ViewIdentity::html("Home"), true)
        .unwrap()
        .unwrap();
    assert!(!Arc::ptr_eq(&home, &reloaded));
    assert_eq!(locator.lookups("Home"), 2);
    assert!(cache.contains(&CacheKey::from("Home.html")));
    assert_eq!(
        cache.dependents(&CacheKey::from("Base.html")),
        [CacheKey::from("Home.html")]
    );
}

#[test]
fn base_invalidation_evicts_reloaded_derived_once() {
    let locator = home_on_base();
    let watcher = Arc::new(RecordingWatcher::default());
    let cache = MarkupCache::builder(locator.clone())
        .hierarchy(StaticHierarchy::new().with_parent("Home", "Base"))
        .watcher(watcher.clone())
        .build();
    let home = ViewIdentity::html("Home");

    cache.markup_for(&home, true).unwrap();
    assert_eq!(cache.invalidate_key(&CacheKey::from("Home.html")), 1);
    cache.markup_for(&home, true).unwrap();
    assert_eq!(locator.lookups("Home"), 2);
    assert_eq!(watcher.unwatch_count("Home.html"), 1);

    assert_eq!(cache.invalidate_key(&CacheKey::from("Base.html")), 2);
    assert_eq!(watcher.unwatch_count("Home.html"), 2);
    assert_eq!(watcher.unwatch_count("Base.html"), 1);
    assert_eq!(cache.size(), 0);

    cache.markup_for(&home, true).unwrap();
    cache.markup_for(&home, true).unwrap();
    assert_eq!(locator.lookups("Home"), 3);
    assert_eq!(locator.lookups("Base"), 2);
}

#[test]
fn absent_entries_survive_unrelated_invalidation() {
    let locator = CountingLocator::new(&[("Home", "<p>home</p>")]);
    let cache = MarkupCache::builder(locator.clone()).build();

    assert!(cache
        .markup_for(&ViewIdentity::html("Missing"), false)
        .unwrap()
        .is_none());
    assert!(cache
        .markup_for(&ViewIdentity::html("Missing"), false)
        .unwrap()
        .is_none());
    assert_eq!(locator.lookups("Missing"), 1);

    cache.markup_for(&ViewIdentity::html("Home"), true).unwrap();
    cache.invalidate_key(&CacheKey::from("Home.html"));
    assert!(matches!(
        cache.entry(&CacheKey::from("Missing.html")),
        Some(CacheEntry::Absent)
    ));
}

#[test]
fn base_change_cascades_to_derived() {
    let fs = Arc::new(InMemoryFileSystem::new());
    fs.add_file("/web/Page.html", "<body><h1>v1</h1><wicket:child/></body>");
    fs.add_file("/web/Home.html", "<wicket:extend><p>home</p></wicket:extend>");
    fs.add_file("/web/About.html", "<wicket:extend><p>about</p></wicket:extend>");

    let watcher = Arc::new(ManualWatcher::new());
    let cache = MarkupCache::builder(FileSystemLocator::new(
        fs.clone(),
        vec![Utf8PathBuf::from("/web")],
    ))
    .hierarchy(
        StaticHierarchy::new()
            .with_parent("Home", "Page")
            .with_parent("About", "Page"),
    )
    .watcher(watcher.clone())
    .build();

    let home = ViewIdentity::html("Home");
    let about = ViewIdentity::html("About");
    let before = cache.markup_for(&home, true).unwrap().unwrap();
    cache.markup_for(&about, true).unwrap();
    assert!(before.to_string().contains("v1"));
    assert_eq!(cache.size(), 3);

    fs.add_file("/web/Page.html", "<body><h1>v2</h1><wicket:child/></body>");
    assert!(watcher.notify_changed(&SourceId::Path(Utf8PathBuf::from("/web/Page.html"))));
    assert_eq!(cache.size(), 0);

    let after = cache.markup_for(&home, true).unwrap().unwrap();
    assert_eq!(
        after.to_string(),
        "<head></head><body><h1>v2</h1><p>home</p></body>"
    );
    // The old document is untouched.
    assert!(before.to_string().contains("v1"));
}

#[test]
fn derived_change_keeps_base() {
    let fs = Arc::new(InMemoryFileSystem::new());
    fs.add_file("/web/Page.html", "<div><wicket:child/></div>");
    fs.add_file("/web/Home.html", "<wicket:extend>one</wicket:extend>");

    let watcher = Arc::new(ManualWatcher::new());
    let cache = MarkupCache::builder(FileSystemLocator::new(
        fs.clone(),
        vec![Utf8PathBuf::from("/web")],
    ))
    .hierarchy(StaticHierarchy::new().with_parent("Home", "Page"))
    .watcher(watcher.clone())
    .build();
    let home = ViewIdentity::html("Home");
    cache.markup_for(&home, true).unwrap();

    fs.add_file("/web/Home.html", "<wicket:extend>two</wicket:extend>");
    watcher.notify_changed(&SourceId::Path(Utf8PathBuf::from("/web/Home.html")));

    assert!(cache.contains(&CacheKey::from("Page.html")));
    let markup = cache.markup_for(&home, true).unwrap().unwrap();
    assert_eq!(markup.to_string(), "<div>two</div>");
    assert_eq!(
        cache.dependents(&CacheKey::from("Page.html")),
        [CacheKey::from("Home.html")]
    );
}

#[test]
fn cached_markup_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
    std::fs::create_dir_all(root.join("app")).unwrap();
    std::fs::write(
        root.join("app/Home.html"),
        "<html><body><span wicket:id=\"greeting\">hi</span></body></html>",
    )
    .unwrap();

    let cache =
        MarkupCache::builder(FileSystemLocator::new(Arc::new(OsFileSystem), vec![root.clone()]))
            .build();
    let markup = cache
        .markup_for(&ViewIdentity::html("app.Home"), true)
        .unwrap()
        .unwrap();

    let mut stream = MarkupStream::new(markup);
    assert!(stream.skip_until_tag("span"));
    assert_eq!(
        stream.tag().and_then(|tag| tag.binding_id()),
        Some("greeting")
    );
    assert_eq!(
        stream.markup().resource().source,
        Some(SourceId::Path(root.join("app/Home.html")))
    );
}

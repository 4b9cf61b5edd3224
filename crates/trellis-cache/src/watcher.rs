//! Change notification for markup sources.
//!
//! The cache registers one listener per source it has loaded. A listener is
//! fired at most once; the cache re-registers after the next load.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use camino::Utf8PathBuf;
use notify::Config;
use notify::Event;
use notify::EventKind;
use notify::RecommendedWatcher;
use notify::RecursiveMode;
use notify::Watcher;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use thiserror::Error;
use trellis_conf::WatcherSettings;
use trellis_source::FxDashMap;
use trellis_source::SourceId;

pub type ChangeListener = Box<dyn Fn(&SourceId) + Send + Sync>;

pub trait ChangeWatcher: Send + Sync {
    /// Call `listener` once when `source` changes, replacing any listener
    /// already registered for it.
    fn watch(&self, source: &SourceId, listener: ChangeListener);

    fn unwatch(&self, source: &SourceId);
}

/// A watcher fired by hand, for sources that do not live on disk and for
/// tests.
#[derive(Default)]
pub struct ManualWatcher {
    listeners: FxDashMap<SourceId, ChangeListener>,
}

impl ManualWatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a change of `source`. Returns whether a listener was fired.
    pub fn notify_changed(&self, source: &SourceId) -> bool {
        // Removed before calling, the listener may re-enter the watcher.
        let Some((source, listener)) = self.listeners.remove(source) else {
            return false;
        };
        listener(&source);
        true
    }

    #[must_use]
    pub fn is_watching(&self, source: &SourceId) -> bool {
        self.listeners.contains_key(source)
    }

    #[must_use]
    pub fn watched(&self) -> usize {
        self.listeners.len()
    }
}

impl ChangeWatcher for ManualWatcher {
    fn watch(&self, source: &SourceId, listener: ChangeListener) {
        self.listeners.insert(source.clone(), listener);
    }

    fn unwatch(&self, source: &SourceId) {
        self.listeners.remove(source);
    }
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("File watching is disabled")]
    Disabled,
    #[error("Failed to start file watcher: {0}")]
    Notify(#[from] notify::Error),
}

struct Registration {
    source: SourceId,
    listener: ChangeListener,
}

/// Watches markup files on disk with `notify`.
///
/// Raw events are collected on a background thread and delivered once no
/// new event arrived for the configured debounce period.
pub struct NotifyWatcher {
    watcher: Mutex<RecommendedWatcher>,
    registrations: Arc<FxDashMap<Utf8PathBuf, Registration>>,
    _handle: thread::JoinHandle<()>,
}

impl NotifyWatcher {
    pub fn new(settings: &WatcherSettings) -> Result<Self, WatchError> {
        if !settings.enabled {
            return Err(WatchError::Disabled);
        }

        let (event_tx, event_rx) = mpsc::channel();
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let _ = event_tx.send(event);
                }
                Err(err) => tracing::warn!(error = %err, "File watcher error"),
            },
            Config::default(),
        )?;

        let registrations: Arc<FxDashMap<Utf8PathBuf, Registration>> = Arc::default();
        let debounce = Duration::from_millis(settings.debounce_ms);
        let handle = {
            let registrations = Arc::clone(&registrations);
            thread::spawn(move || Self::process_events(&event_rx, &registrations, debounce))
        };

        Ok(Self {
            watcher: Mutex::new(watcher),
            registrations,
            _handle: handle,
        })
    }

    fn process_events(
        event_rx: &mpsc::Receiver<Event>,
        registrations: &FxDashMap<Utf8PathBuf, Registration>,
        debounce: Duration,
    ) {
        let mut pending: FxHashSet<Utf8PathBuf> = FxHashSet::default();
        let mut last_event = Instant::now();

        loop {
            match event_rx.recv_timeout(Duration::from_millis(50)) {
                Ok(event) => {
                    if matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                    ) {
                        pending.extend(
                            event
                                .paths
                                .into_iter()
                                .filter_map(|path| Utf8PathBuf::try_from(path).ok()),
                        );
                        last_event = Instant::now();
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }

            if pending.is_empty() || last_event.elapsed() < debounce {
                continue;
            }
            for path in pending.drain() {
                let Some((_, registration)) = registrations.remove(&path) else {
                    continue;
                };
                tracing::info!(source = %registration.source, "Markup source changed");
                (registration.listener)(&registration.source);
            }
        }
    }

    fn watch_path(source: &SourceId) -> Option<Utf8PathBuf> {
        let path = source.path()?;
        let canonical = path
            .canonicalize_utf8()
            .unwrap_or_else(|_| path.to_path_buf());
        Some(canonical)
    }
}

impl ChangeWatcher for NotifyWatcher {
    fn watch(&self, source: &SourceId, listener: ChangeListener) {
        let Some(path) = Self::watch_path(source) else {
            tracing::debug!(%source, "Source has no path, not watching");
            return;
        };
        if let Err(err) = self
            .watcher
            .lock()
            .watch(path.as_std_path(), RecursiveMode::NonRecursive)
        {
            tracing::warn!(%source, error = %err, "Failed to watch markup source");
            return;
        }
        self.registrations.insert(
            path,
            Registration {
                source: source.clone(),
                listener,
            },
        );
    }

    fn unwatch(&self, source: &SourceId) {
        let Some(path) = Self::watch_path(source) else {
            return;
        };
        self.registrations.remove(&path);
        if let Err(err) = self.watcher.lock().unwatch(path.as_std_path()) {
            tracing::debug!(%source, error = %err, "Failed to unwatch markup source");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;

    fn counting_listener(count: &Arc<AtomicUsize>) -> ChangeListener {
        let count = Arc::clone(count);
        Box::new(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    mod manual {
        use super::*;

        #[test]
        fn fires_once() {
            let watcher = ManualWatcher::new();
            let source = SourceId::Named("a".to_string());
            let count = Arc::new(AtomicUsize::new(0));
            watcher.watch(&source, counting_listener(&count));

            assert!(watcher.notify_changed(&source));
            assert!(!watcher.notify_changed(&source));
            assert_eq!(count.load(Ordering::SeqCst), 1);
        }

        #[test]
        fn unwatch_drops_listener() {
            let watcher = ManualWatcher::new();
            let source = SourceId::Named("a".to_string());
            let count = Arc::new(AtomicUsize::new(0));
            watcher.watch(&source, counting_listener(&count));
            watcher.unwatch(&source);

            assert!(!watcher.notify_changed(&source));
            assert_eq!(watcher.watched(), 0);
        }

        #[test]
        fn listener_may_rewatch() {
            let watcher = Arc::new(ManualWatcher::new());
            let source = SourceId::Named("a".to_string());
            let inner = Arc::clone(&watcher);
            watcher.watch(
                &source,
                Box::new(move |source| inner.watch(source, Box::new(|_| {}))),
            );

            assert!(watcher.notify_changed(&source));
            assert!(watcher.is_watching(&source));
        }
    }

    mod notify_watcher {
        use super::*;

        #[test]
        fn disabled() {
            let settings = WatcherSettings {
                enabled: false,
                ..WatcherSettings::default()
            };
            assert!(matches!(NotifyWatcher::new(&settings), Err(WatchError::Disabled)));
        }

        #[test]
        fn named_sources_are_ignored() {
            let watcher = NotifyWatcher::new(&WatcherSettings::default()).unwrap();
            let count = Arc::new(AtomicUsize::new(0));
            watcher.watch(&SourceId::Named("x".to_string()), counting_listener(&count));
            assert!(watcher.registrations.is_empty());
        }

        #[test]
        fn file_changes_fire_listener() {
            let dir = tempfile::tempdir().unwrap();
            let path = Utf8PathBuf::try_from(dir.path().join("Home.html")).unwrap();
            std::fs::write(&path, "<p>one</p>").unwrap();

            let settings = WatcherSettings {
                enabled: true,
                debounce_ms: 10,
            };
            let watcher = NotifyWatcher::new(&settings).unwrap();
            let (tx, rx) = mpsc::channel();
            let tx = Mutex::new(tx);
            watcher.watch(
                &SourceId::Path(path.clone()),
                Box::new(move |source| {
                    let _ = tx.lock().send(source.clone());
                }),
            );

            std::fs::write(&path, "<p>two</p>").unwrap();
            let changed = rx.recv_timeout(Duration::from_secs(10)).unwrap();
            assert_eq!(changed, SourceId::Path(path));
        }
    }
}

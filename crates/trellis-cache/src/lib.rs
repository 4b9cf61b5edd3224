//! Caching and inheritance resolution for view markup.
//!
//! A [`MarkupCache`] asks a [`SourceLocator`] for a view's markup, walking up
//! the [`ClassHierarchy`] until some class has a source. The source is
//! assembled by [`trellis_markup::MarkupParser`]; markup that extends a base
//! is merged with the base's cached markup. Entries are evicted when a
//! [`ChangeWatcher`] reports their source changed, together with everything
//! merged from them.

mod cache;
mod hierarchy;
mod identity;
mod locator;
mod watcher;

pub use cache::CacheEntry;
pub use cache::FilterSetup;
pub use cache::MarkupCache;
pub use cache::MarkupCacheBuilder;
pub use hierarchy::ancestry;
pub use hierarchy::ClassHierarchy;
pub use hierarchy::StaticHierarchy;
pub use identity::CacheKey;
pub use identity::CacheKeyProvider;
pub use identity::DefaultCacheKeyProvider;
pub use identity::MarkupOrigin;
pub use identity::ViewIdentity;
pub use locator::FileSystemLocator;
pub use locator::SourceLocator;
pub use watcher::ChangeListener;
pub use watcher::ChangeWatcher;
pub use watcher::ManualWatcher;
pub use watcher::NotifyWatcher;
pub use watcher::WatchError;

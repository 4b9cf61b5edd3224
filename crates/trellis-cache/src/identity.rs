use std::fmt;

/// The view whose markup is requested.
///
/// `class` is the logical class name, e.g. `app.pages.HomePage`. Locale and
/// style select markup variants; `markup_type` is the file extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewIdentity {
    pub class: String,
    pub locale: Option<String>,
    pub style: Option<String>,
    pub markup_type: String,
}

impl ViewIdentity {
    #[must_use]
    pub fn new(class: impl Into<String>, markup_type: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            locale: None,
            style: None,
            markup_type: markup_type.into(),
        }
    }

    #[must_use]
    pub fn html(class: impl Into<String>) -> Self {
        Self::new(class, "html")
    }

    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    #[must_use]
    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    /// The same variant of another class, used to step up the hierarchy.
    #[must_use]
    pub fn for_class(&self, class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            ..self.clone()
        }
    }
}

/// `app.Home (html, locale de_CH, style dark)`.
impl fmt::Display for ViewIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}", self.class, self.markup_type)?;
        if let Some(locale) = &self.locale {
            write!(f, ", locale {locale}")?;
        }
        if let Some(style) = &self.style {
            write!(f, ", style {style}")?;
        }
        f.write_str(")")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// A view plus the key its markup is cached under. `None` means the markup
/// is resolved fresh on every request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarkupOrigin {
    pub view: ViewIdentity,
    pub cache_key: Option<CacheKey>,
}

impl MarkupOrigin {
    #[must_use]
    pub fn new(view: ViewIdentity, cache_key: Option<CacheKey>) -> Self {
        Self { view, cache_key }
    }

    #[must_use]
    pub fn uncached(view: ViewIdentity) -> Self {
        Self::new(view, None)
    }
}

pub trait CacheKeyProvider: Send + Sync {
    /// Key for `view`'s markup, or `None` to disable caching for it.
    fn cache_key(&self, view: &ViewIdentity) -> Option<CacheKey>;
}

/// Keys of the form `class[_locale][_style].markup_type`.
pub struct DefaultCacheKeyProvider;

impl CacheKeyProvider for DefaultCacheKeyProvider {
    fn cache_key(&self, view: &ViewIdentity) -> Option<CacheKey> {
        let mut key = view.class.clone();
        for part in [&view.locale, &view.style].into_iter().flatten() {
            key.push('_');
            key.push_str(part);
        }
        key.push('.');
        key.push_str(&view.markup_type);
        Some(CacheKey(key))
    }
}

//! The ordered filter chain between the tokenizer and the parser.
//!
//! Index 0 is the head and pulls straight from the tag source; the tail is
//! what the parser pulls from. Each filter asks its upstream for the next
//! tag, and may annotate it, swallow it, or queue extra tags of its own.

mod balance;
mod enclosure;
mod header;
mod identifier;
mod link;
mod message;
mod namespace;
mod relative_path;
mod remove;
mod tag_type;

use std::fmt;

pub use balance::requires_close_tag;
pub use balance::HtmlBalanceRepair;
pub use enclosure::EnclosureHandler;
pub use header::HeaderSectionHandler;
pub use header::HEADER_ID;
pub use identifier::SpecialTagIdentifier;
pub use link::LinkTagHandler;
pub use link::AUTOLINK_ID;
pub use message::parse_message_attribute;
pub use message::MessageTagHandler;
pub use namespace::NamespaceDetector;
pub use relative_path::RelativePathPrefixHandler;
pub use relative_path::RELATIVE_PATH_PREFIX_ID;
pub use remove::RemoveTagHandler;
pub use tag_type::TagTypeNormalizer;
use trellis_conf::MarkupSettings;

use crate::error::MarkupError;
use crate::markup::Markup;
use crate::tag::ComponentTag;
use crate::tokenizer::TagSource;

/// What a filter does; chain insertion is anchored on roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterRole {
    NamespaceDetector,
    SpecialTagIdentifier,
    TagTypeNormalizer,
    BalanceRepair,
    RemoveHandler,
    LinkHandler,
    MessageHandler,
    HeaderSection,
    RelativePathPrefix,
    Enclosure,
    Custom(&'static str),
}

impl fmt::Display for FilterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(name) => f.write_str(name),
            other => write!(f, "{other:?}"),
        }
    }
}

pub trait MarkupFilter {
    fn role(&self) -> FilterRole;

    /// Produce the next tag, pulling from `upstream` as needed. `markup` is
    /// the document under construction.
    fn next_element(
        &mut self,
        upstream: &mut Upstream<'_>,
        markup: &mut Markup,
    ) -> Result<Option<ComponentTag>, MarkupError>;

    /// Called once after the last tag and the trailing text are in `markup`.
    fn post_process(&mut self, _markup: &mut Markup) -> Result<(), MarkupError> {
        Ok(())
    }
}

/// The part of the chain in front of a filter.
pub struct Upstream<'a> {
    filters: &'a mut [Box<dyn MarkupFilter>],
    source: &'a mut dyn TagSource,
}

impl Upstream<'_> {
    pub fn next_tag(&mut self, markup: &mut Markup) -> Result<Option<ComponentTag>, MarkupError> {
        pull(self.filters, self.source, markup)
    }
}

fn pull(
    filters: &mut [Box<dyn MarkupFilter>],
    source: &mut dyn TagSource,
    markup: &mut Markup,
) -> Result<Option<ComponentTag>, MarkupError> {
    match filters.split_last_mut() {
        None => source.next_tag(),
        Some((last, rest)) => {
            let mut upstream = Upstream {
                filters: rest,
                source,
            };
            last.next_element(&mut upstream, markup)
        }
    }
}

#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn MarkupFilter>>,
}

impl FilterChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard chain. Namespace detection runs before special tag
    /// identification, and balance repair before anything that relies on
    /// close tags knowing their open tag.
    #[must_use]
    pub fn with_defaults(settings: &MarkupSettings) -> Self {
        let mut chain = Self::new();
        chain.append(Box::new(NamespaceDetector));
        chain.append(Box::new(SpecialTagIdentifier));
        chain.append(Box::new(TagTypeNormalizer::new()));
        chain.append(Box::new(HtmlBalanceRepair::new()));
        chain.append(Box::new(RemoveTagHandler));
        chain.append(Box::new(LinkTagHandler::new(settings.auto_link)));
        chain.append(Box::new(MessageTagHandler::new()));
        chain.append(Box::new(HeaderSectionHandler::new()));
        chain.append(Box::new(RelativePathPrefixHandler));
        chain.append(Box::new(EnclosureHandler::new()));
        chain
    }

    pub fn append(&mut self, filter: Box<dyn MarkupFilter>) {
        self.filters.push(filter);
    }

    /// Insert `filter` in front of the first filter whose role is `anchor`
    /// (the relative path prefix handler when `None`), or at the head when
    /// no filter has that role.
    pub fn insert_before(&mut self, filter: Box<dyn MarkupFilter>, anchor: Option<FilterRole>) {
        let anchor = anchor.unwrap_or(FilterRole::RelativePathPrefix);
        let index = self
            .filters
            .iter()
            .position(|existing| existing.role() == anchor)
            .unwrap_or(0);
        tracing::trace!(role = %filter.role(), %anchor, index, "Inserting markup filter");
        self.filters.insert(index, filter);
    }

    #[must_use]
    pub fn roles(&self) -> Vec<FilterRole> {
        self.filters.iter().map(|filter| filter.role()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn next_tag(
        &mut self,
        source: &mut dyn TagSource,
        markup: &mut Markup,
    ) -> Result<Option<ComponentTag>, MarkupError> {
        pull(&mut self.filters, source, markup)
    }

    pub fn post_process(&mut self, markup: &mut Markup) -> Result<(), MarkupError> {
        for filter in &mut self.filters {
            filter.post_process(markup)?;
        }
        Ok(())
    }
}

/// True for references resolved against the markup's own location:
/// not absolute, not a fragment or query, no scheme, no placeholder.
pub(crate) fn is_relative_reference(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() || value.starts_with(['/', '#', '?']) || value.starts_with("${") {
        return false;
    }
    let has_scheme = value.split_once(':').is_some_and(|(scheme, _)| {
        !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    });
    !has_scheme
}

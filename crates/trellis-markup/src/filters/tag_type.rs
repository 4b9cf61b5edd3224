use trellis_source::Span;

use crate::error::MarkupError;
use crate::filters::FilterRole;
use crate::filters::MarkupFilter;
use crate::filters::Upstream;
use crate::markup::Markup;
use crate::tag::ComponentTag;
use crate::tag::TagKind;

/// Elements browsers mishandle when written as `<name/>`.
const MUST_HAVE_BODY: &[&str] = &[
    "a", "b", "button", "div", "em", "h1", "h2", "h3", "h4", "h5", "h6", "i", "iframe", "label",
    "li", "ol", "option", "p", "pre", "script", "select", "span", "strong", "table", "td",
    "textarea", "th", "tr", "u", "ul",
];

/// Rewrites `<span/>` and friends into an open tag plus a synthetic close
/// tag, so everything downstream sees a body-bearing element.
#[derive(Default)]
pub struct TagTypeNormalizer {
    pending: Option<ComponentTag>,
}

impl TagTypeNormalizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn must_have_body(tag: &ComponentTag) -> bool {
    tag.namespace().is_none()
        && MUST_HAVE_BODY
            .iter()
            .any(|name| tag.name().eq_ignore_ascii_case(name))
}

impl MarkupFilter for TagTypeNormalizer {
    fn role(&self) -> FilterRole {
        FilterRole::TagTypeNormalizer
    }

    fn next_element(
        &mut self,
        upstream: &mut Upstream<'_>,
        markup: &mut Markup,
    ) -> Result<Option<ComponentTag>, MarkupError> {
        if let Some(close) = self.pending.take() {
            return Ok(Some(close));
        }
        let Some(mut tag) = upstream.next_tag(markup)? else {
            return Ok(None);
        };

        if tag.is_open_close() && must_have_body(&tag) {
            tag.set_kind(TagKind::Open)?;
            tag.set_modified(true)?;
            self.pending = Some(tag.synthesize_close(Span::empty_at(tag.span().end_usize())));
        }

        Ok(Some(tag))
    }
}

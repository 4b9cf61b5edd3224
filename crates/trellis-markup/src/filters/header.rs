use trellis_source::Span;

use crate::error::MarkupError;
use crate::filters::FilterRole;
use crate::filters::MarkupFilter;
use crate::filters::Upstream;
use crate::markup::Markup;
use crate::tag::ComponentTag;
use crate::tag::SpecialRole;
use crate::tag::TagKind;

/// Binding id of the page's `<head>` section.
pub const HEADER_ID: &str = "_header_";

/// Binds `<head>` and makes sure every page has one: a `<body>` that is not
/// preceded by a head section gets an empty synthetic `<head></head>` in
/// front of it.
#[derive(Default)]
pub struct HeaderSectionHandler {
    found_head: bool,
    done: bool,
}

impl HeaderSectionHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn insert_head(markup: &mut Markup, at: Span) -> Result<(), MarkupError> {
        let mut open = ComponentTag::synthetic(TagKind::Open, "head", None, at);
        open.set_binding_id(Some(HEADER_ID.to_string()))?;
        open.set_auto_component(true)?;
        let close = open.synthesize_close(at);
        markup.push(open.into())?;
        markup.push(close.into())?;
        Ok(())
    }
}

impl MarkupFilter for HeaderSectionHandler {
    fn role(&self) -> FilterRole {
        FilterRole::HeaderSection
    }

    fn next_element(
        &mut self,
        upstream: &mut Upstream<'_>,
        markup: &mut Markup,
    ) -> Result<Option<ComponentTag>, MarkupError> {
        let Some(mut tag) = upstream.next_tag(markup)? else {
            return Ok(None);
        };
        if self.done || tag.is_close() {
            return Ok(Some(tag));
        }

        if tag.has_role(SpecialRole::Head) {
            self.found_head = true;
        } else if tag.is_html("head") {
            self.found_head = true;
            if !tag.is_bound() {
                tag.set_binding_id(Some(HEADER_ID.to_string()))?;
                tag.set_auto_component(true)?;
            }
        } else if tag.is_html("body") {
            self.done = true;
            if !self.found_head {
                tracing::trace!(span = ?tag.span(), "Inserting header section before body");
                Self::insert_head(markup, Span::empty_at(tag.span().start_usize()))?;
            }
        }

        Ok(Some(tag))
    }
}

use crate::error::MarkupError;
use crate::filters::FilterRole;
use crate::filters::MarkupFilter;
use crate::filters::Upstream;
use crate::markup::Markup;
use crate::tag::ComponentTag;
use crate::tag::SpecialRole;

/// Drops `<ns:remove>` regions. Design-time preview content lives there.
///
/// Everything up to the matching close tag is consumed; the open tag comes
/// out flagged `ignore`, so the parser skips the region's text as well.
pub struct RemoveTagHandler;

impl MarkupFilter for RemoveTagHandler {
    fn role(&self) -> FilterRole {
        FilterRole::RemoveHandler
    }

    fn next_element(
        &mut self,
        upstream: &mut Upstream<'_>,
        markup: &mut Markup,
    ) -> Result<Option<ComponentTag>, MarkupError> {
        let Some(mut tag) = upstream.next_tag(markup)? else {
            return Ok(None);
        };
        if !tag.has_role(SpecialRole::Remove) || tag.is_close() {
            return Ok(Some(tag));
        }

        let namespace = markup.namespace().to_string();
        if tag.is_open_close() {
            return Err(MarkupError::invalid_markup(
                tag.span(),
                format!("<{namespace}:remove> must not be an open-close tag"),
            ));
        }

        loop {
            let Some(inner) = upstream.next_tag(markup)? else {
                return Err(MarkupError::invalid_markup(
                    tag.span(),
                    format!("Missing close tag for <{namespace}:remove>"),
                ));
            };
            if inner.closes(&tag) {
                break;
            }
            if let Some(binding) = inner.binding_id().filter(|_| !inner.is_close()) {
                return Err(MarkupError::invalid_markup(
                    inner.span(),
                    format!(
                        "Markup inside <{namespace}:remove> must not contain bound tags, found '{binding}'"
                    ),
                ));
            }
        }

        tracing::trace!(span = ?tag.span(), "Removing preview region");
        tag.set_ignore(true)?;
        Ok(Some(tag))
    }
}

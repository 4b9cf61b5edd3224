use trellis_source::Span;

use crate::error::MarkupError;
use crate::filters::FilterRole;
use crate::filters::MarkupFilter;
use crate::filters::Upstream;
use crate::markup::Markup;
use crate::tag::ComponentTag;
use crate::tag::TagId;

/// HTML elements that may legally appear without a close tag.
const NO_CLOSE_TAG_REQUIRED: &[&str] = &[
    "area", "base", "br", "col", "colgroup", "command", "dd", "dt", "embed", "hr", "img", "input",
    "keygen", "li", "link", "meta", "option", "p", "param", "source", "tbody", "td", "tfoot",
    "th", "thead", "tr", "track", "wbr",
];

/// Whether a tag named `name` must be closed. Namespaced names always must.
#[must_use]
pub fn requires_close_tag(name: &str) -> bool {
    if name.contains(':') {
        return true;
    }
    !NO_CLOSE_TAG_REQUIRED
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(name))
}

struct OpenEntry {
    id: TagId,
    name: String,
    span: Span,
}

/// Matches close tags to open tags.
///
/// Sets the back reference on every close tag and self references on
/// open-close tags. Open tags that are never closed are flagged
/// `no_close_tag` when HTML allows it and reported otherwise.
#[derive(Default)]
pub struct HtmlBalanceRepair {
    stack: Vec<OpenEntry>,
}

impl HtmlBalanceRepair {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn flag_no_close_tag(markup: &mut Markup, id: TagId) -> Result<(), MarkupError> {
    if let Some(tag) = markup.tag_mut(id)? {
        tag.set_no_close_tag(true)?;
    }
    Ok(())
}

fn same_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

impl MarkupFilter for HtmlBalanceRepair {
    fn role(&self) -> FilterRole {
        FilterRole::BalanceRepair
    }

    fn next_element(
        &mut self,
        upstream: &mut Upstream<'_>,
        markup: &mut Markup,
    ) -> Result<Option<ComponentTag>, MarkupError> {
        let Some(mut tag) = upstream.next_tag(markup)? else {
            while let Some(open) = self.stack.pop() {
                if requires_close_tag(&open.name) {
                    return Err(MarkupError::StructuralImbalance {
                        message: format!("Tag '{}' does not have a close tag", open.name),
                        tag: open.name,
                        span: open.span,
                    });
                }
                flag_no_close_tag(markup, open.id)?;
            }
            return Ok(None);
        };

        if tag.is_open() {
            self.stack.push(OpenEntry {
                id: tag.id(),
                name: tag.qualified_name(),
                span: tag.span(),
            });
        } else if tag.is_open_close() {
            tag.set_open_tag(tag.id())?;
        } else {
            let name = tag.qualified_name();
            loop {
                let Some(open) = self.stack.pop() else {
                    return Err(MarkupError::StructuralImbalance {
                        message: format!("Tag '</{name}>' does not have a matching open tag"),
                        tag: name,
                        span: tag.span(),
                    });
                };
                if same_name(&open.name, &name) {
                    tag.set_open_tag(open.id)?;
                    break;
                }
                if requires_close_tag(&open.name) {
                    return Err(MarkupError::StructuralImbalance {
                        message: format!(
                            "Tag '{}' has a mismatched close tag '</{name}>'",
                            open.name
                        ),
                        tag: open.name,
                        span: open.span,
                    });
                }
                flag_no_close_tag(markup, open.id)?;
            }
        }

        Ok(Some(tag))
    }
}

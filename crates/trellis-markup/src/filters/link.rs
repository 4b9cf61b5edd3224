use crate::error::MarkupError;
use crate::filters::is_relative_reference;
use crate::filters::FilterRole;
use crate::filters::MarkupFilter;
use crate::filters::Upstream;
use crate::markup::Markup;
use crate::tag::ComponentTag;
use crate::tag::SpecialRole;

/// Binding id given to tags rewritten inside link regions.
pub const AUTOLINK_ID: &str = "_autolink_";

fn reference_attribute(tag: &ComponentTag) -> Option<&'static str> {
    if tag.namespace().is_some() {
        return None;
    }
    let name = tag.name().to_ascii_lowercase();
    match name.as_str() {
        "a" | "link" | "area" | "base" => Some("href"),
        "script" | "img" | "input" | "embed" | "iframe" => Some("src"),
        _ => None,
    }
}

/// Marks linkable tags inside `<ns:link>` regions, or anywhere when
/// automatic linking is switched on, so they can be rewritten to resource
/// references at render time.
pub struct LinkTagHandler {
    auto_link: bool,
    regions: Vec<bool>,
}

impl LinkTagHandler {
    #[must_use]
    pub fn new(auto_link: bool) -> Self {
        Self {
            auto_link,
            regions: Vec::new(),
        }
    }

    fn linking(&self) -> bool {
        self.regions.last().copied().unwrap_or(self.auto_link)
    }
}

impl MarkupFilter for LinkTagHandler {
    fn role(&self) -> FilterRole {
        FilterRole::LinkHandler
    }

    fn next_element(
        &mut self,
        upstream: &mut Upstream<'_>,
        markup: &mut Markup,
    ) -> Result<Option<ComponentTag>, MarkupError> {
        let Some(mut tag) = upstream.next_tag(markup)? else {
            return Ok(None);
        };

        if tag.has_role(SpecialRole::Link) {
            if tag.is_open() {
                let enabled = tag
                    .attribute("autolink")
                    .is_none_or(|value| !value.trim().eq_ignore_ascii_case("false"));
                self.regions.push(enabled);
            } else if tag.is_close() {
                self.regions.pop();
            }
            return Ok(Some(tag));
        }

        if !self.linking() || tag.is_close() || tag.is_bound() {
            return Ok(Some(tag));
        }
        let Some(attribute) = reference_attribute(&tag) else {
            return Ok(Some(tag));
        };
        if tag.attribute(attribute).is_some_and(is_relative_reference) {
            tag.set_binding_id(Some(AUTOLINK_ID.to_string()))?;
            tag.set_auto_component(true)?;
        }

        Ok(Some(tag))
    }
}

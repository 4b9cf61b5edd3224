use crate::error::MarkupError;
use crate::filters::is_relative_reference;
use crate::filters::FilterRole;
use crate::filters::MarkupFilter;
use crate::filters::Upstream;
use crate::markup::Markup;
use crate::tag::ComponentTag;

/// Binding id of tags whose relative references need a path prefix.
pub const RELATIVE_PATH_PREFIX_ID: &str = "_relative_path_prefix_";

const REFERENCE_ATTRIBUTES: &[&str] = &["href", "src", "background", "action"];

/// Flags unbound tags with relative references so the renderer can prefix
/// them with the path back to the application root.
///
/// Custom filters are inserted in front of this one by default.
pub struct RelativePathPrefixHandler;

impl MarkupFilter for RelativePathPrefixHandler {
    fn role(&self) -> FilterRole {
        FilterRole::RelativePathPrefix
    }

    fn next_element(
        &mut self,
        upstream: &mut Upstream<'_>,
        markup: &mut Markup,
    ) -> Result<Option<ComponentTag>, MarkupError> {
        let Some(mut tag) = upstream.next_tag(markup)? else {
            return Ok(None);
        };
        if tag.is_close() || tag.is_bound() {
            return Ok(Some(tag));
        }

        let relative = REFERENCE_ATTRIBUTES.iter().any(|name| {
            tag.attributes()
                .iter()
                .any(|(key, value)| key.eq_ignore_ascii_case(name) && is_relative_reference(value))
        });
        if relative {
            tag.set_binding_id(Some(RELATIVE_PATH_PREFIX_ID.to_string()))?;
            tag.set_auto_component(true)?;
        }

        Ok(Some(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::test_support::*;
    use crate::filters::LinkTagHandler;
    use crate::filters::SpecialTagIdentifier;
    use crate::filters::AUTOLINK_ID;

    fn prefix(input: &str) -> Vec<ComponentTag> {
        run(
            vec![
                Box::new(SpecialTagIdentifier),
                Box::new(LinkTagHandler::new(false)),
                Box::new(RelativePathPrefixHandler),
            ],
            input,
        )
        .unwrap()
    }

    #[test]
    fn relative_references() {
        let tags = prefix("<img src=\"logo.png\"/><form action=\"submit\"></form><td background=\"bg.gif\"/>");
        assert!(tags
            .iter()
            .filter(|tag| !tag.is_close())
            .all(|tag| tag.binding_id() == Some(RELATIVE_PATH_PREFIX_ID)));
    }

    #[test]
    fn absolute_references_and_bound_tags() {
        let tags = prefix("<a href=\"/root\">x</a><img wicket:id=\"img\" src=\"logo.png\"/><p class=\"x\"/>");
        assert!(tags[0].binding_id().is_none());
        assert_eq!(tags[2].binding_id(), Some("img"));
        assert!(tags[3].binding_id().is_none());
    }

    #[test]
    fn link_regions_take_precedence() {
        let tags = prefix("<wicket:link><a href=\"page.html\">x</a></wicket:link>");
        assert_eq!(tags[1].binding_id(), Some(AUTOLINK_ID));
    }
}

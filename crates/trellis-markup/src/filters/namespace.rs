use crate::error::MarkupError;
use crate::filters::FilterRole;
use crate::filters::MarkupFilter;
use crate::filters::Upstream;
use crate::markup::Markup;
use crate::tag::ComponentTag;

const CONTROL_NAMESPACE_URI: &str = "http://wicket.apache.org";

/// Switches the document's control namespace when a tag declares
/// `xmlns:<prefix>="http://wicket.apache.org..."`.
pub struct NamespaceDetector;

impl MarkupFilter for NamespaceDetector {
    fn role(&self) -> FilterRole {
        FilterRole::NamespaceDetector
    }

    fn next_element(
        &mut self,
        upstream: &mut Upstream<'_>,
        markup: &mut Markup,
    ) -> Result<Option<ComponentTag>, MarkupError> {
        let Some(tag) = upstream.next_tag(markup)? else {
            return Ok(None);
        };
        if tag.is_close() {
            return Ok(Some(tag));
        }

        for (key, value) in tag.attributes() {
            let Some(prefix) = key.strip_prefix("xmlns:") else {
                continue;
            };
            if !value.trim().starts_with(CONTROL_NAMESPACE_URI) {
                continue;
            }
            if prefix.is_empty() {
                return Err(MarkupError::invalid_markup(
                    tag.span(),
                    "Namespace declaration without a prefix",
                ));
            }
            tracing::debug!(namespace = prefix, "Control namespace declared");
            markup.resource_mut()?.namespace = prefix.to_string();
        }

        Ok(Some(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::test_support::*;
    use crate::filters::FilterChain;

    fn namespace_after(input: &str) -> Result<String, MarkupError> {
        let mut chain = FilterChain::new();
        chain.append(Box::new(NamespaceDetector));
        let mut source = tokens(input);
        let mut markup = markup();
        while chain.next_tag(&mut source, &mut markup)?.is_some() {}
        Ok(markup.namespace().to_string())
    }

    #[test]
    fn default_is_kept() {
        assert_eq!(namespace_after("<html><body/></html>").unwrap(), "wicket");
    }

    #[test]
    fn declared_prefix_wins() {
        let input = "<html xmlns:wcn=\"http://wicket.apache.org/dtds.data/wicket-xhtml1.4-strict.dtd\">";
        assert_eq!(namespace_after(input).unwrap(), "wcn");
    }

    #[test]
    fn other_namespaces_are_ignored() {
        let input = "<html xmlns:svg=\"http://www.w3.org/2000/svg\">";
        assert_eq!(namespace_after(input).unwrap(), "wicket");
    }
}

use trellis_source::Span;

use crate::error::MarkupError;
use crate::filters::FilterRole;
use crate::filters::MarkupFilter;
use crate::filters::Upstream;
use crate::markup::Markup;
use crate::tag::ComponentTag;
use crate::tag::SpecialRole;
use crate::tag::TagId;

struct OpenEnclosure {
    id: TagId,
    span: Span,
    explicit_child: Option<String>,
    children: Vec<String>,
}

/// Records on every `<ns:enclosure>` the binding id of the child component
/// whose visibility controls it, in the `child` attribute.
#[derive(Default)]
pub struct EnclosureHandler {
    stack: Vec<OpenEnclosure>,
}

impl EnclosureHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn finish(
        enclosure: OpenEnclosure,
        namespace: &str,
        markup: &mut Markup,
    ) -> Result<(), MarkupError> {
        if let Some(path) = enclosure.explicit_child {
            let first = path.split(':').next().unwrap_or_default().trim();
            if !enclosure.children.iter().any(|child| child == first) {
                return Err(MarkupError::invalid_markup(
                    enclosure.span,
                    format!(
                        "<{namespace}:enclosure> names child '{path}', but no tag inside it is bound to '{first}'"
                    ),
                ));
            }
            return Ok(());
        }

        let Some(child) = enclosure.children.into_iter().next() else {
            return Err(MarkupError::invalid_markup(
                enclosure.span,
                format!("<{namespace}:enclosure> does not contain a bound child tag"),
            ));
        };
        if let Some(open) = markup.tag_mut(enclosure.id)? {
            open.set_attribute("child", child)?;
        }
        Ok(())
    }
}

impl MarkupFilter for EnclosureHandler {
    fn role(&self) -> FilterRole {
        FilterRole::Enclosure
    }

    fn next_element(
        &mut self,
        upstream: &mut Upstream<'_>,
        markup: &mut Markup,
    ) -> Result<Option<ComponentTag>, MarkupError> {
        let Some(tag) = upstream.next_tag(markup)? else {
            return Ok(None);
        };

        if tag.has_role(SpecialRole::Enclosure) {
            let namespace = markup.namespace().to_string();
            if tag.is_open_close() {
                return Err(MarkupError::invalid_markup(
                    tag.span(),
                    format!("<{namespace}:enclosure> must have a body"),
                ));
            }
            if tag.is_open() {
                self.stack.push(OpenEnclosure {
                    id: tag.id(),
                    span: tag.span(),
                    explicit_child: tag.attribute("child").map(str::to_string),
                    children: Vec::new(),
                });
            } else if let Some(enclosure) = self.stack.pop() {
                Self::finish(enclosure, &namespace, markup)?;
            }
            return Ok(Some(tag));
        }

        if !tag.is_close() && !tag.is_special() && !tag.is_auto_component() {
            if let Some(binding) = tag.binding_id() {
                for enclosure in &mut self.stack {
                    enclosure.children.push(binding.to_string());
                }
            }
        }

        Ok(Some(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::test_support::*;
    use crate::filters::FilterChain;
    use crate::filters::HtmlBalanceRepair;
    use crate::filters::SpecialTagIdentifier;

    /// Pushes bound tags into the document the way the parser does.
    fn assemble(input: &str) -> Result<Markup, MarkupError> {
        let mut chain = FilterChain::new();
        chain.append(Box::new(SpecialTagIdentifier));
        chain.append(Box::new(HtmlBalanceRepair::new()));
        chain.append(Box::new(EnclosureHandler::new()));
        let mut source = tokens(input);
        let mut markup = markup();
        while let Some(tag) = chain.next_tag(&mut source, &mut markup)? {
            if tag.is_bound() || tag.is_close() {
                markup.push(tag.into())?;
            }
        }
        Ok(markup)
    }

    fn child_of_first_enclosure(markup: &Markup) -> Option<String> {
        markup
            .iter()
            .filter_map(|element| element.as_tag())
            .find(|tag| tag.is_enclosure() && tag.is_open())
            .and_then(|tag| tag.attribute("child"))
            .map(str::to_string)
    }

    #[test]
    fn first_bound_child_controls() {
        let markup = assemble(
            "<wicket:enclosure><div><span wicket:id=\"a\"></span><span wicket:id=\"b\"></span></div></wicket:enclosure>",
        )
        .unwrap();
        assert_eq!(child_of_first_enclosure(&markup).as_deref(), Some("a"));
    }

    #[test]
    fn explicit_child_is_validated() {
        let markup = assemble(
            "<wicket:enclosure child=\"b:inner\"><span wicket:id=\"a\"></span><span wicket:id=\"b\"></span></wicket:enclosure>",
        )
        .unwrap();
        assert_eq!(child_of_first_enclosure(&markup).as_deref(), Some("b:inner"));

        let err = assemble(
            "<wicket:enclosure child=\"c\"><span wicket:id=\"a\"></span></wicket:enclosure>",
        )
        .unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"<wicket:enclosure> names child 'c', but no tag inside it is bound to 'c'");
    }

    #[test]
    fn nested_children_count_for_outer() {
        let markup = assemble(
            "<wicket:enclosure><wicket:enclosure><b wicket:id=\"x\"></b></wicket:enclosure></wicket:enclosure>",
        )
        .unwrap();
        let children: Vec<_> = markup
            .iter()
            .filter_map(|element| element.as_tag())
            .filter(|tag| tag.is_enclosure() && tag.is_open())
            .filter_map(|tag| tag.attribute("child"))
            .collect();
        assert_eq!(children, ["x", "x"]);
    }

    #[test]
    fn enclosure_without_children() {
        let err = assemble("<wicket:enclosure><p>text</p></wicket:enclosure>").unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"<wicket:enclosure> does not contain a bound child tag");
    }

    #[test]
    fn open_close_enclosure() {
        let err = assemble("<wicket:enclosure/>").unwrap_err();
        assert!(matches!(err, MarkupError::InvalidMarkup { .. }));
    }
}

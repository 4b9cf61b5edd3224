use crate::error::MarkupError;
use crate::filters::FilterRole;
use crate::filters::MarkupFilter;
use crate::filters::Upstream;
use crate::markup::Markup;
use crate::tag::ComponentTag;
use crate::tag::SpecialRole;

/// Parse an `attr:key[,attr:key]` list into `(attribute, key)` pairs.
///
/// Returns `None` when any entry lacks either side of the colon.
#[must_use]
pub fn parse_message_attribute(value: &str) -> Option<Vec<(String, String)>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    value
        .split(',')
        .map(|entry| {
            let (attribute, key) = entry.split_once(':')?;
            let (attribute, key) = (attribute.trim(), key.trim());
            if attribute.is_empty() || key.is_empty() {
                None
            } else {
                Some((attribute.to_string(), key.to_string()))
            }
        })
        .collect()
}

/// Validates `<ns:message key="...">` tags and `ns:message` attributes.
///
/// Tags carrying the attribute become components so that their attribute
/// values can be localized at render time.
#[derive(Default)]
pub struct MessageTagHandler {
    counter: usize,
}

impl MessageTagHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MarkupFilter for MessageTagHandler {
    fn role(&self) -> FilterRole {
        FilterRole::MessageHandler
    }

    fn next_element(
        &mut self,
        upstream: &mut Upstream<'_>,
        markup: &mut Markup,
    ) -> Result<Option<ComponentTag>, MarkupError> {
        let Some(mut tag) = upstream.next_tag(markup)? else {
            return Ok(None);
        };
        if tag.is_close() {
            return Ok(Some(tag));
        }
        let namespace = markup.namespace().to_string();

        if tag.has_role(SpecialRole::Message)
            && tag.attribute("key").is_none_or(|key| key.trim().is_empty())
        {
            return Err(MarkupError::invalid_markup(
                tag.span(),
                format!("<{namespace}:message> requires a non-empty 'key' attribute"),
            ));
        }

        let attribute = format!("{namespace}:message");
        let Some(value) = tag.attribute(&attribute) else {
            return Ok(Some(tag));
        };
        if parse_message_attribute(value).is_none() {
            return Err(MarkupError::invalid_markup(
                tag.span(),
                format!("Invalid {attribute} value '{value}', expected 'attribute:key[,attribute:key]'"),
            ));
        }

        if !tag.is_bound() {
            self.counter += 1;
            tag.set_binding_id(Some(format!("_message_attr_{}", self.counter)))?;
            tag.set_auto_component(true)?;
        }

        Ok(Some(tag))
    }
}

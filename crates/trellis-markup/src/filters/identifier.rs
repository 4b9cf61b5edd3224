use crate::error::MarkupError;
use crate::filters::FilterRole;
use crate::filters::MarkupFilter;
use crate::filters::Upstream;
use crate::markup::Markup;
use crate::tag::ComponentTag;
use crate::tag::SpecialRole;

/// Promotes tags in the control namespace to special tags and binds tags
/// carrying `<ns>:id`. Everything else stays anonymous.
pub struct SpecialTagIdentifier;

impl MarkupFilter for SpecialTagIdentifier {
    fn role(&self) -> FilterRole {
        FilterRole::SpecialTagIdentifier
    }

    fn next_element(
        &mut self,
        upstream: &mut Upstream<'_>,
        markup: &mut Markup,
    ) -> Result<Option<ComponentTag>, MarkupError> {
        let Some(mut tag) = upstream.next_tag(markup)? else {
            return Ok(None);
        };
        let namespace = markup.namespace();

        if tag.namespace() == Some(namespace) {
            let Some(role) = SpecialRole::from_name(tag.name()) else {
                return Err(MarkupError::invalid_markup(
                    tag.span(),
                    format!("Unknown tag name with {namespace} namespace: '{}'", tag.name()),
                ));
            };
            tag.set_role(Some(role))?;
            tag.set_binding_id(Some(format!("_{}", role.name())))?;
            tag.set_auto_component(true)?;
        }

        let id_attribute = format!("{namespace}:id");
        if let Some(value) = tag.attribute(&id_attribute).map(str::trim) {
            if value.is_empty() {
                return Err(MarkupError::invalid_markup(
                    tag.span(),
                    format!("The {id_attribute} attribute value must not be empty"),
                ));
            }
            let value = value.to_string();
            tag.set_binding_id(Some(value))?;
            tag.set_auto_component(false)?;
        }

        Ok(Some(tag))
    }
}

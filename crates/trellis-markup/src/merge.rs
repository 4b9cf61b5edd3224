//! Markup inheritance: splicing a derived document into its base.

use crate::element::MarkupElement;
use crate::error::MarkupError;
use crate::markup::Markup;
use crate::tag::ComponentTag;
use crate::tag::SpecialRole;

/// Index of the first open `<ns:extend>` tag, if the document inherits its
/// layout from a base document.
#[must_use]
pub fn requires_base_markup(markup: &Markup) -> Option<usize> {
    markup.iter().position(|element| {
        element
            .as_tag()
            .is_some_and(|tag| tag.is_extend() && !tag.is_close())
    })
}

fn tag_at(markup: &Markup, index: usize) -> Option<&ComponentTag> {
    markup.get(index).and_then(MarkupElement::as_tag)
}

/// End (exclusive) of the element opened at `index`.
fn region_end(markup: &Markup, index: usize) -> Option<usize> {
    let tag = tag_at(markup, index)?;
    if tag.is_open_close() {
        Some(index + 1)
    } else {
        markup.find_close(index).map(|close| close + 1)
    }
}

/// The `<ns:head>` regions in front of the extend tag.
fn head_contributions(derived: &Markup, extend_index: usize) -> Vec<MarkupElement> {
    let mut heads = Vec::new();
    let mut index = 0;
    while index < extend_index {
        let is_head = tag_at(derived, index)
            .is_some_and(|tag| tag.has_role(SpecialRole::Head) && tag.is_open());
        if is_head {
            if let Some(end) = derived.find_close(index).filter(|end| *end < extend_index) {
                heads.extend_from_slice(&derived.elements()[index..=end]);
                index = end + 1;
                continue;
            }
        }
        index += 1;
    }
    heads
}

/// Where head contributions go in the base, searching in front of the child
/// placeholder: before `</head>`, after the last `</ns:head>`, or before the
/// body or first major tag.
fn head_insertion_point(base: &Markup, child_index: usize) -> usize {
    let prefix = &base.elements()[..child_index];
    let tags = || {
        prefix
            .iter()
            .enumerate()
            .filter_map(|(index, element)| element.as_tag().map(|tag| (index, tag)))
    };

    if let Some((index, _)) = tags().find(|(_, tag)| tag.is_close() && tag.is_html("head")) {
        return index;
    }
    if let Some((index, _)) = tags()
        .rev()
        .find(|(_, tag)| tag.is_close() && tag.has_role(SpecialRole::Head))
    {
        return index + 1;
    }
    tags()
        .find(|(_, tag)| !tag.is_close() && (tag.is_html("body") || tag.is_major()))
        .map_or(child_index, |(index, _)| index)
}

/// Build the document for a derived view.
///
/// Takes the base up to its `<ns:child>` placeholder, then the body of the
/// derived `<ns:extend>` at `extend_index`, then the base after the
/// placeholder. Neither the placeholder nor the extend tags are copied.
/// `<ns:head>` regions of the derived document are carried into the base's
/// head section. The result is frozen and records `base_key` as its base.
pub fn merge(
    derived: &Markup,
    base: &Markup,
    extend_index: usize,
    base_key: Option<String>,
) -> Result<Markup, MarkupError> {
    let namespace = derived.namespace();
    let Some(extend) = tag_at(derived, extend_index).filter(|tag| tag.is_extend()) else {
        return Err(MarkupError::invalid_inheritance(
            None,
            format!("No <{namespace}:extend> tag at element {extend_index}"),
        ));
    };
    let body_end = if extend.is_open_close() {
        extend_index + 1
    } else {
        derived.find_close(extend_index).ok_or_else(|| {
            MarkupError::invalid_inheritance(
                Some(extend.span()),
                format!("Missing close tag for <{namespace}:extend>"),
            )
        })?
    };

    let base_name = base
        .resource()
        .cache_key
        .clone()
        .or_else(|| base.resource().view_class.clone())
        .unwrap_or_else(|| "<unnamed>".to_string());
    let child_index = base.find_role(SpecialRole::Child, 0).ok_or_else(|| {
        MarkupError::invalid_inheritance(
            None,
            format!(
                "Base markup '{base_name}' does not contain a <{}:child> tag",
                base.namespace()
            ),
        )
    })?;
    let child_end = region_end(base, child_index).ok_or_else(|| {
        MarkupError::invalid_inheritance(
            tag_at(base, child_index).map(ComponentTag::span),
            format!("Missing close tag for <{}:child> in '{base_name}'", base.namespace()),
        )
    })?;

    let heads = head_contributions(derived, extend_index);
    let insert_at = if heads.is_empty() {
        child_index
    } else {
        head_insertion_point(base, child_index)
    };

    let base_elements = base.elements();
    let mut elements = Vec::with_capacity(
        base.len() + heads.len() + (body_end - extend_index).saturating_sub(1),
    );
    elements.extend_from_slice(&base_elements[..insert_at]);
    elements.extend(heads);
    elements.extend_from_slice(&base_elements[insert_at..child_index]);
    elements.extend_from_slice(&derived.elements()[extend_index + 1..body_end]);
    elements.extend_from_slice(&base_elements[child_end..]);

    let mut resource = derived.resource().clone();
    resource.base = base_key;

    tracing::debug!(
        derived = ?resource.cache_key,
        base = ?resource.base,
        elements = elements.len(),
        "Merged markup"
    );

    let mut merged = Markup::from_elements(resource, elements);
    merged.freeze();
    Ok(merged)
}

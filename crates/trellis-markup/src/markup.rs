use std::fmt;
use std::slice;

use rustc_hash::FxHashMap;
use trellis_source::Encoding;
use trellis_source::SourceId;

use crate::element::MarkupElement;
use crate::error::MarkupError;
use crate::tag::ComponentTag;
use crate::tag::SpecialRole;
use crate::tag::TagId;

/// Where a document came from and what the tokenizer learned about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupResource {
    pub source: Option<SourceId>,
    /// The view class whose markup this is.
    pub view_class: Option<String>,
    pub cache_key: Option<String>,
    pub encoding: Option<Encoding>,
    pub xml_declaration: Option<String>,
    pub doctype: Option<String>,
    /// Control namespace prefix in effect, `wicket` unless the document
    /// declares another one.
    pub namespace: String,
    /// Cache key of the base markup a merged document was built from.
    pub base: Option<String>,
}

impl MarkupResource {
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            source: None,
            view_class: None,
            cache_key: None,
            encoding: None,
            xml_declaration: None,
            doctype: None,
            namespace: namespace.into(),
            base: None,
        }
    }
}

/// An assembled markup document.
///
/// Mutable while the parser builds it; [`Markup::freeze`] makes the element
/// list and every tag in it read-only for good.
#[derive(Debug, Clone)]
pub struct Markup {
    resource: MarkupResource,
    elements: Vec<MarkupElement>,
    /// Position of every tag in `elements`.
    tag_index: FxHashMap<TagId, usize>,
    immutable: bool,
}

impl Markup {
    #[must_use]
    pub fn new(resource: MarkupResource) -> Self {
        Self {
            resource,
            elements: Vec::new(),
            tag_index: FxHashMap::default(),
            immutable: false,
        }
    }

    pub(crate) fn from_elements(resource: MarkupResource, elements: Vec<MarkupElement>) -> Self {
        let tag_index = elements
            .iter()
            .enumerate()
            .filter_map(|(index, element)| element.as_tag().map(|tag| (tag.id(), index)))
            .collect();
        Self {
            resource,
            elements,
            tag_index,
            immutable: false,
        }
    }

    #[must_use]
    pub fn resource(&self) -> &MarkupResource {
        &self.resource
    }

    pub fn resource_mut(&mut self) -> Result<&mut MarkupResource, MarkupError> {
        self.check_mutable()?;
        Ok(&mut self.resource)
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.resource.namespace
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&MarkupElement> {
        self.elements.get(index)
    }

    #[must_use]
    pub fn elements(&self) -> &[MarkupElement] {
        &self.elements
    }

    pub fn iter(&self) -> slice::Iter<'_, MarkupElement> {
        self.elements.iter()
    }

    fn check_mutable(&self) -> Result<(), MarkupError> {
        if self.immutable {
            Err(MarkupError::Immutable)
        } else {
            Ok(())
        }
    }

    pub fn push(&mut self, element: MarkupElement) -> Result<(), MarkupError> {
        self.check_mutable()?;
        if let Some(tag) = element.as_tag() {
            self.tag_index.insert(tag.id(), self.elements.len());
        }
        self.elements.push(element);
        Ok(())
    }

    /// Insert at `index`, clamped to the current length.
    pub fn insert(&mut self, index: usize, element: MarkupElement) -> Result<(), MarkupError> {
        self.check_mutable()?;
        let index = index.min(self.elements.len());
        if index < self.elements.len() {
            for position in self.tag_index.values_mut() {
                if *position >= index {
                    *position += 1;
                }
            }
        }
        if let Some(tag) = element.as_tag() {
            self.tag_index.insert(tag.id(), index);
        }
        self.elements.insert(index, element);
        Ok(())
    }

    #[must_use]
    pub fn position_of(&self, id: TagId) -> Option<usize> {
        self.tag_index.get(&id).copied()
    }

    #[must_use]
    pub fn contains_tag(&self, id: TagId) -> bool {
        self.position_of(id).is_some()
    }

    #[must_use]
    pub fn tag(&self, id: TagId) -> Option<&ComponentTag> {
        self.position_of(id)
            .and_then(|index| self.elements[index].as_tag())
    }

    /// Mutable access to an already accepted tag. Filters use this to
    /// annotate tags they have passed on, e.g. to flag a missing close tag.
    pub fn tag_mut(&mut self, id: TagId) -> Result<Option<&mut ComponentTag>, MarkupError> {
        self.check_mutable()?;
        let Some(index) = self.position_of(id) else {
            return Ok(None);
        };
        Ok(self.elements[index].as_tag_mut())
    }

    /// Index of the first tag carrying `role`, at or after `from`.
    #[must_use]
    pub fn find_role(&self, role: SpecialRole, from: usize) -> Option<usize> {
        self.elements
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, element)| element.as_tag().is_some_and(|tag| tag.has_role(role)))
            .map(|(index, _)| index)
    }

    /// Index of the close tag matching the open tag at `open_index`.
    #[must_use]
    pub fn find_close(&self, open_index: usize) -> Option<usize> {
        let open = self.elements.get(open_index)?.as_tag()?;
        self.elements
            .iter()
            .enumerate()
            .skip(open_index + 1)
            .find(|(_, element)| element.as_tag().is_some_and(|tag| tag.closes(open)))
            .map(|(index, _)| index)
    }

    pub fn freeze(&mut self) {
        if self.immutable {
            return;
        }
        for element in &mut self.elements {
            element.freeze();
        }
        self.immutable = true;
    }

    #[must_use]
    pub fn is_immutable(&self) -> bool {
        self.immutable
    }
}

impl<'a> IntoIterator for &'a Markup {
    type Item = &'a MarkupElement;
    type IntoIter = slice::Iter<'a, MarkupElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for Markup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in &self.elements {
            element.fmt(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use trellis_source::Span;

    use super::*;
    use crate::element::RawMarkup;
    use crate::tag::TagKind;

    fn markup() -> Markup {
        Markup::new(MarkupResource::new("wicket"))
    }

    fn tag(kind: TagKind, name: &str) -> ComponentTag {
        ComponentTag::new(kind, name, None, Span::default())
    }

    #[test]
    fn insert_clamps_index() {
        let mut markup = markup();
        markup.push(RawMarkup::new("b").into()).unwrap();
        markup.insert(0, RawMarkup::new("a").into()).unwrap();
        markup.insert(99, RawMarkup::new("c").into()).unwrap();
        assert_eq!(markup.to_string(), "abc");
    }

    #[test]
    fn tag_lookup_by_id() {
        let mut markup = markup();
        let open = tag(TagKind::Open, "div");
        let id = open.id();
        markup.push(open.into()).unwrap();

        assert_eq!(markup.position_of(id), Some(0));
        markup.tag_mut(id).unwrap().unwrap().set_no_close_tag(true).unwrap();
        assert!(markup.tag(id).unwrap().has_no_close_tag());
    }

    #[test]
    fn tag_positions_follow_inserts() {
        let mut markup = markup();
        let open = tag(TagKind::Open, "div");
        let close = open.synthesize_close(Span::default());
        let (open_id, close_id) = (open.id(), close.id());
        markup.push(open.into()).unwrap();
        markup.push(close.into()).unwrap();

        markup.insert(0, RawMarkup::new("a").into()).unwrap();
        let head = tag(TagKind::OpenClose, "head");
        let head_id = head.id();
        markup.insert(2, head.into()).unwrap();

        assert_eq!(markup.position_of(open_id), Some(1));
        assert_eq!(markup.position_of(head_id), Some(2));
        assert_eq!(markup.position_of(close_id), Some(3));
        assert!(markup.contains_tag(close_id));
        assert_eq!(markup.tag(close_id).unwrap().open_tag(), Some(open_id));
        assert!(!markup.contains_tag(tag(TagKind::Open, "p").id()));
    }

    #[test]
    fn find_close_uses_back_reference() {
        let mut markup = markup();
        let open = tag(TagKind::Open, "span");
        let inner = tag(TagKind::Open, "span");
        let inner_close = inner.synthesize_close(Span::default());
        let close = open.synthesize_close(Span::default());
        for t in [open, inner, inner_close, close] {
            markup.push(t.into()).unwrap();
        }
        assert_eq!(markup.find_close(0), Some(3));
        assert_eq!(markup.find_close(1), Some(2));
    }

    mod immutability {
        use super::*;

        #[test]
        fn frozen_markup_rejects_mutation() {
            let mut markup = markup();
            let open = tag(TagKind::Open, "p");
            let id = open.id();
            markup.push(open.into()).unwrap();
            markup.freeze();

            assert!(matches!(
                markup.push(RawMarkup::new("x").into()),
                Err(MarkupError::Immutable)
            ));
            assert!(matches!(
                markup.insert(0, RawMarkup::new("x").into()),
                Err(MarkupError::Immutable)
            ));
            assert!(matches!(markup.tag_mut(id), Err(MarkupError::Immutable)));
            assert!(matches!(markup.resource_mut(), Err(MarkupError::Immutable)));
            assert_eq!(markup.len(), 1);
        }

        #[test]
        fn freezing_freezes_tags() {
            let mut markup = markup();
            markup.push(tag(TagKind::Open, "p").into()).unwrap();
            markup.freeze();

            let mut copy = markup.get(0).unwrap().as_tag().unwrap().clone();
            assert!(copy.is_immutable());
            assert!(matches!(
                copy.set_attribute("k", "v"),
                Err(MarkupError::Immutable)
            ));
        }
    }
}

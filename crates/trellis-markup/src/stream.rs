use std::sync::Arc;

use crate::element::MarkupElement;
use crate::error::MarkupError;
use crate::markup::Markup;
use crate::tag::ComponentTag;
use crate::tag::SpecialRole;

/// A read cursor over a frozen document.
///
/// Cursors are cheap to clone; every clone walks the same shared elements.
#[derive(Debug, Clone)]
pub struct MarkupStream {
    markup: Arc<Markup>,
    index: usize,
}

impl MarkupStream {
    #[must_use]
    pub fn new(markup: Arc<Markup>) -> Self {
        Self { markup, index: 0 }
    }

    #[must_use]
    pub fn markup(&self) -> &Arc<Markup> {
        &self.markup
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.index
    }

    /// Jump to `index`. One past the last element is allowed and means the
    /// cursor is exhausted.
    pub fn set_current_index(&mut self, index: usize) -> Result<(), MarkupError> {
        if index > self.markup.len() {
            return Err(self.error(format!(
                "Index {index} is beyond the end of the markup ({} elements)",
                self.markup.len()
            )));
        }
        self.index = index;
        Ok(())
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.index < self.markup.len()
    }

    #[must_use]
    pub fn get(&self) -> Option<&MarkupElement> {
        self.markup.get(self.index)
    }

    #[must_use]
    pub fn tag(&self) -> Option<&ComponentTag> {
        self.get().and_then(MarkupElement::as_tag)
    }

    /// The current element, which must be a tag.
    pub fn require_tag(&self) -> Result<&ComponentTag, MarkupError> {
        match self.get() {
            Some(MarkupElement::Tag(tag)) => Ok(tag),
            Some(MarkupElement::Raw(_)) => Err(self.error("Expected a tag, found raw markup")),
            None => Err(self.error("Expected a tag, reached the end of the markup")),
        }
    }

    /// Move one element forward, returning the new current element.
    pub fn advance(&mut self) -> Option<&MarkupElement> {
        if self.index < self.markup.len() {
            self.index += 1;
        }
        self.get()
    }

    /// Move to the next tag after the current element.
    pub fn next_tag(&mut self) -> Option<&ComponentTag> {
        self.seek_forward(|_| true)
    }

    /// Move to the next open or open-close tag after the current element.
    pub fn next_open_tag(&mut self) -> Option<&ComponentTag> {
        self.seek_forward(|tag| !tag.is_close())
    }

    fn seek_forward(&mut self, accept: impl Fn(&ComponentTag) -> bool) -> Option<&ComponentTag> {
        let found = self
            .markup
            .iter()
            .enumerate()
            .skip(self.index + 1)
            .find(|(_, element)| element.as_tag().is_some_and(&accept))
            .map(|(index, _)| index);
        self.index = found.unwrap_or(self.markup.len());
        self.tag()
    }

    /// The nearest tag before the current element, without moving.
    #[must_use]
    pub fn previous_tag(&self) -> Option<&ComponentTag> {
        self.markup.elements()[..self.index.min(self.markup.len())]
            .iter()
            .rev()
            .find_map(MarkupElement::as_tag)
    }

    /// At an open tag, optionally one bound to `binding_id`.
    #[must_use]
    pub fn at_open_tag(&self, binding_id: Option<&str>) -> bool {
        self.tag()
            .is_some_and(|tag| tag.is_open() && matches_binding(tag, binding_id))
    }

    /// At an open-close tag, optionally one bound to `binding_id`.
    #[must_use]
    pub fn at_open_close_tag(&self, binding_id: Option<&str>) -> bool {
        self.tag()
            .is_some_and(|tag| tag.is_open_close() && matches_binding(tag, binding_id))
    }

    /// At a close tag, optionally one whose open tag is bound to
    /// `binding_id`.
    #[must_use]
    pub fn at_close_tag(&self, binding_id: Option<&str>) -> bool {
        let Some(tag) = self.tag().filter(|tag| tag.is_close()) else {
            return false;
        };
        let Some(binding_id) = binding_id else {
            return true;
        };
        tag.open_tag()
            .and_then(|open| self.markup.tag(open))
            .is_some_and(|open| open.binding_id() == Some(binding_id))
    }

    /// Move past the component at the cursor: past an open-close tag, or past
    /// the close tag matching the open tag.
    pub fn skip_component(&mut self) -> Result<(), MarkupError> {
        let tag = self.require_tag()?;
        if tag.is_close() {
            return Err(self.error(format!("Cannot skip from close tag '</{}>'", tag.qualified_name())));
        }
        if tag.is_open_close() || tag.has_no_close_tag() {
            self.index += 1;
            return Ok(());
        }

        let id = tag.id();
        let name = tag.qualified_name();
        let close = self
            .markup
            .iter()
            .enumerate()
            .skip(self.index + 1)
            .find(|(_, element)| {
                element
                    .as_tag()
                    .is_some_and(|candidate| candidate.is_close() && candidate.open_tag() == Some(id))
            })
            .map(|(index, _)| index);
        match close {
            Some(close) => {
                self.index = close + 1;
                Ok(())
            }
            None => Err(self.error(format!("Tag '{name}' has no matching close tag"))),
        }
    }

    /// Move past consecutive raw markup.
    pub fn skip_raw_markup(&mut self) {
        while self.get().is_some_and(MarkupElement::is_raw) {
            self.index += 1;
        }
    }

    /// Move to the next tag with `role`, starting at the current element.
    /// Returns whether one was found; if not, the cursor is exhausted.
    pub fn skip_until(&mut self, role: SpecialRole) -> bool {
        match self.markup.find_role(role, self.index) {
            Some(index) => {
                self.index = index;
                true
            }
            None => {
                self.index = self.markup.len();
                false
            }
        }
    }

    /// Move to the next tag named `name` (qualified, case-insensitive),
    /// starting at the current element.
    pub fn skip_until_tag(&mut self, name: &str) -> bool {
        let found = self
            .markup
            .iter()
            .enumerate()
            .skip(self.index)
            .find(|(_, element)| {
                element
                    .as_tag()
                    .is_some_and(|tag| tag.qualified_name().eq_ignore_ascii_case(name))
            })
            .map(|(index, _)| index);
        self.index = found.unwrap_or(self.markup.len());
        found.is_some()
    }

    /// Attribute of the current tag; `with_namespace` looks up
    /// `<ns>:<name>` in the document's control namespace.
    #[must_use]
    pub fn tag_attribute(&self, name: &str, with_namespace: bool) -> Option<&str> {
        let tag = self.tag()?;
        if with_namespace {
            tag.attribute(&format!("{}:{name}", self.markup.namespace()))
        } else {
            tag.attribute(name)
        }
    }

    /// Compare the rest of both cursors element by element.
    #[must_use]
    pub fn equal_to(&self, other: &MarkupStream) -> bool {
        let ours = self.markup.elements().get(self.index..).unwrap_or_default();
        let theirs = other.markup.elements().get(other.index..).unwrap_or_default();
        ours.len() == theirs.len()
            && ours
                .iter()
                .zip(theirs)
                .all(|(a, b)| a.structurally_equal(b))
    }

    fn error(&self, message: impl Into<String>) -> MarkupError {
        MarkupError::CursorState {
            index: self.index,
            message: message.into(),
        }
    }
}

fn matches_binding(tag: &ComponentTag, binding_id: Option<&str>) -> bool {
    binding_id.is_none_or(|id| tag.binding_id() == Some(id))
}

use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use indexmap::IndexMap;
use trellis_source::Span;

use crate::error::MarkupError;

static NEXT_TAG_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique tag identity.
///
/// Close tags refer to their open tag by id rather than by reference, so the
/// link survives copying a tag into a merged document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagId(u64);

impl TagId {
    fn next() -> Self {
        Self(NEXT_TAG_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    Open,
    Close,
    OpenClose,
}

/// Roles of tags in the control namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialRole {
    Panel,
    Border,
    Body,
    Extend,
    Child,
    Head,
    Message,
    Remove,
    Link,
    Enclosure,
    Fragment,
    Container,
    Label,
    HeaderItems,
}

impl SpecialRole {
    const ALL: [SpecialRole; 14] = [
        Self::Panel,
        Self::Border,
        Self::Body,
        Self::Extend,
        Self::Child,
        Self::Head,
        Self::Message,
        Self::Remove,
        Self::Link,
        Self::Enclosure,
        Self::Fragment,
        Self::Container,
        Self::Label,
        Self::HeaderItems,
    ];

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|role| role.name().eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Panel => "panel",
            Self::Border => "border",
            Self::Body => "body",
            Self::Extend => "extend",
            Self::Child => "child",
            Self::Head => "head",
            Self::Message => "message",
            Self::Remove => "remove",
            Self::Link => "link",
            Self::Enclosure => "enclosure",
            Self::Fragment => "fragment",
            Self::Container => "container",
            Self::Label => "label",
            Self::HeaderItems => "header-items",
        }
    }

    /// Roles that open the region of markup a component owns.
    #[must_use]
    pub fn is_major(self) -> bool {
        matches!(self, Self::Panel | Self::Border | Self::Extend)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
struct TagFlags {
    no_close_tag: bool,
    modified: bool,
    ignore: bool,
    auto_component: bool,
    synthetic: bool,
}

/// A tag as produced by the tokenizer and annotated by the filter chain.
#[derive(Debug, Clone)]
pub struct ComponentTag {
    id: TagId,
    kind: TagKind,
    name: String,
    namespace: Option<String>,
    attributes: IndexMap<String, String>,
    binding_id: Option<String>,
    open_tag: Option<TagId>,
    role: Option<SpecialRole>,
    span: Span,
    flags: TagFlags,
    immutable: bool,
}

impl ComponentTag {
    #[must_use]
    pub fn new(kind: TagKind, name: impl Into<String>, namespace: Option<String>, span: Span) -> Self {
        Self {
            id: TagId::next(),
            kind,
            name: name.into(),
            namespace,
            attributes: IndexMap::new(),
            binding_id: None,
            open_tag: None,
            role: None,
            span,
            flags: TagFlags::default(),
            immutable: false,
        }
    }

    /// A tag that has no counterpart in the source text.
    #[must_use]
    pub fn synthetic(kind: TagKind, name: impl Into<String>, namespace: Option<String>, span: Span) -> Self {
        let mut tag = Self::new(kind, name, namespace, span);
        tag.flags.synthetic = true;
        tag
    }

    #[must_use]
    pub(crate) fn with_attributes(mut self, attributes: IndexMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    /// A synthetic close tag for this open tag, placed at `span`.
    #[must_use]
    pub fn synthesize_close(&self, span: Span) -> Self {
        let mut close = Self::synthetic(TagKind::Close, self.name.clone(), self.namespace.clone(), span);
        close.role = self.role;
        close.open_tag = Some(self.id);
        close.flags.modified = self.flags.modified;
        close
    }

    #[must_use]
    pub fn id(&self) -> TagId {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> TagKind {
        self.kind
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.kind == TagKind::Open
    }

    #[must_use]
    pub fn is_close(&self) -> bool {
        self.kind == TagKind::Close
    }

    #[must_use]
    pub fn is_open_close(&self) -> bool {
        self.kind == TagKind::OpenClose
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}:{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Case-insensitive match on the local name of a tag outside any
    /// namespace, e.g. `tag.is_html("head")`.
    #[must_use]
    pub fn is_html(&self, name: &str) -> bool {
        self.namespace.is_none() && self.name.eq_ignore_ascii_case(name)
    }

    #[must_use]
    pub fn attributes(&self) -> &IndexMap<String, String> {
        &self.attributes
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn binding_id(&self) -> Option<&str> {
        self.binding_id.as_deref()
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.binding_id.is_some()
    }

    /// The open tag this tag closes; open-close tags refer to themselves.
    #[must_use]
    pub fn open_tag(&self) -> Option<TagId> {
        self.open_tag
    }

    #[must_use]
    pub fn closes(&self, open: &ComponentTag) -> bool {
        self.is_close() && self.open_tag == Some(open.id)
    }

    #[must_use]
    pub fn role(&self) -> Option<SpecialRole> {
        self.role
    }

    #[must_use]
    pub fn is_special(&self) -> bool {
        self.role.is_some()
    }

    #[must_use]
    pub fn has_role(&self, role: SpecialRole) -> bool {
        self.role == Some(role)
    }

    #[must_use]
    pub fn is_extend(&self) -> bool {
        self.has_role(SpecialRole::Extend)
    }

    #[must_use]
    pub fn is_child(&self) -> bool {
        self.has_role(SpecialRole::Child)
    }

    #[must_use]
    pub fn is_head(&self) -> bool {
        self.has_role(SpecialRole::Head)
    }

    #[must_use]
    pub fn is_fragment(&self) -> bool {
        self.has_role(SpecialRole::Fragment)
    }

    #[must_use]
    pub fn is_enclosure(&self) -> bool {
        self.has_role(SpecialRole::Enclosure)
    }

    #[must_use]
    pub fn is_major(&self) -> bool {
        self.role.is_some_and(SpecialRole::is_major)
    }

    #[must_use]
    pub fn span(&self) -> Span {
        self.span
    }

    #[must_use]
    pub fn has_no_close_tag(&self) -> bool {
        self.flags.no_close_tag
    }

    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.flags.modified
    }

    #[must_use]
    pub fn is_ignored(&self) -> bool {
        self.flags.ignore
    }

    #[must_use]
    pub fn is_auto_component(&self) -> bool {
        self.flags.auto_component
    }

    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.flags.synthetic
    }

    #[must_use]
    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    fn check_mutable(&self) -> Result<(), MarkupError> {
        if self.immutable {
            Err(MarkupError::Immutable)
        } else {
            Ok(())
        }
    }

    pub fn set_attribute(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Option<String>, MarkupError> {
        self.check_mutable()?;
        Ok(self.attributes.insert(key.into(), value.into()))
    }

    pub fn remove_attribute(&mut self, key: &str) -> Result<Option<String>, MarkupError> {
        self.check_mutable()?;
        Ok(self.attributes.shift_remove(key))
    }

    pub fn set_binding_id(&mut self, id: Option<String>) -> Result<(), MarkupError> {
        self.check_mutable()?;
        self.binding_id = id;
        Ok(())
    }

    pub fn set_kind(&mut self, kind: TagKind) -> Result<(), MarkupError> {
        self.check_mutable()?;
        self.kind = kind;
        Ok(())
    }

    pub fn set_open_tag(&mut self, open: TagId) -> Result<(), MarkupError> {
        self.check_mutable()?;
        self.open_tag = Some(open);
        Ok(())
    }

    pub fn set_role(&mut self, role: Option<SpecialRole>) -> Result<(), MarkupError> {
        self.check_mutable()?;
        self.role = role;
        Ok(())
    }

    pub fn set_no_close_tag(&mut self, value: bool) -> Result<(), MarkupError> {
        self.check_mutable()?;
        self.flags.no_close_tag = value;
        Ok(())
    }

    pub fn set_modified(&mut self, value: bool) -> Result<(), MarkupError> {
        self.check_mutable()?;
        self.flags.modified = value;
        Ok(())
    }

    pub fn set_ignore(&mut self, value: bool) -> Result<(), MarkupError> {
        self.check_mutable()?;
        self.flags.ignore = value;
        Ok(())
    }

    pub fn set_auto_component(&mut self, value: bool) -> Result<(), MarkupError> {
        self.check_mutable()?;
        self.flags.auto_component = value;
        Ok(())
    }

    pub(crate) fn freeze(&mut self) {
        self.immutable = true;
    }

    /// A mutable copy of this tag. The copy keeps the tag id so close tags
    /// referring to the original still match it.
    #[must_use]
    pub fn mutable(&self) -> Self {
        let mut copy = self.clone();
        copy.immutable = false;
        copy
    }

    /// Equality of everything that affects rendering; ids, spans and
    /// mutability are ignored.
    #[must_use]
    pub fn structurally_equal(&self, other: &ComponentTag) -> bool {
        self.kind == other.kind
            && self.name == other.name
            && self.namespace == other.namespace
            && self.binding_id == other.binding_id
            && self.role == other.role
            && self.flags.no_close_tag == other.flags.no_close_tag
            && self.attributes == other.attributes
    }
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

impl fmt::Display for ComponentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<")?;
        if self.is_close() {
            f.write_str("/")?;
        }
        f.write_str(&self.qualified_name())?;
        for (key, value) in &self.attributes {
            write!(f, " {key}=\"{}\"", escape_attribute(value))?;
        }
        if self.is_open_close() {
            f.write_str("/")?;
        }
        f.write_str(">")
    }
}

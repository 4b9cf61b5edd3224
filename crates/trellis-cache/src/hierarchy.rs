use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;
use trellis_markup::MarkupError;

pub trait ClassHierarchy: Send + Sync {
    /// The logical superclass of `class`, `None` at the root.
    fn superclass(&self, class: &str) -> Option<String>;
}

/// A hierarchy declared up front, class by class.
#[derive(Debug, Clone, Default)]
pub struct StaticHierarchy {
    parents: FxHashMap<String, String>,
}

impl StaticHierarchy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_parent(mut self, class: impl Into<String>, parent: impl Into<String>) -> Self {
        self.insert(class, parent);
        self
    }

    pub fn insert(&mut self, class: impl Into<String>, parent: impl Into<String>) {
        self.parents.insert(class.into(), parent.into());
    }
}

impl ClassHierarchy for StaticHierarchy {
    fn superclass(&self, class: &str) -> Option<String> {
        self.parents.get(class).cloned()
    }
}

/// `class` followed by its superclasses, root last.
///
/// Fails with [`MarkupError::InheritanceCycle`] when a class shows up twice.
pub fn ancestry(hierarchy: &dyn ClassHierarchy, class: &str) -> Result<Vec<String>, MarkupError> {
    let mut chain = vec![class.to_string()];
    let mut seen = FxHashSet::default();
    seen.insert(class.to_string());

    let mut current = class.to_string();
    while let Some(parent) = hierarchy.superclass(&current) {
        chain.push(parent.clone());
        if !seen.insert(parent.clone()) {
            return Err(MarkupError::InheritanceCycle { chain });
        }
        current = parent;
    }
    Ok(chain)
}

use std::collections::HashMap;
use std::rc::Rc;

use crate::xml::Element;

/// Mapping from `gml:id` values to the elements that carry them.
///
/// Entries are added only once an element is completely parsed, so a
/// lookup for an identifier that appears later in the document reports
/// [`Resolution::Unresolved`] instead of failing.
///
/// Cloning is cheap: clones share storage and the owning iterator copies
/// the map only if it must insert while a handed-out snapshot is alive.
#[derive(Debug, Clone, Default)]
pub struct CrossReferenceIndex {
    entries: Rc<HashMap<String, Rc<Element>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(Rc<Element>),
    Unresolved,
}

impl CrossReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, id: &str, element: Rc<Element>) {
        Rc::make_mut(&mut self.entries).insert(id.to_string(), element);
    }

    pub fn get(&self, id: &str) -> Option<&Rc<Element>> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Resolves an `xlink:href` value. Only same-document references
    /// (`#id` or a bare id) can resolve.
    pub fn resolve(&self, href: &str) -> Resolution {
        let id = match href.split_once('#') {
            Some(("", id)) => id,
            Some(_) => return Resolution::Unresolved,
            None => href,
        };
        match self.entries.get(id) {
            Some(element) => Resolution::Resolved(Rc::clone(element)),
            None => Resolution::Unresolved,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

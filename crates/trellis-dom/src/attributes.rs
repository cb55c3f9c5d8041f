//! Per-element attribute storage with change observers.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use trellis_common::{DomError, DomResult};

use crate::{XMLNS_NAMESPACE, XML_NAMESPACE};

/// Callback invoked with the new value (`None` on removal).
pub type AttributeObserver = Rc<dyn Fn(Option<&str>)>;

/// A single attribute record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub namespace: Option<String>,
    pub prefix: Option<String>,
    pub local_name: String,
    pub value: String,
}

impl Attr {
    /// Unnamespaced attribute.
    pub fn new(local_name: &str, value: &str) -> Self {
        Self {
            namespace: None,
            prefix: None,
            local_name: local_name.to_string(),
            value: value.to_string(),
        }
    }

    /// Qualified name: `prefix:local` or `local`.
    pub fn name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.local_name),
            None => self.local_name.clone(),
        }
    }

    fn matches(&self, namespace: Option<&str>, local_name: &str) -> bool {
        self.namespace.as_deref() == namespace && self.local_name == local_name
    }
}

/// Ordered attribute records, unique by `(namespace, local name)`.
///
/// Observers are keyed by local name and only see unnamespaced attributes.
/// They run after the store's borrows have been released, so an observer may
/// read or write the store.
#[derive(Default)]
pub struct AttributeStore {
    attrs: RefCell<Vec<Attr>>,
    observers: RefCell<HashMap<String, Vec<AttributeObserver>>>,
}

impl fmt::Debug for AttributeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeStore")
            .field("attrs", &self.attrs.borrow())
            .field("observed", &self.observers.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.attrs.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.borrow().is_empty()
    }

    /// Snapshot in insertion order.
    pub fn to_vec(&self) -> Vec<Attr> {
        self.attrs.borrow().clone()
    }

    /// Value for `(namespace, local_name)`.
    pub fn get(&self, namespace: Option<&str>, local_name: &str) -> Option<String> {
        self.attrs
            .borrow()
            .iter()
            .find(|a| a.matches(namespace, local_name))
            .map(|a| a.value.clone())
    }

    /// First record whose qualified name is `name`.
    pub fn get_by_name(&self, name: &str) -> Option<Attr> {
        self.attrs
            .borrow()
            .iter()
            .find(|a| a.name() == name)
            .cloned()
    }

    /// Set a value, appending a new record if needed. Returns the previous
    /// value. Observers are not run; see [`AttributeStore::notify`].
    pub fn set(
        &self,
        namespace: Option<&str>,
        prefix: Option<&str>,
        local_name: &str,
        value: &str,
    ) -> Option<String> {
        let mut attrs = self.attrs.borrow_mut();
        match attrs.iter_mut().find(|a| a.matches(namespace, local_name)) {
            Some(attr) => Some(std::mem::replace(&mut attr.value, value.to_string())),
            None => {
                attrs.push(Attr {
                    namespace: namespace.map(str::to_string),
                    prefix: prefix.map(str::to_string),
                    local_name: local_name.to_string(),
                    value: value.to_string(),
                });
                None
            }
        }
    }

    /// Remove a record, returning it. A missing record is not an error.
    pub fn remove(&self, namespace: Option<&str>, local_name: &str) -> Option<Attr> {
        let mut attrs = self.attrs.borrow_mut();
        let index = attrs.iter().position(|a| a.matches(namespace, local_name))?;
        Some(attrs.remove(index))
    }

    /// Append a record without any checks; used while building parsed trees.
    pub(crate) fn push_raw(&self, attr: Attr) {
        let mut attrs = self.attrs.borrow_mut();
        if !attrs
            .iter()
            .any(|a| a.matches(attr.namespace.as_deref(), &attr.local_name))
        {
            attrs.push(attr);
        }
    }

    /// Register an observer for the unnamespaced attribute `name`.
    pub fn observe(&self, name: &str, observer: AttributeObserver) {
        self.observers
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .push(observer);
    }

    /// Detach every observer of `name`, returning them for [`restore`].
    ///
    /// [`restore`]: AttributeStore::restore
    pub fn unobserve(&self, name: &str) -> Option<Vec<AttributeObserver>> {
        self.observers.borrow_mut().remove(name)
    }

    /// Reattach observers previously returned by [`AttributeStore::unobserve`].
    pub fn restore(&self, name: &str, observers: Option<Vec<AttributeObserver>>) {
        let Some(mut observers) = observers else {
            return;
        };
        let mut table = self.observers.borrow_mut();
        let slot = table.entry(name.to_string()).or_default();
        observers.append(slot);
        *slot = observers;
    }

    /// Number of observers registered for `name`.
    pub fn observer_count(&self, name: &str) -> usize {
        self.observers.borrow().get(name).map_or(0, Vec::len)
    }

    /// Run the observers of `name` with `value`.
    pub fn notify(&self, name: &str, value: Option<&str>) {
        let observers = self.observers.borrow().get(name).cloned();
        for observer in observers.into_iter().flatten() {
            observer(value);
        }
    }

    /// Equal as unordered multisets of `(namespace, local name, value)`.
    pub fn same_content(&self, other: &AttributeStore) -> bool {
        let mine = self.attrs.borrow();
        let theirs = other.attrs.borrow();
        mine.len() == theirs.len()
            && mine.iter().all(|a| {
                theirs.iter().any(|b| {
                    a.namespace == b.namespace && a.local_name == b.local_name && a.value == b.value
                })
            })
    }
}

/// Whether `name` matches the XML `Name` production.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    is_name_start(first) && chars.all(|c| is_name_start(c) || is_name_char(c))
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == ':' || (!c.is_ascii() && !c.is_whitespace())
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_digit() || c == '-' || c == '.'
}

/// Validate a qualified name against a namespace and split it.
///
/// Returns `(prefix, local_name)`.
pub fn validate_and_extract(
    namespace: Option<&str>,
    qualified_name: &str,
) -> DomResult<(Option<String>, String)> {
    if !is_valid_name(qualified_name) {
        return Err(DomError::InvalidCharacter(qualified_name.to_string()));
    }
    let namespace = namespace.filter(|ns| !ns.is_empty());
    let (prefix, local) = match qualified_name.split_once(':') {
        Some((prefix, local)) => {
            if prefix.is_empty() || local.is_empty() || local.contains(':') {
                return Err(DomError::InvalidCharacter(qualified_name.to_string()));
            }
            (Some(prefix), local)
        }
        None => (None, qualified_name),
    };

    let namespace_error = |reason: &str| -> DomResult<(Option<String>, String)> {
        Err(DomError::Namespace(format!("{}: {}", qualified_name, reason)))
    };
    if prefix.is_some() && namespace.is_none() {
        return namespace_error("prefix without namespace");
    }
    if prefix == Some("xml") && namespace != Some(XML_NAMESPACE) {
        return namespace_error("xml prefix outside the XML namespace");
    }
    let is_xmlns = qualified_name == "xmlns" || prefix == Some("xmlns");
    if is_xmlns != (namespace == Some(XMLNS_NAMESPACE)) {
        return namespace_error("xmlns must be used with the XMLNS namespace");
    }
    Ok((prefix.map(str::to_string), local.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_set_get_remove() {
        let store = AttributeStore::new();
        assert_eq!(store.set(None, None, "id", "a"), None);
        assert_eq!(store.set(None, None, "id", "b"), Some("a".to_string()));
        assert_eq!(store.get(None, "id").as_deref(), Some("b"));
        assert!(store.remove(None, "missing").is_none());
        assert_eq!(store.remove(None, "id").map(|a| a.value), Some("b".to_string()));
        assert!(store.get(None, "id").is_none());
    }

    #[test]
    fn test_namespaced_keys_are_distinct() {
        let store = AttributeStore::new();
        store.set(None, None, "href", "plain");
        store.set(Some("http://www.w3.org/1999/xlink"), Some("xlink"), "href", "linked");
        assert_eq!(store.len(), 2);
        assert_eq!(store.get_by_name("xlink:href").map(|a| a.value), Some("linked".to_string()));
        assert_eq!(store.get(None, "href").as_deref(), Some("plain"));
    }

    #[test]
    fn test_insertion_order_preserved() {
        let store = AttributeStore::new();
        for name in ["b", "a", "c"] {
            store.set(None, None, name, "");
        }
        store.set(None, None, "a", "x");
        let names: Vec<_> = store.to_vec().into_iter().map(|a| a.local_name).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_unobserve_and_restore() {
        let store = AttributeStore::new();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        store.observe("class", Rc::new(move |_| counter.set(counter.get() + 1)));

        store.notify("class", Some("a"));
        let saved = store.unobserve("class");
        store.notify("class", Some("b"));
        store.restore("class", saved);
        store.notify("class", None);

        assert_eq!(calls.get(), 2);
        assert_eq!(store.observer_count("class"), 1);
    }

    #[test]
    fn test_same_content_ignores_order() {
        let a = AttributeStore::new();
        a.set(None, None, "x", "1");
        a.set(None, None, "y", "2");
        let b = AttributeStore::new();
        b.set(None, None, "y", "2");
        b.set(None, None, "x", "1");
        assert!(a.same_content(&b));
        b.set(None, None, "x", "3");
        assert!(!a.same_content(&b));
    }

    #[test]
    fn test_name_validation() {
        assert!(is_valid_name("data-x"));
        assert!(is_valid_name("xlink:href"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("1abc"));
        assert!(!is_valid_name("a b"));
        assert!(!is_valid_name("a\"b"));
    }

    #[test]
    fn test_validate_and_extract() {
        assert_eq!(
            validate_and_extract(Some(XML_NAMESPACE), "xml:lang"),
            Ok((Some("xml".to_string()), "lang".to_string()))
        );
        assert!(matches!(
            validate_and_extract(None, "x:y"),
            Err(DomError::Namespace(_))
        ));
        assert!(matches!(
            validate_and_extract(Some("urn:x"), "xmlns"),
            Err(DomError::Namespace(_))
        ));
        assert!(matches!(
            validate_and_extract(Some("urn:x"), "a:"),
            Err(DomError::InvalidCharacter(_))
        ));
    }
}

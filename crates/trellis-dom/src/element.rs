//! Element operations: attributes, bound views, shadow roots, selectors.

use std::rc::{Rc, Weak};

use tracing::{debug, trace};
use trellis_common::{Bindable, DomError, DomResult};
use trellis_css::{CssParserOptions, CssStyleDeclaration, StyleOptions};

use crate::attributes::{is_valid_name, validate_and_extract, Attr};
use crate::config::SelectorMatcher;
use crate::mutation::MutationRecord;
use crate::node::{Node, NodeData, ShadowRootMode};
use crate::selector::SimpleSelectorMatcher;
use crate::token_list::TokenList;

/// Elements that refuse `attach_shadow`.
const NO_SHADOW_ROOT: &[&str] = &[
    "button", "details", "input", "keygen", "marquee", "meter", "progress", "select", "textarea",
];

impl Node {
    // ---- attributes --------------------------------------------------------

    fn normalize_name(&self, name: &str) -> String {
        match self.as_element() {
            Some(data) if data.is_html() => name.to_ascii_lowercase(),
            _ => name.to_string(),
        }
    }

    /// Value of the attribute with qualified name `name`.
    pub fn get_attribute(&self, name: &str) -> Option<String> {
        let data = self.as_element()?;
        data.attributes
            .get_by_name(&self.normalize_name(name))
            .map(|attr| attr.value)
    }

    pub fn get_attribute_ns(&self, namespace: Option<&str>, local_name: &str) -> Option<String> {
        let namespace = namespace.filter(|ns| !ns.is_empty());
        self.as_element()?.attributes.get(namespace, local_name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.get_attribute(name).is_some()
    }

    pub fn has_attribute_ns(&self, namespace: Option<&str>, local_name: &str) -> bool {
        self.get_attribute_ns(namespace, local_name).is_some()
    }

    /// All attributes in insertion order.
    pub fn attributes(&self) -> Vec<Attr> {
        self.as_element()
            .map(|data| data.attributes.to_vec())
            .unwrap_or_default()
    }

    pub fn attribute_names(&self) -> Vec<String> {
        self.attributes().iter().map(Attr::name).collect()
    }

    /// Set an attribute by qualified name. HTML element names are
    /// lower-cased.
    pub fn set_attribute(&self, name: &str, value: &str) -> DomResult<()> {
        let data = self.element_data()?;
        if !is_valid_name(name) {
            return Err(DomError::InvalidCharacter(name.to_string()));
        }
        let name = self.normalize_name(name);
        match data.attributes.get_by_name(&name) {
            Some(attr) => self.change_attribute(
                attr.namespace.as_deref(),
                attr.prefix.as_deref(),
                &attr.local_name,
                Some(value),
            ),
            None => self.change_attribute(None, None, &name, Some(value)),
        }
        Ok(())
    }

    /// Set a namespaced attribute.
    pub fn set_attribute_ns(
        &self,
        namespace: Option<&str>,
        qualified_name: &str,
        value: &str,
    ) -> DomResult<()> {
        self.element_data()?;
        let namespace = namespace.filter(|ns| !ns.is_empty());
        let (prefix, local_name) = validate_and_extract(namespace, qualified_name)?;
        self.change_attribute(namespace, prefix.as_deref(), &local_name, Some(value));
        Ok(())
    }

    /// Remove an attribute by qualified name. Missing attributes are ignored.
    pub fn remove_attribute(&self, name: &str) {
        let Some(data) = self.as_element() else {
            return;
        };
        if let Some(attr) = data.attributes.get_by_name(&self.normalize_name(name)) {
            self.change_attribute(attr.namespace.as_deref(), None, &attr.local_name, None);
        }
    }

    pub fn remove_attribute_ns(&self, namespace: Option<&str>, local_name: &str) {
        let namespace = namespace.filter(|ns| !ns.is_empty());
        if self.has_attribute_ns(namespace, local_name) {
            self.change_attribute(namespace, None, local_name, None);
        }
    }

    /// Toggle a boolean attribute. Returns whether it is present afterwards.
    pub fn toggle_attribute(&self, name: &str, force: Option<bool>) -> DomResult<bool> {
        self.element_data()?;
        if !is_valid_name(name) {
            return Err(DomError::InvalidCharacter(name.to_string()));
        }
        let present = self.has_attribute(name);
        match (present, force) {
            (true, Some(true)) => Ok(true),
            (false, Some(false)) => Ok(false),
            (true, _) => {
                self.remove_attribute(name);
                Ok(false)
            }
            (false, _) => {
                self.set_attribute(name, "")?;
                Ok(true)
            }
        }
    }

    /// Write or remove an attribute, queue a record if the value changed
    /// and run the observers of unnamespaced attributes.
    fn change_attribute(
        &self,
        namespace: Option<&str>,
        prefix: Option<&str>,
        local_name: &str,
        value: Option<&str>,
    ) {
        let Some(data) = self.as_element() else {
            return;
        };
        let (changed, old_value) = match value {
            Some(value) => {
                let old = data.attributes.set(namespace, prefix, local_name, value);
                (old.as_deref() != Some(value), old)
            }
            None => match data.attributes.remove(namespace, local_name) {
                Some(attr) => (true, Some(attr.value)),
                None => return,
            },
        };
        trace!(
            element = self.id().raw(),
            name = local_name,
            removed = value.is_none(),
            "Attribute changed"
        );
        if changed {
            if let Some(doc) = self.owner_state() {
                doc.queue_mutation(MutationRecord::Attributes {
                    target: self.id(),
                    name: local_name.to_string(),
                    namespace: namespace.map(str::to_string),
                    old_value,
                });
            }
        }
        if namespace.is_none() {
            data.attributes.notify(local_name, value);
        }
    }

    /// Write an attribute on behalf of one of its own observers without
    /// re-entering them.
    pub(crate) fn set_own_attribute(&self, name: &str, value: Option<&str>) {
        let Some(data) = self.as_element() else {
            return;
        };
        let saved = data.attributes.unobserve(name);
        self.change_attribute(None, None, name, value);
        data.attributes.restore(name, saved);
    }

    /// Observe the unnamespaced attribute `name`.
    pub fn observe_attribute(&self, name: &str, observer: Rc<dyn Fn(Option<&str>)>) {
        if let Some(data) = self.as_element() {
            data.attributes.observe(name, observer);
        }
    }

    // ---- bound views -------------------------------------------------------

    /// Keep `view` and attribute `name` in sync in both directions.
    fn bind_view(self: &Rc<Self>, name: &'static str, view: Rc<dyn Bindable>) {
        let weak_view: Weak<dyn Bindable> = Rc::downgrade(&view);
        self.observe_attribute(
            name,
            Rc::new(move |value: Option<&str>| {
                if let Some(view) = weak_view.upgrade() {
                    view.update(value);
                }
            }),
        );
        let weak_node = Rc::downgrade(self);
        view.on_change(Rc::new(move |text: &str| {
            if let Some(node) = weak_node.upgrade() {
                node.set_own_attribute(name, Some(text));
            }
        }));
    }

    pub fn id_attribute(&self) -> String {
        self.get_attribute("id").unwrap_or_default()
    }

    pub fn set_id_attribute(&self, id: &str) -> DomResult<()> {
        self.set_attribute("id", id)
    }

    pub fn class_name(&self) -> String {
        self.get_attribute("class").unwrap_or_default()
    }

    pub fn set_class_name(&self, value: &str) -> DomResult<()> {
        self.set_attribute("class", value)
    }

    /// Live token list bound to the `class` attribute.
    pub fn class_list(self: &Rc<Self>) -> Option<Rc<TokenList>> {
        let data = self.as_element()?;
        if let Some(list) = data.class_list.borrow().clone() {
            return Some(list);
        }
        let list = Rc::new(TokenList::new(self.get_attribute("class").as_deref()));
        self.bind_view("class", list.clone());
        *data.class_list.borrow_mut() = Some(list.clone());
        Some(list)
    }

    /// Live declaration block bound to the `style` attribute.
    pub fn style(self: &Rc<Self>) -> Option<Rc<CssStyleDeclaration>> {
        let data = self.as_element()?;
        if let Some(style) = data.style.borrow().clone() {
            return Some(style);
        }
        let text = self.get_attribute("style").unwrap_or_default();
        let engine = self
            .owner_state()
            .and_then(|doc| doc.config().style_engine("text/css"));
        let style = match engine {
            Some(engine) => engine.parse_inline(&text, &StyleOptions::new().with_element(self.id())),
            None => Rc::new(CssStyleDeclaration::parse(&text, CssParserOptions::default())),
        };
        self.bind_view("style", style.clone());
        *data.style.borrow_mut() = Some(style.clone());
        Some(style)
    }

    // ---- shadow roots ------------------------------------------------------

    /// Attach a shadow root to this element.
    pub fn attach_shadow(self: &Rc<Self>, mode: ShadowRootMode) -> DomResult<Rc<Node>> {
        let data = self.element_data()?;
        if !data.is_html() || NO_SHADOW_ROOT.contains(&data.local_name()) {
            return Err(DomError::not_supported(format!(
                "<{}> cannot host a shadow root",
                data.local_name()
            )));
        }
        if data.shadow_root.borrow().is_some() {
            return Err(DomError::invalid_state("element already has a shadow root"));
        }
        let root = Node::new(
            &self.owner_weak(),
            NodeData::ShadowRoot {
                host: Rc::downgrade(self),
                mode,
            },
        );
        *data.shadow_root.borrow_mut() = Some(root.clone());
        debug!(host = self.id().raw(), ?mode, "Attached shadow root");
        Ok(root)
    }

    /// The attached shadow root, regardless of mode.
    pub fn shadow_root(&self) -> Option<Rc<Node>> {
        self.as_element()?.shadow_root.borrow().clone()
    }

    /// Host element of a shadow root.
    pub fn host(&self) -> Option<Rc<Node>> {
        match self.data() {
            NodeData::ShadowRoot { host, .. } => host.upgrade(),
            _ => None,
        }
    }

    // ---- selectors ---------------------------------------------------------

    fn selector_matcher(&self) -> Rc<dyn SelectorMatcher> {
        match self.owner_state() {
            Some(doc) => doc.config().selector_matcher(),
            None => Rc::new(SimpleSelectorMatcher),
        }
    }

    fn selector_error(selector: &str) -> DomError {
        DomError::syntax(format!("'{}' is not a valid selector", selector))
    }

    /// Whether this element matches `selector`.
    pub fn matches(self: &Rc<Self>, selector: &str) -> DomResult<bool> {
        self.element_data()?;
        self.selector_matcher()
            .matches(self, selector)
            .ok_or_else(|| Self::selector_error(selector))
    }

    /// Nearest inclusive ancestor element matching `selector`.
    pub fn closest(self: &Rc<Self>, selector: &str) -> DomResult<Option<Rc<Node>>> {
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if node.is_element() && node.matches(selector)? {
                return Ok(Some(node));
            }
            current = node.parent_element();
        }
        Ok(None)
    }

    /// First descendant element matching `selector`.
    pub fn query_selector(&self, selector: &str) -> DomResult<Option<Rc<Node>>> {
        Ok(self.query_selector_all(selector)?.into_iter().next())
    }

    /// Descendant elements matching `selector` in tree order.
    pub fn query_selector_all(&self, selector: &str) -> DomResult<Vec<Rc<Node>>> {
        let matcher = self.selector_matcher();
        let mut found = Vec::new();
        for element in self.descendant_elements() {
            match matcher.matches(&element, selector) {
                Some(true) => found.push(element),
                Some(false) => {}
                None => return Err(Self::selector_error(selector)),
            }
        }
        Ok(found)
    }

    /// Descendant elements by qualified name; `*` matches all.
    pub fn get_elements_by_tag_name(&self, name: &str) -> Vec<Rc<Node>> {
        let lowered = name.to_ascii_lowercase();
        self.descendant_elements()
            .into_iter()
            .filter(|element| {
                let Some(data) = element.as_element() else {
                    return false;
                };
                if name == "*" {
                    return true;
                }
                if data.is_html() {
                    data.qualified_name() == lowered
                } else {
                    data.qualified_name() == name
                }
            })
            .collect()
    }

    /// Descendant elements carrying every class in `names`.
    pub fn get_elements_by_class_name(&self, names: &str) -> Vec<Rc<Node>> {
        let wanted: Vec<&str> = names.split_ascii_whitespace().collect();
        if wanted.is_empty() {
            return Vec::new();
        }
        self.descendant_elements()
            .into_iter()
            .filter(|element| {
                let classes = element.class_name();
                let have: Vec<&str> = classes.split_ascii_whitespace().collect();
                wanted.iter().all(|c| have.contains(c))
            })
            .collect()
    }

    // ---- focus -------------------------------------------------------------

    /// Make this element the document's focused element.
    pub fn focus(self: &Rc<Self>) {
        if !self.is_element() || !self.is_connected() {
            return;
        }
        if let Some(doc) = self.owner_state() {
            doc.set_focus(Some(self.clone()));
        }
    }

    /// Drop focus if this element holds it.
    pub fn blur(self: &Rc<Self>) {
        if let Some(doc) = self.owner_state() {
            if self.is_focused() {
                doc.set_focus(None);
            }
        }
    }

    pub fn is_focused(&self) -> bool {
        self.owner_state()
            .and_then(|doc| doc.focused())
            .is_some_and(|f| std::ptr::eq(f.as_ref(), self))
    }
}

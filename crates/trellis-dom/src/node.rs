//! Tree nodes and tree mutation.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;
use trellis_common::{DomError, DomResult, NodeId};
use trellis_css::CssStyleDeclaration;

use crate::attributes::AttributeStore;
use crate::config::ElementBehavior;
use crate::document::{Document, DocumentState};
use crate::mutation::MutationRecord;
use crate::token_list::TokenList;
use crate::HTML_NAMESPACE;

/// Numeric node type, as in `Node.nodeType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Element = 1,
    Text = 3,
    ProcessingInstruction = 7,
    Comment = 8,
    Document = 9,
    DocumentType = 10,
    DocumentFragment = 11,
}

/// Shadow root encapsulation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowRootMode {
    Open,
    Closed,
}

/// Element identity, attributes and cached views.
pub struct ElementData {
    namespace: Option<String>,
    prefix: Option<String>,
    local_name: String,
    pub(crate) attributes: AttributeStore,
    pub(crate) class_list: RefCell<Option<Rc<TokenList>>>,
    pub(crate) style: RefCell<Option<Rc<CssStyleDeclaration>>>,
    pub(crate) behavior: RefCell<Option<Rc<dyn ElementBehavior>>>,
    pub(crate) shadow_root: RefCell<Option<Rc<Node>>>,
}

impl ElementData {
    pub(crate) fn new(namespace: Option<&str>, prefix: Option<&str>, local_name: &str) -> Self {
        Self {
            namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_string),
            prefix: prefix.map(str::to_string),
            local_name: local_name.to_string(),
            attributes: AttributeStore::new(),
            class_list: RefCell::new(None),
            style: RefCell::new(None),
            behavior: RefCell::new(None),
            shadow_root: RefCell::new(None),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// `prefix:local` or `local`.
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.local_name),
            None => self.local_name.clone(),
        }
    }

    pub fn is_html(&self) -> bool {
        self.namespace.as_deref() == Some(HTML_NAMESPACE)
    }

    pub fn attributes(&self) -> &AttributeStore {
        &self.attributes
    }
}

impl fmt::Debug for ElementData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementData")
            .field("namespace", &self.namespace)
            .field("name", &self.qualified_name())
            .field("attributes", &self.attributes)
            .field("behavior", &self.behavior.borrow().is_some())
            .finish()
    }
}

/// Node payload.
#[derive(Debug)]
pub enum NodeData {
    Document,
    Doctype {
        name: String,
        public_id: String,
        system_id: String,
    },
    Element(ElementData),
    Text(RefCell<String>),
    Comment(RefCell<String>),
    ProcessingInstruction {
        target: String,
        data: RefCell<String>,
    },
    Fragment,
    ShadowRoot {
        host: Weak<Node>,
        mode: ShadowRootMode,
    },
}

/// A DOM node.
///
/// Children are owned by their parent; the parent link and the owner
/// document are back-references.
pub struct Node {
    id: NodeId,
    data: NodeData,
    parent: RefCell<Weak<Node>>,
    children: RefCell<Vec<Rc<Node>>>,
    owner: RefCell<Weak<DocumentState>>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.node_name())
            .field("children", &self.children.borrow().len())
            .finish()
    }
}

impl Node {
    pub(crate) fn new(owner: &Weak<DocumentState>, data: NodeData) -> Rc<Self> {
        Rc::new(Self {
            id: NodeId::next(),
            data,
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
            owner: RefCell::new(owner.clone()),
        })
    }

    pub(crate) fn new_text(owner: &Weak<DocumentState>, text: &str) -> Rc<Self> {
        Self::new(owner, NodeData::Text(RefCell::new(text.to_string())))
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn data(&self) -> &NodeData {
        &self.data
    }

    pub fn node_type(&self) -> NodeType {
        match &self.data {
            NodeData::Document => NodeType::Document,
            NodeData::Doctype { .. } => NodeType::DocumentType,
            NodeData::Element(_) => NodeType::Element,
            NodeData::Text(_) => NodeType::Text,
            NodeData::Comment(_) => NodeType::Comment,
            NodeData::ProcessingInstruction { .. } => NodeType::ProcessingInstruction,
            NodeData::Fragment | NodeData::ShadowRoot { .. } => NodeType::DocumentFragment,
        }
    }

    /// `nodeName`: upper-cased qualified name for HTML elements.
    pub fn node_name(&self) -> String {
        match &self.data {
            NodeData::Document => "#document".to_string(),
            NodeData::Doctype { name, .. } => name.clone(),
            NodeData::Element(e) if e.is_html() => e.qualified_name().to_ascii_uppercase(),
            NodeData::Element(e) => e.qualified_name(),
            NodeData::Text(_) => "#text".to_string(),
            NodeData::Comment(_) => "#comment".to_string(),
            NodeData::ProcessingInstruction { target, .. } => target.clone(),
            NodeData::Fragment | NodeData::ShadowRoot { .. } => "#document-fragment".to_string(),
        }
    }

    pub fn as_element(&self) -> Option<&ElementData> {
        match &self.data {
            NodeData::Element(data) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn element_data(&self) -> DomResult<&ElementData> {
        self.as_element()
            .ok_or_else(|| DomError::not_supported(format!("{} is not an element", self.node_name())))
    }

    /// Local name for element nodes.
    pub fn local_name(&self) -> Option<&str> {
        self.as_element().map(ElementData::local_name)
    }

    pub fn is_element(&self) -> bool {
        matches!(self.data, NodeData::Element(_))
    }

    pub fn is_text(&self) -> bool {
        matches!(self.data, NodeData::Text(_))
    }

    /// Whether this is an HTML element named `local_name`.
    pub fn is_html_element(&self, local_name: &str) -> bool {
        self.as_element()
            .is_some_and(|e| e.is_html() && e.local_name() == local_name)
    }

    pub(crate) fn owner_state(&self) -> Option<Rc<DocumentState>> {
        self.owner.borrow().upgrade()
    }

    pub(crate) fn owner_weak(&self) -> Weak<DocumentState> {
        self.owner.borrow().clone()
    }

    /// The document this node belongs to.
    pub fn owner_document(&self) -> Option<Document> {
        self.owner_state().map(Document::from_state)
    }

    fn queue_mutation(&self, record: MutationRecord) {
        if let Some(doc) = self.owner_state() {
            doc.queue_mutation(record);
        }
    }

    // ---- navigation --------------------------------------------------------

    pub fn parent(&self) -> Option<Rc<Node>> {
        self.parent.borrow().upgrade()
    }

    pub fn parent_element(&self) -> Option<Rc<Node>> {
        self.parent().filter(|p| p.is_element())
    }

    /// Child nodes.
    pub fn children(&self) -> Vec<Rc<Node>> {
        self.children.borrow().clone()
    }

    /// Child elements.
    pub fn element_children(&self) -> Vec<Rc<Node>> {
        self.children
            .borrow()
            .iter()
            .filter(|c| c.is_element())
            .cloned()
            .collect()
    }

    pub fn has_children(&self) -> bool {
        !self.children.borrow().is_empty()
    }

    pub fn first_child(&self) -> Option<Rc<Node>> {
        self.children.borrow().first().cloned()
    }

    pub fn last_child(&self) -> Option<Rc<Node>> {
        self.children.borrow().last().cloned()
    }

    /// Position among the parent's children.
    pub fn index(&self) -> Option<usize> {
        let parent = self.parent()?;
        let children = parent.children.borrow();
        children.iter().position(|c| std::ptr::eq(&**c, self))
    }

    fn sibling(&self, offset: isize) -> Option<Rc<Node>> {
        let parent = self.parent()?;
        let index = self.index()?;
        let target = index.checked_add_signed(offset)?;
        let children = parent.children.borrow();
        children.get(target).cloned()
    }

    pub fn previous_sibling(&self) -> Option<Rc<Node>> {
        self.sibling(-1)
    }

    pub fn next_sibling(&self) -> Option<Rc<Node>> {
        self.sibling(1)
    }

    pub fn first_element_child(&self) -> Option<Rc<Node>> {
        self.children
            .borrow()
            .iter()
            .find(|c| c.is_element())
            .cloned()
    }

    pub fn last_element_child(&self) -> Option<Rc<Node>> {
        self.children
            .borrow()
            .iter()
            .rev()
            .find(|c| c.is_element())
            .cloned()
    }

    pub fn child_element_count(&self) -> usize {
        self.children
            .borrow()
            .iter()
            .filter(|c| c.is_element())
            .count()
    }

    pub fn previous_element_sibling(&self) -> Option<Rc<Node>> {
        let parent = self.parent()?;
        let index = self.index()?;
        let children = parent.children.borrow();
        children[..index]
            .iter()
            .rev()
            .find(|c| c.is_element())
            .cloned()
    }

    pub fn next_element_sibling(&self) -> Option<Rc<Node>> {
        let parent = self.parent()?;
        let index = self.index()?;
        let children = parent.children.borrow();
        children[index + 1..]
            .iter()
            .find(|c| c.is_element())
            .cloned()
    }

    /// Topmost ancestor.
    pub fn root(self: &Rc<Self>) -> Rc<Node> {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Whether the node is in its document, directly or through a shadow
    /// host.
    pub fn is_connected(&self) -> bool {
        match self.parent() {
            Some(parent) => parent.is_connected(),
            None => match &self.data {
                NodeData::Document => true,
                NodeData::ShadowRoot { host, .. } => {
                    host.upgrade().is_some_and(|h| h.is_connected())
                }
                _ => false,
            },
        }
    }

    /// Whether `other` is this node or one of its descendants.
    pub fn contains(&self, other: &Node) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        let mut current = other.parent();
        while let Some(node) = current {
            if std::ptr::eq(node.as_ref(), self) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// Descendants in tree order.
    pub fn descendants(&self) -> Vec<Rc<Node>> {
        let mut out = Vec::new();
        self.collect_descendants(&mut out);
        out
    }

    fn collect_descendants(&self, out: &mut Vec<Rc<Node>>) {
        for child in self.children.borrow().iter() {
            out.push(child.clone());
            child.collect_descendants(out);
        }
    }

    /// Descendants in shadow-including tree order. A host's shadow root
    /// and its tree come before the host's children.
    pub fn shadow_including_descendants(&self) -> Vec<Rc<Node>> {
        let mut out = Vec::new();
        self.collect_shadow_including(&mut out);
        out
    }

    fn collect_shadow_including(&self, out: &mut Vec<Rc<Node>>) {
        if let Some(root) = self.shadow_root() {
            out.push(root.clone());
            root.collect_shadow_including(out);
        }
        for child in self.children.borrow().iter() {
            out.push(child.clone());
            child.collect_shadow_including(out);
        }
    }

    /// Descendant elements in tree order.
    pub fn descendant_elements(&self) -> Vec<Rc<Node>> {
        self.descendants()
            .into_iter()
            .filter(|n| n.is_element())
            .collect()
    }

    /// Visit this node and its descendants depth-first.
    pub fn traverse<F>(self: &Rc<Self>, callback: &mut F)
    where
        F: FnMut(&Rc<Node>),
    {
        callback(self);
        for child in self.children() {
            child.traverse(callback);
        }
    }

    // ---- character data ----------------------------------------------------

    /// Text of a text, comment or processing instruction node.
    pub fn character_data(&self) -> Option<String> {
        match &self.data {
            NodeData::Text(text) | NodeData::Comment(text) => Some(text.borrow().clone()),
            NodeData::ProcessingInstruction { data, .. } => Some(data.borrow().clone()),
            _ => None,
        }
    }

    /// Replace the text of a character data node.
    pub fn set_character_data(&self, value: &str) -> DomResult<()> {
        let cell = match &self.data {
            NodeData::Text(text) | NodeData::Comment(text) => text,
            NodeData::ProcessingInstruction { data, .. } => data,
            _ => {
                return Err(DomError::not_supported(format!(
                    "{} has no character data",
                    self.node_name()
                )))
            }
        };
        let old_value = cell.replace(value.to_string());
        self.queue_mutation(MutationRecord::CharacterData {
            target: self.id,
            old_value,
        });
        if self.is_text() {
            if let Some(parent) = self.parent() {
                parent.run_children_changed();
            }
        }
        Ok(())
    }

    /// Concatenated descendant text; own data for character data nodes.
    pub fn text_content(&self) -> String {
        if let Some(data) = self.character_data() {
            return data;
        }
        let mut result = String::new();
        self.collect_text(&mut result);
        result
    }

    fn collect_text(&self, result: &mut String) {
        for child in self.children.borrow().iter() {
            match &child.data {
                NodeData::Text(text) => result.push_str(&text.borrow()),
                NodeData::Element(_) => child.collect_text(result),
                _ => {}
            }
        }
    }

    /// Replace all children with a single text node (none for empty text).
    pub fn set_text_content(self: &Rc<Self>, text: &str) -> DomResult<()> {
        match &self.data {
            NodeData::Text(_) | NodeData::Comment(_) | NodeData::ProcessingInstruction { .. } => {
                self.set_character_data(text)
            }
            NodeData::Element(_) | NodeData::Fragment | NodeData::ShadowRoot { .. } => {
                let node = (!text.is_empty()).then(|| Node::new_text(&self.owner_weak(), text));
                self.replace_all(node);
                Ok(())
            }
            NodeData::Document | NodeData::Doctype { .. } => Ok(()),
        }
    }

    // ---- mutation ----------------------------------------------------------

    fn is_container(&self) -> bool {
        matches!(
            self.data,
            NodeData::Document | NodeData::Element(_) | NodeData::Fragment | NodeData::ShadowRoot { .. }
        )
    }

    fn ensure_pre_insertion_validity(
        &self,
        node: &Rc<Node>,
        child: Option<&Rc<Node>>,
    ) -> DomResult<()> {
        if !self.is_container() {
            return Err(DomError::hierarchy(format!(
                "{} cannot have children",
                self.node_name()
            )));
        }
        if node.contains(self) {
            return Err(DomError::hierarchy("node is an ancestor of the parent"));
        }
        if let Some(child) = child {
            if !child.parent().is_some_and(|p| std::ptr::eq(p.as_ref(), self)) {
                return Err(DomError::NotFound("reference node is not a child".to_string()));
            }
        }
        match (&node.data, &self.data) {
            (NodeData::Document, _) | (NodeData::ShadowRoot { .. }, _) => {
                Err(DomError::hierarchy(format!("cannot insert {}", node.node_name())))
            }
            (NodeData::Text(_), NodeData::Document) => {
                Err(DomError::hierarchy("text cannot be a child of a document"))
            }
            (NodeData::Fragment, NodeData::Document)
                if node.children.borrow().iter().any(|c| c.is_text()) =>
            {
                Err(DomError::hierarchy("text cannot be a child of a document"))
            }
            (NodeData::Doctype { .. }, parent) if !matches!(parent, NodeData::Document) => {
                Err(DomError::hierarchy("doctype must be a child of a document"))
            }
            (_, NodeData::Document) => {
                let incoming = match &node.data {
                    NodeData::Fragment => node.child_element_count(),
                    NodeData::Element(_) => 1,
                    _ => 0,
                };
                let existing = self
                    .children
                    .borrow()
                    .iter()
                    .filter(|c| c.is_element() && !Rc::ptr_eq(c, node))
                    .count();
                if incoming > 0 && existing + incoming > 1 {
                    Err(DomError::hierarchy("a document has at most one element child"))
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }

    /// Append `child`, moving it from any previous parent.
    pub fn append_child(self: &Rc<Self>, child: Rc<Node>) -> DomResult<Rc<Node>> {
        self.insert_before(child, None)
    }

    /// Insert `node` before `child` (at the end for `None`).
    pub fn insert_before(
        self: &Rc<Self>,
        node: Rc<Node>,
        child: Option<&Rc<Node>>,
    ) -> DomResult<Rc<Node>> {
        self.ensure_pre_insertion_validity(&node, child)?;
        let reference = match child {
            Some(c) if Rc::ptr_eq(c, &node) => node.next_sibling(),
            other => other.cloned(),
        };
        self.insert_nodes(node.clone(), reference);
        Ok(node)
    }

    /// Remove `child` from this node.
    pub fn remove_child(self: &Rc<Self>, child: &Rc<Node>) -> DomResult<Rc<Node>> {
        if !child.parent().is_some_and(|p| Rc::ptr_eq(&p, self)) {
            return Err(DomError::NotFound("node is not a child".to_string()));
        }
        self.remove_internal(child);
        Ok(child.clone())
    }

    /// Replace `old` with `node`.
    pub fn replace_child(self: &Rc<Self>, node: Rc<Node>, old: &Rc<Node>) -> DomResult<Rc<Node>> {
        if !old.parent().is_some_and(|p| Rc::ptr_eq(&p, self)) {
            return Err(DomError::NotFound("node is not a child".to_string()));
        }
        if Rc::ptr_eq(&node, old) {
            return Ok(old.clone());
        }
        self.ensure_pre_insertion_validity(&node, None)?;
        let mut reference = old.next_sibling();
        if reference.as_ref().is_some_and(|r| Rc::ptr_eq(r, &node)) {
            reference = node.next_sibling();
        }
        self.remove_internal(old);
        self.insert_nodes(node, reference);
        Ok(old.clone())
    }

    /// Remove this node from its parent.
    pub fn remove(self: &Rc<Self>) {
        if let Some(parent) = self.parent() {
            parent.remove_internal(self);
        }
    }

    /// Insert `nodes` before the first child.
    pub fn prepend(self: &Rc<Self>, nodes: Vec<Rc<Node>>) -> DomResult<()> {
        let fragment = self.fragment_of(nodes)?;
        let first = self.first_child();
        self.insert_before(fragment, first.as_ref()).map(|_| ())
    }

    /// Insert `nodes` after the last child.
    pub fn append(self: &Rc<Self>, nodes: Vec<Rc<Node>>) -> DomResult<()> {
        let fragment = self.fragment_of(nodes)?;
        self.append_child(fragment).map(|_| ())
    }

    /// Insert `nodes` before this node.
    pub fn before(self: &Rc<Self>, nodes: Vec<Rc<Node>>) -> DomResult<()> {
        let Some(parent) = self.parent() else {
            return Ok(());
        };
        let fragment = self.fragment_of(nodes)?;
        parent.insert_before(fragment, Some(self)).map(|_| ())
    }

    /// Insert `nodes` after this node.
    pub fn after(self: &Rc<Self>, nodes: Vec<Rc<Node>>) -> DomResult<()> {
        let Some(parent) = self.parent() else {
            return Ok(());
        };
        let fragment = self.fragment_of(nodes)?;
        let next = self.next_sibling();
        parent.insert_before(fragment, next.as_ref()).map(|_| ())
    }

    fn fragment_of(&self, nodes: Vec<Rc<Node>>) -> DomResult<Rc<Node>> {
        let fragment = Node::new(&self.owner_weak(), NodeData::Fragment);
        for node in nodes {
            fragment.append_child(node)?;
        }
        Ok(fragment)
    }

    /// Remove every child, then insert `node` if given.
    pub(crate) fn replace_all(self: &Rc<Self>, node: Option<Rc<Node>>) {
        for child in self.children() {
            self.remove_internal(&child);
        }
        if let Some(node) = node {
            self.insert_nodes(node, None);
        }
    }

    /// Append without records or hooks, used while building parsed trees.
    pub(crate) fn append_raw(self: &Rc<Self>, child: Rc<Node>) {
        *child.parent.borrow_mut() = Rc::downgrade(self);
        self.children.borrow_mut().push(child);
    }

    fn insert_nodes(self: &Rc<Self>, node: Rc<Node>, reference: Option<Rc<Node>>) {
        let nodes = if matches!(node.data, NodeData::Fragment) {
            let kids = node.children();
            for kid in &kids {
                node.remove_internal(kid);
            }
            kids
        } else {
            if let Some(old_parent) = node.parent() {
                old_parent.remove_internal(&node);
            }
            vec![node]
        };
        if nodes.is_empty() {
            return;
        }

        let previous_sibling = {
            let mut children = self.children.borrow_mut();
            let index = reference
                .as_ref()
                .and_then(|r| children.iter().position(|c| Rc::ptr_eq(c, r)))
                .unwrap_or(children.len());
            let previous = index.checked_sub(1).map(|i| children[i].id);
            for (offset, node) in nodes.iter().enumerate() {
                *node.parent.borrow_mut() = Rc::downgrade(self);
                children.insert(index + offset, node.clone());
            }
            previous
        };

        let owner = self.owner_weak();
        for node in &nodes {
            node.adopt(&owner);
        }

        trace!(parent = self.id.raw(), count = nodes.len(), "Inserted nodes");
        self.queue_mutation(MutationRecord::ChildList {
            target: self.id,
            added: nodes.iter().map(|n| n.id).collect(),
            removed: Vec::new(),
            previous_sibling,
            next_sibling: reference.map(|r| r.id),
        });

        if self.is_connected() {
            for node in &nodes {
                node.run_inserted_hooks();
            }
        }
        self.run_children_changed();
    }

    fn remove_internal(self: &Rc<Self>, child: &Rc<Node>) {
        let was_connected = child.is_connected();
        let (previous_sibling, next_sibling) = {
            let mut children = self.children.borrow_mut();
            let Some(index) = children.iter().position(|c| Rc::ptr_eq(c, child)) else {
                return;
            };
            let previous = index.checked_sub(1).map(|i| children[i].id);
            let next = children.get(index + 1).map(|n| n.id);
            children.remove(index);
            (previous, next)
        };
        *child.parent.borrow_mut() = Weak::new();

        trace!(parent = self.id.raw(), child = child.id.raw(), "Removed node");
        self.queue_mutation(MutationRecord::ChildList {
            target: self.id,
            added: Vec::new(),
            removed: vec![child.id],
            previous_sibling,
            next_sibling,
        });

        if let Some(doc) = self.owner_state() {
            doc.clear_focus_within(child);
        }
        if was_connected {
            child.run_removed_hooks();
        }
        self.run_children_changed();
    }

    /// Move this subtree, shadow trees included, to another document.
    fn adopt(&self, owner: &Weak<DocumentState>) {
        if Weak::ptr_eq(&self.owner.borrow(), owner) {
            return;
        }
        *self.owner.borrow_mut() = owner.clone();
        if let Some(root) = self.shadow_root() {
            root.adopt(owner);
        }
        for child in self.children.borrow().iter() {
            child.adopt(owner);
        }
    }

    // ---- behavior hooks ----------------------------------------------------

    pub(crate) fn behavior_rc(&self) -> Option<Rc<dyn ElementBehavior>> {
        self.as_element()?.behavior.borrow().clone()
    }

    /// The behavior attached to this element, if it has type `T`.
    pub fn behavior<T: 'static>(&self) -> Option<Rc<T>> {
        self.behavior_rc()?.into_any().downcast::<T>().ok()
    }

    /// Create this element's behavior from the document configuration.
    pub(crate) fn install_behavior(self: &Rc<Self>) {
        let Some(data) = self.as_element() else {
            return;
        };
        if !data.is_html() || data.behavior.borrow().is_some() {
            return;
        }
        let Some(doc) = self.owner_state() else {
            return;
        };
        if let Some(factory) = doc.config().behavior_factory(data.local_name()) {
            let behavior = factory(self);
            *data.behavior.borrow_mut() = Some(behavior);
        }
    }

    pub(crate) fn run_inserted_hooks(self: &Rc<Self>) {
        let mut nodes = vec![self.clone()];
        nodes.extend(self.shadow_including_descendants());
        for node in nodes {
            if let Some(behavior) = node.behavior_rc() {
                behavior.inserted(&node);
            }
        }
    }

    fn run_removed_hooks(self: &Rc<Self>) {
        let mut nodes = vec![self.clone()];
        nodes.extend(self.shadow_including_descendants());
        for node in nodes {
            if let Some(behavior) = node.behavior_rc() {
                behavior.removed(&node);
            }
        }
    }

    pub(crate) fn run_children_changed(self: &Rc<Self>) {
        if let Some(behavior) = self.behavior_rc() {
            behavior.children_changed(self);
        }
    }

    // ---- cloning and comparison -------------------------------------------

    /// Copy this node, and its descendants when `deep`.
    ///
    /// Cloning a document or shadow root yields a fragment.
    pub fn clone_node(self: &Rc<Self>, deep: bool) -> Rc<Node> {
        let data = match &self.data {
            NodeData::Document | NodeData::Fragment | NodeData::ShadowRoot { .. } => {
                NodeData::Fragment
            }
            NodeData::Doctype {
                name,
                public_id,
                system_id,
            } => NodeData::Doctype {
                name: name.clone(),
                public_id: public_id.clone(),
                system_id: system_id.clone(),
            },
            NodeData::Element(e) => {
                let copy = ElementData::new(e.namespace(), e.prefix(), e.local_name());
                for attr in e.attributes.to_vec() {
                    copy.attributes.push_raw(attr);
                }
                NodeData::Element(copy)
            }
            NodeData::Text(text) => NodeData::Text(RefCell::new(text.borrow().clone())),
            NodeData::Comment(text) => NodeData::Comment(RefCell::new(text.borrow().clone())),
            NodeData::ProcessingInstruction { target, data } => NodeData::ProcessingInstruction {
                target: target.clone(),
                data: RefCell::new(data.borrow().clone()),
            },
        };
        let copy = Node::new(&self.owner_weak(), data);
        if deep {
            for child in self.children() {
                copy.append_raw(child.clone_node(true));
            }
        }
        copy.install_behavior();
        copy
    }

    /// Structural equality: same kind and name, same attributes regardless
    /// of order, same data and equal children.
    pub fn is_equal_node(&self, other: &Node) -> bool {
        let same = match (&self.data, &other.data) {
            (NodeData::Element(a), NodeData::Element(b)) => {
                a.namespace == b.namespace
                    && a.prefix == b.prefix
                    && a.local_name == b.local_name
                    && a.attributes.same_content(&b.attributes)
            }
            (NodeData::Text(a), NodeData::Text(b)) | (NodeData::Comment(a), NodeData::Comment(b)) => {
                *a.borrow() == *b.borrow()
            }
            (
                NodeData::Doctype {
                    name,
                    public_id,
                    system_id,
                },
                NodeData::Doctype {
                    name: n2,
                    public_id: p2,
                    system_id: s2,
                },
            ) => name == n2 && public_id == p2 && system_id == s2,
            (
                NodeData::ProcessingInstruction { target, data },
                NodeData::ProcessingInstruction {
                    target: t2,
                    data: d2,
                },
            ) => target == t2 && *data.borrow() == *d2.borrow(),
            (NodeData::Document, NodeData::Document)
            | (NodeData::Fragment, NodeData::Fragment)
            | (NodeData::ShadowRoot { .. }, NodeData::ShadowRoot { .. }) => true,
            _ => false,
        };
        if !same {
            return false;
        }
        let mine = self.children.borrow();
        let theirs = other.children.borrow();
        mine.len() == theirs.len()
            && mine
                .iter()
                .zip(theirs.iter())
                .all(|(a, b)| a.is_equal_node(b))
    }
}

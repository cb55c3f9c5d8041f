//! Documents: tree root, mutation queue, pending work and focus.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info, trace};
use trellis_common::{DomError, DomResult, Event, LocalTask, TaskScheduler};
use trellis_css::CssStyleSheet;
use url::Url;

use crate::attributes::{is_valid_name, validate_and_extract};
use crate::config::Configuration;
use crate::html;
use crate::mutation::MutationRecord;
use crate::node::{ElementData, Node, NodeData};
use crate::style_element::StyleElement;
use crate::HTML_NAMESPACE;

/// Document loading progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentReadyState {
    Loading,
    Interactive,
    Complete,
}

/// State shared by every node of a document.
pub struct DocumentState {
    root: Rc<Node>,
    config: Configuration,
    url: RefCell<Option<Url>>,
    ready_state: Cell<DocumentReadyState>,
    mutations: RefCell<Vec<MutationRecord>>,
    pending: RefCell<Vec<LocalTask>>,
    focused: RefCell<Weak<Node>>,
}

impl DocumentState {
    pub(crate) fn config(&self) -> &Configuration {
        &self.config
    }

    pub(crate) fn queue_mutation(&self, record: MutationRecord) {
        trace!(kind = record.kind(), target = record.target().raw(), "Queued mutation");
        self.mutations.borrow_mut().push(record);
    }

    pub(crate) fn publish(&self, event: Event) {
        if let Some(events) = self.config.events() {
            events.publish(event);
        }
    }

    pub(crate) fn focused(&self) -> Option<Rc<Node>> {
        self.focused.borrow().upgrade()
    }

    /// Move focus, publishing `blur` for the old element and `focus` for
    /// the new one.
    pub(crate) fn set_focus(&self, element: Option<Rc<Node>>) {
        let previous = self.focused();
        let unchanged = match (&previous, &element) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }
        *self.focused.borrow_mut() = element.as_ref().map(Rc::downgrade).unwrap_or_default();
        if let Some(previous) = previous {
            self.publish(Event::trusted("blur").with_target(Some(previous.id())));
        }
        if let Some(element) = element {
            debug!(element = element.id().raw(), "Focus changed");
            self.publish(Event::trusted("focus").with_target(Some(element.id())));
        }
    }

    /// Drop focus if it is inside `subtree`, which is being removed.
    pub(crate) fn clear_focus_within(&self, subtree: &Node) {
        let inside = self.focused().is_some_and(|f| subtree.contains(&f));
        if inside {
            *self.focused.borrow_mut() = Weak::new();
        }
    }
}

impl TaskScheduler for DocumentState {
    fn schedule(&self, task: LocalTask) {
        self.pending.borrow_mut().push(task);
    }
}

/// A document handle. Clones refer to the same document.
#[derive(Clone)]
pub struct Document {
    state: Rc<DocumentState>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("url", &self.state.url.borrow())
            .field("ready_state", &self.state.ready_state.get())
            .field("pending", &self.state.pending.borrow().len())
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new(Configuration::default())
    }
}

impl Document {
    /// Create an empty document.
    pub fn new(config: Configuration) -> Self {
        let state = Rc::new_cyclic(|owner: &Weak<DocumentState>| DocumentState {
            root: Node::new(owner, NodeData::Document),
            config,
            url: RefCell::new(None),
            ready_state: Cell::new(DocumentReadyState::Loading),
            mutations: RefCell::new(Vec::new()),
            pending: RefCell::new(Vec::new()),
            focused: RefCell::new(Weak::new()),
        });
        Self { state }
    }

    pub(crate) fn from_state(state: Rc<DocumentState>) -> Self {
        Self { state }
    }

    /// Parse HTML and create a document.
    ///
    /// Building the tree produces no mutation records. Behaviors see their
    /// elements inserted once the whole tree is in place.
    pub fn parse_html(html: &str, config: Configuration) -> DomResult<Self> {
        Self::parse(html, None, config)
    }

    /// Parse HTML fetched from `url`.
    pub fn parse_html_with_url(html: &str, url: Url, config: Configuration) -> DomResult<Self> {
        Self::parse(html, Some(url), config)
    }

    fn parse(html: &str, url: Option<Url>, config: Configuration) -> DomResult<Self> {
        debug!(len = html.len(), "Parsing HTML");
        let doc = Document::new(config);
        doc.set_url(url);
        html::parse_into(&doc.owner(), doc.root(), html)?;
        doc.state.ready_state.set(DocumentReadyState::Interactive);
        doc.root().run_inserted_hooks();
        debug!(nodes = doc.root().descendants().len(), "HTML parsed");
        Ok(doc)
    }

    /// The document node.
    pub fn root(&self) -> &Rc<Node> {
        &self.state.root
    }

    pub fn config(&self) -> &Configuration {
        &self.state.config
    }

    /// This document as a scheduler for deferred work.
    pub fn scheduler(&self) -> Rc<dyn TaskScheduler> {
        self.state.clone()
    }

    pub fn url(&self) -> Option<Url> {
        self.state.url.borrow().clone()
    }

    pub fn set_url(&self, url: Option<Url>) {
        *self.state.url.borrow_mut() = url;
    }

    /// Address relative references resolve against: the first
    /// `<base href>`, else the document URL.
    pub fn base_url(&self) -> Option<Url> {
        let url = self.url();
        let base = self
            .root()
            .descendant_elements()
            .into_iter()
            .find(|e| e.is_html_element("base") && e.has_attribute("href"))
            .and_then(|e| e.get_attribute("href"));
        match (base, url) {
            (Some(href), Some(url)) => url.join(&href).ok().or(Some(url)),
            (Some(href), None) => Url::parse(&href).ok(),
            (None, url) => url,
        }
    }

    /// Resolve `reference` against the base URL.
    pub fn resolve_url(&self, reference: &str) -> Option<Url> {
        match self.base_url() {
            Some(base) => base.join(reference).ok(),
            None => Url::parse(reference).ok(),
        }
    }

    pub fn ready_state(&self) -> DocumentReadyState {
        self.state.ready_state.get()
    }

    // ---- factories ---------------------------------------------------------

    fn owner(&self) -> Weak<DocumentState> {
        Rc::downgrade(&self.state)
    }

    /// Create an HTML element. The name is lower-cased.
    pub fn create_element(&self, local_name: &str) -> DomResult<Rc<Node>> {
        if !is_valid_name(local_name) {
            return Err(DomError::InvalidCharacter(local_name.to_string()));
        }
        let data = ElementData::new(Some(HTML_NAMESPACE), None, &local_name.to_ascii_lowercase());
        let element = Node::new(&self.owner(), NodeData::Element(data));
        element.install_behavior();
        Ok(element)
    }

    /// Create an element in `namespace`.
    pub fn create_element_ns(
        &self,
        namespace: Option<&str>,
        qualified_name: &str,
    ) -> DomResult<Rc<Node>> {
        let namespace = namespace.filter(|ns| !ns.is_empty());
        let (prefix, local_name) = validate_and_extract(namespace, qualified_name)?;
        let data = ElementData::new(namespace, prefix.as_deref(), &local_name);
        let element = Node::new(&self.owner(), NodeData::Element(data));
        element.install_behavior();
        Ok(element)
    }

    pub fn create_text_node(&self, text: &str) -> Rc<Node> {
        Node::new_text(&self.owner(), text)
    }

    pub fn create_comment(&self, text: &str) -> Rc<Node> {
        Node::new(&self.owner(), NodeData::Comment(RefCell::new(text.to_string())))
    }

    pub fn create_document_fragment(&self) -> Rc<Node> {
        Node::new(&self.owner(), NodeData::Fragment)
    }

    // ---- lookup ------------------------------------------------------------

    /// The `<html>` element.
    pub fn document_element(&self) -> Option<Rc<Node>> {
        self.root().first_element_child()
    }

    pub fn head(&self) -> Option<Rc<Node>> {
        self.document_element()?
            .children()
            .into_iter()
            .find(|n| n.is_html_element("head"))
    }

    pub fn body(&self) -> Option<Rc<Node>> {
        self.document_element()?
            .children()
            .into_iter()
            .find(|n| n.is_html_element("body"))
    }

    /// Text of the first `<title>`, whitespace collapsed.
    pub fn title(&self) -> Option<String> {
        let title = self
            .root()
            .descendant_elements()
            .into_iter()
            .find(|n| n.is_html_element("title"))?;
        Some(
            title
                .text_content()
                .split_ascii_whitespace()
                .collect::<Vec<_>>()
                .join(" "),
        )
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<Rc<Node>> {
        self.root()
            .descendant_elements()
            .into_iter()
            .find(|n| n.get_attribute("id").as_deref() == Some(id))
    }

    pub fn get_elements_by_tag_name(&self, name: &str) -> Vec<Rc<Node>> {
        self.root().get_elements_by_tag_name(name)
    }

    pub fn get_elements_by_class_name(&self, names: &str) -> Vec<Rc<Node>> {
        self.root().get_elements_by_class_name(names)
    }

    pub fn query_selector(&self, selector: &str) -> DomResult<Option<Rc<Node>>> {
        self.root().query_selector(selector)
    }

    pub fn query_selector_all(&self, selector: &str) -> DomResult<Vec<Rc<Node>>> {
        self.root().query_selector_all(selector)
    }

    /// Sheets of the document's `<style>` elements in tree order.
    pub fn style_sheets(&self) -> Vec<Rc<CssStyleSheet>> {
        self.root()
            .descendant_elements()
            .into_iter()
            .filter_map(|e| e.behavior::<StyleElement>())
            .filter_map(|style| style.sheet())
            .collect()
    }

    /// Visit every node depth-first.
    pub fn traverse<F>(&self, mut callback: F)
    where
        F: FnMut(&Rc<Node>),
    {
        self.root().traverse(&mut callback);
    }

    pub fn focused_element(&self) -> Option<Rc<Node>> {
        self.state.focused()
    }

    // ---- mutations and pending work ----------------------------------------

    /// Drain the queued mutation records.
    pub fn take_mutation_records(&self) -> Vec<MutationRecord> {
        std::mem::take(&mut *self.state.mutations.borrow_mut())
    }

    /// Hold the load event until `work` finishes.
    pub fn delay_load<F>(&self, work: F)
    where
        F: Future<Output = ()> + 'static,
    {
        self.state.schedule(Box::pin(work));
    }

    /// Number of pending tasks not yet driven.
    pub fn pending_tasks(&self) -> usize {
        self.state.pending.borrow().len()
    }

    /// Drive pending work, including work scheduled while draining, then
    /// mark the document complete and publish `load` once.
    pub async fn wait_until_loaded(&self) {
        loop {
            let batch = std::mem::take(&mut *self.state.pending.borrow_mut());
            if batch.is_empty() {
                break;
            }
            debug!(tasks = batch.len(), "Driving pending work");
            let mut running: FuturesUnordered<LocalTask> = batch.into_iter().collect();
            while running.next().await.is_some() {}
        }
        if self.state.ready_state.get() != DocumentReadyState::Complete {
            self.state.ready_state.set(DocumentReadyState::Complete);
            info!(url = ?self.url().map(|u| u.to_string()), "Document loaded");
            self.state
                .publish(Event::trusted("load").with_target(Some(self.root().id())));
        }
    }
}

//! Document configuration: registered style engines, element behaviors and
//! external collaborators.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use trellis_common::EventSink;
use trellis_css::{CssStyleEngine, StyleEngine};
use trellis_net::Loader;

use crate::node::Node;
use crate::selector::SimpleSelectorMatcher;
use crate::style_element::StyleElement;

/// Extra behavior attached to HTML elements of a given local name.
///
/// Hooks run after the tree mutation that triggered them is complete.
pub trait ElementBehavior {
    /// The element became connected to its document.
    fn inserted(&self, _element: &Rc<Node>) {}

    /// The element was disconnected from its document.
    fn removed(&self, _element: &Rc<Node>) {}

    /// The element's children or their text changed.
    fn children_changed(&self, _element: &Rc<Node>) {}

    /// Upcast for [`Node::behavior`].
    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

/// Creates the behavior for a freshly created element. Factories usually
/// register attribute observers on the element.
pub type BehaviorFactory = Rc<dyn Fn(&Rc<Node>) -> Rc<dyn ElementBehavior>>;

/// Decides whether an element matches a selector.
pub trait SelectorMatcher {
    /// `None` when the selector cannot be parsed.
    fn matches(&self, element: &Rc<Node>, selector: &str) -> Option<bool>;
}

/// Everything a document needs from its host.
#[derive(Clone)]
pub struct Configuration {
    style_engines: HashMap<String, Rc<dyn StyleEngine>>,
    behaviors: HashMap<String, BehaviorFactory>,
    loader: Option<Rc<dyn Loader>>,
    events: Option<Rc<dyn EventSink>>,
    selector_matcher: Rc<dyn SelectorMatcher>,
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut engines: Vec<_> = self.style_engines.keys().collect();
        engines.sort();
        let mut behaviors: Vec<_> = self.behaviors.keys().collect();
        behaviors.sort();
        f.debug_struct("Configuration")
            .field("style_engines", &engines)
            .field("behaviors", &behaviors)
            .field("loader", &self.loader.is_some())
            .field("events", &self.events.is_some())
            .finish()
    }
}

impl Default for Configuration {
    /// CSS engine and `<style>` behavior registered, no loader, no events.
    fn default() -> Self {
        Self::empty()
            .with_style_engine(Rc::new(CssStyleEngine::default()))
            .with_behavior("style", StyleElement::factory())
    }
}

impl Configuration {
    /// Nothing registered.
    pub fn empty() -> Self {
        Self {
            style_engines: HashMap::new(),
            behaviors: HashMap::new(),
            loader: None,
            events: None,
            selector_matcher: Rc::new(SimpleSelectorMatcher),
        }
    }

    /// Register `engine` under its MIME type.
    pub fn with_style_engine(mut self, engine: Rc<dyn StyleEngine>) -> Self {
        self.style_engines
            .insert(engine.mime_type().to_ascii_lowercase(), engine);
        self
    }

    /// Remove the engine for `mime_type`.
    pub fn without_style_engine(mut self, mime_type: &str) -> Self {
        self.style_engines.remove(&mime_type.to_ascii_lowercase());
        self
    }

    /// Register a behavior for HTML elements named `local_name`.
    pub fn with_behavior(mut self, local_name: &str, factory: BehaviorFactory) -> Self {
        self.behaviors
            .insert(local_name.to_ascii_lowercase(), factory);
        self
    }

    pub fn with_loader(mut self, loader: Rc<dyn Loader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn with_events(mut self, events: Rc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_selector_matcher(mut self, matcher: Rc<dyn SelectorMatcher>) -> Self {
        self.selector_matcher = matcher;
        self
    }

    /// Engine for `mime_type`, ignoring parameters and case.
    pub fn style_engine(&self, mime_type: &str) -> Option<Rc<dyn StyleEngine>> {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        self.style_engines.get(&essence).cloned()
    }

    pub fn behavior_factory(&self, local_name: &str) -> Option<BehaviorFactory> {
        self.behaviors.get(local_name).cloned()
    }

    pub fn loader(&self) -> Option<Rc<dyn Loader>> {
        self.loader.clone()
    }

    pub fn events(&self) -> Option<Rc<dyn EventSink>> {
        self.events.clone()
    }

    pub fn selector_matcher(&self) -> Rc<dyn SelectorMatcher> {
        self.selector_matcher.clone()
    }
}

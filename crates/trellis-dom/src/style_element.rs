//! `<style>` element behavior: owns the element's style sheet and keeps it
//! in step with the tree and the `media`, `type` and `disabled` attributes.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::debug;
use trellis_common::DomResult;
use trellis_css::{CssStyleSheet, StyleContext, StyleOptions};

use crate::config::{BehaviorFactory, ElementBehavior};
use crate::node::Node;

const DEFAULT_STYLE_TYPE: &str = "text/css";

/// Lifecycle state of a style element's sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleState {
    /// Never connected and no sheet built.
    Unattached,
    /// Connected at some point, sheet not built or invalidated.
    AttachedNoSheet,
    /// A sheet is cached.
    AttachedWithSheet,
}

/// Behavior for HTML `style` elements.
#[derive(Debug)]
pub struct StyleElement {
    element: Weak<Node>,
    sheet: RefCell<Option<Rc<CssStyleSheet>>>,
    attached: Cell<bool>,
    builds: Cell<usize>,
}

impl StyleElement {
    /// Factory registered for `style` by the default configuration.
    pub fn factory() -> BehaviorFactory {
        Rc::new(|element: &Rc<Node>| {
            let behavior = Rc::new(StyleElement {
                element: Rc::downgrade(element),
                sheet: RefCell::new(None),
                attached: Cell::new(false),
                builds: Cell::new(0),
            });

            let weak = Rc::downgrade(&behavior);
            element.observe_attribute(
                "media",
                Rc::new(move |value: Option<&str>| {
                    if let Some(style) = weak.upgrade() {
                        style.media_changed(value);
                    }
                }),
            );
            let weak = Rc::downgrade(&behavior);
            element.observe_attribute(
                "disabled",
                Rc::new(move |value: Option<&str>| {
                    if let Some(style) = weak.upgrade() {
                        style.disabled_changed(value.is_some());
                    }
                }),
            );
            let weak = Rc::downgrade(&behavior);
            element.observe_attribute(
                "type",
                Rc::new(move |_: Option<&str>| {
                    if let Some(style) = weak.upgrade() {
                        style.invalidate();
                    }
                }),
            );

            behavior as Rc<dyn ElementBehavior>
        })
    }

    pub fn state(&self) -> StyleState {
        if self.sheet.borrow().is_some() {
            StyleState::AttachedWithSheet
        } else if self.attached.get() {
            StyleState::AttachedNoSheet
        } else {
            StyleState::Unattached
        }
    }

    /// The element's sheet, built from its text if none is cached. `None`
    /// when no engine handles the element's `type`.
    pub fn sheet(&self) -> Option<Rc<CssStyleSheet>> {
        if let Some(sheet) = self.sheet.borrow().clone() {
            return Some(sheet);
        }
        self.build()
    }

    /// The cached sheet, without building one.
    pub fn cached_sheet(&self) -> Option<Rc<CssStyleSheet>> {
        self.sheet.borrow().clone()
    }

    /// Number of sheets built so far.
    pub fn build_count(&self) -> usize {
        self.builds.get()
    }

    fn build(&self) -> Option<Rc<CssStyleSheet>> {
        let element = self.element.upgrade()?;
        let document = element.owner_document()?;
        let style_type = self.style_type();
        let Some(engine) = document.config().style_engine(&style_type) else {
            debug!(element = element.id().raw(), %style_type, "No style engine for type");
            return None;
        };

        let context = StyleContext {
            events: document.config().events(),
            loader: document.config().loader(),
            scheduler: Some(document.scheduler()),
        };
        let options = StyleOptions::new()
            .with_element(element.id())
            .with_context(context)
            .with_base_url(document.base_url())
            .with_title(element.get_attribute("title"))
            .disabled(element.has_attribute("disabled"));

        let sheet = engine.parse_stylesheet(&element.text_content(), &options);
        if let Some(media) = element.get_attribute("media") {
            sheet.media().set_media_text(&media);
        }
        self.builds.set(self.builds.get() + 1);
        debug!(
            element = element.id().raw(),
            rules = sheet.css_rules().len(),
            "Built style sheet"
        );
        *self.sheet.borrow_mut() = Some(sheet.clone());
        Some(sheet)
    }

    fn invalidate(&self) {
        if self.sheet.borrow_mut().take().is_some() {
            debug!("Invalidated style sheet");
        }
    }

    fn media_changed(&self, value: Option<&str>) {
        if let Some(sheet) = self.cached_sheet() {
            sheet.media().set_media_text(value.unwrap_or_default());
        }
    }

    fn disabled_changed(&self, disabled: bool) {
        if let Some(sheet) = self.cached_sheet() {
            sheet.set_disabled(disabled);
        }
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.element.upgrade()?.get_attribute(name)
    }

    pub fn is_scoped(&self) -> bool {
        self.attribute("scoped").is_some()
    }

    pub fn media(&self) -> String {
        self.attribute("media").unwrap_or_default()
    }

    pub fn set_media(&self, media: &str) -> DomResult<()> {
        self.set_attribute("media", media)
    }

    /// The `type` attribute, `text/css` when absent or blank.
    pub fn style_type(&self) -> String {
        self.attribute("type")
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_STYLE_TYPE.to_string())
    }

    pub fn set_style_type(&self, style_type: &str) -> DomResult<()> {
        self.set_attribute("type", style_type)
    }

    pub fn is_disabled(&self) -> bool {
        self.attribute("disabled").is_some()
    }

    pub fn set_disabled(&self, disabled: bool) -> DomResult<()> {
        let Some(element) = self.element.upgrade() else {
            return Ok(());
        };
        element.toggle_attribute("disabled", Some(disabled)).map(|_| ())
    }

    fn set_attribute(&self, name: &str, value: &str) -> DomResult<()> {
        match self.element.upgrade() {
            Some(element) => element.set_attribute(name, value),
            None => Ok(()),
        }
    }
}

impl ElementBehavior for StyleElement {
    fn inserted(&self, _element: &Rc<Node>) {
        self.attached.set(true);
        self.invalidate();
        self.build();
    }

    fn removed(&self, _element: &Rc<Node>) {
        self.invalidate();
    }

    fn children_changed(&self, _element: &Rc<Node>) {
        self.invalidate();
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl Node {
    /// Sheet of a `style` element.
    pub fn sheet(&self) -> Option<Rc<CssStyleSheet>> {
        self.behavior::<StyleElement>()?.sheet()
    }
}

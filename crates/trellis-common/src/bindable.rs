//! Two-way text binding between parsed objects and their backing attribute.
//!
//! A bindable object is the parsed form of some attribute text (a class list,
//! an inline style block, a media list). It can be rebuilt from new text and
//! announces its own serialization whenever it is mutated through its API.

use std::cell::RefCell;
use std::rc::Rc;

/// Callback receiving the serialized text after a programmatic mutation.
pub type ChangeHandler = Rc<dyn Fn(&str)>;

/// A parsed object with a textual round trip.
pub trait Bindable {
    /// Serialize the current state to text.
    fn to_text(&self) -> String;

    /// Rebuild the state from `text` (`None` when the attribute was removed).
    ///
    /// Updating never emits a change notification.
    fn update(&self, text: Option<&str>);

    /// Register a handler invoked after every programmatic mutation.
    fn on_change(&self, handler: ChangeHandler);
}

/// List of change handlers owned by a bindable object.
#[derive(Default)]
pub struct ChangeNotifier {
    handlers: RefCell<Vec<ChangeHandler>>,
}

impl ChangeNotifier {
    /// Create an empty notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler.
    pub fn subscribe(&self, handler: ChangeHandler) {
        self.handlers.borrow_mut().push(handler);
    }

    /// Invoke every handler with `text`.
    ///
    /// Handlers may subscribe further handlers while running; those only see
    /// later notifications.
    pub fn notify(&self, text: &str) {
        let handlers: Vec<ChangeHandler> = self.handlers.borrow().clone();
        for handler in handlers {
            handler(text);
        }
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.borrow().len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.borrow().is_empty()
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("handlers", &self.len())
            .finish()
    }
}

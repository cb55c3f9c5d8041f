//! # Trellis Common
//!
//! Shared vocabulary for the Trellis DOM/CSSOM engine.
//!
//! ## Features
//!
//! - The DOM exception taxonomy as a single error enum
//! - Node identity shared by the tree and the style object model
//! - Two-way text binding primitives (`Bindable`, `ChangeNotifier`)
//! - Fire-and-forget event publishing
//! - Deferred task scheduling for asynchronous sub-resource work
//! - Logging configuration and setup

use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

pub mod bindable;
pub mod events;
pub mod logging;
pub mod tasks;

pub use bindable::{Bindable, ChangeHandler, ChangeNotifier};
pub use events::{Event, EventDetail, EventSink, RecordingSink};
pub use logging::{init_logging, LogConfig, LogFormat};
pub use tasks::{LocalTask, TaskScheduler};

/// Errors raised by DOM and CSSOM operations.
///
/// All variants are local, recoverable conditions reported at the call that
/// violated the contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    /// A name does not match the XML `Name` production.
    #[error("InvalidCharacterError: {0}")]
    InvalidCharacter(String),

    /// Text could not be turned into the requested object.
    #[error("SyntaxError: {0}")]
    Syntax(String),

    /// An index is outside the allowed range.
    #[error("IndexSizeError: index {index} is out of range (length {length})")]
    IndexSize { index: usize, length: usize },

    /// The object is in a state that forbids the operation.
    #[error("InvalidStateError: {0}")]
    InvalidState(String),

    /// The operation is not supported for this object.
    #[error("NotSupportedError: {0}")]
    NotSupported(String),

    /// The object may not be modified in this way.
    #[error("NoModificationAllowedError: {0}")]
    NoModificationAllowed(String),

    /// The resulting tree would be malformed.
    #[error("HierarchyRequestError: {0}")]
    HierarchyRequest(String),

    /// A referenced node is not where it was expected.
    #[error("NotFoundError: {0}")]
    NotFound(String),

    /// A prefix and namespace combination is not allowed.
    #[error("NamespaceError: {0}")]
    Namespace(String),
}

impl DomError {
    /// Create a syntax error.
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax(message.into())
    }

    /// Create an invalid-state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Create a not-supported error.
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported(message.into())
    }

    /// Create a hierarchy error.
    pub fn hierarchy(message: impl Into<String>) -> Self {
        Self::HierarchyRequest(message.into())
    }

    /// The DOMException name for this error.
    pub fn name(&self) -> &'static str {
        match self {
            DomError::InvalidCharacter(_) => "InvalidCharacterError",
            DomError::Syntax(_) => "SyntaxError",
            DomError::IndexSize { .. } => "IndexSizeError",
            DomError::InvalidState(_) => "InvalidStateError",
            DomError::NotSupported(_) => "NotSupportedError",
            DomError::NoModificationAllowed(_) => "NoModificationAllowedError",
            DomError::HierarchyRequest(_) => "HierarchyRequestError",
            DomError::NotFound(_) => "NotFoundError",
            DomError::Namespace(_) => "NamespaceError",
        }
    }

    /// The legacy numeric DOMException code.
    pub fn code(&self) -> u16 {
        match self {
            DomError::IndexSize { .. } => 1,
            DomError::HierarchyRequest(_) => 3,
            DomError::InvalidCharacter(_) => 5,
            DomError::NoModificationAllowed(_) => 7,
            DomError::NotFound(_) => 8,
            DomError::NotSupported(_) => 9,
            DomError::InvalidState(_) => 11,
            DomError::Syntax(_) => 12,
            DomError::Namespace(_) => 14,
        }
    }
}

/// Result type alias for DOM operations.
pub type DomResult<T> = std::result::Result<T, DomError>;

/// Extension trait for Option.
pub trait OptionExt<T> {
    /// Convert None to a NotFound error.
    fn ok_or_not_found(self, what: impl Into<String>) -> DomResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, what: impl Into<String>) -> DomResult<T> {
        self.ok_or_else(|| DomError::NotFound(what.into()))
    }
}

/// Unique identifier for a DOM node.
///
/// Identifiers are process-unique so that objects outside the tree (style
/// sheets, events, side tables) can refer to a node without owning it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Allocate a fresh NodeId.
    pub fn next() -> Self {
        static COUNTER: AtomicUsize = AtomicUsize::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a raw ID value.
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> usize {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_names_and_codes() {
        let err = DomError::IndexSize {
            index: 4,
            length: 2,
        };
        assert_eq!(err.name(), "IndexSizeError");
        assert_eq!(err.code(), 1);
        assert_eq!(DomError::syntax("x").code(), 12);
        assert_eq!(DomError::invalid_state("x").name(), "InvalidStateError");
    }

    #[test]
    fn test_error_display() {
        let err = DomError::IndexSize {
            index: 4,
            length: 2,
        };
        assert_eq!(
            err.to_string(),
            "IndexSizeError: index 4 is out of range (length 2)"
        );
    }

    #[test]
    fn test_node_id_uniqueness() {
        let a = NodeId::next();
        let b = NodeId::next();
        assert_ne!(a, b);
        assert_eq!(NodeId::new(7).raw(), 7);
    }

    #[test]
    fn test_option_ext() {
        let none: Option<i32> = None;
        assert!(matches!(
            none.ok_or_not_found("child"),
            Err(DomError::NotFound(_))
        ));
        assert_eq!(Some(3).ok_or_not_found("child"), Ok(3));
    }
}

//! Media query lists (`media` attributes, `@media` and `@import` preludes).

use std::cell::RefCell;

use smallvec::SmallVec;
use trellis_common::{Bindable, ChangeHandler, ChangeNotifier, DomError, DomResult};
use trellis_cssparser::parse_media_list;

type Media = SmallVec<[String; 2]>;

/// An ordered list of media queries.
#[derive(Debug, Default)]
pub struct MediaList {
    media: RefCell<Media>,
    notifier: ChangeNotifier,
}

impl MediaList {
    /// Create an empty list, which matches all media.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma-separated list.
    pub fn parse(text: &str) -> Self {
        let list = Self::new();
        list.update(Some(text));
        list
    }

    pub(crate) fn from_queries(queries: Vec<String>) -> Self {
        Self {
            media: RefCell::new(queries.into_iter().collect()),
            notifier: ChangeNotifier::new(),
        }
    }

    /// Serialized form, e.g. `screen, print`.
    pub fn media_text(&self) -> String {
        self.media.borrow().join(", ")
    }

    /// Replace the list with the queries in `text`.
    pub fn set_media_text(&self, text: &str) {
        self.update(Some(text));
        self.notifier.notify(&self.media_text());
    }

    pub fn len(&self) -> usize {
        self.media.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.media.borrow().is_empty()
    }

    /// Query at `index`.
    pub fn item(&self, index: usize) -> Option<String> {
        self.media.borrow().get(index).cloned()
    }

    /// Whether the list contains `medium`.
    pub fn contains(&self, medium: &str) -> bool {
        let medium = medium.trim().to_ascii_lowercase();
        self.media.borrow().iter().any(|m| *m == medium)
    }

    /// Add `medium` unless already present.
    pub fn append_medium(&self, medium: &str) {
        let Some(query) = parse_media_list(medium).into_iter().next() else {
            return;
        };
        if self.contains(&query) {
            return;
        }
        self.media.borrow_mut().push(query);
        self.notifier.notify(&self.media_text());
    }

    /// Remove `medium`; fails with `NotFound` if absent.
    pub fn delete_medium(&self, medium: &str) -> DomResult<()> {
        let medium = medium.trim().to_ascii_lowercase();
        let removed = {
            let mut media = self.media.borrow_mut();
            let before = media.len();
            media.retain(|m| *m != medium);
            media.len() != before
        };
        if !removed {
            return Err(DomError::NotFound(format!("medium '{}'", medium)));
        }
        self.notifier.notify(&self.media_text());
        Ok(())
    }
}

impl Bindable for MediaList {
    fn to_text(&self) -> String {
        self.media_text()
    }

    fn update(&self, text: Option<&str>) {
        let queries = text.map(parse_media_list).unwrap_or_default();
        *self.media.borrow_mut() = queries.into_iter().collect();
    }

    fn on_change(&self, handler: ChangeHandler) {
        self.notifier.subscribe(handler);
    }
}

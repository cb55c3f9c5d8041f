//! Whitespace-separated token sets (`classList`).

use std::cell::RefCell;

use trellis_common::{Bindable, ChangeHandler, ChangeNotifier, DomError, DomResult};

/// An ordered set of tokens parsed from attribute text.
///
/// Duplicates collapse to their first occurrence. Every mutation through the
/// API announces the new serialization to change handlers.
#[derive(Debug, Default)]
pub struct TokenList {
    tokens: RefCell<Vec<String>>,
    notifier: ChangeNotifier,
}

impl TokenList {
    pub fn new(text: Option<&str>) -> Self {
        let list = Self::default();
        list.update(text);
        list
    }

    fn parse(text: &str) -> Vec<String> {
        let mut tokens: Vec<String> = Vec::new();
        for token in text.split_ascii_whitespace() {
            if !tokens.iter().any(|t| t == token) {
                tokens.push(token.to_string());
            }
        }
        tokens
    }

    fn validate(token: &str) -> DomResult<()> {
        if token.is_empty() {
            return Err(DomError::syntax("token must not be empty"));
        }
        if token.chars().any(|c| c.is_ascii_whitespace()) {
            return Err(DomError::InvalidCharacter(format!(
                "token '{}' contains whitespace",
                token
            )));
        }
        Ok(())
    }

    fn changed(&self) {
        self.notifier.notify(&self.value());
    }

    pub fn len(&self) -> usize {
        self.tokens.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.borrow().is_empty()
    }

    pub fn item(&self, index: usize) -> Option<String> {
        self.tokens.borrow().get(index).cloned()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.borrow().iter().any(|t| t == token)
    }

    /// Tokens in order.
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.borrow().clone()
    }

    /// Serialized form: tokens joined by single spaces.
    pub fn value(&self) -> String {
        self.tokens.borrow().join(" ")
    }

    /// Add tokens that are not present yet.
    pub fn add(&self, tokens: &[&str]) -> DomResult<()> {
        for token in tokens {
            Self::validate(token)?;
        }
        {
            let mut list = self.tokens.borrow_mut();
            for token in tokens {
                if !list.iter().any(|t| t == token) {
                    list.push(token.to_string());
                }
            }
        }
        self.changed();
        Ok(())
    }

    /// Remove tokens; absent ones are ignored.
    pub fn remove(&self, tokens: &[&str]) -> DomResult<()> {
        for token in tokens {
            Self::validate(token)?;
        }
        self.tokens
            .borrow_mut()
            .retain(|t| !tokens.contains(&t.as_str()));
        self.changed();
        Ok(())
    }

    /// Toggle `token`, or force it on or off. Returns whether it is present
    /// afterwards.
    pub fn toggle(&self, token: &str, force: Option<bool>) -> DomResult<bool> {
        Self::validate(token)?;
        let present = self.contains(token);
        match (present, force) {
            (true, Some(true)) => Ok(true),
            (false, Some(false)) => Ok(false),
            (true, _) => {
                self.remove(&[token])?;
                Ok(false)
            }
            (false, _) => {
                self.add(&[token])?;
                Ok(true)
            }
        }
    }

    /// Replace `token` with `new_token` in place. Returns `false` if `token`
    /// was absent.
    pub fn replace(&self, token: &str, new_token: &str) -> DomResult<bool> {
        Self::validate(token)?;
        Self::validate(new_token)?;
        {
            let mut list = self.tokens.borrow_mut();
            let Some(index) = list.iter().position(|t| t == token) else {
                return Ok(false);
            };
            if list.iter().any(|t| t == new_token) {
                list.remove(index);
            } else {
                list[index] = new_token.to_string();
            }
        }
        self.changed();
        Ok(true)
    }
}

impl Bindable for TokenList {
    fn to_text(&self) -> String {
        self.value()
    }

    fn update(&self, text: Option<&str>) {
        *self.tokens.borrow_mut() = text.map(Self::parse).unwrap_or_default();
    }

    fn on_change(&self, handler: ChangeHandler) {
        self.notifier.subscribe(handler);
    }
}

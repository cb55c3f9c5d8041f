//! Declaration blocks (`style` attributes and rule bodies).

use std::cell::RefCell;

use tracing::trace;
use trellis_common::{Bindable, ChangeHandler, ChangeNotifier};
use trellis_cssparser::{parse_declarations, DeclarationAst};

use crate::properties::is_known_property;
use crate::CssParserOptions;

/// A single `property: value` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssDeclaration {
    pub property: String,
    pub value: String,
    pub important: bool,
}

impl CssDeclaration {
    /// Serialize as `property: value` with an optional `!important`.
    pub fn css_text(&self) -> String {
        if self.important {
            format!("{}: {} !important", self.property, self.value)
        } else {
            format!("{}: {}", self.property, self.value)
        }
    }
}

/// An ordered block of declarations.
///
/// A property appears at most once; a later declaration replaces an earlier
/// one in place.
#[derive(Debug)]
pub struct CssStyleDeclaration {
    declarations: RefCell<Vec<CssDeclaration>>,
    options: CssParserOptions,
    notifier: ChangeNotifier,
}

impl CssStyleDeclaration {
    /// Create an empty block.
    pub fn new(options: CssParserOptions) -> Self {
        Self {
            declarations: RefCell::new(Vec::new()),
            options,
            notifier: ChangeNotifier::new(),
        }
    }

    /// Create a block from declaration text.
    pub fn parse(source: &str, options: CssParserOptions) -> Self {
        let block = Self::new(options);
        block.replace_all(parse_declarations(source));
        block
    }

    pub(crate) fn from_ast(ast: Vec<DeclarationAst>, options: CssParserOptions) -> Self {
        let block = Self::new(options);
        block.replace_all(ast);
        block
    }

    fn replace_all(&self, ast: Vec<DeclarationAst>) {
        let mut list: Vec<CssDeclaration> = Vec::with_capacity(ast.len());
        for decl in ast {
            if !self.options.include_unknown_declarations && !is_known_property(&decl.property) {
                trace!(property = %decl.property, "Dropping unknown declaration");
                continue;
            }
            let decl = CssDeclaration {
                property: decl.property,
                value: decl.value,
                important: decl.important,
            };
            match list.iter_mut().find(|d| d.property == decl.property) {
                Some(existing) if existing.important && !decl.important => {}
                Some(existing) => *existing = decl,
                None => list.push(decl),
            }
        }
        *self.declarations.borrow_mut() = list;
    }

    fn changed(&self) {
        self.notifier.notify(&self.css_text());
    }

    /// Number of declarations.
    pub fn len(&self) -> usize {
        self.declarations.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.borrow().is_empty()
    }

    /// Property name at `index`.
    pub fn item(&self, index: usize) -> Option<String> {
        self.declarations
            .borrow()
            .get(index)
            .map(|d| d.property.clone())
    }

    /// Snapshot of all declarations.
    pub fn declarations(&self) -> Vec<CssDeclaration> {
        self.declarations.borrow().clone()
    }

    /// Serialized block, e.g. `color: red; margin: 0`.
    pub fn css_text(&self) -> String {
        self.declarations
            .borrow()
            .iter()
            .map(CssDeclaration::css_text)
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Replace every declaration with those parsed from `text`.
    pub fn set_css_text(&self, text: &str) {
        self.replace_all(parse_declarations(text));
        self.changed();
    }

    /// Value of `property`, or an empty string.
    pub fn get_property_value(&self, property: &str) -> String {
        let property = normalize(property);
        self.declarations
            .borrow()
            .iter()
            .find(|d| d.property == property)
            .map(|d| d.value.clone())
            .unwrap_or_default()
    }

    /// `"important"` if the declaration is important, otherwise empty.
    pub fn get_property_priority(&self, property: &str) -> &'static str {
        let property = normalize(property);
        let important = self
            .declarations
            .borrow()
            .iter()
            .any(|d| d.property == property && d.important);
        if important {
            "important"
        } else {
            ""
        }
    }

    /// Set `property` to `value`. An empty value removes the property.
    ///
    /// Unknown properties and values that do not parse are ignored.
    pub fn set_property(&self, property: &str, value: &str, priority: &str) {
        let property = normalize(property);
        if value.trim().is_empty() {
            self.remove_property(&property);
            return;
        }
        if !self.options.include_unknown_declarations && !is_known_property(&property) {
            return;
        }
        let Some(parsed) = parse_declarations(&format!("{}: {}", property, value))
            .into_iter()
            .next()
        else {
            return;
        };
        let decl = CssDeclaration {
            property,
            value: parsed.value,
            important: parsed.important || priority.eq_ignore_ascii_case("important"),
        };
        {
            let mut list = self.declarations.borrow_mut();
            match list.iter_mut().find(|d| d.property == decl.property) {
                Some(existing) => *existing = decl,
                None => list.push(decl),
            }
        }
        self.changed();
    }

    /// Remove `property`, returning its previous value (empty if absent).
    pub fn remove_property(&self, property: &str) -> String {
        let property = normalize(property);
        let removed = {
            let mut list = self.declarations.borrow_mut();
            list.iter()
                .position(|d| d.property == property)
                .map(|idx| list.remove(idx).value)
        };
        match removed {
            Some(value) => {
                self.changed();
                value
            }
            None => String::new(),
        }
    }
}

fn normalize(property: &str) -> String {
    let property = property.trim();
    if property.starts_with("--") {
        property.to_string()
    } else {
        property.to_ascii_lowercase()
    }
}

impl Bindable for CssStyleDeclaration {
    fn to_text(&self) -> String {
        self.css_text()
    }

    fn update(&self, text: Option<&str>) {
        self.replace_all(parse_declarations(text.unwrap_or_default()));
    }

    fn on_change(&self, handler: ChangeHandler) {
        self.notifier.subscribe(handler);
    }
}

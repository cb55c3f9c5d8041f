//! Style sheets.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::debug;
use trellis_common::{DomError, DomResult, NodeId};
use trellis_cssparser::parse_rule;
use url::Url;

use crate::media::MediaList;
use crate::rule::CssRule;
use crate::rule_list::CssRuleList;
use crate::CssParserOptions;

/// Construction parameters for a [`CssStyleSheet`].
#[derive(Debug, Clone, Default)]
pub struct SheetInit {
    /// Address the sheet was fetched from.
    pub href: Option<Url>,
    /// Address relative references resolve against; defaults to `href`.
    pub base_url: Option<Url>,
    /// Element the sheet belongs to.
    pub owner_node: Option<NodeId>,
    pub title: Option<String>,
    pub disabled: bool,
    pub alternate: bool,
    pub options: CssParserOptions,
}

/// A CSS style sheet.
#[derive(Debug)]
pub struct CssStyleSheet {
    href: Option<Url>,
    base_url: Option<Url>,
    owner_node: Option<NodeId>,
    owner_rule: RefCell<Weak<CssRule>>,
    title: Option<String>,
    alternate: bool,
    disabled: Cell<bool>,
    media: Rc<MediaList>,
    rules: CssRuleList,
    options: CssParserOptions,
}

impl CssStyleSheet {
    /// Create an empty sheet.
    pub fn new(init: SheetInit) -> Rc<Self> {
        let base_url = init.base_url.or_else(|| init.href.clone());
        Rc::new_cyclic(|me: &Weak<CssStyleSheet>| Self {
            href: init.href,
            base_url,
            owner_node: init.owner_node,
            owner_rule: RefCell::new(Weak::new()),
            title: init.title,
            alternate: init.alternate,
            disabled: Cell::new(init.disabled),
            media: Rc::new(MediaList::new()),
            rules: CssRuleList::new(me.clone(), Weak::new()),
            options: init.options,
        })
    }

    /// Always `text/css`.
    pub fn sheet_type(&self) -> &'static str {
        "text/css"
    }

    pub fn href(&self) -> Option<&Url> {
        self.href.as_ref()
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Element that produced this sheet; `None` for the default sheet and
    /// imported sheets.
    pub fn owner_node(&self) -> Option<NodeId> {
        self.owner_node
    }

    /// The `@import` rule that pulled this sheet in.
    pub fn owner_rule(&self) -> Option<Rc<CssRule>> {
        self.owner_rule.borrow().upgrade()
    }

    pub(crate) fn set_owner_rule(&self, rule: &Rc<CssRule>) {
        *self.owner_rule.borrow_mut() = Rc::downgrade(rule);
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn is_alternate(&self) -> bool {
        self.alternate
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.get()
    }

    pub fn set_disabled(&self, disabled: bool) {
        if self.disabled.replace(disabled) != disabled {
            debug!(disabled, href = ?self.href.as_ref().map(Url::as_str), "Style sheet toggled");
        }
    }

    pub fn media(&self) -> Rc<MediaList> {
        self.media.clone()
    }

    pub fn css_rules(&self) -> &CssRuleList {
        &self.rules
    }

    /// Parse `text` as one rule and insert it at `index`.
    pub fn insert_rule(&self, text: &str, index: usize) -> DomResult<usize> {
        let ast = parse_rule(text, self.options.parser_options())
            .map_err(|e| DomError::syntax(e.to_string()))?;
        self.rules
            .insert(index, CssRule::from_ast(ast, self.options))?;
        Ok(index)
    }

    /// Remove the rule at `index`.
    pub fn delete_rule(&self, index: usize) -> DomResult<()> {
        self.rules.remove_at(index).map(|_| ())
    }

    /// All rules serialized, one per line.
    pub fn css_text(&self) -> String {
        self.rules
            .rules()
            .iter()
            .map(|rule| rule.css_text())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Resolve `reference` against the sheet's base address.
    pub fn resolve(&self, reference: &str) -> Option<Url> {
        match &self.base_url {
            Some(base) => base.join(reference).ok(),
            None => Url::parse(reference).ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet() -> Rc<CssStyleSheet> {
        CssStyleSheet::new(SheetInit {
            href: Url::parse("https://example.com/css/site.css").ok(),
            ..Default::default()
        })
    }

    #[test]
    fn test_insert_and_delete_rule() {
        let sheet = sheet();
        assert_eq!(sheet.insert_rule("p { color: red }", 0), Ok(0));
        assert_eq!(sheet.insert_rule("@import 'a.css';", 0), Ok(0));
        assert_eq!(sheet.css_rules().len(), 2);

        let rule = sheet.css_rules().item(1).unwrap();
        assert!(Rc::ptr_eq(&rule.parent_style_sheet().unwrap(), &sheet));

        sheet.delete_rule(0).unwrap();
        assert_eq!(sheet.css_text(), "p { color: red; }");
    }

    #[test]
    fn test_insert_rule_syntax_errors() {
        let sheet = sheet();
        assert!(matches!(sheet.insert_rule("", 0), Err(DomError::Syntax(_))));
        assert!(matches!(sheet.insert_rule("p {} a {}", 0), Err(DomError::Syntax(_))));
        assert!(matches!(
            sheet.insert_rule("@charset \"utf-8\";", 0),
            Err(DomError::Syntax(_))
        ));
        assert!(matches!(
            sheet.insert_rule("p {}", 3),
            Err(DomError::IndexSize { index: 3, length: 0 })
        ));
    }

    #[test]
    fn test_nested_rules_reach_sheet() {
        let sheet = sheet();
        sheet
            .insert_rule("@media print { h1 { color: black } }", 0)
            .unwrap();
        let media = sheet.css_rules().item(0).unwrap();
        let h1 = media.css_rules().unwrap().item(0).unwrap();
        assert!(Rc::ptr_eq(&h1.parent_style_sheet().unwrap(), &sheet));
    }

    #[test]
    fn test_resolve_against_href() {
        let sheet = sheet();
        assert_eq!(
            sheet.resolve("../img/a.png").unwrap().as_str(),
            "https://example.com/img/a.png"
        );
    }

    #[test]
    fn test_disabled_flag() {
        let sheet = sheet();
        assert!(!sheet.is_disabled());
        sheet.set_disabled(true);
        sheet.set_disabled(true);
        assert!(sheet.is_disabled());
    }
}

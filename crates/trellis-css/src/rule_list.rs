//! Ordered rule lists with CSS 2.1 ordering checks.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::trace;
use trellis_common::{DomError, DomResult};
use trellis_cssparser::NodeAst;

use crate::rule::{CssRule, CssRuleType};
use crate::sheet::CssStyleSheet;
use crate::CssParserOptions;

#[derive(Debug)]
enum CssChild {
    Rule(Rc<CssRule>),
    Comment(String),
}

impl CssChild {
    fn rule(&self) -> Option<&Rc<CssRule>> {
        match self {
            CssChild::Rule(rule) => Some(rule),
            CssChild::Comment(_) => None,
        }
    }
}

/// Rules of a style sheet or grouping rule.
///
/// The list owns its children, which may include comments; every query
/// re-derives rule positions by filtering the children, so indices always
/// count rules only.
#[derive(Debug)]
pub struct CssRuleList {
    children: RefCell<Vec<CssChild>>,
    owner_sheet: Weak<CssStyleSheet>,
    owner_rule: Weak<CssRule>,
}

impl CssRuleList {
    pub(crate) fn new(owner_sheet: Weak<CssStyleSheet>, owner_rule: Weak<CssRule>) -> Self {
        Self {
            children: RefCell::new(Vec::new()),
            owner_sheet,
            owner_rule,
        }
    }

    /// Append parsed nodes in order. The parser is trusted to have produced
    /// a valid order.
    pub(crate) fn populate(&self, nodes: Vec<NodeAst>, options: CssParserOptions) {
        for node in nodes {
            match node {
                NodeAst::Rule(ast) => self.append(CssRule::from_ast(ast, options)),
                NodeAst::Comment(text) => self.children.borrow_mut().push(CssChild::Comment(text)),
            }
        }
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.children
            .borrow()
            .iter()
            .filter(|c| c.rule().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rule at `index`, or `None` when out of range.
    pub fn item(&self, index: usize) -> Option<Rc<CssRule>> {
        self.children
            .borrow()
            .iter()
            .filter_map(CssChild::rule)
            .nth(index)
            .cloned()
    }

    /// Snapshot of the rules in order.
    pub fn rules(&self) -> Vec<Rc<CssRule>> {
        self.children
            .borrow()
            .iter()
            .filter_map(CssChild::rule)
            .cloned()
            .collect()
    }

    /// Comments kept between rules.
    pub fn comments(&self) -> Vec<String> {
        self.children
            .borrow()
            .iter()
            .filter_map(|c| match c {
                CssChild::Comment(text) => Some(text.clone()),
                CssChild::Rule(_) => None,
            })
            .collect()
    }

    /// Whether any rule other than `@import`/`@charset`/`@namespace` exists.
    pub fn has_declarative_rules(&self) -> bool {
        self.children
            .borrow()
            .iter()
            .filter_map(CssChild::rule)
            .any(|r| r.is_declarative())
    }

    /// Child position of the rule at `index`; `index == len` maps to the end.
    fn child_position(&self, index: usize) -> Option<usize> {
        let children = self.children.borrow();
        let mut seen = 0;
        for (position, child) in children.iter().enumerate() {
            if child.rule().is_some() {
                if seen == index {
                    return Some(position);
                }
                seen += 1;
            }
        }
        (seen == index).then_some(children.len())
    }

    /// Append without ordering checks.
    pub fn append(&self, rule: Rc<CssRule>) {
        rule.attach(self.owner_sheet.clone(), self.owner_rule.clone());
        self.children.borrow_mut().push(CssChild::Rule(rule));
    }

    /// Insert `rule` so that it ends up at `index`.
    ///
    /// Fails with `Syntax` for `@charset`, with `InvalidState` for
    /// `@namespace` once declarative rules exist, and with `IndexSize` when
    /// `index` is past the end.
    pub fn insert(&self, index: usize, rule: Rc<CssRule>) -> DomResult<()> {
        match rule.rule_type() {
            CssRuleType::Charset => {
                return Err(DomError::syntax("@charset rules cannot be inserted"));
            }
            CssRuleType::Namespace if self.has_declarative_rules() => {
                return Err(DomError::invalid_state(
                    "@namespace rules cannot be inserted after declarative rules",
                ));
            }
            _ => {}
        }
        let length = self.len();
        let position = self
            .child_position(index)
            .ok_or(DomError::IndexSize { index, length })?;

        trace!(index, rule_type = ?rule.rule_type(), "Inserting rule");
        rule.attach(self.owner_sheet.clone(), self.owner_rule.clone());
        self.children
            .borrow_mut()
            .insert(position, CssChild::Rule(rule));
        Ok(())
    }

    /// Remove and return the rule at `index`.
    ///
    /// Fails with `IndexSize` when out of range, `Syntax` for `@charset` and
    /// `InvalidState` for `@namespace` while declarative rules exist.
    pub fn remove_at(&self, index: usize) -> DomResult<Rc<CssRule>> {
        let length = self.len();
        let rule = self.item(index).ok_or(DomError::IndexSize { index, length })?;
        match rule.rule_type() {
            CssRuleType::Charset => {
                return Err(DomError::syntax("@charset rules cannot be removed"));
            }
            CssRuleType::Namespace if self.has_declarative_rules() => {
                return Err(DomError::invalid_state(
                    "@namespace rules cannot be removed while declarative rules exist",
                ));
            }
            _ => {}
        }

        trace!(index, rule_type = ?rule.rule_type(), "Removing rule");
        self.children.borrow_mut().retain(|child| match child {
            CssChild::Rule(r) => !Rc::ptr_eq(r, &rule),
            CssChild::Comment(_) => true,
        });
        rule.detach();
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_cssparser::{parse_rule, ParserOptions};

    fn rule(text: &str) -> Rc<CssRule> {
        CssRule::from_ast(
            parse_rule(text, ParserOptions::default()).unwrap(),
            CssParserOptions::default(),
        )
    }

    fn list() -> CssRuleList {
        CssRuleList::new(Weak::new(), Weak::new())
    }

    #[test]
    fn test_namespace_after_declarative_is_invalid_state() {
        let rules = list();
        rules.insert(0, rule("@import 'a.css';")).unwrap();
        rules.insert(1, rule("@namespace url(x);")).unwrap();
        rules.insert(0, rule("p { color: red }")).unwrap();
        assert_eq!(rules.len(), 3);

        let err = rules.insert(3, rule("@namespace y url(y);")).unwrap_err();
        assert!(matches!(err, DomError::InvalidState(_)));
        assert_eq!(rules.len(), 3);
    }

    #[test]
    fn test_insert_index_bounds() {
        let rules = list();
        let err = rules.insert(1, rule("p{}")).unwrap_err();
        assert_eq!(err, DomError::IndexSize { index: 1, length: 0 });

        rules.insert(0, rule("a{}")).unwrap();
        rules.insert(1, rule("b{}")).unwrap();
        assert_eq!(rules.item(1).unwrap().as_style().unwrap().selector_text(), "b");
        assert!(rules.item(2).is_none());
    }

    #[test]
    fn test_charset_rejected_before_index_check() {
        let rules = list();
        let err = rules.insert(5, rule("@charset \"utf-8\";")).unwrap_err();
        assert!(matches!(err, DomError::Syntax(_)));
    }

    #[test]
    fn test_remove_at() {
        let rules = list();
        rules.append(rule("@namespace url(x);"));
        rules.append(rule("p{}"));

        assert!(matches!(rules.remove_at(2), Err(DomError::IndexSize { .. })));
        assert!(matches!(rules.remove_at(0), Err(DomError::InvalidState(_))));

        let removed = rules.remove_at(1).unwrap();
        assert!(removed.parent_style_sheet().is_none());
        rules.remove_at(0).unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn test_indices_skip_comments() {
        let rules = list();
        rules.populate(
            vec![
                NodeAst::Comment("one".into()),
                NodeAst::Rule(parse_rule("a{}", ParserOptions::default()).unwrap()),
                NodeAst::Comment("two".into()),
            ],
            CssParserOptions::default(),
        );
        rules.insert(1, rule("b{}")).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules.comments(), vec!["one", "two"]);
        assert_eq!(rules.item(1).unwrap().as_style().unwrap().selector_text(), "b");
    }
}

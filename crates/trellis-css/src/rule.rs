//! CSS rules.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use trellis_cssparser::{NodeAst, RuleAst};

use crate::declaration::CssStyleDeclaration;
use crate::media::MediaList;
use crate::rule_list::CssRuleList;
use crate::sheet::CssStyleSheet;
use crate::CssParserOptions;

/// Rule discriminant, numbered like the CSSOM `CSSRule.type` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CssRuleType {
    Unknown = 0,
    Style = 1,
    Charset = 2,
    Import = 3,
    Media = 4,
    FontFace = 5,
    Page = 6,
    Namespace = 10,
    Supports = 12,
}

impl CssRuleType {
    /// Numeric CSSOM type code.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Declarative rules are everything except `@charset`, `@import` and
    /// `@namespace`.
    pub fn is_declarative(self) -> bool {
        !matches!(
            self,
            CssRuleType::Charset | CssRuleType::Import | CssRuleType::Namespace
        )
    }
}

/// `selector { declarations }`
#[derive(Debug)]
pub struct StyleRule {
    selector_text: RefCell<String>,
    style: Rc<CssStyleDeclaration>,
}

impl StyleRule {
    pub fn selector_text(&self) -> String {
        self.selector_text.borrow().clone()
    }

    /// Replace the selector. Blank selectors are ignored.
    pub fn set_selector_text(&self, selector: &str) {
        let selector = selector.split_whitespace().collect::<Vec<_>>().join(" ");
        if !selector.is_empty() {
            *self.selector_text.borrow_mut() = selector;
        }
    }

    pub fn style(&self) -> Rc<CssStyleDeclaration> {
        self.style.clone()
    }
}

/// `@import url(...) media;`
#[derive(Debug)]
pub struct ImportRule {
    href: String,
    media: Rc<MediaList>,
    sheet: RefCell<Option<Rc<CssStyleSheet>>>,
}

impl ImportRule {
    /// The address as written in the rule.
    pub fn href(&self) -> &str {
        &self.href
    }

    pub fn media(&self) -> Rc<MediaList> {
        self.media.clone()
    }

    /// The imported sheet, once it has been fetched and parsed.
    pub fn style_sheet(&self) -> Option<Rc<CssStyleSheet>> {
        self.sheet.borrow().clone()
    }

    pub(crate) fn set_style_sheet(&self, sheet: Rc<CssStyleSheet>) {
        *self.sheet.borrow_mut() = Some(sheet);
    }
}

/// `@media` and `@supports`: a condition around nested rules.
#[derive(Debug)]
pub struct GroupingRule {
    condition: GroupCondition,
    rules: CssRuleList,
}

#[derive(Debug)]
enum GroupCondition {
    Media(Rc<MediaList>),
    Supports(String),
}

impl GroupingRule {
    /// Media list for `@media`; `None` for `@supports`.
    pub fn media(&self) -> Option<Rc<MediaList>> {
        match &self.condition {
            GroupCondition::Media(media) => Some(media.clone()),
            GroupCondition::Supports(_) => None,
        }
    }

    /// Condition text: the media list, or the `@supports` condition.
    pub fn condition_text(&self) -> String {
        match &self.condition {
            GroupCondition::Media(media) => media.media_text(),
            GroupCondition::Supports(condition) => condition.clone(),
        }
    }

    pub fn css_rules(&self) -> &CssRuleList {
        &self.rules
    }
}

/// Rule payload.
#[derive(Debug)]
pub enum CssRuleKind {
    Style(StyleRule),
    Charset {
        encoding: String,
    },
    Import(ImportRule),
    Namespace {
        prefix: Option<String>,
        uri: String,
    },
    Media(GroupingRule),
    Supports(GroupingRule),
    FontFace(Rc<CssStyleDeclaration>),
    Page {
        selector: String,
        style: Rc<CssStyleDeclaration>,
    },
    Unknown {
        name: String,
        prelude: String,
        block: Option<String>,
    },
}

/// A rule in a style sheet or in a grouping rule.
#[derive(Debug)]
pub struct CssRule {
    kind: CssRuleKind,
    parent_rule: RefCell<Weak<CssRule>>,
    parent_sheet: RefCell<Weak<CssStyleSheet>>,
}

impl CssRule {
    fn bare(kind: CssRuleKind) -> Self {
        Self {
            kind,
            parent_rule: RefCell::new(Weak::new()),
            parent_sheet: RefCell::new(Weak::new()),
        }
    }

    /// Build a detached rule from its AST.
    pub fn from_ast(ast: RuleAst, options: CssParserOptions) -> Rc<CssRule> {
        let kind = match ast {
            RuleAst::Style {
                selector,
                declarations,
            } => CssRuleKind::Style(StyleRule {
                selector_text: RefCell::new(selector),
                style: Rc::new(CssStyleDeclaration::from_ast(declarations, options)),
            }),
            RuleAst::Charset { encoding } => CssRuleKind::Charset { encoding },
            RuleAst::Import { href, media } => CssRuleKind::Import(ImportRule {
                href,
                media: Rc::new(MediaList::from_queries(media)),
                sheet: RefCell::new(None),
            }),
            RuleAst::Namespace { prefix, uri } => CssRuleKind::Namespace { prefix, uri },
            RuleAst::Media { media, rules } => {
                let condition = GroupCondition::Media(Rc::new(MediaList::from_queries(media)));
                return Self::grouping(condition, rules, options);
            }
            RuleAst::Supports { condition, rules } => {
                return Self::grouping(GroupCondition::Supports(condition), rules, options);
            }
            RuleAst::FontFace { declarations } => CssRuleKind::FontFace(Rc::new(
                CssStyleDeclaration::from_ast(declarations, options),
            )),
            RuleAst::Page {
                selector,
                declarations,
            } => CssRuleKind::Page {
                selector,
                style: Rc::new(CssStyleDeclaration::from_ast(declarations, options)),
            },
            RuleAst::Unknown {
                name,
                prelude,
                block,
            } => CssRuleKind::Unknown {
                name,
                prelude,
                block,
            },
        };
        Rc::new(Self::bare(kind))
    }

    fn grouping(
        condition: GroupCondition,
        children: Vec<NodeAst>,
        options: CssParserOptions,
    ) -> Rc<CssRule> {
        let is_media = matches!(condition, GroupCondition::Media(_));
        let rule = Rc::new_cyclic(|me: &Weak<CssRule>| {
            let group = GroupingRule {
                condition,
                rules: CssRuleList::new(Weak::new(), me.clone()),
            };
            Self::bare(if is_media {
                CssRuleKind::Media(group)
            } else {
                CssRuleKind::Supports(group)
            })
        });
        if let Some(list) = rule.css_rules() {
            list.populate(children, options);
        }
        rule
    }

    pub fn kind(&self) -> &CssRuleKind {
        &self.kind
    }

    pub fn rule_type(&self) -> CssRuleType {
        match &self.kind {
            CssRuleKind::Style(_) => CssRuleType::Style,
            CssRuleKind::Charset { .. } => CssRuleType::Charset,
            CssRuleKind::Import(_) => CssRuleType::Import,
            CssRuleKind::Namespace { .. } => CssRuleType::Namespace,
            CssRuleKind::Media(_) => CssRuleType::Media,
            CssRuleKind::Supports(_) => CssRuleType::Supports,
            CssRuleKind::FontFace(_) => CssRuleType::FontFace,
            CssRuleKind::Page { .. } => CssRuleType::Page,
            CssRuleKind::Unknown { .. } => CssRuleType::Unknown,
        }
    }

    pub fn is_declarative(&self) -> bool {
        self.rule_type().is_declarative()
    }

    pub fn as_style(&self) -> Option<&StyleRule> {
        match &self.kind {
            CssRuleKind::Style(rule) => Some(rule),
            _ => None,
        }
    }

    pub fn as_import(&self) -> Option<&ImportRule> {
        match &self.kind {
            CssRuleKind::Import(rule) => Some(rule),
            _ => None,
        }
    }

    pub fn as_grouping(&self) -> Option<&GroupingRule> {
        match &self.kind {
            CssRuleKind::Media(rule) | CssRuleKind::Supports(rule) => Some(rule),
            _ => None,
        }
    }

    /// Nested rules of a grouping rule.
    pub fn css_rules(&self) -> Option<&CssRuleList> {
        self.as_grouping().map(GroupingRule::css_rules)
    }

    /// The grouping rule containing this rule.
    pub fn parent_rule(&self) -> Option<Rc<CssRule>> {
        self.parent_rule.borrow().upgrade()
    }

    /// The sheet containing this rule, directly or through grouping rules.
    pub fn parent_style_sheet(&self) -> Option<Rc<CssStyleSheet>> {
        if let Some(sheet) = self.parent_sheet.borrow().upgrade() {
            return Some(sheet);
        }
        self.parent_rule()
            .and_then(|parent| parent.parent_style_sheet())
    }

    pub(crate) fn attach(&self, sheet: Weak<CssStyleSheet>, rule: Weak<CssRule>) {
        *self.parent_sheet.borrow_mut() = sheet;
        *self.parent_rule.borrow_mut() = rule;
    }

    pub(crate) fn detach(&self) {
        self.attach(Weak::new(), Weak::new());
    }

    /// Serialized rule.
    pub fn css_text(&self) -> String {
        match &self.kind {
            CssRuleKind::Style(rule) => block(&rule.selector_text(), &rule.style.css_text()),
            CssRuleKind::Charset { encoding } => format!("@charset \"{}\";", encoding),
            CssRuleKind::Import(rule) => {
                let media = rule.media.media_text();
                if media.is_empty() {
                    format!("@import url(\"{}\");", rule.href)
                } else {
                    format!("@import url(\"{}\") {};", rule.href, media)
                }
            }
            CssRuleKind::Namespace { prefix, uri } => match prefix {
                Some(prefix) => format!("@namespace {} url(\"{}\");", prefix, uri),
                None => format!("@namespace url(\"{}\");", uri),
            },
            CssRuleKind::Media(group) => grouping_text("@media", group),
            CssRuleKind::Supports(group) => grouping_text("@supports", group),
            CssRuleKind::FontFace(style) => block("@font-face", &style.css_text()),
            CssRuleKind::Page { selector, style } => {
                let head = if selector.is_empty() {
                    "@page".to_string()
                } else {
                    format!("@page {}", selector)
                };
                block(&head, &style.css_text())
            }
            CssRuleKind::Unknown {
                name,
                prelude,
                block: body,
            } => {
                let head = if prelude.is_empty() {
                    format!("@{}", name)
                } else {
                    format!("@{} {}", name, prelude)
                };
                match body {
                    Some(body) => format!("{} {{ {} }}", head, body),
                    None => format!("{};", head),
                }
            }
        }
    }
}

fn block(head: &str, body: &str) -> String {
    if body.is_empty() {
        format!("{} {{ }}", head)
    } else {
        format!("{} {{ {}; }}", head, body)
    }
}

fn grouping_text(keyword: &str, group: &GroupingRule) -> String {
    let inner = group
        .rules
        .rules()
        .iter()
        .map(|rule| rule.css_text())
        .collect::<Vec<_>>()
        .join(" ");
    let condition = group.condition_text();
    let head = if condition.is_empty() {
        keyword.to_string()
    } else {
        format!("{} {}", keyword, condition)
    };
    if inner.is_empty() {
        format!("{} {{ }}", head)
    } else {
        format!("{} {{ {} }}", head, inner)
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

    #[test]
    fn test_rule_types() {
        assert_eq!(rule("p { color: red }").rule_type(), CssRuleType::Style);
        assert_eq!(rule("@import 'a.css';").rule_type().code(), 3);
        assert_eq!(rule("@namespace url(x);").rule_type().code(), 10);
        assert!(!rule("@charset \"utf-8\";").is_declarative());
        assert!(rule("@media print { }").is_declarative());
    }

    #[test]
    fn test_css_text() {
        assert_eq!(rule("p{color:red}").css_text(), "p { color: red; }");
        assert_eq!(rule("p{}").css_text(), "p { }");
        assert_eq!(
            rule("@import url(a.css) screen;").css_text(),
            "@import url(\"a.css\") screen;"
        );
        assert_eq!(
            rule("@namespace svg 'http://www.w3.org/2000/svg';").css_text(),
            "@namespace svg url(\"http://www.w3.org/2000/svg\");"
        );
        assert_eq!(
            rule("@media print { h1 { color: black } }").css_text(),
            "@media print { h1 { color: black; } }"
        );
    }

    #[test]
    fn test_nested_rules_know_their_parent() {
        let media = rule("@media screen { p { color: red } a { color: blue } }");
        let nested = media.css_rules().unwrap();
        assert_eq!(nested.len(), 2);
        let first = nested.item(0).unwrap();
        assert!(Rc::ptr_eq(&first.parent_rule().unwrap(), &media));
        assert!(first.parent_style_sheet().is_none());
    }

    #[test]
    fn test_selector_text_update() {
        let r = rule("p { color: red }");
        let style = r.as_style().unwrap();
        style.set_selector_text("  div   >  p ");
        assert_eq!(style.selector_text(), "div > p");
        style.set_selector_text("   ");
        assert_eq!(style.selector_text(), "div > p");
    }
}

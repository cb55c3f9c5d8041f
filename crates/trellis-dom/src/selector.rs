//! A small selector matcher: comma-separated lists of compound selectors
//! built from type, universal, id and class selectors.

use std::rc::Rc;

use crate::config::SelectorMatcher;
use crate::node::Node;

/// Built-in [`SelectorMatcher`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleSelectorMatcher;

impl SelectorMatcher for SimpleSelectorMatcher {
    fn matches(&self, element: &Rc<Node>, selector: &str) -> Option<bool> {
        let list = parse_list(selector)?;
        Some(list.iter().any(|compound| compound.matches(element)))
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

fn parse_list(selector: &str) -> Option<Vec<Compound>> {
    selector
        .split(',')
        .map(|part| parse_compound(part.trim()))
        .collect()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

fn take_ident(text: &str) -> Option<(&str, &str)> {
    let end = text
        .char_indices()
        .find(|(_, c)| !is_ident_char(*c))
        .map_or(text.len(), |(i, _)| i);
    if end == 0 {
        return None;
    }
    Some(text.split_at(end))
}

fn parse_compound(text: &str) -> Option<Compound> {
    if text.is_empty() {
        return None;
    }
    let mut compound = Compound::default();
    let mut rest = text;
    if let Some(after) = rest.strip_prefix('*') {
        rest = after;
    } else if rest.starts_with(is_ident_char) {
        let (tag, after) = take_ident(rest)?;
        compound.tag = Some(tag.to_string());
        rest = after;
    }
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('#') {
            let (id, after) = take_ident(after)?;
            compound.id = Some(id.to_string());
            rest = after;
        } else if let Some(after) = rest.strip_prefix('.') {
            let (class, after) = take_ident(after)?;
            compound.classes.push(class.to_string());
            rest = after;
        } else {
            return None;
        }
    }
    Some(compound)
}

impl Compound {
    fn matches(&self, element: &Node) -> bool {
        let Some(data) = element.as_element() else {
            return false;
        };
        if let Some(tag) = &self.tag {
            let name = data.qualified_name();
            let same = if data.is_html() {
                name.eq_ignore_ascii_case(tag)
            } else {
                &name == tag
            };
            if !same {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.get_attribute("id").as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        let classes = element.class_name();
        let have: Vec<&str> = classes.split_ascii_whitespace().collect();
        self.classes.iter().all(|c| have.contains(&c.as_str()))
    }
}

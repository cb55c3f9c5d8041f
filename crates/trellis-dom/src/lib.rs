//! # Trellis DOM
//!
//! Document tree for the Trellis engine, bound to the CSS Object Model.
//! Uses html5ever for HTML parsing and keeps derived objects (class lists,
//! inline styles, style sheets) in step with the attributes they come from.
//!
//! ## Design Goals
//!
//! 1. **Owned children, weak parents**: a parent owns its children; parent
//!    links, owner documents and shadow hosts are back-references
//! 2. **Two-way attribute views**: `class_list()` and `style()` re-serialize
//!    into their attribute and re-parse when it is written, without feedback
//!    loops
//! 3. **Element behaviors**: per-tag hooks (such as `<style>`) run after tree
//!    insertion, removal and child changes
//! 4. **Mutation records**: attribute and child-list changes are queued on
//!    the document for an external observer

pub mod attributes;
pub mod config;
pub mod document;
mod element;
pub mod html;
pub mod mutation;
pub mod node;
pub mod selector;
pub mod style_element;
pub mod token_list;

pub use attributes::{is_valid_name, validate_and_extract, Attr, AttributeObserver, AttributeStore};
pub use config::{BehaviorFactory, Configuration, ElementBehavior, SelectorMatcher};
pub use document::{Document, DocumentReadyState};
pub use html::AdjacentPosition;
pub use mutation::MutationRecord;
pub use node::{ElementData, Node, NodeData, NodeType, ShadowRootMode};
pub use selector::SimpleSelectorMatcher;
pub use style_element::{StyleElement, StyleState};
pub use token_list::TokenList;
pub use trellis_common::{DomError, DomResult, NodeId};

pub const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";
pub const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";
pub const MATHML_NAMESPACE: &str = "http://www.w3.org/1998/Math/MathML";
pub const XLINK_NAMESPACE: &str = "http://www.w3.org/1999/xlink";
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn parse(html: &str) -> Document {
        Document::parse_html(html, Configuration::default()).unwrap()
    }

    #[test]
    fn test_parse_simple_html() {
        let html = r#"<!DOCTYPE html>
<html>
<head><title>Test</title></head>
<body><p id="main">Hello, world!</p></body>
</html>"#;

        let doc = parse(html);

        assert!(doc.document_element().is_some());
        assert!(doc.head().is_some());
        assert!(doc.body().is_some());
        assert_eq!(doc.title(), Some("Test".to_string()));
        assert_eq!(doc.ready_state(), DocumentReadyState::Interactive);

        let main = doc.get_element_by_id("main").unwrap();
        assert_eq!(main.local_name(), Some("p"));
        assert_eq!(main.node_name(), "P");
        assert_eq!(main.text_content(), "Hello, world!");
        assert!(main.is_connected());
        assert!(doc.take_mutation_records().is_empty());
    }

    #[test]
    fn test_query_selector() {
        let html = r#"<html>
<body>
    <div class="container">
        <p id="first">First</p>
        <p class="highlight">Second</p>
        <span class="highlight">Third</span>
    </div>
</body>
</html>"#;

        let doc = parse(html);

        let by_id = doc.query_selector_all("#first").unwrap();
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].text_content(), "First");

        assert_eq!(doc.query_selector_all(".highlight").unwrap().len(), 2);
        assert_eq!(doc.query_selector_all("p").unwrap().len(), 2);
        assert_eq!(doc.query_selector_all("p.highlight").unwrap().len(), 1);
        assert_eq!(doc.query_selector_all("span, #first").unwrap().len(), 2);
        assert_eq!(doc.get_elements_by_class_name("highlight").len(), 2);
        assert_eq!(doc.get_elements_by_tag_name("P").len(), 2);
        assert!(matches!(doc.query_selector("p::"), Err(DomError::Syntax(_))));
    }

    #[test]
    fn test_traversal() {
        let doc = parse("<html><head></head><body><div><p>Text</p></div></body></html>");

        let mut count = 0;
        doc.traverse(|_| count += 1);
        // document, html, head, body, div, p, text
        assert_eq!(count, 7);
    }

    #[test]
    fn test_node_relationships() {
        let doc = parse("<html><body><p>A</p><p>B</p><p>C</p></body></html>");

        let body = doc.body().unwrap();
        let paragraphs = body.element_children();
        assert_eq!(paragraphs.len(), 3);
        assert_eq!(body.child_element_count(), 3);

        let second = &paragraphs[1];
        assert_eq!(
            second.previous_element_sibling().map(|n| n.text_content()),
            Some("A".to_string())
        );
        assert_eq!(
            second.next_element_sibling().map(|n| n.text_content()),
            Some("C".to_string())
        );
        assert!(paragraphs[0].previous_element_sibling().is_none());
        assert!(Rc::ptr_eq(&body.first_element_child().unwrap(), &paragraphs[0]));
        assert!(Rc::ptr_eq(&body.last_element_child().unwrap(), &paragraphs[2]));
        assert_eq!(second.index(), Some(1));
        assert!(body.contains(second));
        assert!(!second.contains(&body));
    }

    #[test]
    fn test_serialization() {
        let doc = parse(
            r#"<html><body><div id="x" title="a&quot;b"><br><style>p > a { }</style>1 &lt; 2</div></body></html>"#,
        );
        let div = doc.get_element_by_id("x").unwrap();
        assert_eq!(
            div.outer_html(),
            r#"<div id="x" title="a&quot;b"><br><style>p > a { }</style>1 &lt; 2</div>"#
        );
    }
}

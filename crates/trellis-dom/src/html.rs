//! HTML parsing (html5ever) and serialization.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use html5ever::tendril::TendrilSink;
use html5ever::{parse_document, parse_fragment, LocalName, Namespace, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, NodeData as RcNodeData, RcDom};
use tracing::debug;
use trellis_common::{DomError, DomResult};

use crate::attributes::Attr;
use crate::document::DocumentState;
use crate::node::{ElementData, Node, NodeData};
use crate::HTML_NAMESPACE;

/// Elements without an end tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "basefont", "bgsound", "br", "col", "embed", "frame", "hr", "img", "input",
    "keygen", "link", "meta", "param", "source", "track", "wbr",
];

/// Elements whose text children are written unescaped.
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "iframe", "noembed", "noframes", "noscript", "plaintext", "script", "style", "xmp",
];

/// Parse a full document into `root` without records or hooks.
pub(crate) fn parse_into(owner: &Weak<DocumentState>, root: &Rc<Node>, html: &str) -> DomResult<()> {
    let dom = parse_document(RcDom::default(), ParseOpts::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())
        .map_err(|e| DomError::syntax(e.to_string()))?;
    for child in dom.document.children.borrow().iter() {
        if let Some(node) = convert(owner, child) {
            root.append_raw(node);
        }
    }
    Ok(())
}

/// Parse `html` as the content of `context`, returning detached nodes.
pub(crate) fn parse_fragment_nodes(
    owner: &Weak<DocumentState>,
    context: Option<&Node>,
    html: &str,
) -> DomResult<Vec<Rc<Node>>> {
    let (namespace, local_name) = match context.and_then(Node::as_element) {
        Some(data) => (
            data.namespace().unwrap_or(HTML_NAMESPACE).to_string(),
            data.local_name().to_string(),
        ),
        None => (HTML_NAMESPACE.to_string(), "body".to_string()),
    };
    let context_name = QualName::new(
        None,
        Namespace::from(namespace.as_str()),
        LocalName::from(local_name.as_str()),
    );
    let dom = parse_fragment(RcDom::default(), ParseOpts::default(), context_name, Vec::new())
        .from_utf8()
        .read_from(&mut html.as_bytes())
        .map_err(|e| DomError::syntax(e.to_string()))?;

    // The fragment parser wraps its output in a synthetic <html> element.
    let holder = dom.document.children.borrow().first().cloned();
    let Some(holder) = holder else {
        return Ok(Vec::new());
    };
    let nodes: Vec<Rc<Node>> = holder
        .children
        .borrow()
        .iter()
        .filter_map(|child| convert(owner, child))
        .collect();
    debug!(len = html.len(), nodes = nodes.len(), context = %local_name, "Parsed fragment");
    Ok(nodes)
}

fn convert(owner: &Weak<DocumentState>, handle: &Handle) -> Option<Rc<Node>> {
    let data = match &handle.data {
        RcNodeData::Document => return None,
        RcNodeData::Doctype {
            name,
            public_id,
            system_id,
        } => NodeData::Doctype {
            name: name.to_string(),
            public_id: public_id.to_string(),
            system_id: system_id.to_string(),
        },
        RcNodeData::Element { name, attrs, .. } => {
            let prefix = name.prefix.as_ref().map(|p| p.to_string());
            let element = ElementData::new(Some(&*name.ns), prefix.as_deref(), &name.local);
            for attr in attrs.borrow().iter() {
                element.attributes.push_raw(Attr {
                    namespace: (!attr.name.ns.is_empty()).then(|| attr.name.ns.to_string()),
                    prefix: attr.name.prefix.as_ref().map(|p| p.to_string()),
                    local_name: attr.name.local.to_string(),
                    value: attr.value.to_string(),
                });
            }
            NodeData::Element(element)
        }
        RcNodeData::Text { contents } => NodeData::Text(RefCell::new(contents.borrow().to_string())),
        RcNodeData::Comment { contents } => NodeData::Comment(RefCell::new(contents.to_string())),
        RcNodeData::ProcessingInstruction { target, contents } => {
            NodeData::ProcessingInstruction {
                target: target.to_string(),
                data: RefCell::new(contents.to_string()),
            }
        }
    };

    let node = Node::new(owner, data);
    for child in handle.children.borrow().iter() {
        if let Some(converted) = convert(owner, child) {
            node.append_raw(converted);
        }
    }
    // Template contents are kept as ordinary children.
    if let RcNodeData::Element {
        template_contents, ..
    } = &handle.data
    {
        if let Some(contents) = template_contents.borrow().as_ref() {
            for child in contents.children.borrow().iter() {
                if let Some(converted) = convert(owner, child) {
                    node.append_raw(converted);
                }
            }
        }
    }
    node.install_behavior();
    Some(node)
}

fn escape(text: &str, attribute: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            '"' if attribute => out.push_str("&quot;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}

fn in_raw_text_element(node: &Node) -> bool {
    node.parent()
        .and_then(|parent| {
            parent
                .as_element()
                .map(|e| e.is_html() && RAW_TEXT_ELEMENTS.contains(&e.local_name()))
        })
        .unwrap_or(false)
}

fn serialize(node: &Node, out: &mut String) {
    match node.data() {
        NodeData::Element(element) => {
            let tag = if element.is_html() {
                element.local_name().to_string()
            } else {
                element.qualified_name()
            };
            out.push('<');
            out.push_str(&tag);
            for attr in element.attributes.to_vec() {
                out.push(' ');
                out.push_str(&attr.name());
                out.push_str("=\"");
                escape(&attr.value, true, out);
                out.push('"');
            }
            out.push('>');
            if element.is_html() && VOID_ELEMENTS.contains(&element.local_name()) {
                return;
            }
            serialize_children(node, out);
            out.push_str("</");
            out.push_str(&tag);
            out.push('>');
        }
        NodeData::Text(text) => {
            if in_raw_text_element(node) {
                out.push_str(&text.borrow());
            } else {
                escape(&text.borrow(), false, out);
            }
        }
        NodeData::Comment(text) => {
            out.push_str("<!--");
            out.push_str(&text.borrow());
            out.push_str("-->");
        }
        NodeData::ProcessingInstruction { target, data } => {
            out.push_str("<?");
            out.push_str(target);
            out.push(' ');
            out.push_str(&data.borrow());
            out.push('>');
        }
        NodeData::Doctype { name, .. } => {
            out.push_str("<!DOCTYPE ");
            out.push_str(name);
            out.push('>');
        }
        NodeData::Document | NodeData::Fragment | NodeData::ShadowRoot { .. } => {
            serialize_children(node, out);
        }
    }
}

fn serialize_children(node: &Node, out: &mut String) {
    for child in node.children() {
        serialize(&child, out);
    }
}

/// Where [`Node::insert_adjacent_html`] puts the parsed nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjacentPosition {
    BeforeBegin,
    AfterBegin,
    BeforeEnd,
    AfterEnd,
}

impl std::str::FromStr for AdjacentPosition {
    type Err = DomError;

    fn from_str(position: &str) -> Result<Self, Self::Err> {
        match position.to_ascii_lowercase().as_str() {
            "beforebegin" => Ok(Self::BeforeBegin),
            "afterbegin" => Ok(Self::AfterBegin),
            "beforeend" => Ok(Self::BeforeEnd),
            "afterend" => Ok(Self::AfterEnd),
            _ => Err(DomError::syntax(format!("invalid position '{}'", position))),
        }
    }
}

impl Node {
    /// Markup of the children.
    pub fn inner_html(&self) -> String {
        let mut out = String::new();
        serialize_children(self, &mut out);
        out
    }

    /// Markup of the node itself.
    pub fn outer_html(&self) -> String {
        let mut out = String::new();
        serialize(self, &mut out);
        out
    }

    fn fragment_from_html(&self, context: Option<&Node>, html: &str) -> DomResult<Rc<Node>> {
        let owner = self.owner_weak();
        let fragment = Node::new(&owner, NodeData::Fragment);
        for node in parse_fragment_nodes(&owner, context, html)? {
            fragment.append_raw(node);
        }
        Ok(fragment)
    }

    /// Replace the children with the parsed `html`.
    pub fn set_inner_html(self: &Rc<Self>, html: &str) -> DomResult<()> {
        let fragment = self.fragment_from_html(Some(self), html)?;
        self.replace_all(Some(fragment));
        Ok(())
    }

    /// Replace this node with the parsed `html`.
    pub fn set_outer_html(self: &Rc<Self>, html: &str) -> DomResult<()> {
        let parent = self
            .parent()
            .ok_or_else(|| DomError::not_supported("node has no parent"))?;
        if matches!(parent.data(), NodeData::Document) {
            return Err(DomError::NoModificationAllowed(
                "cannot replace the document element".to_string(),
            ));
        }
        let fragment = self.fragment_from_html(Some(&parent), html)?;
        parent.replace_child(fragment, self).map(|_| ())
    }

    /// Parse `html` and insert it relative to this element.
    pub fn insert_adjacent_html(self: &Rc<Self>, position: &str, html: &str) -> DomResult<()> {
        let position: AdjacentPosition = position.parse()?;
        match position {
            AdjacentPosition::BeforeBegin | AdjacentPosition::AfterEnd => {
                let parent = self
                    .parent()
                    .filter(|p| !matches!(p.data(), NodeData::Document))
                    .ok_or_else(|| {
                        DomError::NoModificationAllowed("node has no element parent".to_string())
                    })?;
                let fragment = self.fragment_from_html(Some(&parent), html)?;
                let reference = match position {
                    AdjacentPosition::BeforeBegin => Some(self.clone()),
                    _ => self.next_sibling(),
                };
                parent.insert_before(fragment, reference.as_ref()).map(|_| ())
            }
            AdjacentPosition::AfterBegin => {
                let fragment = self.fragment_from_html(Some(self), html)?;
                let first = self.first_child();
                self.insert_before(fragment, first.as_ref()).map(|_| ())
            }
            AdjacentPosition::BeforeEnd => {
                let fragment = self.fragment_from_html(Some(self), html)?;
                self.append_child(fragment).map(|_| ())
            }
        }
    }
}

//! Tree mutation, attributes, shadow roots, markup setters and focus.

use std::rc::Rc;

use trellis_common::{init_logging, LogConfig, RecordingSink};
use trellis_dom::{
    Configuration, Document, DomError, MutationRecord, NodeType, ShadowRootMode, StyleElement,
    StyleState, SVG_NAMESPACE, XLINK_NAMESPACE,
};

fn parse(html: &str) -> Document {
    init_logging(LogConfig::for_tests());
    Document::parse_html(html, Configuration::default()).unwrap()
}

#[test]
fn attributes_set_get_remove() {
    let doc = parse("<html><body><div></div></body></html>");
    let div = doc.query_selector("div").unwrap().unwrap();

    div.set_attribute("Data-Role", "main").unwrap();
    assert_eq!(div.get_attribute("data-role").as_deref(), Some("main"));
    assert_eq!(div.get_attribute("DATA-ROLE").as_deref(), Some("main"));
    assert_eq!(div.attribute_names(), vec!["data-role"]);

    div.set_attribute("data-role", "aside").unwrap();
    div.remove_attribute("data-role");
    assert!(!div.has_attribute("data-role"));

    let records = doc.take_mutation_records();
    let old_values: Vec<Option<String>> = records
        .iter()
        .map(|r| match r {
            MutationRecord::Attributes { old_value, .. } => old_value.clone(),
            other => panic!("unexpected record {:?}", other),
        })
        .collect();
    assert_eq!(
        old_values,
        vec![None, Some("main".to_string()), Some("aside".to_string())]
    );
}

#[test]
fn invalid_names_are_rejected() {
    let doc = parse("<html><body><div></div></body></html>");
    let div = doc.query_selector("div").unwrap().unwrap();

    assert!(matches!(
        div.set_attribute("bad name", "x"),
        Err(DomError::InvalidCharacter(_))
    ));
    assert!(matches!(
        doc.create_element("1div"),
        Err(DomError::InvalidCharacter(_))
    ));
    assert!(matches!(
        div.set_attribute_ns(None, "xlink:href", "#a"),
        Err(DomError::Namespace(_))
    ));
    assert!(doc.take_mutation_records().is_empty());
}

#[test]
fn namespaced_attributes() {
    let doc = parse("<html><body></body></html>");
    let svg = doc.create_element_ns(Some(SVG_NAMESPACE), "svg:use").unwrap();
    assert_eq!(svg.node_name(), "svg:use");

    svg.set_attribute_ns(Some(XLINK_NAMESPACE), "xlink:href", "#icon")
        .unwrap();
    assert_eq!(
        svg.get_attribute_ns(Some(XLINK_NAMESPACE), "href").as_deref(),
        Some("#icon")
    );
    assert_eq!(svg.get_attribute("xlink:href").as_deref(), Some("#icon"));

    svg.remove_attribute_ns(Some(XLINK_NAMESPACE), "href");
    assert!(svg.attributes().is_empty());
}

#[test]
fn toggle_attribute() {
    let doc = parse("<html><body><input></body></html>");
    let input = doc.query_selector("input").unwrap().unwrap();

    assert!(input.toggle_attribute("checked", None).unwrap());
    assert!(input.has_attribute("checked"));
    assert!(input.toggle_attribute("checked", Some(true)).unwrap());
    assert!(!input.toggle_attribute("checked", None).unwrap());
    assert!(!input.toggle_attribute("checked", Some(false)).unwrap());
    assert_eq!(doc.take_mutation_records().len(), 2);
}

#[test]
fn child_list_records() {
    let doc = parse("<html><body><p>a</p></body></html>");
    let body = doc.body().unwrap();
    let first = body.first_child().unwrap();
    let span = doc.create_element("span").unwrap();
    body.append_child(span.clone()).unwrap();

    assert_eq!(
        doc.take_mutation_records(),
        vec![MutationRecord::ChildList {
            target: body.id(),
            added: vec![span.id()],
            removed: vec![],
            previous_sibling: Some(first.id()),
            next_sibling: None,
        }]
    );

    body.remove_child(&first).unwrap();
    let records = doc.take_mutation_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind(), "childList");
    assert!(!first.is_connected());
    assert!(first.parent().is_none());
}

#[test]
fn character_data_records_old_value() {
    let doc = parse("<html><body><p>old</p></body></html>");
    let text = doc.query_selector("p").unwrap().unwrap().first_child().unwrap();
    assert_eq!(text.node_type(), NodeType::Text);
    text.set_character_data("new").unwrap();

    assert_eq!(
        doc.take_mutation_records(),
        vec![MutationRecord::CharacterData {
            target: text.id(),
            old_value: "old".to_string(),
        }]
    );
}

#[test]
fn hierarchy_errors() {
    let doc = parse("<html><body><div><p></p></div></body></html>");
    let div = doc.query_selector("div").unwrap().unwrap();
    let p = doc.query_selector("p").unwrap().unwrap();

    assert!(matches!(
        p.append_child(div.clone()),
        Err(DomError::HierarchyRequest(_))
    ));
    assert!(matches!(
        div.append_child(div.clone()),
        Err(DomError::HierarchyRequest(_))
    ));

    let text = doc.create_text_node("x");
    assert!(matches!(
        text.append_child(doc.create_element("b").unwrap()),
        Err(DomError::HierarchyRequest(_))
    ));
    assert!(matches!(
        doc.root().append_child(doc.create_element("main").unwrap()),
        Err(DomError::HierarchyRequest(_))
    ));
    assert!(matches!(
        doc.root().append_child(doc.create_text_node("loose")),
        Err(DomError::HierarchyRequest(_))
    ));

    let stranger = doc.create_element("i").unwrap();
    assert!(matches!(
        div.insert_before(doc.create_element("b").unwrap(), Some(&stranger)),
        Err(DomError::NotFound(_))
    ));
    assert!(matches!(div.remove_child(&stranger), Err(DomError::NotFound(_))));
}

#[test]
fn fragments_move_their_children() {
    let doc = parse("<html><body><ul><li>1</li></ul></body></html>");
    let ul = doc.query_selector("ul").unwrap().unwrap();
    let fragment = doc.create_document_fragment();
    for n in ["2", "3"] {
        let li = doc.create_element("li").unwrap();
        li.set_text_content(n).unwrap();
        fragment.append_child(li).unwrap();
    }

    ul.append_child(fragment.clone()).unwrap();
    assert!(!fragment.has_children());
    assert_eq!(ul.text_content(), "123");

    let zero = doc.create_element("li").unwrap();
    zero.set_text_content("0").unwrap();
    ul.prepend(vec![zero.clone()]).unwrap();
    zero.after(vec![doc.create_text_node("-")]).unwrap();
    assert_eq!(ul.text_content(), "0-123");
}

#[test]
fn shadow_root_rules() {
    let doc = parse("<html><body><div></div><input></body></html>");
    let div = doc.query_selector("div").unwrap().unwrap();

    let shadow = div.attach_shadow(ShadowRootMode::Open).unwrap();
    assert!(Rc::ptr_eq(&div.shadow_root().unwrap(), &shadow));
    assert!(Rc::ptr_eq(&shadow.host().unwrap(), &div));
    assert!(matches!(
        div.attach_shadow(ShadowRootMode::Closed),
        Err(DomError::InvalidState(_))
    ));

    let input = doc.query_selector("input").unwrap().unwrap();
    assert!(matches!(
        input.attach_shadow(ShadowRootMode::Open),
        Err(DomError::NotSupported(_))
    ));
    let svg = doc.create_element_ns(Some(SVG_NAMESPACE), "svg").unwrap();
    assert!(matches!(
        svg.attach_shadow(ShadowRootMode::Open),
        Err(DomError::NotSupported(_))
    ));

    let inner = doc.create_element("span").unwrap();
    shadow.append_child(inner.clone()).unwrap();
    assert!(inner.is_connected());
    div.remove();
    assert!(!inner.is_connected());
}

#[test]
fn style_in_shadow_tree_builds_when_host_connected() {
    let doc = parse("<html><body><div></div></body></html>");
    let div = doc.query_selector("div").unwrap().unwrap();
    let shadow = div.attach_shadow(ShadowRootMode::Open).unwrap();

    shadow.set_inner_html("<style>p { color: red }</style>").unwrap();
    let style = shadow.first_child().unwrap();
    let behavior = style.behavior::<StyleElement>().unwrap();
    assert_eq!(behavior.state(), StyleState::AttachedWithSheet);
}

#[test]
fn shadow_styles_follow_host_connection() {
    let doc = parse("<html><body></body></html>");
    let host = doc.create_element("div").unwrap();
    let shadow = host.attach_shadow(ShadowRootMode::Open).unwrap();
    shadow.set_inner_html("<style>p { color: red }</style>").unwrap();
    let behavior = shadow
        .first_child()
        .unwrap()
        .behavior::<StyleElement>()
        .unwrap();
    assert_eq!(behavior.state(), StyleState::Unattached);

    doc.body().unwrap().append_child(host.clone()).unwrap();
    assert_eq!(behavior.state(), StyleState::AttachedWithSheet);
    let sheet = behavior.cached_sheet().unwrap();

    host.remove();
    assert!(behavior.cached_sheet().is_none());
    assert_eq!(behavior.state(), StyleState::AttachedNoSheet);
    assert!(!Rc::ptr_eq(&sheet, &behavior.sheet().unwrap()));
}

#[test]
fn shadow_root_moves_with_its_host() {
    let first = parse("<html><body><div></div></body></html>");
    let second = parse("<html><body></body></html>");
    let host = first.query_selector("div").unwrap().unwrap();
    let shadow = host.attach_shadow(ShadowRootMode::Open).unwrap();
    let inner = first.create_element("span").unwrap();
    shadow.append_child(inner.clone()).unwrap();

    second.body().unwrap().append_child(host.clone()).unwrap();
    assert!(Rc::ptr_eq(&host.shadow_root().unwrap(), &shadow));
    assert!(matches!(
        host.attach_shadow(ShadowRootMode::Open),
        Err(DomError::InvalidState(_))
    ));
    assert!(Rc::ptr_eq(shadow.owner_document().unwrap().root(), second.root()));
    assert!(Rc::ptr_eq(inner.owner_document().unwrap().root(), second.root()));
    assert!(inner.is_connected());
}

#[test]
fn document_rejects_fragments_with_text_or_extra_elements() {
    let doc = parse("<html><body></body></html>");
    doc.document_element().unwrap().remove();

    let with_text = doc.create_document_fragment();
    with_text.append_child(doc.create_text_node("loose")).unwrap();
    with_text.append_child(doc.create_element("html").unwrap()).unwrap();
    assert!(matches!(
        doc.root().append_child(with_text.clone()),
        Err(DomError::HierarchyRequest(_))
    ));
    assert_eq!(with_text.children().len(), 2);

    let two = doc.create_document_fragment();
    two.append_child(doc.create_element("a").unwrap()).unwrap();
    two.append_child(doc.create_element("b").unwrap()).unwrap();
    assert!(matches!(
        doc.root().append_child(two),
        Err(DomError::HierarchyRequest(_))
    ));

    let one = doc.create_document_fragment();
    one.append_child(doc.create_comment("c")).unwrap();
    one.append_child(doc.create_element("html").unwrap()).unwrap();
    doc.root().append_child(one).unwrap();
    assert!(doc.document_element().is_some());
}

#[test]
fn markup_setters() {
    let doc = parse(r#"<html><body><div id="box"><p id="a">x</p></div></body></html>"#);
    let a = doc.get_element_by_id("a").unwrap();
    a.set_outer_html("<b>1</b><i>2</i>").unwrap();
    let parent = doc.get_element_by_id("box").unwrap();
    assert_eq!(parent.inner_html(), "<b>1</b><i>2</i>");
    assert!(a.parent().is_none());

    parent
        .insert_adjacent_html("afterbegin", "<em>0</em>")
        .unwrap();
    parent.insert_adjacent_html("beforebegin", "<hr>").unwrap();
    assert_eq!(parent.inner_html(), "<em>0</em><b>1</b><i>2</i>");
    assert!(parent.previous_sibling().unwrap().is_html_element("hr"));
    assert!(matches!(
        parent.insert_adjacent_html("sideways", "<br>"),
        Err(DomError::Syntax(_))
    ));

    parent.set_inner_html("plain &amp; simple").unwrap();
    assert_eq!(parent.text_content(), "plain & simple");
}

#[test]
fn outer_html_errors() {
    let doc = parse("<html><body></body></html>");
    let detached = doc.create_element("div").unwrap();
    assert!(matches!(
        detached.set_outer_html("<p></p>"),
        Err(DomError::NotSupported(_))
    ));
    let html = doc.document_element().unwrap();
    assert!(matches!(
        html.set_outer_html("<html></html>"),
        Err(DomError::NoModificationAllowed(_))
    ));
}

#[test]
fn clones_are_equal_and_detached() {
    let doc = parse(
        r#"<html><body><div id="x" class="c" title="t"><p>text<!-- note --></p></div></body></html>"#,
    );
    let div = doc.get_element_by_id("x").unwrap();

    let deep = div.clone_node(true);
    assert!(deep.is_equal_node(&div));
    assert!(deep.parent().is_none());
    assert!(!deep.is_connected());
    assert_ne!(deep.id(), div.id());

    let shallow = div.clone_node(false);
    assert!(!shallow.has_children());
    assert!(!shallow.is_equal_node(&div));

    deep.set_attribute("title", "changed").unwrap();
    assert!(!deep.is_equal_node(&div));
    assert_eq!(div.get_attribute("title").as_deref(), Some("t"));

    let reordered = doc.create_element("div").unwrap();
    for (name, value) in [("title", "t"), ("class", "c"), ("id", "x")] {
        reordered.set_attribute(name, value).unwrap();
    }
    reordered.append_child(div.first_child().unwrap().clone_node(true)).unwrap();
    assert!(reordered.is_equal_node(&div));

    let fragment = doc.root().clone_node(true);
    assert_eq!(fragment.node_type(), NodeType::DocumentFragment);
}

#[test]
fn cloned_style_gets_its_own_behavior() {
    let doc = parse("<html><head><style>p { color: red }</style></head></html>");
    let style = doc.query_selector("style").unwrap().unwrap();
    let copy = style.clone_node(true);

    let behavior = copy.behavior::<StyleElement>().unwrap();
    assert_eq!(behavior.state(), StyleState::Unattached);
    assert_eq!(copy.sheet().unwrap().css_rules().len(), 1);
}

#[test]
fn selectors_and_closest() {
    let doc = parse(
        r#"<html><body><section class="card"><div><a id="out" class="ext link">x</a></div></section></body></html>"#,
    );
    let a = doc.query_selector("a.ext").unwrap().unwrap();
    assert!(a.matches("A#out.link").unwrap());
    assert!(a.matches("em, *.ext").unwrap());
    assert!(!a.matches("a.missing").unwrap());

    let card = a.closest(".card").unwrap().unwrap();
    assert!(card.is_html_element("section"));
    assert!(Rc::ptr_eq(&a.closest("a").unwrap().unwrap(), &a));
    assert!(a.closest("article").unwrap().is_none());
    assert!(matches!(a.matches("section a"), Err(DomError::Syntax(_))));
    assert!(matches!(a.matches("a:::x"), Err(DomError::Syntax(_))));
}

#[test]
fn focus_moves_and_publishes_events() {
    let events = Rc::new(RecordingSink::new());
    let doc = Document::parse_html(
        "<html><body><input id=a><input id=b></body></html>",
        Configuration::default().with_events(events.clone()),
    )
    .unwrap();
    let a = doc.get_element_by_id("a").unwrap();
    let b = doc.get_element_by_id("b").unwrap();

    a.focus();
    assert!(a.is_focused());
    b.focus();
    assert!(!a.is_focused());
    assert_eq!(events.event_types(), vec!["focus", "blur", "focus"]);

    b.remove();
    assert!(doc.focused_element().is_none());

    let detached = doc.create_element("input").unwrap();
    detached.focus();
    assert!(doc.focused_element().is_none());

    a.focus();
    a.blur();
    assert!(doc.focused_element().is_none());
    assert_eq!(events.len(), 5);
}

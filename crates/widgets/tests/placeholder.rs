use manos_plate_core::{
    CommandError, Document, Editor, ElementNode, Node, Point, Selection, ViewNode, markup,
};
use manos_plate_widgets::{
    NAME, PLACEHOLDER, PLACEHOLDER_INSERT, PlaceholderConfig, WidgetsConfig, registry,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn editor_at(children: Vec<Node>, focus: Point) -> Editor {
    Editor::new(
        Document { children },
        Selection::collapsed(focus),
        registry(&WidgetsConfig::default()).unwrap(),
    ).unwrap()
}

fn placeholder(name: &str) -> Node {
    Node::Element(ElementNode::new(PLACEHOLDER).with_attr(NAME, name))
}

fn insert(editor: &mut Editor, value: &str) {
    editor
        .run_command(PLACEHOLDER_INSERT, Some(json!({ "value": value })))
        .unwrap();
}

#[test]
fn disabled_where_inline_content_is_not_allowed() {
    let mut editor = editor_at(Vec::new(), Point::new(vec![], 0));
    assert!(!editor.command_state(PLACEHOLDER_INSERT).unwrap().enabled);

    insert(&mut editor, "date");
    assert!(editor.doc().children.is_empty());
}

#[test]
fn splits_the_text_at_the_caret() {
    let mut editor = editor_at(vec![Node::paragraph("Dear ,")], Point::new(vec![0, 0], 5));
    assert!(editor.command_state(PLACEHOLDER_INSERT).unwrap().enabled);

    insert(&mut editor, "first name");

    assert_eq!(
        editor.doc().children,
        vec![Node::element(
            "paragraph",
            vec![Node::text("Dear "), placeholder("first name"), Node::text(",")],
        )]
    );
    assert_eq!(editor.selection().focus, Point::new(vec![0, 2], 0));
    assert_eq!(
        editor.get_data(),
        r#"<p>Dear <span class="placeholder">{first name}</span>,</p>"#
    );
}

#[test]
fn inserts_at_the_edges_of_a_text_leaf() {
    let mut editor = editor_at(vec![Node::paragraph("abc")], Point::new(vec![0, 0], 0));
    insert(&mut editor, "date");
    assert_eq!(editor.selection().focus, Point::new(vec![0, 1], 0));

    editor.set_selection(Selection::collapsed(Point::new(vec![0, 1], 3)));
    insert(&mut editor, "surname");

    assert_eq!(
        editor.doc().children,
        vec![Node::element(
            "paragraph",
            vec![placeholder("date"), Node::text("abc"), placeholder("surname")],
        )]
    );
    assert_eq!(editor.selection().focus, Point::new(vec![0], 3));
}

#[test]
fn inserts_into_an_empty_paragraph() {
    let mut editor = editor_at(vec![Node::paragraph("")], Point::new(vec![0], 0));
    insert(&mut editor, "date");

    assert_eq!(
        editor.doc().children,
        vec![Node::element("paragraph", vec![placeholder("date")])]
    );
    assert_eq!(editor.selection().focus, Point::new(vec![0], 1));
}

#[test]
fn reads_back_without_braces() {
    let mut editor = editor_at(Vec::new(), Point::new(vec![], 0));
    editor
        .set_data(r#"<p>Hi <span class="placeholder">{surname}</span>!</p><p><span class="placeholder"></span></p>"#)
        .unwrap();

    assert_eq!(
        editor.doc().children[0],
        Node::element(
            "paragraph",
            vec![Node::text("Hi "), placeholder("surname"), Node::text("!")],
        )
    );
    // An empty token has nothing to read and is flattened away.
    assert_eq!(editor.doc().children[1], Node::paragraph(""));
}

#[test]
fn renders_as_an_inline_widget_while_editing() {
    let editor = editor_at(
        vec![Node::element("paragraph", vec![placeholder("date")])],
        Point::new(vec![0], 0),
    );

    let ViewNode::Element(p) = &editor.editing_view()[0] else {
        panic!("expected the paragraph");
    };
    let span = p.child_elements().next().unwrap();
    assert!(span.atomic);
    assert_eq!(
        markup::to_markup(editor.editing_view()),
        r#"<p><span class="placeholder ck-widget" contenteditable="false">{date}</span></p>"#
    );
    assert_eq!(editor.get_data(), r#"<p><span class="placeholder">{date}</span></p>"#);
}

#[test]
fn works_inside_widget_regions() {
    let mut editor = editor_at(Vec::new(), Point::new(vec![], 0));
    editor.run_command("widgetBox.insert", None).unwrap();
    // The caret lands in the title, which takes inline content.
    assert!(editor.command_state(PLACEHOLDER_INSERT).unwrap().enabled);
    insert(&mut editor, "date");

    assert!(editor.get_data().contains(
        r#"<h1 class="widget-box-title"><span class="placeholder">{date}</span></h1>"#
    ));
}

#[test]
fn values_are_validated_against_the_configured_list() {
    let mut editor = editor_at(vec![Node::paragraph("x")], Point::new(vec![0, 0], 1));

    assert!(matches!(
        editor.run_command(PLACEHOLDER_INSERT, Some(json!({ "value": "age" }))),
        Err(CommandError::InvalidArgument { .. })
    ));
    assert!(matches!(
        editor.run_command(PLACEHOLDER_INSERT, None),
        Err(CommandError::InvalidArgument { .. })
    ));
    assert_eq!(editor.doc().children, vec![Node::paragraph("x")]);

    let config = WidgetsConfig {
        placeholder: PlaceholderConfig {
            types: vec!["age".into()],
        },
        ..WidgetsConfig::default()
    };
    let mut custom = Editor::new(
        Document {
            children: vec![Node::paragraph("x")],
        },
        Selection::collapsed(Point::new(vec![0, 0], 1)),
        registry(&config).unwrap(),
    ).unwrap();
    insert(&mut custom, "age");
    assert!(matches!(
        custom.run_command(PLACEHOLDER_INSERT, Some(json!({ "value": "date" }))),
        Err(CommandError::InvalidArgument { .. })
    ));
}

#[test]
fn removing_a_placeholder_joins_the_text_around_it() {
    let mut editor = editor_at(vec![Node::paragraph("Dear ,")], Point::new(vec![0, 0], 5));
    insert(&mut editor, "first name");
    editor.remove_node(vec![0, 1]).unwrap();

    assert_eq!(editor.doc().children, vec![Node::paragraph("Dear ,")]);
    let before = editor.doc().clone();
    let data = editor.get_data();
    editor.set_data(&data).unwrap();
    assert_eq!(editor.doc(), &before);
}

use manos_plate_core::{
    ApplyError, Editor, Node, PARAGRAPH, Point, Selection, ViewNode, markup,
    strip_editing_decorations,
};
use manos_plate_widgets::{INSERT_BOX, WIDGET_BOX, WidgetsConfig, editor};
use pretty_assertions::assert_eq;

const WIDGET_BOX_MARKUP: &str = r#"<section class="widget-box"><h1 class="widget-box-title"></h1><div class="widget-box-description"><p></p></div></section>"#;
const INSERT_BOX_MARKUP: &str = r#"<section class="insert-box"><h1 class="insert-box-title"></h1><div class="insert-box-description"><p></p></div><input class="insert-box-input"></section>"#;

fn new_editor() -> Editor {
    editor(&WidgetsConfig::default()).unwrap()
}

fn kinds(node: &Node) -> Vec<&str> {
    node.as_element()
        .map(|el| el.children.iter().map(Node::kind).collect())
        .unwrap_or_default()
}

#[test]
fn inserting_a_widget_box_at_an_empty_root() {
    let mut editor = new_editor();
    assert!(editor.command_state("widgetBox.insert").unwrap().enabled);

    editor.run_command("widgetBox.insert", None).unwrap();

    assert_eq!(editor.get_data(), WIDGET_BOX_MARKUP);
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 0));
}

#[test]
fn the_widget_box_markup_reads_back_into_the_mandatory_subtree() {
    let mut editor = new_editor();
    editor.set_data(WIDGET_BOX_MARKUP).unwrap();

    assert_eq!(editor.doc().children, vec![WIDGET_BOX.subtree()]);
    let container = &editor.doc().children[0];
    assert_eq!(kinds(container), vec![WIDGET_BOX.title, WIDGET_BOX.description]);
    let Node::Element(el) = container else {
        panic!("expected the container");
    };
    assert!(el.children[0].as_element().unwrap().children.is_empty());
    assert_eq!(kinds(&el.children[1]), vec![PARAGRAPH]);
}

#[test]
fn insert_box_carries_an_input_region() {
    let mut editor = new_editor();
    editor.run_command("insertBox.insert", None).unwrap();

    assert_eq!(
        kinds(&editor.doc().children[0]),
        vec![INSERT_BOX.title, INSERT_BOX.description, "insertBoxInput"]
    );
    assert_eq!(editor.get_data(), INSERT_BOX_MARKUP);

    let mut reread = new_editor();
    reread.set_data(INSERT_BOX_MARKUP).unwrap();
    assert_eq!(reread.doc(), editor.doc());

    // The input region holds no content and is not editable.
    assert_eq!(editor.editable_regions(), vec![vec![0, 0], vec![0, 1]]);
    assert_eq!(
        editor.insert_text(&Point::new(vec![0, 2], 0), "x"),
        Err(ApplyError::NotEditable(vec![0, 2]))
    );
}

#[test]
fn typed_content_round_trips() {
    let mut editor = new_editor();
    editor.run_command("widgetBox.insert", None).unwrap();
    editor.insert_text(&Point::new(vec![0, 0], 0), "Title <1>").unwrap();
    editor
        .insert_text(&Point::new(vec![0, 1, 0], 0), "Body & more")
        .unwrap();

    let data = editor.get_data();
    assert_eq!(
        data,
        r#"<section class="widget-box"><h1 class="widget-box-title">Title &lt;1&gt;</h1><div class="widget-box-description"><p>Body &amp; more</p></div></section>"#
    );

    let mut reread = new_editor();
    reread.set_data(&data).unwrap();
    assert_eq!(reread.doc(), editor.doc());
}

#[test]
fn missing_regions_are_rebuilt_on_upcast() {
    let mut editor = new_editor();
    editor
        .set_data(r#"<section class="widget-box"><p>stray</p></section><section class="widget-box"><div class="widget-box-description"></div><h1 class="widget-box-title">T</h1></section>"#)
        .unwrap();

    assert_eq!(editor.doc().children.len(), 2);
    for container in &editor.doc().children {
        assert_eq!(kinds(container), vec![WIDGET_BOX.title, WIDGET_BOX.description]);
    }
    assert_eq!(editor.doc().children[0], WIDGET_BOX.subtree());
    let Node::Element(second) = &editor.doc().children[1] else {
        panic!("expected the second container");
    };
    assert_eq!(second.children[0].as_element().unwrap().text_content(), "T");
    assert_eq!(kinds(&second.children[1]), vec![PARAGRAPH]);
}

#[test]
fn boxes_never_nest_inside_their_own_description() {
    let mut editor = new_editor();
    editor.run_command("widgetBox.insert", None).unwrap();

    // Caret in the description paragraph: the widget box is denied there and
    // the walk stops at the description boundary.
    editor.set_selection(Selection::collapsed(Point::new(vec![0, 1, 0], 0)));
    assert!(!editor.command_state("widgetBox.insert").unwrap().enabled);
    editor.run_command("widgetBox.insert", None).unwrap();
    assert_eq!(editor.doc().children.len(), 1);

    // Another family is fine, and replaces the empty paragraph.
    assert!(editor.command_state("insertBox.insert").unwrap().enabled);
    editor.run_command("insertBox.insert", None).unwrap();
    assert_eq!(kinds(&editor.doc().children[0]), vec![WIDGET_BOX.title, WIDGET_BOX.description]);
    let Node::Element(outer) = &editor.doc().children[0] else {
        panic!("expected the container");
    };
    assert_eq!(kinds(&outer.children[1]), vec![INSERT_BOX.container]);

    // Deeper down, the outer description still denies a widget box.
    editor.set_selection(Selection::collapsed(Point::new(vec![0, 1, 0, 1, 0], 0)));
    assert!(!editor.command_state("widgetBox.insert").unwrap().enabled);
    assert!(!editor.command_state("insertBox.insert").unwrap().enabled);
    assert!(matches!(
        editor.insert_node(vec![0, 1, 0, 1, 1], WIDGET_BOX.subtree()),
        Err(ApplyError::SchemaViolation { .. })
    ));

    // Markup cannot smuggle one in either.
    let mut reread = new_editor();
    reread
        .set_data(r#"<section class="widget-box"><h1 class="widget-box-title"></h1><div class="widget-box-description"><section class="widget-box"><h1 class="widget-box-title">inner</h1></section></div></section>"#)
        .unwrap();
    assert_eq!(reread.doc().children, vec![WIDGET_BOX.subtree()]);
}

#[test]
fn editing_view_marks_the_widget_and_its_regions() {
    let mut editor = new_editor();
    editor.run_command("widgetBox.insert", None).unwrap();

    let ViewNode::Element(section) = &editor.editing_view()[0] else {
        panic!("expected the widget");
    };
    assert!(section.atomic);
    assert_eq!(section.label.as_deref(), Some("widget box"));
    assert_eq!(
        markup::to_markup(editor.editing_view()),
        concat!(
            r#"<section class="widget-box ck-widget" contenteditable="false">"#,
            r#"<h1 class="widget-box-title ck-editor__editable ck-editor__nested-editable" contenteditable="true"></h1>"#,
            r#"<div class="widget-box-description ck-editor__editable ck-editor__nested-editable" contenteditable="true"><p></p></div>"#,
            "</section>",
        )
    );
    assert_eq!(editor.editable_regions(), vec![vec![0, 0], vec![0, 1]]);
    assert_eq!(
        strip_editing_decorations(editor.editing_view()),
        editor.registry().conversion().data_downcast(editor.doc())
    );
}

#[test]
fn typing_in_the_title_leaves_the_description_alone() {
    let mut editor = new_editor();
    editor.run_command("widgetBox.insert", None).unwrap();
    let description_before = editor.doc().children[0].as_element().unwrap().children[1].clone();

    editor.insert_text(&Point::new(vec![0, 0], 0), "Hello").unwrap();

    let container = editor.doc().children[0].as_element().unwrap();
    assert_eq!(container.children[0].as_element().unwrap().text_content(), "Hello");
    assert_eq!(container.children[1], description_before);
    assert_eq!(
        editor.insert_text(&Point::new(vec![0], 0), "x"),
        Err(ApplyError::NotEditable(vec![0]))
    );
}

#[test]
fn boxes_insert_after_existing_content() {
    let mut editor = new_editor();
    editor.set_data("<p>intro</p>").unwrap();
    editor.set_selection(Selection::collapsed(Point::new(vec![0, 0], 5)));
    editor.run_command("widgetBox.insert", None).unwrap();
    editor.set_selection(Selection::collapsed(Point::new(vec![], 2)));
    editor.run_command("insertBox.insert", None).unwrap();

    assert_eq!(
        editor.doc().children.iter().map(Node::kind).collect::<Vec<_>>(),
        vec![PARAGRAPH, WIDGET_BOX.container, INSERT_BOX.container]
    );
}

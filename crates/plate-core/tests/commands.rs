mod common;

use std::cell::Cell;
use std::rc::Rc;

use manos_plate_core::{CommandError, Document, Editor, Node, Point, Selection};
use pretty_assertions::assert_eq;

use common::{NOTE, note};

#[test]
fn unknown_commands_are_errors() {
    let mut editor = common::editor();
    assert_eq!(
        editor.run_command("note.explode", None),
        Err(CommandError::Unknown("note.explode".to_string()))
    );
}

#[test]
fn command_listing_skips_hidden_commands_and_is_sorted() {
    let editor = common::editor();
    let ids: Vec<String> = editor.commands().into_iter().map(|info| info.id).collect();
    assert_eq!(ids, vec!["note.insert".to_string(), "paragraph.insert".to_string()]);

    // Hidden commands still run and still have a state.
    assert!(editor.command_state("note.hidden").is_some());
}

#[test]
fn insertion_at_an_empty_root_places_the_widget_first() {
    let mut editor = common::editor();
    assert!(editor.command_state("note.insert").unwrap().enabled);

    editor.run_command("note.insert", None).unwrap();
    assert_eq!(editor.doc().children, vec![note("")]);
    assert_eq!(
        editor.get_data(),
        r#"<aside class="note"><div class="note-body"><p></p></div></aside>"#
    );
}

#[test]
fn an_empty_paragraph_holding_the_caret_is_replaced() {
    let mut editor = Editor::new(
        Document {
            children: vec![Node::paragraph("keep"), Node::paragraph("")],
        },
        Selection::collapsed(Point::new(vec![1], 0)),
        common::registry(),
    ).unwrap();

    editor.run_command("note.insert", None).unwrap();
    assert_eq!(editor.doc().children, vec![Node::paragraph("keep"), note("")]);
}

#[test]
fn insertion_goes_after_the_block_holding_the_caret() {
    let mut editor = Editor::new(
        Document {
            children: vec![Node::paragraph("one"), Node::paragraph("two")],
        },
        Selection::collapsed(Point::new(vec![0, 0], 1)),
        common::registry(),
    ).unwrap();

    editor.run_command("note.insert", None).unwrap();
    assert_eq!(
        editor.doc().children,
        vec![Node::paragraph("one"), note(""), Node::paragraph("two")]
    );
}

#[test]
fn enablement_follows_the_selection() {
    let mut editor = Editor::new(
        Document {
            children: vec![Node::paragraph("a"), note("b")],
        },
        Selection::collapsed(Point::new(vec![0, 0], 0)),
        common::registry(),
    ).unwrap();
    let is_enabled = |editor: &Editor| editor.command_state("note.insert").unwrap().enabled;
    assert!(is_enabled(&editor));

    editor.set_selection(Selection::collapsed(Point::new(vec![1, 0, 0, 0], 0)));
    assert!(!is_enabled(&editor));
    let found = editor
        .schema()
        .find_allowed_ancestor(editor.doc(), &editor.selection().focus, NOTE);
    assert_eq!(found.is_some(), is_enabled(&editor));

    editor.set_selection(Selection::collapsed(Point::new(vec![], 2)));
    assert!(is_enabled(&editor));
}

#[test]
fn disabled_commands_are_silent_no_ops() {
    let mut editor = Editor::new(
        Document {
            children: vec![note("inside")],
        },
        Selection::collapsed(Point::new(vec![0, 0, 0, 0], 3)),
        common::registry(),
    ).unwrap();
    let renders = Rc::new(Cell::new(0));
    let counter = Rc::clone(&renders);
    editor.subscribe(move |_| counter.set(counter.get() + 1));

    assert_eq!(editor.run_command("note.insert", None), Ok(()));
    assert_eq!(editor.doc().children, vec![note("inside")]);
    assert_eq!(renders.get(), 0);
}

#[test]
fn paragraph_command_inserts_after_the_current_block() {
    let mut editor = Editor::with_core_plugins();
    editor.run_command("paragraph.insert", None).unwrap();
    editor.run_command("paragraph.insert", None).unwrap();
    assert_eq!(
        editor.doc().children,
        vec![Node::paragraph(""), Node::paragraph("")]
    );
}

#[test]
fn paragraph_command_adds_a_paragraph_after_an_empty_one() {
    let mut editor = Editor::new(
        Document {
            children: vec![Node::paragraph("")],
        },
        Selection::collapsed(Point::new(vec![0], 0)),
        common::registry(),
    )
    .unwrap();

    editor.run_command("paragraph.insert", None).unwrap();
    assert_eq!(
        editor.doc().children,
        vec![Node::paragraph(""), Node::paragraph("")]
    );
    assert_eq!(editor.selection().focus, Point::new(vec![1], 0));

    // Widgets still take over the empty paragraph holding the caret.
    editor.run_command("note.insert", None).unwrap();
    assert_eq!(editor.doc().children, vec![Node::paragraph(""), note("")]);
}

#![allow(dead_code)]

use manos_plate_core::{
    BLOCK, ChildCheck, CommandError, CommandSpec, CoreParagraphPlugin, DowncastRule, Editor,
    Node, PlatePlugin, PluginRegistry, ROOT, TypeDescriptor, UpcastRule, ViewPattern,
};

pub const NOTE: &str = "note";
pub const NOTE_BODY: &str = "noteBody";

/// A minimal widget: an atomic `aside.note` holding one editable body.
pub struct NotePlugin;

impl PlatePlugin for NotePlugin {
    fn id(&self) -> &'static str {
        "test.note"
    }

    fn types(&self) -> Vec<TypeDescriptor> {
        vec![
            TypeDescriptor::new(NOTE)
                .object()
                .allow_where(BLOCK)
                .allow_attributes(["tone"]),
            TypeDescriptor::new(NOTE_BODY)
                .limit()
                .allow_in(NOTE)
                .allow_content_of(ROOT),
        ]
    }

    fn child_checks(&self) -> Vec<ChildCheck> {
        vec![ChildCheck::deny_inside(NOTE_BODY, NOTE)]
    }

    fn upcast_rules(&self) -> Vec<UpcastRule> {
        vec![
            UpcastRule::element_to_element(ViewPattern::new("aside").class("note"), NOTE),
            UpcastRule::element_to_element(ViewPattern::new("div").class("note-body"), NOTE_BODY),
        ]
    }

    fn data_downcast_rules(&self) -> Vec<DowncastRule> {
        vec![
            DowncastRule::element_to_element(NOTE, "aside", &["note"]),
            DowncastRule::element_to_element(NOTE_BODY, "div", &["note-body"]),
        ]
    }

    fn editing_downcast_rules(&self) -> Vec<DowncastRule> {
        vec![
            DowncastRule::element_to_element(NOTE, "aside", &["note"]).as_widget("note"),
            DowncastRule::element_to_element(NOTE_BODY, "div", &["note-body"]).as_editable(),
        ]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("note.insert", "Insert note", |editor, _args| {
                editor
                    .insert_content(note(""))
                    .map_err(CommandError::apply("note.insert"))?;
                Ok(())
            })
            .enabled_when(|editor| {
                editor
                    .schema()
                    .find_allowed_ancestor(editor.doc(), &editor.selection().focus, NOTE)
                    .is_some()
            }),
            CommandSpec::new("note.hidden", "Hidden", |_editor, _args| Ok(())).hidden(true),
        ]
    }
}

pub fn note(text: &str) -> Node {
    Node::element(NOTE, vec![Node::element(NOTE_BODY, vec![Node::paragraph(text)])])
}

pub fn registry() -> PluginRegistry {
    let plugins: Vec<Box<dyn PlatePlugin>> = vec![Box::new(CoreParagraphPlugin), Box::new(NotePlugin)];
    match PluginRegistry::new(plugins) {
        Ok(registry) => registry,
        Err(err) => panic!("test registry: {err}"),
    }
}

pub fn editor() -> Editor {
    Editor::empty(registry())
}

mod common;

use manos_plate_core::{
    BLOCK, ChildCheck, ChildVote, CoreParagraphPlugin, Document, Node, PARAGRAPH, PlatePlugin,
    PluginRegistry, Point, ROOT, RegistryError, Schema, SchemaContext, TEXT, TypeDescriptor,
    UpcastRule, ViewPattern,
};

use common::{NOTE, NOTE_BODY, NotePlugin, note};

fn ctx<'a>(items: &[&'a str]) -> SchemaContext<'a> {
    SchemaContext::new(items.to_vec())
}

#[test]
fn placement_resolves_where_and_content_of() {
    let registry = common::registry();
    let schema = registry.schema();

    assert!(schema.check_child(&ctx(&[ROOT]), PARAGRAPH));
    assert!(schema.check_child(&ctx(&[ROOT]), NOTE));
    assert!(!schema.check_child(&ctx(&[ROOT]), TEXT));
    assert!(schema.check_child(&ctx(&[ROOT, PARAGRAPH]), TEXT));
    assert!(!schema.check_child(&ctx(&[ROOT, PARAGRAPH]), PARAGRAPH));

    // The body borrows the root's content policy.
    assert!(schema.check_child(&ctx(&[ROOT, NOTE, NOTE_BODY]), PARAGRAPH));
    assert!(!schema.check_child(&ctx(&[ROOT, NOTE]), PARAGRAPH));
    assert!(schema.check_child(&ctx(&[ROOT, NOTE]), NOTE_BODY));
    assert!(!schema.check_child(&ctx(&[ROOT]), "unknown"));
}

#[test]
fn deny_wins_at_any_depth() {
    let registry = common::registry();
    let schema = registry.schema();

    assert!(!schema.check_child(&ctx(&[ROOT, NOTE, NOTE_BODY]), NOTE));
    // Placement alone would allow it; the check still sees the body above.
    let deep = ctx(&[ROOT, NOTE, NOTE_BODY, NOTE, NOTE_BODY]);
    assert!(!schema.check_child(&deep, NOTE));
}

#[test]
fn allow_votes_do_not_override_placement() {
    let mut schema = Schema::default();
    for def in CoreParagraphPlugin.types() {
        schema.register(def).unwrap();
    }
    schema.add_child_check(ChildCheck::new("allow-all", |_, _| ChildVote::Allow));

    assert!(!schema.check_child(&ctx(&[ROOT]), TEXT));
    assert!(schema.check_child(&ctx(&[ROOT]), PARAGRAPH));
}

#[test]
fn objects_are_limits() {
    let registry = common::registry();
    let schema = registry.schema();

    assert!(schema.is_object(NOTE));
    assert!(schema.is_limit(NOTE));
    assert!(schema.is_limit(NOTE_BODY));
    assert!(!schema.is_object(NOTE_BODY));
    assert!(!schema.is_limit(PARAGRAPH));
}

#[test]
fn find_allowed_ancestor_walks_outward_until_a_limit() {
    let registry = common::registry();
    let schema = registry.schema();
    let doc = Document {
        children: vec![Node::paragraph("hello"), note("inside")],
    };

    // Caret in a top-level paragraph: the root accepts the note.
    let in_paragraph = Point::new(vec![0, 0], 2);
    assert_eq!(schema.find_allowed_ancestor(&doc, &in_paragraph, NOTE), Some(vec![]));
    assert_eq!(
        schema.find_allowed_ancestor(&doc, &in_paragraph, PARAGRAPH),
        Some(vec![])
    );

    // Caret inside the note body: paragraphs fit in the body, notes are
    // denied there and the walk stops at the body's boundary.
    let in_body = Point::new(vec![1, 0, 0, 0], 0);
    assert_eq!(
        schema.find_allowed_ancestor(&doc, &in_body, PARAGRAPH),
        Some(vec![1, 0])
    );
    assert_eq!(schema.find_allowed_ancestor(&doc, &in_body, NOTE), None);

    // Caret on the note itself: nothing but its body fits, and it is a limit.
    let on_note = Point::new(vec![1], 0);
    assert_eq!(schema.find_allowed_ancestor(&doc, &on_note, PARAGRAPH), None);

    assert_eq!(
        schema.find_allowed_ancestor(&doc, &Point::new(vec![7], 0), PARAGRAPH),
        None
    );
}

#[test]
fn text_is_editable_only_inside_regions_of_objects() {
    let registry = common::registry();
    let schema = registry.schema();
    let doc = Document {
        children: vec![Node::paragraph("a"), note("b")],
    };

    assert!(schema.is_text_editable_at(&doc, &[0]));
    assert!(schema.is_text_editable_at(&doc, &[1, 0]));
    assert!(schema.is_text_editable_at(&doc, &[1, 0, 0]));
    assert!(!schema.is_text_editable_at(&doc, &[1]));
}

#[test]
fn registering_a_type_twice_fails() {
    let mut schema = Schema::default();
    schema.register(TypeDescriptor::new("x")).unwrap();
    assert_eq!(
        schema.register(TypeDescriptor::new("x")),
        Err(RegistryError::DuplicateType("x".to_string()))
    );

    struct Shadow;
    impl PlatePlugin for Shadow {
        fn id(&self) -> &'static str {
            "test.shadow"
        }
        fn types(&self) -> Vec<TypeDescriptor> {
            vec![TypeDescriptor::new(PARAGRAPH).allow_where(BLOCK)]
        }
    }
    let plugins: Vec<Box<dyn PlatePlugin>> = vec![Box::new(CoreParagraphPlugin), Box::new(Shadow)];
    assert_eq!(
        PluginRegistry::new(plugins).err(),
        Some(RegistryError::DuplicateType(PARAGRAPH.to_string()))
    );
}

#[test]
fn references_to_unknown_types_are_load_errors() {
    struct Dangling;
    impl PlatePlugin for Dangling {
        fn id(&self) -> &'static str {
            "test.dangling"
        }
        fn types(&self) -> Vec<TypeDescriptor> {
            vec![TypeDescriptor::new("card").allow_in("deck")]
        }
    }
    let plugins: Vec<Box<dyn PlatePlugin>> = vec![Box::new(CoreParagraphPlugin), Box::new(Dangling)];
    assert_eq!(
        PluginRegistry::new(plugins).err(),
        Some(RegistryError::UnknownType {
            kind: "deck".to_string(),
            referenced_by: "type `card`".to_string(),
        })
    );

    struct GhostRule;
    impl PlatePlugin for GhostRule {
        fn id(&self) -> &'static str {
            "test.ghost"
        }
        fn upcast_rules(&self) -> Vec<UpcastRule> {
            vec![UpcastRule::element_to_element(
                ViewPattern::new("div").class("ghost"),
                "ghost",
            )]
        }
    }
    let plugins: Vec<Box<dyn PlatePlugin>> = vec![Box::new(CoreParagraphPlugin), Box::new(GhostRule)];
    assert_eq!(
        PluginRegistry::new(plugins).err(),
        Some(RegistryError::UnknownType {
            kind: "ghost".to_string(),
            referenced_by: "upcast rule for `div.ghost`".to_string(),
        })
    );
}

#[test]
fn duplicate_plugins_and_commands_are_rejected() {
    let plugins: Vec<Box<dyn PlatePlugin>> =
        vec![Box::new(CoreParagraphPlugin), Box::new(CoreParagraphPlugin)];
    assert_eq!(
        PluginRegistry::new(plugins).err(),
        Some(RegistryError::DuplicatePlugin("core.paragraph".to_string()))
    );

    struct NoteAgain;
    impl PlatePlugin for NoteAgain {
        fn id(&self) -> &'static str {
            "test.note_again"
        }
        fn commands(&self) -> Vec<manos_plate_core::CommandSpec> {
            NotePlugin.commands()
        }
    }
    let plugins: Vec<Box<dyn PlatePlugin>> = vec![
        Box::new(CoreParagraphPlugin),
        Box::new(NotePlugin),
        Box::new(NoteAgain),
    ];
    assert!(matches!(
        PluginRegistry::new(plugins).err(),
        Some(RegistryError::DuplicateCommand(id)) if id.starts_with("note.")
    ));
}

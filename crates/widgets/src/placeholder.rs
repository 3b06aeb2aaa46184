use std::sync::Arc;

use manos_plate_core::{
    CommandError, CommandSpec, DowncastRule, Editor, ElementNode, Node, Op, Path, PlatePlugin,
    Point, Selection, TEXT, Transaction, TypeDescriptor, UpcastRule, ViewElement, ViewNode,
    ViewPattern, context_at, node_at_path,
};
use serde_json::Value;

use crate::config::PlaceholderConfig;

pub const PLACEHOLDER: &str = "placeholder";
pub const NAME: &str = "name";
pub const INSERT_COMMAND: &str = "placeholder.insert";

const CLASS: &str = "placeholder";

/// Inline `{name}` tokens filled in later by a mail-merge style step.
pub struct PlaceholderPlugin {
    types: Arc<Vec<String>>,
}

impl PlaceholderPlugin {
    pub fn new(config: &PlaceholderConfig) -> Self {
        Self {
            types: Arc::new(config.types.clone()),
        }
    }
}

impl PlatePlugin for PlaceholderPlugin {
    fn id(&self) -> &'static str {
        "widgets.placeholder"
    }

    fn types(&self) -> Vec<TypeDescriptor> {
        vec![
            TypeDescriptor::new(PLACEHOLDER)
                .object()
                .inline()
                .allow_where(TEXT)
                .allow_attributes([NAME]),
        ]
    }

    fn upcast_rules(&self) -> Vec<UpcastRule> {
        vec![
            UpcastRule::builder(ViewPattern::new("span").class(CLASS), PLACEHOLDER, |el| {
                let text = el.text_content();
                let name = text.trim().trim_start_matches('{').trim_end_matches('}').trim();
                if name.is_empty() {
                    return None;
                }
                Some(ElementNode::new(PLACEHOLDER).with_attr(NAME, name))
            })
            .without_children(),
        ]
    }

    fn data_downcast_rules(&self) -> Vec<DowncastRule> {
        vec![DowncastRule::builder(PLACEHOLDER, |node, _ctx| render(node))]
    }

    fn editing_downcast_rules(&self) -> Vec<DowncastRule> {
        vec![DowncastRule::builder(PLACEHOLDER, |node, _ctx| render(node)).as_widget("placeholder")]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        let types = Arc::clone(&self.types);
        vec![
            CommandSpec::new(INSERT_COMMAND, "Placeholder", move |editor, args| {
                insert_placeholder(editor, &types, args)
            })
            .description("Insert a named placeholder at the caret.")
            .keywords(["placeholder", "field", "merge"])
            .args_example(serde_json::json!({ "value": "date" }))
            .enabled_when(|editor| focus_accepts_placeholder(editor)),
        ]
    }
}

fn render(node: &ElementNode) -> ViewElement {
    let name = node.attr_str(NAME).unwrap_or_default();
    ViewElement::new("span")
        .with_class(CLASS)
        .with_children(vec![ViewNode::Text(format!("{{{name}}}"))])
}

/// The container the caret sits in: the parent of a focused text leaf, or
/// the focused element itself.
fn focus_container(editor: &Editor) -> Path {
    let focus = &editor.selection().focus;
    match node_at_path(editor.doc(), &focus.path) {
        Some(Node::Text(_)) => focus.path[..focus.path.len() - 1].to_vec(),
        _ => focus.path.clone(),
    }
}

fn focus_accepts_placeholder(editor: &Editor) -> bool {
    let container = focus_container(editor);
    context_at(editor.doc(), &container)
        .is_some_and(|ctx| editor.schema().check_child(&ctx, PLACEHOLDER))
}

fn insert_placeholder(
    editor: &mut Editor,
    types: &[String],
    args: Option<Value>,
) -> Result<(), CommandError> {
    let name = match args.as_ref().and_then(|args| args.get("value")) {
        Some(Value::String(value)) if types.contains(value) => value.clone(),
        Some(other) => {
            return Err(CommandError::invalid_argument(
                INSERT_COMMAND,
                format!("unknown placeholder {other}; expected one of {types:?}"),
            ));
        }
        None => {
            return Err(CommandError::invalid_argument(
                INSERT_COMMAND,
                "missing `value`",
            ));
        }
    };
    let placeholder = Node::Element(ElementNode::new(PLACEHOLDER).with_attr(NAME, name));

    let focus = editor.selection().focus.clone();
    let container = focus_container(editor);
    let mut ops = Vec::new();
    let caret = match node_at_path(editor.doc(), &focus.path) {
        Some(Node::Text(t)) => {
            let ix = focus.path[focus.path.len() - 1];
            let at = |ix: usize| {
                let mut path = container.clone();
                path.push(ix);
                path
            };
            let offset = focus.offset.min(t.text.len());
            if offset == 0 {
                ops.push(Op::InsertNode {
                    path: at(ix),
                    node: placeholder,
                });
                Point::new(at(ix + 1), 0)
            } else if offset >= t.text.len() {
                ops.push(Op::InsertNode {
                    path: at(ix + 1),
                    node: placeholder,
                });
                Point::new(container.clone(), ix + 2)
            } else {
                let tail = t.text[offset..].to_string();
                ops.push(Op::RemoveText {
                    path: at(ix),
                    range: offset..t.text.len(),
                });
                ops.push(Op::InsertNode {
                    path: at(ix + 1),
                    node: placeholder,
                });
                ops.push(Op::InsertNode {
                    path: at(ix + 2),
                    node: Node::text(tail),
                });
                Point::new(at(ix + 2), 0)
            }
        }
        _ => {
            let mut path = container.clone();
            path.push(focus.offset);
            ops.push(Op::InsertNode {
                path,
                node: placeholder,
            });
            Point::new(container.clone(), focus.offset + 1)
        }
    };

    editor
        .apply(
            Transaction::new(ops)
                .with_selection(Selection::collapsed(caret))
                .origin(INSERT_COMMAND),
        )
        .map_err(CommandError::apply(INSERT_COMMAND))
}

use std::collections::BTreeMap;
use std::sync::Arc;

use manos_plate_core::{
    ApplyError, BLOCK, ChildCheck, CommandError, CommandSpec, DowncastContext, DowncastRule,
    Editor, ElementNode, Node, PlatePlugin, Point, Prompt, ROOT, Selection, TypeDescriptor,
    UpcastRule, ViewElement, ViewNode, ViewPattern, container_chain, create_raw, node_at_path,
};
use serde_json::Value;
use tracing::debug;

use crate::config::SideCardConfig;

pub const SIDE_CARD: &str = "sideCard";
pub const SIDE_CARD_TITLE: &str = "sideCardTitle";
pub const SIDE_CARD_SECTION: &str = "sideCardSection";

pub const CARD_TYPE: &str = "cardType";
pub const CARD_URL: &str = "cardURL";

pub const INSERT_COMMAND: &str = "sideCard.insert";

const CLASS: &str = "side-card";
const TYPE_CLASS_PREFIX: &str = "side-card-";
const TITLE_CLASS: &str = "side-card-title";
const SECTION_CLASS: &str = "side-card-section";
const URL_CLASS: &str = "side-card-url";
const ACTIONS_CLASS: &str = "side-card-actions";
const FALLBACK_TYPE: &str = "default";

fn url_pattern() -> ViewPattern {
    ViewPattern::new("div").class(URL_CLASS)
}

fn actions_pattern() -> ViewPattern {
    ViewPattern::new("div").class(ACTIONS_CLASS)
}

/// A card whose rendered shape follows its attributes: the type selects a
/// class, the URL line only exists while a URL is set, and the child regions
/// are rendered by role.
pub struct SideCardPlugin {
    types: Arc<Vec<String>>,
}

impl SideCardPlugin {
    pub fn new(config: &SideCardConfig) -> Self {
        Self {
            types: Arc::new(config.types.clone()),
        }
    }
}

impl PlatePlugin for SideCardPlugin {
    fn id(&self) -> &'static str {
        "widgets.side_card"
    }

    fn types(&self) -> Vec<TypeDescriptor> {
        vec![
            TypeDescriptor::new(SIDE_CARD)
                .object()
                .allow_where(BLOCK)
                .allow_attributes([CARD_TYPE, CARD_URL]),
            TypeDescriptor::new(SIDE_CARD_TITLE)
                .limit()
                .allow_in(SIDE_CARD)
                .allow_content_of(BLOCK),
            TypeDescriptor::new(SIDE_CARD_SECTION)
                .limit()
                .allow_in(SIDE_CARD)
                .allow_content_of(ROOT),
        ]
    }

    fn child_checks(&self) -> Vec<ChildCheck> {
        vec![ChildCheck::deny_inside(SIDE_CARD_SECTION, SIDE_CARD)]
    }

    fn upcast_rules(&self) -> Vec<UpcastRule> {
        vec![
            UpcastRule::builder(ViewPattern::new("aside").class(CLASS), SIDE_CARD, read_card)
                .consumes(url_pattern())
                .consumes(actions_pattern())
                .finish(title_first),
            UpcastRule::element_to_element(
                ViewPattern::new("div").class(TITLE_CLASS),
                SIDE_CARD_TITLE,
            ),
            UpcastRule::element_to_element(
                ViewPattern::new("div").class(SECTION_CLASS),
                SIDE_CARD_SECTION,
            )
            .finish(|node| {
                if node.children.is_empty() {
                    node.children.push(Node::paragraph(""));
                }
            }),
        ]
    }

    fn data_downcast_rules(&self) -> Vec<DowncastRule> {
        vec![DowncastRule::builder(SIDE_CARD, |node, ctx| render_card(node, ctx))]
    }

    fn editing_downcast_rules(&self) -> Vec<DowncastRule> {
        let types = Arc::clone(&self.types);
        vec![
            DowncastRule::builder(SIDE_CARD, move |node, ctx| {
                let mut card = render_card(node, ctx);
                card.push(ViewNode::Element(actions(ctx.path().to_vec(), &types)));
                card
            })
            .as_widget("side card"),
        ]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        let types = Arc::clone(&self.types);
        vec![
            CommandSpec::new(INSERT_COMMAND, "Insert side card", move |editor, args| {
                insert_card(editor, &types, args)
            })
            .description("Insert a side card of the given type, optionally with a URL.")
            .keywords(["card", "aside", "side"])
            .args_example(serde_json::json!({ "type": "default", "url": "https://example.com" }))
            .enabled_when(|editor| {
                editor
                    .schema()
                    .find_allowed_ancestor(editor.doc(), &editor.selection().focus, SIDE_CARD)
                    .is_some()
            })
            .value_with(|editor| {
                enclosing_card(editor)
                    .and_then(|card| card.attrs.get(CARD_TYPE).cloned())
                    .unwrap_or(Value::Null)
            }),
        ]
    }
}

/// Puts the card's first title in front, creating an empty one when there is
/// none. Later titles are dropped.
fn title_first(node: &mut ElementNode) {
    let is_title = |child: &Node| child.kind() == SIDE_CARD_TITLE;
    let title = match node.children.iter().position(is_title) {
        Some(ix) => node.children.remove(ix),
        None => Node::element(SIDE_CARD_TITLE, Vec::new()),
    };
    let before = node.children.len();
    node.children.retain(|child| !is_title(child));
    if node.children.len() != before {
        debug!(dropped = before - node.children.len(), "extra side card titles");
    }
    node.children.insert(0, title);
}

fn render_card(node: &ElementNode, ctx: &DowncastContext<'_>) -> ViewElement {
    let card_type = node.attr_str(CARD_TYPE).unwrap_or(FALLBACK_TYPE);
    let mut card = ViewElement::new("aside")
        .with_class(CLASS)
        .with_class(format!("{TYPE_CLASS_PREFIX}{card_type}"));

    for (ix, child) in node.child_elements() {
        let class = match child.kind.as_str() {
            SIDE_CARD_TITLE => TITLE_CLASS,
            SIDE_CARD_SECTION => SECTION_CLASS,
            other => {
                debug!(kind = other, "side card child without a role");
                continue;
            }
        };
        let path = ctx.child_path(ix);
        let mut region = ViewElement::new("div")
            .with_class(class)
            .with_children(ctx.convert_children_at(child, &path));
        region.model_path = Some(path);
        card.push(ViewNode::Element(ctx.editable(region)));
    }

    if let Some(url) = node.attr_str(CARD_URL).filter(|url| !url.is_empty()) {
        card.push(ViewNode::Element(
            ViewElement::new("div")
                .with_class(URL_CLASS)
                .with_children(vec![ViewNode::Text(url_line(url))]),
        ));
    }
    card
}

fn read_card(el: &ViewElement) -> Option<ElementNode> {
    let card_type = el
        .classes
        .iter()
        .filter(|class| !matches!(class.as_str(), TITLE_CLASS | SECTION_CLASS | URL_CLASS))
        .find_map(|class| class.strip_prefix(TYPE_CLASS_PREFIX))
        .filter(|t| !t.is_empty())
        .unwrap_or(FALLBACK_TYPE);
    let mut node = ElementNode::new(SIDE_CARD).with_attr(CARD_TYPE, card_type);

    let pattern = url_pattern();
    let url = el
        .child_elements()
        .find(|child| pattern.matches(child))
        .map(|line| parse_url_line(&line.text_content()))
        .filter(|url| !url.is_empty());
    if let Some(url) = url {
        node = node.with_attr(CARD_URL, url);
    }
    Some(node)
}

const URL_LABEL: &str = "URL:";

/// The bare URL, unless reading it back would change it; then the quoted
/// display form, whose inner text is kept verbatim.
fn url_line(url: &str) -> String {
    if url == url.trim() && !url.starts_with(URL_LABEL) {
        url.to_string()
    } else {
        format!("{URL_LABEL} \"{url}\"")
    }
}

/// Accepts the bare URL as well as the `URL: "..."` display form.
fn parse_url_line(text: &str) -> String {
    let text = text.trim();
    let Some(rest) = text.strip_prefix(URL_LABEL) else {
        return text.to_string();
    };
    let rest = rest.trim_start();
    match rest.strip_prefix('"').and_then(|inner| inner.strip_suffix('"')) {
        Some(inner) => inner.to_string(),
        None => rest.trim_end().to_string(),
    }
}

fn actions(owner: Vec<usize>, types: &Arc<Vec<String>>) -> ViewElement {
    let types = Arc::clone(types);
    create_raw("div", &[ACTIONS_CLASS], BTreeMap::new(), owner, move |raw| {
        raw.button("Set URL", set_url)
            .button("Add section", add_section)
            .button("Toggle type", move |editor, owner, _prompt| {
                toggle_type(editor, owner, &types)
            });
    })
}

fn card_at<'a>(editor: &'a Editor, owner: &[usize]) -> Result<&'a ElementNode, ApplyError> {
    match node_at_path(editor.doc(), owner) {
        Some(Node::Element(el)) if el.kind == SIDE_CARD => Ok(el),
        _ => Err(ApplyError::InvalidPath(format!("No side card at {owner:?}"))),
    }
}

fn set_url(editor: &mut Editor, owner: &[usize], prompt: &mut dyn Prompt) -> Result<(), ApplyError> {
    let current = card_at(editor, owner)?
        .attr_str(CARD_URL)
        .unwrap_or_default()
        .to_string();
    let Some(url) = prompt.prompt("URL", &current) else {
        return Ok(());
    };
    let url = url.trim();
    if url.is_empty() {
        editor.remove_attribute(owner.to_vec(), CARD_URL)
    } else {
        editor.set_attribute(owner.to_vec(), CARD_URL, url)
    }
}

fn add_section(editor: &mut Editor, owner: &[usize], _prompt: &mut dyn Prompt) -> Result<(), ApplyError> {
    card_at(editor, owner)?;
    let section = Node::element(SIDE_CARD_SECTION, vec![Node::paragraph("")]);
    editor.append_node(owner, section)?;
    Ok(())
}

fn toggle_type(editor: &mut Editor, owner: &[usize], types: &[String]) -> Result<(), ApplyError> {
    let current = card_at(editor, owner)?.attr_str(CARD_TYPE).unwrap_or(FALLBACK_TYPE);
    let next = match types.iter().position(|t| t == current) {
        Some(ix) => types[(ix + 1) % types.len()].clone(),
        None => first_type(types).to_string(),
    };
    editor.set_attribute(owner.to_vec(), CARD_TYPE, next)
}

fn first_type(types: &[String]) -> &str {
    types.first().map_or(FALLBACK_TYPE, String::as_str)
}

fn enclosing_card(editor: &Editor) -> Option<&ElementNode> {
    let chain = container_chain(editor.doc(), &editor.selection().focus.path)?;
    let (path, _) = chain.into_iter().rev().find(|(_, kind)| *kind == SIDE_CARD)?;
    node_at_path(editor.doc(), &path)?.as_element()
}

fn insert_card(editor: &mut Editor, types: &[String], args: Option<Value>) -> Result<(), CommandError> {
    let args = args.unwrap_or(Value::Null);
    let card_type = match args.get("type") {
        None | Some(Value::Null) => first_type(types).to_string(),
        Some(Value::String(t)) if types.contains(t) => t.clone(),
        Some(other) => {
            return Err(CommandError::invalid_argument(
                INSERT_COMMAND,
                format!("unknown side card type {other}; expected one of {types:?}"),
            ));
        }
    };
    let url = match args.get("url") {
        None | Some(Value::Null) => None,
        Some(Value::String(url)) if url.trim().is_empty() => None,
        Some(Value::String(url)) => Some(url.trim().to_string()),
        Some(other) => {
            return Err(CommandError::invalid_argument(
                INSERT_COMMAND,
                format!("`url` must be a string, got {other}"),
            ));
        }
    };

    let mut card = ElementNode::new(SIDE_CARD)
        .with_attr(CARD_TYPE, card_type)
        .with_children(vec![
            Node::element(SIDE_CARD_TITLE, Vec::new()),
            Node::element(SIDE_CARD_SECTION, vec![Node::paragraph("")]),
        ]);
    if let Some(url) = url {
        card = card.with_attr(CARD_URL, url);
    }

    let Some(path) = editor
        .insert_content(Node::Element(card))
        .map_err(CommandError::apply(INSERT_COMMAND))?
    else {
        return Ok(());
    };
    let mut title = path;
    title.push(0);
    editor.set_selection(Selection::collapsed(Point::new(title, 0)));
    Ok(())
}

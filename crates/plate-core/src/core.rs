use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::markup::{self, MarkupError};
use crate::ops::{Op, Path, Transaction};
use crate::plugin::{CommandError, CommandInfo, PluginRegistry};
use crate::schema::{PARAGRAPH, ROOT, Schema, SchemaContext, TEXT};
use crate::view::{Prompt, RawPart, ViewNode};

pub type Attrs = BTreeMap<String, Value>;
pub type ElementKind = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Document {
    #[serde(default)]
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Element(ElementNode),
    Text(TextNode),
}

impl Node {
    pub fn element(kind: impl Into<String>, children: Vec<Node>) -> Self {
        Node::Element(ElementNode::new(kind).with_children(children))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(TextNode { text: text.into() })
    }

    /// An empty string yields a paragraph without children, which is how an
    /// empty `<p></p>` reads back.
    pub fn paragraph(text: impl Into<String>) -> Self {
        let text = text.into();
        let children = if text.is_empty() {
            Vec::new()
        } else {
            vec![Node::text(text)]
        };
        Node::element(PARAGRAPH, children)
    }

    pub fn kind(&self) -> &str {
        match self {
            Node::Element(el) => &el.kind,
            Node::Text(_) => TEXT,
        }
    }

    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    pub kind: ElementKind,
    #[serde(default)]
    pub attrs: Attrs,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl ElementNode {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attrs: Attrs::default(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(|v| v.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = (usize, &ElementNode)> {
        self.children
            .iter()
            .enumerate()
            .filter_map(|(ix, node)| node.as_element().map(|el| (ix, el)))
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                Node::Text(t) => out.push_str(&t.text),
                Node::Element(el) => out.push_str(&el.text_content()),
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    pub text: String,
}

/// A caret position. When `path` addresses a text leaf, `offset` is a byte
/// offset into its text; otherwise `path` addresses a container (the root
/// when empty) and `offset` is a child index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    #[serde(default)]
    pub path: Path,
    pub offset: usize,
}

impl Point {
    pub fn new(path: Path, offset: usize) -> Self {
        Self { path, offset }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorEventKind {
    Document,
    Selection,
}

pub struct EditorEvent<'a> {
    pub kind: EditorEventKind,
    pub doc: &'a Document,
    pub selection: &'a Selection,
    pub view: &'a [ViewNode],
    pub ops: &'a [Op],
    pub commands: &'a BTreeMap<String, CommandState>,
}

pub type ChangeListener = Box<dyn FnMut(&EditorEvent<'_>)>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandState {
    pub enabled: bool,
    pub value: Option<Value>,
}

pub struct Editor {
    doc: Document,
    selection: Selection,
    registry: Arc<PluginRegistry>,
    editing_view: Vec<ViewNode>,
    command_states: BTreeMap<String, CommandState>,
    listeners: Vec<ChangeListener>,
    scope_depth: usize,
    pending_ops: Vec<Op>,
    selection_dirty: bool,
    render_count: usize,
}

impl Editor {
    /// Opens `doc` for editing. Every root child is checked against the
    /// schema first; a tree the schema would never build is rejected.
    pub fn new(
        doc: Document,
        selection: Selection,
        registry: impl Into<Arc<PluginRegistry>>,
    ) -> Result<Self, ApplyError> {
        let registry = registry.into();
        let root = SchemaContext::new(vec![ROOT]);
        for child in &doc.children {
            registry.schema().validate_subtree(&root, child)?;
        }
        Ok(Self::assemble(doc, selection, registry))
    }

    fn assemble(doc: Document, selection: Selection, registry: Arc<PluginRegistry>) -> Self {
        let selection = normalize_selection(&doc, &selection);
        let mut editor = Self {
            doc,
            selection,
            registry,
            editing_view: Vec::new(),
            command_states: BTreeMap::new(),
            listeners: Vec::new(),
            scope_depth: 0,
            pending_ops: Vec::new(),
            selection_dirty: false,
            render_count: 0,
        };
        editor.render();
        editor.refresh_commands();
        editor
    }

    /// An empty document with the caret at the root.
    pub fn empty(registry: impl Into<Arc<PluginRegistry>>) -> Self {
        Self::assemble(
            Document::default(),
            Selection::collapsed(Point::new(Vec::new(), 0)),
            registry.into(),
        )
    }

    pub fn with_core_plugins() -> Self {
        Self::empty(PluginRegistry::core())
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn schema(&self) -> &Schema {
        self.registry.schema()
    }

    /// The interactive rendering produced by the last editing downcast pass.
    pub fn editing_view(&self) -> &[ViewNode] {
        &self.editing_view
    }

    pub fn render_count(&self) -> usize {
        self.render_count
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&EditorEvent<'_>) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = normalize_selection(&self.doc, &selection);
        self.selection_dirty = true;
        if self.scope_depth == 0 {
            self.close_scope();
        }
    }

    /// Runs `f` inside a mutation scope. Nested scopes collapse into the
    /// outermost one; the editing view is re-rendered once when it closes.
    pub fn change<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.scope_depth += 1;
        let result = f(self);
        self.scope_depth -= 1;
        if self.scope_depth == 0 {
            self.close_scope();
        }
        result
    }

    pub fn apply(&mut self, tx: Transaction) -> Result<(), ApplyError> {
        self.change(|editor| {
            let registry = Arc::clone(&editor.registry);
            let checkpoint = editor.pending_ops.len();
            let selection_before = editor.selection.clone();

            let structural = tx.ops.iter().filter(|op| op.is_structural()).count();
            let mut inverse_ops: Vec<Op> = Vec::new();
            for op in tx.ops {
                match editor.apply_op(op) {
                    Ok(inv) => inverse_ops.push(inv),
                    Err(err) => {
                        debug!(
                            origin = tx.origin.as_deref().unwrap_or("-"),
                            error = %err,
                            "rolling back transaction"
                        );
                        for inv in inverse_ops.into_iter().rev() {
                            if let Err(rollback_err) = apply_op_to(
                                &mut editor.doc,
                                &mut editor.selection,
                                registry.schema(),
                                inv,
                            ) {
                                warn!(error = %rollback_err, "inverse op failed during rollback");
                            }
                        }
                        editor.pending_ops.truncate(checkpoint);
                        editor.selection = selection_before;
                        return Err(err);
                    }
                }
            }

            trace!(
                origin = tx.origin.as_deref().unwrap_or("-"),
                ops = inverse_ops.len(),
                structural,
                "transaction applied"
            );
            if let Some(sel) = tx.selection {
                editor.selection = normalize_selection(&editor.doc, &sel);
                editor.selection_dirty = true;
            }
            Ok(())
        })
    }

    pub fn insert_node(&mut self, path: Path, node: Node) -> Result<(), ApplyError> {
        self.apply(Transaction::single(Op::InsertNode { path, node }))
    }

    pub fn append_node(&mut self, parent: &[usize], node: Node) -> Result<Path, ApplyError> {
        let len = children_at(&self.doc, parent)
            .ok_or_else(|| ApplyError::InvalidPath(format!("No container at {parent:?}")))?
            .len();
        let mut path = parent.to_vec();
        path.push(len);
        self.insert_node(path.clone(), node)?;
        Ok(path)
    }

    /// Removes the node at `path`. Text leaves left side by side are joined.
    pub fn remove_node(&mut self, path: Path) -> Result<(), ApplyError> {
        let mut ops = vec![Op::RemoveNode { path: path.clone() }];
        if let Some((before, offset, text)) = self.text_join_after_removal(&path) {
            ops.push(Op::RemoveNode { path });
            ops.push(Op::InsertText {
                path: before,
                offset,
                text,
            });
        }
        self.apply(Transaction::new(ops))
    }

    /// The text leaf before `path`, its length, and the text following
    /// `path`, when both neighbours of the node are text.
    fn text_join_after_removal(&self, path: &[usize]) -> Option<(Path, usize, String)> {
        let (&ix, parent) = path.split_last()?;
        let siblings = children_at(&self.doc, parent)?;
        match (siblings.get(ix.checked_sub(1)?), siblings.get(ix + 1)) {
            (Some(Node::Text(prev)), Some(Node::Text(next))) => {
                let mut before = parent.to_vec();
                before.push(ix - 1);
                Some((before, prev.text.len(), next.text.clone()))
            }
            _ => None,
        }
    }

    pub fn set_attribute(
        &mut self,
        path: Path,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), ApplyError> {
        let mut patch = AttrPatch::default();
        patch.set.insert(key.into(), value.into());
        self.apply(Transaction::single(Op::SetAttributes { path, patch }))
    }

    pub fn remove_attribute(&mut self, path: Path, key: impl Into<String>) -> Result<(), ApplyError> {
        let patch = AttrPatch {
            set: Attrs::new(),
            remove: vec![key.into()],
        };
        self.apply(Transaction::single(Op::SetAttributes { path, patch }))
    }

    /// Types `text` at `point`. Inside a widget this is only accepted within
    /// one of its editable regions, and the resulting ops stay inside it.
    pub fn insert_text(&mut self, point: &Point, text: &str) -> Result<(), ApplyError> {
        let container = match node_at_path(&self.doc, &point.path) {
            Some(Node::Text(_)) => point.path[..point.path.len() - 1].to_vec(),
            Some(Node::Element(_)) => point.path.clone(),
            None if point.path.is_empty() => Vec::new(),
            None => {
                return Err(ApplyError::InvalidPath(format!(
                    "No node at {:?}",
                    point.path
                )));
            }
        };
        if !self.schema().is_text_editable_at(&self.doc, &container) {
            return Err(ApplyError::NotEditable(container));
        }

        let mut ops = Vec::new();
        let caret = match node_at_path(&self.doc, &point.path) {
            Some(Node::Text(t)) => {
                let offset = clamp_to_char_boundary(&t.text, point.offset);
                ops.push(Op::InsertText {
                    path: point.path.clone(),
                    offset,
                    text: text.to_string(),
                });
                Point::new(point.path.clone(), offset + text.len())
            }
            _ => {
                let siblings = children_at(&self.doc, &container).unwrap_or(&[]);
                let ix = point.offset.min(siblings.len());
                let mut leaf = container.clone();
                // Adjacent text leaves are extended, never doubled up.
                match (ix.checked_sub(1).and_then(|prev| siblings.get(prev)), siblings.get(ix)) {
                    (Some(Node::Text(before)), _) => {
                        leaf.push(ix - 1);
                        let offset = before.text.len();
                        ops.push(Op::InsertText {
                            path: leaf.clone(),
                            offset,
                            text: text.to_string(),
                        });
                        Point::new(leaf, offset + text.len())
                    }
                    (_, Some(Node::Text(_))) => {
                        leaf.push(ix);
                        ops.push(Op::InsertText {
                            path: leaf.clone(),
                            offset: 0,
                            text: text.to_string(),
                        });
                        Point::new(leaf, text.len())
                    }
                    _ => {
                        leaf.push(ix);
                        ops.push(Op::InsertNode {
                            path: leaf.clone(),
                            node: Node::text(text),
                        });
                        Point::new(leaf, text.len())
                    }
                }
            }
        };

        self.apply(
            Transaction::new(ops)
                .with_selection(Selection::collapsed(caret))
                .origin("typing"),
        )
    }

    /// Inserts `node` at the focus, in the nearest ancestor that accepts it.
    /// An empty paragraph holding the caret is replaced, unless `node` is a
    /// paragraph itself. Returns `None` when
    /// no ancestor accepts the node.
    pub fn insert_content(&mut self, node: Node) -> Result<Option<Path>, ApplyError> {
        let focus = self.selection.focus.clone();
        let Some(parent) = self
            .schema()
            .find_allowed_ancestor(&self.doc, &focus, node.kind())
        else {
            debug!(kind = node.kind(), "no allowed ancestor for insertion");
            return Ok(None);
        };

        let siblings = children_at(&self.doc, &parent)
            .ok_or_else(|| ApplyError::InvalidPath(format!("No container at {parent:?}")))?;
        let (index, replace) = if focus.path == parent {
            (focus.offset.min(siblings.len()), false)
        } else {
            let ix = focus.path[parent.len()];
            let replace = node.kind() != PARAGRAPH
                && matches!(
                    siblings.get(ix),
                    Some(Node::Element(el)) if el.kind == PARAGRAPH && el.children.is_empty()
                );
            (if replace { ix } else { ix + 1 }, replace)
        };

        let mut path = parent;
        path.push(index);

        let mut ops = Vec::new();
        if replace {
            ops.push(Op::RemoveNode { path: path.clone() });
        }
        ops.push(Op::InsertNode {
            path: path.clone(),
            node,
        });
        self.apply(Transaction::new(ops).origin("insert_content"))?;
        Ok(Some(path))
    }

    pub fn get_data(&self) -> String {
        markup::to_markup(&self.registry.conversion().data_downcast(&self.doc))
    }

    /// Replaces the whole document with the upcast of `data`.
    pub fn set_data(&mut self, data: &str) -> Result<(), MarkupError> {
        let view = markup::parse(data)?;
        let doc = self
            .registry
            .conversion()
            .upcast(self.registry.schema(), &view);

        let mut ops: Vec<Op> = (0..self.doc.children.len())
            .rev()
            .map(|ix| Op::RemoveNode { path: vec![ix] })
            .collect();
        ops.extend(
            doc.children
                .into_iter()
                .enumerate()
                .map(|(ix, node)| Op::InsertNode {
                    path: vec![ix],
                    node,
                }),
        );

        let tx = Transaction::new(ops)
            .with_selection(Selection::collapsed(Point::new(Vec::new(), 0)))
            .origin("set_data");
        if let Err(err) = self.apply(tx) {
            // Upcast output is schema-checked, so this only fires on a
            // registry whose upcast and schema disagree.
            warn!(error = %err, "failed to load upcast document");
        }
        Ok(())
    }

    pub fn run_command(&mut self, id: &str, args: Option<Value>) -> Result<(), CommandError> {
        let Some(command) = self.registry.command(id) else {
            return Err(CommandError::Unknown(id.to_string()));
        };
        if !(command.enabled)(self) {
            debug!(command = id, "command is disabled; ignoring");
            return Ok(());
        }
        debug!(command = id, "executing command");
        self.change(|editor| (command.handler)(editor, args))
    }

    pub fn command_state(&self, id: &str) -> Option<&CommandState> {
        self.command_states.get(id)
    }

    pub fn command_states(&self) -> &BTreeMap<String, CommandState> {
        &self.command_states
    }

    pub fn commands(&self) -> Vec<CommandInfo> {
        let mut infos: Vec<CommandInfo> = self
            .registry
            .commands()
            .values()
            .filter(|spec| !spec.hidden)
            .map(CommandInfo::from)
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Runs the handler of the raw control labelled `label` mounted for the
    /// node at `owner`. Returns `false` when no such control is rendered.
    pub fn trigger_control(
        &mut self,
        owner: &[usize],
        label: &str,
        prompt: &mut dyn Prompt,
    ) -> Result<bool, ApplyError> {
        let handler = find_control(&self.editing_view, owner, label);
        let Some(handler) = handler else {
            debug!(?owner, label, "no raw control to trigger");
            return Ok(false);
        };
        self.change(|editor| handler(editor, owner, prompt))?;
        Ok(true)
    }

    /// Model paths of every region rendered as directly editable.
    pub fn editable_regions(&self) -> Vec<Path> {
        fn walk(nodes: &[ViewNode], out: &mut Vec<Path>) {
            for node in nodes {
                let ViewNode::Element(el) = node else {
                    continue;
                };
                if el.editable {
                    if let Some(path) = &el.model_path {
                        out.push(path.clone());
                    }
                }
                walk(&el.children, out);
            }
        }

        let mut out = Vec::new();
        walk(&self.editing_view, &mut out);
        out
    }

    fn close_scope(&mut self) {
        let ops = std::mem::take(&mut self.pending_ops);
        let selection_changed = std::mem::take(&mut self.selection_dirty);
        if ops.is_empty() {
            if selection_changed {
                self.refresh_commands();
                self.notify(EditorEventKind::Selection, &[]);
            }
            return;
        }

        self.render();
        self.refresh_commands();
        self.notify(EditorEventKind::Document, &ops);
    }

    fn render(&mut self) {
        self.editing_view = self.registry.conversion().editing_downcast(&self.doc);
        self.render_count += 1;
        trace!(pass = self.render_count, "editing downcast");
    }

    fn refresh_commands(&mut self) {
        let states: BTreeMap<String, CommandState> = self
            .registry
            .commands()
            .values()
            .map(|spec| {
                let state = CommandState {
                    enabled: (spec.enabled)(self),
                    value: spec.value.as_ref().map(|value| value(self)),
                };
                (spec.id.clone(), state)
            })
            .collect();
        self.command_states = states;
    }

    fn notify(&mut self, kind: EditorEventKind, ops: &[Op]) {
        let mut listeners = std::mem::take(&mut self.listeners);
        let event = EditorEvent {
            kind,
            doc: &self.doc,
            selection: &self.selection,
            view: &self.editing_view,
            ops,
            commands: &self.command_states,
        };
        for listener in listeners.iter_mut() {
            listener(&event);
        }
        self.listeners = listeners;
    }

    fn apply_op(&mut self, op: Op) -> Result<Op, ApplyError> {
        let registry = Arc::clone(&self.registry);
        let inverse = apply_op_to(&mut self.doc, &mut self.selection, registry.schema(), op.clone())?;
        self.pending_ops.push(op);
        Ok(inverse)
    }
}

fn find_control(
    nodes: &[ViewNode],
    owner: &[usize],
    label: &str,
) -> Option<crate::view::ControlHandler> {
    for node in nodes {
        let ViewNode::Element(el) = node else {
            continue;
        };
        if let Some(raw) = &el.raw {
            if raw.owner == owner {
                let handler = raw.parts.iter().find_map(|part| match part {
                    RawPart::Control(control) if control.label == label => {
                        Some(control.handler.clone())
                    }
                    _ => None,
                });
                if handler.is_some() {
                    return handler;
                }
            }
        }
        if let Some(handler) = find_control(&el.children, owner, label) {
            return Some(handler);
        }
    }
    None
}

fn apply_op_to(
    doc: &mut Document,
    selection: &mut Selection,
    schema: &Schema,
    op: Op,
) -> Result<Op, ApplyError> {
    match op {
        Op::InsertText { path, offset, text } => {
            let text_node = node_text_mut(doc, &path)?;
            let offset = clamp_to_char_boundary(&text_node.text, offset);
            text_node.text.insert_str(offset, &text);
            transform_selection_insert_text(selection, &path, offset, text.len());
            Ok(Op::RemoveText {
                path,
                range: offset..offset + text.len(),
            })
        }
        Op::RemoveText { path, range } => {
            let text_node = node_text_mut(doc, &path)?;
            let start =
                clamp_to_char_boundary(&text_node.text, range.start.min(text_node.text.len()));
            let end = clamp_to_char_boundary(&text_node.text, range.end.min(text_node.text.len()));
            if start >= end {
                return Ok(Op::InsertText {
                    path,
                    offset: start,
                    text: String::new(),
                });
            }
            let removed = text_node.text[start..end].to_string();
            text_node.text.replace_range(start..end, "");
            transform_selection_remove_text(selection, &path, start..end);
            Ok(Op::InsertText {
                path,
                offset: start,
                text: removed,
            })
        }
        Op::InsertNode { path, node } => {
            let Some((_, parent_path)) = path.split_last() else {
                return Err(ApplyError::InvalidPath("Empty insert path".into()));
            };
            let context = context_at(doc, parent_path)
                .ok_or_else(|| ApplyError::InvalidPath(format!("No container at {parent_path:?}")))?;
            schema.validate_subtree(&context, &node)?;
            insert_node(doc, &path, node)?;
            transform_selection_insert_node(selection, &path);
            Ok(Op::RemoveNode { path })
        }
        Op::RemoveNode { path } => {
            let removed = remove_node(doc, &path)?;
            transform_selection_remove_node(selection, &path);
            Ok(Op::InsertNode {
                path,
                node: removed,
            })
        }
        Op::SetAttributes { path, patch } => {
            let node = node_mut(doc, &path)?;
            let Node::Element(el) = node else {
                return Err(ApplyError::InvalidPath("Text has no attrs".into()));
            };
            if let Some(attr) = patch
                .set
                .keys()
                .find(|key| !schema.check_attribute(&el.kind, key))
            {
                return Err(ApplyError::AttributeNotAllowed {
                    kind: el.kind.clone(),
                    attr: attr.clone(),
                });
            }
            let old = patch_apply(&mut el.attrs, &patch);
            Ok(Op::SetAttributes { path, patch: old })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("`{child}` is not allowed in `{parent}`")]
    SchemaViolation { parent: String, child: String },
    #[error("attribute `{attr}` is not allowed on `{kind}`")]
    AttributeNotAllowed { kind: String, attr: String },
    #[error("text is not editable at {0:?}")]
    NotEditable(Path),
}

impl From<PathError> for ApplyError {
    fn from(value: PathError) -> Self {
        ApplyError::InvalidPath(value.0)
    }
}

#[derive(Debug)]
pub struct PathError(pub String);

fn clamp_to_char_boundary(s: &str, mut ix: usize) -> usize {
    ix = ix.min(s.len());
    while ix > 0 && !s.is_char_boundary(ix) {
        ix -= 1;
    }
    ix
}

fn transform_selection_insert_text(
    selection: &mut Selection,
    path: &[usize],
    offset: usize,
    len: usize,
) {
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path == path && point.offset >= offset {
            point.offset = point.offset.saturating_add(len);
        }
    }
}

fn transform_selection_remove_text(
    selection: &mut Selection,
    path: &[usize],
    range: std::ops::Range<usize>,
) {
    let removed_len = range.end.saturating_sub(range.start);
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path != path {
            continue;
        }
        if point.offset <= range.start {
            continue;
        }
        if point.offset >= range.end {
            point.offset = point.offset.saturating_sub(removed_len);
        } else {
            point.offset = range.start;
        }
    }
}

fn transform_selection_insert_node(selection: &mut Selection, path: &[usize]) {
    let Some((&index, parent_path)) = path.split_last() else {
        return;
    };

    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path == parent_path {
            if point.offset >= index {
                point.offset += 1;
            }
            continue;
        }
        if point.path.len() <= parent_path.len() || !point.path.starts_with(parent_path) {
            continue;
        }
        let depth = parent_path.len();
        if point.path[depth] >= index {
            point.path[depth] += 1;
        }
    }
}

fn transform_selection_remove_node(selection: &mut Selection, path: &[usize]) {
    let Some((&index, parent_path)) = path.split_last() else {
        return;
    };

    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path == parent_path {
            if point.offset > index {
                point.offset -= 1;
            }
            continue;
        }
        if point.path.len() <= parent_path.len() || !point.path.starts_with(parent_path) {
            continue;
        }
        let depth = parent_path.len();
        let ix = point.path[depth];
        if ix > index {
            point.path[depth] = ix - 1;
            continue;
        }
        if ix < index {
            continue;
        }

        // Point was inside the removed subtree; park it in the parent.
        point.path.truncate(depth);
        point.offset = index;
    }
}

pub fn node_at_path<'a>(doc: &'a Document, path: &[usize]) -> Option<&'a Node> {
    let (&first, rest) = path.split_first()?;
    let mut node = doc.children.get(first)?;
    for &ix in rest {
        node = match node {
            Node::Element(el) => el.children.get(ix)?,
            Node::Text(_) => return None,
        };
    }
    Some(node)
}

/// Children of the container at `path`; the empty path is the root.
pub fn children_at<'a>(doc: &'a Document, path: &[usize]) -> Option<&'a [Node]> {
    if path.is_empty() {
        return Some(&doc.children);
    }
    match node_at_path(doc, path)? {
        Node::Element(el) => Some(&el.children),
        Node::Text(_) => None,
    }
}

/// The chain of containers enclosing `path`, outermost (the root) first. A
/// path ending on a text leaf contributes its parent element as innermost.
pub fn container_chain<'a>(doc: &'a Document, path: &[usize]) -> Option<Vec<(Path, &'a str)>> {
    let mut chain: Vec<(Path, &'a str)> = vec![(Vec::new(), ROOT)];
    let mut children: &'a [Node] = &doc.children;
    for (depth, &ix) in path.iter().enumerate() {
        match children.get(ix)? {
            Node::Element(el) => {
                chain.push((path[..=depth].to_vec(), el.kind.as_str()));
                children = &el.children;
            }
            Node::Text(_) if depth + 1 == path.len() => break,
            Node::Text(_) => return None,
        }
    }
    Some(chain)
}

/// Schema context of the container at `path`: its type and all ancestors'.
pub fn context_at<'a>(doc: &'a Document, path: &[usize]) -> Option<SchemaContext<'a>> {
    if let Some(Node::Text(_)) = node_at_path(doc, path) {
        return None;
    }
    let chain = container_chain(doc, path)?;
    Some(SchemaContext::new(chain.into_iter().map(|(_, kind)| kind).collect()))
}

fn normalize_selection(doc: &Document, selection: &Selection) -> Selection {
    Selection {
        anchor: normalize_point(doc, &selection.anchor),
        focus: normalize_point(doc, &selection.focus),
    }
}

fn normalize_point(doc: &Document, point: &Point) -> Point {
    let mut resolved: Path = Vec::new();
    let mut children: &[Node] = &doc.children;
    for &wanted in &point.path {
        match children.get(wanted) {
            Some(Node::Element(el)) => {
                resolved.push(wanted);
                children = &el.children;
            }
            Some(Node::Text(t)) => {
                resolved.push(wanted);
                return Point::new(resolved, clamp_to_char_boundary(&t.text, point.offset));
            }
            None => {
                let offset = children.len();
                return Point::new(resolved, offset);
            }
        }
    }
    Point::new(resolved, point.offset.min(children.len()))
}

fn node_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut Node, PathError> {
    let Some((&first, rest)) = path.split_first() else {
        return Err(PathError("Empty path".into()));
    };

    let len = doc.children.len();
    let mut node = doc.children.get_mut(first).ok_or_else(|| {
        PathError(format!("Path out of bounds at depth 0: {first} >= {len}"))
    })?;
    for (depth, &ix) in rest.iter().enumerate() {
        node = match node {
            Node::Element(el) => {
                let len = el.children.len();
                el.children.get_mut(ix).ok_or_else(|| {
                    PathError(format!(
                        "Path out of bounds at depth {}: {ix} >= {len}",
                        depth + 1
                    ))
                })?
            }
            Node::Text(_) => {
                return Err(PathError(format!("Non-container node at depth {depth}")));
            }
        };
    }
    Ok(node)
}

fn node_text_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut TextNode, PathError> {
    match node_mut(doc, path)? {
        Node::Text(t) => Ok(t),
        _ => Err(PathError("Expected Text node".into())),
    }
}

fn children_mut<'a>(doc: &'a mut Document, parent_path: &[usize]) -> Result<&'a mut Vec<Node>, PathError> {
    if parent_path.is_empty() {
        return Ok(&mut doc.children);
    }
    match node_mut(doc, parent_path)? {
        Node::Element(el) => Ok(&mut el.children),
        Node::Text(_) => Err(PathError("Parent is not a container".into())),
    }
}

fn insert_node(doc: &mut Document, path: &[usize], node: Node) -> Result<(), PathError> {
    let Some((&index, parent_path)) = path.split_last() else {
        return Err(PathError("Empty insert path".into()));
    };

    let children = children_mut(doc, parent_path)?;
    if index > children.len() {
        return Err(PathError(format!(
            "Insert index out of bounds: {index} > {}",
            children.len()
        )));
    }
    children.insert(index, node);
    Ok(())
}

fn remove_node(doc: &mut Document, path: &[usize]) -> Result<Node, PathError> {
    let Some((&index, parent_path)) = path.split_last() else {
        return Err(PathError("Empty remove path".into()));
    };

    let children = children_mut(doc, parent_path)?;
    if index >= children.len() {
        return Err(PathError(format!(
            "Remove index out of bounds: {index} >= {}",
            children.len()
        )));
    }
    Ok(children.remove(index))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttrPatch {
    #[serde(default)]
    pub set: Attrs,
    #[serde(default)]
    pub remove: Vec<String>,
}

fn patch_apply(attrs: &mut Attrs, patch: &AttrPatch) -> AttrPatch {
    let mut old_set: Attrs = Attrs::new();
    let mut old_remove: Vec<String> = Vec::new();

    for (k, v) in &patch.set {
        if let Some(prev) = attrs.insert(k.clone(), v.clone()) {
            old_set.insert(k.clone(), prev);
        } else {
            old_remove.push(k.clone());
        }
    }

    for key in &patch.remove {
        if let Some(prev) = attrs.remove(key) {
            old_set.insert(key.clone(), prev);
        }
    }

    AttrPatch {
        set: old_set,
        remove: old_remove,
    }
}

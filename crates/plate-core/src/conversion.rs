use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::core::{Document, ElementNode, Node, TextNode};
use crate::ops::Path;
use crate::schema::{PARAGRAPH, ROOT, Schema, SchemaContext, TEXT};
use crate::view::{ViewElement, ViewNode, strip_editing_decorations};
use crate::widget::{to_widget, to_widget_editable};

/// Matches a view element by tag name plus a set of classes that must all be
/// present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewPattern {
    pub name: String,
    pub classes: Vec<String>,
}

impl ViewPattern {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            classes: Vec::new(),
        }
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn matches(&self, el: &ViewElement) -> bool {
        el.name == self.name && self.classes.iter().all(|c| el.has_class(c))
    }
}

impl fmt::Display for ViewPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for class in &self.classes {
            write!(f, ".{class}")?;
        }
        Ok(())
    }
}

type UpcastBuilder = dyn Fn(&ViewElement) -> Option<ElementNode> + Send + Sync;
type UpcastFinish = dyn Fn(&mut ElementNode) + Send + Sync;

#[derive(Clone)]
pub struct UpcastRule {
    pub pattern: ViewPattern,
    pub model_type: String,
    build: Arc<UpcastBuilder>,
    consumes: Vec<ViewPattern>,
    read_children: bool,
    finish: Option<Arc<UpcastFinish>>,
}

impl UpcastRule {
    pub fn element_to_element(pattern: ViewPattern, model_type: impl Into<String>) -> Self {
        let model_type = model_type.into();
        let kind = model_type.clone();
        Self::builder(pattern, model_type, move |_| Some(ElementNode::new(kind.clone())))
    }

    /// `build` may decline an element by returning `None`; older rules are
    /// then tried.
    pub fn builder(
        pattern: ViewPattern,
        model_type: impl Into<String>,
        build: impl Fn(&ViewElement) -> Option<ElementNode> + Send + Sync + 'static,
    ) -> Self {
        Self {
            pattern,
            model_type: model_type.into(),
            build: Arc::new(build),
            consumes: Vec::new(),
            read_children: true,
            finish: None,
        }
    }

    /// View children matching `pattern` carry attribute data and are not
    /// converted into content nodes.
    pub fn consumes(mut self, pattern: ViewPattern) -> Self {
        self.consumes.push(pattern);
        self
    }

    /// The builder has already read everything it needs from the element's
    /// content.
    pub fn without_children(mut self) -> Self {
        self.read_children = false;
        self
    }

    /// Runs after the children have been converted, e.g. to add mandatory
    /// regions missing from the input.
    pub fn finish(mut self, finish: impl Fn(&mut ElementNode) + Send + Sync + 'static) -> Self {
        self.finish = Some(Arc::new(finish));
        self
    }
}

impl fmt::Debug for UpcastRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpcastRule")
            .field("pattern", &self.pattern)
            .field("model_type", &self.model_type)
            .field("consumes", &self.consumes)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    Data,
    Editing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Marking {
    Plain,
    Widget(String),
    Editable,
}

type DowncastBuilder = dyn Fn(&ElementNode, &DowncastContext<'_>) -> ViewElement + Send + Sync;

#[derive(Clone)]
enum DowncastKind {
    Template {
        name: String,
        classes: Vec<String>,
        attrs: BTreeMap<String, String>,
    },
    Builder(Arc<DowncastBuilder>),
}

#[derive(Clone)]
pub struct DowncastRule {
    pub model_type: String,
    kind: DowncastKind,
    marking: Marking,
}

impl DowncastRule {
    pub fn element_to_element(model_type: impl Into<String>, name: impl Into<String>, classes: &[&str]) -> Self {
        Self {
            model_type: model_type.into(),
            kind: DowncastKind::Template {
                name: name.into(),
                classes: classes.iter().map(|c| c.to_string()).collect(),
                attrs: BTreeMap::new(),
            },
            marking: Marking::Plain,
        }
    }

    pub fn builder(
        model_type: impl Into<String>,
        build: impl Fn(&ElementNode, &DowncastContext<'_>) -> ViewElement + Send + Sync + 'static,
    ) -> Self {
        Self {
            model_type: model_type.into(),
            kind: DowncastKind::Builder(Arc::new(build)),
            marking: Marking::Plain,
        }
    }

    /// Fixed view attribute on a template rule. Builder rules set their own.
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let DowncastKind::Template { attrs, .. } = &mut self.kind {
            attrs.insert(key.into(), value.into());
        }
        self
    }

    /// Renders the element as an atomic widget. Ignored by the data pipeline.
    pub fn as_widget(mut self, label: impl Into<String>) -> Self {
        self.marking = Marking::Widget(label.into());
        self
    }

    /// Renders the element as an editable region. Ignored by the data
    /// pipeline.
    pub fn as_editable(mut self) -> Self {
        self.marking = Marking::Editable;
        self
    }
}

impl fmt::Debug for DowncastRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            DowncastKind::Template { name, .. } => name.as_str(),
            DowncastKind::Builder(_) => "<builder>",
        };
        f.debug_struct("DowncastRule")
            .field("model_type", &self.model_type)
            .field("kind", &kind)
            .field("marking", &self.marking)
            .finish()
    }
}

/// Handed to downcast builders so they can render the children of the node
/// they convert.
pub struct DowncastContext<'a> {
    conversion: &'a Conversion,
    pipeline: Pipeline,
    path: Path,
}

impl DowncastContext<'_> {
    pub fn pipeline(&self) -> Pipeline {
        self.pipeline
    }

    pub fn is_editing(&self) -> bool {
        self.pipeline == Pipeline::Editing
    }

    /// Path of the node being converted.
    pub fn path(&self) -> &[usize] {
        &self.path
    }

    pub fn child_path(&self, ix: usize) -> Path {
        let mut path = self.path.clone();
        path.push(ix);
        path
    }

    pub fn convert_children(&self, node: &ElementNode) -> Vec<ViewNode> {
        self.conversion
            .convert_children(self.pipeline, &node.children, &self.path)
    }

    /// Children of a child element at `path`, for builders that wrap their
    /// children themselves.
    pub fn convert_children_at(&self, node: &ElementNode, path: &[usize]) -> Vec<ViewNode> {
        self.conversion
            .convert_children(self.pipeline, &node.children, path)
    }

    pub fn convert_node(&self, node: &Node, path: Path) -> Vec<ViewNode> {
        self.conversion.convert_node(self.pipeline, node, path)
    }

    /// Marks `element` editable on the editing pipeline only.
    pub fn editable(&self, element: ViewElement) -> ViewElement {
        if self.is_editing() {
            to_widget_editable(element)
        } else {
            element
        }
    }
}

/// The three rule tables. Each table is scanned from the most recently added
/// rule backwards and the first match wins.
#[derive(Debug, Clone, Default)]
pub struct Conversion {
    upcast: Vec<UpcastRule>,
    data: Vec<DowncastRule>,
    editing: Vec<DowncastRule>,
}

impl Conversion {
    pub fn add_upcast(&mut self, rule: UpcastRule) {
        self.upcast.push(rule);
    }

    pub fn add_downcast(&mut self, pipeline: Pipeline, rule: DowncastRule) {
        match pipeline {
            Pipeline::Data => self.data.push(rule),
            Pipeline::Editing => self.editing.push(rule),
        }
    }

    pub fn upcast_rules(&self) -> &[UpcastRule] {
        &self.upcast
    }

    pub fn downcast_rules(&self, pipeline: Pipeline) -> &[DowncastRule] {
        match pipeline {
            Pipeline::Data => &self.data,
            Pipeline::Editing => &self.editing,
        }
    }

    pub fn data_downcast(&self, doc: &Document) -> Vec<ViewNode> {
        self.downcast(Pipeline::Data, doc)
    }

    pub fn editing_downcast(&self, doc: &Document) -> Vec<ViewNode> {
        self.downcast(Pipeline::Editing, doc)
    }

    pub fn downcast(&self, pipeline: Pipeline, doc: &Document) -> Vec<ViewNode> {
        let out = self.convert_children(pipeline, &doc.children, &[]);
        match pipeline {
            // Builders may reuse editing helpers; data output never keeps them.
            Pipeline::Data => strip_editing_decorations(&out),
            Pipeline::Editing => out,
        }
    }

    /// Reads a view tree back into a document. Elements without a rule are
    /// flattened, raw elements are skipped, and nodes the schema rejects are
    /// dropped.
    pub fn upcast(&self, schema: &Schema, view: &[ViewNode]) -> Document {
        let mut ctx = vec![ROOT.to_string()];
        let raw = self.upcast_children(schema, &mut ctx, view, &[]);
        Document {
            children: settle(schema, &ctx, raw),
        }
    }

    fn convert_children(&self, pipeline: Pipeline, children: &[Node], parent: &[usize]) -> Vec<ViewNode> {
        let mut out = Vec::new();
        for (ix, child) in children.iter().enumerate() {
            let mut path = parent.to_vec();
            path.push(ix);
            out.extend(self.convert_node(pipeline, child, path));
        }
        out
    }

    fn convert_node(&self, pipeline: Pipeline, node: &Node, path: Path) -> Vec<ViewNode> {
        let el = match node {
            Node::Text(TextNode { text }) if text.is_empty() => return Vec::new(),
            Node::Text(TextNode { text }) => return vec![ViewNode::Text(text.clone())],
            Node::Element(el) => el,
        };

        let Some(rule) = self.downcast_rule(pipeline, &el.kind) else {
            debug!(kind = %el.kind, ?pipeline, "no downcast rule; flattening");
            return self.convert_children(pipeline, &el.children, &path);
        };

        let ctx = DowncastContext {
            conversion: self,
            pipeline,
            path: path.clone(),
        };
        let mut view = match &rule.kind {
            DowncastKind::Template {
                name,
                classes,
                attrs,
            } => {
                let mut view = ViewElement::new(name.clone());
                for class in classes {
                    view.add_class(class.clone());
                }
                view.attrs = attrs.clone();
                view.children = ctx.convert_children(el);
                view
            }
            DowncastKind::Builder(build) => build(el, &ctx),
        };

        if pipeline == Pipeline::Editing {
            view = match &rule.marking {
                Marking::Plain => view,
                Marking::Widget(label) => to_widget(view, label.clone()),
                Marking::Editable => to_widget_editable(view),
            };
        }
        if view.model_path.is_none() {
            view.model_path = Some(path);
        }
        vec![ViewNode::Element(view)]
    }

    /// Editing falls back to the data rules for types it does not decorate.
    fn downcast_rule(&self, pipeline: Pipeline, kind: &str) -> Option<&DowncastRule> {
        match pipeline {
            Pipeline::Data => find_downcast(&self.data, kind),
            Pipeline::Editing => {
                find_downcast(&self.editing, kind).or_else(|| find_downcast(&self.data, kind))
            }
        }
    }

    fn upcast_element(&self, el: &ViewElement) -> Option<(&UpcastRule, ElementNode)> {
        self.upcast
            .iter()
            .rev()
            .filter(|rule| rule.pattern.matches(el))
            .find_map(|rule| (rule.build)(el).map(|node| (rule, node)))
    }

    fn upcast_children(
        &self,
        schema: &Schema,
        ctx: &mut Vec<String>,
        view: &[ViewNode],
        consumed: &[ViewPattern],
    ) -> Vec<Node> {
        let mut out = Vec::new();
        for child in view {
            let el = match child {
                ViewNode::Text(text) => {
                    out.push(Node::text(text.clone()));
                    continue;
                }
                ViewNode::Element(el) => el,
            };
            if el.raw.is_some() {
                debug!(name = %el.name, "skipping raw view element");
                continue;
            }
            if consumed.iter().any(|pattern| pattern.matches(el)) {
                continue;
            }

            let Some((rule, mut node)) = self.upcast_element(el) else {
                out.extend(self.upcast_children(schema, ctx, &el.children, &[]));
                continue;
            };

            if rule.read_children {
                ctx.push(node.kind.clone());
                let children = self.upcast_children(schema, ctx, &el.children, &rule.consumes);
                node.children = settle(schema, ctx, children);
                ctx.pop();
            }
            if let Some(finish) = &rule.finish {
                finish(&mut node);
            }
            out.push(Node::Element(node));
        }
        out
    }
}

/// Fits converted children into the container described by `ctx`: adjacent
/// text is merged, stray text and inline content is wrapped in paragraphs
/// where that makes it fit, anything else that does not fit is dropped.
fn settle(schema: &Schema, ctx: &[String], nodes: Vec<Node>) -> Vec<Node> {
    let context = SchemaContext::from_names(ctx);
    let text_allowed = schema.check_child(&context, TEXT);
    let paragraph_allowed = schema.check_child(&context, PARAGRAPH);
    let mut paragraph_ctx = context.clone();
    paragraph_ctx.push(PARAGRAPH);

    let mut out = Vec::new();
    let mut run: Vec<Node> = Vec::new();
    for node in merge_text(nodes) {
        if let Node::Text(t) = &node {
            if !text_allowed && t.text.trim().is_empty() {
                if !run.is_empty() {
                    run.push(node);
                }
                continue;
            }
        }

        if schema.validate_subtree(&context, &node).is_ok() {
            flush_paragraph(&mut run, &mut out);
            out.push(node);
        } else if paragraph_allowed && schema.validate_subtree(&paragraph_ctx, &node).is_ok() {
            run.push(node);
        } else {
            debug!(
                parent = context.last().unwrap_or(ROOT),
                child = node.kind(),
                "dropping upcast node rejected by schema"
            );
        }
    }
    flush_paragraph(&mut run, &mut out);
    out
}

fn flush_paragraph(run: &mut Vec<Node>, out: &mut Vec<Node>) {
    if run.is_empty() {
        return;
    }
    let mut children = merge_text(std::mem::take(run));
    if let Some(Node::Text(t)) = children.first_mut() {
        t.text = t.text.trim_start().to_string();
    }
    if let Some(Node::Text(t)) = children.last_mut() {
        t.text = t.text.trim_end().to_string();
    }
    children.retain(|node| !matches!(node, Node::Text(t) if t.text.is_empty()));
    if !children.is_empty() {
        out.push(Node::element(PARAGRAPH, children));
    }
}

fn find_downcast<'a>(rules: &'a [DowncastRule], kind: &str) -> Option<&'a DowncastRule> {
    rules.iter().rev().find(|rule| rule.model_type == kind)
}

fn merge_text(nodes: Vec<Node>) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::with_capacity(nodes.len());
    for node in nodes {
        if let Node::Text(t) = &node {
            if t.text.is_empty() {
                continue;
            }
            if let Some(Node::Text(prev)) = out.last_mut() {
                prev.text.push_str(&t.text);
                continue;
            }
        }
        out.push(node);
    }
    out
}

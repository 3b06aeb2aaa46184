use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::core::{ApplyError, Editor};
use crate::ops::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum ViewNode {
    Element(ViewElement),
    Text(String),
}

impl ViewNode {
    pub fn as_element(&self) -> Option<&ViewElement> {
        match self {
            ViewNode::Element(el) => Some(el),
            ViewNode::Text(_) => None,
        }
    }
}

/// A rendered element. The `atomic`, `editable` and `raw` capabilities are
/// only ever set by the editing pipeline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewElement {
    pub name: String,
    pub classes: Vec<String>,
    pub attrs: BTreeMap<String, String>,
    pub children: Vec<ViewNode>,
    pub atomic: bool,
    pub label: Option<String>,
    pub editable: bool,
    pub raw: Option<RawFragment>,
    pub model_path: Option<Path>,
}

impl ViewElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.add_class(class);
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn with_children(mut self, children: Vec<ViewNode>) -> Self {
        self.children = children;
        self
    }

    pub fn add_class(&mut self, class: impl Into<String>) {
        let class = class.into();
        if !self.has_class(&class) {
            self.classes.push(class);
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn push(&mut self, node: ViewNode) {
        self.children.push(node);
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &ViewElement> {
        self.children.iter().filter_map(ViewNode::as_element)
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                ViewNode::Text(text) => out.push_str(text),
                ViewNode::Element(el) => out.push_str(&el.text_content()),
            }
        }
        out
    }

    /// The element as the data pipeline would produce it: raw children are
    /// dropped and widget/editable markers removed, recursively.
    pub fn without_editing_decorations(&self) -> ViewElement {
        let mut out = ViewElement {
            name: self.name.clone(),
            classes: self
                .classes
                .iter()
                .filter(|c| !crate::widget::DECORATION_CLASSES.contains(&c.as_str()))
                .cloned()
                .collect(),
            attrs: self
                .attrs
                .iter()
                .filter(|(k, _)| !crate::widget::DECORATION_ATTRS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            children: Vec::new(),
            atomic: false,
            label: None,
            editable: false,
            raw: None,
            model_path: self.model_path.clone(),
        };
        for child in &self.children {
            match child {
                ViewNode::Element(el) if el.raw.is_some() => {}
                ViewNode::Element(el) => out
                    .children
                    .push(ViewNode::Element(el.without_editing_decorations())),
                ViewNode::Text(text) => out.children.push(ViewNode::Text(text.clone())),
            }
        }
        out
    }
}

pub fn strip_editing_decorations(nodes: &[ViewNode]) -> Vec<ViewNode> {
    nodes
        .iter()
        .filter_map(|node| match node {
            ViewNode::Element(el) if el.raw.is_some() => None,
            ViewNode::Element(el) => Some(ViewNode::Element(el.without_editing_decorations())),
            ViewNode::Text(text) => Some(ViewNode::Text(text.clone())),
        })
        .collect()
}

/// External source of attribute values for raw controls (a prompt dialog in
/// a real host).
pub trait Prompt {
    fn prompt(&mut self, message: &str, default: &str) -> Option<String>;
}

pub type ControlHandler =
    Arc<dyn Fn(&mut Editor, &[usize], &mut dyn Prompt) -> Result<(), ApplyError> + Send + Sync>;

#[derive(Clone)]
pub struct RawControl {
    pub label: String,
    pub handler: ControlHandler,
}

impl fmt::Debug for RawControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawControl")
            .field("label", &self.label)
            .finish()
    }
}

impl PartialEq for RawControl {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawPart {
    Text(String),
    Control(RawControl),
}

/// Interactive-only content. It is owned by the node at `owner`, is never
/// read back by upcast and never appears in data output.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawFragment {
    pub owner: Path,
    pub parts: Vec<RawPart>,
}

pub struct RawWriter {
    parts: Vec<RawPart>,
}

impl RawWriter {
    pub(crate) fn new() -> Self {
        Self { parts: Vec::new() }
    }

    pub fn text(&mut self, text: impl Into<String>) -> &mut Self {
        self.parts.push(RawPart::Text(text.into()));
        self
    }

    pub fn button(
        &mut self,
        label: impl Into<String>,
        handler: impl Fn(&mut Editor, &[usize], &mut dyn Prompt) -> Result<(), ApplyError>
        + Send
        + Sync
        + 'static,
    ) -> &mut Self {
        self.parts.push(RawPart::Control(RawControl {
            label: label.into(),
            handler: Arc::new(handler),
        }));
        self
    }

    pub(crate) fn finish(self) -> Vec<RawPart> {
        self.parts
    }
}

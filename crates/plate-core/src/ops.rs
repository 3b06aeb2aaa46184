use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::core::{AttrPatch, Node, Selection};

pub type Path = Vec<usize>;

/// A primitive edit of the content tree. Every op has an exact inverse, which
/// the editor records while applying so a failing transaction can be undone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    InsertText {
        #[serde(default)]
        path: Path,
        offset: usize,
        text: String,
    },
    RemoveText {
        #[serde(default)]
        path: Path,
        range: Range<usize>,
    },
    InsertNode {
        #[serde(default)]
        path: Path,
        node: Node,
    },
    RemoveNode {
        #[serde(default)]
        path: Path,
    },
    SetAttributes {
        #[serde(default)]
        path: Path,
        patch: AttrPatch,
    },
}

impl Op {
    pub fn path(&self) -> &[usize] {
        match self {
            Op::InsertText { path, .. }
            | Op::RemoveText { path, .. }
            | Op::InsertNode { path, .. }
            | Op::RemoveNode { path }
            | Op::SetAttributes { path, .. } => path,
        }
    }

    /// Whether the op adds or removes nodes, as opposed to editing one in place.
    pub fn is_structural(&self) -> bool {
        matches!(self, Op::InsertNode { .. } | Op::RemoveNode { .. })
    }
}

/// Ops applied atomically, plus the selection to restore once they land.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub ops: Vec<Op>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<Selection>,
    /// Who asked for the change; only used for logging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl Transaction {
    pub fn new(ops: Vec<Op>) -> Self {
        Self {
            ops,
            ..Self::default()
        }
    }

    pub fn single(op: Op) -> Self {
        Self::new(vec![op])
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = Some(selection);
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

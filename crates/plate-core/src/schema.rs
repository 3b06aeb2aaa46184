use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::core::{ApplyError, Document, Node, Point, container_chain};
use crate::ops::Path;
use crate::plugin::RegistryError;

pub const ROOT: &str = "$root";
pub const BLOCK: &str = "$block";
pub const TEXT: &str = "$text";
pub const PARAGRAPH: &str = "paragraph";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Allowed as a direct child of the named type.
    In(String),
    /// Allowed wherever the named type is allowed.
    Where(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeDescriptor {
    pub name: String,
    pub is_object: bool,
    pub is_limit: bool,
    pub is_inline: bool,
    pub placement: Vec<Placement>,
    pub allow_content_of: Option<String>,
    pub allow_attributes: Vec<String>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn object(mut self) -> Self {
        self.is_object = true;
        self
    }

    pub fn limit(mut self) -> Self {
        self.is_limit = true;
        self
    }

    pub fn inline(mut self) -> Self {
        self.is_inline = true;
        self
    }

    pub fn allow_in(mut self, parent: impl Into<String>) -> Self {
        self.placement.push(Placement::In(parent.into()));
        self
    }

    pub fn allow_where(mut self, other: impl Into<String>) -> Self {
        self.placement.push(Placement::Where(other.into()));
        self
    }

    pub fn allow_content_of(mut self, other: impl Into<String>) -> Self {
        self.allow_content_of = Some(other.into());
        self
    }

    pub fn allow_attributes<I, S>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_attributes
            .extend(attrs.into_iter().map(Into::into));
        self
    }

    /// Objects are always limits.
    pub fn is_limit(&self) -> bool {
        self.is_limit || self.is_object
    }

    fn referenced_types(&self) -> impl Iterator<Item = &str> {
        self.placement
            .iter()
            .map(|p| match p {
                Placement::In(name) | Placement::Where(name) => name.as_str(),
            })
            .chain(self.allow_content_of.as_deref())
    }
}

/// The ancestry a child is checked against, outermost (the root) first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaContext<'a> {
    items: Vec<&'a str>,
}

impl<'a> SchemaContext<'a> {
    pub fn new(items: Vec<&'a str>) -> Self {
        Self { items }
    }

    pub fn from_names(names: &'a [String]) -> Self {
        Self {
            items: names.iter().map(String::as_str).collect(),
        }
    }

    pub fn items(&self) -> &[&'a str] {
        &self.items
    }

    pub fn last(&self) -> Option<&'a str> {
        self.items.last().copied()
    }

    pub fn ends_with(&self, name: &str) -> bool {
        self.last() == Some(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.iter().any(|item| *item == name)
    }

    pub fn push(&mut self, name: &'a str) {
        self.items.push(name);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildVote {
    Allow,
    Deny,
    Abstain,
}

type ChildCheckFn = dyn Fn(&SchemaContext<'_>, &TypeDescriptor) -> ChildVote + Send + Sync;

#[derive(Clone)]
pub struct ChildCheck {
    pub id: String,
    check: Arc<ChildCheckFn>,
}

impl ChildCheck {
    pub fn new(
        id: impl Into<String>,
        check: impl Fn(&SchemaContext<'_>, &TypeDescriptor) -> ChildVote + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            check: Arc::new(check),
        }
    }

    /// Denies `child` anywhere below `region`, however deeply nested.
    pub fn deny_inside(region: impl Into<String>, child: impl Into<String>) -> Self {
        let region = region.into();
        let child = child.into();
        Self::new(format!("deny:{child}@{region}"), move |ctx, def| {
            if def.name == child && ctx.contains(&region) {
                ChildVote::Deny
            } else {
                ChildVote::Abstain
            }
        })
    }

    pub fn vote(&self, ctx: &SchemaContext<'_>, def: &TypeDescriptor) -> ChildVote {
        (self.check)(ctx, def)
    }
}

impl fmt::Debug for ChildCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildCheck").field("id", &self.id).finish()
    }
}

/// Type descriptors plus child checks. Built once while the plugin registry
/// is assembled and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    types: BTreeMap<String, TypeDescriptor>,
    checks: Vec<ChildCheck>,
}

impl Schema {
    pub fn register(&mut self, descriptor: TypeDescriptor) -> Result<(), RegistryError> {
        if self.types.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateType(descriptor.name));
        }
        debug!(kind = %descriptor.name, "registering type");
        self.types.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    pub fn add_child_check(&mut self, check: ChildCheck) {
        self.checks.push(check);
    }

    pub fn descriptor(&self, name: &str) -> Option<&TypeDescriptor> {
        self.types.get(name)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn is_object(&self, name: &str) -> bool {
        self.descriptor(name).is_some_and(|d| d.is_object)
    }

    pub fn is_limit(&self, name: &str) -> bool {
        self.descriptor(name).is_some_and(TypeDescriptor::is_limit)
    }

    pub fn is_inline(&self, name: &str) -> bool {
        self.descriptor(name).is_some_and(|d| d.is_inline)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Placement first, then every child check; a single deny rejects the
    /// child regardless of other votes.
    pub fn check_child(&self, ctx: &SchemaContext<'_>, child: &str) -> bool {
        let Some(def) = self.descriptor(child) else {
            return false;
        };
        let Some(parent) = ctx.last() else {
            return false;
        };
        if !self.placement_allows(parent, child) {
            return false;
        }
        for check in &self.checks {
            if check.vote(ctx, def) == ChildVote::Deny {
                debug!(check = %check.id, parent, child, "child denied");
                return false;
            }
        }
        true
    }

    pub fn check_attribute(&self, kind: &str, attr: &str) -> bool {
        self.descriptor(kind)
            .is_some_and(|d| d.allow_attributes.iter().any(|a| a == attr))
    }

    /// Nearest container enclosing `point` (including the innermost one)
    /// that accepts `child`. The walk does not leave a limit element.
    pub fn find_allowed_ancestor(&self, doc: &Document, point: &Point, child: &str) -> Option<Path> {
        let chain = container_chain(doc, &point.path)?;
        for depth in (0..chain.len()).rev() {
            let ctx = SchemaContext::new(chain[..=depth].iter().map(|(_, kind)| *kind).collect());
            if self.check_child(&ctx, child) {
                return Some(chain[depth].0.clone());
            }
            if self.is_limit(chain[depth].1) {
                return None;
            }
        }
        None
    }

    /// Text may be edited outside any object, or inside a limit region that
    /// sits below the nearest enclosing object.
    pub fn is_text_editable_at(&self, doc: &Document, container: &[usize]) -> bool {
        let Some(chain) = container_chain(doc, container) else {
            return false;
        };
        let Some(object_depth) = chain.iter().rposition(|(_, kind)| self.is_object(kind)) else {
            return true;
        };
        chain[object_depth + 1..]
            .iter()
            .any(|(_, kind)| self.is_limit(kind))
    }

    /// Checks `node` and all of its descendants as if attached below `ctx`.
    pub fn validate_subtree(&self, ctx: &SchemaContext<'_>, node: &Node) -> Result<(), ApplyError> {
        let kind = node.kind();
        if !self.check_child(ctx, kind) {
            return Err(ApplyError::SchemaViolation {
                parent: ctx.last().unwrap_or(ROOT).to_string(),
                child: kind.to_string(),
            });
        }
        let Node::Element(el) = node else {
            return Ok(());
        };
        if let Some(attr) = el.attrs.keys().find(|attr| !self.check_attribute(kind, attr)) {
            return Err(ApplyError::AttributeNotAllowed {
                kind: kind.to_string(),
                attr: attr.clone(),
            });
        }
        let mut inner = ctx.clone();
        inner.push(kind);
        for child in &el.children {
            self.validate_subtree(&inner, child)?;
        }
        Ok(())
    }

    pub(crate) fn validate_references(&self) -> Result<(), RegistryError> {
        for def in self.types.values() {
            if let Some(missing) = def.referenced_types().find(|name| !self.is_registered(name)) {
                return Err(RegistryError::UnknownType {
                    kind: missing.to_string(),
                    referenced_by: format!("type `{}`", def.name),
                });
            }
        }
        Ok(())
    }

    fn placement_allows(&self, parent: &str, child: &str) -> bool {
        let mut parents = BTreeSet::new();
        self.resolve_parents(child, &mut BTreeSet::new(), &mut parents);
        self.content_sources(parent)
            .iter()
            .any(|source| parents.contains(*source))
    }

    fn resolve_parents<'a>(
        &'a self,
        kind: &'a str,
        seen: &mut BTreeSet<&'a str>,
        out: &mut BTreeSet<&'a str>,
    ) {
        if !seen.insert(kind) {
            return;
        }
        let Some(def) = self.descriptor(kind) else {
            return;
        };
        for placement in &def.placement {
            match placement {
                Placement::In(parent) => {
                    out.insert(parent.as_str());
                }
                Placement::Where(other) => self.resolve_parents(other, seen, out),
            }
        }
    }

    /// `parent` itself followed by every type it borrows content from.
    fn content_sources<'a>(&'a self, parent: &'a str) -> Vec<&'a str> {
        let mut sources = vec![parent];
        let mut current = parent;
        while let Some(next) = self
            .descriptor(current)
            .and_then(|d| d.allow_content_of.as_deref())
        {
            if sources.contains(&next) {
                break;
            }
            sources.push(next);
            current = next;
        }
        sources
    }
}

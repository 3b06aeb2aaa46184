use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::conversion::{Conversion, DowncastRule, Pipeline, UpcastRule, ViewPattern};
use crate::core::{ApplyError, Editor, Node, Point, Selection};
use crate::schema::{BLOCK, ChildCheck, PARAGRAPH, ROOT, Schema, TEXT, TypeDescriptor};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command `{0}`")]
    Unknown(String),
    #[error("invalid argument for `{command}`: {message}")]
    InvalidArgument { command: String, message: String },
    #[error("command `{command}` failed")]
    Apply {
        command: String,
        #[source]
        source: ApplyError,
    },
}

impl CommandError {
    pub fn invalid_argument(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn apply(command: impl Into<String>) -> impl FnOnce(ApplyError) -> Self {
        let command = command.into();
        move |source| Self::Apply { command, source }
    }
}

/// Plugin definition defects. All of them are detected while the registry is
/// assembled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("type `{0}` is registered twice")]
    DuplicateType(String),
    #[error("unknown type `{kind}` referenced by {referenced_by}")]
    UnknownType { kind: String, referenced_by: String },
    #[error("duplicate command id `{0}`")]
    DuplicateCommand(String),
    #[error("duplicate plugin id `{0}`")]
    DuplicatePlugin(String),
}

pub type CommandHandler =
    Arc<dyn Fn(&mut Editor, Option<Value>) -> Result<(), CommandError> + Send + Sync>;
pub type CommandPredicate = Arc<dyn Fn(&Editor) -> bool + Send + Sync>;
pub type CommandValue = Arc<dyn Fn(&Editor) -> Value + Send + Sync>;

#[derive(Clone)]
pub struct CommandSpec {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub args_example: Option<Value>,
    pub hidden: bool,
    pub handler: CommandHandler,
    pub enabled: CommandPredicate,
    pub value: Option<CommandValue>,
}

impl CommandSpec {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        handler: impl Fn(&mut Editor, Option<Value>) -> Result<(), CommandError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            keywords: Vec::new(),
            args_example: None,
            hidden: false,
            handler: Arc::new(handler),
            enabled: Arc::new(|_| true),
            value: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn args_example(mut self, args_example: Value) -> Self {
        self.args_example = Some(args_example);
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Recomputed after every mutation scope and selection change. Running a
    /// disabled command is a no-op.
    pub fn enabled_when(mut self, enabled: impl Fn(&Editor) -> bool + Send + Sync + 'static) -> Self {
        self.enabled = Arc::new(enabled);
        self
    }

    pub fn value_with(mut self, value: impl Fn(&Editor) -> Value + Send + Sync + 'static) -> Self {
        self.value = Some(Arc::new(value));
        self
    }
}

/// What the UI factory needs to build a control for a command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandInfo {
    pub id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args_example: Option<Value>,
}

impl From<&CommandSpec> for CommandInfo {
    fn from(spec: &CommandSpec) -> Self {
        Self {
            id: spec.id.clone(),
            label: spec.label.clone(),
            description: spec.description.clone(),
            keywords: spec.keywords.clone(),
            args_example: spec.args_example.clone(),
        }
    }
}

pub trait PlatePlugin: Send + Sync {
    fn id(&self) -> &'static str;
    fn types(&self) -> Vec<TypeDescriptor> {
        Vec::new()
    }
    fn child_checks(&self) -> Vec<ChildCheck> {
        Vec::new()
    }
    fn upcast_rules(&self) -> Vec<UpcastRule> {
        Vec::new()
    }
    fn data_downcast_rules(&self) -> Vec<DowncastRule> {
        Vec::new()
    }
    /// Types without an editing rule render through their data rule.
    fn editing_downcast_rules(&self) -> Vec<DowncastRule> {
        Vec::new()
    }
    fn commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }
}

/// Schema, conversion tables and commands contributed by a fixed set of
/// plugins. Immutable once built.
#[derive(Default)]
pub struct PluginRegistry {
    plugin_ids: Vec<&'static str>,
    schema: Schema,
    conversion: Conversion,
    commands: HashMap<String, CommandSpec>,
}

impl PluginRegistry {
    pub fn new(plugins: impl IntoIterator<Item = Box<dyn PlatePlugin>>) -> Result<Self, RegistryError> {
        let mut registry = Self::default();
        for plugin in plugins {
            registry.register_plugin(plugin.as_ref())?;
        }
        registry.validate()?;
        Ok(registry)
    }

    pub fn core() -> Self {
        let plugins: Vec<Box<dyn PlatePlugin>> = vec![Box::new(CoreParagraphPlugin)];
        Self::new(plugins).expect("core registry must be valid")
    }

    fn register_plugin(&mut self, plugin: &dyn PlatePlugin) -> Result<(), RegistryError> {
        let id = plugin.id();
        if self.plugin_ids.contains(&id) {
            return Err(RegistryError::DuplicatePlugin(id.to_string()));
        }
        debug!(plugin = id, "registering plugin");
        self.plugin_ids.push(id);

        for descriptor in plugin.types() {
            self.schema.register(descriptor)?;
        }
        for check in plugin.child_checks() {
            self.schema.add_child_check(check);
        }
        for rule in plugin.upcast_rules() {
            self.conversion.add_upcast(rule);
        }
        for rule in plugin.data_downcast_rules() {
            self.conversion.add_downcast(Pipeline::Data, rule);
        }
        for rule in plugin.editing_downcast_rules() {
            self.conversion.add_downcast(Pipeline::Editing, rule);
        }
        for cmd in plugin.commands() {
            if self.commands.contains_key(&cmd.id) {
                return Err(RegistryError::DuplicateCommand(cmd.id));
            }
            self.commands.insert(cmd.id.clone(), cmd);
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), RegistryError> {
        self.schema.validate_references()?;

        let unknown = |kind: &str, referenced_by: String| {
            if self.schema.is_registered(kind) {
                Ok(())
            } else {
                Err(RegistryError::UnknownType {
                    kind: kind.to_string(),
                    referenced_by,
                })
            }
        };
        for rule in self.conversion.upcast_rules() {
            unknown(&rule.model_type, format!("upcast rule for `{}`", rule.pattern))?;
        }
        for pipeline in [Pipeline::Data, Pipeline::Editing] {
            for rule in self.conversion.downcast_rules(pipeline) {
                unknown(&rule.model_type, format!("{pipeline:?} downcast rule"))?;
            }
        }
        Ok(())
    }

    pub fn plugin_ids(&self) -> &[&'static str] {
        &self.plugin_ids
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn conversion(&self) -> &Conversion {
        &self.conversion
    }

    pub fn commands(&self) -> &HashMap<String, CommandSpec> {
        &self.commands
    }

    pub fn command(&self, id: &str) -> Option<CommandSpec> {
        self.commands.get(id).cloned()
    }
}

/// Generic structure every registry starts from: the root, block and text
/// placement classes, and paragraphs.
pub struct CoreParagraphPlugin;

impl PlatePlugin for CoreParagraphPlugin {
    fn id(&self) -> &'static str {
        "core.paragraph"
    }

    fn types(&self) -> Vec<TypeDescriptor> {
        vec![
            TypeDescriptor::new(ROOT).limit(),
            TypeDescriptor::new(BLOCK).allow_in(ROOT),
            TypeDescriptor::new(TEXT).allow_in(BLOCK),
            TypeDescriptor::new(PARAGRAPH)
                .allow_where(BLOCK)
                .allow_content_of(BLOCK),
        ]
    }

    fn upcast_rules(&self) -> Vec<UpcastRule> {
        vec![UpcastRule::element_to_element(ViewPattern::new("p"), PARAGRAPH)]
    }

    fn data_downcast_rules(&self) -> Vec<DowncastRule> {
        vec![DowncastRule::element_to_element(PARAGRAPH, "p", &[])]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("paragraph.insert", "Insert paragraph", |editor, _args| {
                let inserted = editor
                    .insert_content(Node::paragraph(""))
                    .map_err(CommandError::apply("paragraph.insert"))?;
                if let Some(path) = inserted {
                    editor.set_selection(Selection::collapsed(Point::new(path, 0)));
                }
                Ok(())
            })
            .description("Insert an empty paragraph after the current block.")
            .keywords(["paragraph", "p", "text"])
            .enabled_when(|editor| {
                editor
                    .schema()
                    .find_allowed_ancestor(editor.doc(), &editor.selection().focus, PARAGRAPH)
                    .is_some()
            }),
        ]
    }
}

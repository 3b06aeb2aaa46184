use manos_plate_core::{
    BLOCK, ChildCheck, CommandError, CommandSpec, DowncastRule, Editor, ElementNode, Node,
    PlatePlugin, Point, ROOT, Selection, TypeDescriptor, UpcastRule, ViewPattern,
};
use tracing::debug;

/// A box widget family: a container holding a title region, a description
/// region and, for some families, an input region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxFamily {
    pub plugin_id: &'static str,
    pub container: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub input: Option<&'static str>,
    /// Class of the container; regions use `{class}-title` and so on.
    pub class: &'static str,
    pub label: &'static str,
    pub command: &'static str,
}

pub const WIDGET_BOX: BoxFamily = BoxFamily {
    plugin_id: "widgets.widget_box",
    container: "widgetBox",
    title: "widgetBoxTitle",
    description: "widgetBoxDescription",
    input: None,
    class: "widget-box",
    label: "widget box",
    command: "widgetBox.insert",
};

pub const INSERT_BOX: BoxFamily = BoxFamily {
    plugin_id: "widgets.insert_box",
    container: "insertBox",
    title: "insertBoxTitle",
    description: "insertBoxDescription",
    input: Some("insertBoxInput"),
    class: "insert-box",
    label: "insert box",
    command: "insertBox.insert",
};

impl BoxFamily {
    fn region_class(&self, region: &str) -> String {
        format!("{}-{region}", self.class)
    }

    fn description_node(&self) -> ElementNode {
        ElementNode::new(self.description).with_children(vec![Node::paragraph("")])
    }

    /// The mandatory subtree inserted by the family's command.
    pub fn subtree(&self) -> Node {
        let mut children = vec![
            Node::element(self.title, Vec::new()),
            Node::Element(self.description_node()),
        ];
        if let Some(input) = self.input {
            children.push(Node::element(input, Vec::new()));
        }
        Node::element(self.container, children)
    }

    /// Keeps exactly the mandatory regions, in order, creating empty ones
    /// for those the input did not have.
    fn complete(&self, node: &mut ElementNode) {
        let mut take = |kind: &str| {
            let ix = node.children.iter().position(|c| c.kind() == kind)?;
            Some(node.children.remove(ix))
        };
        let title = take(self.title).unwrap_or_else(|| Node::element(self.title, Vec::new()));
        let description = take(self.description)
            .unwrap_or_else(|| Node::Element(self.description_node()));
        let input = self
            .input
            .map(|input| take(input).unwrap_or_else(|| Node::element(input, Vec::new())));

        if !node.children.is_empty() {
            debug!(
                container = self.container,
                extra = node.children.len(),
                "dropping children outside the box regions"
            );
        }
        node.children = [Some(title), Some(description), input]
            .into_iter()
            .flatten()
            .collect();
    }
}

pub struct BoxWidgetPlugin {
    family: BoxFamily,
}

impl BoxWidgetPlugin {
    pub fn new(family: BoxFamily) -> Self {
        Self { family }
    }

    pub fn widget_box() -> Self {
        Self::new(WIDGET_BOX)
    }

    pub fn insert_box() -> Self {
        Self::new(INSERT_BOX)
    }
}

impl PlatePlugin for BoxWidgetPlugin {
    fn id(&self) -> &'static str {
        self.family.plugin_id
    }

    fn types(&self) -> Vec<TypeDescriptor> {
        let f = &self.family;
        let mut types = vec![
            TypeDescriptor::new(f.container).object().allow_where(BLOCK),
            TypeDescriptor::new(f.title)
                .limit()
                .allow_in(f.container)
                .allow_content_of(BLOCK),
            TypeDescriptor::new(f.description)
                .limit()
                .allow_in(f.container)
                .allow_content_of(ROOT),
        ];
        if let Some(input) = f.input {
            types.push(TypeDescriptor::new(input).allow_in(f.container));
        }
        types
    }

    fn child_checks(&self) -> Vec<ChildCheck> {
        vec![ChildCheck::deny_inside(
            self.family.description,
            self.family.container,
        )]
    }

    fn upcast_rules(&self) -> Vec<UpcastRule> {
        let f = self.family;
        let mut rules = vec![
            UpcastRule::element_to_element(
                ViewPattern::new("section").class(f.class),
                f.container,
            )
            .finish(move |node| f.complete(node)),
            UpcastRule::element_to_element(
                ViewPattern::new("h1").class(f.region_class("title")),
                f.title,
            ),
            UpcastRule::element_to_element(
                ViewPattern::new("div").class(f.region_class("description")),
                f.description,
            )
            .finish(|node| {
                if node.children.is_empty() {
                    node.children.push(Node::paragraph(""));
                }
            }),
        ];
        if let Some(input) = f.input {
            rules.push(
                UpcastRule::element_to_element(
                    ViewPattern::new("input").class(f.region_class("input")),
                    input,
                )
                .without_children(),
            );
        }
        rules
    }

    fn data_downcast_rules(&self) -> Vec<DowncastRule> {
        data_rules(&self.family)
    }

    /// The input region renders through its data rule.
    fn editing_downcast_rules(&self) -> Vec<DowncastRule> {
        let f = &self.family;
        let title_class = f.region_class("title");
        let description_class = f.region_class("description");
        vec![
            DowncastRule::element_to_element(f.container, "section", &[f.class])
                .as_widget(f.label),
            DowncastRule::element_to_element(f.title, "h1", &[title_class.as_str()])
                .as_editable(),
            DowncastRule::element_to_element(f.description, "div", &[description_class.as_str()])
                .as_editable(),
        ]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        let f = self.family;
        vec![
            CommandSpec::new(f.command, format!("Insert {}", f.label), move |editor, _args| {
                insert_box(editor, &f)
            })
            .description(format!(
                "Insert a {} with a title and a description at the selection.",
                f.label
            ))
            .keywords(["box", "widget", f.class])
            .enabled_when(move |editor| {
                editor
                    .schema()
                    .find_allowed_ancestor(editor.doc(), &editor.selection().focus, f.container)
                    .is_some()
            }),
        ]
    }
}

fn data_rules(f: &BoxFamily) -> Vec<DowncastRule> {
    let title_class = f.region_class("title");
    let description_class = f.region_class("description");
    let mut rules = vec![
        DowncastRule::element_to_element(f.container, "section", &[f.class]),
        DowncastRule::element_to_element(f.title, "h1", &[title_class.as_str()]),
        DowncastRule::element_to_element(f.description, "div", &[description_class.as_str()]),
    ];
    if let Some(input) = f.input {
        let input_class = f.region_class("input");
        rules.push(DowncastRule::element_to_element(
            input,
            "input",
            &[input_class.as_str()],
        ));
    }
    rules
}

fn insert_box(editor: &mut Editor, f: &BoxFamily) -> Result<(), CommandError> {
    let Some(path) = editor
        .insert_content(f.subtree())
        .map_err(CommandError::apply(f.command))?
    else {
        return Ok(());
    };
    let mut title = path;
    title.push(0);
    editor.set_selection(Selection::collapsed(Point::new(title, 0)));
    Ok(())
}

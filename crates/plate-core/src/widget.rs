use std::collections::BTreeMap;

use crate::ops::Path;
use crate::view::{RawFragment, RawWriter, ViewElement};

pub const WIDGET_CLASS: &str = "ck-widget";
pub const EDITABLE_CLASSES: [&str; 2] = ["ck-editor__editable", "ck-editor__nested-editable"];
pub const CONTENTEDITABLE: &str = "contenteditable";

pub(crate) const DECORATION_CLASSES: [&str; 3] = [
    WIDGET_CLASS,
    EDITABLE_CLASSES[0],
    EDITABLE_CLASSES[1],
];
pub(crate) const DECORATION_ATTRS: [&str; 1] = [CONTENTEDITABLE];

/// Turns `element` into an atomic widget: one caret stop, selected, dragged
/// and deleted as a whole.
pub fn to_widget(mut element: ViewElement, label: impl Into<String>) -> ViewElement {
    element.atomic = true;
    element.label = Some(label.into());
    element.add_class(WIDGET_CLASS);
    element
        .attrs
        .insert(CONTENTEDITABLE.to_string(), "false".to_string());
    element
}

/// Carves `element` out of its enclosing widget as a region that accepts
/// ordinary typing.
pub fn to_widget_editable(mut element: ViewElement) -> ViewElement {
    element.editable = true;
    for class in EDITABLE_CLASSES {
        element.add_class(class);
    }
    element
        .attrs
        .insert(CONTENTEDITABLE.to_string(), "true".to_string());
    element
}

/// An element whose content comes from `build` instead of the content tree.
pub fn create_raw(
    name: impl Into<String>,
    classes: &[&str],
    attrs: BTreeMap<String, String>,
    owner: Path,
    build: impl FnOnce(&mut RawWriter),
) -> ViewElement {
    let mut writer = RawWriter::new();
    build(&mut writer);

    let mut element = ViewElement::new(name);
    for class in classes {
        element.add_class(*class);
    }
    element.attrs = attrs;
    element.raw = Some(RawFragment {
        owner,
        parts: writer.finish(),
    });
    element
}

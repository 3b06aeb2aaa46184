mod box_widget;
mod config;
mod placeholder;
mod side_card;

use manos_plate_core::{CoreParagraphPlugin, Editor, PlatePlugin, PluginRegistry, RegistryError};
use thiserror::Error;

pub use crate::box_widget::*;
pub use crate::config::*;
pub use crate::placeholder::{NAME, PLACEHOLDER, PlaceholderPlugin};
pub use crate::side_card::{
    CARD_TYPE, CARD_URL, SIDE_CARD, SIDE_CARD_SECTION, SIDE_CARD_TITLE, SideCardPlugin,
};

pub const PLACEHOLDER_INSERT: &str = placeholder::INSERT_COMMAND;
pub const SIDE_CARD_INSERT: &str = side_card::INSERT_COMMAND;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Core structure plus every widget family, in registration order.
pub fn plugins(config: &WidgetsConfig) -> Vec<Box<dyn PlatePlugin>> {
    vec![
        Box::new(CoreParagraphPlugin),
        Box::new(BoxWidgetPlugin::widget_box()),
        Box::new(BoxWidgetPlugin::insert_box()),
        Box::new(SideCardPlugin::new(&config.side_card)),
        Box::new(PlaceholderPlugin::new(&config.placeholder)),
    ]
}

/// Validates `config` and registers every plugin.
pub fn registry(config: &WidgetsConfig) -> Result<PluginRegistry, SetupError> {
    config.validate()?;
    Ok(PluginRegistry::new(plugins(config))?)
}

/// An empty editor with every widget family registered.
pub fn editor(config: &WidgetsConfig) -> Result<Editor, SetupError> {
    Ok(Editor::empty(registry(config)?))
}

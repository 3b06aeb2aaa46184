mod conversion;
mod core;
pub mod markup;
mod ops;
mod plugin;
mod schema;
mod stored;
mod view;
mod widget;

pub use crate::conversion::*;
pub use crate::core::*;
pub use crate::markup::MarkupError;
pub use crate::ops::*;
pub use crate::plugin::*;
pub use crate::schema::*;
pub use crate::stored::*;
pub use crate::view::*;
pub use crate::widget::*;

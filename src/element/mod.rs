pub mod actions;
pub mod tree;

pub use actions::{ClickOptions, Element, InsertOptions, Via};
pub use tree::{ElementId, ElementSpec, UiTree};

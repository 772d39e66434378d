// Builds the UI map declared under `[[elements]]` in the config.
use crate::config::ElementEntry;
use crate::element::tree::{ElementSpec, UiTree};
use crate::errors::{MarketError, MarketResult};

/// Parents must be declared before their children; names are unique.
pub fn build_tree(entries: &[ElementEntry]) -> MarketResult<UiTree> {
    let mut tree = UiTree::new();
    for entry in entries {
        let parent = match &entry.parent {
            Some(parent) => Some(tree.find(parent).ok_or_else(|| {
                MarketError::Config(format!(
                    "element '{}' refers to parent '{parent}' which is not declared before it",
                    entry.name
                ))
            })?),
            None => None,
        };
        tree.insert(parent, spec_for(entry))?;
    }
    tracing::debug!(elements = tree.len(), "UI map built");
    Ok(tree)
}

fn spec_for(entry: &ElementEntry) -> ElementSpec {
    let image = match entry.image.as_deref() {
        None => Some(entry.name.clone()),
        Some("") => None,
        Some(image) => Some(image.to_string()),
    };
    let mut spec = ElementSpec::new(entry.name.clone()).image(image);
    if let Some([x, y]) = entry.offset {
        spec = spec.at(x, y);
    }
    spec
}

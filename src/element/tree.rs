//! Arena backed element tree.
//!
//! Parents own their children through a name keyed map of ids; children keep
//! a plain id back to their parent. Cached absolute locations are refreshed
//! top-down whenever an offset or a parent link changes, so every descendant
//! always reflects the latest ancestor position.

use std::collections::{BTreeMap, HashMap};

use crate::errors::{MarketError, MarketResult};
use crate::perception::types::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(usize);

/// Declarative description of an element and its subtree.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSpec {
    pub name: String,
    pub offset: Option<Point>,
    /// Bound reference image; `None` means coordinate only.
    pub image: Option<String>,
    pub children: Vec<ElementSpec>,
}

impl ElementSpec {
    /// An element bound to the reference image of the same name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            image: Some(name.clone()),
            name,
            offset: None,
            children: Vec::new(),
        }
    }

    pub fn at(mut self, x: i32, y: i32) -> Self {
        self.offset = Some(Point::new(x, y));
        self
    }

    pub fn image(mut self, image: Option<String>) -> Self {
        self.image = image;
        self
    }

    pub fn child(mut self, child: ElementSpec) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = ElementSpec>) -> Self {
        self.children.extend(children);
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) name: String,
    pub(crate) offset: Option<Point>,
    pub(crate) location: Option<Point>,
    pub(crate) parent: Option<ElementId>,
    pub(crate) children: BTreeMap<String, ElementId>,
    pub(crate) image: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct UiTree {
    nodes: Vec<Node>,
    by_name: HashMap<String, ElementId>,
}

impl UiTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<ElementId> {
        self.by_name.get(name).copied()
    }

    pub(crate) fn node(&self, id: ElementId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    fn node_mut(&mut self, id: ElementId) -> MarketResult<&mut Node> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| MarketError::Config(format!("unknown element id {}", id.0)))
    }

    /// Every element without a parent, in registration order.
    pub fn roots(&self) -> Vec<ElementId> {
        (0..self.nodes.len())
            .map(ElementId)
            .filter(|id| self.nodes[id.0].parent.is_none())
            .collect()
    }

    /// Register `spec` and its subtree under `parent` (or as a root).
    pub fn insert(&mut self, parent: Option<ElementId>, spec: ElementSpec) -> MarketResult<ElementId> {
        if let Some(p) = parent {
            let node = self
                .node(p)
                .ok_or_else(|| MarketError::Config(format!("unknown element id {}", p.0)))?;
            if node.children.contains_key(&spec.name) {
                return Err(MarketError::Config(format!(
                    "'{}' already has a child named '{}'",
                    node.name, spec.name
                )));
            }
        }
        self.check_names_free(&spec)?;
        let id = self.insert_unchecked(parent, spec);
        self.refresh(id);
        Ok(id)
    }

    fn check_names_free(&self, spec: &ElementSpec) -> MarketResult<()> {
        if self.by_name.contains_key(&spec.name) {
            return Err(MarketError::Config(format!("duplicate element name '{}'", spec.name)));
        }
        spec.children.iter().try_for_each(|c| self.check_names_free(c))
    }

    fn insert_unchecked(&mut self, parent: Option<ElementId>, spec: ElementSpec) -> ElementId {
        let id = ElementId(self.nodes.len());
        self.nodes.push(Node {
            name: spec.name.clone(),
            offset: spec.offset,
            location: None,
            parent,
            children: BTreeMap::new(),
            image: spec.image.filter(|i| !i.is_empty()),
        });
        self.by_name.insert(spec.name.clone(), id);
        if let Some(p) = parent {
            self.nodes[p.0].children.insert(spec.name, id);
        }
        for child in spec.children {
            self.insert_unchecked(Some(id), child);
        }
        id
    }

    /// Add a new child subtree. An existing child with the same name is kept
    /// unless `overwrite`, in which case it is detached and replaced.
    /// Returns whether the child was added.
    pub fn add_child(&mut self, parent: ElementId, spec: ElementSpec, overwrite: bool) -> MarketResult<bool> {
        let existing = self
            .node(parent)
            .ok_or_else(|| MarketError::Config(format!("unknown element id {}", parent.0)))?
            .children
            .get(&spec.name)
            .copied();
        if let Some(old) = existing {
            if !overwrite {
                tracing::debug!(child = %spec.name, "child already present, keeping it");
                return Ok(false);
            }
            self.detach(old);
            self.by_name.remove(&spec.name);
            tracing::info!(child = %spec.name, "Child overwritten");
        }
        self.check_names_free(&spec)?;
        let name = spec.name.clone();
        let id = self.insert_unchecked(Some(parent), spec);
        self.refresh(id);
        tracing::info!(child = %name, "Child added");
        Ok(true)
    }

    /// Detach the named child from `parent`. The child survives as a root.
    pub fn remove_child(&mut self, parent: ElementId, name: &str) -> Option<ElementId> {
        let child = self.nodes.get(parent.0)?.children.get(name).copied()?;
        self.detach(child);
        tracing::info!(child = %name, "Child removed");
        Some(child)
    }

    fn detach(&mut self, child: ElementId) {
        let Some(parent) = self.nodes[child.0].parent.take() else {
            return;
        };
        let name = self.nodes[child.0].name.clone();
        self.nodes[parent.0].children.remove(&name);
        self.refresh(child);
    }

    /// Move `child` under `parent`, or make it a root with `None`.
    pub fn set_parent(&mut self, child: ElementId, parent: Option<ElementId>) -> MarketResult<()> {
        let name = self.node_mut(child)?.name.clone();
        if let Some(p) = parent {
            let target = self
                .node(p)
                .ok_or_else(|| MarketError::Config(format!("unknown element id {}", p.0)))?;
            if self.is_ancestor_or_self(child, p) {
                return Err(MarketError::Config(format!(
                    "cannot move '{name}' under its own descendant '{}'",
                    target.name
                )));
            }
            if let Some(&other) = target.children.get(&name) {
                if other != child {
                    return Err(MarketError::Config(format!(
                        "'{}' already has a child named '{name}'",
                        target.name
                    )));
                }
            }
        }
        self.detach(child);
        if let Some(p) = parent {
            self.nodes[child.0].parent = Some(p);
            self.nodes[p.0].children.insert(name, child);
        }
        self.refresh(child);
        Ok(())
    }

    fn is_ancestor_or_self(&self, ancestor: ElementId, mut id: ElementId) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            match self.nodes[id.0].parent {
                Some(p) => id = p,
                None => return false,
            }
        }
    }

    /// Set the declared offset (absolute for roots) and refresh the subtree.
    pub fn set_location(&mut self, id: ElementId, offset: Point) -> MarketResult<()> {
        self.node_mut(id)?.offset = Some(offset);
        self.refresh(id);
        Ok(())
    }

    /// Pin the element at an absolute screen position by rewriting its offset
    /// relative to the parent.
    pub fn anchor(&mut self, id: ElementId, absolute: Point) -> MarketResult<()> {
        let parent = self.node_mut(id)?.parent;
        let parent_location = parent.map(|p| self.nodes[p.0].location.unwrap_or(Point::ORIGIN));
        let offset = match parent_location {
            Some(base) => absolute - base,
            None => absolute,
        };
        self.set_location(id, offset)
    }

    /// Recompute cached locations for `id` and all its descendants.
    fn refresh(&mut self, id: ElementId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current.0];
            let location = match node.parent {
                None => node.offset,
                Some(p) => {
                    let base = self.nodes[p.0].location.unwrap_or(Point::ORIGIN);
                    Some(base + node.offset.unwrap_or(Point::ORIGIN))
                }
            };
            self.nodes[current.0].location = location;
            stack.extend(self.nodes[current.0].children.values().copied());
        }
        tracing::trace!(element = %self.nodes[id.0].name, "locations refreshed");
    }

    /// Ancestors from the root down to and including `id`.
    pub fn walk_path(&self, id: ElementId) -> Vec<ElementId> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(c) = current {
            path.push(c);
            current = self.nodes.get(c.0).and_then(|n| n.parent);
        }
        path.reverse();
        path
    }

    /// Depth first listing with nesting depth, roots in registration order.
    pub fn outline(&self) -> Vec<(usize, ElementId)> {
        let mut out = Vec::new();
        let mut stack: Vec<(usize, ElementId)> = self.roots().into_iter().rev().map(|r| (0, r)).collect();
        while let Some((depth, id)) = stack.pop() {
            out.push((depth, id));
            stack.extend(self.nodes[id.0].children.values().rev().map(|c| (depth + 1, *c)));
        }
        out
    }
}

//! Dependent selection over parent→child trees.
//!
//! One selector type serves category→subcategory (two levels) and
//! country→province→city (three levels). A selection at any level is always
//! a child of the selection one level up; changing a level clears every
//! level below it.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Selection errors. The selector state is unchanged when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("Invalid selection: {id} is not an option at level {level}")]
    UnknownOption { level: usize, id: u64 },

    #[error("Invalid selection: level {level} is out of range for a {depth}-level hierarchy")]
    LevelOutOfRange { level: usize, depth: usize },

    #[error("Incomplete selection: nothing selected at level {level}")]
    Incomplete { level: usize },
}

/// A node of a category or location tree.
///
/// The backend names child lists after their level (`subcategories`,
/// `provinces`, `cities`); all of them land in `children`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(
        default,
        alias = "subcategories",
        alias = "provinces",
        alias = "cities"
    )]
    pub children: Vec<HierarchyNode>,
}

impl HierarchyNode {
    pub fn leaf(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            slug: None,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<HierarchyNode>) -> Self {
        self.children = children;
        self
    }
}

/// Snapshot of the selected ids, top level first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    pub parent: Option<u64>,
    pub child: Option<u64>,
    /// Only ever set on three-level hierarchies.
    pub grandchild: Option<u64>,
}

/// Dependent-selection state machine over a loaded tree.
#[derive(Debug, Clone)]
pub struct HierarchySelector {
    tree: Vec<HierarchyNode>,
    /// One slot per level.
    path: Vec<Option<u64>>,
}

impl HierarchySelector {
    /// Selector with `depth` levels (at least one).
    pub fn new(depth: usize) -> Self {
        Self {
            tree: Vec::new(),
            path: vec![None; depth.max(1)],
        }
    }

    /// Category → subcategory.
    pub fn two_level() -> Self {
        Self::new(2)
    }

    /// Country → province → city.
    pub fn three_level() -> Self {
        Self::new(3)
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Replace the tree and drop any selection made against the old one.
    pub fn load_tree(&mut self, tree: Vec<HierarchyNode>) {
        debug!(roots = tree.len(), depth = self.depth(), "hierarchy loaded");
        self.tree = tree;
        self.reset();
    }

    pub fn reset(&mut self) {
        self.path.iter_mut().for_each(|slot| *slot = None);
    }

    /// Select a top-level node, clearing every deeper level.
    ///
    /// The id is not validated: an unknown id is kept and simply yields no
    /// child options.
    pub fn select_parent(&mut self, id: Option<u64>) {
        self.reset();
        self.path[0] = id;
    }

    pub fn select_child(&mut self, id: u64) -> Result<(), SelectionError> {
        self.select_at(1, id)
    }

    pub fn select_grandchild(&mut self, id: u64) -> Result<(), SelectionError> {
        self.select_at(2, id)
    }

    /// Select `id` at `level`; levels below are cleared.
    ///
    /// Below the top level `id` must be one of the currently visible
    /// options, otherwise the call is rejected and nothing changes.
    pub fn select_at(&mut self, level: usize, id: u64) -> Result<(), SelectionError> {
        if level >= self.depth() {
            return Err(SelectionError::LevelOutOfRange {
                level,
                depth: self.depth(),
            });
        }
        if level == 0 {
            self.select_parent(Some(id));
            return Ok(());
        }
        if !self.options(level).iter().any(|node| node.id == id) {
            debug!(level, id, "rejected selection outside visible options");
            return Err(SelectionError::UnknownOption { level, id });
        }
        self.path[level] = Some(id);
        for slot in &mut self.path[level + 1..] {
            *slot = None;
        }
        Ok(())
    }

    /// Clear the selection at `level` and below.
    pub fn clear_from(&mut self, level: usize) {
        for slot in self.path.iter_mut().skip(level) {
            *slot = None;
        }
    }

    /// Options visible at `level`: the roots for level 0, otherwise the
    /// children of the node selected one level up (empty if none).
    pub fn options(&self, level: usize) -> &[HierarchyNode] {
        if level >= self.depth() {
            return &[];
        }
        let mut nodes: &[HierarchyNode] = &self.tree;
        for slot in &self.path[..level] {
            let Some(id) = slot else {
                return &[];
            };
            match nodes.iter().find(|node| node.id == *id) {
                Some(node) => nodes = &node.children,
                None => return &[],
            }
        }
        nodes
    }

    pub fn selected(&self, level: usize) -> Option<u64> {
        self.path.get(level).copied().flatten()
    }

    /// The selected node at `level`, if it exists in the loaded tree.
    pub fn selected_node(&self, level: usize) -> Option<&HierarchyNode> {
        let id = self.selected(level)?;
        self.options(level).iter().find(|node| node.id == id)
    }

    /// The selected id at `level`, or [`SelectionError::Incomplete`].
    pub fn require(&self, level: usize) -> Result<u64, SelectionError> {
        if level >= self.depth() {
            return Err(SelectionError::LevelOutOfRange {
                level,
                depth: self.depth(),
            });
        }
        self.selected(level)
            .ok_or(SelectionError::Incomplete { level })
    }

    pub fn selection(&self) -> Selection {
        Selection {
            parent: self.selected(0),
            child: self.selected(1),
            grandchild: self.selected(2),
        }
    }
}

//! Target location as a swappable capability.
//!
//! The companion window tracks one element deep inside the host's tree. A
//! fixed structural path into a third-party tree is inherently brittle, so
//! the dispatcher never hardcodes traversal logic — it asks a
//! [`TargetLocator`], which tests replace with a double.

use super::{DocTree, NodeId};

/// Resolves the tracked target element inside the watched tree.
pub trait TargetLocator: Send + Sync {
    /// Find the current target, or `None` when the host has not rendered it
    /// (yet, or anymore). A miss is a degraded no-op, never an error.
    fn locate(&self, tree: &DocTree) -> Option<NodeId>;
}

/// Locator that follows a fixed child-index path from the root.
///
/// The structural equivalent of an XPath into the host tree: each element of
/// `path` selects the nth child of the previous node.
#[derive(Debug, Clone)]
pub struct StructuralPathLocator {
    path: Vec<usize>,
}

impl StructuralPathLocator {
    pub fn new(path: impl Into<Vec<usize>>) -> Self {
        Self { path: path.into() }
    }
}

impl TargetLocator for StructuralPathLocator {
    fn locate(&self, tree: &DocTree) -> Option<NodeId> {
        let mut current = tree.root();
        for &index in &self.path {
            current = *tree.get(current)?.children.get(index)?;
        }
        Some(current)
    }
}

/// Locator that finds the first node of the host's input-target kind,
/// wherever the host happens to render it.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputTargetLocator;

impl TargetLocator for InputTargetLocator {
    fn locate(&self, tree: &DocTree) -> Option<NodeId> {
        tree.find(|n| n.kind == super::NodeKind::InputTarget)
    }
}

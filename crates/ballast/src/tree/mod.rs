//! In-memory model of the watched document tree.
//!
//! The governor does not own the tree it bounds — the host mutates it
//! continuously and only tells us *that* something changed, never what.
//! [`DocTree`] is an arena with stable [`NodeId`] handles and a free list,
//! so discarded subtrees actually release their slots instead of leaking
//! inside the thing whose job is to keep memory bounded.
//!
//! Mutation notifications are modeled by [`MutationBatch`]: a reason to
//! re-evaluate, carrying no diff.

pub mod locator;

pub use locator::TargetLocator;

// ── Identity ───────────────────────────────────────────────────────

/// Stable handle into a [`DocTree`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

// ── Geometry ───────────────────────────────────────────────────────

/// Layout rectangle in host coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Minimal intrinsic size applied to a purged entry so surrounding layout
/// does not shift when its subtree is discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Containment {
    pub width: u32,
    pub height: u32,
}

/// Placeholder size used for every purged entry.
pub const PURGED_PLACEHOLDER: Containment = Containment {
    width: 1,
    height: 50,
};

// ── Nodes ──────────────────────────────────────────────────────────

/// What a node *is* in the watched tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    /// Ordered, append-only scroll container holding conversation entries.
    ScrollContainer,
    /// One rendered conversation entry.
    Entry,
    /// Rich rendered content block — the flattener's target.
    Content,
    /// Generic structural element.
    Block,
    Text,
    Image {
        src: Option<String>,
        srcset: Option<String>,
    },
    Canvas {
        width: u32,
        height: u32,
    },
    /// Clickable suggestion control injected by the host.
    SuggestionChip,
    /// The floating auxiliary input surface the dispatcher maintains.
    CompanionWindow,
    /// Auxiliary control buttons the dispatcher re-injects when missing.
    ControlCluster,
    /// The host's own input element the companion mirrors.
    InputTarget,
}

/// A node in the watched tree.
#[derive(Clone, Debug)]
pub struct DocNode {
    pub kind: NodeKind,
    pub text: Option<String>,
    pub children: Vec<NodeId>,
    /// Flattener idempotence marker. Set at most once, never cleared.
    pub fixed: bool,
    /// Rendered as flat preformatted text (post-flatten).
    pub preformatted: bool,
    /// Eviction state. Live entries transition to purged exactly once.
    pub purged: bool,
    /// Click interception installed (suggestion chips).
    pub hooked: bool,
    pub containment: Option<Containment>,
    pub bounds: Rect,
}

impl DocNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            text: None,
            children: Vec::new(),
            fixed: false,
            preformatted: false,
            purged: false,
            hooked: false,
            containment: None,
            bounds: Rect::default(),
        }
    }

    /// Node with text content.
    pub fn text_node(content: impl Into<String>) -> Self {
        let mut node = Self::new(NodeKind::Text);
        node.text = Some(content.into());
        node
    }

    /// Node with explicit bounds.
    pub fn with_bounds(mut self, bounds: Rect) -> Self {
        self.bounds = bounds;
        self
    }
}

// ── Tree ───────────────────────────────────────────────────────────

/// Arena-backed document tree with a dedicated root.
#[derive(Debug)]
pub struct DocTree {
    slots: Vec<Option<DocNode>>,
    free: Vec<usize>,
    root: NodeId,
}

impl Default for DocTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DocTree {
    pub fn new() -> Self {
        Self {
            slots: vec![Some(DocNode::new(NodeKind::Root))],
            free: Vec::new(),
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Append `node` as the last child of `parent`. Returns the new handle,
    /// or `None` if the parent is gone.
    pub fn insert(&mut self, parent: NodeId, node: DocNode) -> Option<NodeId> {
        self.get(parent)?;
        let id = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.slots.push(Some(node));
                NodeId(self.slots.len() - 1)
            }
        };
        if let Some(p) = self.get_mut(parent) {
            p.children.push(id);
        }
        Some(id)
    }

    pub fn get(&self, id: NodeId) -> Option<&DocNode> {
        self.slots.get(id.0).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut DocNode> {
        self.slots.get_mut(id.0).and_then(|s| s.as_mut())
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Always `false`: the root is preallocated and can never be removed,
    /// so the arena holds at least one live node for the tree's lifetime.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Document-order (preorder) ids of `from` and its descendants.
    pub fn walk(&self, from: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            let Some(node) = self.get(id) else { continue };
            out.push(id);
            for &child in node.children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// First node (document order) matching the predicate.
    pub fn find(&self, pred: impl Fn(&DocNode) -> bool) -> Option<NodeId> {
        self.walk(self.root)
            .into_iter()
            .find(|&id| self.get(id).is_some_and(&pred))
    }

    /// All nodes (document order) matching the predicate.
    pub fn collect(&self, pred: impl Fn(&DocNode) -> bool) -> Vec<NodeId> {
        self.walk(self.root)
            .into_iter()
            .filter(|&id| self.get(id).is_some_and(&pred))
            .collect()
    }

    /// Concatenated text of a node and its descendants, document order,
    /// one line per text segment.
    pub fn plain_text(&self, from: NodeId) -> String {
        let mut parts = Vec::new();
        for id in self.walk(from) {
            if let Some(text) = self.get(id).and_then(|n| n.text.as_deref())
                && !text.is_empty()
            {
                parts.push(text.to_string());
            }
        }
        parts.join("\n")
    }

    /// Discard a node's entire child structure, releasing the arena slots.
    /// The node itself survives.
    pub fn remove_children(&mut self, id: NodeId) {
        let children = match self.get_mut(id) {
            Some(node) => std::mem::take(&mut node.children),
            None => return,
        };
        for child in children {
            self.free_subtree(child);
        }
    }

    fn free_subtree(&mut self, id: NodeId) {
        let children = match self.slots.get_mut(id.0).and_then(|s| s.take()) {
            Some(node) => node.children,
            None => return,
        };
        self.free.push(id.0);
        for child in children {
            self.free_subtree(child);
        }
    }
}

// ── Notifications ──────────────────────────────────────────────────

/// A notification that *something* changed in the watched tree.
///
/// Carries no diff — every dispatch re-derives everything it needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MutationBatch {
    /// Monotonic batch counter, for tracing only.
    pub seq: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_walk_preserves_document_order() {
        let mut tree = DocTree::new();
        let a = tree.insert(tree.root(), DocNode::new(NodeKind::Block)).unwrap();
        let a1 = tree.insert(a, DocNode::text_node("one")).unwrap();
        let b = tree.insert(tree.root(), DocNode::text_node("two")).unwrap();

        let order = tree.walk(tree.root());
        assert_eq!(order, vec![tree.root(), a, a1, b]);
    }

    #[test]
    fn plain_text_joins_segments_in_order() {
        let mut tree = DocTree::new();
        let block = tree.insert(tree.root(), DocNode::new(NodeKind::Content)).unwrap();
        tree.insert(block, DocNode::text_node("alpha")).unwrap();
        let inner = tree.insert(block, DocNode::new(NodeKind::Block)).unwrap();
        tree.insert(inner, DocNode::text_node("beta")).unwrap();

        assert_eq!(tree.plain_text(block), "alpha\nbeta");
    }

    #[test]
    fn remove_children_releases_slots() {
        let mut tree = DocTree::new();
        let block = tree.insert(tree.root(), DocNode::new(NodeKind::Block)).unwrap();
        for i in 0..10 {
            tree.insert(block, DocNode::text_node(format!("t{i}"))).unwrap();
        }
        let before = tree.len();
        tree.remove_children(block);
        assert_eq!(tree.len(), before - 10);
        assert!(tree.get(block).unwrap().children.is_empty());
        assert!(!tree.is_empty());

        // Freed slots are reused.
        let reused = tree.insert(block, DocNode::text_node("again")).unwrap();
        assert!(tree.get(reused).is_some());
    }

    #[test]
    fn removed_ids_resolve_to_none() {
        let mut tree = DocTree::new();
        let block = tree.insert(tree.root(), DocNode::new(NodeKind::Block)).unwrap();
        let child = tree.insert(block, DocNode::text_node("gone")).unwrap();
        tree.remove_children(block);
        assert!(tree.get(child).is_none());
    }

    #[test]
    fn find_returns_first_in_document_order() {
        let mut tree = DocTree::new();
        let first = tree.insert(tree.root(), DocNode::new(NodeKind::Entry)).unwrap();
        tree.insert(tree.root(), DocNode::new(NodeKind::Entry)).unwrap();
        let found = tree.find(|n| n.kind == NodeKind::Entry);
        assert_eq!(found, Some(first));
    }
}

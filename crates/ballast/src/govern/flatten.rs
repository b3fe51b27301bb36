//! Content flattening: simplify oversized rendered subtrees into flat text.
//!
//! Deeply nested rendered content is the main driver of unbounded render
//! cost as a conversation grows. A content node with more than
//! [`MAX_DIRECT_CHILDREN`] direct children gets collapsed: its plain text is
//! captured, the child structure is discarded, and the node is re-rendered
//! as flat preformatted text. The `fixed` marker makes the pass idempotent
//! by construction — a flattened node is never looked at again.
//!
//! The pass is budget-limited. Matches left unprocessed when the budget runs
//! out are picked up by the next dispatch-scheduled pass.

use crate::sched::PassBudget;
use crate::tree::{DocTree, NodeId, NodeKind};
use tracing::debug;

/// A content node with more direct children than this is oversized.
pub const MAX_DIRECT_CHILDREN: usize = 5;

/// Flatten every unfixed oversized content node the budget allows.
///
/// Returns the number of nodes processed this pass.
pub fn flatten_pass(tree: &mut DocTree, budget: &mut PassBudget) -> usize {
    let candidates: Vec<NodeId> = tree.collect(|node| {
        node.kind == NodeKind::Content
            && !node.fixed
            && node.children.len() > MAX_DIRECT_CHILDREN
    });

    let mut processed = 0;
    for id in candidates {
        if !budget.consume() {
            break;
        }
        let text = tree.plain_text(id);
        tree.remove_children(id);
        let Some(node) = tree.get_mut(id) else { continue };
        node.text = Some(text);
        node.preformatted = true;
        node.fixed = true;
        processed += 1;
    }

    if processed > 0 {
        debug!("flattened {processed} oversized content node(s)");
    }
    processed
}

//! Eviction of stale conversation entries.
//!
//! The scroll container only ever grows; old entries keep their full
//! rendered subtrees, images, and canvases alive long after anyone scrolls
//! back to them. Under memory pressure the purge pass reclaims everything
//! except the most recent [`RETAIN_RECENT`] entries: media sources are
//! wiped, canvases shrink to 1×1, the rendered subtree is discarded, and a
//! minimal containment placeholder keeps surrounding layout stable.
//!
//! Purging is one-way. Each entry carries an explicit purged flag, so a
//! repeated pass is a no-op for entries already evicted.

use super::stats::Stats;
use crate::tree::{DocTree, NodeId, NodeKind, PURGED_PLACEHOLDER};
use tracing::debug;

/// The newest entries are never purged.
pub const RETAIN_RECENT: usize = 3;

/// What one purge pass reclaimed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PurgeOutcome {
    /// Entries newly transitioned live → purged.
    pub entries: usize,
    /// Media elements whose sources were wiped.
    pub media: usize,
}

/// Evict every stale entry in the scroll container, oldest first.
///
/// No-op when the container is missing (host not rendered yet) or when
/// everything old is already purged.
pub fn purge_pass(tree: &mut DocTree, stats: &mut Stats) -> PurgeOutcome {
    let Some(container) = tree.find(|n| n.kind == NodeKind::ScrollContainer) else {
        return PurgeOutcome::default();
    };
    let entries: Vec<NodeId> = tree
        .get(container)
        .map(|n| n.children.clone())
        .unwrap_or_default();

    let cutoff = entries.len().saturating_sub(RETAIN_RECENT);
    let mut outcome = PurgeOutcome::default();

    for &entry in &entries[..cutoff] {
        if tree.get(entry).is_none_or(|n| n.purged) {
            continue;
        }

        outcome.media += wipe_media(tree, entry);
        tree.remove_children(entry);

        if let Some(node) = tree.get_mut(entry) {
            node.text = None;
            node.containment = Some(PURGED_PLACEHOLDER);
            node.purged = true;
        }
        outcome.entries += 1;
    }

    stats.purged += outcome.entries as u64;
    stats.media_wiped += outcome.media as u64;

    if outcome.entries > 0 {
        debug!(
            "purged {} entr{} ({} media source(s) wiped)",
            outcome.entries,
            if outcome.entries == 1 { "y" } else { "ies" },
            outcome.media,
        );
    }
    outcome
}

/// Clear media sources and shrink canvases throughout an entry's subtree.
/// Counts wiped media elements; canvas shrinking is not counted.
fn wipe_media(tree: &mut DocTree, entry: NodeId) -> usize {
    let mut wiped = 0;
    for id in tree.walk(entry) {
        let Some(node) = tree.get_mut(id) else { continue };
        match &mut node.kind {
            NodeKind::Image { src, srcset } => {
                if src.as_deref().is_some_and(|s| !s.is_empty()) {
                    *src = None;
                    *srcset = None;
                    wiped += 1;
                }
            }
            NodeKind::Canvas { width, height } => {
                *width = 1;
                *height = 1;
            }
            _ => {}
        }
    }
    wiped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::DocNode;

    fn tree_with_entries(count: usize) -> (DocTree, NodeId) {
        let mut tree = DocTree::new();
        let container = tree
            .insert(tree.root(), DocNode::new(NodeKind::ScrollContainer))
            .unwrap();
        for i in 0..count {
            let entry = tree.insert(container, DocNode::new(NodeKind::Entry)).unwrap();
            tree.insert(entry, DocNode::text_node(format!("entry {i}"))).unwrap();
            let mut image = DocNode::new(NodeKind::Image {
                src: Some(format!("img-{i}.png")),
                srcset: Some("a 1x, b 2x".into()),
            });
            image.text = None;
            tree.insert(entry, image).unwrap();
            tree.insert(
                entry,
                DocNode::new(NodeKind::Canvas {
                    width: 800,
                    height: 600,
                }),
            )
            .unwrap();
        }
        (tree, container)
    }

    fn purged_count(tree: &DocTree, container: NodeId) -> usize {
        tree.get(container)
            .unwrap()
            .children
            .iter()
            .filter(|&&id| tree.get(id).unwrap().purged)
            .count()
    }

    #[test]
    fn purges_all_but_last_three() {
        for len in [0, 1, 3, 4, 10] {
            let (mut tree, container) = tree_with_entries(len);
            let mut stats = Stats::default();
            let outcome = purge_pass(&mut tree, &mut stats);

            let expected = len.saturating_sub(RETAIN_RECENT);
            assert_eq!(outcome.entries, expected, "len {len}");
            assert_eq!(purged_count(&tree, container), expected, "len {len}");
            assert_eq!(stats.purged, expected as u64);

            // The last three entries keep their full subtrees.
            let children = tree.get(container).unwrap().children.clone();
            for &recent in children.iter().rev().take(RETAIN_RECENT) {
                let node = tree.get(recent).unwrap();
                assert!(!node.purged);
                assert!(!node.children.is_empty());
            }
        }
    }

    #[test]
    fn second_pass_purges_zero_more() {
        let (mut tree, _) = tree_with_entries(8);
        let mut stats = Stats::default();
        assert_eq!(purge_pass(&mut tree, &mut stats).entries, 5);
        assert_eq!(purge_pass(&mut tree, &mut stats), PurgeOutcome::default());
        assert_eq!(stats.purged, 5);
    }

    #[test]
    fn media_sources_wiped_and_counted_per_element() {
        let (mut tree, container) = tree_with_entries(4);
        let mut stats = Stats::default();
        let outcome = purge_pass(&mut tree, &mut stats);

        // One image per purged entry.
        assert_eq!(outcome.entries, 1);
        assert_eq!(outcome.media, 1);
        assert_eq!(stats.media_wiped, 1);

        let oldest = tree.get(container).unwrap().children[0];
        let node = tree.get(oldest).unwrap();
        assert!(node.children.is_empty());
        assert_eq!(node.containment, Some(PURGED_PLACEHOLDER));
    }

    #[test]
    fn missing_container_is_a_no_op() {
        let mut tree = DocTree::new();
        let mut stats = Stats::default();
        assert_eq!(purge_pass(&mut tree, &mut stats), PurgeOutcome::default());
    }
}

//! Change dispatch: one idempotent reconcile per mutation batch.
//!
//! The host delivers mutation batches strictly sequentially and tells us
//! nothing about what changed, so the dispatcher re-derives everything on
//! every batch: make sure the companion window exists, realign it against
//! its tracked target, schedule a flatten pass, hook newly appeared
//! suggestion chips, re-inject the auxiliary control cluster. Every step is
//! a no-op check followed by an act, so repeated or re-entrant invocation
//! leaves the tree unchanged. This is intentional simplicity — there is no
//! diffing to get wrong.

use crate::govern::flatten::flatten_pass;
use crate::sched::ScheduleStrategy;
use crate::tree::{DocNode, DocTree, MutationBatch, NodeKind, Rect, TargetLocator};
use crate::{SharedStats, SharedTree};
use tracing::trace;

/// Height of the companion window's header bar, in host units.
pub const HEADER_HEIGHT: f64 = 28.0;

/// The companion never shrinks below this content height when docked.
pub const MIN_COMPANION_HEIGHT: f64 = 60.0;

/// Reacts to tree-mutation notifications.
pub struct ChangeDispatcher {
    tree: SharedTree,
    stats: SharedStats,
    scheduler: Box<dyn ScheduleStrategy>,
    locator: Box<dyn TargetLocator>,
    docked: bool,
}

impl ChangeDispatcher {
    pub fn new(
        tree: SharedTree,
        stats: SharedStats,
        scheduler: Box<dyn ScheduleStrategy>,
        locator: Box<dyn TargetLocator>,
    ) -> Self {
        Self {
            tree,
            stats,
            scheduler,
            locator,
            docked: true,
        }
    }

    /// Whether the companion window tracks its target's position.
    pub fn set_docked(&mut self, docked: bool) {
        self.docked = docked;
    }

    /// Run the full reconcile for one mutation batch.
    pub fn reconcile(&mut self, batch: MutationBatch) {
        trace!("dispatch: batch {}", batch.seq);
        {
            let Ok(mut tree) = self.tree.lock() else { return };
            ensure_companion(&mut tree);
            if self.docked {
                align_companion(&mut tree, self.locator.as_ref());
            }
            let hooked = hook_chips(&mut tree);
            if hooked > 0
                && let Ok(mut stats) = self.stats.lock()
            {
                stats.chips_hooked += hooked as u64;
            }
            inject_controls(&mut tree);
        }
        // Locks dropped: the fallback strategy runs the flatten task inline
        // and takes them itself.
        self.schedule_flatten();
    }

    fn schedule_flatten(&mut self) {
        let tree = SharedTree::clone(&self.tree);
        let stats = SharedStats::clone(&self.stats);
        self.scheduler.schedule(Box::new(move |budget| {
            let Ok(mut tree) = tree.lock() else { return };
            let flattened = flatten_pass(&mut tree, budget);
            if flattened > 0
                && let Ok(mut stats) = stats.lock()
            {
                stats.flattened += flattened as u64;
            }
        }));
    }
}

/// Create the companion window if the host (or a previous halt) removed it.
fn ensure_companion(tree: &mut DocTree) {
    if tree.find(|n| n.kind == NodeKind::CompanionWindow).is_some() {
        return;
    }
    tree.insert(tree.root(), DocNode::new(NodeKind::CompanionWindow));
    trace!("companion window created");
}

/// Mirror the tracked target's geometry onto the companion window.
fn align_companion(tree: &mut DocTree, locator: &dyn TargetLocator) {
    let Some(target) = locator.locate(tree) else {
        trace!("tracked target not found; companion left in place");
        return;
    };
    let Some(target_bounds) = tree.get(target).map(|n| n.bounds) else {
        return;
    };
    if target_bounds.width <= 0.0 {
        return;
    }
    let Some(companion) = tree.find(|n| n.kind == NodeKind::CompanionWindow) else {
        return;
    };
    if let Some(node) = tree.get_mut(companion) {
        node.bounds = Rect {
            x: target_bounds.x,
            y: target_bounds.y - HEADER_HEIGHT,
            width: target_bounds.width,
            height: target_bounds.height.max(MIN_COMPANION_HEIGHT) + HEADER_HEIGHT,
        };
    }
}

/// Install click interception on suggestion chips that appeared since the
/// last batch. Returns the number newly hooked.
fn hook_chips(tree: &mut DocTree) -> usize {
    let chips = tree.collect(|n| n.kind == NodeKind::SuggestionChip && !n.hooked);
    for &chip in &chips {
        if let Some(node) = tree.get_mut(chip) {
            node.hooked = true;
        }
    }
    chips.len()
}

/// Re-inject the auxiliary control buttons if the host wiped them.
fn inject_controls(tree: &mut DocTree) {
    if tree.find(|n| n.kind == NodeKind::ControlCluster).is_some() {
        return;
    }
    tree.insert(tree.root(), DocNode::new(NodeKind::ControlCluster));
    trace!("control cluster injected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::govern::stats::Stats;
    use crate::sched::ImmediateStrategy;
    use crate::tree::locator::InputTargetLocator;
    use std::sync::{Arc, Mutex};

    fn dispatcher(tree: DocTree) -> (ChangeDispatcher, SharedTree, SharedStats) {
        let tree = Arc::new(Mutex::new(tree));
        let stats = Arc::new(Mutex::new(Stats::default()));
        let dispatcher = ChangeDispatcher::new(
            Arc::clone(&tree),
            Arc::clone(&stats),
            Box::new(ImmediateStrategy::new()),
            Box::new(InputTargetLocator),
        );
        (dispatcher, tree, stats)
    }

    fn batch(seq: u64) -> MutationBatch {
        MutationBatch { seq }
    }

    #[test]
    fn repeated_dispatch_yields_identical_tree() {
        let mut seeded = DocTree::new();
        seeded
            .insert(seeded.root(), DocNode::new(NodeKind::SuggestionChip))
            .unwrap();
        let (mut dispatcher, tree, stats) = dispatcher(seeded);

        dispatcher.reconcile(batch(1));
        let (len_after_one, snapshot_after_one) = {
            let tree = tree.lock().unwrap();
            (tree.len(), tree.walk(tree.root()))
        };

        for seq in 2..=6 {
            dispatcher.reconcile(batch(seq));
        }

        let tree = tree.lock().unwrap();
        assert_eq!(tree.len(), len_after_one);
        assert_eq!(tree.walk(tree.root()), snapshot_after_one);

        let companions = tree.collect(|n| n.kind == NodeKind::CompanionWindow);
        let controls = tree.collect(|n| n.kind == NodeKind::ControlCluster);
        assert_eq!(companions.len(), 1, "no duplicate companion windows");
        assert_eq!(controls.len(), 1, "no duplicate control clusters");
        assert_eq!(stats.lock().unwrap().chips_hooked, 1, "chip hooked once");
    }

    #[test]
    fn dispatch_schedules_a_flatten_pass() {
        let mut seeded = DocTree::new();
        let content = seeded
            .insert(seeded.root(), DocNode::new(NodeKind::Content))
            .unwrap();
        for i in 0..8 {
            seeded.insert(content, DocNode::text_node(format!("{i}"))).unwrap();
        }
        let (mut dispatcher, tree, stats) = dispatcher(seeded);

        dispatcher.reconcile(batch(1));

        let tree = tree.lock().unwrap();
        assert!(tree.get(content).unwrap().fixed);
        assert_eq!(stats.lock().unwrap().flattened, 1);
    }

    #[test]
    fn docked_companion_tracks_target_bounds() {
        let mut seeded = DocTree::new();
        let target_bounds = Rect {
            x: 40.0,
            y: 500.0,
            width: 320.0,
            height: 44.0,
        };
        seeded
            .insert(
                seeded.root(),
                DocNode::new(NodeKind::InputTarget).with_bounds(target_bounds),
            )
            .unwrap();
        let (mut dispatcher, tree, _) = dispatcher(seeded);

        dispatcher.reconcile(batch(1));

        let tree = tree.lock().unwrap();
        let companion = tree.find(|n| n.kind == NodeKind::CompanionWindow).unwrap();
        let bounds = tree.get(companion).unwrap().bounds;
        assert_eq!(bounds.x, 40.0);
        assert_eq!(bounds.y, 500.0 - HEADER_HEIGHT);
        assert_eq!(bounds.width, 320.0);
        assert_eq!(bounds.height, MIN_COMPANION_HEIGHT + HEADER_HEIGHT);
    }

    #[test]
    fn undocked_companion_is_left_in_place() {
        let mut seeded = DocTree::new();
        seeded
            .insert(
                seeded.root(),
                DocNode::new(NodeKind::InputTarget).with_bounds(Rect {
                    x: 1.0,
                    y: 1.0,
                    width: 100.0,
                    height: 100.0,
                }),
            )
            .unwrap();
        let (mut dispatcher, tree, _) = dispatcher(seeded);
        dispatcher.set_docked(false);

        dispatcher.reconcile(batch(1));

        let tree = tree.lock().unwrap();
        let companion = tree.find(|n| n.kind == NodeKind::CompanionWindow).unwrap();
        assert_eq!(tree.get(companion).unwrap().bounds, Rect::default());
    }

    #[test]
    fn missing_target_degrades_to_no_op() {
        let (mut dispatcher, tree, _) = dispatcher(DocTree::new());
        dispatcher.reconcile(batch(1));
        // Companion exists but was never aligned; nothing panicked.
        let tree = tree.lock().unwrap();
        assert!(tree.find(|n| n.kind == NodeKind::CompanionWindow).is_some());
    }
}

//! The memory governor: periodic sampling and pressure response.
//!
//! While running, the governor samples this process's resident memory once
//! per period and reacts in two tiers: above the configured limit it runs a
//! purge pass over the scroll container, and above half the limit it asks
//! the editor runtime to collect detached models. Between samples it relays
//! mutation batches to the change dispatcher — but only while running;
//! batches that arrive while halted are discarded, because a halted
//! governor must not touch the tree at all.
//!
//! The governor runs as a single actor task owning all mutable state.
//! Callers talk to it through a [`GovernorHandle`]; observers plug in a
//! [`GovernorHandler`] to receive [`GovernorEvent`]s.

use std::sync::Arc;
use std::time::Duration;

use sysinfo::{ProcessesToUpdate, System};
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::dispatch::ChangeDispatcher;
use super::model_gc::collect_detached;
use super::purge::purge_pass;
use super::stats::Stats;
use crate::editor::EditorRuntime;
use crate::tree::MutationBatch;
use crate::{SharedStats, SharedTree};

/// Default memory ceiling.
pub const DEFAULT_LIMIT_MB: u64 = 512;

/// Period between memory samples while running.
pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_millis(1000);

/// The limit is configured in steps of this size.
pub const LIMIT_STEP_MB: u64 = 256;

/// Snap a requested limit onto the supported range: whole steps of
/// [`LIMIT_STEP_MB`], between 256 and 4096 MB.
pub fn clamp_limit_mb(mb: u64) -> u64 {
    (mb / LIMIT_STEP_MB).clamp(1, 16) * LIMIT_STEP_MB
}

// ── Sampling ───────────────────────────────────────────────────────

/// Where memory samples come from. A failed sample reads as 0 MB, which
/// never triggers pressure handling.
pub trait MemorySampler: Send {
    fn sample_mb(&mut self) -> u64;
}

/// Samples this process's resident set via the OS.
pub struct ProcessSampler {
    system: System,
    pid: Option<sysinfo::Pid>,
}

impl Default for ProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSampler {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid().ok();
        if pid.is_none() {
            warn!("cannot resolve own pid; memory samples will read 0");
        }
        Self {
            system: System::new(),
            pid,
        }
    }
}

impl MemorySampler for ProcessSampler {
    fn sample_mb(&mut self) -> u64 {
        let Some(pid) = self.pid else { return 0 };
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system
            .process(pid)
            .map(|p| p.memory() / (1024 * 1024))
            .unwrap_or(0)
    }
}

// ── Events ─────────────────────────────────────────────────────────

/// What the governor just did, for display layers and logging.
#[derive(Debug)]
pub enum GovernorEvent<'a> {
    /// One sampling cycle completed.
    Tick {
        ram_mb: u64,
        limit_mb: u64,
        running: bool,
        bridge_online: bool,
        stats: &'a Stats,
    },
    /// The governor started or halted.
    StateChanged { running: bool },
    /// A pressure-triggered purge reclaimed something.
    Purged { entries: usize, media: usize },
    /// Detached editor models were disposed.
    ModelsDisposed { count: usize },
    /// Counters were reset by user action.
    StatsCleared,
}

/// Observer hook for governor activity.
pub trait GovernorHandler: Send {
    fn on_event(&mut self, event: &GovernorEvent<'_>);
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NoopHandler;

impl GovernorHandler for NoopHandler {
    fn on_event(&mut self, _event: &GovernorEvent<'_>) {}
}

/// Forwards events to `tracing`.
#[derive(Debug, Default)]
pub struct LoggingHandler;

impl GovernorHandler for LoggingHandler {
    fn on_event(&mut self, event: &GovernorEvent<'_>) {
        match event {
            GovernorEvent::Tick {
                ram_mb, limit_mb, ..
            } => debug!("tick: {ram_mb} MB of {limit_mb} MB"),
            GovernorEvent::StateChanged { running } => {
                info!("governor {}", if *running { "running" } else { "halted" });
            }
            GovernorEvent::Purged { entries, media } => {
                info!("pressure purge: {entries} entr(ies), {media} media source(s)");
            }
            GovernorEvent::ModelsDisposed { count } => {
                info!("disposed {count} detached editor model(s)");
            }
            GovernorEvent::StatsCleared => info!("counters cleared"),
        }
    }
}

// ── Configuration ──────────────────────────────────────────────────

/// Tunables for a governor instance.
#[derive(Clone, Copy, Debug)]
pub struct GovernorConfig {
    pub memory_limit_mb: u64,
    pub sample_period: Duration,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            memory_limit_mb: DEFAULT_LIMIT_MB,
            sample_period: DEFAULT_SAMPLE_PERIOD,
        }
    }
}

// ── Core ───────────────────────────────────────────────────────────

/// The governor's synchronous heart: all state, no runtime plumbing.
///
/// The actor wraps this; tests drive it directly.
pub struct GovernorCore {
    tree: SharedTree,
    stats: SharedStats,
    dispatcher: ChangeDispatcher,
    runtime: Option<Arc<dyn EditorRuntime>>,
    sampler: Box<dyn MemorySampler>,
    handler: Box<dyn GovernorHandler>,
    config: GovernorConfig,
    running: bool,
    bridge_online: bool,
}

impl GovernorCore {
    pub fn new(
        tree: SharedTree,
        stats: SharedStats,
        dispatcher: ChangeDispatcher,
        config: GovernorConfig,
    ) -> Self {
        Self {
            tree,
            stats,
            dispatcher,
            runtime: None,
            sampler: Box::new(ProcessSampler::new()),
            handler: Box::new(NoopHandler),
            config: GovernorConfig {
                memory_limit_mb: clamp_limit_mb(config.memory_limit_mb),
                ..config
            },
            running: false,
            bridge_online: false,
        }
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn EditorRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn with_sampler(mut self, sampler: Box<dyn MemorySampler>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_handler(mut self, handler: Box<dyn GovernorHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn sample_period(&self) -> Duration {
        self.config.sample_period
    }

    /// Flip the running state. Returns `false` if it was already there.
    pub fn set_running(&mut self, running: bool) -> bool {
        if self.running == running {
            return false;
        }
        self.running = running;
        self.handler
            .on_event(&GovernorEvent::StateChanged { running });
        true
    }

    pub fn set_bridge_online(&mut self, online: bool) {
        self.bridge_online = online;
    }

    /// Snap and apply a new memory limit.
    pub fn set_limit(&mut self, mb: u64) {
        let clamped = clamp_limit_mb(mb);
        if clamped != mb {
            debug!("memory limit {mb} MB snapped to {clamped} MB");
        }
        self.config.memory_limit_mb = clamped;
    }

    /// Relay one mutation batch to the dispatcher.
    pub fn dispatch(&mut self, batch: MutationBatch) {
        self.dispatcher.reconcile(batch);
    }

    /// One sampling cycle: sample, respond to pressure, publish.
    pub fn tick(&mut self) {
        let sample = self.sampler.sample_mb();
        let limit = self.config.memory_limit_mb;

        if let Ok(mut stats) = self.stats.lock() {
            stats.ram_mb = sample;
        }

        if sample > limit {
            let outcome = {
                let (Ok(mut tree), Ok(mut stats)) = (self.tree.lock(), self.stats.lock()) else {
                    return;
                };
                purge_pass(&mut tree, &mut stats)
            };
            if outcome.entries > 0 || outcome.media > 0 {
                self.handler.on_event(&GovernorEvent::Purged {
                    entries: outcome.entries,
                    media: outcome.media,
                });
            }
        }

        if sample > limit / 2 {
            let count = collect_detached(self.runtime.as_deref());
            if count > 0 {
                self.handler
                    .on_event(&GovernorEvent::ModelsDisposed { count });
            }
        }

        self.publish();
    }

    /// Reset the counters and republish so displays drop to zero at once.
    pub fn clear(&mut self) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.clear();
        }
        self.handler.on_event(&GovernorEvent::StatsCleared);
        self.publish();
    }

    fn publish(&mut self) {
        let Ok(stats) = self.stats.lock() else { return };
        let snapshot = stats.clone();
        drop(stats);
        self.handler.on_event(&GovernorEvent::Tick {
            ram_mb: snapshot.ram_mb,
            limit_mb: self.config.memory_limit_mb,
            running: self.running,
            bridge_online: self.bridge_online,
            stats: &snapshot,
        });
    }
}

// ── Actor ──────────────────────────────────────────────────────────

/// Control messages for the governor actor.
#[derive(Clone, Copy, Debug)]
pub enum Command {
    Start,
    Halt,
    Clear,
    SetLimit(u64),
    SetBridgeOnline(bool),
    Shutdown,
}

/// Cloneable handle to a running governor actor. Sends degrade to no-ops
/// once the actor is gone.
#[derive(Clone)]
pub struct GovernorHandle {
    commands: mpsc::Sender<Command>,
    mutations: mpsc::Sender<MutationBatch>,
}

impl GovernorHandle {
    pub async fn start(&self) {
        let _ = self.commands.send(Command::Start).await;
    }

    pub async fn halt(&self) {
        let _ = self.commands.send(Command::Halt).await;
    }

    pub async fn clear(&self) {
        let _ = self.commands.send(Command::Clear).await;
    }

    pub async fn set_limit(&self, mb: u64) {
        let _ = self.commands.send(Command::SetLimit(mb)).await;
    }

    pub async fn set_bridge_online(&self, online: bool) {
        let _ = self.commands.send(Command::SetBridgeOnline(online)).await;
    }

    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    /// Notify the governor that the watched tree mutated.
    pub async fn notify(&self, batch: MutationBatch) {
        let _ = self.mutations.send(batch).await;
    }
}

/// The actor task. Owns the core; the sampling interval exists exactly
/// while the governor is running.
pub struct Governor {
    core: GovernorCore,
    commands: mpsc::Receiver<Command>,
    mutations: mpsc::Receiver<MutationBatch>,
    interval: Option<Interval>,
}

impl Governor {
    pub fn new(core: GovernorCore) -> (Self, GovernorHandle) {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (mutation_tx, mutation_rx) = mpsc::channel(64);
        (
            Self {
                core,
                commands: command_rx,
                mutations: mutation_rx,
                interval: None,
            },
            GovernorHandle {
                commands: command_tx,
                mutations: mutation_tx,
            },
        )
    }

    /// Drive the actor until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        info!("governor actor up");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.apply(command),
                },
                batch = self.mutations.recv() => match batch {
                    Some(batch) if self.core.running() => self.core.dispatch(batch),
                    Some(batch) => debug!("halted; batch {} discarded", batch.seq),
                    None => break,
                },
                _ = tick_or_never(self.interval.as_mut()) => self.core.tick(),
            }
        }
        info!("governor actor down");
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Start => {
                if self.core.set_running(true) {
                    let mut interval = tokio::time::interval(self.core.sample_period());
                    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    self.interval = Some(interval);
                }
            }
            Command::Halt => {
                if self.core.set_running(false) {
                    self.interval = None;
                }
            }
            Command::Clear => self.core.clear(),
            Command::SetLimit(mb) => self.core.set_limit(mb),
            Command::SetBridgeOnline(online) => self.core.set_bridge_online(online),
            Command::Shutdown => {} // handled in the loop
        }
    }
}

/// Resolves on the next interval tick, or never while halted.
async fn tick_or_never(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::InMemoryRuntime;
    use crate::govern::model_gc::MODEL_GC_THRESHOLD;
    use crate::sched::ImmediateStrategy;
    use crate::tree::locator::InputTargetLocator;
    use crate::tree::{DocNode, DocTree, NodeKind};
    use std::sync::Mutex;

    struct ScriptedSampler {
        samples: Vec<u64>,
        next: usize,
    }

    impl ScriptedSampler {
        fn new(samples: &[u64]) -> Self {
            Self {
                samples: samples.to_vec(),
                next: 0,
            }
        }
    }

    impl MemorySampler for ScriptedSampler {
        fn sample_mb(&mut self) -> u64 {
            let sample = self.samples.get(self.next).copied().unwrap_or(0);
            self.next += 1;
            sample
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl GovernorHandler for Recorder {
        fn on_event(&mut self, event: &GovernorEvent<'_>) {
            let tag = match event {
                GovernorEvent::Tick { .. } => "tick".to_string(),
                GovernorEvent::StateChanged { running } => format!("state:{running}"),
                GovernorEvent::Purged { entries, media } => format!("purged:{entries}:{media}"),
                GovernorEvent::ModelsDisposed { count } => format!("gc:{count}"),
                GovernorEvent::StatsCleared => "cleared".to_string(),
            };
            if let Ok(mut events) = self.events.lock() {
                events.push(tag);
            }
        }
    }

    fn seeded_tree(entries: usize) -> DocTree {
        let mut tree = DocTree::new();
        let container = tree
            .insert(tree.root(), DocNode::new(NodeKind::ScrollContainer))
            .unwrap();
        for i in 0..entries {
            let entry = tree.insert(container, DocNode::new(NodeKind::Entry)).unwrap();
            tree.insert(entry, DocNode::text_node(format!("e{i}"))).unwrap();
        }
        tree
    }

    fn core_with(
        tree: DocTree,
        samples: &[u64],
        runtime: Option<Arc<dyn EditorRuntime>>,
    ) -> (GovernorCore, SharedStats, Arc<Mutex<Vec<String>>>) {
        let tree = Arc::new(Mutex::new(tree));
        let stats = Arc::new(Mutex::new(Stats::default()));
        let dispatcher = ChangeDispatcher::new(
            Arc::clone(&tree),
            Arc::clone(&stats),
            Box::new(ImmediateStrategy::new()),
            Box::new(InputTargetLocator),
        );
        let events = Arc::new(Mutex::new(Vec::new()));
        let recorder = Recorder {
            events: Arc::clone(&events),
        };
        let mut core = GovernorCore::new(
            tree,
            Arc::clone(&stats),
            dispatcher,
            GovernorConfig::default(),
        )
        .with_sampler(Box::new(ScriptedSampler::new(samples)))
        .with_handler(Box::new(recorder));
        if let Some(runtime) = runtime {
            core = core.with_runtime(runtime);
        }
        (core, stats, events)
    }

    #[test]
    fn limit_snaps_to_supported_steps() {
        assert_eq!(clamp_limit_mb(0), 256);
        assert_eq!(clamp_limit_mb(100), 256);
        assert_eq!(clamp_limit_mb(300), 256);
        assert_eq!(clamp_limit_mb(512), 512);
        assert_eq!(clamp_limit_mb(1000), 768);
        assert_eq!(clamp_limit_mb(9999), 4096);
    }

    #[test]
    fn over_limit_sample_triggers_one_purge_and_one_gc() {
        let runtime = Arc::new(InMemoryRuntime::new());
        for i in 0..(MODEL_GC_THRESHOLD + 4) {
            runtime.open(format!("m{i}.rs"), "", None, false);
        }
        let (mut core, stats, events) = core_with(seeded_tree(8), &[600], Some(runtime));

        core.tick();

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec!["purged:5:0".to_string(), "gc:24".to_string(), "tick".to_string()]
        );
        let stats = stats.lock().unwrap();
        assert_eq!(stats.ram_mb, 600);
        assert_eq!(stats.purged, 5);
    }

    #[test]
    fn below_half_limit_only_publishes() {
        let (mut core, stats, events) = core_with(seeded_tree(8), &[100], None);
        core.tick();
        assert_eq!(*events.lock().unwrap(), vec!["tick".to_string()]);
        assert_eq!(stats.lock().unwrap().purged, 0);
    }

    #[test]
    fn between_half_and_full_limit_runs_gc_but_not_purge() {
        let runtime = Arc::new(InMemoryRuntime::new());
        for i in 0..(MODEL_GC_THRESHOLD + 1) {
            runtime.open(format!("m{i}.rs"), "", None, false);
        }
        let (mut core, stats, events) = core_with(seeded_tree(8), &[400], Some(runtime));

        core.tick();

        assert_eq!(
            *events.lock().unwrap(),
            vec!["gc:21".to_string(), "tick".to_string()]
        );
        assert_eq!(stats.lock().unwrap().purged, 0);
    }

    #[test]
    fn start_and_halt_are_idempotent() {
        let (mut core, _, events) = core_with(DocTree::new(), &[], None);
        assert!(core.set_running(true));
        assert!(!core.set_running(true));
        assert!(core.set_running(false));
        assert!(!core.set_running(false));
        assert_eq!(
            *events.lock().unwrap(),
            vec!["state:true".to_string(), "state:false".to_string()]
        );
    }

    #[test]
    fn clear_zeroes_counters_and_republishes() {
        let (mut core, stats, events) = core_with(seeded_tree(8), &[600], None);
        core.tick();
        assert!(stats.lock().unwrap().purged > 0);

        core.clear();
        assert_eq!(*stats.lock().unwrap(), Stats::default());
        let events = events.lock().unwrap();
        assert_eq!(
            events[events.len() - 2..],
            ["cleared".to_string(), "tick".to_string()]
        );
    }

    #[tokio::test]
    async fn halted_actor_discards_mutation_batches() {
        let (core, _, _) = core_with(DocTree::new(), &[], None);
        let tree_probe = Arc::clone(&core.tree);
        let (governor, handle) = Governor::new(core);
        let task = tokio::spawn(governor.run());

        // Halted from birth: the batch must not reach the dispatcher.
        handle.notify(MutationBatch { seq: 1 }).await;
        tokio::task::yield_now().await;
        assert!(
            tree_probe
                .lock()
                .unwrap()
                .find(|n| n.kind == NodeKind::CompanionWindow)
                .is_none()
        );

        // Running: the same batch is dispatched.
        handle.start().await;
        handle.notify(MutationBatch { seq: 2 }).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(
            tree_probe
                .lock()
                .unwrap()
                .find(|n| n.kind == NodeKind::CompanionWindow)
                .is_some()
        );

        handle.shutdown().await;
        task.await.unwrap();
    }
}

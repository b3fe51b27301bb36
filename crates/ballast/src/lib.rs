//! Ballast keeps a live, externally-owned document tree inside fixed
//! resource bounds.
//!
//! The host mutates the tree continuously and only signals *that* it
//! changed. Ballast reacts with bounded, idempotent maintenance: a change
//! dispatcher reconciles per batch, a flattener collapses oversized
//! content, a purge pass evicts stale entries under memory pressure, and a
//! governor actor ties it all to a periodic memory sample. A bridge client
//! syncs editor buffers to a local relay when one is listening.
//!
//! The library has no UI; `main.rs` wraps it in a CLI.

pub mod bridge;
pub mod commands;
pub mod config;
pub mod editor;
pub mod govern;
pub mod sched;
pub mod tree;

use std::sync::{Arc, Mutex};

use govern::Stats;
use tree::DocTree;

/// The watched tree, shared between the governor actor and scheduled
/// maintenance tasks.
pub type SharedTree = Arc<Mutex<DocTree>>;

/// Shared governor counters.
pub type SharedStats = Arc<Mutex<Stats>>;

pub use bridge::BridgeClient;
pub use govern::{Governor, GovernorConfig, GovernorCore, GovernorHandle};

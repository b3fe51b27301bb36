//! Garbage collection of detached editor buffers.
//!
//! The external editor runtime accumulates models for every file ever
//! opened; detached ones are pure memory cost. Above a count threshold,
//! every detached model is disposed. Disposal is irreversible — unsaved
//! content in a detached buffer is lost — so attached models are never
//! touched, and the runtime itself refuses to dispose them.

use crate::editor::EditorRuntime;
use tracing::{debug, trace};

/// GC only engages once the runtime holds more models than this.
pub const MODEL_GC_THRESHOLD: usize = 20;

/// Dispose every detached model if the total count exceeds the threshold.
///
/// No-op without a runtime. Returns the number disposed — diagnostics only,
/// this does not feed the governor's stats.
pub fn collect_detached(runtime: Option<&dyn EditorRuntime>) -> usize {
    let Some(runtime) = runtime else {
        trace!("no editor runtime; model GC skipped");
        return 0;
    };

    let models = runtime.models();
    if models.len() <= MODEL_GC_THRESHOLD {
        return 0;
    }

    let mut disposed = 0;
    for model in models {
        if !model.attached && runtime.dispose(model.id) {
            disposed += 1;
        }
    }

    if disposed > 0 {
        debug!("disposed {disposed} detached editor model(s)");
    }
    disposed
}

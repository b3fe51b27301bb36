//! Integration with the external editor runtime.
//!
//! The runtime — not the governor — owns every text buffer. We only observe
//! the open [`EditorModel`]s through the [`EditorRuntime`] capability and,
//! under memory pressure, ask the runtime to dispose detached ones. A host
//! without an editor runtime is a normal, degraded configuration: every
//! consumer treats the absence as a no-op.

use std::sync::Mutex;

/// Opaque identity of a buffer inside the external runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModelId(pub u64);

/// Snapshot of one in-memory text buffer.
#[derive(Clone, Debug)]
pub struct EditorModel {
    pub id: ModelId,
    /// Path/uri as the runtime reports it (may carry a leading separator).
    pub path: String,
    pub content: String,
    /// Declared language id, e.g. `"javascript"`.
    pub language: Option<String>,
    /// Attached models are bound to a visible editor and must never be
    /// disposed.
    pub attached: bool,
}

/// Capability surface of the external editor runtime.
pub trait EditorRuntime: Send + Sync {
    /// All open models, oldest first.
    fn models(&self) -> Vec<EditorModel>;

    /// The model with text focus, if any.
    fn focused(&self) -> Option<EditorModel>;

    /// Ask the runtime to dispose a model. Returns `false` when the model
    /// is missing or attached — the runtime refuses to dispose attached
    /// buffers.
    fn dispose(&self, id: ModelId) -> bool;
}

// ── In-memory runtime ──────────────────────────────────────────────

#[derive(Debug, Default)]
struct RuntimeInner {
    models: Vec<EditorModel>,
    focused: Option<ModelId>,
    next_id: u64,
}

/// Self-contained [`EditorRuntime`] used by the CLI and tests.
#[derive(Debug, Default)]
pub struct InMemoryRuntime {
    inner: Mutex<RuntimeInner>,
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new model; returns its id.
    pub fn open(
        &self,
        path: impl Into<String>,
        content: impl Into<String>,
        language: Option<&str>,
        attached: bool,
    ) -> ModelId {
        let Ok(mut inner) = self.inner.lock() else {
            return ModelId(0);
        };
        let id = ModelId(inner.next_id);
        inner.next_id += 1;
        inner.models.push(EditorModel {
            id,
            path: path.into(),
            content: content.into(),
            language: language.map(str::to_string),
            attached,
        });
        id
    }

    /// Give a model text focus.
    pub fn focus(&self, id: ModelId) {
        if let Ok(mut inner) = self.inner.lock()
            && inner.models.iter().any(|m| m.id == id)
        {
            inner.focused = Some(id);
        }
    }
}

impl EditorRuntime for InMemoryRuntime {
    fn models(&self) -> Vec<EditorModel> {
        self.inner.lock().map(|i| i.models.clone()).unwrap_or_default()
    }

    fn focused(&self) -> Option<EditorModel> {
        let inner = self.inner.lock().ok()?;
        let id = inner.focused?;
        inner.models.iter().find(|m| m.id == id).cloned()
    }

    fn dispose(&self, id: ModelId) -> bool {
        let Ok(mut inner) = self.inner.lock() else {
            return false;
        };
        let Some(index) = inner.models.iter().position(|m| m.id == id) else {
            return false;
        };
        if inner.models[index].attached {
            return false;
        }
        inner.models.remove(index);
        if inner.focused == Some(id) {
            inner.focused = None;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_and_focus_round_trip() {
        let runtime = InMemoryRuntime::new();
        let a = runtime.open("a.rs", "fn a() {}", Some("rust"), true);
        let b = runtime.open("b.rs", "fn b() {}", Some("rust"), false);
        assert_eq!(runtime.models().len(), 2);
        assert!(runtime.focused().is_none());

        runtime.focus(b);
        assert_eq!(runtime.focused().map(|m| m.id), Some(b));
        runtime.focus(a);
        assert_eq!(runtime.focused().map(|m| m.id), Some(a));
    }

    #[test]
    fn dispose_refuses_attached_models() {
        let runtime = InMemoryRuntime::new();
        let attached = runtime.open("kept.rs", "", None, true);
        let detached = runtime.open("gone.rs", "", None, false);

        assert!(!runtime.dispose(attached));
        assert!(runtime.dispose(detached));
        assert_eq!(runtime.models().len(), 1);
        assert_eq!(runtime.models()[0].id, attached);
    }

    #[test]
    fn disposing_focused_model_clears_focus() {
        let runtime = InMemoryRuntime::new();
        let id = runtime.open("x.py", "", Some("python"), false);
        runtime.focus(id);
        assert!(runtime.dispose(id));
        assert!(runtime.focused().is_none());
    }
}

//! Persistent key/value settings.
//!
//! Everything the user can customize lives in one flat string map persisted
//! as JSON. Writes go through immediately; there is no save step to forget.
//! Settings travel between installs as an export blob: the same map with
//! every key carrying the [`CONFIG_PREFIX`], so a blob is recognizably ours
//! even out of context.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Namespace prefix on every exported key.
pub const CONFIG_PREFIX: &str = "BALLAST_";

// ── Keys ───────────────────────────────────────────────────────────

pub const TARGET_FILE: &str = "TARGET_FILE";
pub const CUSTOM_CSS: &str = "CUSTOM_CSS";
pub const THEME_OVERLAY: &str = "THEME_OVERLAY";
pub const THEME_HOST: &str = "THEME_HOST";
pub const FONT: &str = "FONT";
pub const LOCALE: &str = "LOCALE";
pub const FONT_SCOPE_UI: &str = "FONT_SCOPE_UI";
pub const FONT_SCOPE_CODE: &str = "FONT_SCOPE_CODE";
pub const WINDOW_POS: &str = "WINDOW_POS";
pub const EFFECT: &str = "EFFECT";

// ── Store ──────────────────────────────────────────────────────────

/// Write-through settings store backed by one JSON file.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl ConfigStore {
    /// Open the store at `path`. A missing file is a fresh install, not an
    /// error; a present-but-unreadable one is.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, String> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| format!("malformed config {}: {e}", path.display()))?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(format!("cannot read config {}: {e}", path.display())),
        };
        Ok(Self { path, values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Set one value and persist immediately.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<(), String> {
        self.values.insert(key.into(), value.into());
        self.persist()
    }

    /// Drop every setting and persist the empty map.
    pub fn reset(&mut self) -> Result<(), String> {
        self.values.clear();
        self.persist()
    }

    /// All settings as a portable JSON blob with prefixed keys.
    pub fn export_blob(&self) -> Result<String, String> {
        let prefixed: BTreeMap<String, &String> = self
            .values
            .iter()
            .map(|(k, v)| (format!("{CONFIG_PREFIX}{k}"), v))
            .collect();
        serde_json::to_string_pretty(&prefixed).map_err(|e| format!("cannot export config: {e}"))
    }

    /// Import a blob produced by [`export_blob`](Self::export_blob).
    ///
    /// All-or-nothing: if the blob is not a JSON object of string values,
    /// nothing is written. Keys without the prefix are ignored. Returns how
    /// many settings were imported; consumers of the affected settings need
    /// a reload to pick them up.
    pub fn import_blob(&mut self, blob: &str) -> Result<usize, String> {
        let parsed: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(blob).map_err(|e| format!("malformed settings blob: {e}"))?;

        let mut incoming = Vec::new();
        for (key, value) in &parsed {
            let serde_json::Value::String(value) = value else {
                return Err(format!("settings blob value for {key} is not a string"));
            };
            if let Some(bare) = key.strip_prefix(CONFIG_PREFIX) {
                incoming.push((bare.to_string(), value.clone()));
            } else {
                debug!("ignoring unprefixed settings key {key}");
            }
        }

        let count = incoming.len();
        for (key, value) in incoming {
            self.values.insert(key, value);
        }
        self.persist()?;
        Ok(count)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), String> {
        let raw = serde_json::to_string_pretty(&self.values)
            .map_err(|e| format!("cannot serialize config: {e}"))?;
        fs::write(&self.path, raw)
            .map_err(|e| format!("cannot write config {}: {e}", self.path.display()))
    }
}

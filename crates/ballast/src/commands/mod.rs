//! Command palette catalog and key bindings.
//!
//! The palette is a flat list filtered by case-insensitive substring;
//! pressing enter activates the first remaining match. The catalog is built
//! once at startup — theme entries come from whatever theme labels the
//! display layer registers.

use std::fmt;

// ── Palette ────────────────────────────────────────────────────────

/// What a palette entry does when activated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandAction {
    StartGovernor,
    HaltGovernor,
    ClearStats,
    SetMemoryLimit(u64),
    SyncActiveFile,
    SyncProject,
    ToggleCompanion,
    FloatCompanion,
    ToggleEffect,
    TogglePanels,
    ExportSettings,
    ImportSettings,
    ResetSettings,
    SelectTheme(String),
}

/// One activatable palette entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub action: CommandAction,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// The full palette, in display order.
#[derive(Clone, Debug)]
pub struct CommandCatalog {
    commands: Vec<Command>,
}

impl CommandCatalog {
    pub fn new(theme_labels: &[&str]) -> Self {
        let mut commands = vec![
            entry("governor: start", CommandAction::StartGovernor),
            entry("governor: halt", CommandAction::HaltGovernor),
            entry("governor: clear counters", CommandAction::ClearStats),
            entry("sync: active file", CommandAction::SyncActiveFile),
            entry("sync: whole project", CommandAction::SyncProject),
            entry("companion: toggle", CommandAction::ToggleCompanion),
            entry("companion: float", CommandAction::FloatCompanion),
            entry("effect: toggle", CommandAction::ToggleEffect),
            entry("panels: toggle", CommandAction::TogglePanels),
            entry("settings: export", CommandAction::ExportSettings),
            entry("settings: import", CommandAction::ImportSettings),
            entry("settings: reset", CommandAction::ResetSettings),
        ];
        for mb in [256u64, 512, 1024, 2048, 4096] {
            commands.push(entry(
                format!("memory limit: {mb} MB"),
                CommandAction::SetMemoryLimit(mb),
            ));
        }
        for &label in theme_labels {
            commands.push(entry(
                format!("theme: {label}"),
                CommandAction::SelectTheme(label.to_string()),
            ));
        }
        Self { commands }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Entries whose name contains `query`, case-insensitively. An empty
    /// query matches everything.
    pub fn filter(&self, query: &str) -> Vec<&Command> {
        let needle = query.to_lowercase();
        self.commands
            .iter()
            .filter(|c| c.name.to_lowercase().contains(&needle))
            .collect()
    }

    /// The entry enter would activate for `query`: the first match.
    pub fn activate(&self, query: &str) -> Option<&Command> {
        self.filter(query).into_iter().next()
    }
}

fn entry(name: impl Into<String>, action: CommandAction) -> Command {
    Command {
        name: name.into(),
        action,
    }
}

// ── Key bindings ───────────────────────────────────────────────────

/// A modifier+key combination. Matching is on the lowercase key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyChord {
    pub ctrl: bool,
    pub shift: bool,
    pub key: char,
}

/// What a bound chord triggers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChordAction {
    ToggleCompanion,
    OpenPalette,
    SyncActiveFile,
}

/// Every bound chord. All of these are intercepted: the host never sees
/// them, even when it binds the same combination.
pub const KEY_BINDINGS: [(KeyChord, ChordAction); 3] = [
    (
        KeyChord {
            ctrl: true,
            shift: true,
            key: 'k',
        },
        ChordAction::ToggleCompanion,
    ),
    (
        KeyChord {
            ctrl: true,
            shift: true,
            key: 'p',
        },
        ChordAction::OpenPalette,
    ),
    (
        KeyChord {
            ctrl: true,
            shift: false,
            key: 's',
        },
        ChordAction::SyncActiveFile,
    ),
];

/// Resolve a key event to its bound action, if any.
pub fn chord_action(ctrl: bool, shift: bool, key: char) -> Option<ChordAction> {
    let key = key.to_ascii_lowercase();
    KEY_BINDINGS
        .iter()
        .find(|(chord, _)| chord.ctrl == ctrl && chord.shift == shift && chord.key == key)
        .map(|&(_, action)| action)
}

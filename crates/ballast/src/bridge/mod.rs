//! Client for the local bridge relay.
//!
//! The bridge is a separate process listening on localhost; it accepts file
//! payloads and deploys them to a workspace on disk. We treat it as
//! optional: a boot-time [`probe`](BridgeClient::probe) decides whether the
//! sync surface lights up at all, and every sync degrades to a clean error
//! when the bridge is gone.
//!
//! Syncs are exclusive. Overlapping requests are rejected outright rather
//! than queued — a queued stale sync deploying over a newer one is worse
//! than asking the user to retry.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::editor::{EditorModel, EditorRuntime};

/// Where the bridge listens unless configured otherwise.
pub const DEFAULT_BRIDGE_URL: &str = "http://localhost:3000";

/// How long the availability probe waits before declaring the bridge gone.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(800);

/// Transient status messages stay visible this long.
pub const STATUS_CLEAR_AFTER: Duration = Duration::from_secs(3);

// ── Wire types ─────────────────────────────────────────────────────

/// One file in a deploy payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeployFile {
    pub path: String,
    pub content: String,
}

/// The single POST body a sync sends. A project sync of N files is one
/// payload, never N requests.
#[derive(Clone, Debug, Serialize)]
pub struct DeployPayload {
    /// Origin page url, so the bridge can attribute the deploy.
    pub url: String,
    pub files: Vec<DeployFile>,
}

/// What the bridge answers a deploy with. A 2xx status alone means nothing:
/// the bridge reports application failures as `success: false` in the body.
#[derive(Clone, Debug, Deserialize)]
pub struct DeployResponse {
    pub success: bool,
    /// Port the deployed workspace is served on.
    pub port: Option<u16>,
    /// Bridge-side deploy state, e.g. `"running"`.
    pub status: Option<String>,
    pub error: Option<String>,
}

/// Outcome of a successful project sync, as the display layer presents it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncReport {
    pub files: usize,
    /// Remote-assigned port, when the bridge reports one.
    pub port: Option<u16>,
    pub status: Option<String>,
    /// How long the display layer should keep this status visible.
    pub clear_after: Duration,
}

// ── Errors ─────────────────────────────────────────────────────────

/// Why a sync did not happen.
#[derive(Debug)]
pub enum SyncError {
    /// No focused model and no open models at all.
    NoActiveFile,
    /// Another sync is already in flight.
    SyncInFlight,
    /// The user declined the confirmation prompt.
    Cancelled,
    /// Everything in the project was filtered out.
    NothingToSync,
    /// The bridge refused or the request failed.
    Bridge(String),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoActiveFile => write!(f, "no active file to sync"),
            Self::SyncInFlight => write!(f, "a sync is already in flight"),
            Self::Cancelled => write!(f, "sync cancelled"),
            Self::NothingToSync => write!(f, "nothing to sync after filtering"),
            Self::Bridge(reason) => write!(f, "bridge error: {reason}"),
        }
    }
}

impl std::error::Error for SyncError {}

// ── Path helpers ───────────────────────────────────────────────────

/// Runtime paths may carry one leading separator; the bridge wants them
/// relative.
pub fn normalize_path(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

/// Anonymous buffers surface as `model/<n>` (sometimes with a leading
/// separator). They need a real filename before the bridge sees them.
pub fn is_anonymous_path(path: &str) -> bool {
    normalize_path(path)
        .strip_prefix("model/")
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

/// File extension for a declared language id.
pub fn extension_for_language(language: Option<&str>) -> &'static str {
    match language {
        Some("javascript") => "js",
        Some("typescript") => "ts",
        Some("python") => "py",
        _ => "txt",
    }
}

/// Dependency trees and generated declaration files never sync.
pub fn should_skip(path: &str) -> bool {
    path.contains("node_modules") || path.ends_with(".d.ts")
}

/// Clock-derived suffix for anonymous buffers. Unique enough for naming,
/// nothing more.
pub fn clock_rand() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() % 1000)
        .unwrap_or(0)
}

/// Turn open models into a deploy file list: filtered, normalized, and
/// anonymous buffers renamed to `untitled_<n>.<ext>`.
pub fn project_files(models: &[EditorModel], rand: &mut dyn FnMut() -> u32) -> Vec<DeployFile> {
    let mut files = Vec::new();
    for model in models {
        if should_skip(&model.path) {
            debug!("skipping {}", model.path);
            continue;
        }
        let path = if is_anonymous_path(&model.path) {
            format!(
                "untitled_{}.{}",
                rand(),
                extension_for_language(model.language.as_deref())
            )
        } else {
            normalize_path(&model.path).to_string()
        };
        files.push(DeployFile {
            path,
            content: model.content.clone(),
        });
    }
    files
}

// ── Client ─────────────────────────────────────────────────────────

/// HTTP client for one bridge endpoint.
pub struct BridgeClient {
    base: String,
    origin_url: String,
    client: reqwest::Client,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when a sync ends, success or not.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl BridgeClient {
    pub fn new(base: impl Into<String>, origin_url: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            origin_url: origin_url.into(),
            client: reqwest::Client::new(),
            in_flight: AtomicBool::new(false),
        }
    }

    fn begin_flight(&self) -> Result<FlightGuard<'_>, SyncError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SyncError::SyncInFlight);
        }
        Ok(FlightGuard(&self.in_flight))
    }

    /// Is anything listening? One OPTIONS request, bounded by
    /// [`PROBE_TIMEOUT`], no retry — the probe decides a boolean, fast.
    pub async fn probe(&self) -> bool {
        let online = match self
            .client
            .request(reqwest::Method::OPTIONS, &self.base)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        };
        debug!("bridge probe: {}", if online { "online" } else { "offline" });
        online
    }

    async fn deploy(&self, files: Vec<DeployFile>) -> Result<DeployResponse, SyncError> {
        let payload = DeployPayload {
            url: self.origin_url.clone(),
            files,
        };
        let response = self
            .client
            .post(format!("{}/api/deploy", self.base))
            .json(&payload)
            .send()
            .await
            .map_err(|e| SyncError::Bridge(format!("request failed: {e}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Bridge(format!("bridge returned {status}: {body}")));
        }
        let parsed: DeployResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Bridge(format!("malformed bridge response: {e}")))?;
        if !parsed.success {
            return Err(SyncError::Bridge(
                parsed
                    .error
                    .unwrap_or_else(|| "bridge reported failure".to_string()),
            ));
        }
        Ok(parsed)
    }

    /// Sync the single active file: the focused model, or the most recently
    /// opened one when nothing holds focus. Returns the path as deployed.
    pub async fn sync_file(&self, runtime: &dyn EditorRuntime) -> Result<String, SyncError> {
        let _guard = self.begin_flight()?;
        let model = runtime
            .focused()
            .or_else(|| runtime.models().into_iter().next_back())
            .ok_or(SyncError::NoActiveFile)?;
        let path = normalize_path(&model.path).to_string();
        info!("syncing {path}");
        self.deploy(vec![DeployFile {
            path: path.clone(),
            content: model.content,
        }])
        .await?;
        Ok(path)
    }

    /// Sync every open model as one atomic payload. `confirm` is shown the
    /// file count and must approve before anything leaves the process.
    /// Reports the remote-assigned port and status the bridge answers with.
    pub async fn sync_project(
        &self,
        runtime: &dyn EditorRuntime,
        rand: &mut dyn FnMut() -> u32,
        confirm: impl FnOnce(usize) -> bool,
    ) -> Result<SyncReport, SyncError> {
        let _guard = self.begin_flight()?;
        let files = project_files(&runtime.models(), rand);
        if files.is_empty() {
            return Err(SyncError::NothingToSync);
        }
        if !confirm(files.len()) {
            return Err(SyncError::Cancelled);
        }
        info!("syncing project: {} file(s)", files.len());
        let count = files.len();
        let response = self.deploy(files).await?;
        Ok(SyncReport {
            files: count,
            port: response.port,
            status: response.status,
            clear_after: STATUS_CLEAR_AFTER,
        })
    }
}

//! RPC-layer server state: persisted settings/history, the per-session
//! subscription table, and the tasks (DETS-equivalent) store.
//!
//! None of this belongs in `opal-agent` — it's bookkeeping the transport
//! needs to answer `settings/get`, `tasks/list`, `auth/status`, and to
//! guarantee it subscribes to exactly one session bus per session and
//! never re-subscribes — so it lives here, separate from anything in
//! `opal-agent`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

/// `cli_state.json`: settings plus a newest-first, length-capped
/// prompt history.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CliState {
    #[serde(default)]
    pub settings: serde_json::Value,
    #[serde(default)]
    pub history: Vec<String>,
}

const MAX_HISTORY: usize = 200;

impl CliState {
    fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)
    }

    /// Push a newest-first history entry, capped at 200.
    fn push_history(&mut self, entry: String) {
        self.history.insert(0, entry);
        self.history.truncate(MAX_HISTORY);
    }
}

/// One `tasks/<scope-hash>.dets`-equivalent record set: a
/// monotonic counter that must survive process restarts, plus whatever
/// task records were persisted under that scope. The concrete task
/// schema is an external-collaborator concern — this store only guarantees the
/// counter and the opaque record list round-trip.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskScopeRecord {
    pub counter: u64,
    #[serde(default)]
    pub tasks: Vec<serde_json::Value>,
}

/// Resolves a task scope key to its on-disk file name. `session:<id>` when
/// a session id is available, else the working directory string.
/// Hashed with a stable non-cryptographic hash so the file name is
/// filesystem-safe regardless of what the scope key contains.
pub fn scope_hash(scope_key: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    scope_key.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

pub struct AuthState {
    pub status: String,
    pub provider: Option<String>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self { status: "signed_out".to_string(), provider: None }
    }
}

/// All of the RPC layer's own persisted/in-memory bookkeeping, separate
/// from `opal-agent`'s session and turn state.
pub struct ServerState {
    data_dir: PathBuf,
    cli_state: Mutex<CliState>,
    tasks: Mutex<HashMap<String, TaskScopeRecord>>,
    /// Sessions the server has already subscribed its forwarder to.
    subscribed: RwLock<HashSet<String>>,
    auth: Mutex<AuthState>,
    /// Pending `auth/login` device codes awaiting `auth/poll` (session id
    /// is irrelevant here — auth is process-wide, ).
    pending_login: Mutex<Option<PendingLogin>>,
    /// `opal/config/set`'s `distribution` field: bookkeeping
    /// only. Actually joining an inter-process distribution mesh is an
    /// external-collaborator concern this core doesn't implement; the
    /// RPC layer just remembers and echoes back what was requested.
    distribution: Mutex<Option<DistributionInfo>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionInfo {
    pub name: String,
    #[serde(default)]
    pub cookie: Option<String>,
}

struct PendingLogin {
    device_code: String,
    user_code: String,
    verification_url: String,
}

impl ServerState {
    pub fn new(data_dir: PathBuf) -> Self {
        let cli_state = CliState::load(&data_dir.join("cli_state.json"));
        Self {
            data_dir,
            cli_state: Mutex::new(cli_state),
            tasks: Mutex::new(HashMap::new()),
            subscribed: RwLock::new(HashSet::new()),
            auth: Mutex::new(AuthState::default()),
            pending_login: Mutex::new(None),
            distribution: Mutex::new(None),
        }
    }

    pub fn distribution(&self) -> Option<DistributionInfo> {
        self.distribution.lock().clone()
    }

    pub fn set_distribution(&self, info: Option<DistributionInfo>) {
        *self.distribution.lock() = info;
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn settings_get(&self) -> serde_json::Value {
        self.cli_state.lock().settings.clone()
    }

    pub fn settings_save(&self, settings: serde_json::Value) {
        let mut state = self.cli_state.lock();
        state.settings = settings;
        let _ = state.save(&self.data_dir.join("cli_state.json"));
    }

    pub fn push_history(&self, entry: String) {
        let mut state = self.cli_state.lock();
        state.push_history(entry);
        let _ = state.save(&self.data_dir.join("cli_state.json"));
    }

    pub fn history(&self) -> Vec<String> {
        self.cli_state.lock().history.clone()
    }

    /// Returns `true` the first time it's called for a given session id;
    /// `false` on every call after (the "exactly once" guarantee).
    pub fn mark_subscribed(&self, session_id: &str) -> bool {
        self.subscribed.write().insert(session_id.to_string())
    }

    pub fn forget_subscription(&self, session_id: &str) {
        self.subscribed.write().remove(session_id);
    }

    fn tasks_path(&self, scope_key: &str) -> PathBuf {
        self.data_dir.join("tasks").join(format!("{}.dets", scope_hash(scope_key)))
    }

    /// Load (or lazily create) the record for a scope, persist it to disk
    /// if it didn't already exist, and return a clone.
    pub fn tasks_for_scope(&self, scope_key: &str) -> TaskScopeRecord {
        let mut tasks = self.tasks.lock();
        if let Some(existing) = tasks.get(scope_key) {
            return existing.clone();
        }
        let path = self.tasks_path(scope_key);
        let record = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        tasks.insert(scope_key.to_string(), record);
        tasks.get(scope_key).cloned().unwrap_or_default()
    }

    /// Allocate the next counter value for a scope, persisting
    /// immediately so the counter survives a crash between allocation and
    /// use.
    pub fn next_task_counter(&self, scope_key: &str) -> u64 {
        let mut tasks = self.tasks.lock();
        let record = tasks.entry(scope_key.to_string()).or_insert_with(|| {
            let path = self.tasks_path(scope_key);
            std::fs::read_to_string(&path)
                .ok()
                .and_then(|raw| serde_json::from_str(&raw).ok())
                .unwrap_or_default()
        });
        record.counter += 1;
        let counter = record.counter;
        let snapshot = record.clone();
        drop(tasks);
        self.persist_scope(scope_key, &snapshot);
        counter
    }

    fn persist_scope(&self, scope_key: &str, record: &TaskScopeRecord) {
        let path = self.tasks_path(scope_key);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(raw) = serde_json::to_string_pretty(record) {
            let _ = std::fs::write(path, raw);
        }
    }

    pub fn auth_status(&self) -> (String, Option<String>) {
        let auth = self.auth.lock();
        (auth.status.clone(), auth.provider.clone())
    }

    pub fn set_auth(&self, status: impl Into<String>, provider: Option<String>) {
        let mut auth = self.auth.lock();
        auth.status = status.into();
        auth.provider = provider;
    }

    pub fn begin_login(&self, device_code: String, user_code: String, verification_url: String) {
        *self.pending_login.lock() = Some(PendingLogin { device_code, user_code, verification_url });
        self.set_auth("pending", None);
    }

    /// `auth/poll`.
    pub fn poll_login(&self, device_code: &str) -> PollOutcome {
        let pending = self.pending_login.lock();
        match pending.as_ref() {
            Some(p) if p.device_code == device_code => PollOutcome::Pending {
                user_code: p.user_code.clone(),
                verification_url: p.verification_url.clone(),
            },
            Some(_) => PollOutcome::Unknown,
            None => PollOutcome::Unknown,
        }
    }

    pub fn complete_login(&self, provider: impl Into<String>) {
        *self.pending_login.lock() = None;
        self.set_auth("signed_in", Some(provider.into()));
    }
}

pub enum PollOutcome {
    Pending { user_code: String, verification_url: String },
    Unknown,
}

//! Operation model, lifecycle states and the process-wide registry

pub mod driver;

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

use crate::error::OperationError;
use crate::transport::TransportKind;

/// What kind of external command an operation runs. The kind selects the
/// output grammar the progress parser applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Build,
    Sync,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Build => "build",
            OperationKind::Sync => "sync",
        }
    }
}

/// One invocation of an external long-running command, tracked end-to-end to a
/// terminal outcome.
#[derive(Debug, Clone)]
pub struct OperationSpec {
    /// Human-readable name used in progress and failure messages.
    pub name: String,
    /// Shell command string to run.
    pub command: String,
    pub kind: OperationKind,
    /// Extra environment for the child. Merged on top of the inherited
    /// environment; never replaces it.
    pub env: HashMap<String, String>,
    pub transport: TransportKind,
    pub working_dir: Option<PathBuf>,
}

impl OperationSpec {
    pub fn new(name: &str, command: &str, kind: OperationKind) -> Self {
        Self {
            name: name.to_string(),
            command: command.to_string(),
            kind,
            env: HashMap::new(),
            transport: TransportKind::Direct,
            working_dir: None,
        }
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }
}

/// Lifecycle state of an operation. Terminal states are absorbing: no
/// transition ever leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Running,
    Succeeded,
    Failed(i32),
    Canceled,
    TransportError,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LifecycleState::Running)
    }
}

/// Terminal outcome of an operation, produced exactly once by the arbiter.
#[derive(Debug)]
pub enum Outcome {
    Succeeded,
    Failed(OperationError),
    Canceled,
    TransportError(OperationError),
}

impl Outcome {
    pub fn state(&self) -> LifecycleState {
        match self {
            Outcome::Succeeded => LifecycleState::Succeeded,
            Outcome::Failed(err) => LifecycleState::Failed(err.exit_code()),
            Outcome::Canceled => LifecycleState::Canceled,
            Outcome::TransportError(_) => LifecycleState::TransportError,
        }
    }
}

static REGISTRY: Lazy<OperationRegistry> = Lazy::new(OperationRegistry::new);

/// Process-wide registry of in-flight operations, keyed by kind.
///
/// An entry is inserted when the operation starts and removed at settlement.
/// Queries are pure reads; this replaces a bare mutable busy flag.
pub struct OperationRegistry {
    active: Mutex<HashMap<OperationKind, String>>,
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn global() -> &'static OperationRegistry {
        &REGISTRY
    }

    pub async fn begin(&self, kind: OperationKind, name: &str) {
        if let Some(previous) = self
            .active
            .lock()
            .await
            .insert(kind, name.to_string())
        {
            tracing::warn!(kind = kind.as_str(), %previous, "operation replaced in registry");
        }
    }

    pub async fn finish(&self, kind: OperationKind) {
        self.active.lock().await.remove(&kind);
    }

    pub async fn is_busy(&self, kind: OperationKind) -> bool {
        self.active.lock().await.contains_key(&kind)
    }

    pub async fn active_name(&self, kind: OperationKind) -> Option<String> {
        self.active.lock().await.get(&kind).cloned()
    }
}

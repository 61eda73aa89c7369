//! Asynchronous operation registry
//!
//! Tracks shielding operations by opaque id. Operations stay in the registry
//! until their result is taken or they age past an optional TTL.

use crate::transaction::TxId;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::Notify;

/// Opaque operation identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    /// Fresh random id (`opid-<uuid>`)
    pub fn new() -> Self {
        Self(format!("opid-{}", uuid::Uuid::new_v4()))
    }

    /// Id string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for OperationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Operation lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Created, not yet running
    Queued,
    /// Building, signing or broadcasting
    Executing,
    /// Broadcast accepted
    Success,
    /// Build or broadcast failed
    Failed,
}

impl OperationStatus {
    /// True for success and failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Success | OperationStatus::Failed)
    }
}

/// Snapshot of one operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationState {
    /// Operation id
    pub id: OperationId,
    /// Method that created the operation
    pub method: String,
    /// Current status
    pub status: OperationStatus,
    /// Creation time
    pub creation_time: DateTime<Utc>,
    /// Transaction id on success
    pub txid: Option<TxId>,
    /// Failure reason
    pub error: Option<String>,
    /// Wall-clock execution time once terminal
    pub execution_secs: Option<f64>,
}

/// Operation registry
pub struct OperationRegistry {
    operations: RwLock<HashMap<OperationId, OperationState>>,
    changed: Notify,
}

impl OperationRegistry {
    /// Create empty registry
    pub fn new() -> Self {
        Self {
            operations: RwLock::new(HashMap::new()),
            changed: Notify::new(),
        }
    }

    /// Register a queued operation
    pub fn insert(&self, id: OperationId, method: &str) {
        let state = OperationState {
            id: id.clone(),
            method: method.to_string(),
            status: OperationStatus::Queued,
            creation_time: Utc::now(),
            txid: None,
            error: None,
            execution_secs: None,
        };
        self.operations.write().insert(id, state);
        self.changed.notify_waiters();
    }

    /// Move a queued operation to executing
    pub fn mark_executing(&self, id: &OperationId) {
        if let Some(op) = self.operations.write().get_mut(id) {
            if op.status == OperationStatus::Queued {
                op.status = OperationStatus::Executing;
                tracing::debug!("Operation {} executing", id);
            }
        }
        self.changed.notify_waiters();
    }

    /// Record a terminal outcome
    pub fn complete(&self, id: &OperationId, outcome: std::result::Result<TxId, String>, elapsed: Duration) {
        if let Some(op) = self.operations.write().get_mut(id) {
            op.execution_secs = Some(elapsed.as_secs_f64());
            match outcome {
                Ok(txid) => {
                    op.status = OperationStatus::Success;
                    op.txid = Some(txid);
                }
                Err(reason) => {
                    op.status = OperationStatus::Failed;
                    op.error = Some(reason);
                }
            }
        }
        self.changed.notify_waiters();
    }

    /// Non-blocking status poll
    pub fn status(&self, id: &OperationId) -> Result<OperationState> {
        self.operations
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UnknownOperation(id.to_string()))
    }

    /// Operation ids, oldest first, optionally filtered by status
    pub fn list(&self, filter: Option<OperationStatus>) -> Vec<OperationId> {
        let operations = self.operations.read();
        let mut states: Vec<&OperationState> = operations
            .values()
            .filter(|op| filter.map_or(true, |s| op.status == s))
            .collect();
        states.sort_by(|a, b| a.creation_time.cmp(&b.creation_time).then(a.id.cmp(&b.id)));
        states.into_iter().map(|op| op.id.clone()).collect()
    }

    /// Remove and return a terminal operation; `None` while it is still running
    pub fn take_result(&self, id: &OperationId) -> Result<Option<OperationState>> {
        let mut operations = self.operations.write();
        let terminal = match operations.get(id) {
            None => return Err(Error::UnknownOperation(id.to_string())),
            Some(op) => op.status.is_terminal(),
        };
        if !terminal {
            return Ok(None);
        }
        Ok(operations.remove(id))
    }

    /// Wait until the operation is terminal or `timeout` elapses.
    ///
    /// Returns the latest state either way; callers check
    /// [`OperationStatus::is_terminal`].
    pub async fn wait(&self, id: &OperationId, timeout: Duration) -> Result<OperationState> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.changed.notified();
            let state = self.status(id)?;
            if state.status.is_terminal() {
                return Ok(state);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.status(id);
            }
        }
    }

    /// Drop terminal operations created more than `ttl` ago
    pub fn prune_older_than(&self, ttl: Duration) -> usize {
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return 0;
        };
        let cutoff = Utc::now() - ttl;
        let mut operations = self.operations.write();
        let before = operations.len();
        operations.retain(|_, op| !(op.status.is_terminal() && op.creation_time <= cutoff));
        before - operations.len()
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

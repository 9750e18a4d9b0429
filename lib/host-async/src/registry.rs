//! Bounded registry of operations delegated to the host.
//!
//! The registry never waits. An operation is registered as
//! [`OpState::Pending`], some glue later calls [`AsyncRegistry::update`]
//! with the outcome, and the guest polls [`AsyncRegistry::get_state`] at its
//! suspension points. Cancelling is simply removing the operation before the
//! host reports back.

use slot_table::{SlotTable, TableFull};
use thiserror::Error;
use tracing::{debug, warn};

use crate::op::{AsyncOperation, OpId, OpKind, OpState, OpStatus, OperationView};

/// Maximum number of live operations.
pub const MAX_ASYNC_OPERATIONS: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "enable-serde", serde(default))]
pub struct RegistryConfig {
    pub max_operations: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_operations: MAX_ASYNC_OPERATIONS,
        }
    }
}

#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// Every slot holds a live operation. Retry after removing one.
    #[error("async operation table is full ({capacity} operations live)")]
    Full { capacity: usize },
}

impl From<TableFull> for RegistryError {
    fn from(err: TableFull) -> Self {
        RegistryError::Full {
            capacity: err.capacity,
        }
    }
}

#[derive(Debug)]
pub struct AsyncRegistry {
    ops: SlotTable<AsyncOperation>,
    next_id: i32,
}

impl Default for AsyncRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncRegistry {
    pub fn new() -> Self {
        Self::with_config(&RegistryConfig::default())
    }

    pub fn with_config(config: &RegistryConfig) -> Self {
        Self {
            ops: SlotTable::with_capacity(config.max_operations),
            next_id: 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.ops.capacity()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Registers a pending operation holding a copy of `payload`.
    ///
    /// Ids count up from 1 and start over at 1 once `i32::MAX` has been
    /// handed out. The counter does not skip ids that are still live.
    pub fn register(&mut self, kind: OpKind, payload: &[u8]) -> Result<OpId, RegistryError> {
        if self.ops.is_full() {
            warn!(capacity = self.ops.capacity(), ?kind, "async operation table is full");
            return Err(RegistryError::Full {
                capacity: self.ops.capacity(),
            });
        }

        let id = OpId::from_raw(self.next_id);
        self.ops.insert(AsyncOperation {
            id,
            kind,
            state: OpState::Pending,
            payload: copy_payload(payload),
            error: None,
        })?;
        self.advance_id();

        debug!(%id, ?kind, payload_len = payload.len(), "registered async operation");
        Ok(id)
    }

    fn advance_id(&mut self) {
        self.next_id = match self.next_id.checked_add(1) {
            Some(next) => next,
            None => {
                debug!("async operation id counter wrapped");
                if self.exists(OpId::from_raw(1)) {
                    warn!("operation id 1 is still live after the id counter wrapped");
                }
                1
            }
        };
    }

    /// Replaces state, payload and error of `id`. Unknown ids are ignored;
    /// the return value says whether an operation was updated.
    ///
    /// The previous payload and error are dropped first. `None` (or an empty
    /// payload) leaves the operation without payload or error. Any state may
    /// follow any other, including a return to [`OpState::Pending`].
    pub fn update(
        &mut self,
        id: OpId,
        state: OpState,
        payload: Option<&[u8]>,
        error: Option<&str>,
    ) -> bool {
        let Some(op) = self.ops.find_mut(|op| op.id == id) else {
            debug!(%id, "update for unknown async operation");
            return false;
        };

        op.state = state;
        op.payload = Vec::new();
        op.error = None;
        if let Some(payload) = payload {
            op.payload = copy_payload(payload);
        }
        if let Some(error) = error {
            op.error = copy_error(error);
        }

        debug!(%id, ?state, payload_len = op.payload.len(), has_error = op.error.is_some(), "updated async operation");
        true
    }

    pub fn get(&self, id: OpId) -> Option<OperationView<'_>> {
        self.ops.find(|op| op.id == id).map(AsyncOperation::view)
    }

    /// Current state of `id` with borrowed payload and error.
    /// Unknown ids report [`OpStatus::UNKNOWN`] (rejected, no payload, no
    /// error).
    pub fn get_state(&self, id: OpId) -> OpStatus<'_> {
        self.get(id).map(OpStatus::from).unwrap_or(OpStatus::UNKNOWN)
    }

    /// Drops the operation and frees its slot. Unknown ids are ignored.
    pub fn remove(&mut self, id: OpId) -> bool {
        match self.ops.remove_where(|op| op.id == id) {
            Some(op) => {
                debug!(%id, state = ?op.state, "removed async operation");
                true
            }
            None => false,
        }
    }

    pub fn exists(&self, id: OpId) -> bool {
        self.ops.find(|op| op.id == id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = OperationView<'_>> + '_ {
        self.ops.iter().map(AsyncOperation::view)
    }

    pub fn pending_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| op.state == OpState::Pending)
            .count()
    }

    #[cfg(test)]
    pub(crate) fn set_next_id(&mut self, next_id: i32) {
        self.next_id = next_id;
    }
}

/// Copies `bytes` into a fresh buffer. If the allocation fails the operation
/// keeps an empty payload instead of failing.
fn copy_payload(bytes: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    if buf.try_reserve_exact(bytes.len()).is_err() {
        warn!(len = bytes.len(), "payload allocation failed, storing empty payload");
        return buf;
    }
    buf.extend_from_slice(bytes);
    buf
}

fn copy_error(message: &str) -> Option<String> {
    let mut buf = String::new();
    if buf.try_reserve_exact(message.len()).is_err() {
        warn!(len = message.len(), "error message allocation failed, dropping it");
        return None;
    }
    buf.push_str(message);
    Some(buf)
}

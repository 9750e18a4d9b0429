use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::bridge::{
    Completion, CompletionQueue, CompletionSender, FetchRequest, HostBridge, Outcome,
};
use crate::op::{OpId, OpKind, OpState};
use crate::registry::{AsyncRegistry, RegistryError};

/// Owns a registry together with the host doing the work.
///
/// Host work reports through a [`CompletionSender`] from any thread, and
/// [`AsyncDriver::poll`] applies whatever arrived since the last call.
/// Suspension points of the guest are expected to call `poll` before
/// looking at operation state.
#[derive(Debug)]
pub struct AsyncDriver<H> {
    registry: AsyncRegistry,
    host: H,
    queue: CompletionQueue,
}

impl<H: HostBridge> AsyncDriver<H> {
    pub fn new(host: H) -> Self {
        Self::with_registry(AsyncRegistry::new(), host)
    }

    pub fn with_registry(registry: AsyncRegistry, host: H) -> Self {
        Self {
            registry,
            host,
            queue: CompletionQueue::new(),
        }
    }

    pub fn registry(&self) -> &AsyncRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut AsyncRegistry {
        &mut self.registry
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Sender for completions of [`OpKind::Custom`] operations.
    pub fn sender(&self) -> CompletionSender {
        self.queue.sender()
    }

    /// Registers a fetch and hands it to the host. The serialized request is
    /// kept as the pending payload.
    pub fn start_fetch(&mut self, request: FetchRequest) -> Result<OpId, RegistryError> {
        let payload = serialize_request(&request);
        let id = self.registry.register(OpKind::Fetch, &payload)?;
        self.host.fetch(id, request, self.queue.sender());
        Ok(id)
    }

    pub fn start_timer(&mut self, delay: Duration) -> Result<OpId, RegistryError> {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        let id = self.registry.register(OpKind::Timer, &millis.to_le_bytes())?;
        self.host.timer(id, delay, self.queue.sender());
        Ok(id)
    }

    /// Registers an operation the caller completes itself through
    /// [`AsyncDriver::sender`] or [`AsyncRegistry::update`].
    pub fn start_custom(&mut self, payload: &[u8]) -> Result<OpId, RegistryError> {
        self.registry.register(OpKind::Custom, payload)
    }

    /// Applies every completion received so far. Returns how many reached a
    /// live operation; completions for removed operations are dropped.
    pub fn poll(&mut self) -> usize {
        let mut applied = 0;
        while let Some(Completion { id, outcome }) = self.queue.try_next() {
            let updated = match &outcome {
                Outcome::Resolved(payload) => {
                    self.registry
                        .update(id, OpState::Resolved, Some(payload.as_slice()), None)
                }
                Outcome::Rejected(message) => {
                    self.registry
                        .update(id, OpState::Rejected, None, Some(message.as_str()))
                }
            };
            if updated {
                applied += 1;
            } else {
                trace!(%id, "dropping completion for removed operation");
            }
        }
        applied
    }

    /// Removes a settled operation and returns its outcome. Pending and
    /// unknown operations yield `None` and stay as they are.
    pub fn take(&mut self, id: OpId) -> Option<Outcome> {
        let view = self.registry.get(id)?;
        let outcome = match view.state {
            OpState::Pending => return None,
            OpState::Resolved => Outcome::Resolved(view.payload.to_vec()),
            OpState::Rejected => Outcome::Rejected(view.error.unwrap_or_default().to_string()),
        };
        self.registry.remove(id);
        Some(outcome)
    }

    /// Forgets the operation. A late completion for it is dropped by `poll`.
    pub fn cancel(&mut self, id: OpId) -> bool {
        let removed = self.registry.remove(id);
        if removed {
            debug!(%id, "cancelled async operation");
        }
        removed
    }

    pub fn pending_count(&self) -> usize {
        self.registry.pending_count()
    }

    /// Whether waiting on pending operations can make progress.
    pub fn has_work(&self) -> bool {
        self.pending_count() > 0 && self.host.resolve_pending()
    }
}

/// The pending payload of a fetch. A request that cannot be encoded is
/// still started, with an empty payload.
fn serialize_request(request: &FetchRequest) -> Vec<u8> {
    match serde_json::to_vec(request) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(url = %request.url, error = %err, "unable to encode fetch request, storing empty payload");
            Vec::new()
        }
    }
}

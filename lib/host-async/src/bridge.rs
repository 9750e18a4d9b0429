//! Seam between the registry and whatever performs the work on the host.
//!
//! A [`HostBridge`] starts the real operation and reports back through a
//! [`CompletionSender`]. Completions may be produced on any thread; they sit
//! in the [`CompletionQueue`] until the thread owning the registry drains
//! them, so the registry itself is only ever touched by its owner.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::op::{OpId, OpState};

/// A guest `fetch` call as handed to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    pub method: String,
    /// Header map as JSON object text, e.g. `{"accept":"text/plain"}`.
    #[serde(default)]
    pub headers: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: String::new(),
            body: None,
        }
    }

    /// Parses [`FetchRequest::headers`]. Empty or malformed text yields an
    /// empty map; malformed text is logged.
    pub fn headers(&self) -> IndexMap<String, String> {
        if self.headers.trim().is_empty() {
            return IndexMap::new();
        }
        match serde_json::from_str(&self.headers) {
            Ok(map) => map,
            Err(err) => {
                warn!(url = %self.url, error = %err, "ignoring malformed fetch headers");
                IndexMap::new()
            }
        }
    }
}

/// Final result of an operation. There is exactly one per operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Resolved(Vec<u8>),
    Rejected(String),
}

impl Outcome {
    pub fn state(&self) -> OpState {
        match self {
            Outcome::Resolved(_) => OpState::Resolved,
            Outcome::Rejected(_) => OpState::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub id: OpId,
    pub outcome: Outcome,
}

#[derive(Debug, Clone)]
pub struct CompletionSender {
    tx: mpsc::UnboundedSender<Completion>,
}

impl CompletionSender {
    pub fn send(&self, completion: Completion) {
        let id = completion.id;
        if self.tx.send(completion).is_err() {
            debug!(%id, "completion dropped, queue is gone");
        }
    }

    pub fn resolve(&self, id: OpId, payload: impl Into<Vec<u8>>) {
        self.send(Completion {
            id,
            outcome: Outcome::Resolved(payload.into()),
        });
    }

    pub fn reject(&self, id: OpId, message: impl Into<String>) {
        self.send(Completion {
            id,
            outcome: Outcome::Rejected(message.into()),
        });
    }
}

#[derive(Debug)]
pub struct CompletionQueue {
    tx: mpsc::UnboundedSender<Completion>,
    rx: mpsc::UnboundedReceiver<Completion>,
}

impl Default for CompletionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub fn sender(&self) -> CompletionSender {
        CompletionSender {
            tx: self.tx.clone(),
        }
    }

    /// Next completion, without waiting.
    pub fn try_next(&mut self) -> Option<Completion> {
        self.rx.try_recv().ok()
    }
}

/// Starts host-side work for registered operations.
pub trait HostBridge {
    fn fetch(&self, id: OpId, request: FetchRequest, done: CompletionSender);

    fn timer(&self, id: OpId, delay: Duration, done: CompletionSender);

    /// Whether the host may still deliver completions. Hosts that cannot
    /// tell keep the default.
    fn resolve_pending(&self) -> bool {
        true
    }
}

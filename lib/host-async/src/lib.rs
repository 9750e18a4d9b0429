//! Registry of asynchronous operations performed by a host on behalf of a
//! guest that cannot wait on them itself.
//!
//! The guest registers an operation, the host completes it on its own time,
//! and the guest polls for the outcome at its suspension points. With the
//! [`AsyncDriver`] the host side is a [`HostBridge`]; completions travel back
//! over a channel and are applied when the driver is polled.

pub mod bridge;
mod driver;
mod host_error;
mod op;
mod registry;
mod tokio_host;

pub use bridge::{
    Completion, CompletionQueue, CompletionSender, FetchRequest, HostBridge, Outcome,
};
pub use driver::AsyncDriver;
pub use host_error::{HOST_ERROR_CAPACITY, HostErrorSlot};
pub use op::{OpId, OpKind, OpState, OpStatus, OperationView};
pub use registry::{AsyncRegistry, MAX_ASYNC_OPERATIONS, RegistryConfig, RegistryError};
pub use tokio_host::{BridgeError, TIMER_COMPLETED, TokioHost};

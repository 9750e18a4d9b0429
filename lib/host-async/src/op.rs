use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;

/// Identifier of a live operation. Always `>= 1`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct OpId(i32);

impl OpId {
    /// Wraps a raw id received from a host. Returns `None` for values that
    /// can never identify an operation.
    pub fn new(raw: i32) -> Option<Self> {
        (raw >= 1).then_some(Self(raw))
    }

    pub(crate) const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Debug for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpId({})", self.0)
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum OpKind {
    Fetch = 1,
    Timer = 2,
    Custom = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum OpState {
    Pending = 0,
    Resolved = 1,
    Rejected = 2,
}

impl OpState {
    pub fn is_settled(self) -> bool {
        self != OpState::Pending
    }
}

/// A slot record. The payload and error are owned by the registry and
/// replaced wholesale on every update.
#[derive(Debug)]
pub(crate) struct AsyncOperation {
    pub(crate) id: OpId,
    pub(crate) kind: OpKind,
    pub(crate) state: OpState,
    pub(crate) payload: Vec<u8>,
    pub(crate) error: Option<String>,
}

impl AsyncOperation {
    pub(crate) fn view(&self) -> OperationView<'_> {
        OperationView {
            id: self.id,
            kind: self.kind,
            state: self.state,
            payload: &self.payload,
            error: self.error.as_deref(),
        }
    }
}

/// Borrowed view of a live operation. It cannot outlive the next mutation
/// of the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperationView<'a> {
    pub id: OpId,
    pub kind: OpKind,
    pub state: OpState,
    pub payload: &'a [u8],
    pub error: Option<&'a str>,
}

/// The `(state, payload, error)` triple reported by
/// [`AsyncRegistry::get_state`](crate::AsyncRegistry::get_state).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpStatus<'a> {
    pub state: OpState,
    pub payload: &'a [u8],
    pub error: Option<&'a str>,
}

impl OpStatus<'static> {
    /// Reported for ids the registry does not know.
    pub const UNKNOWN: Self = OpStatus {
        state: OpState::Rejected,
        payload: &[],
        error: None,
    };
}

impl<'a> From<OperationView<'a>> for OpStatus<'a> {
    fn from(view: OperationView<'a>) -> Self {
        Self {
            state: view.state,
            payload: view.payload,
            error: view.error,
        }
    }
}

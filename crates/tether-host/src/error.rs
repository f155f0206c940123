//! Bridge error types.

use tether_types::DecodeError;
use thiserror::Error;

/// Errors surfaced by bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The guest wrote something the codec cannot read (wire-format mismatch).
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A one-shot closure was invoked after it was called or dropped.
    #[error("one-shot closure already called or dropped")]
    UseAfterConsume,

    /// Only guest closures can be called through the bridge.
    #[error("{0} values are not callable")]
    NotCallable(&'static str),

    /// A repeatable closure was invoked after it was released.
    #[error("closure already released")]
    Released,

    /// A reference id that is not (or no longer) registered.
    #[error("reference {0} is not live")]
    UnknownReference(u32),

    /// A decrement without a matching acquire; one side has a lifetime bug.
    #[error("reference count underflow for id {0}")]
    RefCountUnderflow(u32),

    /// Every 32-bit id has been issued once.
    #[error("reference id space exhausted")]
    ReferenceIdsExhausted,

    /// Only reference-typed values and symbols can be registered.
    #[error("{0} values have no identity and cannot be registered")]
    NotReferenceType(&'static str),

    /// A required guest export is absent or has the wrong signature.
    #[error("guest export `{0}` is missing or has the wrong type")]
    MissingExport(String),

    /// A function-table index with no function behind it.
    #[error("function table slot {0} is empty")]
    EmptyTableSlot(u32),

    /// The guest allocator returned the null pointer.
    #[error("guest allocation of {0} bytes failed")]
    AllocationFailed(u32),

    /// A bridge operation ran before a guest was attached.
    #[error("no guest module is attached")]
    Detached,

    /// A host function import was called with a non-i32 argument.
    #[error("host function `{0}` called with malformed arguments")]
    MalformedCall(String),

    /// The configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// An import could not be defined in the linker.
    #[error("link error: {0}")]
    Link(String),

    /// The engine reported a failure (trap, validation, instantiation).
    #[error("wasm error: {0}")]
    Wasm(#[from] wasmi::Error),
}

impl BridgeError {
    /// Convert into an engine error so a failing import traps the guest call.
    pub(crate) fn into_trap(self) -> wasmi::Error {
        wasmi::Error::new(self.to_string())
    }
}

/// Bridge result type alias.
pub type BridgeResult<T> = Result<T, BridgeError>;

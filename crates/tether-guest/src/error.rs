//! Guest generator error types.

use thiserror::Error;

/// Errors that can occur while assembling a guest module.
#[derive(Debug, Error)]
pub enum GuestError {
    /// An adapter or entry-point step names a host function that was never declared.
    #[error("unknown host function: {0}")]
    UnknownHostFunction(String),

    /// A host function is called with the wrong number of argument slots.
    #[error("host function `{name}` takes {expected} argument(s), called with {got}")]
    ArityMismatch {
        name: String,
        expected: u32,
        got: u32,
    },

    /// Static data no longer fits below the heap.
    #[error("static data needs {needed} bytes, only {capacity} available")]
    StaticOverflow { needed: u32, capacity: u32 },

    /// Memory limits are inconsistent or too large.
    #[error("invalid memory limits: {0}")]
    InvalidMemory(String),

    /// The generated module failed validation.
    #[error("WASM validation failed: {0}")]
    ValidationFailed(String),
}

/// Guest generator result type alias.
pub type GuestResult<T> = Result<T, GuestError>;

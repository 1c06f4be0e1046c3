//! Debugger error types
//!
//! Every failure here is fatal for the debug session. Degraded data (unbound
//! resources, out of bounds reads) is recovered locally and never reaches
//! this enum.

use thiserror::Error;

use crate::program::{DxOp, Id, Operation};

/// Debugger error
#[derive(Debug, Error)]
pub enum DebugError {
    /// Malformed program or broken internal invariant
    #[error("Invalid program: {0}")]
    InvalidProgram(String),

    /// An SSA id was read before any write reached it
    #[error("SSA id {0} read before assignment")]
    UnassignedRead(Id),

    /// Operation that the interpreter does not model
    #[error("Unsupported operation: {0:?}")]
    UnsupportedOperation(Operation),

    /// dx.op intrinsic that the interpreter does not model
    #[error("Unsupported dx.op: {0:?}")]
    UnsupportedDxOp(DxOp),

    /// Operand type does not match what the operation expects
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Pointer or allocation misuse
    #[error("Memory error: {0}")]
    Memory(String),

    /// Lanes were diverged during an operation that requires lockstep
    #[error("Lanes diverged during {0}")]
    Diverged(&'static str),

    /// The host API wrapper could not evaluate a request
    #[error("API wrapper failure: {0}")]
    Api(String),

    /// The session hit a fatal error earlier and cannot continue
    #[error("Debug session terminated")]
    SessionTerminated,

    /// Step guard exhausted
    #[error("Step limit of {0} reached")]
    StepLimit(u64),

    /// Config file could not be read
    #[error("Config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// Config file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl DebugError {
    /// Shorthand for an invariant violation
    pub fn invalid(msg: impl Into<String>) -> Self {
        DebugError::InvalidProgram(msg.into())
    }

    /// Shorthand for a memory error
    pub fn memory(msg: impl Into<String>) -> Self {
        DebugError::Memory(msg.into())
    }

    /// Shorthand for a type mismatch
    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        DebugError::TypeMismatch(msg.into())
    }
}

/// Debugger result
pub type DebugResult<T> = Result<T, DebugError>;

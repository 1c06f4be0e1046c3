//! DXIL Shader Debugger
//!
//! An instruction-level virtual machine for typed SSA shader programs. It
//! steps one or more simulated lanes through a program and reports, per
//! step, which variables were created, updated or went out of scope:
//! - **Program**: the consumed program model and a builder (`program` module)
//! - **Analysis**: per-function liveness and control flow (`analysis` module)
//! - **Thread**: one lane's state and every opcode handler (`thread` module)
//! - **Debugger**: lockstep workgroup orchestration (`debugger` module)
//! - **Api**: the boundary to the host graphics API (`api` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use dxil_debug::{Debugger, DebuggerConfig, GlobalState, LaneInit, NullApiWrapper};
//!
//! let mut debugger = Debugger::new(
//!     program,
//!     GlobalState::new(),
//!     vec![LaneInit::default()],
//!     0,
//!     DebuggerConfig::default(),
//! )?;
//! let mut api = NullApiWrapper::default();
//! let initial = debugger.continue_debug(&mut api)?;
//! loop {
//!     let states = debugger.continue_debug(&mut api)?;
//!     if states.is_empty() {
//!         break;
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Program model: functions, blocks, typed SSA instructions
pub mod program;

/// Shader values, variables, bindings and per-step state
pub mod shader;

/// Control flow and liveness analysis
pub mod analysis;

/// Byte-addressed backing memory for allocas and globals
pub mod memory;

/// Resource view formats
pub mod format;

/// Session-wide state shared by all lanes
pub mod global_state;

/// Host API boundary
pub mod api;

/// Per-lane interpreter
pub mod thread;

/// Workgroup orchestration
pub mod debugger;

/// Session configuration
pub mod config;

/// Error types
pub mod error;

// ============================================================================
// Re-exports
// ============================================================================

pub use analysis::{build_function_infos, ControlFlow, ExecutionPoint, FunctionInfo};
pub use api::{
    DebugApiWrapper, GatherChannel, NullApiWrapper, SampleGatherRequest,
    SampleGatherResourceData, SampleGatherSamplerData,
};
pub use config::DebuggerConfig;
pub use debugger::{active_mask, Debugger};
pub use error::{DebugError, DebugResult};
pub use format::{CompType, ViewFormat};
pub use global_state::{ConstantBlock, GlobalState, ResourceInfo, SrvData, UavData};
pub use memory::{MemoryPointer, MemoryTracking};
pub use program::{Program, ProgramBuilder, ShaderStage};
pub use shader::{
    BindingSlot, ShaderBuiltin, ShaderDebugState, ShaderEvents, ShaderVariable,
    ShaderVariableChange, VarType,
};
pub use thread::{lanes_diverged, LaneInit, ThreadState};

//! Execution context handed to a lane for one step

use crate::analysis::FunctionInfo;
use crate::api::DebugApiWrapper;
use crate::config::DebuggerConfig;
use crate::error::{DebugError, DebugResult};
use crate::global_state::GlobalState;
use crate::program::Program;

use super::ThreadState;

/// The other lanes of the workgroup, as seen by the lane being stepped
///
/// The stepping lane is borrowed mutably elsewhere, so it is absent from both
/// halves.
#[derive(Clone, Copy)]
pub struct Workgroup<'a> {
    before: &'a [ThreadState],
    after: &'a [ThreadState],
}

impl<'a> Workgroup<'a> {
    pub fn new(before: &'a [ThreadState], after: &'a [ThreadState]) -> Self {
        Workgroup { before, after }
    }

    /// A workgroup with no other lanes
    pub fn alone() -> Self {
        Workgroup { before: &[], after: &[] }
    }

    /// Total lanes, the stepping one included
    pub fn lane_count(&self) -> usize {
        self.before.len() + 1 + self.after.len()
    }

    /// Another lane by index; `None` for the stepping lane itself
    pub fn lane(&self, index: usize) -> Option<&'a ThreadState> {
        let me = self.before.len();
        if index < me {
            self.before.get(index)
        } else if index == me {
            None
        } else {
            self.after.get(index - me - 1)
        }
    }

    /// Every other lane
    pub fn others(&self) -> impl Iterator<Item = &'a ThreadState> {
        self.before.iter().chain(self.after.iter())
    }
}

/// Everything a lane reads while executing one instruction
pub struct ExecContext<'a> {
    pub program: &'a Program,
    pub global: &'a GlobalState,
    pub infos: &'a [Option<FunctionInfo>],
    pub api: &'a mut dyn DebugApiWrapper,
    pub workgroup: Workgroup<'a>,
    pub config: &'a DebuggerConfig,
    /// Indexed by id: set for ids naming global variables
    pub live_globals: &'a [bool],
}

impl<'a> ExecContext<'a> {
    /// Analysis of function `index`
    pub fn function_info(&self, index: usize) -> DebugResult<&'a FunctionInfo> {
        let infos = self.infos;
        infos
            .get(index)
            .and_then(Option::as_ref)
            .ok_or_else(|| DebugError::invalid(format!("no analysis for function {}", index)))
    }
}

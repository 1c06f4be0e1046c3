//! Workgroup orchestration
//!
//! A [`Debugger`] owns every simulated lane and steps them in lockstep. One
//! lane is the reporting lane: each of its steps produces a
//! [`ShaderDebugState`]; the rest run silently so that derivatives and other
//! cross-lane operations see consistent neighbours.

use tracing::{debug, error};

use crate::analysis::{build_function_infos, FunctionInfo};
use crate::api::DebugApiWrapper;
use crate::config::DebuggerConfig;
use crate::error::{DebugError, DebugResult};
use crate::global_state::{GlobalState, GlobalVariable};
use crate::program::{Program, ShaderStage};
use crate::shader::ShaderDebugState;
use crate::thread::{constant_to_variable, lanes_diverged, ExecContext, LaneInit, ThreadState, Workgroup};

/// Lanes that may run this step
///
/// Finished lanes never run. Pixel quads that have diverged hold back lanes
/// sitting in a uniform block until the others catch up; if that would stop
/// every lane, all unfinished lanes run.
pub fn active_mask(
    stage: ShaderStage,
    lanes: &[ThreadState],
    infos: &[Option<FunctionInfo>],
) -> Vec<bool> {
    let unfinished: Vec<bool> = lanes.iter().map(|l| !l.finished()).collect();
    if stage != ShaderStage::Pixel || !lanes_diverged(lanes) {
        return unfinished;
    }

    let mask: Vec<bool> = lanes
        .iter()
        .zip(&unfinished)
        .map(|(lane, &run)| run && !lane.in_uniform_block(infos))
        .collect();
    if mask.iter().any(|&m| m) {
        return mask;
    }
    error!("no active lanes, forcing every unfinished lane to run");
    unfinished
}

/// A debug session over one workgroup
pub struct Debugger {
    program: Program,
    global: GlobalState,
    infos: Vec<Option<FunctionInfo>>,
    live_globals: Vec<bool>,
    lanes: Vec<ThreadState>,
    active_lane: usize,
    config: DebuggerConfig,
    steps: u64,
    started: bool,
    terminated: bool,
}

impl Debugger {
    /// Set up a session
    ///
    /// Analyses every defined function, allocates the program's global
    /// variables in the shared arena and creates one lane per `LaneInit`.
    /// `active_lane` is the lane whose steps are reported.
    pub fn new(
        program: Program,
        mut global: GlobalState,
        lanes: Vec<LaneInit>,
        active_lane: usize,
        config: DebuggerConfig,
    ) -> DebugResult<Self> {
        if active_lane >= lanes.len() {
            return Err(DebugError::invalid(format!(
                "active lane {} outside a workgroup of {}",
                active_lane,
                lanes.len()
            )));
        }

        let infos = build_function_infos(&program, config.log_control_flow)?;

        let mut live_globals = vec![false; program.id_count as usize];
        {
            let memory = global.memory.get_mut();
            for g in &program.globals {
                let mut var = memory.allocate_for_type(&g.ty, g.id, true, &g.name)?;
                if let Some(init) = &g.initializer {
                    let pointer = memory
                        .pointer(g.id)
                        .cloned()
                        .ok_or_else(|| DebugError::memory(format!("global {} not allocated", g.id)))?;
                    memory.update_backing_memory_from_variable(&pointer, &constant_to_variable(init))?;
                    memory.update_variable_from_backing_memory(g.id, &mut var)?;
                }
                let slot = live_globals.get_mut(g.id.index()).ok_or_else(|| {
                    DebugError::invalid(format!("global {} outside id range", g.id))
                })?;
                *slot = true;
                global.globals.push(GlobalVariable { id: g.id, var });
            }
        }

        let lanes: Vec<ThreadState> = lanes
            .into_iter()
            .enumerate()
            .map(|(i, init)| ThreadState::new(i, &program, init))
            .collect();

        debug!(
            stage = ?program.stage,
            lanes = lanes.len(),
            globals = program.globals.len(),
            "debug session created"
        );

        Ok(Debugger {
            program,
            global,
            infos,
            live_globals,
            lanes,
            active_lane,
            config,
            steps: 0,
            started: false,
            terminated: false,
        })
    }

    /// Run the workgroup forward and return the reporting lane's states
    ///
    /// The first call returns only the initial state. Later calls return up
    /// to `steps_per_continue` states; an empty list means the reporting lane
    /// has finished. Any error ends the session.
    pub fn continue_debug(
        &mut self,
        api: &mut dyn DebugApiWrapper,
    ) -> DebugResult<Vec<ShaderDebugState>> {
        if self.terminated {
            return Err(DebugError::SessionTerminated);
        }
        match self.run(api) {
            Ok(states) => Ok(states),
            Err(err) => {
                error!(error = %err, step = self.steps, "debug session terminated");
                self.terminated = true;
                Err(err)
            }
        }
    }

    fn run(&mut self, api: &mut dyn DebugApiWrapper) -> DebugResult<Vec<ShaderDebugState>> {
        let mut states = Vec::new();

        if !self.started {
            self.started = true;
            for (i, lane) in self.lanes.iter_mut().enumerate() {
                let initial = lane.enter_entry_point(
                    &self.program,
                    &self.global,
                    &self.infos,
                    &self.live_globals,
                    i == self.active_lane,
                )?;
                if let Some(mut state) = initial {
                    state.step_index = self.steps;
                    states.push(state);
                }
            }
            self.steps += 1;
            return Ok(states);
        }

        let end = self.steps + self.config.steps_per_continue as u64;
        while self.steps < end && !self.lanes[self.active_lane].finished() {
            if let Some(limit) = self.config.max_total_steps {
                if self.steps >= limit {
                    return Err(DebugError::StepLimit(limit));
                }
            }

            let mask = active_mask(self.program.stage, &self.lanes, &self.infos);
            let writes = self.global.memory.read().write_count();
            for lane in 0..self.lanes.len() {
                if !mask[lane] {
                    continue;
                }
                let record = lane == self.active_lane;
                let (before, rest) = self.lanes.split_at_mut(lane);
                let Some((thread, after)) = rest.split_first_mut() else { continue };
                let mut ctx = ExecContext {
                    program: &self.program,
                    global: &self.global,
                    infos: &self.infos,
                    api: &mut *api,
                    workgroup: Workgroup::new(before, after),
                    config: &self.config,
                    live_globals: &self.live_globals,
                };
                if let Some(mut state) = thread.step_next(&mut ctx, record)? {
                    state.step_index = self.steps;
                    states.push(state);
                    self.steps += 1;
                }
            }

            if self.global.memory.read().write_count() != writes {
                for lane in &mut self.lanes {
                    lane.refresh_globals(&self.global)?;
                }
            }

            for (lane, &active) in self.lanes.iter_mut().zip(&mask) {
                if active {
                    lane.step_over_nop_instructions(&self.program);
                }
            }
        }

        Ok(states)
    }

    /// Index of the reporting lane
    pub fn active_lane(&self) -> usize {
        self.active_lane
    }

    pub fn lanes(&self) -> &[ThreadState] {
        &self.lanes
    }

    pub fn lane(&self, index: usize) -> Option<&ThreadState> {
        self.lanes.get(index)
    }

    /// Analysis of function `index`; `None` for declarations
    pub fn function_info(&self, index: usize) -> Option<&FunctionInfo> {
        self.infos.get(index).and_then(Option::as_ref)
    }

    pub fn global_state(&self) -> &GlobalState {
        &self.global
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn config(&self) -> &DebuggerConfig {
        &self.config
    }

    /// Steps reported so far, the initial state included
    pub fn step_count(&self) -> u64 {
        self.steps
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}

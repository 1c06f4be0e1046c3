//! Screen-space derivatives across a 2x2 pixel quad
//!
//! Lanes are numbered in quad order: 0 top-left, 1 top-right, 2 bottom-left,
//! 3 bottom-right.

use crate::error::{DebugError, DebugResult};
use crate::program::Operand;
use crate::shader::numeric::{float_binary_for, FloatBinOp};
use crate::shader::{ShaderVariable, VarType};

use super::{lanes_diverged, ExecContext, ThreadState};

/// Lanes in a pixel quad
pub const QUAD_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Axis {
    X,
    Y,
}

/// `(base, neighbour)` lanes differenced for `lane`
///
/// Coarse derivatives always use the top-left lane as the base. Fine
/// derivatives use the lane's own row (for X) or column (for Y).
pub(crate) fn quad_pair(lane: usize, axis: Axis, fine: bool) -> (usize, usize) {
    match (axis, fine) {
        (Axis::X, false) => (0, 1),
        (Axis::Y, false) => (0, 2),
        (Axis::X, true) => {
            let base = lane & !1;
            (base, base + 1)
        }
        (Axis::Y, true) => {
            let base = lane & 1;
            (base, base + 2)
        }
    }
}

impl ThreadState {
    /// Whether this lane and its workgroup sit at the same point
    pub(crate) fn workgroup_diverged(&self, ctx: &ExecContext<'_>) -> bool {
        lanes_diverged(std::iter::once(self).chain(ctx.workgroup.others()))
    }

    fn quad_lane_value(
        &self,
        ctx: &ExecContext<'_>,
        lane: usize,
        value: &Operand,
    ) -> DebugResult<ShaderVariable> {
        if lane == self.lane {
            return self.operand(value, true);
        }
        let other = ctx
            .workgroup
            .lane(lane)
            .ok_or_else(|| DebugError::invalid(format!("quad lane {} is missing", lane)))?;
        other.operand(value, true)
    }

    /// Derivative of `value` along `axis`
    ///
    /// Needs a full quad in lockstep.
    pub(crate) fn quad_derivative(
        &self,
        ctx: &ExecContext<'_>,
        value: &Operand,
        axis: Axis,
        fine: bool,
    ) -> DebugResult<ShaderVariable> {
        if ctx.workgroup.lane_count() != QUAD_SIZE {
            return Err(DebugError::invalid(format!(
                "derivatives need a {} lane quad, the workgroup has {}",
                QUAD_SIZE,
                ctx.workgroup.lane_count()
            )));
        }
        if self.workgroup_diverged(ctx) {
            return Err(DebugError::Diverged("derivative"));
        }

        let (base, neighbour) = quad_pair(self.lane, axis, fine);
        let a = self.quad_lane_value(ctx, base, value)?;
        let b = self.quad_lane_value(ctx, neighbour, value)?;

        let mut result = a.clone();
        for c in 0..a.component_count() {
            let diff = float_binary_for(a.ty, FloatBinOp::Sub, b.value.get(c), a.value.get(c))
                .ok_or_else(|| {
                    DebugError::type_mismatch(format!("derivative of {:?} value", a.ty))
                })?;
            result.value.set(c, diff);
        }
        Ok(result)
    }

    /// Coarse derivatives of each coordinate, as float4 values
    ///
    /// Constant coordinates have a zero derivative.
    pub(crate) fn coordinate_derivatives(
        &self,
        ctx: &ExecContext<'_>,
        coords: &[Operand],
    ) -> DebugResult<(ShaderVariable, ShaderVariable)> {
        let mut ddx = ShaderVariable::new("ddx", VarType::Float, 1, 4);
        let mut ddy = ShaderVariable::new("ddy", VarType::Float, 1, 4);
        for (c, coord) in coords.iter().enumerate().take(4) {
            if coord.id().is_none() {
                continue;
            }
            let dx = self.quad_derivative(ctx, coord, Axis::X, false)?;
            let dy = self.quad_derivative(ctx, coord, Axis::Y, false)?;
            ddx.value.set_f32(c, dx.float_comp(0) as f32);
            ddy.value.set_f32(c, dy.float_comp(0) as f32);
        }
        Ok((ddx, ddy))
    }
}

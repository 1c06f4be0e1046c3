//! Per-step debug state reported to the caller

use serde::{Deserialize, Serialize};

use super::variable::ShaderVariable;

/// Event flags raised by a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ShaderEvents(u32);

impl ShaderEvents {
    pub const NONE: ShaderEvents = ShaderEvents(0);
    /// A float result was NaN or infinite
    pub const GENERATED_NAN_OR_INF: ShaderEvents = ShaderEvents(1 << 0);
    /// The step was serviced by a GPU sample, load or gather
    pub const SAMPLE_LOAD_GATHER: ShaderEvents = ShaderEvents(1 << 1);

    pub fn contains(self, other: ShaderEvents) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for ShaderEvents {
    type Output = ShaderEvents;
    fn bitor(self, rhs: ShaderEvents) -> ShaderEvents {
        ShaderEvents(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for ShaderEvents {
    fn bitor_assign(&mut self, rhs: ShaderEvents) {
        self.0 |= rhs.0;
    }
}

/// One recorded change
///
/// `before` only: the variable went out of scope. `after` only: it came into
/// existence. Both: it was updated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ShaderVariableChange {
    pub before: Option<ShaderVariable>,
    pub after: Option<ShaderVariable>,
}

impl ShaderVariableChange {
    pub fn created(after: ShaderVariable) -> Self {
        ShaderVariableChange { before: None, after: Some(after) }
    }

    pub fn removed(before: ShaderVariable) -> Self {
        ShaderVariableChange { before: Some(before), after: None }
    }

    pub fn updated(before: ShaderVariable, after: ShaderVariable) -> Self {
        ShaderVariableChange { before: Some(before), after: Some(after) }
    }

    /// Name of whichever side is present
    pub fn name(&self) -> &str {
        self.after
            .as_ref()
            .or(self.before.as_ref())
            .map(|v| v.name.as_str())
            .unwrap_or("")
    }
}

/// State produced by one step of the reporting lane
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ShaderDebugState {
    /// Step counter, starting at 0 for the initial state
    pub step_index: u64,
    /// Global instruction index the lane will execute next
    pub next_instruction: u32,
    pub flags: ShaderEvents,
    pub changes: Vec<ShaderVariableChange>,
}

impl ShaderDebugState {
    /// Change recorded for a variable name, if any
    pub fn change(&self, name: &str) -> Option<&ShaderVariableChange> {
        self.changes.iter().find(|c| c.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_flags() {
        let mut flags = ShaderEvents::NONE;
        assert!(flags.is_empty());
        flags |= ShaderEvents::SAMPLE_LOAD_GATHER;
        assert!(flags.contains(ShaderEvents::SAMPLE_LOAD_GATHER));
        assert!(!flags.contains(ShaderEvents::GENERATED_NAN_OR_INF));
        let both = flags | ShaderEvents::GENERATED_NAN_OR_INF;
        assert_eq!(both.bits(), 3);
    }

    #[test]
    fn test_change_name_falls_back_to_before() {
        let change = ShaderVariableChange::removed(ShaderVariable::new("x", Default::default(), 1, 1));
        assert_eq!(change.name(), "x");
    }
}

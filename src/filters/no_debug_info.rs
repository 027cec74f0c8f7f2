use super::{FunctionFilter, InstructionFilter, MutationFilter};
use crate::ir::{Function, Instruction};
use crate::mutation::MutationPoint;

/// Skips anything that has no source location to report
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDebugInfoFilter;

impl MutationFilter for NoDebugInfoFilter {
    fn name(&self) -> &str {
        "no debug info"
    }

    fn should_skip(&self, point: &MutationPoint) -> bool {
        point.location.is_none()
    }
}

impl FunctionFilter for NoDebugInfoFilter {
    fn name(&self) -> &str {
        "no debug info"
    }

    fn should_skip(&self, function: &Function) -> bool {
        function.location.is_none()
    }
}

impl InstructionFilter for NoDebugInfoFilter {
    fn name(&self) -> &str {
        "no debug info"
    }

    fn should_skip(&self, instruction: &Instruction) -> bool {
        instruction.location.is_none()
    }
}

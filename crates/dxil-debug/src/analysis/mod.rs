//! Static analysis run once per function before execution

mod cfg;
mod function_info;

pub use cfg::ControlFlow;
pub use function_info::{build_function_infos, ExecutionPoint, FunctionInfo};

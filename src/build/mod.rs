mod clean;
mod core;
mod discovery;
mod mode;
mod process;
mod report;
mod scheduler;
mod unit;

pub use clean::clean;
pub use self::core::{BuildOptions, BuildSummary, build_project};
pub use discovery::{ExtensionFilter, discover_sources};
pub use mode::OutputMode;
pub use process::{
    CompileTask, CompilerCommand, DEFAULT_TASK_TIMEOUT, ProcessRunner, TaskRunner, execute,
    format_duration,
};
pub use report::{BuildReport, TaskFailure, TaskOutcome, TaskStatus};
pub use scheduler::{DEFAULT_BUILD_TIMEOUT, Scheduler};
pub use unit::{Plan, SourceUnit, plan_units};

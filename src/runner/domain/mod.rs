//! Domain model for worker assignments and execution outcomes.

mod assignment;
mod outcome;
mod script;

pub use assignment::{
    Assignment, AssignmentError, CODE_DIR, SCAN_RESULT_FILE, StepRequest, StepScript,
};
pub use outcome::{StepExit, StepExitStatus, TaskExit, TaskOutcome};
pub use script::shell_escape;

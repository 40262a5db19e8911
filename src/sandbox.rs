mod engine;
mod fallback;
mod report;
mod syntax;
mod tree;

// Re-export the engine and common types
pub use engine::{DockerEngine, ExecError, ImageTier, RawExecutionResult};
pub use fallback::run_with_fallback;
pub use report::{interpret, parse_test_cases};
pub use tree::{BuildTree, default_work_dir};

use serde::{Deserialize, Serialize};

/// Which fallback tier produced a result
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    PrimarySandbox,
    SecondarySandbox,
    SyntaxOnly,
    Unavailable,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::PrimarySandbox => "PRIMARY_SANDBOX",
            Strategy::SecondarySandbox => "SECONDARY_SANDBOX",
            Strategy::SyntaxOnly => "SYNTAX_ONLY",
            Strategy::Unavailable => "UNAVAILABLE",
        }
    }
}

/// Outcome of a single reference test case, in output order
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TestCaseOutcome {
    pub description: String,
    pub passed: bool,
}

/// Structured verdict handed back to the caller
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TestRunResult {
    /// Whether the verification pipeline itself completed, as opposed to
    /// whether the user's contract passed
    pub success: bool,
    /// Whether at least one reference test case ran and none failed
    pub passed: bool,
    pub strategy: Strategy,
    /// Full captured tool output, for display
    pub raw_output: String,
    pub test_cases: Vec<TestCaseOutcome>,
}

impl TestRunResult {
    /// Terminal result for hosts with no container runtime at all
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            success: false,
            passed: false,
            strategy: Strategy::Unavailable,
            raw_output: message.into(),
            test_cases: Vec::new(),
        }
    }
}

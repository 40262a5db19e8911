//! Ordered degradation across verification tiers.
//!
//! Advancement happens only on infrastructure failure or timeout. A clean
//! run, even one where every assertion failed, is final: test failure is
//! the expected majority outcome, not an error.

use std::path::Path;

use crate::config::SandboxConfig;
use crate::lessons::LessonMapping;
use crate::normalize::NormalizedSubmission;

use super::engine::{DockerEngine, ExecError, ImageTier, RawExecutionResult};
use super::report::interpret;
use super::syntax::syntax_only_verdict;
use super::{BuildTree, Strategy, TestRunResult};

const UNAVAILABLE_MESSAGE: &str =
    "no container runtime is available on this host; submissions cannot be verified";

/// Tries each tier in order, giving every attempt its own fresh build
/// tree. With no engine at all the chain short-circuits straight to the
/// UNAVAILABLE verdict without touching the filesystem.
pub async fn run_with_fallback(
    engine: Option<&DockerEngine>,
    normalized: &NormalizedSubmission,
    mapping: &LessonMapping,
    sandbox_config: &SandboxConfig,
    work_dir: &Path,
) -> TestRunResult {
    let Some(engine) = engine else {
        return TestRunResult::unavailable(UNAVAILABLE_MESSAGE);
    };

    let mut diagnostics: Vec<String> = Vec::new();

    for (tier, strategy) in [
        (ImageTier::Fast, Strategy::PrimarySandbox),
        (ImageTier::Slow, Strategy::SecondarySandbox),
    ] {
        let outcome = attempt_tier(engine, normalized, mapping, work_dir, tier).await;
        if let Some(result) = settle_attempt(outcome, strategy, &mut diagnostics) {
            return result;
        }
    }

    syntax_only_verdict(normalized, mapping, sandbox_config, work_dir, &diagnostics).await
}

/// One tier attempt against its own tree; the tree is dropped (and its
/// directory removed) before control returns to the chain, whatever the
/// outcome.
async fn attempt_tier(
    engine: &DockerEngine,
    normalized: &NormalizedSubmission,
    mapping: &LessonMapping,
    work_dir: &Path,
    tier: ImageTier,
) -> Result<RawExecutionResult, ExecError> {
    let tree = BuildTree::provision(normalized, mapping, work_dir)
        .map_err(ExecError::Infrastructure)?;
    engine.execute(&tree, tier).await
}

/// A clean run is final regardless of its exit code; only timeouts and
/// infrastructure failures advance the chain, leaving a diagnostic note
/// for the degraded verdict.
fn settle_attempt(
    outcome: Result<RawExecutionResult, ExecError>,
    strategy: Strategy,
    diagnostics: &mut Vec<String>,
) -> Option<TestRunResult> {
    match outcome {
        Ok(raw) => {
            log::debug!(
                "{} completed with exit code {}",
                strategy.as_str(),
                raw.exit_code
            );
            Some(interpret(raw.output, strategy))
        }
        Err(ExecError::Timeout {
            limit_secs,
            partial_output,
        }) => {
            log::warn!("{} timed out after {limit_secs}s", strategy.as_str());
            let mut note = format!("{} timed out after {limit_secs}s", strategy.as_str());
            if !partial_output.is_empty() {
                note.push_str("; partial output follows\n");
                note.push_str(&partial_output);
            }
            diagnostics.push(note);
            None
        }
        Err(ExecError::Infrastructure(e)) => {
            log::warn!("{} unavailable: {e:#}", strategy.as_str());
            diagnostics.push(format!("{} unavailable: {e:#}", strategy.as_str()));
            None
        }
    }
}

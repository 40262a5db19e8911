//! Last-resort structural validation when no sandbox tier is usable.
//!
//! This tier never executes reference tests. Its verdict is structural
//! validity only, labeled non-authoritative through the strategy field
//! and a banner line in the raw output.

use std::path::Path;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::SandboxConfig;
use crate::lessons::LessonMapping;
use crate::normalize::{self, NormalizedSubmission};

use super::{BuildTree, Strategy, TestCaseOutcome, TestRunResult};

const SOLC_TIMEOUT: Duration = Duration::from_secs(15);

const DEGRADED_BANNER: &str =
    "degraded verification: reference tests were not executed; structural checks only";

/// Static checks over the rewritten source, plus a best-effort bounded
/// compile with a host solc binary when one is configured.
pub(super) async fn syntax_only_verdict(
    normalized: &NormalizedSubmission,
    mapping: &LessonMapping,
    config: &SandboxConfig,
    work_dir: &Path,
    diagnostics: &[String],
) -> TestRunResult {
    let mut checks: Vec<TestCaseOutcome> = Vec::new();
    let mut lines: Vec<String> = Vec::new();

    lines.push(DEGRADED_BANNER.to_string());
    for note in diagnostics {
        lines.push(format!("note: {note}"));
    }

    let code = &normalized.rewritten_code;
    push_check(&mut checks, &mut lines, "pragma directive present", has_pragma(code));
    push_check(
        &mut checks,
        &mut lines,
        "contract declaration present",
        normalize::find_contract_name(code).is_some(),
    );
    push_check(
        &mut checks,
        &mut lines,
        "balanced braces and parentheses",
        braces_balanced(code),
    );

    if let Some(solc) = &config.solc_path {
        if solc.exists() {
            match host_compile_check(solc, normalized, mapping, work_dir).await {
                Ok((compiled, compiler_output)) => {
                    push_check(&mut checks, &mut lines, "compiles with host solc", compiled);
                    if !compiler_output.trim().is_empty() {
                        lines.push(compiler_output.trim_end().to_string());
                    }
                }
                Err(e) => lines.push(format!("host solc check skipped: {e:#}")),
            }
        } else {
            lines.push(format!(
                "configured solc binary {} not found",
                solc.display()
            ));
        }
    }

    let passed = !checks.is_empty() && checks.iter().all(|c| c.passed);

    TestRunResult {
        success: true,
        passed,
        strategy: Strategy::SyntaxOnly,
        raw_output: lines.join("\n"),
        test_cases: checks,
    }
}

fn push_check(
    checks: &mut Vec<TestCaseOutcome>,
    lines: &mut Vec<String>,
    description: &str,
    passed: bool,
) {
    lines.push(format!(
        "[{}] {description}",
        if passed { "PASS" } else { "FAIL" }
    ));
    checks.push(TestCaseOutcome {
        description: description.to_string(),
        passed,
    });
}

fn has_pragma(code: &str) -> bool {
    code.lines()
        .any(|line| line.trim_start().starts_with("pragma solidity"))
}

/// Balance check over code regions only; braces inside comments and
/// string literals do not count.
fn braces_balanced(code: &str) -> bool {
    let mask = normalize::code_mask(code);
    let mut braces = 0i64;
    let mut parens = 0i64;

    for (i, b) in code.bytes().enumerate() {
        if !mask[i] {
            continue;
        }
        match b {
            b'{' => braces += 1,
            b'}' => braces -= 1,
            b'(' => parens += 1,
            b')' => parens -= 1,
            _ => {}
        }
        if braces < 0 || parens < 0 {
            return false;
        }
    }

    braces == 0 && parens == 0
}

/// Compiles the rewritten source alone (no tests, no isolation) inside a
/// throwaway tree so cleanup stays uniform with the sandboxed tiers.
async fn host_compile_check(
    solc: &Path,
    normalized: &NormalizedSubmission,
    mapping: &LessonMapping,
    work_dir: &Path,
) -> Result<(bool, String)> {
    let tree = BuildTree::provision(normalized, mapping, work_dir)?;
    let source = tree.source_file(mapping);

    let run = Command::new(solc).arg(&source).output();
    let output = timeout(SOLC_TIMEOUT, run)
        .await
        .map_err(|_| anyhow!("host solc timed out after {}s", SOLC_TIMEOUT.as_secs()))??;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    Ok((output.status.success(), text))
}

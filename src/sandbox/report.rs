//! Turns raw test-runner output into the structured verdict.

use super::{Strategy, TestCaseOutcome, TestRunResult};

/// Converts captured runner output into the caller-facing result.
///
/// `passed` requires at least one recognized case with none failing;
/// output containing no recognized markers is never a pass. `success` is
/// true here by construction: reaching interpretation means the pipeline
/// produced output cleanly, even if every assertion failed.
pub fn interpret(raw_output: String, strategy: Strategy) -> TestRunResult {
    let test_cases = parse_test_cases(&raw_output);
    let passed = !test_cases.is_empty() && test_cases.iter().all(|c| c.passed);

    TestRunResult {
        success: true,
        passed,
        strategy,
        raw_output,
        test_cases,
    }
}

/// Extracts per-case outcomes in output order, which mirrors the
/// declaration order of the reference test.
pub fn parse_test_cases(raw_output: &str) -> Vec<TestCaseOutcome> {
    raw_output.lines().filter_map(parse_case_line).collect()
}

/// Recognizes `[PASS]`, `[FAIL]` and `[SKIP]` markers, including the
/// annotated forms (`[FAIL: assertion failed]`). A skipped case carries
/// no evidence of success and counts as not passed.
fn parse_case_line(line: &str) -> Option<TestCaseOutcome> {
    let trimmed = line.trim();

    let passed = if trimmed.starts_with("[PASS") {
        true
    } else if trimmed.starts_with("[FAIL") || trimmed.starts_with("[SKIP") {
        false
    } else {
        return None;
    };

    let rest = &trimmed[trimmed.find(']')? + 1..];
    let description = strip_gas_suffix(rest.trim());
    if description.is_empty() {
        return None;
    }

    Some(TestCaseOutcome {
        description: description.to_string(),
        passed,
    })
}

fn strip_gas_suffix(description: &str) -> &str {
    match description.rfind(" (gas:") {
        Some(idx) => description[..idx].trim_end(),
        None => description,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_mixed_forge_output() {
        let raw = "[PASS] testGreeting() (gas: 123)\n[FAIL] testLength() (gas: 45)";
        let result = interpret(raw.to_string(), Strategy::PrimarySandbox);

        assert_eq!(
            result.test_cases,
            vec![
                TestCaseOutcome {
                    description: "testGreeting()".to_string(),
                    passed: true,
                },
                TestCaseOutcome {
                    description: "testLength()".to_string(),
                    passed: false,
                },
            ]
        );
        assert!(result.success);
        assert!(!result.passed);
    }

    #[test]
    fn all_passing_cases_pass_overall() {
        let raw = "Ran 2 tests for test/HelloWorld.t.sol:HelloWorldTest\n\
                   [PASS] testGreeting() (gas: 9876)\n\
                   [PASS] testLength() (gas: 5432)\n\
                   Suite result: ok. 2 passed; 0 failed; 0 skipped";
        let result = interpret(raw.to_string(), Strategy::PrimarySandbox);

        assert_eq!(result.test_cases.len(), 2);
        assert!(result.passed);
        assert!(result.success);
    }

    #[test]
    fn zero_recognized_cases_is_never_a_pass() {
        let raw = "Compiling 3 files with Solc 0.8.20\nCompiler run successful!";
        let result = interpret(raw.to_string(), Strategy::PrimarySandbox);

        assert!(result.test_cases.is_empty());
        assert!(!result.passed);
        assert!(result.success);
    }

    #[test]
    fn annotated_fail_marker_is_recognized() {
        let cases = parse_test_cases("[FAIL: assertion failed] testGreeting() (gas: 31337)");
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].description, "testGreeting()");
        assert!(!cases[0].passed);
    }

    #[test]
    fn skipped_case_counts_as_not_passed() {
        let raw = "[PASS] testA() (gas: 1)\n[SKIP] testB()";
        let result = interpret(raw.to_string(), Strategy::PrimarySandbox);

        assert_eq!(result.test_cases.len(), 2);
        assert!(!result.passed);
    }

    #[test]
    fn output_order_is_preserved() {
        let raw = "[PASS] c()\n[PASS] a()\n[PASS] b()";
        let cases = parse_test_cases(raw);
        let descriptions: Vec<&str> = cases.iter().map(|c| c.description.as_str()).collect();
        assert_eq!(descriptions, vec!["c()", "a()", "b()"]);
    }

    #[test]
    fn gas_suffix_is_stripped() {
        assert_eq!(strip_gas_suffix("testFoo() (gas: 12345)"), "testFoo()");
        assert_eq!(strip_gas_suffix("testFoo()"), "testFoo()");
    }

    #[test]
    fn unrelated_bracketed_lines_are_ignored() {
        let cases = parse_test_cases("[WARN] something\n[PASS]\n  [PASS] testOk() (gas: 7)");
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].description, "testOk()");
    }
}

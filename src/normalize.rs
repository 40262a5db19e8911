//! Rewrites untrusted submissions into the shape the reference tests expect.
//!
//! All transforms here are pure functions over in-memory strings; nothing
//! touches the filesystem. The same `(source, mapping)` pair always yields
//! the same `NormalizedSubmission`.

use thiserror::Error;

use crate::lessons::LessonMapping;

/// Compiler version every submission is pinned to before compilation
pub const FORCED_PRAGMA: &str = "pragma solidity ^0.8.20;";

/// Virtual import prefix that the build config remaps onto `src/`
pub const USER_CONTRACT_REMAP: &str = "user_contract";

#[derive(Debug, Error)]
#[error("no contract declaration found in submission")]
pub struct NoContractDeclarationError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSubmission {
    /// User source with the pragma forced and the contract renamed
    pub rewritten_code: String,
    /// Reference test with its import pointed at the remapped user file
    pub rewritten_test_code: String,
}

pub fn normalize(
    source_code: &str,
    mapping: &LessonMapping,
) -> Result<NormalizedSubmission, NoContractDeclarationError> {
    let source = normalize_line_endings(source_code);
    let source = force_pragma(&source);

    let declared = find_contract_name(&source).ok_or(NoContractDeclarationError)?;
    let rewritten_code = rename_contract(&source, &declared, &mapping.contract_name);

    let test_source = normalize_line_endings(&mapping.reference_test_source);
    let rewritten_test_code = rewrite_test_imports(&test_source, &mapping.contract_name);

    Ok(NormalizedSubmission {
        rewritten_code,
        rewritten_test_code,
    })
}

/// Reference tests may be checked out with either convention
fn normalize_line_endings(src: &str) -> String {
    src.replace("\r\n", "\n")
}

/// Replaces the first pragma line with [`FORCED_PRAGMA`]; submissions
/// without a pragma get it prepended instead.
fn force_pragma(src: &str) -> String {
    let mut replaced = false;
    let mut out: Vec<&str> = Vec::with_capacity(src.lines().count());

    for line in src.lines() {
        let trimmed = line.trim();
        if !replaced && trimmed.starts_with("pragma solidity") && trimmed.ends_with(';') {
            out.push(FORCED_PRAGMA);
            replaced = true;
        } else {
            out.push(line);
        }
    }

    if !replaced {
        return format!("{FORCED_PRAGMA}\n{src}");
    }

    let mut result = out.join("\n");
    if src.ends_with('\n') {
        result.push('\n');
    }
    result
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Byte mask over `src`: `true` where the byte belongs to code, `false`
/// inside comments and string literals. Keyword scanning and renaming run
/// against this mask so `contract Foo` inside a comment or string is never
/// touched.
pub(crate) fn code_mask(src: &str) -> Vec<bool> {
    #[derive(PartialEq)]
    enum State {
        Code,
        LineComment,
        BlockComment,
        DoubleQuoted,
        SingleQuoted,
    }

    let bytes = src.as_bytes();
    let mut mask = vec![true; bytes.len()];
    let mut state = State::Code;
    let mut i = 0;

    while i < bytes.len() {
        match state {
            State::Code => {
                if bytes[i] == b'/' && i + 1 < bytes.len() && bytes[i + 1] == b'/' {
                    state = State::LineComment;
                    mask[i] = false;
                } else if bytes[i] == b'/' && i + 1 < bytes.len() && bytes[i + 1] == b'*' {
                    state = State::BlockComment;
                    mask[i] = false;
                } else if bytes[i] == b'"' {
                    state = State::DoubleQuoted;
                    mask[i] = false;
                } else if bytes[i] == b'\'' {
                    state = State::SingleQuoted;
                    mask[i] = false;
                }
            }
            State::LineComment => {
                mask[i] = false;
                if bytes[i] == b'\n' {
                    state = State::Code;
                }
            }
            State::BlockComment => {
                mask[i] = false;
                if bytes[i] == b'*' && i + 1 < bytes.len() && bytes[i + 1] == b'/' {
                    mask[i + 1] = false;
                    i += 1;
                    state = State::Code;
                }
            }
            State::DoubleQuoted | State::SingleQuoted => {
                let quote = if state == State::DoubleQuoted {
                    b'"'
                } else {
                    b'\''
                };
                mask[i] = false;
                if bytes[i] == b'\\' && i + 1 < bytes.len() {
                    mask[i + 1] = false;
                    i += 1;
                } else if bytes[i] == quote {
                    state = State::Code;
                }
            }
        }
        i += 1;
    }

    mask
}

/// First contract name declared in code (comments and strings excluded)
pub(crate) fn find_contract_name(src: &str) -> Option<String> {
    let mask = code_mask(src);
    let bytes = src.as_bytes();
    let keyword = "contract";
    let mut search = 0;

    while let Some(found) = src[search..].find(keyword) {
        let pos = search + found;
        search = pos + keyword.len();

        if !mask[pos] {
            continue;
        }
        if pos > 0 && is_ident_byte(bytes[pos - 1]) {
            continue;
        }
        let mut j = pos + keyword.len();
        if j < bytes.len() && is_ident_byte(bytes[j]) {
            continue;
        }
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        let start = j;
        while j < bytes.len() && is_ident_byte(bytes[j]) {
            j += 1;
        }
        if j > start {
            return Some(src[start..j].to_string());
        }
    }

    None
}

/// Replaces every `contract <from>` declaration pair with `contract <to>`,
/// word-boundary anchored and restricted to code regions.
fn rename_contract(src: &str, from: &str, to: &str) -> String {
    if from == to {
        return src.to_string();
    }

    let mask = code_mask(src);
    let bytes = src.as_bytes();
    let keyword = "contract";
    let mut out = String::with_capacity(src.len());
    let mut i = 0;

    while i < src.len() {
        let is_keyword = mask[i]
            && src[i..].starts_with(keyword)
            && (i == 0 || !is_ident_byte(bytes[i - 1]))
            && (i + keyword.len() >= bytes.len() || !is_ident_byte(bytes[i + keyword.len()]));

        if is_keyword {
            let mut j = i + keyword.len();
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            let start = j;
            while j < bytes.len() && is_ident_byte(bytes[j]) {
                j += 1;
            }
            if start > i + keyword.len() && &src[start..j] == from {
                out.push_str(keyword);
                out.push_str(&src[i + keyword.len()..start]);
                out.push_str(to);
                i = j;
                continue;
            }
        }

        let ch = src[i..].chars().next().unwrap_or('\u{fffd}');
        out.push(ch);
        i += ch.len_utf8();
    }

    out
}

/// Points the reference test's import at the remapped user source.
///
/// Any import whose quoted path ends in `<ContractName>.sol` becomes an
/// import of `user_contract/<ContractName>.sol`; the build config maps
/// that prefix back onto `src/`.
fn rewrite_test_imports(test_src: &str, contract_name: &str) -> String {
    let target = format!("{contract_name}.sol");
    let replacement = format!("{USER_CONTRACT_REMAP}/{target}");

    let mut out: Vec<String> = Vec::with_capacity(test_src.lines().count());
    for line in test_src.lines() {
        if line.trim_start().starts_with("import") {
            if let Some(rewritten) = rewrite_import_path(line, &target, &replacement) {
                out.push(rewritten);
                continue;
            }
        }
        out.push(line.to_string());
    }

    let mut result = out.join("\n");
    if test_src.ends_with('\n') {
        result.push('\n');
    }
    result
}

fn rewrite_import_path(line: &str, target: &str, replacement: &str) -> Option<String> {
    let open = line.find('"')?;
    let close = line[open + 1..].find('"')? + open + 1;
    let path = &line[open + 1..close];

    if path != target && !path.ends_with(&format!("/{target}")) {
        return None;
    }

    Some(format!(
        "{}{}{}",
        &line[..=open],
        replacement,
        &line[close..]
    ))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use std::path::PathBuf;

    fn mapping_with_test(contract_name: &str, test_source: &str) -> LessonMapping {
        LessonMapping {
            reference_dir: PathBuf::from("data/lessons/hello_world"),
            reference_test_file: format!("{contract_name}.t.sol"),
            contract_name: contract_name.to_string(),
            reference_test_source: test_source.to_string(),
        }
    }

    #[test]
    fn pragma_is_forced() {
        let out = force_pragma("pragma solidity 0.7.6;\ncontract A {}\n");
        assert_eq!(out, "pragma solidity ^0.8.20;\ncontract A {}\n");
    }

    #[test]
    fn pragma_forcing_is_idempotent() {
        let once = force_pragma("pragma solidity >=0.6.0 <0.9.0;\ncontract A {}");
        let twice = force_pragma(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn missing_pragma_is_prepended() {
        let out = force_pragma("contract A {}");
        assert!(out.starts_with(FORCED_PRAGMA));
        assert!(out.contains("contract A {}"));
    }

    #[test]
    fn finds_declared_contract_name() {
        let src = "pragma solidity ^0.8.20;\ncontract Counter is Base {\n}\n";
        assert_eq!(find_contract_name(src).as_deref(), Some("Counter"));
    }

    #[test]
    fn contract_keyword_in_comments_is_ignored() {
        let src = "// contract Fake\n/* contract AlsoFake */\ncontract Real {}\n";
        assert_eq!(find_contract_name(src).as_deref(), Some("Real"));
    }

    #[test]
    fn contract_keyword_in_strings_is_ignored() {
        let src = "contract Real {\n    string n = \"contract Impostor\";\n}\n";
        let renamed = rename_contract(src, "Real", "Expected");
        assert!(renamed.contains("contract Expected"));
        assert!(renamed.contains("\"contract Impostor\""));
    }

    #[test]
    fn rename_respects_word_boundaries() {
        let src = "contract Foo {}\ncontract FooBar {}\n";
        let renamed = rename_contract(src, "Foo", "HelloWorld");
        assert!(renamed.contains("contract HelloWorld {}"));
        assert!(renamed.contains("contract FooBar {}"));
    }

    #[test]
    fn declared_contract_is_renamed_to_expected_name() {
        let mapping = mapping_with_test("HelloWorld", "import \"../src/HelloWorld.sol\";\n");
        let source = "contract Foo { string public greeting = \"hi\"; }";
        let normalized = normalize(source, &mapping).unwrap();
        assert!(normalized.rewritten_code.contains("contract HelloWorld"));
        assert!(!normalized.rewritten_code.contains("contract Foo"));
    }

    #[test]
    fn source_without_contract_is_rejected() {
        let mapping = mapping_with_test("HelloWorld", "");
        let err = normalize("library Math {}\n", &mapping);
        assert!(err.is_err());
    }

    #[test]
    fn normalization_is_deterministic() {
        let mapping = mapping_with_test("HelloWorld", "import \"../src/HelloWorld.sol\";\n");
        let source = "pragma solidity 0.8.0;\r\ncontract Foo {}\r\n";
        let first = normalize(source, &mapping).unwrap();
        let second = normalize(source, &mapping).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn plain_import_is_rewritten() {
        let out = rewrite_test_imports(
            "import \"../src/HelloWorld.sol\";\n",
            "HelloWorld",
        );
        assert_eq!(out, "import \"user_contract/HelloWorld.sol\";\n");
    }

    #[test]
    fn named_import_is_rewritten() {
        let out = rewrite_test_imports(
            "import {HelloWorld} from \"../src/HelloWorld.sol\";\n",
            "HelloWorld",
        );
        assert_eq!(
            out,
            "import {HelloWorld} from \"user_contract/HelloWorld.sol\";\n"
        );
    }

    #[test]
    fn unrelated_imports_are_untouched() {
        let src = "import \"forge-std/Test.sol\";\nimport \"../src/HelloWorld.sol\";\n";
        let out = rewrite_test_imports(src, "HelloWorld");
        assert!(out.contains("import \"forge-std/Test.sol\";"));
        assert!(out.contains("import \"user_contract/HelloWorld.sol\";"));
    }

    #[test]
    fn crlf_sources_normalize_cleanly() {
        let mapping = mapping_with_test("HelloWorld", "import \"../src/HelloWorld.sol\";\r\n");
        let normalized = normalize("pragma solidity 0.8.0;\r\ncontract Foo {}\r\n", &mapping).unwrap();
        assert!(!normalized.rewritten_code.contains('\r'));
        assert!(!normalized.rewritten_test_code.contains('\r'));
    }
}

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result, anyhow};
use chrono::Local;

use crate::lessons::LessonMapping;
use crate::normalize::NormalizedSubmission;

/// Distinguishes trees provisioned within the same second
static TREE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Build configuration written into every tree; `user_contract/` is the
/// virtual prefix the rewritten reference test imports from.
const FOUNDRY_CONFIG: &str = r#"[profile.default]
src = "src"
out = "out"
libs = ["lib"]
remappings = [
    "user_contract/=src/",
    "forge-std/=lib/forge-std/src/",
]
"#;

/// Trimmed assertion helper bundled as `lib/forge-std` so sandbox runs
/// never fetch packages over the network.
const FORGE_STD_STUB: &str = r#"// Trimmed forge-std surface: assertion support for the bundled
// reference tests only.
pragma solidity ^0.8.20;

abstract contract Test {
    function assertTrue(bool condition) internal pure {
        require(condition, "assertTrue failed");
    }

    function assertTrue(bool condition, string memory err) internal pure {
        require(condition, err);
    }

    function assertFalse(bool condition) internal pure {
        require(!condition, "assertFalse failed");
    }

    function assertEq(uint256 a, uint256 b) internal pure {
        require(a == b, "assertEq(uint256) failed");
    }

    function assertEq(int256 a, int256 b) internal pure {
        require(a == b, "assertEq(int256) failed");
    }

    function assertEq(address a, address b) internal pure {
        require(a == b, "assertEq(address) failed");
    }

    function assertEq(bool a, bool b) internal pure {
        require(a == b, "assertEq(bool) failed");
    }

    function assertEq(string memory a, string memory b) internal pure {
        require(
            keccak256(bytes(a)) == keccak256(bytes(b)),
            "assertEq(string) failed"
        );
    }

    function assertGt(uint256 a, uint256 b) internal pure {
        require(a > b, "assertGt failed");
    }

    function assertGe(uint256 a, uint256 b) internal pure {
        require(a >= b, "assertGe failed");
    }

    function assertLt(uint256 a, uint256 b) internal pure {
        require(a < b, "assertLt failed");
    }
}
"#;

/// A disposable project skeleton owned by exactly one execution attempt
///
/// Dropping the tree removes it recursively; the removal runs on every
/// exit path and its failure is logged without disturbing the result
/// being returned.
pub struct BuildTree {
    root: PathBuf,
}

impl BuildTree {
    /// Materializes a uniquely named tree under `parent` holding the
    /// rewritten contract, the adapted reference test, the build config,
    /// and the stub assertion library.
    pub fn provision(
        normalized: &NormalizedSubmission,
        mapping: &LessonMapping,
        parent: &Path,
    ) -> Result<Self> {
        let seq = TREE_SEQ.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            "{}-{}-{seq}",
            Local::now().format("%y%m%d-%H%M%S"),
            process::id()
        );
        let root = parent.join(name);
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create build tree at {}", root.display()))?;

        // Cleanup is armed from this point on; a failed populate still
        // removes the partial tree on drop.
        let tree = Self { root };
        tree.populate(normalized, mapping)?;
        Ok(tree)
    }

    fn populate(&self, normalized: &NormalizedSubmission, mapping: &LessonMapping) -> Result<()> {
        let src_dir = self.root.join("src");
        let test_dir = self.root.join("test");
        let lib_dir = self.root.join("lib").join("forge-std").join("src");

        for dir in [&src_dir, &test_dir, &lib_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }

        fs::write(
            src_dir.join(format!("{}.sol", mapping.contract_name)),
            &normalized.rewritten_code,
        )?;
        fs::write(
            test_dir.join(&mapping.reference_test_file),
            &normalized.rewritten_test_code,
        )?;
        fs::write(self.root.join("foundry.toml"), FOUNDRY_CONFIG)?;
        fs::write(lib_dir.join("Test.sol"), FORGE_STD_STUB)?;

        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the rewritten user contract lives inside the tree
    pub fn source_file(&self, mapping: &LessonMapping) -> PathBuf {
        self.root
            .join("src")
            .join(format!("{}.sol", mapping.contract_name))
    }

    /// Container name tied to this tree, so a timed-out run can be killed
    /// by name
    pub fn container_name(&self) -> String {
        let dir_name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("soljudge-{dir_name}")
    }
}

impl Drop for BuildTree {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.root) {
            if self.root.exists() {
                log::warn!("failed to remove build tree {}: {e}", self.root.display());
            }
        }
    }
}

/// Parent directory for build trees when the config does not override it
pub fn default_work_dir() -> Result<PathBuf> {
    use directories::ProjectDirs;

    let proj_dirs = ProjectDirs::from("", "", "soljudge")
        .ok_or_else(|| anyhow!("Unable to find user directory"))?;

    Ok(proj_dirs.cache_dir().join("trees"))
}

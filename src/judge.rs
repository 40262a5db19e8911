//! The core entry point: lesson resolution, normalization, and the
//! fallback verification chain, in that order. Input errors are rejected
//! before any filesystem or container work begins.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use crate::config::{Config, SandboxConfig};
use crate::lessons::{LessonRegistry, UnknownLessonError};
use crate::normalize::{self, NoContractDeclarationError};
use crate::sandbox::{self, DockerEngine, TestRunResult};

/// Input errors surfaced to the caller synchronously; everything else
/// comes back inside a `TestRunResult`.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error(transparent)]
    UnknownLesson(#[from] UnknownLessonError),
    #[error(transparent)]
    NoContractDeclaration(#[from] NoContractDeclarationError),
}

pub struct Judge {
    registry: LessonRegistry,
    engine: Option<DockerEngine>,
    sandbox_config: SandboxConfig,
    work_dir: PathBuf,
}

impl Judge {
    /// Builds the registry and probes the container runtime, both exactly
    /// once for the process lifetime.
    pub fn build(config: &Config) -> Result<Self> {
        Self::assemble(config, DockerEngine::detect(&config.sandbox))
    }

    /// A judge that skips runtime detection entirely; every submission
    /// resolves through the UNAVAILABLE short-circuit. Used by tests and
    /// for dry-running a config on hosts without docker.
    pub fn build_without_sandbox(config: &Config) -> Result<Self> {
        Self::assemble(config, None)
    }

    fn assemble(config: &Config, engine: Option<DockerEngine>) -> Result<Self> {
        let registry = LessonRegistry::load(&config.lessons)?;

        let work_dir = match &config.sandbox.work_dir {
            Some(dir) => dir.clone(),
            None => sandbox::default_work_dir()?,
        };
        std::fs::create_dir_all(&work_dir)
            .with_context(|| format!("failed to create work dir {}", work_dir.display()))?;

        log::info!(
            "{} lesson ids registered; build trees under {}",
            registry.len(),
            work_dir.display()
        );

        Ok(Self {
            registry,
            engine,
            sandbox_config: config.sandbox.clone(),
            work_dir,
        })
    }

    pub fn registry(&self) -> &LessonRegistry {
        &self.registry
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Runs one submission end to end. Compile and test failures are not
    /// errors; they come back inside the result with `passed: false`.
    pub async fn run_submission(
        &self,
        source_code: &str,
        lesson_id: &str,
    ) -> Result<TestRunResult, SubmissionError> {
        let mapping = self.registry.resolve(lesson_id)?;
        let normalized = normalize::normalize(source_code, &mapping)?;

        let result = sandbox::run_with_fallback(
            self.engine.as_ref(),
            &normalized,
            &mapping,
            &self.sandbox_config,
            &self.work_dir,
        )
        .await;

        Ok(result)
    }
}

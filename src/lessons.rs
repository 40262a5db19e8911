use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use thiserror::Error;

use crate::config::LessonConfig;

#[derive(Debug, Error)]
#[error("unknown lesson id: {0}")]
pub struct UnknownLessonError(pub String);

/// Immutable per-lesson metadata, loaded once at process start
///
/// The reference test source is read from disk here so that everything
/// downstream of `resolve` operates on in-memory strings only. A broken
/// lessons tree fails startup, never a request.
#[derive(Debug)]
pub struct LessonMapping {
    pub reference_dir: PathBuf,
    pub reference_test_file: String,
    pub contract_name: String,
    pub reference_test_source: String,
}

/// Static lookup from lesson id to lesson metadata
///
/// Multiple ids may point at the same mapping (e.g. a landing-page id and
/// the first lesson sharing one reference suite). Read-only after `load`.
pub struct LessonRegistry {
    mappings: HashMap<String, Arc<LessonMapping>>,
}

impl LessonRegistry {
    pub fn load(lessons: &[LessonConfig]) -> Result<Self> {
        let mut mappings = HashMap::new();

        for lesson in lessons {
            let reference_dir = PathBuf::from(&lesson.reference_dir);
            let test_path = reference_dir.join(&lesson.reference_test_file);
            let reference_test_source = std::fs::read_to_string(&test_path).with_context(|| {
                format!("failed to read reference test {}", test_path.display())
            })?;

            let mapping = Arc::new(LessonMapping {
                reference_dir,
                reference_test_file: lesson.reference_test_file.clone(),
                contract_name: lesson.contract_name.clone(),
                reference_test_source,
            });

            for id in &lesson.ids {
                if mappings.insert(id.clone(), Arc::clone(&mapping)).is_some() {
                    bail!("duplicate lesson id in config: {id}");
                }
                log::debug!(
                    "registered lesson id {id} -> {}",
                    mapping.reference_dir.display()
                );
            }
        }

        Ok(Self { mappings })
    }

    pub fn resolve(&self, lesson_id: &str) -> Result<Arc<LessonMapping>, UnknownLessonError> {
        self.mappings
            .get(lesson_id)
            .cloned()
            .ok_or_else(|| UnknownLessonError(lesson_id.to_string()))
    }

    pub fn contains(&self, lesson_id: &str) -> bool {
        self.mappings.contains_key(lesson_id)
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

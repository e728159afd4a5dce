//! Per-learner, per-lesson progress records and where they are stored.
//!
//! Saving is an upsert keyed by `(user_id, lesson_id)`. Records are never
//! deleted, and a record that has been completed stays completed no matter
//! what a later save says.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{EngineError, Result};

/// Current on-disk format version of the progress file.
const PROGRESS_FILE_VERSION: u32 = 1;

/// Persisted state for one learner on one lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgress {
    /// Learner identifier.
    pub user_id: String,
    /// Lesson identifier.
    pub lesson_id: String,
    /// Set once the lesson has been passed; never cleared.
    pub completed: bool,
    /// Code submitted on the most recent run.
    pub last_submitted_code: String,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

impl LessonProgress {
    fn upsert(
        existing: Option<&Self>,
        user_id: &str,
        lesson_id: &str,
        completed: bool,
        code: &str,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            lesson_id: lesson_id.to_string(),
            completed: completed || existing.is_some_and(|p| p.completed),
            last_submitted_code: code.to_string(),
            updated_at: Utc::now(),
        }
    }
}

/// Storage for [`LessonProgress`] records.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Creates or updates the record for `(user_id, lesson_id)` and returns
    /// the stored state.
    async fn save_progress(
        &self,
        user_id: &str,
        lesson_id: &str,
        completed: bool,
        code: &str,
    ) -> Result<LessonProgress>;

    /// Loads the record for `(user_id, lesson_id)`, if one exists.
    async fn load_progress(&self, user_id: &str, lesson_id: &str)
        -> Result<Option<LessonProgress>>;
}

type ProgressKey = (String, String);

fn key(user_id: &str, lesson_id: &str) -> ProgressKey {
    (user_id.to_string(), lesson_id.to_string())
}

/// Keeps progress in memory for the life of the process.
#[derive(Debug, Default)]
pub struct InMemoryProgressStore {
    records: Mutex<HashMap<ProgressKey, LessonProgress>>,
}

impl InMemoryProgressStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn save_progress(
        &self,
        user_id: &str,
        lesson_id: &str,
        completed: bool,
        code: &str,
    ) -> Result<LessonProgress> {
        let mut records = self.records.lock().await;
        let k = key(user_id, lesson_id);
        let record = LessonProgress::upsert(records.get(&k), user_id, lesson_id, completed, code);
        records.insert(k, record.clone());
        Ok(record)
    }

    async fn load_progress(
        &self,
        user_id: &str,
        lesson_id: &str,
    ) -> Result<Option<LessonProgress>> {
        Ok(self.records.lock().await.get(&key(user_id, lesson_id)).cloned())
    }
}

/// On-disk shape of the progress file.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressFile {
    version: u32,
    #[serde(default)]
    records: Vec<LessonProgress>,
}

/// Keeps progress in a single JSON file.
///
/// Every save rewrites the file through a temporary sibling and a rename, so
/// a crash mid-write leaves the previous contents intact.
#[derive(Debug)]
pub struct JsonFileProgressStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileProgressStore {
    /// Creates a store backed by `path`. The file is created on first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> Result<ProgressFile> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ProgressFile {
                    version: PROGRESS_FILE_VERSION,
                    records: Vec::new(),
                });
            }
            Err(e) => return Err(EngineError::Io(e)),
        };

        let file: ProgressFile = serde_json::from_str(&contents)
            .map_err(|e| EngineError::progress_corrupted(&self.path, e.to_string()))?;

        if file.version > PROGRESS_FILE_VERSION {
            return Err(EngineError::progress_corrupted(
                &self.path,
                format!(
                    "file version {} is newer than supported version {PROGRESS_FILE_VERSION}",
                    file.version
                ),
            ));
        }

        Ok(file)
    }

    async fn write_file(&self, file: &ProgressFile) -> Result<()> {
        let json = serde_json::to_string_pretty(file)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EngineError::progress_write(&self.path, e.to_string()))?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| EngineError::progress_write(&tmp, e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| EngineError::progress_write(&self.path, e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl ProgressStore for JsonFileProgressStore {
    async fn save_progress(
        &self,
        user_id: &str,
        lesson_id: &str,
        completed: bool,
        code: &str,
    ) -> Result<LessonProgress> {
        let _guard = self.lock.lock().await;
        let mut file = self.read_file().await?;

        let position = file
            .records
            .iter()
            .position(|p| p.user_id == user_id && p.lesson_id == lesson_id);
        let record = LessonProgress::upsert(
            position.map(|i| &file.records[i]),
            user_id,
            lesson_id,
            completed,
            code,
        );
        match position {
            Some(i) => file.records[i] = record.clone(),
            None => file.records.push(record.clone()),
        }
        file.version = PROGRESS_FILE_VERSION;

        self.write_file(&file).await?;
        tracing::debug!(
            user_id,
            lesson_id,
            completed = record.completed,
            path = %self.path.display(),
            "Progress saved"
        );
        Ok(record)
    }

    async fn load_progress(
        &self,
        user_id: &str,
        lesson_id: &str,
    ) -> Result<Option<LessonProgress>> {
        let _guard = self.lock.lock().await;
        let file = self.read_file().await?;
        Ok(file
            .records
            .into_iter()
            .find(|p| p.user_id == user_id && p.lesson_id == lesson_id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ------------------------------------------------------------------------
    // In-memory store
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_memory_store_upserts() {
        let store = InMemoryProgressStore::new();
        assert!(store.load_progress("u1", "l1").await.unwrap().is_none());

        store.save_progress("u1", "l1", false, "let x;").await.unwrap();
        store.save_progress("u1", "l1", false, "let x = 5;").await.unwrap();

        let record = store.load_progress("u1", "l1").await.unwrap().unwrap();
        assert!(!record.completed);
        assert_eq!(record.last_submitted_code, "let x = 5;");
    }

    #[tokio::test]
    async fn test_memory_store_never_clears_completed() {
        let store = InMemoryProgressStore::new();
        store.save_progress("u1", "l1", true, "done").await.unwrap();
        let record = store.save_progress("u1", "l1", false, "broken").await.unwrap();

        assert!(record.completed);
        assert_eq!(record.last_submitted_code, "broken");
    }

    #[tokio::test]
    async fn test_memory_store_keys_by_user_and_lesson() {
        let store = InMemoryProgressStore::new();
        store.save_progress("u1", "l1", true, "a").await.unwrap();

        assert!(store.load_progress("u2", "l1").await.unwrap().is_none());
        assert!(store.load_progress("u1", "l2").await.unwrap().is_none());
    }

    // ------------------------------------------------------------------------
    // JSON file store
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = std::env::temp_dir().join("test_progress_persist");
        std::fs::remove_dir_all(&dir).ok();
        let path = dir.join("nested").join("progress.json");

        let store = JsonFileProgressStore::new(&path);
        store.save_progress("ada", "loops", false, "for (;;) {}").await.unwrap();
        store.save_progress("ada", "loops", true, "for (const x of xs) {}").await.unwrap();
        store.save_progress("bob", "loops", false, "").await.unwrap();

        let reopened = JsonFileProgressStore::new(&path);
        let ada = reopened.load_progress("ada", "loops").await.unwrap().unwrap();
        assert!(ada.completed);
        assert_eq!(ada.last_submitted_code, "for (const x of xs) {}");

        let bob = reopened.load_progress("bob", "loops").await.unwrap().unwrap();
        assert!(!bob.completed);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["records"].as_array().unwrap().len(), 2);
        assert!(raw["records"][0]["lastSubmittedCode"].is_string());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_file_store_missing_file_is_empty() {
        let store = JsonFileProgressStore::new("/nonexistent/dir/progress.json");
        assert!(store.load_progress("u", "l").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_corrupted_file() {
        let path = std::env::temp_dir().join("test_progress_corrupted.json");
        std::fs::write(&path, "{ this is not json").unwrap();

        let store = JsonFileProgressStore::new(&path);
        let err = store.load_progress("u", "l").await.unwrap_err();
        assert!(
            matches!(&err, EngineError::ProgressFileCorrupted { path: p, .. } if *p == path),
            "Expected ProgressFileCorrupted, got: {err:?}"
        );

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_file_store_rejects_newer_version() {
        let path = std::env::temp_dir().join("test_progress_future.json");
        std::fs::write(&path, r#"{"version": 99, "records": []}"#).unwrap();

        let store = JsonFileProgressStore::new(&path);
        let err = store.save_progress("u", "l", false, "x").await.unwrap_err();
        assert!(matches!(err, EngineError::ProgressFileCorrupted { .. }));

        std::fs::remove_file(&path).ok();
    }
}

//! Durable checkpoint storage
//!
//! One JSON file per assignment signature, replaced atomically at the end
//! of every cycle (write to temp, then rename). A crash between cycles
//! loses at most the in-progress cycle.

use super::types::Checkpoint;
use crate::{EngineError, EngineResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File-backed checkpoint store keyed by assignment signature
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    storage_dir: PathBuf,
}

impl CheckpointStore {
    /// Create a checkpoint store, creating the directory if needed
    pub fn new<P: AsRef<Path>>(storage_dir: P) -> EngineResult<Self> {
        let storage_dir = storage_dir.as_ref().to_path_buf();

        if !storage_dir.exists() {
            std::fs::create_dir_all(&storage_dir)?;
            info!(
                "Created checkpoint storage directory: {}",
                storage_dir.display()
            );
        }

        Ok(Self { storage_dir })
    }

    fn checkpoint_path(&self, signature: &str) -> PathBuf {
        self.storage_dir.join(format!("{}.json", signature))
    }

    /// Atomically persist a checkpoint: serialize, write to a temp file in
    /// the same directory, then rename over the previous snapshot.
    pub async fn save(&self, checkpoint: &Checkpoint) -> EngineResult<()> {
        let final_path = self.checkpoint_path(&checkpoint.signature);
        let tmp_path = self
            .storage_dir
            .join(format!("{}.json.tmp", checkpoint.signature));

        let content = serde_json::to_string_pretty(checkpoint)?;

        tokio::fs::write(&tmp_path, &content).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;

        debug!(
            signature = %checkpoint.signature,
            cycles = checkpoint.cycles.len(),
            entities = checkpoint.entities.len(),
            status = %checkpoint.status,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Load the latest checkpoint for an assignment signature.
    ///
    /// A missing file means a fresh start. A corrupt or unreadable file is
    /// logged and also treated as absent; it must never block a new run.
    pub async fn load_latest(&self, signature: &str) -> EngineResult<Option<Checkpoint>> {
        let path = self.checkpoint_path(signature);

        if !path.exists() {
            return Ok(None);
        }

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to read checkpoint, starting fresh"
                );
                return Ok(None);
            }
        };

        match serde_json::from_str::<Checkpoint>(&content) {
            Ok(checkpoint) => {
                if checkpoint.signature != signature {
                    return Err(EngineError::checkpoint(format!(
                        "Checkpoint signature mismatch: expected {}, found {}",
                        signature, checkpoint.signature
                    )));
                }
                debug!(
                    signature = %signature,
                    cycles = checkpoint.cycles.len(),
                    "Checkpoint loaded"
                );
                Ok(Some(checkpoint))
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Checkpoint is corrupt, starting fresh"
                );
                Ok(None)
            }
        }
    }

    /// Remove a checkpoint (used once a report has been delivered)
    pub async fn remove(&self, signature: &str) -> EngineResult<()> {
        let path = self.checkpoint_path(signature);
        if path.exists() {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::types::{
        Checkpoint, Cycle, ResearchStatus, CHECKPOINT_VERSION,
    };
    use chrono::Utc;
    use leadify_core::{Assignment, AssignmentConstraints, ResearchDepth};

    fn assignment() -> Assignment {
        Assignment {
            objective: "find companies".to_string(),
            target_count: 5,
            depth: ResearchDepth::Quick,
            constraints: AssignmentConstraints::default(),
            max_cycles: 3,
            sources_per_cycle: 4,
        }
    }

    fn checkpoint(signature: &str) -> Checkpoint {
        Checkpoint {
            version: CHECKPOINT_VERSION,
            signature: signature.to_string(),
            assignment: assignment(),
            status: ResearchStatus::Running,
            cycles: vec![Cycle {
                index: 0,
                queries: vec!["find companies".to_string()],
                visited_urls: vec!["https://a.test".to_string()],
                sources_accepted: 1,
                sources_rejected: 0,
                new_entities: 1,
                updated_entities: 0,
                summary: "1 new".to_string(),
                started_at: Utc::now(),
                finished_at: Utc::now(),
            }],
            entities: vec![],
            issued_queries: vec!["find companies".to_string()],
            elapsed_secs: 42,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path()).unwrap();
        let signature = assignment().signature();

        store.save(&checkpoint(&signature)).await.unwrap();
        let loaded = store.load_latest(&signature).await.unwrap().unwrap();

        assert_eq!(loaded.cycles.len(), 1);
        assert_eq!(loaded.elapsed_secs, 42);
        assert_eq!(loaded.issued_queries, vec!["find companies".to_string()]);

        // No temp file left behind
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn missing_checkpoint_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path()).unwrap();
        assert!(store.load_latest("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_checkpoint_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path()).unwrap();

        std::fs::write(dir.path().join("sig.json"), "{ not json").unwrap();
        assert!(store.load_latest("sig").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_fields_ignored_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path()).unwrap();
        let signature = assignment().signature();

        let mut value = serde_json::to_value(checkpoint(&signature)).unwrap();
        value["some_future_field"] = serde_json::json!({"nested": true});
        std::fs::write(
            dir.path().join(format!("{}.json", signature)),
            serde_json::to_string(&value).unwrap(),
        )
        .unwrap();

        let loaded = store.load_latest(&signature).await.unwrap();
        assert!(loaded.is_some());
    }

    #[tokio::test]
    async fn save_overwrites_previous_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path()).unwrap();
        let signature = assignment().signature();

        store.save(&checkpoint(&signature)).await.unwrap();

        let mut second = checkpoint(&signature);
        second.elapsed_secs = 99;
        second.status = ResearchStatus::Complete;
        store.save(&second).await.unwrap();

        let loaded = store.load_latest(&signature).await.unwrap().unwrap();
        assert_eq!(loaded.elapsed_secs, 99);
        assert_eq!(loaded.status, ResearchStatus::Complete);
    }
}

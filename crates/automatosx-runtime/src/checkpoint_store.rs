//! Per-run checkpoint persistence, using the same atomic
//! write-to-temp-then-rename pattern as the session persistence file.

use automatosx_types::{Checkpoint, Result};
use std::path::{Path, PathBuf};

pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }

    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&checkpoint.run_id);
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(checkpoint)?;
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    pub async fn load(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        let path = self.path_for(run_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automatosx_types::checkpoint::StageRecord;

    fn sample(run_id: &str) -> Checkpoint {
        let now = chrono::Utc::now();
        Checkpoint {
            run_id: run_id.to_string(),
            agent_name: "writer".to_string(),
            task: "draft".to_string(),
            mode: Vec::new(),
            stages: vec![StageRecord::pending("plan")],
            chain: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let checkpoint = sample("run-1");
        store.save(&checkpoint).await.unwrap();

        let loaded = store.load("run-1").await.unwrap().unwrap();
        assert_eq!(loaded.agent_name, "writer");
        assert_eq!(loaded.stages.len(), 1);
    }

    #[tokio::test]
    async fn missing_checkpoint_is_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert!(store.load("nonexistent").await.unwrap().is_none());
    }
}

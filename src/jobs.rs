use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Uploading,
    Uploaded,
    Processing,
    Complete,
    Error,
    Expired,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Uploading => "uploading",
            JobStatus::Uploaded => "uploaded",
            JobStatus::Processing => "processing",
            JobStatus::Complete => "complete",
            JobStatus::Error => "error",
            JobStatus::Expired => "expired",
        }
    }

    /// Complete, Error and Expired end the job's active lifecycle.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Complete | JobStatus::Error | JobStatus::Expired
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// One upload-transcode-download lifecycle instance.
#[derive(Clone, Debug)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub progress: u8,
    pub error: Option<String>,
    pub created_at: Instant,
    pub filename: Option<String>,
    pub duration: Option<f64>,
    pub resolution: Option<Resolution>,
    pub file_size: Option<u64>,
    /// Next expected chunk index. Chunks must arrive strictly in order.
    pub chunks_received: u32,
}

/// In-memory job store. The registry is the sole owner of job state; handlers
/// and the transcode task hold clones of this handle, never copies of a Job.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<Uuid, Job>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, temp_dir: &Path, original_filename: &str) -> Job {
        let id = Uuid::new_v4();
        let ext = Path::new(original_filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");

        let job = Job {
            id,
            status: JobStatus::Uploading,
            input_path: temp_dir.join(format!("{}-input.{}", id, ext)),
            output_path: temp_dir.join(format!("{}-output.mp4", id)),
            progress: 0,
            error: None,
            created_at: Instant::now(),
            filename: Some(original_filename.to_string()),
            duration: None,
            resolution: None,
            file_size: None,
            chunks_received: 0,
        };

        self.jobs.write().await.insert(id, job.clone());
        job
    }

    pub async fn get(&self, id: Uuid) -> Option<Job> {
        self.jobs.read().await.get(&id).cloned()
    }

    /// Merge-style update. Does not validate status transitions; callers that
    /// care about terminal stickiness go through set_progress/complete/fail.
    pub async fn update(&self, id: Uuid, f: impl FnOnce(&mut Job)) -> Option<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id)?;
        f(job);
        Some(job.clone())
    }

    /// Progress is monotone while processing. Updates arriving after a
    /// terminal status, or below the current value, are dropped.
    pub async fn set_progress(&self, id: Uuid, progress: u8) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&id) {
            if job.status == JobStatus::Processing && progress > job.progress {
                job.progress = progress;
            }
        }
    }

    pub async fn complete(&self, id: Uuid) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&id) {
            if !job.status.is_terminal() {
                job.status = JobStatus::Complete;
                job.progress = 100;
            }
        }
    }

    pub async fn fail(&self, id: Uuid, message: impl Into<String>) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&id) {
            if !job.status.is_terminal() {
                job.status = JobStatus::Error;
                job.error = Some(message.into());
            }
        }
    }

    /// Remove the job's files and record. Cleanup is best-effort: a file that
    /// cannot be deleted never keeps the record alive. Idempotent.
    pub async fn delete(&self, id: Uuid) {
        let paths = {
            let jobs = self.jobs.read().await;
            jobs.get(&id)
                .map(|j| (j.input_path.clone(), j.output_path.clone()))
        };

        if let Some((input, output)) = paths {
            let _ = fs::remove_file(&input).await;
            let _ = fs::remove_file(&output).await;
        }

        self.jobs.write().await.remove(&id);
    }

    /// Delete every job older than `expiry`, regardless of status.
    pub async fn sweep(&self, expiry: Duration) -> usize {
        let expired: Vec<Uuid> = {
            let jobs = self.jobs.read().await;
            jobs.values()
                .filter(|j| j.created_at.elapsed() > expiry)
                .map(|j| j.id)
                .collect()
        };

        for id in &expired {
            self.delete(*id).await;
        }

        if !expired.is_empty() {
            info!("[cleanup] Removed {} expired jobs", expired.len());
        }
        expired.len()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_sets_initial_state_and_paths() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new();

        let job = registry.create(dir.path(), "clip.webm").await;
        assert_eq!(job.status, JobStatus::Uploading);
        assert_eq!(job.progress, 0);
        assert_eq!(job.filename.as_deref(), Some("clip.webm"));
        assert!(job
            .input_path
            .to_string_lossy()
            .ends_with(&format!("{}-input.webm", job.id)));
        assert!(job
            .output_path
            .to_string_lossy()
            .ends_with(&format!("{}-output.mp4", job.id)));

        let fetched = registry.get(job.id).await.unwrap();
        assert_eq!(fetched.id, job.id);
    }

    #[tokio::test]
    async fn filename_without_extension_defaults_to_mp4() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new();

        let job = registry.create(dir.path(), "rawdump").await;
        assert!(job.input_path.to_string_lossy().ends_with("-input.mp4"));
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new();

        let job = registry.create(dir.path(), "clip.mp4").await;
        tokio::fs::write(&job.input_path, b"input").await.unwrap();
        tokio::fs::write(&job.output_path, b"output").await.unwrap();

        registry.delete(job.id).await;
        assert!(registry.get(job.id).await.is_none());
        assert!(!job.input_path.exists());
        assert!(!job.output_path.exists());

        // Deleting again, or deleting an unknown id, is a no-op.
        registry.delete(job.id).await;
        registry.delete(Uuid::new_v4()).await;
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new();

        let old = registry.create(dir.path(), "old.mp4").await;
        let fresh = registry.create(dir.path(), "fresh.mp4").await;
        tokio::fs::write(&old.input_path, b"stale").await.unwrap();

        registry
            .update(old.id, |j| {
                j.created_at = Instant::now().checked_sub(Duration::from_secs(5)).unwrap();
            })
            .await;

        let removed = registry.sweep(Duration::from_secs(1)).await;
        assert_eq!(removed, 1);
        assert!(registry.get(old.id).await.is_none());
        assert!(!old.input_path.exists());
        assert!(registry.get(fresh.id).await.is_some());
    }

    #[tokio::test]
    async fn progress_is_monotone_and_only_while_processing() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new();
        let job = registry.create(dir.path(), "clip.mp4").await;

        // Not processing yet: ignored.
        registry.set_progress(job.id, 40).await;
        assert_eq!(registry.get(job.id).await.unwrap().progress, 0);

        registry
            .update(job.id, |j| j.status = JobStatus::Processing)
            .await;
        registry.set_progress(job.id, 40).await;
        registry.set_progress(job.id, 20).await;
        assert_eq!(registry.get(job.id).await.unwrap().progress, 40);
    }

    #[tokio::test]
    async fn terminal_status_is_sticky() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new();
        let job = registry.create(dir.path(), "clip.mp4").await;

        registry
            .update(job.id, |j| j.status = JobStatus::Processing)
            .await;
        registry.complete(job.id).await;

        let done = registry.get(job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Complete);
        assert_eq!(done.progress, 100);

        // Late events from a still-draining process change nothing.
        registry.set_progress(job.id, 50).await;
        registry.fail(job.id, "late pipe error").await;

        let still_done = registry.get(job.id).await.unwrap();
        assert_eq!(still_done.status, JobStatus::Complete);
        assert_eq!(still_done.progress, 100);
        assert!(still_done.error.is_none());
    }
}

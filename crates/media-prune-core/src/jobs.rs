use anyhow::Result;
use chrono::Utc;
use media_prune_models::{Job, JobStatus, SyncKind};
use std::collections::VecDeque;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Jobs kept in memory and on disk
pub const MAX_JOBS: usize = 50;

/// Append-only history of sync cycles.
///
/// A job may be updated while pending or running; once it is completed or
/// failed it is frozen.
#[derive(Debug, Default)]
pub struct JobRecorder {
    path: Option<PathBuf>,
    jobs: VecDeque<Job>,
}

impl JobRecorder {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load history from `jobs.json`. A corrupt file is discarded.
    ///
    /// Unfinished jobs are left as they are: another process may still be
    /// running them. The long-running owner calls [`Self::abandon_unfinished`].
    pub fn open(path: PathBuf) -> Result<Self> {
        let mut recorder = Self {
            path: Some(path.clone()),
            jobs: VecDeque::new(),
        };
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<Vec<Job>>(&content) {
                Ok(jobs) => {
                    debug!("Loaded {} jobs", jobs.len());
                    recorder.jobs = jobs.into_iter().collect();
                }
                Err(e) => {
                    warn!("Job history is corrupt: {}. Deleting corrupted file.", e);
                    if let Err(rm_err) = std::fs::remove_file(&path) {
                        warn!("Failed to delete corrupted job history: {}", rm_err);
                    }
                }
            }
        }
        Ok(recorder)
    }

    /// Fail jobs left pending or running by a previous process.
    pub fn abandon_unfinished(&mut self) -> usize {
        let now = Utc::now();
        let mut abandoned = 0;
        for job in self.jobs.iter_mut().filter(|j| !j.status.is_finished()) {
            job.status = JobStatus::Failed;
            job.completed_at = Some(now);
            job.error = Some("process exited before the job finished".to_string());
            abandoned += 1;
        }
        if abandoned > 0 {
            self.persist();
        }
        abandoned
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.jobs)?;
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Record a new pending job.
    pub fn create(&mut self, kind: SyncKind) -> Job {
        let job = Job::new(uuid::Uuid::new_v4().to_string(), kind, Utc::now());
        self.jobs.push_back(job.clone());
        while self.jobs.len() > MAX_JOBS {
            self.jobs.pop_front();
        }
        self.persist();
        job
    }

    /// Store the new state of a job. Finished jobs are never overwritten.
    pub fn update(&mut self, job: &Job) -> bool {
        let Some(existing) = self.jobs.iter_mut().find(|j| j.id == job.id) else {
            warn!("Job {} is not in the history", job.id);
            return false;
        };
        if existing.status.is_finished() {
            warn!("Job {} is already finished and cannot change", job.id);
            return false;
        }
        *existing = job.clone();
        self.persist();
        true
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            warn!("Failed to save job history: {}", e);
        }
    }

    pub fn latest(&self) -> Option<&Job> {
        self.jobs.back()
    }

    pub fn get(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// Newest first
    pub fn recent(&self, limit: usize) -> Vec<Job> {
        self.jobs.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_finished_jobs_are_frozen() {
        let mut recorder = JobRecorder::in_memory();
        let mut job = recorder.create(SyncKind::Full);

        job.status = JobStatus::Running;
        assert!(recorder.update(&job));

        job.status = JobStatus::Completed;
        job.summary.movies = 3;
        assert!(recorder.update(&job));

        job.summary.movies = 99;
        assert!(!recorder.update(&job));
        assert_eq!(recorder.latest().unwrap().summary.movies, 3);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut recorder = JobRecorder::in_memory();
        let first = recorder.create(SyncKind::Full);
        for _ in 0..MAX_JOBS {
            recorder.create(SyncKind::Incremental);
        }
        assert_eq!(recorder.len(), MAX_JOBS);
        assert!(recorder.get(&first.id).is_none());
        assert_eq!(recorder.recent(2).len(), 2);
    }

    #[test]
    fn test_abandon_marks_running_jobs_failed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.json");

        let mut recorder = JobRecorder::open(path.clone()).unwrap();
        let mut job = recorder.create(SyncKind::Full);
        job.status = JobStatus::Running;
        recorder.update(&job);

        let mut reopened = JobRecorder::open(path.clone()).unwrap();
        assert_eq!(reopened.latest().unwrap().status, JobStatus::Running);
        assert_eq!(reopened.abandon_unfinished(), 1);

        let latest = JobRecorder::open(path).unwrap().latest().cloned().unwrap();
        assert_eq!(latest.id, job.id);
        assert_eq!(latest.status, JobStatus::Failed);
        assert!(latest.error.is_some());
    }
}

use async_trait::async_trait;
use scrapor_core::{Job, ScraporError, ScraporResult};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Persistence contract for jobs.
///
/// Every write is a single whole-document update keyed by job id; job
/// execution is single-owner, so no job is ever read-modify-written by
/// two workers concurrently.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a newly created job.
    async fn create(&self, job: &Job) -> ScraporResult<()>;
    /// Read one job by id.
    async fn get(&self, id: Uuid) -> ScraporResult<Option<Job>>;
    /// Overwrite a job's document.
    async fn update(&self, job: &Job) -> ScraporResult<()>;
    /// Page of jobs, most recent first, plus the total count.
    async fn list(&self, skip: usize, limit: usize) -> ScraporResult<(Vec<Job>, usize)>;
}

/// In-memory store for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl MemoryJobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &Job) -> ScraporResult<()> {
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> ScraporResult<Option<Job>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn update(&self, job: &Job) -> ScraporResult<()> {
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn list(&self, skip: usize, limit: usize) -> ScraporResult<(Vec<Job>, usize)> {
        let jobs = self.jobs.read().await;
        let total = jobs.len();
        let mut all: Vec<Job> = jobs.values().cloned().collect();
        all.sort_by_key(|j| Reverse(j.created_at));
        Ok((all.into_iter().skip(skip).take(limit).collect(), total))
    }
}

/// File-based job store: one JSON document per job id.
pub struct FileJobStore {
    dir: PathBuf,
}

impl FileJobStore {
    /// Create the store, creating the directory if needed.
    pub async fn new(dir: PathBuf) -> ScraporResult<Self> {
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ScraporError::Store(format!("cannot create job dir: {e}")))?;
        Ok(Self { dir })
    }

    fn job_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn write_job(&self, job: &Job) -> ScraporResult<()> {
        let json = serde_json::to_string_pretty(job)?;
        tokio::fs::write(self.job_path(job.id), json)
            .await
            .map_err(|e| ScraporError::Store(format!("cannot write job {}: {e}", job.id)))
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn create(&self, job: &Job) -> ScraporResult<()> {
        self.write_job(job).await
    }

    async fn get(&self, id: Uuid) -> ScraporResult<Option<Job>> {
        let path = self.job_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ScraporError::Store(format!("cannot read job {id}: {e}")))?;
        let job: Job = serde_json::from_str(&data)
            .map_err(|e| ScraporError::Store(format!("cannot parse job {id}: {e}")))?;
        Ok(Some(job))
    }

    async fn update(&self, job: &Job) -> ScraporResult<()> {
        self.write_job(job).await
    }

    async fn list(&self, skip: usize, limit: usize) -> ScraporResult<(Vec<Job>, usize)> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| ScraporError::Store(format!("cannot list jobs: {e}")))?;

        let mut all = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ScraporError::Store(e.to_string()))?
        {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some(stem) = name.strip_suffix(".json") else {
                continue;
            };
            let Ok(id) = Uuid::parse_str(stem) else {
                continue;
            };
            if let Some(job) = self.get(id).await? {
                all.push(job);
            }
        }

        let total = all.len();
        all.sort_by_key(|j| Reverse(j.created_at));
        Ok((all.into_iter().skip(skip).take(limit).collect(), total))
    }
}

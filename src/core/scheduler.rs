use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::core::engine::{AgentEngine, EngineRunOptions};
use crate::core::relay::{drive_engine_run, truncate_chars};
use crate::core::store::Store;
use crate::core::store::types::{JobStatus, ScheduledJobRecord};

/// Recorded job output is capped at this many characters.
pub const JOB_OUTPUT_LIMIT: usize = 10_000;

/// Reconciles persisted job definitions against live cron timers. The slot
/// table maps job id to the runtime's timer uuid; lookup, stop, and replace
/// for an id happen under one lock, so a job can never hold two timers.
/// Cloning shares the runtime and the slot table.
#[derive(Clone)]
pub struct Scheduler {
    runtime: JobScheduler,
    slots: Arc<Mutex<HashMap<String, Uuid>>>,
    store: Store,
    engine: Arc<dyn AgentEngine>,
}

/// Checks a cron expression against the runtime's dialect (six fields, with
/// seconds) without registering anything.
pub fn validate_cron(expr: &str) -> Result<()> {
    Job::new_async(expr, |_uuid, _l| Box::pin(async {}))?;
    Ok(())
}

impl Scheduler {
    pub async fn start(store: Store, engine: Arc<dyn AgentEngine>) -> Result<Self> {
        let runtime = JobScheduler::new().await?;
        runtime.start().await?;
        Ok(Self {
            runtime,
            slots: Arc::new(Mutex::new(HashMap::new())),
            store,
            engine,
        })
    }

    /// Arms a timer for the job, stopping any existing timer for the same id
    /// first, so callers may register on update without unregistering.
    /// Disabled jobs and jobs whose expression the runtime rejects are left
    /// disarmed; neither is an error.
    pub async fn register(&self, job: &ScheduledJobRecord) -> Result<()> {
        let mut slots = self.slots.lock().await;
        if let Some(old) = slots.remove(&job.id)
            && let Err(e) = self.runtime.remove(&old).await
        {
            warn!("Failed to stop previous timer for job '{}': {}", job.name, e);
        }
        if !job.enabled {
            return Ok(());
        }

        let scheduler = self.clone();
        let job_id = job.id.clone();
        let prompt = job.prompt.clone();
        let one_off = job.one_off;
        let timer = match Job::new_async(job.cron.as_str(), move |_uuid, mut _l| {
            let scheduler = scheduler.clone();
            let job_id = job_id.clone();
            let prompt = prompt.clone();
            Box::pin(async move {
                scheduler.fire(&job_id, &prompt, one_off).await;
            })
        }) {
            Ok(timer) => timer,
            Err(e) => {
                warn!(
                    "Job '{}' left disarmed, schedule '{}' rejected: {}",
                    job.name, job.cron, e
                );
                return Ok(());
            }
        };

        let timer_id = self.runtime.add(timer).await?;
        slots.insert(job.id.clone(), timer_id);
        info!("Job '{}' armed ({})", job.name, job.cron);
        Ok(())
    }

    /// Stops and discards the job's timer. No-op when none exists.
    pub async fn unregister(&self, id: &str) {
        let mut slots = self.slots.lock().await;
        if let Some(timer_id) = slots.remove(id)
            && let Err(e) = self.runtime.remove(&timer_id).await
        {
            warn!("Failed to stop timer for job {}: {}", id, e);
        }
    }

    pub async fn is_armed(&self, id: &str) -> bool {
        self.slots.lock().await.contains_key(id)
    }

    /// Arms every enabled persisted job at startup. An expression that was
    /// valid at creation time but is rejected now leaves that job disarmed;
    /// reconciliation itself never fails over it.
    pub async fn reconcile(&self) -> Result<usize> {
        let jobs = self.store.list_jobs().await?;
        let total = jobs.len();
        let mut armed = 0;
        for job in jobs.into_iter().filter(|job| job.enabled) {
            if let Err(e) = self.register(&job).await {
                error!("Failed to arm job '{}': {}", job.name, e);
                continue;
            }
            if self.is_armed(&job.id).await {
                armed += 1;
            }
        }
        info!("Scheduler armed {} of {} persisted jobs", armed, total);
        Ok(armed)
    }

    /// One timer fire: a fresh engine run with no continuation token, its
    /// outcome recorded on the job row. One-off jobs disable themselves and
    /// tear down their timer after the run regardless of outcome.
    async fn fire(&self, id: &str, prompt: &str, one_off: bool) {
        info!("Scheduled job {} firing", id);
        let out = drive_engine_run(
            self.engine.as_ref(),
            prompt,
            EngineRunOptions::default(),
            None,
        )
        .await;

        let (status, output) = match &out.failure {
            Some(message) => (JobStatus::Error, truncate_chars(message, JOB_OUTPUT_LIMIT)),
            None => (
                JobStatus::Success,
                truncate_chars(&out.content, JOB_OUTPUT_LIMIT),
            ),
        };
        if let Err(e) = self.store.record_job_run(id, status, &output).await {
            error!("Failed to record run outcome for job {}: {}", id, e);
        }

        if one_off {
            if let Err(e) = self.store.set_job_enabled(id, false).await {
                error!("Failed to disable one-off job {}: {}", id, e);
            }
            self.unregister(id).await;
        }
    }
}

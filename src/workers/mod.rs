pub mod incident_check;
pub mod retention;
pub mod rollup;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::{EngineConfig, WorkerConfig};
use crate::engine::incidents::IncidentPolicy;
use crate::services::alerting::AlertDispatcher;
use crate::store::Store;

/// Timeout for individual worker invocations (5 minutes).
const WORKER_TIMEOUT: Duration = Duration::from_secs(300);

/// Drain period before scheduler shutdown to let in-flight tasks complete.
#[cfg(test)]
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);
#[cfg(not(test))]
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerName {
    RollupMinute,
    RollupHour,
    RollupDay,
    IncidentCheck,
    EventRetention,
}

impl WorkerName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RollupMinute => "rollup_minute",
            Self::RollupHour => "rollup_hour",
            Self::RollupDay => "rollup_day",
            Self::IncidentCheck => "incident_check",
            Self::EventRetention => "event_retention",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: WorkerName,
    pub cron: &'static str,
    pub enabled: bool,
}

pub struct WorkerManager {
    store: Arc<Store>,
    dispatcher: AlertDispatcher,
    incident_policy: Arc<IncidentPolicy>,
    engine: EngineConfig,
    shutdown_rx: broadcast::Receiver<()>,
    config: WorkerConfig,
}

impl WorkerManager {
    pub fn new(
        store: Arc<Store>,
        dispatcher: AlertDispatcher,
        incident_policy: Arc<IncidentPolicy>,
        engine: &EngineConfig,
        shutdown_rx: broadcast::Receiver<()>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            incident_policy,
            engine: engine.clone(),
            shutdown_rx,
            config: config.clone(),
        }
    }

    /// Single source of truth for all planned jobs and their cron schedules.
    /// Minute rollups run shortly after each minute boundary so the raw
    /// samples for the closed bucket have landed; the incident check runs
    /// after that on the fresh rollups.
    pub fn planned_jobs(&self) -> Vec<JobSpec> {
        if !self.config.is_leader {
            return Vec::new();
        }

        vec![
            JobSpec {
                name: WorkerName::RollupMinute,
                cron: "10 * * * * *",
                enabled: self.config.enable_rollups,
            },
            JobSpec {
                name: WorkerName::RollupHour,
                cron: "20 1 * * * *",
                enabled: self.config.enable_rollups,
            },
            JobSpec {
                name: WorkerName::RollupDay,
                cron: "30 5 0 * * *",
                enabled: self.config.enable_rollups,
            },
            JobSpec {
                name: WorkerName::IncidentCheck,
                cron: "30 * * * * *",
                enabled: self.config.enable_rollups,
            },
            JobSpec {
                name: WorkerName::EventRetention,
                cron: "0 15 2 * * *",
                enabled: self.config.enable_retention,
            },
        ]
    }

    /// Start the worker scheduler. Returns an error if the scheduler cannot
    /// be created or started.
    pub async fn start(mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.config.is_leader {
            tracing::info!("Worker leader disabled; skipping worker startup");
            return Ok(());
        }

        let mut scheduler = JobScheduler::new().await?;

        self.register_jobs(&scheduler).await;

        scheduler.start().await?;

        tracing::info!("Worker manager started");
        let _ = self.shutdown_rx.recv().await;

        tracing::info!(
            "Worker manager shutting down, draining for {}s",
            DRAIN_TIMEOUT.as_secs()
        );
        tokio::time::sleep(DRAIN_TIMEOUT).await;
        let _ = scheduler.shutdown().await;
        Ok(())
    }

    async fn register_jobs(&self, scheduler: &JobScheduler) {
        let specs = self.planned_jobs();

        for spec in &specs {
            if !spec.enabled {
                tracing::info!(name = spec.name.as_str(), "Skipping disabled worker");
                continue;
            }

            let store = self.store.clone();
            let name_str = spec.name.as_str();

            match spec.name {
                WorkerName::RollupMinute => {
                    add_job(scheduler, spec.cron, name_str, move || {
                        let store = store.clone();
                        async move {
                            rollup::run_minute(&store).await;
                        }
                    })
                    .await;
                }
                WorkerName::RollupHour => {
                    add_job(scheduler, spec.cron, name_str, move || {
                        let store = store.clone();
                        async move {
                            rollup::run_hour(&store).await;
                        }
                    })
                    .await;
                }
                WorkerName::RollupDay => {
                    add_job(scheduler, spec.cron, name_str, move || {
                        let store = store.clone();
                        async move {
                            rollup::run_day(&store).await;
                        }
                    })
                    .await;
                }
                WorkerName::IncidentCheck => {
                    let dispatcher = self.dispatcher.clone();
                    let policy = self.incident_policy.clone();
                    add_job(scheduler, spec.cron, name_str, move || {
                        let store = store.clone();
                        let dispatcher = dispatcher.clone();
                        let policy = policy.clone();
                        async move {
                            incident_check::run(&store, &policy, &dispatcher).await;
                        }
                    })
                    .await;
                }
                WorkerName::EventRetention => {
                    let retention_days = self.engine.retention_days;
                    add_job(scheduler, spec.cron, name_str, move || {
                        let store = store.clone();
                        async move {
                            retention::run(&store, retention_days).await;
                        }
                    })
                    .await;
                }
            }
            tracing::info!(name = name_str, cron = spec.cron, "Registered worker");
        }
    }
}

/// Add a job to the scheduler with an overlap guard and timeout wrapper.
async fn add_job<Fut, F>(scheduler: &JobScheduler, cron: &str, name: &'static str, mut run: F)
where
    F: FnMut() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(false));

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let guard = running.clone();

        if guard
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!(
                worker = name,
                "Skipping worker invocation: previous run still in progress"
            );
            return Box::pin(async {});
        }

        let fut = run();
        Box::pin(async move {
            match tokio::time::timeout(WORKER_TIMEOUT, fut).await {
                Ok(()) => {}
                Err(_) => {
                    tracing::error!(
                        worker = name,
                        timeout_secs = WORKER_TIMEOUT.as_secs(),
                        "Worker timed out"
                    );
                }
            }
            guard.store(false, Ordering::SeqCst);
        })
    });

    match job {
        Ok(job) => {
            if let Err(err) = scheduler.add(job).await {
                tracing::error!(error=%err, cron, worker = name, "Failed to add worker job");
            }
        }
        Err(err) => tracing::error!(error=%err, cron, worker = name, "Failed to create worker job"),
    }
}

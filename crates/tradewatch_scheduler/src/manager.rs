//! Scheduler runtime: registration, startup recovery, and the tick loop.

use crate::capture::{JobLogLayer, LogCaptureRegistry};
use crate::history::JobHistory;
use crate::trigger::Trigger;
use crate::{Result, SchedulerError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, info_span, warn, Instrument};

use tradewatch_db::{ExecutionStatus, JobDefinition, ScheduleType, TradewatchDb};

/// How often the tick loop wakes to check for due jobs.
const TICK_INTERVAL: StdDuration = StdDuration::from_millis(500);

/// Grace window for missed firings. Within it a missed firing still
/// runs; beyond it the firing is coalesced into the next one.
const MISFIRE_GRACE_SECS: i64 = 300;

/// Work executed by a scheduled job.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self) -> std::result::Result<(), String>;
}

/// One job in the in-memory cache.
struct ScheduledJob {
    definition: JobDefinition,
    trigger: Trigger,
    runner: Arc<dyn JobRunner>,
    next_fire: Option<DateTime<Utc>>,
    paused: bool,
    /// At-most-one guard: set while an execution is in flight.
    running: Arc<AtomicBool>,
}

/// Public view of a scheduled job.
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub job_id: String,
    pub name: String,
    pub schedule_type: ScheduleType,
    pub schedule_value: String,
    pub next_run: Option<DateTime<Utc>>,
    pub is_paused: bool,
    pub is_running: bool,
    pub consecutive_failures: i64,
}

/// One scheduler exists per process; `start` enforces that with a
/// process-wide guard.
static PROCESS_SCHEDULER_STARTED: AtomicBool = AtomicBool::new(false);

pub struct Scheduler {
    db: TradewatchDb,
    jobs: Mutex<HashMap<String, ScheduledJob>>,
    functions: Mutex<HashMap<String, Arc<dyn JobRunner>>>,
    history: JobHistory,
    capture: LogCaptureRegistry,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Scheduler {
    pub async fn new(db: TradewatchDb) -> Arc<Self> {
        let history = JobHistory::load(&db).await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Arc::new(Self {
            db,
            jobs: Mutex::new(HashMap::new()),
            functions: Mutex::new(HashMap::new()),
            history,
            capture: LogCaptureRegistry::new(),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// The log-capture layer to install at logging init.
    pub fn log_layer(&self) -> JobLogLayer {
        JobLogLayer::new(self.capture.clone())
    }

    pub fn history(&self) -> &JobHistory {
        &self.history
    }

    /// Register a runner under a function name. Durable job definitions
    /// reference runners by this name.
    pub async fn register_function(&self, name: &str, runner: Arc<dyn JobRunner>) {
        self.functions.lock().await.insert(name.to_string(), runner);
    }

    /// Add a cron job and persist its definition.
    pub async fn add_cron_job(
        &self,
        job_id: &str,
        name: &str,
        function: &str,
        cron_expression: &str,
        replace_existing: bool,
    ) -> Result<()> {
        let trigger = Trigger::cron(cron_expression)?;
        self.add_job(job_id, name, function, trigger, replace_existing)
            .await
    }

    /// Add a cron job from component values instead of an expression.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_cron_job_components(
        &self,
        job_id: &str,
        name: &str,
        function: &str,
        hour: u32,
        minute: u32,
        day_of_week: Option<&str>,
        replace_existing: bool,
    ) -> Result<()> {
        let trigger = Trigger::cron_components(hour, minute, day_of_week)?;
        self.add_job(job_id, name, function, trigger, replace_existing)
            .await
    }

    /// Add an interval job and persist its definition.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_interval_job(
        &self,
        job_id: &str,
        name: &str,
        function: &str,
        hours: u64,
        minutes: u64,
        seconds: u64,
        replace_existing: bool,
    ) -> Result<()> {
        let trigger = Trigger::interval(hours, minutes, seconds)?;
        self.add_job(job_id, name, function, trigger, replace_existing)
            .await
    }

    async fn add_job(
        &self,
        job_id: &str,
        name: &str,
        function: &str,
        trigger: Trigger,
        replace_existing: bool,
    ) -> Result<()> {
        let runner = self
            .functions
            .lock()
            .await
            .get(function)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownFunction(function.to_string()))?;

        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(job_id) && !replace_existing {
            return Err(SchedulerError::AlreadyExists(job_id.to_string()));
        }

        let now = Utc::now();
        let next_fire = trigger.next_fire(now);
        let definition = JobDefinition {
            job_id: job_id.to_string(),
            job_name: name.to_string(),
            job_function: function.to_string(),
            schedule_type: trigger.schedule_type(),
            schedule_value: trigger.schedule_value(),
            enabled: true,
            last_run_at: None,
            next_scheduled_run: next_fire,
            consecutive_failures: 0,
            max_consecutive_failures: 3,
            auto_retry_on_startup: true,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        };

        self.db.upsert_job_definition(&definition).await?;

        info!(job_id, name, schedule = %definition.schedule_value, "Registered job");
        jobs.insert(
            job_id.to_string(),
            ScheduledJob {
                definition,
                trigger,
                runner,
                next_fire,
                paused: false,
                running: Arc::new(AtomicBool::new(false)),
            },
        );
        Ok(())
    }

    pub async fn remove_job(&self, job_id: &str) -> Result<bool> {
        self.jobs.lock().await.remove(job_id);
        let removed = self.db.delete_job_definition(job_id).await?;
        info!(job_id, "Removed job");
        Ok(removed)
    }

    pub async fn pause_job(&self, job_id: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| SchedulerError::NotFound(job_id.to_string()))?;
        job.paused = true;
        drop(jobs);
        self.db.set_job_enabled(job_id, false).await?;
        info!(job_id, "Paused job");
        Ok(())
    }

    pub async fn resume_job(&self, job_id: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| SchedulerError::NotFound(job_id.to_string()))?;
        job.paused = false;
        job.next_fire = job.trigger.next_fire(Utc::now());
        drop(jobs);
        self.db.set_job_enabled(job_id, true).await?;
        info!(job_id, "Resumed job");
        Ok(())
    }

    /// Pull a job's next run time to now.
    pub async fn run_job_now(&self, job_id: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| SchedulerError::NotFound(job_id.to_string()))?;
        job.next_fire = Some(Utc::now());
        info!(job_id, "Triggered job to run now");
        Ok(())
    }

    pub async fn get_jobs(&self) -> Vec<JobInfo> {
        let jobs = self.jobs.lock().await;
        let mut infos: Vec<JobInfo> = jobs.values().map(job_info).collect();
        infos.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        infos
    }

    pub async fn get_job_info(&self, job_id: &str) -> Option<JobInfo> {
        self.jobs.lock().await.get(job_id).map(job_info)
    }

    /// Load definitions, recover missed jobs, and spawn the tick loop.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if PROCESS_SCHEDULER_STARTED.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyStarted);
        }

        self.load_jobs_from_database().await?;
        self.recover_missed_jobs().await;

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            scheduler.tick_loop().await;
        });

        info!("Scheduler started");
        Ok(())
    }

    /// Non-blocking shutdown: the tick loop exits at its next wakeup;
    /// in-flight executions finish on their own tasks.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        info!("Scheduler shutdown requested");
    }

    /// Rebuild the in-memory cache from every enabled definition. A
    /// definition naming an unregistered function is logged and skipped;
    /// the rest proceed.
    async fn load_jobs_from_database(&self) -> Result<()> {
        let definitions = self.db.enabled_jobs().await?;
        info!(count = definitions.len(), "Loading jobs from database");

        let functions = self.functions.lock().await;
        let mut jobs = self.jobs.lock().await;
        let mut loaded = 0usize;

        for definition in definitions {
            if jobs.contains_key(&definition.job_id) {
                continue;
            }

            let Some(runner) = functions.get(&definition.job_function).cloned() else {
                error!(
                    job_id = %definition.job_id,
                    function = %definition.job_function,
                    "Job references an unregistered function; skipping"
                );
                continue;
            };

            let trigger =
                match Trigger::from_definition(definition.schedule_type, &definition.schedule_value)
                {
                    Ok(trigger) => trigger,
                    Err(e) => {
                        error!(job_id = %definition.job_id, error = %e, "Invalid schedule; skipping");
                        continue;
                    }
                };

            let next_fire = definition
                .next_scheduled_run
                .or_else(|| trigger.next_fire(Utc::now()));

            jobs.insert(
                definition.job_id.clone(),
                ScheduledJob {
                    trigger,
                    runner,
                    next_fire,
                    paused: false,
                    running: Arc::new(AtomicBool::new(false)),
                    definition,
                },
            );
            loaded += 1;
        }

        info!(loaded, "Database job loading complete");
        Ok(())
    }

    /// Execute each overdue definition exactly once, then let the
    /// bookkeeping schedule its next regular run.
    async fn recover_missed_jobs(self: &Arc<Self>) {
        info!("Checking for missed scheduled jobs");

        let overdue = match self.db.overdue_jobs(Utc::now()).await {
            Ok(overdue) => overdue,
            Err(e) => {
                error!(error = %e, "Failed to query overdue jobs");
                return;
            }
        };

        if overdue.is_empty() {
            info!("No missed jobs to recover");
            return;
        }

        info!(count = overdue.len(), "Recovering missed jobs");
        for definition in overdue {
            let job_id = definition.job_id.clone();
            info!(
                %job_id,
                failures = definition.consecutive_failures,
                max = definition.max_consecutive_failures,
                "Recovering missed job"
            );

            let Some((runner, trigger, running)) = self.job_parts(&job_id).await else {
                warn!(%job_id, "Missed job is not loaded; skipping recovery");
                continue;
            };

            self.execute(&job_id, runner, trigger, running).await;
        }
    }

    async fn job_parts(
        &self,
        job_id: &str,
    ) -> Option<(Arc<dyn JobRunner>, Trigger, Arc<AtomicBool>)> {
        let jobs = self.jobs.lock().await;
        jobs.get(job_id).map(|job| {
            (
                Arc::clone(&job.runner),
                job.trigger.clone(),
                Arc::clone(&job.running),
            )
        })
    }

    async fn tick_loop(self: Arc<Self>) {
        let mut shutdown = self.shutdown_rx.clone();

        loop {
            if *shutdown.borrow() {
                info!("Scheduler tick loop exiting");
                return;
            }

            let due = self.collect_due_jobs().await;
            for job_id in due {
                let Some((runner, trigger, running)) = self.job_parts(&job_id).await else {
                    continue;
                };
                let scheduler = Arc::clone(&self);
                tokio::spawn(async move {
                    scheduler.execute(&job_id, runner, trigger, running).await;
                });
            }

            tokio::select! {
                _ = tokio::time::sleep(TICK_INTERVAL) => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    /// Find due jobs and advance their next-fire times. Firings missed
    /// past the grace window coalesce: the fire time advances without an
    /// extra execution.
    async fn collect_due_jobs(&self) -> Vec<String> {
        let now = Utc::now();
        let mut due = Vec::new();
        let mut jobs = self.jobs.lock().await;

        for (job_id, job) in jobs.iter_mut() {
            if job.paused {
                continue;
            }
            let Some(next_fire) = job.next_fire else {
                continue;
            };
            if next_fire > now {
                continue;
            }

            // Advancing from `now` collapses any backlog to one firing.
            job.next_fire = job.trigger.next_fire(now);

            let overdue_secs = (now - next_fire).num_seconds();
            let is_interval = matches!(job.trigger, Trigger::Interval(_));
            if overdue_secs > MISFIRE_GRACE_SECS && is_interval {
                // A long-stalled interval firing is dropped; the next one
                // is already scheduled.
                warn!(%job_id, overdue_secs, "Dropping stale interval firing");
                continue;
            }

            if job.running.load(Ordering::SeqCst) {
                // max_instances=1: the previous run is still going.
                continue;
            }

            due.push(job_id.clone());
        }

        due
    }

    /// Run one job execution with log capture and durable bookkeeping.
    async fn execute(
        &self,
        job_id: &str,
        runner: Arc<dyn JobRunner>,
        trigger: Trigger,
        running: Arc<AtomicBool>,
    ) {
        // At-most-one instance per job id.
        if running.swap(true, Ordering::SeqCst) {
            warn!(job_id, "Skipping firing; previous instance still running");
            return;
        }

        let started_at = Utc::now();
        self.capture.begin(job_id);

        let execution_id = match self.db.start_execution(job_id).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!(error = %e, job_id, "Failed to open execution row");
                None
            }
        };

        let span = info_span!("job_execution", job_id = %job_id);
        let outcome = async {
            info!("Starting job");
            let outcome = runner.run().await;
            match &outcome {
                Ok(()) => info!("Job completed successfully"),
                Err(e) => error!(error = %e, "Job failed"),
            }
            outcome
        }
        .instrument(span)
        .await;

        let logs = self.capture.end(job_id);
        let duration = (Utc::now() - started_at).num_milliseconds() as f64 / 1000.0;
        let success = outcome.is_ok();
        let status = if success {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Failed
        };
        let error_message = outcome.err();

        if let Some(execution_id) = &execution_id {
            if let Err(e) = self
                .db
                .finish_execution(execution_id, status, duration, error_message.as_deref(), &logs)
                .await
            {
                error!(error = %e, job_id, "Failed to close execution row");
            }
        }

        self.history.record(tradewatch_db::JobExecution {
            id: execution_id.unwrap_or_default(),
            job_id: job_id.to_string(),
            status,
            started_at,
            completed_at: Some(Utc::now()),
            duration_seconds: Some(duration),
            error_message: error_message.clone(),
            logs: logs.join("\n"),
            metadata: serde_json::Value::Null,
        });

        let next = trigger.next_fire(Utc::now());
        if let Err(e) = self
            .db
            .update_job_after_execution(job_id, success, next)
            .await
        {
            error!(error = %e, job_id, "Failed to update job bookkeeping");
        }

        // Keep the cached schedule in step with the durable row, so a
        // recovery execution doesn't leave a stale past fire time behind.
        {
            let mut jobs = self.jobs.lock().await;
            if let Some(job) = jobs.get_mut(job_id) {
                job.next_fire = next;
                job.definition.last_run_at = Some(Utc::now());
                job.definition.consecutive_failures = if success {
                    0
                } else {
                    job.definition.consecutive_failures + 1
                };
            }
        }

        running.store(false, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub(crate) fn reset_process_guard() {
        PROCESS_SCHEDULER_STARTED.store(false, Ordering::SeqCst);
    }
}

fn job_info(job: &ScheduledJob) -> JobInfo {
    JobInfo {
        job_id: job.definition.job_id.clone(),
        name: job.definition.job_name.clone(),
        schedule_type: job.definition.schedule_type,
        schedule_value: job.definition.schedule_value.clone(),
        next_run: job.next_fire,
        is_paused: job.paused,
        is_running: job.running.load(Ordering::SeqCst),
        consecutive_failures: job.definition.consecutive_failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::atomic::AtomicUsize;
    use tracing_subscriber::layer::SubscriberExt;

    /// Tests that call `start()` share the process-wide guard, so they
    /// serialize on this lock.
    static START_LOCK: Mutex<()> = Mutex::const_new(());

    struct CountingRunner {
        runs: Arc<AtomicUsize>,
        concurrent: Arc<AtomicUsize>,
        max_concurrent: Arc<AtomicUsize>,
        hold: StdDuration,
        fail: bool,
    }

    impl CountingRunner {
        fn new(hold: StdDuration) -> (Arc<Self>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
            let runs = Arc::new(AtomicUsize::new(0));
            let max_concurrent = Arc::new(AtomicUsize::new(0));
            let runner = Arc::new(Self {
                runs: Arc::clone(&runs),
                concurrent: Arc::new(AtomicUsize::new(0)),
                max_concurrent: Arc::clone(&max_concurrent),
                hold,
                fail: false,
            });
            (runner, runs, max_concurrent)
        }
    }

    #[async_trait]
    impl JobRunner for CountingRunner {
        async fn run(&self) -> std::result::Result<(), String> {
            let live = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent.fetch_max(live, Ordering::SeqCst);
            tokio::time::sleep(self.hold).await;
            self.concurrent.fetch_sub(1, Ordering::SeqCst);
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err("boom".to_string())
            } else {
                Ok(())
            }
        }
    }

    async fn scheduler() -> Arc<Scheduler> {
        let db = TradewatchDb::in_memory().await.unwrap();
        Scheduler::new(db).await
    }

    #[tokio::test]
    async fn test_add_job_requires_registered_function() {
        let scheduler = scheduler().await;
        let err = scheduler
            .add_cron_job("j1", "Job One", "missing_fn", "0 2 * * *", true)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownFunction(_)));
    }

    #[tokio::test]
    async fn test_add_job_persists_definition() {
        let scheduler = scheduler().await;
        let (runner, _, _) = CountingRunner::new(StdDuration::from_millis(1));
        scheduler.register_function("etl", runner).await;
        scheduler
            .add_cron_job("daily_etl", "Daily ETL", "etl", "0 2 * * *", true)
            .await
            .unwrap();

        let definition = scheduler.db.get_job_definition("daily_etl").await.unwrap();
        assert_eq!(definition.schedule_value, "0 2 * * *");
        assert!(definition.enabled);
        assert!(definition.next_scheduled_run.is_some());

        let info = scheduler.get_job_info("daily_etl").await.unwrap();
        assert_eq!(info.schedule_type, ScheduleType::Cron);
        assert!(!info.is_paused);
    }

    #[tokio::test]
    async fn test_at_most_one_instance_under_fast_interval() {
        let _start = START_LOCK.lock().await;
        Scheduler::reset_process_guard();
        let scheduler = scheduler().await;
        // Each run holds longer than the firing interval.
        let (runner, runs, max_concurrent) =
            CountingRunner::new(StdDuration::from_millis(150));
        scheduler.register_function("slow", runner).await;
        scheduler
            .add_interval_job("slow_job", "Slow", "slow", 0, 0, 1, true)
            .await
            .unwrap();
        scheduler.run_job_now("slow_job").await.unwrap();

        scheduler.start().await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(1200)).await;
        scheduler.shutdown();

        assert!(runs.load(Ordering::SeqCst) >= 1);
        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
        Scheduler::reset_process_guard();
    }

    #[tokio::test]
    async fn test_missed_job_recovery_runs_exactly_once() {
        let _start = START_LOCK.lock().await;
        Scheduler::reset_process_guard();
        let db = TradewatchDb::in_memory().await.unwrap();

        // A definition whose next run was yesterday at 02:00.
        let now = Utc::now();
        let definition = JobDefinition {
            job_id: "daily_etl".to_string(),
            job_name: "Daily ETL".to_string(),
            job_function: "etl".to_string(),
            schedule_type: ScheduleType::Cron,
            schedule_value: "0 2 * * *".to_string(),
            enabled: true,
            last_run_at: None,
            next_scheduled_run: Some(now - Duration::hours(30)),
            consecutive_failures: 0,
            max_consecutive_failures: 3,
            auto_retry_on_startup: true,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        };
        db.upsert_job_definition(&definition).await.unwrap();

        let scheduler = Scheduler::new(db.clone()).await;
        let (runner, runs, _) = CountingRunner::new(StdDuration::from_millis(1));
        scheduler.register_function("etl", runner).await;

        scheduler.start().await.unwrap();
        // Recovery happens during start; give the bookkeeping a moment.
        tokio::time::sleep(StdDuration::from_millis(100)).await;
        scheduler.shutdown();

        // Exactly one recovery execution, not one per missed firing.
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let updated = db.get_job_definition("daily_etl").await.unwrap();
        assert_eq!(updated.consecutive_failures, 0);
        assert!(updated.last_run_at.is_some());
        let next = updated.next_scheduled_run.unwrap();
        assert!(next > now, "next run must be in the future, got {next}");

        let executions = db.executions_for_job("daily_etl", 10).await.unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].status, ExecutionStatus::Success);
        Scheduler::reset_process_guard();
    }

    #[tokio::test]
    async fn test_unknown_function_skips_job_but_loads_others() {
        let _start = START_LOCK.lock().await;
        Scheduler::reset_process_guard();
        let db = TradewatchDb::in_memory().await.unwrap();
        let now = Utc::now();

        for (job_id, function) in [("good", "etl"), ("orphan", "gone_fn")] {
            let definition = JobDefinition {
                job_id: job_id.to_string(),
                job_name: job_id.to_string(),
                job_function: function.to_string(),
                schedule_type: ScheduleType::Interval,
                schedule_value: "3600".to_string(),
                enabled: true,
                last_run_at: None,
                next_scheduled_run: Some(now + Duration::hours(1)),
                consecutive_failures: 0,
                max_consecutive_failures: 3,
                auto_retry_on_startup: false,
                metadata: serde_json::json!({}),
                created_at: now,
                updated_at: now,
            };
            db.upsert_job_definition(&definition).await.unwrap();
        }

        let scheduler = Scheduler::new(db).await;
        let (runner, _, _) = CountingRunner::new(StdDuration::from_millis(1));
        scheduler.register_function("etl", runner).await;
        scheduler.start().await.unwrap();
        scheduler.shutdown();

        let jobs = scheduler.get_jobs().await;
        let ids: Vec<_> = jobs.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(ids, vec!["good"]);
        Scheduler::reset_process_guard();
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let scheduler = scheduler().await;
        let (runner, _, _) = CountingRunner::new(StdDuration::from_millis(1));
        scheduler.register_function("etl", runner).await;
        scheduler
            .add_interval_job("job", "Job", "etl", 1, 0, 0, true)
            .await
            .unwrap();

        scheduler.pause_job("job").await.unwrap();
        assert!(scheduler.get_job_info("job").await.unwrap().is_paused);
        assert!(!scheduler.db.get_job_definition("job").await.unwrap().enabled);

        scheduler.resume_job("job").await.unwrap();
        assert!(!scheduler.get_job_info("job").await.unwrap().is_paused);
        assert!(scheduler.db.get_job_definition("job").await.unwrap().enabled);
    }

    #[tokio::test]
    async fn test_captured_logs_land_in_execution_row() {
        Scheduler::reset_process_guard();

        struct LoggingRunner;
        #[async_trait]
        impl JobRunner for LoggingRunner {
            async fn run(&self) -> std::result::Result<(), String> {
                tracing::info!("hello from the job");
                Ok(())
            }
        }

        let db = TradewatchDb::in_memory().await.unwrap();
        let scheduler = Scheduler::new(db.clone()).await;
        scheduler.register_function("noisy", Arc::new(LoggingRunner)).await;
        scheduler
            .add_interval_job("noisy_job", "Noisy", "noisy", 1, 0, 0, true)
            .await
            .unwrap();

        // Install the capture layer for this test's subscriber.
        let subscriber = tracing_subscriber::registry().with(scheduler.log_layer());
        let _guard = tracing::subscriber::set_default(subscriber);

        let (runner, trigger, running) = scheduler.job_parts("noisy_job").await.unwrap();
        scheduler.execute("noisy_job", runner, trigger, running).await;

        let executions = db.executions_for_job("noisy_job", 10).await.unwrap();
        assert_eq!(executions.len(), 1);
        assert!(executions[0].logs.contains("hello from the job"));
        assert_eq!(executions[0].status, ExecutionStatus::Success);
        Scheduler::reset_process_guard();
    }
}

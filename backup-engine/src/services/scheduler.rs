//! Recurring backup triggers, one per active config.

use crate::db::connection::with_conn;
use crate::error::{EngineError, Result};
use crate::models::backup_config::{self, BackupConfig};
use crate::services::session;
use crate::state::AppState;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};

pub struct BackupScheduler {
    scheduler: Mutex<JobScheduler>,
    /// Maps config id to its scheduler job id; at most one handle per config.
    handles: DashMap<String, uuid::Uuid>,
    state: Arc<AppState>,
}

impl BackupScheduler {
    pub async fn new(state: Arc<AppState>) -> Result<Self> {
        let scheduler = JobScheduler::new().await.map_err(sched_err)?;
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            handles: DashMap::new(),
            state,
        })
    }

    /// Register the recurring trigger for a config, replacing any existing
    /// handle for the same config id. Manual and inactive configs are
    /// rejected and end up with no handle.
    pub async fn activate(&self, config: &BackupConfig) -> Result<()> {
        if config.is_active == 0 {
            self.deactivate(&config.id).await?;
            return Err(EngineError::InvalidSchedule(format!(
                "config {} is inactive",
                config.id
            )));
        }

        let cron = cron_expression(&config.schedule_type, config.schedule_time.as_deref())?;

        // No duplicate timers: drop the old handle before adding the new one.
        if let Some((_, old)) = self.handles.remove(&config.id) {
            self.scheduler.lock().await.remove(&old).await.map_err(sched_err)?;
            tracing::info!(config_id = %config.id, "Replaced existing schedule");
        }

        let state = self.state.clone();
        let cid = config.id.clone();
        let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
            let state = state.clone();
            let cid = cid.clone();
            Box::pin(async move {
                run_scheduled(state, cid).await;
            })
        })
        .map_err(sched_err)?;

        let job_id = self.scheduler.lock().await.add(job).await.map_err(sched_err)?;
        self.handles.insert(config.id.clone(), job_id);
        tracing::info!(config_id = %config.id, cron = %cron, "Schedule activated");
        Ok(())
    }

    /// Cancel and remove the handle for a config; no-op when none exists.
    pub async fn deactivate(&self, config_id: &str) -> Result<()> {
        if let Some((_, job_id)) = self.handles.remove(config_id) {
            self.scheduler.lock().await.remove(&job_id).await.map_err(sched_err)?;
            tracing::info!(config_id = %config_id, "Schedule deactivated");
        }
        Ok(())
    }

    /// Snapshot of the config ids that currently own a timer.
    pub fn list_active(&self) -> Vec<String> {
        self.handles.iter().map(|e| e.key().clone()).collect()
    }

    /// Activate every stored config that wants a timer. Called at startup.
    pub async fn init_schedules(&self) -> Result<()> {
        let configs = with_conn(&self.state.db, backup_config::find_schedulable).await?;

        let mut count = 0;
        for config in configs {
            if let Err(e) = self.activate(&config).await {
                tracing::error!(config_id = %config.id, error = %e, "Failed to activate schedule");
            } else {
                count += 1;
            }
        }

        tracing::info!(count, "Schedules initialized");
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        self.scheduler.lock().await.start().await.map_err(sched_err)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.scheduler.lock().await.shutdown().await.map_err(sched_err)
    }
}

async fn run_scheduled(state: Arc<AppState>, config_id: String) {
    // Re-fetch so edits and deletions made after activation are honored.
    let config = {
        let cid = config_id.clone();
        match with_conn(&state.db, move |conn| backup_config::find_by_id(conn, &cid)).await {
            Ok(Some(config)) => config,
            Ok(None) => {
                tracing::warn!(config_id = %config_id, "Skipping scheduled run: config deleted");
                return;
            }
            Err(e) => {
                tracing::error!(config_id = %config_id, error = %e, "Skipping scheduled run: config lookup failed");
                return;
            }
        }
    };
    if config.is_active == 0 {
        tracing::info!(config_id = %config_id, "Skipping scheduled run: config deactivated");
        return;
    }

    let Some(password) = state.secrets.resolve(&config_id) else {
        let e = EngineError::CredentialMissing(config_id.clone());
        tracing::error!(config_id = %config_id, error = %e, "Skipping scheduled run");
        return;
    };

    tracing::info!(config_id = %config_id, name = %config.name, "Starting scheduled backup");
    match session::perform_backup(&state, &config_id, &password).await {
        Ok(result) => tracing::info!(
            config_id = %config_id,
            files = result.files_backed_up,
            status = %result.status,
            "Scheduled backup finished"
        ),
        Err(EngineError::RunInProgress(_)) => {
            tracing::warn!(config_id = %config_id, "Skipping scheduled run: another run is active");
        }
        Err(e) => tracing::error!(config_id = %config_id, error = %e, "Scheduled backup failed"),
    }
}

fn sched_err(e: tokio_cron_scheduler::JobSchedulerError) -> EngineError {
    EngineError::Internal(anyhow::anyhow!(e))
}

/// Map a config's schedule to a cron expression (seconds field included).
/// Weekly backups are pinned to Sunday.
fn cron_expression(schedule_type: &str, schedule_time: Option<&str>) -> Result<String> {
    match schedule_type {
        "hourly" => Ok("0 0 * * * *".to_string()),
        "daily" => {
            let (hour, minute) = parse_schedule_time(schedule_time)?;
            Ok(format!("0 {minute} {hour} * * *"))
        }
        "weekly" => {
            let (hour, minute) = parse_schedule_time(schedule_time)?;
            Ok(format!("0 {minute} {hour} * * Sun"))
        }
        other => Err(EngineError::InvalidSchedule(format!(
            "schedule type '{other}' does not take a timer"
        ))),
    }
}

fn parse_schedule_time(time: Option<&str>) -> Result<(u32, u32)> {
    let time = time.ok_or_else(|| {
        EngineError::InvalidSchedule("schedule time is required for daily/weekly backups".into())
    })?;
    let (h, m) = time.split_once(':').ok_or_else(|| {
        EngineError::InvalidSchedule(format!("schedule time '{time}' is not HH:MM"))
    })?;
    let hour: u32 = h
        .parse()
        .map_err(|_| EngineError::InvalidSchedule(format!("schedule time '{time}' is not HH:MM")))?;
    let minute: u32 = m
        .parse()
        .map_err(|_| EngineError::InvalidSchedule(format!("schedule time '{time}' is not HH:MM")))?;
    if hour > 23 || minute > 59 {
        return Err(EngineError::InvalidSchedule(format!(
            "schedule time '{time}' is out of range"
        )));
    }
    Ok((hour, minute))
}

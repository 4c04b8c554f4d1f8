//! In-memory task table.
//!
//! A read-write lock guards the map itself; each entry carries its own
//! mutex so per-task mutation never blocks unrelated tasks. Lifecycle
//! transitions are validated at the entry, under its lock, which makes the
//! forward-only state machine atomic per task.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    classify::PipelineKind,
    config::ProgressConfig,
    progress::ProgressStream,
    registry::{
        error::{
            RegistryError, invalid_transition, report_conflict, terminal_task, unknown_task,
        },
        types::{TaskFailure, TaskId, TaskSnapshot, TaskStatus},
    },
    verdict::types::Report,
};

struct TaskEntry {
    status: TaskStatus,
    pipeline_kind: Option<PipelineKind>,
    report: Option<Arc<Report>>,
    failure: Option<TaskFailure>,
    created_at: OffsetDateTime,
    terminal_at: Option<OffsetDateTime>,
    progress: Arc<ProgressStream>,
}

pub struct TaskRegistry {
    progress_config: ProgressConfig,
    state: RwLock<HashMap<TaskId, Arc<Mutex<TaskEntry>>>>,
}

impl TaskRegistry {
    pub fn new(progress_config: ProgressConfig) -> Self {
        Self {
            progress_config,
            state: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new PENDING task and hand back its progress stream.
    pub fn create(&self) -> (TaskId, Arc<ProgressStream>) {
        let task_id = Uuid::now_v7().to_string();
        let progress = Arc::new(ProgressStream::new(
            self.progress_config.live_buffer,
            self.progress_config.replay_retention,
        ));
        let entry = TaskEntry {
            status: TaskStatus::Pending,
            pipeline_kind: None,
            report: None,
            failure: None,
            created_at: OffsetDateTime::now_utc(),
            terminal_at: None,
            progress: Arc::clone(&progress),
        };
        self.state
            .write()
            .expect("lock poisoned")
            .insert(task_id.clone(), Arc::new(Mutex::new(entry)));
        tracing::info!(target: "registry", task_id, "task_created");
        (task_id, progress)
    }

    fn entry(&self, task_id: &str) -> Result<Arc<Mutex<TaskEntry>>, RegistryError> {
        self.state
            .read()
            .expect("lock poisoned")
            .get(task_id)
            .cloned()
            .ok_or_else(|| unknown_task(task_id))
    }

    pub fn progress(&self, task_id: &str) -> Result<Arc<ProgressStream>, RegistryError> {
        let entry = self.entry(task_id)?;
        let entry = entry.lock().expect("lock poisoned");
        Ok(Arc::clone(&entry.progress))
    }

    pub fn snapshot(&self, task_id: &str) -> Result<TaskSnapshot, RegistryError> {
        let entry = self.entry(task_id)?;
        let entry = entry.lock().expect("lock poisoned");
        Ok(TaskSnapshot {
            task_id: task_id.to_string(),
            status: entry.status,
            pipeline_kind: entry.pipeline_kind,
            failure: entry.failure.clone(),
            created_at: entry.created_at,
            terminal_at: entry.terminal_at,
        })
    }

    pub fn transition(&self, task_id: &str, next: TaskStatus) -> Result<(), RegistryError> {
        let entry = self.entry(task_id)?;
        let mut entry = entry.lock().expect("lock poisoned");
        if !entry.status.is_valid_transition(next) {
            tracing::error!(
                target: "registry",
                task_id,
                from = entry.status.as_str(),
                to = next.as_str(),
                "invalid_transition_rejected"
            );
            return Err(invalid_transition(format!(
                "task {task_id} cannot move from {} to {}",
                entry.status.as_str(),
                next.as_str()
            )));
        }
        tracing::debug!(
            target: "registry",
            task_id,
            from = entry.status.as_str(),
            to = next.as_str(),
            "task_transitioned"
        );
        entry.status = next;
        if next.is_terminal() {
            entry.terminal_at = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }

    pub fn set_pipeline_kind(
        &self,
        task_id: &str,
        kind: PipelineKind,
    ) -> Result<(), RegistryError> {
        let entry = self.entry(task_id)?;
        let mut entry = entry.lock().expect("lock poisoned");
        entry.pipeline_kind = Some(kind);
        Ok(())
    }

    /// Force the task to ERROR from any non-terminal state.
    pub fn mark_failed(&self, task_id: &str, failure: TaskFailure) -> Result<(), RegistryError> {
        let entry = self.entry(task_id)?;
        let mut entry = entry.lock().expect("lock poisoned");
        if entry.status.is_terminal() {
            return Err(terminal_task(format!(
                "task {task_id} already ended as {}",
                entry.status.as_str()
            )));
        }
        tracing::warn!(
            target: "registry",
            task_id,
            from = entry.status.as_str(),
            kind = failure.kind.as_str(),
            reason = %failure.reason,
            "task_failed"
        );
        entry.status = TaskStatus::Error;
        entry.failure = Some(failure);
        entry.terminal_at = Some(OffsetDateTime::now_utc());
        Ok(())
    }

    /// Attach the final report and complete the task in one step, so no
    /// observer can see COMPLETE without a report.
    pub fn attach_report(&self, task_id: &str, report: Arc<Report>) -> Result<(), RegistryError> {
        let entry = self.entry(task_id)?;
        let mut entry = entry.lock().expect("lock poisoned");
        if entry.report.is_some() {
            return Err(report_conflict(format!(
                "task {task_id} already carries a report"
            )));
        }
        if !entry.status.is_valid_transition(TaskStatus::Complete) {
            return Err(invalid_transition(format!(
                "task {task_id} cannot complete from {}",
                entry.status.as_str()
            )));
        }
        entry.report = Some(report);
        entry.status = TaskStatus::Complete;
        entry.terminal_at = Some(OffsetDateTime::now_utc());
        tracing::info!(target: "registry", task_id, "task_completed");
        Ok(())
    }

    pub fn report(&self, task_id: &str) -> Result<Option<Arc<Report>>, RegistryError> {
        let entry = self.entry(task_id)?;
        let entry = entry.lock().expect("lock poisoned");
        Ok(entry.report.clone())
    }

    pub fn remove(&self, task_id: &str) -> Result<(), RegistryError> {
        let removed = self
            .state
            .write()
            .expect("lock poisoned")
            .remove(task_id)
            .is_some();
        if removed {
            tracing::info!(target: "registry", task_id, "task_removed");
            Ok(())
        } else {
            Err(unknown_task(task_id))
        }
    }

    /// Terminal tasks whose terminal timestamp is older than `ttl`.
    pub fn expired(&self, ttl: Duration) -> Vec<TaskId> {
        let cutoff = OffsetDateTime::now_utc() - ttl;
        let state = self.state.read().expect("lock poisoned");
        state
            .iter()
            .filter(|(_, entry)| {
                let entry = entry.lock().expect("lock poisoned");
                entry
                    .terminal_at
                    .is_some_and(|terminal_at| terminal_at <= cutoff)
            })
            .map(|(task_id, _)| task_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Write-once report storage.
//!
//! Reports are immutable: the first put wins and any rewrite attempt is a
//! conflict. The in-memory store backs single-process deployments; hosts
//! with durability needs implement [`ReportStore`] themselves.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::verdict::types::Report;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("report for task {0} already stored")]
    Conflict(String),
    #[error("no report stored for task {0}")]
    NotFound(String),
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Store a report; fails with [`StoreError::Conflict`] if one exists.
    async fn put(&self, report: Arc<Report>) -> Result<(), StoreError>;
    async fn get(&self, task_id: &str) -> Result<Arc<Report>, StoreError>;
    /// Remove a report; absent entries purge cleanly.
    async fn purge(&self, task_id: &str) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct InMemoryReportStore {
    reports: RwLock<HashMap<String, Arc<Report>>>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn put(&self, report: Arc<Report>) -> Result<(), StoreError> {
        let mut reports = self.reports.write().await;
        if reports.contains_key(&report.task_id) {
            return Err(StoreError::Conflict(report.task_id.clone()));
        }
        reports.insert(report.task_id.clone(), report);
        Ok(())
    }

    async fn get(&self, task_id: &str) -> Result<Arc<Report>, StoreError> {
        self.reports
            .read()
            .await
            .get(task_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))
    }

    async fn purge(&self, task_id: &str) -> Result<(), StoreError> {
        self.reports.write().await.remove(task_id);
        Ok(())
    }
}

use thiserror::Error;
use tracing::error;

use farmhand_core::types::DashboardSummary;
use farmhand_core::IpcReply;
use farmhand_storage::{ActivityLogError, DashboardError, Database};

/// Builds the read model shown on the dashboard screen.
#[derive(Clone)]
pub struct DashboardService {
    database: Database,
    activity_limit: u32,
}

impl DashboardService {
    pub fn new(database: Database, activity_limit: u32) -> Self {
        Self {
            database,
            activity_limit,
        }
    }

    pub async fn summary(&self) -> IpcReply<DashboardSummary> {
        match self.load().await {
            Ok(summary) => IpcReply::success("Dashboard data retrieved successfully", summary),
            Err(err) => {
                error!(stage = "ipc", error = %err, "failed to load dashboard");
                IpcReply::internal(format!("Failed to load dashboard: {err}"))
            }
        }
    }

    async fn load(&self) -> Result<DashboardSummary, DashboardLoadError> {
        let stats = self.database.dashboard();
        let (workers, financial, assignments) = tokio::try_join!(
            stats.worker_stats(),
            stats.financial_stats(),
            stats.assignment_stats(),
        )?;
        let live_activity = self
            .database
            .activities()
            .list_recent(self.activity_limit)
            .await?;

        Ok(DashboardSummary {
            workers,
            financial,
            assignments,
            live_activity,
        })
    }
}

#[derive(Debug, Error)]
pub enum DashboardLoadError {
    #[error("failed to aggregate statistics: {0}")]
    Stats(#[from] DashboardError),
    #[error("failed to load recent activity: {0}")]
    Activity(#[from] ActivityLogError),
}

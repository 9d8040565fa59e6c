use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A laborer registered on the farm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub status: WorkerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hire_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Employment status persisted on the worker row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerStatus {
    #[default]
    Active,
    Inactive,
    OnLeave,
    Terminated,
}

impl WorkerStatus {
    /// Returns the canonical database representation for the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::OnLeave => "on-leave",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown worker status: {0}")]
pub struct UnknownWorkerStatus(pub String);

impl FromStr for WorkerStatus {
    type Err = UnknownWorkerStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "on-leave" => Ok(Self::OnLeave),
            "terminated" => Ok(Self::Terminated),
            other => Err(UnknownWorkerStatus(other.to_string())),
        }
    }
}

impl Serialize for WorkerStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for WorkerStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        WorkerStatus::from_str(&value).map_err(D::Error::custom)
    }
}

/// Append-only audit record attributed to a user of the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActivity {
    pub id: i64,
    pub user_id: Option<i64>,
    pub action: String,
    pub description: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Action tags written to the activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityAction {
    CreateWorker,
    DeleteWorker,
}

impl ActivityAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateWorker => "create_worker",
            Self::DeleteWorker => "delete_worker",
        }
    }
}

/// Origin of an IPC request, recorded on audit rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub ip_address: String,
    pub user_agent: String,
}

/// Payload returned after a worker has been removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedWorker {
    pub id: i64,
}

/// Payload returned by the bulk delete workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedWorkers {
    pub deleted: Vec<i64>,
}

/// Read model backing the dashboard screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub workers: WorkerStats,
    pub financial: FinancialStats,
    pub assignments: AssignmentStats,
    pub live_activity: Vec<UserActivity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStats {
    pub total: u64,
    pub active: u64,
    pub inactive: u64,
    pub on_leave: u64,
    pub terminated: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialStats {
    pub total_debt: f64,
    pub outstanding_balance: f64,
    pub workers_with_pending_debt: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentStats {
    pub total: u64,
    pub active: u64,
    pub completed: u64,
    pub cancelled: u64,
}

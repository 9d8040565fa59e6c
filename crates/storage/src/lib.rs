use std::{str::FromStr, time::Duration};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::{
    migrate::MigrateError,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    Row, Sqlite, SqlitePool, Transaction,
};
use thiserror::Error;
use tracing::info;

use farmhand_core::types::{
    AssignmentStats, FinancialStats, UnknownWorkerStatus, UserActivity, Worker, WorkerStats,
    WorkerStatus,
};

const MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the SQLite database behind `database_url`.
    ///
    /// Foreign keys, WAL and the busy timeout are set on every pooled
    /// connection so cascade rules hold regardless of which connection a
    /// transaction lands on.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(StorageError::Connect)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(StorageError::Connect)?;

        info!(stage = "storage", max_connections = MAX_CONNECTIONS, "sqlite pool ready");
        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Begins a transaction on a pooled connection.
    ///
    /// The connection goes back to the pool when the transaction is committed,
    /// rolled back or dropped; dropping without commit rolls back.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Returns a handle for worker rows.
    pub fn workers(&self) -> WorkerRepository {
        WorkerRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for the user activity log.
    pub fn activities(&self) -> UserActivityRepository {
        UserActivityRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for the aggregate queries behind the dashboard.
    pub fn dashboard(&self) -> DashboardRepository {
        DashboardRepository {
            pool: self.pool.clone(),
        }
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

const SELECT_WORKER: &str =
    "SELECT id, name, contact, address, status, hire_date, created_at, updated_at \
     FROM workers WHERE id = ?";
const DELETE_WORKER: &str = "DELETE FROM workers WHERE id = ? \
     RETURNING id, name, contact, address, status, hire_date, created_at, updated_at";

/// Repository for the `workers` table.
#[derive(Clone)]
pub struct WorkerRepository {
    pool: SqlitePool,
}

impl WorkerRepository {
    /// Loads a worker outside of any transaction.
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Worker>, WorkerRepositoryError> {
        let row = sqlx::query_as::<_, WorkerRow>(SELECT_WORKER)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(WorkerRow::into_domain).transpose()
    }

    /// Inserts a worker and returns the stored row.
    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        worker: &NewWorker<'_>,
    ) -> Result<Worker, WorkerRepositoryError> {
        let created_at = to_rfc3339(worker.created_at);
        let row = sqlx::query(
            "INSERT INTO workers (name, contact, address, status, hire_date, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             RETURNING id",
        )
        .bind(worker.name)
        .bind(worker.contact)
        .bind(worker.address)
        .bind(worker.status.as_str())
        .bind(worker.hire_date)
        .bind(&created_at)
        .bind(&created_at)
        .fetch_one(&mut **tx)
        .await?;

        let id: i64 = row.get("id");
        Ok(Worker {
            id,
            name: worker.name.to_string(),
            contact: worker.contact.map(str::to_string),
            address: worker.address.map(str::to_string),
            status: worker.status,
            hire_date: worker.hire_date,
            created_at: worker.created_at,
            updated_at: worker.created_at,
        })
    }

    /// Removes a worker and returns the row as it was before removal, or
    /// `None` when no row matched. Dependent rows go with it through
    /// `ON DELETE CASCADE`.
    ///
    /// The delete is a single statement so that, as the first statement of a
    /// deferred transaction, it takes the write lock through the busy
    /// handler. Reading first and upgrading later fails with `SQLITE_BUSY`
    /// under a concurrent writer.
    pub async fn delete(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: i64,
    ) -> Result<Option<Worker>, WorkerRepositoryError> {
        let row = sqlx::query_as::<_, WorkerRow>(DELETE_WORKER)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        row.map(WorkerRow::into_domain).transpose()
    }
}

/// Parameters required to insert a worker.
pub struct NewWorker<'a> {
    pub name: &'a str,
    pub contact: Option<&'a str>,
    pub address: Option<&'a str>,
    pub status: WorkerStatus,
    pub hire_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

/// Raw worker row as stored in SQLite.
#[derive(Debug, sqlx::FromRow)]
pub struct WorkerRow {
    pub id: i64,
    pub name: String,
    pub contact: Option<String>,
    pub address: Option<String>,
    pub status: String,
    pub hire_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkerRow {
    /// Converts the database row into the domain worker.
    pub fn into_domain(self) -> Result<Worker, WorkerRepositoryError> {
        let status = self
            .status
            .parse()
            .map_err(|source| WorkerRepositoryError::UnknownStatus {
                id: self.id,
                source,
            })?;
        Ok(Worker {
            id: self.id,
            name: self.name,
            contact: self.contact,
            address: self.address,
            status,
            hire_date: self.hire_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Errors that can occur while reading or mutating workers.
#[derive(Debug, Error)]
pub enum WorkerRepositoryError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("worker {id} has {source}")]
    UnknownStatus {
        id: i64,
        #[source]
        source: UnknownWorkerStatus,
    },
}

/// Repository for the append-only `user_activities` table.
#[derive(Clone)]
pub struct UserActivityRepository {
    pool: SqlitePool,
}

impl UserActivityRepository {
    /// Appends an activity record inside the caller's transaction.
    pub async fn append(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        record: &NewUserActivity<'_>,
    ) -> Result<i64, ActivityLogError> {
        let row = sqlx::query(
            "INSERT INTO user_activities (user_id, action, description, ip_address, user_agent, created_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             RETURNING id",
        )
        .bind(record.user_id)
        .bind(record.action)
        .bind(&record.description)
        .bind(record.ip_address)
        .bind(record.user_agent)
        .bind(to_rfc3339(record.created_at))
        .fetch_one(&mut **tx)
        .await?;

        Ok(row.get("id"))
    }

    /// Lists the most recent activities, newest first.
    pub async fn list_recent(&self, limit: u32) -> Result<Vec<UserActivity>, ActivityLogError> {
        let rows = sqlx::query_as::<_, UserActivityRow>(
            "SELECT id, user_id, action, description, ip_address, user_agent, created_at \
             FROM user_activities \
             ORDER BY created_at DESC, id DESC \
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UserActivityRow::into_domain).collect())
    }
}

/// Payload required to append an activity record.
pub struct NewUserActivity<'a> {
    pub user_id: Option<i64>,
    pub action: &'a str,
    pub description: String,
    pub ip_address: &'a str,
    pub user_agent: &'a str,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct UserActivityRow {
    id: i64,
    user_id: Option<i64>,
    action: String,
    description: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
}

impl UserActivityRow {
    fn into_domain(self) -> UserActivity {
        UserActivity {
            id: self.id,
            user_id: self.user_id,
            action: self.action,
            description: self.description,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            created_at: self.created_at,
        }
    }
}

/// Errors that can occur while writing or reading the activity log.
#[derive(Debug, Error)]
pub enum ActivityLogError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Aggregate queries feeding the dashboard widgets.
#[derive(Clone)]
pub struct DashboardRepository {
    pool: SqlitePool,
}

impl DashboardRepository {
    pub async fn worker_stats(&self) -> Result<WorkerStats, DashboardError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, \
                    COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0) AS active, \
                    COALESCE(SUM(CASE WHEN status = 'inactive' THEN 1 ELSE 0 END), 0) AS inactive, \
                    COALESCE(SUM(CASE WHEN status = 'on-leave' THEN 1 ELSE 0 END), 0) AS on_leave, \
                    COALESCE(SUM(CASE WHEN status = 'terminated' THEN 1 ELSE 0 END), 0) AS terminated \
               FROM workers",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(WorkerStats {
            total: count(&row, "total"),
            active: count(&row, "active"),
            inactive: count(&row, "inactive"),
            on_leave: count(&row, "on_leave"),
            terminated: count(&row, "terminated"),
        })
    }

    pub async fn financial_stats(&self) -> Result<FinancialStats, DashboardError> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(amount), 0.0) AS total_debt, \
                    COALESCE(SUM(balance), 0.0) AS outstanding_balance, \
                    COUNT(DISTINCT CASE WHEN status != 'paid' THEN worker_id END) AS pending_workers \
               FROM worker_debts",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(FinancialStats {
            total_debt: row.get("total_debt"),
            outstanding_balance: row.get("outstanding_balance"),
            workers_with_pending_debt: count(&row, "pending_workers"),
        })
    }

    pub async fn assignment_stats(&self) -> Result<AssignmentStats, DashboardError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, \
                    COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0) AS active, \
                    COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0) AS completed, \
                    COALESCE(SUM(CASE WHEN status = 'cancelled' THEN 1 ELSE 0 END), 0) AS cancelled \
               FROM assignments",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(AssignmentStats {
            total: count(&row, "total"),
            active: count(&row, "active"),
            completed: count(&row, "completed"),
            cancelled: count(&row, "cancelled"),
        })
    }
}

fn count(row: &sqlx::sqlite::SqliteRow, column: &str) -> u64 {
    let value: i64 = row.get(column);
    value.max(0) as u64
}

/// Errors that can occur while aggregating dashboard data.
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use metrics::counter;
use serde::Deserialize;
use serde_json::Value;
use sqlx::{Sqlite, Transaction};
use thiserror::Error;
use tracing::{error, info, warn};

use farmhand_core::types::{
    ActivityAction, DeletedWorker, DeletedWorkers, RequestContext, Worker, WorkerStatus,
};
use farmhand_core::IpcReply;
use farmhand_storage::{
    ActivityLogError, Database, NewUserActivity, NewWorker, WorkerRepositoryError,
};

const WORKER_ID_REQUIRED: &str = "Worker ID is required";
const WORKER_ID_INVALID: &str = "Invalid worker ID";
const WORKER_NOT_FOUND: &str = "Worker not found";

/// Parameters of `worker:delete` and `worker:getById`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteWorkerParams {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(rename = "_userId", default)]
    pub user_id: Option<Value>,
}

/// Parameters of `worker:create`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkerParams {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub hire_date: Option<String>,
    #[serde(rename = "_userId", default)]
    pub user_id: Option<Value>,
}

/// Parameters of `worker:bulkDelete`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkDeleteParams {
    #[serde(default)]
    pub ids: Vec<Value>,
    #[serde(rename = "_userId", default)]
    pub user_id: Option<Value>,
}

/// Identifier as received over IPC, where the UI may send numbers or strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdInput {
    Missing,
    Invalid,
    Valid(i64),
}

fn parse_id(value: Option<&Value>) -> IdInput {
    match value {
        None | Some(Value::Null) => IdInput::Missing,
        Some(Value::Number(number)) => number.as_i64().map_or(IdInput::Invalid, IdInput::Valid),
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                IdInput::Missing
            } else {
                trimmed.parse().map_or(IdInput::Invalid, IdInput::Valid)
            }
        }
        Some(_) => IdInput::Invalid,
    }
}

fn parse_user_id(value: Option<&Value>) -> Option<i64> {
    match parse_id(value) {
        IdInput::Valid(id) => Some(id),
        IdInput::Missing | IdInput::Invalid => None,
    }
}

fn require_worker_id(value: Option<&Value>) -> Result<i64, &'static str> {
    match parse_id(value) {
        IdInput::Valid(id) => Ok(id),
        IdInput::Missing => Err(WORKER_ID_REQUIRED),
        IdInput::Invalid => Err(WORKER_ID_INVALID),
    }
}

fn id_label(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Worker fields that passed validation.
#[derive(Debug, Clone)]
struct WorkerDraft {
    name: String,
    contact: Option<String>,
    address: Option<String>,
    status: WorkerStatus,
    hire_date: Option<NaiveDate>,
}

impl WorkerDraft {
    fn from_params(params: &CreateWorkerParams) -> Result<Self, &'static str> {
        let name = params
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or("Worker name is required")?;

        let status = match non_blank(params.status.as_deref()) {
            Some(raw) => raw
                .parse::<WorkerStatus>()
                .map_err(|_| "Invalid worker status")?,
            None => WorkerStatus::default(),
        };

        let hire_date = match non_blank(params.hire_date.as_deref()) {
            Some(raw) => Some(
                NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| "Invalid hire date")?,
            ),
            None => None,
        };

        Ok(Self {
            name: name.to_string(),
            contact: non_blank(params.contact.as_deref()).map(str::to_string),
            address: non_blank(params.address.as_deref()).map(str::to_string),
            status,
            hire_date,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// A validated mutation applied to the workers table together with its
/// activity log entry.
enum Mutation<'a> {
    Create(&'a WorkerDraft),
    Delete { worker_id: i64 },
}

/// Who performed a mutation and from where.
struct Actor<'a> {
    user_id: Option<i64>,
    context: &'a RequestContext,
}

/// Worker IPC handlers.
///
/// Every mutating handler takes an optional caller-owned transaction. With
/// `None` the handler opens, commits or rolls back, and releases its own
/// transaction; with `Some` it only issues statements and leaves commit,
/// rollback and release to the caller.
#[derive(Clone)]
pub struct WorkerService {
    database: Database,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl WorkerService {
    pub fn new(database: Database, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        Self { database, clock }
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Removes a worker and records a `delete_worker` activity atomically.
    pub async fn delete_worker(
        &self,
        params: &DeleteWorkerParams,
        context: &RequestContext,
        tx: Option<&mut Transaction<'_, Sqlite>>,
    ) -> IpcReply<DeletedWorker> {
        let worker_id = match require_worker_id(params.id.as_ref()) {
            Ok(id) => id,
            Err(message) => return IpcReply::validation(message),
        };
        let actor = Actor {
            user_id: parse_user_id(params.user_id.as_ref()),
            context,
        };
        let owned = tx.is_none();

        match self
            .execute(&Mutation::Delete { worker_id }, &actor, tx)
            .await
        {
            Ok(worker) => {
                info!(
                    stage = "ipc",
                    worker_id = worker.id,
                    user_id = ?actor.user_id,
                    owned_tx = owned,
                    "worker deleted"
                );
                if owned {
                    counter!("worker_mutations_total", "action" => ActivityAction::DeleteWorker.as_str())
                        .increment(1);
                }
                IpcReply::success("Worker deleted successfully", DeletedWorker { id: worker.id })
            }
            Err(WorkerError::NotFound(_)) => IpcReply::not_found(WORKER_NOT_FOUND),
            Err(err) => {
                error!(stage = "ipc", worker_id, owned_tx = owned, error = %err, "failed to delete worker");
                IpcReply::internal(format!("Failed to delete worker: {err}"))
            }
        }
    }

    /// Inserts a worker and records a `create_worker` activity atomically.
    pub async fn create_worker(
        &self,
        params: &CreateWorkerParams,
        context: &RequestContext,
        tx: Option<&mut Transaction<'_, Sqlite>>,
    ) -> IpcReply<Worker> {
        let draft = match WorkerDraft::from_params(params) {
            Ok(draft) => draft,
            Err(message) => return IpcReply::validation(message),
        };
        let actor = Actor {
            user_id: parse_user_id(params.user_id.as_ref()),
            context,
        };
        let owned = tx.is_none();

        match self.execute(&Mutation::Create(&draft), &actor, tx).await {
            Ok(worker) => {
                info!(stage = "ipc", worker_id = worker.id, owned_tx = owned, "worker created");
                if owned {
                    counter!("worker_mutations_total", "action" => ActivityAction::CreateWorker.as_str())
                        .increment(1);
                }
                IpcReply::success("Worker created successfully", worker)
            }
            Err(err) => {
                error!(stage = "ipc", owned_tx = owned, error = %err, "failed to create worker");
                IpcReply::internal(format!("Failed to create worker: {err}"))
            }
        }
    }

    /// Loads a single worker.
    pub async fn get_worker(&self, params: &DeleteWorkerParams) -> IpcReply<Worker> {
        let worker_id = match require_worker_id(params.id.as_ref()) {
            Ok(id) => id,
            Err(message) => return IpcReply::validation(message),
        };

        match self.database.workers().find_by_id(worker_id).await {
            Ok(Some(worker)) => IpcReply::success("Worker retrieved successfully", worker),
            Ok(None) => IpcReply::not_found(WORKER_NOT_FOUND),
            Err(err) => {
                error!(stage = "ipc", worker_id, error = %err, "failed to load worker");
                IpcReply::internal(format!("Failed to retrieve worker: {err}"))
            }
        }
    }

    /// Deletes several workers in one transaction, all or nothing.
    ///
    /// Each id goes through [`WorkerService::delete_worker`] with the shared
    /// transaction, so every removal carries its own activity entry.
    pub async fn bulk_delete(
        &self,
        params: &BulkDeleteParams,
        context: &RequestContext,
    ) -> IpcReply<DeletedWorkers> {
        if params.ids.is_empty() {
            return IpcReply::validation("Worker IDs are required");
        }

        let mut tx = match self.database.begin().await {
            Ok(tx) => tx,
            Err(err) => {
                error!(stage = "ipc", error = %err, "failed to begin bulk delete");
                return IpcReply::internal(format!("Failed to delete workers: {err}"));
            }
        };

        let mut deleted = Vec::with_capacity(params.ids.len());
        for raw_id in &params.ids {
            let single = DeleteWorkerParams {
                id: Some(raw_id.clone()),
                user_id: params.user_id.clone(),
            };
            match self.delete_worker(&single, context, Some(&mut tx)).await {
                IpcReply::Success { data, .. } => deleted.push(data.id),
                IpcReply::Failure { kind, message } => {
                    rollback(tx).await;
                    warn!(stage = "ipc", failed_id = %id_label(raw_id), "bulk delete rolled back");
                    return IpcReply::failure(
                        kind,
                        format!("Failed to delete worker {}: {message}", id_label(raw_id)),
                    );
                }
            }
        }

        if let Err(err) = tx.commit().await {
            error!(stage = "ipc", error = %err, "failed to commit bulk delete");
            return IpcReply::internal(format!("Failed to delete workers: {err}"));
        }

        counter!("worker_mutations_total", "action" => ActivityAction::DeleteWorker.as_str())
            .increment(deleted.len() as u64);
        info!(stage = "ipc", count = deleted.len(), "workers deleted");
        IpcReply::success("Workers deleted successfully", DeletedWorkers { deleted })
    }

    /// Runs `mutation` in the caller's transaction, or in one owned here.
    ///
    /// An owned transaction is committed on success and rolled back on any
    /// error, [`WorkerError::NotFound`] included.
    async fn execute(
        &self,
        mutation: &Mutation<'_>,
        actor: &Actor<'_>,
        external: Option<&mut Transaction<'_, Sqlite>>,
    ) -> Result<Worker, WorkerError> {
        if let Some(tx) = external {
            return self.apply(tx, mutation, actor).await;
        }

        let mut tx = self.database.begin().await?;
        match self.apply(&mut tx, mutation, actor).await {
            Ok(worker) => {
                tx.commit().await?;
                Ok(worker)
            }
            Err(err) => {
                rollback(tx).await;
                Err(err)
            }
        }
    }

    async fn apply(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        mutation: &Mutation<'_>,
        actor: &Actor<'_>,
    ) -> Result<Worker, WorkerError> {
        let workers = self.database.workers();
        let now = self.now();

        let (worker, action, description) = match mutation {
            Mutation::Create(draft) => {
                let worker = workers
                    .insert(
                        tx,
                        &NewWorker {
                            name: &draft.name,
                            contact: draft.contact.as_deref(),
                            address: draft.address.as_deref(),
                            status: draft.status,
                            hire_date: draft.hire_date,
                            created_at: now,
                        },
                    )
                    .await?;
                let description = format!("Created worker: {} (ID: {})", worker.name, worker.id);
                (worker, ActivityAction::CreateWorker, description)
            }
            // write first, so the transaction takes the write lock before it reads
            Mutation::Delete { worker_id } => {
                let worker = workers
                    .delete(tx, *worker_id)
                    .await?
                    .ok_or(WorkerError::NotFound(*worker_id))?;
                let description = format!("Deleted worker: {} (ID: {})", worker.name, worker.id);
                (worker, ActivityAction::DeleteWorker, description)
            }
        };

        self.database
            .activities()
            .append(
                tx,
                &NewUserActivity {
                    user_id: actor.user_id,
                    action: action.as_str(),
                    description,
                    ip_address: &actor.context.ip_address,
                    user_agent: &actor.context.user_agent,
                    created_at: now,
                },
            )
            .await?;

        Ok(worker)
    }
}

async fn rollback(tx: Transaction<'_, Sqlite>) {
    if let Err(err) = tx.rollback().await {
        warn!(stage = "storage", error = %err, "transaction rollback failed");
    }
}

/// Errors raised while mutating workers. Never crosses the IPC boundary.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker {0} not found")]
    NotFound(i64),
    #[error(transparent)]
    Repository(#[from] WorkerRepositoryError),
    #[error(transparent)]
    ActivityLog(#[from] ActivityLogError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use farmhand_core::FailureKind;
    use serde_json::json;
    use tempfile::TempDir;

    const FIXED_NOW: &str = "2024-06-01T07:00:00Z";

    struct TestContext {
        _dir: TempDir,
        database: Database,
        service: WorkerService,
        request: RequestContext,
    }

    async fn setup() -> TestContext {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("farmhand.db").display());
        let database = Database::connect(&url).await.expect("connect");
        database.run_migrations().await.expect("migrations");

        let now = DateTime::parse_from_rfc3339(FIXED_NOW)
            .expect("fixed time")
            .with_timezone(&Utc);
        let service = WorkerService::new(database.clone(), Arc::new(move || now));

        TestContext {
            _dir: dir,
            database,
            service,
            request: RequestContext {
                ip_address: "192.168.1.20".to_string(),
                user_agent: "farmhand-test".to_string(),
            },
        }
    }

    async fn seed_worker(ctx: &TestContext, name: &str) -> i64 {
        let params = CreateWorkerParams {
            name: Some(name.to_string()),
            ..CreateWorkerParams::default()
        };
        let reply = ctx.service.create_worker(&params, &ctx.request, None).await;
        reply.into_data().expect("worker created").id
    }

    fn delete_params(id: Value) -> DeleteWorkerParams {
        DeleteWorkerParams {
            id: Some(id),
            user_id: Some(json!(42)),
        }
    }

    async fn worker_exists(database: &Database, id: i64) -> bool {
        database
            .workers()
            .find_by_id(id)
            .await
            .expect("load worker")
            .is_some()
    }

    async fn activity_count(database: &Database, action: &str) -> i64 {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_activities WHERE action = ?")
            .bind(action)
            .fetch_one(database.pool())
            .await
            .expect("count activities");
        row.0
    }

    async fn break_activity_log(database: &Database) {
        sqlx::query(
            "CREATE TRIGGER reject_activity BEFORE INSERT ON user_activities \
             BEGIN SELECT RAISE(ABORT, 'activity log unavailable'); END",
        )
        .execute(database.pool())
        .await
        .expect("create trigger");
    }

    #[tokio::test]
    async fn deletes_existing_worker_and_records_activity() {
        let ctx = setup().await;
        let id = seed_worker(&ctx, "Lorna").await;

        let reply = ctx
            .service
            .delete_worker(&delete_params(json!(id)), &ctx.request, None)
            .await;

        assert!(reply.is_success());
        assert_eq!(reply.message(), "Worker deleted successfully");
        assert_eq!(reply.data(), Some(&DeletedWorker { id }));
        assert!(!worker_exists(&ctx.database, id).await);

        let row: (Option<i64>, String, String, String) = sqlx::query_as(
            "SELECT user_id, description, ip_address, user_agent \
             FROM user_activities WHERE action = 'delete_worker'",
        )
        .fetch_one(ctx.database.pool())
        .await
        .expect("activity row");
        assert_eq!(row.0, Some(42));
        assert_eq!(row.1, format!("Deleted worker: Lorna (ID: {id})"));
        assert_eq!(row.2, "192.168.1.20");
        assert_eq!(row.3, "farmhand-test");
    }

    #[tokio::test]
    async fn numeric_string_ids_are_accepted() {
        let ctx = setup().await;
        let id = seed_worker(&ctx, "Ben").await;

        let reply = ctx
            .service
            .delete_worker(&delete_params(json!(format!(" {id} "))), &ctx.request, None)
            .await;

        assert_eq!(reply.into_data(), Some(DeletedWorker { id }));
    }

    #[tokio::test]
    async fn missing_id_is_rejected_without_side_effects() {
        let ctx = setup().await;
        let id = seed_worker(&ctx, "Carla").await;

        let inputs = [
            DeleteWorkerParams::default(),
            delete_params(Value::Null),
            delete_params(json!("")),
            delete_params(json!("   ")),
        ];
        for params in inputs {
            let reply = ctx.service.delete_worker(&params, &ctx.request, None).await;
            assert_eq!(reply.failure_kind(), Some(FailureKind::Validation));
            assert_eq!(reply.message(), "Worker ID is required");
            assert!(reply.data().is_none());
        }

        assert!(worker_exists(&ctx.database, id).await);
        assert_eq!(activity_count(&ctx.database, "delete_worker").await, 0);
    }

    #[tokio::test]
    async fn non_integer_id_is_rejected() {
        let ctx = setup().await;

        for raw in [json!("abc"), json!(1.5), json!({ "id": 1 })] {
            let reply = ctx
                .service
                .delete_worker(&delete_params(raw), &ctx.request, None)
                .await;
            assert_eq!(reply.failure_kind(), Some(FailureKind::Validation));
            assert_eq!(reply.message(), "Invalid worker ID");
        }
    }

    #[tokio::test]
    async fn unknown_worker_reports_not_found() {
        let ctx = setup().await;

        let reply = ctx
            .service
            .delete_worker(&delete_params(json!(999)), &ctx.request, None)
            .await;

        assert_eq!(reply.failure_kind(), Some(FailureKind::NotFound));
        assert_eq!(reply.message(), "Worker not found");
        assert!(reply.data().is_none());
        assert_eq!(activity_count(&ctx.database, "delete_worker").await, 0);
    }

    #[tokio::test]
    async fn second_delete_of_same_worker_is_not_found() {
        let ctx = setup().await;
        let id = seed_worker(&ctx, "Dante").await;
        let params = delete_params(json!(id));

        let first = ctx.service.delete_worker(&params, &ctx.request, None).await;
        let second = ctx.service.delete_worker(&params, &ctx.request, None).await;

        assert!(first.is_success());
        assert_eq!(second.failure_kind(), Some(FailureKind::NotFound));
        assert_eq!(activity_count(&ctx.database, "delete_worker").await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_deletes_of_distinct_workers_all_succeed() {
        let ctx = setup().await;
        let mut ids = Vec::new();
        for n in 0..16 {
            ids.push(seed_worker(&ctx, &format!("Picker {n}")).await);
        }

        let mut handles = Vec::with_capacity(ids.len());
        for id in ids.iter().copied() {
            let service = ctx.service.clone();
            let request = ctx.request.clone();
            handles.push(tokio::spawn(async move {
                service
                    .delete_worker(&delete_params(json!(id)), &request, None)
                    .await
            }));
        }

        for handle in handles {
            let reply = handle.await.expect("delete task");
            assert!(reply.is_success(), "unexpected failure: {}", reply.message());
        }
        for id in ids {
            assert!(!worker_exists(&ctx.database, id).await);
        }
        assert_eq!(activity_count(&ctx.database, "delete_worker").await, 16);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_deletes_of_same_worker_yield_one_not_found() {
        let ctx = setup().await;

        for round in 0..5 {
            let id = seed_worker(&ctx, &format!("Sorter {round}")).await;
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let service = ctx.service.clone();
                    let request = ctx.request.clone();
                    tokio::spawn(async move {
                        service
                            .delete_worker(&delete_params(json!(id)), &request, None)
                            .await
                    })
                })
                .collect();

            let mut successes = 0;
            let mut not_found = 0;
            for handle in handles {
                let reply = handle.await.expect("delete task");
                match reply.failure_kind() {
                    None => successes += 1,
                    Some(FailureKind::NotFound) => not_found += 1,
                    Some(other) => panic!("unexpected {other:?}: {}", reply.message()),
                }
            }
            assert_eq!((successes, not_found), (1, 1));
        }
        assert_eq!(activity_count(&ctx.database, "delete_worker").await, 5);
    }

    #[tokio::test]
    async fn activity_failure_rolls_back_owned_transaction() {
        let ctx = setup().await;
        let id = seed_worker(&ctx, "Elena").await;
        break_activity_log(&ctx.database).await;

        let reply = ctx
            .service
            .delete_worker(&delete_params(json!(id)), &ctx.request, None)
            .await;

        assert_eq!(reply.failure_kind(), Some(FailureKind::Internal));
        assert!(reply
            .message()
            .starts_with("Failed to delete worker: error returned from database: "));
        assert!(reply.message().ends_with("activity log unavailable"));
        assert!(!reply.message().contains("database error"));
        assert!(reply.data().is_none());
        assert!(worker_exists(&ctx.database, id).await);
    }

    #[tokio::test]
    async fn caller_owned_transaction_is_not_committed() {
        let ctx = setup().await;
        let id = seed_worker(&ctx, "Felix").await;

        let mut tx = ctx.database.begin().await.expect("begin");
        let reply = ctx
            .service
            .delete_worker(&delete_params(json!(id)), &ctx.request, Some(&mut tx))
            .await;
        assert!(reply.is_success());

        let inside: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM workers WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .expect("count inside transaction");
        assert_eq!(inside.0, 0);

        tx.rollback().await.expect("caller rollback");

        assert!(worker_exists(&ctx.database, id).await);
        assert_eq!(activity_count(&ctx.database, "delete_worker").await, 0);
    }

    #[tokio::test]
    async fn caller_owned_transaction_stays_open_after_failure() {
        let ctx = setup().await;
        let id = seed_worker(&ctx, "Gina").await;
        break_activity_log(&ctx.database).await;

        let mut tx = ctx.database.begin().await.expect("begin");
        let reply = ctx
            .service
            .delete_worker(&delete_params(json!(id)), &ctx.request, Some(&mut tx))
            .await;
        assert_eq!(reply.failure_kind(), Some(FailureKind::Internal));

        // the removal is still pending inside the caller's transaction
        let inside: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM workers WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .expect("transaction still usable");
        assert_eq!(inside.0, 0);

        tx.rollback().await.expect("caller rollback");
        assert!(worker_exists(&ctx.database, id).await);
    }

    #[tokio::test]
    async fn delete_cascades_to_dependent_rows() {
        let ctx = setup().await;
        let id = seed_worker(&ctx, "Hector").await;
        sqlx::query(
            "INSERT INTO assignments (worker_id, plot_name, assignment_date, created_at, updated_at) \
             VALUES (?, 'Plot 7', '2024-06-01', ?, ?)",
        )
        .bind(id)
        .bind(FIXED_NOW)
        .bind(FIXED_NOW)
        .execute(ctx.database.pool())
        .await
        .expect("insert assignment");
        sqlx::query(
            "INSERT INTO worker_debts (worker_id, amount, balance, date_incurred, created_at, updated_at) \
             VALUES (?, 1200.0, 1200.0, '2024-06-01', ?, ?)",
        )
        .bind(id)
        .bind(FIXED_NOW)
        .bind(FIXED_NOW)
        .execute(ctx.database.pool())
        .await
        .expect("insert debt");

        let reply = ctx
            .service
            .delete_worker(&delete_params(json!(id)), &ctx.request, None)
            .await;
        assert!(reply.is_success());

        let remaining: (i64, i64) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM assignments WHERE worker_id = ?1), \
                    (SELECT COUNT(*) FROM worker_debts WHERE worker_id = ?1)",
        )
        .bind(id)
        .fetch_one(ctx.database.pool())
        .await
        .expect("count dependents");
        assert_eq!(remaining, (0, 0));
    }

    #[tokio::test]
    async fn create_worker_validates_input() {
        let ctx = setup().await;
        let cases = [
            (CreateWorkerParams::default(), "Worker name is required"),
            (
                CreateWorkerParams {
                    name: Some("   ".to_string()),
                    ..CreateWorkerParams::default()
                },
                "Worker name is required",
            ),
            (
                CreateWorkerParams {
                    name: Some("Ivy".to_string()),
                    status: Some("retired".to_string()),
                    ..CreateWorkerParams::default()
                },
                "Invalid worker status",
            ),
            (
                CreateWorkerParams {
                    name: Some("Ivy".to_string()),
                    hire_date: Some("06/01/2024".to_string()),
                    ..CreateWorkerParams::default()
                },
                "Invalid hire date",
            ),
        ];

        for (params, expected) in cases {
            let reply = ctx.service.create_worker(&params, &ctx.request, None).await;
            assert_eq!(reply.failure_kind(), Some(FailureKind::Validation));
            assert_eq!(reply.message(), expected);
        }
        assert_eq!(activity_count(&ctx.database, "create_worker").await, 0);
    }

    #[tokio::test]
    async fn create_worker_stores_row_and_activity() {
        let ctx = setup().await;
        let params = CreateWorkerParams {
            name: Some("  Jose  ".to_string()),
            contact: Some("0917-555-0101".to_string()),
            address: Some(" ".to_string()),
            status: Some("on-leave".to_string()),
            hire_date: Some("2024-02-14".to_string()),
            user_id: Some(json!("7")),
        };

        let reply = ctx.service.create_worker(&params, &ctx.request, None).await;
        let worker = reply.into_data().expect("created");
        assert_eq!(worker.name, "Jose");
        assert_eq!(worker.contact.as_deref(), Some("0917-555-0101"));
        assert_eq!(worker.address, None);
        assert_eq!(worker.status, WorkerStatus::OnLeave);
        assert_eq!(worker.hire_date, NaiveDate::from_ymd_opt(2024, 2, 14));

        let stored = ctx
            .database
            .workers()
            .find_by_id(worker.id)
            .await
            .expect("load")
            .expect("stored");
        assert_eq!(stored, worker);

        let user: (Option<i64>,) =
            sqlx::query_as("SELECT user_id FROM user_activities WHERE action = 'create_worker'")
                .fetch_one(ctx.database.pool())
                .await
                .expect("activity row");
        assert_eq!(user.0, Some(7));
    }

    #[tokio::test]
    async fn get_worker_returns_row_or_not_found() {
        let ctx = setup().await;
        let id = seed_worker(&ctx, "Karen").await;

        let found = ctx.service.get_worker(&delete_params(json!(id))).await;
        assert_eq!(found.data().map(|worker| worker.name.as_str()), Some("Karen"));

        let missing = ctx.service.get_worker(&delete_params(json!(id + 1))).await;
        assert_eq!(missing.failure_kind(), Some(FailureKind::NotFound));

        let invalid = ctx.service.get_worker(&DeleteWorkerParams::default()).await;
        assert_eq!(invalid.message(), "Worker ID is required");
    }

    #[tokio::test]
    async fn bulk_delete_removes_every_worker() {
        let ctx = setup().await;
        let first = seed_worker(&ctx, "Leo").await;
        let second = seed_worker(&ctx, "Mina").await;

        let params = BulkDeleteParams {
            ids: vec![json!(first), json!(second.to_string())],
            user_id: Some(json!(3)),
        };
        let reply = ctx.service.bulk_delete(&params, &ctx.request).await;

        assert_eq!(
            reply.into_data(),
            Some(DeletedWorkers {
                deleted: vec![first, second]
            })
        );
        assert!(!worker_exists(&ctx.database, first).await);
        assert!(!worker_exists(&ctx.database, second).await);
        assert_eq!(activity_count(&ctx.database, "delete_worker").await, 2);
    }

    #[tokio::test]
    async fn bulk_delete_is_all_or_nothing() {
        let ctx = setup().await;
        let first = seed_worker(&ctx, "Nora").await;
        let second = seed_worker(&ctx, "Oscar").await;

        let params = BulkDeleteParams {
            ids: vec![json!(first), json!(999), json!(second)],
            user_id: None,
        };
        let reply = ctx.service.bulk_delete(&params, &ctx.request).await;

        assert_eq!(reply.failure_kind(), Some(FailureKind::NotFound));
        assert_eq!(reply.message(), "Failed to delete worker 999: Worker not found");
        assert!(worker_exists(&ctx.database, first).await);
        assert!(worker_exists(&ctx.database, second).await);
        assert_eq!(activity_count(&ctx.database, "delete_worker").await, 0);
    }

    #[tokio::test]
    async fn bulk_delete_requires_ids() {
        let ctx = setup().await;

        let reply = ctx
            .service
            .bulk_delete(&BulkDeleteParams::default(), &ctx.request)
            .await;

        assert_eq!(reply.failure_kind(), Some(FailureKind::Validation));
        assert_eq!(reply.message(), "Worker IDs are required");
    }
}

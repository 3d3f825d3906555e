//! Typed adapter over a [`RecordBackend`].
//!
//! Everything above this module works with [`Task`], [`Category`] and
//! [`Subtask`]; raw backend records never leave this file.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use taskdeck_shared::{
    CATEGORY_FIELDS, CategoryRecord, CategoryRecordWrite, FetchParams, ID_FIELD, Record,
    RecordId, RecordResult, SUBTASK_FIELDS, SortType, SubtaskRecord, SubtaskRecordWrite,
    TASK_FIELDS, Table, TaskRecord, TaskRecordWrite,
};
use tracing::{Instrument, debug, debug_span, warn};
use uuid::Uuid;

use crate::backend::{BackendResult, RecordBackend};
use crate::category::{
    Category, CategoryId, CategoryPatch, DEFAULT_CATEGORY_COLOR, NewCategory, with_task_counts,
};
use crate::error::{StoreError, StoreResult};
use crate::subtask::{NewSubtask, Subtask, SubtaskId, SubtaskPatch, SubtaskStatus};
use crate::task::{NewTask, Priority, Task, TaskId, TaskPatch};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Record that a batched write could not apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkFailure {
    pub id: Option<RecordId>,
    pub message: String,
}

/// Per-record result of a batched write.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOutcome<T> {
    pub succeeded: Vec<T>,
    pub failed: Vec<BulkFailure>,
}

impl<T> BulkOutcome<T> {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

#[derive(Debug)]
pub struct Store<B> {
    backend: B,
    timeout: Duration,
}

impl<B: RecordBackend> Store<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one backend call under the request timeout. Dropping the returned
    /// future abandons the request.
    async fn round_trip<T>(
        &self,
        table: Table,
        op: &'static str,
        call: impl Future<Output = BackendResult<T>>,
    ) -> StoreResult<T> {
        let request_id = Uuid::new_v4();
        let span = debug_span!("store_request", %request_id, %table, op);

        match tokio::time::timeout(self.timeout, call).instrument(span).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                warn!(%request_id, %table, op, error = %err, "backend call failed");
                Err(StoreError::backend(table, op, err.0))
            }
            Err(_) => {
                warn!(%request_id, %table, op, timeout_ms = self.timeout.as_millis() as u64, "backend call timed out");
                Err(StoreError::Timeout {
                    table,
                    op,
                    after: self.timeout,
                })
            }
        }
    }

    async fn fetch(&self, table: Table, params: FetchParams) -> StoreResult<Vec<Record>> {
        self.round_trip(table, "fetch", self.backend.fetch_records(table, params))
            .await
    }

    async fn get(&self, table: Table, id: RecordId) -> StoreResult<Record> {
        self.round_trip(table, "get", self.backend.get_record(table, id))
            .await?
            .ok_or(StoreError::NotFound { table, id })
    }

    async fn create_one(&self, table: Table, record: Record) -> StoreResult<Record> {
        let results = self
            .round_trip(table, "create", self.backend.create_records(table, vec![record]))
            .await?;
        single_success(table, "create", results)
    }

    async fn update_one(&self, table: Table, record: Record) -> StoreResult<Record> {
        let results = self
            .round_trip(table, "update", self.backend.update_records(table, vec![record]))
            .await?;
        single_success(table, "update", results)
    }

    async fn delete_one(&self, table: Table, id: RecordId) -> StoreResult<()> {
        let results = self
            .round_trip(table, "delete", self.backend.delete_records(table, vec![id]))
            .await?;
        if let Some(failed) = results.into_iter().find(|r| !r.success) {
            if failed.message.as_deref() == Some("record not found") {
                return Err(StoreError::NotFound { table, id });
            }
            return Err(StoreError::backend(
                table,
                "delete",
                failed.message.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        Ok(())
    }

    async fn update_many<T>(
        &self,
        table: Table,
        op: &'static str,
        records: Vec<Record>,
        decode: impl Fn(Record) -> StoreResult<T>,
    ) -> StoreResult<BulkOutcome<T>> {
        if records.is_empty() {
            return Ok(BulkOutcome {
                succeeded: vec![],
                failed: vec![],
            });
        }
        let results = self
            .round_trip(table, op, self.backend.update_records(table, records))
            .await?;
        Ok(collect_bulk(table, op, results, |result| match result.data {
            Some(data) => decode(data),
            None => Err(StoreError::backend(table, op, "no record returned")),
        }))
    }

    // ---- tasks -------------------------------------------------------------

    #[tracing::instrument(skip(self))]
    pub async fn tasks(&self) -> StoreResult<Vec<Task>> {
        let params = FetchParams::fields(TASK_FIELDS).order_by("order", SortType::Asc);
        let records = self.fetch(Table::Task, params).await?;
        Ok(decode_all(Table::Task, records, decode_task))
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub async fn task(&self, id: TaskId) -> StoreResult<Task> {
        decode_task(self.get(Table::Task, id.get()).await?)
    }

    /// Create a task at the end of its category: order is one past the
    /// highest order among tasks sharing the category.
    #[tracing::instrument(skip(self, input), fields(category = ?input.category))]
    pub async fn create_task(&self, input: NewTask) -> StoreResult<Task> {
        let existing = self.tasks().await?;
        let max_order = existing
            .iter()
            .filter(|task| task.category == input.category)
            .map(Task::sort_order)
            .max()
            .unwrap_or(0);

        let write = TaskRecordWrite {
            title: Some(input.title),
            completed: Some(false),
            category: Some(input.category.map(CategoryId::get)),
            priority: Some(input.priority.as_str().to_string()),
            due_date: Some(input.due_date.map(|due| due.to_rfc3339())),
            created_at: Some(Utc::now().to_rfc3339()),
            completed_at: Some(None),
            order: Some(max_order + 1),
            ..TaskRecordWrite::default()
        };

        let record = self.create_one(Table::Task, encode(Table::Task, &write)?).await?;
        let task = decode_task(record)?;
        debug!(id = %task.id, order = ?task.order, "created task");
        Ok(task)
    }

    #[tracing::instrument(skip(self, patch), fields(id = %id))]
    pub async fn update_task(&self, id: TaskId, patch: TaskPatch) -> StoreResult<Task> {
        let write = encode_task_patch(Some(id), &patch, Utc::now());
        let record = self.update_one(Table::Task, encode(Table::Task, &write)?).await?;
        decode_task(record)
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub async fn delete_task(&self, id: TaskId) -> StoreResult<()> {
        self.delete_one(Table::Task, id.get()).await
    }

    #[tracing::instrument(skip(self, ids, patch), fields(count = ids.len()))]
    pub async fn bulk_update_tasks(
        &self,
        ids: &[TaskId],
        patch: &TaskPatch,
    ) -> StoreResult<BulkOutcome<Task>> {
        let now = Utc::now();
        let records = ids
            .iter()
            .map(|id| encode(Table::Task, &encode_task_patch(Some(*id), patch, now)))
            .collect::<StoreResult<Vec<_>>>()?;
        self.update_many(Table::Task, "bulk_update", records, decode_task)
            .await
    }

    #[tracing::instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn bulk_delete_tasks(&self, ids: &[TaskId]) -> StoreResult<BulkOutcome<TaskId>> {
        if ids.is_empty() {
            return Ok(BulkOutcome {
                succeeded: vec![],
                failed: vec![],
            });
        }
        let raw: Vec<RecordId> = ids.iter().map(|id| id.get()).collect();
        let results = self
            .round_trip(
                Table::Task,
                "bulk_delete",
                self.backend.delete_records(Table::Task, raw),
            )
            .await?;
        Ok(collect_bulk(Table::Task, "bulk_delete", results, |result| {
            result
                .id
                .map(TaskId)
                .ok_or_else(|| StoreError::backend(Table::Task, "bulk_delete", "no id returned"))
        }))
    }

    /// Persist `ordered` as the new display order: position `i` gets order `i + 1`.
    #[tracing::instrument(skip(self, ordered), fields(count = ordered.len()))]
    pub async fn reorder_tasks(&self, ordered: &[TaskId]) -> StoreResult<BulkOutcome<Task>> {
        let records = ordered
            .iter()
            .zip(1_i64..)
            .map(|(id, order)| {
                encode(
                    Table::Task,
                    &TaskRecordWrite {
                        id: Some(id.get()),
                        order: Some(order),
                        ..TaskRecordWrite::default()
                    },
                )
            })
            .collect::<StoreResult<Vec<_>>>()?;
        self.update_many(Table::Task, "reorder", records, decode_task)
            .await
    }

    // ---- categories --------------------------------------------------------

    /// Categories with `task_count` recomputed from current task references.
    #[tracing::instrument(skip(self))]
    pub async fn categories(&self) -> StoreResult<Vec<Category>> {
        let (categories, tasks) = tokio::join!(self.categories_without_counts(), self.tasks());
        Ok(with_task_counts(categories?, &tasks?))
    }

    /// Categories as stored; `task_count` is untrusted until passed through
    /// [`with_task_counts`] with a task list the caller already holds.
    #[tracing::instrument(skip(self))]
    pub async fn categories_without_counts(&self) -> StoreResult<Vec<Category>> {
        let records = self
            .fetch(Table::Category, FetchParams::fields(CATEGORY_FIELDS))
            .await?;
        Ok(decode_all(Table::Category, records, decode_category))
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub async fn category(&self, id: CategoryId) -> StoreResult<Category> {
        let (record, tasks) = tokio::join!(self.get(Table::Category, id.get()), self.tasks());
        let category = decode_category(record?)?;
        with_task_counts(vec![category], &tasks?)
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound {
                table: Table::Category,
                id: id.get(),
            })
    }

    #[tracing::instrument(skip(self, input))]
    pub async fn create_category(&self, input: NewCategory) -> StoreResult<Category> {
        let write = CategoryRecordWrite {
            name: Some(input.name),
            color: Some(input.color),
            task_count: Some(0),
            ..CategoryRecordWrite::default()
        };
        let record = self
            .create_one(Table::Category, encode(Table::Category, &write)?)
            .await?;
        decode_category(record)
    }

    #[tracing::instrument(skip(self, patch), fields(id = %id))]
    pub async fn update_category(
        &self,
        id: CategoryId,
        patch: CategoryPatch,
    ) -> StoreResult<Category> {
        let write = CategoryRecordWrite {
            id: Some(id.get()),
            name: patch.name,
            color: patch.color,
            ..CategoryRecordWrite::default()
        };
        let record = self
            .update_one(Table::Category, encode(Table::Category, &write)?)
            .await?;
        decode_category(record)
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub async fn delete_category(&self, id: CategoryId) -> StoreResult<()> {
        self.delete_one(Table::Category, id.get()).await
    }

    // ---- subtasks ----------------------------------------------------------

    #[tracing::instrument(skip(self))]
    pub async fn subtasks(&self) -> StoreResult<Vec<Subtask>> {
        let params = FetchParams::fields(SUBTASK_FIELDS).order_by(ID_FIELD, SortType::Asc);
        let records = self.fetch(Table::Subtask, params).await?;
        Ok(decode_all(Table::Subtask, records, decode_subtask))
    }

    #[tracing::instrument(skip(self), fields(task = %task_id))]
    pub async fn subtasks_for(&self, task_id: TaskId) -> StoreResult<Vec<Subtask>> {
        let params = FetchParams::fields(SUBTASK_FIELDS)
            .where_exact("Task", vec![Value::from(task_id.get())])
            .order_by(ID_FIELD, SortType::Asc);
        let records = self.fetch(Table::Subtask, params).await?;
        Ok(decode_all(Table::Subtask, records, decode_subtask))
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub async fn subtask(&self, id: SubtaskId) -> StoreResult<Subtask> {
        decode_subtask(self.get(Table::Subtask, id.get()).await?)
    }

    #[tracing::instrument(skip(self, input), fields(task = %input.task_id))]
    pub async fn create_subtask(&self, input: NewSubtask) -> StoreResult<Subtask> {
        let write = SubtaskRecordWrite {
            name: Some(input.name),
            description: Some(input.description),
            status: Some(input.status.as_str().to_string()),
            task: Some(input.task_id.get()),
            ..SubtaskRecordWrite::default()
        };
        let record = self
            .create_one(Table::Subtask, encode(Table::Subtask, &write)?)
            .await?;
        decode_subtask(record)
    }

    #[tracing::instrument(skip(self, patch), fields(id = %id))]
    pub async fn update_subtask(&self, id: SubtaskId, patch: SubtaskPatch) -> StoreResult<Subtask> {
        let write = encode_subtask_patch(Some(id), &patch);
        let record = self
            .update_one(Table::Subtask, encode(Table::Subtask, &write)?)
            .await?;
        decode_subtask(record)
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub async fn delete_subtask(&self, id: SubtaskId) -> StoreResult<()> {
        self.delete_one(Table::Subtask, id.get()).await
    }

    #[tracing::instrument(skip(self, ids, patch), fields(count = ids.len()))]
    pub async fn bulk_update_subtasks(
        &self,
        ids: &[SubtaskId],
        patch: &SubtaskPatch,
    ) -> StoreResult<BulkOutcome<Subtask>> {
        let records = ids
            .iter()
            .map(|id| encode(Table::Subtask, &encode_subtask_patch(Some(*id), patch)))
            .collect::<StoreResult<Vec<_>>>()?;
        self.update_many(Table::Subtask, "bulk_update", records, decode_subtask)
            .await
    }
}

fn encode<T: Serialize>(table: Table, write: &T) -> StoreResult<Record> {
    match serde_json::to_value(write) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::decode(
            table,
            format!("expected an object, got {other}"),
        )),
        Err(err) => Err(StoreError::decode(table, err.to_string())),
    }
}

fn encode_task_patch(id: Option<TaskId>, patch: &TaskPatch, now: DateTime<Utc>) -> TaskRecordWrite {
    TaskRecordWrite {
        id: id.map(TaskId::get),
        title: patch.title.clone(),
        completed: patch.completed,
        category: patch.category.map(|c| c.map(CategoryId::get)),
        priority: patch.priority.map(|p| p.as_str().to_string()),
        due_date: patch.due_date.map(|due| due.map(|d| d.to_rfc3339())),
        // completed_at tracks completed: set on completion, cleared on reopen.
        completed_at: patch
            .completed
            .map(|done| done.then(|| now.to_rfc3339())),
        order: patch.order,
        created_at: None,
    }
}

fn encode_subtask_patch(id: Option<SubtaskId>, patch: &SubtaskPatch) -> SubtaskRecordWrite {
    SubtaskRecordWrite {
        id: id.map(SubtaskId::get),
        name: patch.name.clone(),
        description: patch.description.clone(),
        status: patch.status.map(|s| s.as_str().to_string()),
        task: None,
    }
}

fn single_success(table: Table, op: &'static str, results: Vec<RecordResult>) -> StoreResult<Record> {
    let mut data = None;
    for result in results {
        if !result.success {
            if op != "create"
                && result.message.as_deref() == Some("record not found")
                && let Some(id) = result.id
            {
                return Err(StoreError::NotFound { table, id });
            }
            return Err(StoreError::backend(
                table,
                op,
                result.message.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        if data.is_none() {
            data = result.data;
        }
    }
    data.ok_or_else(|| StoreError::backend(table, op, "no record returned"))
}

fn collect_bulk<T>(
    table: Table,
    op: &'static str,
    results: Vec<RecordResult>,
    mut accept: impl FnMut(RecordResult) -> StoreResult<T>,
) -> BulkOutcome<T> {
    let mut outcome = BulkOutcome {
        succeeded: Vec::new(),
        failed: Vec::new(),
    };
    for result in results {
        if !result.success {
            outcome.failed.push(BulkFailure {
                id: result.id,
                message: result.message.unwrap_or_else(|| "unknown error".to_string()),
            });
            continue;
        }
        let id = result.id;
        match accept(result) {
            Ok(value) => outcome.succeeded.push(value),
            Err(err) => outcome.failed.push(BulkFailure {
                id,
                message: err.to_string(),
            }),
        }
    }
    if !outcome.is_complete() {
        warn!(%table, op, failed = outcome.failed.len(), attempted = outcome.attempted(), "batch partially failed");
    }
    outcome
}

fn decode_all<T>(
    table: Table,
    records: Vec<Record>,
    decode: impl Fn(Record) -> StoreResult<T>,
) -> Vec<T> {
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        match decode(record) {
            Ok(value) => out.push(value),
            Err(err) => warn!(%table, error = %err, "skipping malformed record"),
        }
    }
    out
}

fn parse_timestamp(
    table: Table,
    field: &str,
    raw: Option<String>,
) -> StoreResult<Option<DateTime<Utc>>> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => DateTime::parse_from_rfc3339(text)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|err| StoreError::decode(table, format!("{field} {text:?}: {err}"))),
    }
}

fn decode_task(record: Record) -> StoreResult<Task> {
    let raw: TaskRecord = serde_json::from_value(Value::Object(record))
        .map_err(|err| StoreError::decode(Table::Task, err.to_string()))?;

    let priority = match raw.priority.as_deref() {
        None | Some("") => Priority::default(),
        Some(text) => text
            .parse::<Priority>()
            .map_err(|err| StoreError::decode(Table::Task, err.to_string()))?,
    };

    Ok(Task {
        id: TaskId(raw.id),
        title: raw.title.or(raw.name).unwrap_or_default(),
        completed: raw.completed.unwrap_or(false),
        category: raw.category.map(CategoryId),
        priority,
        due_date: parse_timestamp(Table::Task, "due_date", raw.due_date)?,
        order: raw.order,
        created_at: parse_timestamp(Table::Task, "created_at", raw.created_at)?,
        completed_at: parse_timestamp(Table::Task, "completed_at", raw.completed_at)?,
    })
}

fn decode_category(record: Record) -> StoreResult<Category> {
    let raw: CategoryRecord = serde_json::from_value(Value::Object(record))
        .map_err(|err| StoreError::decode(Table::Category, err.to_string()))?;

    Ok(Category {
        id: CategoryId(raw.id),
        name: raw.name.unwrap_or_default(),
        color: raw
            .color
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY_COLOR.to_string()),
        task_count: raw.task_count.unwrap_or(0) as usize,
    })
}

fn decode_subtask(record: Record) -> StoreResult<Subtask> {
    let raw: SubtaskRecord = serde_json::from_value(Value::Object(record))
        .map_err(|err| StoreError::decode(Table::Subtask, err.to_string()))?;

    let status = match raw.status.as_deref() {
        None | Some("") => SubtaskStatus::default(),
        Some(text) => text
            .parse::<SubtaskStatus>()
            .map_err(|err| StoreError::decode(Table::Subtask, err.to_string()))?,
    };
    let task = raw.task.ok_or_else(|| {
        StoreError::decode(Table::Subtask, format!("subtask {} has no owning task", raw.id))
    })?;

    Ok(Subtask {
        id: SubtaskId(raw.id),
        name: raw.name.unwrap_or_default(),
        description: raw.description.unwrap_or_default(),
        status,
        task_id: TaskId(task),
    })
}

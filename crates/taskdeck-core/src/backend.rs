use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::future::{self, Future};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskdeck_shared::{FetchParams, ID_FIELD, Record, RecordId, RecordResult, SortType, Table};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

/// Whole-call failure reported by a backend (network down, auth rejected, ...).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct BackendError(pub String);

pub type BackendResult<T> = Result<T, BackendError>;

/// Record-level contract of the hosted backend.
///
/// Batched writes report one [`RecordResult`] per input record; a whole-call
/// failure is an `Err`.
pub trait RecordBackend: Send + Sync {
    fn fetch_records(
        &self,
        table: Table,
        params: FetchParams,
    ) -> impl Future<Output = BackendResult<Vec<Record>>> + Send;

    fn get_record(
        &self,
        table: Table,
        id: RecordId,
    ) -> impl Future<Output = BackendResult<Option<Record>>> + Send;

    fn create_records(
        &self,
        table: Table,
        records: Vec<Record>,
    ) -> impl Future<Output = BackendResult<Vec<RecordResult>>> + Send;

    fn update_records(
        &self,
        table: Table,
        records: Vec<Record>,
    ) -> impl Future<Output = BackendResult<Vec<RecordResult>>> + Send;

    fn delete_records(
        &self,
        table: Table,
        ids: Vec<RecordId>,
    ) -> impl Future<Output = BackendResult<Vec<RecordResult>>> + Send;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct NextIds {
    task: RecordId,
    category: RecordId,
    subtask: RecordId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tables {
    #[serde(default)]
    task: Vec<Record>,
    #[serde(default)]
    category: Vec<Record>,
    #[serde(default)]
    subtask: Vec<Record>,
    #[serde(default)]
    next_ids: NextIds,
}

impl Tables {
    fn rows(&self, table: Table) -> &Vec<Record> {
        match table {
            Table::Task => &self.task,
            Table::Category => &self.category,
            Table::Subtask => &self.subtask,
        }
    }

    fn rows_mut(&mut self, table: Table) -> &mut Vec<Record> {
        match table {
            Table::Task => &mut self.task,
            Table::Category => &mut self.category,
            Table::Subtask => &mut self.subtask,
        }
    }

    fn allocate_id(&mut self, table: Table) -> RecordId {
        let floor = self
            .rows(table)
            .iter()
            .filter_map(record_id)
            .max()
            .unwrap_or(0);
        let slot = match table {
            Table::Task => &mut self.next_ids.task,
            Table::Category => &mut self.next_ids.category,
            Table::Subtask => &mut self.next_ids.subtask,
        };
        *slot = (*slot).max(floor) + 1;
        *slot
    }
}

#[derive(Debug, Default)]
struct State {
    tables: Tables,
    offline: bool,
    record_failures: HashMap<(Table, RecordId), String>,
}

/// In-memory stand-in for the hosted backend.
///
/// Each instance owns its tables; nothing is shared between instances. An
/// instance opened from a snapshot path can be written back with [`flush`].
///
/// [`flush`]: MemoryBackend::flush
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    #[tracing::instrument(skip(path))]
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let tables = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed reading {}", path.display()))?;
            if raw.trim().is_empty() {
                Tables::default()
            } else {
                serde_json::from_str(&raw)
                    .with_context(|| format!("failed parsing {}", path.display()))?
            }
        } else {
            Tables::default()
        };

        info!(
            snapshot = %path.display(),
            tasks = tables.task.len(),
            categories = tables.category.len(),
            subtasks = tables.subtask.len(),
            "opened memory backend"
        );

        Ok(Self {
            state: Mutex::new(State {
                tables,
                ..State::default()
            }),
            snapshot_path: Some(path.to_path_buf()),
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Write the tables back to the snapshot file. No-op for a purely in-memory instance.
    #[tracing::instrument(skip(self))]
    pub fn flush(&self) -> anyhow::Result<()> {
        let Some(path) = self.snapshot_path.as_deref() else {
            return Ok(());
        };
        let tables = self.state.lock().tables.clone();
        save_snapshot_atomic(path, &tables)
            .with_context(|| format!("failed to save {}", path.display()))
    }

    /// Drop every record and any injected failure.
    pub fn reset(&self) {
        *self.state.lock() = State::default();
    }

    /// Insert records as-is, assigning ids to those without one.
    pub fn seed(&self, table: Table, records: Vec<Record>) -> Vec<RecordId> {
        let mut state = self.state.lock();
        let mut ids = Vec::with_capacity(records.len());
        for mut record in records {
            let id = match record_id(&record) {
                Some(id) => id,
                None => {
                    let id = state.tables.allocate_id(table);
                    record.insert(ID_FIELD.to_string(), Value::from(id));
                    id
                }
            };
            state.tables.rows_mut(table).push(record);
            ids.push(id);
        }
        ids
    }

    /// Make every subsequent call fail as if the backend were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Make updates and deletes of one record fail with `message`.
    pub fn fail_record(&self, table: Table, id: RecordId, message: impl Into<String>) {
        self.state
            .lock()
            .record_failures
            .insert((table, id), message.into());
    }

    pub fn clear_failures(&self) {
        self.state.lock().record_failures.clear();
    }

    pub fn len(&self, table: Table) -> usize {
        self.state.lock().tables.rows(table).len()
    }

    pub fn is_empty(&self, table: Table) -> bool {
        self.len(table) == 0
    }

    fn fetch_now(&self, table: Table, params: &FetchParams) -> BackendResult<Vec<Record>> {
        let state = self.state.lock();
        ensure_online(&state)?;

        let mut rows: Vec<Record> = state
            .tables
            .rows(table)
            .iter()
            .filter(|row| {
                params.where_exact.iter().all(|cond| {
                    let value = row.get(&cond.field_name).unwrap_or(&Value::Null);
                    cond.values.iter().any(|candidate| candidate == value)
                })
            })
            .cloned()
            .collect();

        for order in params.order_by.iter().rev() {
            rows.sort_by(|a, b| {
                let ord = compare_values(a.get(&order.field_name), b.get(&order.field_name));
                match order.sort_type {
                    SortType::Asc => ord,
                    SortType::Desc => ord.reverse(),
                }
            });
        }

        if !params.fields.is_empty() {
            for row in &mut rows {
                row.retain(|key, _| key == ID_FIELD || params.fields.iter().any(|f| f == key));
            }
        }

        debug!(%table, count = rows.len(), "fetched records");
        Ok(rows)
    }

    fn get_now(&self, table: Table, id: RecordId) -> BackendResult<Option<Record>> {
        let state = self.state.lock();
        ensure_online(&state)?;
        Ok(state
            .tables
            .rows(table)
            .iter()
            .find(|row| record_id(row) == Some(id))
            .cloned())
    }

    fn create_now(&self, table: Table, records: Vec<Record>) -> BackendResult<Vec<RecordResult>> {
        let mut state = self.state.lock();
        ensure_online(&state)?;

        let mut results = Vec::with_capacity(records.len());
        for mut record in records {
            let id = state.tables.allocate_id(table);
            record.insert(ID_FIELD.to_string(), Value::from(id));
            state.tables.rows_mut(table).push(record.clone());
            results.push(RecordResult::ok(id, Some(record)));
        }
        debug!(%table, count = results.len(), "created records");
        Ok(results)
    }

    fn update_now(&self, table: Table, records: Vec<Record>) -> BackendResult<Vec<RecordResult>> {
        let mut state = self.state.lock();
        ensure_online(&state)?;

        let mut results = Vec::with_capacity(records.len());
        for record in records {
            let Some(id) = record_id(&record) else {
                results.push(RecordResult::failed(None, "record is missing Id"));
                continue;
            };
            if let Some(message) = state.record_failures.get(&(table, id)) {
                results.push(RecordResult::failed(Some(id), message.clone()));
                continue;
            }

            let row = state
                .tables
                .rows_mut(table)
                .iter_mut()
                .find(|row| record_id(row) == Some(id));
            match row {
                Some(row) => {
                    for (key, value) in record {
                        if key != ID_FIELD {
                            row.insert(key, value);
                        }
                    }
                    results.push(RecordResult::ok(id, Some(row.clone())));
                }
                None => results.push(RecordResult::failed(Some(id), "record not found")),
            }
        }
        Ok(results)
    }

    fn delete_now(&self, table: Table, ids: Vec<RecordId>) -> BackendResult<Vec<RecordResult>> {
        let mut state = self.state.lock();
        ensure_online(&state)?;

        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(message) = state.record_failures.get(&(table, id)) {
                results.push(RecordResult::failed(Some(id), message.clone()));
                continue;
            }
            let rows = state.tables.rows_mut(table);
            let before = rows.len();
            rows.retain(|row| record_id(row) != Some(id));
            if rows.len() < before {
                results.push(RecordResult::ok(id, None));
            } else {
                results.push(RecordResult::failed(Some(id), "record not found"));
            }
        }
        Ok(results)
    }
}

impl RecordBackend for MemoryBackend {
    fn fetch_records(
        &self,
        table: Table,
        params: FetchParams,
    ) -> impl Future<Output = BackendResult<Vec<Record>>> + Send {
        future::ready(self.fetch_now(table, &params))
    }

    fn get_record(
        &self,
        table: Table,
        id: RecordId,
    ) -> impl Future<Output = BackendResult<Option<Record>>> + Send {
        future::ready(self.get_now(table, id))
    }

    fn create_records(
        &self,
        table: Table,
        records: Vec<Record>,
    ) -> impl Future<Output = BackendResult<Vec<RecordResult>>> + Send {
        future::ready(self.create_now(table, records))
    }

    fn update_records(
        &self,
        table: Table,
        records: Vec<Record>,
    ) -> impl Future<Output = BackendResult<Vec<RecordResult>>> + Send {
        future::ready(self.update_now(table, records))
    }

    fn delete_records(
        &self,
        table: Table,
        ids: Vec<RecordId>,
    ) -> impl Future<Output = BackendResult<Vec<RecordResult>>> + Send {
        future::ready(self.delete_now(table, ids))
    }
}

pub fn record_id(record: &Record) -> Option<RecordId> {
    record.get(ID_FIELD).and_then(Value::as_u64)
}

fn ensure_online(state: &State) -> BackendResult<()> {
    if state.offline {
        return Err(BackendError("backend unreachable".to_string()));
    }
    Ok(())
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

#[tracing::instrument(skip(path, tables))]
fn save_snapshot_atomic(path: &Path, tables: &Tables) -> anyhow::Result<()> {
    debug!(file = %path.display(), "saving snapshot atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let mut temp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut temp, tables)?;
    writeln!(temp)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use taskdeck_shared::FetchParams;
    use tempfile::tempdir;

    use super::*;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn fetch_orders_filters_and_projects() {
        let backend = MemoryBackend::new();
        backend.seed(
            Table::Subtask,
            vec![
                record(json!({"Name": "b", "Task": 1, "Status": "Blocked"})),
                record(json!({"Name": "a", "Task": 2})),
                record(json!({"Name": "c", "Task": 1})),
            ],
        );

        let params = FetchParams::fields(&["Name"])
            .order_by("Name", SortType::Desc)
            .where_exact("Task", vec![json!(1)]);
        let rows = backend.fetch_now(Table::Subtask, &params).expect("fetch");

        let names: Vec<_> = rows.iter().map(|r| r["Name"].clone()).collect();
        assert_eq!(names, vec![json!("c"), json!("b")]);
        assert!(rows.iter().all(|r| !r.contains_key("Status")));
        assert!(rows.iter().all(|r| r.contains_key(ID_FIELD)));
    }

    #[test]
    fn missing_sort_field_sorts_first() {
        let backend = MemoryBackend::new();
        backend.seed(
            Table::Task,
            vec![
                record(json!({"title": "two", "order": 2})),
                record(json!({"title": "none"})),
                record(json!({"title": "one", "order": 1})),
            ],
        );

        let rows = backend
            .fetch_now(
                Table::Task,
                &FetchParams::default().order_by("order", SortType::Asc),
            )
            .expect("fetch");
        let titles: Vec<_> = rows.iter().map(|r| r["title"].clone()).collect();
        assert_eq!(titles, vec![json!("none"), json!("one"), json!("two")]);
    }

    #[test]
    fn injected_failures_are_per_record() {
        let backend = MemoryBackend::new();
        let ids = backend.seed(
            Table::Task,
            vec![record(json!({"title": "a"})), record(json!({"title": "b"}))],
        );
        backend.fail_record(Table::Task, ids[1], "locked");

        let results = backend
            .update_now(
                Table::Task,
                ids.iter()
                    .map(|id| record(json!({"Id": id, "completed": true})))
                    .collect(),
            )
            .expect("update");

        assert!(results[0].success);
        assert!(!results[1].success);
        assert_eq!(results[1].message.as_deref(), Some("locked"));
    }

    #[test]
    fn offline_fails_whole_call() {
        let backend = MemoryBackend::new();
        backend.set_offline(true);
        assert!(backend.fetch_now(Table::Task, &FetchParams::default()).is_err());
        backend.reset();
        assert!(backend.fetch_now(Table::Task, &FetchParams::default()).is_ok());
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let backend = MemoryBackend::new();
        let created = backend
            .create_now(Table::Category, vec![record(json!({"Name": "x"}))])
            .expect("create");
        let first = created[0].id.expect("id");
        backend.delete_now(Table::Category, vec![first]).expect("delete");

        let again = backend
            .create_now(Table::Category, vec![record(json!({"Name": "y"}))])
            .expect("create");
        assert!(again[0].id.expect("id") > first);
    }

    #[test]
    fn snapshot_roundtrip() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("store.json");

        let backend = MemoryBackend::open(&path).expect("open");
        backend.seed(Table::Task, vec![record(json!({"title": "persist me"}))]);
        backend.flush().expect("flush");

        let reopened = MemoryBackend::open(&path).expect("reopen");
        assert_eq!(reopened.len(Table::Task), 1);
        let created = reopened
            .create_now(Table::Task, vec![record(json!({"title": "next"}))])
            .expect("create");
        assert_eq!(created[0].id, Some(2));
    }
}

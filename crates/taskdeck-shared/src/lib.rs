//! Record shapes exchanged with the
//! hosted record backend.
//!
//! Field names follow the backend's
//! schema verbatim (`Id`, `Name`,
//! `due_date`, ...). Nothing outside
//! the store adapter should touch these
//! types directly.

use serde::{
  Deserialize,
  Serialize
};
use serde_json::{
  Map,
  Value
};

/// A raw backend record.
pub type Record = Map<String, Value>;

pub type RecordId = u64;

pub const ID_FIELD: &str = "Id";

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum Table {
  Task,
  Category,
  Subtask
}

impl Table {
  pub fn as_str(&self) -> &'static str {
    match self {
      | Table::Task => "task",
      | Table::Category => "category",
      | Table::Subtask => "subtask"
    }
  }
}

impl std::fmt::Display for Table {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>
  ) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct TaskRecord {
  #[serde(rename = "Id")]
  pub id:           RecordId,
  #[serde(rename = "Name", default)]
  pub name:         Option<String>,
  #[serde(default)]
  pub title:        Option<String>,
  #[serde(default)]
  pub completed:    Option<bool>,
  #[serde(default)]
  pub category:     Option<RecordId>,
  #[serde(default)]
  pub priority:     Option<String>,
  #[serde(default)]
  pub due_date:     Option<String>,
  #[serde(default)]
  pub created_at:   Option<String>,
  #[serde(default)]
  pub completed_at: Option<String>,
  #[serde(default)]
  pub order:        Option<i64>
}

pub const TASK_FIELDS: &[&str] = &[
  "Name",
  "title",
  "completed",
  "category",
  "priority",
  "due_date",
  "created_at",
  "completed_at",
  "order"
];

/// Fields written on create/update.
/// `None` leaves a field untouched,
/// `Some(None)` writes `null`.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
  PartialEq,
)]
pub struct TaskRecordWrite {
  #[serde(
    rename = "Id",
    skip_serializing_if = "Option::is_none"
  )]
  pub id:           Option<RecordId>,
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub title:        Option<String>,
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub completed:    Option<bool>,
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub category: Option<Option<RecordId>>,
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub priority:     Option<String>,
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub due_date: Option<Option<String>>,
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub created_at:   Option<String>,
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub completed_at:
    Option<Option<String>>,
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub order:        Option<i64>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct CategoryRecord {
  #[serde(rename = "Id")]
  pub id:         RecordId,
  #[serde(rename = "Name", default)]
  pub name:       Option<String>,
  #[serde(default)]
  pub color:      Option<String>,
  #[serde(default)]
  pub task_count: Option<u64>
}

pub const CATEGORY_FIELDS: &[&str] =
  &["Name", "color", "task_count"];

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
  PartialEq,
)]
pub struct CategoryRecordWrite {
  #[serde(
    rename = "Id",
    skip_serializing_if = "Option::is_none"
  )]
  pub id:         Option<RecordId>,
  #[serde(
    rename = "Name",
    skip_serializing_if = "Option::is_none"
  )]
  pub name:       Option<String>,
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub color:      Option<String>,
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub task_count: Option<u64>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct SubtaskRecord {
  #[serde(rename = "Id")]
  pub id:          RecordId,
  #[serde(rename = "Name", default)]
  pub name:        Option<String>,
  #[serde(
    rename = "Description",
    default
  )]
  pub description: Option<String>,
  #[serde(rename = "Status", default)]
  pub status:      Option<String>,
  #[serde(rename = "Task", default)]
  pub task:        Option<RecordId>
}

pub const SUBTASK_FIELDS: &[&str] =
  &["Name", "Description", "Status", "Task"];

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
  PartialEq,
)]
pub struct SubtaskRecordWrite {
  #[serde(
    rename = "Id",
    skip_serializing_if = "Option::is_none"
  )]
  pub id:          Option<RecordId>,
  #[serde(
    rename = "Name",
    skip_serializing_if = "Option::is_none"
  )]
  pub name:        Option<String>,
  #[serde(
    rename = "Description",
    skip_serializing_if = "Option::is_none"
  )]
  pub description: Option<String>,
  #[serde(
    rename = "Status",
    skip_serializing_if = "Option::is_none"
  )]
  pub status:      Option<String>,
  #[serde(
    rename = "Task",
    skip_serializing_if = "Option::is_none"
  )]
  pub task:        Option<RecordId>
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortType {
  #[default]
  Asc,
  Desc
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "PascalCase")]
pub struct OrderBy {
  pub field_name: String,
  pub sort_type:  SortType
}

/// Exact-match condition: the field
/// must equal one of `values`.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(rename_all = "PascalCase")]
pub struct WhereExact {
  pub field_name: String,
  pub values:     Vec<Value>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
  PartialEq,
)]
pub struct FetchParams {
  #[serde(rename = "Fields", default)]
  pub fields:      Vec<String>,
  #[serde(rename = "orderBy", default)]
  pub order_by:    Vec<OrderBy>,
  #[serde(rename = "where", default)]
  pub where_exact: Vec<WhereExact>
}

impl FetchParams {
  pub fn fields(
    fields: &[&str]
  ) -> Self {
    Self {
      fields: fields
        .iter()
        .map(|f| f.to_string())
        .collect(),
      ..Self::default()
    }
  }

  pub fn order_by(
    mut self,
    field: &str,
    sort_type: SortType
  ) -> Self {
    self.order_by.push(OrderBy {
      field_name: field.to_string(),
      sort_type
    });
    self
  }

  pub fn where_exact(
    mut self,
    field: &str,
    values: Vec<Value>
  ) -> Self {
    self.where_exact.push(WhereExact {
      field_name: field.to_string(),
      values
    });
    self
  }
}

/// Per-record outcome of a batched
/// create, update or delete.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct RecordResult {
  pub success: bool,
  #[serde(default)]
  pub id:      Option<RecordId>,
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub data:    Option<Record>
}

impl RecordResult {
  pub fn ok(
    id: RecordId,
    data: Option<Record>
  ) -> Self {
    Self {
      success: true,
      id: Some(id),
      message: None,
      data
    }
  }

  pub fn failed(
    id: Option<RecordId>,
    message: impl Into<String>
  ) -> Self {
    Self {
      success: false,
      id,
      message: Some(message.into()),
      data: None
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn task_write_skips_untouched_and_nulls_cleared()
   {
    let write = TaskRecordWrite {
      id: Some(4),
      completed: Some(false),
      completed_at: Some(None),
      ..TaskRecordWrite::default()
    };

    let value =
      serde_json::to_value(&write)
        .expect("serialize");
    assert_eq!(
      value,
      json!({
        "Id": 4,
        "completed": false,
        "completed_at": null
      })
    );
  }

  #[test]
  fn subtask_record_reads_backend_field_names()
   {
    let record: SubtaskRecord =
      serde_json::from_value(json!({
        "Id": 9,
        "Name": "Draft outline",
        "Status": "In Progress",
        "Task": 3
      }))
      .expect("deserialize");

    assert_eq!(record.id, 9);
    assert_eq!(
      record.status.as_deref(),
      Some("In Progress")
    );
    assert_eq!(record.task, Some(3));
    assert!(
      record.description.is_none()
    );
  }
}

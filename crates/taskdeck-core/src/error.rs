use std::time::Duration;

use taskdeck_shared::{RecordId, Table};
use thiserror::Error;

/// Failure of a store round-trip.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{table} {id} not found")]
    NotFound { table: Table, id: RecordId },

    #[error("{table} {op} failed: {message}")]
    Backend {
        table: Table,
        op: &'static str,
        message: String,
    },

    #[error("{table} {op} timed out after {}ms", after.as_millis())]
    Timeout {
        table: Table,
        op: &'static str,
        after: Duration,
    },

    #[error("malformed {table} record: {message}")]
    Decode { table: Table, message: String },
}

impl StoreError {
    pub fn backend(table: Table, op: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            table,
            op,
            message: message.into(),
        }
    }

    pub fn decode(table: Table, message: impl Into<String>) -> Self {
        Self::Decode {
            table,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// A single field that failed local validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("a submission is already in flight")]
    Busy,

    #[error("{}", join_messages(.0))]
    Invalid(Vec<ValidationError>),

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn join_messages(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReorderError {
    #[error("move {from} -> {to} is outside a list of {len} tasks")]
    OutOfRange { from: usize, to: usize, len: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

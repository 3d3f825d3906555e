use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

pub use crate::id::SubtaskId;
use crate::id::TaskId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum SubtaskStatus {
    #[default]
    #[serde(rename = "Not Started")]
    NotStarted,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    Blocked,
}

impl SubtaskStatus {
    pub const ALL: [SubtaskStatus; 4] = [
        SubtaskStatus::NotStarted,
        SubtaskStatus::InProgress,
        SubtaskStatus::Completed,
        SubtaskStatus::Blocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubtaskStatus::NotStarted => "Not Started",
            SubtaskStatus::InProgress => "In Progress",
            SubtaskStatus::Completed => "Completed",
            SubtaskStatus::Blocked => "Blocked",
        }
    }
}

impl fmt::Display for SubtaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubtaskStatus {
    type Err = anyhow::Error;

    /// Accepts the stored spelling as well as `not-started` / `in_progress` style input.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "notstarted" => Ok(SubtaskStatus::NotStarted),
            "inprogress" => Ok(SubtaskStatus::InProgress),
            "completed" | "done" => Ok(SubtaskStatus::Completed),
            "blocked" => Ok(SubtaskStatus::Blocked),
            _ => Err(anyhow!("unknown subtask status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subtask {
    pub id: SubtaskId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: SubtaskStatus,
    pub task_id: TaskId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSubtask {
    pub task_id: TaskId,
    pub name: String,
    pub description: String,
    pub status: SubtaskStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubtaskPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<SubtaskStatus>,
}

#[cfg(test)]
mod tests {
    use super::SubtaskStatus;

    #[test]
    fn status_parses_stored_and_cli_spellings() {
        for status in SubtaskStatus::ALL {
            assert_eq!(status.as_str().parse::<SubtaskStatus>().ok(), Some(status));
        }
        assert_eq!(
            "in-progress".parse::<SubtaskStatus>().ok(),
            Some(SubtaskStatus::InProgress)
        );
        assert!("waiting".parse::<SubtaskStatus>().is_err());
    }
}

use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::category::{COLOR_OPTIONS, CategoryId};
use crate::filter::{Selector, StatusFilter, TaskFilter};
use crate::subtask::{SubtaskId, SubtaskStatus};
use crate::task::{Priority, TaskId};

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "taskdeck",
    version,
    about = "Taskdeck: tasks, categories and subtasks from the terminal",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "taskdeckrc", global = true)]
    pub taskdeckrc: Option<PathBuf>,

    /// Store snapshot file; overrides `data.location`.
    #[arg(long = "store", global = true)]
    pub store: Option<PathBuf>,

    /// Answer yes to every delete confirmation.
    #[arg(short = 'y', long = "yes", global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// The four list predicates, shared by every command that works on the
/// filtered view.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Case-insensitive title substring.
    #[arg(short = 's', long = "search")]
    pub search: Option<String>,

    /// Category id, or `all`.
    #[arg(long = "category", default_value = "all")]
    pub category: Selector<CategoryId>,

    /// low, medium, high, or `all`.
    #[arg(long = "priority", default_value = "all")]
    pub priority: Selector<Priority>,

    /// all, completed or incomplete.
    #[arg(long = "status", default_value = "all")]
    pub status: StatusFilter,
}

impl FilterArgs {
    pub fn to_filter(&self) -> TaskFilter {
        TaskFilter {
            search: self.search.clone().unwrap_or_default(),
            category: self.category,
            priority: self.priority,
            status: self.status,
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show the filtered task list.
    List {
        #[command(flatten)]
        filter: FilterArgs,

        #[arg(long)]
        json: bool,
    },

    /// Create a task at the end of its category.
    Add {
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,

        #[arg(short = 'c', long)]
        category: Option<CategoryId>,

        #[arg(short = 'p', long, default_value = "medium")]
        priority: Priority,

        /// RFC 3339 timestamp or YYYY-MM-DD.
        #[arg(long, value_parser = parse_due)]
        due: Option<DateTime<Utc>>,
    },

    /// Change fields of one task.
    Edit {
        id: TaskId,

        #[arg(long)]
        title: Option<String>,

        #[arg(short = 'c', long)]
        category: Option<CategoryId>,

        #[arg(short = 'p', long)]
        priority: Option<Priority>,

        #[arg(long, value_parser = parse_due, conflicts_with = "no_due")]
        due: Option<DateTime<Utc>>,

        #[arg(long)]
        no_due: bool,
    },

    /// Mark a task complete.
    Done { id: TaskId },

    /// Mark a task incomplete.
    Undone { id: TaskId },

    Delete { id: TaskId },

    /// Act on several tasks of the filtered view at once.
    Bulk {
        #[command(subcommand)]
        action: BulkAction,
    },

    /// Move the task at one list position to another (1-based, within the
    /// filtered view).
    Move {
        from: usize,
        to: usize,

        #[command(flatten)]
        filter: FilterArgs,
    },

    Category {
        #[command(subcommand)]
        action: CategoryCommand,
    },

    Subtask {
        #[command(subcommand)]
        action: SubtaskCommand,
    },

    /// Counts per status, priority and category.
    Facets {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum BulkAction {
    Complete(BulkTarget),
    Delete(BulkTarget),
}

/// Ids to select; with none given every visible task is selected.
#[derive(Args, Debug, Clone)]
pub struct BulkTarget {
    pub ids: Vec<TaskId>,

    #[command(flatten)]
    pub filter: FilterArgs,
}

fn color_help() -> String {
    format!("Hex color #RRGGBB, e.g. one of {}", COLOR_OPTIONS.join(", "))
}

#[derive(Subcommand, Debug, Clone)]
pub enum CategoryCommand {
    List {
        #[arg(long)]
        json: bool,
    },
    Add {
        name: String,

        #[arg(long, help = color_help())]
        color: Option<String>,
    },
    Edit {
        id: CategoryId,

        #[arg(long)]
        name: Option<String>,

        #[arg(long, help = color_help())]
        color: Option<String>,
    },
    Delete {
        id: CategoryId,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubtaskCommand {
    List {
        task: TaskId,
    },
    Add {
        task: TaskId,
        name: String,

        #[arg(short = 'd', long, default_value = "")]
        description: String,

        #[arg(long, default_value = "Not Started")]
        status: SubtaskStatus,
    },
    Status {
        id: SubtaskId,
        status: SubtaskStatus,
    },
    Delete {
        id: SubtaskId,
    },
}

/// Accept a full RFC 3339 timestamp or a bare local date (start of that day).
pub fn parse_due(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }

    let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| anyhow!("expected YYYY-MM-DD or an RFC 3339 timestamp, got: {raw}"))?;
    let midnight = day.and_time(chrono::NaiveTime::MIN);
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map(|at| at.with_timezone(&Utc))
        .ok_or_else(|| anyhow!("{raw} has no local midnight"))
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pull positional `rc.key=value` (or `rc.key:value`) overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn cli_definition_is_consistent() {
        GlobalCli::command().debug_assert();
    }

    #[test]
    fn category_color_help_lists_palette() {
        let mut cmd = GlobalCli::command();
        let help = cmd
            .find_subcommand_mut("category")
            .and_then(|category| category.find_subcommand_mut("add"))
            .expect("category add")
            .render_help()
            .to_string();
        for color in COLOR_OPTIONS {
            assert!(help.contains(color), "{color} missing from help");
        }
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let pre = preprocess_args(&os(&["taskdeck", "rc.color=off", "list", "rc.confirm:no"]))
            .expect("preprocess");
        assert_eq!(pre.cleaned_args, os(&["taskdeck", "list"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.color".to_string(), "off".to_string()),
                ("rc.confirm".to_string(), "no".to_string()),
            ]
        );
    }

    #[test]
    fn list_filters_parse_into_a_task_filter() {
        let cli = GlobalCli::try_parse_from([
            "taskdeck",
            "list",
            "--search",
            "rent",
            "--category",
            "3",
            "--status",
            "incomplete",
        ])
        .expect("parse");

        let Some(Command::List { filter, json }) = cli.command else {
            panic!("expected list");
        };
        assert!(!json);
        let filter = filter.to_filter();
        assert_eq!(filter.search, "rent");
        assert_eq!(filter.category, Selector::Only(CategoryId(3)));
        assert!(filter.priority.is_all());
        assert_eq!(filter.status, StatusFilter::Incomplete);
    }

    #[test]
    fn due_accepts_dates_and_timestamps() {
        let at = parse_due("2026-03-01T09:00:00Z").expect("rfc3339");
        assert_eq!(at, Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
        assert!(parse_due("2026-03-01").is_ok());
        assert!(parse_due("next week").is_err());
    }
}

use std::io::{self, IsTerminal, Write};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use unicode_width::UnicodeWidthStr;

use crate::category::Category;
use crate::config::Config;
use crate::due::DueLabel;
use crate::filter::Facets;
use crate::notify::{Notice, NoticeLevel, Notifier, TracingNotifier};
use crate::subtask::{Subtask, SubtaskStatus};
use crate::task::{Priority, Task};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    /// Notifier printing to stderr with the same color setting.
    pub fn notifier(&self) -> ConsoleNotifier {
        ConsoleNotifier { color: self.color }
    }

    /// `tasks` must already be in display order; the `#` column is the
    /// 1-based position used by `move`.
    #[tracing::instrument(skip(self, tasks, categories, now))]
    pub fn print_task_table(
        &mut self,
        tasks: &[Task],
        categories: &[Category],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let now = now.with_timezone(&Local);

        let headers = ["#", "ID", "Done", "Priority", "Category", "Due", "Title"]
            .map(String::from)
            .to_vec();

        let mut rows = Vec::with_capacity(tasks.len());
        for (position, task) in tasks.iter().enumerate() {
            let done = if task.completed { "[x]" } else { "[ ]" };

            let due = match task.due_date {
                Some(due) => {
                    let label = DueLabel::classify(due, &now);
                    if label.is_urgent() && !task.completed {
                        self.paint(&label.to_string(), "31")
                    } else {
                        label.to_string()
                    }
                }
                None => String::new(),
            };

            let category = task
                .category
                .and_then(|id| categories.iter().find(|c| c.id == id))
                .map(|c| c.name.clone())
                .unwrap_or_default();

            let title = if task.completed {
                self.paint(&task.title, "2")
            } else {
                task.title.clone()
            };

            rows.push(vec![
                (position + 1).to_string(),
                self.paint(&task.id.to_string(), "33"),
                done.to_string(),
                self.paint_priority(task.priority),
                category,
                due,
                title,
            ]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    pub fn print_empty(&mut self, filtered: bool) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if filtered {
            writeln!(out, "No tasks match the current filters.")?;
        } else {
            writeln!(out, "No tasks yet. Add one with `taskdeck add`.")?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, categories))]
    pub fn print_categories(&mut self, categories: &[Category]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = ["ID", "Color", "Tasks", "Name"].map(String::from).to_vec();
        let rows = categories
            .iter()
            .map(|category| {
                vec![
                    self.paint(&category.id.to_string(), "33"),
                    category.color.clone(),
                    category.task_count.to_string(),
                    category.name.clone(),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, subtasks))]
    pub fn print_subtasks(&mut self, subtasks: &[Subtask]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if subtasks.is_empty() {
            writeln!(out, "No subtasks.")?;
            return Ok(());
        }

        let headers = ["ID", "Status", "Name", "Description"]
            .map(String::from)
            .to_vec();
        let rows = subtasks
            .iter()
            .map(|subtask| {
                let status = match subtask.status {
                    SubtaskStatus::Completed => self.paint(subtask.status.as_str(), "32"),
                    SubtaskStatus::Blocked => self.paint(subtask.status.as_str(), "31"),
                    _ => subtask.status.to_string(),
                };
                vec![
                    self.paint(&subtask.id.to_string(), "33"),
                    status,
                    subtask.name.clone(),
                    subtask.description.clone(),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    pub fn print_facets(&mut self, facets: &Facets) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "all          {}", facets.total)?;
        writeln!(out, "completed    {}", facets.completed)?;
        writeln!(out, "incomplete   {}", facets.incomplete)?;
        for (priority, count) in &facets.by_priority {
            writeln!(out, "{:<12} {count}", priority.as_str())?;
        }
        for (_, name, count) in &facets.by_category {
            writeln!(out, "{name:<12} {count}")?;
        }
        Ok(())
    }

    pub fn print_json<T: Serialize + ?Sized>(&mut self, value: &T) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        serde_json::to_writer_pretty(&mut out, value).context("failed to serialize output")?;
        writeln!(out)?;
        Ok(())
    }

    fn paint_priority(&self, priority: Priority) -> String {
        match priority {
            Priority::High => self.paint(priority.as_str(), "31"),
            Priority::Medium => self.paint(priority.as_str(), "33"),
            Priority::Low => self.paint(priority.as_str(), "32"),
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

/// Prints notices to stderr, one per line, and logs them.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleNotifier {
    color: bool,
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        TracingNotifier.notify(notice.clone());
        let painted = self.color && io::stderr().is_terminal();
        let line = match (notice.level, painted) {
            (NoticeLevel::Success, true) => format!("\x1b[32m{}\x1b[0m", notice.message),
            (NoticeLevel::Error, true) => format!("\x1b[31m{}\x1b[0m", notice.message),
            (_, false) => notice.message,
        };
        let _ = writeln!(io::stderr().lock(), "{line}");
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_pads_by_visible_width() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["ID".to_string(), "Title".to_string()],
            vec![
                vec!["\x1b[33m1\x1b[0m".to_string(), "Buy milk".to_string()],
                vec!["12".to_string(), "Pay rent".to_string()],
            ],
        )
        .expect("write");

        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ID Title    ");
        assert_eq!(lines[1], "-- -------- ");
        assert_eq!(strip_ansi(lines[2]), "1  Buy milk ");
    }

    #[test]
    fn invalid_color_setting_is_rejected() {
        let mut cfg = Config::defaults();
        cfg.apply_overrides(vec![("color".to_string(), "maybe".to_string())]);
        assert!(Renderer::new(&cfg).is_err());
    }
}

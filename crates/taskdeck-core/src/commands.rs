use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, anyhow, bail};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::backend::RecordBackend;
use crate::board::{Confirm, ListView, LoadState, TaskBoard};
use crate::cli::{BulkAction, BulkTarget, CategoryCommand, Command, FilterArgs, SubtaskCommand};
use crate::config::Config;
use crate::error::FormError;
use crate::forms::{CategoryForm, SubtaskForm, TaskForm};
use crate::notify::Notifier;
use crate::render::Renderer;
use crate::task::{Task, TaskId};

/// Delete confirmation for the terminal: `confirm = off` or `--yes` skips
/// the prompt, and without a terminal on stdin the answer is no.
#[derive(Debug, Clone, Copy)]
pub struct TerminalConfirm {
    assume_yes: bool,
}

impl TerminalConfirm {
    pub fn new(cfg: &Config, yes_flag: bool) -> Self {
        let prompt = cfg.get_bool("confirm").unwrap_or(true);
        Self {
            assume_yes: yes_flag || !prompt,
        }
    }
}

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        if !io::stdin().is_terminal() {
            warn!(prompt, "no terminal to confirm on; declining");
            return false;
        }

        let mut err = io::stderr().lock();
        if write!(err, "{prompt} (yes/no) ").and_then(|()| err.flush()).is_err() {
            return false;
        }
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

#[instrument(skip(board, cfg, renderer, confirm, command))]
pub async fn dispatch<B, N>(
    board: &mut TaskBoard<B, N>,
    cfg: &Config,
    renderer: &mut Renderer,
    confirm: &TerminalConfirm,
    command: Command,
) -> anyhow::Result<()>
where
    B: RecordBackend,
    N: Notifier,
{
    board.refresh().await;
    if let LoadState::Failed(message) = board.load_state() {
        bail!("could not load tasks: {message}");
    }

    match command {
        Command::List { filter, json } => cmd_list(board, renderer, &filter, json),
        Command::Add {
            title,
            category,
            priority,
            due,
        } => {
            let mut form = TaskForm::create();
            form.set_title(title.join(" "))?;
            form.set_category(category)?;
            form.set_priority(priority)?;
            form.set_due_date(due)?;
            let task = submit(board.submit_task_form(&mut form).await)?;
            info!(id = %task.id, "created task");
            println!("Created task {}.", task.id);
            Ok(())
        }
        Command::Edit {
            id,
            title,
            category,
            priority,
            due,
            no_due,
        } => {
            let task = find_task(board, id)?;
            let mut form = TaskForm::edit(&task);
            if let Some(title) = title {
                form.set_title(title)?;
            }
            if let Some(category) = category {
                form.set_category(Some(category))?;
            }
            if let Some(priority) = priority {
                form.set_priority(priority)?;
            }
            if no_due {
                form.set_due_date(None)?;
            } else if let Some(due) = due {
                form.set_due_date(Some(due))?;
            }
            submit(board.submit_task_form(&mut form).await)?;
            Ok(())
        }
        Command::Done { id } => cmd_set_completed(board, id, true).await,
        Command::Undone { id } => cmd_set_completed(board, id, false).await,
        Command::Delete { id } => {
            if !board.delete_task(id, confirm).await? {
                println!("Nothing deleted.");
            }
            Ok(())
        }
        Command::Bulk { action } => cmd_bulk(board, confirm, action).await,
        Command::Move { from, to, filter } => {
            board.set_filter(filter.to_filter());
            let from = position(from)?;
            let to = position(to)?;
            if !board.move_task(from, to).await? {
                debug!(from, to, "move is a no-op");
            }
            Ok(())
        }
        Command::Category { action } => cmd_category(board, cfg, renderer, confirm, action).await,
        Command::Subtask { action } => cmd_subtask(board, renderer, confirm, action).await,
        Command::Facets { json } => {
            let facets = board.facets();
            if json {
                renderer.print_json(&facets)
            } else {
                renderer.print_facets(&facets)
            }
        }
    }
}

fn cmd_list<B: RecordBackend, N: Notifier>(
    board: &mut TaskBoard<B, N>,
    renderer: &mut Renderer,
    filter: &FilterArgs,
    json: bool,
) -> anyhow::Result<()> {
    board.set_filter(filter.to_filter());
    if json {
        return renderer.print_json(&board.visible());
    }

    match board.view() {
        ListView::Tasks(tasks) => renderer.print_task_table(&tasks, board.categories(), Utc::now()),
        ListView::Empty { filtered } => renderer.print_empty(filtered),
        ListView::Failed(message) => Err(anyhow!("could not load tasks: {message}")),
        ListView::Loading => Ok(()),
    }
}

async fn cmd_set_completed<B: RecordBackend, N: Notifier>(
    board: &mut TaskBoard<B, N>,
    id: TaskId,
    completed: bool,
) -> anyhow::Result<()> {
    let task = find_task(board, id)?;
    if task.completed == completed {
        println!(
            "Task {id} is already {}.",
            if completed { "complete" } else { "incomplete" }
        );
        return Ok(());
    }
    board.toggle_complete(id).await?;
    Ok(())
}

async fn cmd_bulk<B: RecordBackend, N: Notifier>(
    board: &mut TaskBoard<B, N>,
    confirm: &TerminalConfirm,
    action: BulkAction,
) -> anyhow::Result<()> {
    let (BulkAction::Complete(target) | BulkAction::Delete(target)) = &action;
    select_targets(board, target)?;

    let (attempted, failed) = match action {
        BulkAction::Complete(_) => match board.bulk_complete().await? {
            Some(outcome) => (outcome.attempted(), outcome.failed.len()),
            None => (0, 0),
        },
        BulkAction::Delete(_) => match board.bulk_delete(confirm).await? {
            Some(outcome) => (outcome.attempted(), outcome.failed.len()),
            None => (0, 0),
        },
    };

    if attempted == 0 {
        println!("Nothing to do.");
    } else if failed > 0 {
        bail!("{failed} of {attempted} tasks were not updated");
    }
    Ok(())
}

fn select_targets<B: RecordBackend, N: Notifier>(
    board: &mut TaskBoard<B, N>,
    target: &BulkTarget,
) -> anyhow::Result<()> {
    board.set_filter(target.filter.to_filter());
    if target.ids.is_empty() {
        board.select_all(true);
        return Ok(());
    }
    for id in &target.ids {
        if !board.set_selected(*id, true) {
            bail!("task {id} is not in the filtered list");
        }
    }
    Ok(())
}

async fn cmd_category<B: RecordBackend, N: Notifier>(
    board: &mut TaskBoard<B, N>,
    cfg: &Config,
    renderer: &mut Renderer,
    confirm: &TerminalConfirm,
    action: CategoryCommand,
) -> anyhow::Result<()> {
    match action {
        CategoryCommand::List { json } => {
            if json {
                renderer.print_json(board.categories())
            } else {
                renderer.print_categories(board.categories())
            }
        }
        CategoryCommand::Add { name, color } => {
            let mut form = CategoryForm::create_with_color(cfg.category_color());
            form.set_name(name)?;
            if let Some(color) = color {
                form.set_color(color)?;
            }
            let category = submit(board.submit_category_form(&mut form).await)?;
            println!("Created category {}.", category.id);
            Ok(())
        }
        CategoryCommand::Edit { id, name, color } => {
            let category = board
                .categories()
                .iter()
                .find(|category| category.id == id)
                .cloned()
                .ok_or_else(|| anyhow!("category {id} not found"))?;
            let mut form = CategoryForm::edit(&category);
            if let Some(name) = name {
                form.set_name(name)?;
            }
            if let Some(color) = color {
                form.set_color(color)?;
            }
            submit(board.submit_category_form(&mut form).await)?;
            Ok(())
        }
        CategoryCommand::Delete { id } => {
            if !board.delete_category(id, confirm).await? {
                println!("Nothing deleted.");
            }
            Ok(())
        }
    }
}

async fn cmd_subtask<B: RecordBackend, N: Notifier>(
    board: &mut TaskBoard<B, N>,
    renderer: &mut Renderer,
    confirm: &TerminalConfirm,
    action: SubtaskCommand,
) -> anyhow::Result<()> {
    match action {
        SubtaskCommand::List { task } => {
            find_task(board, task)?;
            let subtasks = board.subtasks_for(task).await;
            renderer.print_subtasks(&subtasks)
        }
        SubtaskCommand::Add {
            task,
            name,
            description,
            status,
        } => {
            find_task(board, task)?;
            let mut form = SubtaskForm::create(task);
            form.set_name(name)?;
            form.set_description(description)?;
            form.set_status(status)?;
            let subtask = submit(board.submit_subtask_form(&mut form).await)?;
            println!("Created subtask {}.", subtask.id);
            Ok(())
        }
        SubtaskCommand::Status { id, status } => {
            board.set_subtask_status(id, status).await?;
            Ok(())
        }
        SubtaskCommand::Delete { id } => {
            if !board.delete_subtask(id, confirm).await? {
                println!("Nothing deleted.");
            }
            Ok(())
        }
    }
}

fn find_task<B: RecordBackend, N: Notifier>(
    board: &TaskBoard<B, N>,
    id: TaskId,
) -> anyhow::Result<Task> {
    board
        .tasks()
        .iter()
        .find(|task| task.id == id)
        .cloned()
        .ok_or_else(|| anyhow!("task {id} not found"))
}

/// Turn 1-based list positions into indexes.
fn position(value: usize) -> anyhow::Result<usize> {
    value
        .checked_sub(1)
        .ok_or_else(|| anyhow!("list positions start at 1"))
}

/// Validation messages go straight to the user; store failures were
/// already announced by the board.
fn submit<T>(result: Result<T, FormError>) -> anyhow::Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(FormError::Invalid(errors)) => {
            let fields = errors
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect::<Vec<_>>()
                .join("; ");
            Err(anyhow!("invalid input ({fields})"))
        }
        Err(err) => Err(err).context("submission failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::notify::RecordingNotifier;
    use crate::store::Store;
    use crate::task::{NewTask, Priority};

    #[test]
    fn positions_are_one_based() {
        assert_eq!(position(1).expect("valid"), 0);
        assert!(position(0).is_err());
    }

    #[test]
    fn confirm_off_answers_yes() {
        let mut cfg = Config::defaults();
        cfg.apply_overrides(vec![("confirm".to_string(), "off".to_string())]);
        assert!(TerminalConfirm::new(&cfg, false).confirm("delete?"));
        assert!(TerminalConfirm::new(&Config::defaults(), true).confirm("delete?"));
    }

    #[test]
    fn invalid_form_lists_every_field() {
        let mut form = TaskForm::create();
        let err = submit(form.begin_submit()).expect_err("invalid");
        assert_eq!(
            err.to_string(),
            "invalid input (title: title required; category: category required)"
        );
    }

    #[tokio::test]
    async fn repeated_bulk_ids_stay_selected() {
        let mut board = TaskBoard::new(Store::new(MemoryBackend::new()), RecordingNotifier::new());
        let task = board
            .store()
            .create_task(NewTask {
                title: "Buy milk".to_string(),
                category: None,
                priority: Priority::Low,
                due_date: None,
            })
            .await
            .expect("create");
        board.refresh().await;

        let target = BulkTarget {
            ids: vec![task.id, task.id],
            filter: FilterArgs::default(),
        };
        select_targets(&mut board, &target).expect("duplicates are fine");
        assert_eq!(board.selection().ids(), vec![task.id]);
    }
}

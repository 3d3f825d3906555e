//! List-view controller: cached collections, filter, selection and every
//! user action that mutates the store.
//!
//! Each mutation notifies once, then re-reads the store so the visible list
//! is always derived from what was actually committed.

use taskdeck_shared::Table;
use tracing::{debug, info, warn};

use crate::backend::RecordBackend;
use crate::category::{Category, CategoryId, with_task_counts};
use crate::error::{FormError, ReorderError, StoreError, StoreResult};
use crate::filter::{Facets, TaskFilter};
use crate::forms::{CategoryForm, FormMode, SubtaskForm, TaskForm};
use crate::notify::Notifier;
use crate::reorder::ReorderPlan;
use crate::selection::Selection;
use crate::store::{BulkFailure, BulkOutcome, Store};
use crate::subtask::{Subtask, SubtaskId, SubtaskPatch, SubtaskStatus};
use crate::task::{Task, TaskId, TaskPatch};

/// Asked before anything is deleted.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F: Fn(&str) -> bool> Confirm for F {
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed(String),
}

/// What the list area should show.
#[derive(Debug, Clone, PartialEq)]
pub enum ListView {
    Loading,
    Failed(String),
    /// Nothing to show; `filtered` tells "no matches" apart from "no tasks".
    Empty { filtered: bool },
    Tasks(Vec<Task>),
}

pub struct TaskBoard<B, N> {
    store: Store<B>,
    notifier: N,
    state: LoadState,
    tasks: Vec<Task>,
    categories: Vec<Category>,
    filter: TaskFilter,
    selection: Selection,
}

impl<B: RecordBackend, N: Notifier> TaskBoard<B, N> {
    pub fn new(store: Store<B>, notifier: N) -> Self {
        Self {
            store,
            notifier,
            state: LoadState::Idle,
            tasks: Vec::new(),
            categories: Vec::new(),
            filter: TaskFilter::default(),
            selection: Selection::new(),
        }
    }

    pub fn store(&self) -> &Store<B> {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn load_state(&self) -> &LoadState {
        &self.state
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn filter(&self) -> &TaskFilter {
        &self.filter
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Re-read tasks and categories. A failed read leaves both caches empty
    /// and the board in [`LoadState::Failed`].
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&mut self) {
        self.state = LoadState::Loading;
        let (tasks, categories) =
            tokio::join!(self.store.tasks(), self.store.categories_without_counts());

        match tasks.and_then(|tasks| categories.map(|categories| (tasks, categories))) {
            Ok((tasks, categories)) => {
                let categories = with_task_counts(categories, &tasks);
                debug!(tasks = tasks.len(), categories = categories.len(), "board refreshed");
                self.tasks = tasks;
                self.categories = categories;
                self.state = LoadState::Ready;
                let visible = self.visible();
                self.selection.retain_visible(&visible);
            }
            Err(err) => {
                warn!(error = %err, "board refresh failed");
                self.tasks.clear();
                self.categories.clear();
                self.selection.clear();
                self.state = LoadState::Failed(err.to_string());
                self.notifier.error("Failed to load tasks");
            }
        }
    }

    /// Tasks passing the current filter, in display order.
    pub fn visible(&self) -> Vec<Task> {
        self.filter.apply(&self.tasks)
    }

    pub fn view(&self) -> ListView {
        match &self.state {
            LoadState::Idle | LoadState::Loading => ListView::Loading,
            LoadState::Failed(message) => ListView::Failed(message.clone()),
            LoadState::Ready => {
                let visible = self.visible();
                if visible.is_empty() {
                    ListView::Empty {
                        filtered: self.filter.is_active(),
                    }
                } else {
                    ListView::Tasks(visible)
                }
            }
        }
    }

    pub fn facets(&self) -> Facets {
        Facets::collect(&self.tasks, &self.categories)
    }

    /// Badge for a task; a dangling category reference has none.
    pub fn category_for(&self, task: &Task) -> Option<&Category> {
        let id = task.category?;
        self.categories.iter().find(|category| category.id == id)
    }

    pub fn set_filter(&mut self, filter: TaskFilter) {
        self.filter = filter;
        let visible = self.visible();
        self.selection.retain_visible(&visible);
    }

    /// Flip one task's selection. Tasks outside the filtered view cannot be selected.
    pub fn toggle_selected(&mut self, id: TaskId) -> bool {
        if !self.visible().iter().any(|task| task.id == id) {
            return false;
        }
        self.selection.toggle(id)
    }

    /// Select or deselect one visible task; repeating the call is a no-op.
    pub fn set_selected(&mut self, id: TaskId, selected: bool) -> bool {
        if !self.visible().iter().any(|task| task.id == id) {
            return false;
        }
        self.selection.set(id, selected);
        true
    }

    pub fn select_all(&mut self, selected: bool) {
        let visible = self.visible();
        self.selection.select_all(&visible, selected);
    }

    pub fn all_selected(&self) -> bool {
        self.selection.all_selected(&self.visible())
    }

    // ---- single task -------------------------------------------------------

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub async fn toggle_complete(&mut self, id: TaskId) -> StoreResult<Task> {
        let completed = match self.tasks.iter().find(|task| task.id == id) {
            Some(task) => !task.completed,
            None => match self.store.task(id).await {
                Ok(task) => !task.completed,
                Err(err) => {
                    warn!(error = %err, "task to toggle could not be read");
                    self.notifier.error("Failed to update task");
                    return Err(err);
                }
            },
        };

        let result = self
            .store
            .update_task(id, TaskPatch::completed(completed))
            .await;
        match &result {
            Ok(_) if completed => self.notifier.success("Task completed!"),
            Ok(_) => self.notifier.success("Task marked incomplete"),
            Err(_) => self.notifier.error("Failed to update task"),
        }
        self.refresh().await;
        result
    }

    /// Returns `false` when the user declined.
    #[tracing::instrument(skip(self, confirm), fields(id = %id))]
    pub async fn delete_task(&mut self, id: TaskId, confirm: &impl Confirm) -> StoreResult<bool> {
        if !confirm.confirm("Are you sure you want to delete this task?") {
            return Ok(false);
        }
        let result = self.store.delete_task(id).await;
        match &result {
            Ok(()) => self.notifier.success("Task deleted successfully"),
            Err(_) => self.notifier.error("Failed to delete task"),
        }
        self.refresh().await;
        result.map(|()| true)
    }

    // ---- bulk actions ------------------------------------------------------

    /// Mark every selected task complete. A partial failure is reported once
    /// and returned in the outcome; `None` means nothing was selected.
    #[tracing::instrument(skip(self), fields(selected = self.selection.len()))]
    pub async fn bulk_complete(&mut self) -> StoreResult<Option<BulkOutcome<Task>>> {
        let ids = self.selection.ids();
        if ids.is_empty() {
            return Ok(None);
        }

        let result = self
            .store
            .bulk_update_tasks(&ids, &TaskPatch::completed(true))
            .await;
        match &result {
            Ok(outcome) if outcome.is_complete() => self
                .notifier
                .success(format!("{} tasks marked as complete", outcome.succeeded.len())),
            Ok(outcome) => {
                log_failures("bulk complete", &outcome.failed);
                self.notifier.error("Failed to update tasks");
            }
            Err(_) => self.notifier.error("Failed to update tasks"),
        }

        self.selection.clear();
        self.refresh().await;
        result.map(Some)
    }

    /// Delete every selected task after confirmation. The selection is cleared
    /// whether or not every delete went through; `None` means nothing was
    /// selected or the user declined.
    #[tracing::instrument(skip(self, confirm), fields(selected = self.selection.len()))]
    pub async fn bulk_delete(
        &mut self,
        confirm: &impl Confirm,
    ) -> StoreResult<Option<BulkOutcome<TaskId>>> {
        let ids = self.selection.ids();
        if ids.is_empty() {
            return Ok(None);
        }
        let prompt = format!("Are you sure you want to delete {} tasks?", ids.len());
        if !confirm.confirm(&prompt) {
            return Ok(None);
        }

        let result = self.store.bulk_delete_tasks(&ids).await;
        match &result {
            Ok(outcome) if outcome.is_complete() => self
                .notifier
                .success(format!("{} tasks deleted", outcome.succeeded.len())),
            Ok(outcome) => {
                log_failures("bulk delete", &outcome.failed);
                self.notifier.error("Failed to delete tasks");
            }
            Err(_) => self.notifier.error("Failed to delete tasks"),
        }

        self.selection.clear();
        self.refresh().await;
        result.map(Some)
    }

    // ---- reorder -----------------------------------------------------------

    /// Move the visible task at `from` to `to` and persist orders `1..=N` for
    /// the visible list. Returns `false` for a no-op move. On any failure the
    /// collection is re-read so no uncommitted order stays on screen.
    #[tracing::instrument(skip(self))]
    pub async fn move_task(&mut self, from: usize, to: usize) -> Result<bool, ReorderError> {
        let Some(plan) = ReorderPlan::compute(&self.visible(), from, to)? else {
            return Ok(false);
        };

        for (id, order) in plan.assignments() {
            if let Some(task) = self.tasks.iter_mut().find(|task| task.id == id) {
                task.order = Some(order);
            }
        }

        let result = match self.store.reorder_tasks(plan.ordered_ids()).await {
            Ok(outcome) if outcome.is_complete() => Ok(()),
            Ok(outcome) => {
                log_failures("reorder", &outcome.failed);
                Err(StoreError::backend(
                    Table::Task,
                    "reorder",
                    format!(
                        "{} of {} tasks were not reordered",
                        outcome.failed.len(),
                        outcome.attempted()
                    ),
                ))
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => {
                self.notifier.success("Tasks reordered successfully");
                self.refresh().await;
                Ok(true)
            }
            Err(err) => {
                self.notifier.error("Failed to reorder tasks");
                self.refresh().await;
                Err(ReorderError::Store(err))
            }
        }
    }

    // ---- forms -------------------------------------------------------------

    pub async fn submit_task_form(&mut self, form: &mut TaskForm) -> Result<Task, FormError> {
        let creating = form.mode() == FormMode::Create;
        let result = form.submit(&self.store).await;
        match (&result, creating) {
            (Ok(_), true) => self.notifier.success("Task created successfully"),
            (Ok(_), false) => self.notifier.success("Task updated successfully"),
            (Err(FormError::Store(_)), true) => self.notifier.error("Failed to create task"),
            (Err(FormError::Store(_)), false) => self.notifier.error("Failed to update task"),
            (Err(_), _) => {}
        }
        if result.is_ok() {
            self.refresh().await;
        }
        result
    }

    pub async fn submit_category_form(
        &mut self,
        form: &mut CategoryForm,
    ) -> Result<Category, FormError> {
        let creating = form.mode() == FormMode::Create;
        let result = form.submit(&self.store).await;
        match (&result, creating) {
            (Ok(_), true) => self.notifier.success("Category created successfully"),
            (Ok(_), false) => self.notifier.success("Category updated successfully"),
            (Err(FormError::Store(_)), _) => self.notifier.error("Failed to save category"),
            (Err(_), _) => {}
        }
        if result.is_ok() {
            self.refresh().await;
        }
        result
    }

    pub async fn submit_subtask_form(
        &mut self,
        form: &mut SubtaskForm,
    ) -> Result<Subtask, FormError> {
        let creating = form.mode() == FormMode::Create;
        let result = form.submit(&self.store).await;
        match (&result, creating) {
            (Ok(_), true) => self.notifier.success("Subtask added successfully"),
            (Ok(_), false) => self.notifier.success("Subtask updated successfully"),
            (Err(FormError::Store(_)), _) => self.notifier.error("Failed to save subtask"),
            (Err(_), _) => {}
        }
        result
    }

    // ---- categories --------------------------------------------------------

    /// Tasks that referenced the category keep the dangling id and simply
    /// lose their badge.
    #[tracing::instrument(skip(self, confirm), fields(id = %id))]
    pub async fn delete_category(
        &mut self,
        id: CategoryId,
        confirm: &impl Confirm,
    ) -> StoreResult<bool> {
        if !confirm.confirm("Are you sure you want to delete this category?") {
            return Ok(false);
        }
        let result = self.store.delete_category(id).await;
        match &result {
            Ok(()) => self.notifier.success("Category deleted successfully"),
            Err(_) => self.notifier.error("Failed to delete category"),
        }
        self.refresh().await;
        result.map(|()| true)
    }

    // ---- subtasks ----------------------------------------------------------

    /// Subtasks of one task; a failed read degrades to an empty list.
    pub async fn subtasks_for(&self, task_id: TaskId) -> Vec<Subtask> {
        match self.store.subtasks_for(task_id).await {
            Ok(subtasks) => subtasks,
            Err(err) => {
                warn!(task = %task_id, error = %err, "subtask read failed");
                self.notifier.error("Failed to load subtasks");
                Vec::new()
            }
        }
    }

    pub async fn set_subtask_status(
        &self,
        id: SubtaskId,
        status: SubtaskStatus,
    ) -> StoreResult<Subtask> {
        let patch = SubtaskPatch {
            status: Some(status),
            ..SubtaskPatch::default()
        };
        let result = self.store.update_subtask(id, patch).await;
        match &result {
            Ok(subtask) => self
                .notifier
                .success(format!("Subtask marked {}", subtask.status)),
            Err(_) => self.notifier.error("Failed to update subtask"),
        }
        result
    }

    pub async fn delete_subtask(&self, id: SubtaskId, confirm: &impl Confirm) -> StoreResult<bool> {
        if !confirm.confirm("Are you sure you want to delete this subtask?") {
            return Ok(false);
        }
        let result = self.store.delete_subtask(id).await;
        match &result {
            Ok(()) => self.notifier.success("Subtask deleted successfully"),
            Err(_) => self.notifier.error("Failed to delete subtask"),
        }
        result.map(|()| true)
    }
}

fn log_failures(action: &str, failed: &[BulkFailure]) {
    for failure in failed {
        info!(action, id = ?failure.id, message = %failure.message, "record not applied");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::filter::StatusFilter;
    use crate::notify::{Notice, RecordingNotifier};
    use crate::task::{NewTask, Priority};

    fn board() -> TaskBoard<MemoryBackend, RecordingNotifier> {
        TaskBoard::new(Store::new(MemoryBackend::new()), RecordingNotifier::new())
    }

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            category: None,
            priority: Priority::Medium,
            due_date: None,
        }
    }

    #[test]
    fn view_is_loading_before_first_refresh() {
        assert_eq!(board().view(), ListView::Loading);
    }

    #[tokio::test]
    async fn empty_view_distinguishes_filtered_from_nothing() {
        let mut board = board();
        board.refresh().await;
        assert_eq!(board.view(), ListView::Empty { filtered: false });

        board.set_filter(TaskFilter {
            status: StatusFilter::Completed,
            ..TaskFilter::default()
        });
        assert_eq!(board.view(), ListView::Empty { filtered: true });
    }

    #[tokio::test]
    async fn failed_read_degrades_to_empty() {
        let mut board = board();
        board.store().backend().set_offline(true);
        board.refresh().await;

        assert!(matches!(board.view(), ListView::Failed(_)));
        assert!(board.tasks().is_empty());
        assert_eq!(board.notifier().errors().len(), 1);
    }

    #[tokio::test]
    async fn toggling_unknown_task_sends_one_error() {
        let mut board = board();
        board
            .store()
            .create_task(new_task("Buy milk"))
            .await
            .expect("create");
        board.refresh().await;

        let err = board.toggle_complete(TaskId(99)).await.expect_err("missing task");
        assert!(err.is_not_found());
        assert_eq!(
            board.notifier().notices(),
            vec![Notice::error("Failed to update task")]
        );
    }

    #[tokio::test]
    async fn set_selected_twice_keeps_task_selected() {
        let mut board = board();
        let task = board
            .store()
            .create_task(new_task("Pay rent"))
            .await
            .expect("create");
        board.refresh().await;

        assert!(board.set_selected(task.id, true));
        assert!(board.set_selected(task.id, true));
        assert_eq!(board.selection().ids(), vec![task.id]);
        assert!(!board.set_selected(TaskId(99), true));
    }

    #[tokio::test]
    async fn declined_delete_makes_no_call() {
        let mut board = board();
        board.store().backend().set_offline(true);
        let deleted = board
            .delete_task(TaskId(1), &|_: &str| false)
            .await
            .expect("declined is not an error");
        assert!(!deleted);
        assert!(board.notifier().notices().is_empty());
    }
}

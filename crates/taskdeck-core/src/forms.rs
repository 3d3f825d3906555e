//! Validate-then-submit controllers for the task, category and subtask forms.
//!
//! A form is `Editing` until [`begin_submit`](TaskForm::begin_submit) hands
//! out a payload, then `Submitting` until [`finish`](TaskForm::finish). While
//! submitting, edits and further submissions are refused.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::backend::RecordBackend;
use crate::category::{
    Category, CategoryId, CategoryPatch, DEFAULT_CATEGORY_COLOR, NewCategory, is_hex_color,
};
use crate::error::{FormError, ValidationError};
use crate::store::Store;
use crate::subtask::{NewSubtask, Subtask, SubtaskId, SubtaskPatch, SubtaskStatus};
use crate::task::{NewTask, Priority, Task, TaskId, TaskPatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormPhase {
    #[default]
    Editing,
    Submitting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode<Id> {
    Create,
    Edit(Id),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct FormState {
    phase: FormPhase,
    errors: Vec<ValidationError>,
}

impl FormState {
    fn ensure_editable(&self) -> Result<(), FormError> {
        match self.phase {
            FormPhase::Editing => Ok(()),
            FormPhase::Submitting => Err(FormError::Busy),
        }
    }

    fn begin(&mut self, errors: Vec<ValidationError>) -> Result<(), FormError> {
        self.ensure_editable()?;
        self.errors = errors;
        if !self.errors.is_empty() {
            return Err(FormError::Invalid(self.errors.clone()));
        }
        self.phase = FormPhase::Submitting;
        Ok(())
    }

    fn finish(&mut self) {
        self.phase = FormPhase::Editing;
    }

    fn clear_error(&mut self, field: &str) {
        self.errors.retain(|e| e.field != field);
    }

    fn error_for(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }
}

// ---- task ------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskDraft {
    pub title: String,
    pub category: Option<CategoryId>,
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskSubmission {
    Create(NewTask),
    Update(TaskId, TaskPatch),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskForm {
    mode: FormMode<TaskId>,
    draft: TaskDraft,
    state: FormState,
}

impl TaskForm {
    pub fn create() -> Self {
        Self {
            mode: FormMode::Create,
            draft: TaskDraft::default(),
            state: FormState::default(),
        }
    }

    pub fn edit(task: &Task) -> Self {
        Self {
            mode: FormMode::Edit(task.id),
            draft: TaskDraft {
                title: task.title.clone(),
                category: task.category,
                priority: task.priority,
                due_date: task.due_date,
            },
            state: FormState::default(),
        }
    }

    pub fn mode(&self) -> FormMode<TaskId> {
        self.mode
    }

    pub fn phase(&self) -> FormPhase {
        self.state.phase
    }

    pub fn draft(&self) -> &TaskDraft {
        &self.draft
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.state.errors
    }

    pub fn error_for(&self, field: &str) -> Option<&str> {
        self.state.error_for(field)
    }

    pub fn set_title(&mut self, title: impl Into<String>) -> Result<(), FormError> {
        self.state.ensure_editable()?;
        self.draft.title = title.into();
        self.state.clear_error("title");
        Ok(())
    }

    pub fn set_category(&mut self, category: Option<CategoryId>) -> Result<(), FormError> {
        self.state.ensure_editable()?;
        self.draft.category = category;
        self.state.clear_error("category");
        Ok(())
    }

    pub fn set_priority(&mut self, priority: Priority) -> Result<(), FormError> {
        self.state.ensure_editable()?;
        self.draft.priority = priority;
        Ok(())
    }

    pub fn set_due_date(&mut self, due_date: Option<DateTime<Utc>>) -> Result<(), FormError> {
        self.state.ensure_editable()?;
        self.draft.due_date = due_date;
        Ok(())
    }

    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.draft.title.trim().is_empty() {
            errors.push(ValidationError::new("title", "title required"));
        }
        if self.draft.category.is_none() {
            errors.push(ValidationError::new("category", "category required"));
        }
        errors
    }

    pub fn begin_submit(&mut self) -> Result<TaskSubmission, FormError> {
        self.state.begin(self.validate())?;

        let title = self.draft.title.trim().to_string();
        Ok(match self.mode {
            FormMode::Create => TaskSubmission::Create(NewTask {
                title,
                category: self.draft.category,
                priority: self.draft.priority,
                due_date: self.draft.due_date,
            }),
            FormMode::Edit(id) => TaskSubmission::Update(
                id,
                TaskPatch {
                    title: Some(title),
                    category: Some(self.draft.category),
                    priority: Some(self.draft.priority),
                    due_date: Some(self.draft.due_date),
                    ..TaskPatch::default()
                },
            ),
        })
    }

    /// Leave the submitting phase. A successful create starts over with a blank draft;
    /// a failure keeps what the user typed.
    pub fn finish(&mut self, succeeded: bool) {
        self.state.finish();
        if succeeded && self.mode == FormMode::Create {
            self.draft = TaskDraft::default();
            self.state.errors.clear();
        }
    }

    #[tracing::instrument(skip_all, fields(mode = ?self.mode))]
    pub async fn submit<B: RecordBackend>(&mut self, store: &Store<B>) -> Result<Task, FormError> {
        let submission = self.begin_submit()?;
        let result = match submission {
            TaskSubmission::Create(input) => store.create_task(input).await,
            TaskSubmission::Update(id, patch) => store.update_task(id, patch).await,
        };
        self.finish(result.is_ok());
        debug!(ok = result.is_ok(), "task form submitted");
        result.map_err(FormError::from)
    }
}

// ---- category --------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryDraft {
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CategorySubmission {
    Create(NewCategory),
    Update(CategoryId, CategoryPatch),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryForm {
    mode: FormMode<CategoryId>,
    default_color: String,
    draft: CategoryDraft,
    state: FormState,
}

impl CategoryForm {
    pub fn create() -> Self {
        Self::create_with_color(DEFAULT_CATEGORY_COLOR)
    }

    /// Blank form whose color falls back to `default_color`.
    pub fn create_with_color(default_color: impl Into<String>) -> Self {
        let default_color = default_color.into();
        Self {
            mode: FormMode::Create,
            draft: CategoryDraft {
                name: String::new(),
                color: default_color.clone(),
            },
            default_color,
            state: FormState::default(),
        }
    }

    pub fn edit(category: &Category) -> Self {
        Self {
            mode: FormMode::Edit(category.id),
            default_color: DEFAULT_CATEGORY_COLOR.to_string(),
            draft: CategoryDraft {
                name: category.name.clone(),
                color: category.color.clone(),
            },
            state: FormState::default(),
        }
    }

    pub fn mode(&self) -> FormMode<CategoryId> {
        self.mode
    }

    pub fn phase(&self) -> FormPhase {
        self.state.phase
    }

    pub fn draft(&self) -> &CategoryDraft {
        &self.draft
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.state.errors
    }

    pub fn error_for(&self, field: &str) -> Option<&str> {
        self.state.error_for(field)
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), FormError> {
        self.state.ensure_editable()?;
        self.draft.name = name.into();
        self.state.clear_error("name");
        Ok(())
    }

    pub fn set_color(&mut self, color: impl Into<String>) -> Result<(), FormError> {
        self.state.ensure_editable()?;
        self.draft.color = color.into();
        self.state.clear_error("color");
        Ok(())
    }

    fn effective_color(&self) -> String {
        let color = self.draft.color.trim();
        if color.is_empty() {
            self.default_color.clone()
        } else {
            color.to_string()
        }
    }

    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.draft.name.trim().is_empty() {
            errors.push(ValidationError::new("name", "name required"));
        }
        if !is_hex_color(&self.effective_color()) {
            errors.push(ValidationError::new(
                "color",
                "color must be a #RRGGBB hex value",
            ));
        }
        errors
    }

    pub fn begin_submit(&mut self) -> Result<CategorySubmission, FormError> {
        self.state.begin(self.validate())?;

        let name = self.draft.name.trim().to_string();
        let color = self.effective_color();
        Ok(match self.mode {
            FormMode::Create => CategorySubmission::Create(NewCategory { name, color }),
            FormMode::Edit(id) => CategorySubmission::Update(
                id,
                CategoryPatch {
                    name: Some(name),
                    color: Some(color),
                },
            ),
        })
    }

    pub fn finish(&mut self, succeeded: bool) {
        self.state.finish();
        if succeeded && self.mode == FormMode::Create {
            self.draft = CategoryDraft {
                name: String::new(),
                color: self.default_color.clone(),
            };
            self.state.errors.clear();
        }
    }

    #[tracing::instrument(skip_all, fields(mode = ?self.mode))]
    pub async fn submit<B: RecordBackend>(
        &mut self,
        store: &Store<B>,
    ) -> Result<Category, FormError> {
        let submission = self.begin_submit()?;
        let result = match submission {
            CategorySubmission::Create(input) => store.create_category(input).await,
            CategorySubmission::Update(id, patch) => store.update_category(id, patch).await,
        };
        self.finish(result.is_ok());
        result.map_err(FormError::from)
    }
}

// ---- subtask ---------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubtaskDraft {
    pub name: String,
    pub description: String,
    pub status: SubtaskStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubtaskSubmission {
    Create(NewSubtask),
    Update(SubtaskId, SubtaskPatch),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubtaskForm {
    task_id: TaskId,
    mode: FormMode<SubtaskId>,
    draft: SubtaskDraft,
    state: FormState,
}

impl SubtaskForm {
    pub fn create(task_id: TaskId) -> Self {
        Self {
            task_id,
            mode: FormMode::Create,
            draft: SubtaskDraft::default(),
            state: FormState::default(),
        }
    }

    pub fn edit(subtask: &Subtask) -> Self {
        Self {
            task_id: subtask.task_id,
            mode: FormMode::Edit(subtask.id),
            draft: SubtaskDraft {
                name: subtask.name.clone(),
                description: subtask.description.clone(),
                status: subtask.status,
            },
            state: FormState::default(),
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn mode(&self) -> FormMode<SubtaskId> {
        self.mode
    }

    pub fn phase(&self) -> FormPhase {
        self.state.phase
    }

    pub fn draft(&self) -> &SubtaskDraft {
        &self.draft
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.state.errors
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), FormError> {
        self.state.ensure_editable()?;
        self.draft.name = name.into();
        self.state.clear_error("name");
        Ok(())
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> Result<(), FormError> {
        self.state.ensure_editable()?;
        self.draft.description = description.into();
        Ok(())
    }

    pub fn set_status(&mut self, status: SubtaskStatus) -> Result<(), FormError> {
        self.state.ensure_editable()?;
        self.draft.status = status;
        Ok(())
    }

    pub fn validate(&self) -> Vec<ValidationError> {
        if self.draft.name.trim().is_empty() {
            vec![ValidationError::new("name", "name required")]
        } else {
            vec![]
        }
    }

    pub fn begin_submit(&mut self) -> Result<SubtaskSubmission, FormError> {
        self.state.begin(self.validate())?;

        let name = self.draft.name.trim().to_string();
        let description = self.draft.description.trim().to_string();
        Ok(match self.mode {
            FormMode::Create => SubtaskSubmission::Create(NewSubtask {
                task_id: self.task_id,
                name,
                description,
                status: self.draft.status,
            }),
            FormMode::Edit(id) => SubtaskSubmission::Update(
                id,
                SubtaskPatch {
                    name: Some(name),
                    description: Some(description),
                    status: Some(self.draft.status),
                },
            ),
        })
    }

    pub fn finish(&mut self, succeeded: bool) {
        self.state.finish();
        if succeeded && self.mode == FormMode::Create {
            self.draft = SubtaskDraft::default();
            self.state.errors.clear();
        }
    }

    #[tracing::instrument(skip_all, fields(task = %self.task_id, mode = ?self.mode))]
    pub async fn submit<B: RecordBackend>(
        &mut self,
        store: &Store<B>,
    ) -> Result<Subtask, FormError> {
        let submission = self.begin_submit()?;
        let result = match submission {
            SubtaskSubmission::Create(input) => store.create_subtask(input).await,
            SubtaskSubmission::Update(id, patch) => store.update_subtask(id, patch).await,
        };
        self.finish(result.is_ok());
        result.map_err(FormError::from)
    }
}

#[cfg(test)]
mod tests {
    use taskdeck_shared::Table;

    use super::*;
    use crate::backend::MemoryBackend;

    #[tokio::test]
    async fn empty_title_never_reaches_the_store() {
        let store = Store::new(MemoryBackend::new());
        let mut form = TaskForm::create();
        form.set_title("   ").expect("editable");
        form.set_category(Some(CategoryId(1))).expect("editable");

        let err = form.submit(&store).await.expect_err("invalid");
        match err {
            FormError::Invalid(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].to_string(), "title required");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(form.phase(), FormPhase::Editing);
        assert_eq!(form.error_for("title"), Some("title required"));
        assert!(store.backend().is_empty(Table::Task));
    }

    #[test]
    fn missing_category_is_reported() {
        let mut form = TaskForm::create();
        form.set_title("Buy milk").expect("editable");
        let err = form.begin_submit().expect_err("invalid");
        assert_eq!(err.to_string(), "category required");
    }

    #[test]
    fn typing_clears_the_field_error() {
        let mut form = TaskForm::create();
        assert!(form.begin_submit().is_err());
        assert!(form.error_for("title").is_some());
        form.set_title("x").expect("editable");
        assert!(form.error_for("title").is_none());
        assert!(form.error_for("category").is_some());
    }

    #[test]
    fn second_submission_while_in_flight_is_refused() {
        let mut form = TaskForm::create();
        form.set_title("Buy milk").expect("editable");
        form.set_category(Some(CategoryId(1))).expect("editable");

        let first = form.begin_submit().expect("valid");
        assert!(matches!(first, TaskSubmission::Create(ref t) if t.title == "Buy milk"));
        assert_eq!(form.phase(), FormPhase::Submitting);
        assert_eq!(form.begin_submit(), Err(FormError::Busy));
        assert_eq!(form.set_title("changed"), Err(FormError::Busy));

        form.finish(false);
        assert_eq!(form.phase(), FormPhase::Editing);
        assert_eq!(form.draft().title, "Buy milk");
    }

    #[tokio::test]
    async fn failed_submission_keeps_values_and_success_resets() {
        let store = Store::new(MemoryBackend::new());
        let mut form = TaskForm::create();
        form.set_title("  Pay rent ").expect("editable");
        form.set_category(Some(CategoryId(3))).expect("editable");
        form.set_priority(Priority::High).expect("editable");

        store.backend().set_offline(true);
        let err = form.submit(&store).await.expect_err("offline");
        assert!(matches!(err, FormError::Store(_)));
        assert_eq!(form.phase(), FormPhase::Editing);
        assert_eq!(form.draft().title, "  Pay rent ");
        assert_eq!(form.draft().priority, Priority::High);

        store.backend().set_offline(false);
        let task = form.submit(&store).await.expect("created");
        assert_eq!(task.title, "Pay rent");
        assert_eq!(task.priority, Priority::High);
        assert_eq!(form.draft(), &TaskDraft::default());
    }

    #[test]
    fn edit_form_builds_a_patch() {
        let mut task = Task::new(TaskId(4), "Old");
        task.category = Some(CategoryId(2));
        let mut form = TaskForm::edit(&task);
        form.set_title("New").expect("editable");

        match form.begin_submit().expect("valid") {
            TaskSubmission::Update(id, patch) => {
                assert_eq!(id, TaskId(4));
                assert_eq!(patch.title.as_deref(), Some("New"));
                assert_eq!(patch.category, Some(Some(CategoryId(2))));
                assert_eq!(patch.completed, None);
            }
            other => panic!("unexpected submission: {other:?}"),
        }
    }

    #[test]
    fn category_color_defaults_and_is_checked() {
        let mut form = CategoryForm::create();
        form.set_name("Errands").expect("editable");
        form.set_color("").expect("editable");
        match form.begin_submit().expect("valid") {
            CategorySubmission::Create(input) => {
                assert_eq!(input.color, DEFAULT_CATEGORY_COLOR);
            }
            other => panic!("unexpected submission: {other:?}"),
        }
        form.finish(true);

        form.set_name("Errands").expect("editable");
        form.set_color("teal").expect("editable");
        let err = form.begin_submit().expect_err("bad color");
        assert_eq!(form.error_for("color"), Some("color must be a #RRGGBB hex value"));
        assert!(matches!(err, FormError::Invalid(_)));

        let mut blank = CategoryForm::create();
        assert_eq!(
            blank.begin_submit().expect_err("no name").to_string(),
            "name required"
        );
    }

    #[tokio::test]
    async fn subtask_defaults_to_not_started() {
        let store = Store::new(MemoryBackend::new());
        let mut form = SubtaskForm::create(TaskId(8));
        assert!(form.submit(&store).await.is_err());

        form.set_name("Outline").expect("editable");
        let subtask = form.submit(&store).await.expect("created");
        assert_eq!(subtask.status, SubtaskStatus::NotStarted);
        assert_eq!(subtask.task_id, TaskId(8));
        assert_eq!(store.subtasks_for(TaskId(8)).await.expect("list").len(), 1);
    }
}

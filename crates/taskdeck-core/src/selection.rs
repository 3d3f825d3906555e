use std::collections::BTreeSet;

use crate::task::{Task, TaskId};

/// Tasks checked in the current filtered view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ids: BTreeSet<TaskId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, id: TaskId, selected: bool) {
        if selected {
            self.ids.insert(id);
        } else {
            self.ids.remove(&id);
        }
    }

    /// Flip one task; returns whether it is selected afterwards.
    pub fn toggle(&mut self, id: TaskId) -> bool {
        if self.ids.remove(&id) {
            false
        } else {
            self.ids.insert(id);
            true
        }
    }

    /// Select exactly the visible tasks, or nothing.
    pub fn select_all(&mut self, visible: &[Task], selected: bool) {
        self.ids = if selected {
            visible.iter().map(|task| task.id).collect()
        } else {
            BTreeSet::new()
        };
    }

    pub fn all_selected(&self, visible: &[Task]) -> bool {
        !visible.is_empty() && visible.iter().all(|task| self.ids.contains(&task.id))
    }

    /// Drop ids that are no longer visible.
    pub fn retain_visible(&mut self, visible: &[Task]) {
        let visible: BTreeSet<TaskId> = visible.iter().map(|task| task.id).collect();
        self.ids.retain(|id| visible.contains(id));
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.ids.contains(&id)
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Selected ids in ascending order.
    pub fn ids(&self) -> Vec<TaskId> {
        self.ids.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tasks(ids: &[u64]) -> Vec<Task> {
        ids.iter().map(|id| Task::new(TaskId(*id), format!("t{id}"))).collect()
    }

    #[test]
    fn select_all_is_scoped_to_visible() {
        let mut selection = Selection::new();
        selection.set(TaskId(9), true);

        let visible = tasks(&[1, 2]);
        selection.select_all(&visible, true);
        assert_eq!(selection.ids(), vec![TaskId(1), TaskId(2)]);
        assert!(selection.all_selected(&visible));

        selection.select_all(&visible, false);
        assert!(selection.is_empty());
        assert!(!selection.all_selected(&visible));
    }

    #[test]
    fn toggle_and_retain() {
        let mut selection = Selection::new();
        assert!(selection.toggle(TaskId(1)));
        assert!(selection.toggle(TaskId(2)));
        assert!(!selection.toggle(TaskId(1)));
        assert!(selection.contains(TaskId(2)));

        selection.set(TaskId(3), true);
        selection.retain_visible(&tasks(&[3]));
        assert_eq!(selection.ids(), vec![TaskId(3)]);
    }

    #[test]
    fn empty_view_is_never_all_selected() {
        assert!(!Selection::new().all_selected(&[]));
    }
}

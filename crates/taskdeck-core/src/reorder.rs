use crate::error::ReorderError;
use crate::task::{Task, TaskId};

/// New display order after moving one task within the visible list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderPlan {
    ordered: Vec<TaskId>,
}

impl ReorderPlan {
    /// Remove the task at `from` and reinsert it at `to`.
    ///
    /// Returns `Ok(None)` when the move changes nothing.
    pub fn compute(visible: &[Task], from: usize, to: usize) -> Result<Option<Self>, ReorderError> {
        let len = visible.len();
        if from >= len || to >= len {
            return Err(ReorderError::OutOfRange { from, to, len });
        }
        if from == to {
            return Ok(None);
        }

        let mut ordered: Vec<TaskId> = visible.iter().map(|task| task.id).collect();
        let moved = ordered.remove(from);
        ordered.insert(to, moved);
        Ok(Some(Self { ordered }))
    }

    pub fn ordered_ids(&self) -> &[TaskId] {
        &self.ordered
    }

    /// `(id, order)` pairs, orders running `1..=N` by position.
    pub fn assignments(&self) -> impl Iterator<Item = (TaskId, i64)> + '_ {
        self.ordered.iter().copied().zip(1_i64..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> Vec<Task> {
        ["A", "B", "C"]
            .iter()
            .zip(1_u64..)
            .map(|(title, id)| Task::new(TaskId(id), *title))
            .collect()
    }

    #[test]
    fn moving_first_to_last() {
        let plan = ReorderPlan::compute(&abc(), 0, 2)
            .expect("in range")
            .expect("changes order");
        assert_eq!(plan.ordered_ids(), &[TaskId(2), TaskId(3), TaskId(1)]);
        assert_eq!(
            plan.assignments().collect::<Vec<_>>(),
            vec![(TaskId(2), 1), (TaskId(3), 2), (TaskId(1), 3)]
        );
    }

    #[test]
    fn moving_last_to_middle() {
        let plan = ReorderPlan::compute(&abc(), 2, 1)
            .expect("in range")
            .expect("changes order");
        assert_eq!(plan.ordered_ids(), &[TaskId(1), TaskId(3), TaskId(2)]);
    }

    #[test]
    fn same_index_is_a_no_op() {
        assert_eq!(ReorderPlan::compute(&abc(), 1, 1), Ok(None));
    }

    #[test]
    fn out_of_range_is_rejected() {
        assert_eq!(
            ReorderPlan::compute(&abc(), 0, 3),
            Err(ReorderError::OutOfRange { from: 0, to: 3, len: 3 })
        );
        assert!(ReorderPlan::compute(&[], 0, 0).is_err());
    }
}

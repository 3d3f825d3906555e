use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use crate::id::CategoryId;
use crate::task::Task;

/// Accent used when a category is created without an explicit color.
pub const DEFAULT_CATEGORY_COLOR: &str = "#5B4CFF";

/// Palette offered by the category form.
pub const COLOR_OPTIONS: [&str; 10] = [
    "#5B4CFF", "#4ECDC4", "#FF6B6B", "#FFD93D", "#51CF66", "#9C88FF", "#20C997", "#FD7E14",
    "#E83E8C", "#6F42C1",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub color: String,
    /// Derived from task references, never trusted from storage.
    #[serde(default)]
    pub task_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCategory {
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub color: Option<String>,
}

/// Recompute `task_count` on every category from the tasks that reference it.
pub fn with_task_counts(mut categories: Vec<Category>, tasks: &[Task]) -> Vec<Category> {
    let mut counts: HashMap<CategoryId, usize> = HashMap::new();
    for task in tasks {
        if let Some(category) = task.category {
            *counts.entry(category).or_insert(0) += 1;
        }
    }

    for category in &mut categories {
        category.task_count = counts.get(&category.id).copied().unwrap_or(0);
    }
    categories
}

pub fn is_hex_color(value: &str) -> bool {
    let Some(digits) = value.strip_prefix('#') else {
        return false;
    };
    digits.len() == 6 && digits.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Task, TaskId};

    fn category(id: u64, name: &str) -> Category {
        Category {
            id: CategoryId(id),
            name: name.to_string(),
            color: DEFAULT_CATEGORY_COLOR.to_string(),
            task_count: 99,
        }
    }

    #[test]
    fn task_counts_ignore_stored_value_and_dangling_refs() {
        let mut a = Task::new(TaskId(1), "a");
        a.category = Some(CategoryId(1));
        let mut b = Task::new(TaskId(2), "b");
        b.category = Some(CategoryId(1));
        let mut c = Task::new(TaskId(3), "c");
        c.category = Some(CategoryId(42));
        let d = Task::new(TaskId(4), "d");

        let counted = with_task_counts(
            vec![category(1, "Work"), category(2, "Home")],
            &[a, b, c, d],
        );

        assert_eq!(counted[0].task_count, 2);
        assert_eq!(counted[1].task_count, 0);
    }

    #[test]
    fn hex_color_shape() {
        assert!(is_hex_color("#5B4CFF"));
        assert!(is_hex_color("#abcdef"));
        assert!(!is_hex_color("5B4CFF"));
        assert!(!is_hex_color("#5B4CF"));
        assert!(!is_hex_color("#GGGGGG"));
    }

    #[test]
    fn palette_starts_with_default_and_is_valid() {
        assert_eq!(COLOR_OPTIONS[0], DEFAULT_CATEGORY_COLOR);
        assert!(COLOR_OPTIONS.iter().all(|color| is_hex_color(color)));
    }
}

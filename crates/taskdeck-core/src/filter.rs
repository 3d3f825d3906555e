use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{
  Deserialize,
  Serialize
};
use tracing::trace;

use crate::category::{
  Category,
  CategoryId
};
use crate::task::{
  Priority,
  Task
};

/// Either the `"all"` bypass or an
/// exact value to match.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub enum Selector<T> {
  All,
  Only(T)
}

impl<T> Default for Selector<T> {
  fn default() -> Self {
    Selector::All
  }
}

impl<T: PartialEq> Selector<T> {
  pub fn admits(
    &self,
    value: &T
  ) -> bool {
    match self {
      | Selector::All => true,
      | Selector::Only(want) => {
        want == value
      }
    }
  }

  pub fn is_all(&self) -> bool {
    matches!(self, Selector::All)
  }
}

impl<T: FromStr> FromStr for Selector<T> {
  type Err = T::Err;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    if s.trim().eq_ignore_ascii_case("all")
    {
      return Ok(Selector::All);
    }
    s.parse::<T>().map(Selector::Only)
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
  #[default]
  All,
  Completed,
  Incomplete
}

impl StatusFilter {
  pub fn admits(
    &self,
    completed: bool
  ) -> bool {
    match self {
      | StatusFilter::All => true,
      | StatusFilter::Completed => {
        completed
      }
      | StatusFilter::Incomplete => {
        !completed
      }
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      | StatusFilter::All => "all",
      | StatusFilter::Completed => {
        "completed"
      }
      | StatusFilter::Incomplete => {
        "incomplete"
      }
    }
  }
}

impl fmt::Display for StatusFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for StatusFilter {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "all" => Ok(StatusFilter::All),
      | "completed" | "done" => {
        Ok(StatusFilter::Completed)
      }
      | "incomplete" | "open" => {
        Ok(StatusFilter::Incomplete)
      }
      | other => Err(anyhow!(
        "unknown status filter: {other}"
      ))
    }
  }
}

/// The four independent predicates of
/// the task list. All active predicates
/// must hold.
#[derive(
  Debug,
  Clone,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct TaskFilter {
  pub search:   String,
  pub category: Selector<CategoryId>,
  pub priority: Selector<Priority>,
  pub status:   StatusFilter
}

impl TaskFilter {
  pub fn matches(
    &self,
    task: &Task
  ) -> bool {
    if !self.search.is_empty()
      && !task
        .title
        .to_lowercase()
        .contains(
          &self.search.to_lowercase()
        )
    {
      return false;
    }

    if let Selector::Only(category) =
      self.category
      && task.category != Some(category)
    {
      return false;
    }

    self.priority.admits(&task.priority)
      && self
        .status
        .admits(task.completed)
  }

  /// Visible subset in display order.
  /// Ties on `order` keep collection
  /// order.
  #[tracing::instrument(skip(
    self, tasks
  ))]
  pub fn apply(
    &self,
    tasks: &[Task]
  ) -> Vec<Task> {
    let mut visible: Vec<Task> = tasks
      .iter()
      .filter(|task| self.matches(task))
      .cloned()
      .collect();
    visible.sort_by_key(Task::sort_order);

    trace!(
      total = tasks.len(),
      visible = visible.len(),
      "applied task filter"
    );
    visible
  }

  /// Whether any predicate narrows the
  /// list. An empty result under an
  /// active filter means "nothing
  /// matches", not "nothing exists".
  pub fn is_active(&self) -> bool {
    !self.search.is_empty()
      || !self.category.is_all()
      || !self.priority.is_all()
      || self.status != StatusFilter::All
  }
}

/// Counts shown next to each sidebar
/// filter option.
#[derive(
  Debug,
  Clone,
  Default,
  PartialEq,
  Eq,
  Serialize,
)]
pub struct Facets {
  pub total:        usize,
  pub completed:    usize,
  pub incomplete:   usize,
  pub by_priority:
    BTreeMap<Priority, usize>,
  pub by_category:
    Vec<(CategoryId, String, usize)>
}

impl Facets {
  pub fn collect(
    tasks: &[Task],
    categories: &[Category]
  ) -> Self {
    let completed = tasks
      .iter()
      .filter(|task| task.completed)
      .count();

    let mut by_priority = BTreeMap::new();
    for priority in Priority::ALL {
      by_priority.insert(priority, 0_usize);
    }
    for task in tasks {
      *by_priority
        .entry(task.priority)
        .or_insert(0) += 1;
    }

    let by_category = categories
      .iter()
      .map(|category| {
        let count = tasks
          .iter()
          .filter(|task| {
            task.category
              == Some(category.id)
          })
          .count();
        (
          category.id,
          category.name.clone(),
          count
        )
      })
      .collect();

    Self {
      total: tasks.len(),
      completed,
      incomplete: tasks.len() - completed,
      by_priority,
      by_category
    }
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::task::TaskId;

  fn task(
    id: u64,
    title: &str,
    completed: bool,
    priority: Priority,
    order: Option<i64>
  ) -> Task {
    let mut task =
      Task::new(TaskId(id), title);
    task.completed = completed;
    task.priority = priority;
    task.order = order;
    task
  }

  fn ids(tasks: &[Task]) -> Vec<u64> {
    tasks
      .iter()
      .map(|task| task.id.get())
      .collect()
  }

  fn milk_and_rent() -> Vec<Task> {
    vec![
      task(
        1,
        "Buy milk",
        false,
        Priority::Low,
        Some(2)
      ),
      task(
        2,
        "Pay rent",
        true,
        Priority::High,
        Some(1)
      ),
    ]
  }

  #[test]
  fn status_incomplete_keeps_open_tasks()
  {
    let filter = TaskFilter {
      status: StatusFilter::Incomplete,
      ..TaskFilter::default()
    };
    assert_eq!(
      ids(&filter.apply(&milk_and_rent())),
      vec![1]
    );
  }

  #[test]
  fn search_matches_title_case_insensitively()
   {
    let filter = TaskFilter {
      search: "RENT".to_string(),
      ..TaskFilter::default()
    };
    assert_eq!(
      ids(&filter.apply(&milk_and_rent())),
      vec![2]
    );
  }

  #[test]
  fn default_filter_sorts_by_order() {
    let filter = TaskFilter::default();
    assert!(!filter.is_active());
    assert_eq!(
      ids(&filter.apply(&milk_and_rent())),
      vec![2, 1]
    );
  }

  #[test]
  fn missing_order_sorts_first_and_ties_are_stable()
   {
    let tasks = vec![
      task(1, "a", false, Priority::Low, Some(1)),
      task(2, "b", false, Priority::Low, None),
      task(3, "c", false, Priority::Low, Some(1)),
      task(4, "d", false, Priority::Low, Some(0)),
    ];

    let visible =
      TaskFilter::default().apply(&tasks);
    assert_eq!(ids(&visible), vec![2, 4, 1, 3]);
  }

  #[test]
  fn predicates_combine_with_and() {
    let mut tasks = milk_and_rent();
    tasks[0].category = Some(CategoryId(5));
    tasks.push(task(
      3,
      "Buy bread",
      false,
      Priority::High,
      Some(3)
    ));
    tasks[2].category = Some(CategoryId(5));

    let filter = TaskFilter {
      search:   "buy".to_string(),
      category: Selector::Only(CategoryId(
        5
      )),
      priority: Selector::Only(
        Priority::High
      ),
      status:   StatusFilter::Incomplete
    };
    assert!(filter.is_active());
    assert_eq!(
      ids(&filter.apply(&tasks)),
      vec![3]
    );
  }

  #[test]
  fn applying_twice_is_idempotent() {
    let filter = TaskFilter::default();
    let once = filter.apply(&milk_and_rent());
    let twice = filter.apply(&once);
    assert_eq!(once, twice);
  }

  #[test]
  fn search_is_not_trimmed() {
    let trailing = TaskFilter {
      search: "milk ".to_string(),
      ..TaskFilter::default()
    };
    assert!(trailing.is_active());
    assert!(
      trailing
        .apply(&milk_and_rent())
        .is_empty()
    );

    let blank = TaskFilter {
      search: "   ".to_string(),
      ..TaskFilter::default()
    };
    assert!(
      blank.apply(&milk_and_rent()).is_empty()
    );
  }

  #[test]
  fn category_filter_skips_uncategorised_tasks()
  {
    let filter = TaskFilter {
      category: Selector::Only(CategoryId(
        1
      )),
      ..TaskFilter::default()
    };
    assert!(
      filter
        .apply(&milk_and_rent())
        .is_empty()
    );
  }

  #[test]
  fn selectors_parse_all_bypass() {
    assert_eq!(
      "all"
        .parse::<Selector<Priority>>()
        .ok(),
      Some(Selector::All)
    );
    assert_eq!(
      "high"
        .parse::<Selector<Priority>>()
        .ok(),
      Some(Selector::Only(Priority::High))
    );
    assert_eq!(
      "12"
        .parse::<Selector<CategoryId>>()
        .ok(),
      Some(Selector::Only(CategoryId(12)))
    );
    assert!(
      "urgent"
        .parse::<Selector<Priority>>()
        .is_err()
    );
  }

  #[test]
  fn facets_count_each_dimension() {
    let mut tasks = milk_and_rent();
    tasks[0].category = Some(CategoryId(1));
    let categories = vec![Category {
      id:         CategoryId(1),
      name:       "Home".to_string(),
      color:      "#5B4CFF".to_string(),
      task_count: 0
    }];

    let facets =
      Facets::collect(&tasks, &categories);
    assert_eq!(facets.total, 2);
    assert_eq!(facets.completed, 1);
    assert_eq!(facets.incomplete, 1);
    assert_eq!(
      facets.by_priority[&Priority::Medium],
      0
    );
    assert_eq!(
      facets.by_priority[&Priority::High],
      1
    );
    assert_eq!(
      facets.by_category,
      vec![(
        CategoryId(1),
        "Home".to_string(),
        1
      )]
    );
  }
}

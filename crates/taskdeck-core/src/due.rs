use std::fmt;

use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};

/// How a due date reads relative to "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueLabel {
    Today,
    Tomorrow,
    Overdue,
    On(NaiveDate),
}

impl DueLabel {
    /// Classify `due` in `now`'s time zone. A task due later today is
    /// `Today`, not `Overdue`.
    pub fn classify<Tz: TimeZone>(due: DateTime<Utc>, now: &DateTime<Tz>) -> Self {
        let local_due = due.with_timezone(&now.timezone());
        let due_day = local_due.date_naive();
        let today = now.date_naive();

        if due_day == today {
            DueLabel::Today
        } else if today.checked_add_days(Days::new(1)) == Some(due_day) {
            DueLabel::Tomorrow
        } else if due < now.with_timezone(&Utc) {
            DueLabel::Overdue
        } else {
            DueLabel::On(due_day)
        }
    }

    pub fn is_urgent(&self) -> bool {
        matches!(self, DueLabel::Today | DueLabel::Overdue)
    }
}

impl fmt::Display for DueLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DueLabel::Today => f.write_str("Today"),
            DueLabel::Tomorrow => f.write_str("Tomorrow"),
            DueLabel::Overdue => f.write_str("Overdue"),
            DueLabel::On(day) => write!(f, "{}", day.format("%b %-d")),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone, Utc};

    use super::DueLabel;

    #[test]
    fn labels_by_calendar_day() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 12, 0, 0).unwrap();

        let earlier_today = Utc.with_ymd_and_hms(2026, 2, 16, 8, 0, 0).unwrap();
        let tomorrow = Utc.with_ymd_and_hms(2026, 2, 17, 9, 0, 0).unwrap();
        let yesterday = Utc.with_ymd_and_hms(2026, 2, 15, 9, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).unwrap();

        assert_eq!(DueLabel::classify(earlier_today, &now), DueLabel::Today);
        assert_eq!(DueLabel::classify(tomorrow, &now), DueLabel::Tomorrow);
        assert_eq!(DueLabel::classify(yesterday, &now), DueLabel::Overdue);
        assert_eq!(DueLabel::classify(later, &now).to_string(), "Mar 4");
        assert!(DueLabel::Overdue.is_urgent());
        assert!(!DueLabel::Tomorrow.is_urgent());
    }

    #[test]
    fn day_boundary_follows_the_viewer_zone() {
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let now = tokyo.with_ymd_and_hms(2026, 2, 16, 23, 0, 0).unwrap();
        // 15:30 UTC is already the next day in Tokyo.
        let due = Utc.with_ymd_and_hms(2026, 2, 16, 15, 30, 0).unwrap();
        assert_eq!(DueLabel::classify(due, &now), DueLabel::Tomorrow);
    }
}

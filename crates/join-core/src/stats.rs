//! Task statistics for the summary page.

use chrono::{DateTime, NaiveDate};
use join_shared::TaskRecord;
use serde::Serialize;
use tracing::debug;

/// The four Kanban columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoardStatus {
    Todo,
    InProgress,
    AwaitingFeedback,
    Done,
}

impl BoardStatus {
    /// Maps a stored status string onto a column. Both historical spellings
    /// of every column are accepted; anything else is a legacy value.
    pub fn classify(raw: &str) -> Option<Self> {
        match raw.trim() {
            "todo" | "to-do" => Some(Self::Todo),
            "in-progress" | "inProgress" => Some(Self::InProgress),
            "awaiting-feedback" | "awaitFeedback" => Some(Self::AwaitingFeedback),
            "done" | "completed" => Some(Self::Done),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Todo => "To-do",
            Self::InProgress => "In progress",
            Self::AwaitingFeedback => "Awaiting feedback",
            Self::Done => "Done",
        }
    }
}

/// Urgency is recorded either as `priority: "urgent"` or `prio: "Urgent"`.
pub fn is_urgent(task: &TaskRecord) -> bool {
    task.priority.as_deref() == Some("urgent") || task.prio.as_deref() == Some("Urgent")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    pub total: usize,
    pub todo: usize,
    pub in_progress: usize,
    pub awaiting_feedback: usize,
    pub done: usize,
    pub urgent: usize,
    pub next_deadline: Option<NaiveDate>,
}

impl TaskSummary {
    pub fn count(&self, status: BoardStatus) -> usize {
        match status {
            BoardStatus::Todo => self.todo,
            BoardStatus::InProgress => self.in_progress,
            BoardStatus::AwaitingFeedback => self.awaiting_feedback,
            BoardStatus::Done => self.done,
        }
    }

    /// Tasks whose status matched none of the board columns.
    pub fn uncounted(&self) -> usize {
        self.total
            .saturating_sub(self.todo + self.in_progress + self.awaiting_feedback + self.done)
    }
}

#[tracing::instrument(skip_all, fields(count = tasks.map_or(0, |t| t.len())))]
pub fn summarize(tasks: Option<&[TaskRecord]>) -> TaskSummary {
    let Some(tasks) = tasks else {
        return TaskSummary::default();
    };

    let mut summary = TaskSummary {
        total: tasks.len(),
        ..TaskSummary::default()
    };
    let mut deadlines: Vec<NaiveDate> = vec![];

    for task in tasks {
        let status = BoardStatus::classify(&task.status);
        match status {
            Some(BoardStatus::Todo) => summary.todo += 1,
            Some(BoardStatus::InProgress) => summary.in_progress += 1,
            Some(BoardStatus::AwaitingFeedback) => summary.awaiting_feedback += 1,
            Some(BoardStatus::Done) => summary.done += 1,
            None => debug!(id = %task.id, status = %task.status, "uncounted task status"),
        }

        if !is_urgent(task) {
            continue;
        }
        summary.urgent += 1;

        if status == Some(BoardStatus::Done) {
            continue;
        }
        if let Some(raw) = task.due_date.as_deref() {
            match parse_due_date(raw) {
                Some(date) => deadlines.push(date),
                None => debug!(id = %task.id, due = %raw, "skipping malformed due date"),
            }
        }
    }

    // Stable: equal dates keep input order, so the first one wins.
    deadlines.sort();
    summary.next_deadline = deadlines.first().copied();
    summary
}

/// Accepts `YYYY-MM-DD` and RFC 3339 timestamps.
pub fn parse_due_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(status: &str) -> TaskRecord {
        TaskRecord {
            id: format!("t-{status}"),
            status: status.to_string(),
            ..TaskRecord::default()
        }
    }

    fn urgent(status: &str, due: &str) -> TaskRecord {
        TaskRecord {
            priority: Some("urgent".to_string()),
            due_date: Some(due.to_string()),
            ..task(status)
        }
    }

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("valid date")
    }

    #[test]
    fn missing_list_yields_zero_summary() {
        assert_eq!(summarize(None), TaskSummary::default());
        assert_eq!(summarize(Some(&[][..])), TaskSummary::default());
        assert_eq!(summarize(None).next_deadline, None);
    }

    #[test]
    fn counts_both_todo_spellings() {
        let tasks = vec![task("todo"), task("to-do"), task("done")];
        let summary = summarize(Some(tasks.as_slice()));
        assert_eq!(summary.todo, 2);
        assert_eq!(summary.done, 1);
        assert_eq!(summary.total, 3);
    }

    #[test]
    fn legacy_statuses_only_count_towards_total() {
        let tasks = vec![
            task("inProgress"),
            task("awaitFeedback"),
            task("archived"),
            task(""),
        ];
        let summary = summarize(Some(tasks.as_slice()));
        assert_eq!(summary.total, 4);
        assert_eq!(summary.in_progress, 1);
        assert_eq!(summary.awaiting_feedback, 1);
        assert_eq!(summary.uncounted(), 2);
    }

    #[test]
    fn nearest_deadline_among_open_urgent_tasks() {
        let tasks = vec![urgent("todo", "2024-01-05"), urgent("in-progress", "2024-01-02")];
        let summary = summarize(Some(tasks.as_slice()));
        assert_eq!(summary.next_deadline, Some(date("2024-01-02")));
        assert_eq!(summary.urgent, 2);
    }

    #[test]
    fn done_and_non_urgent_tasks_do_not_set_deadline() {
        let mut relaxed = task("todo");
        relaxed.due_date = Some("2023-12-01".to_string());
        let tasks = vec![urgent("done", "2023-11-01"), relaxed, urgent("todo", "2024-03-01")];
        let summary = summarize(Some(tasks.as_slice()));
        assert_eq!(summary.next_deadline, Some(date("2024-03-01")));
        assert_eq!(summary.urgent, 2);
    }

    #[test]
    fn urgent_prio_spelling_is_recognised() {
        let mut legacy = task("todo");
        legacy.prio = Some("Urgent".to_string());
        legacy.due_date = Some("2024-02-10T09:30:00+01:00".to_string());
        let summary = summarize(Some(&[legacy][..]));
        assert_eq!(summary.urgent, 1);
        assert_eq!(summary.next_deadline, Some(date("2024-02-10")));
    }

    #[test]
    fn lowercase_prio_is_not_urgent() {
        let mut other = task("todo");
        other.prio = Some("urgent".to_string());
        assert!(!is_urgent(&other));
    }

    #[test]
    fn malformed_dates_are_skipped() {
        let tasks = vec![urgent("todo", "next tuesday"), urgent("todo", "2024-04-01")];
        let summary = summarize(Some(tasks.as_slice()));
        assert_eq!(summary.next_deadline, Some(date("2024-04-01")));
    }

    #[test]
    fn buckets_never_exceed_total() {
        let statuses = ["todo", "to-do", "inProgress", "done", "completed", "??", "awaiting-feedback"];
        for n in 0..statuses.len() {
            let tasks: Vec<_> = statuses[..n].iter().map(|s| task(s)).collect();
            let summary = summarize(Some(tasks.as_slice()));
            assert_eq!(summary.total, tasks.len());
            for status in [
                BoardStatus::Todo,
                BoardStatus::InProgress,
                BoardStatus::AwaitingFeedback,
                BoardStatus::Done,
            ] {
                assert!(summary.count(status) <= summary.total);
            }
            assert!(
                summary.todo + summary.in_progress + summary.awaiting_feedback + summary.done
                    <= summary.total
            );
        }
    }
}

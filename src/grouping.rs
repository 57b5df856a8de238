use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::hierarchy::top_level_of;
use crate::models::{TaskStatus, TimesheetEntry};
use crate::visibility::TenantView;

#[derive(Debug, Clone, Serialize)]
pub struct EntryLine {
    pub entry_id: String,
    pub date: Option<NaiveDate>,
    pub hours: f64,
    pub note: String,
    pub paid: bool,
    pub task_short_name: String,
    pub task_description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChildGroup {
    pub client_id: String,
    pub client_name: String,
    pub entries: Vec<EntryLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParentGroup {
    pub parent_id: String,
    pub parent_name: String,
    pub total_hours: f64,
    pub children: Vec<ChildGroup>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskRow {
    pub task_id: String,
    pub client_id: String,
    pub client_name: String,
    pub short_name: String,
    pub description: String,
    pub status: String,
}

/// Visible entries grouped by top-level client, then client. A parent's
/// own entries appear as a child group carrying the parent's id.
pub fn group_timesheet(view: &TenantView<'_>) -> Vec<ParentGroup> {
    let mut grouped: BTreeMap<(String, String), BTreeMap<(String, String), Vec<EntryLine>>> =
        BTreeMap::new();

    for joined in view.joined_entries() {
        let top_id = top_level_of(view, joined.client);
        let top_name = view
            .client(top_id)
            .map(|client| client.name.clone())
            .unwrap_or_default();
        grouped
            .entry((top_name, top_id.to_string()))
            .or_default()
            .entry((joined.client.name.clone(), joined.client.id.clone()))
            .or_default()
            .push(entry_line(joined.entry, &joined.task.short_name, &joined.task.description));
    }

    grouped
        .into_iter()
        .map(|((parent_name, parent_id), children)| {
            let children: Vec<ChildGroup> = children
                .into_iter()
                .map(|((client_name, client_id), mut entries)| {
                    entries.sort_by(|a, b| (b.date, &a.entry_id).cmp(&(a.date, &b.entry_id)));
                    ChildGroup {
                        client_id,
                        client_name,
                        entries,
                    }
                })
                .collect();
            let total_hours = children
                .iter()
                .flat_map(|child| child.entries.iter())
                .map(|entry| entry.hours)
                .sum();
            ParentGroup {
                parent_id,
                parent_name,
                total_hours,
                children,
            }
        })
        .collect()
}

fn entry_line(entry: &TimesheetEntry, short_name: &str, description: &str) -> EntryLine {
    EntryLine {
        entry_id: entry.id.clone(),
        date: entry.date,
        hours: entry.hours,
        note: entry.description.clone(),
        paid: entry.paid,
        task_short_name: short_name.to_string(),
        task_description: description.to_string(),
    }
}

/// Visible tasks with their client's name, ordered by client then description.
pub fn list_tasks(view: &TenantView<'_>) -> Vec<TaskRow> {
    let mut rows: Vec<TaskRow> = view
        .tasks()
        .iter()
        .map(|task| TaskRow {
            task_id: task.id.clone(),
            client_id: task.client_id.clone(),
            client_name: view
                .client(&task.client_id)
                .map(|client| client.name.clone())
                .unwrap_or_default(),
            short_name: task.short_name.clone(),
            description: task.description.clone(),
            status: task.status.to_string(),
        })
        .collect();
    rows.sort_by(|a, b| {
        (&a.client_name, &a.description, &a.task_id).cmp(&(&b.client_name, &b.description, &b.task_id))
    });
    rows
}

pub fn pending_task_count(view: &TenantView<'_>) -> usize {
    view.tasks()
        .iter()
        .filter(|task| task.status != TaskStatus::Completed)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PaymentPolicy, TaskStatus};
    use crate::visibility::fixtures::*;

    #[test]
    fn groups_entries_by_parent_then_client() {
        let relations = relations(
            vec![
                client("a", "u1", "", PaymentPolicy::Hourly, 50.0),
                client("a1", "u1", "a", PaymentPolicy::Hourly, 30.0),
                client("b", "u1", "", PaymentPolicy::Hourly, 20.0),
            ],
            vec![task("t1", "u1", "a1"), task("t2", "u1", "a"), task("t3", "u1", "b")],
            vec![
                entry("e1", "u1", "t1", "2026-02-03", 1.0),
                entry("e2", "u1", "t1", "2026-02-05", 2.0),
                entry("e3", "u1", "t2", "2026-02-04", 0.5),
                entry("e4", "u1", "t3", "2026-02-04", 1.5),
            ],
        );
        let view = TenantView::new(&relations, "u1");

        let grouped = group_timesheet(&view);

        assert_eq!(grouped.len(), 2);
        let a = &grouped[0];
        assert_eq!(a.parent_id, "a");
        assert_eq!(a.children.len(), 2);
        assert!((a.total_hours - 3.5).abs() < 1e-9);
        let a1 = a.children.iter().find(|child| child.client_id == "a1").unwrap();
        assert_eq!(a1.entries[0].entry_id, "e2");
        assert_eq!(a1.entries[0].task_short_name, "T1");
    }

    #[test]
    fn pending_count_ignores_completed_and_deleted_tasks() {
        let mut done = task("t2", "u1", "a");
        done.status = TaskStatus::Completed;
        let mut gone = task("t3", "u1", "a");
        gone.deleted = true;
        let mut blocked = task("t4", "u1", "a");
        blocked.status = TaskStatus::Other("Blocked".to_string());
        let relations = relations(
            vec![client("a", "u1", "", PaymentPolicy::Hourly, 50.0)],
            vec![task("t1", "u1", "a"), done, gone, blocked],
            Vec::new(),
        );
        let view = TenantView::new(&relations, "u1");

        assert_eq!(pending_task_count(&view), 2);
        assert_eq!(list_tasks(&view).len(), 3);
    }
}

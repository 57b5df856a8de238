use std::collections::HashMap;

use crate::models::{Client, Relations, Task, TimesheetEntry};

pub fn visible_clients_for<'a>(
    relations: &'a Relations,
    tenant_id: &'a str,
) -> impl Iterator<Item = &'a Client> + 'a {
    relations
        .clients
        .iter()
        .filter(move |client| client.owner_id == tenant_id && !client.deleted)
}

pub fn visible_tasks_for<'a>(
    relations: &'a Relations,
    tenant_id: &'a str,
) -> impl Iterator<Item = &'a Task> + 'a {
    relations
        .tasks
        .iter()
        .filter(move |task| task.owner_id == tenant_id && !task.deleted)
}

pub fn visible_entries_for<'a>(
    relations: &'a Relations,
    tenant_id: &'a str,
) -> impl Iterator<Item = &'a TimesheetEntry> + 'a {
    relations
        .entries
        .iter()
        .filter(move |entry| entry.owner_id == tenant_id && !entry.deleted)
}

/// An entry joined with its task and the task's client.
#[derive(Debug, Clone, Copy)]
pub struct JoinedEntry<'a> {
    pub entry: &'a TimesheetEntry,
    pub task: &'a Task,
    pub client: &'a Client,
}

/// One tenant's non-deleted rows, indexed once per request.
pub struct TenantView<'a> {
    clients: Vec<&'a Client>,
    tasks: Vec<&'a Task>,
    entries: Vec<&'a TimesheetEntry>,
    clients_by_id: HashMap<&'a str, &'a Client>,
    tasks_by_id: HashMap<&'a str, &'a Task>,
    children_by_parent: HashMap<&'a str, Vec<&'a Client>>,
}

impl<'a> TenantView<'a> {
    pub fn new(relations: &'a Relations, tenant_id: &'a str) -> Self {
        let clients: Vec<&Client> = visible_clients_for(relations, tenant_id).collect();
        let tasks: Vec<&Task> = visible_tasks_for(relations, tenant_id).collect();
        let entries: Vec<&TimesheetEntry> = visible_entries_for(relations, tenant_id).collect();

        let clients_by_id = clients
            .iter()
            .copied()
            .map(|client| (client.id.as_str(), client))
            .collect();
        let tasks_by_id = tasks
            .iter()
            .copied()
            .map(|task| (task.id.as_str(), task))
            .collect();

        let mut children_by_parent: HashMap<&str, Vec<&Client>> = HashMap::new();
        for &client in &clients {
            if let Some(parent) = client.parent() {
                children_by_parent.entry(parent).or_default().push(client);
            }
        }

        Self {
            clients,
            tasks,
            entries,
            clients_by_id,
            tasks_by_id,
            children_by_parent,
        }
    }

    pub fn clients(&self) -> &[&'a Client] {
        &self.clients
    }

    pub fn tasks(&self) -> &[&'a Task] {
        &self.tasks
    }

    pub fn entries(&self) -> &[&'a TimesheetEntry] {
        &self.entries
    }

    pub fn client(&self, id: &str) -> Option<&'a Client> {
        self.clients_by_id.get(id).copied()
    }

    pub fn task(&self, id: &str) -> Option<&'a Task> {
        self.tasks_by_id.get(id).copied()
    }

    pub fn children_of(&self, parent_id: &str) -> &[&'a Client] {
        self.children_by_parent
            .get(parent_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn tasks_of(&self, client_id: &str) -> impl Iterator<Item = &'a Task> + '_ {
        let client_id = client_id.to_string();
        self.tasks
            .iter()
            .copied()
            .filter(move |task| task.client_id == client_id)
    }

    pub fn entries_of(&self, task_id: &str) -> impl Iterator<Item = &'a TimesheetEntry> + '_ {
        let task_id = task_id.to_string();
        self.entries
            .iter()
            .copied()
            .filter(move |entry| entry.task_id == task_id)
    }

    /// Entries whose task and client are both visible. Rows pointing at a
    /// deleted or foreign task or client are dropped.
    pub fn joined_entries(&self) -> Vec<JoinedEntry<'a>> {
        self.entries
            .iter()
            .copied()
            .filter_map(|entry| {
                let task = self.task(&entry.task_id)?;
                let client = self.client(&task.client_id)?;
                Some(JoinedEntry {
                    entry,
                    task,
                    client,
                })
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::NaiveDate;

    use crate::models::{Client, PaymentPolicy, Relations, Task, TaskStatus, TimesheetEntry};

    pub fn client(id: &str, owner: &str, parent: &str, policy: PaymentPolicy, amount: f64) -> Client {
        Client {
            id: id.to_string(),
            name: format!("Client {id}"),
            parent_id: parent.to_string(),
            payment_policy: policy,
            payment_amount: amount,
            deleted: false,
            owner_id: owner.to_string(),
        }
    }

    pub fn task(id: &str, owner: &str, client_id: &str) -> Task {
        Task {
            id: id.to_string(),
            client_id: client_id.to_string(),
            description: format!("Task {id}"),
            short_name: id.to_uppercase(),
            created_at: None,
            status: TaskStatus::Pending,
            deleted: false,
            owner_id: owner.to_string(),
        }
    }

    pub fn entry(id: &str, owner: &str, task_id: &str, date: &str, hours: f64) -> TimesheetEntry {
        TimesheetEntry {
            id: id.to_string(),
            task_id: task_id.to_string(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").ok(),
            hours,
            description: String::new(),
            paid: false,
            deleted: false,
            owner_id: owner.to_string(),
        }
    }

    pub fn relations(clients: Vec<Client>, tasks: Vec<Task>, entries: Vec<TimesheetEntry>) -> Relations {
        Relations {
            users: Vec::new(),
            clients,
            tasks,
            entries,
        }
    }
}

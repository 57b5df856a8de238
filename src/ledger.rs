use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::{ConflictReason, LedgerError};
use crate::hierarchy::validate_parent;
use crate::models::{
    Client, PaymentPolicy, Relations, Task, TaskStatus, TimesheetEntry, User, UserStatus, new_id,
};
use crate::storage::hash_credential;
use crate::visibility::TenantView;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub password: String,
    pub reporting_currency: String,
    pub payout_currency: String,
}

#[derive(Debug, Clone)]
pub struct ClientInput {
    pub name: String,
    pub parent_id: String,
    pub payment_policy: PaymentPolicy,
    pub payment_amount: f64,
}

#[derive(Debug, Clone)]
pub struct TaskInput {
    pub client_id: String,
    pub description: String,
    pub short_name: String,
}

#[derive(Debug, Clone)]
pub struct NewEntry {
    pub task_id: String,
    pub date: NaiveDate,
    pub hours: f64,
    pub note: String,
}

#[derive(Debug, Clone, Default)]
pub struct EntryUpdate {
    pub date: Option<NaiveDate>,
    pub hours: Option<f64>,
    pub note: Option<String>,
}

pub fn register_user(
    relations: &mut Relations,
    input: NewUser,
    now: DateTime<Utc>,
) -> Result<String, LedgerError> {
    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(LedgerError::validation("User name is required."));
    }
    if input.password.is_empty() {
        return Err(LedgerError::validation("Password is required."));
    }
    if relations.user_by_name(&name).is_some() {
        return Err(LedgerError::validation(format!("User {name} already exists.")));
    }

    let id = new_id();
    relations.users.push(User {
        credential_hash: hash_credential(&id, &input.password),
        id: id.clone(),
        name,
        reporting_currency: currency_code(&input.reporting_currency)?,
        payout_currency: currency_code(&input.payout_currency)?,
        created_at: Some(now),
        last_login: None,
        is_admin: false,
        status: UserStatus::Active,
        language: "en".to_string(),
    });
    Ok(id)
}

fn currency_code(value: &str) -> Result<String, LedgerError> {
    let code = value.trim().to_ascii_uppercase();
    if code.len() == 3 && code.chars().all(|ch| ch.is_ascii_alphabetic()) {
        Ok(code)
    } else {
        Err(LedgerError::validation(format!(
            "Currency {value:?} is not a three-letter code."
        )))
    }
}

fn validate_client_input(
    relations: &Relations,
    tenant_id: &str,
    client_id: Option<&str>,
    input: &ClientInput,
) -> Result<(), LedgerError> {
    if input.name.trim().is_empty() {
        return Err(LedgerError::validation("Client name is required."));
    }
    if !input.payment_amount.is_finite() || input.payment_amount < 0.0 {
        return Err(LedgerError::validation(
            "Payment amount must be a non-negative number.",
        ));
    }
    let view = TenantView::new(relations, tenant_id);
    validate_parent(&view, client_id, &input.parent_id)
}

pub fn add_client(
    relations: &mut Relations,
    tenant_id: &str,
    input: ClientInput,
) -> Result<String, LedgerError> {
    validate_client_input(relations, tenant_id, None, &input)?;

    let id = new_id();
    relations.clients.push(Client {
        id: id.clone(),
        name: input.name.trim().to_string(),
        parent_id: input.parent_id.trim().to_string(),
        payment_policy: input.payment_policy,
        payment_amount: input.payment_amount,
        deleted: false,
        owner_id: tenant_id.to_string(),
    });
    Ok(id)
}

pub fn edit_client(
    relations: &mut Relations,
    tenant_id: &str,
    client_id: &str,
    input: ClientInput,
) -> Result<(), LedgerError> {
    client_mut(relations, tenant_id, client_id)?;
    validate_client_input(relations, tenant_id, Some(client_id), &input)?;

    let client = client_mut(relations, tenant_id, client_id)?;
    client.name = input.name.trim().to_string();
    client.parent_id = input.parent_id.trim().to_string();
    client.payment_policy = input.payment_policy;
    client.payment_amount = input.payment_amount;
    Ok(())
}

pub fn client_conflict(view: &TenantView<'_>, client_id: &str) -> Option<ConflictReason> {
    let children = view.children_of(client_id).len();
    if children > 0 {
        return Some(ConflictReason::ActiveChildClients(children));
    }
    let tasks = view.tasks_of(client_id).count();
    if tasks > 0 {
        return Some(ConflictReason::ActiveTasks(tasks));
    }
    None
}

pub fn can_delete_client(relations: &Relations, tenant_id: &str, client_id: &str) -> bool {
    let view = TenantView::new(relations, tenant_id);
    view.client(client_id).is_some() && client_conflict(&view, client_id).is_none()
}

pub fn delete_client(
    relations: &mut Relations,
    tenant_id: &str,
    client_id: &str,
) -> Result<(), LedgerError> {
    let conflict = {
        let view = TenantView::new(relations, tenant_id);
        view.client(client_id)
            .ok_or_else(|| LedgerError::not_found("client", client_id))?;
        client_conflict(&view, client_id)
    };
    refuse("client", client_id, conflict)?;

    client_mut(relations, tenant_id, client_id)?.deleted = true;
    Ok(())
}

fn validate_task_input(
    relations: &Relations,
    tenant_id: &str,
    input: &TaskInput,
) -> Result<(), LedgerError> {
    if input.description.trim().is_empty() {
        return Err(LedgerError::validation("Task description is required."));
    }
    let view = TenantView::new(relations, tenant_id);
    if view.client(&input.client_id).is_none() {
        return Err(LedgerError::not_found("client", &input.client_id));
    }
    Ok(())
}

pub fn add_task(
    relations: &mut Relations,
    tenant_id: &str,
    input: TaskInput,
    now: NaiveDateTime,
) -> Result<String, LedgerError> {
    validate_task_input(relations, tenant_id, &input)?;

    let id = new_id();
    relations.tasks.push(Task {
        id: id.clone(),
        client_id: input.client_id,
        description: input.description.trim().to_string(),
        short_name: input.short_name.trim().to_string(),
        created_at: Some(now),
        status: TaskStatus::Pending,
        deleted: false,
        owner_id: tenant_id.to_string(),
    });
    Ok(id)
}

pub fn edit_task(
    relations: &mut Relations,
    tenant_id: &str,
    task_id: &str,
    input: TaskInput,
) -> Result<(), LedgerError> {
    task_mut(relations, tenant_id, task_id)?;
    validate_task_input(relations, tenant_id, &input)?;

    let task = task_mut(relations, tenant_id, task_id)?;
    task.client_id = input.client_id;
    task.description = input.description.trim().to_string();
    task.short_name = input.short_name.trim().to_string();
    Ok(())
}

/// Any status may follow any other.
pub fn set_task_status(
    relations: &mut Relations,
    tenant_id: &str,
    task_id: &str,
    status: TaskStatus,
) -> Result<(), LedgerError> {
    task_mut(relations, tenant_id, task_id)?.status = status;
    Ok(())
}

pub fn task_conflict(view: &TenantView<'_>, task_id: &str) -> Option<ConflictReason> {
    let entries = view.entries_of(task_id).count();
    (entries > 0).then_some(ConflictReason::ActiveEntries(entries))
}

pub fn can_delete_task(relations: &Relations, tenant_id: &str, task_id: &str) -> bool {
    let view = TenantView::new(relations, tenant_id);
    view.task(task_id).is_some() && task_conflict(&view, task_id).is_none()
}

pub fn delete_task(
    relations: &mut Relations,
    tenant_id: &str,
    task_id: &str,
) -> Result<(), LedgerError> {
    let conflict = {
        let view = TenantView::new(relations, tenant_id);
        view.task(task_id)
            .ok_or_else(|| LedgerError::not_found("task", task_id))?;
        task_conflict(&view, task_id)
    };
    refuse("task", task_id, conflict)?;

    task_mut(relations, tenant_id, task_id)?.deleted = true;
    Ok(())
}

pub fn log_hours(
    relations: &mut Relations,
    tenant_id: &str,
    input: NewEntry,
) -> Result<String, LedgerError> {
    if !input.hours.is_finite() || input.hours <= 0.0 {
        return Err(LedgerError::validation("Enter a valid number of hours."));
    }
    if TenantView::new(relations, tenant_id).task(&input.task_id).is_none() {
        return Err(LedgerError::not_found("task", &input.task_id));
    }

    let id = new_id();
    relations.entries.push(TimesheetEntry {
        id: id.clone(),
        task_id: input.task_id,
        date: Some(input.date),
        hours: input.hours,
        description: input.note.trim().to_string(),
        paid: false,
        deleted: false,
        owner_id: tenant_id.to_string(),
    });
    Ok(id)
}

/// Edits keep whatever hours value is given as long as it is a number.
pub fn edit_entry(
    relations: &mut Relations,
    tenant_id: &str,
    entry_id: &str,
    update: EntryUpdate,
) -> Result<(), LedgerError> {
    if update.hours.is_some_and(|hours| !hours.is_finite()) {
        return Err(LedgerError::validation("Enter a valid number of hours."));
    }

    let entry = entry_mut(relations, tenant_id, entry_id)?;
    if let Some(date) = update.date {
        entry.date = Some(date);
    }
    if let Some(hours) = update.hours {
        entry.hours = hours;
    }
    if let Some(note) = update.note {
        entry.description = note.trim().to_string();
    }
    Ok(())
}

pub fn mark_paid(
    relations: &mut Relations,
    tenant_id: &str,
    entry_id: &str,
) -> Result<(), LedgerError> {
    entry_mut(relations, tenant_id, entry_id)?.paid = true;
    Ok(())
}

pub fn entry_conflict(entry: &TimesheetEntry) -> Option<ConflictReason> {
    entry.paid.then_some(ConflictReason::EntryPaid)
}

pub fn can_delete_entry(relations: &Relations, tenant_id: &str, entry_id: &str) -> bool {
    TenantView::new(relations, tenant_id)
        .entries()
        .iter()
        .find(|entry| entry.id == entry_id)
        .is_some_and(|entry| entry_conflict(entry).is_none())
}

pub fn delete_entry(
    relations: &mut Relations,
    tenant_id: &str,
    entry_id: &str,
) -> Result<(), LedgerError> {
    let entry = entry_mut(relations, tenant_id, entry_id)?;
    refuse("entry", entry_id, entry_conflict(entry))?;
    entry.deleted = true;
    Ok(())
}

fn refuse(
    entity: &'static str,
    id: &str,
    conflict: Option<ConflictReason>,
) -> Result<(), LedgerError> {
    match conflict {
        Some(reason) => {
            tracing::info!(entity, id, %reason, "Deletion refused");
            Err(LedgerError::Conflict {
                entity,
                id: id.to_string(),
                reason,
            })
        }
        None => Ok(()),
    }
}

fn client_mut<'a>(
    relations: &'a mut Relations,
    tenant_id: &str,
    client_id: &str,
) -> Result<&'a mut Client, LedgerError> {
    relations
        .clients
        .iter_mut()
        .find(|client| client.id == client_id && client.owner_id == tenant_id && !client.deleted)
        .ok_or_else(|| LedgerError::not_found("client", client_id))
}

fn task_mut<'a>(
    relations: &'a mut Relations,
    tenant_id: &str,
    task_id: &str,
) -> Result<&'a mut Task, LedgerError> {
    relations
        .tasks
        .iter_mut()
        .find(|task| task.id == task_id && task.owner_id == tenant_id && !task.deleted)
        .ok_or_else(|| LedgerError::not_found("task", task_id))
}

fn entry_mut<'a>(
    relations: &'a mut Relations,
    tenant_id: &str,
    entry_id: &str,
) -> Result<&'a mut TimesheetEntry, LedgerError> {
    relations
        .entries
        .iter_mut()
        .find(|entry| entry.id == entry_id && entry.owner_id == tenant_id && !entry.deleted)
        .ok_or_else(|| LedgerError::not_found("entry", entry_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visibility::fixtures::*;
    use chrono::NaiveDate;

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
    }

    fn now() -> NaiveDateTime {
        date("2026-02-01").and_hms_opt(9, 0, 0).unwrap()
    }

    fn hourly(name: &str, parent: &str) -> ClientInput {
        ClientInput {
            name: name.to_string(),
            parent_id: parent.to_string(),
            payment_policy: PaymentPolicy::Hourly,
            payment_amount: 40.0,
        }
    }

    fn task_input(client_id: &str) -> TaskInput {
        TaskInput {
            client_id: client_id.to_string(),
            description: "Build the thing".to_string(),
            short_name: "BUILD".to_string(),
        }
    }

    fn new_entry(task_id: &str, hours: f64) -> NewEntry {
        NewEntry {
            task_id: task_id.to_string(),
            date: date("2026-02-03"),
            hours,
            note: "  worked  ".to_string(),
        }
    }

    #[test]
    fn register_user_rejects_duplicate_names() {
        let mut relations = Relations::default();
        let input = NewUser {
            name: "ana".to_string(),
            password: "secret".to_string(),
            reporting_currency: "eur".to_string(),
            payout_currency: "USD".to_string(),
        };

        let id = register_user(&mut relations, input.clone(), Utc::now()).unwrap();
        let user = &relations.users[0];
        assert_eq!(user.id, id);
        assert_eq!(user.reporting_currency, "EUR");
        assert_ne!(user.credential_hash, "secret");

        let duplicate = register_user(&mut relations, input.clone(), Utc::now());
        assert!(matches!(duplicate, Err(LedgerError::Validation(_))));

        let other_case = NewUser {
            name: "Ana".to_string(),
            ..input
        };
        assert!(register_user(&mut relations, other_case, Utc::now()).is_ok());
    }

    #[test]
    fn client_name_is_required() {
        let mut relations = Relations::default();
        let result = add_client(&mut relations, "u1", hourly("   ", ""));
        assert!(matches!(result, Err(LedgerError::Validation(_))));
        assert!(relations.clients.is_empty());
    }

    #[test]
    fn client_parent_must_be_top_level_and_same_tenant() {
        let mut relations = Relations::default();
        let parent = add_client(&mut relations, "u1", hourly("Acme", "")).unwrap();
        let child = add_client(&mut relations, "u1", hourly("Acme EU", &parent)).unwrap();

        let nested = add_client(&mut relations, "u1", hourly("Acme EU Dev", &child));
        assert!(matches!(nested, Err(LedgerError::Validation(_))));

        let foreign = add_client(&mut relations, "u2", hourly("Mine", &parent));
        assert!(matches!(foreign, Err(LedgerError::NotFound { .. })));
    }

    #[test]
    fn edit_client_updates_in_place_within_tenant() {
        let mut relations = Relations::default();
        let id = add_client(&mut relations, "u1", hourly("Acme", "")).unwrap();

        let update = ClientInput {
            payment_policy: PaymentPolicy::Monthly,
            payment_amount: 1000.0,
            ..hourly("Acme Corp", "")
        };
        edit_client(&mut relations, "u1", &id, update.clone()).unwrap();
        assert_eq!(relations.clients[0].name, "Acme Corp");
        assert_eq!(relations.clients[0].payment_policy, PaymentPolicy::Monthly);

        let foreign = edit_client(&mut relations, "u2", &id, update);
        assert!(matches!(foreign, Err(LedgerError::NotFound { .. })));
    }

    #[test]
    fn client_with_live_child_cannot_be_deleted() {
        let mut relations = Relations::default();
        let parent = add_client(&mut relations, "u1", hourly("Acme", "")).unwrap();
        let child = add_client(&mut relations, "u1", hourly("Acme EU", &parent)).unwrap();

        assert!(!can_delete_client(&relations, "u1", &parent));
        let err = delete_client(&mut relations, "u1", &parent).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Conflict {
                reason: ConflictReason::ActiveChildClients(1),
                ..
            }
        ));

        delete_client(&mut relations, "u1", &child).unwrap();
        assert!(can_delete_client(&relations, "u1", &parent));
        delete_client(&mut relations, "u1", &parent).unwrap();
        assert!(relations.clients.iter().all(|client| client.deleted));
        assert_eq!(relations.clients.len(), 2);
    }

    #[test]
    fn client_with_live_task_cannot_be_deleted() {
        let mut relations = Relations::default();
        let client_id = add_client(&mut relations, "u1", hourly("Acme", "")).unwrap();
        add_task(&mut relations, "u1", task_input(&client_id), now()).unwrap();

        let err = delete_client(&mut relations, "u1", &client_id).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Conflict {
                reason: ConflictReason::ActiveTasks(1),
                ..
            }
        ));
        assert!(!relations.clients[0].deleted);
    }

    #[test]
    fn task_with_live_entry_cannot_be_deleted() {
        let mut relations = Relations::default();
        let client_id = add_client(&mut relations, "u1", hourly("Acme", "")).unwrap();
        let task_id = add_task(&mut relations, "u1", task_input(&client_id), now()).unwrap();
        let entry_id = log_hours(&mut relations, "u1", new_entry(&task_id, 2.0)).unwrap();

        assert!(!can_delete_task(&relations, "u1", &task_id));
        assert!(matches!(
            delete_task(&mut relations, "u1", &task_id),
            Err(LedgerError::Conflict {
                reason: ConflictReason::ActiveEntries(1),
                ..
            })
        ));

        delete_entry(&mut relations, "u1", &entry_id).unwrap();
        delete_task(&mut relations, "u1", &task_id).unwrap();
        assert!(relations.tasks[0].deleted);
    }

    #[test]
    fn paid_entry_cannot_be_deleted() {
        let mut relations = Relations::default();
        let client_id = add_client(&mut relations, "u1", hourly("Acme", "")).unwrap();
        let task_id = add_task(&mut relations, "u1", task_input(&client_id), now()).unwrap();
        let entry_id = log_hours(&mut relations, "u1", new_entry(&task_id, 2.0)).unwrap();

        mark_paid(&mut relations, "u1", &entry_id).unwrap();
        mark_paid(&mut relations, "u1", &entry_id).unwrap();

        assert!(!can_delete_entry(&relations, "u1", &entry_id));
        assert_eq!(
            delete_entry(&mut relations, "u1", &entry_id),
            Err(LedgerError::Conflict {
                entity: "entry",
                id: entry_id.clone(),
                reason: ConflictReason::EntryPaid,
            })
        );
        assert!(relations.entries[0].paid);
        assert!(!relations.entries[0].deleted);
    }

    #[test]
    fn log_hours_validates_hours_and_task() {
        let mut relations = relations(
            vec![client("c1", "u1", "", PaymentPolicy::Hourly, 10.0)],
            vec![task("t1", "u1", "c1")],
            Vec::new(),
        );

        for hours in [0.0, -1.0, f64::NAN] {
            assert!(matches!(
                log_hours(&mut relations, "u1", new_entry("t1", hours)),
                Err(LedgerError::Validation(_))
            ));
        }
        assert!(matches!(
            log_hours(&mut relations, "u2", new_entry("t1", 1.0)),
            Err(LedgerError::NotFound { .. })
        ));

        log_hours(&mut relations, "u1", new_entry("t1", 1.5)).unwrap();
        assert_eq!(relations.entries[0].description, "worked");
        assert_eq!(relations.entries[0].owner_id, "u1");
    }

    #[test]
    fn edit_entry_does_not_revalidate_positive_hours() {
        let mut relations = relations(
            vec![client("c1", "u1", "", PaymentPolicy::Hourly, 10.0)],
            vec![task("t1", "u1", "c1")],
            vec![entry("e1", "u1", "t1", "2026-02-03", 2.0)],
        );

        let update = EntryUpdate {
            hours: Some(0.0),
            note: Some("corrected".to_string()),
            ..EntryUpdate::default()
        };
        edit_entry(&mut relations, "u1", "e1", update).unwrap();
        assert_eq!(relations.entries[0].hours, 0.0);
        assert_eq!(relations.entries[0].description, "corrected");

        let bad = EntryUpdate {
            hours: Some(f64::INFINITY),
            ..EntryUpdate::default()
        };
        assert!(edit_entry(&mut relations, "u1", "e1", bad).is_err());
    }

    #[test]
    fn task_status_changes_are_unconstrained() {
        let mut relations = relations(
            vec![client("c1", "u1", "", PaymentPolicy::Hourly, 10.0)],
            vec![task("t1", "u1", "c1")],
            Vec::new(),
        );

        set_task_status(&mut relations, "u1", "t1", TaskStatus::Completed).unwrap();
        set_task_status(&mut relations, "u1", "t1", TaskStatus::Pending).unwrap();
        set_task_status(&mut relations, "u1", "t1", TaskStatus::Other("Blocked".to_string()))
            .unwrap();
        assert_eq!(relations.tasks[0].status, TaskStatus::Other("Blocked".to_string()));
    }
}

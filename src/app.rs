use chrono::{Local, Utc};
use serde::Serialize;
use std::error::Error;

use crate::cli::{ClientCommand, Command, EntryCommand, TaskCommand, UserCommand};
use crate::dates;
use crate::error::LedgerError;
use crate::fx::{ExchangeRateCache, FloatRatesClient};
use crate::grouping::{group_timesheet, list_tasks, pending_task_count};
use crate::ledger::{self, ClientInput, EntryUpdate, NewEntry, NewUser, TaskInput};
use crate::models::{Relations, TaskStatus};
use crate::rollups::{ConvertedTotals, SummaryFilter, SummaryResult, compute_monthly_summary};
use crate::storage::{self, Settings};
use crate::visibility::TenantView;

#[derive(Serialize)]
struct SummaryReport<'a> {
    summary: &'a SummaryResult,
    converted: &'a ConvertedTotals,
}

pub struct App {
    settings: Settings,
    relations: Relations,
    user: Option<String>,
    dirty: bool,
}

impl App {
    pub fn load(settings: Settings, user: Option<String>) -> Result<Self, Box<dyn Error>> {
        let relations = storage::load_relations(&settings.data_file)?;
        Ok(Self {
            settings,
            relations,
            user,
            dirty: false,
        })
    }

    pub fn run(&mut self, command: Command) -> Result<(), Box<dyn Error>> {
        match command {
            Command::User(command) => self.handle_user(command)?,
            Command::Client(command) => self.handle_client(command)?,
            Command::Task(command) => self.handle_task(command)?,
            Command::Entry(command) => self.handle_entry(command)?,
            Command::Log {
                task,
                hours,
                date,
                note,
            } => {
                let tenant = self.tenant_id()?;
                let input = NewEntry {
                    task_id: task,
                    date: date.unwrap_or_else(dates::today),
                    hours,
                    note,
                };
                let id = ledger::log_hours(&mut self.relations, &tenant, input)?;
                self.dirty = true;
                println!("Logged hours successfully ({id}).");
            }
            Command::Timesheet => self.print_timesheet()?,
            Command::Summary {
                months,
                clients,
                currency,
                json,
            } => {
                let filter = SummaryFilter {
                    months: months.into_iter().collect(),
                    clients: clients.into_iter().collect(),
                };
                self.print_summary(&filter, currency, json)?;
            }
            Command::Rate { currency, amount } => {
                let cache = self.rate_cache()?;
                let converted = cache.convert(amount, &currency);
                self.save_rates(&cache);
                let converted = converted?;
                println!("{amount:.2} USD = {converted:.4} {}", currency.to_ascii_uppercase());
            }
        }

        if self.dirty {
            storage::save_relations(&self.settings.data_file, &self.relations)?;
            tracing::info!(path = %self.settings.data_file.display(), "Store updated");
        }
        Ok(())
    }

    fn tenant_id(&self) -> Result<String, LedgerError> {
        let name = self
            .user
            .as_deref()
            .ok_or_else(|| LedgerError::validation("Pass --user to choose the acting user."))?;
        self.relations
            .user_by_name(name)
            .map(|user| user.id.clone())
            .ok_or_else(|| LedgerError::not_found("user", name))
    }

    fn rate_cache(&self) -> Result<ExchangeRateCache, Box<dyn Error>> {
        let source = FloatRatesClient::new(&self.settings.fx_endpoint, self.settings.fx_timeout)?;
        let saved = self
            .settings
            .rate_cache_file
            .as_deref()
            .map(storage::read_rate_cache)
            .unwrap_or_default();
        Ok(ExchangeRateCache::new(source, self.settings.fx_ttl).with_rates(saved))
    }

    fn save_rates(&self, cache: &ExchangeRateCache) {
        let Some(path) = self.settings.rate_cache_file.as_deref() else {
            return;
        };
        if !cache.is_refreshed() {
            return;
        }
        if let Err(err) = storage::write_rate_cache(path, &cache.snapshot()) {
            tracing::warn!(path = %path.display(), error = %err, "Could not save exchange rates");
        }
    }

    fn handle_user(&mut self, command: UserCommand) -> Result<(), Box<dyn Error>> {
        match command {
            UserCommand::Add {
                name,
                password,
                currency,
                payout_currency,
            } => {
                let input = NewUser {
                    name,
                    password,
                    reporting_currency: currency,
                    payout_currency,
                };
                let id = ledger::register_user(&mut self.relations, input, Utc::now())?;
                self.dirty = true;
                println!("User added ({id}).");
            }
        }
        Ok(())
    }

    fn handle_client(&mut self, command: ClientCommand) -> Result<(), Box<dyn Error>> {
        let tenant = self.tenant_id()?;
        match command {
            ClientCommand::Add {
                name,
                parent,
                policy,
                amount,
            } => {
                let input = ClientInput {
                    name,
                    parent_id: parent,
                    payment_policy: policy.into(),
                    payment_amount: amount,
                };
                let id = ledger::add_client(&mut self.relations, &tenant, input)?;
                self.dirty = true;
                println!("Client added successfully ({id}).");
            }
            ClientCommand::Edit {
                id,
                name,
                parent,
                policy,
                amount,
            } => {
                let current = TenantView::new(&self.relations, &tenant)
                    .client(&id)
                    .cloned()
                    .ok_or_else(|| LedgerError::not_found("client", &id))?;
                let input = ClientInput {
                    name: name.unwrap_or(current.name),
                    parent_id: parent.unwrap_or(current.parent_id),
                    payment_policy: policy.map(Into::into).unwrap_or(current.payment_policy),
                    payment_amount: amount.unwrap_or(current.payment_amount),
                };
                ledger::edit_client(&mut self.relations, &tenant, &id, input)?;
                self.dirty = true;
                println!("Client updated successfully.");
            }
            ClientCommand::Delete { id } => {
                ledger::delete_client(&mut self.relations, &tenant, &id)?;
                self.dirty = true;
                println!("Client deleted.");
            }
            ClientCommand::List => {
                let view = TenantView::new(&self.relations, &tenant);
                let mut clients = view.clients().to_vec();
                clients.sort_by(|a, b| (&a.name, &a.id).cmp(&(&b.name, &b.id)));
                for client in clients {
                    let parent = client
                        .parent()
                        .and_then(|id| view.client(id))
                        .map(|parent| format!(" (under {})", parent.name))
                        .unwrap_or_default();
                    let lock = lock_marker(ledger::can_delete_client(
                        &self.relations,
                        &tenant,
                        &client.id,
                    ));
                    println!(
                        "{}  {}{}  {} {:.2}{lock}",
                        client.id, client.name, parent, client.payment_policy, client.payment_amount
                    );
                }
            }
        }
        Ok(())
    }

    fn handle_task(&mut self, command: TaskCommand) -> Result<(), Box<dyn Error>> {
        let tenant = self.tenant_id()?;
        match command {
            TaskCommand::Add {
                client,
                description,
                short_name,
            } => {
                let input = TaskInput {
                    client_id: client,
                    description,
                    short_name,
                };
                let now = Local::now().naive_local();
                let id = ledger::add_task(&mut self.relations, &tenant, input, now)?;
                self.dirty = true;
                println!("Task added successfully ({id}).");
            }
            TaskCommand::Edit {
                id,
                client,
                description,
                short_name,
            } => {
                let current = TenantView::new(&self.relations, &tenant)
                    .task(&id)
                    .cloned()
                    .ok_or_else(|| LedgerError::not_found("task", &id))?;
                let input = TaskInput {
                    client_id: client.unwrap_or(current.client_id),
                    description: description.unwrap_or(current.description),
                    short_name: short_name.unwrap_or(current.short_name),
                };
                ledger::edit_task(&mut self.relations, &tenant, &id, input)?;
                self.dirty = true;
                println!("Task updated successfully.");
            }
            TaskCommand::Status { id, status } => {
                ledger::set_task_status(&mut self.relations, &tenant, &id, TaskStatus::from(status))?;
                self.dirty = true;
                println!("Status updated.");
            }
            TaskCommand::Delete { id } => {
                ledger::delete_task(&mut self.relations, &tenant, &id)?;
                self.dirty = true;
                println!("Task deleted.");
            }
            TaskCommand::List => {
                let view = TenantView::new(&self.relations, &tenant);
                for row in list_tasks(&view) {
                    let lock =
                        lock_marker(ledger::can_delete_task(&self.relations, &tenant, &row.task_id));
                    println!(
                        "{}  {} - {} [{}] {}{lock}",
                        row.task_id, row.client_name, row.description, row.short_name, row.status
                    );
                }
            }
            TaskCommand::Pending => {
                let view = TenantView::new(&self.relations, &tenant);
                println!("{}", pending_task_count(&view));
            }
        }
        Ok(())
    }

    fn handle_entry(&mut self, command: EntryCommand) -> Result<(), Box<dyn Error>> {
        let tenant = self.tenant_id()?;
        match command {
            EntryCommand::Edit {
                id,
                date,
                hours,
                note,
            } => {
                let update = EntryUpdate { date, hours, note };
                ledger::edit_entry(&mut self.relations, &tenant, &id, update)?;
                self.dirty = true;
                println!("Entry updated.");
            }
            EntryCommand::Paid { id } => {
                ledger::mark_paid(&mut self.relations, &tenant, &id)?;
                self.dirty = true;
                println!("Entry marked paid.");
            }
            EntryCommand::Delete { id } => {
                ledger::delete_entry(&mut self.relations, &tenant, &id)?;
                self.dirty = true;
                println!("Entry deleted.");
            }
        }
        Ok(())
    }

    fn print_timesheet(&self) -> Result<(), Box<dyn Error>> {
        let tenant = self.tenant_id()?;
        let view = TenantView::new(&self.relations, &tenant);
        for group in group_timesheet(&view) {
            println!("{} ({:.2}h)", group.parent_name, group.total_hours);
            for child in &group.children {
                println!("  {}", child.client_name);
                for entry in &child.entries {
                    let date = entry
                        .date
                        .map(|date| date.format("%Y-%m-%d").to_string())
                        .unwrap_or_else(|| "-".to_string());
                    let paid = if entry.paid { "paid" } else { "open" };
                    let lock =
                        lock_marker(ledger::can_delete_entry(&self.relations, &tenant, &entry.entry_id));
                    println!(
                        "    {}  {date}  {:>6.2}h  {paid:<4}  {} {}{lock}",
                        entry.entry_id, entry.hours, entry.task_short_name, entry.note
                    );
                }
            }
        }
        Ok(())
    }

    fn print_summary(
        &self,
        filter: &SummaryFilter,
        currency: Option<String>,
        json: bool,
    ) -> Result<(), Box<dyn Error>> {
        let tenant = self.tenant_id()?;
        let summary = compute_monthly_summary(&tenant, &self.relations, filter);

        let currency = currency
            .or_else(|| {
                self.relations
                    .users
                    .iter()
                    .find(|user| user.id == tenant)
                    .map(|user| user.reporting_currency.clone())
            })
            .unwrap_or_else(|| self.settings.default_currency.clone());
        let cache = self.rate_cache()?;
        let converted = summary.totals.in_currency(&cache, &currency);
        self.save_rates(&cache);

        if json {
            let report = SummaryReport {
                summary: &summary,
                converted: &converted,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        print_summary_rows(&summary);
        println!(
            "Earnings {:.2} USD | Paid {:.2} USD | Pending {:.2} USD",
            summary.totals.earnings, summary.totals.paid, summary.totals.pending
        );
        println!(
            "Earnings {:.2} {cur} | Paid {:.2} {cur} | Pending {:.2} {cur}",
            converted.earnings,
            converted.paid,
            converted.pending,
            cur = converted.currency
        );
        if converted.degraded {
            println!("Exchange rate unavailable; {} figures are unconverted.", converted.currency);
        }
        Ok(())
    }
}

fn lock_marker(deletable: bool) -> &'static str {
    if deletable { "" } else { "  [locked]" }
}

fn print_summary_rows(summary: &SummaryResult) {
    for row in &summary.rows {
        let overpaid = if row.overpaid { "  [overpaid]" } else { "" };
        println!(
            "{}  {:<24} {:>7.2}h  earned {:>10.2}  paid {:>10.2}  pending {:>10.2}{overpaid}",
            row.month, row.parent_name, row.total.hours, row.total.earnings, row.total.paid, row.pending
        );
        if row.own.hours != 0.0 || row.own.earnings != 0.0 {
            println!(
                "           {:<22} {:>7.2}h  earned {:>10.2}",
                "(direct)", row.own.hours, row.own.earnings
            );
        }
        for child in &row.children {
            println!(
                "           {:<22} {:>7.2}h  earned {:>10.2}",
                child.client_name, child.totals.hours, child.totals.earnings
            );
        }
    }
}

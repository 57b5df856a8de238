use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::dates::{YearMonth, parse_date};
use crate::models::PaymentPolicy;

#[derive(Debug, Parser)]
#[command(name = "freelance-ledger", version, about = "Track freelance work and monthly billing")]
pub struct Cli {
    /// Store file to use instead of the configured one.
    #[arg(long, global = true)]
    pub data: Option<PathBuf>,

    /// Acting user. Required for everything except `user add` and `rate`.
    #[arg(long, short, global = true)]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage users
    #[command(subcommand)]
    User(UserCommand),
    /// Manage clients and sub-clients
    #[command(subcommand)]
    Client(ClientCommand),
    /// Manage tasks
    #[command(subcommand)]
    Task(TaskCommand),
    /// Log hours against a task
    Log {
        #[arg(long)]
        task: String,
        #[arg(long)]
        hours: f64,
        /// Defaults to today.
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "")]
        note: String,
    },
    /// Edit, pay or delete timesheet entries
    #[command(subcommand)]
    Entry(EntryCommand),
    /// Show entries grouped by client
    Timesheet,
    /// Monthly earnings summary
    Summary {
        /// Restrict to these months (YYYY-MM). Repeatable.
        #[arg(long = "month")]
        months: Vec<YearMonth>,
        /// Restrict to these top-level clients. Repeatable.
        #[arg(long = "client")]
        clients: Vec<String>,
        /// Currency for the grand totals. Defaults to the user's reporting currency.
        #[arg(long)]
        currency: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show the USD exchange rate for a currency
    Rate {
        currency: String,
        #[arg(long, default_value_t = 1.0)]
        amount: f64,
    },
}

#[derive(Debug, Subcommand)]
pub enum UserCommand {
    Add {
        name: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "USD")]
        currency: String,
        #[arg(long, default_value = "USD")]
        payout_currency: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ClientCommand {
    Add {
        name: String,
        /// Parent client id; must be a top-level client.
        #[arg(long, default_value = "")]
        parent: String,
        #[arg(long, value_enum, default_value_t = PolicyArg::Hourly)]
        policy: PolicyArg,
        #[arg(long, default_value_t = 0.0)]
        amount: f64,
    },
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        /// Use an empty value to make the client top-level.
        #[arg(long)]
        parent: Option<String>,
        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,
        #[arg(long)]
        amount: Option<f64>,
    },
    Delete {
        id: String,
    },
    List,
}

#[derive(Debug, Subcommand)]
pub enum TaskCommand {
    Add {
        #[arg(long)]
        client: String,
        description: String,
        #[arg(long, default_value = "")]
        short_name: String,
    },
    Edit {
        id: String,
        #[arg(long)]
        client: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        short_name: Option<String>,
    },
    Status {
        id: String,
        status: String,
    },
    Delete {
        id: String,
    },
    List,
    /// Number of tasks not yet completed
    Pending,
}

#[derive(Debug, Subcommand)]
pub enum EntryCommand {
    Edit {
        id: String,
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
        #[arg(long)]
        hours: Option<f64>,
        #[arg(long)]
        note: Option<String>,
    },
    Paid {
        id: String,
    },
    Delete {
        id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    Hourly,
    Monthly,
    Project,
}

impl From<PolicyArg> for PaymentPolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::Hourly => PaymentPolicy::Hourly,
            PolicyArg::Monthly => PaymentPolicy::Monthly,
            PolicyArg::Project => PaymentPolicy::Project,
        }
    }
}

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub credential_hash: String,
    #[serde(default = "default_currency")]
    pub reporting_currency: String,
    #[serde(default = "default_currency")]
    pub payout_currency: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub status: UserStatus,
    #[serde(default = "default_language")]
    pub language: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PaymentPolicy {
    #[default]
    Hourly,
    Monthly,
    Project,
}

impl PaymentPolicy {
    /// Monthly and Project clients bill a flat amount rather than a rate.
    pub fn is_flat(self) -> bool {
        matches!(self, PaymentPolicy::Monthly | PaymentPolicy::Project)
    }
}

impl fmt::Display for PaymentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PaymentPolicy::Hourly => "Hourly",
            PaymentPolicy::Monthly => "Monthly",
            PaymentPolicy::Project => "Project",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub name: String,
    /// Empty string means top-level.
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub payment_policy: PaymentPolicy,
    #[serde(default)]
    pub payment_amount: f64,
    #[serde(default)]
    pub deleted: bool,
    pub owner_id: String,
}

impl Client {
    pub fn parent(&self) -> Option<&str> {
        let parent = self.parent_id.trim();
        if parent.is_empty() { None } else { Some(parent) }
    }

    pub fn is_top_level(&self) -> bool {
        self.parent().is_none()
    }
}

/// Task status is an open set; unknown values are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Other(String),
}

impl From<String> for TaskStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "" | "Pending" => TaskStatus::Pending,
            "In-Progress" => TaskStatus::InProgress,
            "Completed" => TaskStatus::Completed,
            _ => TaskStatus::Other(value),
        }
    }
}

impl From<TaskStatus> for String {
    fn from(value: TaskStatus) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => f.write_str("Pending"),
            TaskStatus::InProgress => f.write_str("In-Progress"),
            TaskStatus::Completed => f.write_str("Completed"),
            TaskStatus::Other(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub client_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub short_name: String,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub deleted: bool,
    pub owner_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimesheetEntry {
    pub id: String,
    pub task_id: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub hours: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub paid: bool,
    #[serde(default)]
    pub deleted: bool,
    pub owner_id: String,
}

/// The four relations, loaded and persisted as one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Relations {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub clients: Vec<Client>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub entries: Vec<TimesheetEntry>,
}

impl Relations {
    pub fn user_by_name(&self, name: &str) -> Option<&User> {
        self.users.iter().find(|user| user.name == name)
    }
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

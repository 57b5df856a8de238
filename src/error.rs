use std::fmt;
use std::io;
use thiserror::Error;

/// Why a deletion was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    ActiveChildClients(usize),
    ActiveTasks(usize),
    ActiveEntries(usize),
    EntryPaid,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::ActiveChildClients(count) => {
                write!(f, "{count} sub-client(s) still reference it")
            }
            ConflictReason::ActiveTasks(count) => write!(f, "{count} task(s) still reference it"),
            ConflictReason::ActiveEntries(count) => {
                write!(f, "{count} timesheet entr(ies) still reference it")
            }
            ConflictReason::EntryPaid => f.write_str("the entry has already been paid"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Cannot delete {entity} {id}: {reason}")]
    Conflict {
        entity: &'static str,
        id: String,
        reason: ConflictReason,
    },
}

impl LedgerError {
    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, id: &str) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed store data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Home directory not found")]
    HomeNotFound,

    #[error("Unsupported store version {0}")]
    UnsupportedVersion(u32),
}

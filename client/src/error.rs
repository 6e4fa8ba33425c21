use tasklane_common::{
    account::LayoutError,
    crypto::{CryptoError, Pubkey},
    program::BuildError,
    transaction::{CompileError, RejectionKind},
};
use thiserror::Error;

use crate::{config::ConfigError, delegation::Location};

#[derive(Debug, Error)]
pub enum LedgerError {
    // The request never reached a verdict: network, decoding, node errors
    #[error("Transport error: {0:#}")]
    Transport(#[from] anyhow::Error),
    #[error("Rejected ({kind}): {message}")]
    Rejected {
        kind: RejectionKind,
        message: String,
        logs: Vec<String>,
    },
}

impl LedgerError {
    pub fn rejected(kind: RejectionKind, message: impl Into<String>) -> Self {
        Self::Rejected {
            kind,
            message: message.into(),
            logs: Vec::new(),
        }
    }

    // Classify a rejection from its message and the program logs
    pub fn from_rejection(message: impl Into<String>, logs: Vec<String>) -> Self {
        let message = message.into();
        Self::Rejected {
            kind: RejectionKind::classify(&message, &logs),
            message,
            logs,
        }
    }

    pub fn rejection_kind(&self) -> Option<RejectionKind> {
        match self {
            Self::Rejected { kind, .. } => Some(*kind),
            Self::Transport(_) => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.rejection_kind() == Some(RejectionKind::ResourceConflict)
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    // Preconditions, surfaced immediately
    #[error("Task queue {0} not found")]
    QueueNotFound(Pubkey),
    #[error("{queue_authority} is not registered on task queue {queue}")]
    AuthorityNotRegistered { queue: Pubkey, queue_authority: Pubkey },
    #[error("Cannot {operation} while the account is {location}")]
    WrongLocation {
        operation: &'static str,
        location: Location,
    },
    #[error("Account {0} not found")]
    AccountNotFound(Pubkey),
    #[error("Account {account} is owned by unexpected program {owner}")]
    UnexpectedOwner { account: Pubkey, owner: Pubkey },
    #[error("Cron job name '{name}' is invalid: {reason}")]
    InvalidCronName { name: String, reason: &'static str },

    // Contention, retried by the caller's retry policy
    #[error("Slot {slot} of task queue {queue} was taken by another submitter")]
    SlotTaken { queue: Pubkey, slot: u16 },
    #[error("Snapshot is stale: {0}")]
    SnapshotStale(String),
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<ClientError>,
    },

    // Capacity
    #[error("Task queue {queue} is full at capacity {capacity} and resizing to {requested} was rejected")]
    QueueFullResizeRejected {
        queue: Pubkey,
        capacity: u16,
        requested: u16,
    },

    // Asynchronous completion not observed in time
    #[error("{condition} not observed after {attempts} attempts")]
    NotYetObserved { condition: String, attempts: u32 },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ClientError {
    // Lost a race on a shared resource, worth a fresh snapshot and another try
    pub fn is_contention(&self) -> bool {
        match self {
            Self::SlotTaken { .. } | Self::SnapshotStale(_) => true,
            Self::Ledger(e) => e.is_conflict(),
            _ => false,
        }
    }

    // Wrong state for the request, retrying cannot help
    pub fn is_precondition(&self) -> bool {
        match self {
            Self::QueueNotFound(_)
            | Self::AuthorityNotRegistered { .. }
            | Self::WrongLocation { .. }
            | Self::AccountNotFound(_)
            | Self::UnexpectedOwner { .. }
            | Self::InvalidCronName { .. } => true,
            Self::Ledger(e) => matches!(
                e.rejection_kind(),
                Some(RejectionKind::PreconditionUnmet) | Some(RejectionKind::InsufficientAuthority)
            ),
            _ => false,
        }
    }

    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::QueueFullResizeRejected { .. })
    }

    pub fn is_not_yet_observed(&self) -> bool {
        matches!(self, Self::NotYetObserved { .. })
    }
}

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::{JourneyState, ModelError, Slot};

/// How the caller should react to an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any write.
    Validation,
    NotFound,
    /// Nothing was applied; the caller must re-pick or confirm.
    Conflict,
    /// The store rejected the write; in-memory state is unchanged.
    Persistence,
}

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    OverrideNotFound(NaiveDate),
    AlreadyExists(Ulid),
    Invalid(ModelError),
    Validation(&'static str),
    DateInPast(NaiveDate),
    SlotUnavailable {
        date: NaiveDate,
        time: Slot,
    },
    NotScheduled(Ulid),
    StaleState {
        client_id: Ulid,
        expected: JourneyState,
        actual: JourneyState,
    },
    BackwardMove {
        from: JourneyState,
        to: JourneyState,
    },
    CompletedRequiresScheduled {
        from: JourneyState,
    },
    NoPendingTransition(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound(_)
            | EngineError::OverrideNotFound(_)
            | EngineError::NoPendingTransition(_) => ErrorKind::NotFound,
            EngineError::AlreadyExists(_)
            | EngineError::SlotUnavailable { .. }
            | EngineError::NotScheduled(_)
            | EngineError::StaleState { .. } => ErrorKind::Conflict,
            EngineError::Invalid(_)
            | EngineError::Validation(_)
            | EngineError::DateInPast(_)
            | EngineError::BackwardMove { .. }
            | EngineError::CompletedRequiresScheduled { .. }
            | EngineError::LimitExceeded(_) => ErrorKind::Validation,
            EngineError::WalError(_) => ErrorKind::Persistence,
        }
    }
}

impl From<ModelError> for EngineError {
    fn from(e: ModelError) -> Self {
        EngineError::Invalid(e)
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::OverrideNotFound(date) => write!(f, "no override for {date}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Invalid(e) => write!(f, "{e}"),
            EngineError::Validation(msg) => write!(f, "{msg}"),
            EngineError::DateInPast(date) => write!(f, "{date} is in the past"),
            EngineError::SlotUnavailable { date, time } => {
                write!(f, "slot {time} on {date} is no longer available")
            }
            EngineError::NotScheduled(id) => {
                write!(f, "appointment {id} is not scheduled")
            }
            EngineError::StaleState {
                client_id,
                expected,
                actual,
            } => write!(
                f,
                "client {client_id} is {actual}, not {expected}; reload the board"
            ),
            EngineError::BackwardMove { from, to } => {
                write!(f, "cannot move to an earlier stage ({from} -> {to})")
            }
            EngineError::CompletedRequiresScheduled { from } => {
                write!(f, "only scheduled clients can be completed (client is {from})")
            }
            EngineError::NoPendingTransition(id) => {
                write!(f, "no suspended transition for client {id}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

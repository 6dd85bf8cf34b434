//! Ошибки continuity engine
//!
//! Три семейства (см. `ErrorKind`):
//! - Configuration: нет path/waypoint/decision point/mapping/handler
//! - Continuity: promote уже активного, demote неактивного, waypoint index вне path
//! - Transient: handler оставил record в несогласованном состоянии
//!
//! Ни одна из них не фатальна для world loop: вызывающий логирует, считает
//! (`ErrorLedger`) и подставляет safe fallback state для конкретного NPC.

use std::collections::{HashMap, VecDeque};
use thiserror::Error;

use crate::record::NpcId;
use crate::state::StateIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Continuity,
    Transient,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContinuityError {
    // === Configuration ===
    #[error("path `{0}` is not defined")]
    MissingPath(String),

    #[error("waypoint `{0}` is not defined")]
    MissingWaypoint(String),

    #[error("decision point `{0}` is not defined")]
    MissingDecisionPoint(String),

    #[error("decision point `{0}` has no outcome with positive weight")]
    EmptyDecisionTable(String),

    #[error("no state mapping registered for {0}")]
    MissingMapping(StateIdentity),

    #[error("no handler registered for {0}")]
    MissingHandler(StateIdentity),

    #[error("path `{path}` is invalid: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("state {state} is mapped twice (already paired with {existing})")]
    DuplicateMapping {
        state: StateIdentity,
        existing: StateIdentity,
    },

    #[error("cannot parse state identity `{0}`")]
    UnknownStateIdentity(String),

    #[error("config parse error: {0}")]
    ConfigParse(String),

    // === Continuity ===
    #[error("npc {0} is already active")]
    AlreadyActive(NpcId),

    #[error("npc {0} is already inactive")]
    AlreadyInactive(NpcId),

    #[error("waypoint index {index} is out of range for path `{path}` ({count} waypoints)")]
    WaypointOutOfRange {
        path: String,
        index: usize,
        count: usize,
    },

    #[error("npc {0} is not registered")]
    UnknownNpc(NpcId),

    #[error("npc {0} is already registered")]
    DuplicateNpc(NpcId),

    // === Transient ===
    #[error("npc {npc} record is inconsistent: {reason}")]
    InconsistentRecord { npc: NpcId, reason: String },

    #[error("npc {npc} exceeded {limit} chained transitions (last requested {last})")]
    TransitionLoop {
        npc: NpcId,
        limit: usize,
        last: StateIdentity,
    },
}

impl ContinuityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContinuityError::MissingPath(_)
            | ContinuityError::MissingWaypoint(_)
            | ContinuityError::MissingDecisionPoint(_)
            | ContinuityError::EmptyDecisionTable(_)
            | ContinuityError::MissingMapping(_)
            | ContinuityError::MissingHandler(_)
            | ContinuityError::InvalidPath { .. }
            | ContinuityError::DuplicateMapping { .. }
            | ContinuityError::UnknownStateIdentity(_)
            | ContinuityError::ConfigParse(_) => ErrorKind::Configuration,

            ContinuityError::AlreadyActive(_)
            | ContinuityError::AlreadyInactive(_)
            | ContinuityError::WaypointOutOfRange { .. }
            | ContinuityError::UnknownNpc(_)
            | ContinuityError::DuplicateNpc(_) => ErrorKind::Continuity,

            ContinuityError::InconsistentRecord { .. } | ContinuityError::TransitionLoop { .. } => {
                ErrorKind::Transient
            }
        }
    }
}

pub type ContinuityResult<T> = Result<T, ContinuityError>;

/// Ошибка + safe значение, которое вызывающий подставляет вместо результата
///
/// Используется там, где engine обязан продолжить (mapping miss, пустой decision table):
/// caller видит distinguishable ошибку и сам решает, брать `fallback` или свой hard-coded state.
#[derive(Debug, Clone, PartialEq)]
pub struct Fallback<T> {
    pub error: ContinuityError,
    pub fallback: T,
}

impl<T> Fallback<T> {
    pub fn new(error: ContinuityError, fallback: T) -> Self {
        Self { error, fallback }
    }

    /// Report в ledger и вернуть fallback значение
    pub fn report(self, ledger: &mut ErrorLedger, npc: Option<NpcId>) -> T {
        ledger.report(npc, &self.error);
        self.fallback
    }
}

/// Сколько последних сообщений держим для inspect/debug overlay
const RECENT_CAPACITY: usize = 32;

/// Счётчик reported ошибок (logged + counted)
///
/// Живёт в `NpcWorld`; tiers получают `&mut ErrorLedger` через context.
#[derive(Debug, Default, Clone)]
pub struct ErrorLedger {
    counts: HashMap<ErrorKind, u64>,
    recent: VecDeque<String>,
}

impl ErrorLedger {
    /// Логирует и считает ошибку, привязанную к NPC (или к миру если `npc == None`)
    pub fn report(&mut self, npc: Option<NpcId>, error: &ContinuityError) {
        *self.counts.entry(error.kind()).or_insert(0) += 1;

        let message = match npc {
            Some(id) => format!("⚠️ npc {}: {}", id, error),
            None => format!("⚠️ {}", error),
        };

        match error.kind() {
            ErrorKind::Transient => crate::logger::log_error(&message),
            _ => crate::logger::log_warning(&message),
        }

        if self.recent.len() == RECENT_CAPACITY {
            self.recent.pop_front();
        }
        self.recent.push_back(message);
    }

    pub fn count(&self, kind: ErrorKind) -> u64 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn recent(&self) -> impl Iterator<Item = &str> {
        self.recent.iter().map(String::as_str)
    }
}

//! Identity Record — персистентные, engine-independent данные одного NPC
//!
//! Record переживает promotion/demotion: меняется только владелец.
//! Пока `is_active == true` record принадлежит `ActiveController`, иначе
//! `BasicScheduler`. Владение в Rust-смысле (move между tiers) и есть гарантия
//! "ровно один writer позы".

pub mod schedule;
pub mod snapshot;


pub use schedule::*;
pub use snapshot::*;

use bevy::prelude::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::decision::{DecisionOutcome, DecisionOverrides, DecisionPointId};
use crate::error::{ContinuityError, ContinuityResult};
use crate::navigation::{PathId, PathLibrary, PathStart};
use crate::state::StateIdentity;

/// Stable unique NPC identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NpcId(pub u64);

impl fmt::Display for NpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Что делать в начале дня (взаимоисключающие варианты)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DayStartBehavior {
    /// Перейти в Active состояние
    State(StateIdentity),
    /// Встать на path
    Path(PathStart),
}

/// Path progress для Basic tier (то, что пишется в `sim_*` поля)
#[derive(Clone, Debug, PartialEq)]
pub struct PathProgress {
    pub path_id: PathId,
    /// Waypoint, к которому агент движется
    pub waypoint_index: usize,
    pub reverse: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IdentityRecord {
    pub id: NpcId,

    // === Pose ===
    pub home_position: Vec3,
    pub home_orientation: Quat,
    pub world_position: Vec3,
    pub world_orientation: Quat,

    // === Behaviour ===
    /// Active или Basic state (в зависимости от владельца)
    pub current_state: StateIdentity,
    /// Последнее Active состояние перед demotion (restore hint для many-to-one маппингов)
    pub last_active_state: Option<StateIdentity>,
    pub schedule: Schedule,
    /// Derived из schedule + world clock, обновляется каждый world step
    pub is_ending_day: bool,
    pub decision_overrides: DecisionOverrides,
    pub day_start_behavior: DayStartBehavior,

    // === Basic simulation progress ===
    pub sim_target_position: Option<Vec3>,
    pub sim_state_timer: f32,
    pub sim_path_id: Option<PathId>,
    pub sim_waypoint_index: usize,
    pub sim_follow_reverse: bool,
    pub sim_is_following_path: bool,
    /// Simulated-through время (секунды world clock), для catch-up в scheduler
    pub sim_clock: f64,
    /// Сколько Basic тиков получил record
    pub sim_ticks: u64,

    /// Record принадлежит Active Controller
    pub is_active: bool,
}

impl IdentityRecord {
    pub fn new(id: NpcId, home_position: Vec3, home_orientation: Quat, initial_state: StateIdentity) -> Self {
        Self {
            id,
            home_position,
            home_orientation,
            world_position: home_position,
            world_orientation: home_orientation,
            current_state: initial_state,
            last_active_state: None,
            schedule: Schedule::default(),
            is_ending_day: false,
            decision_overrides: DecisionOverrides::new(),
            day_start_behavior: DayStartBehavior::State(initial_state),
            sim_target_position: None,
            sim_state_timer: 0.0,
            sim_path_id: None,
            sim_waypoint_index: 0,
            sim_follow_reverse: false,
            sim_is_following_path: false,
            sim_clock: 0.0,
            sim_ticks: 0,
            is_active: false,
        }
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_override(mut self, point: impl Into<DecisionPointId>, outcome: DecisionOutcome) -> Self {
        self.decision_overrides.insert(point.into(), outcome);
        self
    }

    pub fn with_day_start(mut self, behavior: DayStartBehavior) -> Self {
        self.day_start_behavior = behavior;
        self
    }

    pub fn with_state(mut self, state: StateIdentity) -> Self {
        self.current_state = state;
        self
    }

    pub fn path_progress(&self) -> Option<PathProgress> {
        if !self.sim_is_following_path {
            return None;
        }
        self.sim_path_id.clone().map(|path_id| PathProgress {
            path_id,
            waypoint_index: self.sim_waypoint_index,
            reverse: self.sim_follow_reverse,
        })
    }

    pub fn set_path_progress(&mut self, progress: PathProgress) {
        self.sim_path_id = Some(progress.path_id);
        self.sim_waypoint_index = progress.waypoint_index;
        self.sim_follow_reverse = progress.reverse;
        self.sim_is_following_path = true;
    }

    pub fn clear_path_progress(&mut self) {
        self.sim_path_id = None;
        self.sim_waypoint_index = 0;
        self.sim_follow_reverse = false;
        self.sim_is_following_path = false;
    }

    /// Сброс Basic полей движения/таймера (при смене состояния)
    pub fn clear_sim_motion(&mut self) {
        self.sim_target_position = None;
        self.sim_state_timer = 0.0;
    }

    /// Инвариант: following ⇒ path существует и индекс в диапазоне
    pub fn validate(&self, paths: &PathLibrary) -> ContinuityResult<()> {
        if !self.world_position.is_finite() {
            return Err(self.inconsistent("world position is not finite"));
        }
        if !self.sim_state_timer.is_finite() {
            return Err(self.inconsistent("state timer is not finite"));
        }
        if !self.sim_is_following_path {
            return Ok(());
        }

        let Some(path_id) = &self.sim_path_id else {
            return Err(self.inconsistent("following path without a path id"));
        };
        let path = paths.get(path_id)?;
        path.check_index(self.sim_waypoint_index)
    }

    pub fn inconsistent(&self, reason: &str) -> ContinuityError {
        ContinuityError::InconsistentRecord {
            npc: self.id,
            reason: reason.to_string(),
        }
    }
}

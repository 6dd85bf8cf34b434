//! Persistence boundary: `IdentitySnapshot` ↔ `IdentityRecord`
//!
//! Snapshot: плоская serde структура с полным набором полей record'а.
//! Позы как массивы, state identities как строки `"Category.Value"`.
//! Формат файла (RON/JSON/bincode) выбирает хост; здесь только field set.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::decision::DecisionOverrides;
use crate::error::{ContinuityError, ContinuityResult};
use crate::navigation::PathId;
use crate::record::{DayStartBehavior, IdentityRecord, NpcId, Schedule};
use crate::state::StateIdentity;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    pub id: NpcId,
    pub home_position: [f32; 3],
    /// Quaternion `[x, y, z, w]`
    pub home_orientation: [f32; 4],
    pub world_position: [f32; 3],
    pub world_orientation: [f32; 4],
    pub current_state: StateIdentity,
    #[serde(default)]
    pub last_active_state: Option<StateIdentity>,
    pub schedule: Schedule,
    #[serde(default)]
    pub decision_overrides: DecisionOverrides,
    pub day_start_behavior: DayStartBehavior,
    #[serde(default)]
    pub sim_target_position: Option<[f32; 3]>,
    #[serde(default)]
    pub sim_state_timer: f32,
    #[serde(default)]
    pub sim_path_id: Option<PathId>,
    #[serde(default)]
    pub sim_waypoint_index: usize,
    #[serde(default)]
    pub sim_follow_reverse: bool,
    #[serde(default)]
    pub sim_is_following_path: bool,
    #[serde(default)]
    pub sim_clock: f64,
    #[serde(default)]
    pub sim_ticks: u64,
    #[serde(default)]
    pub is_active: bool,
}

impl IdentityRecord {
    pub fn to_snapshot(&self) -> IdentitySnapshot {
        IdentitySnapshot {
            id: self.id,
            home_position: self.home_position.to_array(),
            home_orientation: self.home_orientation.to_array(),
            world_position: self.world_position.to_array(),
            world_orientation: self.world_orientation.to_array(),
            current_state: self.current_state,
            last_active_state: self.last_active_state,
            schedule: self.schedule,
            decision_overrides: self.decision_overrides.clone(),
            day_start_behavior: self.day_start_behavior.clone(),
            sim_target_position: self.sim_target_position.map(|p| p.to_array()),
            sim_state_timer: self.sim_state_timer,
            sim_path_id: self.sim_path_id.clone(),
            sim_waypoint_index: self.sim_waypoint_index,
            sim_follow_reverse: self.sim_follow_reverse,
            sim_is_following_path: self.sim_is_following_path,
            sim_clock: self.sim_clock,
            sim_ticks: self.sim_ticks,
            is_active: self.is_active,
        }
    }

    /// Восстановление из snapshot (quaternions нормализуются, path инвариант проверяется)
    pub fn from_snapshot(snapshot: IdentitySnapshot) -> ContinuityResult<Self> {
        let record = IdentityRecord {
            id: snapshot.id,
            home_position: Vec3::from_array(snapshot.home_position),
            home_orientation: normalized(snapshot.home_orientation),
            world_position: Vec3::from_array(snapshot.world_position),
            world_orientation: normalized(snapshot.world_orientation),
            current_state: snapshot.current_state,
            last_active_state: snapshot.last_active_state,
            schedule: snapshot.schedule,
            is_ending_day: false,
            decision_overrides: snapshot.decision_overrides,
            day_start_behavior: snapshot.day_start_behavior,
            sim_target_position: snapshot.sim_target_position.map(Vec3::from_array),
            sim_state_timer: snapshot.sim_state_timer,
            sim_path_id: snapshot.sim_path_id,
            sim_waypoint_index: snapshot.sim_waypoint_index,
            sim_follow_reverse: snapshot.sim_follow_reverse,
            sim_is_following_path: snapshot.sim_is_following_path,
            sim_clock: snapshot.sim_clock,
            sim_ticks: snapshot.sim_ticks,
            is_active: snapshot.is_active,
        };

        if record.sim_is_following_path && record.sim_path_id.is_none() {
            return Err(ContinuityError::InconsistentRecord {
                npc: record.id,
                reason: "snapshot follows a path without a path id".into(),
            });
        }

        Ok(record)
    }
}

fn normalized(raw: [f32; 4]) -> Quat {
    let quat = Quat::from_array(raw);
    if quat.length_squared() > 1e-8 && quat.is_finite() {
        quat.normalize()
    } else {
        Quat::IDENTITY
    }
}

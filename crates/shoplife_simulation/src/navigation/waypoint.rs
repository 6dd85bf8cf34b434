//! Waypoint Directory — waypoint id → world position (leaf lookup)

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{ContinuityError, ContinuityResult};

/// Waypoint identifier (unique string ID)
///
/// # Examples
/// - "store_entrance"
/// - "aisle_3_end"
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaypointId(pub String);

impl From<&str> for WaypointId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for WaypointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct WaypointDirectory {
    positions: HashMap<WaypointId, Vec3>,
}

impl WaypointDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Регистрирует (или перезаписывает) waypoint
    pub fn insert(&mut self, id: impl Into<WaypointId>, position: Vec3) {
        self.positions.insert(id.into(), position);
    }

    pub fn with(mut self, id: impl Into<WaypointId>, position: Vec3) -> Self {
        self.insert(id, position);
        self
    }

    pub fn position(&self, id: &WaypointId) -> ContinuityResult<Vec3> {
        self.positions
            .get(id)
            .copied()
            .ok_or_else(|| ContinuityError::MissingWaypoint(id.0.clone()))
    }

    pub fn contains(&self, id: &WaypointId) -> bool {
        self.positions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

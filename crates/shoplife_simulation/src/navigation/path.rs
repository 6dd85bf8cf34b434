//! Path Asset — упорядоченный список waypoint'ов + end-of-path policy
//!
//! Immutable после authoring. `PathLibrary` хранит ассеты за `Arc`, чтобы
//! `PathTransitionResult` мог отдавать сам ассет без копирования.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::decision::DecisionPointId;
use crate::error::{ContinuityError, ContinuityResult};
use crate::navigation::{WaypointDirectory, WaypointId};
use crate::state::StateIdentity;

/// Минимум waypoint'ов в path
pub const MIN_PATH_WAYPOINTS: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathId(pub String);

impl From<&str> for PathId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Где начать следование по path: `(path id, start index, reverse)`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathStart {
    pub path_id: PathId,
    pub start_index: usize,
    #[serde(default)]
    pub reverse: bool,
}

impl PathStart {
    pub fn new(path_id: impl Into<PathId>, start_index: usize, reverse: bool) -> Self {
        Self {
            path_id: path_id.into(),
            start_index,
            reverse,
        }
    }
}

/// Что происходит в конце path
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PathEndPolicy {
    /// Фиксированный переход в Active состояние
    Transition(StateIdentity),
    /// Сразу продолжить другим (или тем же) path
    Continue(PathStart),
    /// Спросить Decision Resolver
    Decision(DecisionPointId),
}

#[derive(Clone, Debug, PartialEq)]
pub struct PathAsset {
    id: PathId,
    waypoint_ids: Vec<WaypointId>,
    end_policy: PathEndPolicy,
}

impl PathAsset {
    /// Валидирует минимум waypoint'ов
    pub fn new(
        id: impl Into<PathId>,
        waypoint_ids: Vec<WaypointId>,
        end_policy: PathEndPolicy,
    ) -> ContinuityResult<Self> {
        let id = id.into();
        if waypoint_ids.len() < MIN_PATH_WAYPOINTS {
            return Err(ContinuityError::InvalidPath {
                path: id.0,
                reason: format!(
                    "needs at least {} waypoints, got {}",
                    MIN_PATH_WAYPOINTS,
                    waypoint_ids.len()
                ),
            });
        }

        Ok(Self {
            id,
            waypoint_ids,
            end_policy,
        })
    }

    pub fn id(&self) -> &PathId {
        &self.id
    }

    pub fn waypoint_ids(&self) -> &[WaypointId] {
        &self.waypoint_ids
    }

    pub fn waypoint_count(&self) -> usize {
        self.waypoint_ids.len()
    }

    pub fn end_policy(&self) -> &PathEndPolicy {
        &self.end_policy
    }

    /// Следующий индекс в направлении движения (None = конец path)
    pub fn step_index(&self, index: usize, reverse: bool) -> Option<usize> {
        if reverse {
            index.checked_sub(1)
        } else {
            let next = index + 1;
            (next < self.waypoint_count()).then_some(next)
        }
    }

    pub fn check_index(&self, index: usize) -> ContinuityResult<()> {
        if index < self.waypoint_count() {
            Ok(())
        } else {
            Err(ContinuityError::WaypointOutOfRange {
                path: self.id.0.clone(),
                index,
                count: self.waypoint_count(),
            })
        }
    }

    /// Позиция waypoint'а по индексу (resolve через directory)
    pub fn waypoint_position(&self, index: usize, waypoints: &WaypointDirectory) -> ContinuityResult<Vec3> {
        self.check_index(index)?;
        waypoints.position(&self.waypoint_ids[index])
    }
}

/// Таблица path ассетов
#[derive(Debug, Clone, Default)]
pub struct PathLibrary {
    paths: HashMap<PathId, Arc<PathAsset>>,
}

impl PathLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: PathAsset) {
        self.paths.insert(path.id().clone(), Arc::new(path));
    }

    pub fn with(mut self, path: PathAsset) -> Self {
        self.insert(path);
        self
    }

    pub fn get(&self, id: &PathId) -> ContinuityResult<&Arc<PathAsset>> {
        self.paths
            .get(id)
            .ok_or_else(|| ContinuityError::MissingPath(id.0.clone()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<PathAsset>> {
        self.paths.values()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Проверка что все waypoint'ы всех path'ов существуют
    pub fn validate(&self, waypoints: &WaypointDirectory) -> ContinuityResult<()> {
        for path in self.paths.values() {
            if let Some(missing) = path.waypoint_ids().iter().find(|id| !waypoints.contains(id)) {
                return Err(ContinuityError::MissingWaypoint(missing.0.clone()));
            }
            if let PathEndPolicy::Continue(start) = path.end_policy() {
                self.get(&start.path_id)?.check_index(start.start_index)?;
            }
        }
        Ok(())
    }
}

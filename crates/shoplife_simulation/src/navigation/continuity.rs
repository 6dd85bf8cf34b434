//! Path Continuity Helper — общий для обоих tiers
//!
//! Две точки входа:
//! - `start_fresh`: новый path; первый target = start_index ± 1, до него
//!   approach leg к самому start waypoint (его ведёт movement subsystem)
//! - `resume`: агент уже шёл к `waypoint_index`: продолжаем прямо к нему,
//!   без approach leg (используется при promotion/demotion mid-path)
//!
//! `advance`: extrapolated движение для Basic tier (Active tier двигается
//! физикой и только отмечает прибытие через `PathCursor::mark_arrived`).

use bevy::prelude::*;
use std::sync::Arc;

use crate::error::ContinuityResult;
use crate::navigation::{PathAsset, PathId, WaypointDirectory};

/// Позиция на path: к какому waypoint'у идём и в каком направлении
#[derive(Debug, Clone, PartialEq)]
pub struct PathCursor {
    path: Arc<PathAsset>,
    /// Следующий waypoint после approach leg
    target_index: usize,
    /// Approach leg к start waypoint (только после `start_fresh`)
    approach_index: Option<usize>,
    reverse: bool,
    complete: bool,
}

impl PathCursor {
    pub fn path(&self) -> &Arc<PathAsset> {
        &self.path
    }

    pub fn path_id(&self) -> &PathId {
        self.path.id()
    }

    pub fn is_reverse(&self) -> bool {
        self.reverse
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn needs_approach(&self) -> bool {
        self.approach_index.is_some()
    }

    /// Waypoint, к которому агент движется прямо сейчас (None = path завершён)
    ///
    /// Именно этот индекс пишется в `sim_waypoint_index` при demotion.
    pub fn moving_toward(&self) -> Option<usize> {
        if self.complete {
            None
        } else {
            Some(self.approach_index.unwrap_or(self.target_index))
        }
    }

    /// Прибыли к `moving_toward()`. Возвращает true, если это был последний waypoint.
    pub fn mark_arrived(&mut self) -> bool {
        if self.complete {
            return true;
        }

        if self.approach_index.take().is_some() {
            // Approach leg закончен, target_index уже посчитан в start_fresh
            return false;
        }

        match self.path.step_index(self.target_index, self.reverse) {
            Some(next) => {
                self.target_index = next;
                false
            }
            None => {
                self.complete = true;
                true
            }
        }
    }
}

/// Результат одного шага extrapolation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathAdvance {
    pub position: Vec3,
    /// None: направление не менялось (стоим или вертикальный шаг)
    pub orientation: Option<Quat>,
    /// Хотя бы один waypoint достигнут за шаг
    pub arrived: bool,
    /// Terminal: последний waypoint достигнут → caller резолвит end policy
    pub finished: bool,
}

/// Helper с injected directory + порогом прибытия
pub struct PathContinuity<'a> {
    waypoints: &'a WaypointDirectory,
    arrival_threshold: f32,
}

impl<'a> PathContinuity<'a> {
    pub fn new(waypoints: &'a WaypointDirectory, arrival_threshold: f32) -> Self {
        Self {
            waypoints,
            arrival_threshold: arrival_threshold.max(0.0),
        }
    }

    /// Новый path с approach leg от `from_position` к start waypoint
    pub fn start_fresh(
        &self,
        path: &Arc<PathAsset>,
        from_position: Vec3,
        start_index: usize,
        reverse: bool,
    ) -> ContinuityResult<PathCursor> {
        let start_position = path.waypoint_position(start_index, self.waypoints)?;

        let Some(first_target) = path.step_index(start_index, reverse) else {
            // Zero-length: в направлении движения дальше идти некуда
            return Ok(PathCursor {
                path: Arc::clone(path),
                target_index: start_index,
                approach_index: None,
                reverse,
                complete: true,
            });
        };

        // Уже стоим на start waypoint → approach не нужен
        let approach_index =
            (from_position.distance(start_position) > self.arrival_threshold).then_some(start_index);

        Ok(PathCursor {
            path: Arc::clone(path),
            target_index: first_target,
            approach_index,
            reverse,
            complete: false,
        })
    }

    /// Продолжить движение к `waypoint_index` (без approach leg)
    pub fn resume(
        &self,
        path: &Arc<PathAsset>,
        waypoint_index: usize,
        reverse: bool,
    ) -> ContinuityResult<PathCursor> {
        path.check_index(waypoint_index)?;

        Ok(PathCursor {
            path: Arc::clone(path),
            target_index: waypoint_index,
            approach_index: None,
            reverse,
            complete: false,
        })
    }

    /// World позиция текущей цели курсора
    pub fn target_position(&self, cursor: &PathCursor) -> ContinuityResult<Option<Vec3>> {
        match cursor.moving_toward() {
            Some(index) => cursor.path.waypoint_position(index, self.waypoints).map(Some),
            None => Ok(None),
        }
    }

    pub fn has_reached(&self, position: Vec3, target: Vec3) -> bool {
        position.distance(target) <= self.arrival_threshold
    }

    /// Линейная интерполяция к цели со скоростью `speed`
    ///
    /// Остаток бюджета переносится на следующие waypoint'ы: большой `dt`
    /// (batched Basic tick) проходит несколько сегментов за раз.
    pub fn advance(
        &self,
        cursor: &mut PathCursor,
        current_position: Vec3,
        speed: f32,
        dt: f32,
    ) -> ContinuityResult<PathAdvance> {
        let mut position = current_position;
        let mut budget = (speed * dt).max(0.0);
        let mut orientation = None;
        let mut arrived = false;

        loop {
            let Some(target) = self.target_position(cursor)? else {
                return Ok(PathAdvance {
                    position,
                    orientation,
                    arrived,
                    finished: true,
                });
            };

            let to_target = target - position;
            let distance = to_target.length();

            if distance <= self.arrival_threshold || distance <= budget {
                budget = (budget - distance).max(0.0);
                if let Some(facing) = facing_rotation(to_target) {
                    orientation = Some(facing);
                }
                position = target;
                arrived = true;

                if cursor.mark_arrived() {
                    return Ok(PathAdvance {
                        position,
                        orientation,
                        arrived,
                        finished: true,
                    });
                }
                if budget <= 0.0 {
                    break;
                }
                continue;
            }

            let direction = to_target / distance;
            position += direction * budget;
            orientation = facing_rotation(direction).or(orientation);
            break;
        }

        Ok(PathAdvance {
            position,
            orientation,
            arrived,
            finished: false,
        })
    }
}

/// Yaw-поворот, при котором forward (-Z) смотрит вдоль `direction` (XZ плоскость)
pub fn facing_rotation(direction: Vec3) -> Option<Quat> {
    let flat = Vec3::new(direction.x, 0.0, direction.z);
    if flat.length_squared() < 1e-8 {
        return None;
    }
    Some(Quat::from_rotation_y(f32::atan2(-flat.x, -flat.z)))
}

//! Boundary capabilities, которые Active tier потребляет
//!
//! Движение и анимация: внешние коллабораторы (engine physics, NavigationAgent,
//! AnimationTree). Core только отдаёт команды и опрашивает состояние; никогда
//! не блокируется на их завершении.

use bevy::prelude::*;

use crate::navigation::facing_rotation;

/// "Navigate to point" capability (pathfinding opaque)
pub trait MovementCapability: Send + Sync {
    /// false если target недостижим (не panic)
    fn navigate_to(&mut self, target: Vec3) -> bool;
    fn has_arrived(&self) -> bool;
    fn stop(&mut self);

    /// Текущий live transform
    fn position(&self) -> Vec3;
    fn orientation(&self) -> Quat;

    /// Телепорт (promotion: live transform берётся из Identity Record)
    fn warp(&mut self, position: Vec3, orientation: Quat);

    fn set_orientation(&mut self, orientation: Quat);

    /// Активная цель навигации (None = стоим)
    fn destination(&self) -> Option<Vec3>;

    /// Физический шаг. Engines, которые двигают агента сами, оставляют no-op.
    fn step(&mut self, _dt: f32) {}
}

/// Fire-and-forget анимация/interaction hooks
pub trait AnimationCapability: Send + Sync {
    fn play(&mut self, clip: &str);

    fn trigger_interaction(&mut self, _hook: &str) {}

    /// Последний запрошенный clip (для debug overlay/тестов)
    fn current_clip(&self) -> Option<&str> {
        None
    }
}

/// Headless kinematic mover: прямая линия к цели с постоянной скоростью
///
/// Для headless симуляции и тестов (в игре заменяется engine movement).
#[derive(Debug, Clone)]
pub struct KinematicMovement {
    position: Vec3,
    orientation: Quat,
    speed: f32,
    arrival_threshold: f32,
    destination: Option<Vec3>,
    /// Допустимая область (min, max): всё вне неё считается недостижимым
    bounds: Option<(Vec3, Vec3)>,
}

impl KinematicMovement {
    pub fn new(speed: f32, arrival_threshold: f32) -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            speed,
            arrival_threshold,
            destination: None,
            bounds: None,
        }
    }

    pub fn with_bounds(mut self, min: Vec3, max: Vec3) -> Self {
        self.bounds = Some((min.min(max), min.max(max)));
        self
    }

    fn is_reachable(&self, target: Vec3) -> bool {
        if !target.is_finite() {
            return false;
        }
        match self.bounds {
            Some((min, max)) => target.cmpge(min).all() && target.cmple(max).all(),
            None => true,
        }
    }
}

impl MovementCapability for KinematicMovement {
    fn navigate_to(&mut self, target: Vec3) -> bool {
        if !self.is_reachable(target) {
            return false;
        }
        self.destination = Some(target);
        true
    }

    fn has_arrived(&self) -> bool {
        match self.destination {
            Some(target) => self.position.distance(target) <= self.arrival_threshold,
            None => false,
        }
    }

    fn stop(&mut self) {
        self.destination = None;
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn orientation(&self) -> Quat {
        self.orientation
    }

    fn warp(&mut self, position: Vec3, orientation: Quat) {
        self.position = position;
        self.orientation = orientation;
        self.destination = None;
    }

    fn set_orientation(&mut self, orientation: Quat) {
        self.orientation = orientation;
    }

    fn destination(&self) -> Option<Vec3> {
        self.destination
    }

    fn step(&mut self, dt: f32) {
        let Some(target) = self.destination else {
            return;
        };

        let to_target = target - self.position;
        let distance = to_target.length();
        if distance <= self.arrival_threshold {
            return;
        }

        let travel = (self.speed * dt).max(0.0);
        if travel >= distance {
            self.position = target;
        } else {
            self.position += to_target / distance * travel;
        }
        if let Some(facing) = facing_rotation(to_target) {
            self.orientation = facing;
        }
    }
}

/// Анимация, которая только запоминает последний clip
#[derive(Debug, Clone, Default)]
pub struct ClipTracker {
    current: Option<String>,
    pub played: u64,
    pub interactions: u64,
}

impl AnimationCapability for ClipTracker {
    fn play(&mut self, clip: &str) {
        if self.current.as_deref() != Some(clip) {
            self.current = Some(clip.to_string());
            self.played += 1;
        }
    }

    fn trigger_interaction(&mut self, _hook: &str) {
        self.interactions += 1;
    }

    fn current_clip(&self) -> Option<&str> {
        self.current.as_deref()
    }
}

//! Параметры continuity engine
//!
//! Defaults захардкожены (`Default`), override через RON:
//!
//! ```ron
//! (
//!     arrival_threshold: 0.15,
//!     scheduling: RoundRobin(batch_size: 64),
//! )
//! ```

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ContinuityError, ContinuityResult};

/// Как Basic scheduler распределяет step budget по records
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum SchedulingStrategy {
    /// Все records каждый step с одинаковым dt
    All,
    /// Round-robin батчи: за step тикается `batch_size` records, каждый получает всё накопленное время
    RoundRobin { batch_size: usize },
}

#[derive(Resource, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuityConfig {
    /// Порог прибытия к waypoint/target (метры)
    pub arrival_threshold: f32,
    /// Скорость extrapolated ходьбы в Basic tier (m/s)
    pub basic_walk_speed: f32,
    pub scheduling: SchedulingStrategy,
    /// Максимальный sub-step при catch-up (секунды)
    pub max_substep: f32,
    /// Сколько переходов подряд допускается за один callback chain
    pub max_transition_chain: usize,
    /// Timeout для Idle/Wander состояний (секунды)
    pub idle_timeout: f32,
    /// Радиус случайных точек Wander вокруг home (метры)
    pub wander_radius: f32,
    /// Пауза между точками Wander (секунды)
    pub wander_pause: f32,
    /// Wait фаза LookingToShop (секунды)
    pub shopping_decision_delay: f32,
    /// Длительность Browsing (секунды)
    pub browsing_duration: f32,
    /// Длина суток в секундах симуляции
    pub day_length_secs: f32,
    /// Время суток на старте (часы)
    pub start_hour: f32,
    /// Ближе этого к observer → promote
    pub promote_radius: f32,
    /// Дальше этого от observer → demote (> promote_radius, hysteresis)
    pub demote_radius: f32,
}

impl Default for ContinuityConfig {
    fn default() -> Self {
        Self {
            arrival_threshold: 0.1,
            basic_walk_speed: 1.4, // средняя скорость ходьбы
            scheduling: SchedulingStrategy::RoundRobin { batch_size: 64 },
            max_substep: 0.5,
            max_transition_chain: 8,
            idle_timeout: 10.0,
            wander_radius: 6.0,
            wander_pause: 3.0,
            shopping_decision_delay: 2.0,
            browsing_duration: 30.0,
            day_length_secs: 600.0, // 10 минут реального времени = сутки
            start_hour: 8.0,
            promote_radius: 30.0,
            demote_radius: 40.0,
        }
    }
}

impl ContinuityConfig {
    pub fn from_ron_str(text: &str) -> ContinuityResult<Self> {
        let config: Self = ron::from_str(text).map_err(|e| ContinuityError::ConfigParse(e.to_string()))?;
        config.validated()
    }

    /// Проверка согласованности значений
    pub fn validated(self) -> ContinuityResult<Self> {
        let bad = |reason: &str| Err(ContinuityError::ConfigParse(reason.to_string()));

        if !(self.arrival_threshold >= 0.0) {
            return bad("arrival_threshold must be >= 0");
        }
        if !(self.basic_walk_speed > 0.0) {
            return bad("basic_walk_speed must be > 0");
        }
        if !(self.max_substep > 0.0) {
            return bad("max_substep must be > 0");
        }
        if !(self.day_length_secs > 0.0) {
            return bad("day_length_secs must be > 0");
        }
        if self.max_transition_chain == 0 {
            return bad("max_transition_chain must be >= 1");
        }
        if let SchedulingStrategy::RoundRobin { batch_size: 0 } = self.scheduling {
            return bad("round-robin batch_size must be >= 1");
        }
        if self.demote_radius < self.promote_radius {
            return bad("demote_radius must be >= promote_radius");
        }
        Ok(self)
    }
}

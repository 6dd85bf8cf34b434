//! World clock: time-of-day + счётчик дней

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::record::HOURS_PER_DAY;

/// Часы мира. День начинается в `start_hour`, длится `day_length_secs` секунд симуляции.
#[derive(Resource, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldClock {
    start_hour: f32,
    day_length_secs: f32,
    /// Секунды с начала текущего дня
    since_day_start: f64,
    day: u32,
    /// Всего прошло секунд симуляции
    elapsed: f64,
}

impl WorldClock {
    pub fn new(start_hour: f32, day_length_secs: f32) -> Self {
        Self {
            start_hour: start_hour.rem_euclid(HOURS_PER_DAY),
            day_length_secs: day_length_secs.max(f32::EPSILON),
            since_day_start: 0.0,
            day: 0,
            elapsed: 0.0,
        }
    }

    /// Продвинуть часы. `true`: начался новый день (пересекли `start_hour`).
    pub fn advance(&mut self, dt: f32) -> bool {
        if !(dt > 0.0) {
            return false;
        }
        self.elapsed += dt as f64;
        self.since_day_start += dt as f64;

        let day_length = self.day_length_secs as f64;
        let mut rolled_over = false;
        while self.since_day_start >= day_length {
            self.since_day_start -= day_length;
            self.day += 1;
            rolled_over = true;
        }
        rolled_over
    }

    /// Время суток (часы, 0..24)
    pub fn hour(&self) -> f32 {
        let progressed = (self.since_day_start / self.day_length_secs as f64) as f32 * HOURS_PER_DAY;
        (self.start_hour + progressed).rem_euclid(HOURS_PER_DAY)
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn day_length_secs(&self) -> f32 {
        self.day_length_secs
    }
}

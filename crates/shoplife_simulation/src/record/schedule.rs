//! Расписание NPC: окна активности и wind-down (time-of-day, часы 0..24)

use serde::{Deserialize, Serialize};

pub const HOURS_PER_DAY: f32 = 24.0;

/// Диапазон времени суток `[start, end)`; `start > end`: окно через полночь
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_hour: f32,
    pub end_hour: f32,
}

impl TimeWindow {
    pub fn new(start_hour: f32, end_hour: f32) -> Self {
        // Сутки и больше: весь день, а не пустое окно после wrap
        if end_hour - start_hour >= HOURS_PER_DAY {
            return Self::all_day();
        }
        Self {
            start_hour: wrap_hour(start_hour),
            end_hour: wrap_hour(end_hour),
        }
    }

    /// Пустое окно (start == end)
    pub fn empty() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Весь день `[0, 24)`
    pub fn all_day() -> Self {
        Self {
            start_hour: 0.0,
            end_hour: HOURS_PER_DAY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start_hour == self.end_hour
    }

    pub fn contains(&self, hour: f32) -> bool {
        let hour = wrap_hour(hour);
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Когда агенту разрешено быть активным
    pub active_window: TimeWindow,
    /// Когда агент должен начать возвращаться к отдыху
    pub wind_down_window: TimeWindow,
}

impl Default for Schedule {
    fn default() -> Self {
        // Весь день активен, wind-down нет
        Self {
            active_window: TimeWindow::all_day(),
            wind_down_window: TimeWindow::empty(),
        }
    }
}

impl Schedule {
    pub fn new(active_window: TimeWindow, wind_down_window: TimeWindow) -> Self {
        Self {
            active_window,
            wind_down_window,
        }
    }

    /// Типичный рабочий день: активен `[open, close)`, wind-down `[close - wind_down_hours, close)`
    pub fn workday(open_hour: f32, close_hour: f32, wind_down_hours: f32) -> Self {
        Self::new(
            TimeWindow::new(open_hour, close_hour),
            TimeWindow::new(close_hour - wind_down_hours, close_hour),
        )
    }

    pub fn is_active_at(&self, hour: f32) -> bool {
        self.active_window.contains(hour)
    }

    /// Wind-down окно или вне окна активности → пора домой
    pub fn is_ending_day(&self, hour: f32) -> bool {
        self.wind_down_window.contains(hour) || !self.is_active_at(hour)
    }
}

fn wrap_hour(hour: f32) -> f32 {
    if !hour.is_finite() {
        return 0.0;
    }
    hour.rem_euclid(HOURS_PER_DAY)
}

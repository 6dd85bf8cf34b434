//! General семейство: Idle, Wander, ReturnHome, Resting (оба tiers)

use bevy::prelude::*;
use rand::{Rng, RngCore};
use std::f32::consts::TAU;

use crate::active::{ActiveStateHandler, AgentContext};
use crate::basic::{step_toward, BasicContext, BasicStateHandler, BasicTransition};
use crate::record::IdentityRecord;
use crate::state::{BasicState, GeneralState, StateIdentity, StateMappingRegistry};

/// Случайная точка в круге радиуса `radius` вокруг `center` (XZ плоскость)
pub fn random_point_near(center: Vec3, radius: f32, rng: &mut dyn RngCore) -> Vec3 {
    let angle = rng.gen::<f32>() * TAU;
    let distance = radius.max(0.0) * rng.gen::<f32>().sqrt();
    center + Vec3::new(angle.cos() * distance, 0.0, angle.sin() * distance)
}

/// Остаток таймера, оставленный другим tier'ом (continuity), иначе `default`
pub(crate) fn take_timer(record: &mut IdentityRecord, default: f32) -> f32 {
    let carried = std::mem::take(&mut record.sim_state_timer);
    if carried > 0.0 {
        carried
    } else {
        default
    }
}

// ============================================================================
// Active
// ============================================================================

#[derive(Debug, Default)]
pub struct IdleHandler {
    remaining: f32,
}

impl ActiveStateHandler for IdleHandler {
    fn name(&self) -> &'static str {
        "Idle"
    }

    fn on_enter(&mut self, ctx: &mut AgentContext) {
        ctx.stop();
        ctx.play("idle");
        self.remaining = take_timer(ctx.record, ctx.config.idle_timeout);
    }

    fn on_update(&mut self, ctx: &mut AgentContext, dt: f32) {
        if ctx.is_ending_day() {
            ctx.transition_to(GeneralState::ReturnHome);
            return;
        }
        self.remaining -= dt;
        if self.remaining <= 0.0 {
            ctx.transition_to(GeneralState::Wander);
        }
    }

    fn on_exit(&mut self, ctx: &mut AgentContext) {
        ctx.record.sim_state_timer = self.remaining.max(0.0);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum WanderPhase {
    Walking,
    Pausing { remaining: f32 },
}

#[derive(Debug)]
pub struct WanderHandler {
    phase: WanderPhase,
}

impl Default for WanderHandler {
    fn default() -> Self {
        Self {
            phase: WanderPhase::Walking,
        }
    }
}

impl WanderHandler {
    fn walk_to(&mut self, ctx: &mut AgentContext, target: Vec3) {
        if ctx.navigate_to(target) {
            self.phase = WanderPhase::Walking;
            ctx.play("walk");
        } else {
            crate::logger::log_warning(&format!("npc {}: wander target {:?} unreachable", ctx.npc(), target));
            ctx.transition_to(GeneralState::Idle);
        }
    }

    fn next_target(ctx: &mut AgentContext) -> Vec3 {
        random_point_near(ctx.record.home_position, ctx.config.wander_radius, &mut *ctx.rng)
    }
}

impl ActiveStateHandler for WanderHandler {
    fn name(&self) -> &'static str {
        "Wander"
    }

    fn on_enter(&mut self, ctx: &mut AgentContext) {
        // Basic tier мог оставить недошагнутую цель
        let target = match ctx.record.sim_target_position.take() {
            Some(target) => target,
            None => Self::next_target(ctx),
        };
        self.walk_to(ctx, target);
    }

    fn on_update(&mut self, ctx: &mut AgentContext, dt: f32) {
        if ctx.is_ending_day() {
            ctx.transition_to(GeneralState::ReturnHome);
            return;
        }
        if let WanderPhase::Pausing { remaining } = &mut self.phase {
            *remaining -= dt;
            if *remaining <= 0.0 {
                let target = Self::next_target(ctx);
                self.walk_to(ctx, target);
            }
        }
    }

    fn on_reached_destination(&mut self, ctx: &mut AgentContext) {
        self.phase = WanderPhase::Pausing {
            remaining: ctx.config.wander_pause,
        };
        ctx.play("look_around");
    }

    fn wants_arrival_notifications(&self) -> bool {
        true
    }
}

#[derive(Debug, Default)]
pub struct ReturnHomeHandler;

impl ActiveStateHandler for ReturnHomeHandler {
    fn name(&self) -> &'static str {
        "ReturnHome"
    }

    fn on_enter(&mut self, ctx: &mut AgentContext) {
        let home = ctx.record.home_position;
        if ctx.position().distance(home) <= ctx.config.arrival_threshold {
            ctx.transition_to(GeneralState::Resting);
            return;
        }
        if ctx.navigate_to(home) {
            ctx.play("walk");
        } else {
            // Дом недостижим: отдыхаем на месте
            crate::logger::log_warning(&format!("npc {}: home {:?} unreachable", ctx.npc(), home));
            ctx.transition_to(GeneralState::Resting);
        }
    }

    fn on_reached_destination(&mut self, ctx: &mut AgentContext) {
        let facing = ctx.record.home_orientation;
        ctx.movement.set_orientation(facing);
        ctx.transition_to(GeneralState::Resting);
    }

    fn wants_arrival_notifications(&self) -> bool {
        true
    }
}

#[derive(Debug, Default)]
pub struct RestingHandler;

impl ActiveStateHandler for RestingHandler {
    fn name(&self) -> &'static str {
        "Resting"
    }

    fn on_enter(&mut self, ctx: &mut AgentContext) {
        ctx.stop();
        ctx.play("rest");
    }
}

// ============================================================================
// Basic
// ============================================================================

#[derive(Debug, Default)]
pub struct BasicIdle;

impl BasicStateHandler for BasicIdle {
    fn name(&self) -> &'static str {
        "Idle"
    }

    fn simulate_tick(&self, record: &mut IdentityRecord, ctx: &mut BasicContext, _dt: f32) {
        if record.is_ending_day {
            ctx.transition_to_basic(BasicTransition::to(BasicState::ReturnHome));
        }
    }

    fn uses_timeout(&self) -> bool {
        true
    }

    fn timeout_fallback(&self, _mapping: &StateMappingRegistry) -> StateIdentity {
        BasicState::Wander.into()
    }
}

/// Пока есть цель: идём к ней; дошли: сразу берём новую
///
/// Timer тикает только на тиках без цели, поэтому Wander сам уходит в Idle после
/// серии переходов, а застрявший (нет цели): по timeout'у.
#[derive(Debug, Default)]
pub struct BasicWander;

impl BasicStateHandler for BasicWander {
    fn name(&self) -> &'static str {
        "Wander"
    }

    fn simulate_tick(&self, record: &mut IdentityRecord, ctx: &mut BasicContext, dt: f32) {
        if record.is_ending_day {
            ctx.transition_to_basic(BasicTransition::to(BasicState::ReturnHome));
            return;
        }

        match record.sim_target_position {
            Some(target) => {
                let arrived = step_toward(record, target, ctx.config.basic_walk_speed, ctx.config.arrival_threshold, dt);
                if arrived {
                    record.sim_target_position = None;
                }
            }
            None => {
                let target = random_point_near(record.home_position, ctx.config.wander_radius, &mut *ctx.rng);
                record.sim_target_position = Some(target);
            }
        }
    }

    fn uses_timeout(&self) -> bool {
        true
    }

    fn timeout_fallback(&self, _mapping: &StateMappingRegistry) -> StateIdentity {
        BasicState::Idle.into()
    }
}

#[derive(Debug, Default)]
pub struct BasicReturnHome;

impl BasicStateHandler for BasicReturnHome {
    fn name(&self) -> &'static str {
        "ReturnHome"
    }

    fn simulate_tick(&self, record: &mut IdentityRecord, ctx: &mut BasicContext, dt: f32) {
        let home = record.home_position;
        if step_toward(record, home, ctx.config.basic_walk_speed, ctx.config.arrival_threshold, dt) {
            record.world_orientation = record.home_orientation;
            ctx.transition_to_basic(BasicTransition::to(BasicState::Resting));
        }
    }
}

#[derive(Debug, Default)]
pub struct BasicResting;

impl BasicStateHandler for BasicResting {
    fn name(&self) -> &'static str {
        "Resting"
    }

    fn simulate_tick(&self, _record: &mut IdentityRecord, _ctx: &mut BasicContext, _dt: f32) {}
}

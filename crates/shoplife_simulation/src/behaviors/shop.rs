//! Customer / Cashier семейства: LookingToShop (ShoppingWait), Browsing, Working

use bevy::prelude::*;

use crate::active::{ActiveStateHandler, AgentContext};
use crate::basic::{step_toward, BasicContext, BasicStateHandler, BasicTransition};
use crate::behaviors::general::{random_point_near, take_timer};
use crate::record::IdentityRecord;
use crate::state::{BasicState, GeneralState};
use crate::world::SHOP_DECISION;

/// Радиус перемещений между полками при Browsing (метры)
const BROWSE_STEP_RADIUS: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
enum ShopPhase {
    Waiting { remaining: f32 },
    Deciding,
}

/// Стоит у витрины, потом решает (decision point `SHOP_DECISION`)
#[derive(Debug)]
pub struct LookingToShopHandler {
    phase: ShopPhase,
}

impl Default for LookingToShopHandler {
    fn default() -> Self {
        Self {
            phase: ShopPhase::Deciding,
        }
    }
}

impl ActiveStateHandler for LookingToShopHandler {
    fn name(&self) -> &'static str {
        "LookingToShop"
    }

    fn on_enter(&mut self, ctx: &mut AgentContext) {
        ctx.stop();
        ctx.play("window_shop");
        self.phase = ShopPhase::Waiting {
            remaining: take_timer(ctx.record, ctx.config.shopping_decision_delay),
        };
    }

    fn on_update(&mut self, ctx: &mut AgentContext, dt: f32) {
        if ctx.is_ending_day() {
            ctx.transition_to(GeneralState::ReturnHome);
            return;
        }

        match &mut self.phase {
            ShopPhase::Waiting { remaining } => {
                *remaining -= dt;
                if *remaining <= 0.0 {
                    self.phase = ShopPhase::Deciding;
                }
            }
            ShopPhase::Deciding => {
                let outcome = ctx.decide(SHOP_DECISION);
                ctx.apply_outcome(&outcome);
            }
        }
    }

    fn on_exit(&mut self, ctx: &mut AgentContext) {
        // Незаконченное ожидание уезжает в Basic tier
        if let ShopPhase::Waiting { remaining } = self.phase {
            ctx.record.sim_state_timer = remaining.max(0.0);
        }
    }
}

#[derive(Debug, Default)]
pub struct BrowsingHandler {
    remaining: f32,
}

impl BrowsingHandler {
    fn next_shelf(&self, ctx: &mut AgentContext) {
        let around = ctx.position();
        let target = random_point_near(around, BROWSE_STEP_RADIUS, &mut *ctx.rng);
        if ctx.navigate_to(target) {
            ctx.play("walk");
        }
    }
}

impl ActiveStateHandler for BrowsingHandler {
    fn name(&self) -> &'static str {
        "Browsing"
    }

    fn on_enter(&mut self, ctx: &mut AgentContext) {
        self.remaining = take_timer(ctx.record, ctx.config.browsing_duration);
        self.next_shelf(ctx);
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

    fn on_reached_destination(&mut self, ctx: &mut AgentContext) {
        ctx.play("inspect");
        ctx.animation.trigger_interaction("shelf");
        self.next_shelf(ctx);
    }

    fn on_exit(&mut self, ctx: &mut AgentContext) {
        ctx.record.sim_state_timer = self.remaining.max(0.0);
    }

    fn wants_arrival_notifications(&self) -> bool {
        true
    }
}

/// Кассир: стоит на своём месте (home pose), до конца смены
#[derive(Debug, Default)]
pub struct WorkingHandler;

impl WorkingHandler {
    fn settle(ctx: &mut AgentContext) {
        let facing = ctx.record.home_orientation;
        ctx.stop();
        ctx.movement.set_orientation(facing);
        ctx.play("work");
    }
}

impl ActiveStateHandler for WorkingHandler {
    fn name(&self) -> &'static str {
        "Working"
    }

    fn on_enter(&mut self, ctx: &mut AgentContext) {
        let station = ctx.record.home_position;
        if ctx.position().distance(station) <= ctx.config.arrival_threshold {
            Self::settle(ctx);
        } else if ctx.navigate_to(station) {
            ctx.play("walk");
        } else {
            crate::logger::log_warning(&format!("npc {}: work station unreachable", ctx.npc()));
            Self::settle(ctx);
        }
    }

    fn on_update(&mut self, ctx: &mut AgentContext, _dt: f32) {
        if ctx.is_ending_day() {
            ctx.transition_to(GeneralState::ReturnHome);
        }
    }

    fn on_reached_destination(&mut self, ctx: &mut AgentContext) {
        Self::settle(ctx);
    }

    fn wants_arrival_notifications(&self) -> bool {
        true
    }
}

// ============================================================================
// Basic
// ============================================================================

/// Basic эквивалент LookingToShop: собственный таймер вместо timeout'а
#[derive(Debug, Default)]
pub struct BasicShoppingWait;

impl BasicStateHandler for BasicShoppingWait {
    fn name(&self) -> &'static str {
        "ShoppingWait"
    }

    fn on_enter(&self, record: &mut IdentityRecord, ctx: &mut BasicContext) {
        record.sim_state_timer = ctx.config.shopping_decision_delay;
    }

    fn on_resume(&self, record: &mut IdentityRecord, ctx: &mut BasicContext) {
        if record.sim_state_timer <= 0.0 {
            record.sim_state_timer = ctx.config.shopping_decision_delay;
        }
    }

    fn simulate_tick(&self, record: &mut IdentityRecord, ctx: &mut BasicContext, dt: f32) {
        if record.is_ending_day {
            ctx.transition_to_basic(BasicTransition::to(BasicState::ReturnHome));
            return;
        }

        record.sim_state_timer -= dt;
        if record.sim_state_timer <= 0.0 {
            let outcome = ctx.decide(record, SHOP_DECISION);
            ctx.apply_outcome(&outcome);
        }
    }
}

#[derive(Debug, Default)]
pub struct BasicBrowsing;

impl BasicStateHandler for BasicBrowsing {
    fn name(&self) -> &'static str {
        "Browsing"
    }

    fn on_enter(&self, record: &mut IdentityRecord, ctx: &mut BasicContext) {
        record.sim_state_timer = ctx.config.browsing_duration;
    }

    fn on_resume(&self, record: &mut IdentityRecord, ctx: &mut BasicContext) {
        if record.sim_state_timer <= 0.0 {
            record.sim_state_timer = ctx.config.browsing_duration;
        }
    }

    fn simulate_tick(&self, record: &mut IdentityRecord, ctx: &mut BasicContext, dt: f32) {
        if record.is_ending_day {
            ctx.transition_to_basic(BasicTransition::to(BasicState::ReturnHome));
            return;
        }

        record.sim_state_timer -= dt;
        if record.sim_state_timer <= 0.0 {
            ctx.transition_to_basic(BasicTransition::to(BasicState::Wander));
        }
    }
}

#[derive(Debug, Default)]
pub struct BasicWorking;

impl BasicStateHandler for BasicWorking {
    fn name(&self) -> &'static str {
        "Working"
    }

    fn simulate_tick(&self, record: &mut IdentityRecord, ctx: &mut BasicContext, dt: f32) {
        if record.is_ending_day {
            ctx.transition_to_basic(BasicTransition::to(BasicState::ReturnHome));
            return;
        }

        let station: Vec3 = record.home_position;
        if record.world_position != station
            && step_toward(record, station, ctx.config.basic_walk_speed, ctx.config.arrival_threshold, dt)
        {
            record.world_orientation = record.home_orientation;
        }
    }
}

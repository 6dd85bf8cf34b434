//! Path following (оба tiers)
//!
//! Active: movement capability ведёт к `cursor.moving_toward()`, arrival event
//! двигает cursor. Basic: `PathContinuity::advance` по `sim_*` полям record'а.
//! Конец path → end policy → `PathTransitionResult` → переход.

use std::sync::Arc;

use crate::active::{ActiveStateHandler, AgentContext};
use crate::basic::{BasicContext, BasicStateHandler, BasicTransition};
use crate::error::ContinuityError;
use crate::record::IdentityRecord;

#[derive(Debug, Default)]
pub struct FollowPathHandler;

impl FollowPathHandler {
    fn head_to_target(&self, ctx: &mut AgentContext) {
        match ctx.path_target() {
            Ok(Some(target)) => {
                if !ctx.navigate_to(target) {
                    let path = ctx.path.as_ref().map(|cursor| cursor.path_id().to_string()).unwrap_or_default();
                    ctx.report(&ContinuityError::InvalidPath {
                        path,
                        reason: format!("waypoint at {:?} is unreachable", target),
                    });
                    *ctx.path = None;
                    let fallback = ctx.mapping().default_active();
                    ctx.transition_to(fallback);
                }
            }
            Ok(None) => self.finish(ctx),
            Err(error) => {
                ctx.report(&error);
                *ctx.path = None;
                let fallback = ctx.mapping().default_active();
                ctx.transition_to(fallback);
            }
        }
    }

    fn finish(&self, ctx: &mut AgentContext) {
        let result = ctx.resolve_path_end();
        crate::logger::log(&format!(
            "🏁 npc {} finished path → {}{}",
            ctx.npc(),
            result.target_state,
            result
                .path_continuation
                .as_ref()
                .map(|c| format!(" on `{}`", c.path.id()))
                .unwrap_or_default()
        ));
        ctx.apply_path_result(result);
    }
}

impl ActiveStateHandler for FollowPathHandler {
    fn name(&self) -> &'static str {
        "FollowPath"
    }

    fn on_enter(&mut self, ctx: &mut AgentContext) {
        ctx.play("walk");
        self.head_to_target(ctx);
    }

    fn on_reached_destination(&mut self, ctx: &mut AgentContext) {
        let finished = match ctx.path.as_mut() {
            Some(cursor) => cursor.mark_arrived(),
            None => true,
        };
        if finished {
            self.finish(ctx);
        } else {
            self.head_to_target(ctx);
        }
    }

    fn wants_arrival_notifications(&self) -> bool {
        true
    }
}

/// Extrapolated path following: resume → advance → запись прогресса обратно в record
#[derive(Debug, Default)]
pub struct BasicFollowPath;

impl BasicFollowPath {
    fn abandon(ctx: &mut BasicContext, error: &ContinuityError) {
        ctx.report(error);
        let fallback = ctx.mapping().default_basic();
        ctx.transition_to_basic(BasicTransition::to(fallback));
    }
}

impl BasicStateHandler for BasicFollowPath {
    fn name(&self) -> &'static str {
        "FollowPath"
    }

    fn simulate_tick(&self, record: &mut IdentityRecord, ctx: &mut BasicContext, dt: f32) {
        let Some(progress) = record.path_progress() else {
            Self::abandon(ctx, &record.inconsistent("following path without path progress"));
            return;
        };

        let path = match ctx.catalog.paths.get(&progress.path_id) {
            Ok(path) => Arc::clone(path),
            Err(error) => {
                Self::abandon(ctx, &error);
                return;
            }
        };

        let continuity = ctx.continuity();
        let mut cursor = match continuity.resume(&path, progress.waypoint_index, progress.reverse) {
            Ok(cursor) => cursor,
            Err(error) => {
                Self::abandon(ctx, &error);
                return;
            }
        };

        let step = match continuity.advance(&mut cursor, record.world_position, ctx.config.basic_walk_speed, dt) {
            Ok(step) => step,
            Err(error) => {
                Self::abandon(ctx, &error);
                return;
            }
        };

        record.world_position = step.position;
        if let Some(facing) = step.orientation {
            record.world_orientation = facing;
        }

        match cursor.moving_toward() {
            Some(index) if !step.finished => record.sim_waypoint_index = index,
            _ => ctx.finish_path(record),
        }
    }
}

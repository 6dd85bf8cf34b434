//! Basic State Handler contract + BasicContext
//!
//! Basic handlers stateless (shared между всеми records): всё, что нужно
//! помнить между тиками, живёт в `sim_*` полях IdentityRecord'а.

use bevy::prelude::*;
use rand::RngCore;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::ContinuityConfig;
use crate::decision::{DecisionOutcome, DecisionPointId};
use crate::error::{ContinuityError, ContinuityResult, ErrorLedger, Fallback};
use crate::navigation::{PathContinuity, PathStart, PathTransitionResult};
use crate::record::{IdentityRecord, NpcId};
use crate::state::{StateIdentity, StateMappingRegistry};
use crate::world::WorldCatalog;

/// Как встать на path при входе в `Basic.FollowPath`
#[derive(Debug, Clone, PartialEq)]
pub enum PathStaging {
    /// Approach leg к start waypoint, потом start ± 1
    Fresh(PathStart),
    /// Продолжить прямо к указанному waypoint'у
    Resume(PathStart),
}

/// Запрошенный Basic переход
#[derive(Debug, Clone, PartialEq)]
pub struct BasicTransition {
    pub target: StateIdentity,
    pub path: Option<PathStaging>,
}

impl BasicTransition {
    pub fn to(target: impl Into<StateIdentity>) -> Self {
        Self {
            target: target.into(),
            path: None,
        }
    }

    pub fn with_path(target: impl Into<StateIdentity>, staging: PathStaging) -> Self {
        Self {
            target: target.into(),
            path: Some(staging),
        }
    }
}

pub struct BasicContext<'a> {
    pub catalog: &'a WorldCatalog,
    pub config: &'a ContinuityConfig,
    pub rng: &'a mut dyn RngCore,
    pub errors: &'a mut ErrorLedger,
    pub time_of_day: f32,
    npc: NpcId,
    pending: Option<BasicTransition>,
}

impl<'a> BasicContext<'a> {
    pub(crate) fn new(
        npc: NpcId,
        catalog: &'a WorldCatalog,
        config: &'a ContinuityConfig,
        rng: &'a mut dyn RngCore,
        errors: &'a mut ErrorLedger,
        time_of_day: f32,
    ) -> Self {
        Self {
            catalog,
            config,
            rng,
            errors,
            time_of_day,
            npc,
            pending: None,
        }
    }

    pub fn npc(&self) -> NpcId {
        self.npc
    }

    pub fn mapping(&self) -> &StateMappingRegistry {
        &self.catalog.mapping
    }

    pub fn continuity(&self) -> PathContinuity<'a> {
        self.catalog.continuity(self.config.arrival_threshold)
    }

    /// Запросить Basic переход (первый запрос за tick побеждает)
    pub fn transition_to_basic(&mut self, transition: BasicTransition) {
        if let Some(existing) = &self.pending {
            if existing.target != transition.target {
                crate::logger::log_warning(&format!(
                    "npc {}: basic transition to {} ignored, {} already requested",
                    self.npc, transition.target, existing.target
                ));
            }
            return;
        }
        self.pending = Some(transition);
    }

    pub fn has_pending_transition(&self) -> bool {
        self.pending.is_some()
    }

    pub(crate) fn take_pending(&mut self) -> Option<BasicTransition> {
        self.pending.take()
    }

    pub fn report(&mut self, error: &ContinuityError) {
        self.errors.report(Some(self.npc), error);
    }

    pub fn report_fallback<T>(&mut self, failure: Fallback<T>) -> T {
        failure.report(self.errors, Some(self.npc))
    }

    /// Active state identity → Basic (miss → default Basic, с репортом)
    pub fn basic_for(&mut self, active: StateIdentity) -> StateIdentity {
        if active.is_basic() {
            return active;
        }
        match self.catalog.mapping.basic_or_default(active) {
            Ok(state) => state,
            Err(failure) => self.report_fallback(failure),
        }
    }

    /// `PathTransitionResult` (Active термины) → Basic переход
    pub fn transition_from_result(&mut self, result: PathTransitionResult) {
        let transition = match result.path_continuation {
            Some(continuation) => {
                BasicTransition::with_path(self.catalog.mapping.path_basic(), PathStaging::Fresh(continuation.to_start()))
            }
            None => BasicTransition::to(self.basic_for(result.target_state)),
        };
        self.transition_to_basic(transition);
    }

    /// End policy path'а record'а → переход
    pub fn finish_path(&mut self, record: &IdentityRecord) {
        let Some(path_id) = record.sim_path_id.clone() else {
            let error = record.inconsistent("path end reached without a path id");
            self.report(&error);
            let fallback = self.catalog.mapping.default_basic();
            self.transition_to_basic(BasicTransition::to(fallback));
            return;
        };

        let catalog = self.catalog;
        let result = match catalog.paths.get(&path_id) {
            Ok(path) => {
                let resolved = catalog
                    .path_end_resolver()
                    .resolve(path, &record.decision_overrides, &mut *self.rng);
                match resolved {
                    Ok(result) => result,
                    Err(failure) => self.report_fallback(failure),
                }
            }
            Err(error) => {
                self.report(&error);
                PathTransitionResult::state(self.catalog.mapping.default_active())
            }
        };
        self.transition_from_result(result);
    }

    pub fn decide(&mut self, record: &IdentityRecord, point: impl Into<DecisionPointId>) -> DecisionOutcome {
        let point = point.into();
        let resolved = self
            .catalog
            .decisions
            .resolve(&point, &record.decision_overrides, &mut *self.rng);
        match resolved {
            Ok(outcome) => outcome,
            Err(failure) => self.report_fallback(failure),
        }
    }

    pub fn apply_outcome(&mut self, outcome: &DecisionOutcome) {
        let resolved = self.catalog.path_end_resolver().outcome_to_result(outcome);
        match resolved {
            Ok(result) => self.transition_from_result(result),
            Err(error) => {
                self.report(&error);
                let fallback = self.catalog.mapping.default_basic();
                self.transition_to_basic(BasicTransition::to(fallback));
            }
        }
    }
}

/// Поведение одного Basic состояния (extrapolation без физики)
pub trait BasicStateHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn on_enter(&self, _record: &mut IdentityRecord, _ctx: &mut BasicContext) {}

    /// Record принят от Active tier'а в этом состоянии (вместо on_enter)
    fn on_resume(&self, _record: &mut IdentityRecord, _ctx: &mut BasicContext) {}

    fn simulate_tick(&self, record: &mut IdentityRecord, ctx: &mut BasicContext, dt: f32);

    fn on_exit(&self, _record: &mut IdentityRecord, _ctx: &mut BasicContext) {}

    /// Scheduler сам уменьшает `sim_state_timer`, пока нет `sim_target_position`
    fn uses_timeout(&self) -> bool {
        false
    }

    fn timeout_duration(&self, config: &ContinuityConfig) -> f32 {
        config.idle_timeout
    }

    /// Куда уходим, когда timer дошёл до нуля
    fn timeout_fallback(&self, mapping: &StateMappingRegistry) -> StateIdentity {
        mapping.default_basic()
    }
}

/// Lookup table: Basic State Identity → shared handler
#[derive(Clone, Default)]
pub struct BasicHandlerRegistry {
    handlers: HashMap<StateIdentity, Arc<dyn BasicStateHandler>>,
}

impl BasicHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, state: impl Into<StateIdentity>, handler: impl BasicStateHandler + 'static) {
        self.handlers.insert(state.into(), Arc::new(handler));
    }

    pub fn with(mut self, state: impl Into<StateIdentity>, handler: impl BasicStateHandler + 'static) -> Self {
        self.register(state, handler);
        self
    }

    pub fn get(&self, state: StateIdentity) -> Option<&Arc<dyn BasicStateHandler>> {
        self.handlers.get(&state)
    }

    pub fn contains(&self, state: StateIdentity) -> bool {
        self.handlers.contains_key(&state)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Default и path-following Basic состояния обязаны иметь handler
    pub fn validate(&self, mapping: &StateMappingRegistry) -> ContinuityResult<()> {
        for state in [mapping.default_basic(), mapping.path_basic()] {
            if !self.contains(state) {
                return Err(ContinuityError::MissingHandler(state));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for BasicHandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut states: Vec<_> = self.handlers.keys().collect();
        states.sort();
        f.debug_struct("BasicHandlerRegistry").field("states", &states).finish()
    }
}

/// Шаг к точке с постоянной скоростью; true: точка достигнута
pub fn step_toward(record: &mut IdentityRecord, target: Vec3, speed: f32, threshold: f32, dt: f32) -> bool {
    let to_target = target - record.world_position;
    let distance = to_target.length();
    let travel = (speed * dt).max(0.0);

    if distance <= threshold.max(0.0) || distance <= travel {
        record.world_position = target;
        if let Some(facing) = crate::navigation::facing_rotation(to_target) {
            record.world_orientation = facing;
        }
        return true;
    }

    record.world_position += to_target / distance * travel;
    if let Some(facing) = crate::navigation::facing_rotation(to_target) {
        record.world_orientation = facing;
    }
    false
}

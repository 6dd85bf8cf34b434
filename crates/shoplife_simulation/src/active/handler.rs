//! Active State Handler contract + AgentContext
//!
//! Handler: strategy object для одного Active состояния. Controller вызывает
//! `on_enter / on_update / on_reached_destination / on_exit`, передавая
//! `AgentContext` (live capabilities + record + injected catalog).
//!
//! Переход: `ctx.transition_to(state)` только ставит запрос. Controller
//! выполняет его после возврата из callback'а: поэтому `on_exit` старого
//! состояния никогда не вызывается повторно, даже если новый `on_enter`
//! сразу просит следующий переход.

use bevy::prelude::*;
use rand::RngCore;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::active::{AnimationCapability, MovementCapability};
use crate::config::ContinuityConfig;
use crate::decision::{DecisionOutcome, DecisionPointId};
use crate::error::{ContinuityError, ContinuityResult, ErrorLedger, Fallback};
use crate::navigation::{PathContinuation, PathCursor, PathStart, PathTransitionResult};
use crate::record::{IdentityRecord, NpcId};
use crate::state::{StateIdentity, StateMappingRegistry};
use crate::world::WorldCatalog;

/// Трекинг текущей навигационной цели (one-time arrival event)
///
/// `is_target_reached` сбрасывается только новым `navigate_to`: прибытие
/// доставляется handler'у ровно один раз на цель.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigationState {
    pub destination: Option<Vec3>,
    pub is_target_reached: bool,
}

impl NavigationState {
    pub fn begin(&mut self, target: Vec3) {
        self.destination = Some(target);
        self.is_target_reached = false;
    }

    pub fn clear(&mut self) {
        self.destination = None;
        self.is_target_reached = false;
    }

    pub fn poll_arrival(&mut self, has_arrived: bool) -> bool {
        if self.destination.is_some() && has_arrived && !self.is_target_reached {
            self.is_target_reached = true;
            return true;
        }
        false
    }

    /// Цель, к которой агент ещё идёт (для handoff в Basic tier)
    pub fn in_flight(&self) -> Option<Vec3> {
        if self.is_target_reached {
            None
        } else {
            self.destination
        }
    }
}

pub struct AgentContext<'a> {
    pub record: &'a mut IdentityRecord,
    pub movement: &'a mut dyn MovementCapability,
    pub animation: &'a mut dyn AnimationCapability,
    pub catalog: &'a WorldCatalog,
    pub config: &'a ContinuityConfig,
    pub rng: &'a mut dyn RngCore,
    pub errors: &'a mut ErrorLedger,
    /// Текущий path cursor (только для path-following состояний)
    pub path: &'a mut Option<PathCursor>,
    pub time_of_day: f32,
    nav: &'a mut NavigationState,
    pending: Option<StateIdentity>,
}

impl<'a> AgentContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        record: &'a mut IdentityRecord,
        movement: &'a mut dyn MovementCapability,
        animation: &'a mut dyn AnimationCapability,
        catalog: &'a WorldCatalog,
        config: &'a ContinuityConfig,
        rng: &'a mut dyn RngCore,
        errors: &'a mut ErrorLedger,
        path: &'a mut Option<PathCursor>,
        nav: &'a mut NavigationState,
        time_of_day: f32,
    ) -> Self {
        Self {
            record,
            movement,
            animation,
            catalog,
            config,
            rng,
            errors,
            path,
            time_of_day,
            nav,
            pending: None,
        }
    }

    pub fn npc(&self) -> NpcId {
        self.record.id
    }

    pub fn position(&self) -> Vec3 {
        self.movement.position()
    }

    pub fn mapping(&self) -> &StateMappingRegistry {
        &self.catalog.mapping
    }

    pub fn is_ending_day(&self) -> bool {
        self.record.is_ending_day
    }

    /// Запросить переход. Первый запрос за callback побеждает (он же отменяет текущий handler).
    pub fn transition_to(&mut self, state: impl Into<StateIdentity>) {
        let state = state.into();
        if let Some(existing) = self.pending {
            if existing != state {
                crate::logger::log_warning(&format!(
                    "npc {}: transition to {} ignored, {} already requested",
                    self.record.id, state, existing
                ));
            }
            return;
        }
        self.pending = Some(state);
    }

    pub fn has_pending_transition(&self) -> bool {
        self.pending.is_some()
    }

    pub(crate) fn take_pending(&mut self) -> Option<StateIdentity> {
        self.pending.take()
    }

    /// Навигация через context (сбрасывает one-time arrival latch)
    pub fn navigate_to(&mut self, target: Vec3) -> bool {
        if self.movement.navigate_to(target) {
            self.nav.begin(target);
            true
        } else {
            self.nav.clear();
            false
        }
    }

    pub fn stop(&mut self) {
        self.movement.stop();
        self.nav.clear();
    }

    pub fn destination(&self) -> Option<Vec3> {
        self.nav.destination
    }

    pub fn play(&mut self, clip: &str) {
        self.animation.play(clip);
    }

    pub fn report(&mut self, error: &ContinuityError) {
        self.errors.report(Some(self.record.id), error);
    }

    pub fn report_fallback<T>(&mut self, failure: Fallback<T>) -> T {
        failure.report(self.errors, Some(self.record.id))
    }

    // === Path ===

    /// Встать на path "с нуля" (approach leg от текущей позиции)
    pub fn start_path(&mut self, start: &PathStart) -> ContinuityResult<()> {
        let path = Arc::clone(self.catalog.paths.get(&start.path_id)?);
        let cursor = self.catalog.continuity(self.config.arrival_threshold).start_fresh(
            &path,
            self.movement.position(),
            start.start_index,
            start.reverse,
        )?;
        *self.path = Some(cursor);
        Ok(())
    }

    fn start_continuation(&mut self, continuation: &PathContinuation) -> ContinuityResult<()> {
        let cursor = self.catalog.continuity(self.config.arrival_threshold).start_fresh(
            &continuation.path,
            self.movement.position(),
            continuation.start_index,
            continuation.reverse,
        )?;
        *self.path = Some(cursor);
        Ok(())
    }

    /// Позиция waypoint'а, к которому ведёт cursor (None = path закончен)
    pub fn path_target(&self) -> ContinuityResult<Option<Vec3>> {
        match self.path.as_ref() {
            Some(cursor) => self.catalog.continuity(self.config.arrival_threshold).target_position(cursor),
            None => Err(self.record.inconsistent("path-following state without a path cursor")),
        }
    }

    /// End policy текущего path → `PathTransitionResult` (ошибки репортятся, берётся fallback)
    pub fn resolve_path_end(&mut self) -> PathTransitionResult {
        let Some(path) = self.path.as_ref().map(|cursor| Arc::clone(cursor.path())) else {
            let error = self.record.inconsistent("path end reached without a path cursor");
            self.report(&error);
            return PathTransitionResult::state(self.catalog.mapping.default_active());
        };

        let resolved = self.catalog.path_end_resolver().resolve(
            &path,
            &self.record.decision_overrides,
            &mut *self.rng,
        );
        match resolved {
            Ok(result) => result,
            Err(failure) => self.report_fallback(failure),
        }
    }

    /// Применить результат: опционально встать на новый path, затем запросить переход
    pub fn apply_path_result(&mut self, result: PathTransitionResult) {
        if let Some(continuation) = &result.path_continuation {
            if let Err(error) = self.start_continuation(continuation) {
                self.report(&error);
                *self.path = None;
                let fallback = self.catalog.mapping.default_active();
                self.transition_to(fallback);
                return;
            }
        }
        self.transition_to(result.target_state);
    }

    /// Decision point → outcome (override агента побеждает; ошибки → fallback outcome)
    pub fn decide(&mut self, point: impl Into<DecisionPointId>) -> DecisionOutcome {
        let point = point.into();
        let resolved = self
            .catalog
            .decisions
            .resolve(&point, &self.record.decision_overrides, &mut *self.rng);
        match resolved {
            Ok(outcome) => outcome,
            Err(failure) => self.report_fallback(failure),
        }
    }

    /// Outcome → переход (path outcome ставит свежий cursor)
    pub fn apply_outcome(&mut self, outcome: &DecisionOutcome) {
        let resolved = self.catalog.path_end_resolver().outcome_to_result(outcome);
        match resolved {
            Ok(result) => self.apply_path_result(result),
            Err(error) => {
                self.report(&error);
                let fallback = self.catalog.mapping.default_active();
                self.transition_to(fallback);
            }
        }
    }
}

/// Поведение одного Active состояния
///
/// Все callbacks возвращаются в пределах тика; долгие последовательности делаются
/// через таймеры/sub-state enum внутри handler'а.
pub trait ActiveStateHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn on_enter(&mut self, _ctx: &mut AgentContext) {}

    fn on_update(&mut self, _ctx: &mut AgentContext, _dt: f32) {}

    /// Вызывается один раз на цель, только если `wants_arrival_notifications()`
    fn on_reached_destination(&mut self, _ctx: &mut AgentContext) {}

    fn on_exit(&mut self, _ctx: &mut AgentContext) {}

    fn wants_arrival_notifications(&self) -> bool {
        false
    }
}

/// Neutral idle: агент без валидного следующего состояния паркуется здесь
#[derive(Debug, Default)]
pub struct ParkedHandler;

impl ActiveStateHandler for ParkedHandler {
    fn name(&self) -> &'static str {
        "Parked"
    }

    fn on_enter(&mut self, ctx: &mut AgentContext) {
        ctx.stop();
        ctx.play("idle");
    }
}

pub type ActiveHandlerFactory = Arc<dyn Fn() -> Box<dyn ActiveStateHandler> + Send + Sync>;

/// Lookup table: State Identity → фабрика handler'а
///
/// Handlers Active tier'а stateful (таймеры, sub-state), поэтому каждый
/// controller получает свой экземпляр через фабрику.
#[derive(Clone, Default)]
pub struct ActiveHandlerRegistry {
    factories: HashMap<StateIdentity, ActiveHandlerFactory>,
}

impl ActiveHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, H>(&mut self, state: impl Into<StateIdentity>, factory: F)
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: ActiveStateHandler + 'static,
    {
        let boxed: ActiveHandlerFactory = Arc::new(move || Box::new(factory()) as Box<dyn ActiveStateHandler>);
        self.factories.insert(state.into(), boxed);
    }

    pub fn with<F, H>(mut self, state: impl Into<StateIdentity>, factory: F) -> Self
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: ActiveStateHandler + 'static,
    {
        self.register(state, factory);
        self
    }

    pub fn create(&self, state: StateIdentity) -> Option<Box<dyn ActiveStateHandler>> {
        self.factories.get(&state).map(|factory| factory())
    }

    pub fn contains(&self, state: StateIdentity) -> bool {
        self.factories.contains_key(&state)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Default и primary path состояния обязаны иметь handler
    pub fn validate(&self, mapping: &StateMappingRegistry) -> ContinuityResult<()> {
        for state in [mapping.default_active(), mapping.primary_path_active()] {
            if !self.contains(state) {
                return Err(ContinuityError::MissingHandler(state));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ActiveHandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut states: Vec<_> = self.factories.keys().collect();
        states.sort();
        f.debug_struct("ActiveHandlerRegistry").field("states", &states).finish()
    }
}

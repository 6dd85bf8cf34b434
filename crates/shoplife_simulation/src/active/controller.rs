//! Active Controller — per-frame state machine одного live агента
//!
//! Владеет IdentityRecord'ом, пока агент активен (`is_active == true`).
//! `promote` забирает record у Basic tier, `demote` возвращает его обратно.

use bevy::prelude::*;
use std::sync::Arc;

use crate::active::{
    ActiveHandlerRegistry, ActiveStateHandler, AgentContext, AnimationCapability, MovementCapability,
    NavigationState, ParkedHandler,
};
use crate::config::ContinuityConfig;
use crate::error::{ContinuityError, ContinuityResult};
use crate::navigation::PathCursor;
use crate::record::{IdentityRecord, NpcId, PathProgress};
use crate::state::StateIdentity;
use crate::world::{TickEnv, WorldCatalog};

/// Injected зависимости Active tier'а (общие для всех controllers)
#[derive(Clone, Debug)]
pub struct ActiveDeps {
    pub catalog: Arc<WorldCatalog>,
    pub handlers: Arc<ActiveHandlerRegistry>,
    pub config: Arc<ContinuityConfig>,
}

/// Promotion отклонён: record возвращается вызывающему нетронутым
#[derive(Debug)]
pub struct PromotionRejected {
    pub error: ContinuityError,
    pub record: Box<IdentityRecord>,
}

pub struct ActiveController {
    record: IdentityRecord,
    current_state: StateIdentity,
    previous_state: StateIdentity,
    handler: Box<dyn ActiveStateHandler>,
    movement: Box<dyn MovementCapability>,
    animation: Box<dyn AnimationCapability>,
    path: Option<PathCursor>,
    nav: NavigationState,
    deps: ActiveDeps,
}

impl ActiveController {
    /// Basic → Active handoff
    ///
    /// Поза берётся из record'а; path progress: через `resume` (без approach leg);
    /// Basic state маппится в Active через registry (miss → default Active).
    pub fn promote(
        mut record: IdentityRecord,
        mut movement: Box<dyn MovementCapability>,
        animation: Box<dyn AnimationCapability>,
        deps: ActiveDeps,
        env: &mut TickEnv,
    ) -> Result<Self, PromotionRejected> {
        if record.is_active {
            return Err(PromotionRejected {
                error: ContinuityError::AlreadyActive(record.id),
                record: Box::new(record),
            });
        }

        let npc = record.id;
        let mapping = &deps.catalog.mapping;
        movement.warp(record.world_position, record.world_orientation);

        // Path progress → resume cursor
        let mut path = None;
        if record.sim_is_following_path {
            match resume_cursor(&record, &deps) {
                Ok(cursor) => path = Some(cursor),
                Err(error) => {
                    env.errors.report(Some(npc), &error);
                    record.clear_path_progress();
                }
            }
        }

        let mut state = active_state_for(&record, &deps, env);

        if state.is_active_path_following() && path.is_none() {
            let error = record.inconsistent("promoted into path-following without path progress");
            env.errors.report(Some(npc), &error);
            state = mapping.default_active();
        }
        if !state.is_active_path_following() {
            path = None;
        }

        record.is_active = true;
        record.clear_path_progress();
        record.current_state = state;

        crate::logger::log(&format!(
            "⬆️ npc {} promoted: {} → {} at {:?}",
            npc,
            record.last_active_state.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
            state,
            record.world_position
        ));

        let mut controller = Self {
            record,
            current_state: state,
            previous_state: state,
            handler: Box::new(ParkedHandler),
            movement,
            animation,
            path,
            nav: NavigationState::default(),
            deps,
        };
        controller.switch_to(state, env, false);
        Ok(controller)
    }

    pub fn id(&self) -> NpcId {
        self.record.id
    }

    pub fn current_state(&self) -> StateIdentity {
        self.current_state
    }

    pub fn previous_state(&self) -> StateIdentity {
        self.previous_state
    }

    pub fn handler_name(&self) -> &'static str {
        self.handler.name()
    }

    pub fn record(&self) -> &IdentityRecord {
        &self.record
    }

    pub fn path_cursor(&self) -> Option<&PathCursor> {
        self.path.as_ref()
    }

    pub fn movement(&self) -> &dyn MovementCapability {
        self.movement.as_ref()
    }

    pub fn animation(&self) -> &dyn AnimationCapability {
        self.animation.as_ref()
    }

    pub fn position(&self) -> Vec3 {
        self.movement.position()
    }

    /// Один кадр Active state machine
    pub fn tick(&mut self, dt: f32, env: &mut TickEnv) {
        self.record.is_ending_day = self.record.schedule.is_ending_day(env.time_of_day);

        if let Err(error) = self.validate() {
            env.errors.report(Some(self.record.id), &error);
            self.path = None;
            let fallback = self.deps.catalog.mapping.default_active();
            self.switch_to(fallback, env, true);
            return;
        }

        self.movement.step(dt);

        if self.handler.wants_arrival_notifications() && self.nav.poll_arrival(self.movement.has_arrived()) {
            if let Some(next) = self.dispatch(env, |handler, ctx| handler.on_reached_destination(ctx)) {
                self.switch_to(next, env, true);
                return;
            }
        }

        if let Some(next) = self.dispatch(env, |handler, ctx| handler.on_update(ctx, dt)) {
            self.switch_to(next, env, true);
        }
    }

    /// Принудительный переход извне (day start, interaction system)
    pub fn transition_to(&mut self, state: StateIdentity, env: &mut TickEnv) {
        self.switch_to(state, env, true);
    }

    /// Встать на path и перейти в primary path-following состояние
    pub fn follow_path(&mut self, start: &crate::navigation::PathStart, env: &mut TickEnv) -> ContinuityResult<()> {
        let path = Arc::clone(self.deps.catalog.paths.get(&start.path_id)?);
        let cursor = self
            .deps
            .catalog
            .continuity(self.deps.config.arrival_threshold)
            .start_fresh(&path, self.movement.position(), start.start_index, start.reverse)?;

        // Выход из текущего состояния до подмены cursor'а
        self.exit_current(env);
        self.record.clear_sim_motion();
        self.path = Some(cursor);
        let primary = self.deps.catalog.mapping.primary_path_active();
        self.switch_to(primary, env, false);
        Ok(())
    }

    /// Записать live transform и path progress в record (без смены владельца)
    pub fn sync_record(&mut self) {
        self.record.world_position = self.movement.position();
        self.record.world_orientation = self.movement.orientation();

        match self.path.as_ref().and_then(|cursor| cursor.moving_toward().map(|index| (cursor, index))) {
            Some((cursor, index)) => self.record.set_path_progress(PathProgress {
                path_id: cursor.path_id().clone(),
                waypoint_index: index,
                reverse: cursor.is_reverse(),
            }),
            None => self.record.clear_path_progress(),
        }
    }

    /// Active → Basic handoff. Возвращает record новому владельцу.
    pub fn demote(mut self, env: &mut TickEnv) -> IdentityRecord {
        let npc = self.record.id;
        if !self.record.is_active {
            env.errors.report(Some(npc), &ContinuityError::AlreadyInactive(npc));
        }

        self.exit_current(env);
        self.sync_record();

        let mapping = &self.deps.catalog.mapping;
        let mut basic = match mapping.basic_or_default(self.current_state) {
            Ok(state) => state,
            Err(failure) => failure.report(env.errors, Some(npc)),
        };

        if basic.is_basic_path_following() && !self.record.sim_is_following_path {
            let error = self.record.inconsistent("demoted from path-following without an active path");
            env.errors.report(Some(npc), &error);
            basic = mapping.default_basic();
        }
        if !basic.is_basic_path_following() {
            self.record.clear_path_progress();
            self.record.sim_target_position = self.nav.in_flight();
        } else {
            self.record.sim_target_position = None;
        }

        self.movement.stop();
        self.record.last_active_state = Some(self.current_state);
        self.record.current_state = basic;
        self.record.is_active = false;

        crate::logger::log(&format!(
            "⬇️ npc {} demoted: {} → {} at {:?}",
            npc, self.current_state, basic, self.record.world_position
        ));

        self.record
    }

    // ------------------------------------------------------------------------

    fn validate(&self) -> ContinuityResult<()> {
        if !self.record.is_active {
            return Err(self.record.inconsistent("active controller owns an inactive record"));
        }
        if self.current_state.is_basic() {
            return Err(self.record.inconsistent("active controller in a Basic state"));
        }
        if self.current_state.is_active_path_following() && self.path.is_none() {
            return Err(self.record.inconsistent("path-following without a path cursor"));
        }
        if !self.movement.position().is_finite() {
            return Err(self.record.inconsistent("live position is not finite"));
        }
        Ok(())
    }

    /// Вызвать callback текущего handler'а; возвращает запрошенный переход
    fn dispatch<F>(&mut self, env: &mut TickEnv, callback: F) -> Option<StateIdentity>
    where
        F: FnOnce(&mut dyn ActiveStateHandler, &mut AgentContext),
    {
        let Self {
            record,
            handler,
            movement,
            animation,
            path,
            nav,
            deps,
            ..
        } = self;

        let mut ctx = AgentContext::new(
            record,
            movement.as_mut(),
            animation.as_mut(),
            &deps.catalog,
            &deps.config,
            &mut *env.rng,
            &mut *env.errors,
            path,
            nav,
            env.time_of_day,
        );
        callback(handler.as_mut(), &mut ctx);
        ctx.take_pending()
    }

    /// on_exit текущего handler'а (переходы, запрошенные из on_exit, игнорируются)
    fn exit_current(&mut self, env: &mut TickEnv) {
        if let Some(ignored) = self.dispatch(env, |handler, ctx| handler.on_exit(ctx)) {
            crate::logger::log_warning(&format!(
                "npc {}: transition to {} requested from on_exit ignored",
                self.record.id, ignored
            ));
        }
    }

    /// Handler для состояния: miss → default Active → ParkedHandler
    fn instantiate(&self, state: StateIdentity, env: &mut TickEnv) -> (StateIdentity, Box<dyn ActiveStateHandler>) {
        if let Some(handler) = self.deps.handlers.create(state) {
            return (state, handler);
        }
        env.errors.report(Some(self.record.id), &ContinuityError::MissingHandler(state));

        let fallback = self.deps.catalog.mapping.default_active();
        match self.deps.handlers.create(fallback) {
            Some(handler) => (fallback, handler),
            None => (fallback, Box::new(ParkedHandler)),
        }
    }

    /// exit → swap → enter, пока on_enter просит новые переходы (не больше max_transition_chain)
    fn switch_to(&mut self, requested: StateIdentity, env: &mut TickEnv, exit_current: bool) {
        let limit = self.deps.config.max_transition_chain;
        let mut next = requested;
        let mut exit_current = exit_current;
        let mut hops = 0;

        loop {
            hops += 1;
            if exit_current {
                self.exit_current(env);
                // Handoff поля (таймер, недошагнутая цель) живут только до первого настоящего перехода
                self.record.clear_sim_motion();
            }

            if hops > limit {
                let error = ContinuityError::TransitionLoop {
                    npc: self.record.id,
                    limit,
                    last: next,
                };
                env.errors.report(Some(self.record.id), &error);
                self.park(env);
                return;
            }

            let (state, handler) = self.instantiate(next, env);
            if !state.is_active_path_following() {
                self.path = None;
            }
            self.install(state, handler);

            match self.dispatch(env, |handler, ctx| handler.on_enter(ctx)) {
                Some(requested) => {
                    next = requested;
                    exit_current = true;
                }
                None => return,
            }
        }
    }

    fn install(&mut self, state: StateIdentity, handler: Box<dyn ActiveStateHandler>) {
        self.previous_state = self.current_state;
        self.current_state = state;
        self.record.current_state = state;
        self.handler = handler;
    }

    /// Neutral idle в default состоянии (без on_enter chain)
    fn park(&mut self, env: &mut TickEnv) {
        self.path = None;
        let fallback = self.deps.catalog.mapping.default_active();
        self.install(fallback, Box::new(ParkedHandler));
        // ParkedHandler никогда не просит переход
        let _ = self.dispatch(env, |handler, ctx| handler.on_enter(ctx));
    }
}

fn resume_cursor(record: &IdentityRecord, deps: &ActiveDeps) -> ContinuityResult<PathCursor> {
    record.validate(&deps.catalog.paths)?;
    let progress = record
        .path_progress()
        .ok_or_else(|| record.inconsistent("following path without path progress"))?;
    let path = deps.catalog.paths.get(&progress.path_id)?;
    deps.catalog
        .continuity(deps.config.arrival_threshold)
        .resume(path, progress.waypoint_index, progress.reverse)
}

/// Active состояние для promotion
///
/// `last_active_state`: hint для many-to-one маппингов (Path.Patrol → Basic.FollowPath):
/// используется, если он по-прежнему маппится в текущий Basic state.
fn active_state_for(record: &IdentityRecord, deps: &ActiveDeps, env: &mut TickEnv) -> StateIdentity {
    let mapping = &deps.catalog.mapping;
    let current = record.current_state;

    if !current.is_basic() {
        // Record зарегистрирован сразу в Active терминах
        return current;
    }

    if let Some(hint) = record.last_active_state {
        if mapping.basic_for(hint) == Some(current) && deps.handlers.contains(hint) {
            return hint;
        }
    }

    match mapping.active_or_default(current) {
        Ok(state) => state,
        Err(failure) => failure.report(env.errors, Some(record.id)),
    }
}

//! Basic Simulation Scheduler — владелец всех неактивных records
//!
//! Каждый step продвигает часы scheduler'а на `dt_total` и тикает либо все
//! records, либо round-robin батч. Record, пропущенный в этом step, получит
//! долг позже: `sim_clock` отстаёт от часов scheduler'а, и при следующем тике
//! (или `flush`/`release`) долг симулируется sub-step'ами по `max_substep`.
//! Итог: каждый record получает ровно прошедшее время, никто не голодает.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::basic::{BasicContext, BasicHandlerRegistry, BasicTransition, PathStaging};
use crate::config::{ContinuityConfig, SchedulingStrategy};
use crate::error::{ContinuityError, ContinuityResult};
use crate::record::{DayStartBehavior, IdentityRecord, NpcId, PathProgress};
use crate::world::{TickEnv, WorldCatalog};

/// Долг меньше этого считается погашенным (секунды)
const CLOCK_EPSILON: f64 = 1e-9;

/// Injected зависимости Basic tier'а
#[derive(Clone, Debug)]
pub struct BasicDeps {
    pub catalog: Arc<WorldCatalog>,
    pub handlers: Arc<BasicHandlerRegistry>,
    pub config: Arc<ContinuityConfig>,
}

pub struct BasicScheduler {
    records: BTreeMap<NpcId, IdentityRecord>,
    /// Round-robin: с какого id начинается следующий батч
    cursor: NpcId,
    /// Часы scheduler'а (сумма всех `dt_total`)
    elapsed: f64,
    deps: BasicDeps,
}

impl BasicScheduler {
    pub fn new(deps: BasicDeps) -> Self {
        Self {
            records: BTreeMap::new(),
            cursor: NpcId(0),
            elapsed: 0.0,
            deps,
        }
    }

    pub fn deps(&self) -> &BasicDeps {
        &self.deps
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: NpcId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn get(&self, id: NpcId) -> Option<&IdentityRecord> {
        self.records.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IdentityRecord> {
        self.records.values()
    }

    pub fn ids(&self) -> Vec<NpcId> {
        self.records.keys().copied().collect()
    }

    /// Принять record (регистрация или demotion)
    ///
    /// Record в Active терминах (только что зарегистрирован) переводится в Basic
    /// через обычный переход с `on_enter`; уже Basic record продолжает через `on_resume`.
    pub fn adopt(&mut self, mut record: IdentityRecord, env: &mut TickEnv) -> ContinuityResult<()> {
        if record.is_active {
            return Err(ContinuityError::AlreadyActive(record.id));
        }
        if self.records.contains_key(&record.id) {
            return Err(ContinuityError::DuplicateNpc(record.id));
        }

        record.sim_clock = self.elapsed;
        let deps = &self.deps;

        if !record.current_state.is_basic() {
            let target = record.current_state;
            let staging = match (&record.day_start_behavior, target.is_active_path_following()) {
                (DayStartBehavior::Path(start), true) => Some(PathStaging::Fresh(start.clone())),
                _ => None,
            };
            apply_transition(
                deps,
                &mut record,
                BasicTransition {
                    target,
                    path: staging,
                },
                false,
                env,
            );
        } else if let Err(error) = validate(deps, &record) {
            env.errors.report(Some(record.id), &error);
            recover(deps, &mut record, env);
        } else if let Some(handler) = deps.handlers.get(record.current_state).cloned() {
            if handler.uses_timeout() && record.sim_state_timer <= 0.0 {
                record.sim_state_timer = handler.timeout_duration(&deps.config);
            }
            let pending = with_context(deps, &mut record, env, |record, ctx| handler.on_resume(record, ctx));
            if let Some(transition) = pending {
                apply_transition(deps, &mut record, transition, true, env);
            }
        }

        self.records.insert(record.id, record);
        Ok(())
    }

    /// Отдать record (promotion/удаление). Долг по времени гасится до передачи.
    pub fn release(&mut self, id: NpcId, env: &mut TickEnv) -> ContinuityResult<IdentityRecord> {
        let mut record = self.records.remove(&id).ok_or(ContinuityError::UnknownNpc(id))?;
        catch_up(&self.deps, &mut record, self.elapsed, env);
        Ok(record)
    }

    /// Один simulation step с бюджетом `dt_total`
    pub fn step(&mut self, dt_total: f32, env: &mut TickEnv) {
        if !(dt_total > 0.0) {
            return;
        }
        self.elapsed += dt_total as f64;

        let batch = match self.deps.config.scheduling {
            SchedulingStrategy::All => self.ids(),
            SchedulingStrategy::RoundRobin { batch_size } => self.next_batch(batch_size.max(1)),
        };

        for id in batch {
            if let Some(record) = self.records.get_mut(&id) {
                catch_up(&self.deps, record, self.elapsed, env);
            }
        }
    }

    /// Погасить долг одного record'а (перед измерением его позиции)
    pub fn settle(&mut self, id: NpcId, env: &mut TickEnv) -> ContinuityResult<&IdentityRecord> {
        let record = self.records.get_mut(&id).ok_or(ContinuityError::UnknownNpc(id))?;
        catch_up(&self.deps, record, self.elapsed, env);
        Ok(record)
    }

    /// Догнать все records до часов scheduler'а
    pub fn flush(&mut self, env: &mut TickEnv) {
        for record in self.records.values_mut() {
            catch_up(&self.deps, record, self.elapsed, env);
        }
    }

    /// Принудительный Basic переход извне (после погашения долга)
    pub fn transition_record(
        &mut self,
        id: NpcId,
        transition: BasicTransition,
        env: &mut TickEnv,
    ) -> ContinuityResult<()> {
        let record = self.records.get_mut(&id).ok_or(ContinuityError::UnknownNpc(id))?;
        catch_up(&self.deps, record, self.elapsed, env);
        apply_transition(&self.deps, record, transition, true, env);
        Ok(())
    }

    /// Начало дня: каждый record переходит в свой `day_start_behavior`
    pub fn begin_day(&mut self, env: &mut TickEnv) {
        for record in self.records.values_mut() {
            catch_up(&self.deps, record, self.elapsed, env);
            let transition = day_start_transition(&self.deps, record);
            apply_transition(&self.deps, record, transition, true, env);
        }
    }

    /// Забрать все records (restore/shutdown), без catch-up
    pub fn drain(&mut self) -> Vec<IdentityRecord> {
        self.cursor = NpcId(0);
        std::mem::take(&mut self.records).into_values().collect()
    }

    fn next_batch(&mut self, batch_size: usize) -> Vec<NpcId> {
        let batch: Vec<NpcId> = self
            .records
            .range(self.cursor..)
            .chain(self.records.range(..self.cursor))
            .map(|(id, _)| *id)
            .take(batch_size)
            .collect();

        if let Some(last) = batch.last() {
            self.cursor = last.0.checked_add(1).map(NpcId).unwrap_or(NpcId(0));
        }
        batch
    }
}

pub(crate) fn day_start_transition(deps: &BasicDeps, record: &IdentityRecord) -> BasicTransition {
    match &record.day_start_behavior {
        DayStartBehavior::State(state) => BasicTransition::to(*state),
        DayStartBehavior::Path(start) => {
            BasicTransition::with_path(deps.catalog.mapping.path_basic(), PathStaging::Fresh(start.clone()))
        }
    }
}

/// Симулировать долг `until - sim_clock` sub-step'ами
fn catch_up(deps: &BasicDeps, record: &mut IdentityRecord, until: f64, env: &mut TickEnv) {
    let max_substep = (deps.config.max_substep as f64).max(CLOCK_EPSILON);
    let mut owed = until - record.sim_clock;

    while owed > CLOCK_EPSILON {
        let dt = owed.min(max_substep);
        let unused = tick_record(deps, record, dt as f32, env) as f64;
        owed -= (dt - unused).max(0.0);
    }
    record.sim_clock = record.sim_clock.max(until);
}

/// Один sub-step; возвращает остаток `dt`, не прожитый текущим состоянием
///
/// Timeout посреди sub-step'а режет его в момент обнуления timer'а: остаток
/// достаётся fallback состоянию на следующей итерации catch-up.
fn tick_record(deps: &BasicDeps, record: &mut IdentityRecord, dt: f32, env: &mut TickEnv) -> f32 {
    record.is_ending_day = record.schedule.is_ending_day(env.time_of_day);
    record.sim_ticks += 1;

    // Инварианты до dispatch
    if let Err(error) = validate(deps, record) {
        env.errors.report(Some(record.id), &error);
        recover(deps, record, env);
        return 0.0;
    }

    let Some(handler) = deps.handlers.get(record.current_state).cloned() else {
        // Default без handler'а отсекается при конструировании мира
        if record.current_state != deps.catalog.mapping.default_basic() {
            env.errors.report(Some(record.id), &ContinuityError::MissingHandler(record.current_state));
            let fallback = deps.catalog.mapping.default_basic();
            apply_transition(deps, record, BasicTransition::to(fallback), false, env);
        }
        return 0.0;
    };

    if handler.uses_timeout() && record.sim_target_position.is_none() {
        let remaining = record.sim_state_timer;
        record.sim_state_timer -= dt;
        if record.sim_state_timer <= 0.0 {
            record.sim_state_timer = 0.0;
            // Timer уже был на нуле: остаток не отдаём, иначе catch-up не продвинется
            let unused = if remaining > 0.0 { (dt - remaining).max(0.0) } else { 0.0 };
            let fallback = handler.timeout_fallback(&deps.catalog.mapping);
            crate::logger::log(&format!(
                "⏱️ npc {} timed out in {} → {}",
                record.id, record.current_state, fallback
            ));
            apply_transition(deps, record, BasicTransition::to(fallback), true, env);
            return unused;
        }
    }

    let pending = with_context(deps, record, env, |record, ctx| handler.simulate_tick(record, ctx, dt));
    if let Some(transition) = pending {
        apply_transition(deps, record, transition, true, env);
    }
    0.0
}

fn validate(deps: &BasicDeps, record: &IdentityRecord) -> ContinuityResult<()> {
    if record.is_active {
        return Err(record.inconsistent("scheduler owns an active record"));
    }
    if !record.current_state.is_basic() {
        return Err(record.inconsistent("scheduler record is not in a Basic state"));
    }
    if record.current_state.is_basic_path_following() && !record.sim_is_following_path {
        return Err(record.inconsistent("path-following without path progress"));
    }
    record.validate(&deps.catalog.paths)
}

/// Безопасное состояние после нарушенного инварианта
fn recover(deps: &BasicDeps, record: &mut IdentityRecord, env: &mut TickEnv) {
    let mapping = &deps.catalog.mapping;
    record.is_active = false;
    record.clear_path_progress();
    record.clear_sim_motion();
    if !record.world_position.is_finite() {
        record.world_position = record.home_position;
    }

    let target = match mapping.basic_for(record.current_state) {
        Some(state) if !record.current_state.is_basic() && !state.is_basic_path_following() => state,
        _ => mapping.default_basic(),
    };
    apply_transition(deps, record, BasicTransition::to(target), false, env);
}

fn with_context<F>(deps: &BasicDeps, record: &mut IdentityRecord, env: &mut TickEnv, callback: F) -> Option<BasicTransition>
where
    F: FnOnce(&mut IdentityRecord, &mut BasicContext),
{
    let mut ctx = BasicContext::new(
        record.id,
        &deps.catalog,
        &deps.config,
        &mut *env.rng,
        &mut *env.errors,
        env.time_of_day,
    );
    callback(record, &mut ctx);
    ctx.take_pending()
}

/// Результат подготовки path при входе в path-following состояние
enum Staged {
    Following,
    /// Zero-length path: в направлении движения идти некуда
    AlreadyComplete,
}

fn stage_path(deps: &BasicDeps, record: &mut IdentityRecord, staging: Option<&PathStaging>) -> ContinuityResult<Staged> {
    let continuity = deps.catalog.continuity(deps.config.arrival_threshold);

    match staging {
        Some(PathStaging::Fresh(start)) => {
            let path = deps.catalog.paths.get(&start.path_id)?;
            let cursor = continuity.start_fresh(path, record.world_position, start.start_index, start.reverse)?;
            record.set_path_progress(PathProgress {
                path_id: start.path_id.clone(),
                waypoint_index: cursor.moving_toward().unwrap_or(start.start_index),
                reverse: start.reverse,
            });
            if cursor.is_complete() {
                Ok(Staged::AlreadyComplete)
            } else {
                Ok(Staged::Following)
            }
        }
        Some(PathStaging::Resume(start)) => {
            let path = deps.catalog.paths.get(&start.path_id)?;
            continuity.resume(path, start.start_index, start.reverse)?;
            record.set_path_progress(PathProgress {
                path_id: start.path_id.clone(),
                waypoint_index: start.start_index,
                reverse: start.reverse,
            });
            Ok(Staged::Following)
        }
        None if record.sim_is_following_path => {
            record.validate(&deps.catalog.paths)?;
            Ok(Staged::Following)
        }
        None => Err(record.inconsistent("entered path-following without a staged path")),
    }
}

/// exit → swap → enter с цепочкой переходов из on_enter (не больше max_transition_chain)
///
/// `exit_current == false`: текущий handler не входился (record только что принят
/// или состояние невалидно), его `on_exit` не вызывается.
pub(crate) fn apply_transition(
    deps: &BasicDeps,
    record: &mut IdentityRecord,
    transition: BasicTransition,
    exit_current: bool,
    env: &mut TickEnv,
) {
    let mapping = &deps.catalog.mapping;
    let limit = deps.config.max_transition_chain;
    let mut next = transition;
    let mut exit_current = exit_current;
    let mut hops = 0;

    loop {
        hops += 1;

        if exit_current {
            if let Some(old) = deps.handlers.get(record.current_state).cloned() {
                if let Some(ignored) = with_context(deps, record, env, |record, ctx| old.on_exit(record, ctx)) {
                    crate::logger::log_warning(&format!(
                        "npc {}: basic transition to {} requested from on_exit ignored",
                        record.id, ignored.target
                    ));
                }
            }
        }

        if hops > limit {
            let error = ContinuityError::TransitionLoop {
                npc: record.id,
                limit,
                last: next.target,
            };
            env.errors.report(Some(record.id), &error);
            // Парковка: default без on_enter (он мог бы снова начать цепочку),
            // но с полным timer'ом, чтобы timeout не увёл агента сразу же
            record.clear_path_progress();
            record.clear_sim_motion();
            record.current_state = mapping.default_basic();
            if let Some(parked) = deps.handlers.get(record.current_state) {
                if parked.uses_timeout() {
                    record.sim_state_timer = parked.timeout_duration(&deps.config);
                }
            }
            return;
        }

        let mut target = next.target;
        if !target.is_basic() {
            target = match mapping.basic_or_default(target) {
                Ok(state) => state,
                Err(failure) => failure.report(env.errors, Some(record.id)),
            };
        }
        if !deps.handlers.contains(target) {
            env.errors.report(Some(record.id), &ContinuityError::MissingHandler(target));
            target = mapping.default_basic();
        }

        record.clear_sim_motion();
        record.current_state = target;

        if target.is_basic_path_following() {
            match stage_path(deps, record, next.path.as_ref()) {
                Ok(Staged::Following) => {}
                Ok(Staged::AlreadyComplete) => {
                    // Handler path'а не входился: сразу end policy
                    let pending = with_context(deps, record, env, |record, ctx| ctx.finish_path(record));
                    record.clear_path_progress();
                    match pending {
                        Some(transition) => {
                            next = transition;
                            exit_current = false;
                            continue;
                        }
                        None => {
                            target = mapping.default_basic();
                            record.current_state = target;
                        }
                    }
                }
                Err(error) => {
                    env.errors.report(Some(record.id), &error);
                    record.clear_path_progress();
                    target = mapping.default_basic();
                    record.current_state = target;
                }
            }
        } else {
            record.clear_path_progress();
        }

        let Some(handler) = deps.handlers.get(target).cloned() else {
            return;
        };
        if handler.uses_timeout() {
            record.sim_state_timer = handler.timeout_duration(&deps.config);
        }

        match with_context(deps, record, env, |record, ctx| handler.on_enter(record, ctx)) {
            Some(transition) => {
                next = transition;
                exit_current = true;
            }
            None => return,
        }
    }
}

//! NpcWorld — оркестратор двух tiers
//!
//! Владеет BasicScheduler'ом (неактивные records) и картой live ActiveController'ов
//! (каждый владеет своим record'ом). Record существует ровно в одном месте;
//! promotion/demotion: это move между двумя коллекциями.
//!
//! Порядок step: clock → (rollover → begin_day) → Active pass (по id) → Basic pass.

use bevy::prelude::*;
use rand::RngCore;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::active::{
    ActiveController, ActiveDeps, ActiveHandlerRegistry, AnimationCapability, ClipTracker, KinematicMovement,
    MovementCapability,
};
use crate::basic::{BasicDeps, BasicHandlerRegistry, BasicScheduler};
use crate::behaviors::{standard_active_handlers, standard_basic_handlers};
use crate::config::ContinuityConfig;
use crate::error::{ContinuityError, ContinuityResult, ErrorLedger};
use crate::record::{DayStartBehavior, IdentityRecord, IdentitySnapshot, NpcId};
use crate::world::{TickEnv, WorldCatalog, WorldClock};

/// Источник movement/animation capabilities для только что promoted агентов
pub trait CapabilityFactory: Send + Sync {
    fn create(
        &self,
        record: &IdentityRecord,
        config: &ContinuityConfig,
    ) -> (Box<dyn MovementCapability>, Box<dyn AnimationCapability>);
}

/// Headless factory: KinematicMovement + ClipTracker
#[derive(Debug, Clone)]
pub struct KinematicFactory {
    /// Скорость Active ходьбы (m/s)
    pub speed: f32,
}

impl Default for KinematicFactory {
    fn default() -> Self {
        Self { speed: 1.4 }
    }
}

impl CapabilityFactory for KinematicFactory {
    fn create(
        &self,
        _record: &IdentityRecord,
        config: &ContinuityConfig,
    ) -> (Box<dyn MovementCapability>, Box<dyn AnimationCapability>) {
        (
            Box::new(KinematicMovement::new(self.speed, config.arrival_threshold)),
            Box::new(ClipTracker::default()),
        )
    }
}

/// Итог одного прохода observation tiering
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ObservationReport {
    pub promoted: Vec<NpcId>,
    pub demoted: Vec<NpcId>,
}

#[derive(Resource)]
pub struct NpcWorld {
    active_deps: ActiveDeps,
    scheduler: BasicScheduler,
    active: BTreeMap<NpcId, ActiveController>,
    clock: WorldClock,
    errors: ErrorLedger,
}

impl NpcWorld {
    /// Собрать мир из injected зависимостей (registries валидируются против mapping)
    pub fn new(
        catalog: WorldCatalog,
        config: ContinuityConfig,
        active_handlers: ActiveHandlerRegistry,
        basic_handlers: BasicHandlerRegistry,
    ) -> ContinuityResult<Self> {
        let config = config.validated()?;
        catalog.validate()?;
        active_handlers.validate(&catalog.mapping)?;
        basic_handlers.validate(&catalog.mapping)?;

        let catalog = Arc::new(catalog);
        let config = Arc::new(config);
        let clock = WorldClock::new(config.start_hour, config.day_length_secs);

        crate::logger::log_info(&format!(
            "🌍 NpcWorld: {} paths, {} active handlers, {} basic handlers, {:?}",
            catalog.paths.len(),
            active_handlers.len(),
            basic_handlers.len(),
            config.scheduling
        ));

        Ok(Self {
            active_deps: ActiveDeps {
                catalog: Arc::clone(&catalog),
                handlers: Arc::new(active_handlers),
                config: Arc::clone(&config),
            },
            scheduler: BasicScheduler::new(BasicDeps {
                catalog,
                handlers: Arc::new(basic_handlers),
                config,
            }),
            active: BTreeMap::new(),
            clock,
            errors: ErrorLedger::default(),
        })
    }

    /// Мир со встроенными поведениями
    pub fn with_standard_behaviors(catalog: WorldCatalog, config: ContinuityConfig) -> ContinuityResult<Self> {
        Self::new(catalog, config, standard_active_handlers(), standard_basic_handlers())
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn config(&self) -> &ContinuityConfig {
        &self.active_deps.config
    }

    pub fn catalog(&self) -> &WorldCatalog {
        &self.active_deps.catalog
    }

    pub fn clock(&self) -> &WorldClock {
        &self.clock
    }

    pub fn errors(&self) -> &ErrorLedger {
        &self.errors
    }

    pub fn scheduler(&self) -> &BasicScheduler {
        &self.scheduler
    }

    pub fn controller(&self, id: NpcId) -> Option<&ActiveController> {
        self.active.get(&id)
    }

    pub fn controllers(&self) -> impl Iterator<Item = &ActiveController> {
        self.active.values()
    }

    pub fn is_active(&self, id: NpcId) -> bool {
        self.active.contains_key(&id)
    }

    pub fn contains(&self, id: NpcId) -> bool {
        self.active.contains_key(&id) || self.scheduler.contains(id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn inactive_count(&self) -> usize {
        self.scheduler.len()
    }

    pub fn len(&self) -> usize {
        self.active.len() + self.scheduler.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record агента на любом tier'е (Active: по состоянию на последний sync)
    pub fn record(&self, id: NpcId) -> Option<&IdentityRecord> {
        self.active
            .get(&id)
            .map(|controller| controller.record())
            .or_else(|| self.scheduler.get(id))
    }

    // ------------------------------------------------------------------------
    // Population
    // ------------------------------------------------------------------------

    /// Новый агент всегда стартует в Basic tier
    pub fn register(&mut self, record: IdentityRecord, rng: &mut dyn RngCore) -> ContinuityResult<()> {
        if self.active.contains_key(&record.id) {
            return Err(ContinuityError::DuplicateNpc(record.id));
        }
        let mut env = TickEnv::new(rng, &mut self.errors, self.clock.hour());
        self.scheduler.adopt(record, &mut env)
    }

    /// Убрать агента из мира; Active агент сначала проходит demote (on_exit + sync)
    pub fn remove(&mut self, id: NpcId, rng: &mut dyn RngCore) -> ContinuityResult<IdentityRecord> {
        let mut env = TickEnv::new(rng, &mut self.errors, self.clock.hour());
        match self.active.remove(&id) {
            Some(controller) => Ok(controller.demote(&mut env)),
            None => self.scheduler.release(id, &mut env),
        }
    }

    // ------------------------------------------------------------------------
    // Tier transitions
    // ------------------------------------------------------------------------

    /// Basic → Active. При отказе record остаётся в Basic tier.
    pub fn promote(
        &mut self,
        id: NpcId,
        movement: Box<dyn MovementCapability>,
        animation: Box<dyn AnimationCapability>,
        rng: &mut dyn RngCore,
    ) -> ContinuityResult<()> {
        if self.active.contains_key(&id) {
            return Err(ContinuityError::AlreadyActive(id));
        }

        let mut env = TickEnv::new(rng, &mut self.errors, self.clock.hour());
        let record = self.scheduler.release(id, &mut env)?;

        match ActiveController::promote(record, movement, animation, self.active_deps.clone(), &mut env) {
            Ok(controller) => {
                self.active.insert(id, controller);
                Ok(())
            }
            Err(rejected) => {
                let mut record = *rejected.record;
                record.is_active = false;
                if let Err(error) = self.scheduler.adopt(record, &mut env) {
                    env.errors.report(Some(id), &error);
                }
                Err(rejected.error)
            }
        }
    }

    /// Active → Basic
    pub fn demote(&mut self, id: NpcId, rng: &mut dyn RngCore) -> ContinuityResult<()> {
        let Some(controller) = self.active.remove(&id) else {
            return Err(if self.scheduler.contains(id) {
                ContinuityError::AlreadyInactive(id)
            } else {
                ContinuityError::UnknownNpc(id)
            });
        };

        let mut env = TickEnv::new(rng, &mut self.errors, self.clock.hour());
        let record = controller.demote(&mut env);
        self.scheduler.adopt(record, &mut env)
    }

    // ------------------------------------------------------------------------
    // Simulation
    // ------------------------------------------------------------------------

    /// Один world step: clock, затем оба tiers
    pub fn step(&mut self, dt: f32, rng: &mut dyn RngCore) {
        self.advance_clock(dt, rng);
        self.tick_tiers(dt, rng);
    }

    /// Продвинуть world clock; на rollover: `begin_day`. `true` если начался новый день.
    pub fn advance_clock(&mut self, dt: f32, rng: &mut dyn RngCore) -> bool {
        let rolled_over = self.clock.advance(dt);
        if rolled_over {
            self.begin_day(rng);
        }
        rolled_over
    }

    /// Active pass (в порядке id), затем Basic pass
    pub fn tick_tiers(&mut self, dt: f32, rng: &mut dyn RngCore) {
        if !(dt > 0.0) {
            return;
        }

        let mut env = TickEnv::new(rng, &mut self.errors, self.clock.hour());
        for controller in self.active.values_mut() {
            controller.tick(dt, &mut env);
        }
        self.scheduler.step(dt, &mut env);
    }

    /// Начало дня: каждый агент переходит в свой `day_start_behavior` на своём tier'е
    pub fn begin_day(&mut self, rng: &mut dyn RngCore) {
        crate::logger::log_info(&format!(
            "🌅 day {} begins ({} active, {} basic)",
            self.clock.day(),
            self.active.len(),
            self.scheduler.len()
        ));

        let mut env = TickEnv::new(rng, &mut self.errors, self.clock.hour());
        let fallback = self.active_deps.catalog.mapping.default_active();

        for controller in self.active.values_mut() {
            match controller.record().day_start_behavior.clone() {
                DayStartBehavior::State(state) => controller.transition_to(state, &mut env),
                DayStartBehavior::Path(start) => {
                    if let Err(error) = controller.follow_path(&start, &mut env) {
                        env.errors.report(Some(controller.id()), &error);
                        controller.transition_to(fallback, &mut env);
                    }
                }
            }
        }
        self.scheduler.begin_day(&mut env);
    }

    /// Promote тех, кто ближе `promote_radius` к любому observer'у; demote тех, кто дальше `demote_radius`
    pub fn update_observation(
        &mut self,
        observers: &[Vec3],
        factory: &dyn CapabilityFactory,
        rng: &mut dyn RngCore,
    ) -> ObservationReport {
        let config = Arc::clone(&self.active_deps.config);
        let nearest = |position: Vec3| -> f32 {
            observers
                .iter()
                .map(|observer| observer.distance(position))
                .fold(f32::INFINITY, f32::min)
        };

        let to_demote: Vec<NpcId> = self
            .active
            .values()
            .filter(|controller| nearest(controller.position()) > config.demote_radius)
            .map(|controller| controller.id())
            .collect();

        // Basic позиция может отставать на долг sim_clock: кандидаты берутся с запасом
        // на этот дрейф, а решение принимается по догнанной позиции
        let elapsed = self.scheduler.elapsed();
        let candidates: Vec<NpcId> = self
            .scheduler
            .iter()
            .filter(|record| {
                let owed = (elapsed - record.sim_clock).max(0.0) as f32;
                let drift = config.basic_walk_speed * owed + config.arrival_threshold;
                nearest(record.world_position) <= config.promote_radius + drift
            })
            .map(|record| record.id)
            .collect();

        let mut to_promote = Vec::with_capacity(candidates.len());
        {
            let mut env = TickEnv::new(&mut *rng, &mut self.errors, self.clock.hour());
            for id in candidates {
                if let Ok(record) = self.scheduler.settle(id, &mut env) {
                    if nearest(record.world_position) <= config.promote_radius {
                        to_promote.push(id);
                    }
                }
            }
        }

        let mut report = ObservationReport::default();

        for id in to_demote {
            match self.demote(id, rng) {
                Ok(()) => report.demoted.push(id),
                Err(error) => self.errors.report(Some(id), &error),
            }
        }

        for id in to_promote {
            let Some(record) = self.scheduler.get(id) else {
                continue;
            };
            let (movement, animation) = factory.create(record, &config);
            match self.promote(id, movement, animation, rng) {
                Ok(()) => report.promoted.push(id),
                Err(error) => self.errors.report(Some(id), &error),
            }
        }

        report
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Snapshot всех агентов (Basic долг гасится, Active pose синхронизируется), по id
    pub fn snapshot(&mut self, rng: &mut dyn RngCore) -> Vec<IdentitySnapshot> {
        let mut env = TickEnv::new(rng, &mut self.errors, self.clock.hour());
        self.scheduler.flush(&mut env);

        let mut snapshots: Vec<IdentitySnapshot> = self
            .active
            .values_mut()
            .map(|controller| {
                controller.sync_record();
                controller.record().to_snapshot()
            })
            .collect();
        snapshots.extend(self.scheduler.iter().map(IdentityRecord::to_snapshot));
        snapshots.sort_by_key(|snapshot| snapshot.id);
        snapshots
    }

    /// Заменить население снимками. Все агенты стартуют в Basic tier.
    ///
    /// Битые snapshots репортятся и пропускаются; возвращает число восстановленных.
    pub fn restore(&mut self, snapshots: Vec<IdentitySnapshot>, rng: &mut dyn RngCore) -> usize {
        // Live capabilities уничтожаются вместе с controllers; records из snapshots главнее
        self.active.clear();
        self.scheduler.drain();

        let mapping = &self.active_deps.catalog.mapping;
        let mut env = TickEnv::new(rng, &mut self.errors, self.clock.hour());
        let mut restored = 0;

        for snapshot in snapshots {
            let id = snapshot.id;
            let mut record = match IdentityRecord::from_snapshot(snapshot) {
                Ok(record) => record,
                Err(error) => {
                    env.errors.report(Some(id), &error);
                    continue;
                }
            };

            // Active snapshot → Basic эквивалент с сохранённым path progress
            if record.is_active || !record.current_state.is_basic() {
                let active_state = record.current_state;
                let basic = match mapping.basic_or_default(active_state) {
                    Ok(state) => state,
                    Err(failure) => failure.report(env.errors, Some(id)),
                };
                if !basic.is_basic_path_following() {
                    record.clear_path_progress();
                }
                record.last_active_state = Some(active_state);
                record.current_state = basic;
                record.is_active = false;
            }

            match self.scheduler.adopt(record, &mut env) {
                Ok(()) => restored += 1,
                Err(error) => env.errors.report(Some(id), &error),
            }
        }

        crate::logger::log_info(&format!("💾 restored {} npc records", restored));
        restored
    }
}

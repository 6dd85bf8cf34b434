//! Tests for BasicScheduler (batching, catch-up, timeout safeguard, path extrapolation).

#[cfg(test)]
mod tests {
    use crate::basic::*;
    use crate::behaviors::standard_basic_handlers;
    use crate::config::{ContinuityConfig, SchedulingStrategy};
    use crate::decision::DecisionResolver;
    use crate::behaviors::BasicIdle;
    use crate::error::{ContinuityError, ErrorKind, ErrorLedger};
    use crate::navigation::*;
    use crate::record::{DayStartBehavior, IdentityRecord, NpcId};
    use crate::state::*;
    use crate::world::{TickEnv, WorldCatalog};
    use bevy::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Суммирует полученный dt по каждому record'у
    #[derive(Default)]
    struct Accumulator {
        received: Mutex<HashMap<NpcId, f64>>,
        largest_dt: Mutex<f32>,
    }

    impl BasicStateHandler for Accumulator {
        fn name(&self) -> &'static str {
            "Accumulator"
        }

        fn simulate_tick(&self, record: &mut IdentityRecord, _ctx: &mut BasicContext, dt: f32) {
            *self.received.lock().unwrap().entry(record.id).or_insert(0.0) += dt as f64;
            let mut largest = self.largest_dt.lock().unwrap();
            *largest = largest.max(dt);
        }
    }

    /// Обёртка, чтобы тест держал ссылку на тот же handler, что и registry
    struct Shared(Arc<Accumulator>);

    impl BasicStateHandler for Shared {
        fn name(&self) -> &'static str {
            self.0.name()
        }

        fn simulate_tick(&self, record: &mut IdentityRecord, ctx: &mut BasicContext, dt: f32) {
            self.0.simulate_tick(record, ctx, dt)
        }
    }

    /// Из on_enter сразу просится в `next`: пара таких handler'ов зацикливается
    struct Bounce {
        next: BasicState,
    }

    impl BasicStateHandler for Bounce {
        fn name(&self) -> &'static str {
            "Bounce"
        }

        fn on_enter(&self, _record: &mut IdentityRecord, ctx: &mut BasicContext) {
            ctx.transition_to_basic(BasicTransition::to(self.next));
        }

        fn simulate_tick(&self, _record: &mut IdentityRecord, _ctx: &mut BasicContext, _dt: f32) {}
    }

    fn line_catalog() -> WorldCatalog {
        let waypoints = WaypointDirectory::new()
            .with("a", Vec3::new(0.0, 0.0, 0.0))
            .with("b", Vec3::new(10.0, 0.0, 0.0))
            .with("c", Vec3::new(20.0, 0.0, 0.0));
        let paths = PathLibrary::new().with(
            PathAsset::new(
                "line",
                vec!["a".into(), "b".into(), "c".into()],
                PathEndPolicy::Transition(GeneralState::Idle.into()),
            )
            .unwrap(),
        );
        WorldCatalog::new(waypoints, paths, DecisionResolver::new(), StateMappingRegistry::standard().unwrap()).unwrap()
    }

    fn scheduler_with(handlers: BasicHandlerRegistry, config: ContinuityConfig) -> BasicScheduler {
        BasicScheduler::new(BasicDeps {
            catalog: Arc::new(line_catalog()),
            handlers: Arc::new(handlers),
            config: Arc::new(config),
        })
    }

    fn basic_record(id: u64, state: impl Into<StateIdentity>) -> IdentityRecord {
        IdentityRecord::new(NpcId(id), Vec3::ZERO, Quat::IDENTITY, state.into())
    }

    fn run_budget(strategy: SchedulingStrategy, records: u64, budget: &[f32]) -> (Arc<Accumulator>, f64) {
        let accumulator = Arc::new(Accumulator::default());
        let handlers = BasicHandlerRegistry::new()
            .with(BasicState::Idle, Shared(Arc::clone(&accumulator)))
            .with(BasicState::FollowPath, Shared(Arc::clone(&accumulator)));
        let config = ContinuityConfig {
            scheduling: strategy,
            max_substep: 0.25,
            ..Default::default()
        };
        let mut scheduler = scheduler_with(handlers, config);

        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut errors = ErrorLedger::default();
        let mut env = TickEnv::new(&mut rng, &mut errors, 12.0);

        for id in 1..=records {
            scheduler.adopt(basic_record(id, BasicState::Idle), &mut env).unwrap();
        }
        for dt in budget {
            scheduler.step(*dt, &mut env);
        }
        scheduler.flush(&mut env);

        for record in scheduler.iter() {
            assert!((record.sim_clock - scheduler.elapsed()).abs() < 1e-9);
        }
        (accumulator, budget.iter().map(|dt| *dt as f64).sum())
    }

    #[test]
    fn test_no_starvation_round_robin() {
        let budget = [0.1, 0.7, 0.016, 1.3, 0.5, 0.25, 0.033, 2.0, 0.4, 0.9];
        let (accumulator, total) = run_budget(SchedulingStrategy::RoundRobin { batch_size: 3 }, 7, &budget);

        let received = accumulator.received.lock().unwrap();
        assert_eq!(received.len(), 7);
        for (id, dt) in received.iter() {
            assert!((dt - total).abs() < 1e-4, "npc {} received {} of {}", id, dt, total);
        }
        // Catch-up режется на sub-steps
        assert!(*accumulator.largest_dt.lock().unwrap() <= 0.25 + 1e-6);
    }

    #[test]
    fn test_no_starvation_all() {
        let budget = [0.5; 12];
        let (accumulator, total) = run_budget(SchedulingStrategy::All, 4, &budget);

        for dt in accumulator.received.lock().unwrap().values() {
            assert!((dt - total).abs() < 1e-4);
        }
    }

    #[test]
    fn test_round_robin_covers_every_record() {
        let config = ContinuityConfig {
            scheduling: SchedulingStrategy::RoundRobin { batch_size: 2 },
            ..Default::default()
        };
        let mut scheduler = scheduler_with(standard_basic_handlers(), config);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut errors = ErrorLedger::default();
        let mut env = TickEnv::new(&mut rng, &mut errors, 12.0);

        for id in 1..=5 {
            scheduler.adopt(basic_record(id, BasicState::Resting), &mut env).unwrap();
        }

        // 5 records / батч 2 → за 3 шага каждый получил тик
        for _ in 0..3 {
            scheduler.step(0.1, &mut env);
        }
        assert!(scheduler.iter().all(|record| record.sim_ticks >= 1));

        // Первый record получил второй батч (wrap-around), остальные: по одному
        assert_eq!(scheduler.get(NpcId(1)).unwrap().sim_ticks, 2);
        assert_eq!(scheduler.get(NpcId(4)).unwrap().sim_ticks, 1);
    }

    #[test]
    fn test_timeout_fires_exactly_at_zero() {
        let config = ContinuityConfig {
            scheduling: SchedulingStrategy::All,
            idle_timeout: 1.0,
            ..Default::default()
        };
        let mut scheduler = scheduler_with(standard_basic_handlers(), config);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut errors = ErrorLedger::default();
        let mut env = TickEnv::new(&mut rng, &mut errors, 12.0);

        scheduler.adopt(basic_record(1, BasicState::Idle), &mut env).unwrap();

        for step in 1..=3 {
            scheduler.step(0.25, &mut env);
            let record = scheduler.get(NpcId(1)).unwrap();
            assert_eq!(record.current_state, BasicState::Idle.into(), "step {}", step);
        }

        scheduler.step(0.25, &mut env);
        assert_eq!(scheduler.get(NpcId(1)).unwrap().current_state, BasicState::Wander.into());
    }

    #[test]
    fn test_timeout_mid_substep_hands_rest_to_fallback() {
        let accumulator = Arc::new(Accumulator::default());
        let handlers = BasicHandlerRegistry::new()
            .with(BasicState::Idle, BasicIdle)
            .with(BasicState::Wander, Shared(Arc::clone(&accumulator)));
        let config = ContinuityConfig {
            scheduling: SchedulingStrategy::All,
            idle_timeout: 1.1,
            max_substep: 0.5,
            ..Default::default()
        };
        let mut scheduler = scheduler_with(handlers, config);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut errors = ErrorLedger::default();
        let mut env = TickEnv::new(&mut rng, &mut errors, 12.0);

        scheduler.adopt(basic_record(1, BasicState::Idle), &mut env).unwrap();
        for _ in 0..6 {
            scheduler.step(0.5, &mut env);
        }

        // 3.0s всего: 1.1s в Idle, остальные 1.9s у Wander
        let record = scheduler.get(NpcId(1)).unwrap();
        assert_eq!(record.current_state, BasicState::Wander.into());
        let received = accumulator.received.lock().unwrap();
        assert!((received[&NpcId(1)] - 1.9).abs() < 1e-4, "wander received {}", received[&NpcId(1)]);
        assert!((record.sim_clock - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_transition_loop_parks_in_default() {
        let handlers = BasicHandlerRegistry::new()
            .with(BasicState::Idle, BasicIdle)
            .with(BasicState::Browsing, Bounce { next: BasicState::Working })
            .with(BasicState::Working, Bounce { next: BasicState::Browsing });
        let config = ContinuityConfig {
            scheduling: SchedulingStrategy::All,
            idle_timeout: 5.0,
            ..Default::default()
        };
        let mut scheduler = scheduler_with(handlers, config);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut errors = ErrorLedger::default();
        let mut env = TickEnv::new(&mut rng, &mut errors, 12.0);

        scheduler.adopt(basic_record(1, BasicState::Idle), &mut env).unwrap();
        scheduler
            .transition_record(NpcId(1), BasicTransition::to(BasicState::Browsing), &mut env)
            .unwrap();

        let record = scheduler.get(NpcId(1)).unwrap();
        assert_eq!(record.current_state, BasicState::Idle.into());
        assert_eq!(record.sim_state_timer, 5.0);
        assert_eq!(env.errors.count(ErrorKind::Transient), 1);

        // Парковка держится: следующий кадр агент всё ещё в Idle
        scheduler.step(1.0 / 60.0, &mut env);
        let record = scheduler.get(NpcId(1)).unwrap();
        assert_eq!(record.current_state, BasicState::Idle.into());
        assert!(record.sim_state_timer > 4.9);
    }

    #[test]
    fn test_timeout_frozen_while_target_is_set() {
        let config = ContinuityConfig {
            scheduling: SchedulingStrategy::All,
            idle_timeout: 2.0,
            ..Default::default()
        };
        let mut scheduler = scheduler_with(standard_basic_handlers(), config);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut errors = ErrorLedger::default();
        let mut env = TickEnv::new(&mut rng, &mut errors, 12.0);

        let mut record = basic_record(1, BasicState::Wander);
        record.sim_target_position = Some(Vec3::new(1000.0, 0.0, 0.0));
        scheduler.adopt(record, &mut env).unwrap();

        // 50 секунд ходьбы к далёкой цели: timer не тикает
        for _ in 0..100 {
            scheduler.step(0.5, &mut env);
        }

        let record = scheduler.get(NpcId(1)).unwrap();
        assert_eq!(record.current_state, BasicState::Wander.into());
        assert_eq!(record.sim_state_timer, 2.0);
        assert!(record.sim_target_position.is_some());
        assert!((record.world_position.x - 70.0).abs() < 1e-2);
    }

    #[test]
    fn test_adopt_and_release_guards() {
        let mut scheduler = scheduler_with(standard_basic_handlers(), ContinuityConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut errors = ErrorLedger::default();
        let mut env = TickEnv::new(&mut rng, &mut errors, 12.0);

        let mut active = basic_record(1, BasicState::Idle);
        active.is_active = true;
        assert_eq!(scheduler.adopt(active, &mut env), Err(ContinuityError::AlreadyActive(NpcId(1))));

        scheduler.adopt(basic_record(2, BasicState::Idle), &mut env).unwrap();
        assert_eq!(
            scheduler.adopt(basic_record(2, BasicState::Idle), &mut env),
            Err(ContinuityError::DuplicateNpc(NpcId(2)))
        );

        assert!(matches!(
            scheduler.release(NpcId(99), &mut env),
            Err(ContinuityError::UnknownNpc(NpcId(99)))
        ));
        assert_eq!(scheduler.release(NpcId(2), &mut env).unwrap().id, NpcId(2));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_release_settles_owed_time() {
        let accumulator = Arc::new(Accumulator::default());
        let handlers = BasicHandlerRegistry::new()
            .with(BasicState::Idle, Shared(Arc::clone(&accumulator)))
            .with(BasicState::FollowPath, Shared(Arc::clone(&accumulator)));
        let config = ContinuityConfig {
            scheduling: SchedulingStrategy::RoundRobin { batch_size: 1 },
            ..Default::default()
        };
        let mut scheduler = scheduler_with(handlers, config);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut errors = ErrorLedger::default();
        let mut env = TickEnv::new(&mut rng, &mut errors, 12.0);

        for id in 1..=3 {
            scheduler.adopt(basic_record(id, BasicState::Idle), &mut env).unwrap();
        }
        scheduler.step(1.0, &mut env);

        // Record 3 ещё не тикался, но release отдаёт его с погашенным долгом
        let record = scheduler.release(NpcId(3), &mut env).unwrap();
        assert_eq!(record.sim_clock, 1.0);
        let received = accumulator.received.lock().unwrap();
        assert!((received[&NpcId(3)] - 1.0).abs() < 1e-6);
        assert!(!received.contains_key(&NpcId(2)));
    }

    #[test]
    fn test_registered_path_agent_walks_to_end_policy() {
        let config = ContinuityConfig {
            scheduling: SchedulingStrategy::All,
            ..Default::default()
        };
        let mut scheduler = scheduler_with(standard_basic_handlers(), config);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut errors = ErrorLedger::default();
        let mut env = TickEnv::new(&mut rng, &mut errors, 12.0);

        let record = basic_record(1, PathState::FollowPath)
            .with_day_start(DayStartBehavior::Path(PathStart::new("line", 0, false)));
        scheduler.adopt(record, &mut env).unwrap();

        let record = scheduler.get(NpcId(1)).unwrap();
        assert_eq!(record.current_state, BasicState::FollowPath.into());
        assert_eq!(record.sim_waypoint_index, 1);

        // 7 секунд × 1.4 m/s ≈ 9.8 м: ещё идём к B
        for _ in 0..14 {
            scheduler.step(0.5, &mut env);
        }
        let record = scheduler.get(NpcId(1)).unwrap();
        assert_eq!(record.sim_waypoint_index, 1);
        assert!(record.world_position.x > 9.0 && record.world_position.x < 10.0);

        // Ещё 10 секунд: B пройден, C достигнут, end policy → General.Idle → Basic.Idle
        for _ in 0..20 {
            scheduler.step(0.5, &mut env);
        }
        let record = scheduler.get(NpcId(1)).unwrap();
        assert_eq!(record.current_state, BasicState::Idle.into());
        assert_eq!(record.world_position, Vec3::new(20.0, 0.0, 0.0));
        assert!(!record.sim_is_following_path);
        assert_eq!(env.errors.total(), 0);
    }

    #[test]
    fn test_inconsistent_record_is_recovered() {
        let mut scheduler = scheduler_with(standard_basic_handlers(), ContinuityConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut errors = ErrorLedger::default();
        let mut env = TickEnv::new(&mut rng, &mut errors, 12.0);

        // Following flag без path id
        let mut record = basic_record(1, BasicState::FollowPath);
        record.sim_is_following_path = true;
        scheduler.adopt(record, &mut env).unwrap();

        let record = scheduler.get(NpcId(1)).unwrap();
        assert_eq!(record.current_state, BasicState::Idle.into());
        assert!(!record.sim_is_following_path);
        assert!(env.errors.total() >= 1);
    }
}

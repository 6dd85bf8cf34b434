//! Tests for NpcWorld (population, tiering, day start, snapshots).

#[cfg(test)]
mod tests {
    use crate::active::{ClipTracker, KinematicMovement};
    use crate::config::{ContinuityConfig, SchedulingStrategy};
    use crate::error::ContinuityError;
    use crate::navigation::PathStart;
    use crate::record::{DayStartBehavior, IdentityRecord, IdentitySnapshot, NpcId};
    use crate::state::*;
    use crate::world::*;
    use bevy::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn world_with(config: ContinuityConfig) -> NpcWorld {
        NpcWorld::with_standard_behaviors(demo_catalog().unwrap(), config).unwrap()
    }

    fn resting_at(id: u64, position: Vec3) -> IdentityRecord {
        IdentityRecord::new(NpcId(id), position, Quat::IDENTITY, GeneralState::Resting.into())
    }

    fn walker(id: u64, position: Vec3) -> IdentityRecord {
        IdentityRecord::new(NpcId(id), position, Quat::IDENTITY, PathState::FollowPath.into())
            .with_day_start(DayStartBehavior::Path(PathStart::new("street", 0, false)))
    }

    fn promote(world: &mut NpcWorld, id: NpcId, rng: &mut ChaCha8Rng) -> Result<(), ContinuityError> {
        world.promote(
            id,
            Box::new(KinematicMovement::new(1.4, 0.1)),
            Box::new(ClipTracker::default()),
            rng,
        )
    }

    #[test]
    fn test_record_lives_in_exactly_one_tier() {
        let mut world = world_with(ContinuityConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        world.register(resting_at(1, Vec3::ZERO), &mut rng).unwrap();
        world.register(resting_at(2, Vec3::X), &mut rng).unwrap();
        assert_eq!(world.len(), 2);
        assert_eq!(world.inactive_count(), 2);
        assert_eq!(world.record(NpcId(1)).unwrap().current_state, BasicState::Resting.into());

        promote(&mut world, NpcId(1), &mut rng).unwrap();
        assert!(world.is_active(NpcId(1)));
        assert!(!world.scheduler().contains(NpcId(1)));
        assert_eq!(world.active_count(), 1);
        assert_eq!(world.len(), 2);
        assert!(world.record(NpcId(1)).unwrap().is_active);

        world.demote(NpcId(1), &mut rng).unwrap();
        assert!(!world.is_active(NpcId(1)));
        assert!(world.scheduler().contains(NpcId(1)));
        assert_eq!(world.len(), 2);
        assert_eq!(world.errors().total(), 0);
    }

    #[test]
    fn test_tier_move_guards() {
        let mut world = world_with(ContinuityConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        world.register(resting_at(1, Vec3::ZERO), &mut rng).unwrap();
        assert_eq!(
            world.register(resting_at(1, Vec3::ZERO), &mut rng),
            Err(ContinuityError::DuplicateNpc(NpcId(1)))
        );

        promote(&mut world, NpcId(1), &mut rng).unwrap();
        assert_eq!(promote(&mut world, NpcId(1), &mut rng), Err(ContinuityError::AlreadyActive(NpcId(1))));
        assert_eq!(
            world.register(resting_at(1, Vec3::ZERO), &mut rng),
            Err(ContinuityError::DuplicateNpc(NpcId(1)))
        );

        world.demote(NpcId(1), &mut rng).unwrap();
        assert_eq!(world.demote(NpcId(1), &mut rng), Err(ContinuityError::AlreadyInactive(NpcId(1))));
        assert_eq!(world.demote(NpcId(9), &mut rng), Err(ContinuityError::UnknownNpc(NpcId(9))));
        assert_eq!(promote(&mut world, NpcId(9), &mut rng), Err(ContinuityError::UnknownNpc(NpcId(9))));
        assert_eq!(world.len(), 1);
    }

    #[test]
    fn test_remove_active_agent_runs_demotion() {
        let mut world = world_with(ContinuityConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        world.register(resting_at(1, Vec3::new(2.0, 0.0, 3.0)), &mut rng).unwrap();
        promote(&mut world, NpcId(1), &mut rng).unwrap();

        let record = world.remove(NpcId(1), &mut rng).unwrap();
        assert!(!record.is_active);
        assert_eq!(record.current_state, BasicState::Resting.into());
        assert_eq!(record.world_position, Vec3::new(2.0, 0.0, 3.0));
        assert!(world.is_empty());
        assert!(matches!(world.remove(NpcId(1), &mut rng), Err(ContinuityError::UnknownNpc(_))));
    }

    #[test]
    fn test_observation_hysteresis() {
        let config = ContinuityConfig {
            promote_radius: 10.0,
            demote_radius: 15.0,
            ..Default::default()
        };
        let mut world = world_with(config);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let factory = KinematicFactory::default();

        world.register(resting_at(1, Vec3::new(5.0, 0.0, 0.0)), &mut rng).unwrap();
        world.register(resting_at(2, Vec3::new(12.0, 0.0, 0.0)), &mut rng).unwrap();
        world.register(resting_at(3, Vec3::new(40.0, 0.0, 0.0)), &mut rng).unwrap();

        let report = world.update_observation(&[Vec3::ZERO], &factory, &mut rng);
        assert_eq!(report.promoted, vec![NpcId(1)]);
        assert!(report.demoted.is_empty());

        // 12м: дальше promote, ближе demote: агент 1 остаётся Active
        let report = world.update_observation(&[Vec3::new(-7.0, 0.0, 0.0)], &factory, &mut rng);
        assert_eq!(report, ObservationReport::default());
        assert!(world.is_active(NpcId(1)));

        // Два observer'а: считается ближайший
        let observers = [Vec3::new(-12.0, 0.0, 0.0), Vec3::new(38.0, 0.0, 0.0)];
        let report = world.update_observation(&observers, &factory, &mut rng);
        assert_eq!(report.demoted, vec![NpcId(1)]);
        assert_eq!(report.promoted, vec![NpcId(3)]);

        // Без observers все уходят в Basic
        let report = world.update_observation(&[], &factory, &mut rng);
        assert_eq!(report.demoted, vec![NpcId(3)]);
        assert_eq!(world.active_count(), 0);
        assert_eq!(world.errors().total(), 0);
    }

    /// 10 спящих + walker #11, батч 1: за 10 шагов walker ни разу не тикался
    fn lagging_walker_world() -> (NpcWorld, ChaCha8Rng) {
        let config = ContinuityConfig {
            scheduling: SchedulingStrategy::RoundRobin { batch_size: 1 },
            promote_radius: 3.0,
            demote_radius: 5.0,
            ..Default::default()
        };
        let mut world = world_with(config);
        let mut rng = ChaCha8Rng::seed_from_u64(6);

        for id in 1..=10 {
            world.register(resting_at(id, Vec3::new(100.0, 0.0, 100.0)), &mut rng).unwrap();
        }
        world.register(walker(11, Vec3::new(-20.0, 0.0, 0.0)), &mut rng).unwrap();
        for _ in 0..10 {
            world.step(1.0, &mut rng);
        }
        assert_eq!(world.scheduler().get(NpcId(11)).unwrap().sim_ticks, 0);
        (world, rng)
    }

    #[test]
    fn test_observation_uses_caught_up_position() {
        let factory = KinematicFactory::default();

        // Устаревшая позиция рядом с observer'ом, реальная: 14м дальше по улице
        let (mut world, mut rng) = lagging_walker_world();
        let report = world.update_observation(&[Vec3::new(-20.0, 0.0, 0.0)], &factory, &mut rng);
        assert!(report.promoted.is_empty());
        let x = world.record(NpcId(11)).unwrap().world_position.x;
        assert!((x + 6.0).abs() < 0.1, "walker at {}", x);

        // Observer там, где walker на самом деле
        let (mut world, mut rng) = lagging_walker_world();
        let report = world.update_observation(&[Vec3::new(-6.0, 0.0, 0.0)], &factory, &mut rng);
        assert_eq!(report.promoted, vec![NpcId(11)]);
        assert!((world.controller(NpcId(11)).unwrap().position().x + 6.0).abs() < 0.1);
        assert_eq!(world.errors().total(), 0);
    }

    #[test]
    fn test_path_progress_survives_world_promotion() {
        let config = ContinuityConfig {
            scheduling: SchedulingStrategy::All,
            ..Default::default()
        };
        let mut world = world_with(config);
        let mut rng = ChaCha8Rng::seed_from_u64(4);

        world.register(walker(1, Vec3::new(-20.0, 0.0, 0.0)), &mut rng).unwrap();
        // 5s × 1.4 m/s в Basic tier
        for _ in 0..10 {
            world.step(0.5, &mut rng);
        }
        let before = world.record(NpcId(1)).unwrap().clone();
        assert_eq!(before.current_state, BasicState::FollowPath.into());
        assert_eq!(before.sim_waypoint_index, 1);
        assert!((before.world_position.x + 13.0).abs() < 1e-3);

        promote(&mut world, NpcId(1), &mut rng).unwrap();
        let controller = world.controller(NpcId(1)).unwrap();
        assert_eq!(controller.current_state(), PathState::FollowPath.into());
        assert_eq!(controller.position(), before.world_position);
        assert_eq!(controller.path_cursor().and_then(|cursor| cursor.moving_toward()), Some(1));
        // Прямо к street_mid, без возврата к street_west
        assert_eq!(controller.movement().destination(), Some(Vec3::ZERO));

        for _ in 0..30 {
            world.step(0.1, &mut rng);
        }
        world.demote(NpcId(1), &mut rng).unwrap();

        let after = world.record(NpcId(1)).unwrap();
        assert_eq!(after.current_state, BasicState::FollowPath.into());
        assert_eq!(after.last_active_state, Some(PathState::FollowPath.into()));
        assert_eq!(after.sim_waypoint_index, 1);
        assert!(after.world_position.x > before.world_position.x);
        assert_eq!(world.errors().total(), 0);
    }

    #[test]
    fn test_day_rollover_applies_day_start_on_both_tiers() {
        let config = ContinuityConfig {
            day_length_secs: 10.0,
            ..Default::default()
        };
        let mut world = world_with(config);
        let mut rng = ChaCha8Rng::seed_from_u64(2);

        // Active агент у начала улицы, Basic агент дома
        let active = resting_at(1, Vec3::new(-20.0, 0.0, 0.0))
            .with_day_start(DayStartBehavior::Path(PathStart::new("street", 0, false)));
        let basic = resting_at(2, Vec3::new(5.0, 0.0, 5.0))
            .with_day_start(DayStartBehavior::State(GeneralState::Wander.into()));
        world.register(active, &mut rng).unwrap();
        world.register(basic, &mut rng).unwrap();
        promote(&mut world, NpcId(1), &mut rng).unwrap();

        for _ in 0..19 {
            world.step(0.5, &mut rng);
        }
        assert_eq!(world.clock().day(), 0);
        assert_eq!(world.controller(NpcId(1)).unwrap().current_state(), GeneralState::Resting.into());

        world.step(0.5, &mut rng);
        assert_eq!(world.clock().day(), 1);
        assert!((world.clock().hour() - 8.0).abs() < 1e-3);

        let controller = world.controller(NpcId(1)).unwrap();
        assert_eq!(controller.current_state(), PathState::FollowPath.into());
        assert_eq!(controller.path_cursor().and_then(|cursor| cursor.moving_toward()), Some(1));
        assert_eq!(world.record(NpcId(2)).unwrap().current_state, BasicState::Wander.into());
        assert_eq!(world.errors().total(), 0);
    }

    #[test]
    fn test_snapshot_restore_keeps_population() {
        let config = ContinuityConfig {
            promote_radius: 12.0,
            demote_radius: 16.0,
            ..Default::default()
        };
        let mut world = world_with(config.clone());
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for record in demo_population(8) {
            world.register(record, &mut rng).unwrap();
        }
        world.update_observation(&[Vec3::new(-4.0, 0.0, -4.0)], &KinematicFactory::default(), &mut rng);
        assert!(world.active_count() > 0);

        for _ in 0..120 {
            world.step(0.1, &mut rng);
        }

        let snapshots = world.snapshot(&mut rng);
        assert_eq!(snapshots.len(), 8);
        assert!(snapshots.windows(2).all(|pair| pair[0].id < pair[1].id));

        // Через RON (формат сохранения хоста)
        let text = ron::to_string(&snapshots).unwrap();
        let loaded: Vec<IdentitySnapshot> = ron::from_str(&text).unwrap();
        assert_eq!(loaded, snapshots);

        let mut restored = world_with(config);
        assert_eq!(restored.restore(loaded, &mut rng), 8);
        assert_eq!(restored.active_count(), 0);
        assert_eq!(restored.inactive_count(), 8);

        for snapshot in &snapshots {
            let record = restored.record(snapshot.id).unwrap();
            assert!(!record.is_active);
            assert!(record.current_state.is_basic());
            assert_eq!(record.world_position.to_array(), snapshot.world_position);
            if snapshot.is_active {
                assert_eq!(record.last_active_state, Some(snapshot.current_state));
            }
        }
        assert_eq!(restored.errors().total(), 0);
    }

    #[test]
    fn test_restore_skips_broken_snapshot() {
        let mut world = world_with(ContinuityConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        world.register(resting_at(5, Vec3::ZERO), &mut rng).unwrap();

        let good = resting_at(1, Vec3::ZERO).to_snapshot();
        let mut broken = resting_at(2, Vec3::ZERO).to_snapshot();
        broken.sim_is_following_path = true;

        assert_eq!(world.restore(vec![good, broken], &mut rng), 1);
        // Старое население заменено
        assert!(!world.contains(NpcId(5)));
        assert!(world.contains(NpcId(1)));
        assert!(!world.contains(NpcId(2)));
        assert_eq!(world.errors().total(), 1);
    }
}

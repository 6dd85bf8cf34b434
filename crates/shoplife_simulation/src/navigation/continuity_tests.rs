//! Tests for path continuity (fresh start / resume / advance).

#[cfg(test)]
mod tests {
    use crate::error::ContinuityError;
    use crate::navigation::*;
    use crate::state::GeneralState;
    use bevy::prelude::*;
    use std::sync::Arc;

    const THRESHOLD: f32 = 0.1;

    fn abc() -> (WaypointDirectory, Arc<PathAsset>) {
        let waypoints = WaypointDirectory::new()
            .with("a", Vec3::new(0.0, 0.0, 0.0))
            .with("b", Vec3::new(10.0, 0.0, 0.0))
            .with("c", Vec3::new(10.0, 0.0, 10.0));
        let path = PathAsset::new(
            "abc",
            vec!["a".into(), "b".into(), "c".into()],
            PathEndPolicy::Transition(GeneralState::Idle.into()),
        )
        .unwrap();
        (waypoints, Arc::new(path))
    }

    #[test]
    fn test_path_requires_two_waypoints() {
        let result = PathAsset::new("short", vec!["a".into()], PathEndPolicy::Transition(GeneralState::Idle.into()));
        assert!(matches!(result, Err(ContinuityError::InvalidPath { .. })));
    }

    #[test]
    fn test_start_fresh_targets_next_index_after_approach() {
        let (waypoints, path) = abc();
        let helper = PathContinuity::new(&waypoints, THRESHOLD);

        let cursor = helper
            .start_fresh(&path, Vec3::new(-5.0, 0.0, 0.0), 0, false)
            .unwrap();

        // Сначала approach к start waypoint (index 0), потом к index 1
        assert!(cursor.needs_approach());
        assert_eq!(cursor.moving_toward(), Some(0));

        let mut cursor = cursor;
        assert!(!cursor.mark_arrived());
        assert_eq!(cursor.moving_toward(), Some(1));
    }

    #[test]
    fn test_start_fresh_skips_approach_when_standing_on_start() {
        let (waypoints, path) = abc();
        let helper = PathContinuity::new(&waypoints, THRESHOLD);

        let cursor = helper.start_fresh(&path, Vec3::new(10.0, 0.0, 10.0), 2, true).unwrap();
        assert!(!cursor.needs_approach());
        assert_eq!(cursor.moving_toward(), Some(1));
    }

    #[test]
    fn test_start_fresh_at_end_is_complete() {
        let (waypoints, path) = abc();
        let helper = PathContinuity::new(&waypoints, THRESHOLD);

        // start = последний waypoint, forward → дальше некуда
        let cursor = helper.start_fresh(&path, Vec3::ZERO, 2, false).unwrap();
        assert!(cursor.is_complete());
        assert_eq!(cursor.moving_toward(), None);

        let cursor = helper.start_fresh(&path, Vec3::ZERO, 0, true).unwrap();
        assert!(cursor.is_complete());
    }

    #[test]
    fn test_resume_goes_straight_to_target() {
        let (waypoints, path) = abc();
        let helper = PathContinuity::new(&waypoints, THRESHOLD);

        // Демотировали на полпути B → C
        let mut cursor = helper.resume(&path, 2, false).unwrap();
        assert!(!cursor.needs_approach());
        assert_eq!(cursor.moving_toward(), Some(2));

        let step = helper
            .advance(&mut cursor, Vec3::new(10.0, 0.0, 4.0), 1.0, 1.0)
            .unwrap();

        // Двигаемся к C (+Z), не возвращаемся к A/B
        assert!((step.position - Vec3::new(10.0, 0.0, 5.0)).length() < 1e-5);
        assert!(!step.arrived);
        assert_eq!(cursor.moving_toward(), Some(2));
    }

    #[test]
    fn test_resume_out_of_range_rejected() {
        let (waypoints, path) = abc();
        let helper = PathContinuity::new(&waypoints, THRESHOLD);

        let result = helper.resume(&path, 3, false);
        assert_eq!(
            result.unwrap_err(),
            ContinuityError::WaypointOutOfRange {
                path: "abc".into(),
                index: 3,
                count: 3
            }
        );
    }

    #[test]
    fn test_advance_carries_budget_across_waypoints() {
        let (waypoints, path) = abc();
        let helper = PathContinuity::new(&waypoints, THRESHOLD);
        let mut cursor = helper.resume(&path, 1, false).unwrap();

        // A → B = 10m, B → C = 10m; бюджет 15m
        let step = helper.advance(&mut cursor, Vec3::ZERO, 5.0, 3.0).unwrap();

        assert!(step.arrived);
        assert!(!step.finished);
        assert!((step.position - Vec3::new(10.0, 0.0, 5.0)).length() < 1e-4);
        assert_eq!(cursor.moving_toward(), Some(2));
    }

    #[test]
    fn test_advance_reports_terminal() {
        let (waypoints, path) = abc();
        let helper = PathContinuity::new(&waypoints, THRESHOLD);
        let mut cursor = helper.resume(&path, 2, false).unwrap();

        let step = helper
            .advance(&mut cursor, Vec3::new(10.0, 0.0, 9.0), 2.0, 1.0)
            .unwrap();

        assert!(step.arrived);
        assert!(step.finished);
        assert_eq!(step.position, Vec3::new(10.0, 0.0, 10.0));
        assert!(cursor.is_complete());

        // Повторный advance завершённого курсора: тот же terminal, позиция не меняется
        let again = helper.advance(&mut cursor, step.position, 2.0, 1.0).unwrap();
        assert!(again.finished);
        assert_eq!(again.position, step.position);
    }

    #[test]
    fn test_arrival_threshold_absorbs_jitter() {
        let (waypoints, path) = abc();
        let helper = PathContinuity::new(&waypoints, THRESHOLD);
        let mut cursor = helper.resume(&path, 1, false).unwrap();

        // 5см от B, dt = 0 → всё равно прибыли (threshold 10см)
        let step = helper
            .advance(&mut cursor, Vec3::new(9.95, 0.0, 0.0), 1.0, 0.0)
            .unwrap();
        assert!(step.arrived);
        assert_eq!(cursor.moving_toward(), Some(2));
    }

    #[test]
    fn test_facing_rotation_points_forward_along_direction() {
        let rotation = facing_rotation(Vec3::X).unwrap();
        let forward = rotation * Vec3::NEG_Z;
        assert!((forward - Vec3::X).length() < 1e-5);

        assert!(facing_rotation(Vec3::Y).is_none());
    }
}

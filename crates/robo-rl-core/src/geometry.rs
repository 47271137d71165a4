//! Bearing arithmetic in degrees

/// Normalize an angle to (-180, 180]
#[must_use]
pub fn normalize_relative_angle(angle: f64) -> f64 {
    let wrapped = (angle + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}

/// Absolute bearing to a target given the body heading and the relative bearing
#[must_use]
pub fn absolute_bearing(robot_heading: f64, enemy_bearing: f64) -> f64 {
    (robot_heading + enemy_bearing).rem_euclid(360.0)
}

/// Signed angle the gun must turn to point at the target
#[must_use]
pub fn bearing_from_gun(robot_heading: f64, enemy_bearing: f64, gun_heading: f64) -> f64 {
    normalize_relative_angle(absolute_bearing(robot_heading, enemy_bearing) - gun_heading)
}

/// Largest aim error, in degrees, at which a bullet still meets a robot of
/// `robot_size` pixels standing `distance` pixels away
#[must_use]
pub fn aim_tolerance(robot_size: f64, distance: f64) -> f64 {
    (robot_size / 2.0).atan2(distance).to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn normalizes_into_half_open_range() {
        assert_relative_eq!(normalize_relative_angle(190.0), -170.0);
        assert_relative_eq!(normalize_relative_angle(-190.0), 170.0);
        assert_relative_eq!(normalize_relative_angle(180.0), 180.0);
        assert_relative_eq!(normalize_relative_angle(-180.0), 180.0);
        assert_relative_eq!(normalize_relative_angle(720.0), 0.0);
    }

    #[test]
    fn gun_bearing_accounts_for_body_and_gun() {
        // Body faces 90, enemy 30 to the right, gun already at 100: turn 20 more.
        assert_relative_eq!(bearing_from_gun(90.0, 30.0, 100.0), 20.0);
        // Wraps through north.
        assert_relative_eq!(bearing_from_gun(350.0, 20.0, 0.0), 10.0);
    }

    #[test]
    fn tolerance_shrinks_with_distance() {
        let near = aim_tolerance(36.0, 100.0);
        let far = aim_tolerance(36.0, 600.0);
        assert!(near > far);
        assert_relative_eq!(aim_tolerance(36.0, 18.0), 45.0, epsilon = 1e-9);
    }

    proptest! {
        #[test]
        fn relative_angle_is_bounded(angle in -10_000.0f64..10_000.0) {
            let a = normalize_relative_angle(angle);
            prop_assert!(a > -180.0 && a <= 180.0);
        }
    }
}

//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float
{
    target_range.0
        + ((value - source_range.0)
        * (target_range.1 - target_range.0)
        / (source_range.1 - source_range.0))
}

/// Clamp a value between a minimum and a maximum.
pub fn clamp<T>(value: &T, min: &T, max: &T) -> T
where
    T: Float
{
    let mut ret = *value;

    if ret > *max {
        ret = *max
    }
    if ret < *min {
        ret = *min
    }

    ret
}

/// Wrap an angle in radians into the range (-pi, pi].
pub fn wrap_pi(angle_rad: f64) -> f64 {
    let wrapped = wrap_2pi(angle_rad);

    if wrapped > std::f64::consts::PI {
        wrapped - std::f64::consts::TAU
    }
    else {
        wrapped
    }
}

/// Wrap an angle in radians into the range [0, 2pi).
pub fn wrap_2pi(angle_rad: f64) -> f64 {
    let tau = std::f64::consts::TAU;

    let r = angle_rad % tau;
    if r < 0.0 { r + tau } else { r }
}

/// Convert an angle in radians to centidegrees.
pub fn rad_to_cd(angle_rad: f64) -> f64 {
    angle_rad.to_degrees() * 100.0
}

/// Wrap an angle in centidegrees into the range (-18000, 18000].
pub fn wrap_180_cd(angle_cd: f64) -> f64 {
    let mut wrapped = angle_cd % 36000.0;

    if wrapped > 18000.0 {
        wrapped -= 36000.0;
    }
    if wrapped <= -18000.0 {
        wrapped += 36000.0;
    }

    wrapped
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const PI: f64 = std::f64::consts::PI;

    #[test]
    fn test_wrap_pi() {
        assert!((wrap_pi(0.0)).abs() < 1e-12);
        assert!((wrap_pi(PI) - PI).abs() < 1e-12);
        assert!((wrap_pi(-PI) - PI).abs() < 1e-12);
        assert!((wrap_pi(3.0 * PI) - PI).abs() < 1e-12);
        assert!((wrap_pi(2.5 * PI) - 0.5 * PI).abs() < 1e-12);
        assert!((wrap_pi(-2.5 * PI) + 0.5 * PI).abs() < 1e-12);
    }

    #[test]
    fn test_wrap_2pi() {
        assert!((wrap_2pi(-0.5 * PI) - 1.5 * PI).abs() < 1e-12);
        assert!((wrap_2pi(2.5 * PI) - 0.5 * PI).abs() < 1e-12);
        assert!((wrap_2pi(0.0)).abs() < 1e-12);
    }

    #[test]
    fn test_wrap_180_cd() {
        assert_eq!(wrap_180_cd(18000.0), 18000.0);
        assert_eq!(wrap_180_cd(18001.0), -17999.0);
        assert_eq!(wrap_180_cd(-18000.0), 18000.0);
        assert_eq!(wrap_180_cd(36000.0), 0.0);
        assert_eq!(wrap_180_cd(27000.0), -9000.0);
    }

    #[test]
    fn test_lin_map() {
        assert_eq!(lin_map((0.0, 90.0), (0.0, 45.0), 45.0), 22.5);
        assert_eq!(lin_map((0.0, 1.0), (10.0, 20.0), 0.5), 15.0);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(&1.5f64, &-1.0, &1.0), 1.0);
        assert_eq!(clamp(&-1.5f64, &-1.0, &1.0), -1.0);
        assert_eq!(clamp(&0.5f64, &-1.0, &1.0), 0.5);
    }
}

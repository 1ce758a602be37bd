//! Shared numeric curves.

/// Logistic curve `1 / (1 + e^(-steepness * (x - midpoint)))`.
pub fn logistic(x: f64, steepness: f64, midpoint: f64) -> f64 {
    let z = -steepness * (x - midpoint);
    // e^z overflows to inf for large z, which still yields 0 below.
    1.0 / (1.0 + z.exp())
}

/// Standard sigmoid centred on zero.
pub fn sigmoid(x: f64) -> f64 {
    logistic(x, 1.0, 0.0)
}

pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logistic_is_half_at_midpoint() {
        assert!((logistic(3.0, 7.0, 3.0) - 0.5).abs() < 1e-12);
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn logistic_saturates_without_nan() {
        assert_eq!(logistic(-1e6, 10.0, 0.0), 0.0);
        assert_eq!(logistic(1e6, 10.0, 0.0), 1.0);
    }

    #[test]
    fn clamp_unit_handles_nan() {
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(clamp_unit(1.7), 1.0);
        assert_eq!(clamp_unit(-0.2), 0.0);
    }
}

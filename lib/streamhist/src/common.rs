use float_cmp::ApproxEqRatio as _;

/// Compares two floating-point values for approximate equality using a ratio-based approach.
///
/// When comparing two values, the smaller value cannot deviate by more than 0.0000001% of the larger value. Two NaN
/// values are considered equal, and two zeroes are always equal regardless of sign.
pub fn float_eq(l_value: f64, r_value: f64) -> bool {
    const RATIO_ERROR: f64 = 0.00000001;

    (l_value.is_nan() && r_value.is_nan()) || l_value == r_value || l_value.approx_eq_ratio(&r_value, RATIO_ERROR)
}

/// Compares two optional floating-point values with [`float_eq`].
pub fn option_float_eq(l_value: Option<f64>, r_value: Option<f64>) -> bool {
    match (l_value, r_value) {
        (Some(l), Some(r)) => float_eq(l, r),
        (None, None) => true,
        _ => false,
    }
}

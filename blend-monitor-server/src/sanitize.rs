/// Strips everything but digits, a single leading minus sign and the first
/// decimal point. Applying it twice gives the same result as applying it once.
pub fn sanitize_numeric_input(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut seen_dot = false;

    for c in raw.trim().chars() {
        match c {
            '0'..='9' => out.push(c),
            '-' if out.is_empty() => out.push(c),
            '.' if !seen_dot => {
                seen_dot = true;
                out.push(c);
            }
            _ => {}
        }
    }

    out
}

/// Clamps `value` into `[min, max]`, ignoring whichever bound is absent.
/// When `min > max` the bounds are swapped.
pub fn clamp_value(value: f64, min: Option<f64>, max: Option<f64>) -> f64 {
    let (min, max) = match (min, max) {
        (Some(lo), Some(hi)) if lo > hi => (Some(hi), Some(lo)),
        bounds => bounds,
    };

    let mut v = if value.is_nan() { min.or(max).unwrap_or(0.0) } else { value };
    if let Some(lo) = min {
        v = v.max(lo);
    }
    if let Some(hi) = max {
        v = v.min(hi);
    }
    v
}

/// Integer flavour of [`clamp_value`] for pagination and window parameters.
pub fn clamp_i64(value: i64, min: i64, max: i64) -> i64 {
    clamp_value(value as f64, Some(min as f64), Some(max as f64)) as i64
}

/// Parses free-form numeric text, falling back to `default` when nothing usable remains.
pub fn parse_clamped(raw: &str, default: i64, min: i64, max: i64) -> i64 {
    let cleaned = sanitize_numeric_input(raw);
    let parsed = cleaned.parse::<f64>().map(|v| v.trunc() as i64).unwrap_or(default);
    clamp_i64(parsed, min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_is_idempotent() {
        for raw in ["12abc", "-3.5.6", "--1", " 4 2 ", "1-2", ".5.", "", "abc", "-.-", "9e9"] {
            let once = sanitize_numeric_input(raw);
            assert_eq!(sanitize_numeric_input(&once), once, "input {:?}", raw);
        }
    }

    #[test]
    fn sanitize_keeps_sign_and_first_dot() {
        assert_eq!(sanitize_numeric_input("-3.5.6"), "-3.56");
        assert_eq!(sanitize_numeric_input("1-2"), "12");
        assert_eq!(sanitize_numeric_input("$1,000"), "1000");
    }

    #[test]
    fn clamp_stays_in_bounds() {
        for v in [-1e9, -5.0, 0.0, 3.3, 10.0, 1e12, f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let c = clamp_value(v, Some(1.0), Some(100.0));
            assert!((1.0..=100.0).contains(&c), "{} -> {}", v, c);
        }
    }

    #[test]
    fn clamp_with_one_bound() {
        assert_eq!(clamp_value(-4.0, Some(0.0), None), 0.0);
        assert_eq!(clamp_value(400.0, None, Some(100.0)), 100.0);
        assert_eq!(clamp_value(7.0, None, None), 7.0);
    }

    #[test]
    fn clamp_swaps_inverted_bounds() {
        assert_eq!(clamp_value(50.0, Some(10.0), Some(1.0)), 10.0);
    }

    #[test]
    fn parse_clamped_defaults_and_bounds() {
        assert_eq!(parse_clamped("abc", 30, 1, 365), 30);
        assert_eq!(parse_clamped("9000", 30, 1, 365), 365);
        assert_eq!(parse_clamped("-4", 30, 1, 365), 1);
        assert_eq!(parse_clamped("14 days", 30, 1, 365), 14);
    }
}

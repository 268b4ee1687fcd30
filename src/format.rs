//! Human-readable formatting for counters, rates and host names.

const UNITS: [&str; 7] = [" ", " K", " M", " G", " T", " P", " E"];

/// Scales `value` by `base` into a metric prefix, e.g. `metric(2048.0, 1024, "B")`
/// is `"2.00 KB"` and `metric(512.0, 1024, "B")` is `"512 B"`.
///
/// A value is only scaled while it is strictly greater than `base`, so
/// `1024` bytes still prints as `1024 B`.
pub fn metric(value: f64, base: u32, suffix: &str) -> String {
    let base = f64::from(base.max(2));
    let mut val = if value.is_finite() { value } else { 0.0 };
    let mut unit = 0;

    while unit < UNITS.len() - 1 && val > base {
        val /= base;
        unit += 1;
    }

    if unit == 0 {
        format!("{}{}{}", plain(val), UNITS[0], suffix)
    } else {
        format!("{:.2}{}{}", val, UNITS[unit], suffix)
    }
}

pub fn bytes(value: u64) -> String {
    metric(value as f64, 1024, "B")
}

pub fn packets(value: u64) -> String {
    metric(value as f64, 1000, "P")
}

pub fn count(value: u64) -> String {
    metric(value as f64, 1000, "")
}

pub fn bitrate(value: f64) -> String {
    metric(value, 1024, "bps")
}

fn plain(val: f64) -> String {
    if val.fract() == 0.0 {
        format!("{val:.0}")
    } else {
        val.to_string()
    }
}

/// Short label for a DNS name: `-` when unknown, otherwise its first label
/// cut to 12 characters.
pub fn hostname(dns: Option<&str>) -> String {
    let Some(dns) = dns.filter(|d| !d.is_empty()) else {
        return "-".to_string();
    };

    let label = dns.split('.').next().unwrap_or(dns);
    if label.chars().count() > 12 {
        let short: String = label.chars().take(12).collect();
        format!("{short}…")
    } else {
        label.to_string()
    }
}

/// Joins up to three KPI values into "A, B and C". `None` without a first value.
pub fn kpi_phrase(v1: Option<&str>, v2: Option<&str>, v3: Option<&str>) -> Option<String> {
    fn present(v: Option<&str>) -> Option<&str> {
        v.filter(|s| !s.is_empty())
    }

    match (present(v1), present(v2), present(v3)) {
        (Some(a), Some(b), Some(c)) => Some(format!("{a}, {b} and {c}")),
        (Some(a), Some(b), None) => Some(format!("{a} and {b}")),
        (Some(a), _, _) => Some(a.to_string()),
        (None, _, _) => None,
    }
}

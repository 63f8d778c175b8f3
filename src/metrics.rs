//! Per-value agronomic formulas.
//!
//! Every formula takes `Option<f64>` inputs and returns `None` when a guard
//! fails (missing input, zero or negative denominator). Loss percentages are
//! the exception: they fall back to `0.0`, so the total loss always adds up.

use chrono::{DateTime, NaiveDate};

const BR_DATE: &str = "%d/%m/%Y";

fn present(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

fn positive(v: Option<f64>) -> Option<f64> {
    present(v).filter(|x| *x > 0.0)
}

/// Parse a number that may use a decimal comma (`"1,85"`).
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|x| x.is_finite())
}

// ── Replicate averaging ─────────────────────────────────────────────────────

/// Mean of the measured plants. An unmeasured plant is recorded as `0`,
/// so zeros are skipped together with missing values.
pub fn replicate_mean(values: &[Option<f64>]) -> Option<f64> {
    let (sum, n) = values
        .iter()
        .filter_map(|v| present(*v))
        .filter(|v| *v != 0.0)
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

// ── Kernel weight and yield ─────────────────────────────────────────────────

/// Thousand-kernel weight normalised to the standard moisture.
pub fn corrected_kernel_weight(pmg: Option<f64>, moisture: Option<f64>, standard: f64) -> Option<f64> {
    let pmg = present(pmg).filter(|v| *v != 0.0)?;
    let moisture = present(moisture).filter(|v| *v != 0.0)?;
    Some(pmg * (100.0 - moisture) / (100.0 - standard))
}

pub fn plot_area(rows: Option<f64>, row_length: Option<f64>, spacing: Option<f64>) -> Option<f64> {
    Some(positive(rows)? * positive(row_length)? * positive(spacing)?)
}

/// Plot weight (kg) scaled from the plot area (m²) to one hectare.
pub fn yield_kg_ha(plot_weight: Option<f64>, area_m2: Option<f64>) -> Option<f64> {
    Some(positive(plot_weight)? / positive(area_m2)? * 10_000.0)
}

pub fn moisture_corrected_yield(kg_ha: Option<f64>, moisture: Option<f64>, standard: f64) -> Option<f64> {
    let kg_ha = positive(kg_ha)?;
    let moisture = positive(moisture)?;
    Some(kg_ha * (100.0 - moisture) / (100.0 - standard))
}

pub fn sacks_per_ha(kg_ha_corr: Option<f64>, sack_kg: f64) -> Option<f64> {
    Some(positive(kg_ha_corr)? / sack_kg)
}

/// Plants per hectare from the plant count over 10 m of row.
pub fn stand_density(plants_10m: Option<f64>, spacing: Option<f64>) -> Option<f64> {
    Some(positive(plants_10m)? * 1000.0 / positive(spacing)?)
}

// ── Losses ──────────────────────────────────────────────────────────────────

pub fn loss_percentage(count: Option<f64>, plants_10m: Option<f64>) -> f64 {
    match (present(count), positive(plants_10m)) {
        (Some(c), Some(p)) => c / p * 100.0,
        _ => 0.0,
    }
}

pub fn total_loss(parts: &[Option<f64>]) -> f64 {
    parts.iter().filter_map(|v| present(*v)).sum()
}

// ── Heights ─────────────────────────────────────────────────────────────────

/// Heights above `threshold` were typed in centimetres.
pub fn height_to_meters(value: Option<f64>, threshold: f64) -> Option<f64> {
    let v = present(value)?;
    Some(if v > threshold { v / 100.0 } else { v })
}

// ── Dates ───────────────────────────────────────────────────────────────────

/// Unix seconds to `dd/mm/yyyy` (UTC). A missing or zero timestamp is an
/// empty string, which is what the dashboard displays for unset dates.
pub fn timestamp_to_br_date(seconds: Option<f64>) -> String {
    let Some(secs) = present(seconds).filter(|v| *v != 0.0) else {
        return String::new();
    };
    DateTime::from_timestamp(secs.floor() as i64, 0)
        .map(|dt| dt.format(BR_DATE).to_string())
        .unwrap_or_default()
}

pub fn parse_br_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, BR_DATE).ok()
}

/// Whole days from `start` to `end`, both `dd/mm/yyyy`.
pub fn days_between(end: Option<&str>, start: Option<&str>) -> Option<i64> {
    let end = parse_br_date(end?)?;
    let start = parse_br_date(start?)?;
    Some((end - start).num_days())
}

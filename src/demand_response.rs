//! Day-select demand-response dispatchable capacity.
//!
//! The bid capacity is the mean over summer weekdays of the least of
//! three limits per weekday: the battery's hourly output over the
//! program window, the load actually dischargeable in the window, and
//! the non-summer baseline for the same weekday.

use chrono::Weekday;

use crate::arbitrage::{DispatchSample, DispatchStats};
use crate::models::{weekday_class, weekday_index, Season, TimeWindow, WeekdayClass};

/// Per-weekday intermediate figures behind the capacity decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrDayStats {
    pub weekday: Weekday,
    /// Mean dischargeable power over the window, kW.
    pub mean_dischargeable_kw: f64,
    /// Window length actually covered by samples, hours.
    pub hours: f64,
    /// Mean over-capacity power over the window, kW.
    pub mean_over_kw: f64,
    /// After applying the battery output limit.
    pub max_dispatchable_kw: f64,
    /// Non-summer same-weekday dischargeable mean, kW.
    pub baseline_kw: f64,
    /// Final per-weekday cap.
    pub cap_kw: f64,
}

/// Compute the bid capacity for one availability level. The program
/// window is end-exclusive. Returns the per-weekday detail and the
/// weekday-mean capacity in kW.
pub fn calculate_dr_capacity(
    samples: &[DispatchSample],
    stats: &[DispatchStats],
    window: TimeWindow,
    execute_hours: f64,
    avail_kwh: f64,
) -> (Vec<DrDayStats>, f64) {
    if execute_hours <= 0.0 {
        return (Vec::new(), 0.0);
    }
    let battery_kw = avail_kwh / execute_hours;

    // Worst summer weekday over-capacity decides whether the battery
    // is already committed to shaving it.
    let max_summer_over = stats
        .iter()
        .filter(|r| r.season == Season::Summer && weekday_class(r.weekday) == WeekdayClass::Week)
        .map(|r| r.over_kwh)
        .fold(f64::NEG_INFINITY, f64::max);
    let covers_over = avail_kwh > max_summer_over;

    let window_weekday = |s: &&DispatchSample, season: Season| {
        s.season == season && s.class == WeekdayClass::Week && window.contains_half_open(s.time)
    };

    let mut rows = Vec::new();
    for wd in [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
    ] {
        let summer: Vec<&DispatchSample> = samples
            .iter()
            .filter(|s| window_weekday(s, Season::Summer) && s.weekday == wd)
            .collect();
        if summer.is_empty() {
            continue;
        }
        let n = summer.len() as f64;
        let mean_dischargeable_kw = summer.iter().map(|s| s.dischargeable_kw).sum::<f64>() / n;
        let mean_over_kw = summer.iter().map(|s| s.over_kw).sum::<f64>() / n;
        let hours = n / 4.0;

        let max_dispatchable_kw = if covers_over {
            mean_dischargeable_kw.min(battery_kw - mean_over_kw.max(0.0))
        } else {
            mean_dischargeable_kw.min(battery_kw)
        };

        let baseline: Vec<&DispatchSample> = samples
            .iter()
            .filter(|s| window_weekday(s, Season::NotSummer) && s.weekday == wd)
            .collect();
        let baseline_kw = if baseline.is_empty() {
            max_dispatchable_kw
        } else {
            baseline.iter().map(|s| s.dischargeable_kw).sum::<f64>() / baseline.len() as f64
        };

        rows.push(DrDayStats {
            weekday: wd,
            mean_dischargeable_kw,
            hours,
            mean_over_kw,
            max_dispatchable_kw,
            baseline_kw,
            cap_kw: max_dispatchable_kw.min(baseline_kw),
        });
    }

    if rows.is_empty() {
        return (rows, 0.0);
    }
    rows.sort_by_key(|r| weekday_index(r.weekday));
    let capacity = rows.iter().map(|r| r.cap_kw).sum::<f64>() / rows.len() as f64;
    (rows, capacity)
}

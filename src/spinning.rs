//! Spinning-reserve (即時備轉) revenue statistics.
//!
//! Non-working days bid all 24 hours; working days bid the hours left
//! after the battery's own charge/discharge commitments. Sites under
//! 1 MW only earn through an aggregator.

use crate::arbitrage::DispatchSample;
use crate::error::{Result, SimError};
use crate::models::{Season, TouLevel, WeekdayClass};

/// Load distribution statistics for one sample group.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LoadStats {
    /// Mean load, capped at the PCS output, kW.
    pub mean_kw: f64,
    /// Mean of loads above 1 MW, capped at the PCS output, kW.
    pub gt_1mw_mean_kw: f64,
    /// Share of slots above 1 MW.
    pub gt_1mw_ratio: f64,
}

/// Distribution stats over a slice of slot loads.
pub fn load_stats(loads: &[f64], max_bms_kw: f64) -> LoadStats {
    if loads.is_empty() {
        return LoadStats::default();
    }
    let mean_kw = (loads.iter().sum::<f64>() / loads.len() as f64).min(max_bms_kw);
    let big: Vec<f64> = loads.iter().copied().filter(|&v| v > 1000.0).collect();
    let gt_1mw_ratio = big.len() as f64 / loads.len() as f64;
    let gt_1mw_mean_kw = if big.is_empty() {
        0.0
    } else {
        (big.iter().sum::<f64>() / big.len() as f64).min(max_bms_kw)
    };
    LoadStats {
        mean_kw,
        gt_1mw_mean_kw,
        gt_1mw_ratio,
    }
}

/// Weekend (and Sunday-classed) slot statistics.
pub fn weekend_load_stats(samples: &[DispatchSample], max_bms_kw: f64) -> LoadStats {
    let loads: Vec<f64> = samples
        .iter()
        .filter(|s| s.class != WeekdayClass::Week)
        .map(|s| s.load_kw)
        .collect();
    load_stats(&loads, max_bms_kw)
}

/// Working-day statistics for one (season, price-level) group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpinningRow {
    pub season: Season,
    /// Whether the group covers the high-price slots.
    pub high_level: bool,
    /// Mean dischargeable power over the group, kW.
    pub mean_dischargeable_kw: f64,
    /// Daily hours the group spans.
    pub hours: f64,
    /// Hours needed to discharge the full availability.
    pub discharge_hours: f64,
    pub stats: LoadStats,
}

/// Group weekday slots by (season, high-or-not) and derive the hours
/// and load statistics used by the gain formulas.
pub fn spinning_summary(
    samples: &[DispatchSample],
    max_bms_kw: f64,
    avail_kwh: f64,
) -> Vec<SpinningRow> {
    let mut rows = Vec::new();
    for season in [Season::Summer, Season::NotSummer] {
        for high_level in [false, true] {
            let group: Vec<&DispatchSample> = samples
                .iter()
                .filter(|s| {
                    s.class == WeekdayClass::Week
                        && s.season == season
                        && (s.tou_level == TouLevel::High) == high_level
                })
                .collect();
            if group.is_empty() {
                continue;
            }
            let n = group.len() as f64;
            let mean_dischargeable_kw =
                group.iter().map(|s| s.dischargeable_kw).sum::<f64>() / n;
            // Five weekdays of quarter-hour slots fold to per-day
            // hours.
            let hours = n / (4.0 * 5.0);
            let discharge_hours = if mean_dischargeable_kw > 0.0 {
                avail_kwh / mean_dischargeable_kw
            } else {
                0.0
            };
            let loads: Vec<f64> = group.iter().map(|s| s.load_kw).collect();
            rows.push(SpinningRow {
                season,
                high_level,
                mean_dischargeable_kw,
                hours,
                discharge_hours,
                stats: load_stats(&loads, max_bms_kw),
            });
        }
    }
    rows
}

/// Non-working-day gains: the whole day is biddable.
/// Returns (single-site, aggregated).
pub fn gain_non_working(
    weekend: &LoadStats,
    non_working_days: f64,
    capacity_price: f64,
    performance_price: f64,
) -> (f64, f64) {
    let rate = capacity_price + performance_price;
    let single =
        non_working_days * 24.0 * rate * weekend.gt_1mw_mean_kw / 1000.0 * weekend.gt_1mw_ratio;
    let agg = non_working_days * 24.0 * rate * weekend.mean_kw / 1000.0;
    (single, agg)
}

/// Working-day gains for one season. Discharge hours (and the DR
/// window on summer days) are withheld from bidding; non-summer days
/// scale the withheld hours by the cycle count.
pub fn gain_working(
    rows: &[SpinningRow],
    season: Season,
    days: f64,
    capacity_price: f64,
    performance_price: f64,
    dr_hours: f64,
    cycles: f64,
) -> Result<(f64, f64)> {
    let find = |high| {
        rows.iter()
            .find(|r| r.season == season && r.high_level == high)
            .ok_or_else(|| {
                SimError::Validation(format!(
                    "spinning summary has no {} {} row",
                    season,
                    if high { "high" } else { "non-high" }
                ))
            })
    };
    let r1 = find(true)?;
    let r0 = find(false)?;

    let rate = capacity_price + performance_price;
    // Discharge happens in the high window, charging mirrors it in the
    // non-high window.
    let (withheld_1, withheld_0) = match season {
        Season::Summer => (
            r1.discharge_hours.ceil().max(dr_hours),
            r1.discharge_hours.round(),
        ),
        Season::NotSummer => (
            r1.discharge_hours.ceil().max(dr_hours) * cycles,
            r1.discharge_hours.round() * cycles,
        ),
    };

    let daily_single = rate * (r1.hours - withheld_1) * r1.stats.gt_1mw_mean_kw / 1000.0
        * r1.stats.gt_1mw_ratio
        + rate * (r0.hours - withheld_0) * r0.stats.gt_1mw_mean_kw / 1000.0
            * r0.stats.gt_1mw_ratio;
    let daily_agg = rate * (r1.hours - withheld_1) * r1.stats.mean_kw / 1000.0
        + rate * (r0.hours - withheld_0) * r0.stats.mean_kw / 1000.0;

    Ok((days * daily_single, days * daily_agg))
}

/// Annual capacity-payment gain across non-working days and both
/// seasons' working days. Returns (single-site, aggregated).
#[allow(clippy::too_many_arguments)]
pub fn total_spinning_gain(
    weekend: &LoadStats,
    rows: &[SpinningRow],
    non_working_days: f64,
    summer_days: f64,
    not_summer_days: f64,
    capacity_price: f64,
    performance_price: f64,
    dr_hours: f64,
    cycles: f64,
) -> Result<(f64, f64)> {
    let (a_single, a_agg) =
        gain_non_working(weekend, non_working_days, capacity_price, performance_price);
    let (ns_single, ns_agg) = gain_working(
        rows,
        Season::NotSummer,
        not_summer_days,
        capacity_price,
        performance_price,
        dr_hours,
        cycles,
    )?;
    let (s_single, s_agg) = gain_working(
        rows,
        Season::Summer,
        summer_days,
        capacity_price,
        performance_price,
        dr_hours,
        cycles,
    )?;
    Ok((
        a_single + ns_single + s_single,
        a_agg + ns_agg + s_agg,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{weekday_class, TouTag};
    use chrono::{NaiveTime, Weekday};

    #[test]
    fn load_stats_filters_and_caps() {
        let stats = load_stats(&[500.0, 1500.0, 2500.0, 500.0], 1800.0);
        assert_eq!(stats.gt_1mw_ratio, 0.5);
        // mean of 1500/2500 is 2000, capped at 1800.
        assert_eq!(stats.gt_1mw_mean_kw, 1800.0);
        assert_eq!(stats.mean_kw, 1250.0);
    }

    #[test]
    fn load_stats_with_no_big_loads() {
        let stats = load_stats(&[500.0, 600.0], 1800.0);
        assert_eq!(stats.gt_1mw_ratio, 0.0);
        assert_eq!(stats.gt_1mw_mean_kw, 0.0);
    }

    fn sample(
        season: Season,
        weekday: Weekday,
        minute_of_day: u32,
        load_kw: f64,
        level: TouLevel,
    ) -> DispatchSample {
        DispatchSample {
            season,
            weekday,
            class: weekday_class(weekday),
            time: NaiveTime::from_hms_opt(minute_of_day / 60, minute_of_day % 60, 0).unwrap(),
            load_kw,
            tou_price: 5.0,
            tou_tag: TouTag::Peak,
            tou_level: level,
            dischargeable_kw: if level == TouLevel::High { load_kw } else { 0.0 },
            chargeable_kw: 0.0,
            ceiling_kw: 10_000.0,
            over_kw: 0.0,
            weighted_over_kw: 0.0,
        }
    }

    #[test]
    fn summary_groups_by_season_and_level() {
        let mut samples = Vec::new();
        // 20 high slots and 20 low slots per season: one hour per day
        // across five weekdays.
        for wd in [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ] {
            for i in 0..4 {
                for season in [Season::Summer, Season::NotSummer] {
                    samples.push(sample(season, wd, 600 + i * 15, 2000.0, TouLevel::High));
                    samples.push(sample(season, wd, 120 + i * 15, 400.0, TouLevel::Low));
                }
            }
        }
        let rows = spinning_summary(&samples, 1500.0, 3000.0);
        assert_eq!(rows.len(), 4);
        let high_summer = rows
            .iter()
            .find(|r| r.season == Season::Summer && r.high_level)
            .unwrap();
        assert_eq!(high_summer.hours, 1.0);
        assert_eq!(high_summer.mean_dischargeable_kw, 2000.0);
        assert_eq!(high_summer.discharge_hours, 1.5);
        // Load mean capped at the PCS output.
        assert_eq!(high_summer.stats.mean_kw, 1500.0);
    }

    #[test]
    fn non_working_gain_single_vs_aggregated() {
        let weekend = LoadStats {
            mean_kw: 800.0,
            gt_1mw_mean_kw: 1200.0,
            gt_1mw_ratio: 0.5,
        };
        let (single, agg) = gain_non_working(&weekend, 100.0, 179.0, 100.0);
        // 100 days x 24 h x 279 x 1.2 MW x 0.5
        assert!((single - 100.0 * 24.0 * 279.0 * 1.2 * 0.5).abs() < 1e-9);
        assert!((agg - 100.0 * 24.0 * 279.0 * 0.8).abs() < 1e-9);
    }

    #[test]
    fn working_gain_withholds_discharge_hours() {
        let mk = |season, high_level, hours, discharge_hours, mean_kw| SpinningRow {
            season,
            high_level,
            mean_dischargeable_kw: 1000.0,
            hours,
            discharge_hours,
            stats: LoadStats {
                mean_kw,
                gt_1mw_mean_kw: 0.0,
                gt_1mw_ratio: 0.0,
            },
        };
        let rows = vec![
            mk(Season::Summer, true, 6.0, 2.4, 2000.0),
            mk(Season::Summer, false, 18.0, 0.0, 1000.0),
        ];
        let (single, agg) =
            gain_working(&rows, Season::Summer, 107.0, 179.0, 100.0, 0.0, 2.0).unwrap();
        // No loads above 1 MW recorded: single-site earns nothing.
        assert_eq!(single, 0.0);
        // High window: 6 - ceil(2.4) = 3 h at 2 MW; non-high:
        // 18 - round(2.4) = 16 h at 1 MW.
        let expected = 107.0 * (279.0 * 3.0 * 2.0 + 279.0 * 16.0 * 1.0);
        assert!((agg - expected).abs() < 1e-6);
    }

    #[test]
    fn non_summer_withholding_scales_with_cycles() {
        let mk = |high_level, hours| SpinningRow {
            season: Season::NotSummer,
            high_level,
            mean_dischargeable_kw: 1000.0,
            hours,
            discharge_hours: 2.0,
            stats: LoadStats {
                mean_kw: 1000.0,
                gt_1mw_mean_kw: 0.0,
                gt_1mw_ratio: 0.0,
            },
        };
        let rows = vec![mk(true, 8.0), mk(false, 16.0)];
        let (_, agg_two) =
            gain_working(&rows, Season::NotSummer, 1.0, 179.0, 100.0, 0.0, 2.0).unwrap();
        let (_, agg_one) =
            gain_working(&rows, Season::NotSummer, 1.0, 179.0, 100.0, 0.0, 1.0).unwrap();
        // Two cycles withhold twice the hours, so they earn less.
        assert!(agg_two < agg_one);
    }

    #[test]
    fn missing_level_row_is_an_error() {
        let rows = vec![];
        assert!(gain_working(&rows, Season::Summer, 1.0, 179.0, 100.0, 0.0, 1.0).is_err());
    }
}

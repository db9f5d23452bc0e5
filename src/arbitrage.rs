//! Transferable-energy dispatch calculators.
//!
//! The battery discharges into the highest-priced slots and recharges
//! in the lowest-priced ones, capped by PCS power and by the headroom
//! left under the stacked contract ceilings. Slot powers aggregate to
//! per-(season, weekday) daily energies which the scenario generator
//! folds into annual arbitrage income.

use chrono::{NaiveTime, Weekday};

use crate::models::{
    round_to, weekday_class, weekday_index, AnnotatedLoadProfile, ContractCapacity, Season,
    TimeWindow, TouLevel, TouTag, WeekdayClass,
};
use crate::tariff::tier_ceilings;

/// Obligation window counted toward the large-consumer clause,
/// inclusive of both slot starts.
pub fn large_consumer_window() -> TimeWindow {
    TimeWindow::new(
        NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN),
        NaiveTime::from_hms_opt(19, 45, 0).unwrap_or(NaiveTime::MIN),
    )
}

/// Whole-day dispatch window.
pub fn full_day_window() -> TimeWindow {
    TimeWindow::new(
        NaiveTime::MIN,
        NaiveTime::from_hms_opt(23, 45, 0).unwrap_or(NaiveTime::MIN),
    )
}

/// First-cycle window when the non-summer weekday price curve carries
/// two separate peaks.
pub fn first_cycle_window() -> TimeWindow {
    TimeWindow::new(
        NaiveTime::MIN,
        NaiveTime::from_hms_opt(10, 45, 0).unwrap_or(NaiveTime::MIN),
    )
}

/// Second-cycle window, paired with [`first_cycle_window`].
pub fn second_cycle_window() -> TimeWindow {
    TimeWindow::new(
        NaiveTime::from_hms_opt(11, 0, 0).unwrap_or(NaiveTime::MIN),
        NaiveTime::from_hms_opt(23, 45, 0).unwrap_or(NaiveTime::MIN),
    )
}

/// One 15-minute slot with its dispatch annotations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchSample {
    pub season: Season,
    pub weekday: Weekday,
    pub class: WeekdayClass,
    pub time: NaiveTime,
    pub load_kw: f64,
    pub tou_price: f64,
    pub tou_tag: TouTag,
    pub tou_level: TouLevel,
    /// Power the battery can discharge this slot, kW.
    pub dischargeable_kw: f64,
    /// Power the battery can absorb this slot, kW.
    pub chargeable_kw: f64,
    /// Stacked contract ceiling applying to the slot's TOU tag.
    pub ceiling_kw: f64,
    /// Load above the ceiling.
    pub over_kw: f64,
    /// Over-capacity weighted by the tag's dispatch weight.
    pub weighted_over_kw: f64,
}

/// Daily energy totals per (season, weekday).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchStats {
    pub season: Season,
    pub weekday: Weekday,
    pub dischargeable_kwh: f64,
    pub chargeable_kwh: f64,
    pub over_kwh: f64,
    pub weighted_over_kwh: f64,
    /// Whether the large-consumer columns were computed.
    pub has_lc: bool,
    /// Dischargeable energy inside the obligation window.
    pub lc_dischargeable_kwh: f64,
    /// Over-capacity energy inside the obligation window.
    pub lc_over_kwh: f64,
    /// Over-capacity left outside the obligation window.
    pub avoidable_over_kwh: f64,
}

/// Annotate each slot in `window` with dispatchable powers and
/// over-capacity, then aggregate to daily energies.
pub fn calculate_transferable_energy(
    profile: &AnnotatedLoadProfile,
    plan: &str,
    contract: &ContractCapacity,
    pcs_max_kw: f64,
    window: TimeWindow,
    consider_large_consumer: bool,
) -> (Vec<DispatchSample>, Vec<DispatchStats>) {
    let charging_limit = contract.total_kw();
    let ceilings_summer = tier_ceilings(plan, Season::Summer, contract);
    let ceilings_not_summer = tier_ceilings(plan, Season::NotSummer, contract);

    let mut samples = Vec::new();
    for s in profile.iter().filter(|s| window.contains(s.time)) {
        let dischargeable_kw = if s.tou_level == TouLevel::High {
            s.load_kw.min(pcs_max_kw)
        } else {
            0.0
        };
        let chargeable_kw = if s.tou_level == TouLevel::Low {
            (charging_limit - s.load_kw).min(pcs_max_kw).max(0.0)
        } else {
            0.0
        };
        let ceilings = match s.season {
            Season::Summer => &ceilings_summer,
            Season::NotSummer => &ceilings_not_summer,
        };
        let ceiling_kw = ceilings[s.tou_tag.priority() as usize - 1];
        let over_kw = (s.load_kw - ceiling_kw).max(0.0);
        samples.push(DispatchSample {
            season: s.season,
            weekday: s.weekday,
            class: s.class,
            time: s.time,
            load_kw: s.load_kw,
            tou_price: s.tou_price,
            tou_tag: s.tou_tag,
            tou_level: s.tou_level,
            dischargeable_kw,
            chargeable_kw,
            ceiling_kw,
            over_kw,
            weighted_over_kw: over_kw * s.tou_tag.dispatch_weight(),
        });
    }

    let mut stats: Vec<DispatchStats> = Vec::new();
    let mut index: std::collections::BTreeMap<(Season, u8), usize> =
        std::collections::BTreeMap::new();
    for s in &samples {
        let key = (s.season, weekday_index(s.weekday));
        let i = *index.entry(key).or_insert_with(|| {
            stats.push(DispatchStats {
                season: s.season,
                weekday: s.weekday,
                dischargeable_kwh: 0.0,
                chargeable_kwh: 0.0,
                over_kwh: 0.0,
                weighted_over_kwh: 0.0,
                has_lc: consider_large_consumer,
                lc_dischargeable_kwh: 0.0,
                lc_over_kwh: 0.0,
                avoidable_over_kwh: 0.0,
            });
            stats.len() - 1
        });
        let row = &mut stats[i];
        row.dischargeable_kwh += s.dischargeable_kw;
        row.chargeable_kwh += s.chargeable_kw;
        row.over_kwh += s.over_kw;
        row.weighted_over_kwh += s.weighted_over_kw;
        if consider_large_consumer && large_consumer_window().contains(s.time) {
            row.lc_dischargeable_kwh += s.dischargeable_kw;
            row.lc_over_kwh += s.over_kw;
        }
    }

    // Slots are quarter-hour powers; divide by 4 for energy. The
    // obligation-window totals round to whole kWh.
    for row in &mut stats {
        row.dischargeable_kwh = round_to(row.dischargeable_kwh / 4.0, 2);
        row.chargeable_kwh = round_to(row.chargeable_kwh / 4.0, 2);
        row.over_kwh = round_to(row.over_kwh / 4.0, 2);
        row.weighted_over_kwh = round_to(row.weighted_over_kwh / 4.0, 2);
        if consider_large_consumer {
            row.lc_dischargeable_kwh = (row.lc_dischargeable_kwh / 4.0).round();
            row.lc_over_kwh = (row.lc_over_kwh / 4.0).round();
            row.avoidable_over_kwh = (row.over_kwh - row.lc_over_kwh).max(0.0);
        }
    }

    // Keep rows ordered (season, weekday) for deterministic output.
    stats.sort_by_key(|r| (r.season, weekday_index(r.weekday)));
    (samples, stats)
}

/// Per-year daily transferable energies for one season.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferSeries {
    /// Mean weekday transferable energy per listed availability, kWh.
    pub general_kwh: Vec<f64>,
    /// Mean weekday obligation-window transferable energy, kWh.
    pub large_consumer_kwh: Vec<f64>,
}

fn is_workday(weekday: Weekday) -> bool {
    weekday_class(weekday) == WeekdayClass::Week
}

fn workday_mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut n = 0u32;
    for v in values {
        sum += v;
        n += 1;
    }
    if n == 0 {
        0.0
    } else {
        round_to(sum / n as f64, 2)
    }
}

/// Evaluate daily transferable energy for a list of per-year storage
/// availabilities. When the loss-adjusted availability exceeds the
/// season's worst over-capacity day, the battery is assumed to cover
/// the over-capacity first and the weighted equivalent is deducted.
pub fn batch_transferred_energy(
    stats: &[DispatchStats],
    avail_kwh: &[f64],
    season: Season,
    rtt_loss_rate: f64,
    consider_large_consumer: bool,
) -> TransferSeries {
    let rows: Vec<&DispatchStats> = stats.iter().filter(|r| r.season == season).collect();
    let max_over = rows
        .iter()
        .map(|r| r.over_kwh)
        .fold(f64::NEG_INFINITY, f64::max);
    let efficiency = (1.0 - rtt_loss_rate).sqrt();

    let mut general_kwh = Vec::with_capacity(avail_kwh.len());
    for &avail in avail_kwh {
        let effective = avail * efficiency;
        let covers_over = effective > max_over;
        let mean = workday_mean(rows.iter().filter(|r| is_workday(r.weekday)).map(|r| {
            let mut v = effective.min(r.dischargeable_kwh.min(r.chargeable_kwh));
            if covers_over {
                v = (v - r.weighted_over_kwh).max(0.0);
            }
            v
        }));
        general_kwh.push(mean);
    }

    let has_lc = consider_large_consumer && rows.iter().any(|r| r.has_lc);
    let large_consumer_kwh = if has_lc {
        avail_kwh
            .iter()
            .map(|&avail| {
                let effective = avail * efficiency;
                let covers_over = effective > max_over;
                workday_mean(rows.iter().filter(|r| is_workday(r.weekday)).map(|r| {
                    let cap = if covers_over {
                        (effective - r.avoidable_over_kwh).max(0.0)
                    } else {
                        effective
                    };
                    cap.min(r.lc_dischargeable_kwh.min(r.chargeable_kwh)).max(0.0)
                }))
            })
            .collect()
    } else {
        vec![0.0; avail_kwh.len()]
    };

    TransferSeries {
        general_kwh,
        large_consumer_kwh,
    }
}

/// Count contiguous runs of `High` in a slot-ordered level sequence.
pub fn count_high_peaks(levels: impl IntoIterator<Item = TouLevel>) -> usize {
    let mut peaks = 0;
    let mut in_peak = false;
    for level in levels {
        if level == TouLevel::High {
            if !in_peak {
                peaks += 1;
                in_peak = true;
            }
        } else {
            in_peak = false;
        }
    }
    peaks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnnotatedSample;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn contract() -> ContractCapacity {
        ContractCapacity {
            regular_kw: 800.0,
            secondary_kw: 100.0,
            saturday_kw: 50.0,
            off_peak_kw: 50.0,
        }
    }

    fn sample(
        weekday: Weekday,
        time: NaiveTime,
        load_kw: f64,
        tag: TouTag,
        level: TouLevel,
    ) -> AnnotatedSample {
        AnnotatedSample {
            season: Season::Summer,
            weekday,
            class: weekday_class(weekday),
            time,
            load_kw,
            tou_price: 5.0,
            tou_tag: tag,
            tou_level: level,
        }
    }

    #[test]
    fn discharge_capped_by_pcs_and_charge_by_headroom() {
        let profile = AnnotatedLoadProfile {
            samples: vec![
                sample(Weekday::Mon, t(10, 0), 900.0, TouTag::Peak, TouLevel::High),
                sample(Weekday::Mon, t(3, 0), 700.0, TouTag::OffPeak, TouLevel::Low),
            ],
        };
        let (samples, _) = calculate_transferable_energy(
            &profile,
            "高壓三段式電價",
            &contract(),
            250.0,
            full_day_window(),
            false,
        );
        // High slot: discharge is min(load, pcs).
        assert_eq!(samples[0].dischargeable_kw, 250.0);
        assert_eq!(samples[0].chargeable_kw, 0.0);
        // Low slot: charge is min(total contract - load, pcs).
        assert_eq!(samples[1].chargeable_kw, 250.0);
        assert_eq!(samples[1].dischargeable_kw, 0.0);
    }

    #[test]
    fn over_capacity_uses_stacked_ceiling_per_tag() {
        let profile = AnnotatedLoadProfile {
            samples: vec![sample(
                Weekday::Mon,
                t(10, 0),
                900.0,
                TouTag::Peak,
                TouLevel::High,
            )],
        };
        let (samples, stats) = calculate_transferable_energy(
            &profile,
            "高壓三段式電價",
            &contract(),
            250.0,
            full_day_window(),
            false,
        );
        // Peak ceiling is the regular contract (800 kW).
        assert_eq!(samples[0].ceiling_kw, 800.0);
        assert_eq!(samples[0].over_kw, 100.0);
        // Peak weight is zero.
        assert_eq!(samples[0].weighted_over_kw, 0.0);
        // 100 kW over one quarter-hour slot is 25 kWh.
        assert_eq!(stats[0].over_kwh, 25.0);
    }

    #[test]
    fn stats_convert_quarter_hour_powers_to_energy() {
        let profile = AnnotatedLoadProfile {
            samples: vec![
                sample(Weekday::Mon, t(10, 0), 200.0, TouTag::Peak, TouLevel::High),
                sample(Weekday::Mon, t(10, 15), 200.0, TouTag::Peak, TouLevel::High),
            ],
        };
        let (_, stats) = calculate_transferable_energy(
            &profile,
            "高壓三段式電價",
            &contract(),
            500.0,
            full_day_window(),
            false,
        );
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].dischargeable_kwh, 100.0);
    }

    #[test]
    fn window_filter_is_inclusive() {
        let profile = AnnotatedLoadProfile {
            samples: vec![
                sample(Weekday::Mon, t(10, 45), 200.0, TouTag::Peak, TouLevel::High),
                sample(Weekday::Mon, t(11, 0), 200.0, TouTag::Peak, TouLevel::High),
            ],
        };
        let window = TimeWindow::new(t(0, 0), t(10, 45));
        let (samples, _) = calculate_transferable_energy(
            &profile,
            "高壓三段式電價",
            &contract(),
            500.0,
            window,
            false,
        );
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].time, t(10, 45));
    }

    fn stat_row(weekday: Weekday, disch: f64, chg: f64, over: f64, weighted: f64) -> DispatchStats {
        DispatchStats {
            season: Season::Summer,
            weekday,
            dischargeable_kwh: disch,
            chargeable_kwh: chg,
            over_kwh: over,
            weighted_over_kwh: weighted,
            has_lc: false,
            lc_dischargeable_kwh: 0.0,
            lc_over_kwh: 0.0,
            avoidable_over_kwh: 0.0,
        }
    }

    #[test]
    fn transfer_is_min_of_availability_discharge_and_charge() {
        let stats = vec![stat_row(Weekday::Mon, 400.0, 300.0, 0.0, 0.0)];
        let series = batch_transferred_energy(&stats, &[1000.0], Season::Summer, 0.0, false);
        // Charge side binds.
        assert_eq!(series.general_kwh, vec![300.0]);

        let series = batch_transferred_energy(&stats, &[100.0], Season::Summer, 0.0, false);
        // Availability binds.
        assert_eq!(series.general_kwh, vec![100.0]);
    }

    #[test]
    fn weighted_over_deducted_only_when_storage_covers_worst_day() {
        let stats = vec![stat_row(Weekday::Mon, 400.0, 400.0, 200.0, 50.0)];
        // Availability 100 < worst over 200: no deduction.
        let series = batch_transferred_energy(&stats, &[100.0], Season::Summer, 0.0, false);
        assert_eq!(series.general_kwh, vec![100.0]);
        // Availability 300 > 200: deduct the weighted equivalent.
        let series = batch_transferred_energy(&stats, &[300.0], Season::Summer, 0.0, false);
        assert_eq!(series.general_kwh, vec![250.0]);
    }

    #[test]
    fn loss_rate_shrinks_effective_availability() {
        let stats = vec![stat_row(Weekday::Mon, 400.0, 400.0, 0.0, 0.0)];
        let series = batch_transferred_energy(&stats, &[100.0], Season::Summer, 0.19, false);
        // sqrt(1 - 0.19) = 0.9.
        assert_eq!(series.general_kwh, vec![90.0]);
    }

    #[test]
    fn weekend_rows_do_not_enter_the_mean() {
        let stats = vec![
            stat_row(Weekday::Mon, 100.0, 100.0, 0.0, 0.0),
            stat_row(Weekday::Sat, 900.0, 900.0, 0.0, 0.0),
        ];
        let series = batch_transferred_energy(&stats, &[1000.0], Season::Summer, 0.0, false);
        assert_eq!(series.general_kwh, vec![100.0]);
    }

    #[test]
    fn high_runs_count_as_single_peaks() {
        use TouLevel::{High, Low, Other};
        assert_eq!(count_high_peaks([High, High, Low, High]), 2);
        assert_eq!(count_high_peaks([Low, Other, Low]), 0);
        assert_eq!(count_high_peaks([High, High, High]), 1);
    }
}

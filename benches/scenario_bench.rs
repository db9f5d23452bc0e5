use chrono::{NaiveTime, Weekday};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ess_evaluator::models::RawSample;
use ess_evaluator::tariff::TouRecord;
use ess_evaluator::{
    generate_summary, ContractCapacity, RawWeekProfile, ScenarioMode, Season, SimulationConfig,
    SummaryRequest, TouTable, TouTag, WeekdayClass,
};

const PLAN: &str = "高壓三段式電價";

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn tou_table() -> TouTable {
    let mut records = Vec::new();
    for season in [Season::Summer, Season::NotSummer] {
        for slot in 0..96u32 {
            let time = t(slot / 4, (slot % 4) * 15);
            let hour = slot / 4;
            let (price, tag) = match hour {
                9..=11 | 17..=21 => (8.0, TouTag::Peak),
                7..=8 | 12..=16 => (4.0, TouTag::SemiPeak),
                _ => (2.0, TouTag::OffPeak),
            };
            records.push(TouRecord {
                plan: PLAN.to_string(),
                season,
                class: WeekdayClass::Week,
                time,
                price,
                tag,
            });
            records.push(TouRecord {
                plan: PLAN.to_string(),
                season,
                class: WeekdayClass::Sat,
                time,
                price: if (9..=21).contains(&hour) { 3.0 } else { 2.0 },
                tag: if (9..=21).contains(&hour) {
                    TouTag::SaturdaySemiPeak
                } else {
                    TouTag::OffPeak
                },
            });
            records.push(TouRecord {
                plan: PLAN.to_string(),
                season,
                class: WeekdayClass::Sun,
                time,
                price: 2.0,
                tag: TouTag::OffPeak,
            });
        }
    }
    TouTable::from_records(records)
}

fn full_week() -> RawWeekProfile {
    let weekdays = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ];
    let mut samples = Vec::new();
    for season in [Season::Summer, Season::NotSummer] {
        for wd in weekdays {
            for slot in 0..96u32 {
                let hour = slot / 4;
                let base = if (8..=21).contains(&hour) { 1800.0 } else { 700.0 };
                samples.push(RawSample {
                    season,
                    weekday: wd,
                    time: t(hour, (slot % 4) * 15),
                    load_kw: base + (slot as f64) * 2.0,
                });
            }
        }
    }
    RawWeekProfile { samples }
}

fn bench_generate_summary(c: &mut Criterion) {
    let profile = full_week().normalize(&tou_table(), PLAN).unwrap();

    let mut cfg = SimulationConfig::default();
    cfg.tariff.plan = PLAN.to_string();
    cfg.tariff.industry = "製造業".to_string();
    cfg.tariff.contract_old = ContractCapacity {
        regular_kw: 2000.0,
        secondary_kw: 0.0,
        saturday_kw: 0.0,
        off_peak_kw: 0.0,
    };
    cfg.tariff.contract_new = cfg.tariff.contract_old;
    cfg.battery.unit_count = 8;

    let request = SummaryRequest {
        mode: ScenarioMode::EnergyRegulation,
        years: 15,
        is_aggregation: false,
        lc_program: None,
    };

    c.bench_function("generate_summary_15y", |b| {
        b.iter(|| generate_summary(black_box(&cfg), black_box(&profile), black_box(&request)))
    });
}

criterion_group!(benches, bench_generate_summary);
criterion_main!(benches);

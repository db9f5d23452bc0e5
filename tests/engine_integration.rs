use chrono::{NaiveTime, Weekday};

use ess_evaluator::models::RawSample;
use ess_evaluator::summary::{ROW_NET_CASH, ROW_TOTAL_EXPENSE, ROW_TOTAL_INCOME};
use ess_evaluator::tariff::TouRecord;
use ess_evaluator::{
    run_all_simulations, ContractCapacity, EvaluationRequest, LoadOverrides, RawWeekProfile,
    Season, SpProgram, TouTable, TouTag, WeekdayClass,
};

const PLAN: &str = "高壓三段式電價";

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).expect("valid clock time")
}

/// A schedule with two separated weekday peak blocks, so the two-cycle
/// dispatch path stays active in both seasons.
fn tou_table() -> TouTable {
    let mut records = Vec::new();
    for season in [Season::Summer, Season::NotSummer] {
        let slots: &[(WeekdayClass, u32, f64, TouTag)] = &[
            (WeekdayClass::Week, 9, 8.0, TouTag::Peak),
            (WeekdayClass::Week, 10, 2.0, TouTag::OffPeak),
            (WeekdayClass::Week, 18, 8.0, TouTag::Peak),
            (WeekdayClass::Week, 19, 2.0, TouTag::OffPeak),
            (WeekdayClass::Sat, 9, 3.0, TouTag::SaturdaySemiPeak),
            (WeekdayClass::Sat, 18, 2.0, TouTag::OffPeak),
            (WeekdayClass::Sun, 9, 2.0, TouTag::OffPeak),
            (WeekdayClass::Sun, 18, 2.0, TouTag::OffPeak),
        ];
        for &(class, hour, price, tag) in slots {
            records.push(TouRecord {
                plan: PLAN.to_string(),
                season,
                class,
                time: t(hour, 0),
                price,
                tag,
            });
        }
    }
    TouTable::from_records(records)
}

fn reference_week() -> RawWeekProfile {
    let weekdays = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
    ];
    let mut samples = Vec::new();
    for season in [Season::Summer, Season::NotSummer] {
        for wd in weekdays {
            for (hour, kw) in [(9, 2000.0), (10, 800.0), (18, 2000.0), (19, 800.0)] {
                samples.push(RawSample {
                    season,
                    weekday: wd,
                    time: t(hour, 0),
                    load_kw: kw,
                });
            }
        }
        for wd in [Weekday::Sat, Weekday::Sun] {
            for (hour, kw) in [(9, 1500.0), (18, 1400.0)] {
                samples.push(RawSample {
                    season,
                    weekday: wd,
                    time: t(hour, 0),
                    load_kw: kw,
                });
            }
        }
    }
    RawWeekProfile { samples }
}

fn request(regular_kw: f64) -> EvaluationRequest {
    let contract = ContractCapacity {
        regular_kw,
        secondary_kw: 0.0,
        saturday_kw: 0.0,
        off_peak_kw: 0.0,
    };
    EvaluationRequest {
        contract_old: contract,
        contract_new: contract,
        plan: PLAN.to_string(),
        industry: "製造業".to_string(),
        tariff_adjust_factor: 1.0,
        units: Some(vec![8]),
        dr_programs: vec!["2h".to_string()],
        sp_programs: vec![SpProgram::Single, SpProgram::Agg],
        lc_programs: vec![
            ess_evaluator::LcProgram::ObligatedHours,
            ess_evaluator::LcProgram::TieredRebate,
        ],
        years: 5,
    }
}

#[test]
fn small_contract_runs_the_grid_without_large_consumer_modes() {
    let outcome = run_all_simulations(
        None,
        &reference_week(),
        &LoadOverrides::default(),
        &tou_table(),
        &request(2000.0),
    )
    .expect("evaluation should run");

    // energy_only, one DR single, two regulation singles, two compounds.
    assert_eq!(outcome.results.len(), 6);
    assert!(outcome.results.iter().all(|r| r.mode != "energy_lc"));
    assert_eq!(
        outcome
            .results
            .iter()
            .filter(|r| r.label == "電價套利")
            .count(),
        1
    );

    let compound_sp: Vec<_> = outcome
        .results
        .iter()
        .filter(|r| r.mode == "energy_dr_regulation")
        .map(|r| r.sp_program.as_str())
        .collect();
    assert_eq!(compound_sp, vec!["single", "agg"]);

    let baseline = &outcome.baseline;
    assert!(baseline.annual_kwh > 0.0);
    assert!(
        (baseline.total_fee - baseline.basic_fee - baseline.flow_fee).abs() < 1e-6,
        "baseline bill must be the sum of its parts"
    );
}

#[test]
fn every_table_spans_the_horizon_and_balances() {
    let outcome = run_all_simulations(
        None,
        &reference_week(),
        &LoadOverrides::default(),
        &tou_table(),
        &request(2000.0),
    )
    .expect("evaluation should run");

    for run in &outcome.runs {
        let table = &run.summary.table;
        let headers = table.column_headers();
        assert_eq!(headers.first().map(String::as_str), Some("Year 0"));
        assert_eq!(headers.last().map(String::as_str), Some("Year 5"));

        let income = table.operating_values(ROW_TOTAL_INCOME);
        let expense = table.operating_values(ROW_TOTAL_EXPENSE);
        let net = table.operating_values(ROW_NET_CASH);
        for year in 0..5 {
            assert!(
                (net[year] - (income[year] - expense[year])).abs() < 1e-6,
                "net cash must equal income minus expense in {}",
                run.result.label
            );
        }
    }
}

#[test]
fn year_zero_net_cash_is_the_negative_equity() {
    let outcome = run_all_simulations(
        None,
        &reference_week(),
        &LoadOverrides::default(),
        &tou_table(),
        &request(2000.0),
    )
    .expect("evaluation should run");

    let run = outcome
        .runs
        .iter()
        .find(|r| r.result.mode == "energy_only")
        .expect("energy_only scenario present");

    let cfg = &run.summary.config;
    let equity = cfg.capex.total() * (1.0 - cfg.financing.loan_ratio_percent / 100.0);
    let net = run
        .summary
        .table
        .row(ROW_NET_CASH)
        .and_then(|row| row.cells[0])
        .expect("Year 0 net cash filled");
    assert!((net + equity).abs() < 1e-6);
}

#[test]
fn reference_scale_does_not_change_the_outcome() {
    let base = run_all_simulations(
        None,
        &reference_week(),
        &LoadOverrides::default(),
        &tou_table(),
        &request(2000.0),
    )
    .expect("evaluation should run");

    // Without an upload the reference is rescaled onto the contract, so
    // a uniformly inflated reference must land on the same numbers.
    let mut doubled = reference_week();
    for s in &mut doubled.samples {
        s.load_kw *= 2.0;
    }
    let scaled = run_all_simulations(
        None,
        &doubled,
        &LoadOverrides::default(),
        &tou_table(),
        &request(2000.0),
    )
    .expect("evaluation should run");

    assert_eq!(base.results.len(), scaled.results.len());
    for (a, b) in base.results.iter().zip(&scaled.results) {
        assert_eq!(a.label, b.label);
        assert!((a.roi - b.roi).abs() < 1e-9, "{}: {} vs {}", a.label, a.roi, b.roi);
    }
}

#[test]
fn unit_counts_derive_from_the_contract_when_omitted() {
    let mut req = request(2000.0);
    req.units = None;
    let outcome = run_all_simulations(
        None,
        &reference_week(),
        &LoadOverrides::default(),
        &tou_table(),
        &req,
    )
    .expect("evaluation should run");

    // floor(2000 * 0.8 / 125) = 12 units, stepped down in fours.
    let mut counts: Vec<u32> = outcome.results.iter().map(|r| r.unit_count).collect();
    counts.sort_unstable();
    counts.dedup();
    assert_eq!(counts, vec![3, 6, 9, 12]);
    assert_eq!(outcome.results.len(), 4 * 6);
}

#[test]
fn large_contract_enables_the_large_consumer_modes() {
    let outcome = run_all_simulations(
        None,
        &reference_week(),
        &LoadOverrides::default(),
        &tou_table(),
        &request(6000.0),
    )
    .expect("evaluation should run");

    assert_eq!(outcome.results.len(), 8);
    let lc_labels: Vec<_> = outcome
        .results
        .iter()
        .filter(|r| r.mode == "energy_lc")
        .map(|r| r.lc_program.as_str())
        .collect();
    assert_eq!(lc_labels, vec!["義務時數型", "累進回饋型"]);
}

#[test]
fn tou_csv_accepts_datetime_and_clock_slot_forms() {
    let csv = "\
type,datetime,season,weekday,tou,tou_tag
高壓三段式電價,2025-07-01 09:00:00,summer,week,9.39,尖峰
高壓三段式電價,09:15,summer,week,9.39,尖峰
高壓三段式電價,22:30:00,not_summer,sun,2.32,離峰
";
    let table = TouTable::from_reader(csv.as_bytes()).expect("schedule should parse");
    assert_eq!(table.records.len(), 3);
    assert_eq!(table.records[0].time, t(9, 0));
    assert_eq!(table.records[1].time, t(9, 15));
    assert_eq!(table.records[2].tag, TouTag::OffPeak);
}

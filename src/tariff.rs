//! Published 2025 tariff reference data and plan classification.
//!
//! Rates are keyed by (plan name, season). Plan names are the official
//! Chinese billing categories (e.g. 高壓三段式電價); family membership
//! is decided by keyword, the way the rate book groups them.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDateTime, NaiveTime};
use serde::Deserialize;

use crate::error::{Result, SimError};
use crate::models::{ContractCapacity, Season, TouTag, WeekdayClass};

/// Monthly basic-fee unit prices for one (plan, season). A zero means
/// the rate book has no such line item for the plan.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BasicFees {
    /// 按戶計收, flat per-customer charge.
    pub per_customer: f64,
    /// 經常契約 unit price, NTD/kW/month.
    pub regular: f64,
    /// 半尖峰契約 unit price (three-tier plans).
    pub semi_peak: f64,
    /// 非夏月契約 unit price (two-tier and batch plans).
    pub non_summer: f64,
    /// 週六半尖峰契約 unit price.
    pub saturday: f64,
    /// 離峰契約 unit price.
    pub off_peak: f64,
    /// 總度數額度 for simple lighting plans, kWh/year.
    pub kwh_allowance: f64,
    /// 超額費率 applied past the allowance, NTD/kWh.
    pub excess_rate: f64,
}

/// Season-level summary of one plan: calendar days, price extremes and
/// the basic-fee schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanRates {
    pub day_count: f64,
    pub max_price: f64,
    pub min_price: f64,
    pub fees: BasicFees,
}

const NO_FEES: BasicFees = BasicFees {
    per_customer: 0.0,
    regular: 0.0,
    semi_peak: 0.0,
    non_summer: 0.0,
    saturday: 0.0,
    off_peak: 0.0,
    kwh_allowance: 0.0,
    excess_rate: 0.0,
};

macro_rules! rates {
    ($days:expr, $max:expr, $min:expr, $fees:expr) => {
        PlanRates {
            day_count: $days,
            max_price: $max,
            min_price: $min,
            fees: $fees,
        }
    };
}

/// 2025 rate book, one row per (plan, season).
pub static TARIFF_2025: &[(&str, Season, PlanRates)] = &[
    // 低壓
    (
        "低壓三段式電價",
        Season::NotSummer,
        rates!(164.0, 4.86, 2.12, BasicFees {
            per_customer: 262.5,
            regular: 173.2,
            semi_peak: 173.2,
            saturday: 34.6,
            off_peak: 34.6,
            ..NO_FEES
        }),
    ),
    (
        "低壓三段式電價",
        Season::Summer,
        rates!(87.0, 8.12, 2.23, BasicFees {
            per_customer: 262.5,
            regular: 236.2,
            semi_peak: 173.2,
            saturday: 47.2,
            off_peak: 47.2,
            ..NO_FEES
        }),
    ),
    (
        "低壓二段式電價",
        Season::NotSummer,
        rates!(164.0, 5.39, 2.15, BasicFees {
            per_customer: 262.5,
            regular: 173.2,
            non_summer: 173.2,
            saturday: 34.6,
            off_peak: 34.6,
            ..NO_FEES
        }),
    ),
    (
        "低壓二段式電價",
        Season::Summer,
        rates!(87.0, 5.54, 2.27, BasicFees {
            per_customer: 262.5,
            regular: 236.2,
            saturday: 47.2,
            off_peak: 47.2,
            ..NO_FEES
        }),
    ),
    (
        "低壓電動車充換電設施電價",
        Season::NotSummer,
        rates!(164.0, 12.14, 2.9, BasicFees {
            per_customer: 262.5,
            regular: 34.6,
            ..NO_FEES
        }),
    ),
    (
        "低壓電動車充換電設施電價",
        Season::Summer,
        rates!(87.0, 12.47, 3.05, BasicFees {
            per_customer: 262.5,
            regular: 47.2,
            ..NO_FEES
        }),
    ),
    // 高壓
    (
        "高壓三段式電價",
        Season::NotSummer,
        rates!(144.0, 5.47, 2.32, BasicFees {
            regular: 166.9,
            semi_peak: 166.9,
            saturday: 33.3,
            off_peak: 33.3,
            ..NO_FEES
        }),
    ),
    (
        "高壓三段式電價",
        Season::Summer,
        rates!(107.0, 9.39, 2.53, BasicFees {
            regular: 223.6,
            semi_peak: 166.9,
            saturday: 44.7,
            off_peak: 44.7,
            ..NO_FEES
        }),
    ),
    (
        "高壓二段式電價",
        Season::NotSummer,
        rates!(144.0, 6.37, 2.46, BasicFees {
            regular: 166.9,
            non_summer: 166.9,
            saturday: 33.3,
            off_peak: 33.3,
            ..NO_FEES
        }),
    ),
    (
        "高壓二段式電價",
        Season::Summer,
        rates!(107.0, 6.75, 2.71, BasicFees {
            regular: 223.6,
            saturday: 44.7,
            off_peak: 44.7,
            ..NO_FEES
        }),
    ),
    (
        "高壓批次生產電價",
        Season::NotSummer,
        rates!(144.0, 11.79, 2.88, BasicFees {
            regular: 166.9,
            non_summer: 166.9,
            saturday: 33.3,
            off_peak: 33.3,
            ..NO_FEES
        }),
    ),
    (
        "高壓批次生產電價",
        Season::Summer,
        rates!(107.0, 12.47, 3.18, BasicFees {
            regular: 223.6,
            saturday: 44.7,
            off_peak: 44.7,
            ..NO_FEES
        }),
    ),
    (
        "高壓電動車充換電設施電價",
        Season::NotSummer,
        rates!(144.0, 11.533, 2.755, BasicFees {
            per_customer: 249.375,
            regular: 32.87,
            ..NO_FEES
        }),
    ),
    (
        "高壓電動車充換電設施電價",
        Season::Summer,
        rates!(107.0, 11.8465, 2.8975, BasicFees {
            per_customer: 249.375,
            regular: 44.84,
            ..NO_FEES
        }),
    ),
    // 特高壓
    (
        "特高壓三段式電價",
        Season::NotSummer,
        rates!(144.0, 5.03, 2.18, BasicFees {
            regular: 160.6,
            semi_peak: 160.6,
            saturday: 32.1,
            off_peak: 32.1,
            ..NO_FEES
        }),
    ),
    (
        "特高壓三段式電價",
        Season::Summer,
        rates!(107.0, 8.69, 2.4, BasicFees {
            regular: 217.3,
            semi_peak: 160.6,
            saturday: 43.4,
            off_peak: 43.4,
            ..NO_FEES
        }),
    ),
    (
        "特高壓二段式電價",
        Season::NotSummer,
        rates!(144.0, 5.79, 2.28, BasicFees {
            regular: 166.6,
            non_summer: 166.6,
            saturday: 32.1,
            off_peak: 32.1,
            ..NO_FEES
        }),
    ),
    (
        "特高壓二段式電價",
        Season::Summer,
        rates!(107.0, 6.17, 2.55, BasicFees {
            regular: 217.3,
            saturday: 43.4,
            off_peak: 43.4,
            ..NO_FEES
        }),
    ),
    (
        "特高壓批次生產電價",
        Season::NotSummer,
        rates!(144.0, 10.8, 2.67, BasicFees {
            regular: 160.6,
            non_summer: 160.6,
            saturday: 32.1,
            off_peak: 32.1,
            ..NO_FEES
        }),
    ),
    (
        "特高壓批次生產電價",
        Season::Summer,
        rates!(107.0, 11.44, 2.99, BasicFees {
            regular: 217.3,
            saturday: 43.4,
            off_peak: 43.4,
            ..NO_FEES
        }),
    ),
    // 表燈
    (
        "表燈標準型三段式電價",
        Season::NotSummer,
        rates!(164.0, 4.86, 2.12, BasicFees {
            per_customer: 262.5,
            regular: 173.2,
            non_summer: 173.2,
            saturday: 34.6,
            off_peak: 34.6,
            ..NO_FEES
        }),
    ),
    (
        "表燈標準型三段式電價",
        Season::Summer,
        rates!(87.0, 8.12, 2.23, BasicFees {
            per_customer: 262.5,
            regular: 236.2,
            saturday: 47.2,
            off_peak: 47.2,
            ..NO_FEES
        }),
    ),
    (
        "表燈標準型二段式電價",
        Season::NotSummer,
        rates!(164.0, 5.39, 2.15, BasicFees {
            per_customer: 262.5,
            regular: 173.2,
            non_summer: 173.2,
            saturday: 34.6,
            off_peak: 34.6,
            ..NO_FEES
        }),
    ),
    (
        "表燈標準型二段式電價",
        Season::Summer,
        rates!(87.0, 5.54, 2.27, BasicFees {
            per_customer: 262.5,
            regular: 236.2,
            saturday: 47.2,
            off_peak: 47.2,
            ..NO_FEES
        }),
    ),
    (
        "表燈簡易型三段式電價",
        Season::NotSummer,
        rates!(164.0, 4.33, 1.89, BasicFees {
            per_customer: 75.0,
            kwh_allowance: 2000.0,
            excess_rate: 1.02,
            ..NO_FEES
        }),
    ),
    (
        "表燈簡易型三段式電價",
        Season::Summer,
        rates!(87.0, 6.92, 1.96, BasicFees {
            per_customer: 75.0,
            kwh_allowance: 2000.0,
            excess_rate: 1.02,
            ..NO_FEES
        }),
    ),
    (
        "表燈簡易型二段式電價",
        Season::NotSummer,
        rates!(164.0, 4.78, 1.89, BasicFees {
            per_customer: 75.0,
            kwh_allowance: 2000.0,
            excess_rate: 1.02,
            ..NO_FEES
        }),
    ),
    (
        "表燈簡易型二段式電價",
        Season::Summer,
        rates!(87.0, 5.01, 1.96, BasicFees {
            per_customer: 75.0,
            kwh_allowance: 2000.0,
            excess_rate: 1.02,
            ..NO_FEES
        }),
    ),
];

/// Look up the rate-book entry for a plan and season.
pub fn plan_rates(plan: &str, season: Season) -> Result<&'static PlanRates> {
    TARIFF_2025
        .iter()
        .find(|(p, s, _)| *p == plan && *s == season)
        .map(|(_, _, r)| r)
        .ok_or_else(|| SimError::PlanNotFound {
            plan: plan.to_string(),
            season: season.to_string(),
        })
}

/// Two-tier and batch plans stack contracts differently and bill the
/// secondary tier as 非夏月契約.
pub fn is_two_tier(plan: &str) -> bool {
    plan.contains("二段式") || plan.contains("批次")
}

pub fn is_three_tier(plan: &str) -> bool {
    plan.contains("三段式")
}

/// Simple lighting plans bill a flat per-customer fee only.
pub fn is_simple(plan: &str) -> bool {
    plan.contains("簡易")
}

/// 高壓 and 特高壓 plans share billing months, representative-day
/// counts and the longer summer window.
pub fn is_high_voltage(plan: &str) -> bool {
    plan.contains("高壓")
}

/// Number of calendar months billed at summer rates.
pub fn summer_months(plan: &str) -> f64 {
    if is_high_voltage(plan) {
        5.0
    } else {
        4.0
    }
}

/// Summer window as (month, day) bounds, inclusive.
pub fn summer_window(plan: &str) -> ((u32, u32), (u32, u32)) {
    if is_high_voltage(plan) {
        ((5, 16), (10, 15))
    } else {
        ((6, 1), (9, 30))
    }
}

/// Unit price of the secondary contract tier. Three-tier plans bill it
/// as 半尖峰契約, two-tier and batch plans as 非夏月契約; plans with
/// neither line item pay nothing on the tier.
pub fn secondary_unit_price(plan: &str, fees: &BasicFees) -> f64 {
    if is_two_tier(plan) {
        fees.non_summer
    } else if is_three_tier(plan) {
        fees.semi_peak
    } else {
        0.0
    }
}

/// One row of the stacked contract ladder for a season.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContractTier {
    pub season: Season,
    pub tag: TouTag,
    pub capacity_kw: f64,
    pub unit_price: f64,
}

/// Cumulative contract ceilings per TOU tag. Tiers stack from the
/// regular contract outward; for two-tier and batch plans the
/// non-summer peak ceiling already includes the secondary contract.
pub fn tier_ceilings(plan: &str, season: Season, cc: &ContractCapacity) -> [f64; 4] {
    let ec = cc.regular_kw;
    let sec = cc.secondary_kw;
    let sat = cc.saturday_kw;
    let off = cc.off_peak_kw;
    let peak = if is_two_tier(plan) && season == Season::NotSummer {
        ec + sec
    } else {
        ec
    };
    [peak, ec + sec, ec + sec + sat, ec + sec + sat + off]
}

/// Stacked contract ladder with unit prices, one tier per TOU tag.
pub fn contract_tiers(
    plan: &str,
    season: Season,
    cc: &ContractCapacity,
) -> Result<[ContractTier; 4]> {
    let rates = plan_rates(plan, season)?;
    let ceilings = tier_ceilings(plan, season, cc);
    let prices = [
        rates.fees.regular,
        secondary_unit_price(plan, &rates.fees),
        rates.fees.saturday,
        rates.fees.off_peak,
    ];
    let mut tiers = [ContractTier {
        season,
        tag: TouTag::Peak,
        capacity_kw: 0.0,
        unit_price: 0.0,
    }; 4];
    for (i, tag) in TouTag::ALL.into_iter().enumerate() {
        tiers[i] = ContractTier {
            season,
            tag,
            capacity_kw: ceilings[i],
            unit_price: prices[i],
        };
    }
    Ok(tiers)
}

/// Ceiling applying to a single sample given its TOU tag.
pub fn ceiling_for(plan: &str, season: Season, cc: &ContractCapacity, tag: TouTag) -> f64 {
    tier_ceilings(plan, season, cc)[tag.priority() as usize - 1]
}

/// 2025 representative-day counts per (season, day class), split by
/// voltage family.
pub fn representative_day_count(plan: &str, season: Season, class: WeekdayClass) -> f64 {
    if is_high_voltage(plan) {
        match (season, class) {
            (Season::NotSummer, WeekdayClass::Sat) => 29.0,
            (Season::NotSummer, WeekdayClass::Sun) => 39.0,
            (Season::NotSummer, WeekdayClass::Week) => 144.0,
            (Season::Summer, WeekdayClass::Sat) => 21.0,
            (Season::Summer, WeekdayClass::Sun) => 25.0,
            (Season::Summer, WeekdayClass::Week) => 107.0,
        }
    } else {
        match (season, class) {
            (Season::NotSummer, WeekdayClass::Sat) => 33.0,
            (Season::NotSummer, WeekdayClass::Sun) => 46.0,
            (Season::NotSummer, WeekdayClass::Week) => 164.0,
            (Season::Summer, WeekdayClass::Sat) => 17.0,
            (Season::Summer, WeekdayClass::Sun) => 18.0,
            (Season::Summer, WeekdayClass::Week) => 87.0,
        }
    }
}

/// Published day-select DR program parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrProgram {
    pub code: &'static str,
    start_hm: (u32, u32),
    end_hm: (u32, u32),
    pub duration_hr: f64,
    /// 流動電費扣減費率, NTD/kWh.
    pub rate: f64,
}

impl DrProgram {
    pub fn start(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.start_hm.0, self.start_hm.1, 0)
            .unwrap_or(NaiveTime::MIN)
    }

    pub fn end(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.end_hm.0, self.end_hm.1, 0).unwrap_or(NaiveTime::MIN)
    }
}

pub static DR_PROGRAMS: &[DrProgram] = &[
    DrProgram {
        code: "0h",
        start_hm: (15, 30),
        end_hm: (21, 30),
        duration_hr: 0.0,
        rate: 0.0,
    },
    DrProgram {
        code: "2h",
        start_hm: (18, 0),
        end_hm: (20, 0),
        duration_hr: 2.0,
        rate: 2.47,
    },
    DrProgram {
        code: "4h",
        start_hm: (16, 0),
        end_hm: (20, 0),
        duration_hr: 4.0,
        rate: 1.84,
    },
    DrProgram {
        code: "6h",
        start_hm: (16, 0),
        end_hm: (22, 0),
        duration_hr: 6.0,
        rate: 1.69,
    },
    DrProgram {
        code: "6h_batch",
        start_hm: (15, 30),
        end_hm: (21, 30),
        duration_hr: 6.0,
        rate: 1.69,
    },
];

pub fn dr_program(code: &str) -> Result<&'static DrProgram> {
    DR_PROGRAMS
        .iter()
        .find(|p| p.code == code)
        .ok_or_else(|| SimError::UnknownDrProgram(code.to_string()))
}

/// One slot of the published TOU schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct TouRecord {
    pub plan: String,
    pub season: Season,
    pub class: WeekdayClass,
    pub time: NaiveTime,
    pub price: f64,
    pub tag: TouTag,
}

#[derive(Debug, Deserialize)]
struct TouCsvRow {
    #[serde(rename = "type")]
    plan: String,
    datetime: String,
    season: Season,
    weekday: WeekdayClass,
    tou: f64,
    tou_tag: String,
}

/// Full-year TOU schedule across plans, loaded from the reference CSV.
#[derive(Debug, Clone, Default)]
pub struct TouTable {
    pub records: Vec<TouRecord>,
}

impl TouTable {
    pub fn from_records(records: Vec<TouRecord>) -> TouTable {
        TouTable { records }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<TouTable> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut records = Vec::new();
        for row in rdr.deserialize::<TouCsvRow>() {
            let row = row?;
            let tag = TouTag::parse(&row.tou_tag).ok_or_else(|| {
                SimError::Validation(format!("unknown tou_tag {:?}", row.tou_tag))
            })?;
            records.push(TouRecord {
                time: parse_slot_time(&row.datetime)?,
                plan: row.plan,
                season: row.season,
                class: row.weekday,
                price: row.tou,
                tag,
            });
        }
        Ok(TouTable { records })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<TouTable> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Slot lookup map for a single plan, keyed by (season, class,
    /// slot start).
    pub fn plan_schedule(
        &self,
        plan: &str,
    ) -> HashMap<(Season, WeekdayClass, NaiveTime), (f64, TouTag)> {
        self.records
            .iter()
            .filter(|r| r.plan == plan)
            .map(|r| ((r.season, r.class, r.time), (r.price, r.tag)))
            .collect()
    }
}

/// Slot starts come either as full datetimes or bare clock times.
fn parse_slot_time(raw: &str) -> Result<NaiveTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.time());
    }
    for fmt in ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"] {
        if let Ok(t) = NaiveTime::parse_from_str(raw, fmt) {
            return Ok(t);
        }
    }
    Err(SimError::Validation(format!(
        "unparseable slot time {raw:?}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_lookup_returns_published_rates() {
        let r = plan_rates("高壓三段式電價", Season::Summer).unwrap();
        assert_eq!(r.day_count, 107.0);
        assert_eq!(r.max_price, 9.39);
        assert_eq!(r.fees.regular, 223.6);
        assert_eq!(r.fees.semi_peak, 166.9);
    }

    #[test]
    fn unknown_plan_is_an_error() {
        assert!(matches!(
            plan_rates("不存在電價", Season::Summer),
            Err(SimError::PlanNotFound { .. })
        ));
    }

    #[test]
    fn family_classification_by_keyword() {
        assert!(is_two_tier("高壓二段式電價"));
        assert!(is_two_tier("特高壓批次生產電價"));
        assert!(!is_two_tier("高壓三段式電價"));
        assert!(is_simple("表燈簡易型二段式電價"));
        assert!(is_high_voltage("特高壓三段式電價"));
        assert_eq!(summer_months("高壓三段式電價"), 5.0);
        assert_eq!(summer_months("表燈標準型二段式電價"), 4.0);
    }

    #[test]
    fn three_tier_ceilings_stack_cumulatively() {
        let cc = ContractCapacity {
            regular_kw: 800.0,
            secondary_kw: 100.0,
            saturday_kw: 50.0,
            off_peak_kw: 50.0,
        };
        let c = tier_ceilings("高壓三段式電價", Season::NotSummer, &cc);
        assert_eq!(c, [800.0, 900.0, 950.0, 1000.0]);
    }

    #[test]
    fn two_tier_non_summer_peak_includes_secondary() {
        let cc = ContractCapacity {
            regular_kw: 800.0,
            secondary_kw: 100.0,
            saturday_kw: 50.0,
            off_peak_kw: 50.0,
        };
        let c = tier_ceilings("高壓二段式電價", Season::NotSummer, &cc);
        assert_eq!(c[0], 900.0);
        let c_summer = tier_ceilings("高壓二段式電價", Season::Summer, &cc);
        assert_eq!(c_summer[0], 800.0);
    }

    #[test]
    fn two_tier_summer_has_no_secondary_fee() {
        let rates = plan_rates("高壓二段式電價", Season::Summer).unwrap();
        assert_eq!(secondary_unit_price("高壓二段式電價", &rates.fees), 0.0);
        let rates_ns = plan_rates("高壓二段式電價", Season::NotSummer).unwrap();
        assert_eq!(
            secondary_unit_price("高壓二段式電價", &rates_ns.fees),
            166.9
        );
    }

    #[test]
    fn dr_program_lookup() {
        let p = dr_program("2h").unwrap();
        assert_eq!(p.duration_hr, 2.0);
        assert_eq!(p.rate, 2.47);
        assert_eq!(p.start(), NaiveTime::from_hms_opt(18, 0, 0).unwrap());
        assert!(dr_program("9h").is_err());
    }

    #[test]
    fn tou_table_parses_datetime_and_clock_slots() {
        assert_eq!(
            parse_slot_time("2025-01-01 00:15:00").unwrap(),
            NaiveTime::from_hms_opt(0, 15, 0).unwrap()
        );
        assert_eq!(
            parse_slot_time("18:30").unwrap(),
            NaiveTime::from_hms_opt(18, 30, 0).unwrap()
        );
        assert!(parse_slot_time("banana").is_err());
    }

    #[test]
    fn tou_table_csv_round_trip() {
        let csv = "type,datetime,season,weekday,tou,tou_tag\n\
            高壓三段式電價,2025-07-01 10:00:00,summer,week,9.39,尖峰\n\
            高壓三段式電價,2025-07-01 03:00:00,summer,week,2.53,離峰\n";
        let table = TouTable::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(table.records.len(), 2);
        let sched = table.plan_schedule("高壓三段式電價");
        let key = (
            Season::Summer,
            WeekdayClass::Week,
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        );
        assert_eq!(sched[&key], (9.39, TouTag::Peak));
    }
}

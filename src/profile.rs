//! Load profile ingestion and normalization.
//!
//! Raw meter exports arrive either as a long two-column series, a wide
//! 97-column day-per-row table, or an already-reduced representative
//! week in point-record form. Everything funnels into a
//! `RawWeekProfile` (2 seasons x 7 weekdays x 96 slots) which is then
//! annotated against the TOU schedule.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::models::{
    round_to, weekday_class, weekday_index, AnnotatedLoadProfile, AnnotatedSample, RawSample,
    Season, TouLevel,
};
use crate::tariff::{summer_window, TouTable};

/// National holidays 2022-2025. Samples on these dates are excluded
/// from the representative-week means.
pub static HOLIDAYS: &[&str] = &[
    "2022-01-01",
    "2022-01-31",
    "2022-02-01",
    "2022-02-02",
    "2022-02-03",
    "2022-02-04",
    "2022-02-05",
    "2022-02-28",
    "2022-04-04",
    "2022-04-05",
    "2022-06-03",
    "2022-09-10",
    "2022-10-10",
    "2023-01-21",
    "2023-01-23",
    "2023-01-24",
    "2023-01-25",
    "2023-01-26",
    "2023-02-28",
    "2023-04-04",
    "2023-04-05",
    "2023-05-01",
    "2023-06-22",
    "2023-09-29",
    "2023-10-10",
    "2024-01-01",
    "2024-02-09",
    "2024-02-10",
    "2024-02-12",
    "2024-02-13",
    "2024-02-14",
    "2024-02-28",
    "2024-04-04",
    "2024-05-01",
    "2024-06-10",
    "2024-09-17",
    "2024-10-10",
    "2025-01-01",
    "2025-01-28",
    "2025-01-29",
    "2025-01-30",
    "2025-01-31",
    "2025-02-01",
    "2025-02-28",
    "2025-04-04",
    "2025-05-01",
    "2025-05-31",
    "2025-10-06",
    "2025-10-10",
];

fn is_holiday(date: NaiveDate) -> bool {
    let key = date.format("%Y-%m-%d").to_string();
    HOLIDAYS.contains(&key.as_str())
}

/// One slot of an uploaded representative week. The non-`time` keys
/// are season+weekday combinations like `summerMonday` or
/// `nonSummerTuesday`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointRecord {
    pub time: String,
    #[serde(flatten)]
    pub values: BTreeMap<String, Option<f64>>,
}

/// One hour of a manually adjusted load curve, same key layout as
/// `PointRecord` but hourly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyCurvePoint {
    pub hour: String,
    #[serde(flatten)]
    pub targets: BTreeMap<String, Option<f64>>,
}

/// Detected raw meter-export shape.
#[derive(Debug, Clone)]
pub enum LoadInput {
    /// (timestamp, kW) rows.
    Long(Vec<(NaiveDateTime, f64)>),
    /// One day per row: date plus 96 slot values.
    Wide(Vec<(NaiveDate, Vec<f64>)>),
    /// Already-reduced representative week.
    Points(Vec<PointRecord>),
}

impl LoadInput {
    /// Detect and parse a CSV export. Two columns means the long
    /// format, 97 columns the wide format; anything else is rejected.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<LoadInput> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let width = rdr.headers()?.len();
        match width {
            2 => {
                let mut rows = Vec::new();
                for rec in rdr.records() {
                    let rec = rec?;
                    if rec.iter().any(|f| f.trim().is_empty()) {
                        continue;
                    }
                    let ts = parse_datetime(rec.get(0).unwrap_or(""))?;
                    let v: f64 = rec
                        .get(1)
                        .unwrap_or("")
                        .trim()
                        .parse()
                        .map_err(|_| SimError::Format(format!("bad value in row {rec:?}")))?;
                    rows.push((ts, v));
                }
                Ok(LoadInput::Long(rows))
            }
            97 => {
                let mut rows = Vec::new();
                for rec in rdr.records() {
                    let rec = rec?;
                    if rec.iter().any(|f| f.trim().is_empty()) {
                        continue;
                    }
                    let date = parse_date(rec.get(0).unwrap_or(""))?;
                    let mut vals = Vec::with_capacity(96);
                    for f in rec.iter().skip(1) {
                        let v: f64 = f.trim().parse().map_err(|_| {
                            SimError::Format(format!("bad slot value {f:?} on {date}"))
                        })?;
                        vals.push(v);
                    }
                    rows.push((date, vals));
                }
                Ok(LoadInput::Wide(rows))
            }
            n => Err(SimError::Format(format!(
                "expected 2 or 97 columns, found {n}"
            ))),
        }
    }

    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<LoadInput> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file)
    }

    pub fn from_json_reader<R: Read>(reader: R) -> Result<LoadInput> {
        let points: Vec<PointRecord> = serde_json::from_reader(reader)?;
        Ok(LoadInput::Points(points))
    }

    /// Reduce to the representative week for a plan. Long and wide
    /// inputs keep their trailing 365 days, class each day by the
    /// plan's summer window, drop holidays and average per (season,
    /// weekday, slot). Point inputs convert directly.
    pub fn to_week(&self, plan: &str) -> Result<RawWeekProfile> {
        match self {
            LoadInput::Points(points) => RawWeekProfile::from_points(points),
            LoadInput::Long(rows) => {
                let mut rows = rows.clone();
                rows.sort_by_key(|(ts, _)| *ts);
                let tail = rows.len().saturating_sub(96 * 365);
                reduce_to_week(rows[tail..].iter().copied(), plan)
            }
            LoadInput::Wide(days) => {
                let mut days = days.clone();
                days.sort_by_key(|(d, _)| *d);
                let tail = days.len().saturating_sub(365);
                let flat = days[tail..].iter().flat_map(|(date, vals)| {
                    vals.iter().enumerate().map(move |(i, v)| {
                        let t = slot_time(i);
                        (NaiveDateTime::new(*date, t), *v)
                    })
                });
                reduce_to_week(flat, plan)
            }
        }
    }
}

fn slot_time(index: usize) -> NaiveTime {
    NaiveTime::from_hms_opt(index as u32 / 4, (index as u32 % 4) * 15, 0)
        .unwrap_or(NaiveTime::MIN)
}

fn in_summer(plan: &str, date: NaiveDate) -> bool {
    let ((sm, sd), (em, ed)) = summer_window(plan);
    let md = (date.month(), date.day());
    md >= (sm, sd) && md <= (em, ed)
}

fn reduce_to_week(
    rows: impl Iterator<Item = (NaiveDateTime, f64)>,
    plan: &str,
) -> Result<RawWeekProfile> {
    let mut acc: BTreeMap<(Season, u8, NaiveTime), (f64, u32)> = BTreeMap::new();
    let mut seen = 0usize;
    for (ts, v) in rows {
        seen += 1;
        let date = ts.date();
        if is_holiday(date) {
            continue;
        }
        let season = if in_summer(plan, date) {
            Season::Summer
        } else {
            Season::NotSummer
        };
        let key = (season, weekday_index(date.weekday()), ts.time());
        let e = acc.entry(key).or_insert((0.0, 0));
        e.0 += v;
        e.1 += 1;
    }
    if seen == 0 {
        return Err(SimError::Validation("load profile is empty".into()));
    }
    let samples = acc
        .into_iter()
        .map(|((season, wd, time), (sum, n))| RawSample {
            season,
            weekday: weekday_from_index(wd),
            time,
            load_kw: round_to(sum / n as f64, 2),
        })
        .collect();
    Ok(RawWeekProfile { samples })
}

fn weekday_from_index(i: u8) -> Weekday {
    match i {
        0 => Weekday::Mon,
        1 => Weekday::Tue,
        2 => Weekday::Wed,
        3 => Weekday::Thu,
        4 => Weekday::Fri,
        5 => Weekday::Sat,
        _ => Weekday::Sun,
    }
}

/// Parse a `summerMonday` / `nonSummerTuesday` style key.
fn parse_season_weekday(key: &str) -> Option<(Season, Weekday)> {
    let (season, rest) = if let Some(rest) = key.strip_prefix("nonSummer") {
        (Season::NotSummer, rest)
    } else if let Some(rest) = key.strip_prefix("summer") {
        (Season::Summer, rest)
    } else {
        return None;
    };
    rest.parse::<Weekday>().ok().map(|wd| (season, wd))
}

fn parse_datetime(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    for fmt in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M:%S",
        "%Y/%m/%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(dt);
        }
    }
    Err(SimError::Format(format!("unparseable timestamp {raw:?}")))
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Ok(d);
        }
    }
    Err(SimError::Format(format!("unparseable date {raw:?}")))
}

fn parse_clock(raw: &str) -> Result<NaiveTime> {
    let raw = raw.trim();
    for fmt in ["%H:%M", "%H:%M:%S"] {
        if let Ok(t) = NaiveTime::parse_from_str(raw, fmt) {
            return Ok(t);
        }
    }
    Err(SimError::Format(format!("unparseable clock time {raw:?}")))
}

/// Representative-week load before TOU annotation.
#[derive(Debug, Clone, Default)]
pub struct RawWeekProfile {
    pub samples: Vec<RawSample>,
}

impl RawWeekProfile {
    pub fn from_points(points: &[PointRecord]) -> Result<RawWeekProfile> {
        let mut samples = Vec::new();
        for point in points {
            let time = parse_clock(&point.time)?;
            for (key, value) in &point.values {
                if let Some((season, weekday)) = parse_season_weekday(key) {
                    samples.push(RawSample {
                        season,
                        weekday,
                        time,
                        load_kw: value.unwrap_or(0.0),
                    });
                }
            }
        }
        if samples.is_empty() {
            return Err(SimError::Validation(
                "point records contain no recognizable season/weekday keys".into(),
            ));
        }
        samples.sort_by_key(|s| (s.season, weekday_index(s.weekday), s.time));
        Ok(RawWeekProfile { samples })
    }

    pub fn max_load_kw(&self) -> f64 {
        self.samples.iter().map(|s| s.load_kw).fold(0.0, f64::max)
    }

    /// Proportionally rescale so the week's peak hits `target_kw`,
    /// rounding slots to whole kW.
    pub fn scale_to_peak(&mut self, target_kw: f64) -> Result<()> {
        let peak = self.max_load_kw();
        if peak <= 0.0 {
            return Err(SimError::Validation(
                "cannot rescale an all-zero profile".into(),
            ));
        }
        for s in &mut self.samples {
            s.load_kw = (s.load_kw * target_kw / peak).round();
        }
        Ok(())
    }

    /// Rescale each (season, weekday, hour) block so its mean matches
    /// the manually adjusted hourly curve. Hours with no target keep
    /// their original values.
    pub fn scale_by_hourly_targets(&mut self, targets: &[HourlyCurvePoint]) -> Result<()> {
        let mut wanted: HashMap<(Season, u8, u32), f64> = HashMap::new();
        for point in targets {
            let hour: u32 = point
                .hour
                .get(..2)
                .and_then(|h| h.parse().ok())
                .ok_or_else(|| {
                    SimError::Format(format!("bad hour label {:?}", point.hour))
                })?;
            for (key, value) in &point.targets {
                if let (Some((season, weekday)), Some(v)) = (parse_season_weekday(key), value) {
                    wanted.insert((season, weekday_index(weekday), hour), *v);
                }
            }
        }

        let mut sums: HashMap<(Season, u8, u32), (f64, u32)> = HashMap::new();
        for s in &self.samples {
            let e = sums
                .entry((s.season, weekday_index(s.weekday), s.time.hour()))
                .or_insert((0.0, 0));
            e.0 += s.load_kw;
            e.1 += 1;
        }

        for s in &mut self.samples {
            let key = (s.season, weekday_index(s.weekday), s.time.hour());
            if let Some(target) = wanted.get(&key) {
                let (sum, n) = sums[&key];
                let orig_avg = sum / n as f64;
                if orig_avg > 0.0 {
                    s.load_kw = (s.load_kw * target / orig_avg).round();
                }
            }
        }
        Ok(())
    }

    /// Join against the TOU schedule for `plan` and tag each slot with
    /// price, TOU tag and its group-relative level. A sample whose
    /// (season, class, time) has no schedule entry is a data-quality
    /// failure.
    pub fn normalize(&self, table: &TouTable, plan: &str) -> Result<AnnotatedLoadProfile> {
        let schedule = table.plan_schedule(plan);
        if schedule.is_empty() {
            return Err(SimError::Validation(format!(
                "TOU table has no rows for plan {plan:?}"
            )));
        }

        let mut missing = 0usize;
        let mut annotated = Vec::with_capacity(self.samples.len());
        for s in &self.samples {
            let class = weekday_class(s.weekday);
            match schedule.get(&(s.season, class, s.time)) {
                Some(&(price, tag)) => annotated.push(AnnotatedSample {
                    season: s.season,
                    weekday: s.weekday,
                    class,
                    time: s.time,
                    load_kw: s.load_kw,
                    tou_price: price,
                    tou_tag: tag,
                    tou_level: TouLevel::Other,
                }),
                None => missing += 1,
            }
        }
        if missing > 0 {
            return Err(SimError::Validation(format!(
                "{missing} samples have no TOU schedule entry for plan {plan:?}"
            )));
        }

        // Group-relative level: max price in the (season, weekday)
        // group is high, min is low.
        let mut extremes: HashMap<(Season, u8), (f64, f64)> = HashMap::new();
        for s in &annotated {
            let e = extremes
                .entry((s.season, weekday_index(s.weekday)))
                .or_insert((f64::NEG_INFINITY, f64::INFINITY));
            e.0 = e.0.max(s.tou_price);
            e.1 = e.1.min(s.tou_price);
        }
        for s in &mut annotated {
            let (max, min) = extremes[&(s.season, weekday_index(s.weekday))];
            s.tou_level = if s.tou_price == max {
                TouLevel::High
            } else if s.tou_price == min {
                TouLevel::Low
            } else {
                TouLevel::Other
            };
        }

        Ok(AnnotatedLoadProfile { samples: annotated })
    }
}

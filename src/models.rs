//! Core domain types for the TOU evaluation engine.

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tariff season. Taiwan plans split the year into a summer and a
/// non-summer pricing period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Summer,
    NotSummer,
}

impl Season {
    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Summer => "summer",
            Season::NotSummer => "not_summer",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Three-way day classing used by the published TOU schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekdayClass {
    Week,
    Sat,
    Sun,
}

impl WeekdayClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeekdayClass::Week => "week",
            WeekdayClass::Sat => "sat",
            WeekdayClass::Sun => "sun",
        }
    }

    /// Number of distinct weekdays that fold into this class.
    pub fn member_days(&self) -> f64 {
        match self {
            WeekdayClass::Week => 5.0,
            WeekdayClass::Sat | WeekdayClass::Sun => 1.0,
        }
    }
}

impl fmt::Display for WeekdayClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a calendar weekday to its TOU schedule class. Sundays (and
/// flagged holidays, which the profile layer classes as Sunday) share
/// the off-peak-only schedule.
pub fn weekday_class(day: Weekday) -> WeekdayClass {
    match day {
        Weekday::Sat => WeekdayClass::Sat,
        Weekday::Sun => WeekdayClass::Sun,
        _ => WeekdayClass::Week,
    }
}

/// Ordinal used for stable grouping and ordering of weekday rows.
pub fn weekday_index(day: Weekday) -> u8 {
    day.num_days_from_monday() as u8
}

/// TOU slot tag as published in the tariff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TouTag {
    #[serde(rename = "尖峰")]
    Peak,
    #[serde(rename = "半尖峰")]
    SemiPeak,
    #[serde(rename = "週六半尖峰")]
    SaturdaySemiPeak,
    #[serde(rename = "離峰")]
    OffPeak,
}

impl TouTag {
    pub const ALL: [TouTag; 4] = [
        TouTag::Peak,
        TouTag::SemiPeak,
        TouTag::SaturdaySemiPeak,
        TouTag::OffPeak,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TouTag::Peak => "尖峰",
            TouTag::SemiPeak => "半尖峰",
            TouTag::SaturdaySemiPeak => "週六半尖峰",
            TouTag::OffPeak => "離峰",
        }
    }

    /// Allocation priority when attributing over-capacity energy to
    /// contract tiers. Lower sorts first.
    pub fn priority(&self) -> u8 {
        match self {
            TouTag::Peak => 1,
            TouTag::SemiPeak => 2,
            TouTag::SaturdaySemiPeak => 3,
            TouTag::OffPeak => 4,
        }
    }

    /// Weight applied to over-capacity energy when estimating the load
    /// the battery must still absorb after shifting.
    pub fn dispatch_weight(&self) -> f64 {
        match self {
            TouTag::Peak => 0.0,
            TouTag::SemiPeak => 0.52,
            TouTag::SaturdaySemiPeak => 0.0,
            TouTag::OffPeak => 1.0,
        }
    }

    pub fn parse(s: &str) -> Option<TouTag> {
        match s {
            "尖峰" => Some(TouTag::Peak),
            "半尖峰" => Some(TouTag::SemiPeak),
            "週六半尖峰" => Some(TouTag::SaturdaySemiPeak),
            "離峰" => Some(TouTag::OffPeak),
            _ => None,
        }
    }
}

impl fmt::Display for TouTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Price level of a slot relative to the other slots sharing its
/// (season, weekday) group: the group's maximum price is `High`, the
/// minimum is `Low`, everything between is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TouLevel {
    High,
    Low,
    Other,
}

/// One 15-minute sample of the representative week, before tariff
/// annotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub season: Season,
    pub weekday: Weekday,
    pub time: NaiveTime,
    pub load_kw: f64,
}

/// A raw sample joined against the TOU schedule for its plan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnotatedSample {
    pub season: Season,
    pub weekday: Weekday,
    pub class: WeekdayClass,
    pub time: NaiveTime,
    pub load_kw: f64,
    pub tou_price: f64,
    pub tou_tag: TouTag,
    pub tou_level: TouLevel,
}

/// Representative-week load profile annotated with TOU prices, tags
/// and group-relative levels. At most 2 seasons x 7 weekdays x 96
/// slots.
#[derive(Debug, Clone, Default)]
pub struct AnnotatedLoadProfile {
    pub samples: Vec<AnnotatedSample>,
}

impl AnnotatedLoadProfile {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum observed load across the whole week, in kW.
    pub fn max_load_kw(&self) -> f64 {
        self.samples.iter().map(|s| s.load_kw).fold(0.0, f64::max)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnnotatedSample> {
        self.samples.iter()
    }
}

/// Contract capacities in kW for the four stackable tiers.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ContractCapacity {
    #[serde(rename = "經常契約")]
    pub regular_kw: f64,
    #[serde(rename = "半尖峰契約/非夏月契約")]
    pub secondary_kw: f64,
    #[serde(rename = "週六半尖峰契約")]
    pub saturday_kw: f64,
    #[serde(rename = "離峰契約")]
    pub off_peak_kw: f64,
}

impl ContractCapacity {
    pub fn total_kw(&self) -> f64 {
        self.regular_kw + self.secondary_kw + self.saturday_kw + self.off_peak_kw
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        let fields = [
            ("經常契約", self.regular_kw),
            ("半尖峰契約/非夏月契約", self.secondary_kw),
            ("週六半尖峰契約", self.saturday_kw),
            ("離峰契約", self.off_peak_kw),
        ];
        for (name, v) in fields {
            if !v.is_finite() || v < 0.0 {
                return Err(crate::error::SimError::Validation(format!(
                    "contract capacity {name} must be a non-negative number, got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// Inclusive time window over 15-minute slot starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> TimeWindow {
        TimeWindow { start, end }
    }

    /// Whether a slot start falls inside the window, inclusive on both
    /// ends.
    pub fn contains(&self, t: NaiveTime) -> bool {
        t >= self.start && t <= self.end
    }

    /// Whether a slot start falls inside the window, end-exclusive.
    /// DR program windows quote their end as the first excluded slot.
    pub fn contains_half_open(&self, t: NaiveTime) -> bool {
        t >= self.start && t < self.end
    }
}

/// Round to `digits` decimal places, half away from zero.
pub fn round_to(value: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (value * scale).round() / scale
}

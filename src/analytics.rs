use crate::models::{FlagKey, MetricKey, Phase};
use crate::records::RecordStore;
use chrono::{Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_WINDOW: usize = 5;
/// Misses tolerated inside one epoch week before a streak breaks.
const MISSES_PER_WEEK: u32 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsRange {
    Week,
    #[default]
    Month,
    Quarter,
    Year,
    All,
}

impl StatsRange {
    fn days(self) -> Option<i64> {
        match self {
            StatsRange::Week => Some(7),
            StatsRange::Month => Some(30),
            StatsRange::Quarter => Some(90),
            StatsRange::Year => Some(365),
            StatsRange::All => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollingPoint {
    pub date: String,
    pub value: Option<f64>,
    pub average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MetricSummary {
    NoData,
    Tracked {
        latest: f64,
        min: f64,
        max: f64,
        mean: f64,
        samples: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MetricProgress {
    NoData {
        goal: Option<f64>,
    },
    Tracked {
        start: f64,
        current: f64,
        change: f64,
        weekly_avg: f64,
        week_change: f64,
        goal: Option<f64>,
        remaining: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseStats {
    pub phase_id: i64,
    pub name: String,
    pub elapsed_days: i64,
    pub elapsed_weeks: f64,
    pub metrics: BTreeMap<MetricKey, MetricProgress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreakPoint {
    pub flag: FlagKey,
    pub days: u32,
}

pub fn dates_in_range(records: &RecordStore, range: StatsRange) -> Vec<String> {
    dates_in_range_at(Local::now().date_naive(), records, range)
}

/// Ascending dates inside `range`, counted back from `today` inclusive.
pub fn dates_in_range_at(
    today: NaiveDate,
    records: &RecordStore,
    range: StatsRange,
) -> Vec<String> {
    let cutoff = range.days().map(|days| date_key(today - Duration::days(days - 1)));
    records
        .all_dates()
        .filter(|date| cutoff.as_deref().is_none_or(|cutoff| *date >= cutoff))
        .map(str::to_string)
        .collect()
}

/// Trailing mean of `metric` over the last `window` positions of `dates`.
/// Positions whose value is missing or not a number still occupy a slot in
/// the window but contribute nothing to the mean.
pub fn rolling_average(
    records: &RecordStore,
    dates: &[String],
    metric: MetricKey,
    window: usize,
) -> Vec<RollingPoint> {
    let window = window.max(1);
    let values: Vec<Option<f64>> = dates
        .iter()
        .map(|date| records.get(date).and_then(|entry| entry.numeric(metric)))
        .collect();

    values
        .iter()
        .enumerate()
        .map(|(idx, value)| {
            let from = (idx + 1).saturating_sub(window);
            let numeric: Vec<f64> = values[from..=idx].iter().flatten().copied().collect();
            let average = if numeric.is_empty() {
                None
            } else {
                Some(numeric.iter().sum::<f64>() / numeric.len() as f64)
            };
            RollingPoint {
                date: dates[idx].clone(),
                value: *value,
                average,
            }
        })
        .collect()
}

pub fn metric_summary(records: &RecordStore, dates: &[String], metric: MetricKey) -> MetricSummary {
    let samples: Vec<f64> = dates
        .iter()
        .filter_map(|date| records.get(date).and_then(|entry| entry.numeric(metric)))
        .collect();
    let Some(&latest) = samples.last() else {
        return MetricSummary::NoData;
    };
    MetricSummary::Tracked {
        latest,
        min: samples.iter().copied().fold(f64::INFINITY, f64::min),
        max: samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        mean: samples.iter().sum::<f64>() / samples.len() as f64,
        samples: samples.len(),
    }
}

pub fn phase_stats(records: &RecordStore, phase: &Phase) -> PhaseStats {
    phase_stats_at(Local::now().date_naive(), records, phase)
}

pub fn phase_stats_at(today: NaiveDate, records: &RecordStore, phase: &Phase) -> PhaseStats {
    let elapsed_days = parse_date(&phase.start)
        .map(|start| (today - start).num_days())
        .unwrap_or(0);
    let elapsed_weeks = elapsed_days as f64 / 7.0;
    let week_cutoff = date_key(today - Duration::days(7));
    let today_key = date_key(today);

    let in_phase: Vec<&str> = records.all_dates().filter(|date| phase.contains(date)).collect();

    let metrics = MetricKey::ALL
        .into_iter()
        .map(|metric| {
            let goal = phase.goal(metric);
            let samples: Vec<(&str, f64)> = in_phase
                .iter()
                .filter_map(|date| {
                    records
                        .get(date)
                        .and_then(|entry| entry.numeric(metric))
                        .map(|value| (*date, value))
                })
                .collect();

            let progress = match (samples.first(), samples.last()) {
                (Some(&(_, start)), Some(&(_, current))) => {
                    let change = current - start;
                    let weekly_avg = if elapsed_days > 0 {
                        change / elapsed_weeks
                    } else {
                        0.0
                    };
                    let last_week: Vec<f64> = samples
                        .iter()
                        .filter(|(date, _)| {
                            *date >= week_cutoff.as_str() && *date <= today_key.as_str()
                        })
                        .map(|(_, value)| *value)
                        .collect();
                    let week_change = match (last_week.first(), last_week.last()) {
                        (Some(first), Some(last)) if last_week.len() >= 2 => last - first,
                        _ => 0.0,
                    };
                    MetricProgress::Tracked {
                        start,
                        current,
                        change,
                        weekly_avg,
                        week_change,
                        goal,
                        remaining: goal.map(|goal| goal - current),
                    }
                }
                _ => MetricProgress::NoData { goal },
            };
            (metric, progress)
        })
        .collect();

    PhaseStats {
        phase_id: phase.id,
        name: phase.name.clone(),
        elapsed_days,
        elapsed_weeks,
        metrics,
    }
}

/// Adherence streak for `flag`, walking logged days newest first. Weeks are
/// `days_since_epoch / 7` buckets; each bucket tolerates up to two misses and
/// the third one ends the streak.
pub fn streak(records: &RecordStore, flag: FlagKey) -> u32 {
    let mut days = 0;
    let mut week = None;
    let mut misses = 0;

    for (date, entry) in records.iter().rev() {
        let Some(day) = parse_date(date).map(days_since_epoch) else {
            continue;
        };
        let bucket = day.div_euclid(7);
        if week != Some(bucket) {
            week = Some(bucket);
            misses = 0;
        }
        if entry.flag(flag) {
            days += 1;
        } else {
            misses += 1;
            if misses > MISSES_PER_WEEK {
                break;
            }
        }
    }
    days
}

pub fn streaks(records: &RecordStore) -> Vec<StreakPoint> {
    FlagKey::ALL
        .into_iter()
        .map(|flag| StreakPoint {
            flag,
            days: streak(records, flag),
        })
        .collect()
}

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

fn days_since_epoch(date: NaiveDate) -> i64 {
    (date - NaiveDate::default()).num_days()
}

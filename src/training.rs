//! Training aggregates behind the charts.
//!
//! Runs are summed per calendar day (UTC) and per week ending Sunday. Each
//! day also carries Tanda's prediction twice: once as if that day's run were
//! repeated every day of the week, and once over the trailing eight weeks,
//! which is the window the formula was fitted on.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::activity::Activity;
use crate::tanda::{marathon_hours, pace_label};

pub const ROLLING_WEEKS: i64 = 8;

/// Rows of the progression trail on the predictor chart.
pub const PROGRESSION_DAYS: usize = 56;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyVolume {
    /// The Sunday closing the week.
    pub week: NaiveDate,
    /// Rounded to 0.1 km.
    pub distance_km: f64,
}

/// One day with at least one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRun {
    pub date: NaiveDate,
    /// Position of the day in the log, oldest first.
    pub date_factor: usize,
    pub distance_km: f64,
    pub time_seconds: f64,
    pub pace_sec_per_km: f64,
    pub daily_pace_pretty: String,
    pub tanda_day: f64,
    pub tanda_day_pretty: String,
    pub rolling_km_per_week: f64,
    pub rolling_km_per_week_daily_distance: f64,
    pub rolling_pace_sec_per_km: f64,
    pub rolling_pace_pretty: String,
    pub rolling_tanda_day: f64,
    pub rolling_tanda_day_pretty: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrainingSummary {
    pub weekly: Vec<WeeklyVolume>,
    /// Top of the weekly chart's y axis: mean + 2 standard deviations.
    pub upper_limit: f64,
    pub daily: Vec<DailyRun>,
}

impl TrainingSummary {
    pub fn from_activities(activities: &[Activity]) -> Self {
        let runs: Vec<&Activity> = activities.iter().filter(|a| a.is_run()).collect();
        let weekly = weekly_volume(&runs);
        let upper_limit = upper_limit(&weekly);
        let daily = daily_runs(&runs);
        tracing::debug!(
            runs = runs.len(),
            weeks = weekly.len(),
            days = daily.len(),
            "training summary built"
        );
        Self {
            weekly,
            upper_limit,
            daily,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.daily.is_empty()
    }

    pub fn latest(&self) -> Option<&DailyRun> {
        self.daily.last()
    }

    /// The most recent days, oldest first.
    pub fn progression(&self) -> &[DailyRun] {
        let start = self.daily.len().saturating_sub(PROGRESSION_DAYS);
        &self.daily[start..]
    }
}

/// The Sunday on or after `date`.
pub fn week_ending(date: NaiveDate) -> NaiveDate {
    let days_to_sunday = 6 - date.weekday().num_days_from_monday() as i64;
    date + Duration::days(days_to_sunday)
}

/// Distance per week, including zero weeks between the first and last run.
pub fn weekly_volume(runs: &[&Activity]) -> Vec<WeeklyVolume> {
    let mut meters: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for run in runs {
        *meters.entry(week_ending(run.start_date.date_naive())).or_default() += run.distance_meters;
    }
    let (Some(&first), Some(&last)) = (meters.keys().next(), meters.keys().next_back()) else {
        return Vec::new();
    };

    let mut weeks = Vec::new();
    let mut week = first;
    while week <= last {
        let m = meters.get(&week).copied().unwrap_or(0.0);
        weeks.push(WeeklyVolume {
            week,
            distance_km: (m / 100.0).round() / 10.0,
        });
        week += Duration::days(7);
    }
    weeks
}

/// Mean plus two sample standard deviations. With fewer than two weeks the
/// deviation is taken as zero.
pub fn upper_limit(weeks: &[WeeklyVolume]) -> f64 {
    if weeks.is_empty() {
        return 0.0;
    }
    let n = weeks.len() as f64;
    let mean = weeks.iter().map(|w| w.distance_km).sum::<f64>() / n;
    let std = if weeks.len() < 2 {
        0.0
    } else {
        let var = weeks
            .iter()
            .map(|w| (w.distance_km - mean).powi(2))
            .sum::<f64>()
            / (n - 1.0);
        var.sqrt()
    };
    mean + 2.0 * std
}

/// Per-day totals with daily and trailing eight-week Tanda predictions.
pub fn daily_runs(runs: &[&Activity]) -> Vec<DailyRun> {
    let mut totals: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
    for run in runs {
        let entry = totals.entry(run.start_date.date_naive()).or_default();
        entry.0 += run.distance_meters;
        entry.1 += run.time_seconds;
    }
    let days: Vec<(NaiveDate, f64, f64)> = totals.into_iter().map(|(d, (m, s))| (d, m, s)).collect();

    let window = Duration::days(ROLLING_WEEKS * 7);
    let mut window_start = 0;
    let mut rolling_meters = 0.0;
    let mut rolling_seconds = 0.0;
    let mut out = Vec::with_capacity(days.len());

    for (i, &(date, meters, seconds)) in days.iter().enumerate() {
        rolling_meters += meters;
        rolling_seconds += seconds;
        // The window is (date - 56 days, date].
        while days[window_start].0 <= date - window {
            rolling_meters -= days[window_start].1;
            rolling_seconds -= days[window_start].2;
            window_start += 1;
        }

        let distance_km = meters / 1000.0;
        let pace = seconds / distance_km;
        let tanda_day = marathon_hours(distance_km * 7.0, pace);

        let rolling_km_per_week = rolling_meters / 1000.0 / ROLLING_WEEKS as f64;
        let rolling_pace = rolling_seconds / rolling_meters * 1000.0;
        let rolling_tanda_day = marathon_hours(rolling_km_per_week, rolling_pace);

        out.push(DailyRun {
            date,
            date_factor: i,
            distance_km,
            time_seconds: seconds,
            pace_sec_per_km: pace,
            daily_pace_pretty: pace_label(pace),
            tanda_day,
            tanda_day_pretty: hours_as_clock(tanda_day),
            rolling_km_per_week,
            rolling_km_per_week_daily_distance: rolling_km_per_week / 7.0,
            rolling_pace_sec_per_km: rolling_pace,
            rolling_pace_pretty: pace_label(rolling_pace),
            rolling_tanda_day,
            rolling_tanda_day_pretty: hours_as_clock(rolling_tanda_day),
        });
    }
    out
}

/// A duration in hours as a time of day on 1970-01-01, which is what the
/// charts' `hoursminutes` time unit reads.
pub fn hours_as_clock(hours: f64) -> String {
    let secs = (hours * 3600.0).round().max(0.0) as u64;
    format!(
        "1970-01-01T{:02}:{:02}:{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

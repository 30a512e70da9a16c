//! Training activities: the local file format and the built-in sample log.
//!
//! An activity file is a JSON array in the shape Strava's activity export
//! uses:
//!
//! ```json
//! [{ "start_date": "2024-06-02T06:30:00Z", "distance_meters": 16000.0,
//!    "time_seconds": 5840.0, "type": "Run" }]
//! ```
//!
//! Without a file the charts are drawn from [`sample_activities`].

use std::path::Path;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

/// How far back the charts look.
pub const DAYS_BACK: i64 = 180;

const RUN: &str = "Run";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub start_date: DateTime<Utc>,
    pub distance_meters: f64,
    /// Moving time.
    pub time_seconds: f64,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
}

fn default_kind() -> String {
    RUN.to_string()
}

impl Activity {
    pub fn run(start_date: DateTime<Utc>, distance_meters: f64, time_seconds: f64) -> Self {
        Self {
            start_date,
            distance_meters,
            time_seconds,
            kind: default_kind(),
        }
    }

    /// A run with a usable distance and time. Everything else is ignored by
    /// the training aggregates.
    pub fn is_run(&self) -> bool {
        self.kind == RUN && self.distance_meters > 0.0 && self.time_seconds > 0.0
    }
}

pub fn load_activities(path: &Path) -> Result<Vec<Activity>> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|source| ChatError::Activities {
        path: path.display().to_string(),
        source,
    })
}

/// Activities that started at most `days` before `reference`.
pub fn recent(activities: &[Activity], days: i64, reference: DateTime<Utc>) -> Vec<Activity> {
    let cutoff = reference - Duration::days(days);
    activities
        .iter()
        .filter(|a| a.start_date >= cutoff)
        .cloned()
        .collect()
}

/// Activities for the charts: the last [`DAYS_BACK`] days of `path`, counted
/// back from its latest activity, or the sample log ending today.
pub fn load_recent(path: Option<&Path>) -> Result<Vec<Activity>> {
    match path {
        Some(p) => {
            let all = load_activities(p)?;
            let kept = match all.iter().map(|a| a.start_date).max() {
                Some(latest) => recent(&all, DAYS_BACK, latest),
                None => all,
            };
            tracing::info!(path = %p.display(), activities = kept.len(), "loaded activities");
            Ok(kept)
        }
        None => {
            tracing::info!("no activity file configured, using sample training log");
            Ok(sample_activities(Utc::now().date_naive()))
        }
    }
}

/// A plausible half-year build: five runs a week with a Sunday long run,
/// volume growing and pace improving week over week, every fourth week
/// easier. Deterministic for a given `end` date.
pub fn sample_activities(end: NaiveDate) -> Vec<Activity> {
    let start = end - Duration::days(DAYS_BACK - 1);
    let mut activities = Vec::new();

    for offset in 0..DAYS_BACK {
        let date = start + Duration::days(offset);
        let Some((km, pace)) = sample_session(date.weekday()) else {
            continue;
        };
        let week = offset / 7;
        let mut volume = 1.0 + 0.015 * week as f64;
        if week % 4 == 3 {
            volume *= 0.7;
        }
        let distance_meters = (km * volume * 100.0).round() * 10.0;
        let pace = pace - 0.6 * week as f64;
        let Some(at) = date.and_hms_opt(6, 30, 0) else {
            continue;
        };
        activities.push(Activity::run(
            Utc.from_utc_datetime(&at),
            distance_meters,
            (distance_meters / 1000.0 * pace).round(),
        ));
    }
    activities
}

/// Base distance (km) and pace (s/km) per weekday.
fn sample_session(day: Weekday) -> Option<(f64, f64)> {
    match day {
        Weekday::Mon | Weekday::Fri => None,
        Weekday::Tue => Some((8.0, 330.0)),
        Weekday::Wed => Some((10.0, 345.0)),
        Weekday::Thu => Some((6.0, 315.0)),
        Weekday::Sat => Some((6.0, 360.0)),
        Weekday::Sun => Some((16.0, 365.0)),
    }
}

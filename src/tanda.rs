//! Tanda marathon prediction.
//!
//! Tanda's regression predicts marathon pace from the last eight weeks of
//! training: weekly volume `K` (km/week) and mean training pace `P`
//! (seconds/km):
//!
//! ```text
//! Pm = 17.1 + 140 * exp(-0.0053 * K) + 0.55 * P
//! ```

use serde::{Deserialize, Serialize};

pub const MARATHON_KM: f64 = 42.195;

fn volume_term(km_per_week: f64) -> f64 {
    17.1 + 140.0 * (-0.0053 * km_per_week).exp()
}

/// Predicted marathon time in hours.
pub fn marathon_hours(km_per_week: f64, pace_sec_per_km: f64) -> f64 {
    let marathon_pace = volume_term(km_per_week) + 0.55 * pace_sec_per_km;
    MARATHON_KM * marathon_pace / 3600.0
}

/// Training pace (seconds/km) needed at `km_per_week` to reach `hours`.
pub fn pace_for_marathon(km_per_week: f64, hours: f64) -> f64 {
    let marathon_pace = hours * 3600.0 / MARATHON_KM;
    (marathon_pace - volume_term(km_per_week)) / 0.55
}

/// "3 hours 24 minutes". Thirty seconds or more round up to the next minute.
pub fn pretty_marathon_time(hours: f64) -> String {
    let whole_hours = hours.trunc();
    let minutes_f = (hours - whole_hours) * 60.0;
    let mut h = whole_hours as u64;
    let mut minutes = minutes_f.trunc() as u64;
    let seconds = ((minutes_f - minutes_f.trunc()) * 60.0).trunc() as u64;
    if seconds >= 30 {
        minutes += 1;
    }
    if minutes == 60 {
        h += 1;
        minutes = 0;
    }
    format!("{} hours {} minutes", h, minutes)
}

/// "m:ss" label for a pace in seconds per km.
pub fn pace_label(sec_per_km: f64) -> String {
    let total = sec_per_km.max(0.0).trunc() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// One point of a constant-marathon-time curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarathonPoint {
    pub marathon_time: f64,
    pub km_day: u32,
    pub km_week: u32,
    pub pace: f64,
    pub formatted_pace: String,
}

/// Curves of equal predicted marathon time, 2:30 to 4:15 in quarter hours,
/// over 0..50 km per day.
pub fn marathon_curves() -> Vec<MarathonPoint> {
    let mut points = Vec::with_capacity(8 * 50);
    for step in 0..8 {
        let marathon_time = 2.5 + 0.25 * step as f64;
        for km_day in 0..50u32 {
            let km_week = km_day * 7;
            let pace = pace_for_marathon(km_week as f64, marathon_time);
            points.push(MarathonPoint {
                marathon_time,
                km_day,
                km_week,
                pace,
                formatted_pace: pace_label(pace),
            });
        }
    }
    points
}

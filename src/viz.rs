//! Visualization payload: element id → serialized Vega-Lite spec.
//!
//! The browser parses the payload once at load and again on every theme
//! change, handing each spec to vega-embed. Nothing here renders.

use std::collections::BTreeMap;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::activity::load_recent;
use crate::config::VisualizationConfig;
use crate::error::Result;
use crate::tanda::marathon_curves;
use crate::training::{DailyRun, TrainingSummary, WeeklyVolume, PROGRESSION_DAYS};

pub const MARATHON_PREDICTOR_ID: &str = "marathon-predictor";
pub const WEEKLY_CHART_ID: &str = "weekly-chart";
pub const ROLLING_TANDA_ID: &str = "rolling-tanda";

const VEGA_LITE_SCHEMA: &str = "https://vega.github.io/schema/vega-lite/v5.json";

const VOLUME_COLOR: &str = "#ff561b";
const TANDA_DAY_COLOR: &str = "#b95cf4";
const PROGRESSION_COLOR: &str = "#e739bd";

const TANDA_DAY_LABEL: &str = "Tanda day";
const ROLLING_TANDA_LABEL: &str = "8-week rolling Tanda day";
const PROGRESSION_LABEL: &str = "Tanda Progression line";

const PACE_LABEL_EXPR: &str = "datum.value > 0 ? timeFormat(datum.value * 1000, '%M:%S') : ''";
const HOURS_LABEL_EXPR: &str =
    "floor(datum.value) + ':' + (floor((datum.value % 1) * 60) < 10 ? '0' : '') + floor((datum.value % 1) * 60)";

/// Pace axis ticks, 4:00 to 7:45 per km.
const PACE_TICKS: std::ops::Range<u32> = 240..480;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    /// vega-themes name passed to vega-embed.
    pub fn vega_theme(self) -> &'static str {
        match self {
            Theme::Light => "default",
            Theme::Dark => "dark",
        }
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Theme::Light => write!(f, "light"),
            Theme::Dark => write!(f, "dark"),
        }
    }
}

/// Ordered map of target element id to serialized chart spec.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisualizationSpecs(BTreeMap<String, String>);

impl VisualizationSpecs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, spec: &serde_json::Value) {
        self.0.insert(id.into(), spec.to_string());
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.0.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// JSON for a `<script type="application/json">` block. `<`, `>` and `&`
    /// are escaped so a spec can never close the script element.
    pub fn payload_json(&self) -> String {
        let json = serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string());
        script_safe(&json)
    }

    /// The predictor alone, with no training data drawn over it.
    pub fn standard() -> Self {
        let mut specs = Self::new();
        specs.insert(MARATHON_PREDICTOR_ID, &marathon_predictor_spec(&[]));
        specs
    }

    /// All three charts for a training log. An empty log falls back to
    /// [`VisualizationSpecs::standard`].
    pub fn from_training(summary: &TrainingSummary) -> Self {
        if summary.is_empty() {
            return Self::standard();
        }
        let mut specs = Self::new();
        specs.insert(WEEKLY_CHART_ID, &weekly_chart_spec(&summary.weekly, summary.upper_limit));
        specs.insert(ROLLING_TANDA_ID, &rolling_tanda_spec(&summary.daily));
        specs.insert(MARATHON_PREDICTOR_ID, &marathon_predictor_spec(&summary.daily));
        specs
    }

    /// Charts for the configured activity file, or the sample log without one.
    pub fn from_config(config: &VisualizationConfig) -> Result<Self> {
        let activities = load_recent(config.activities.as_deref())?;
        Ok(Self::from_training(&TrainingSummary::from_activities(&activities)))
    }
}

/// Escape `<`, `>` and `&` in serialized JSON so it can sit inside a script
/// element. The result still parses to the same value.
pub(crate) fn script_safe(json: &str) -> String {
    json.replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}

fn pace_y(field: &str) -> serde_json::Value {
    let ticks: Vec<u32> = PACE_TICKS.step_by(15).collect();
    let domain = [PACE_TICKS.start, PACE_TICKS.end - 15];
    json!({
        "field": field,
        "type": "quantitative",
        "title": "Pace (mm:ss)",
        "scale": { "reverse": true, "zero": false, "domain": domain },
        "axis": { "values": ticks, "labelExpr": PACE_LABEL_EXPR }
    })
}

/// Distance per week as a gradient area with the weekly total above each
/// point. The y axis stops at `upper_limit` so one huge week does not
/// flatten the rest; drag to pan, scroll to zoom.
pub fn weekly_chart_spec(weekly: &[WeeklyVolume], upper_limit: f64) -> serde_json::Value {
    json!({
        "$schema": VEGA_LITE_SCHEMA,
        "title": "Running distance per week (km)",
        "width": "container",
        "height": 150,
        "data": { "values": weekly },
        "encoding": {
            "x": { "field": "week", "type": "temporal", "title": null },
            "y": {
                "field": "distance_km",
                "type": "quantitative",
                "title": null,
                "scale": { "domain": [0.0, upper_limit.max(1.0)] }
            },
            "tooltip": [
                { "field": "week", "type": "temporal", "title": "Week ending" },
                { "field": "distance_km", "type": "quantitative", "title": "Distance (km)" }
            ]
        },
        "layer": [
            {
                "params": [{ "name": "grid", "select": "interval", "bind": "scales" }],
                "mark": {
                    "type": "area",
                    "line": { "color": VOLUME_COLOR },
                    "color": {
                        "gradient": "linear",
                        "x1": 1, "y1": 1, "x2": 1, "y2": 0,
                        "stops": [
                            { "offset": 0, "color": "white" },
                            { "offset": 1, "color": VOLUME_COLOR }
                        ]
                    }
                }
            },
            {
                "mark": { "type": "text", "dy": -8, "color": VOLUME_COLOR },
                "encoding": {
                    "text": { "field": "distance_km", "type": "quantitative", "format": "d" }
                }
            }
        ]
    })
}

/// Each day's Tanda prediction against the trailing eight-week one.
pub fn rolling_tanda_spec(daily: &[DailyRun]) -> serde_json::Value {
    let color = json!({
        "field": "type",
        "type": "nominal",
        "title": null,
        "scale": {
            "domain": [TANDA_DAY_LABEL, ROLLING_TANDA_LABEL],
            "range": [TANDA_DAY_COLOR, VOLUME_COLOR]
        },
        "legend": { "orient": "top" }
    });
    let clock_y = |field: &str| {
        json!({
            "field": field,
            "timeUnit": "hoursminutes",
            "type": "ordinal",
            "title": "Marathon time",
            "sort": "descending"
        })
    };
    json!({
        "$schema": VEGA_LITE_SCHEMA,
        "title": "Tanda day vs. 8-week rolling Tanda day",
        "width": "container",
        "height": 250,
        "data": { "values": daily },
        "encoding": {
            "x": { "field": "date", "type": "temporal", "title": null }
        },
        "layer": [
            {
                "transform": [{ "calculate": format!("'{}'", TANDA_DAY_LABEL), "as": "type" }],
                "mark": { "type": "point", "shape": "triangle-up", "filled": true },
                "encoding": {
                    "y": clock_y("tanda_day_pretty"),
                    "color": color.clone(),
                    "tooltip": [
                        { "field": "date", "type": "temporal", "title": "Date" },
                        { "field": "distance_km", "type": "quantitative", "title": "Distance (km)", "format": ".1f" },
                        { "field": "daily_pace_pretty", "type": "nominal", "title": "Pace (mm:ss)" },
                        { "field": "tanda_day_pretty", "type": "temporal", "timeUnit": "hoursminutes", "title": "Tanda day" }
                    ]
                }
            },
            {
                "transform": [{ "calculate": format!("'{}'", ROLLING_TANDA_LABEL), "as": "type" }],
                "mark": { "type": "line", "interpolate": "basis" },
                "encoding": {
                    "y": clock_y("rolling_tanda_day_pretty"),
                    "color": color,
                    "tooltip": [
                        { "field": "date", "type": "temporal", "title": "Date" },
                        { "field": "rolling_km_per_week", "type": "quantitative", "title": "km/week", "format": ".1f" },
                        { "field": "rolling_pace_pretty", "type": "nominal", "title": "Pace (mm:ss)" },
                        { "field": "rolling_tanda_day_pretty", "type": "temporal", "timeUnit": "hoursminutes", "title": "Rolling Tanda day" }
                    ]
                }
            }
        ]
    })
}

/// Lines of equal predicted marathon time over daily distance and pace.
/// With training data, each run is drawn as a point (the latest in black)
/// and the last eight weeks of rolling volume and pace as a trail.
pub fn marathon_predictor_spec(daily: &[DailyRun]) -> serde_json::Value {
    let curves = json!({
        "data": { "values": marathon_curves() },
        "mark": { "type": "line", "interpolate": "basis" },
        "encoding": {
            "x": { "field": "km_day", "type": "quantitative", "title": "Daily Distance (km)" },
            "y": pace_y("pace"),
            "color": {
                "field": "marathon_time",
                "type": "nominal",
                "scale": { "scheme": "turbo" },
                "legend": { "title": null, "labelExpr": HOURS_LABEL_EXPR }
            },
            "tooltip": [
                { "field": "km_day", "type": "quantitative", "title": "Distance (km)" },
                { "field": "formatted_pace", "type": "nominal", "title": "Pace (mm:ss)" },
                { "field": "marathon_time", "type": "quantitative", "title": "Marathon time (hours)" }
            ]
        }
    });
    let mut layers = vec![curves];

    if let Some(latest) = daily.last() {
        let max_km = daily.iter().map(|d| d.distance_km).fold(0.0, f64::max);
        let tick_count = (max_km / 5.0).floor().max(1.0) as u32;
        layers.push(json!({
            "data": { "values": daily },
            "mark": { "type": "point", "filled": true, "size": 40 },
            "encoding": {
                "x": {
                    "field": "distance_km",
                    "type": "quantitative",
                    "title": "Daily Distance (km)",
                    "axis": { "tickCount": tick_count }
                },
                "y": pace_y("pace_sec_per_km"),
                "color": {
                    "condition": {
                        "test": format!("datum.date_factor == {}", latest.date_factor),
                        "value": "black"
                    },
                    "value": VOLUME_COLOR
                },
                "tooltip": [
                    { "field": "date", "type": "temporal", "title": "Date" },
                    { "field": "distance_km", "type": "quantitative", "title": "Distance (km)", "format": ".1f" },
                    { "field": "daily_pace_pretty", "type": "nominal", "title": "Pace (mm:ss)" }
                ]
            }
        }));

        let progression = &daily[daily.len().saturating_sub(PROGRESSION_DAYS)..];
        layers.push(json!({
            "data": { "values": progression },
            "mark": { "type": "trail" },
            "encoding": {
                "x": { "field": "rolling_km_per_week_daily_distance", "type": "quantitative" },
                "y": pace_y("rolling_pace_sec_per_km"),
                "size": { "field": "date_factor", "type": "quantitative", "legend": null },
                "color": {
                    "datum": PROGRESSION_LABEL,
                    "scale": { "range": [PROGRESSION_COLOR] },
                    "legend": { "title": null }
                },
                "tooltip": [
                    { "field": "date", "type": "temporal", "title": "Date" },
                    { "field": "rolling_km_per_week", "type": "quantitative", "title": "km/week", "format": ".1f" },
                    { "field": "rolling_pace_pretty", "type": "nominal", "title": "Pace (mm:ss)" }
                ]
            }
        }));
    }

    json!({
        "$schema": VEGA_LITE_SCHEMA,
        "title": "Marathon Time Predictor",
        "width": "container",
        "height": 300,
        "layer": layers,
        "resolve": { "scale": { "color": "independent" } }
    })
}

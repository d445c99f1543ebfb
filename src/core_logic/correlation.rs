//! Cross-metric correlation: aligns two prepared series on timestamp with an
//! inner join (unmatched points would bias the coefficient), computes
//! Pearson's r and fits the regression line used by the scatter overlay.

use ndarray_stats::CorrelationExt;
use polars::prelude::*;

use crate::api::models::{MetricDisplay, RegressionPoint};
use crate::collector::DataCollector;
use crate::core_logic::models::{least_squares_line, widened_range};
use crate::core_logic::orchestrator::ResolvedRequest;
use crate::core_logic::prepare::{prepare_series, PreparedSeries};
use crate::error::{Error, Result};

pub const MIN_JOINED_SAMPLES: usize = 2;

#[derive(Debug, Clone)]
pub struct CorrelationResult {
    pub joined: usize,
    pub pearson_r: f64,
    pub strength: &'static str,
    pub intercept: f64,
    pub slope: f64,
    pub line: Vec<RegressionPoint>,
    /// Joined samples, sorted by timestamp (epoch seconds).
    pub timestamps: Vec<i64>,
    pub a_values: Vec<f64>,
    pub b_values: Vec<f64>,
}

impl CorrelationResult {
    pub fn display_metrics(&self) -> Vec<MetricDisplay> {
        vec![
            MetricDisplay {
                title: "Pearson coefficient (r)".to_string(),
                value: format!("{:.2}", self.pearson_r),
            },
            MetricDisplay {
                title: "Strength".to_string(),
                value: self.strength.to_string(),
            },
            MetricDisplay {
                title: "Points analyzed".to_string(),
                value: format!("{}", self.joined),
            },
        ]
    }
}

/// Conventional interpretation of |r|.
pub fn strength_label(r: f64) -> &'static str {
    let abs = r.abs();
    if abs > 0.9 {
        "Very strong"
    } else if abs > 0.7 {
        "Strong"
    } else if abs > 0.5 {
        "Moderate"
    } else if abs > 0.3 {
        "Weak"
    } else {
        "Negligible"
    }
}

pub fn run(req: &ResolvedRequest, collector: &dyn DataCollector) -> Result<CorrelationResult> {
    let related = req.related_metric.as_deref().ok_or_else(|| {
        Error::Business("A related metric is required for correlation analysis.".to_string())
    })?;

    let raw_a = collector.collect(&req.current_window(&req.metric))?;
    let raw_b = collector.collect(&req.current_window(related))?;

    let series_a = prepare_series(&raw_a)?;
    let series_b = prepare_series(&raw_b)?;
    if series_a.is_empty() || series_b.is_empty() {
        return Err(Error::Business(
            "No data in the period for one of the metrics.".to_string(),
        ));
    }

    correlate(&series_a, &series_b)
}

/// Join on timestamp and compute the coefficient plus regression line of A
/// as a function of B.
pub fn correlate(series_a: &PreparedSeries, series_b: &PreparedSeries) -> Result<CorrelationResult> {
    let df_a = DataFrame::new(vec![
        Series::new("ts", series_a.timestamps.clone()),
        Series::new("value", series_a.values.clone()),
    ])?;
    let df_b = DataFrame::new(vec![
        Series::new("ts", series_b.timestamps.clone()),
        Series::new("value", series_b.values.clone()),
    ])?;

    let joined = df_a
        .inner_join(&df_b, ["ts"], ["ts"])?
        .sort(["ts"], false, false)?;

    let nd_array = joined
        .select(vec!["value", "value_right"])?
        .to_ndarray::<Float64Type>(IndexOrder::Fortran)?;
    let a_values: Vec<f64> = nd_array.column(0).to_vec();
    let b_values: Vec<f64> = nd_array.column(1).to_vec();
    let timestamps: Vec<i64> = joined.column("ts")?.i64()?.into_no_null_iter().collect();

    let joined_len = a_values.len();
    if joined_len < MIN_JOINED_SAMPLES {
        return Err(Error::Business(
            "Insufficient overlapping data between the two metrics.".to_string(),
        ));
    }

    let stacked = ndarray::Array2::from_shape_vec(
        (2, joined_len),
        a_values.iter().chain(b_values.iter()).copied().collect(),
    )
    .map_err(|e| Error::Stats(e.to_string()))?;
    let matrix = stacked
        .pearson_correlation()
        .map_err(|e| Error::Stats(e.to_string()))?;
    // Zero variance on either side yields NaN; normalize to "no correlation".
    let pearson_r = if matrix[[0, 1]].is_finite() {
        matrix[[0, 1]]
    } else {
        0.0
    };

    // Regression of A on B. With a constant B the slope is undefined, so the
    // line degrades to the horizontal through A's mean.
    let (intercept, slope) = least_squares_line(&b_values, &a_values)
        .unwrap_or_else(|| (a_values.iter().sum::<f64>() / joined_len as f64, 0.0));

    let b_min = b_values.iter().copied().fold(f64::INFINITY, f64::min);
    let b_max = b_values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let (x_min, x_max) = widened_range(b_min, b_max);

    let round2 = |v: f64| (v * 100.0).round() / 100.0;
    let line = vec![
        RegressionPoint {
            x: round2(x_min),
            y: round2(intercept + slope * x_min),
        },
        RegressionPoint {
            x: round2(x_max),
            y: round2(intercept + slope * x_max),
        },
    ];

    Ok(CorrelationResult {
        joined: joined_len,
        pearson_r,
        strength: strength_label(pearson_r),
        intercept,
        slope,
        line,
        timestamps,
        a_values,
        b_values,
    })
}

//! Forecast engine: fits the candidate panel on the prepared series, scores
//! every fit in-sample, projects a fixed horizon and keeps the candidate with
//! the strictly lowest RMSE (registration order breaks ties).

use rayon::prelude::*;
use tracing::debug;

use crate::collector::DataCollector;
use crate::core_logic::models::{default_panel, widened_range, FittedTrendModel};
use crate::core_logic::orchestrator::ResolvedRequest;
use crate::core_logic::prepare::{prepare_series, PreparedSeries};
use crate::error::{Error, Result};

/// Number of future buckets projected past the end of the history.
pub const FORECAST_HORIZON: usize = 5;

/// Below this many prepared samples the request is a business error; the
/// panel is never consulted.
pub const MIN_SAMPLES: usize = 5;

/// One scored member of the model panel.
#[derive(Debug, Clone)]
pub struct CandidateFit {
    pub name: &'static str,
    pub equation: String,
    pub rmse: f64,
    pub r2: f64,
    /// clamp(R2 x 100, 0, 99); a forecast is never reported as certain.
    pub reliability: f64,
    pub projections: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct ForecastResult {
    pub best: CandidateFit,
    pub history: PreparedSeries,
}

pub fn run(req: &ResolvedRequest, collector: &dyn DataCollector) -> Result<ForecastResult> {
    let raw = collector.collect(&req.current_window(&req.metric))?;
    let history = prepare_series(&raw)?;

    if history.is_empty() {
        return Err(Error::Business(
            "No historical data in the selected period.".to_string(),
        ));
    }
    if history.len() < MIN_SAMPLES {
        return Err(Error::Business(format!(
            "Insufficient historical data for a forecast (need at least {} points, got {}).",
            MIN_SAMPLES,
            history.len()
        )));
    }

    let best = select_candidate(&history.values)?;
    debug!(
        model = best.name,
        rmse = best.rmse,
        reliability = best.reliability,
        "forecast candidate selected"
    );
    Ok(ForecastResult { best, history })
}

/// Fit every registered candidate that accepts the series. Fits are
/// independent pure functions, so they run under rayon; the collected vector
/// preserves registration order regardless of completion order.
pub fn fit_panel(values: &[f64]) -> Vec<CandidateFit> {
    let xs: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();

    default_panel()
        .par_iter()
        .map(|model| {
            if values.len() < model.min_samples() {
                return None;
            }
            match model.fit(&xs, values) {
                Ok(fitted) => Some(score_candidate(model.name(), fitted.as_ref(), &xs, values)),
                Err(e) => {
                    debug!(model = model.name(), error = %e, "candidate skipped");
                    None
                }
            }
        })
        .collect::<Vec<Option<CandidateFit>>>()
        .into_iter()
        .flatten()
        .collect()
}

/// Lowest RMSE wins; on a tie the earlier-registered candidate is kept.
pub fn select_candidate(values: &[f64]) -> Result<CandidateFit> {
    fit_panel(values)
        .into_iter()
        .reduce(|best, candidate| {
            if candidate.rmse < best.rmse {
                candidate
            } else {
                best
            }
        })
        .ok_or_else(|| Error::Business("No forecasting model could be fitted.".to_string()))
}

fn score_candidate(
    name: &'static str,
    fitted: &dyn FittedTrendModel,
    xs: &[f64],
    ys: &[f64],
) -> CandidateFit {
    let predictions: Vec<f64> = xs.iter().map(|&x| fitted.predict(x)).collect();
    let (rmse, r2) = fit_metrics(ys, &predictions);

    CandidateFit {
        name,
        equation: fitted.equation(),
        rmse,
        r2,
        reliability: (r2 * 100.0).clamp(0.0, 99.0),
        projections: project(fitted, xs, FORECAST_HORIZON),
    }
}

/// RMSE plus R2 = 1 - SS_res/SS_tot, with the zero-variance series pinned to
/// R2 = 0 rather than NaN.
fn fit_metrics(ys: &[f64], predictions: &[f64]) -> (f64, f64) {
    let n = ys.len() as f64;
    let ss_res: f64 = ys
        .iter()
        .zip(predictions)
        .map(|(y, p)| (y - p).powi(2))
        .sum();
    let rmse = (ss_res / n).sqrt();

    let mean = ys.iter().sum::<f64>() / n;
    let ss_tot: f64 = ys.iter().map(|y| (y - mean).powi(2)).sum();
    let r2 = if ss_tot == 0.0 { 0.0 } else { 1.0 - ss_res / ss_tot };

    (rmse, r2)
}

/// Evaluate the fitted function at future positions spaced by the historical
/// step, widening a degenerate position range before dividing by the span.
fn project(fitted: &dyn FittedTrendModel, xs: &[f64], horizon: usize) -> Vec<f64> {
    let (min, max) = widened_range(xs[0], xs[xs.len() - 1]);
    let step = if xs.len() > 1 {
        (max - min) / (xs.len() - 1) as f64
    } else {
        1.0
    };

    (1..=horizon)
        .map(|i| fitted.predict(max + step * i as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_linear_series_selects_linear_with_near_zero_rmse() {
        let best = select_candidate(&[10.0, 12.0, 14.0, 16.0, 18.0]).unwrap();

        assert_eq!(best.name, "linear regression");
        assert_abs_diff_eq!(best.rmse, 0.0, epsilon = 1e-9);
        for (projected, expected) in best.projections.iter().zip([20.0, 22.0, 24.0, 26.0, 28.0]) {
            assert_abs_diff_eq!(*projected, expected, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_selected_candidate_has_minimal_rmse() {
        let values = [5.0, 9.0, 4.0, 11.0, 6.0, 13.0, 3.0];
        let panel = fit_panel(&values);
        let best = select_candidate(&values).unwrap();

        for candidate in &panel {
            assert!(best.rmse <= candidate.rmse);
        }
    }

    #[test]
    fn test_tie_breaks_by_registration_order() {
        // Constant series: every candidate fits perfectly, so the first
        // registered model must win.
        let best = select_candidate(&[7.0; 6]).unwrap();
        assert_eq!(best.name, "linear regression");
    }

    #[test]
    fn test_constant_series_reports_zero_reliability() {
        let best = select_candidate(&[7.0; 6]).unwrap();
        assert_eq!(best.r2, 0.0);
        assert_eq!(best.reliability, 0.0);
    }

    #[test]
    fn test_reliability_never_reaches_one_hundred() {
        let best = select_candidate(&[10.0, 12.0, 14.0, 16.0, 18.0]).unwrap();
        assert!(best.reliability <= 99.0);
        assert_abs_diff_eq!(best.reliability, 99.0, epsilon = 1e-9);
    }

    #[test]
    fn test_smoothing_candidate_requires_four_points() {
        let names: Vec<&str> = fit_panel(&[1.0, 5.0, 2.0]).iter().map(|c| c.name).collect();
        assert!(!names.contains(&"damped trend smoothing"));

        let names: Vec<&str> = fit_panel(&[1.0, 5.0, 2.0, 8.0, 3.0])
            .iter()
            .map(|c| c.name)
            .collect();
        assert!(names.contains(&"damped trend smoothing"));
    }
}

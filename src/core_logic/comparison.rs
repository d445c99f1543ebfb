//! Period-over-period comparison: the current window against the
//! immediately preceding window of the same length.

use std::fmt;

use chrono::{Duration, NaiveDate};

use crate::api::models::MetricDisplay;
use crate::collector::DataCollector;
use crate::core_logic::orchestrator::{day_start, ResolvedRequest};
use crate::core_logic::prepare::{prepare_series, PreparedSeries};
use crate::error::{Error, Result};

/// Delta between the periods, or the explicit no-history sentinel when the
/// prior period has nothing to compare against. Never NaN/Infinity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeltaOutcome {
    Percent(f64),
    NoHistory,
}

impl DeltaOutcome {
    pub fn from_totals(current_total: f64, prior_total: f64) -> DeltaOutcome {
        if prior_total > 0.0 {
            DeltaOutcome::Percent((current_total - prior_total) / prior_total * 100.0)
        } else {
            DeltaOutcome::NoHistory
        }
    }
}

impl fmt::Display for DeltaOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeltaOutcome::Percent(pct) => {
                let sign = if *pct > 0.0 { "+" } else { "" };
                write!(f, "{}{:.1}%", sign, pct)
            }
            DeltaOutcome::NoHistory => write!(f, "N/A (no history)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComparisonResult {
    pub current_total: f64,
    pub prior_total: f64,
    pub current_mean: f64,
    pub prior_mean: f64,
    pub delta: DeltaOutcome,
    pub current: PreparedSeries,
    pub prior: PreparedSeries,
}

impl ComparisonResult {
    pub fn display_metrics(&self) -> Vec<MetricDisplay> {
        vec![
            MetricDisplay {
                title: "Total (current)".to_string(),
                value: format!("{:.0}", self.current_total),
            },
            MetricDisplay {
                title: "Total (previous)".to_string(),
                value: format!("{:.0}", self.prior_total),
            },
            MetricDisplay {
                title: "Change (%)".to_string(),
                value: self.delta.to_string(),
            },
            MetricDisplay {
                title: "Mean per bucket (current)".to_string(),
                value: format!("{:.1}", self.current_mean),
            },
        ]
    }
}

/// Prior period of the same length, ending exactly one day before the
/// current period starts.
pub fn prior_period(start: NaiveDate, end: NaiveDate) -> (NaiveDate, NaiveDate) {
    let duration_days = (end - start).num_days();
    let prior_end = start - Duration::days(1);
    let prior_start = prior_end - Duration::days(duration_days);
    (prior_start, prior_end)
}

pub fn run(req: &ResolvedRequest, collector: &dyn DataCollector) -> Result<ComparisonResult> {
    let (prior_start, prior_end) = prior_period(req.start, req.end);

    let current_raw = collector.collect(&req.current_window(&req.metric))?;
    let prior_raw = collector.collect(&req.window(
        &req.metric,
        day_start(prior_start),
        day_start(prior_end),
    ))?;

    let current = prepare_series(&current_raw)?;
    if current.is_empty() {
        return Err(Error::Business(
            "No data for the selected current period.".to_string(),
        ));
    }
    // A missing prior period is not an error: its metrics degrade to zero
    // and the delta becomes the no-history sentinel.
    let prior = prepare_series(&prior_raw)?;

    let current_total = current.total();
    let prior_total = prior.total();

    Ok(ComparisonResult {
        current_total,
        prior_total,
        current_mean: current.mean(),
        prior_mean: prior.mean(),
        delta: DeltaOutcome::from_totals(current_total, prior_total),
        current,
        prior,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::{AnalysisType, Grouping};
    use crate::collector::testing::MemoryCollector;
    use crate::collector::{MachineScope, RawSample};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn request(start: NaiveDate, end: NaiveDate) -> ResolvedRequest {
        ResolvedRequest {
            analysis_type: AnalysisType::Comparison,
            metric: "total_alerts".to_string(),
            related_metric: None,
            company_id: 1,
            machine: MachineScope::All,
            component: None,
            start,
            end,
            collect_until: day_start(end),
            grouping: Grouping::Day,
        }
    }

    fn daily_samples(start: NaiveDate, values: &[f64]) -> Vec<RawSample> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| RawSample {
                ts: day_start(start + Duration::days(i as i64)),
                value: Some(v.to_string()),
            })
            .collect()
    }

    #[test]
    fn test_prior_period_mirrors_current_duration() {
        let start = date(2025, 3, 10);
        let end = date(2025, 3, 20);
        let (prior_start, prior_end) = prior_period(start, end);

        assert_eq!(prior_end - prior_start, end - start);
        assert_eq!(prior_end, start - Duration::days(1));
    }

    #[test]
    fn test_delta_formats_with_explicit_sign() {
        assert_eq!(DeltaOutcome::from_totals(150.0, 100.0).to_string(), "+50.0%");
        assert_eq!(DeltaOutcome::from_totals(75.0, 100.0).to_string(), "-25.0%");
        assert_eq!(DeltaOutcome::from_totals(100.0, 100.0).to_string(), "0.0%");
    }

    #[test]
    fn test_zero_prior_total_reports_no_history() {
        let delta = DeltaOutcome::from_totals(150.0, 0.0);
        assert_eq!(delta, DeltaOutcome::NoHistory);
        assert_eq!(delta.to_string(), "N/A (no history)");
    }

    #[test]
    fn test_run_computes_totals_and_delta() {
        let start = date(2025, 3, 11);
        let end = date(2025, 3, 15);
        let (prior_start, _) = prior_period(start, end);

        let collector = MemoryCollector::new().with_series(
            "total_alerts",
            [
                daily_samples(prior_start, &[20.0, 30.0, 25.0, 25.0]),
                daily_samples(start, &[40.0, 35.0, 45.0, 30.0]),
            ]
            .concat(),
        );

        let result = run(&request(start, end), &collector).unwrap();
        assert_eq!(result.current_total, 150.0);
        assert_eq!(result.prior_total, 100.0);
        assert_eq!(result.delta.to_string(), "+50.0%");
        assert_eq!(result.current.len(), 4);
        assert_eq!(result.prior.len(), 4);
    }

    #[test]
    fn test_empty_current_period_is_a_business_error() {
        let collector = MemoryCollector::new();
        let err = run(&request(date(2025, 3, 11), date(2025, 3, 15)), &collector).unwrap_err();
        assert!(err.is_business());
    }

    #[test]
    fn test_missing_prior_period_degrades_gracefully() {
        let start = date(2025, 3, 11);
        let collector = MemoryCollector::new()
            .with_series("total_alerts", daily_samples(start, &[40.0, 35.0]));

        let result = run(&request(start, date(2025, 3, 15)), &collector).unwrap();
        assert_eq!(result.prior_total, 0.0);
        assert_eq!(result.prior_mean, 0.0);
        assert!(result.prior.is_empty());
        assert_eq!(result.delta, DeltaOutcome::NoHistory);
    }
}

//! Orchestration: resolve the request's implicit defaults once, route it
//! into exactly one engine, attach the narrative (or its fallback) and map
//! every expected failure to a structured error envelope.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tracing::{error, warn};

use crate::adapters::narrative::{self, fallback_narrative, Narrator};
use crate::api::format::assemble_envelope;
use crate::api::models::{
    AnalysisEnvelope, AnalysisRequest, AnalysisResponse, AnalysisType, Grouping, MetricDisplay,
    ModelDescriptor,
};
use crate::collector::{DataCollector, MachineScope, SampleQuery};
use crate::core_logic::comparison::{self, ComparisonResult};
use crate::core_logic::correlation::{self, CorrelationResult};
use crate::core_logic::forecast::{self, ForecastResult};
use crate::error::{Error, Result};

/// A request with every implicit default made explicit: concrete end date,
/// collection cutoff, machine scope and derived grouping.
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    pub analysis_type: AnalysisType,
    pub metric: String,
    pub related_metric: Option<String>,
    pub company_id: i64,
    pub machine: MachineScope,
    pub component: Option<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub collect_until: NaiveDateTime,
    pub grouping: Grouping,
}

impl ResolvedRequest {
    pub fn current_window(&self, metric: &str) -> SampleQuery {
        self.window(metric, day_start(self.start), self.collect_until)
    }

    pub fn window(&self, metric: &str, start: NaiveDateTime, end: NaiveDateTime) -> SampleQuery {
        SampleQuery {
            metric: metric.to_string(),
            company_id: self.company_id,
            machine: self.machine,
            component: self.component.clone(),
            start,
            end,
            grouping: self.grouping,
        }
    }
}

pub fn day_start(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

fn parse_date(value: &str, field: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| Error::Business(format!("{} must be formatted as YYYY-MM-DD.", field)))
}

/// Resolve defaults once at request entry. An absent end date means "now";
/// an explicit one anchors collection at that day's midnight.
pub fn resolve(req: &AnalysisRequest) -> Result<ResolvedRequest> {
    let start = parse_date(&req.start_date, "startDate")?;
    let (end, collect_until) = match req.end_date.as_deref() {
        Some(raw) => {
            let end = parse_date(raw, "endDate")?;
            (end, day_start(end))
        }
        None => {
            let now = Utc::now().naive_utc();
            (now.date(), now)
        }
    };
    if end < start {
        return Err(Error::Business(
            "endDate must not precede startDate.".to_string(),
        ));
    }

    Ok(ResolvedRequest {
        analysis_type: req.analysis_type,
        metric: req.metric.clone(),
        related_metric: req.related_metric.clone(),
        company_id: req.company_id,
        machine: req
            .machine_id
            .map(MachineScope::Id)
            .unwrap_or(MachineScope::All),
        component: req.component.clone(),
        start,
        end,
        collect_until,
        grouping: Grouping::for_window(start, end),
    })
}

/// End-to-end handling of one request. Business conditions and data-source
/// unavailability come back as `Ok` error envelopes; only unexpected internal
/// failures propagate as `Err`.
pub async fn process(
    req: AnalysisRequest,
    collector: &dyn DataCollector,
    narrator: &dyn Narrator,
) -> Result<AnalysisResponse> {
    let analysis_type = req.analysis_type;

    let resolved = match resolve(&req) {
        Ok(resolved) => resolved,
        Err(e) => return demote(analysis_type, e),
    };

    match run_analysis(&resolved, collector, narrator).await {
        Ok(envelope) => Ok(AnalysisResponse::Success(envelope)),
        Err(e) => demote(analysis_type, e),
    }
}

fn demote(analysis_type: AnalysisType, e: Error) -> Result<AnalysisResponse> {
    if e.is_business() {
        warn!(analysis = analysis_type.as_str(), error = %e, "analysis rejected");
        Ok(AnalysisResponse::Error {
            analysis_type,
            error: e.to_string(),
        })
    } else if e.is_data_source() {
        error!(analysis = analysis_type.as_str(), error = %e, "data source failure");
        Ok(AnalysisResponse::Error {
            analysis_type,
            error: "The data source is currently unavailable.".to_string(),
        })
    } else {
        Err(e)
    }
}

async fn run_analysis(
    req: &ResolvedRequest,
    collector: &dyn DataCollector,
    narrator: &dyn Narrator,
) -> Result<AnalysisEnvelope> {
    match req.analysis_type {
        AnalysisType::Forecast => {
            let result = forecast::run(req, collector)?;
            let narrative =
                narrate(narrator, &narrative::forecast_prompt(&req.metric, &result)).await;
            Ok(forecast_envelope(req, result, narrative))
        }
        AnalysisType::Comparison => {
            let result = comparison::run(req, collector)?;
            let narrative =
                narrate(narrator, &narrative::comparison_prompt(&req.metric, &result)).await;
            Ok(comparison_envelope(req, result, narrative))
        }
        AnalysisType::Correlation => {
            let result = correlation::run(req, collector)?;
            let related = req.related_metric.as_deref().unwrap_or_default();
            let narrative = narrate(
                narrator,
                &narrative::correlation_prompt(&req.metric, related, &result),
            )
            .await;
            Ok(correlation_envelope(req, result, narrative))
        }
    }
}

/// Narrative failures are soft: log and fall back, the numeric payload is
/// delivered regardless.
async fn narrate(narrator: &dyn Narrator, prompt: &str) -> Vec<String> {
    match narrator.narrate(prompt).await {
        Ok(paragraphs) => paragraphs,
        Err(e) => {
            warn!(error = %e, "narrative generation failed, using fallback");
            fallback_narrative()
        }
    }
}

fn metric(title: &str, value: String) -> MetricDisplay {
    MetricDisplay {
        title: title.to_string(),
        value,
    }
}

fn forecast_envelope(
    req: &ResolvedRequest,
    result: ForecastResult,
    narrative: Vec<String>,
) -> AnalysisEnvelope {
    let ForecastResult { best, history } = result;

    let mut labels = history.labels(req.grouping);
    if let Some(last) = history.last_datetime() {
        labels.extend(
            (1..=best.projections.len() as u32)
                .map(|step| req.grouping.label(req.grouping.advance(last, step))),
        );
    }

    let metrics = vec![
        metric("Selected model", best.name.to_string()),
        metric("Reliability", format!("{:.0}%", best.reliability)),
        metric("RMSE", format!("{:.2}", best.rmse)),
        metric(
            "Next projected value",
            format!("{:.1}", best.projections.first().copied().unwrap_or(0.0)),
        ),
    ];

    assemble_envelope(
        AnalysisType::Forecast,
        req.grouping,
        narrative,
        metrics,
        labels,
        None,
        history.values,
        None,
        Some(best.projections),
        Some(ModelDescriptor {
            name: best.name.to_string(),
            equation: best.equation,
        }),
        None,
    )
}

fn comparison_envelope(
    req: &ResolvedRequest,
    result: ComparisonResult,
    narrative: Vec<String>,
) -> AnalysisEnvelope {
    let metrics = result.display_metrics();

    assemble_envelope(
        AnalysisType::Comparison,
        req.grouping,
        narrative,
        metrics,
        result.current.labels(req.grouping),
        Some(result.prior.labels(req.grouping)),
        result.current.values,
        Some(result.prior.values),
        None,
        Some(ModelDescriptor {
            name: "Temporal comparison".to_string(),
            equation: "Percentage delta".to_string(),
        }),
        None,
    )
}

fn correlation_envelope(
    req: &ResolvedRequest,
    result: CorrelationResult,
    narrative: Vec<String>,
) -> AnalysisEnvelope {
    let metrics = result.display_metrics();
    let labels = result
        .timestamps
        .iter()
        .filter_map(|&s| chrono::DateTime::from_timestamp(s, 0))
        .map(|dt| req.grouping.label(dt.naive_utc()))
        .collect();

    assemble_envelope(
        AnalysisType::Correlation,
        req.grouping,
        narrative,
        metrics,
        labels,
        None,
        result.a_values,
        Some(result.b_values),
        None,
        Some(ModelDescriptor {
            name: "Statistical correlation".to_string(),
            equation: "Pearson".to_string(),
        }),
        Some(result.line),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;

    use crate::collector::testing::{FailingCollector, MemoryCollector};
    use crate::collector::RawSample;

    struct StubNarrator {
        fail: bool,
    }

    #[async_trait]
    impl Narrator for StubNarrator {
        async fn narrate(&self, _prompt: &str) -> Result<Vec<String>> {
            if self.fail {
                Err(Error::Credential("GEMINI_API_KEY is not set".to_string()))
            } else {
                Ok(vec!["Alpha paragraph.".to_string(), "Beta paragraph.".to_string()])
            }
        }
    }

    fn forecast_request() -> AnalysisRequest {
        AnalysisRequest {
            analysis_type: AnalysisType::Forecast,
            metric: "total_alerts".to_string(),
            related_metric: None,
            start_date: "2025-10-01".to_string(),
            end_date: Some("2025-10-02".to_string()),
            company_id: 1,
            machine_id: None,
            component: None,
        }
    }

    fn hourly_collector() -> MemoryCollector {
        let base = day_start(NaiveDate::from_ymd_opt(2025, 10, 1).unwrap());
        let samples = [10.0, 12.0, 14.0, 16.0, 18.0]
            .iter()
            .enumerate()
            .map(|(i, v)| RawSample {
                ts: base + Duration::hours(i as i64),
                value: Some(v.to_string()),
            })
            .collect();
        MemoryCollector::new().with_series("total_alerts", samples)
    }

    #[test]
    fn test_resolve_rejects_malformed_dates_as_business_errors() {
        let mut req = forecast_request();
        req.start_date = "23/10/2025".to_string();
        assert!(resolve(&req).unwrap_err().is_business());
    }

    #[test]
    fn test_resolve_rejects_reversed_window() {
        let mut req = forecast_request();
        req.end_date = Some("2025-09-01".to_string());
        assert!(resolve(&req).unwrap_err().is_business());
    }

    #[test]
    fn test_resolve_defaults_end_to_now_and_machine_to_all() {
        let mut req = forecast_request();
        req.end_date = None;
        let resolved = resolve(&req).unwrap();

        assert_eq!(resolved.end, Utc::now().naive_utc().date());
        assert_eq!(resolved.machine, MachineScope::All);

        req.machine_id = Some(7);
        assert_eq!(resolve(&req).unwrap().machine, MachineScope::Id(7));
    }

    #[tokio::test]
    async fn test_forecast_flow_produces_full_envelope() {
        let response = process(
            forecast_request(),
            &hourly_collector(),
            &StubNarrator { fail: false },
        )
        .await
        .unwrap();

        let envelope = match response {
            AnalysisResponse::Success(envelope) => envelope,
            other => panic!("expected success, got {:?}", other),
        };
        assert_eq!(envelope.analysis_type, AnalysisType::Forecast);
        assert_eq!(envelope.grouping, Grouping::Hour);
        assert_eq!(envelope.narrative, vec!["Alpha paragraph.", "Beta paragraph."]);
        assert_eq!(envelope.chart.current, vec![10.0, 12.0, 14.0, 16.0, 18.0]);
        assert_eq!(envelope.chart.future.len(), 5);
        assert_eq!(envelope.chart.labels.len(), 10);
        assert_eq!(envelope.model["name"], "linear regression");
    }

    #[tokio::test]
    async fn test_narrative_failure_still_delivers_numbers() {
        let response = process(
            forecast_request(),
            &hourly_collector(),
            &StubNarrator { fail: true },
        )
        .await
        .unwrap();

        let envelope = match response {
            AnalysisResponse::Success(envelope) => envelope,
            other => panic!("expected success, got {:?}", other),
        };
        assert_eq!(envelope.narrative, fallback_narrative());
        assert_eq!(envelope.chart.current, vec![10.0, 12.0, 14.0, 16.0, 18.0]);
        assert!(!envelope.metrics.is_empty());
    }

    #[tokio::test]
    async fn test_missing_related_metric_yields_error_envelope() {
        let mut req = forecast_request();
        req.analysis_type = AnalysisType::Correlation;

        let response = process(req, &hourly_collector(), &StubNarrator { fail: false })
            .await
            .unwrap();

        match response {
            AnalysisResponse::Error {
                analysis_type,
                error,
            } => {
                assert_eq!(analysis_type, AnalysisType::Correlation);
                assert!(error.contains("related metric"));
            }
            other => panic!("expected error envelope, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unavailable_data_source_becomes_error_envelope() {
        let response = process(
            forecast_request(),
            &FailingCollector,
            &StubNarrator { fail: false },
        )
        .await
        .unwrap();

        match response {
            AnalysisResponse::Error { error, .. } => {
                assert!(error.contains("currently unavailable"));
            }
            other => panic!("expected error envelope, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_too_few_samples_is_a_business_error_envelope() {
        let base = day_start(NaiveDate::from_ymd_opt(2025, 10, 1).unwrap());
        let collector = MemoryCollector::new().with_series(
            "total_alerts",
            (0..3)
                .map(|i| RawSample {
                    ts: base + Duration::hours(i),
                    value: Some("5".to_string()),
                })
                .collect(),
        );

        let response = process(forecast_request(), &collector, &StubNarrator { fail: false })
            .await
            .unwrap();

        match response {
            AnalysisResponse::Error { error, .. } => {
                assert!(error.contains("Insufficient historical data"));
            }
            other => panic!("expected error envelope, got {:?}", other),
        }
    }
}

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which of the three analytical views a request asks for.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    Forecast,
    Comparison,
    Correlation,
}

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::Forecast => "forecast",
            AnalysisType::Comparison => "comparison",
            AnalysisType::Correlation => "correlation",
        }
    }
}

/// Temporal bucket size used to aggregate raw samples before analysis.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Grouping {
    Hour,
    Day,
    Month,
}

impl Grouping {
    /// Deterministic, pure function of the requested window. Same inputs
    /// always yield the same grouping; downstream horizon steps and display
    /// labels depend on that determinism.
    pub fn for_window(start: NaiveDate, end: NaiveDate) -> Grouping {
        let days = (end - start).num_days();
        if days <= 1 {
            Grouping::Hour
        } else if days <= 60 {
            Grouping::Day
        } else {
            Grouping::Month
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grouping::Hour => "hour",
            Grouping::Day => "day",
            Grouping::Month => "month",
        }
    }

    /// Display label for one bucket.
    pub fn label(&self, ts: NaiveDateTime) -> String {
        match self {
            Grouping::Hour => format!("{:02}/{:02} {:02}:00", ts.day(), ts.month(), ts.hour()),
            Grouping::Day => format!("{:02}/{:02}", ts.day(), ts.month()),
            Grouping::Month => format!("{:02}/{}", ts.month(), ts.year()),
        }
    }

    /// Advance a timestamp by `steps` buckets of this grouping.
    pub fn advance(&self, ts: NaiveDateTime, steps: u32) -> NaiveDateTime {
        match self {
            Grouping::Hour => ts + Duration::hours(steps as i64),
            Grouping::Day => ts + Duration::days(steps as i64),
            Grouping::Month => ts.checked_add_months(Months::new(steps)).unwrap_or(ts),
        }
    }
}

/// The JSON body accepted by `POST /analyze`.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub analysis_type: AnalysisType,
    pub metric: String,
    #[serde(default)]
    pub related_metric: Option<String>,
    pub start_date: String,
    #[serde(default)]
    pub end_date: Option<String>,
    pub company_id: i64,
    #[serde(default)]
    pub machine_id: Option<i64>,
    #[serde(default)]
    pub component: Option<String>,
}

/// One title/value pair shown on the dashboard metric cards.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct MetricDisplay {
    pub title: String,
    pub value: String,
}

/// Chart series block of the envelope.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    pub labels: Vec<String>,
    pub prior_labels: Vec<String>,
    pub current: Vec<f64>,
    pub prior: Vec<f64>,
    pub future: Vec<f64>,
}

/// Descriptor of the model behind the numbers, e.g. the winning forecast
/// candidate or the statistical method of a comparison.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    pub name: String,
    pub equation: String,
}

/// One endpoint of the regression line drawn over a correlation scatter.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct RegressionPoint {
    pub x: f64,
    pub y: f64,
}

/// Canonical success payload for the dashboard.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisEnvelope {
    pub analysis_type: AnalysisType,
    pub grouping: Grouping,
    pub narrative: Vec<String>,
    pub metrics: Vec<MetricDisplay>,
    pub chart: ChartData,
    /// `{name, equation}` or `{}` when no model applies.
    pub model: Value,
    pub regression_line: Vec<RegressionPoint>,
}

/// Either a full analysis or a structured business error. Callers branch on
/// the `error` field rather than on transport failures.
#[derive(Serialize, Debug, Clone)]
#[serde(untagged)]
pub enum AnalysisResponse {
    Success(AnalysisEnvelope),
    #[serde(rename_all = "camelCase")]
    Error {
        analysis_type: AnalysisType,
        error: String,
    },
}

impl AnalysisResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, AnalysisResponse::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grouping_thresholds() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();

        assert_eq!(Grouping::for_window(d(2025, 3, 1), d(2025, 3, 1)), Grouping::Hour);
        assert_eq!(Grouping::for_window(d(2025, 3, 1), d(2025, 3, 2)), Grouping::Hour);
        assert_eq!(Grouping::for_window(d(2025, 3, 1), d(2025, 3, 10)), Grouping::Day);
        assert_eq!(Grouping::for_window(d(2025, 3, 1), d(2025, 4, 30)), Grouping::Day);
        assert_eq!(Grouping::for_window(d(2025, 1, 1), d(2025, 12, 1)), Grouping::Month);
    }

    #[test]
    fn test_grouping_is_deterministic() {
        let start = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 5, 20).unwrap();
        assert_eq!(
            Grouping::for_window(start, end),
            Grouping::for_window(start, end)
        );
    }

    #[test]
    fn test_grouping_advance_by_month_handles_year_wrap() {
        let ts = NaiveDate::from_ymd_opt(2025, 11, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let next = Grouping::Month.advance(ts, 2);
        assert_eq!(next.date(), NaiveDate::from_ymd_opt(2026, 1, 15).unwrap());
    }

    #[test]
    fn test_request_deserializes_with_optional_fields_absent() {
        let body = r#"{
            "analysisType": "forecast",
            "metric": "total_alerts",
            "startDate": "2025-10-23",
            "companyId": 1
        }"#;
        let req: AnalysisRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.analysis_type, AnalysisType::Forecast);
        assert!(req.end_date.is_none());
        assert!(req.machine_id.is_none());
        assert!(req.related_metric.is_none());
    }

    #[test]
    fn test_error_response_serializes_business_envelope() {
        let resp = AnalysisResponse::Error {
            analysis_type: AnalysisType::Correlation,
            error: "insufficient overlapping data".to_string(),
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["analysisType"], "correlation");
        assert_eq!(json["error"], "insufficient overlapping data");
    }
}

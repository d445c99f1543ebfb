//! Response formatter: a pure mapping from engine outputs to the canonical
//! envelope. No computation happens here; absent optional pieces get their
//! documented defaults (`[]` for arrays, `{}` for the model descriptor).

use serde_json::{json, Value};

use crate::api::models::{
    AnalysisEnvelope, AnalysisType, ChartData, Grouping, MetricDisplay, ModelDescriptor,
    RegressionPoint,
};

#[allow(clippy::too_many_arguments)]
pub fn assemble_envelope(
    analysis_type: AnalysisType,
    grouping: Grouping,
    narrative: Vec<String>,
    metrics: Vec<MetricDisplay>,
    labels: Vec<String>,
    prior_labels: Option<Vec<String>>,
    current: Vec<f64>,
    prior: Option<Vec<f64>>,
    future: Option<Vec<f64>>,
    model: Option<ModelDescriptor>,
    regression_line: Option<Vec<RegressionPoint>>,
) -> AnalysisEnvelope {
    AnalysisEnvelope {
        analysis_type,
        grouping,
        narrative,
        metrics,
        chart: ChartData {
            labels,
            prior_labels: prior_labels.unwrap_or_default(),
            current,
            prior: prior.unwrap_or_default(),
            future: future.unwrap_or_default(),
        },
        model: model_value(model),
        regression_line: regression_line.unwrap_or_default(),
    }
}

fn model_value(model: Option<ModelDescriptor>) -> Value {
    match model {
        Some(m) => json!({ "name": m.name, "equation": m.equation }),
        None => json!({}),
    }
}

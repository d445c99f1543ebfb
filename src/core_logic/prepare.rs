use chrono::NaiveDateTime;
use polars::prelude::*;

use crate::api::models::Grouping;
use crate::collector::RawSample;
use crate::error::Result;

/// A cleaned series ready for the engines: sorted ascending, unique
/// timestamps, every value numeric. Timestamps are epoch seconds.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreparedSeries {
    pub timestamps: Vec<i64>,
    pub values: Vec<f64>,
}

impl PreparedSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            0.0
        } else {
            self.total() / self.values.len() as f64
        }
    }

    pub fn datetimes(&self) -> Vec<NaiveDateTime> {
        self.timestamps
            .iter()
            .filter_map(|&s| chrono::DateTime::from_timestamp(s, 0))
            .map(|dt| dt.naive_utc())
            .collect()
    }

    pub fn labels(&self, grouping: Grouping) -> Vec<String> {
        self.datetimes()
            .into_iter()
            .map(|dt| grouping.label(dt))
            .collect()
    }

    pub fn last_datetime(&self) -> Option<NaiveDateTime> {
        self.timestamps
            .last()
            .and_then(|&s| chrono::DateTime::from_timestamp(s, 0))
            .map(|dt| dt.naive_utc())
    }
}

/// Clean and gap-fill a raw sample sequence.
///
/// Pipeline: sort ascending, drop duplicate timestamps (keep first), coerce
/// the text values to numeric (non-convertible becomes null), linearly
/// interpolate interior nulls, then backward- and forward-fill the edges.
/// Empty input, or input with no convertible value at all, yields the empty
/// sentinel. Idempotent on its own output.
pub fn prepare_series(raw: &[RawSample]) -> Result<PreparedSeries> {
    if raw.is_empty() {
        return Ok(PreparedSeries::default());
    }

    let ts_series = Series::new(
        "ts",
        raw.iter()
            .map(|s| s.ts.and_utc().timestamp())
            .collect::<Vec<i64>>(),
    );
    let value_series = Series::new(
        "value",
        raw.iter().map(|s| s.value.clone()).collect::<Vec<Option<String>>>(),
    );

    let df = DataFrame::new(vec![ts_series, value_series])?
        .lazy()
        .sort(
            "ts",
            SortOptions {
                maintain_order: true,
                ..Default::default()
            },
        )
        .unique_stable(Some(vec!["ts".to_string()]), UniqueKeepStrategy::First)
        .with_column(col("value").cast(DataType::Float64))
        .with_column(col("value").interpolate(InterpolationMethod::Linear))
        .collect()?;

    let filled = df
        .column("value")?
        .fill_null(FillNullStrategy::Backward(None))?
        .fill_null(FillNullStrategy::Forward(None))?;

    let mut timestamps = Vec::with_capacity(df.height());
    let mut values = Vec::with_capacity(df.height());
    for (ts, value) in df.column("ts")?.i64()?.into_iter().zip(filled.f64()?) {
        if let (Some(ts), Some(value)) = (ts, value) {
            timestamps.push(ts);
            values.push(value);
        }
    }

    Ok(PreparedSeries { timestamps, values })
}

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sql_types::{Nullable, Text, Timestamp};

/// Row shape returned by the `collect_metric_samples` set-returning function.
/// The value is nullable text: the source may hold missing or non-numeric
/// readings, which the preparer coerces downstream.
#[derive(QueryableByName, Debug, Clone)]
pub struct SampleRow {
    #[diesel(sql_type = Timestamp)]
    pub bucket_ts: NaiveDateTime,
    #[diesel(sql_type = Nullable<Text>)]
    pub metric_value: Option<String>,
}

use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Nullable, Text, Timestamp};

use crate::collector::{RawSample, SampleQuery};
use crate::database::models::SampleRow;
use crate::error::Result;

/// Fetch bucketed samples for one metric. Aggregation into hour/day/month
/// buckets happens inside the data source; we only pass the knobs through.
pub fn fetch_samples(conn: &mut PgConnection, query: &SampleQuery) -> Result<Vec<RawSample>> {
    let rows: Vec<SampleRow> = sql_query(
        "SELECT bucket_ts, metric_value \
         FROM collect_metric_samples($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind::<Timestamp, _>(query.start)
    .bind::<Timestamp, _>(query.end)
    .bind::<BigInt, _>(query.company_id)
    .bind::<Nullable<BigInt>, _>(query.machine.as_option())
    .bind::<Text, _>(query.grouping.as_str())
    .bind::<Text, _>(&query.metric)
    .bind::<Nullable<Text>, _>(query.component.as_deref())
    .load(conn)?;

    Ok(rows
        .into_iter()
        .map(|row| RawSample {
            ts: row.bucket_ts,
            value: row.metric_value,
        })
        .collect())
}

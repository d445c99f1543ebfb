pub mod connection;
pub mod models;
pub mod queries;

use crate::collector::{DataCollector, RawSample, SampleQuery};
use crate::error::Result;

/// Production collector backed by the SQL data source. One connection per
/// request; nothing is cached across requests.
pub struct DbCollector;

impl DataCollector for DbCollector {
    fn collect(&self, query: &SampleQuery) -> Result<Vec<RawSample>> {
        let mut conn = connection::establish_connection()?;
        queries::fetch_samples::fetch_samples(&mut conn, query)
    }
}

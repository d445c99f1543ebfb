//! Consumed data-collection interface.
//!
//! The engines only see this trait: an ordered list of (timestamp, value)
//! samples for one metric over one window. An empty result means "no data
//! found" and is never an error; errors mean the data source itself is
//! unavailable and are demoted to a business error by the orchestrator.

use chrono::NaiveDateTime;

use crate::api::models::Grouping;
use crate::error::Result;

/// Scope of the machine filter, resolved once at request entry instead of a
/// nullable sentinel threaded through the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineScope {
    All,
    Id(i64),
}

impl MachineScope {
    pub fn as_option(&self) -> Option<i64> {
        match self {
            MachineScope::All => None,
            MachineScope::Id(id) => Some(*id),
        }
    }
}

/// Everything the data source needs to aggregate one metric into buckets.
#[derive(Debug, Clone)]
pub struct SampleQuery {
    pub metric: String,
    pub company_id: i64,
    pub machine: MachineScope,
    pub component: Option<String>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub grouping: Grouping,
}

/// One raw bucketed sample. The value arrives as text because the source may
/// hold non-numeric or missing readings; the preparer coerces it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub ts: NaiveDateTime,
    pub value: Option<String>,
}

pub trait DataCollector: Send + Sync {
    fn collect(&self, query: &SampleQuery) -> Result<Vec<RawSample>>;
}

#[cfg(test)]
pub mod testing {
    //! In-memory collector used by the engine and orchestrator tests.

    use std::collections::HashMap;

    use super::*;

    /// Serves canned samples per metric name, filtered by the query window.
    #[derive(Default)]
    pub struct MemoryCollector {
        series: HashMap<String, Vec<RawSample>>,
    }

    impl MemoryCollector {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_series(mut self, metric: &str, samples: Vec<RawSample>) -> Self {
            self.series.insert(metric.to_string(), samples);
            self
        }
    }

    impl DataCollector for MemoryCollector {
        fn collect(&self, query: &SampleQuery) -> Result<Vec<RawSample>> {
            let samples = match self.series.get(&query.metric) {
                Some(samples) => samples,
                None => return Ok(vec![]),
            };
            Ok(samples
                .iter()
                .filter(|s| s.ts >= query.start && s.ts <= query.end)
                .cloned()
                .collect())
        }
    }

    /// Collector whose data source is always down.
    pub struct FailingCollector;

    impl DataCollector for FailingCollector {
        fn collect(&self, _query: &SampleQuery) -> Result<Vec<RawSample>> {
            Err(crate::error::Error::Config(
                "DATABASE_URL is not set".to_string(),
            ))
        }
    }
}

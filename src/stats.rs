use std::time::{Duration, Instant};

use serde::Serialize;

/// Timing for one experiment step (embedding, projection learning, scoring).
#[derive(Debug, Clone, Serialize)]
pub struct StepStats {
    /// Wall-clock time of the step.
    #[serde(serialize_with = "as_secs")]
    pub total_time: Duration,
    /// Number of items the step handled (documents, anchors).
    pub items_processed: usize,
}

impl StepStats {
    /// Start timing (call at start of the step).
    pub(crate) fn start() -> StepStatsBuilder {
        StepStatsBuilder {
            start_time: Instant::now(),
        }
    }
}

/// Tracks timing from creation to finish.
pub(crate) struct StepStatsBuilder {
    start_time: Instant,
}

impl StepStatsBuilder {
    /// Finalize with the number of items processed.
    pub fn finish(self, items_processed: usize) -> StepStats {
        StepStats {
            total_time: self.start_time.elapsed(),
            items_processed,
        }
    }
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

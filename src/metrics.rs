use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing question-answering activity for the current process.
#[derive(Default)]
pub struct QueryMetrics {
    questions_answered: AtomicU64,
    chunk_answers: AtomicU64,
    chunk_failures: AtomicU64,
}

impl QueryMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one answered question with its per-chunk outcome counts.
    pub fn record_question(&self, answered_chunks: u64, failed_chunks: u64) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
        self.chunk_answers
            .fetch_add(answered_chunks, Ordering::Relaxed);
        self.chunk_failures
            .fetch_add(failed_chunks, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            chunk_answers: self.chunk_answers.load(Ordering::Relaxed),
            chunk_failures: self.chunk_failures.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of query counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Questions that produced an answer (including the no-context sentinel).
    pub questions_answered: u64,
    /// Chunk-level answers generated successfully.
    pub chunk_answers: u64,
    /// Chunk-level generation attempts that failed.
    pub chunk_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_questions_and_chunk_outcomes() {
        let metrics = QueryMetrics::new();
        metrics.record_question(5, 0);
        metrics.record_question(3, 2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.questions_answered, 2);
        assert_eq!(snapshot.chunk_answers, 8);
        assert_eq!(snapshot.chunk_failures, 2);
    }

    #[test]
    fn snapshot_starts_at_zero() {
        let metrics = QueryMetrics::new();
        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                questions_answered: 0,
                chunk_answers: 0,
                chunk_failures: 0,
            }
        );
    }
}

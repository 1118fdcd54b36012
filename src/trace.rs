//! Structured trace events for the vectorizer.
//!
//! Instead of writing to an ambient stream, the pass reports decisions as
//! typed events to an explicitly-threaded [`TraceSink`]. Production callers
//! pass [`NullSink`]; tests use [`RecordingSink`] to assert on decisions.

/// Why a chosen pack was not rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Memory lanes do not form a complete duplicate-free contiguous run.
    NonContiguousLanes,
    /// Some lane already has a user before the computed insertion point.
    UserPrecedesInsertion,
    /// Pack shape the emitter does not rewrite.
    UnsupportedShape,
    /// Chosen packs feed each other's lanes in a cycle; none of them has a
    /// legal rewrite order.
    DependenceCycle,
}

/// A single pipeline decision.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    /// Pairwise candidate discovery finished.
    CandidatesCollected { pairs: usize },

    /// Candidate set hit a ceiling and was truncated.
    CandidatesClamped { before: usize, after: usize },

    /// Iterative widening finished.
    PacksWidened { merged: usize, total: usize },

    /// Pack selection finished.
    SelectionFinished {
        chosen: usize,
        total_cost: f32,
        /// False when the search hit its time budget before proving
        /// optimality.
        optimal: bool,
    },

    /// A chosen pack was rewritten into vector form.
    PackEmitted { width: usize },

    /// A chosen pack was left scalar.
    PackSkipped { width: usize, reason: SkipReason },

    /// One outer-loop iteration finished.
    IterationFinished { iteration: usize, changed: bool },
}

/// Receiver for pipeline decisions.
pub trait TraceSink {
    fn event(&mut self, event: TraceEvent);
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TraceSink for NullSink {
    #[inline]
    fn event(&mut self, _event: TraceEvent) {}
}

/// Sink that records every event, for tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    pub events: Vec<TraceEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count events matching a predicate.
    pub fn count(&self, pred: impl Fn(&TraceEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl TraceSink for RecordingSink {
    fn event(&mut self, event: TraceEvent) {
        self.events.push(event);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_collects() {
        let mut sink = RecordingSink::new();
        sink.event(TraceEvent::CandidatesCollected { pairs: 3 });
        sink.event(TraceEvent::PackEmitted { width: 4 });

        assert_eq!(sink.events.len(), 2);
        assert_eq!(
            sink.count(|e| matches!(e, TraceEvent::PackEmitted { .. })),
            1
        );
    }

    #[test]
    fn test_null_sink_is_noop() {
        let mut sink = NullSink;
        sink.event(TraceEvent::IterationFinished {
            iteration: 0,
            changed: false,
        });
    }
}

//! Block event filters: per-type predicates and rolling windows.
//!
//! Each lifecycle section (begin, end) has its own
//! [`StaticBlockEventFilterRegistry`]. An event survives filtering if
//!
//! 1. the registry holds no filters at all, or
//! 2. at least one per-type filter matches it, or
//! 3. it falls inside a window of consecutive events whose types match a
//!    rolling-window pattern.

use std::sync::Arc;

use crate::types::EventWrapper;

// ═══════════════════════════════════════════════════════════════════════════════
// PER-TYPE FILTER
// ═══════════════════════════════════════════════════════════════════════════════

/// Predicate over a single block event.
pub trait BlockEventFilter: Send + Sync {
    /// The event type this filter applies to.
    fn event_type(&self) -> &str;

    /// Whether the event passes this filter.
    ///
    /// The default implementation accepts every event of the filter's type.
    fn matches(&self, event: &EventWrapper) -> bool {
        event.kind == self.event_type()
    }
}

/// Filter accepting all events of one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTypeFilter {
    event_type: String,
}

impl EventTypeFilter {
    /// Create a filter for the given event type.
    #[must_use]
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
        }
    }
}

impl BlockEventFilter for EventTypeFilter {
    fn event_type(&self) -> &str {
        &self.event_type
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROLLING WINDOW FILTER
// ═══════════════════════════════════════════════════════════════════════════════

/// Filter accepting an event based on its neighbors.
///
/// A rolling-window filter holds an ordered pattern of event types. Whenever
/// a run of consecutive events matches the pattern, every event in that run
/// is accepted. This captures multi-event protocols (e.g. an unlock followed
/// by a transfer) whose parts are meaningless in isolation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollingWindowFilter {
    pattern: Vec<String>,
}

impl RollingWindowFilter {
    /// Create a filter from an ordered event-type pattern.
    ///
    /// An empty pattern matches nothing.
    #[must_use]
    pub fn new<I, S>(pattern: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pattern: pattern.into_iter().map(Into::into).collect(),
        }
    }

    /// Window size of this filter.
    #[must_use]
    pub fn window(&self) -> usize {
        self.pattern.len()
    }

    /// Mark each index of `events` that falls inside a matching window.
    fn mark_matches(&self, events: &[EventWrapper], accepted: &mut [bool]) {
        let k = self.pattern.len();
        if k == 0 || events.len() < k {
            return;
        }

        for start in 0..=(events.len() - k) {
            let window_matches = self
                .pattern
                .iter()
                .zip(&events[start..start + k])
                .all(|(want, event)| *want == event.kind);

            if window_matches {
                for flag in &mut accepted[start..start + k] {
                    *flag = true;
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILTER REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Frozen set of filters for one lifecycle section.
///
/// Built once during setup; duplicate registrations collapse, so building
/// the same configuration twice yields the same registry.
#[derive(Clone, Default)]
pub struct StaticBlockEventFilterRegistry {
    event_filters: Vec<Arc<dyn BlockEventFilter>>,
    rolling_filters: Vec<RollingWindowFilter>,
}

impl std::fmt::Debug for StaticBlockEventFilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticBlockEventFilterRegistry")
            .field(
                "event_filters",
                &self
                    .event_filters
                    .iter()
                    .map(|x| x.event_type().to_owned())
                    .collect::<Vec<_>>(),
            )
            .field("rolling_filters", &self.rolling_filters)
            .finish()
    }
}

impl StaticBlockEventFilterRegistry {
    /// Create an empty registry (passes everything).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a per-type filter. Re-adding the same instance is a no-op.
    pub fn add_event_filter(&mut self, filter: Arc<dyn BlockEventFilter>) {
        let duplicate = self.event_filters.iter().any(|existing| {
            Arc::ptr_eq(existing, &filter) || existing.event_type() == filter.event_type()
        });
        if !duplicate {
            self.event_filters.push(filter);
        }
    }

    /// Add a simple event-type filter. Idempotent per type.
    pub fn add_event_type(&mut self, event_type: impl Into<String>) {
        self.add_event_filter(Arc::new(EventTypeFilter::new(event_type)));
    }

    /// Add a rolling-window filter. Idempotent per pattern.
    pub fn add_rolling_window(&mut self, filter: RollingWindowFilter) {
        if !self.rolling_filters.contains(&filter) {
            self.rolling_filters.push(filter);
        }
    }

    /// Total number of registered filters.
    #[must_use]
    pub fn num_filters(&self) -> usize {
        self.event_filters.len() + self.rolling_filters.len()
    }

    /// Apply all filters to an ordered event list.
    ///
    /// Returns the surviving events in their original order. With no filters
    /// registered, the output equals the input.
    #[must_use]
    pub fn filter(&self, events: Vec<EventWrapper>) -> Vec<EventWrapper> {
        if self.num_filters() == 0 {
            return events;
        }

        let mut accepted = vec![false; events.len()];

        for (i, event) in events.iter().enumerate() {
            if self.event_filters.iter().any(|f| f.matches(event)) {
                accepted[i] = true;
            }
        }

        for rolling in &self.rolling_filters {
            rolling.mark_matches(&events, &mut accepted);
        }

        events
            .into_iter()
            .zip(accepted)
            .filter_map(|(event, keep)| keep.then_some(event))
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

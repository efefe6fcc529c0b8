//! Business-identifier sequence.
//!
//! Catalog documents carry a human-readable identifier of the form
//! `DPRD-<year>-<month>-<5-digit-counter>`. The counter restarts whenever
//! the calendar month changes and otherwise increments. The
//! check-month-then-increment step is one critical section under a mutex so
//! two concurrent ingestions never hand out the same counter value and a
//! month rollover is observed by exactly one caller.

use std::sync::Mutex;

use chrono::{DateTime, Datelike, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SequenceState {
    year: i32,
    month: u32,
    counter: u64,
}

/// Injectable, process-wide sequence service. Clone-free; share via `Arc`.
#[derive(Debug)]
pub struct BusinessIdSequence {
    state: Mutex<SequenceState>,
}

impl BusinessIdSequence {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SequenceState {
                year: 0,
                month: 0,
                counter: 0,
            }),
        }
    }

    /// Resume from the highest identifier already persisted, so a new
    /// process never re-issues a counter value from an earlier run. An
    /// absent or unparseable identifier starts a fresh sequence.
    pub fn resuming(last_id: Option<&str>) -> Self {
        let state = last_id
            .and_then(parse_business_id)
            .unwrap_or(SequenceState {
                year: 0,
                month: 0,
                counter: 0,
            });
        Self {
            state: Mutex::new(state),
        }
    }

    /// Allocate the next identifier for the current instant.
    pub fn next_id(&self) -> String {
        self.next_id_at(Utc::now())
    }

    /// Allocate the next identifier as of `now`. Exposed for tests and for
    /// callers that batch-assign within one observed instant.
    pub fn next_id_at(&self, now: DateTime<Utc>) -> String {
        let year = now.year();
        let month = now.month();
        let mut state = self.state.lock().expect("sequence mutex poisoned");
        if state.year != year || state.month != month {
            state.year = year;
            state.month = month;
            state.counter = 0;
        }
        state.counter += 1;
        format!("DPRD-{year}-{month:02}-{counter:05}", counter = state.counter)
    }
}

fn parse_business_id(id: &str) -> Option<SequenceState> {
    let mut parts = id.split('-');
    if parts.next() != Some("DPRD") {
        return None;
    }
    let year = parts.next()?.parse().ok()?;
    let month = parts.next()?.parse().ok()?;
    let counter = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(SequenceState {
        year,
        month,
        counter,
    })
}

impl Default for BusinessIdSequence {
    fn default() -> Self {
        Self::new()
    }
}

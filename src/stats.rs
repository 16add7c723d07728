//
// Copyright (c) 2024 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

// Counter names emitted by the recovery core. Kept as constants so the
// pipeline, the monitor and the tests agree on spelling.
pub const LOCAL_RECORDS: &str = "local_records";
pub const REMOTE_RECORDS: &str = "remote_records";
pub const ITERATED_KEYS: &str = "iterated_keys";
pub const ITERATIONS: &str = "iterations";
pub const SORT: &str = "sort";
pub const DIFFS: &str = "diffs";
pub const RECOVERED_KEYS: &str = "recovered_keys";
pub const RECOVERED_BYTES: &str = "recovered_bytes";

#[derive(Clone, Debug)]
struct Checkpoint {
    label: String,
    at: DateTime<Utc>,
}

/// Named counters and timer checkpoints for one unit of work (one range,
/// or the whole run). Counters are additive and may go negative: failure
/// accounting subtracts from the same counters successes add to.
#[derive(Clone, Debug)]
pub struct Stats {
    name: String,
    counters: BTreeMap<String, i64>,
    timer: Vec<Checkpoint>,
}

impl Stats {
    pub fn new(name: &str) -> Stats {
        Stats {
            name: name.to_string(),
            counters: BTreeMap::new(),
            timer: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add(&mut self, counter: &str, delta: i64) {
        *self.counters.entry(counter.to_string()).or_insert(0) += delta;
    }

    pub fn counter(&self, counter: &str) -> i64 {
        self.counters.get(counter).copied().unwrap_or(0)
    }

    /// Record a named timer checkpoint at the current wall-clock time.
    pub fn checkpoint(&mut self, label: &str) {
        self.timer.push(Checkpoint {
            label: label.to_string(),
            at: Utc::now(),
        });
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}:", self.name)?;
        for (name, value) in &self.counters {
            writeln!(f, "  {:>24}: {}", name, value)?;
        }
        for cp in &self.timer {
            writeln!(f, "  {:>24}: {}", cp.label, cp.at.to_rfc3339())?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MonitorState {
    counters: BTreeMap<String, i64>,
    timers: BTreeMap<String, Vec<Checkpoint>>,
    ranges: Vec<Stats>,
}

/// The global stats sink. Thread-safe and cheap to clone (shared state);
/// workers feed it commutative counter increments and absorbed per-range
/// [`Stats`], so aggregation order across ranges does not matter.
///
/// The mutex is never held across an await.
#[derive(Clone, Debug, Default)]
pub struct Monitor {
    state: Arc<Mutex<MonitorState>>,
}

impl Monitor {
    pub fn new() -> Monitor {
        Monitor {
            state: Arc::new(Mutex::new(MonitorState::default())),
        }
    }

    pub fn add_counter(&self, counter: &str, delta: i64) {
        let mut s = self.state.lock().unwrap();
        *s.counters.entry(counter.to_string()).or_insert(0) += delta;
    }

    pub fn counter(&self, counter: &str) -> i64 {
        let s = self.state.lock().unwrap();
        s.counters.get(counter).copied().unwrap_or(0)
    }

    pub fn add_timer(&self, scope: &str, label: &str) {
        let mut s = self.state.lock().unwrap();
        s.timers.entry(scope.to_string()).or_default().push(Checkpoint {
            label: label.to_string(),
            at: Utc::now(),
        });
    }

    /// Collect a finished per-range [`Stats`] into the global report.
    pub fn absorb(&self, stats: Stats) {
        let mut s = self.state.lock().unwrap();
        s.ranges.push(stats);
    }

    pub fn range_count(&self) -> usize {
        self.state.lock().unwrap().ranges.len()
    }

    /// Sum of one named counter across all absorbed per-range stats.
    pub fn range_counter_total(&self, counter: &str) -> i64 {
        let s = self.state.lock().unwrap();
        s.ranges.iter().map(|r| r.counter(counter)).sum()
    }

    /// Human-readable dump of all named counters and timers: global
    /// counters first, the global timers, then one section per range.
    pub fn render_text(&self) -> String {
        let s = self.state.lock().unwrap();
        let mut out = String::new();
        let _ = writeln!(out, "global:");
        for (name, value) in &s.counters {
            let _ = writeln!(out, "  {:>24}: {}", name, value);
        }
        for (scope, checkpoints) in &s.timers {
            let _ = writeln!(out, "{}:", scope);
            for cp in checkpoints {
                let _ = writeln!(out, "  {:>24}: {}", cp.label, cp.at.to_rfc3339());
            }
        }
        let mut ranges: Vec<&Stats> = s.ranges.iter().collect();
        ranges.sort_by(|a, b| a.name().cmp(b.name()));
        for r in ranges {
            let _ = write!(out, "{}", r);
        }
        out
    }
}

//! Global stop/resume counters and the refresh ladder that keeps them honest.
//!
//! Counters are derived from root dialogs only. Local run-state events are a
//! fast path; the scheduled re-fetches of authoritative root state bring the
//! counters back to ground truth when events go missing.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::config::{RefreshLadders, SyncConfig};
use crate::model::{DialogStatus, RefreshReason};
use crate::registry::DialogRegistry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunControlCounts {
    /// Running roots that are proceeding (or already asked to stop).
    pub stoppable: usize,
    /// Running roots that are interrupted.
    pub resumable: usize,
}

impl RunControlCounts {
    pub fn from_registry(registry: &DialogRegistry) -> Self {
        registry
            .roots()
            .filter(|root| root.status == DialogStatus::Running)
            .fold(Self::default(), |mut counts, root| {
                match root.run_state.as_ref() {
                    Some(rs) if rs.is_stoppable() => counts.stoppable += 1,
                    Some(rs) if rs.is_resumable() => counts.resumable += 1,
                    _ => {}
                }
                counts
            })
    }
}

/// One pending re-fetch of root state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledRefresh {
    pub due: Instant,
    pub reason: RefreshReason,
}

/// Explicit list of delayed refreshes. Time is always passed in.
#[derive(Debug, Clone)]
pub struct RefreshScheduler {
    debounce: Duration,
    ladders: RefreshLadders,
    last_triggered: BTreeMap<RefreshReason, Instant>,
    pending: Vec<ScheduledRefresh>,
}

impl RefreshScheduler {
    pub fn new(debounce: Duration, ladders: RefreshLadders) -> Self {
        Self {
            debounce,
            ladders,
            last_triggered: BTreeMap::new(),
            pending: Vec::new(),
        }
    }

    /// Enqueue the ladder for `reason`. Returns false when debounced.
    pub fn schedule(&mut self, reason: RefreshReason, now: Instant) -> bool {
        if let Some(last) = self.last_triggered.get(&reason) {
            if now.saturating_duration_since(*last) < self.debounce {
                return false;
            }
        }
        self.last_triggered.insert(reason, now);
        self.pending.extend(
            self.ladders
                .for_reason(reason)
                .iter()
                .map(|delay| ScheduledRefresh {
                    due: now + *delay,
                    reason,
                }),
        );
        true
    }

    pub fn pending(&self) -> &[ScheduledRefresh] {
        &self.pending
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.pending.iter().map(|s| s.due).min()
    }

    /// Remove and return every refresh due at or before `now`.
    pub fn take_due(&mut self, now: Instant) -> Vec<ScheduledRefresh> {
        let (due, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|s| s.due <= now);
        self.pending = rest;
        due
    }

    /// Teardown: forget every pending refresh. Returns how many were cleared.
    pub fn cancel_all(&mut self) -> usize {
        let cleared = self.pending.len();
        self.pending.clear();
        cleared
    }
}

/// Derived run-control view plus its refresh schedule.
#[derive(Debug, Clone)]
pub struct RunControl {
    counts: RunControlCounts,
    scheduler: RefreshScheduler,
}

impl RunControl {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            counts: RunControlCounts::default(),
            scheduler: RefreshScheduler::new(config.refresh_debounce, config.refresh_ladders.clone()),
        }
    }

    pub fn counts(&self) -> RunControlCounts {
        self.counts
    }

    /// Re-derive counters. Returns whether they moved.
    pub fn recompute(&mut self, registry: &DialogRegistry) -> bool {
        let next = RunControlCounts::from_registry(registry);
        let changed = next != self.counts;
        self.counts = next;
        changed
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    pub fn schedule_refresh(&mut self, reason: RefreshReason, now: Instant) -> bool {
        self.scheduler.schedule(reason, now)
    }

    pub fn take_due(&mut self, now: Instant) -> Vec<ScheduledRefresh> {
        self.scheduler.take_due(now)
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.scheduler.next_due()
    }

    pub fn cancel_all(&mut self) -> usize {
        self.scheduler.cancel_all()
    }
}

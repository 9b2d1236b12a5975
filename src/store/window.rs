//! Bounded, restartable views over a patient's metric series

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::model::Observation;

/// Bound for `ObservationStore::recent`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// The `n` newest observations
    Count(usize),
    /// Observations no older than this, measured back from the newest one in the series
    Duration(Duration),
}

/// Snapshot of one metric series, iterated newest first
///
/// Holds a shared snapshot, so later writes are not observed and every call
/// to `iter` restarts from the newest observation.
#[derive(Debug, Clone)]
pub struct RecentObservations {
    series: Arc<Vec<Observation>>,
    window: Window,
}

impl RecentObservations {
    pub(crate) fn new(series: Arc<Vec<Observation>>, window: Window) -> Self {
        Self { series, window }
    }

    pub(crate) fn empty(window: Window) -> Self {
        Self {
            series: Arc::new(Vec::new()),
            window,
        }
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn iter(&self) -> RecentIter<'_> {
        let cutoff = match self.window {
            Window::Duration(d) => self.series.last().map(|newest| newest.timestamp - d),
            Window::Count(_) => None,
        };
        let limit = match self.window {
            Window::Count(n) => n,
            Window::Duration(_) => usize::MAX,
        };
        RecentIter {
            series: &self.series,
            remaining: self.series.len(),
            limit,
            cutoff,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Owned copies, newest first
    pub fn to_vec(&self) -> Vec<Observation> {
        self.iter().cloned().collect()
    }
}

impl<'a> IntoIterator for &'a RecentObservations {
    type Item = &'a Observation;
    type IntoIter = RecentIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct RecentIter<'a> {
    series: &'a [Observation],
    remaining: usize,
    limit: usize,
    cutoff: Option<DateTime<Utc>>,
}

impl<'a> Iterator for RecentIter<'a> {
    type Item = &'a Observation;

    fn next(&mut self) -> Option<Self::Item> {
        if self.limit == 0 || self.remaining == 0 {
            return None;
        }
        let candidate = &self.series[self.remaining - 1];
        if let Some(cutoff) = self.cutoff {
            if candidate.timestamp < cutoff {
                self.remaining = 0;
                return None;
            }
        }
        self.remaining -= 1;
        self.limit -= 1;
        Some(candidate)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining.min(self.limit)))
    }
}

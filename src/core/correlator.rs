//! Alert correlator (§4.3) — per-cycle NEW/RESOLVED change detection.

use crate::core::model::ActiveAlert;
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct Transition {
    pub new: HashSet<ActiveAlert>,
    pub resolved: HashSet<ActiveAlert>,
}

/// Holds the previous cycle's active-alert set. Owned by the runner's
/// single-threaded coordinator step, so no locking is required (§5).
pub struct Correlator {
    previous: HashSet<ActiveAlert>,
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            previous: HashSet::new(),
        }
    }

    /// Diff `current` against the previous cycle's set, retain `current` as
    /// the new previous.
    pub fn correlate(&mut self, current: Vec<ActiveAlert>) -> Transition {
        let current: HashSet<ActiveAlert> = current.into_iter().collect();

        let new: HashSet<ActiveAlert> = current.difference(&self.previous).cloned().collect();
        let resolved: HashSet<ActiveAlert> = self.previous.difference(&current).cloned().collect();

        self.previous = current;
        Transition { new, resolved }
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

//! Per-run notification tracking
//!
//! Remembers which nodes changed during the current run and which nodes were
//! notified by a changed node. A notified node is refreshed at most once per
//! run. Nothing here survives past [`NotificationBus::reset`].

use crate::types::ApplyResult;
use std::collections::BTreeSet;

#[derive(Debug, Default)]
pub struct NotificationBus {
    changed: BTreeSet<String>,
    pending: BTreeSet<String>,
    fired: BTreeSet<String>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything; called at the start of every run
    pub fn reset(&mut self) {
        self.changed.clear();
        self.pending.clear();
        self.fired.clear();
    }

    /// Record a node's outcome
    pub fn record(&mut self, id: &str, result: &ApplyResult) {
        if result.is_change() {
            self.mark_changed(id);
        }
    }

    /// Record a node as changed regardless of outcome (used for dry runs)
    pub fn mark_changed(&mut self, id: &str) {
        self.changed.insert(id.to_string());
    }

    /// Mark `to` for refresh if `from` changed this run
    pub fn notify(&mut self, from: &str, to: &str) -> bool {
        if !self.changed.contains(from) || self.fired.contains(to) {
            return false;
        }
        log::debug!("{from} changed, scheduling refresh of {to}");
        self.pending.insert(to.to_string());
        true
    }

    /// Whether `id` has an unconsumed refresh
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains(id)
    }

    /// Consume a pending refresh; true at most once per node per run
    pub fn take(&mut self, id: &str) -> bool {
        if self.pending.remove(id) {
            self.fired.insert(id.to_string());
            true
        } else {
            false
        }
    }

    pub fn changed(&self) -> &BTreeSet<String> {
        &self.changed
    }

    /// Nodes whose refresh was consumed
    pub fn fired(&self) -> &BTreeSet<String> {
        &self.fired
    }
}

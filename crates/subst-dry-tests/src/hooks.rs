// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Recording substitution hook.

use std::sync::{Arc, Mutex};
use subst_core::{NodeId, SubstitutionHook, SubstitutionReport};

/// A [`SubstitutionHook`] that records `(old, new)` node pairs.
///
/// Clones share the log, so a test keeps one clone and boxes the other into
/// the substitutor.
#[derive(Clone, Default)]
pub struct RecordingHook {
    seen: Arc<Mutex<Vec<(NodeId, NodeId)>>>,
}

impl RecordingHook {
    /// Create an empty hook.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(old_node, new_node)` pair observed so far, in call order.
    pub fn seen(&self) -> Vec<(NodeId, NodeId)> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl SubstitutionHook for RecordingHook {
    fn after_substitution(&mut self, report: &SubstitutionReport) {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((report.old_node, report.new_node));
    }
}

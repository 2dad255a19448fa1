use crate::bits::Bits;
use crate::memory::Memory;
use crate::variable::VariableId;
use std::collections::HashMap;

/// A relation whose dependencies were not available when its field was
/// visited. The pair sits on the path's work-list until every target has a
/// value, at which point the engine re-evaluates the relation.
#[derive(Debug, Clone)]
pub(crate) struct PendingRelation {
    /// The suspended relation variable.
    pub(crate) waiting: VariableId,
    /// The dependencies it needs.
    pub(crate) targets: Vec<VariableId>,
}

/// Candidate state threaded through one tree walk.
///
/// A path is cheap and short-lived: it exists only for the duration of one
/// parse or specialize call and is duplicated, never shared, whenever the
/// search forks. Values learned along the way are staged in `delta` and
/// only reach the session [`Memory`] if this path wins.
#[derive(Debug, Clone, Default)]
pub(crate) struct PathState {
    /// Values assigned to variables by this path.
    pub(crate) results: HashMap<VariableId, Bits>,
    /// Staged memory writes, committed on success.
    pub(crate) delta: HashMap<VariableId, Bits>,
    /// Work-list of suspended relations.
    pub(crate) pending: Vec<PendingRelation>,
    /// Per-element values of repeat nodes, in iteration order.
    pub(crate) repeat_values: HashMap<VariableId, Vec<Bits>>,
    /// Parsing cursor: bits of the input consumed so far.
    pub(crate) consumed: usize,
}

impl PathState {
    pub(crate) fn new() -> Self {
        PathState::default()
    }

    /// Assigns a value to a variable on this path.
    pub(crate) fn add_result(&mut self, variable: VariableId, value: Bits) {
        self.results.insert(variable, value);
    }

    /// Stages a memory write.
    pub(crate) fn memorize(&mut self, variable: VariableId, value: Bits) {
        self.delta.insert(variable, value);
    }

    /// Value visible to relations: path results first, then staged writes,
    /// then the session memory.
    pub(crate) fn lookup(&self, memory: &Memory, variable: VariableId) -> Option<Bits> {
        self.results
            .get(&variable)
            .or_else(|| self.delta.get(&variable))
            .cloned()
            .or_else(|| memory.value(variable).cloned())
    }

    /// Like [`PathState::lookup`] but treats variables that still sit on
    /// the work-list as unresolved, so a relation never reads another
    /// relation's placeholder.
    pub(crate) fn resolved(&self, memory: &Memory, variable: VariableId) -> Option<Bits> {
        if self.pending.iter().any(|p| p.waiting == variable) {
            return None;
        }
        self.lookup(memory, variable)
    }

    /// Suspends a relation until its targets resolve.
    pub(crate) fn register_pending(&mut self, waiting: VariableId, targets: Vec<VariableId>) {
        tracing::trace!("deferring relation {waiting:?} on {targets:?}");
        self.pending.push(PendingRelation { waiting, targets });
    }

    /// Returns true while at least one relation is suspended.
    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

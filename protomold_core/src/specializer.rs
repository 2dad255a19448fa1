use crate::bits::Bits;
use crate::error::{ProtomoldError, ProtomoldResult};
use crate::fuzz::mutator::MutatorMode;
use crate::memory::Memory;
use crate::path::PathState;
use crate::preset::{BindingKind, Preset};
use crate::variable::{Format, Scope, Variable, VariableId, VariableKind};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaChaRng;

/// Decisions a node mutator may impose on the walk.
#[derive(Default)]
struct NodeChoices {
    branch: Option<usize>,
    count: Option<usize>,
    presence: Option<bool>,
}

/// The generation engine: produces a concrete bit sequence satisfying a
/// format, the session memory and the preset bindings.
///
/// The walk is single-path and sequential. All randomness (alternative
/// choice, repetition count, optional presence, fresh values) comes from
/// one seeded `ChaChaRng`, so two specializers with the same seed emit the
/// same bytes for the same format and bindings.
pub struct Specializer<'a> {
    memory: &'a mut Memory,
    rng: ChaChaRng,
}

impl<'a> Specializer<'a> {
    /// Creates a specializer over `memory` with the default (zero) seed.
    pub fn new(memory: &'a mut Memory) -> Self {
        let seed = [0; 32];
        Specializer {
            memory,
            rng: ChaChaRng::from_seed(seed),
        }
    }

    /// Reseeds the internal generator.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = ChaChaRng::seed_from_u64(seed);
        self
    }

    /// Generates the bit sequence of one message.
    ///
    /// # Errors
    /// [`ProtomoldError::CannotSpecialize`] when some field has no
    /// constant, no memorized value and no generatable type, or when a
    /// relation never saw its dependencies.
    /// [`ProtomoldError::BudgetExhausted`] when a fuzz binding ran out of
    /// mutation budget; this ends a fuzzing sequence and is not a failure.
    pub fn specialize(&mut self, format: &Format, preset: &mut Preset) -> ProtomoldResult<Bits> {
        let mut st = PathState::new();
        let mut trail = Vec::new();
        for field in format.fields() {
            self.var(format, preset, field, &mut st, &mut trail)?;
        }
        self.settle_patch(format, &mut st, &trail)?;
        if st.has_pending() {
            let path = st
                .pending
                .first()
                .and_then(|p| format.find(p.waiting))
                .map_or_else(String::new, |v| v.name().to_owned());
            return Err(ProtomoldError::CannotSpecialize {
                path,
                reason: "a relation never saw its dependencies".to_owned(),
            });
        }

        let mut out = Bits::new();
        for field in format.fields() {
            let value = resolve_id(format, &st, &*self.memory, field.id()).ok_or_else(|| {
                ProtomoldError::CannotSpecialize {
                    path: field.name().to_owned(),
                    reason: "the field produced no value".to_owned(),
                }
            })?;
            out.extend(&value);
        }
        self.memory.commit(&st.delta);
        tracing::debug!("specialized '{}' into {} bits", format.name(), out.len());
        Ok(out)
    }

    fn var(
        &mut self,
        format: &Format,
        preset: &mut Preset,
        var: &Variable,
        st: &mut PathState,
        trail: &mut Vec<String>,
    ) -> ProtomoldResult<()> {
        trail.push(var.name().to_owned());
        let result = self.var_inner(format, preset, var, st, trail);
        trail.pop();
        result
    }

    #[allow(clippy::too_many_lines)]
    fn var_inner(
        &mut self,
        format: &Format,
        preset: &mut Preset,
        var: &Variable,
        st: &mut PathState,
        trail: &mut Vec<String>,
    ) -> ProtomoldResult<()> {
        let id = var.id();

        // a fixed value or an external provider swallows the whole
        // subtree, children are never visited
        match preset.binding_kind(id) {
            Some(BindingKind::Fixed | BindingKind::Provider) => {
                let value = preset.pull_value(id).ok_or(ProtomoldError::BudgetExhausted)?;
                tracing::trace!("field '{}' bound to a preset value", var.name());
                st.add_result(id, value);
                return self.settle_patch(format, st, trail);
            }
            Some(BindingKind::Mutator) if var.is_leaf() => {
                let legit = if preset.mutator_mode(id) == Some(MutatorMode::Mutate) {
                    Some(self.legit_value(format, var, st, trail)?)
                } else {
                    None
                };
                if let Some(binding) = preset.mutator_mut(id) {
                    if !binding.counter.tick() {
                        return Err(ProtomoldError::BudgetExhausted);
                    }
                    let value = match binding.mutator.mode() {
                        MutatorMode::Generate => binding
                            .mutator
                            .generate()
                            .ok_or(ProtomoldError::BudgetExhausted)?,
                        MutatorMode::Mutate => {
                            binding.mutator.mutate(legit.unwrap_or_default())
                        }
                    };
                    tracing::trace!("field '{}' fuzzed into {} bits", var.name(), value.len());
                    // corrupted values are never memorized
                    st.add_result(id, value);
                }
                return self.settle_patch(format, st, trail);
            }
            _ => {}
        }

        // node mutators only steer the walk decisions
        let mut choices = NodeChoices::default();
        if let Some(binding) = preset.mutator_mut(id) {
            if !binding.counter.tick() {
                return Err(ProtomoldError::BudgetExhausted);
            }
            match var.kind() {
                VariableKind::Alt { children } => {
                    choices.branch = binding.mutator.choose_branch(children.len());
                }
                VariableKind::Repeat { min, max, .. } => {
                    choices.count = binding.mutator.choose_count((*min, *max));
                }
                VariableKind::Opt { .. } => {
                    choices.presence = binding.mutator.choose_presence();
                }
                _ => {}
            }
        }

        match var.kind() {
            VariableKind::Data { .. } => {
                let value = self.data_value(var, st, trail)?;
                let memorize = match var.scope() {
                    Scope::Persistent | Scope::Ephemeral => {
                        st.lookup(&*self.memory, id).is_none()
                    }
                    Scope::Constant | Scope::Volatile => false,
                };
                if memorize {
                    st.memorize(id, value.clone());
                }
                st.add_result(id, value);
                self.settle_patch(format, st, trail)
            }
            VariableKind::Value { .. } | VariableKind::Size { .. } | VariableKind::Checksum { .. } => {
                let expected = {
                    let lookup = |target| resolve_pending_aware(format, st, &*self.memory, target);
                    var.relation_expected(&lookup)
                };
                match expected {
                    Some(Ok(value)) => {
                        st.add_result(id, value);
                        self.settle_patch(format, st, trail)
                    }
                    Some(Err(err)) => Err(ProtomoldError::CannotSpecialize {
                        path: trail.join("."),
                        reason: err.to_string(),
                    }),
                    None => {
                        // forward reference: emit a placeholder, patch it
                        // once the dependency is generated
                        let width = placeholder_width(var);
                        st.add_result(id, Bits::zeros(width));
                        st.register_pending(id, var.relation_targets());
                        Ok(())
                    }
                }
            }
            VariableKind::Agg { children } => {
                for child in children {
                    self.var(format, preset, child, st, trail)?;
                }
                Ok(())
            }
            VariableKind::Alt { children } => {
                if children.is_empty() {
                    return Err(ProtomoldError::InvalidFormat {
                        reason: format!("alternative '{}' has no children", var.name()),
                    });
                }
                let first = choices
                    .branch
                    .unwrap_or_else(|| self.rng.random_range(0..children.len()))
                    .min(children.len() - 1);
                let mut order = vec![first];
                order.extend((0..children.len()).filter(|i| *i != first));

                let mut last_err = None;
                for idx in order {
                    let mut attempt = st.clone();
                    match self.var(format, preset, &children[idx], &mut attempt, trail) {
                        Ok(()) => {
                            *st = attempt;
                            return Ok(());
                        }
                        Err(ProtomoldError::BudgetExhausted) => {
                            return Err(ProtomoldError::BudgetExhausted);
                        }
                        Err(err) => {
                            tracing::trace!("alternative branch {idx} failed: {err}");
                            last_err = Some(err);
                        }
                    }
                }
                Err(last_err.unwrap_or_else(|| ProtomoldError::CannotSpecialize {
                    path: trail.join("."),
                    reason: "no alternative branch could be generated".to_owned(),
                }))
            }
            VariableKind::Repeat { child, min, max } => {
                let n = choices
                    .count
                    .unwrap_or_else(|| self.rng.random_range(*min..=*max));
                let mut elements = Vec::with_capacity(n);
                for _ in 0..n {
                    self.var(format, preset, child, st, trail)?;
                    // a relation inside the repeated element must resolve
                    // within the element, later patching cannot reach the
                    // per-iteration copies
                    let value = resolve_pending_aware(format, st, &*self.memory, child.id())
                        .ok_or_else(
                        || ProtomoldError::CannotSpecialize {
                            path: trail.join("."),
                            reason: "a relation inside a repetition did not resolve".to_owned(),
                        },
                    )?;
                    elements.push(value);
                }
                st.repeat_values.insert(var.id(), elements);
                Ok(())
            }
            VariableKind::Opt { child } => {
                let present = choices
                    .presence
                    .unwrap_or_else(|| self.rng.random_bool(0.5));
                if present {
                    let mut attempt = st.clone();
                    match self.var(format, preset, child, &mut attempt, trail) {
                        Ok(()) => {
                            *st = attempt;
                            return Ok(());
                        }
                        Err(ProtomoldError::BudgetExhausted) => {
                            return Err(ProtomoldError::BudgetExhausted);
                        }
                        Err(err) => {
                            tracing::trace!("optional '{}' fell back to absent: {err}", var.name());
                        }
                    }
                }
                st.add_result(var.id(), Bits::new());
                Ok(())
            }
        }
    }

    /// Produces the value of a data leaf according to its scope.
    fn data_value(
        &mut self,
        var: &Variable,
        st: &PathState,
        trail: &[String],
    ) -> ProtomoldResult<Bits> {
        let VariableKind::Data { data_type, value } = var.kind() else {
            return Err(ProtomoldError::InvalidFormat {
                reason: format!("field '{}' is not a data field", var.name()),
            });
        };
        match var.scope() {
            Scope::Constant => value.clone().ok_or_else(|| ProtomoldError::CannotSpecialize {
                path: trail.join("."),
                reason: "constant field without a defined value".to_owned(),
            }),
            Scope::Persistent | Scope::Ephemeral => Ok(st
                .lookup(&*self.memory, var.id())
                .or_else(|| value.clone())
                .unwrap_or_else(|| data_type.generate(&mut self.rng))),
            Scope::Volatile => Ok(value
                .clone()
                .unwrap_or_else(|| data_type.generate(&mut self.rng))),
        }
    }

    /// A legitimate value for a leaf, used as the seed of a corrupting
    /// mutation. Never memorized.
    fn legit_value(
        &mut self,
        format: &Format,
        var: &Variable,
        st: &PathState,
        trail: &[String],
    ) -> ProtomoldResult<Bits> {
        if matches!(var.kind(), VariableKind::Data { .. }) {
            return self.data_value(var, st, trail);
        }
        let expected = {
            let lookup = |target| resolve_pending_aware(format, st, &*self.memory, target);
            var.relation_expected(&lookup)
        };
        match expected {
            Some(Ok(value)) => Ok(value),
            _ => Ok(Bits::zeros(placeholder_width(var))),
        }
    }

    /// Re-evaluates the relation work-list, patching placeholders whose
    /// dependencies are now generated. Loops to a fixpoint because one
    /// patched relation can unlock another.
    fn settle_patch(
        &self,
        format: &Format,
        st: &mut PathState,
        trail: &[String],
    ) -> ProtomoldResult<()> {
        loop {
            let mut progressed = false;
            let mut idx = 0;
            while idx < st.pending.len() {
                let waiting = st.pending[idx].waiting;
                let Some(var) = format.find(waiting) else {
                    return Err(ProtomoldError::InvalidFormat {
                        reason: "a pending relation is not part of the format".to_owned(),
                    });
                };
                let expected = {
                    let lookup = |target| resolve_pending_aware(format, st, &*self.memory, target);
                    var.relation_expected(&lookup)
                };
                match expected {
                    None => idx += 1,
                    Some(Err(err)) => {
                        return Err(ProtomoldError::CannotSpecialize {
                            path: trail.join("."),
                            reason: err.to_string(),
                        });
                    }
                    Some(Ok(value)) => {
                        tracing::trace!("patched deferred relation '{}'", var.name());
                        st.pending.remove(idx);
                        st.add_result(waiting, value);
                        progressed = true;
                    }
                }
            }
            if !progressed {
                return Ok(());
            }
        }
    }
}

fn placeholder_width(var: &Variable) -> usize {
    match var.kind() {
        VariableKind::Size { data_type, .. } => data_type.min_bits(),
        VariableKind::Checksum { kind, .. } => kind.width_bits(),
        _ => 0,
    }
}

/// Resolved value of a variable during specialization. Node values are
/// recomputed from their children so that patched relation leaves are
/// always reflected.
fn resolve_id(format: &Format, st: &PathState, memory: &Memory, id: VariableId) -> Option<Bits> {
    if let Some(value) = st.results.get(&id) {
        return Some(value.clone());
    }
    if let Some(var) = format.find(id)
        && !var.is_leaf()
    {
        return resolve_node(format, st, memory, var);
    }
    // environment variables live outside the format, in the session memory
    st.delta
        .get(&id)
        .cloned()
        .or_else(|| memory.value(id).cloned())
}

fn resolve_node(format: &Format, st: &PathState, memory: &Memory, var: &Variable) -> Option<Bits> {
    match var.kind() {
        VariableKind::Agg { children } => {
            let mut out = Bits::new();
            for child in children {
                out.extend(&resolve_id(format, st, memory, child.id())?);
            }
            Some(out)
        }
        VariableKind::Alt { children } => children
            .iter()
            .find(|child| subtree_has_result(child, st))
            .and_then(|child| resolve_id(format, st, memory, child.id())),
        VariableKind::Repeat { child: _, .. } => {
            let elements = st.repeat_values.get(&var.id())?;
            let mut out = Bits::new();
            for element in elements {
                out.extend(element);
            }
            Some(out)
        }
        VariableKind::Opt { child } => {
            if subtree_has_result(child, st) {
                resolve_id(format, st, memory, child.id())
            } else {
                Some(Bits::new())
            }
        }
        _ => None,
    }
}

fn subtree_has_result(var: &Variable, st: &PathState) -> bool {
    if st.results.contains_key(&var.id()) || st.repeat_values.contains_key(&var.id()) {
        return true;
    }
    var.children().iter().any(|child| subtree_has_result(child, st))
}

/// Like [`resolve_id`] but refuses to read a relation that is still on the
/// work-list, so a relation never consumes another relation's placeholder.
fn resolve_pending_aware(
    format: &Format,
    st: &PathState,
    memory: &Memory,
    id: VariableId,
) -> Option<Bits> {
    if st.pending.iter().any(|p| p.waiting == id) {
        return None;
    }
    // a node containing a pending leaf is unresolved as well
    if let Some(var) = format.find(id)
        && st
            .pending
            .iter()
            .any(|p| var.find(p.waiting).is_some())
    {
        return None;
    }
    resolve_id(format, st, memory, id)
}

/// Generates one message for `format`, committing freshly memorized values
/// into `memory`. The convenience entry point over [`Specializer`].
///
/// # Errors
/// See [`Specializer::specialize`].
pub fn specialize(
    format: &Format,
    memory: &mut Memory,
    preset: &mut Preset,
) -> ProtomoldResult<Bits> {
    Specializer::new(memory).specialize(format, preset)
}

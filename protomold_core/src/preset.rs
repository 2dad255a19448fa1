use crate::bits::Bits;
use crate::error::{ProtomoldError, ProtomoldResult};
use crate::fuzz::mutator::{
    DomainMutator, MutatorMode, MutatorRegistry, MutatorSpec,
};
use crate::variable::{Format, Variable, VariableId};
use std::collections::HashMap;
use std::fmt;

/// An external source of preset values, pulled once per specialization.
pub struct ValueProvider {
    iter: Box<dyn Iterator<Item = Bits> + Send>,
}

impl ValueProvider {
    /// Wraps an iterator of values.
    pub fn new(iter: impl Iterator<Item = Bits> + Send + 'static) -> Self {
        ValueProvider {
            iter: Box::new(iter),
        }
    }

    fn pull(&mut self) -> Option<Bits> {
        self.iter.next()
    }
}

impl fmt::Debug for ValueProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ValueProvider(..)")
    }
}

/// Bound mutation budget of one fuzz binding.
///
/// Every consultation of the bound mutator spends one unit; an exhausted
/// counter ends the fuzzing sequence, it is not an error.
#[derive(Debug, Clone)]
pub struct BudgetCounter {
    max: u64,
    used: u64,
}

impl BudgetCounter {
    /// A counter allowing `max` consultations.
    #[must_use]
    pub fn new(max: u64) -> Self {
        BudgetCounter { max, used: 0 }
    }

    /// Spends one unit. Returns false once the budget is exhausted.
    pub fn tick(&mut self) -> bool {
        if self.used >= self.max {
            return false;
        }
        self.used += 1;
        true
    }

    /// Units left.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.max - self.used
    }
}

/// Mutation budget of a fuzz binding: either an absolute number of
/// consultations or a fraction of the bound variable's state-space.
#[derive(Debug, Clone, Copy)]
pub enum CounterMax {
    /// Absolute number of consultations.
    Absolute(u64),
    /// Fraction of the variable's state-space estimate.
    Ratio(f64),
}

impl Default for CounterMax {
    fn default() -> Self {
        // 2^16, a sensible bound for unattended runs
        CounterMax::Absolute(65536)
    }
}

impl CounterMax {
    fn resolve(self, state_space: u128) -> u64 {
        match self {
            CounterMax::Absolute(n) => n,
            CounterMax::Ratio(ratio) => {
                let space = state_space.min(u128::from(u64::MAX)) as f64;
                (space * ratio.clamp(0.0, 1.0)) as u64
            }
        }
    }
}

/// A mutator bound to one variable, together with its budget.
#[derive(Debug)]
pub struct MutatorBinding {
    /// The strategy object overriding normal value production.
    pub(crate) mutator: Box<dyn DomainMutator>,
    /// Remaining budget.
    pub(crate) counter: BudgetCounter,
}

/// What a preset entry does to the bound variable during specialization.
#[derive(Debug)]
pub enum Binding {
    /// Emit this exact value, children are never visited.
    Fixed(Bits),
    /// Pull the next value from an external iterator.
    Provider(ValueProvider),
    /// Delegate value production to a mutator.
    Mutator(MutatorBinding),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BindingKind {
    Fixed,
    Provider,
    Mutator,
}

/// Per-binding fuzzing configuration, merged over the preset's registry at
/// bind time.
#[derive(Debug, Default, Clone)]
pub struct FuzzConfig {
    /// Generation or corruption mode.
    pub mode: MutatorMode,
    /// Mutation budget of each created binding.
    pub counter_max: CounterMax,
    /// Seed override; the preset seed is used when absent.
    pub seed: Option<u64>,
    /// Value interval policy handed to the created mutators.
    pub interval: crate::fuzz::mutator::IntervalSpec,
    /// Scalar stream implementation handed to the created mutators.
    pub generator: crate::fuzz::mutator::GeneratorKind,
    /// Whether node mutators propagate fuzzing to their descendants.
    pub mutate_children: bool,
    /// Type-to-mutator overrides merged over the preset's defaults.
    pub overrides: MutatorRegistry,
}

/// The set of preset and fuzz bindings of one specialization run.
///
/// A preset maps variable identities to [`Binding`]s. It is built once,
/// consulted at every variable the generation walk visits, and never read
/// by the parser.
#[derive(Debug, Default)]
pub struct Preset {
    bindings: HashMap<VariableId, Binding>,
    registry: MutatorRegistry,
    seed: u64,
}

impl Preset {
    /// An empty preset without mutator defaults.
    #[must_use]
    pub fn new() -> Self {
        Preset::default()
    }

    /// An empty preset using `registry` as the default type-to-mutator
    /// mapping for fuzz bindings.
    #[must_use]
    pub fn with_registry(registry: MutatorRegistry) -> Self {
        Preset {
            bindings: HashMap::new(),
            registry,
            seed: 0,
        }
    }

    /// Base seed mixed into every created mutator.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Binds `var` to a fixed value, emitted as-is. A fixed binding never
    /// propagates to children.
    pub fn fix(&mut self, var: &Variable, value: Bits) {
        self.bindings.insert(var.id(), Binding::Fixed(value));
    }

    /// Binds `var` to an external value iterator. The sequence ends when
    /// the iterator runs dry.
    pub fn provide(&mut self, var: &Variable, iter: impl Iterator<Item = Bits> + Send + 'static) {
        self.bindings
            .insert(var.id(), Binding::Provider(ValueProvider::new(iter)));
    }

    /// Binds a mutator to `var` itself. When `var` is a node whose mutator
    /// asks for child mutation, the binding propagates to its not-yet-bound
    /// descendants.
    ///
    /// # Errors
    /// Fails when no mutator is registered for the variable's kind.
    pub fn fuzz_variable(&mut self, var: &Variable, config: &FuzzConfig) -> ProtomoldResult<()> {
        if self.bindings.contains_key(&var.id()) {
            return Ok(());
        }
        let merged = self.registry.merged(&config.overrides);
        let spec = MutatorSpec {
            seed: mix_seed(config.seed.unwrap_or(self.seed), var.id()),
            mode: config.mode,
            interval: config.interval.clone(),
            generator: config.generator,
            mutate_children: config.mutate_children,
        };
        let mutator = merged.build(var, &spec)?;
        let propagate = !var.is_leaf() && mutator.mutate_children();
        let counter = BudgetCounter::new(config.counter_max.resolve(var.count()));
        self.bindings
            .insert(var.id(), Binding::Mutator(MutatorBinding { mutator, counter }));

        if propagate {
            for child in var.children() {
                self.fuzz_variable(child, config)?;
            }
        }
        Ok(())
    }

    /// Binds mutators to every not-yet-bound leaf under `field`.
    ///
    /// # Errors
    /// Fails when no mutator is registered for some leaf kind.
    pub fn fuzz_field(&mut self, field: &Variable, config: &FuzzConfig) -> ProtomoldResult<()> {
        let mut leaves = Vec::new();
        field.for_each_leaf(&mut |leaf| leaves.push(leaf.id()));
        for leaf_id in leaves {
            if self.bindings.contains_key(&leaf_id) {
                continue;
            }
            if let Some(leaf) = field.find(leaf_id) {
                self.fuzz_variable(leaf, config)?;
            }
        }
        Ok(())
    }

    /// Binds mutators to every not-yet-bound leaf of the whole format.
    ///
    /// # Errors
    /// Fails when no mutator is registered for some leaf kind.
    pub fn fuzz_format(&mut self, format: &Format, config: &FuzzConfig) -> ProtomoldResult<()> {
        for field in format.fields() {
            self.fuzz_field(field, config)?;
        }
        Ok(())
    }

    /// Returns true when the variable carries any binding.
    #[must_use]
    pub fn is_bound(&self, id: VariableId) -> bool {
        self.bindings.contains_key(&id)
    }

    pub(crate) fn binding_kind(&self, id: VariableId) -> Option<BindingKind> {
        self.bindings.get(&id).map(|b| match b {
            Binding::Fixed(_) => BindingKind::Fixed,
            Binding::Provider(_) => BindingKind::Provider,
            Binding::Mutator(_) => BindingKind::Mutator,
        })
    }

    /// Next value of a fixed or provider binding.
    pub(crate) fn pull_value(&mut self, id: VariableId) -> Option<Bits> {
        match self.bindings.get_mut(&id) {
            Some(Binding::Fixed(value)) => Some(value.clone()),
            Some(Binding::Provider(provider)) => provider.pull(),
            _ => None,
        }
    }

    pub(crate) fn mutator_mut(&mut self, id: VariableId) -> Option<&mut MutatorBinding> {
        match self.bindings.get_mut(&id) {
            Some(Binding::Mutator(binding)) => Some(binding),
            _ => None,
        }
    }

    pub(crate) fn mutator_mode(&self, id: VariableId) -> Option<MutatorMode> {
        match self.bindings.get(&id) {
            Some(Binding::Mutator(binding)) => Some(binding.mutator.mode()),
            _ => None,
        }
    }
}

fn mix_seed(base: u64, id: VariableId) -> u64 {
    base ^ id.raw().wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

impl Preset {
    /// Encodes and fixes a typed constant on a data leaf.
    ///
    /// # Errors
    /// Fails when `var` is not a data leaf or the value does not fit its
    /// type.
    pub fn fix_value(
        &mut self,
        var: &Variable,
        value: &crate::types::TypedValue,
    ) -> ProtomoldResult<()> {
        let crate::variable::VariableKind::Data { data_type, .. } = var.kind() else {
            return Err(ProtomoldError::InvalidFormat {
                reason: format!("field '{}' is not a data field", var.name()),
            });
        };
        let Some(bits) = data_type.encode(value) else {
            return Err(ProtomoldError::InvalidFormat {
                reason: format!("preset value of field '{}' does not fit its type", var.name()),
            });
        };
        self.fix(var, bits);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fuzz::mutator::{DomainMutator, MutatorKey, MutatorMode, MutatorRegistry};
    use crate::types::{DataType, TypedValue};
    use std::sync::Arc;

    #[derive(Debug)]
    struct NullMutator {
        mutate_children: bool,
    }

    impl DomainMutator for NullMutator {
        fn mode(&self) -> MutatorMode {
            MutatorMode::Generate
        }

        fn generate(&mut self) -> Option<Bits> {
            Some(Bits::new())
        }

        fn mutate(&mut self, legit: Bits) -> Bits {
            legit
        }

        fn mutate_children(&self) -> bool {
            self.mutate_children
        }
    }

    fn null_registry(mutate_children_nodes: bool) -> MutatorRegistry {
        let mut registry = MutatorRegistry::empty();
        for key in [
            MutatorKey::Integer,
            MutatorKey::String,
            MutatorKey::Alt,
            MutatorKey::Agg,
        ] {
            registry.register(
                key,
                Arc::new(move |_, spec| {
                    Box::new(NullMutator {
                        mutate_children: spec.mutate_children && mutate_children_nodes,
                    })
                }),
            );
        }
        registry
    }

    #[test]
    fn budget_counter_stops_after_max() {
        let mut counter = BudgetCounter::new(3);
        assert!(counter.tick());
        assert!(counter.tick());
        assert!(counter.tick());
        assert!(!counter.tick());
        assert!(!counter.tick());
    }

    #[test]
    fn ratio_budget_follows_state_space() {
        assert_eq!(CounterMax::Ratio(0.5).resolve(200), 100);
        assert_eq!(CounterMax::Absolute(80).resolve(1_000_000), 80);
    }

    #[test]
    fn fixed_binding_does_not_propagate() {
        let inner = Variable::data("inner", DataType::uint(8));
        let inner_id = inner.id();
        let node = Variable::agg("node", vec![inner]);
        let mut preset = Preset::new();
        preset.fix(&node, Bits::from_uint(0xAB, 8));
        assert!(preset.is_bound(node.id()));
        assert!(!preset.is_bound(inner_id));
    }

    #[test]
    fn node_binding_propagates_only_when_asked() {
        let leaf_a = Variable::data("a", DataType::uint(8));
        let leaf_b = Variable::data("b", DataType::uint(8));
        let (id_a, id_b) = (leaf_a.id(), leaf_b.id());
        let node = Variable::alt("choice", vec![leaf_a, leaf_b]);

        let config = FuzzConfig {
            mutate_children: true,
            ..FuzzConfig::default()
        };

        let mut preset = Preset::with_registry(null_registry(false));
        preset.fuzz_variable(&node, &config).expect("binds");
        assert!(preset.is_bound(node.id()));
        assert!(!preset.is_bound(id_a) && !preset.is_bound(id_b));

        let mut preset = Preset::with_registry(null_registry(true));
        preset.fuzz_variable(&node, &config).expect("binds");
        assert!(preset.is_bound(node.id()));
        assert!(preset.is_bound(id_a) && preset.is_bound(id_b));
    }

    #[test]
    fn field_binding_reaches_leaves_but_not_the_node() {
        let leaf = Variable::data("x", DataType::uint(8));
        let leaf_id = leaf.id();
        let field = Variable::agg("wrapper", vec![leaf]);

        let mut preset = Preset::with_registry(null_registry(false));
        preset
            .fuzz_field(&field, &FuzzConfig::default())
            .expect("binds");
        assert!(preset.is_bound(leaf_id));
        assert!(!preset.is_bound(field.id()));
    }

    #[test]
    fn already_bound_leaves_keep_their_binding() {
        let leaf = Variable::data("x", DataType::uint(8));
        let leaf_id = leaf.id();
        let field = Variable::agg("wrapper", vec![leaf]);

        let mut preset = Preset::with_registry(null_registry(false));
        let pinned = Bits::from_uint(0x7F, 8);
        if let Some(inner) = field.find(leaf_id) {
            preset.fix(inner, pinned);
        }
        preset
            .fuzz_field(&field, &FuzzConfig::default())
            .expect("binds");
        assert_eq!(preset.binding_kind(leaf_id), Some(BindingKind::Fixed));
    }

    #[test]
    fn fix_value_checks_the_leaf_type() {
        let field = Variable::data("f", DataType::uint_interval(8, (0, 10)));
        let mut preset = Preset::new();
        assert!(preset.fix_value(&field, &TypedValue::Int(7)).is_ok());
        assert!(preset.fix_value(&field, &TypedValue::Int(200)).is_err());
    }
}

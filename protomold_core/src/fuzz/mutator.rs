use crate::bits::Bits;
use crate::error::{ProtomoldError, ProtomoldResult};
use crate::fuzz::dangerous::DangerousNumber;
use crate::variable::{Variable, VariableKind};
use num::{Bounded, NumCast};
use num_traits::{WrappingAdd, WrappingSub};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::{Add, BitXor, Sub};
use std::sync::Arc;

/// How a mutator produces its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MutatorMode {
    /// Produce a value directly, ignoring the field's declared constraints.
    #[default]
    Generate,
    /// Produce a legitimate value first, then apply a corrupting
    /// transformation to it.
    Mutate,
}

/// Value interval policy of a mutator.
#[derive(Debug, Clone, Default)]
pub enum IntervalSpec {
    /// Stay within the min and max values declared by the field.
    #[default]
    DefaultInterval,
    /// Use the full storage width of the field instead of its declared
    /// interval.
    FullInterval,
    /// An explicit interval.
    Custom(i128, i128),
}

/// Which scalar stream implementation a mutator should pull from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GeneratorKind {
    /// Seeded pseudo-random stream.
    #[default]
    Random,
    /// Deterministic boundary-value sequence.
    Determinist,
}

/// Parameters handed to a mutator factory for one binding.
#[derive(Debug, Clone)]
pub struct MutatorSpec {
    /// Seed of the mutator's own generator, derived from the preset seed
    /// and the variable identity.
    pub seed: u64,
    /// Generation or corruption mode.
    pub mode: MutatorMode,
    /// Value interval policy.
    pub interval: IntervalSpec,
    /// Scalar stream implementation.
    pub generator: GeneratorKind,
    /// Whether a node mutator propagates fuzzing to its descendants.
    pub mutate_children: bool,
}

/// A per-variable fuzzing strategy.
///
/// Leaf mutators produce bit values through [`DomainMutator::generate`] or
/// corrupt a legitimate value through [`DomainMutator::mutate`]. Node
/// mutators instead steer the generation walk through the `choose_*`
/// hooks; a hook returning `None` leaves the decision to the engine.
pub trait DomainMutator: fmt::Debug + Send {
    /// The operating mode of this mutator.
    fn mode(&self) -> MutatorMode;

    /// Produces the next value, possibly violating the field's declared
    /// constraints. `None` means the mutator has nothing more to produce,
    /// which ends the fuzzing sequence.
    fn generate(&mut self) -> Option<Bits>;

    /// Applies a corrupting transformation to a legitimate value.
    fn mutate(&mut self, legit: Bits) -> Bits;

    /// Overrides the branch choice of an alternative with `count` children.
    fn choose_branch(&mut self, count: usize) -> Option<usize> {
        let _ = count;
        None
    }

    /// Overrides the repetition count of a repeat node with the declared
    /// `bounds`. The returned count may exceed the bounds.
    fn choose_count(&mut self, bounds: (usize, usize)) -> Option<usize> {
        let _ = bounds;
        None
    }

    /// Overrides the presence decision of an optional node.
    fn choose_presence(&mut self) -> Option<bool> {
        None
    }

    /// Whether a binding on this (node) mutator propagates to the
    /// not-yet-bound descendants of the variable.
    fn mutate_children(&self) -> bool {
        false
    }
}

/// Registry key: the kind of variable a mutator factory applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutatorKey {
    /// Integer-typed data fields and size relations.
    Integer,
    /// Text data fields.
    String,
    /// Raw byte data fields and value relations.
    Raw,
    /// Bit-granular data fields.
    BitArray,
    /// Hexadecimal data fields.
    HexaString,
    /// IPv4 data fields.
    Ipv4,
    /// Timestamp data fields.
    Timestamp,
    /// Aggregate nodes.
    Agg,
    /// Alternative nodes.
    Alt,
    /// Repeat nodes.
    Repeat,
    /// Optional nodes.
    Opt,
}

impl MutatorKey {
    /// The registry key of a variable.
    #[must_use]
    pub fn of(var: &Variable) -> MutatorKey {
        use crate::types::DataType;
        match var.kind() {
            VariableKind::Data { data_type, .. } => match data_type {
                DataType::Integer(_) => MutatorKey::Integer,
                DataType::String(_) => MutatorKey::String,
                DataType::Raw(_) => MutatorKey::Raw,
                DataType::BitArray(_) => MutatorKey::BitArray,
                DataType::HexaString(_) => MutatorKey::HexaString,
                DataType::Ipv4 => MutatorKey::Ipv4,
                DataType::Timestamp => MutatorKey::Timestamp,
            },
            VariableKind::Size { .. } | VariableKind::Checksum { .. } => MutatorKey::Integer,
            VariableKind::Value { .. } => MutatorKey::Raw,
            VariableKind::Agg { .. } => MutatorKey::Agg,
            VariableKind::Alt { .. } => MutatorKey::Alt,
            VariableKind::Repeat { .. } => MutatorKey::Repeat,
            VariableKind::Opt { .. } => MutatorKey::Opt,
        }
    }
}

/// Builds a mutator for a variable and a binding spec.
pub type MutatorFactory = Arc<dyn Fn(&Variable, &MutatorSpec) -> Box<dyn DomainMutator> + Send + Sync>;

/// Explicit type-to-mutator mapping.
///
/// There is no process-wide default: a registry is an explicit
/// configuration object carried by each [`Preset`](crate::preset::Preset),
/// and per-binding overrides are merged over it at bind time.
#[derive(Clone, Default)]
pub struct MutatorRegistry {
    factories: HashMap<MutatorKey, MutatorFactory>,
}

impl MutatorRegistry {
    /// A registry without any factory.
    #[must_use]
    pub fn empty() -> Self {
        MutatorRegistry::default()
    }

    /// Registers (or replaces) the factory for a kind.
    pub fn register(&mut self, key: MutatorKey, factory: MutatorFactory) {
        self.factories.insert(key, factory);
    }

    /// Returns a copy of `self` with the entries of `overrides` taking
    /// precedence.
    #[must_use]
    pub fn merged(&self, overrides: &MutatorRegistry) -> MutatorRegistry {
        let mut merged = self.clone();
        for (key, factory) in &overrides.factories {
            merged.factories.insert(*key, factory.clone());
        }
        merged
    }

    /// Builds a mutator for `var`.
    ///
    /// # Errors
    /// Fails when no factory is registered for the variable's kind.
    pub fn build(&self, var: &Variable, spec: &MutatorSpec) -> ProtomoldResult<Box<dyn DomainMutator>> {
        let key = MutatorKey::of(var);
        let Some(factory) = self.factories.get(&key) else {
            return Err(ProtomoldError::InvalidFormat {
                reason: format!("no mutator registered for {key:?} (field '{}')", var.name()),
            });
        };
        Ok(factory(var, spec))
    }
}

impl fmt::Debug for MutatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.factories.keys().collect();
        keys.sort_by_key(|k| format!("{k:?}"));
        write!(f, "MutatorRegistry{keys:?}")
    }
}

#[repr(u8)]
#[derive(Debug, Copy, Clone)]
enum MutationOperation {
    BitFlip,
    Flip,
    Arithmetic,
}

/// The numeric corruption engine shared by the concrete mutators.
///
/// Each mutator owns one engine seeded from its binding spec, so distinct
/// bindings produce independent but reproducible corruption streams. The
/// engine can flip single bits, flip bit subsets, apply small wrapping
/// arithmetic or substitute a boundary value, and offers the chance/index
/// helpers the mutators use to make their strategy decisions.
#[derive(Debug)]
pub struct MutationEngine<R: Rng> {
    rng: R,
    /// Stored indexes cache the last returned index per call site so a
    /// choice is not rerolled on every consultation.
    stored_indexes: HashMap<&'static str, usize>,
}

impl<R: Rng> MutationEngine<R> {
    /// Creates an engine over a seeded generator.
    pub fn new(rng: R) -> MutationEngine<R> {
        MutationEngine {
            rng,
            stored_indexes: HashMap::new(),
        }
    }

    /// Mutates a number after randomly selecting a corruption strategy.
    /// With a small chance the number is replaced by a boundary value
    /// instead.
    pub fn mutate<T>(&mut self, num: &mut T)
    where
        T: BitXor<Output = T>
            + Add<Output = T>
            + Sub<Output = T>
            + NumCast
            + Bounded
            + Copy
            + WrappingAdd<Output = T>
            + WrappingSub<Output = T>
            + DangerousNumber<T>
            + fmt::Debug,
    {
        if self.gen_chance(0.01) {
            *num = T::select_dangerous_number(&mut self.rng);
            return;
        }

        match self.operation() {
            MutationOperation::BitFlip => self.bit_flip(num),
            MutationOperation::Flip => self.flip(num),
            MutationOperation::Arithmetic => self.arithmetic(num),
        }
    }

    fn operation(&mut self) -> MutationOperation {
        match self.rng.random_range(0..3u8) {
            0 => MutationOperation::BitFlip,
            1 => MutationOperation::Flip,
            _ => MutationOperation::Arithmetic,
        }
    }

    /// Flip a single bit in the given number.
    fn bit_flip<T>(&mut self, num: &mut T)
    where
        T: BitXor<Output = T> + NumCast + Copy,
    {
        #[allow(clippy::cast_possible_truncation)]
        let num_bits = (std::mem::size_of::<T>() * 8) as u8;
        let idx: u8 = self.rng.random_range(0..num_bits);

        if let Some(cast) = num::cast(1u64 << idx) {
            *num = (*num) ^ cast;
        }
    }

    /// Flip a random subset of the bits of the number.
    fn flip<T>(&mut self, num: &mut T)
    where
        T: BitXor<Output = T> + NumCast + Copy,
    {
        let num_bits = std::mem::size_of::<T>() * 8;
        for idx in 0..num_bits {
            if self.rng.random::<bool>()
                && let Some(cast) = num::cast(1u64 << idx)
            {
                *num = (*num) ^ cast;
            }
        }
    }

    /// Perform a small wrapping addition or subtraction on the number.
    fn arithmetic<T>(&mut self, num: &mut T)
    where
        T: NumCast + Copy + WrappingAdd<Output = T> + WrappingSub<Output = T>,
    {
        let added_num: i64 = self.rng.random_range(1..=0x10);

        if let Some(cast) = num::cast(added_num) {
            if self.rng.random::<bool>() {
                *num = num.wrapping_add(&cast);
            } else {
                *num = num.wrapping_sub(&cast);
            }
        }
    }

    /// Returns a value in `[min, max)`, or `min` when the range is empty.
    pub fn gen_range(&mut self, min: usize, max: usize) -> usize {
        if max <= min {
            return min;
        }
        self.rng.random_range(min..max)
    }

    /// Returns an unsigned value in `[min, max]`.
    pub fn gen_value(&mut self, min: u64, max: u64) -> u64 {
        if max <= min {
            return min;
        }
        self.rng.random_range(min..=max)
    }

    /// Selects an index below `max`, sticking to the previous selection
    /// for the same `key` most of the time.
    pub fn gen_index(&mut self, key: &'static str, max: usize) -> usize {
        if max == 0 {
            return 0;
        }
        if self.stored_indexes.contains_key(key) {
            let change = self.gen_chance(0.4);
            if let Some(index) = self.stored_indexes.get_mut(key) {
                if change {
                    *index = self.rng.random_range(0..max);
                }
                return *index;
            }
        }
        let index = self.rng.random_range(0..max);
        self.stored_indexes.insert(key, index);
        index
    }

    /// Returns whether the chance event occurred.
    pub fn gen_chance(&mut self, chance: f64) -> bool {
        if chance <= 0.0 {
            false
        } else if chance >= 1.0 {
            true
        } else {
            self.rng.random_bool(chance)
        }
    }

    /// A random bit buffer of `len` bits.
    pub fn random_bits(&mut self, len: usize) -> Bits {
        let mut out = Bits::new();
        for _ in 0..len {
            out.push(self.rng.random());
        }
        out
    }

    /// A random byte buffer of `len` bytes.
    pub fn random_bytes(&mut self, len: usize) -> Vec<u8> {
        (0..len).map(|_| self.rng.random()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaChaRng;

    #[test]
    fn mutate_is_reproducible_per_seed() {
        let mut a = MutationEngine::new(ChaChaRng::seed_from_u64(5));
        let mut b = MutationEngine::new(ChaChaRng::seed_from_u64(5));
        let mut x: u32 = 0x1234_5678;
        let mut y: u32 = 0x1234_5678;
        for _ in 0..32 {
            a.mutate(&mut x);
            b.mutate(&mut y);
        }
        assert_eq!(x, y);
    }

    #[test]
    fn gen_index_sticks_to_its_key() {
        let mut engine = MutationEngine::new(ChaChaRng::seed_from_u64(1));
        let first = engine.gen_index("branch", 1000);
        // a cached index is rerolled less than half the time, so at least
        // one of the next draws must repeat the stored value
        let repeats = (0..8).filter(|_| engine.gen_index("branch", 1000) == first).count();
        assert!(repeats > 0);
    }

    #[test]
    fn empty_ranges_do_not_panic() {
        let mut engine = MutationEngine::new(ChaChaRng::seed_from_u64(2));
        assert_eq!(engine.gen_range(4, 4), 4);
        assert_eq!(engine.gen_value(9, 3), 9);
    }
}

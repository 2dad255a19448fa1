use crate::mutators::flip_bit;
use protomold_core::bits::Bits;
use protomold_core::fuzz::mutator::{
    DomainMutator, IntervalSpec, MutationEngine, MutatorMode, MutatorSpec,
};
use protomold_core::types::DataType;
use protomold_core::variable::{Variable, VariableKind};
use rand::SeedableRng;
use rand_chacha::ChaChaRng;

const FULL_INTERVAL_MAX_BYTES: usize = 255;
const FULL_INTERVAL_MAX_BITS: usize = 2048;

fn resolve_interval(
    declared: (usize, usize),
    spec: &MutatorSpec,
    full_max: usize,
) -> (usize, usize) {
    match &spec.interval {
        IntervalSpec::DefaultInterval => declared,
        IntervalSpec::FullInterval => (0, full_max),
        IntervalSpec::Custom(a, b) => {
            let a = usize::try_from(*a).unwrap_or(0);
            let b = usize::try_from(*b).unwrap_or(full_max);
            (a, b.max(a))
        }
    }
}

fn corrupt_bytes(engine: &mut MutationEngine<ChaChaRng>, legit: Bits) -> Bits {
    if legit.is_empty() {
        return legit;
    }
    let idx = engine.gen_range(0, legit.len());
    flip_bit(&legit, idx)
}

/// Fuzzing strategy for raw byte fields and value relations.
pub struct RawMutator {
    mode: MutatorMode,
    bytes: (usize, usize),
    engine: MutationEngine<ChaChaRng>,
}

impl RawMutator {
    /// Builds the mutator for a raw byte variable.
    #[must_use]
    pub fn from_variable(var: &Variable, spec: &MutatorSpec) -> Self {
        let declared = match var.kind() {
            VariableKind::Data { data_type: DataType::Raw(t), .. } => t.bytes,
            _ => (0, 32),
        };
        RawMutator {
            mode: spec.mode,
            bytes: resolve_interval(declared, spec, FULL_INTERVAL_MAX_BYTES),
            engine: MutationEngine::new(ChaChaRng::seed_from_u64(spec.seed)),
        }
    }
}

impl std::fmt::Debug for RawMutator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawMutator({}..={} bytes)", self.bytes.0, self.bytes.1)
    }
}

impl DomainMutator for RawMutator {
    fn mode(&self) -> MutatorMode {
        self.mode
    }

    fn generate(&mut self) -> Option<Bits> {
        let len = self.engine.gen_range(self.bytes.0, self.bytes.1 + 1);
        Some(Bits::from_bytes(&self.engine.random_bytes(len)))
    }

    fn mutate(&mut self, legit: Bits) -> Bits {
        corrupt_bytes(&mut self.engine, legit)
    }
}

/// Fuzzing strategy for bit-granular fields.
pub struct BitArrayMutator {
    mode: MutatorMode,
    bits: (usize, usize),
    engine: MutationEngine<ChaChaRng>,
}

impl BitArrayMutator {
    /// Builds the mutator for a bit array variable.
    #[must_use]
    pub fn from_variable(var: &Variable, spec: &MutatorSpec) -> Self {
        let declared = match var.kind() {
            VariableKind::Data { data_type: DataType::BitArray(t), .. } => t.bits,
            _ => (0, 64),
        };
        BitArrayMutator {
            mode: spec.mode,
            bits: resolve_interval(declared, spec, FULL_INTERVAL_MAX_BITS),
            engine: MutationEngine::new(ChaChaRng::seed_from_u64(spec.seed)),
        }
    }
}

impl std::fmt::Debug for BitArrayMutator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BitArrayMutator({}..={} bits)", self.bits.0, self.bits.1)
    }
}

impl DomainMutator for BitArrayMutator {
    fn mode(&self) -> MutatorMode {
        self.mode
    }

    fn generate(&mut self) -> Option<Bits> {
        let len = self.engine.gen_range(self.bits.0, self.bits.1 + 1);
        Some(self.engine.random_bits(len))
    }

    fn mutate(&mut self, legit: Bits) -> Bits {
        corrupt_bytes(&mut self.engine, legit)
    }
}

/// Fuzzing strategy for hexadecimal string fields.
pub struct HexaStringMutator {
    mode: MutatorMode,
    bytes: (usize, usize),
    engine: MutationEngine<ChaChaRng>,
}

impl HexaStringMutator {
    /// Builds the mutator for a hexadecimal string variable.
    #[must_use]
    pub fn from_variable(var: &Variable, spec: &MutatorSpec) -> Self {
        let declared = match var.kind() {
            VariableKind::Data { data_type: DataType::HexaString(t), .. } => t.bytes,
            _ => (0, 32),
        };
        HexaStringMutator {
            mode: spec.mode,
            bytes: resolve_interval(declared, spec, FULL_INTERVAL_MAX_BYTES),
            engine: MutationEngine::new(ChaChaRng::seed_from_u64(spec.seed)),
        }
    }
}

impl std::fmt::Debug for HexaStringMutator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HexaStringMutator({}..={} bytes)", self.bytes.0, self.bytes.1)
    }
}

impl DomainMutator for HexaStringMutator {
    fn mode(&self) -> MutatorMode {
        self.mode
    }

    fn generate(&mut self) -> Option<Bits> {
        let len = self.engine.gen_range(self.bytes.0, self.bytes.1 + 1);
        Some(Bits::from_bytes(&self.engine.random_bytes(len)))
    }

    fn mutate(&mut self, legit: Bits) -> Bits {
        corrupt_bytes(&mut self.engine, legit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protomold_core::fuzz::mutator::GeneratorKind;

    fn spec(interval: IntervalSpec) -> MutatorSpec {
        MutatorSpec {
            seed: 3,
            mode: MutatorMode::Generate,
            interval,
            generator: GeneratorKind::Random,
            mutate_children: false,
        }
    }

    #[test]
    fn bit_array_lengths_are_bit_granular() {
        let var = Variable::data("f", DataType::bits_interval(3, 11));
        let mut mutator = BitArrayMutator::from_variable(&var, &spec(IntervalSpec::DefaultInterval));
        for _ in 0..50 {
            let value = mutator.generate().expect("a value");
            assert!((3..=11).contains(&value.len()));
        }
    }

    #[test]
    fn raw_mutate_flips_one_bit() {
        let var = Variable::data("f", DataType::raw_interval(0, 8));
        let mut mutator = RawMutator::from_variable(&var, &spec(IntervalSpec::DefaultInterval));
        let legit = Bits::from_bytes(&[0xAA, 0xBB]);
        let corrupted = mutator.mutate(legit.clone());
        assert_eq!(corrupted.len(), legit.len());
        let differing = (0..legit.len())
            .filter(|i| legit.bit(*i) != corrupted.bit(*i))
            .count();
        assert_eq!(differing, 1);
    }
}

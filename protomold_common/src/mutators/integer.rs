use crate::mutators::flip_bit;
use protomold_core::bits::Bits;
use protomold_core::fuzz::generator::Generator;
use protomold_core::fuzz::mutator::{
    DomainMutator, GeneratorKind, IntervalSpec, MutationEngine, MutatorMode, MutatorSpec,
};
use protomold_core::variable::{Variable, VariableKind};
use rand::SeedableRng;
use rand_chacha::ChaChaRng;

/// Fuzzing strategy for integer-shaped fields: plain integer data fields,
/// size relations and checksum relations.
///
/// In generate mode the values come from the configured scalar stream
/// (deterministic boundary sequence or seeded pseudo-random stream) over
/// the configured interval; the full-interval policy widens it to the
/// whole storage width, deliberately escaping the declared bounds. In
/// mutate mode a legitimate value is corrupted by the numeric engine.
pub struct IntegerMutator {
    mode: MutatorMode,
    bits: u32,
    min: i128,
    generator: Generator,
    generator_kind: GeneratorKind,
    engine: MutationEngine<ChaChaRng>,
}

impl IntegerMutator {
    /// Builds the mutator for an integer-shaped variable.
    #[must_use]
    pub fn from_variable(var: &Variable, spec: &MutatorSpec) -> Self {
        let (bits, signed, declared) = integer_shape(var);
        let storage = if signed {
            (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
        } else {
            (0i128, (1i128 << bits) - 1)
        };
        let (min, max) = match &spec.interval {
            IntervalSpec::DefaultInterval => declared,
            IntervalSpec::FullInterval => storage,
            IntervalSpec::Custom(a, b) => ((*a).max(storage.0), (*b).min(storage.1)),
        };

        let generator = match spec.generator {
            GeneratorKind::Determinist => Generator::determinist(min, max, bits, signed),
            GeneratorKind::Random => {
                let span = (max - min).unsigned_abs().min(u128::from(u64::MAX)) as u64;
                Generator::random(spec.seed ^ 1, 0, span)
            }
        };

        IntegerMutator {
            mode: spec.mode,
            bits,
            min,
            generator,
            generator_kind: spec.generator,
            engine: MutationEngine::new(ChaChaRng::seed_from_u64(spec.seed)),
        }
    }

    fn mask(&self) -> u64 {
        if self.bits >= 64 {
            u64::MAX
        } else {
            (1u64 << self.bits) - 1
        }
    }
}

impl std::fmt::Debug for IntegerMutator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IntegerMutator({} bits, {:?})", self.bits, self.generator)
    }
}

impl DomainMutator for IntegerMutator {
    fn mode(&self) -> MutatorMode {
        self.mode
    }

    fn generate(&mut self) -> Option<Bits> {
        let scalar = self.generator.pull()?;
        let pattern = match self.generator_kind {
            // the determinist stream already emits storage patterns
            GeneratorKind::Determinist => scalar,
            // the random stream emits an offset into the interval
            GeneratorKind::Random => {
                ((self.min.wrapping_add(i128::from(scalar))) as i64 as u64) & self.mask()
            }
        };
        Some(Bits::from_uint(pattern & self.mask(), self.bits as usize))
    }

    fn mutate(&mut self, legit: Bits) -> Bits {
        if legit.is_empty() {
            return legit;
        }
        if legit.len() <= 64 {
            let mut value = legit.to_uint();
            self.engine.mutate(&mut value);
            Bits::from_uint(value & mask_for(legit.len()), legit.len())
        } else {
            let idx = self.engine.gen_range(0, legit.len());
            flip_bit(&legit, idx)
        }
    }
}

fn mask_for(len: usize) -> u64 {
    if len >= 64 { u64::MAX } else { (1u64 << len) - 1 }
}

/// Width, signedness and declared interval of an integer-shaped variable.
fn integer_shape(var: &Variable) -> (u32, bool, (i128, i128)) {
    use protomold_core::types::DataType;
    match var.kind() {
        VariableKind::Data { data_type, .. } | VariableKind::Size { data_type, .. } => {
            if let DataType::Integer(t) = data_type {
                let (lo, hi) = t.effective_interval();
                (t.bits, t.signed, (i128::from(lo), i128::from(hi)))
            } else {
                let bits = data_type.min_bits().clamp(1, 64) as u32;
                (bits, false, (0, (1i128 << bits) - 1))
            }
        }
        VariableKind::Checksum { kind, .. } => {
            let bits = kind.width_bits() as u32;
            (bits, false, (0, (1i128 << bits) - 1))
        }
        _ => (8, false, (0, 255)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protomold_core::fuzz::mutator::IntervalSpec;
    use protomold_core::types::DataType;

    fn spec(generator: GeneratorKind, interval: IntervalSpec) -> MutatorSpec {
        MutatorSpec {
            seed: 42,
            mode: MutatorMode::Generate,
            interval,
            generator,
            mutate_children: false,
        }
    }

    #[test]
    fn determinist_full_interval_emits_storage_edges() {
        let var = Variable::data("f", DataType::uint_interval(16, (10, 20)));
        let mut mutator = IntegerMutator::from_variable(
            &var,
            &spec(GeneratorKind::Determinist, IntervalSpec::FullInterval),
        );
        let first = mutator.generate().expect("a value");
        let second = mutator.generate().expect("a value");
        assert_eq!(first.to_uint(), 0);
        assert_eq!(second.to_uint(), 0xFFFF);
    }

    #[test]
    fn generated_width_matches_the_field() {
        let var = Variable::data("f", DataType::uint(32));
        let mut mutator = IntegerMutator::from_variable(
            &var,
            &spec(GeneratorKind::Random, IntervalSpec::FullInterval),
        );
        for _ in 0..20 {
            assert_eq!(mutator.generate().expect("a value").len(), 32);
        }
    }

    #[test]
    fn mutate_keeps_the_width() {
        let var = Variable::data("f", DataType::uint(16));
        let mut mutator = IntegerMutator::from_variable(
            &var,
            &spec(GeneratorKind::Random, IntervalSpec::DefaultInterval),
        );
        let corrupted = mutator.mutate(Bits::from_uint(0x1234, 16));
        assert_eq!(corrupted.len(), 16);
    }
}

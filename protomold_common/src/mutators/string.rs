use crate::mutators::flip_bit;
use protomold_core::bits::Bits;
use protomold_core::fuzz::mutator::{
    DomainMutator, IntervalSpec, MutationEngine, MutatorMode, MutatorSpec,
};
use protomold_core::types::DataType;
use protomold_core::variable::{Variable, VariableKind};
use rand::SeedableRng;
use rand_chacha::ChaChaRng;

// length bound used when the full-interval policy escapes the declared
// character counts (one length byte worth of characters)
const FULL_INTERVAL_MAX_CHARS: usize = 255;

/// Fuzzing strategy for text fields.
///
/// Generated values draw their characters from the whole byte range, not
/// just the printable set the type accepts, so generate mode deliberately
/// produces values the format itself would reject. Mutate mode corrupts a
/// few characters of a legitimate value.
pub struct StringMutator {
    mode: MutatorMode,
    chars: (usize, usize),
    engine: MutationEngine<ChaChaRng>,
}

impl StringMutator {
    /// Builds the mutator for a text variable.
    #[must_use]
    pub fn from_variable(var: &Variable, spec: &MutatorSpec) -> Self {
        let declared = match var.kind() {
            VariableKind::Data { data_type: DataType::String(t), .. } => t.chars,
            _ => (0, FULL_INTERVAL_MAX_CHARS),
        };
        let chars = match &spec.interval {
            IntervalSpec::DefaultInterval => declared,
            IntervalSpec::FullInterval => (0, FULL_INTERVAL_MAX_CHARS),
            IntervalSpec::Custom(a, b) => {
                let a = usize::try_from(*a).unwrap_or(0);
                let b = usize::try_from(*b).unwrap_or(FULL_INTERVAL_MAX_CHARS);
                (a, b.max(a))
            }
        };
        StringMutator {
            mode: spec.mode,
            chars,
            engine: MutationEngine::new(ChaChaRng::seed_from_u64(spec.seed)),
        }
    }
}

impl std::fmt::Debug for StringMutator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StringMutator({}..={} chars)", self.chars.0, self.chars.1)
    }
}

impl DomainMutator for StringMutator {
    fn mode(&self) -> MutatorMode {
        self.mode
    }

    fn generate(&mut self) -> Option<Bits> {
        let len = self.engine.gen_range(self.chars.0, self.chars.1 + 1);
        let bytes = self.engine.random_bytes(len);
        Some(Bits::from_bytes(&bytes))
    }

    fn mutate(&mut self, legit: Bits) -> Bits {
        if legit.is_empty() {
            return legit;
        }
        if legit.len() % 8 != 0 {
            let idx = self.engine.gen_range(0, legit.len());
            return flip_bit(&legit, idx);
        }
        let mut bytes = legit.to_bytes();
        let mut touched = false;
        for byte in &mut bytes {
            if self.engine.gen_chance(0.2) {
                self.engine.mutate(byte);
                touched = true;
            }
        }
        if !touched {
            let idx = self.engine.gen_range(0, bytes.len());
            self.engine.mutate(&mut bytes[idx]);
        }
        Bits::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protomold_core::fuzz::mutator::GeneratorKind;

    fn spec(interval: IntervalSpec) -> MutatorSpec {
        MutatorSpec {
            seed: 7,
            mode: MutatorMode::Generate,
            interval,
            generator: GeneratorKind::Random,
            mutate_children: false,
        }
    }

    #[test]
    fn generated_length_respects_the_declared_interval() {
        let var = Variable::data("f", DataType::string_interval(2, 5));
        let mut mutator = StringMutator::from_variable(&var, &spec(IntervalSpec::DefaultInterval));
        for _ in 0..50 {
            let value = mutator.generate().expect("a value");
            let chars = value.len() / 8;
            assert!((2..=5).contains(&chars));
        }
    }

    #[test]
    fn full_interval_escapes_the_declared_length() {
        let var = Variable::data("f", DataType::string_interval(2, 3));
        let mut mutator = StringMutator::from_variable(&var, &spec(IntervalSpec::FullInterval));
        let escaped = (0..200).any(|_| {
            let value = mutator.generate().expect("a value");
            value.len() / 8 > 3
        });
        assert!(escaped);
    }

    #[test]
    fn mutate_always_changes_something_eventually() {
        let var = Variable::data("f", DataType::string_interval(1, 8));
        let mut mutator = StringMutator::from_variable(&var, &spec(IntervalSpec::DefaultInterval));
        let legit = Bits::from_text("hello");
        let changed = (0..20).any(|_| mutator.mutate(legit.clone()) != legit);
        assert!(changed);
    }
}

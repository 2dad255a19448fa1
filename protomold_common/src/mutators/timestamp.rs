use protomold_core::bits::Bits;
use protomold_core::fuzz::mutator::{DomainMutator, MutationEngine, MutatorMode, MutatorSpec};
use rand::SeedableRng;
use rand_chacha::ChaChaRng;

/// Fuzzing strategy for epoch timestamp fields.
pub struct TimestampMutator {
    mode: MutatorMode,
    engine: MutationEngine<ChaChaRng>,
}

impl TimestampMutator {
    /// Builds the mutator.
    #[must_use]
    pub fn new(spec: &MutatorSpec) -> Self {
        TimestampMutator {
            mode: spec.mode,
            engine: MutationEngine::new(ChaChaRng::seed_from_u64(spec.seed)),
        }
    }
}

impl std::fmt::Debug for TimestampMutator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TimestampMutator")
    }
}

impl DomainMutator for TimestampMutator {
    fn mode(&self) -> MutatorMode {
        self.mode
    }

    fn generate(&mut self) -> Option<Bits> {
        Some(Bits::from_uint(self.engine.gen_value(0, u64::from(u32::MAX)), 32))
    }

    fn mutate(&mut self, legit: Bits) -> Bits {
        if legit.len() != 32 {
            return self.generate().unwrap_or(legit);
        }
        let mut secs = legit.to_uint() as u32;
        self.engine.mutate(&mut secs);
        Bits::from_uint(u64::from(secs), 32)
    }
}

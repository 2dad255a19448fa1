use protomold_core::bits::Bits;
use protomold_core::fuzz::mutator::{DomainMutator, MutationEngine, MutatorMode, MutatorSpec};
use rand::SeedableRng;
use rand_chacha::ChaChaRng;

/// Fuzzing strategy for IPv4 address fields.
///
/// Mutation works octet by octet: each octet has its own chance of being
/// corrupted, so addresses drift through neighbouring networks instead of
/// jumping uniformly over the whole address space.
pub struct Ipv4Mutator {
    mode: MutatorMode,
    engine: MutationEngine<ChaChaRng>,
}

impl Ipv4Mutator {
    /// Builds the mutator.
    #[must_use]
    pub fn new(spec: &MutatorSpec) -> Self {
        Ipv4Mutator {
            mode: spec.mode,
            engine: MutationEngine::new(ChaChaRng::seed_from_u64(spec.seed)),
        }
    }
}

impl std::fmt::Debug for Ipv4Mutator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Ipv4Mutator")
    }
}

impl DomainMutator for Ipv4Mutator {
    fn mode(&self) -> MutatorMode {
        self.mode
    }

    fn generate(&mut self) -> Option<Bits> {
        Some(Bits::from_bytes(&self.engine.random_bytes(4)))
    }

    fn mutate(&mut self, legit: Bits) -> Bits {
        if legit.len() != 32 {
            return self.generate().unwrap_or(legit);
        }
        let mut octets = legit.to_bytes();
        for octet in &mut octets {
            if self.engine.gen_chance(0.4) {
                self.engine.mutate(octet);
            }
        }
        Bits::from_bytes(&octets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protomold_core::fuzz::mutator::{GeneratorKind, IntervalSpec};

    #[test]
    fn generated_addresses_are_32_bits() {
        let spec = MutatorSpec {
            seed: 11,
            mode: MutatorMode::Generate,
            interval: IntervalSpec::DefaultInterval,
            generator: GeneratorKind::Random,
            mutate_children: false,
        };
        let mut mutator = Ipv4Mutator::new(&spec);
        for _ in 0..10 {
            assert_eq!(mutator.generate().expect("a value").len(), 32);
        }
    }
}

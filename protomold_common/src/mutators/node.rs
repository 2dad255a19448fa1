use protomold_core::bits::Bits;
use protomold_core::fuzz::mutator::{DomainMutator, MutationEngine, MutatorMode, MutatorSpec};
use rand::SeedableRng;
use rand_chacha::ChaChaRng;

// repetition bound when the full-interval policy escapes the declared
// counts
const REPEAT_FULL_MAX: usize = 64;

/// Node mutator for aggregates. It produces no value of its own: its only
/// job is carrying the child-propagation flag.
pub struct AggMutator {
    mode: MutatorMode,
    mutate_children: bool,
}

impl AggMutator {
    /// Builds the mutator.
    #[must_use]
    pub fn new(spec: &MutatorSpec) -> Self {
        AggMutator {
            mode: spec.mode,
            mutate_children: spec.mutate_children,
        }
    }
}

impl std::fmt::Debug for AggMutator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AggMutator")
    }
}

impl DomainMutator for AggMutator {
    fn mode(&self) -> MutatorMode {
        self.mode
    }

    fn generate(&mut self) -> Option<Bits> {
        None
    }

    fn mutate(&mut self, legit: Bits) -> Bits {
        legit
    }

    fn mutate_children(&self) -> bool {
        self.mutate_children
    }
}

/// Node mutator for alternatives: picks the branch to generate, sticking
/// to a choice for a while before switching.
pub struct AltMutator {
    mode: MutatorMode,
    mutate_children: bool,
    engine: MutationEngine<ChaChaRng>,
}

impl AltMutator {
    /// Builds the mutator.
    #[must_use]
    pub fn new(spec: &MutatorSpec) -> Self {
        AltMutator {
            mode: spec.mode,
            mutate_children: spec.mutate_children,
            engine: MutationEngine::new(ChaChaRng::seed_from_u64(spec.seed)),
        }
    }
}

impl std::fmt::Debug for AltMutator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AltMutator")
    }
}

impl DomainMutator for AltMutator {
    fn mode(&self) -> MutatorMode {
        self.mode
    }

    fn generate(&mut self) -> Option<Bits> {
        None
    }

    fn mutate(&mut self, legit: Bits) -> Bits {
        legit
    }

    fn choose_branch(&mut self, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }
        Some(self.engine.gen_index("alt-branch", count))
    }

    fn mutate_children(&self) -> bool {
        self.mutate_children
    }
}

/// Node mutator for repetitions: draws the repetition count, escaping the
/// declared bounds when asked for the full interval.
pub struct RepeatMutator {
    mode: MutatorMode,
    mutate_children: bool,
    full_interval: bool,
    engine: MutationEngine<ChaChaRng>,
}

impl RepeatMutator {
    /// Builds the mutator.
    #[must_use]
    pub fn new(spec: &MutatorSpec) -> Self {
        let full_interval = matches!(
            spec.interval,
            protomold_core::fuzz::mutator::IntervalSpec::FullInterval
        );
        RepeatMutator {
            mode: spec.mode,
            mutate_children: spec.mutate_children,
            full_interval,
            engine: MutationEngine::new(ChaChaRng::seed_from_u64(spec.seed)),
        }
    }
}

impl std::fmt::Debug for RepeatMutator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RepeatMutator")
    }
}

impl DomainMutator for RepeatMutator {
    fn mode(&self) -> MutatorMode {
        self.mode
    }

    fn generate(&mut self) -> Option<Bits> {
        None
    }

    fn mutate(&mut self, legit: Bits) -> Bits {
        legit
    }

    fn choose_count(&mut self, bounds: (usize, usize)) -> Option<usize> {
        let (min, max) = if self.full_interval {
            (0, REPEAT_FULL_MAX)
        } else {
            bounds
        };
        Some(self.engine.gen_range(min, max + 1))
    }

    fn mutate_children(&self) -> bool {
        self.mutate_children
    }
}

/// Node mutator for optionals: draws the presence decision.
pub struct OptMutator {
    mode: MutatorMode,
    mutate_children: bool,
    engine: MutationEngine<ChaChaRng>,
}

impl OptMutator {
    /// Builds the mutator.
    #[must_use]
    pub fn new(spec: &MutatorSpec) -> Self {
        OptMutator {
            mode: spec.mode,
            mutate_children: spec.mutate_children,
            engine: MutationEngine::new(ChaChaRng::seed_from_u64(spec.seed)),
        }
    }
}

impl std::fmt::Debug for OptMutator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OptMutator")
    }
}

impl DomainMutator for OptMutator {
    fn mode(&self) -> MutatorMode {
        self.mode
    }

    fn generate(&mut self) -> Option<Bits> {
        None
    }

    fn mutate(&mut self, legit: Bits) -> Bits {
        legit
    }

    fn choose_presence(&mut self) -> Option<bool> {
        Some(self.engine.gen_chance(0.5))
    }

    fn mutate_children(&self) -> bool {
        self.mutate_children
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protomold_core::fuzz::mutator::{GeneratorKind, IntervalSpec};

    fn spec(interval: IntervalSpec) -> MutatorSpec {
        MutatorSpec {
            seed: 21,
            mode: MutatorMode::Generate,
            interval,
            generator: GeneratorKind::Random,
            mutate_children: true,
        }
    }

    #[test]
    fn alt_branches_stay_in_range() {
        let mut mutator = AltMutator::new(&spec(IntervalSpec::DefaultInterval));
        for _ in 0..50 {
            let branch = mutator.choose_branch(3).expect("a branch");
            assert!(branch < 3);
        }
    }

    #[test]
    fn repeat_full_interval_escapes_the_declared_bounds() {
        let mut mutator = RepeatMutator::new(&spec(IntervalSpec::FullInterval));
        let escaped = (0..100).any(|_| mutator.choose_count((0, 2)).expect("a count") > 2);
        assert!(escaped);
    }

    #[test]
    fn repeat_default_interval_respects_bounds() {
        let mut mutator = RepeatMutator::new(&spec(IntervalSpec::DefaultInterval));
        for _ in 0..50 {
            let count = mutator.choose_count((1, 4)).expect("a count");
            assert!((1..=4).contains(&count));
        }
    }
}

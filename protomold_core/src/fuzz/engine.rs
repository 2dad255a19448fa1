use crate::bits::Bits;
use crate::error::{ProtomoldError, ProtomoldResult};
use crate::memory::Memory;
use crate::preset::Preset;
use crate::specializer::Specializer;
use crate::variable::Format;

/// Drives repeated specialization of one format under one preset.
///
/// The engine is an iterator of generated messages. Each iteration runs
/// the specializer with a per-iteration seed derived from the engine seed,
/// so a whole fuzzing session replays identically for the same seed. The
/// iteration ends, without an error, as soon as a fuzz binding exhausts
/// its mutation budget or an external value provider runs dry.
pub struct FuzzEngine<'a> {
    format: &'a Format,
    memory: Memory,
    preset: Preset,
    seed: u64,
    iteration: u64,
}

impl<'a> FuzzEngine<'a> {
    /// Creates an engine over a fresh session memory.
    #[must_use]
    pub fn new(format: &'a Format, preset: Preset) -> Self {
        FuzzEngine {
            format,
            memory: Memory::new(),
            preset,
            seed: 0,
            iteration: 0,
        }
    }

    /// Supplies an existing session memory, e.g. to keep persistent fields
    /// stable across the fuzzing run.
    #[must_use]
    pub fn with_memory(mut self, memory: Memory) -> Self {
        self.memory = memory;
        self
    }

    /// Reseeds the whole session.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// The session memory accumulated so far.
    #[must_use]
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Messages generated so far.
    #[must_use]
    pub fn iterations(&self) -> u64 {
        self.iteration
    }
}

impl Iterator for FuzzEngine<'_> {
    type Item = ProtomoldResult<Bits>;

    fn next(&mut self) -> Option<Self::Item> {
        let seed = self.seed.wrapping_add(self.iteration);
        self.iteration += 1;
        let mut specializer = Specializer::new(&mut self.memory).with_seed(seed);
        match specializer.specialize(self.format, &mut self.preset) {
            Err(ProtomoldError::BudgetExhausted) => {
                tracing::info!(
                    "fuzzing sequence for '{}' ended after {} messages",
                    self.format.name(),
                    self.iteration - 1
                );
                None
            }
            other => Some(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;
    use crate::variable::Variable;

    #[test]
    fn provider_exhaustion_ends_the_sequence() {
        let field = Variable::data("f", DataType::uint(8));
        let mut preset = Preset::new();
        preset.provide(
            &field,
            vec![Bits::from_uint(1, 8), Bits::from_uint(2, 8)].into_iter(),
        );
        let format = Format::new("s0", vec![field]);
        let engine = FuzzEngine::new(&format, preset);
        let messages: Vec<_> = engine.collect::<Result<_, _>>().expect("no failure");
        assert_eq!(
            messages,
            vec![Bits::from_uint(1, 8), Bits::from_uint(2, 8)]
        );
    }
}

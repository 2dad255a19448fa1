use rand::{Rng, SeedableRng};
use rand_chacha::ChaChaRng;
use std::collections::HashSet;
use std::fmt;

/// A reusable, seedable scalar stream.
///
/// All three implementations share one contract: `pull` hands out the next
/// scalar as a raw bit pattern, or `None` when the stream ran dry. The
/// consuming mutators are generator-agnostic.
pub enum Generator {
    /// Deterministic boundary-value sequence.
    Determinist(DeterministGenerator),
    /// Seeded pseudo-random stream, same seed same sequence.
    Random(RandomGenerator),
    /// User-supplied iterator.
    External(ExternalGenerator),
}

impl Generator {
    /// A deterministic boundary sequence for a value interval stored on
    /// `bits` bits. See [`DeterministGenerator::new`] for the emitted
    /// order.
    #[must_use]
    pub fn determinist(min: i128, max: i128, bits: u32, signed: bool) -> Self {
        Generator::Determinist(DeterministGenerator::new(min, max, bits, signed))
    }

    /// A seeded pseudo-random stream of values in `[min, max]`.
    #[must_use]
    pub fn random(seed: u64, min: u64, max: u64) -> Self {
        Generator::Random(RandomGenerator::new(seed, min, max))
    }

    /// Wraps a user-supplied iterator.
    pub fn external(iter: impl Iterator<Item = u64> + Send + 'static) -> Self {
        Generator::External(ExternalGenerator {
            iter: Box::new(iter),
        })
    }

    /// The next scalar of the stream.
    pub fn pull(&mut self) -> Option<u64> {
        match self {
            Generator::Determinist(g) => g.pull(),
            Generator::Random(g) => Some(g.pull()),
            Generator::External(g) => g.iter.next(),
        }
    }
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generator::Determinist(g) => write!(f, "Determinist({} values)", g.values.len()),
            Generator::Random(g) => write!(f, "Random[{}, {}]", g.min, g.max),
            Generator::External(_) => f.write_str("External(..)"),
        }
    }
}

/// Emits the edge values of an integer domain in a fixed, documented
/// order, then cycles.
pub struct DeterministGenerator {
    values: Vec<u64>,
    pos: usize,
}

impl DeterministGenerator {
    /// Builds the boundary sequence for the interval `[min, max]` of a
    /// value stored on `bits` bits.
    ///
    /// The emitted order is: `min`, `max`, `min-1`, `max+1`, `min+1`,
    /// `max-1`, `0`, `-1`, `1`, then for each bit position `j` of the
    /// storage: `-2^j`, `-2^j - 1`, `-2^j + 1`, `2^j`, `2^j - 1`,
    /// `2^j + 1`. Values outside the storage range are dropped and
    /// duplicates keep their first position. The sequence wraps around
    /// once exhausted.
    #[must_use]
    pub fn new(min: i128, max: i128, bits: u32, signed: bool) -> Self {
        let storage = if signed {
            (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
        } else {
            (0, (1i128 << bits) - 1)
        };

        let mut raw = vec![
            min,
            max,
            min - 1,
            max + 1,
            min + 1,
            max - 1,
            0,
            -1,
            1,
        ];
        for j in 0..bits {
            let p = 1i128 << j;
            raw.extend([-p, -p - 1, -p + 1, p, p - 1, p + 1]);
        }

        let mask = if bits >= 64 {
            u64::MAX
        } else {
            (1u64 << bits) - 1
        };
        let mut seen = HashSet::new();
        let values = raw
            .into_iter()
            .filter(|v| *v >= storage.0 && *v <= storage.1)
            .filter(|v| seen.insert(*v))
            .map(|v| (v as i64 as u64) & mask)
            .collect();

        DeterministGenerator { values, pos: 0 }
    }

    fn pull(&mut self) -> Option<u64> {
        if self.values.is_empty() {
            return None;
        }
        let value = self.values[self.pos % self.values.len()];
        self.pos += 1;
        Some(value)
    }

    /// Number of distinct boundary values of this sequence.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true when the domain produced no boundary value at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Seeded pseudo-random scalar stream: the same seed always replays the
/// same sequence.
pub struct RandomGenerator {
    rng: ChaChaRng,
    min: u64,
    max: u64,
}

impl RandomGenerator {
    /// A stream of values in `[min, max]`.
    #[must_use]
    pub fn new(seed: u64, min: u64, max: u64) -> Self {
        RandomGenerator {
            rng: ChaChaRng::seed_from_u64(seed),
            min,
            max: max.max(min),
        }
    }

    fn pull(&mut self) -> u64 {
        self.rng.random_range(self.min..=self.max)
    }
}

/// Wrapper giving a user iterator the generator contract.
pub struct ExternalGenerator {
    iter: Box<dyn Iterator<Item = u64> + Send>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn determinist_starts_with_the_interval_edges() {
        let mut g = Generator::determinist(10, 20, 8, false);
        assert_eq!(g.pull(), Some(10));
        assert_eq!(g.pull(), Some(20));
        assert_eq!(g.pull(), Some(9));
        assert_eq!(g.pull(), Some(21));
        assert_eq!(g.pull(), Some(11));
        assert_eq!(g.pull(), Some(19));
        assert_eq!(g.pull(), Some(0));
        // -1 is outside the unsigned storage range and must be dropped
        assert_eq!(g.pull(), Some(1));
    }

    #[test]
    fn determinist_cycles() {
        let mut g = DeterministGenerator::new(0, 1, 1, false);
        let len = g.len();
        let first: Vec<_> = (0..len).map(|_| g.pull()).collect();
        let second: Vec<_> = (0..len).map(|_| g.pull()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn determinist_signed_includes_negative_powers() {
        let g = DeterministGenerator::new(-10, 5, 8, true);
        assert!(!g.is_empty());
        let mut g = Generator::Determinist(g);
        assert_eq!(g.pull(), Some((-10i64 as u64) & 0xFF));
        assert_eq!(g.pull(), Some(5));
    }

    #[test]
    fn random_is_reproducible() {
        let mut a = Generator::random(14, 0, 255);
        let mut b = Generator::random(14, 0, 255);
        let left: Vec<_> = (0..16).map(|_| a.pull()).collect();
        let right: Vec<_> = (0..16).map(|_| b.pull()).collect();
        assert_eq!(left, right);
    }

    #[test]
    fn external_ends_when_the_iterator_does() {
        let mut g = Generator::external(vec![7u64, 8].into_iter());
        assert_eq!(g.pull(), Some(7));
        assert_eq!(g.pull(), Some(8));
        assert_eq!(g.pull(), None);
    }
}

/// Contains the fuzz iteration engine which repeatedly specializes a
/// format until the mutation budget ends the sequence.
pub mod engine;

/// Reproducible scalar value streams consumed by mutators.
pub mod generator;

/// The mutation contracts: per-variable mutator trait, the numeric
/// mutation engine and the type-to-mutator registry.
pub mod mutator;

mod dangerous;

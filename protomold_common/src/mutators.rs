use protomold_core::bits::Bits;
use protomold_core::fuzz::mutator::{MutatorKey, MutatorRegistry};
use std::sync::Arc;

/// Integer and size/checksum field mutators.
pub mod integer;

/// IPv4 address mutator.
pub mod ipv4;

/// Node mutators: aggregate, alternative, repeat, optional.
pub mod node;

/// Raw byte, bit array and hexadecimal string mutators.
pub mod raw;

/// Text field mutator.
pub mod string;

/// Timestamp mutator.
pub mod timestamp;

/// The default type-to-mutator mapping: every field and node kind wired to
/// the implementation of this module.
///
/// The registry is plain data; pass it to
/// [`Preset::with_registry`](protomold_core::preset::Preset::with_registry)
/// and override individual entries per binding when needed.
#[must_use]
pub fn default_registry() -> MutatorRegistry {
    let mut registry = MutatorRegistry::empty();
    registry.register(
        MutatorKey::Integer,
        Arc::new(|var, spec| Box::new(integer::IntegerMutator::from_variable(var, spec))),
    );
    registry.register(
        MutatorKey::String,
        Arc::new(|var, spec| Box::new(string::StringMutator::from_variable(var, spec))),
    );
    registry.register(
        MutatorKey::Raw,
        Arc::new(|var, spec| Box::new(raw::RawMutator::from_variable(var, spec))),
    );
    registry.register(
        MutatorKey::BitArray,
        Arc::new(|var, spec| Box::new(raw::BitArrayMutator::from_variable(var, spec))),
    );
    registry.register(
        MutatorKey::HexaString,
        Arc::new(|var, spec| Box::new(raw::HexaStringMutator::from_variable(var, spec))),
    );
    registry.register(
        MutatorKey::Ipv4,
        Arc::new(|_, spec| Box::new(ipv4::Ipv4Mutator::new(spec))),
    );
    registry.register(
        MutatorKey::Timestamp,
        Arc::new(|_, spec| Box::new(timestamp::TimestampMutator::new(spec))),
    );
    registry.register(
        MutatorKey::Agg,
        Arc::new(|_, spec| Box::new(node::AggMutator::new(spec))),
    );
    registry.register(
        MutatorKey::Alt,
        Arc::new(|_, spec| Box::new(node::AltMutator::new(spec))),
    );
    registry.register(
        MutatorKey::Repeat,
        Arc::new(|_, spec| Box::new(node::RepeatMutator::new(spec))),
    );
    registry.register(
        MutatorKey::Opt,
        Arc::new(|_, spec| Box::new(node::OptMutator::new(spec))),
    );
    registry
}

/// Returns `value` with the bit at `idx` flipped.
pub(crate) fn flip_bit(value: &Bits, idx: usize) -> Bits {
    let mut out = Bits::new();
    for i in 0..value.len() {
        let bit = value.bit(i);
        out.push(if i == idx { !bit } else { bit });
    }
    out
}

//! Collection of ready-to-use building blocks for `protomold_core`.
//!
//! `protomold_common` keeps the pieces most callers want without writing
//! them from scratch:
//!
//! - `mutators`
//!     - one `DomainMutator` implementation per field kind (integers,
//!       strings, raw bytes, bit arrays, hexadecimal strings, IPv4
//!       addresses, timestamps) and per node kind (aggregate,
//!       alternative, repeat, optional), plus [`mutators::default_registry`]
//!       wiring them all up.
//! - `rules`
//!     - serde-loadable preset rules mapping field names to fixed values.
//! - `formats`
//!     - prebuilt demo formats used by the demos and the tests.
//!
#![deny(missing_docs)]
#![deny(unsafe_code, clippy::unwrap_used)]
#![warn(clippy::pedantic)]

/// A collection of `DomainMutator` implementations for every field and
/// node kind.
pub mod mutators;

/// Serde-loadable preset rules.
pub mod rules;

/// Prebuilt demo formats.
pub mod formats;

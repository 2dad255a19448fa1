//!
//! `protomold` infers nothing and assumes nothing: given a declarative tree
//! of typed fields (a [`Format`](variable::Format)), it splits raw bit
//! sequences produced by a peer into field values consistent with the
//! format (parsing, or *abstraction*), and produces concrete bit sequences
//! that satisfy the format (generation, or *specialization*), optionally
//! steered by fixed presets or by adversarial mutation for fuzzing.
//!
//! The format tree mixes plain data fields with cross-field relations
//! (value copies, sizes, checksums) and structural nodes (aggregates,
//! alternatives, repetitions, optionals). Both engines walk the tree
//! top-down and left-to-right: the parser as a lazy backtracking search
//! over candidate splits, the specializer as a single seeded generative
//! pass with deferred patching of forward references. A per-session
//! [`Memory`](memory::Memory) carries values across messages according to
//! each variable's retention [`Scope`](variable::Scope).
//!
//! The fuzzing layer plugs into specialization only: a
//! [`Preset`](preset::Preset) binds variables to fixed values, external
//! value providers or [`DomainMutator`](fuzz::mutator::DomainMutator)
//! strategies, and the [`FuzzEngine`](fuzz::engine::FuzzEngine) iterates
//! generated messages until the mutation budget ends the sequence. Ready
//! to use mutators for every field kind live in the `protomold_common`
//! crate.
//!
//! The following shows the two entry points back to back:
//!
//! ```rs
//! let format = Format::new("greeting", vec![
//!     Variable::data("name", DataType::string_interval(4, 5)),
//!     Variable::constant_text("sep", " "),
//!     Variable::data("word", DataType::string_interval(1, 8)),
//! ]);
//!
//! let mut memory = Memory::new();
//! let mut preset = Preset::new();
//! let wire = specializer::specialize(&format, &mut memory, &mut preset)?;
//! let fields = parser::parse(&wire, &format, &mut memory)?;
//! ```
//!

#![deny(missing_docs)]
#![deny(unsafe_code, clippy::unwrap_used)]
#![warn(clippy::pedantic)]

/// Bit-addressed value buffers shared by every engine.
pub mod bits;

/// Contains all the different errors `protomold_core` can return.
pub mod error;

/// The fuzzing framework: scalar generators, the mutation contracts and
/// the fuzz iteration engine.
pub mod fuzz;

/// Manage the logger. This can be used to initialize the
/// `tracing_subscriber` when `protomold_core` runs headless.
pub mod log;

/// The per-session store of observed and generated field values.
pub mod memory;

/// The abstraction engine: raw bits in, field values out.
pub mod parser;

/// Preset and fuzz bindings consulted during specialization.
pub mod preset;

/// The generation engine: format in, raw bits out.
pub mod specializer;

/// The closed set of primitive field encodings.
pub mod types;

/// The format domain tree: variables, scopes, relations and formats.
pub mod variable;

pub(crate) mod path;

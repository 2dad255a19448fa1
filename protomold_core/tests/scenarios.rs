//! End-to-end scenarios driving both engines against the same formats.

use protomold_core::bits::Bits;
use protomold_core::error::ProtomoldError;
use protomold_core::fuzz::engine::FuzzEngine;
use protomold_core::fuzz::mutator::{DomainMutator, MutatorKey, MutatorMode, MutatorRegistry};
use protomold_core::memory::Memory;
use protomold_core::parser::parse;
use protomold_core::preset::{CounterMax, FuzzConfig, Preset};
use protomold_core::specializer::{Specializer, specialize};
use protomold_core::types::DataType;
use protomold_core::variable::{Format, Scope, Variable};
use std::sync::Arc;

fn greeting_format() -> Format {
    let name = Variable::data("f0", DataType::string_interval(4, 5));
    let sep = Variable::constant_text("f1", " ");
    let who = Variable::alt(
        "f2",
        vec![
            Variable::constant_text("world", "world"),
            Variable::constant_text("john", "john"),
        ],
    );
    let tail = Variable::agg(
        "f3",
        vec![
            Variable::constant_text("space", " "),
            Variable::constant_text("bang", "!"),
        ],
    );
    Format::new("greeting", vec![name, sep, who, tail])
}

#[test]
fn greeting_parses_both_alternatives() {
    let format = greeting_format();
    let mut memory = Memory::new();

    let values = parse(&Bits::from_text("hello world !"), &format, &mut memory)
        .expect("'hello world !' must parse");
    let texts: Vec<_> = values
        .iter()
        .map(|v| v.value.to_text().expect("text fields"))
        .collect();
    assert_eq!(texts, ["hello", " ", "world", " !"]);

    let values = parse(&Bits::from_text("hello john !"), &format, &mut memory)
        .expect("'hello john !' must parse");
    let texts: Vec<_> = values
        .iter()
        .map(|v| v.value.to_text().expect("text fields"))
        .collect();
    assert_eq!(texts, ["hello", " ", "john", " !"]);
}

#[test]
fn longest_split_wins_when_both_are_viable() {
    let format = Format::new(
        "s0",
        vec![
            Variable::data("head", DataType::string_interval(4, 5)),
            Variable::data("tail", DataType::string_interval(1, 5)),
        ],
    );
    let mut memory = Memory::new();
    let values = parse(&Bits::from_text("abcdef"), &format, &mut memory).expect("parses");
    assert_eq!(values[0].value.to_text().as_deref(), Some("abcde"));
    assert_eq!(values[1].value.to_text().as_deref(), Some("f"));
}

#[test]
fn shorter_split_is_taken_only_as_a_fallback() {
    let format = Format::new(
        "s0",
        vec![
            Variable::data("head", DataType::string_interval(4, 5)),
            Variable::constant_text("bang", "!"),
        ],
    );
    let mut memory = Memory::new();
    // "abcd!" is valid at 5 chars for head, but that starves bang
    let values = parse(&Bits::from_text("abcd!"), &format, &mut memory).expect("parses");
    assert_eq!(values[0].value.to_text().as_deref(), Some("abcd"));
    assert_eq!(values[1].value.to_text().as_deref(), Some("!"));
}

#[test]
fn size_relation_round_trips() {
    let f1 = Variable::data("f1", DataType::string(6));
    let f2 = Variable::constant_text("f2", ";");
    let f3 = Variable::size_of("f3", &[&f1], DataType::uint(8));
    let f4 = Variable::constant_text("f4", "hello");
    let f1_id = f1.id();
    let format = Format::new("sized", vec![f1, f2, f3, f4]);

    let mut memory = Memory::new();
    let mut preset = Preset::new();
    let wire = specialize(&format, &mut memory, &mut preset).expect("specializes");

    let values = parse(&wire, &format, &mut memory).expect("parses its own output");
    let f1_bits = memory.value(f1_id).expect("f1 was memorized").len();
    assert_eq!(values[2].value.to_uint(), f1_bits as u64);
    assert_eq!(values[2].value.to_uint(), 48);
}

#[test]
fn constant_mismatch_fails_cleanly_and_keeps_memory_intact() {
    let format = Format::new("s0", vec![Variable::constant_text("magic", "netzob")]);
    let mut memory = Memory::new();

    let err = parse(&Bits::from_text("netzab"), &format, &mut memory)
        .expect_err("'netzab' must not parse");
    assert!(matches!(err, ProtomoldError::NoValidParse { .. }));
    assert!(memory.is_empty(), "a failed parse must not corrupt memory");

    parse(&Bits::from_text("netzob"), &format, &mut memory).expect("'netzob' parses");
}

#[test]
fn specialize_then_parse_round_trips_with_shared_memory() {
    let name = Variable::data("name", DataType::string_interval(3, 8));
    let sep = Variable::constant_text("sep", "/");
    let token = Variable::data("token", DataType::raw_interval(2, 4)).with_scope(Scope::Persistent);
    let name_id = name.id();
    let token_id = token.id();
    let format = Format::new("session", vec![name, sep, token]);

    let mut memory = Memory::new();
    let mut preset = Preset::new();
    let wire = specialize(&format, &mut memory, &mut preset).expect("specializes");

    let memorized_name = memory.value(name_id).expect("name memorized").clone();
    let memorized_token = memory.value(token_id).expect("token memorized").clone();

    let values = parse(&wire, &format, &mut memory).expect("round trips");
    assert_eq!(values[0].value, memorized_name);
    assert_eq!(values[2].value, memorized_token);

    // with everything memorized, a second message is identical
    let again = specialize(&format, &mut memory, &mut preset).expect("specializes");
    assert_eq!(wire, again);
}

#[test]
fn seeded_specialization_is_deterministic() {
    let format = Format::new(
        "s0",
        vec![
            Variable::data("a", DataType::string_interval(1, 16)).with_scope(Scope::Volatile),
            Variable::data("b", DataType::uint(32)).with_scope(Scope::Volatile),
        ],
    );
    let mut m1 = Memory::new();
    let mut m2 = Memory::new();
    let mut p1 = Preset::new();
    let mut p2 = Preset::new();
    let first = Specializer::new(&mut m1)
        .with_seed(1234)
        .specialize(&format, &mut p1)
        .expect("specializes");
    let second = Specializer::new(&mut m2)
        .with_seed(1234)
        .specialize(&format, &mut p2)
        .expect("specializes");
    assert_eq!(first, second);
}

/// A minimal deterministic mutator for the budget scenarios.
#[derive(Debug)]
struct SequenceMutator {
    bits: usize,
    next: u64,
}

impl DomainMutator for SequenceMutator {
    fn mode(&self) -> MutatorMode {
        MutatorMode::Generate
    }

    fn generate(&mut self) -> Option<Bits> {
        self.next = self.next.wrapping_add(1);
        Some(Bits::from_uint(self.next & 0xFF, self.bits))
    }

    fn mutate(&mut self, legit: Bits) -> Bits {
        legit
    }
}

#[test]
fn mutation_budget_bounds_the_sequence_length() {
    let field = Variable::data("f", DataType::uint(8));
    assert!(field.count() > 80);
    let format = Format::new("s0", vec![field]);

    let mut registry = MutatorRegistry::empty();
    registry.register(
        MutatorKey::Integer,
        Arc::new(|_, _| Box::new(SequenceMutator { bits: 8, next: 0 })),
    );
    let mut preset = Preset::with_registry(registry);
    preset
        .fuzz_format(
            &format,
            &FuzzConfig {
                counter_max: CounterMax::Absolute(80),
                ..FuzzConfig::default()
            },
        )
        .expect("binds");

    let engine = FuzzEngine::new(&format, preset);
    let messages: Vec<_> = engine.collect::<Result<_, _>>().expect("no failure");
    assert_eq!(messages.len(), 80);
}

#[test]
fn fixed_preset_overrides_generation() {
    let field = Variable::data("f", DataType::string_interval(1, 8));
    let fixed = Bits::from_text("pinned");
    let mut preset = Preset::new();
    preset.fix(&field, fixed.clone());
    let format = Format::new("s0", vec![field]);

    let mut memory = Memory::new();
    let wire = specialize(&format, &mut memory, &mut preset).expect("specializes");
    assert_eq!(wire, fixed);
    // a fixed value bypasses memorization entirely
    assert!(memory.is_empty());
}

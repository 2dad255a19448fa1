use crate::bits::Bits;
use crate::error::{ProtomoldError, ProtomoldResult};
use crate::memory::Memory;
use crate::path::PathState;
use crate::variable::{Format, Scope, Variable, VariableId, VariableKind};
use serde::Serialize;

/// The resolved value of one top-level field, as produced by a successful
/// parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldValue {
    /// Identity of the field variable.
    pub id: VariableId,
    /// Display name of the field.
    pub name: String,
    /// The bit range assigned to the field.
    pub value: Bits,
}

type PathIter<'a> = Box<dyn Iterator<Item = PathState> + 'a>;

/// The abstraction engine: splits a raw bit sequence into field values
/// consistent with a format and the session memory.
///
/// The search is a depth-first backtracking walk. For every leaf the
/// candidate split lengths are tried longest first, so shorter matches are
/// only explored when a longer one makes a later field unparsable. The
/// resulting path sequence is lazy and one-shot: it can be traversed
/// forward once and is not restartable.
pub struct Parser<'a> {
    format: &'a Format,
    memory: &'a Memory,
    carnivorous: bool,
}

impl<'a> Parser<'a> {
    /// Creates a parser over `format` consulting `memory` for memorized
    /// values. The parser starts in carnivorous mode: a candidate path must
    /// consume the whole input to succeed.
    #[must_use]
    pub fn new(format: &'a Format, memory: &'a Memory) -> Self {
        Parser {
            format,
            memory,
            carnivorous: true,
        }
    }

    /// Allows candidate paths that leave unconsumed input behind.
    #[must_use]
    pub fn accept_remainder(mut self) -> Self {
        self.carnivorous = false;
        self
    }

    /// Lazy sequence of successful field assignments, best candidate first.
    ///
    /// Learned values are *not* committed to the session memory here; use
    /// [`parse`] for the common parse-first-path-and-commit operation.
    pub fn paths<'s>(&'s self, input: &'s Bits) -> impl Iterator<Item = Vec<FieldValue>> + 's {
        let carnivorous = self.carnivorous;
        self.walk_fields(input)
            .filter(move |st| {
                (!carnivorous || st.consumed == input.len()) && !st.has_pending()
            })
            .map(|st| self.field_values(&st))
    }

    fn field_values(&self, st: &PathState) -> Vec<FieldValue> {
        collect_field_values(self.format, st)
    }

    /// Walks all top-level fields in order, yielding every completed path
    /// before the carnivorous/pending filters.
    fn walk_fields<'s>(&'s self, input: &'s Bits) -> PathIter<'s> {
        let mut iter: PathIter<'s> = Box::new(std::iter::once(PathState::new()));
        for field in self.format.fields() {
            iter = Box::new(iter.flat_map(move |st| self.var(input, field, st)));
        }
        iter
    }

    fn var<'s>(&'s self, input: &'s Bits, var: &'s Variable, st: PathState) -> PathIter<'s> {
        match var.kind() {
            VariableKind::Data { .. } => Box::new(self.leaf_data(input, var, st).into_iter()),
            VariableKind::Value { .. }
            | VariableKind::Size { .. }
            | VariableKind::Checksum { .. } => {
                Box::new(self.leaf_relation(input, var, st).into_iter())
            }
            VariableKind::Agg { children } => {
                let start = st.consumed;
                let mut iter: PathIter<'s> = Box::new(std::iter::once(st));
                for child in children {
                    iter = Box::new(iter.flat_map(move |s| self.var(input, child, s)));
                }
                Box::new(iter.filter_map(move |mut s| {
                    self.finish_node(input, var, &mut s, start).then_some(s)
                }))
            }
            VariableKind::Alt { children } => {
                let start = st.consumed;
                Box::new(
                    children
                        .iter()
                        .flat_map(move |child| self.var(input, child, st.clone()))
                        .filter_map(move |mut s| {
                            self.finish_node(input, var, &mut s, start).then_some(s)
                        }),
                )
            }
            VariableKind::Repeat { child, min, max } => {
                let start = st.consumed;
                let child: &'s Variable = child;
                let (min, max) = (*min, *max);
                // counts are tried largest first, consistent with the
                // longest-first split ordering of the leaves
                Box::new(
                    (min..=max)
                        .rev()
                        .flat_map(move |n| {
                            let mut iter: PathIter<'s> = Box::new(std::iter::once(st.clone()));
                            for _ in 0..n {
                                iter = Box::new(iter.flat_map(move |s| self.var(input, child, s)));
                            }
                            iter
                        })
                        .filter_map(move |mut s| {
                            self.finish_node(input, var, &mut s, start).then_some(s)
                        }),
                )
            }
            VariableKind::Opt { child } => {
                // present is preferred, absent is the fallback
                let start = st.consumed;
                let absent = st.clone();
                Box::new(
                    self.var(input, child, st)
                        .chain(std::iter::once(absent))
                        .filter_map(move |mut s| {
                            self.finish_node(input, var, &mut s, start).then_some(s)
                        }),
                )
            }
        }
    }

    /// Records the value of a node variable (the bit span covered by its
    /// children) and re-checks the relation work-list.
    fn finish_node(&self, input: &Bits, var: &Variable, st: &mut PathState, start: usize) -> bool {
        let value = input.slice(start, st.consumed);
        st.add_result(var.id(), value);
        self.settle(st)
    }

    fn leaf_data(&self, input: &Bits, var: &Variable, st: PathState) -> Vec<PathState> {
        let VariableKind::Data { data_type, value } = var.kind() else {
            return Vec::new();
        };
        let remaining = input.len() - st.consumed;

        // a constant or already-memorized field pins the candidate down to
        // one exact value
        let expected = match var.scope() {
            Scope::Constant => match value {
                Some(v) => Some(v.clone()),
                None => {
                    tracing::warn!("constant field '{}' has no defined value", var.name());
                    return Vec::new();
                }
            },
            Scope::Persistent => st.lookup(self.memory, var.id()).or_else(|| value.clone()),
            Scope::Ephemeral | Scope::Volatile => None,
        };

        if let Some(expected) = expected {
            if expected.len() > remaining || !input.matches_at(st.consumed, &expected) {
                tracing::trace!("field '{}' does not match its pinned value", var.name());
                return Vec::new();
            }
            let mut s = st;
            s.consumed += expected.len();
            s.add_result(var.id(), expected.clone());
            if var.scope() == Scope::Persistent && !self.memory.has_value(var.id()) {
                s.memorize(var.id(), expected);
            }
            return if self.settle(&mut s) { vec![s] } else { Vec::new() };
        }

        // learning leaf: any type-conforming candidate is accepted,
        // longest first
        let mut out = Vec::new();
        for len in candidate_lengths(
            data_type.min_bits(),
            data_type.max_bits(),
            data_type.step_bits(),
            remaining,
        ) {
            let chunk = input.slice(st.consumed, st.consumed + len);
            if !data_type.can_parse(&chunk) {
                continue;
            }
            tracing::trace!("field '{}' accepts a {len} bit candidate", var.name());
            let mut s = st.clone();
            s.consumed += len;
            s.add_result(var.id(), chunk.clone());
            if var.scope() != Scope::Volatile {
                s.memorize(var.id(), chunk);
            }
            if self.settle(&mut s) {
                out.push(s);
            }
        }
        out
    }

    fn leaf_relation(&self, input: &Bits, var: &Variable, st: PathState) -> Vec<PathState> {
        let expected = {
            let lookup = |id| st.resolved(self.memory, id);
            var.relation_expected(&lookup)
        };
        let remaining = input.len() - st.consumed;
        match expected {
            Some(Ok(expected)) => {
                if expected.len() > remaining || !input.matches_at(st.consumed, &expected) {
                    tracing::trace!("relation '{}' contradicts the input", var.name());
                    return Vec::new();
                }
                let mut s = st;
                s.consumed += expected.len();
                s.add_result(var.id(), expected);
                if self.settle(&mut s) { vec![s] } else { Vec::new() }
            }
            Some(Err(err)) => {
                tracing::debug!("relation '{}' cannot be computed: {err}", var.name());
                Vec::new()
            }
            None => {
                // dependencies show up later in the walk: consume a
                // tentative chunk now and re-check once they resolve
                let (min, max, step) = var.split_bounds(self.format.fields());
                let mut out = Vec::new();
                for len in candidate_lengths(min, max, step, remaining) {
                    let chunk = input.slice(st.consumed, st.consumed + len);
                    if !self.relation_chunk_ok(var, &chunk) {
                        continue;
                    }
                    let mut s = st.clone();
                    s.consumed += len;
                    s.add_result(var.id(), chunk);
                    s.register_pending(var.id(), var.relation_targets());
                    out.push(s);
                }
                out
            }
        }
    }

    /// Type-level sanity check of a tentative relation chunk. The real
    /// verification happens when the dependencies resolve.
    fn relation_chunk_ok(&self, var: &Variable, chunk: &Bits) -> bool {
        match var.kind() {
            VariableKind::Size { data_type, .. } => data_type.can_parse(chunk),
            VariableKind::Checksum { kind, .. } => chunk.len() == kind.width_bits(),
            VariableKind::Value { target, .. } => {
                match self.format.find(*target).map(Variable::kind) {
                    Some(VariableKind::Data { data_type, .. }) => data_type.can_parse(chunk),
                    _ => true,
                }
            }
            _ => false,
        }
    }

    /// Re-evaluates the relation work-list after a new result. Returns
    /// false when a recorded chunk contradicts a now-computable relation,
    /// which prunes the path.
    fn settle(&self, st: &mut PathState) -> bool {
        loop {
            let mut progressed = false;
            let mut idx = 0;
            while idx < st.pending.len() {
                let waiting = st.pending[idx].waiting;
                let Some(var) = self.format.find(waiting) else {
                    return false;
                };
                let expected = {
                    let lookup = |id| st.resolved(self.memory, id);
                    var.relation_expected(&lookup)
                };
                match expected {
                    None => idx += 1,
                    Some(Err(err)) => {
                        tracing::debug!("relation '{}' cannot be computed: {err}", var.name());
                        return false;
                    }
                    Some(Ok(expected)) => {
                        let recorded = st.results.get(&waiting).cloned();
                        st.pending.remove(idx);
                        if recorded.as_ref() == Some(&expected) {
                            tracing::trace!("deferred relation '{}' verified", var.name());
                            progressed = true;
                        } else {
                            tracing::trace!("deferred relation '{}' contradicted", var.name());
                            return false;
                        }
                    }
                }
            }
            if !progressed {
                return true;
            }
        }
    }
}

fn collect_field_values(format: &Format, st: &PathState) -> Vec<FieldValue> {
    format
        .fields()
        .iter()
        .map(|field| FieldValue {
            id: field.id(),
            name: field.name().to_owned(),
            value: st.results.get(&field.id()).cloned().unwrap_or_default(),
        })
        .collect()
}

/// Candidate split lengths within `[min, max]` aligned on `step`, longest
/// first, clamped by the remaining input.
fn candidate_lengths(
    min: usize,
    max: usize,
    step: usize,
    remaining: usize,
) -> impl Iterator<Item = usize> {
    let max = max.min(remaining);
    let span = max.checked_sub(min).map(|d| d / step);
    span.into_iter()
        .flat_map(move |k| (0..=k).rev().map(move |i| min + i * step))
}

/// Parses `input` against `format`, commits the values learned by the
/// first successful path into `memory` and returns the field values.
///
/// This is the carnivorous entry point: the winning path must consume the
/// input exactly. A failed parse leaves `memory` untouched.
///
/// # Errors
/// [`ProtomoldError::NoValidParse`] when the search exhausts every
/// candidate path, [`ProtomoldError::RelationUnresolved`] when paths
/// completed but a relation never saw its dependencies.
pub fn parse(
    input: &Bits,
    format: &Format,
    memory: &mut Memory,
) -> ProtomoldResult<Vec<FieldValue>> {
    let (winner, unresolved) = {
        let parser = Parser::new(format, memory);
        let mut unresolved: Option<String> = None;
        let mut winner = None;
        for st in parser.walk_fields(input) {
            if st.consumed != input.len() {
                continue;
            }
            if st.has_pending() {
                if unresolved.is_none() {
                    unresolved = st
                        .pending
                        .first()
                        .and_then(|p| format.find(p.waiting))
                        .map(|v| v.name().to_owned());
                }
                continue;
            }
            winner = Some(st);
            break;
        }
        (winner, unresolved)
    };

    match winner {
        Some(st) => {
            memory.commit(&st.delta);
            Ok(collect_field_values(format, &st))
        }
        None => {
            if let Some(path) = unresolved {
                Err(ProtomoldError::RelationUnresolved { path })
            } else {
                Err(ProtomoldError::NoValidParse {
                    data: input.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;
    use crate::variable::ChecksumKind;

    fn text(s: &str) -> Bits {
        Bits::from_text(s)
    }

    #[test]
    fn agg_of_constants() {
        let format = Format::new(
            "s0",
            vec![Variable::agg(
                "pair",
                vec![
                    Variable::constant_text("a", "ab"),
                    Variable::constant_text("b", "cd"),
                ],
            )],
        );
        let mut memory = Memory::new();
        let values = parse(&text("abcd"), &format, &mut memory).expect("parses");
        assert_eq!(values[0].value, text("abcd"));
    }

    #[test]
    fn alt_tries_declaration_order() {
        let format = Format::new(
            "s0",
            vec![Variable::alt(
                "choice",
                vec![
                    Variable::constant_text("a", "left"),
                    Variable::constant_text("b", "right"),
                ],
            )],
        );
        let mut memory = Memory::new();
        assert!(parse(&text("left"), &format, &mut memory).is_ok());
        assert!(parse(&text("right"), &format, &mut memory).is_ok());
        assert!(parse(&text("up"), &format, &mut memory).is_err());
    }

    #[test]
    fn repeat_consumes_each_occurrence() {
        let format = Format::new(
            "s0",
            vec![
                Variable::repeat("reps", Variable::constant_text("x", "na"), 1, 4),
                Variable::constant_text("end", "!"),
            ],
        );
        let mut memory = Memory::new();
        let values = parse(&text("nanana!"), &format, &mut memory).expect("parses");
        assert_eq!(values[0].value, text("nanana"));
        assert_eq!(values[1].value, text("!"));
    }

    #[test]
    fn opt_prefers_present_and_falls_back() {
        let format = Format::new(
            "s0",
            vec![
                Variable::opt("maybe", Variable::constant_text("tag", "v1:")),
                Variable::data("rest", DataType::string_interval(1, 10)),
            ],
        );
        let mut memory = Memory::new();
        let values = parse(&text("v1:abc"), &format, &mut memory).expect("parses");
        assert_eq!(values[0].value, text("v1:"));
        assert_eq!(values[1].value, text("abc"));

        let values = parse(&text("abc"), &format, &mut memory).expect("parses");
        assert!(values[0].value.is_empty());
    }

    #[test]
    fn ephemeral_leaf_learns_into_memory() {
        let field = Variable::data("name", DataType::string_interval(1, 10));
        let id = field.id();
        let format = Format::new("s0", vec![field]);
        let mut memory = Memory::new();
        parse(&text("georges"), &format, &mut memory).expect("parses");
        assert_eq!(memory.value(id), Some(&text("georges")));
        // ephemeral: a later different value overwrites
        parse(&text("fred"), &format, &mut memory).expect("parses");
        assert_eq!(memory.value(id), Some(&text("fred")));
    }

    #[test]
    fn persistent_leaf_must_match_memorized_value() {
        let field = Variable::data("token", DataType::string_interval(1, 10))
            .with_scope(Scope::Persistent);
        let format = Format::new("s0", vec![field]);
        let mut memory = Memory::new();
        parse(&text("alpha"), &format, &mut memory).expect("first observation");
        assert!(parse(&text("alpha"), &format, &mut memory).is_ok());
        assert!(parse(&text("beta"), &format, &mut memory).is_err());
    }

    #[test]
    fn forward_size_relation_is_deferred_and_verified() {
        // the size field precedes the payload it measures
        let payload = Variable::data("payload", DataType::string_interval(1, 8));
        let size = Variable::size_of("size", &[&payload], DataType::uint(8)).with_factor(1.0 / 8.0);
        let format = Format::new("s0", vec![size, payload]);
        let mut memory = Memory::new();
        let mut input = Bits::from_uint(5, 8);
        input.extend(&text("abcde"));
        let values = parse(&input, &format, &mut memory).expect("parses");
        assert_eq!(values[0].value.to_uint(), 5);
        assert_eq!(values[1].value, text("abcde"));

        let mut bad = Bits::from_uint(4, 8);
        bad.extend(&text("abcde"));
        assert!(parse(&bad, &format, &mut memory).is_err());
    }

    #[test]
    fn checksum_relation_verifies_payload() {
        let payload = Variable::constant_text("payload", "data");
        let crc = Variable::checksum_of("crc", &[&payload], ChecksumKind::Crc32);
        let format = Format::new("s0", vec![payload, crc]);
        let mut memory = Memory::new();

        let digest = ChecksumKind::Crc32.compute(b"data");
        let mut good = text("data");
        good.extend(&digest);
        assert!(parse(&good, &format, &mut memory).is_ok());

        let mut bad = text("data");
        bad.extend(&Bits::from_uint(0xDEAD_BEEF, 32));
        assert!(parse(&bad, &format, &mut memory).is_err());
    }

    #[test]
    fn carnivorous_mode_rejects_trailing_bytes() {
        let format = Format::new("s0", vec![Variable::constant_text("a", "ok")]);
        let mut memory = Memory::new();
        assert!(parse(&text("ok!"), &format, &mut memory).is_err());

        let parser = Parser::new(&format, &memory).accept_remainder();
        let input = text("ok!");
        assert!(parser.paths(&input).next().is_some());
    }
}

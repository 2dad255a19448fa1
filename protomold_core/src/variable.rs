use crate::bits::Bits;
use crate::error::{ProtomoldError, ProtomoldResult};
use crate::types::{DataType, TypedValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_VARIABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a [`Variable`], used as the key of
/// [`Memory`](crate::memory::Memory) and preset bindings.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct VariableId(u64);

impl VariableId {
    fn fresh() -> Self {
        VariableId(NEXT_VARIABLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value, useful to derive per-variable seeds.
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Value-retention policy of a variable.
///
/// The policy decides what the engines do with a value once it has been
/// parsed or generated: whether it is part of the definition, remembered
/// for the rest of the session, remembered but replaceable, or forgotten
/// right away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Scope {
    /// The value is part of the definition. Parsing anything else fails and
    /// generation always emits the defined value.
    Constant,
    /// The first observed or generated value is memorized and must match on
    /// every later use of the same memory.
    Persistent,
    /// The value is memorized but replaced on every new observation; the
    /// memory always reflects the last seen value.
    #[default]
    Ephemeral,
    /// Never memorized, every operation is independent.
    Volatile,
}

/// A pure function applied to a copied value by a value relation.
#[derive(Clone)]
pub struct ValueTransform(Arc<dyn Fn(&Bits) -> Bits + Send + Sync>);

impl ValueTransform {
    /// Wraps a transformation function.
    pub fn new(f: impl Fn(&Bits) -> Bits + Send + Sync + 'static) -> Self {
        ValueTransform(Arc::new(f))
    }

    /// Applies the transformation.
    #[must_use]
    pub fn apply(&self, bits: &Bits) -> Bits {
        (self.0)(bits)
    }
}

impl fmt::Debug for ValueTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ValueTransform(..)")
    }
}

/// Checksum algorithm of a checksum relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecksumKind {
    /// CRC-32/ISO-HDLC, the variant used by Ethernet and most file formats.
    Crc32,
    /// CRC-16/IBM-3740 (often called CCITT-FALSE).
    Crc16,
    /// The RFC 1071 ones-complement sum used by the IP protocol family.
    Inet,
}

impl ChecksumKind {
    /// Width of the digest in bits.
    #[must_use]
    pub fn width_bits(&self) -> usize {
        match self {
            ChecksumKind::Crc32 => 32,
            ChecksumKind::Crc16 | ChecksumKind::Inet => 16,
        }
    }

    /// Computes the digest of `payload`.
    #[must_use]
    pub fn compute(&self, payload: &[u8]) -> Bits {
        match self {
            ChecksumKind::Crc32 => {
                let crc32 = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);
                Bits::from_uint(crc32.checksum(payload).into(), 32)
            }
            ChecksumKind::Crc16 => {
                let crc16 = crc::Crc::<u16>::new(&crc::CRC_16_IBM_3740);
                Bits::from_uint(crc16.checksum(payload).into(), 16)
            }
            ChecksumKind::Inet => {
                let mut sum: u32 = 0;
                for chunk in payload.chunks(2) {
                    let word = if chunk.len() == 2 {
                        u32::from(chunk[0]) << 8 | u32::from(chunk[1])
                    } else {
                        u32::from(chunk[0]) << 8
                    };
                    sum = sum.wrapping_add(word);
                }
                while sum > 0xFFFF {
                    sum = (sum & 0xFFFF) + (sum >> 16);
                }
                Bits::from_uint(u64::from(!sum as u16), 16)
            }
        }
    }
}

/// The polymorphic node of a format tree.
#[derive(Debug, Clone)]
pub enum VariableKind {
    /// A plain data field: a type plus an optional constant value.
    Data {
        /// Encoding of the field.
        data_type: DataType,
        /// Optional value that is part of the definition.
        value: Option<Bits>,
    },
    /// Copies the resolved value of another field, optionally transformed.
    Value {
        /// The copied field.
        target: VariableId,
        /// Optional pure transformation of the copied value.
        transform: Option<ValueTransform>,
    },
    /// Encodes `factor * bit_length(targets) + offset` through a type.
    Size {
        /// The measured fields.
        targets: Vec<VariableId>,
        /// Encoding of the computed size.
        data_type: DataType,
        /// Multiplier applied to the total bit length. `1.0` expresses a
        /// size in bits, `1.0 / 8.0` a size in bytes.
        factor: f64,
        /// Constant added after the factor.
        offset: f64,
    },
    /// A digest computed over the encoded bytes of other fields.
    Checksum {
        /// The covered fields.
        targets: Vec<VariableId>,
        /// Digest algorithm.
        kind: ChecksumKind,
    },
    /// Ordered concatenation of children.
    Agg {
        /// The concatenated children, order matters.
        children: Vec<Variable>,
    },
    /// Exactly one child is chosen; order defines the try-order while
    /// parsing.
    Alt {
        /// The mutually exclusive children.
        children: Vec<Variable>,
    },
    /// A child concatenated a bounded number of times.
    Repeat {
        /// The repeated child.
        child: Box<Variable>,
        /// Smallest accepted repetition count.
        min: usize,
        /// Largest accepted repetition count.
        max: usize,
    },
    /// A child that appears zero or one time.
    Opt {
        /// The optional child.
        child: Box<Variable>,
    },
}

/// One node of a format tree: a stable identity, a display name, a
/// retention [`Scope`] and a [`VariableKind`].
#[derive(Debug, Clone)]
pub struct Variable {
    id: VariableId,
    name: String,
    scope: Scope,
    kind: VariableKind,
}

impl Variable {
    fn with_kind(name: impl Into<String>, scope: Scope, kind: VariableKind) -> Self {
        Variable {
            id: VariableId::fresh(),
            name: name.into(),
            scope,
            kind,
        }
    }

    /// A data field of the given type, learned on first sight.
    pub fn data(name: impl Into<String>, data_type: DataType) -> Self {
        Self::with_kind(
            name,
            Scope::default(),
            VariableKind::Data {
                data_type,
                value: None,
            },
        )
    }

    /// A data field whose value is part of the definition.
    ///
    /// # Errors
    /// Fails when the value cannot be encoded by the type.
    pub fn constant(
        name: impl Into<String>,
        data_type: DataType,
        value: &TypedValue,
    ) -> ProtomoldResult<Self> {
        let name = name.into();
        let Some(bits) = data_type.encode(value) else {
            return Err(ProtomoldError::InvalidFormat {
                reason: format!("constant value of field '{name}' does not fit its type"),
            });
        };
        Ok(Self::with_kind(
            name,
            Scope::Constant,
            VariableKind::Data {
                data_type,
                value: Some(bits),
            },
        ))
    }

    /// A constant text field. The type is derived from the content.
    pub fn constant_text(name: impl Into<String>, text: &str) -> Self {
        Self::with_kind(
            name,
            Scope::Constant,
            VariableKind::Data {
                data_type: DataType::string(text.chars().count()),
                value: Some(Bits::from_text(text)),
            },
        )
    }

    /// A field that copies the value of `target`.
    pub fn value_of(name: impl Into<String>, target: &Variable) -> Self {
        Self::with_kind(
            name,
            Scope::default(),
            VariableKind::Value {
                target: target.id,
                transform: None,
            },
        )
    }

    /// A field that copies the value of `target` through `transform`.
    pub fn value_of_transformed(
        name: impl Into<String>,
        target: &Variable,
        transform: ValueTransform,
    ) -> Self {
        Self::with_kind(
            name,
            Scope::default(),
            VariableKind::Value {
                target: target.id,
                transform: Some(transform),
            },
        )
    }

    /// A field carrying the bit length of `targets`, encoded by `data_type`.
    ///
    /// The default factor of `1.0` yields a length in bits; use
    /// [`Variable::with_factor`] with `1.0 / 8.0` for bytes.
    pub fn size_of(
        name: impl Into<String>,
        targets: &[&Variable],
        data_type: DataType,
    ) -> Self {
        Self::with_kind(
            name,
            Scope::Volatile,
            VariableKind::Size {
                targets: targets.iter().map(|t| t.id).collect(),
                data_type,
                factor: 1.0,
                offset: 0.0,
            },
        )
    }

    /// A digest over the encoded bytes of `targets`.
    pub fn checksum_of(
        name: impl Into<String>,
        targets: &[&Variable],
        kind: ChecksumKind,
    ) -> Self {
        Self::with_kind(
            name,
            Scope::Volatile,
            VariableKind::Checksum {
                targets: targets.iter().map(|t| t.id).collect(),
                kind,
            },
        )
    }

    /// An ordered concatenation of children.
    pub fn agg(name: impl Into<String>, children: Vec<Variable>) -> Self {
        Self::with_kind(name, Scope::default(), VariableKind::Agg { children })
    }

    /// An exclusive choice between children.
    pub fn alt(name: impl Into<String>, children: Vec<Variable>) -> Self {
        Self::with_kind(name, Scope::default(), VariableKind::Alt { children })
    }

    /// A child repeated between `min` and `max` times.
    pub fn repeat(name: impl Into<String>, child: Variable, min: usize, max: usize) -> Self {
        Self::with_kind(
            name,
            Scope::default(),
            VariableKind::Repeat {
                child: Box::new(child),
                min,
                max,
            },
        )
    }

    /// A child appearing zero or one time.
    pub fn opt(name: impl Into<String>, child: Variable) -> Self {
        Self::with_kind(
            name,
            Scope::default(),
            VariableKind::Opt {
                child: Box::new(child),
            },
        )
    }

    /// Replaces the retention scope.
    #[must_use]
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Replaces the factor of a size relation.
    ///
    /// # Panics
    /// Panics when called on anything but a size relation.
    #[must_use]
    pub fn with_factor(mut self, value: f64) -> Self {
        match &mut self.kind {
            VariableKind::Size { factor, .. } => *factor = value,
            _ => panic!("with_factor only applies to size relations"),
        }
        self
    }

    /// Replaces the offset of a size relation.
    ///
    /// # Panics
    /// Panics when called on anything but a size relation.
    #[must_use]
    pub fn with_offset(mut self, value: f64) -> Self {
        match &mut self.kind {
            VariableKind::Size { offset, .. } => *offset = value,
            _ => panic!("with_offset only applies to size relations"),
        }
        self
    }

    /// Stable identity of this variable.
    #[must_use]
    pub fn id(&self) -> VariableId {
        self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Retention scope.
    #[must_use]
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// The node payload.
    #[must_use]
    pub fn kind(&self) -> &VariableKind {
        &self.kind
    }

    /// Children of node variables, empty for leaves.
    #[must_use]
    pub fn children(&self) -> &[Variable] {
        match &self.kind {
            VariableKind::Agg { children } | VariableKind::Alt { children } => children,
            VariableKind::Repeat { child, .. } | VariableKind::Opt { child } => {
                std::slice::from_ref(child)
            }
            _ => &[],
        }
    }

    /// Returns true for data fields and relation fields.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children().is_empty()
    }

    /// Returns true for value, size and checksum relations.
    #[must_use]
    pub fn is_relation(&self) -> bool {
        matches!(
            self.kind,
            VariableKind::Value { .. } | VariableKind::Size { .. } | VariableKind::Checksum { .. }
        )
    }

    /// The fields a relation depends on, empty for other variables.
    #[must_use]
    pub fn relation_targets(&self) -> Vec<VariableId> {
        match &self.kind {
            VariableKind::Value { target, .. } => vec![*target],
            VariableKind::Size { targets, .. } | VariableKind::Checksum { targets, .. } => {
                targets.clone()
            }
            _ => Vec::new(),
        }
    }

    /// Finds a variable of this subtree by identity.
    #[must_use]
    pub fn find(&self, id: VariableId) -> Option<&Variable> {
        if self.id == id {
            return Some(self);
        }
        self.children().iter().find_map(|child| child.find(id))
    }

    /// Visits every leaf of this subtree, left to right.
    pub fn for_each_leaf(&self, visit: &mut dyn FnMut(&Variable)) {
        if self.is_leaf() {
            visit(self);
        } else {
            for child in self.children() {
                child.for_each_leaf(visit);
            }
        }
    }

    /// Saturating estimate of the state-space of this subtree.
    #[must_use]
    pub fn count(&self) -> u128 {
        match &self.kind {
            VariableKind::Data { data_type, value } => {
                if value.is_some() {
                    1
                } else {
                    data_type.count()
                }
            }
            VariableKind::Value { .. }
            | VariableKind::Size { .. }
            | VariableKind::Checksum { .. } => 1,
            VariableKind::Agg { children } => children
                .iter()
                .fold(1u128, |acc, c| acc.saturating_mul(c.count())),
            VariableKind::Alt { children } => children
                .iter()
                .fold(0u128, |acc, c| acc.saturating_add(c.count())),
            VariableKind::Repeat { child, min, max } => {
                let per = child.count();
                let mut total: u128 = 0;
                for n in *min..=*max {
                    let Ok(exp) = u32::try_from(n) else {
                        return u128::MAX;
                    };
                    total = total.saturating_add(per.checked_pow(exp).unwrap_or(u128::MAX));
                }
                total
            }
            VariableKind::Opt { child } => child.count().saturating_add(1),
        }
    }

    /// Computes the expected value of a relation leaf from the resolved
    /// values supplied by `lookup`.
    ///
    /// Returns `None` while a dependency is still unresolved, `Some(Err)`
    /// when the computed value cannot be encoded, and `Some(Ok)` with the
    /// expected bits otherwise. Calling this on a non-relation variable
    /// returns an error.
    pub fn relation_expected(
        &self,
        lookup: &dyn Fn(VariableId) -> Option<Bits>,
    ) -> Option<ProtomoldResult<Bits>> {
        match &self.kind {
            VariableKind::Value { target, transform } => {
                let value = lookup(*target)?;
                Some(Ok(match transform {
                    Some(t) => t.apply(&value),
                    None => value,
                }))
            }
            VariableKind::Size {
                targets,
                data_type,
                factor,
                offset,
            } => {
                let mut total_bits: usize = 0;
                for target in targets {
                    total_bits += lookup(*target)?.len();
                }
                let value = (total_bits as f64 * factor + offset) as i64;
                Some(
                    data_type
                        .encode(&TypedValue::Int(value))
                        .ok_or_else(|| ProtomoldError::InvalidFormat {
                            reason: format!(
                                "computed size {value} of field '{}' does not fit its type",
                                self.name
                            ),
                        }),
                )
            }
            VariableKind::Checksum { targets, kind } => {
                let mut covered = Bits::new();
                for target in targets {
                    covered.extend(&lookup(*target)?);
                }
                Some(Ok(kind.compute(&covered.to_bytes())))
            }
            _ => Some(Err(ProtomoldError::InvalidFormat {
                reason: format!("field '{}' is not a relation", self.name),
            })),
        }
    }

    /// Candidate split bounds of a leaf during parsing: `(min, max, step)`
    /// in bits. For a value relation the bounds follow the target's type
    /// when it is known from `root`, and fall back to "anything" otherwise.
    pub(crate) fn split_bounds(&self, roots: &[Variable]) -> (usize, usize, usize) {
        match &self.kind {
            VariableKind::Data { data_type, .. } | VariableKind::Size { data_type, .. } => {
                (data_type.min_bits(), data_type.max_bits(), data_type.step_bits())
            }
            VariableKind::Checksum { kind, .. } => {
                let w = kind.width_bits();
                (w, w, 1)
            }
            VariableKind::Value { target, .. } => roots
                .iter()
                .find_map(|root| root.find(*target))
                .map_or((0, usize::MAX, 1), |v| v.split_bounds(roots)),
            _ => (0, usize::MAX, 1),
        }
    }
}

/// A named, ordered list of top-level fields: the declarative description
/// of one message layout.
#[derive(Debug, Clone)]
pub struct Format {
    name: String,
    fields: Vec<Variable>,
}

impl Format {
    /// Builds a format from its top-level fields.
    pub fn new(name: impl Into<String>, fields: Vec<Variable>) -> Self {
        Format {
            name: name.into(),
            fields,
        }
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The top-level fields, in wire order.
    #[must_use]
    pub fn fields(&self) -> &[Variable] {
        &self.fields
    }

    /// Finds any variable of the tree by identity.
    #[must_use]
    pub fn find(&self, id: VariableId) -> Option<&Variable> {
        self.fields.iter().find_map(|field| field.find(id))
    }

    /// Finds a variable by display name, depth first.
    #[must_use]
    pub fn field_named(&self, name: &str) -> Option<&Variable> {
        fn search<'a>(var: &'a Variable, name: &str) -> Option<&'a Variable> {
            if var.name() == name {
                return Some(var);
            }
            var.children().iter().find_map(|c| search(c, name))
        }
        self.fields.iter().find_map(|field| search(field, name))
    }

    /// Saturating estimate of the state-space of the whole format.
    #[must_use]
    pub fn count(&self) -> u128 {
        self.fields
            .iter()
            .fold(1u128, |acc, f| acc.saturating_mul(f.count()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = Variable::data("a", DataType::uint(8));
        let b = Variable::data("b", DataType::uint(8));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn constant_rejects_misfit_value() {
        let err = Variable::constant("f", DataType::uint_interval(8, (0, 10)), &TypedValue::Int(20));
        assert!(err.is_err());
    }

    #[test]
    fn size_relation_computes_bit_length() {
        let payload = Variable::data("payload", DataType::string(6));
        let size = Variable::size_of("size", &[&payload], DataType::uint(8));
        let value = Bits::from_text("hello!");
        let expected = size
            .relation_expected(&|id| (id == payload.id()).then(|| value.clone()))
            .expect("resolved")
            .expect("encodable");
        assert_eq!(expected.to_uint(), 48);
    }

    #[test]
    fn size_relation_defers_on_missing_target() {
        let payload = Variable::data("payload", DataType::string(6));
        let size = Variable::size_of("size", &[&payload], DataType::uint(8));
        assert!(size.relation_expected(&|_| None).is_none());
    }

    #[test]
    fn inet_checksum_matches_rfc1071_example() {
        // 0x0001 + 0xf203 + 0xf4f5 + 0xf6f7 = 0x2ddf0 -> carry fold 0xddf2
        let sum = ChecksumKind::Inet.compute(&[0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7]);
        assert_eq!(sum.to_uint(), (!0xddf2u16).into());
    }

    #[test]
    fn count_of_nodes() {
        let alt = Variable::alt(
            "alt",
            vec![
                Variable::constant_text("a", "x"),
                Variable::constant_text("b", "y"),
            ],
        );
        assert_eq!(alt.count(), 2);
        let rep = Variable::repeat("rep", Variable::data("d", DataType::uint(8)), 0, 2);
        assert_eq!(rep.count(), 1 + 256 + 256 * 256);
    }

    #[test]
    fn find_descends_the_tree() {
        let inner = Variable::data("inner", DataType::uint(8));
        let inner_id = inner.id();
        let tree = Variable::agg("outer", vec![Variable::opt("maybe", inner)]);
        assert_eq!(tree.find(inner_id).map(Variable::name), Some("inner"));
    }
}

use crate::bits::Bits;
use rand::Rng;
use std::net::Ipv4Addr;

/// Canonical decoded representation shared by every [`DataType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedValue {
    /// Signed integer, also carries unsigned values up to 63 bits.
    Int(i64),
    /// Text content.
    Text(String),
    /// Raw byte content.
    Bytes(Vec<u8>),
    /// An IPv4 address.
    Addr(Ipv4Addr),
    /// Seconds since the epoch.
    Time(u32),
}

/// The closed set of primitive field encodings.
///
/// Every variant interprets a bit range differently but shares one
/// contract: bit-length bounds, a total `can_parse` predicate, a random
/// generator that never fails and stays within the bounds, and
/// `decode`/`encode` conversions to [`TypedValue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    /// Fixed-width integer, optionally restricted to an interval.
    Integer(IntegerType),
    /// Printable text with a character-count interval.
    String(StringType),
    /// Opaque bytes with a byte-count interval.
    Raw(RawType),
    /// Opaque bits with a bit-count interval.
    BitArray(BitArrayType),
    /// Bytes presented as hexadecimal digits, with a byte-count interval.
    HexaString(HexaStringType),
    /// A 32 bit IPv4 address.
    Ipv4,
    /// A 32 bit epoch timestamp.
    Timestamp,
}

/// Parameters of [`DataType::Integer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegerType {
    /// Storage width in bits, at most 64.
    pub bits: u32,
    /// Two's complement interpretation.
    pub signed: bool,
    /// Accepted interval of decoded values, `None` means the full storage
    /// range.
    pub interval: Option<(i64, i64)>,
}

/// Parameters of [`DataType::String`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringType {
    /// Minimum and maximum number of characters.
    pub chars: (usize, usize),
}

/// Parameters of [`DataType::Raw`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawType {
    /// Minimum and maximum number of bytes.
    pub bytes: (usize, usize),
}

/// Parameters of [`DataType::BitArray`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitArrayType {
    /// Minimum and maximum number of bits.
    pub bits: (usize, usize),
}

/// Parameters of [`DataType::HexaString`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexaStringType {
    /// Minimum and maximum number of bytes.
    pub bytes: (usize, usize),
}

// Characters accepted by the String type: printable ASCII plus the usual
// whitespace controls.
fn is_text_byte(byte: u8) -> bool {
    (0x20..=0x7E).contains(&byte) || byte == b'\t' || byte == b'\n' || byte == b'\r'
}

impl IntegerType {
    fn storage_range(&self) -> (i64, i64) {
        if self.signed {
            let half = 1i64 << (self.bits - 1);
            (-half, half - 1)
        } else if self.bits >= 64 {
            (0, i64::MAX)
        } else {
            (0, (1i64 << self.bits) - 1)
        }
    }

    /// The accepted interval, defaulting to the full storage range.
    #[must_use]
    pub fn effective_interval(&self) -> (i64, i64) {
        let (lo, hi) = self.storage_range();
        match self.interval {
            Some((a, b)) => (a.max(lo), b.min(hi)),
            None => (lo, hi),
        }
    }

    fn decode(&self, bits: &Bits) -> i64 {
        let raw = bits.to_uint();
        if self.signed && self.bits < 64 && raw >> (self.bits - 1) & 1 == 1 {
            // sign extend
            (raw | !((1u64 << self.bits) - 1)) as i64
        } else {
            raw as i64
        }
    }

    fn encode(&self, value: i64) -> Bits {
        let mask = if self.bits >= 64 {
            u64::MAX
        } else {
            (1u64 << self.bits) - 1
        };
        Bits::from_uint((value as u64) & mask, self.bits as usize)
    }
}

impl DataType {
    /// An unsigned integer of `bits` width.
    #[must_use]
    pub fn uint(bits: u32) -> Self {
        DataType::Integer(IntegerType {
            bits,
            signed: false,
            interval: None,
        })
    }

    /// An unsigned integer of `bits` width restricted to `interval`.
    #[must_use]
    pub fn uint_interval(bits: u32, interval: (i64, i64)) -> Self {
        DataType::Integer(IntegerType {
            bits,
            signed: false,
            interval: Some(interval),
        })
    }

    /// A signed integer of `bits` width.
    #[must_use]
    pub fn int(bits: u32) -> Self {
        DataType::Integer(IntegerType {
            bits,
            signed: true,
            interval: None,
        })
    }

    /// A text field of exactly `chars` characters.
    #[must_use]
    pub fn string(chars: usize) -> Self {
        DataType::String(StringType {
            chars: (chars, chars),
        })
    }

    /// A text field of `min` to `max` characters.
    #[must_use]
    pub fn string_interval(min: usize, max: usize) -> Self {
        DataType::String(StringType { chars: (min, max) })
    }

    /// A raw byte field of `min` to `max` bytes.
    #[must_use]
    pub fn raw_interval(min: usize, max: usize) -> Self {
        DataType::Raw(RawType { bytes: (min, max) })
    }

    /// A raw bit field of `min` to `max` bits.
    #[must_use]
    pub fn bits_interval(min: usize, max: usize) -> Self {
        DataType::BitArray(BitArrayType { bits: (min, max) })
    }

    /// A hexadecimal byte field of `min` to `max` bytes.
    #[must_use]
    pub fn hexa_interval(min: usize, max: usize) -> Self {
        DataType::HexaString(HexaStringType { bytes: (min, max) })
    }

    /// Smallest accepted bit length.
    #[must_use]
    pub fn min_bits(&self) -> usize {
        match self {
            DataType::Integer(t) => t.bits as usize,
            DataType::String(t) => t.chars.0 * 8,
            DataType::Raw(t) => t.bytes.0 * 8,
            DataType::BitArray(t) => t.bits.0,
            DataType::HexaString(t) => t.bytes.0 * 8,
            DataType::Ipv4 | DataType::Timestamp => 32,
        }
    }

    /// Largest accepted bit length.
    #[must_use]
    pub fn max_bits(&self) -> usize {
        match self {
            DataType::Integer(t) => t.bits as usize,
            DataType::String(t) => t.chars.1 * 8,
            DataType::Raw(t) => t.bytes.1 * 8,
            DataType::BitArray(t) => t.bits.1,
            DataType::HexaString(t) => t.bytes.1 * 8,
            DataType::Ipv4 | DataType::Timestamp => 32,
        }
    }

    /// Length granularity used when enumerating candidate splits.
    #[must_use]
    pub fn step_bits(&self) -> usize {
        match self {
            DataType::BitArray(_) => 1,
            _ => 8,
        }
    }

    /// Returns true when only one bit length is accepted.
    #[must_use]
    pub fn is_fixed_size(&self) -> bool {
        self.min_bits() == self.max_bits()
    }

    /// Total, side-effect-free check that a bit range looks like a valid
    /// value of this type.
    #[must_use]
    pub fn can_parse(&self, bits: &Bits) -> bool {
        let len = bits.len();
        if len < self.min_bits() || len > self.max_bits() {
            return false;
        }
        if (len - self.min_bits()) % self.step_bits() != 0 {
            return false;
        }
        match self {
            DataType::Integer(t) => {
                let (lo, hi) = t.effective_interval();
                let value = t.decode(bits);
                value >= lo && value <= hi
            }
            DataType::String(_) => bits.to_bytes().iter().all(|b| is_text_byte(*b)),
            DataType::Raw(_)
            | DataType::BitArray(_)
            | DataType::HexaString(_)
            | DataType::Ipv4
            | DataType::Timestamp => true,
        }
    }

    /// Generates a random value. Always succeeds and always satisfies
    /// [`DataType::can_parse`].
    pub fn generate<R: Rng>(&self, rng: &mut R) -> Bits {
        match self {
            DataType::Integer(t) => {
                let (lo, hi) = t.effective_interval();
                t.encode(rng.random_range(lo..=hi))
            }
            DataType::String(t) => {
                let chars = rng.random_range(t.chars.0..=t.chars.1);
                let text: Vec<u8> = (0..chars).map(|_| rng.random_range(0x20..=0x7E)).collect();
                Bits::from_bytes(&text)
            }
            DataType::Raw(t) => {
                let count = rng.random_range(t.bytes.0..=t.bytes.1);
                let bytes: Vec<u8> = (0..count).map(|_| rng.random()).collect();
                Bits::from_bytes(&bytes)
            }
            DataType::BitArray(t) => {
                let count = rng.random_range(t.bits.0..=t.bits.1);
                let mut out = Bits::new();
                for _ in 0..count {
                    out.push(rng.random());
                }
                out
            }
            DataType::HexaString(t) => {
                let count = rng.random_range(t.bytes.0..=t.bytes.1);
                let bytes: Vec<u8> = (0..count).map(|_| rng.random()).collect();
                Bits::from_bytes(&bytes)
            }
            DataType::Ipv4 | DataType::Timestamp => Bits::from_uint(rng.random::<u32>().into(), 32),
        }
    }

    /// Decodes a bit range into its canonical representation. Returns
    /// `None` when the range does not satisfy the type.
    #[must_use]
    pub fn decode(&self, bits: &Bits) -> Option<TypedValue> {
        if !self.can_parse(bits) {
            return None;
        }
        Some(match self {
            DataType::Integer(t) => TypedValue::Int(t.decode(bits)),
            DataType::String(_) => TypedValue::Text(bits.to_text()?),
            DataType::Raw(_) | DataType::BitArray(_) | DataType::HexaString(_) => {
                TypedValue::Bytes(bits.to_bytes())
            }
            DataType::Ipv4 => TypedValue::Addr(Ipv4Addr::from(bits.to_uint() as u32)),
            DataType::Timestamp => TypedValue::Time(bits.to_uint() as u32),
        })
    }

    /// Encodes a canonical value into bits. Returns `None` when the value
    /// does not fit this type.
    #[must_use]
    pub fn encode(&self, value: &TypedValue) -> Option<Bits> {
        let bits = match (self, value) {
            (DataType::Integer(t), TypedValue::Int(v)) => {
                let (lo, hi) = t.effective_interval();
                if *v < lo || *v > hi {
                    return None;
                }
                t.encode(*v)
            }
            (DataType::String(_), TypedValue::Text(text)) => Bits::from_text(text),
            (
                DataType::Raw(_) | DataType::BitArray(_) | DataType::HexaString(_),
                TypedValue::Bytes(bytes),
            ) => Bits::from_bytes(bytes),
            (DataType::Ipv4, TypedValue::Addr(addr)) => {
                Bits::from_uint(u32::from(*addr).into(), 32)
            }
            (DataType::Timestamp, TypedValue::Time(secs)) => Bits::from_uint((*secs).into(), 32),
            _ => return None,
        };
        self.can_parse(&bits).then_some(bits)
    }

    /// Saturating estimate of the number of distinct values of this type.
    #[must_use]
    pub fn count(&self) -> u128 {
        fn lengths(range: (usize, usize), alphabet: u128) -> u128 {
            let mut total: u128 = 0;
            for n in range.0..=range.1 {
                let Ok(exp) = u32::try_from(n) else {
                    return u128::MAX;
                };
                let Some(combinations) = alphabet.checked_pow(exp) else {
                    return u128::MAX;
                };
                total = total.saturating_add(combinations);
            }
            total
        }

        match self {
            DataType::Integer(t) => {
                let (lo, hi) = t.effective_interval();
                (hi as i128 - lo as i128 + 1) as u128
            }
            DataType::String(t) => lengths(t.chars, 95),
            DataType::Raw(t) => lengths(t.bytes, 256),
            DataType::BitArray(t) => lengths(t.bits, 2),
            DataType::HexaString(t) => lengths(t.bytes, 256),
            DataType::Ipv4 | DataType::Timestamp => 1 << 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaChaRng;

    #[test]
    fn integer_interval_bounds_parsing() {
        let ty = DataType::uint_interval(16, (10, 500));
        assert!(ty.can_parse(&Bits::from_uint(10, 16)));
        assert!(ty.can_parse(&Bits::from_uint(500, 16)));
        assert!(!ty.can_parse(&Bits::from_uint(501, 16)));
        assert!(!ty.can_parse(&Bits::from_uint(9, 16)));
        assert!(!ty.can_parse(&Bits::from_uint(10, 8)));
    }

    #[test]
    fn signed_integer_decodes_negative() {
        let ty = DataType::int(8);
        assert_eq!(
            ty.decode(&Bits::from_uint(0xFF, 8)),
            Some(TypedValue::Int(-1))
        );
    }

    #[test]
    fn string_rejects_binary_content() {
        let ty = DataType::string_interval(1, 4);
        assert!(ty.can_parse(&Bits::from_text("ab")));
        assert!(!ty.can_parse(&Bits::from_bytes(&[0x00, 0x41])));
        assert!(!ty.can_parse(&Bits::from_text("abcde")));
    }

    #[test]
    fn generated_values_always_parse() {
        let mut rng = ChaChaRng::seed_from_u64(7);
        let types = [
            DataType::uint_interval(32, (0, 12)),
            DataType::string_interval(0, 9),
            DataType::raw_interval(1, 5),
            DataType::bits_interval(3, 17),
            DataType::hexa_interval(2, 2),
            DataType::Ipv4,
            DataType::Timestamp,
        ];
        for ty in &types {
            for _ in 0..50 {
                let value = ty.generate(&mut rng);
                assert!(ty.can_parse(&value), "{ty:?} generated {value:?}");
            }
        }
    }

    #[test]
    fn encode_rejects_out_of_interval() {
        let ty = DataType::uint_interval(8, (0, 10));
        assert!(ty.encode(&TypedValue::Int(5)).is_some());
        assert!(ty.encode(&TypedValue::Int(11)).is_none());
    }

    #[test]
    fn count_saturates() {
        assert_eq!(DataType::uint(8).count(), 256);
        assert_eq!(DataType::string(1).count(), 95);
        assert_eq!(DataType::raw_interval(0, 1000).count(), u128::MAX);
    }
}

use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A bit-addressed value buffer.
///
/// All field values handled by the engines are `Bits`: the bit at index 0 is
/// the most significant bit of the first byte. Unused bits of the last
/// storage byte are kept at zero so that equality and hashing work on the
/// raw storage.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Bits {
    bytes: Vec<u8>,
    len: usize,
}

impl Bits {
    /// Creates an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Bits {
            bytes: Vec::new(),
            len: 0,
        }
    }

    /// Creates a buffer of `len` zero bits.
    #[must_use]
    pub fn zeros(len: usize) -> Self {
        Bits {
            bytes: vec![0; len.div_ceil(8)],
            len,
        }
    }

    /// Wraps whole bytes into a buffer of `8 * bytes.len()` bits.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Bits {
            bytes: bytes.to_vec(),
            len: bytes.len() * 8,
        }
    }

    /// Encodes a text value, one byte per character.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        Self::from_bytes(text.as_bytes())
    }

    /// Encodes the `len` low bits of `value`, most significant bit first.
    ///
    /// # Panics
    /// Panics if `len` exceeds 64.
    #[must_use]
    pub fn from_uint(value: u64, len: usize) -> Self {
        assert!(len <= 64, "an unsigned value holds at most 64 bits");
        let mut out = Self::zeros(len);
        for i in 0..len {
            if (value >> (len - 1 - i)) & 1 == 1 {
                out.set(i);
            }
        }
        out
    }

    /// Number of bits stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no bit is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the bit at `idx`.
    ///
    /// # Panics
    /// Panics if `idx` is out of range.
    #[must_use]
    pub fn bit(&self, idx: usize) -> bool {
        assert!(idx < self.len, "bit index {idx} out of range {}", self.len);
        self.bytes[idx / 8] & (0x80 >> (idx % 8)) != 0
    }

    fn set(&mut self, idx: usize) {
        self.bytes[idx / 8] |= 0x80 >> (idx % 8);
    }

    /// Appends a single bit.
    pub fn push(&mut self, bit: bool) {
        if self.len % 8 == 0 {
            self.bytes.push(0);
        }
        let idx = self.len;
        self.len += 1;
        if bit {
            self.set(idx);
        }
    }

    /// Appends all bits of `other`.
    pub fn extend(&mut self, other: &Bits) {
        if self.len % 8 == 0 {
            // byte aligned, copy the storage directly
            self.bytes.extend_from_slice(&other.bytes);
            self.len += other.len;
        } else {
            for i in 0..other.len {
                self.push(other.bit(i));
            }
        }
    }

    /// Copies the bit range `start..end` into a new buffer.
    ///
    /// # Panics
    /// Panics if the range is out of bounds.
    #[must_use]
    pub fn slice(&self, start: usize, end: usize) -> Bits {
        assert!(start <= end && end <= self.len, "invalid bit range");
        if start % 8 == 0 {
            let mut out = Bits {
                bytes: self.bytes[start / 8..end.div_ceil(8)].to_vec(),
                len: end - start,
            };
            out.clear_tail();
            return out;
        }
        let mut out = Bits::new();
        for i in start..end {
            out.push(self.bit(i));
        }
        out
    }

    /// Returns true when `other` appears at bit position `offset`.
    #[must_use]
    pub fn matches_at(&self, offset: usize, other: &Bits) -> bool {
        if offset + other.len > self.len {
            return false;
        }
        (0..other.len).all(|i| self.bit(offset + i) == other.bit(i))
    }

    /// Returns the storage bytes. The last byte is zero-padded when the bit
    /// count is not a multiple of eight.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    /// Decodes the buffer as a big-endian unsigned integer.
    ///
    /// # Panics
    /// Panics if more than 64 bits are stored.
    #[must_use]
    pub fn to_uint(&self) -> u64 {
        assert!(self.len <= 64, "an unsigned value holds at most 64 bits");
        let mut value = 0u64;
        for i in 0..self.len {
            value = (value << 1) | u64::from(self.bit(i));
        }
        value
    }

    /// Decodes the buffer as text. Returns `None` when the buffer is not
    /// byte aligned or not valid UTF-8.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        if self.len % 8 != 0 {
            return None;
        }
        String::from_utf8(self.to_bytes()).ok()
    }

    // unused bits of the last storage byte must stay zero
    fn clear_tail(&mut self) {
        let tail = self.len % 8;
        if tail != 0
            && let Some(last) = self.bytes.last_mut()
        {
            *last &= 0xFFu8 << (8 - tail);
        }
    }
}

impl fmt::Debug for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bits[{}; {self}]", self.len)
    }
}

impl fmt::Display for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.bytes {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl Serialize for Bits {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.len)?;
        tuple.serialize_element(&self.bytes)?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for Bits {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct BitsVisitor;

        impl<'de> Visitor<'de> for BitsVisitor {
            type Value = Bits;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a (length, bytes) tuple")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Bits, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let len: usize = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(0, &self))?;
                let bytes: Vec<u8> = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(1, &self))?;
                if bytes.len() != len.div_ceil(8) {
                    return Err(serde::de::Error::custom("bit length and storage disagree"));
                }
                let mut bits = Bits { bytes, len };
                bits.clear_tail();
                Ok(bits)
            }
        }

        deserializer.deserialize_tuple(2, BitsVisitor)
    }
}

use protomold_core::types::DataType;
use protomold_core::variable::{ChecksumKind, Format, Scope, Variable};

/// A small text protocol: a learned name, a separator, a keyword chosen
/// between two alternatives and a constant tail.
///
/// Messages look like `hello world !` or `hello john !`.
#[must_use]
pub fn greeting() -> Format {
    let name = Variable::data("name", DataType::string_interval(4, 5));
    let sep = Variable::constant_text("sep", " ");
    let who = Variable::alt(
        "who",
        vec![
            Variable::constant_text("world", "world"),
            Variable::constant_text("john", "john"),
        ],
    );
    let tail = Variable::agg(
        "tail",
        vec![
            Variable::constant_text("space", " "),
            Variable::constant_text("bang", "!"),
        ],
    );
    Format::new("greeting", vec![name, sep, who, tail])
}

/// A UDP-like datagram header in front of a bounded payload.
///
/// The length field carries the byte count of the payload plus the eight
/// header bytes, and the checksum field covers the payload with the
/// ones-complement sum of the IP family. Both sit in front of the payload
/// they describe, so generating this format exercises deferred forward
/// references.
#[must_use]
pub fn udp_datagram(payload_max: usize) -> Format {
    let payload = Variable::data("payload", DataType::raw_interval(0, payload_max))
        .with_scope(Scope::Volatile);
    let src_port = Variable::data("sport", DataType::uint(16));
    let dst_port = Variable::data("dport", DataType::uint(16));
    let length = Variable::size_of("length", &[&payload], DataType::uint(16))
        .with_factor(1.0 / 8.0)
        .with_offset(8.0);
    let checksum = Variable::checksum_of("checksum", &[&payload], ChecksumKind::Inet);
    Format::new(
        "udp",
        vec![src_port, dst_port, length, checksum, payload],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use protomold_core::bits::Bits;
    use protomold_core::memory::Memory;
    use protomold_core::parser::parse;
    use protomold_core::preset::Preset;
    use protomold_core::specializer::specialize;

    #[test]
    fn greeting_round_trips() {
        let format = greeting();
        let mut memory = Memory::new();
        let mut preset = Preset::new();
        let wire = specialize(&format, &mut memory, &mut preset).expect("specializes");
        parse(&wire, &format, &mut memory).expect("parses its own output");
    }

    #[test]
    fn udp_length_counts_header_and_payload_bytes() {
        let format = udp_datagram(32);
        let mut memory = Memory::new();
        let mut preset = Preset::new();
        let wire = specialize(&format, &mut memory, &mut preset).expect("specializes");

        let total_bytes = wire.len() / 8;
        let length_field = wire.slice(32, 48).to_uint();
        assert_eq!(length_field, total_bytes as u64);

        let values = parse(&wire, &format, &mut memory).expect("parses its own output");
        assert_eq!(values[2].value.to_uint(), total_bytes as u64);
    }

    #[test]
    fn udp_rejects_a_corrupted_checksum() {
        let format = udp_datagram(16);
        let mut memory = Memory::new();
        let mut preset = Preset::new();
        let wire = specialize(&format, &mut memory, &mut preset).expect("specializes");

        // flip one bit inside the checksum field (bits 48..64)
        let mut corrupted = Bits::new();
        for i in 0..wire.len() {
            corrupted.push(if i == 50 { !wire.bit(i) } else { wire.bit(i) });
        }
        assert!(parse(&corrupted, &format, &mut memory).is_err());
    }
}

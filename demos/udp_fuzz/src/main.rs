//! Fuzzes the UDP-like datagram format: every leaf is bound to its
//! default mutator and the engine iterates messages until the mutation
//! budget ends the sequence.

use clap::Parser;
use protomold_common::formats::udp_datagram;
use protomold_common::mutators::default_registry;
use protomold_core::fuzz::engine::FuzzEngine;
use protomold_core::fuzz::mutator::{GeneratorKind, IntervalSpec};
use protomold_core::preset::{CounterMax, FuzzConfig, Preset};

#[derive(Debug, Parser)]
struct UdpFuzzArgs {
    /// Number of messages to generate
    #[arg(long, short, default_value_t = 16)]
    count: u64,
    /// Seed of the whole session; the same seed replays the same messages
    #[arg(long, short, default_value_t = 0)]
    seed: u64,
    /// Largest payload size in bytes
    #[arg(long, default_value_t = 32)]
    payload_max: usize,
    /// Emit boundary values instead of pseudo-random ones
    #[arg(long, default_value_t = false)]
    determinist: bool,
    /// Verbose mode
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

fn main() {
    let args = UdpFuzzArgs::parse();
    protomold_core::log::init(args.verbose);

    let format = udp_datagram(args.payload_max);
    let mut preset = Preset::with_registry(default_registry()).with_seed(args.seed);
    let config = FuzzConfig {
        counter_max: CounterMax::Absolute(args.count),
        interval: IntervalSpec::FullInterval,
        generator: if args.determinist {
            GeneratorKind::Determinist
        } else {
            GeneratorKind::Random
        },
        ..FuzzConfig::default()
    };
    if let Err(err) = preset.fuzz_format(&format, &config) {
        eprintln!("{err}");
        return;
    }

    let engine = FuzzEngine::new(&format, preset).with_seed(args.seed);
    for message in engine {
        match message {
            Ok(bits) => {
                let bytes = bits.to_bytes();
                let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
                println!("{hex}");
            }
            Err(err) => {
                eprintln!("{err}");
                break;
            }
        }
    }
}

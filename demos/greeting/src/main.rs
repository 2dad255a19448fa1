//! Generates a greeting message, then feeds it back through the parser.

use protomold_common::formats::greeting;
use protomold_core::bits::Bits;
use protomold_core::memory::Memory;
use protomold_core::parser::parse;
use protomold_core::preset::Preset;
use protomold_core::specializer::specialize;

fn main() {
    protomold_core::log::init(false);

    let format = greeting();
    let mut memory = Memory::new();
    let mut preset = Preset::new();

    let wire = match specialize(&format, &mut memory, &mut preset) {
        Ok(wire) => wire,
        Err(err) => {
            eprintln!("{err}");
            return;
        }
    };
    println!("generated: {:?}", wire.to_text());

    match parse(&wire, &format, &mut memory) {
        Ok(values) => {
            for value in values {
                println!("  {} = {:?}", value.name, value.value.to_text());
            }
        }
        Err(err) => eprintln!("{err}"),
    }

    // parsing a hand-written message against the same format
    let message = Bits::from_text("hello john !");
    match parse(&message, &format, &mut memory) {
        Ok(values) => {
            println!("parsed 'hello john !':");
            for value in values {
                println!("  {} = {:?}", value.name, value.value.to_text());
            }
        }
        Err(err) => eprintln!("{err}"),
    }
}

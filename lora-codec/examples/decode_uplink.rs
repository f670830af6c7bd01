//! Standalone uplink decoder tool
//!
//! Decodes a sequence of hex payloads for one device, carrying the device
//! state from one uplink to the next, and prints the samples.
//!
//! Usage:
//!   decode_uplink <device-type> <hex> [<hex>...]
//!
//! Example:
//!   decode_uplink gwf-coder 01e61e7856341206000a001220a107000000 01e61e7856341206000a001230c807000000

use lora_codec::{CodecConfig, DecoderRegistry, DecoderState, Sample, UplinkEvent, Value};
use std::env;

fn format_value(value: &Value) -> String {
    match value {
        Value::Boolean(b) => format!("{}", b),
        Value::Integer(i) => format!("{}", i),
        Value::Float(f) => format!("{:.4}", f),
        Value::Text(s) => s.clone(),
    }
}

fn print_sample(sample: &Sample) {
    println!("  [{}]", sample.topic);
    for (name, value) in &sample.data {
        println!("    {:<24} {}", name, format_value(value));
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <device-type> <hex> [<hex>...]", args[0]);
        std::process::exit(1);
    }

    let registry = DecoderRegistry::with_builtin_plugins(CodecConfig::new());
    let device_type = &args[1];
    let mut state = DecoderState::new();

    for (index, payload) in args[2..].iter().enumerate() {
        println!("Uplink {}: {}", index + 1, payload);
        let event = UplinkEvent::new("demo", device_type, payload).with_state(state.clone());

        match registry.decode(&event) {
            Ok(output) => {
                for sample in &output.samples {
                    print_sample(sample);
                }
                state = output.state;
            }
            Err(e) => eprintln!("  Decode error: {}", e),
        }
    }

    if !state.is_empty() {
        println!("Final state:");
        for (key, value) in state.iter() {
            println!("  {} = {}", key, value);
        }
    }
}

//! LoRaWAN Payload Codec CLI Application
//!
//! This is the command-line host for the lora-codec library.
//! It uses the library for all decoding rules and adds:
//! - One-shot decode and encode from the command line
//! - Device state kept in a JSON file between invocations
//! - Parallel batch replay of recorded uplinks (JSON lines)

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use lora_codec::{
    DecoderRegistry, DecoderState, DeviceMeta, DownlinkRequest, StateStore, UplinkEvent,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

mod batch;
mod config;

use config::{AppConfig, OutputFormat};

/// LoRaWAN Payload Codec - Decode uplinks and encode downlinks
#[derive(Parser, Debug)]
#[command(name = "lora-codec-cli")]
#[command(about = "Decode LoRaWAN uplink payloads and encode downlinks", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode one uplink payload
    Decode(DecodeArgs),
    /// Encode one downlink
    Encode(EncodeArgs),
    /// Replay a JSON-lines file of uplink events
    Batch(BatchArgs),
    /// List registered device types
    List,
}

#[derive(ClapArgs, Debug)]
struct DecodeArgs {
    /// Device type key, e.g. gwf-coder
    #[arg(short = 't', long)]
    device_type: String,

    /// Payload as hex
    #[arg(short, long)]
    payload: String,

    /// Device identifier
    #[arg(long, default_value = "cli")]
    device_id: String,

    /// Device meta entry (can be repeated): key=value
    #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_meta_entry)]
    meta: Vec<(String, serde_json::Value)>,

    /// JSON file holding the device state; updated after a successful decode
    #[arg(long, value_name = "FILE")]
    state: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
struct EncodeArgs {
    /// Device type key, e.g. adeunis-ftd2
    #[arg(short = 't', long)]
    device_type: String,

    /// Message text
    #[arg(short, long, conflicts_with = "message_json", required_unless_present = "message_json")]
    message: Option<String>,

    /// Message as JSON (e.g. a byte array)
    #[arg(long, value_name = "JSON")]
    message_json: Option<String>,

    /// LoRaWAN FPort
    #[arg(long)]
    port: Option<u8>,

    /// Request a confirmed downlink
    #[arg(long)]
    confirmed: bool,
}

#[derive(ClapArgs, Debug)]
struct BatchArgs {
    /// JSON-lines file of uplink events
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Output file for decode results (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Write the final state of every device to this JSON file
    #[arg(long, value_name = "FILE")]
    state_out: Option<PathBuf>,
}

/// Parse a `key=value` meta entry; the value is JSON if it parses, text otherwise
fn parse_meta_entry(s: &str) -> std::result::Result<(String, serde_json::Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("LoRa Codec CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using codec library v{}", lora_codec::VERSION);

    let app_config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    let registry = DecoderRegistry::with_builtin_plugins(app_config.codec.clone());

    match args.command {
        Command::Decode(decode) => decode_mode(&registry, &app_config, decode),
        Command::Encode(encode) => encode_mode(&registry, &app_config, encode),
        Command::Batch(batch) => batch_mode(&registry, &app_config, batch),
        Command::List => list_mode(&registry),
    }
}

/// Decode mode - one payload, optional state file
fn decode_mode(registry: &DecoderRegistry, app_config: &AppConfig, args: DecodeArgs) -> Result<()> {
    let state = match &args.state {
        Some(path) if path.exists() => read_state(path)?,
        _ => DecoderState::new(),
    };
    let meta: DeviceMeta = args.meta.into_iter().collect();

    let event = UplinkEvent::new(&args.device_id, &args.device_type, &args.payload)
        .with_meta(meta)
        .with_state(state)
        .with_received_at(chrono::Utc::now());

    let output = registry
        .decode(&event)
        .with_context(|| format!("Failed to decode {} payload", args.device_type))?;

    if let Some(path) = &args.state {
        let json = serde_json::to_string_pretty(&output.state)?;
        fs::write(path, json).with_context(|| format!("Failed to write state file: {:?}", path))?;
        log::debug!("State written to {:?}", path);
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_json(&mut out, &output.samples, app_config.output.format)?;
    Ok(())
}

/// Encode mode - one downlink request
fn encode_mode(registry: &DecoderRegistry, app_config: &AppConfig, args: EncodeArgs) -> Result<()> {
    let message = match (args.message, args.message_json) {
        (Some(text), None) => serde_json::Value::String(text),
        (None, Some(json)) => serde_json::from_str(&json)
            .with_context(|| format!("Invalid --message-json: {}", json))?,
        _ => bail!("Exactly one of --message or --message-json is required"),
    };

    let mut request = DownlinkRequest::new(message);
    if let Some(port) = args.port {
        request = request.with_port(port);
    }
    if args.confirmed {
        request = request.with_confirmed(true);
    }

    let frame = registry
        .encode(&args.device_type, &request)
        .with_context(|| format!("Failed to encode {} downlink", args.device_type))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_json(&mut out, &frame, app_config.output.format)?;
    Ok(())
}

/// Batch mode - replay a recorded uplink stream
fn batch_mode(registry: &DecoderRegistry, app_config: &AppConfig, args: BatchArgs) -> Result<()> {
    let file = File::open(&args.input)
        .with_context(|| format!("Failed to open input file: {:?}", args.input))?;
    let events = batch::read_events(BufReader::new(file))?;

    let mut pool = rayon::ThreadPoolBuilder::new();
    if let Some(threads) = app_config.batch.threads {
        pool = pool.num_threads(threads);
    }
    let pool = pool.build().context("Failed to build worker pool")?;

    let store = StateStore::new();
    let (records, stats) = pool.install(|| batch::run_batch(registry, &store, events));

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create output file: {:?}", path))?,
        )),
        None => Box::new(io::stdout().lock()),
    };
    for record in &records {
        write_json(&mut out, record, app_config.output.format)?;
    }
    out.flush()?;

    if let Some(path) = &args.state_out {
        let states: BTreeMap<String, DecoderState> = store.snapshot();
        let json = serde_json::to_string_pretty(&states)?;
        fs::write(path, json).with_context(|| format!("Failed to write state file: {:?}", path))?;
    }

    log::info!(
        "Batch done: {} events, {} devices, {} samples, {} failed",
        stats.events,
        stats.devices,
        stats.samples,
        stats.failed
    );
    Ok(())
}

/// List mode - registered device types and their capabilities
fn list_mode(registry: &DecoderRegistry) -> Result<()> {
    let stats = registry.stats();
    println!(
        "{} device types ({} decoders, {} encoders)",
        stats.num_plugins, stats.num_decoders, stats.num_encoders
    );
    for device_type in registry.device_types() {
        let plugin = registry.plugin(device_type)?;
        let mut ops = Vec::new();
        if plugin.supports_decode() {
            ops.push("decode");
        }
        if plugin.supports_encode() {
            ops.push("encode");
        }
        println!("  {:<16} {:<14} {}", device_type, ops.join(","), plugin.description());
    }
    Ok(())
}

fn read_state(path: &Path) -> Result<DecoderState> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read state file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse state file: {:?}", path))
}

fn write_json<T: Serialize>(out: &mut impl Write, value: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => serde_json::to_writer(&mut *out, value)?,
        OutputFormat::Pretty => serde_json::to_writer_pretty(&mut *out, value)?,
    }
    writeln!(out)?;
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

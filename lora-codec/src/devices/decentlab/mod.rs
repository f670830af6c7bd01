//! Decentlab protocol v2 framing
//!
//! All Decentlab sensors share one frame shape:
//!
//! ```text
//! version (u8) | device id (u16 BE) | sensor flags (u16 BE) | blocks...
//! ```
//!
//! Bit `i` of the flags announces sensor block `i`. A present block carries a
//! fixed number of big-endian u16 words, from which the block's values are
//! computed. Absent blocks are skipped, so their values are omitted.
//!
//! Device plugins describe their blocks as static [`SensorBlock`] tables
//! parameterised by a calibration struct resolved per call from device meta.

pub mod kl66;
pub mod pr26;

use std::collections::BTreeMap;

use crate::field::FieldSpec;
use crate::payload::PayloadBuffer;
use crate::types::{CodecError, Result};

pub use kl66::Kl66;
pub use pr26::Pr26;

/// The only protocol version these devices speak
pub const PROTOCOL_VERSION: u8 = 2;

const VERSION: FieldSpec = FieldSpec::bytes("protocolVersion", 0, 1);
const DEVICE_ID: FieldSpec = FieldSpec::bytes("deviceId", 1, 2);
const SENSOR_FLAGS: FieldSpec = FieldSpec::bytes("sensorFlags", 3, 2);
const HEADER_LEN: usize = 5;

/// Bits per sensor word
const WORD_BITS: usize = 16;

/// Conversion from a block's words to one physical value
pub type Convert<P> = fn(&[f64], &P) -> f64;

/// One value computed from a sensor block
pub struct SensorValue<P: 'static> {
    pub name: &'static str,
    pub convert: Convert<P>,
}

/// A sensor block: `words` u16 values feeding a list of conversions
pub struct SensorBlock<P: 'static> {
    pub words: usize,
    pub values: &'static [SensorValue<P>],
}

/// Decoded frame: header plus the values of every present block
#[derive(Debug, Clone, PartialEq)]
pub struct DecentlabFrame {
    pub protocol_version: u8,
    pub device_id: u16,
    pub flags: u16,
    values: BTreeMap<&'static str, f64>,
}

impl DecentlabFrame {
    /// Value by name; `None` when its block was absent or the result not finite
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Decode a Decentlab v2 frame with the given block table and calibration
pub fn decode_frame<P>(
    payload: &PayloadBuffer,
    blocks: &[SensorBlock<P>],
    params: &P,
) -> Result<DecentlabFrame> {
    payload.require_len(1)?;
    let version = VERSION.read_raw(payload)? as u8;
    if version != PROTOCOL_VERSION {
        return Err(CodecError::UnsupportedProtocolVersion {
            expected: PROTOCOL_VERSION,
            found: version,
        });
    }

    payload.require_len(HEADER_LEN)?;
    let device_id = DEVICE_ID.read_raw(payload)? as u16;
    let flags = SENSOR_FLAGS.read_raw(payload)? as u16;

    let mut values = BTreeMap::new();
    let mut pos = HEADER_LEN * 8;

    for (index, block) in blocks.iter().enumerate() {
        if index >= 16 || flags & (1 << index) == 0 {
            log::trace!("Sensor block {} absent", index);
            continue;
        }

        let field = block.values.first().map(|v| v.name).unwrap_or("sensor");
        let mut words = Vec::with_capacity(block.words);
        for _ in 0..block.words {
            words.push(payload.named_bits(field, pos, WORD_BITS)? as f64);
            pos += WORD_BITS;
        }

        for value in block.values {
            let result = (value.convert)(&words, params);
            if result.is_finite() {
                values.insert(value.name, result);
            } else {
                log::debug!("Value '{}' is not finite ({}), omitting", value.name, result);
            }
        }
    }

    if pos < payload.bit_len() {
        log::debug!(
            "Ignoring {} trailing bytes after sensor blocks",
            (payload.bit_len() - pos) / 8
        );
    }

    Ok(DecentlabFrame {
        protocol_version: version,
        device_id,
        flags,
        values,
    })
}

/// Battery level in percent from a linear voltage range, clamped and rounded
pub fn battery_percent(voltage: f64, max: f64, min: f64) -> f64 {
    let percent = (voltage - min) / (max - min) * 100.0;
    percent.clamp(0.0, 100.0).round()
}

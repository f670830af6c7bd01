//! Decentlab DL-KL66 strain / weight sensor
//!
//! A vibrating-wire gauge: the sensor reports a pulse count over a measurement
//! interval, from which frequency, weight, elongation and strain are derived
//! with two calibration constants, `f0` (reference frequency) and `k`
//! (proportionality constant). Both can be overridden per device via meta.

use super::{battery_percent, decode_frame, SensorBlock, SensorValue};
use crate::plugin::{DecodeInput, DecoderPlugin};
use crate::state::DeviceMeta;
use crate::types::{topic, DecodeOutput, Result, SampleBuilder};

pub const DEVICE_TYPE: &str = "decentlab-kl66";

/// Reference frequency in Hz
pub const DEFAULT_F0: f64 = 15383.72;
/// Proportionality constant
pub const DEFAULT_K: f64 = 46.4859;

/// Ticks per second of the measurement interval clock
const CLOCK_HZ: f64 = 32768.0;

const BATTERY_MAX_V: f64 = 3.0;
const BATTERY_MIN_V: f64 = 2.0;

/// Calibration for one decode call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub f0: f64,
    pub k: f64,
}

impl Calibration {
    /// Meta overrides over the built-in constants
    pub fn from_meta(meta: &DeviceMeta) -> Self {
        Self {
            f0: meta.f64_or("f0", DEFAULT_F0),
            k: meta.f64_or("k", DEFAULT_K),
        }
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            f0: DEFAULT_F0,
            k: DEFAULT_K,
        }
    }
}

fn frequency(x: &[f64]) -> f64 {
    x[0] / x[1] * CLOCK_HZ
}

fn weight(x: &[f64], c: &Calibration) -> f64 {
    (frequency(x).powi(2) - c.f0.powi(2)) * c.k / 1_000_000.0
}

fn elongation(x: &[f64], c: &Calibration) -> f64 {
    weight(x, c) * (-1.5) / 1000.0 * 9.8067
}

const BLOCKS: &[SensorBlock<Calibration>] = &[
    SensorBlock {
        words: 3,
        values: &[
            SensorValue {
                name: "counterReading",
                convert: |x, _| x[0],
            },
            SensorValue {
                name: "measurementInterval", // s
                convert: |x, _| x[1] / CLOCK_HZ,
            },
            SensorValue {
                name: "frequency", // Hz
                convert: |x, _| frequency(x),
            },
            SensorValue {
                name: "weight", // g
                convert: weight,
            },
            SensorValue {
                name: "elongation", // µm
                convert: elongation,
            },
            SensorValue {
                name: "strain", // µm⋅m⁻¹
                convert: |x, c| elongation(x, c) / 0.066,
            },
        ],
    },
    SensorBlock {
        words: 1,
        values: &[SensorValue {
            name: "batteryVoltage", // V
            convert: |x, _| x[0] / 1000.0,
        }],
    },
];

const DEFAULT_FIELDS: [&str; 6] = [
    "weight",
    "frequency",
    "counterReading",
    "measurementInterval",
    "elongation",
    "strain",
];

/// Decoder for DL-KL66 frames
#[derive(Debug, Clone, Copy, Default)]
pub struct Kl66;

impl DecoderPlugin for Kl66 {
    fn device_type(&self) -> &'static str {
        DEVICE_TYPE
    }

    fn description(&self) -> &'static str {
        "Decentlab DL-KL66 strain/weight sensor"
    }

    fn decode(&self, input: DecodeInput<'_>) -> Result<DecodeOutput> {
        let calibration = Calibration::from_meta(input.meta);
        let frame = decode_frame(input.payload, BLOCKS, &calibration)?;

        let mut data = SampleBuilder::new(topic::DEFAULT);
        for name in DEFAULT_FIELDS {
            data.set_opt(name, frame.value(name));
        }

        let battery = frame.value("batteryVoltage");
        let mut lifecycle = SampleBuilder::new(topic::LIFECYCLE);
        lifecycle
            .set_opt("batteryVoltage", battery)
            .set_opt(
                "batteryLevel",
                battery.map(|v| battery_percent(v, BATTERY_MAX_V, BATTERY_MIN_V) as i64),
            )
            .set("protocolVersion", frame.protocol_version)
            .set("deviceId", frame.device_id);

        Ok(DecodeOutput {
            samples: [data.finish(), lifecycle.finish()]
                .into_iter()
                .flatten()
                .collect(),
            state: input.state,
        })
    }
}

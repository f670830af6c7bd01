//! Decentlab DL-PR26 pressure / temperature sensor
//!
//! Used for water level monitoring: the level is derived from the measured
//! gauge pressure assuming fresh water.

use super::{decode_frame, SensorBlock, SensorValue};
use crate::plugin::{DecodeInput, DecoderPlugin};
use crate::scaling::LinearTransform;
use crate::types::{topic, DecodeOutput, Result, SampleBuilder};

pub const DEVICE_TYPE: &str = "decentlab-pr26";

/// (x - 16384) / 32768 bar over a 0..1 bar range
const PRESSURE: LinearTransform = LinearTransform::new(1.0 / 32768.0, -0.5);
/// (x - 384) * 0.003125 - 50 °C
const TEMPERATURE: LinearTransform = LinearTransform::new(0.003125, -51.2);

const PASCAL_PER_BAR: f64 = 100_000.0;
const WATER_DENSITY: f64 = 1000.0;
const GRAVITY: f64 = 9.807;

/// Water column in metres for a gauge pressure in bar
pub fn water_level(pressure_bar: f64) -> f64 {
    pressure_bar * PASCAL_PER_BAR / (WATER_DENSITY * GRAVITY)
}

const BLOCKS: &[SensorBlock<()>] = &[
    SensorBlock {
        words: 2,
        values: &[
            SensorValue {
                name: "pressure", // bar
                convert: |x, _| PRESSURE.apply(x[0]),
            },
            SensorValue {
                name: "temperature", // °C
                convert: |x, _| TEMPERATURE.apply(x[1]),
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

/// Decoder for DL-PR26 frames
#[derive(Debug, Clone, Copy, Default)]
pub struct Pr26;

impl DecoderPlugin for Pr26 {
    fn device_type(&self) -> &'static str {
        DEVICE_TYPE
    }

    fn description(&self) -> &'static str {
        "Decentlab DL-PR26 pressure/level sensor"
    }

    fn decode(&self, input: DecodeInput<'_>) -> Result<DecodeOutput> {
        let frame = decode_frame(input.payload, BLOCKS, &())?;
        let pressure = frame.value("pressure");

        let mut data = SampleBuilder::new(topic::DEFAULT);
        data.set_opt("pressure", pressure)
            .set_opt("temperature", frame.value("temperature"))
            .set_opt("level", pressure.map(water_level));

        let mut lifecycle = SampleBuilder::new(topic::LIFECYCLE);
        lifecycle
            .set_opt("voltage", frame.value("batteryVoltage"))
            .set("protocolVersion", frame.protocol_version)
            .set("deviceID", frame.device_id);

        Ok(DecodeOutput {
            samples: [data.finish(), lifecycle.finish()]
                .into_iter()
                .flatten()
                .collect(),
            state: input.state,
        })
    }
}

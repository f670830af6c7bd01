//! GWF radio coder on a wireless M-Bus style water/gas meter
//!
//! Frame layout (18 bytes):
//!
//! | bytes | content                                             |
//! |-------|-----------------------------------------------------|
//! | 0     | protocol type (0x01)                                |
//! | 1–2   | manufacturer id, little endian                      |
//! | 3–6   | meter id, BCD, least significant byte first         |
//! | 7     | medium (3 gas, 6 warm water, 7 water)               |
//! | 8     | M-Bus state: app error (2 bits) + 6 status flags    |
//! | 9–10  | actuality duration, little endian                   |
//! | 11    | volume VIF                                          |
//! | 12–15 | absolute volume, little endian                      |
//! | 16    | additional function flags                           |
//! | 17    | battery lifetime (5 bits, reversed) + link error    |

use crate::counter::CounterNormalizer;
use crate::endian::reverse_bytes;
use crate::field::{self, FieldSpec};
use crate::payload::PayloadBuffer;
use crate::plugin::{DecodeInput, DecoderPlugin};
use crate::scaling::{DecimalExponentTable, Scaled};
use crate::types::{topic, CodecError, DecodeOutput, Result, SampleBuilder};

pub const DEVICE_TYPE: &str = "gwf-coder";

const PROTOCOL_TYPE: u8 = 0x01;

const PROTOCOL: FieldSpec = FieldSpec::bytes("protocolType", 0, 1);
const MANUFACTURER: FieldSpec = FieldSpec::bytes("manufacturerID", 1, 2).little_endian();
const MEDIUM: FieldSpec = FieldSpec::bytes("meterMedium", 7, 1);
const APP_ERROR: FieldSpec = FieldSpec::new("appError", 64, 2);
const ACTUALITY: FieldSpec = FieldSpec::bytes("actualityDuration", 9, 2).little_endian();
const VOLUME_VIF: FieldSpec = FieldSpec::bytes("volumeVif", 11, 1);
const ABSOLUTE_VOLUME: FieldSpec = FieldSpec::bytes("absoluteVolume", 12, 4)
    .little_endian()
    .with_unit_code(&VOLUME_VIF, &VOLUME_TABLE);
const BATTERY_LIFETIME: FieldSpec = FieldSpec::new("batteryLifetime", 136, 5).reversed_bits();

/// Status and additional-function flags reported on the lifecycle topic
const FLAGS: [FieldSpec; 11] = [
    FieldSpec::flag("batteryPowerLow", 66),
    FieldSpec::flag("permantError", 67),
    FieldSpec::flag("temporaryError", 68),
    FieldSpec::flag("commandError1", 69),
    FieldSpec::flag("commandError2", 70),
    FieldSpec::flag("commandError3", 71),
    FieldSpec::flag("continuousFlow", 129),
    FieldSpec::flag("brokenPipe", 131),
    FieldSpec::flag("batteryLow", 133),
    FieldSpec::flag("backflow", 134),
    FieldSpec::flag("noUsage", 135),
];

const LORA_LINK_ERROR: FieldSpec = FieldSpec::flag("loraLinkError", 141);

/// Battery lifetime is reported in semesters
const MONTHS_PER_SEMESTER: i64 = 6;

const VOLUME_TABLE: DecimalExponentTable = DecimalExponentTable::volume_vif();

const VOLUME_COUNTER: CounterNormalizer = CounterNormalizer::new("lastVolume");

/// Minimum frame size in bytes
pub fn frame_len() -> usize {
    field::required_bytes(&[
        PROTOCOL,
        MANUFACTURER,
        ABSOLUTE_VOLUME,
        BATTERY_LIFETIME,
        LORA_LINK_ERROR,
    ])
}

fn medium_name(code: i64) -> Option<&'static str> {
    match code {
        3 => Some("GAS"),
        6 => Some("WARM_WATER"),
        7 => Some("WATER"),
        _ => None,
    }
}

fn app_error_name(code: i64) -> &'static str {
    match code {
        0 => "NO_ERROR",
        1 => "APPLICATION_BUSY",
        2 => "ANY_APPLICATION_ERROR",
        _ => "RESERVED",
    }
}

/// Meter id: BCD digits stored least significant byte first
fn meter_id(payload: &PayloadBuffer) -> Result<Option<u64>> {
    let digits = reverse_bytes(payload.byte_range(6, 8)?)?;
    match digits.parse::<u64>() {
        Ok(id) => Ok(Some(id)),
        Err(_) => {
            log::debug!("Meter id '{}' is not BCD, omitting", digits);
            Ok(None)
        }
    }
}

/// Decoder for GWF radio coder frames
#[derive(Debug, Clone, Copy, Default)]
pub struct GwfCoder;

impl GwfCoder {
    pub fn new() -> Self {
        Self
    }
}

impl DecoderPlugin for GwfCoder {
    fn device_type(&self) -> &'static str {
        DEVICE_TYPE
    }

    fn description(&self) -> &'static str {
        "GWF radio coder (M-Bus volume meter)"
    }

    fn decode(&self, input: DecodeInput<'_>) -> Result<DecodeOutput> {
        let payload = input.payload;
        let mut state = input.state;

        payload.require_len(frame_len())?;

        let protocol = PROTOCOL.read_raw(payload)? as u8;
        if protocol != PROTOCOL_TYPE {
            return Err(CodecError::UnsupportedProtocolVersion {
                expected: PROTOCOL_TYPE,
                found: protocol,
            });
        }

        let mut lifecycle = SampleBuilder::new(topic::LIFECYCLE);
        lifecycle
            .set(PROTOCOL.name, protocol)
            .set(MANUFACTURER.name, MANUFACTURER.read_raw(payload)?)
            .set_opt("meterID", meter_id(payload)?)
            .set(APP_ERROR.name, app_error_name(APP_ERROR.read_raw(payload)?));
        for flag in &FLAGS {
            lifecycle.set(flag.name, flag.read_flag(payload)?);
        }
        lifecycle
            .set(
                BATTERY_LIFETIME.name,
                BATTERY_LIFETIME.read_raw(payload)? * MONTHS_PER_SEMESTER,
            )
            .set(LORA_LINK_ERROR.name, LORA_LINK_ERROR.read_flag(payload)?);

        let mut data = SampleBuilder::new(topic::DEFAULT);
        data.set_opt(MEDIUM.name, medium_name(MEDIUM.read_raw(payload)?))
            .set(ACTUALITY.name, ACTUALITY.read_raw(payload)?);

        let volume = if input.options.strict_unit_codes {
            Scaled::Applied(ABSOLUTE_VOLUME.read_strict(payload)?)
        } else {
            ABSOLUTE_VOLUME.read_scaled(payload)?
        };
        match volume {
            Scaled::Applied(volume) => {
                data.set(ABSOLUTE_VOLUME.name, volume)
                    .set("volume", VOLUME_COUNTER.normalize(&mut state, volume));
            }
            Scaled::Unscaled(raw) => {
                // Leave the baseline alone: it is kept in scaled units
                data.set(ABSOLUTE_VOLUME.name, raw)
                    .set("absoluteVolumeScaled", false)
                    .set_opt::<f64>("volume", None);
            }
        }

        Ok(DecodeOutput {
            samples: [data.finish(), lifecycle.finish()]
                .into_iter()
                .flatten()
                .collect(),
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::DecodeOptions;
    use crate::state::{DecoderState, DeviceMeta};
    use crate::types::Value;

    const FRAME: &str = "01e61e7856341206000a001220a107000000";

    fn decode_with(hex: &str, state: DecoderState, strict: bool) -> Result<DecodeOutput> {
        let payload = PayloadBuffer::from_hex(hex)?;
        let meta = DeviceMeta::new();
        GwfCoder::new().decode(
            DecodeInput::new(&payload, &meta)
                .with_state(state)
                .with_options(DecodeOptions {
                    strict_unit_codes: strict,
                }),
        )
    }

    /// Replace the byte at `index` in a hex frame
    fn patch(hex: &str, index: usize, byte: &str) -> String {
        let mut s = hex.to_string();
        s.replace_range(index * 2..index * 2 + 2, byte);
        s
    }

    #[test]
    fn test_frame_len() {
        assert_eq!(frame_len(), 18);
    }

    #[test]
    fn test_default_sample() {
        let out = decode_with(FRAME, DecoderState::new(), true).unwrap();
        let data = out.sample("default").unwrap();
        assert_eq!(data.get("meterMedium"), Some(&Value::from("WARM_WATER")));
        assert_eq!(data.get("actualityDuration"), Some(&Value::Integer(10)));
        assert_eq!(data.get("absoluteVolume"), Some(&Value::Float(50.0)));
        assert_eq!(data.get("volume"), Some(&Value::Float(0.0)));
        assert_eq!(out.state.get_f64("lastVolume"), Some(50.0));
    }

    #[test]
    fn test_lifecycle_sample() {
        let out = decode_with(FRAME, DecoderState::new(), true).unwrap();
        let lifecycle = out.sample("lifecycle").unwrap();
        assert_eq!(lifecycle.get("protocolType"), Some(&Value::Integer(1)));
        assert_eq!(lifecycle.get("manufacturerID"), Some(&Value::Integer(0x1EE6)));
        assert_eq!(lifecycle.get("meterID"), Some(&Value::Integer(12_345_678)));
        assert_eq!(lifecycle.get("appError"), Some(&Value::from("NO_ERROR")));
        assert_eq!(lifecycle.get("batteryLow"), Some(&Value::Boolean(false)));
        assert_eq!(lifecycle.get("batteryLifetime"), Some(&Value::Integer(0)));
    }

    #[test]
    fn test_lifecycle_key_names() {
        let out = decode_with(FRAME, DecoderState::new(), true).unwrap();
        let keys: Vec<&str> = out
            .sample("lifecycle")
            .unwrap()
            .data
            .keys()
            .map(String::as_str)
            .collect();
        for key in ["manufacturerID", "meterID", "permantError", "protocolType"] {
            assert!(keys.contains(&key), "missing {}", key);
        }
        for key in ["manufacturerId", "meterId", "permanentError"] {
            assert!(!keys.contains(&key), "unexpected {}", key);
        }
    }

    #[test]
    fn test_status_bits() {
        // state byte 0b10_1_0_0_0_0_1: app error 2, battery power low, command error 3
        let hex = patch(FRAME, 8, "a1");
        // additional functions: continuous flow + backflow
        let hex = patch(&hex, 16, "42");
        // lifetime bits 136..141 = 0,1,0,0,0 -> 2 semesters; link error bit 141 set
        let hex = patch(&hex, 17, "44");

        let out = decode_with(&hex, DecoderState::new(), true).unwrap();
        let lifecycle = out.sample("lifecycle").unwrap();
        assert_eq!(lifecycle.get("appError"), Some(&Value::from("ANY_APPLICATION_ERROR")));
        assert_eq!(lifecycle.get("batteryPowerLow"), Some(&Value::Boolean(true)));
        assert_eq!(lifecycle.get("commandError3"), Some(&Value::Boolean(true)));
        assert_eq!(lifecycle.get("temporaryError"), Some(&Value::Boolean(false)));
        assert_eq!(lifecycle.get("continuousFlow"), Some(&Value::Boolean(true)));
        assert_eq!(lifecycle.get("backflow"), Some(&Value::Boolean(true)));
        assert_eq!(lifecycle.get("noUsage"), Some(&Value::Boolean(false)));
        assert_eq!(lifecycle.get("batteryLifetime"), Some(&Value::Integer(12)));
        assert_eq!(lifecycle.get("loraLinkError"), Some(&Value::Boolean(true)));
    }

    #[test]
    fn test_increment_against_baseline() {
        let state: DecoderState = [("lastVolume", 48.5)].into_iter().collect();
        let out = decode_with(FRAME, state, true).unwrap();
        let volume = out.sample("default").unwrap().get("volume").unwrap();
        assert!((volume.as_f64().unwrap() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_medium_is_omitted() {
        let hex = patch(FRAME, 7, "09");
        let out = decode_with(&hex, DecoderState::new(), true).unwrap();
        assert!(out.sample("default").unwrap().get("meterMedium").is_none());
    }

    #[test]
    fn test_non_bcd_meter_id_is_omitted() {
        let hex = patch(FRAME, 3, "7a");
        let out = decode_with(&hex, DecoderState::new(), true).unwrap();
        assert!(out.sample("lifecycle").unwrap().get("meterID").is_none());
    }

    #[test]
    fn test_unknown_vif_strict() {
        let hex = patch(FRAME, 11, "13");
        assert!(decode_with(&hex, DecoderState::new(), true).is_ok());

        let hex = patch(FRAME, 11, "7f");
        assert_eq!(
            decode_with(&hex, DecoderState::new(), true).unwrap_err(),
            CodecError::UnknownUnitCode {
                field: "absoluteVolume".into(),
                code: 0x7f
            }
        );
    }

    #[test]
    fn test_unknown_vif_lenient_keeps_baseline() {
        let hex = patch(FRAME, 11, "7f");
        let state: DecoderState = [("lastVolume", 40.0)].into_iter().collect();
        let out = decode_with(&hex, state.clone(), false).unwrap();
        let data = out.sample("default").unwrap();
        assert_eq!(data.get("absoluteVolume"), Some(&Value::Float(500_000.0)));
        assert_eq!(data.get("absoluteVolumeScaled"), Some(&Value::Boolean(false)));
        assert!(data.get("volume").is_none());
        assert_eq!(out.state, state);
    }

    #[test]
    fn test_wrong_protocol_type() {
        let hex = patch(FRAME, 0, "02");
        assert_eq!(
            decode_with(&hex, DecoderState::new(), true).unwrap_err(),
            CodecError::UnsupportedProtocolVersion {
                expected: 1,
                found: 2
            }
        );
    }

    #[test]
    fn test_short_frame() {
        let err = decode_with(&FRAME[..30], DecoderState::new(), true).unwrap_err();
        assert_eq!(
            err,
            CodecError::PayloadTooShort {
                expected: 18,
                actual: 15
            }
        );
    }
}

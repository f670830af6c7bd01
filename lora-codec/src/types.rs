//! Core types for the LoRaWAN payload codec library
//!
//! This module defines the fundamental types that flow across the plugin
//! boundary: the error taxonomy, decoded values, samples, and the uplink /
//! downlink envelopes exchanged with the host.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::state::{DecoderState, DeviceMeta};

/// Timestamp type used throughout the codec
pub type Timestamp = DateTime<Utc>;

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors that can occur during decoding, encoding or dispatch
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error(
        "Bit range {offset}+{length} exceeds payload of {available} bits{}",
        field_suffix(.field)
    )]
    OutOfRange {
        /// Name of the field being read, if known
        field: Option<String>,
        offset: usize,
        length: usize,
        available: usize,
    },

    #[error("Payload too short: expected at least {expected} bytes, got {actual}")]
    PayloadTooShort { expected: usize, actual: usize },

    #[error("Unsupported protocol version {found} (expected {expected})")]
    UnsupportedProtocolVersion { expected: u8, found: u8 },

    #[error("Unknown unit code {code} for field '{field}'")]
    UnknownUnitCode { field: String, code: u32 },

    #[error("Unknown device type: {0}")]
    UnknownDeviceType(String),

    #[error("Device type registered twice: {0}")]
    DuplicateDeviceType(String),

    #[error("State conflict: decode already in flight for device {0}")]
    StateConflict(String),

    #[error("Device type '{device_type}' does not support {operation}")]
    UnsupportedOperation {
        device_type: String,
        operation: &'static str,
    },

    #[error("Invalid encode request: {0}")]
    InvalidEncodeRequest(String),

    #[error("Invalid field definition: {0}")]
    InvalidFieldSpec(String),

    #[error("Value overflow: {0}")]
    Overflow(String),
}

fn field_suffix(field: &Option<String>) -> String {
    field
        .as_ref()
        .map(|f| format!(" (field '{}')", f))
        .unwrap_or_default()
}

impl CodecError {
    /// True for every error caused by the payload bytes themselves
    /// (bad hex, too short, reads past the end).
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            CodecError::MalformedPayload(_)
                | CodecError::OutOfRange { .. }
                | CodecError::PayloadTooShort { .. }
        )
    }

    /// Attach a field name to a range error that does not carry one yet
    pub fn with_field(self, name: &str) -> Self {
        match self {
            CodecError::OutOfRange {
                field: None,
                offset,
                length,
                available,
            } => CodecError::OutOfRange {
                field: Some(name.to_string()),
                offset,
                length,
                available,
            },
            other => other,
        }
    }
}

/// Decoded field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean flag
    Boolean(bool),
    /// Signed integer value
    Integer(i64),
    /// Floating-point value (after scaling)
    Float(f64),
    /// Enumerated value (e.g. "WARM_WATER")
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{:.3}", v),
            Value::Text(v) => write!(f, "{}", v),
        }
    }
}

impl Value {
    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            Value::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Float(v) => Some(*v as i64),
            Value::Boolean(v) => Some(if *v { 1 } else { 0 }),
            Value::Text(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        // Wider than any field the plugins read; saturate instead of wrapping
        Value::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Well-known topic names
pub mod topic {
    /// Physical measurements
    pub const DEFAULT: &str = "default";
    /// Device health (battery, error flags)
    pub const LIFECYCLE: &str = "lifecycle";
}

/// A set of decoded fields routed under one topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Routing topic (e.g. "default", "lifecycle")
    pub topic: String,
    /// Reception time of the uplink, if the host supplied one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// Field name to value; never empty
    pub data: BTreeMap<String, Value>,
}

impl Sample {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }
}

/// Collects the fields of one sample, dropping omitted ones
///
/// A field passed as `None` is *omitted*: its source bits said "not present"
/// or the plugin had nothing to report. Omission is not an error. A builder
/// whose fields were all omitted produces no sample at all.
#[derive(Debug)]
pub struct SampleBuilder {
    topic: String,
    data: BTreeMap<String, Value>,
    omitted: Vec<String>,
}

impl SampleBuilder {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            data: BTreeMap::new(),
            omitted: Vec::new(),
        }
    }

    /// Record a field that always resolves
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.data.insert(name.to_string(), value.into());
        self
    }

    /// Record a field that may be omitted
    pub fn set_opt<V: Into<Value>>(&mut self, name: &str, value: Option<V>) -> &mut Self {
        match value {
            Some(v) => {
                self.data.insert(name.to_string(), v.into());
            }
            None => self.omitted.push(name.to_string()),
        }
        self
    }

    /// Names of the fields that were omitted so far
    pub fn omitted(&self) -> &[String] {
        &self.omitted
    }

    /// Finish the sample; `None` when every field was omitted
    pub fn finish(self) -> Option<Sample> {
        if self.data.is_empty() {
            log::debug!(
                "Suppressing empty '{}' sample ({} omitted fields)",
                self.topic,
                self.omitted.len()
            );
            return None;
        }

        Some(Sample {
            topic: self.topic,
            timestamp: None,
            data: self.data,
        })
    }
}

/// An uplink as handed over by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UplinkEvent {
    /// Device identifier; also the state key
    pub device_id: String,
    /// Registry key selecting the plugin
    pub device_type: String,
    /// Application payload as hex
    pub payload_hex: String,
    /// Per-device overrides of plugin constants
    #[serde(default)]
    pub device_meta: DeviceMeta,
    /// State persisted by the host after the previous call
    #[serde(default)]
    pub state: DecoderState,
    /// Reception time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<Timestamp>,
}

impl UplinkEvent {
    /// Create an event with empty meta and state
    pub fn new(
        device_id: impl Into<String>,
        device_type: impl Into<String>,
        payload_hex: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            device_type: device_type.into(),
            payload_hex: payload_hex.into(),
            device_meta: DeviceMeta::default(),
            state: DecoderState::default(),
            received_at: None,
        }
    }

    /// Builder method: carry previously persisted state
    pub fn with_state(mut self, state: DecoderState) -> Self {
        self.state = state;
        self
    }

    /// Builder method: set device meta overrides
    pub fn with_meta(mut self, meta: DeviceMeta) -> Self {
        self.device_meta = meta;
        self
    }

    /// Builder method: set the reception time
    pub fn with_received_at(mut self, at: Timestamp) -> Self {
        self.received_at = Some(at);
        self
    }
}

/// Result of one decode call
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DecodeOutput {
    /// Emitted samples, in plugin order
    pub samples: Vec<Sample>,
    /// State to persist before the next call for the same device
    pub state: DecoderState,
}

impl DecodeOutput {
    /// First sample with the given topic
    pub fn sample(&self, topic: &str) -> Option<&Sample> {
        self.samples.iter().find(|s| s.topic == topic)
    }
}

/// Structured downlink encode request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownlinkRequest {
    /// Plugin-specific message
    pub message: serde_json::Value,
    /// LoRaWAN FPort; plugin default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u8>,
    /// Confirmed downlink; `false` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed: Option<bool>,
}

impl DownlinkRequest {
    pub fn new(message: impl Into<serde_json::Value>) -> Self {
        Self {
            message: message.into(),
            port: None,
            confirmed: None,
        }
    }

    pub fn with_port(mut self, port: u8) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_confirmed(mut self, confirmed: bool) -> Self {
        self.confirmed = Some(confirmed);
        self
    }
}

/// Encoded downlink ready for the network server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownlinkFrame {
    /// Lowercase hex payload
    pub payload_hex: String,
    pub port: u8,
    pub confirmed: bool,
}

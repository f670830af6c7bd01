//! Decoder plugin contract
//!
//! Every device type is served by one [`DecoderPlugin`]. A plugin is a
//! stateless strategy: its constants are immutable, per-device overrides
//! arrive in [`DecodeInput::meta`], and the only mutable data, the device
//! state, is moved in and handed back in the [`DecodeOutput`]. Plugins never
//! perform I/O.

use crate::config::CodecConfig;
use crate::payload::PayloadBuffer;
use crate::state::{DecoderState, DeviceMeta};
use crate::types::{CodecError, DecodeOutput, DownlinkFrame, DownlinkRequest, Result};

/// Decoding policy passed to plugins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Unknown unit codes are failures instead of flagged fallbacks
    pub strict_unit_codes: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            strict_unit_codes: true,
        }
    }
}

impl From<&CodecConfig> for DecodeOptions {
    fn from(config: &CodecConfig) -> Self {
        Self {
            strict_unit_codes: config.strict_unit_codes,
        }
    }
}

/// Everything a plugin sees during one decode call
#[derive(Debug)]
pub struct DecodeInput<'a> {
    pub payload: &'a PayloadBuffer,
    /// Effective device meta (event overrides over configured defaults)
    pub meta: &'a DeviceMeta,
    /// State returned by the previous call for this device
    pub state: DecoderState,
    pub options: DecodeOptions,
}

impl<'a> DecodeInput<'a> {
    /// Input with empty state and default options
    pub fn new(payload: &'a PayloadBuffer, meta: &'a DeviceMeta) -> Self {
        Self {
            payload,
            meta,
            state: DecoderState::default(),
            options: DecodeOptions::default(),
        }
    }

    pub fn with_state(mut self, state: DecoderState) -> Self {
        self.state = state;
        self
    }

    pub fn with_options(mut self, options: DecodeOptions) -> Self {
        self.options = options;
        self
    }
}

/// Uniform interface of device-specific codecs
///
/// Both operations default to `UnsupportedOperation`; a plugin overrides the
/// ones its device supports and reports them through the `supports_*` hooks.
pub trait DecoderPlugin: Send + Sync {
    /// Registry key, e.g. "gwf-coder"
    fn device_type(&self) -> &'static str;

    /// Human-readable description for listings
    fn description(&self) -> &'static str {
        ""
    }

    fn supports_decode(&self) -> bool {
        true
    }

    fn supports_encode(&self) -> bool {
        false
    }

    /// Decode one uplink payload
    ///
    /// On error no samples are emitted and the caller keeps its previous state.
    fn decode(&self, input: DecodeInput<'_>) -> Result<DecodeOutput> {
        let _ = input;
        Err(CodecError::UnsupportedOperation {
            device_type: self.device_type().to_string(),
            operation: "decode",
        })
    }

    /// Encode one downlink request
    fn encode(&self, request: &DownlinkRequest) -> Result<DownlinkFrame> {
        let _ = request;
        Err(CodecError::UnsupportedOperation {
            device_type: self.device_type().to_string(),
            operation: "encode",
        })
    }
}

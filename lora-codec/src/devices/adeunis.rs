//! Adeunis FTD-2 field test device, downlink side
//!
//! The FTD-2 accepts free-form downlinks. A text message is sent as its UTF-8
//! bytes; a JSON array of integers is sent byte for byte.

use crate::plugin::DecoderPlugin;
use crate::types::{CodecError, DownlinkFrame, DownlinkRequest, Result};

pub const DEVICE_TYPE: &str = "adeunis-ftd2";

/// FPort used when the request does not name one
pub const DEFAULT_PORT: u8 = 1;

/// Highest application FPort; 224 and up are reserved by LoRaWAN
const MAX_APP_PORT: u8 = 223;

fn message_bytes(message: &serde_json::Value) -> Result<Vec<u8>> {
    match message {
        serde_json::Value::String(text) => Ok(text.as_bytes().to_vec()),
        serde_json::Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                item.as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| {
                        CodecError::InvalidEncodeRequest(format!(
                            "byte {} ({}) is not an integer in 0..=255",
                            i, item
                        ))
                    })
            })
            .collect(),
        other => Err(CodecError::InvalidEncodeRequest(format!(
            "message must be a string or byte array, got {}",
            other
        ))),
    }
}

/// Downlink encoder for the FTD-2
#[derive(Debug, Clone, Copy, Default)]
pub struct Ftd2;

impl DecoderPlugin for Ftd2 {
    fn device_type(&self) -> &'static str {
        DEVICE_TYPE
    }

    fn description(&self) -> &'static str {
        "Adeunis FTD-2 field test device (downlink)"
    }

    fn supports_decode(&self) -> bool {
        false
    }

    fn supports_encode(&self) -> bool {
        true
    }

    fn encode(&self, request: &DownlinkRequest) -> Result<DownlinkFrame> {
        let port = request.port.unwrap_or(DEFAULT_PORT);
        if port == 0 || port > MAX_APP_PORT {
            return Err(CodecError::InvalidEncodeRequest(format!(
                "port {} outside 1..={}",
                port, MAX_APP_PORT
            )));
        }

        let bytes = message_bytes(&request.message)?;
        log::debug!("Encoded {} byte downlink on port {}", bytes.len(), port);

        Ok(DownlinkFrame {
            payload_hex: hex::encode(bytes),
            port,
            confirmed: request.confirmed.unwrap_or(false),
        })
    }
}

//! Decoder registry and dispatch
//!
//! The registry maps device-type keys to plugins and is the entry point for
//! hosts. It is built once (registration is not expected to change during
//! normal operation) and shared immutably across worker threads: all of its
//! methods take `&self`.

use std::collections::HashMap;

use crate::config::CodecConfig;
use crate::devices;
use crate::payload::PayloadBuffer;
use crate::plugin::{DecodeInput, DecodeOptions, DecoderPlugin};
use crate::state::StateStore;
use crate::types::{CodecError, DecodeOutput, DownlinkFrame, DownlinkRequest, Result, UplinkEvent};

/// The plugin registry - entry point for all decode and encode operations
pub struct DecoderRegistry {
    plugins: HashMap<&'static str, Box<dyn DecoderPlugin>>,
    config: CodecConfig,
}

impl DecoderRegistry {
    /// Create an empty registry with default configuration
    pub fn new() -> Self {
        Self::with_config(CodecConfig::default())
    }

    /// Create an empty registry with the given configuration
    pub fn with_config(config: CodecConfig) -> Self {
        Self {
            plugins: HashMap::new(),
            config,
        }
    }

    /// Create a registry holding every built-in plugin
    pub fn with_builtin_plugins(config: CodecConfig) -> Self {
        let mut registry = Self::with_config(config);
        for plugin in devices::builtin_plugins() {
            // Built-in device types are unique
            if let Err(e) = registry.register(plugin) {
                log::error!("Skipping built-in plugin: {}", e);
            }
        }
        log::info!("Registered {} built-in device plugins", registry.plugins.len());
        registry
    }

    /// Register a plugin under its device type
    ///
    /// Fails with `DuplicateDeviceType` if the key is taken.
    pub fn register(&mut self, plugin: Box<dyn DecoderPlugin>) -> Result<()> {
        let device_type = plugin.device_type();
        if self.plugins.contains_key(device_type) {
            return Err(CodecError::DuplicateDeviceType(device_type.to_string()));
        }

        log::debug!("Registering plugin for device type '{}'", device_type);
        self.plugins.insert(device_type, plugin);
        Ok(())
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Look up the plugin for a device type
    pub fn plugin(&self, device_type: &str) -> Result<&dyn DecoderPlugin> {
        self.plugins
            .get(device_type)
            .map(|p| p.as_ref())
            .ok_or_else(|| CodecError::UnknownDeviceType(device_type.to_string()))
    }

    /// Registered device types, sorted
    pub fn device_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.plugins.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Decode one uplink event
    ///
    /// The event's `state` is handed to the plugin and the updated state comes
    /// back in the output. On error nothing is emitted and the host keeps the
    /// state it already has.
    pub fn decode(&self, event: &UplinkEvent) -> Result<DecodeOutput> {
        let plugin = self.plugin(&event.device_type)?;
        log::debug!(
            "Decoding uplink from {} ({}), {} hex chars",
            event.device_id,
            event.device_type,
            event.payload_hex.len()
        );

        let payload = PayloadBuffer::from_hex(&event.payload_hex)?;
        let meta = self.config.resolve_meta(&event.device_type, &event.device_meta);
        let input = DecodeInput::new(&payload, &meta)
            .with_state(event.state.clone())
            .with_options(DecodeOptions::from(&self.config));

        let mut output = plugin.decode(input).map_err(|e| {
            log::debug!("Decode failed for {}: {}", event.device_id, e);
            e
        })?;

        output
            .samples
            .retain(|sample| self.config.should_emit_topic(&sample.topic));
        if let Some(at) = event.received_at {
            for sample in &mut output.samples {
                sample.timestamp = Some(at);
            }
        }

        Ok(output)
    }

    /// Decode through a state store, holding the device's lease for the call
    ///
    /// State stored for the device takes precedence over the event's own
    /// `state`, which only seeds devices the store has not seen yet. Fails with
    /// `StateConflict` if another call for the same device is in flight.
    pub fn process(&self, event: &UplinkEvent, store: &StateStore) -> Result<DecodeOutput> {
        store.seed(&event.device_id, event.state.clone());
        let lease = store.checkout(&event.device_id)?;

        let mut event = event.clone();
        event.state = lease.state().clone();

        let output = self.decode(&event)?;
        lease.commit(output.state.clone());
        Ok(output)
    }

    /// Encode a downlink for a device type
    pub fn encode(&self, device_type: &str, request: &DownlinkRequest) -> Result<DownlinkFrame> {
        let plugin = self.plugin(device_type)?;
        log::debug!("Encoding downlink for device type '{}'", device_type);
        plugin.encode(request)
    }

    /// Get statistics about the registered plugins
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            num_plugins: self.plugins.len(),
            num_decoders: self.plugins.values().filter(|p| p.supports_decode()).count(),
            num_encoders: self.plugins.values().filter(|p| p.supports_encode()).count(),
        }
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Total number of registered device types
    pub num_plugins: usize,
    /// Plugins that decode uplinks
    pub num_decoders: usize,
    /// Plugins that encode downlinks
    pub num_encoders: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Sample, SampleBuilder};

    /// Emits the first payload byte on "default" and a counter on "lifecycle"
    struct Echo;

    impl DecoderPlugin for Echo {
        fn device_type(&self) -> &'static str {
            "echo"
        }

        fn decode(&self, input: DecodeInput<'_>) -> Result<DecodeOutput> {
            let mut state = input.state;
            let calls = state.get_f64("calls").unwrap_or(0.0) + 1.0;
            state.set_f64("calls", calls);

            let mut data = SampleBuilder::new("default");
            data.set("first", input.payload.byte(0)?);
            let mut lifecycle = SampleBuilder::new("lifecycle");
            lifecycle.set("calls", calls);

            Ok(DecodeOutput {
                samples: [data.finish(), lifecycle.finish()]
                    .into_iter()
                    .flatten()
                    .collect(),
                state,
            })
        }
    }

    fn registry(config: CodecConfig) -> DecoderRegistry {
        let mut registry = DecoderRegistry::with_config(config);
        registry.register(Box::new(Echo)).unwrap();
        registry
    }

    #[test]
    fn test_empty_registry() {
        let registry = DecoderRegistry::new();
        let stats = registry.stats();
        assert_eq!(stats.num_plugins, 0);
        assert!(registry.device_types().is_empty());
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = registry(CodecConfig::new());
        assert_eq!(
            registry.register(Box::new(Echo)).unwrap_err(),
            CodecError::DuplicateDeviceType("echo".into())
        );
    }

    #[test]
    fn test_unknown_device_type() {
        let registry = registry(CodecConfig::new());
        let event = UplinkEvent::new("d1", "nope", "00");
        assert_eq!(
            registry.decode(&event).unwrap_err(),
            CodecError::UnknownDeviceType("nope".into())
        );
        assert!(matches!(
            registry.encode("nope", &DownlinkRequest::new("x")).unwrap_err(),
            CodecError::UnknownDeviceType(_)
        ));
    }

    #[test]
    fn test_malformed_hex_is_rejected_before_plugin() {
        let registry = registry(CodecConfig::new());
        let err = registry.decode(&UplinkEvent::new("d1", "echo", "0")).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn test_topic_filter_and_timestamp() {
        let registry = registry(CodecConfig::new().with_topic_filter(vec!["lifecycle".into()]));
        let at = chrono::DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let event = UplinkEvent::new("d1", "echo", "2a").with_received_at(at);

        let out = registry.decode(&event).unwrap();
        let topics: Vec<&str> = out.samples.iter().map(|s| s.topic.as_str()).collect();
        assert_eq!(topics, vec!["lifecycle"]);
        assert!(out.samples.iter().all(|s: &Sample| s.timestamp == Some(at)));
    }

    #[test]
    fn test_process_threads_state_through_store() {
        let registry = registry(CodecConfig::new());
        let store = StateStore::new();
        let event = UplinkEvent::new("d1", "echo", "01");

        registry.process(&event, &store).unwrap();
        let out = registry.process(&event, &store).unwrap();
        assert_eq!(out.state.get_f64("calls"), Some(2.0));
        assert_eq!(store.get("d1").unwrap().get_f64("calls"), Some(2.0));
    }

    #[test]
    fn test_failed_decode_keeps_stored_state() {
        let registry = registry(CodecConfig::new());
        let store = StateStore::new();
        registry.process(&UplinkEvent::new("d1", "echo", "01"), &store).unwrap();

        // empty payload: the plugin cannot read byte 0
        assert!(registry.process(&UplinkEvent::new("d1", "echo", ""), &store).is_err());
        assert_eq!(store.get("d1").unwrap().get_f64("calls"), Some(1.0));
        // the lease was released
        assert!(store.checkout("d1").is_ok());
    }

    #[test]
    fn test_process_conflicts_with_outstanding_lease() {
        let registry = registry(CodecConfig::new());
        let store = StateStore::new();
        let _held = store.checkout("d1").unwrap();
        assert_eq!(
            registry.process(&UplinkEvent::new("d1", "echo", "01"), &store).unwrap_err(),
            CodecError::StateConflict("d1".into())
        );
    }

    #[test]
    fn test_builtin_registry_stats() {
        let registry = DecoderRegistry::with_builtin_plugins(CodecConfig::new());
        let stats = registry.stats();
        assert_eq!(stats.num_plugins, 4);
        assert_eq!(stats.num_decoders, 3);
        assert_eq!(stats.num_encoders, 1);
        assert_eq!(
            registry.device_types(),
            vec!["adeunis-ftd2", "decentlab-kl66", "decentlab-pr26", "gwf-coder"]
        );
    }
}

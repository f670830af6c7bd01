//! Codec configuration types
//!
//! This module defines the configuration a host hands to the registry. It only
//! covers decoding policy; which device uses which plugin is decided by the
//! `deviceType` of each uplink.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::state::DeviceMeta;

/// Configuration for the decoder registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Fail on unknown unit codes instead of emitting unscaled values
    #[serde(default = "default_true")]
    pub strict_unit_codes: bool,

    /// Optional: only return samples with these topics
    #[serde(default)]
    pub topic_filter: Option<Vec<String>>,

    /// Meta defaults per device type, below the event's own device meta
    #[serde(default)]
    pub device_defaults: BTreeMap<String, DeviceMeta>,
}

fn default_true() -> bool {
    true
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            strict_unit_codes: true,
            topic_filter: None,
            device_defaults: BTreeMap::new(),
        }
    }
}

impl CodecConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: enable or disable strict unit code handling
    pub fn with_strict_unit_codes(mut self, strict: bool) -> Self {
        self.strict_unit_codes = strict;
        self
    }

    /// Builder method: set topic filter
    pub fn with_topic_filter(mut self, topics: Vec<String>) -> Self {
        self.topic_filter = Some(topics);
        self
    }

    /// Builder method: set a meta default for a device type
    pub fn with_device_default(
        mut self,
        device_type: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.device_defaults
            .entry(device_type.into())
            .or_default()
            .insert(key, value);
        self
    }

    /// Check if a sample topic should be returned
    pub fn should_emit_topic(&self, topic: &str) -> bool {
        match &self.topic_filter {
            Some(topics) => topics.iter().any(|t| t == topic),
            None => true,
        }
    }

    /// Effective meta for one event: event meta over device-type defaults
    pub fn resolve_meta(&self, device_type: &str, event_meta: &DeviceMeta) -> DeviceMeta {
        match self.device_defaults.get(device_type) {
            Some(defaults) => event_meta.layered_over(defaults),
            None => event_meta.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_config_builder() {
        let config = CodecConfig::new()
            .with_strict_unit_codes(false)
            .with_topic_filter(vec!["default".to_string()])
            .with_device_default("decentlab-kl66", "f0", 15000.0);

        assert!(!config.strict_unit_codes);
        assert_eq!(config.topic_filter, Some(vec!["default".to_string()]));
        assert_eq!(
            config.device_defaults["decentlab-kl66"].get_f64("f0"),
            Some(15000.0)
        );
    }

    #[test]
    fn test_filter_logic() {
        let config = CodecConfig::new().with_topic_filter(vec!["lifecycle".to_string()]);
        assert!(config.should_emit_topic("lifecycle"));
        assert!(!config.should_emit_topic("default"));
    }

    #[test]
    fn test_no_filters() {
        let config = CodecConfig::new();
        assert!(config.strict_unit_codes);
        assert!(config.should_emit_topic("default"));
        assert!(config.should_emit_topic("anything"));
    }

    #[test]
    fn test_resolve_meta_prefers_event() {
        let config = CodecConfig::new()
            .with_device_default("decentlab-kl66", "f0", 1.0)
            .with_device_default("decentlab-kl66", "k", 2.0);
        let event: DeviceMeta = [("f0", 9.0)].into_iter().collect();

        let meta = config.resolve_meta("decentlab-kl66", &event);
        assert_eq!(meta.get_f64("f0"), Some(9.0));
        assert_eq!(meta.get_f64("k"), Some(2.0));

        let untouched = config.resolve_meta("gwf-coder", &event);
        assert_eq!(untouched, event);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: CodecConfig = serde_json::from_str(r#"{"topic_filter": ["default"]}"#).unwrap();
        assert!(config.strict_unit_codes);
        assert!(config.device_defaults.is_empty());
    }
}

//! Per-device state and metadata
//!
//! [`DecoderState`] is the only mutable resource shared between decode calls.
//! The host owns it between calls; a plugin receives it by value, and returns
//! the updated state in its [`DecodeOutput`](crate::DecodeOutput).
//!
//! [`StateStore`] is an in-memory host-side helper enforcing at most one
//! in-flight decode per device id. A second checkout of the same id while a
//! lease is outstanding fails with [`CodecError::StateConflict`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::types::{CodecError, Result};

/// Key-value state persisted by the host between decode calls
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecoderState(BTreeMap<String, serde_json::Value>);

impl DecoderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Numeric entry; `None` when unset or not a number
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(serde_json::Value::as_f64)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Store a number; non-finite values cannot be represented and clear the key
    pub fn set_f64(&mut self, key: &str, value: f64) {
        match serde_json::Number::from_f64(value) {
            Some(n) => {
                self.0.insert(key.to_string(), serde_json::Value::Number(n));
            }
            None => {
                log::warn!("Dropping non-finite state value {} for '{}'", value, key);
                self.0.remove(key);
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<serde_json::Value>> FromIterator<(K, V)> for DecoderState {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Per-device overrides of plugin constants (calibration parameters etc.)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceMeta(BTreeMap<String, serde_json::Value>);

impl DeviceMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Numeric override, accepting numbers and numeric strings
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Numeric override or the plugin's built-in default
    pub fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.get_f64(key).unwrap_or(default)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Combine two layers; entries of `self` win over `fallback`
    pub fn layered_over(&self, fallback: &DeviceMeta) -> DeviceMeta {
        let mut merged = fallback.0.clone();
        merged.extend(self.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        DeviceMeta(merged)
    }
}

impl<K: Into<String>, V: Into<serde_json::Value>> FromIterator<(K, V)> for DeviceMeta {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    states: HashMap<String, DecoderState>,
    in_flight: HashSet<String>,
}

/// Thread-safe per-device state map with exclusive leases
#[derive(Debug, Default)]
pub struct StateStore {
    inner: Mutex<StoreInner>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // A panic while holding the lock cannot leave the maps half-updated
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed the state of a device that has no stored state yet
    pub fn seed(&self, device_id: &str, state: DecoderState) {
        self.lock()
            .states
            .entry(device_id.to_string())
            .or_insert(state);
    }

    /// Take the exclusive lease on a device's state
    pub fn checkout(&self, device_id: &str) -> Result<StateLease<'_>> {
        let mut inner = self.lock();
        if !inner.in_flight.insert(device_id.to_string()) {
            log::error!("Concurrent decode detected for device {}", device_id);
            return Err(CodecError::StateConflict(device_id.to_string()));
        }

        let state = inner.states.get(device_id).cloned().unwrap_or_default();
        Ok(StateLease {
            store: self,
            device_id: device_id.to_string(),
            state,
            released: false,
        })
    }

    /// Snapshot of a device's committed state
    pub fn get(&self, device_id: &str) -> Option<DecoderState> {
        self.lock().states.get(device_id).cloned()
    }

    /// Snapshot of all committed states
    pub fn snapshot(&self) -> BTreeMap<String, DecoderState> {
        self.lock()
            .states
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, device_id: &str, committed: Option<DecoderState>) {
        let mut inner = self.lock();
        if let Some(state) = committed {
            inner.states.insert(device_id.to_string(), state);
        }
        inner.in_flight.remove(device_id);
    }
}

/// Exclusive access to one device's state for the duration of a decode
///
/// Dropping the lease without [`commit`](Self::commit) releases the device
/// and keeps its previous state.
#[derive(Debug)]
pub struct StateLease<'a> {
    store: &'a StateStore,
    device_id: String,
    state: DecoderState,
    released: bool,
}

impl StateLease<'_> {
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// State committed by the previous call
    pub fn state(&self) -> &DecoderState {
        &self.state
    }

    /// Persist the new state and release the device
    pub fn commit(mut self, state: DecoderState) {
        self.store.release(&self.device_id, Some(state));
        self.released = true;
    }
}

impl Drop for StateLease<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.store.release(&self.device_id, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_numeric_access() {
        let mut state = DecoderState::new();
        assert_eq!(state.get_f64("lastVolume"), None);
        state.set_f64("lastVolume", 50.0);
        assert_eq!(state.get_f64("lastVolume"), Some(50.0));
        state.set_f64("lastVolume", f64::NAN);
        assert_eq!(state.get_f64("lastVolume"), None);
    }

    #[test]
    fn test_state_json_is_flat() {
        let state: DecoderState = [("lastVolume", 50.0)].into_iter().collect();
        assert_eq!(serde_json::to_string(&state).unwrap(), r#"{"lastVolume":50.0}"#);
    }

    #[test]
    fn test_meta_lookup_and_layering() {
        let device: DeviceMeta = [("f0", serde_json::json!("15000.5"))].into_iter().collect();
        let defaults: DeviceMeta = [("f0", 1.0), ("k", 2.0)].into_iter().collect();

        assert_eq!(device.get_f64("f0"), Some(15000.5));
        assert_eq!(device.f64_or("k", 46.4859), 46.4859);

        let merged = device.layered_over(&defaults);
        assert_eq!(merged.get_f64("f0"), Some(15000.5));
        assert_eq!(merged.get_f64("k"), Some(2.0));
    }

    #[test]
    fn test_lease_commit_persists_state() {
        let store = StateStore::new();
        let lease = store.checkout("meter-1").unwrap();
        assert!(lease.state().is_empty());

        let mut next = lease.state().clone();
        next.set_f64("lastVolume", 12.0);
        lease.commit(next);

        assert_eq!(store.get("meter-1").unwrap().get_f64("lastVolume"), Some(12.0));
    }

    #[test]
    fn test_second_checkout_conflicts() {
        let store = StateStore::new();
        let _lease = store.checkout("meter-1").unwrap();
        assert_eq!(
            store.checkout("meter-1").unwrap_err(),
            CodecError::StateConflict("meter-1".to_string())
        );
        // Other devices are independent
        assert!(store.checkout("meter-2").is_ok());
    }

    #[test]
    fn test_dropped_lease_keeps_previous_state() {
        let store = StateStore::new();
        store.seed("meter-1", [("lastVolume", 5.0)].into_iter().collect());
        {
            let _lease = store.checkout("meter-1").unwrap();
        }
        let lease = store.checkout("meter-1").unwrap();
        assert_eq!(lease.state().get_f64("lastVolume"), Some(5.0));
    }

    #[test]
    fn test_seed_does_not_overwrite() {
        let store = StateStore::new();
        store.seed("a", [("x", 1)].into_iter().collect());
        store.seed("a", [("x", 2)].into_iter().collect());
        assert_eq!(store.get("a").unwrap().get_f64("x"), Some(1.0));
        assert_eq!(store.len(), 1);
    }
}

//! Stateful counter normalization
//!
//! Devices report cumulative counters (total volume, pulse count). The
//! normalizer turns them into per-report increments using a baseline kept in
//! [`DecoderState`].
//!
//! A reset is inferred only from a reading lower than the baseline. The first
//! report after a reset (or a wraparound, which looks identical) yields an
//! increment of zero and re-baselines; consumption during the transition is
//! lost. Several payload formats depend on exactly this behaviour.

use crate::state::DecoderState;

/// Counter normalizer bound to one state key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterNormalizer {
    state_key: &'static str,
}

impl CounterNormalizer {
    pub const fn new(state_key: &'static str) -> Self {
        Self { state_key }
    }

    pub fn state_key(&self) -> &'static str {
        self.state_key
    }

    /// Increment since the last reading, updating the baseline
    pub fn normalize(&self, state: &mut DecoderState, current: f64) -> f64 {
        let baseline = match state.get_f64(self.state_key) {
            None => {
                log::debug!("No '{}' baseline yet, starting at {}", self.state_key, current);
                current
            }
            Some(last) if last > current => {
                log::warn!(
                    "Counter '{}' went backwards ({} -> {}), treating as reset",
                    self.state_key,
                    last,
                    current
                );
                current
            }
            Some(last) => last,
        };

        let increment = current - baseline;
        state.set_f64(self.state_key, current);
        increment
    }
}

//! Sound mix-bus abstraction.
//!
//! Each instance plays through its own bus, named `"<Class>-<id>"`, so
//! clones can have different volumes. The runtime keeps the gain table and
//! tells the mix bus about changes; actual audio is the host's business.

use std::collections::BTreeMap;
use std::fmt;

/// Handle to one playing sound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PerformanceId(pub u64);

impl fmt::Display for PerformanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "performance {}", self.0)
    }
}

/// Where a performance is up to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PerformanceStatus {
    Playing,
    Finished,
    Failed(String),
}

/// Host audio output.
pub trait MixBus {
    /// Start playing `locator` on `bus`.
    fn play(&mut self, bus: &str, locator: &str) -> PerformanceId;

    /// Progress of a performance started with [`MixBus::play`].
    fn status(&self, performance: PerformanceId) -> PerformanceStatus;

    /// Change a bus gain.
    fn set_gain(&mut self, bus: &str, gain: f64);

    /// Silence everything.
    fn stop_all_performances(&mut self);
}

/// Mix bus with no audio output; every performance finishes at once.
#[derive(Debug, Default)]
pub struct SilentMixBus {
    next_id: u64,
}

impl MixBus for SilentMixBus {
    fn play(&mut self, bus: &str, locator: &str) -> PerformanceId {
        self.next_id += 1;
        log::debug!("[SOUND] (silent) {} plays {}", bus, locator);
        PerformanceId(self.next_id)
    }

    fn status(&self, _performance: PerformanceId) -> PerformanceStatus {
        PerformanceStatus::Finished
    }

    fn set_gain(&mut self, _bus: &str, _gain: f64) {}

    fn stop_all_performances(&mut self) {}
}

/// Gain table, keyed by bus id.
#[derive(Debug, Default)]
pub(crate) struct GainTable {
    gains: BTreeMap<String, f64>,
}

impl GainTable {
    /// Gain of a bus; buses start at full volume.
    pub fn get(&self, bus: &str) -> f64 {
        self.gains.get(bus).copied().unwrap_or(1.0)
    }

    /// Store a gain clamped into [0, 1], returning what was stored.
    pub fn set(&mut self, bus: &str, gain: f64) -> f64 {
        let clamped = if gain.is_nan() { 0.0 } else { gain.clamp(0.0, 1.0) };
        self.gains.insert(bus.to_string(), clamped);
        clamped
    }

    pub fn remove(&mut self, bus: &str) {
        self.gains.remove(bus);
    }
}

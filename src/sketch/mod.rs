//! Streaming summaries.
//!
//! Numeric signals (scores, embedding components, latencies) go into
//! t-digest quantile sketches; class labels go into a frequent-items sketch. Both are
//! bounded in memory regardless of stream length and serialize to the
//! DataSketches binary format, so the `.bin` files can be read by any
//! DataSketches implementation on the collector side.
//!
//! Summaries are updated through `&self` so that a producer can hold an
//! `Arc` handle while the persistence registry serializes the same instance.

use datasketches::frequencies::{ErrorType, FrequentItemsSketch};
use datasketches::tdigest::TDigestMut;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Max map size of the global class-frequency sketch.
pub const CLASS_FREQUENCY_MAP_SIZE: usize = 64;

/// t-digest compression used unless a caller asks for another.
pub const DEFAULT_COMPRESSION: u16 = 200;

/// Smallest compression the t-digest accepts.
pub const MIN_COMPRESSION: u16 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SummaryKind {
    Quantile,
    Frequency,
}

/// Anything the registry can write to disk.
pub trait Persistable: Send + Sync {
    fn kind(&self) -> SummaryKind;

    /// Serialized form of the current state.
    fn to_bytes(&self) -> Vec<u8>;
}

struct QuantileState {
    sketch: TDigestMut,
    updates: u64,
}

/// Rank/quantile summary over a stream of floats.
pub struct QuantileSummary {
    state: Mutex<QuantileState>,
}

impl QuantileSummary {
    pub fn new() -> Self {
        Self::with_compression(DEFAULT_COMPRESSION)
    }

    /// Values below [`MIN_COMPRESSION`] are raised to it.
    pub fn with_compression(k: u16) -> Self {
        Self {
            state: Mutex::new(QuantileState {
                sketch: TDigestMut::new(k.max(MIN_COMPRESSION)),
                updates: 0,
            }),
        }
    }

    /// Non-finite values are dropped; they carry no rank information.
    pub fn update(&self, value: f32) {
        if !value.is_finite() {
            return;
        }
        let mut state = self.state.lock();
        state.sketch.update(value as f64);
        state.updates += 1;
    }

    /// Feeds a whole vector under one lock acquisition.
    pub fn update_all(&self, values: &[f32]) {
        let mut state = self.state.lock();
        for value in values.iter().copied().filter(|v| v.is_finite()) {
            state.sketch.update(value as f64);
            state.updates += 1;
        }
    }

    /// Number of values accepted so far.
    pub fn count(&self) -> u64 {
        self.state.lock().updates
    }

    /// Approximate value at `rank` in [0, 1]. `None` before the first update.
    pub fn quantile(&self, rank: f64) -> Option<f64> {
        self.state.lock().sketch.quantile(rank)
    }
}

impl Default for QuantileSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl Persistable for QuantileSummary {
    fn kind(&self) -> SummaryKind {
        SummaryKind::Quantile
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.state.lock().sketch.serialize()
    }
}

struct FrequencyState {
    sketch: FrequentItemsSketch<String>,
    updates: u64,
}

/// Heavy-hitter summary over string labels.
pub struct FrequencySummary {
    state: Mutex<FrequencyState>,
}

impl FrequencySummary {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FrequencyState {
                sketch: FrequentItemsSketch::<String>::new(CLASS_FREQUENCY_MAP_SIZE as _),
                updates: 0,
            }),
        }
    }

    pub fn update(&self, item: String) {
        let mut state = self.state.lock();
        state.sketch.update(item);
        state.updates += 1;
    }

    pub fn count(&self) -> u64 {
        self.state.lock().updates
    }

    pub fn estimate(&self, item: &str) -> u64 {
        self.state.lock().sketch.estimate(&item.to_string()) as u64
    }

    /// Most frequent items, highest estimate first, at most `limit` of them.
    pub fn top(&self, limit: usize) -> Vec<(String, u64)> {
        let state = self.state.lock();
        let mut items: Vec<(String, u64)> = state
            .sketch
            .frequent_items(ErrorType::NoFalseNegatives)
            .iter()
            .map(|row| {
                let item = row.item().clone();
                let estimate = state.sketch.estimate(&item) as u64;
                (item, estimate)
            })
            .collect();
        items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        items.truncate(limit);
        items
    }
}

impl Default for FrequencySummary {
    fn default() -> Self {
        Self::new()
    }
}

impl Persistable for FrequencySummary {
    fn kind(&self) -> SummaryKind {
        SummaryKind::Frequency
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.state.lock().sketch.serialize()
    }
}

//! Queue occupancy and throughput samples.

use serde::{Deserialize, Serialize};

/// Capacity maxima of the three observed stages (first table row)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCapacities {
    pub buffer_capacity: usize,
    pub construction_queue_capacity: usize,
    pub writing_queue_capacity: usize,
}

/// One timestamped reading of every stage depth
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueOccupancySample {
    /// Milliseconds since acquisition start
    pub elapsed_ms: u64,
    /// Hardware ring buffer fill level
    pub buffer_depth: usize,
    /// Construction queue depth
    pub construction_queue_depth: usize,
    /// Storage writing queue depth
    pub writing_queue_depth: usize,
}

/// Cumulative bytes written at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThroughputSample {
    /// Milliseconds since acquisition start
    pub timestamp_ms: u64,
    pub cumulative_bytes_written: u64,
}

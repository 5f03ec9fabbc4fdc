use crate::domain::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Well-known stage names recorded along a frame's journey.
pub mod stage {
    pub const CAPTURE: &str = "capture";
    pub const EDGE_RECEIVED: &str = "edge_received";
    pub const EDGE_FILTERED: &str = "edge_filtered";
    pub const EDGE_SENT: &str = "edge_sent";
    pub const ALARM_RECEIVED: &str = "alarm_received";
}

/// Nanosecond clock that never goes backwards within a process.
///
/// Anchored once to the wall clock so instants from different hosts are
/// comparable to wall-clock accuracy, then advanced with `Instant`.
pub struct MonotonicClock;

struct ClockAnchor {
    instant: Instant,
    unix_ns: u64,
}

static ANCHOR: OnceLock<ClockAnchor> = OnceLock::new();

impl MonotonicClock {
    pub fn now_ns() -> u64 {
        let anchor = ANCHOR.get_or_init(|| ClockAnchor {
            instant: Instant::now(),
            unix_ns: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or_default(),
        });
        anchor.unix_ns + anchor.instant.elapsed().as_nanos() as u64
    }
}

/// Latency ledger threaded through every hop of a single frame.
///
/// The value is never mutated in place: each hop derives a new context with
/// its own stage added. A stage, once recorded, cannot be rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    trace_id: String,
    #[serde(default)]
    timestamps: BTreeMap<String, u64>,
}

impl TraceContext {
    /// Start a new trace with a fresh id and no stages.
    pub fn begin() -> Self {
        Self {
            trace_id: xid::new().to_string(),
            timestamps: BTreeMap::new(),
        }
    }

    /// Start a new trace and record its first stage now.
    pub fn begin_at(stage: &str) -> Self {
        let mut trace = Self::begin();
        trace
            .timestamps
            .insert(stage.to_string(), MonotonicClock::now_ns());
        trace
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn timestamp(&self, stage: &str) -> Option<u64> {
        self.timestamps.get(stage).copied()
    }

    pub fn has_stage(&self, stage: &str) -> bool {
        self.timestamps.contains_key(stage)
    }

    pub fn timestamps(&self) -> &BTreeMap<String, u64> {
        &self.timestamps
    }

    /// Derive a context with `stage` recorded at `at_ns`.
    pub fn with_stage(&self, stage: &str, at_ns: u64) -> DomainResult<Self> {
        if self.has_stage(stage) {
            return Err(DomainError::TraceStageAlreadyRecorded {
                trace_id: self.trace_id.clone(),
                stage: stage.to_string(),
            });
        }

        let mut timestamps = self.timestamps.clone();
        timestamps.insert(stage.to_string(), at_ns);

        Ok(Self {
            trace_id: self.trace_id.clone(),
            timestamps,
        })
    }

    /// Derive a context with `stage` recorded at the current instant.
    pub fn stamp(&self, stage: &str) -> DomainResult<Self> {
        self.with_stage(stage, MonotonicClock::now_ns())
    }

    /// Elapsed nanoseconds between two recorded stages, if both exist and are ordered.
    pub fn latency_ns(&self, from: &str, to: &str) -> Option<u64> {
        let start = self.timestamp(from)?;
        let end = self.timestamp(to)?;
        end.checked_sub(start)
    }
}

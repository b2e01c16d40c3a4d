//! In-process telemetry: a typed `DecisionEvent` per pipeline stage kept in a bounded
//! ring (no persistence, per spec Non-goals), plus running counters. Grounded on the
//! teacher's `utils::output_bus()` broadcast channel, simplified to a ring buffer
//! since this core has no cross-handler fan-out requirement.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use tracing::info;

const DEFAULT_RING_CAPACITY: usize = 512;

#[derive(Clone, Debug)]
pub struct DecisionEvent {
    pub stage: String,
    pub session_id: Option<String>,
    pub tool_name: Option<String>,
    pub detail: JsonValue,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default)]
pub struct Stats {
    pub calls_processed: u64,
    pub workflows_triggered: u64,
    pub overrides_fired: u64,
    pub firewall_blocks: u64,
    pub firewall_auto_fixes: u64,
}

pub struct TelemetryLogger {
    ring: VecDeque<DecisionEvent>,
    capacity: usize,
    stats: Stats,
}

impl Default for TelemetryLogger {
    fn default() -> Self {
        Self::new(DEFAULT_RING_CAPACITY)
    }
}

impl TelemetryLogger {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            stats: Stats::default(),
        }
    }

    pub fn record(&mut self, stage: &str, session_id: Option<&str>, tool_name: Option<&str>, detail: JsonValue) {
        info!(stage, session_id, tool_name, "router stage");
        let event = DecisionEvent {
            stage: stage.to_string(),
            session_id: session_id.map(str::to_string),
            tool_name: tool_name.map(str::to_string),
            detail,
            at: Utc::now(),
        };
        if self.ring.len() >= self.capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(event);
    }

    pub fn recent(&self) -> impl Iterator<Item = &DecisionEvent> {
        self.ring.iter()
    }

    pub fn note_call_processed(&mut self) {
        self.stats.calls_processed += 1;
    }

    pub fn note_workflow_triggered(&mut self) {
        self.stats.workflows_triggered += 1;
    }

    pub fn note_override_fired(&mut self) {
        self.stats.overrides_fired += 1;
    }

    pub fn note_firewall_block(&mut self) {
        self.stats.firewall_blocks += 1;
    }

    pub fn note_firewall_auto_fix(&mut self) {
        self.stats.firewall_auto_fixes += 1;
    }

    pub fn stats(&self) -> Stats {
        self.stats.clone()
    }

    pub fn reset_stats(&mut self) {
        self.stats = Stats::default();
    }
}

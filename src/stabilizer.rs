use crate::barcode::RawDetection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::trace;

pub const DEFAULT_VOTE_THRESHOLD: u32 = 10;

/// When a value that crossed the threshold is emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitPolicy {
    /// Every frame at or past the threshold emits
    #[default]
    EveryFrame,
    /// Only the frame that reaches the threshold emits
    Once,
}

/// Per-session vote counts keyed by raw value
#[derive(Debug, Default, Clone)]
pub struct VoteTable {
    votes: HashMap<String, u32>,
}

impl VoteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one vote and return the new count
    pub fn vote(&mut self, raw_value: &str) -> u32 {
        let count = self.votes.entry(raw_value.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub fn votes(&self, raw_value: &str) -> u32 {
        self.votes.get(raw_value).copied().unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.votes.clear();
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }
}

/// Vote-counting filter that turns per-frame detections into confirmed ones.
///
/// Detections without a raw value always pass. Every other detection adds a
/// vote for its value and passes once the count reaches the threshold.
/// Counts only reset on [`StabilizationFilter::reset`].
#[derive(Debug, Clone)]
pub struct StabilizationFilter {
    table: VoteTable,
    threshold: u32,
    policy: EmitPolicy,
}

impl Default for StabilizationFilter {
    fn default() -> Self {
        Self::new(DEFAULT_VOTE_THRESHOLD, EmitPolicy::default())
    }
}

impl StabilizationFilter {
    pub fn new(threshold: u32, policy: EmitPolicy) -> Self {
        Self {
            table: VoteTable::new(),
            threshold: threshold.max(1),
            policy,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn policy(&self) -> EmitPolicy {
        self.policy
    }

    pub fn table(&self) -> &VoteTable {
        &self.table
    }

    /// Filter one frame's detections, keeping their order
    pub fn filter(&mut self, detections: Vec<RawDetection>) -> Vec<RawDetection> {
        detections
            .into_iter()
            .filter(|detection| self.admit(detection))
            .collect()
    }

    fn admit(&mut self, detection: &RawDetection) -> bool {
        let Some(raw_value) = detection.raw_value.as_deref() else {
            return true;
        };

        let count = self.table.vote(raw_value);
        trace!("Vote {} for {:?}", count, raw_value);

        match self.policy {
            EmitPolicy::EveryFrame => count >= self.threshold,
            EmitPolicy::Once => count == self.threshold,
        }
    }

    pub fn reset(&mut self) {
        self.table.clear();
    }
}

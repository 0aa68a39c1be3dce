//! Majority vote over learning samples
//!
//! Samples are grouped by exact `(value, bits, protocol)` match. Each sample
//! lands in exactly one group, the largest group wins, and ties go to the
//! group whose first sample was collected earliest.

use crate::protocol::Protocol;

/// One accepted capture in a learning session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LearningSample {
    pub value: u32,
    pub bits: u16,
    pub protocol: Protocol,
    pub captured_at_millis: u64,
}

impl LearningSample {
    fn key(&self) -> (u32, u16, Protocol) {
        (self.value, self.bits, self.protocol)
    }
}

/// Result of a vote
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Consensus {
    pub protocol: Protocol,
    pub value: u32,
    pub bits: u16,
    /// Samples in the winning group
    pub count: usize,
    /// Samples voted over
    pub total: usize,
    /// Index of the winning group in first-seen order
    pub group: usize,
    /// `count / total * 100`
    pub reliability: f32,
}

/// Distinct groups in first-seen order with their sizes
pub fn group_counts(samples: &[LearningSample]) -> Vec<(LearningSample, usize)> {
    let mut groups: Vec<(LearningSample, usize)> = Vec::new();
    for sample in samples {
        match groups.iter_mut().find(|(g, _)| g.key() == sample.key()) {
            Some((_, n)) => *n += 1,
            None => groups.push((*sample, 1)),
        }
    }
    groups
}

/// Pick the majority signal. `None` for an empty sample set.
pub fn consensus(samples: &[LearningSample]) -> Option<Consensus> {
    let groups = group_counts(samples);
    let mut best: Option<(usize, &LearningSample, usize)> = None;
    for (index, (sample, count)) in groups.iter().enumerate() {
        // strict comparison keeps the earliest group on ties
        if best.map_or(true, |(_, _, c)| *count > c) {
            best = Some((index, sample, *count));
        }
    }

    let (group, sample, count) = best?;
    let total = samples.len();
    Some(Consensus {
        protocol: sample.protocol,
        value: sample.value,
        bits: sample.bits,
        count,
        total,
        group,
        reliability: count as f32 / total as f32 * 100.0,
    })
}

//! Mark/space timing sequences
//!
//! A captured IR frame is an alternating list of mark (carrier on) and space
//! (carrier off) durations in microseconds. Index 0 is always a mark.

use std::ops::Deref;

use crate::error::IrError;

/// Maximum number of durations kept per signal
pub const MAX_TIMING_LEN: usize = 256;

const FNV_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// Bounded sequence of microsecond durations, alternating mark/space.
///
/// An empty sequence means "no raw capture available".
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct TimingSequence(Vec<u16>);

impl TimingSequence {
    /// Empty sequence
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Copy at most [`MAX_TIMING_LEN`] durations from `durations`.
    pub fn from_slice_truncated(durations: &[u16]) -> Self {
        let n = durations.len().min(MAX_TIMING_LEN);
        Self(durations[..n].to_vec())
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<u16> {
        self.0
    }

    /// Number of mark/space pairs, counting an unmatched final mark as a pair
    pub fn pair_count(&self) -> usize {
        (self.0.len() + 1) / 2
    }

    /// Summary statistics, `None` for an empty sequence
    pub fn stats(&self) -> Option<TimingStats> {
        let min = *self.0.iter().min()?;
        let max = *self.0.iter().max()?;
        let total_us: u32 = self.0.iter().map(|&d| d as u32).sum();
        Some(TimingStats {
            min,
            max,
            total_us,
            mean_us: total_us / self.0.len() as u32,
        })
    }

    /// 32-bit FNV-1a hash over the shape of the frame.
    ///
    /// Each duration is compared with the one two places later (same
    /// polarity) and classified shorter / similar / longer with a 20%
    /// tolerance, so captures of the same button hash identically despite
    /// jitter. Sequences shorter than 3 durations hash to the basis.
    pub fn fingerprint(&self) -> u32 {
        let mut hash = FNV_BASIS;
        for w in self.0.windows(3) {
            let class = compare_durations(w[0], w[2]);
            hash = hash.wrapping_mul(FNV_PRIME) ^ class;
        }
        hash
    }
}

fn compare_durations(old: u16, new: u16) -> u32 {
    let (old, new) = (old as u32, new as u32);
    if new * 10 < old * 8 {
        0
    } else if old * 10 < new * 8 {
        2
    } else {
        1
    }
}

impl Deref for TimingSequence {
    type Target = [u16];

    fn deref(&self) -> &[u16] {
        &self.0
    }
}

impl TryFrom<Vec<u16>> for TimingSequence {
    type Error = IrError;

    fn try_from(durations: Vec<u16>) -> Result<Self, Self::Error> {
        if durations.len() > MAX_TIMING_LEN {
            return Err(IrError::invalid(format!(
                "timing length {} exceeds {}",
                durations.len(),
                MAX_TIMING_LEN
            )));
        }
        Ok(Self(durations))
    }
}

impl From<&[u16]> for TimingSequence {
    fn from(durations: &[u16]) -> Self {
        Self::from_slice_truncated(durations)
    }
}

/// Timing characteristics of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingStats {
    /// Shortest pulse (µs)
    pub min: u16,
    /// Longest pulse (µs)
    pub max: u16,
    /// Total frame duration (µs)
    pub total_us: u32,
    /// Average pulse length (µs)
    pub mean_us: u32,
}

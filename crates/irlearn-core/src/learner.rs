//! Learning sessions
//!
//! ```text
//!  start            MAX reached / stop / timeout with >= MIN samples
//! Idle ──────▶ Collecting ─────────────────────────────────▶ Finalizing ──▶ Idle
//!                  │                                                        ▲
//!                  └──────── stop / timeout with < MIN samples ─────────────┘
//! ```
//!
//! The learner never reads the clock itself: the control loop passes the
//! current time into [`ConsensusLearner::offer`] and [`ConsensusLearner::poll`].
//! Finalizing hands the winning signal to a [`SignalSink`] (normally the
//! [`crate::store::SlotStore`]) and always returns to `Idle`, whether or not
//! the sink accepted it.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::consensus::{self, Consensus, LearningSample};
use crate::error::{IrError, IrResult};
use crate::hal::CapturedSignal;
use crate::protocol::Protocol;
use crate::store::{SignalId, SignalSink};
use crate::timing::TimingSequence;

/// Sample buffer capacity
pub const MAX_SAMPLES: usize = 20;

/// Fewest samples a session may conclude with
pub const MIN_SAMPLES: usize = 5;

/// Session timeout
pub const LEARNING_TIMEOUT_MS: u64 = 30_000;

/// Minimum gap between accepted samples
pub const SAMPLE_INTERVAL_MS: u64 = 200;

/// Which raw timing is stored with the winning signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingSource {
    /// Most recent timing captured for the winning group
    #[default]
    WinningGroup,
    /// Whatever the decoder captured last in the session
    LastCapture,
}

/// Learning session parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub max_samples: usize,
    pub min_samples: usize,
    pub timeout_ms: u64,
    pub sample_interval_ms: u64,
    pub timing_source: TimingSource,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            max_samples: MAX_SAMPLES,
            min_samples: MIN_SAMPLES,
            timeout_ms: LEARNING_TIMEOUT_MS,
            sample_interval_ms: SAMPLE_INTERVAL_MS,
            timing_source: TimingSource::WinningGroup,
        }
    }
}

impl LearningConfig {
    pub fn validate(&self) -> IrResult<()> {
        if self.min_samples == 0 {
            return Err(IrError::Config("learning.min_samples must be at least 1".into()));
        }
        if self.max_samples > MAX_SAMPLES {
            return Err(IrError::Config(format!(
                "learning.max_samples {} exceeds buffer capacity {}",
                self.max_samples, MAX_SAMPLES
            )));
        }
        if self.min_samples > self.max_samples {
            return Err(IrError::Config(format!(
                "learning.min_samples {} exceeds max_samples {}",
                self.min_samples, self.max_samples
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnerState {
    Idle,
    Collecting,
    Finalizing,
}

/// Why a capture was not counted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No session running
    NotCollecting,
    /// Within the sample interval of the previous accepted sample
    Debounced,
    /// Zero value or zero bit count
    Noise,
}

/// How a session ended
#[derive(Debug, Clone, PartialEq)]
pub enum LearnOutcome {
    /// Consensus reached and the signal was stored
    Stored { id: SignalId, consensus: Consensus },
    /// Consensus reached but the sink refused the signal
    NotStored { consensus: Consensus, error: IrError },
    /// Too few samples; nothing was voted on or stored
    Aborted { error: IrError },
}

impl LearnOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, LearnOutcome::Stored { .. })
    }

    pub fn consensus(&self) -> Option<&Consensus> {
        match self {
            LearnOutcome::Stored { consensus, .. } | LearnOutcome::NotStored { consensus, .. } => {
                Some(consensus)
            }
            LearnOutcome::Aborted { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&IrError> {
        match self {
            LearnOutcome::Stored { .. } => None,
            LearnOutcome::NotStored { error, .. } | LearnOutcome::Aborted { error } => Some(error),
        }
    }
}

/// Result of offering one capture
#[derive(Debug, Clone, PartialEq)]
pub enum LearnEvent {
    Ignored(Rejection),
    Accepted { collected: usize },
    Finished(LearnOutcome),
}

type GroupKey = (u32, u16, Protocol);

/// Consensus learner for one session at a time
#[derive(Debug)]
pub struct ConsensusLearner {
    config: LearningConfig,
    state: LearnerState,
    samples: Vec<LearningSample>,
    group_timing: Vec<(GroupKey, TimingSequence)>,
    last_timing: TimingSequence,
    started_at: u64,
    last_accepted_at: Option<u64>,
}

impl ConsensusLearner {
    pub fn new(mut config: LearningConfig) -> Self {
        config.max_samples = config.max_samples.min(MAX_SAMPLES);
        Self {
            samples: Vec::with_capacity(config.max_samples),
            config,
            state: LearnerState::Idle,
            group_timing: Vec::new(),
            last_timing: TimingSequence::default(),
            started_at: 0,
            last_accepted_at: None,
        }
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    pub fn state(&self) -> LearnerState {
        self.state
    }

    pub fn is_collecting(&self) -> bool {
        self.state == LearnerState::Collecting
    }

    pub fn samples(&self) -> &[LearningSample] {
        &self.samples
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Milliseconds since the session started (0 when idle)
    pub fn elapsed_ms(&self, now: u64) -> u64 {
        if self.is_collecting() {
            now.saturating_sub(self.started_at)
        } else {
            0
        }
    }

    /// Begin a new session, discarding any samples from a previous one
    pub fn start(&mut self, now: u64) {
        if self.is_collecting() {
            warn!(discarded = self.samples.len(), "Restarting learning session");
        }
        self.samples.clear();
        self.group_timing.clear();
        self.last_timing = TimingSequence::default();
        self.started_at = now;
        self.last_accepted_at = None;
        self.state = LearnerState::Collecting;
        info!(
            max = self.config.max_samples,
            min = self.config.min_samples,
            timeout_ms = self.config.timeout_ms,
            "Learning started"
        );
    }

    /// Feed one decode event. Finalizes once the buffer is full, or without
    /// taking the capture when the session has already timed out.
    pub fn offer<S: SignalSink + ?Sized>(
        &mut self,
        capture: &CapturedSignal,
        now: u64,
        sink: &mut S,
    ) -> LearnEvent {
        if !self.is_collecting() {
            return LearnEvent::Ignored(Rejection::NotCollecting);
        }
        // a late capture never counts toward an expired session
        if self.elapsed_ms(now) > self.config.timeout_ms {
            info!(collected = self.samples.len(), "Learning timed out");
            return LearnEvent::Finished(self.conclude(sink));
        }

        if !capture.timing.is_empty() {
            self.last_timing = capture.timing.clone();
        }

        if capture.value == 0 || capture.bits == 0 {
            debug!(protocol = %capture.protocol, "Noise capture rejected");
            return LearnEvent::Ignored(Rejection::Noise);
        }
        if let Some(last) = self.last_accepted_at {
            if now.saturating_sub(last) < self.config.sample_interval_ms {
                debug!(since_last_ms = now.saturating_sub(last), "Sample debounced");
                return LearnEvent::Ignored(Rejection::Debounced);
            }
        }

        let sample = LearningSample {
            value: capture.value,
            bits: capture.bits,
            protocol: capture.protocol,
            captured_at_millis: now,
        };
        self.remember_group_timing(&sample, &capture.timing);
        self.samples.push(sample);
        self.last_accepted_at = Some(now);

        let collected = self.samples.len();
        info!(
            collected,
            max = self.config.max_samples,
            protocol = %capture.protocol,
            value = format_args!("0x{:08X}", capture.value),
            bits = capture.bits,
            "Sample accepted"
        );

        if collected >= self.config.max_samples {
            return LearnEvent::Finished(self.finalize(sink));
        }
        LearnEvent::Accepted { collected }
    }

    /// Check the session timeout
    pub fn poll<S: SignalSink + ?Sized>(&mut self, now: u64, sink: &mut S) -> Option<LearnOutcome> {
        if !self.is_collecting() || self.elapsed_ms(now) <= self.config.timeout_ms {
            return None;
        }
        info!(collected = self.samples.len(), "Learning timed out");
        Some(self.conclude(sink))
    }

    /// End the session on request. `None` when no session is running.
    pub fn stop<S: SignalSink + ?Sized>(&mut self, sink: &mut S) -> Option<LearnOutcome> {
        if !self.is_collecting() {
            return None;
        }
        info!(collected = self.samples.len(), "Learning stopped");
        Some(self.conclude(sink))
    }

    fn remember_group_timing(&mut self, sample: &LearningSample, timing: &TimingSequence) {
        let key = (sample.value, sample.bits, sample.protocol);
        match self.group_timing.iter_mut().find(|(k, _)| *k == key) {
            Some((_, t)) => {
                if !timing.is_empty() {
                    *t = timing.clone();
                }
            }
            None => self.group_timing.push((key, timing.clone())),
        }
    }

    fn conclude<S: SignalSink + ?Sized>(&mut self, sink: &mut S) -> LearnOutcome {
        if self.samples.len() < self.config.min_samples {
            let error = IrError::InsufficientSamples {
                collected: self.samples.len(),
                required: self.config.min_samples,
            };
            warn!("Learning aborted: {}", error);
            self.reset();
            return LearnOutcome::Aborted { error };
        }
        self.finalize(sink)
    }

    fn finalize<S: SignalSink + ?Sized>(&mut self, sink: &mut S) -> LearnOutcome {
        self.state = LearnerState::Finalizing;

        let Some(winner) = consensus::consensus(&self.samples) else {
            let error = IrError::InsufficientSamples {
                collected: 0,
                required: self.config.min_samples,
            };
            self.reset();
            return LearnOutcome::Aborted { error };
        };

        let timing = match self.config.timing_source {
            TimingSource::WinningGroup => self
                .group_timing
                .iter()
                .find(|(k, _)| *k == (winner.value, winner.bits, winner.protocol))
                .map(|(_, t)| t.clone())
                .unwrap_or_default(),
            TimingSource::LastCapture => self.last_timing.clone(),
        };

        let name = format!(
            "Signal_{}_R{:.0}%",
            sink.signal_count() + 1,
            winner.reliability
        );
        info!(
            protocol = %winner.protocol,
            value = format_args!("0x{:08X}", winner.value),
            bits = winner.bits,
            count = winner.count,
            total = winner.total,
            reliability = format_args!("{:.1}", winner.reliability),
            "Consensus reached"
        );

        let outcome = match sink.add_signal(
            winner.protocol,
            winner.value,
            winner.bits,
            timing.as_slice(),
            Some(&name),
        ) {
            Ok(id) => LearnOutcome::Stored {
                id,
                consensus: winner,
            },
            Err(error) => {
                warn!("Learned signal not stored: {}", error);
                LearnOutcome::NotStored {
                    consensus: winner,
                    error,
                }
            }
        };
        self.reset();
        outcome
    }

    fn reset(&mut self) {
        self.samples.clear();
        self.group_timing.clear();
        self.last_timing = TimingSequence::default();
        self.last_accepted_at = None;
        self.state = LearnerState::Idle;
    }
}

impl Default for ConsensusLearner {
    fn default() -> Self {
        Self::new(LearningConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct VecSink {
        stored: Vec<(Protocol, u32, u16, Vec<u16>, String)>,
        full: bool,
    }

    impl SignalSink for VecSink {
        fn signal_count(&self) -> usize {
            self.stored.len()
        }

        fn add_signal(
            &mut self,
            protocol: Protocol,
            value: u32,
            bits: u16,
            timing: &[u16],
            name: Option<&str>,
        ) -> IrResult<SignalId> {
            if self.full {
                return Err(IrError::StoreFull { capacity: 20 });
            }
            self.stored.push((
                protocol,
                value,
                bits,
                timing.to_vec(),
                name.unwrap_or_default().to_string(),
            ));
            Ok(self.stored.len())
        }
    }

    fn capture(value: u32, timing: &[u16]) -> CapturedSignal {
        CapturedSignal::new(Protocol::Nec, value, 32, TimingSequence::from(timing))
    }

    /// Offer captures 250 ms apart starting at `t0`
    fn feed(
        learner: &mut ConsensusLearner,
        sink: &mut VecSink,
        captures: &[CapturedSignal],
        t0: u64,
    ) -> Vec<LearnEvent> {
        captures
            .iter()
            .enumerate()
            .map(|(i, c)| learner.offer(c, t0 + 250 * (i as u64 + 1), sink))
            .collect()
    }

    #[test]
    fn test_idle_ignores_captures() {
        let mut learner = ConsensusLearner::default();
        let mut sink = VecSink::default();
        assert_eq!(
            learner.offer(&capture(1, &[]), 0, &mut sink),
            LearnEvent::Ignored(Rejection::NotCollecting)
        );
        assert!(learner.stop(&mut sink).is_none());
        assert!(learner.poll(100_000, &mut sink).is_none());
    }

    #[test]
    fn test_five_of_seven_on_stop() {
        let mut learner = ConsensusLearner::default();
        let mut sink = VecSink::default();
        learner.start(0);
        let captures: Vec<_> = [0xA, 0xB, 0xA, 0xA, 0xB, 0xA, 0xA]
            .iter()
            .map(|&v| capture(v, &[9000, 4500]))
            .collect();
        feed(&mut learner, &mut sink, &captures, 0);
        assert_eq!(learner.sample_count(), 7);

        let outcome = learner.stop(&mut sink).unwrap();
        let c = outcome.consensus().unwrap();
        assert_eq!(c.value, 0xA);
        assert!((c.reliability - 71.43).abs() < 0.01);
        assert_eq!(outcome, LearnOutcome::Stored { id: 1, consensus: *c });
        assert_eq!(sink.stored[0].4, "Signal_1_R71%");
        assert_eq!(learner.state(), LearnerState::Idle);
    }

    #[test]
    fn test_debounce_and_noise_not_counted() {
        let mut learner = ConsensusLearner::default();
        let mut sink = VecSink::default();
        learner.start(0);
        assert!(matches!(
            learner.offer(&capture(1, &[]), 100, &mut sink),
            LearnEvent::Accepted { collected: 1 }
        ));
        assert_eq!(
            learner.offer(&capture(1, &[]), 250, &mut sink),
            LearnEvent::Ignored(Rejection::Debounced)
        );
        assert_eq!(
            learner.offer(&capture(0, &[]), 260, &mut sink),
            LearnEvent::Ignored(Rejection::Noise)
        );
        let mut zero_bits = capture(5, &[]);
        zero_bits.bits = 0;
        assert_eq!(
            learner.offer(&zero_bits, 280, &mut sink),
            LearnEvent::Ignored(Rejection::Noise)
        );
        // exactly one interval after the last accepted sample
        assert!(matches!(
            learner.offer(&capture(1, &[]), 300, &mut sink),
            LearnEvent::Accepted { collected: 2 }
        ));
    }

    #[test]
    fn test_insufficient_at_timeout() {
        let mut learner = ConsensusLearner::default();
        let mut sink = VecSink::default();
        learner.start(1_000);
        let captures: Vec<_> = (0..MIN_SAMPLES - 1).map(|_| capture(7, &[])).collect();
        feed(&mut learner, &mut sink, &captures, 1_000);

        assert!(learner.poll(1_000 + LEARNING_TIMEOUT_MS, &mut sink).is_none());
        let outcome = learner.poll(1_000 + LEARNING_TIMEOUT_MS + 1, &mut sink).unwrap();
        assert_eq!(
            outcome,
            LearnOutcome::Aborted {
                error: IrError::InsufficientSamples {
                    collected: 4,
                    required: 5
                }
            }
        );
        assert!(sink.stored.is_empty());
        assert_eq!(learner.state(), LearnerState::Idle);
    }

    #[test]
    fn test_capture_after_timeout_not_counted() {
        let mut learner = ConsensusLearner::default();
        let mut sink = VecSink::default();
        learner.start(0);
        let four: Vec<_> = (0..4).map(|_| capture(0x20DF_10EF, &[9000, 4500])).collect();
        feed(&mut learner, &mut sink, &four, 0);
        assert_eq!(learner.sample_count(), 4);

        let late = learner.offer(&capture(0x20DF_10EF, &[9000, 4500]), 31_000, &mut sink);
        match late {
            LearnEvent::Finished(LearnOutcome::Aborted { error }) => assert_eq!(
                error,
                IrError::InsufficientSamples {
                    collected: 4,
                    required: MIN_SAMPLES
                }
            ),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(learner.state(), LearnerState::Idle);
        assert!(learner.poll(31_000, &mut sink).is_none());
        assert!(sink.stored.is_empty());
    }

    #[test]
    fn test_timeout_with_enough_samples_finalizes() {
        let mut learner = ConsensusLearner::default();
        let mut sink = VecSink::default();
        learner.start(0);
        let captures: Vec<_> = (0..MIN_SAMPLES).map(|_| capture(7, &[])).collect();
        feed(&mut learner, &mut sink, &captures, 0);
        let outcome = learner.poll(LEARNING_TIMEOUT_MS + 1, &mut sink).unwrap();
        assert!(outcome.is_stored());
        assert_eq!(sink.stored[0].4, "Signal_1_R100%");
    }

    #[test]
    fn test_max_samples_concludes() {
        let mut learner = ConsensusLearner::default();
        let mut sink = VecSink::default();
        learner.start(0);
        let captures: Vec<_> = (0..MAX_SAMPLES).map(|_| capture(3, &[])).collect();
        let events = feed(&mut learner, &mut sink, &captures, 0);
        assert!(matches!(events.last(), Some(LearnEvent::Finished(o)) if o.is_stored()));
        assert_eq!(learner.state(), LearnerState::Idle);
        assert_eq!(sink.stored.len(), 1);
    }

    #[test]
    fn test_store_full_is_distinct_failure() {
        let mut learner = ConsensusLearner::default();
        let mut sink = VecSink {
            full: true,
            ..Default::default()
        };
        learner.start(0);
        let captures: Vec<_> = (0..MIN_SAMPLES).map(|_| capture(3, &[])).collect();
        feed(&mut learner, &mut sink, &captures, 0);
        let outcome = learner.stop(&mut sink).unwrap();
        assert!(matches!(
            outcome,
            LearnOutcome::NotStored {
                error: IrError::StoreFull { .. },
                ..
            }
        ));
        assert!(outcome.consensus().is_some());
        assert_eq!(learner.state(), LearnerState::Idle);
    }

    #[test]
    fn test_winning_group_timing() {
        let mut learner = ConsensusLearner::default();
        let mut sink = VecSink::default();
        learner.start(0);
        let mut captures: Vec<_> = (0..5).map(|_| capture(0xA, &[100, 200])).collect();
        captures.push(capture(0xB, &[999, 999]));
        feed(&mut learner, &mut sink, &captures, 0);
        learner.stop(&mut sink);
        assert_eq!(sink.stored[0].1, 0xA);
        assert_eq!(sink.stored[0].3, vec![100, 200]);
    }

    #[test]
    fn test_last_capture_timing() {
        let mut learner = ConsensusLearner::new(LearningConfig {
            timing_source: TimingSource::LastCapture,
            ..Default::default()
        });
        let mut sink = VecSink::default();
        learner.start(0);
        let mut captures: Vec<_> = (0..5).map(|_| capture(0xA, &[100, 200])).collect();
        captures.push(capture(0xB, &[999, 999]));
        feed(&mut learner, &mut sink, &captures, 0);
        learner.stop(&mut sink);
        assert_eq!(sink.stored[0].1, 0xA);
        assert_eq!(sink.stored[0].3, vec![999, 999]);
    }

    #[test]
    fn test_restart_discards_samples() {
        let mut learner = ConsensusLearner::default();
        let mut sink = VecSink::default();
        learner.start(0);
        learner.offer(&capture(1, &[]), 10, &mut sink);
        learner.start(20);
        assert_eq!(learner.sample_count(), 0);
        assert!(learner.is_collecting());
    }

    #[test]
    fn test_config_validation() {
        assert!(LearningConfig::default().validate().is_ok());
        let bad = LearningConfig {
            min_samples: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = LearningConfig {
            min_samples: 10,
            max_samples: 5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = LearningConfig {
            max_samples: 21,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}

//! Loopback IR medium
//!
//! Simulated emitters put decoded frames on the air; the simulated decoder
//! takes them off. Everything runs on the control thread, so the medium is a
//! shared `Rc<RefCell<..>>` queue rather than a channel.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use irlearn_core::{CapturedSignal, Protocol, TimingSequence};

/// Frames in flight, oldest first
#[derive(Debug, Clone, Default)]
pub struct LoopbackAir {
    frames: Rc<RefCell<VecDeque<CapturedSignal>>>,
}

impl LoopbackAir {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transmit(&self, frame: CapturedSignal) {
        self.frames.borrow_mut().push_back(frame);
    }

    pub fn receive(&self) -> Option<CapturedSignal> {
        self.frames.borrow_mut().pop_front()
    }

    pub fn pending(&self) -> usize {
        self.frames.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.borrow().is_empty()
    }

    /// Drop every frame in flight
    pub fn clear(&self) {
        self.frames.borrow_mut().clear();
    }
}

/// Pulse-distance frame (NEC-style leader, MSB first, stop mark)
pub fn pulse_distance_timing(value: u32, bits: u16) -> TimingSequence {
    let bits = bits.min(32);
    let mut timing = Vec::with_capacity(3 + 2 * bits as usize);
    timing.extend_from_slice(&[9000, 4500]);
    for i in (0..bits).rev() {
        timing.push(560);
        timing.push(if value >> i & 1 == 1 { 1690 } else { 560 });
    }
    timing.push(560);
    TimingSequence::from_slice_truncated(&timing)
}

/// What a protocol decoder reports for raw timing it cannot classify
pub fn unknown_capture(timing: &[u16]) -> CapturedSignal {
    let timing = TimingSequence::from_slice_truncated(timing);
    CapturedSignal::new(Protocol::Unknown, timing.fingerprint(), 32, timing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_shared_between_clones() {
        let air = LoopbackAir::new();
        let other = air.clone();
        air.transmit(unknown_capture(&[100, 200, 300]));
        air.transmit(unknown_capture(&[900, 900, 900]));
        assert_eq!(other.pending(), 2);
        assert_eq!(other.receive().unwrap().timing.as_slice(), &[100, 200, 300]);
        other.clear();
        assert!(air.is_empty());
    }

    #[test]
    fn test_pulse_distance_shape() {
        let timing = pulse_distance_timing(0b101, 3);
        assert_eq!(
            timing.as_slice(),
            &[9000, 4500, 560, 1690, 560, 560, 560, 1690, 560]
        );
        assert_eq!(pulse_distance_timing(0, 32).len(), 67);
    }

    #[test]
    fn test_unknown_capture_hash_is_stable() {
        let a = unknown_capture(&[9000, 4500, 560, 560, 560, 1690, 560]);
        let b = unknown_capture(&[9100, 4450, 580, 550, 570, 1700, 555]);
        assert_eq!(a.protocol, Protocol::Unknown);
        assert_eq!(a.value, b.value);
    }
}

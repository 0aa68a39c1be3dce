//! Simulated IR receiver

use std::collections::VecDeque;

use tracing::trace;

use irlearn_core::{CapturedSignal, Clock, IrDecoder};

use super::air::LoopbackAir;

/// Receiver repeat-suppression window
pub const DECODER_DEBOUNCE_MS: u64 = 200;

/// Decoder fed by the loopback air and by time-stamped scripted frames.
///
/// A frame carrying the same code as the previously delivered one within
/// [`DECODER_DEBOUNCE_MS`] is swallowed, like a receiver suppressing the
/// repeat frames of a held button.
pub struct SimDecoder<C: Clock> {
    air: LoopbackAir,
    clock: C,
    script: VecDeque<(u64, CapturedSignal)>,
    last: Option<CapturedSignal>,
    last_delivered_at: Option<u64>,
    suppressed: usize,
}

impl<C: Clock> SimDecoder<C> {
    pub fn new(air: LoopbackAir, clock: C) -> Self {
        Self {
            air,
            clock,
            script: VecDeque::new(),
            last: None,
            last_delivered_at: None,
            suppressed: 0,
        }
    }

    /// Deliver `frame` once the clock reaches `at_millis`
    pub fn schedule(&mut self, at_millis: u64, frame: CapturedSignal) {
        let pos = self
            .script
            .iter()
            .position(|(t, _)| *t > at_millis)
            .unwrap_or(self.script.len());
        self.script.insert(pos, (at_millis, frame));
    }

    /// Scripted frames not yet delivered
    pub fn scheduled(&self) -> usize {
        self.script.len()
    }

    /// Frames swallowed as repeats
    pub fn suppressed(&self) -> usize {
        self.suppressed
    }

    fn script_due(&self) -> bool {
        matches!(self.script.front(), Some((t, _)) if *t <= self.clock.now_millis())
    }

    fn next_frame(&mut self) -> Option<CapturedSignal> {
        if self.script_due() {
            return self.script.pop_front().map(|(_, f)| f);
        }
        self.air.receive()
    }
}

impl<C: Clock> IrDecoder for SimDecoder<C> {
    fn is_available(&mut self) -> bool {
        self.script_due() || !self.air.is_empty()
    }

    fn decode(&mut self) -> Option<CapturedSignal> {
        let frame = self.next_frame()?;
        let now = self.clock.now_millis();

        if let (Some(prev), Some(at)) = (&self.last, self.last_delivered_at) {
            if now.saturating_sub(at) < DECODER_DEBOUNCE_MS
                && prev.same_code(frame.protocol, frame.value, frame.bits)
            {
                self.suppressed += 1;
                trace!(value = format_args!("0x{:08X}", frame.value), "Repeat frame suppressed");
                return None;
            }
        }

        self.last = Some(frame.clone());
        self.last_delivered_at = Some(now);
        Some(frame)
    }

    fn last_capture(&self) -> Option<&CapturedSignal> {
        self.last.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use irlearn_core::{ManualClock, Protocol, TimingSequence};
    use std::rc::Rc;

    fn frame(value: u32) -> CapturedSignal {
        CapturedSignal::new(Protocol::Nec, value, 32, TimingSequence::new())
    }

    #[test]
    fn test_script_released_on_time() {
        let clock = Rc::new(ManualClock::new());
        let mut decoder = SimDecoder::new(LoopbackAir::new(), Rc::clone(&clock));
        decoder.schedule(500, frame(2));
        decoder.schedule(100, frame(1));
        assert!(!decoder.is_available());

        clock.set(100);
        assert!(decoder.is_available());
        assert_eq!(decoder.decode().unwrap().value, 1);
        assert!(!decoder.is_available());

        clock.set(600);
        assert_eq!(decoder.decode().unwrap().value, 2);
        assert_eq!(decoder.last_capture().unwrap().value, 2);
        assert_eq!(decoder.scheduled(), 0);
    }

    #[test]
    fn test_repeat_suppression() {
        let clock = Rc::new(ManualClock::new());
        let air = LoopbackAir::new();
        let mut decoder = SimDecoder::new(air.clone(), Rc::clone(&clock));

        air.transmit(frame(7));
        assert!(decoder.decode().is_some());
        clock.advance(100);
        air.transmit(frame(7));
        assert!(decoder.decode().is_none());
        assert_eq!(decoder.suppressed(), 1);

        // a different code inside the window still gets through
        air.transmit(frame(8));
        assert!(decoder.decode().is_some());

        clock.advance(DECODER_DEBOUNCE_MS);
        air.transmit(frame(8));
        assert!(decoder.decode().is_some());
    }

    #[test]
    fn test_empty_decoder() {
        let mut decoder = SimDecoder::new(LoopbackAir::new(), ManualClock::new());
        assert!(!decoder.is_available());
        assert!(decoder.decode().is_none());
        assert!(decoder.last_capture().is_none());
    }
}

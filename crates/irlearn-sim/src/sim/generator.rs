//! Simulated pulse-generator peripheral

use tracing::debug;

use irlearn_core::{IrError, IrResult, PulseGenerator, PulseTrain};

use super::air::{unknown_capture, LoopbackAir};

/// Generator that records every train and echoes it onto the air.
///
/// The receiver sees the conditioned timing the hardware would actually
/// emit, reported as an `Unknown` capture carrying its timing fingerprint.
#[derive(Debug)]
pub struct SimPulseGenerator {
    air: Option<LoopbackAir>,
    available: bool,
    fail_next: u32,
    sent: Vec<PulseTrain>,
}

impl SimPulseGenerator {
    pub fn new(air: LoopbackAir) -> Self {
        Self {
            air: Some(air),
            ..Self::detached()
        }
    }

    /// Generator with no receiver in range
    pub fn detached() -> Self {
        Self {
            air: None,
            available: true,
            fail_next: 0,
            sent: Vec::new(),
        }
    }

    /// Simulate a peripheral that failed to initialise
    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    /// Make the next `n` sends time out
    pub fn fail_next(&mut self, n: u32) {
        self.fail_next = n;
    }

    /// Trains sent successfully, oldest first
    pub fn sent(&self) -> &[PulseTrain] {
        &self.sent
    }
}

impl PulseGenerator for SimPulseGenerator {
    fn is_available(&self) -> bool {
        self.available
    }

    fn send_pulse_train(&mut self, train: &PulseTrain) -> IrResult<()> {
        if !self.available {
            return Err(IrError::Hardware("pulse generator not initialised".into()));
        }
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(IrError::Hardware("pulse generator transmit timeout".into()));
        }
        debug!(
            items = train.len(),
            carrier_khz = train.carrier_khz(),
            duration_us = train.duration_us(),
            "Pulse train sent"
        );
        if let Some(air) = &self.air {
            air.transmit(unknown_capture(&train.to_timing()));
        }
        self.sent.push(train.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use irlearn_core::{codec, Protocol};

    #[test]
    fn test_echo_onto_air() {
        let air = LoopbackAir::new();
        let mut generator = SimPulseGenerator::new(air.clone());
        let train = codec::encode(&[9000, 4500, 560, 560, 560], 38).unwrap();
        generator.send_pulse_train(&train).unwrap();

        let frame = air.receive().unwrap();
        assert_eq!(frame.protocol, Protocol::Unknown);
        assert_eq!(frame.timing.as_slice(), &[9000, 4500, 560, 560, 560]);
        assert_eq!(generator.sent().len(), 1);
    }

    #[test]
    fn test_failure_injection() {
        let mut generator = SimPulseGenerator::detached();
        let train = codec::encode(&[500, 500], 38).unwrap();
        generator.fail_next(1);
        assert!(matches!(generator.send_pulse_train(&train), Err(IrError::Hardware(_))));
        assert!(generator.send_pulse_train(&train).is_ok());

        generator.set_available(false);
        assert!(!generator.is_available());
        assert!(generator.send_pulse_train(&train).is_err());
        assert_eq!(generator.sent().len(), 1);
    }
}

//! Simulated software IR emitter

use tracing::debug;

use irlearn_core::{CapturedSignal, IrError, IrResult, Protocol, SoftwareEmitter};

use super::air::{pulse_distance_timing, unknown_capture, LoopbackAir};

/// One send recorded by [`SimEmitter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmittedFrame {
    Protocol {
        protocol: Protocol,
        value: u32,
        bits: u16,
        repeats: u16,
    },
    Raw {
        timing: Vec<u16>,
        carrier_khz: u16,
    },
}

/// Protocol encoders plus bit-banged raw output.
///
/// A protocol send puts one decoded frame on the air (repeat frames are
/// swallowed by the receiver anyway); a raw send puts an `Unknown` capture.
#[derive(Debug)]
pub struct SimEmitter {
    air: Option<LoopbackAir>,
    supported: Vec<Protocol>,
    fail_protocol: u32,
    fail_raw: u32,
    sent: Vec<EmittedFrame>,
}

impl SimEmitter {
    pub fn new(air: LoopbackAir) -> Self {
        Self {
            air: Some(air),
            ..Self::detached()
        }
    }

    /// Emitter with no receiver in range
    pub fn detached() -> Self {
        Self {
            air: None,
            supported: Protocol::ALL
                .iter()
                .copied()
                .filter(|p| p.has_dedicated_encoder())
                .collect(),
            fail_protocol: 0,
            fail_raw: 0,
            sent: Vec::new(),
        }
    }

    /// Restrict the protocol encoders that are compiled in
    pub fn with_supported(mut self, protocols: &[Protocol]) -> Self {
        self.supported = protocols.to_vec();
        self
    }

    pub fn fail_protocol_sends(&mut self, n: u32) {
        self.fail_protocol = n;
    }

    pub fn fail_raw_sends(&mut self, n: u32) {
        self.fail_raw = n;
    }

    pub fn sent(&self) -> &[EmittedFrame] {
        &self.sent
    }
}

impl SoftwareEmitter for SimEmitter {
    fn supports(&self, protocol: Protocol) -> bool {
        self.supported.contains(&protocol)
    }

    fn send_protocol(&mut self, protocol: Protocol, value: u32, bits: u16, repeats: u16) -> IrResult<()> {
        if !self.supports(protocol) {
            return Err(IrError::Unsupported(format!("no {} encoder", protocol)));
        }
        if self.fail_protocol > 0 {
            self.fail_protocol -= 1;
            return Err(IrError::Hardware(format!("{} send failed", protocol)));
        }
        debug!(%protocol, value = format_args!("0x{:08X}", value), bits, repeats, "Protocol frame sent");
        if let Some(air) = &self.air {
            air.transmit(CapturedSignal::new(
                protocol,
                value,
                bits,
                pulse_distance_timing(value, bits),
            ));
        }
        self.sent.push(EmittedFrame::Protocol {
            protocol,
            value,
            bits,
            repeats,
        });
        Ok(())
    }

    fn send_raw_bit_banged(&mut self, timing: &[u16], carrier_khz: u16) -> IrResult<()> {
        if timing.is_empty() {
            return Err(IrError::invalid("nothing to bit-bang"));
        }
        if self.fail_raw > 0 {
            self.fail_raw -= 1;
            return Err(IrError::Hardware("bit-banged send failed".into()));
        }
        debug!(durations = timing.len(), carrier_khz, "Raw timing bit-banged");
        if let Some(air) = &self.air {
            air.transmit(unknown_capture(timing));
        }
        self.sent.push(EmittedFrame::Raw {
            timing: timing.to_vec(),
            carrier_khz,
        });
        Ok(())
    }
}

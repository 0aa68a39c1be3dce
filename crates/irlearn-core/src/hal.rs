//! # Hardware Abstraction Layer
//!
//! Capability traits at the boundary between the learning/transmit logic and
//! the peripherals:
//!
//! - **IrDecoder**: demodulating receiver plus protocol decoder (consumed as a
//!   black box that reports protocol, value, bit count and raw timing)
//! - **PulseGenerator**: hardware pulse-train peripheral with carrier
//!   modulation and the numeric limits enforced by [`crate::codec`]
//! - **SoftwareEmitter**: protocol encoders and a bit-banged raw fallback with
//!   no tick limits but lower timing precision
//! - **NvStorage**: byte-addressable non-volatile device holding the store image
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │        ConsensusLearner    SlotStore    TransmitController   │
//! ├──────────────────────────────────────────────────────────────┤
//! │   IrDecoder     NvStorage     PulseGenerator  SoftwareEmitter│
//! ├──────────────────────────────────────────────────────────────┤
//! │  Simulator (irlearn-sim)  │  Board support (RMT, EEPROM, …)  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use crate::codec::PulseTrain;
use crate::error::IrResult;
use crate::protocol::Protocol;
use crate::timing::TimingSequence;

/// One decode event from the receiver
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapturedSignal {
    pub protocol: Protocol,
    pub value: u32,
    pub bits: u16,
    pub timing: TimingSequence,
}

impl CapturedSignal {
    pub fn new(protocol: Protocol, value: u32, bits: u16, timing: TimingSequence) -> Self {
        Self {
            protocol,
            value,
            bits,
            timing,
        }
    }

    /// Whether another capture decodes to the same (value, bits, protocol)
    pub fn same_code(&self, protocol: Protocol, value: u32, bits: u16) -> bool {
        self.protocol == protocol && self.value == value && self.bits == bits
    }
}

/// IR receiver with protocol decoding
pub trait IrDecoder {
    /// Whether a frame is waiting to be decoded
    fn is_available(&mut self) -> bool;

    /// Decode the pending frame.
    ///
    /// Returns `None` when nothing is pending or when the frame is a repeat
    /// arriving within the receiver's debounce window. On success the capture
    /// also becomes [`IrDecoder::last_capture`].
    fn decode(&mut self) -> Option<CapturedSignal>;

    /// Most recently decoded capture, including its raw timing buffer
    fn last_capture(&self) -> Option<&CapturedSignal>;
}

/// Hardware pulse-train generator
pub trait PulseGenerator {
    /// Whether the peripheral is initialised and ready
    fn is_available(&self) -> bool;

    /// Emit one pulse train and wait (bounded) for completion
    fn send_pulse_train(&mut self, train: &PulseTrain) -> IrResult<()>;
}

/// Software transmitter: protocol encoders plus bit-banged raw output
pub trait SoftwareEmitter {
    /// Whether a protocol encoder exists for `protocol`
    fn supports(&self, protocol: Protocol) -> bool;

    /// Encode and emit a protocol frame, followed by `repeats` repeat frames
    fn send_protocol(
        &mut self,
        protocol: Protocol,
        value: u32,
        bits: u16,
        repeats: u16,
    ) -> IrResult<()>;

    /// Bit-bang raw mark/space durations with a software carrier
    fn send_raw_bit_banged(&mut self, timing: &[u16], carrier_khz: u16) -> IrResult<()>;
}

/// Non-volatile byte storage (EEPROM emulation, flash page, file)
pub trait NvStorage {
    /// Device size in bytes
    fn capacity(&self) -> usize;

    /// Read the whole device
    fn read_image(&mut self) -> IrResult<Vec<u8>>;

    /// Write `image` at offset 0 and commit it
    fn write_image(&mut self, image: &[u8]) -> IrResult<()>;
}

impl<T: IrDecoder + ?Sized> IrDecoder for Box<T> {
    fn is_available(&mut self) -> bool {
        (**self).is_available()
    }

    fn decode(&mut self) -> Option<CapturedSignal> {
        (**self).decode()
    }

    fn last_capture(&self) -> Option<&CapturedSignal> {
        (**self).last_capture()
    }
}

impl<T: PulseGenerator + ?Sized> PulseGenerator for Box<T> {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn send_pulse_train(&mut self, train: &PulseTrain) -> IrResult<()> {
        (**self).send_pulse_train(train)
    }
}

impl<T: SoftwareEmitter + ?Sized> SoftwareEmitter for Box<T> {
    fn supports(&self, protocol: Protocol) -> bool {
        (**self).supports(protocol)
    }

    fn send_protocol(
        &mut self,
        protocol: Protocol,
        value: u32,
        bits: u16,
        repeats: u16,
    ) -> IrResult<()> {
        (**self).send_protocol(protocol, value, bits, repeats)
    }

    fn send_raw_bit_banged(&mut self, timing: &[u16], carrier_khz: u16) -> IrResult<()> {
        (**self).send_raw_bit_banged(timing, carrier_khz)
    }
}

impl<T: NvStorage + ?Sized> NvStorage for Box<T> {
    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn read_image(&mut self) -> IrResult<Vec<u8>> {
        (**self).read_image()
    }

    fn write_image(&mut self, image: &[u8]) -> IrResult<()> {
        (**self).write_image(image)
    }
}

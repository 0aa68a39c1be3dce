//! Simulated IR hardware
//!
//! Drop-in implementations of the `irlearn_core::hal` traits for development
//! and tests without a board:
//!
//! - [`SimDecoder`]: receiver fed by scripted frames and the loopback air
//! - [`SimPulseGenerator`]: pulse-generator peripheral with failure injection
//! - [`SimEmitter`]: protocol encoders and bit-banged raw output
//! - [`MemoryStorage`] / [`FileStorage`]: fixed-size non-volatile devices
//!
//! Emitters and the decoder share a [`LoopbackAir`], so a transmitted signal
//! can be decoded again by verification.

pub mod air;
pub mod decoder;
pub mod emitter;
pub mod generator;
pub mod storage;

pub use air::{pulse_distance_timing, unknown_capture, LoopbackAir};
pub use decoder::{SimDecoder, DECODER_DEBOUNCE_MS};
pub use emitter::{EmittedFrame, SimEmitter};
pub use generator::SimPulseGenerator;
pub use storage::{FileStorage, MemoryStorage};

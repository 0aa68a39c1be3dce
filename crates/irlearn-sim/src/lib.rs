//! irlearn simulator
//!
//! Runs the irlearn core against simulated peripherals: a loopback IR medium,
//! a scripted receiver, a pulse-generator peripheral, a software emitter and
//! RAM or file backed non-volatile storage. [`Station`] ties them into the
//! device control loop and [`Command`] is its text command surface, used by
//! the `irlearn-console` binary.

pub mod command;
pub mod sim;
pub mod station;

pub use command::{Command, CommandError, HELP};
pub use sim::{FileStorage, LoopbackAir, MemoryStorage, SimDecoder, SimEmitter, SimPulseGenerator};
pub use station::Station;

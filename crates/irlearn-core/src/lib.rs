//! irlearn core
//!
//! Learns infrared remote-control signals from repeated button presses,
//! keeps them in a fixed-capacity persistent slot store, and replays them
//! with bounded retries:
//!
//! - **ConsensusLearner** ([`learner`], [`consensus`]): buffers noisy captures,
//!   picks the majority signal and scores its reliability
//! - **SlotStore** ([`store`], [`image`]): 20 slots with stable 1-based ids and
//!   a write-through binary image
//! - **PulseCodec** ([`codec`]): timing sequence to hardware pulse items under
//!   the generator's numeric limits
//! - **TransmitController** ([`transmit`], [`retry`]): protocol encoder first,
//!   raw pulse train second, hardware generator with bit-bang fallback
//!
//! Peripherals sit behind the traits in [`hal`]; the `irlearn-sim` crate
//! provides simulated implementations.
//!
//! # Example
//!
//! ```rust,ignore
//! use irlearn_core::{ConsensusLearner, ManualClock, SlotStore};
//!
//! let mut store = SlotStore::open(storage, ManualClock::new())?;
//! let mut learner = ConsensusLearner::default();
//! learner.start(now);
//! // for each decoder event:
//! learner.offer(&capture, now, &mut store);
//! ```

pub mod clock;
pub mod codec;
pub mod config;
pub mod consensus;
pub mod error;
pub mod hal;
pub mod image;
pub mod learner;
pub mod observe;
pub mod protocol;
pub mod retry;
pub mod store;
pub mod timing;
pub mod transmit;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{encode, PulseItem, PulseTrain};
pub use config::IrConfig;
pub use consensus::{Consensus, LearningSample};
pub use error::{ErrorKind, IrError, IrResult};
pub use hal::{CapturedSignal, IrDecoder, NvStorage, PulseGenerator, SoftwareEmitter};
pub use learner::{ConsensusLearner, LearnEvent, LearnOutcome, LearnerState, LearningConfig};
pub use protocol::Protocol;
pub use retry::RetryPolicy;
pub use store::{SignalHandle, SignalId, SignalRecord, SignalSink, SlotStore, MAX_SIGNALS};
pub use timing::{TimingSequence, TimingStats};
pub use transmit::{
    Grade, SendPath, TransmitConfig, TransmitController, TransmitReport, VerifyConfig,
    VerifyReport,
};

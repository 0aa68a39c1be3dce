//! Pulse-train codec
//!
//! Converts a mark/space timing sequence into items for a hardware pulse
//! generator (an RMT-style peripheral clocked at 1 MHz, so one tick is one
//! microsecond). Each item holds two `(level, duration)` halves packed into a
//! 32-bit word:
//!
//! ```text
//!  31   30 ........ 16  15   14 ......... 0
//! ┌──────┬────────────┬──────┬────────────┐
//! │level1│ duration1  │level0│ duration0  │
//! └──────┴────────────┴──────┴────────────┘
//! ```
//!
//! Encoding is pure: the same timing and carrier always produce the same
//! train. Every emitted duration passes through [`condition_duration`], and
//! every train ends with a forced 1 ms low item so the receiver sees
//! end-of-frame.

use crate::error::{IrError, IrResult};

/// Largest duration representable in a 15-bit item half
pub const MAX_TICKS: u16 = 32_767;

/// Pulses shorter than this are stretched for receiver front-end compatibility
pub const SHORT_PULSE_US: u16 = 50;

/// Floor applied after stretching
pub const MIN_PULSE_US: u16 = 10;

/// Forced trailing low period
pub const END_OF_FRAME_US: u16 = 1000;

/// Output level of one item half
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    fn bit(self) -> u32 {
        match self {
            Level::Low => 0,
            Level::High => 1,
        }
    }

    fn from_bit(bit: u32) -> Self {
        if bit & 1 == 1 {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// One generator item: two `(level, duration)` halves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseItem {
    pub level0: Level,
    pub duration0: u16,
    pub level1: Level,
    pub duration1: u16,
}

impl PulseItem {
    /// Mark followed by space
    pub fn mark_space(high_ticks: u16, low_ticks: u16) -> Self {
        Self {
            level0: Level::High,
            duration0: high_ticks,
            level1: Level::Low,
            duration1: low_ticks,
        }
    }

    /// Forced trailing low period
    pub fn end_of_frame() -> Self {
        Self {
            level0: Level::Low,
            duration0: END_OF_FRAME_US,
            level1: Level::Low,
            duration1: 0,
        }
    }

    /// Whether this is the end-of-frame trailer rather than data
    pub fn is_trailer(&self) -> bool {
        self.level0 == Level::Low
    }

    /// Pack into the generator's 32-bit item word
    pub fn to_word(&self) -> u32 {
        (self.duration0 as u32 & 0x7FFF)
            | (self.level0.bit() << 15)
            | ((self.duration1 as u32 & 0x7FFF) << 16)
            | (self.level1.bit() << 31)
    }

    /// Unpack a 32-bit item word
    pub fn from_word(word: u32) -> Self {
        Self {
            duration0: (word & 0x7FFF) as u16,
            level0: Level::from_bit(word >> 15),
            duration1: ((word >> 16) & 0x7FFF) as u16,
            level1: Level::from_bit(word >> 31),
        }
    }
}

/// Encoded pulse train ready for the generator peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulseTrain {
    items: Vec<PulseItem>,
    carrier_khz: u16,
}

impl PulseTrain {
    pub fn items(&self) -> &[PulseItem] {
        &self.items
    }

    pub fn carrier_khz(&self) -> u16 {
        self.carrier_khz
    }

    /// Number of items including the trailer
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items excluding the end-of-frame trailer
    pub fn data_items(&self) -> &[PulseItem] {
        let n = self.items.iter().take_while(|i| !i.is_trailer()).count();
        &self.items[..n]
    }

    /// Packed words, in send order
    pub fn words(&self) -> Vec<u32> {
        self.items.iter().map(PulseItem::to_word).collect()
    }

    /// Total on-air duration in microseconds, trailer included
    pub fn duration_us(&self) -> u32 {
        self.items
            .iter()
            .map(|i| i.duration0 as u32 + i.duration1 as u32)
            .sum()
    }

    /// Recover the (conditioned) mark/space durations carried by the train.
    ///
    /// The zero-length close of an odd-length input is not a duration and is
    /// dropped, so an odd input decodes back to an odd sequence.
    pub fn to_timing(&self) -> Vec<u16> {
        let mut out = Vec::with_capacity(self.items.len() * 2);
        for item in self.data_items() {
            out.push(item.duration0);
            if item.duration1 > 0 {
                out.push(item.duration1);
            }
        }
        out
    }
}

/// Apply the generator's numeric limits to one duration (µs → ticks).
///
/// Clamp to [`MAX_TICKS`], promote 0 to 1, stretch anything under
/// [`SHORT_PULSE_US`] by 1.2× (rounded), then floor at [`MIN_PULSE_US`].
pub fn condition_duration(us: u16) -> u16 {
    let mut ticks = us.min(MAX_TICKS);
    if ticks == 0 {
        ticks = 1;
    }
    if ticks < SHORT_PULSE_US {
        ticks = ((ticks as u32 * 12 + 5) / 10) as u16;
    }
    ticks.max(MIN_PULSE_US)
}

/// Encode a timing sequence for the pulse generator.
///
/// Durations are consumed two at a time as (mark, space). An unmatched final
/// mark is closed with a zero-length low half. Fails on an empty sequence or
/// a zero carrier; no partial output is produced.
pub fn encode(timing: &[u16], carrier_khz: u16) -> IrResult<PulseTrain> {
    if timing.is_empty() {
        return Err(IrError::invalid("cannot encode an empty timing sequence"));
    }
    if carrier_khz == 0 {
        return Err(IrError::invalid("carrier frequency must be non-zero"));
    }

    let mut items = Vec::with_capacity(timing.len() / 2 + 2);
    for pair in timing.chunks(2) {
        let item = match *pair {
            [mark, space] => {
                PulseItem::mark_space(condition_duration(mark), condition_duration(space))
            }
            [mark] => PulseItem::mark_space(condition_duration(mark), 0),
            _ => unreachable!("chunks(2) yields one or two elements"),
        };
        items.push(item);
    }
    items.push(PulseItem::end_of_frame());

    Ok(PulseTrain { items, carrier_khz })
}

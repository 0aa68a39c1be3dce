//! IR protocol catalogue
//!
//! The closed set of protocol identifiers a decoder may report, with the
//! per-protocol facts the rest of the crate needs: the one-byte id used in
//! the persisted image, whether a dedicated encoder exists, and the carrier
//! frequency to fall back to when the signal has to be replayed raw.

use std::fmt;
use std::str::FromStr;

use crate::error::IrError;

/// Default carrier frequency for IR remotes (kHz)
pub const DEFAULT_CARRIER_KHZ: u16 = 38;

/// Protocol identifier reported by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    /// No structured decode available; only the raw timing is meaningful
    #[default]
    Unknown,
    Nec,
    NecLike,
    Sony,
    Rc5,
    Rc5x,
    Rc6,
    Samsung,
    Lg,
    Panasonic,
    Jvc,
    Sharp,
}

impl Protocol {
    /// All protocols, in wire-id order
    pub const ALL: [Protocol; 12] = [
        Protocol::Unknown,
        Protocol::Nec,
        Protocol::NecLike,
        Protocol::Sony,
        Protocol::Rc5,
        Protocol::Rc5x,
        Protocol::Rc6,
        Protocol::Samsung,
        Protocol::Lg,
        Protocol::Panasonic,
        Protocol::Jvc,
        Protocol::Sharp,
    ];

    /// Stable one-byte id stored in the persisted image
    pub fn wire_id(self) -> u8 {
        match self {
            Protocol::Unknown => 0,
            Protocol::Nec => 1,
            Protocol::NecLike => 2,
            Protocol::Sony => 3,
            Protocol::Rc5 => 4,
            Protocol::Rc5x => 5,
            Protocol::Rc6 => 6,
            Protocol::Samsung => 7,
            Protocol::Lg => 8,
            Protocol::Panasonic => 9,
            Protocol::Jvc => 10,
            Protocol::Sharp => 11,
        }
    }

    /// Inverse of [`Protocol::wire_id`]
    pub fn from_wire_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Human-readable name, as printed by protocol libraries
    pub fn name(self) -> &'static str {
        match self {
            Protocol::Unknown => "UNKNOWN",
            Protocol::Nec => "NEC",
            Protocol::NecLike => "NEC_LIKE",
            Protocol::Sony => "SONY",
            Protocol::Rc5 => "RC5",
            Protocol::Rc5x => "RC5X",
            Protocol::Rc6 => "RC6",
            Protocol::Samsung => "SAMSUNG",
            Protocol::Lg => "LG",
            Protocol::Panasonic => "PANASONIC",
            Protocol::Jvc => "JVC",
            Protocol::Sharp => "SHARP",
        }
    }

    /// Protocols the transmitter sends through a protocol-specific encoder first
    pub fn has_dedicated_encoder(self) -> bool {
        matches!(
            self,
            Protocol::Nec
                | Protocol::NecLike
                | Protocol::Sony
                | Protocol::Rc5
                | Protocol::Rc5x
                | Protocol::Rc6
        )
    }

    /// Carrier frequency used when this protocol is replayed from raw timing
    pub fn carrier_khz(self) -> u16 {
        match self {
            Protocol::Sony => 40,
            Protocol::Rc5 | Protocol::Rc5x | Protocol::Rc6 => 36,
            _ => DEFAULT_CARRIER_KHZ,
        }
    }

    /// Split a decoded value into address/command fields where the layout is known.
    pub fn fields(self, value: u32, bits: u16) -> Option<SignalFields> {
        match self {
            Protocol::Nec | Protocol::NecLike if bits == 32 => {
                let address = (value >> 24) as u8;
                let address_inv = (value >> 16) as u8;
                let command = (value >> 8) as u8;
                let command_inv = value as u8;
                Some(SignalFields {
                    address,
                    command,
                    integrity: Some(address == !address_inv && command == !command_inv),
                })
            }
            Protocol::Sony if bits >= 12 => Some(SignalFields {
                address: ((value >> 7) & 0x1F) as u8,
                command: (value & 0x7F) as u8,
                integrity: None,
            }),
            Protocol::Rc5 | Protocol::Rc5x | Protocol::Rc6 if bits >= 13 => Some(SignalFields {
                address: ((value >> 6) & 0x1F) as u8,
                command: (value & 0x3F) as u8,
                integrity: None,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Protocol {
    type Err = IrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.name() == upper)
            .ok_or_else(|| IrError::invalid(format!("unknown protocol '{}'", s)))
    }
}

/// Address/command breakdown of a decoded value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalFields {
    pub address: u8,
    pub command: u8,
    /// For protocols that carry inverted copies (NEC), whether they check out
    pub integrity: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_id_roundtrip() {
        for p in Protocol::ALL {
            assert_eq!(Protocol::from_wire_id(p.wire_id()), Some(p));
        }
        assert_eq!(Protocol::from_wire_id(200), None);
    }

    #[test]
    fn test_carrier_defaults() {
        assert_eq!(Protocol::Sony.carrier_khz(), 40);
        assert_eq!(Protocol::Rc5.carrier_khz(), 36);
        assert_eq!(Protocol::Rc6.carrier_khz(), 36);
        assert_eq!(Protocol::Nec.carrier_khz(), 38);
        assert_eq!(Protocol::Unknown.carrier_khz(), 38);
        assert_eq!(Protocol::Samsung.carrier_khz(), 38);
    }

    #[test]
    fn test_dedicated_encoders() {
        assert!(Protocol::Nec.has_dedicated_encoder());
        assert!(Protocol::Rc5x.has_dedicated_encoder());
        assert!(!Protocol::Unknown.has_dedicated_encoder());
        assert!(!Protocol::Samsung.has_dedicated_encoder());
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("nec".parse::<Protocol>().unwrap(), Protocol::Nec);
        assert_eq!("NEC-LIKE".parse::<Protocol>().unwrap(), Protocol::NecLike);
        assert!("morse".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_nec_fields() {
        // address 0x00, command 0xFF with valid inverses
        let f = Protocol::Nec.fields(0x00FF_FF00, 32).unwrap();
        assert_eq!(f.address, 0x00);
        assert_eq!(f.command, 0xFF);
        assert_eq!(f.integrity, Some(true));

        let broken = Protocol::Nec.fields(0x00FF_0000, 32).unwrap();
        assert_eq!(broken.integrity, Some(false));

        assert!(Protocol::Nec.fields(0x1234, 16).is_none());
    }

    #[test]
    fn test_sony_fields() {
        let value = (0x01 << 7) | 0x15;
        let f = Protocol::Sony.fields(value, 12).unwrap();
        assert_eq!(f.address, 0x01);
        assert_eq!(f.command, 0x15);
        assert_eq!(f.integrity, None);
    }
}

//! Persisted store image
//!
//! Binary layout written to non-volatile storage on every mutating store call:
//!
//! ```text
//! offset 0      marker (0xAB)
//! offset 1      number of valid records N (0..=MAX_SIGNALS)
//! offset 2      N packed records, ascending slot order, invalid slots skipped
//! ```
//!
//! Each record is `RECORD_SIZE` bytes, little-endian:
//!
//! | Offset | Size | Field                                  |
//! |--------|------|----------------------------------------|
//! | 0      | 1    | slot index                             |
//! | 1      | 1    | valid flag (always 1 on write)         |
//! | 2      | 1    | protocol wire id                       |
//! | 3      | 1    | reserved (0)                           |
//! | 4      | 4    | value                                  |
//! | 8      | 2    | bit count                              |
//! | 10     | 2    | timing length (0..=256)                |
//! | 12     | 512  | timing durations, zero padded          |
//! | 524    | 32   | name, NUL terminated                   |
//! | 556    | 4    | created-at milliseconds                |
//!
//! Decoding is all-or-nothing: any inconsistency yields
//! [`IrError::PersistenceCorrupt`] and the caller treats the store as empty.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{IrError, IrResult};
use crate::protocol::Protocol;
use crate::store::{SignalRecord, MAX_NAME_LEN, MAX_SIGNALS};
use crate::timing::{TimingSequence, MAX_TIMING_LEN};

/// Format marker in byte 0
pub const IMAGE_MARKER: u8 = 0xAB;

/// Header size (marker + count)
pub const HEADER_SIZE: usize = 2;

/// Serialized size of one record
pub const RECORD_SIZE: usize = 560;

/// Upper bound on the image size
pub const MAX_IMAGE_SIZE: usize = HEADER_SIZE + MAX_SIGNALS * RECORD_SIZE;

const NAME_FIELD: usize = MAX_NAME_LEN + 1;

fn corrupt(msg: impl Into<String>) -> IrError {
    IrError::PersistenceCorrupt(msg.into())
}

/// Serialize the valid slots into an image
pub fn encode_image(slots: &[Option<SignalRecord>]) -> IrResult<Vec<u8>> {
    let valid: Vec<(usize, &SignalRecord)> = slots
        .iter()
        .enumerate()
        .filter_map(|(i, s)| s.as_ref().map(|r| (i, r)))
        .collect();
    if valid.len() > MAX_SIGNALS {
        return Err(IrError::invalid(format!(
            "{} records exceed store capacity {}",
            valid.len(),
            MAX_SIGNALS
        )));
    }

    let mut buf = Vec::with_capacity(HEADER_SIZE + valid.len() * RECORD_SIZE);
    buf.push(IMAGE_MARKER);
    buf.push(valid.len() as u8);
    for (slot, record) in valid {
        write_record(&mut buf, slot, record)?;
    }
    Ok(buf)
}

fn write_record(buf: &mut Vec<u8>, slot: usize, record: &SignalRecord) -> IrResult<()> {
    let start = buf.len();
    buf.write_u8(slot as u8)?;
    buf.write_u8(1)?;
    buf.write_u8(record.protocol.wire_id())?;
    buf.write_u8(0)?;
    buf.write_u32::<LittleEndian>(record.value)?;
    buf.write_u16::<LittleEndian>(record.bits)?;
    buf.write_u16::<LittleEndian>(record.timing.len() as u16)?;
    for i in 0..MAX_TIMING_LEN {
        buf.write_u16::<LittleEndian>(record.timing.get(i).copied().unwrap_or(0))?;
    }
    let mut name = [0u8; NAME_FIELD];
    let bytes = record.name.as_bytes();
    let n = bytes.len().min(MAX_NAME_LEN);
    name[..n].copy_from_slice(&bytes[..n]);
    buf.write_all(&name)?;
    buf.write_u32::<LittleEndian>(record.created_at_millis)?;
    debug_assert_eq!(buf.len() - start, RECORD_SIZE);
    Ok(())
}

/// Parse an image back into a full slot array of `MAX_SIGNALS` entries
pub fn decode_image(bytes: &[u8]) -> IrResult<Vec<Option<SignalRecord>>> {
    if bytes.len() < HEADER_SIZE {
        return Err(corrupt(format!("image too short ({} bytes)", bytes.len())));
    }
    if bytes[0] != IMAGE_MARKER {
        return Err(corrupt(format!("bad marker 0x{:02X}", bytes[0])));
    }
    let count = bytes[1] as usize;
    if count > MAX_SIGNALS {
        return Err(corrupt(format!("record count {} exceeds {}", count, MAX_SIGNALS)));
    }
    let needed = HEADER_SIZE + count * RECORD_SIZE;
    if bytes.len() < needed {
        return Err(corrupt(format!(
            "image truncated: {} bytes, need {}",
            bytes.len(),
            needed
        )));
    }

    let mut slots: Vec<Option<SignalRecord>> = vec![None; MAX_SIGNALS];
    let mut cursor = Cursor::new(&bytes[HEADER_SIZE..needed]);
    for _ in 0..count {
        let (slot, record) = read_record(&mut cursor)?;
        if slots[slot].is_some() {
            return Err(corrupt(format!("slot {} stored twice", slot)));
        }
        slots[slot] = Some(record);
    }
    Ok(slots)
}

fn read_record(cursor: &mut Cursor<&[u8]>) -> IrResult<(usize, SignalRecord)> {
    let slot = cursor.read_u8().map_err(|e| corrupt(e.to_string()))? as usize;
    if slot >= MAX_SIGNALS {
        return Err(corrupt(format!("slot index {} out of range", slot)));
    }
    let valid = cursor.read_u8().map_err(|e| corrupt(e.to_string()))?;
    if valid != 1 {
        return Err(corrupt(format!("slot {} packed but not valid", slot)));
    }
    let wire = cursor.read_u8().map_err(|e| corrupt(e.to_string()))?;
    let protocol = Protocol::from_wire_id(wire)
        .ok_or_else(|| corrupt(format!("unknown protocol id {}", wire)))?;
    let _reserved = cursor.read_u8().map_err(|e| corrupt(e.to_string()))?;
    let value = cursor
        .read_u32::<LittleEndian>()
        .map_err(|e| corrupt(e.to_string()))?;
    let bits = cursor
        .read_u16::<LittleEndian>()
        .map_err(|e| corrupt(e.to_string()))?;
    let timing_len = cursor
        .read_u16::<LittleEndian>()
        .map_err(|e| corrupt(e.to_string()))? as usize;
    if timing_len > MAX_TIMING_LEN {
        return Err(corrupt(format!("timing length {} out of range", timing_len)));
    }
    let mut timing = [0u16; MAX_TIMING_LEN];
    cursor
        .read_u16_into::<LittleEndian>(&mut timing)
        .map_err(|e| corrupt(e.to_string()))?;

    let mut name = [0u8; NAME_FIELD];
    cursor
        .read_exact(&mut name)
        .map_err(|e| corrupt(e.to_string()))?;
    let end = name.iter().position(|&b| b == 0).unwrap_or(MAX_NAME_LEN);
    let name = std::str::from_utf8(&name[..end])
        .map_err(|_| corrupt(format!("slot {} name is not UTF-8", slot)))?
        .to_string();

    let created_at_millis = cursor
        .read_u32::<LittleEndian>()
        .map_err(|e| corrupt(e.to_string()))?;

    Ok((
        slot,
        SignalRecord {
            protocol,
            value,
            bits,
            timing: TimingSequence::from_slice_truncated(&timing[..timing_len]),
            name,
            created_at_millis,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: u32, name: &str) -> SignalRecord {
        SignalRecord {
            protocol: Protocol::Nec,
            value,
            bits: 32,
            timing: TimingSequence::from(&[9000u16, 4500, 560][..]),
            name: name.to_string(),
            created_at_millis: 1234,
        }
    }

    #[test]
    fn test_empty_image() {
        let slots = vec![None; MAX_SIGNALS];
        let image = encode_image(&slots).unwrap();
        assert_eq!(image, vec![IMAGE_MARKER, 0]);
        assert!(decode_image(&image).unwrap().iter().all(Option::is_none));
    }

    #[test]
    fn test_invalid_slots_skipped() {
        let mut slots = vec![None; MAX_SIGNALS];
        slots[0] = Some(record(1, "a"));
        slots[5] = Some(record(2, "b"));
        let image = encode_image(&slots).unwrap();
        assert_eq!(image.len(), HEADER_SIZE + 2 * RECORD_SIZE);
        assert_eq!(image[1], 2);
        // second packed record carries slot index 5
        assert_eq!(image[HEADER_SIZE + RECORD_SIZE], 5);

        let decoded = decode_image(&image).unwrap();
        assert_eq!(decoded[0], slots[0]);
        assert_eq!(decoded[5], slots[5]);
        assert!(decoded[1].is_none());
    }

    #[test]
    fn test_bad_marker() {
        let mut slots = vec![None; MAX_SIGNALS];
        slots[0] = Some(record(1, "a"));
        let mut image = encode_image(&slots).unwrap();
        image[0] = 0x00;
        assert!(matches!(
            decode_image(&image),
            Err(IrError::PersistenceCorrupt(_))
        ));
    }

    #[test]
    fn test_erased_device() {
        let image = vec![0xFFu8; MAX_IMAGE_SIZE];
        assert!(decode_image(&image).is_err());
    }

    #[test]
    fn test_count_out_of_range() {
        let mut image = vec![0u8; MAX_IMAGE_SIZE];
        image[0] = IMAGE_MARKER;
        image[1] = (MAX_SIGNALS + 1) as u8;
        assert!(decode_image(&image).is_err());
    }

    #[test]
    fn test_truncated_image() {
        let mut slots = vec![None; MAX_SIGNALS];
        slots[0] = Some(record(1, "a"));
        let image = encode_image(&slots).unwrap();
        assert!(decode_image(&image[..image.len() - 1]).is_err());
    }

    #[test]
    fn test_duplicate_slot_rejected() {
        let mut slots = vec![None; MAX_SIGNALS];
        slots[3] = Some(record(1, "a"));
        slots[4] = Some(record(2, "b"));
        let mut image = encode_image(&slots).unwrap();
        image[HEADER_SIZE + RECORD_SIZE] = 3;
        assert!(decode_image(&image).is_err());
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let mut slots = vec![None; MAX_SIGNALS];
        slots[2] = Some(record(7, "tv power"));
        let mut image = encode_image(&slots).unwrap();
        image.resize(MAX_IMAGE_SIZE, 0xFF);
        assert_eq!(decode_image(&image).unwrap()[2], slots[2]);
    }
}

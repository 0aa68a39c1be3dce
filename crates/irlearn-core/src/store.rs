//! Persistent signal slot store
//!
//! A fixed array of [`MAX_SIGNALS`] slots. Ids are 1-based slot indices and
//! never change: deleting a record only empties its slot, and the next
//! `add_signal` reuses the lowest free slot (first-fit). Every mutating call
//! rewrites the whole image to non-volatile storage before it returns; if
//! the write fails the in-memory change is rolled back, so the live and
//! persisted record counts always agree.
//!
//! Records are borrowed out of the store, so the borrow checker already
//! prevents holding one across `delete_signal`/`clear_all`. Callers that need
//! to remember a record between control-loop iterations take a
//! [`SignalHandle`] instead, which fails fast once the slot is deleted or
//! reused.

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{IrError, IrResult};
use crate::hal::NvStorage;
use crate::image::{self, HEADER_SIZE, MAX_IMAGE_SIZE, RECORD_SIZE};
use crate::protocol::Protocol;
use crate::timing::TimingSequence;

/// Number of slots
pub const MAX_SIGNALS: usize = 20;

/// Longest stored name in bytes (excluding terminator)
pub const MAX_NAME_LEN: usize = 31;

/// 1-based signal id (slot index + 1)
pub type SignalId = usize;

/// A stored signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalRecord {
    pub protocol: Protocol,
    pub value: u32,
    pub bits: u16,
    pub timing: TimingSequence,
    pub name: String,
    pub created_at_millis: u32,
}

/// Checked reference to a slot at a particular generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalHandle {
    id: SignalId,
    generation: u32,
}

impl SignalHandle {
    pub fn id(&self) -> SignalId {
        self.id
    }
}

/// Destination for learned signals
pub trait SignalSink {
    /// Number of valid records
    fn signal_count(&self) -> usize;

    /// Store a signal, returning its id
    fn add_signal(
        &mut self,
        protocol: Protocol,
        value: u32,
        bits: u16,
        timing: &[u16],
        name: Option<&str>,
    ) -> IrResult<SignalId>;
}

/// Cut at the first NUL, then truncate to at most [`MAX_NAME_LEN`] bytes on
/// a char boundary. The image stores names NUL terminated.
fn bounded_name(name: &str) -> String {
    let name = name.split('\0').next().unwrap_or_default();
    if name.len() <= MAX_NAME_LEN {
        return name.to_string();
    }
    let mut end = MAX_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

/// Fixed-capacity slot store with write-through persistence
pub struct SlotStore<S: NvStorage, C: Clock> {
    slots: Vec<Option<SignalRecord>>,
    generations: [u32; MAX_SIGNALS],
    count: usize,
    storage: S,
    clock: C,
}

impl<S: NvStorage, C: Clock> SlotStore<S, C> {
    /// Open the store, loading whatever image the device holds.
    ///
    /// A corrupt image (wrong marker, impossible count, malformed record) is
    /// logged and the store starts empty. A device too small for the bounded
    /// image, or a failed read, is an error.
    pub fn open(mut storage: S, clock: C) -> IrResult<Self> {
        if storage.capacity() < MAX_IMAGE_SIZE {
            return Err(IrError::Storage(format!(
                "device holds {} bytes, store image needs {}",
                storage.capacity(),
                MAX_IMAGE_SIZE
            )));
        }

        let bytes = storage.read_image()?;
        let slots = match image::decode_image(&bytes) {
            Ok(slots) => slots,
            Err(e) => {
                warn!("Store image rejected, starting empty: {}", e);
                vec![None; MAX_SIGNALS]
            }
        };
        let count = slots.iter().filter(|s| s.is_some()).count();
        info!(signals = count, "Signal store opened");

        Ok(Self {
            slots,
            generations: [0; MAX_SIGNALS],
            count,
            storage,
            clock,
        })
    }

    fn index_of(id: SignalId) -> IrResult<usize> {
        if id == 0 || id > MAX_SIGNALS {
            return Err(IrError::invalid(format!(
                "signal id {} outside 1..={}",
                id, MAX_SIGNALS
            )));
        }
        Ok(id - 1)
    }

    fn persist(&mut self) -> IrResult<()> {
        let image = image::encode_image(&self.slots)?;
        self.storage.write_image(&image)?;
        debug!(signals = self.count, bytes = image.len(), "Store persisted");
        Ok(())
    }

    /// Persist, restoring `previous` slot contents on failure
    fn commit(&mut self, previous: Vec<Option<SignalRecord>>, previous_count: usize) -> IrResult<()> {
        if let Err(e) = self.persist() {
            warn!("Persist failed, rolling back: {}", e);
            self.slots = previous;
            self.count = previous_count;
            return Err(e);
        }
        Ok(())
    }

    fn first_free_slot(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    /// Store a signal in the lowest free slot.
    ///
    /// `timing` is truncated to 256 durations; a missing name becomes
    /// `Signal_<id>`; names are truncated to 31 bytes.
    pub fn add_signal(
        &mut self,
        protocol: Protocol,
        value: u32,
        bits: u16,
        timing: &[u16],
        name: Option<&str>,
    ) -> IrResult<SignalId> {
        let slot = self.first_free_slot().ok_or_else(|| {
            warn!("Signal store is full");
            IrError::StoreFull {
                capacity: MAX_SIGNALS,
            }
        })?;
        let id = slot + 1;

        let record = SignalRecord {
            protocol,
            value,
            bits,
            timing: TimingSequence::from_slice_truncated(timing),
            name: match name {
                Some(n) => bounded_name(n),
                None => format!("Signal_{}", id),
            },
            created_at_millis: self.clock.now_millis() as u32,
        };

        let previous = self.slots.clone();
        let previous_count = self.count;
        self.slots[slot] = Some(record);
        self.count += 1;
        self.commit(previous, previous_count)?;
        self.generations[slot] = self.generations[slot].wrapping_add(1);

        info!(id, protocol = %protocol, value = format_args!("0x{:08X}", value), bits, "Signal stored");
        Ok(id)
    }

    /// Empty a slot. Fails for an id outside `1..=MAX_SIGNALS` or an empty slot.
    pub fn delete_signal(&mut self, id: SignalId) -> IrResult<()> {
        let slot = Self::index_of(id)?;
        if self.slots[slot].is_none() {
            return Err(IrError::NotFound(id));
        }

        let previous = self.slots.clone();
        let previous_count = self.count;
        self.slots[slot] = None;
        self.count -= 1;
        self.commit(previous, previous_count)?;
        self.generations[slot] = self.generations[slot].wrapping_add(1);

        info!(id, "Signal deleted");
        Ok(())
    }

    /// Look up a valid record. O(1).
    pub fn get_signal(&self, id: SignalId) -> Option<&SignalRecord> {
        let slot = Self::index_of(id).ok()?;
        self.slots[slot].as_ref()
    }

    /// Whether `id` names a valid record
    pub fn is_valid_id(&self, id: SignalId) -> bool {
        self.get_signal(id).is_some()
    }

    /// Empty every slot
    pub fn clear_all(&mut self) -> IrResult<()> {
        let previous = std::mem::replace(&mut self.slots, vec![None; MAX_SIGNALS]);
        let previous_count = self.count;
        self.count = 0;
        self.commit(previous, previous_count)?;
        for g in self.generations.iter_mut() {
            *g = g.wrapping_add(1);
        }
        info!("All signals cleared");
        Ok(())
    }

    /// Rename a record in place
    pub fn set_signal_name(&mut self, id: SignalId, name: &str) -> IrResult<()> {
        let slot = Self::index_of(id)?;
        let previous = self.slots.clone();
        let record = self.slots[slot].as_mut().ok_or(IrError::NotFound(id))?;
        record.name = bounded_name(name);
        let previous_count = self.count;
        self.commit(previous, previous_count)?;
        info!(id, name, "Signal renamed");
        Ok(())
    }

    /// Checked handle to the record currently in `id`
    pub fn handle(&self, id: SignalId) -> IrResult<SignalHandle> {
        let slot = Self::index_of(id)?;
        if self.slots[slot].is_none() {
            return Err(IrError::NotFound(id));
        }
        Ok(SignalHandle {
            id,
            generation: self.generations[slot],
        })
    }

    /// Resolve a handle; fails once the slot was deleted, cleared or reused
    pub fn resolve(&self, handle: SignalHandle) -> IrResult<&SignalRecord> {
        let slot = Self::index_of(handle.id)?;
        if self.generations[slot] != handle.generation {
            return Err(IrError::NotFound(handle.id));
        }
        self.slots[slot].as_ref().ok_or(IrError::NotFound(handle.id))
    }

    /// Valid records in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = (SignalId, &SignalRecord)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|r| (i + 1, r)))
    }

    pub fn signal_count(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        MAX_SIGNALS
    }

    pub fn free_slots(&self) -> usize {
        MAX_SIGNALS - self.count
    }

    /// Bytes the current image occupies on the device
    pub fn used_bytes(&self) -> usize {
        HEADER_SIZE + self.count * RECORD_SIZE
    }

    /// Access the storage backend
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Close the store and hand back the storage backend
    pub fn into_storage(self) -> S {
        self.storage
    }
}

impl<S: NvStorage, C: Clock> SignalSink for SlotStore<S, C> {
    fn signal_count(&self) -> usize {
        self.count
    }

    fn add_signal(
        &mut self,
        protocol: Protocol,
        value: u32,
        bits: u16,
        timing: &[u16],
        name: Option<&str>,
    ) -> IrResult<SignalId> {
        SlotStore::add_signal(self, protocol, value, bits, timing, name)
    }
}

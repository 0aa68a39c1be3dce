use irlearn_core::image::MAX_IMAGE_SIZE;
use irlearn_core::{IrResult, ManualClock, NvStorage, Protocol, SlotStore, MAX_SIGNALS};
use proptest::prelude::*;

struct Device(Vec<u8>);

impl NvStorage for Device {
    fn capacity(&self) -> usize {
        self.0.len()
    }

    fn read_image(&mut self) -> IrResult<Vec<u8>> {
        Ok(self.0.clone())
    }

    fn write_image(&mut self, image: &[u8]) -> IrResult<()> {
        self.0[..image.len()].copy_from_slice(image);
        Ok(())
    }
}

fn fresh_store() -> SlotStore<Device, ManualClock> {
    SlotStore::open(Device(vec![0xFF; MAX_IMAGE_SIZE]), ManualClock::starting_at(42)).unwrap()
}

fn protocol() -> impl Strategy<Value = Protocol> {
    prop::sample::select(Protocol::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn add_then_get_roundtrips_in_any_slot(
        filled in 0usize..MAX_SIGNALS,
        proto in protocol(),
        value in any::<u32>(),
        bits in 1u16..=32,
        timing in prop::collection::vec(any::<u16>(), 0..=256),
        name in "[a-zA-Z0-9 _]{1,31}",
    ) {
        let mut store = fresh_store();
        for i in 0..filled {
            store.add_signal(Protocol::Nec, i as u32 + 1, 32, &[], None).unwrap();
        }
        let id = store.add_signal(proto, value, bits, &timing, Some(&name)).unwrap();
        prop_assert_eq!(id, filled + 1);

        let rec = store.get_signal(id).unwrap();
        prop_assert_eq!(rec.protocol, proto);
        prop_assert_eq!(rec.value, value);
        prop_assert_eq!(rec.bits, bits);
        prop_assert_eq!(rec.timing.as_slice(), timing.as_slice());
        prop_assert_eq!(&rec.name, &name);

        // and again after a reload
        let reloaded = SlotStore::open(store.into_storage(), ManualClock::new()).unwrap();
        let again = reloaded.get_signal(id).unwrap();
        prop_assert_eq!(again.value, value);
        prop_assert_eq!(again.timing.as_slice(), timing.as_slice());
        prop_assert_eq!(reloaded.signal_count(), filled + 1);
    }

    #[test]
    fn delete_frees_lowest_slot_and_decrements_persisted_count(
        n in 1usize..=MAX_SIGNALS,
        victim_seed in any::<usize>(),
    ) {
        let mut store = fresh_store();
        for i in 0..n {
            store.add_signal(Protocol::Sony, i as u32 + 1, 12, &[], None).unwrap();
        }
        let victim = victim_seed % n + 1;
        let before = store.storage().0[1];
        store.delete_signal(victim).unwrap();
        prop_assert!(store.get_signal(victim).is_none());
        prop_assert_eq!(store.storage().0[1], before - 1);
        prop_assert_eq!(store.signal_count(), n - 1);

        let id = store.add_signal(Protocol::Sony, 0xABC, 12, &[], None).unwrap();
        prop_assert_eq!(id, victim);
    }

    #[test]
    fn corrupted_marker_opens_empty(marker in any::<u8>().prop_filter("not the marker", |m| *m != 0xAB)) {
        let mut store = fresh_store();
        store.add_signal(Protocol::Nec, 1, 32, &[9000, 4500], None).unwrap();
        let mut device = store.into_storage();
        device.0[0] = marker;
        let reopened = SlotStore::open(device, ManualClock::new()).unwrap();
        prop_assert_eq!(reopened.signal_count(), 0);
    }
}

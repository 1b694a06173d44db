//! Slotted layout for fixed-length records.
//!
//! A heap page is a slot bitmap followed by `num_slots` slots of exactly one
//! tuple each. Slot `i` is in use when bit `i % 8` of header byte `i / 8` is
//! set. Whatever remains after the last slot is zero padding, so an all-zero
//! page is a valid empty page.

/// View over the bytes of one page, interpreted as a heap page holding
/// tuples of `tuple_size` bytes.
pub struct HeapPage<B> {
    data: B,
    tuple_size: usize,
    num_slots: usize,
}

impl<B: AsRef<[u8]>> HeapPage<B> {
    pub fn new(data: B, tuple_size: usize) -> Self {
        let num_slots = Self::slots_per_page(data.as_ref().len(), tuple_size);
        Self {
            data,
            tuple_size,
            num_slots,
        }
    }

    /// Number of tuples of `tuple_size` bytes that fit on a page of
    /// `page_size` bytes, counting one header bit per tuple.
    pub fn slots_per_page(page_size: usize, tuple_size: usize) -> usize {
        (page_size * 8) / (tuple_size * 8 + 1)
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn header_len(&self) -> usize {
        self.num_slots.div_ceil(8)
    }

    pub fn is_slot_used(&self, slot: u16) -> bool {
        let slot = slot as usize;
        if slot >= self.num_slots {
            return false;
        }
        self.data.as_ref()[slot / 8] & (1 << (slot % 8)) != 0
    }

    pub fn free_slot_count(&self) -> usize {
        (0..self.num_slots)
            .filter(|&slot| !self.is_slot_used(slot as u16))
            .count()
    }

    /// Bytes of the tuple stored in `slot`, or `None` for a free or
    /// out-of-range slot.
    pub fn tuple(&self, slot: u16) -> Option<&[u8]> {
        if !self.is_slot_used(slot) {
            return None;
        }
        let start = self.slot_offset(slot);
        Some(&self.data.as_ref()[start..start + self.tuple_size])
    }

    /// Used slots paired with their bytes, in slot order.
    pub fn tuples(&self) -> impl Iterator<Item = (u16, &[u8])> + '_ {
        (0..self.num_slots as u16).filter_map(move |slot| self.tuple(slot).map(|t| (slot, t)))
    }

    fn slot_offset(&self, slot: u16) -> usize {
        self.header_len() + slot as usize * self.tuple_size
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> HeapPage<B> {
    /// Stores `tuple` in the lowest free slot and returns that slot, or
    /// `None` when the page has no free slot. `tuple` must be exactly
    /// `tuple_size` bytes long.
    pub fn insert_tuple(&mut self, tuple: &[u8]) -> Option<u16> {
        debug_assert_eq!(tuple.len(), self.tuple_size);
        let slot = (0..self.num_slots as u16).find(|&slot| !self.is_slot_used(slot))?;

        let start = self.slot_offset(slot);
        let tuple_size = self.tuple_size;
        let data = self.data.as_mut();
        data[start..start + tuple_size].copy_from_slice(tuple);
        data[slot as usize / 8] |= 1 << (slot % 8);

        Some(slot)
    }

    /// Frees `slot`. Returns false if the slot was not in use.
    pub fn delete_tuple(&mut self, slot: u16) -> bool {
        if !self.is_slot_used(slot) {
            return false;
        }

        let start = self.slot_offset(slot);
        let tuple_size = self.tuple_size;
        let data = self.data.as_mut();
        data[slot as usize / 8] &= !(1 << (slot % 8));
        data[start..start + tuple_size].fill(0);

        true
    }
}

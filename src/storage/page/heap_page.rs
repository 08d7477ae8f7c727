//! Slotted heap page with a fixed-width slot array.
//!
//! Layout of a page of `page_size` bytes holding tuples `w` bytes wide:
//!
//! ```text
//! +----------------------+---------+---------+-----+---------------+---------+
//! | occupancy bitmap     | slot 0  | slot 1  | ... | slot n-1      | padding |
//! | ceil(n / 8) bytes    | w bytes | w bytes |     | w bytes       | zeroes  |
//! +----------------------+---------+---------+-----+---------------+---------+
//! ```
//!
//! `n = floor(page_size * 8 / (w * 8 + 1))`, i.e. every slot costs its width
//! plus one header bit. Bit `i` lives in byte `i / 8`, most significant bit
//! first; a set bit marks an occupied slot.

use crate::access::tuple::{RecordId, Tuple};
use crate::access::tuple_desc::TupleDesc;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use parking_lot::RwLock;
use std::sync::Arc;

/// Shared handle to a page resident in the buffer pool.
pub type PageRef = Arc<RwLock<HeapPage>>;

#[derive(Debug, Clone)]
pub struct HeapPage {
    page_id: PageId,
    desc: Arc<TupleDesc>,
    data: Vec<u8>,
    num_slots: usize,
    before_image: Vec<u8>,
}

impl HeapPage {
    /// Number of slots a page of `page_size` bytes offers for tuples `tuple_width` bytes wide.
    pub fn num_slots_for(page_size: usize, tuple_width: usize) -> usize {
        (page_size * 8) / (tuple_width * 8 + 1)
    }

    /// An all-zero page image: every slot empty.
    pub fn empty_page_data(page_size: usize) -> Vec<u8> {
        vec![0u8; page_size]
    }

    /// Decodes a page from its on-disk image. The image must be exactly
    /// `page_size` bytes.
    pub fn from_bytes(
        page_id: PageId,
        desc: Arc<TupleDesc>,
        data: Vec<u8>,
        page_size: usize,
    ) -> StorageResult<Self> {
        if data.len() != page_size {
            return Err(StorageError::InvalidPageImage {
                expected: page_size,
                actual: data.len(),
            });
        }
        let num_slots = Self::num_slots_for(page_size, desc.byte_size());
        Ok(Self {
            page_id,
            desc,
            before_image: data.clone(),
            data,
            num_slots,
        })
    }

    /// A fresh page with no occupied slots.
    pub fn empty(page_id: PageId, desc: Arc<TupleDesc>, page_size: usize) -> Self {
        let data = Self::empty_page_data(page_size);
        let num_slots = Self::num_slots_for(page_size, desc.byte_size());
        Self {
            page_id,
            desc,
            before_image: data.clone(),
            data,
            num_slots,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn page_size(&self) -> usize {
        self.data.len()
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn header_size(&self) -> usize {
        self.num_slots.div_ceil(8)
    }

    /// The exact byte image written to disk.
    pub fn page_data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        if slot >= self.num_slots {
            return false;
        }
        self.data[slot / 8] & (0x80 >> (slot % 8)) != 0
    }

    pub fn num_empty_slots(&self) -> usize {
        (0..self.num_slots).filter(|&i| !self.is_slot_used(i)).count()
    }

    /// Stores `tuple` in the lowest free slot and stamps its record id.
    pub fn insert_tuple(&mut self, tuple: &mut Tuple) -> StorageResult<RecordId> {
        if **tuple.desc() != *self.desc {
            return Err(StorageError::SchemaMismatch(format!(
                "Tuple desc [{}] does not match page desc [{}]",
                tuple.desc(),
                self.desc
            )));
        }

        let slot = (0..self.num_slots)
            .find(|&i| !self.is_slot_used(i))
            .ok_or(StorageError::PageFull {
                page_id: self.page_id,
                num_slots: self.num_slots,
            })?;

        let bytes = tuple.serialize()?;
        let offset = self.slot_offset(slot);
        self.data[offset..offset + bytes.len()].copy_from_slice(&bytes);
        self.mark_slot_used(slot, true);

        let record_id = RecordId::new(self.page_id, slot);
        tuple.set_record_id(Some(record_id));
        Ok(record_id)
    }

    /// Frees the slot named by the tuple's record id. The slot bytes are left
    /// in place; they are ignored while the bit is clear.
    pub fn delete_tuple(&mut self, tuple: &mut Tuple) -> StorageResult<()> {
        let record_id = tuple
            .record_id()
            .ok_or_else(|| StorageError::TupleNotFound("tuple has no record id".to_string()))?;

        if record_id.page_id != self.page_id {
            return Err(StorageError::TupleNotFound(format!(
                "record {}/{} is not on page {}",
                record_id.page_id, record_id.slot, self.page_id
            )));
        }
        if !self.is_slot_used(record_id.slot) {
            return Err(StorageError::TupleNotFound(format!(
                "slot {} on page {} is empty",
                record_id.slot, self.page_id
            )));
        }

        self.mark_slot_used(record_id.slot, false);
        tuple.set_record_id(None);
        Ok(())
    }

    /// Reads the tuple in `slot`, `None` if the slot is empty.
    pub fn tuple_at(&self, slot: usize) -> StorageResult<Option<Tuple>> {
        if slot >= self.num_slots {
            return Err(StorageError::InvalidSlotId {
                slot_id: slot,
                max_slot: self.num_slots,
            });
        }
        if !self.is_slot_used(slot) {
            return Ok(None);
        }
        let offset = self.slot_offset(slot);
        let width = self.desc.byte_size();
        let mut tuple = Tuple::deserialize(self.desc.clone(), &self.data[offset..offset + width])?;
        tuple.set_record_id(Some(RecordId::new(self.page_id, slot)));
        Ok(Some(tuple))
    }

    /// Occupied tuples in ascending slot order. Each call starts from slot 0
    /// and sees the page as it is at that moment.
    pub fn iter(&self) -> HeapPageIter<'_> {
        HeapPageIter {
            page: self,
            next_slot: 0,
        }
    }

    /// Records the current contents as the last committed image.
    pub fn set_before_image(&mut self) {
        self.before_image = self.data.clone();
    }

    /// The page as it was when last loaded from disk or committed.
    pub fn before_image(&self) -> HeapPage {
        Self {
            page_id: self.page_id,
            desc: self.desc.clone(),
            data: self.before_image.clone(),
            num_slots: self.num_slots,
            before_image: self.before_image.clone(),
        }
    }

    fn slot_offset(&self, slot: usize) -> usize {
        self.header_size() + slot * self.desc.byte_size()
    }

    fn mark_slot_used(&mut self, slot: usize, used: bool) {
        let mask = 0x80u8 >> (slot % 8);
        if used {
            self.data[slot / 8] |= mask;
        } else {
            self.data[slot / 8] &= !mask;
        }
    }
}

impl PartialEq for HeapPage {
    fn eq(&self, other: &Self) -> bool {
        self.page_id == other.page_id && self.desc == other.desc && self.data == other.data
    }
}

pub struct HeapPageIter<'a> {
    page: &'a HeapPage,
    next_slot: usize,
}

impl Iterator for HeapPageIter<'_> {
    type Item = StorageResult<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next_slot < self.page.num_slots {
            let slot = self.next_slot;
            self.next_slot += 1;
            match self.page.tuple_at(slot) {
                Ok(Some(tuple)) => return Some(Ok(tuple)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

//! The slotted page layout.

use crate::errors::StorageError;
use crate::transaction::TransactionId;
use crate::tuple::{Tuple, TupleDesc};
use crate::{PageId, RecordId, PAGE_SIZE};

/// A fixed-size page holding fixed-width tuples behind a slot bitmap.
///
/// The on-disk layout is a `ceil(slots / 8)` byte bitmap (bit `i % 8` of
/// byte `i / 8` marks slot `i` occupied) followed by the slot bodies in
/// slot order. Empty slots are zeroed, as is the tail of the page.
#[derive(Debug, Clone)]
pub struct HeapPage {
    pid: PageId,
    desc: TupleDesc,
    slots: Vec<Option<Tuple>>,
    dirtied_by: Option<TransactionId>,
}

impl HeapPage {
    /// Number of tuple slots a page with this schema holds.
    pub fn slots_per_page(desc: &TupleDesc) -> usize {
        (PAGE_SIZE * 8) / (desc.tuple_bytes() * 8 + 1)
    }

    fn header_bytes(slot_count: usize) -> usize {
        slot_count.div_ceil(8)
    }

    /// A fresh page with every slot empty.
    pub fn empty(pid: PageId, desc: TupleDesc) -> HeapPage {
        let slots = vec![None; Self::slots_per_page(&desc)];
        HeapPage {
            pid,
            desc,
            slots,
            dirtied_by: None,
        }
    }

    /// Decodes a page from exactly [`PAGE_SIZE`] bytes.
    pub fn from_bytes(pid: PageId, desc: TupleDesc, data: &[u8]) -> Result<HeapPage, StorageError> {
        if data.len() != PAGE_SIZE {
            return Err(StorageError::Invariant(format!(
                "page {pid:?} decoded from {} bytes, want {PAGE_SIZE}",
                data.len()
            )));
        }
        let slot_count = Self::slots_per_page(&desc);
        let header = Self::header_bytes(slot_count);
        let tuple_bytes = desc.tuple_bytes();
        let mut slots = Vec::with_capacity(slot_count);
        for i in 0..slot_count {
            let used = data[i / 8] & (1 << (i % 8)) != 0;
            if !used {
                slots.push(None);
                continue;
            }
            let start = header + i * tuple_bytes;
            let body = data.get(start..start + tuple_bytes).ok_or_else(|| {
                StorageError::Invariant(format!("slot {i} of page {pid:?} runs past the page"))
            })?;
            let mut tuple = Tuple::read_bytes(desc.clone(), body)?;
            tuple.set_record_id(Some(RecordId {
                page_id: pid,
                slot: i as u16,
            }));
            slots.push(Some(tuple));
        }
        Ok(HeapPage {
            pid,
            desc,
            slots,
            dirtied_by: None,
        })
    }

    /// Encodes the page to exactly [`PAGE_SIZE`] bytes.
    pub fn page_data(&self) -> Vec<u8> {
        let mut data = vec![0u8; Self::header_bytes(self.slots.len())];
        for (i, slot) in self.slots.iter().enumerate() {
            if slot.is_some() {
                data[i / 8] |= 1 << (i % 8);
            }
        }
        let tuple_bytes = self.desc.tuple_bytes();
        for slot in &self.slots {
            match slot {
                Some(tuple) => tuple.write_bytes(&mut data),
                None => data.resize(data.len() + tuple_bytes, 0),
            }
        }
        data.resize(PAGE_SIZE, 0);
        data
    }

    pub fn id(&self) -> PageId {
        self.pid
    }

    pub fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }

    pub fn empty_slot_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }

    /// Stores the tuple in the first empty slot and stamps its record id.
    pub fn insert_tuple(&mut self, mut tuple: Tuple) -> Result<RecordId, StorageError> {
        if *tuple.desc() != self.desc {
            return Err(StorageError::Invariant(
                "tuple schema does not match the page schema".to_string(),
            ));
        }
        let slot = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or_else(|| StorageError::Invariant(format!("page {:?} is full", self.pid)))?;
        let rid = RecordId {
            page_id: self.pid,
            slot: slot as u16,
        };
        tuple.set_record_id(Some(rid));
        self.slots[slot] = Some(tuple);
        Ok(rid)
    }

    /// Clears the slot named by the tuple's record id.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> Result<(), StorageError> {
        let rid = tuple.record_id().ok_or_else(|| {
            StorageError::Invariant("delete of a tuple with no record id".to_string())
        })?;
        if rid.page_id != self.pid {
            return Err(StorageError::Invariant(format!(
                "record id {rid:?} does not belong to page {:?}",
                self.pid
            )));
        }
        let slot = self.slots.get_mut(rid.slot as usize).ok_or_else(|| {
            StorageError::Invariant(format!("record id {rid:?} names a slot past the page"))
        })?;
        if slot.take().is_none() {
            return Err(StorageError::Invariant(format!(
                "slot {} of page {:?} is already empty",
                rid.slot, self.pid
            )));
        }
        Ok(())
    }

    /// The occupied slots, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Tuple> {
        self.slots.iter().flatten()
    }

    pub fn mark_dirty(&mut self, tid: Option<TransactionId>) {
        self.dirtied_by = tid;
    }

    /// The transaction that dirtied this page, if any.
    pub fn dirtied_by(&self) -> Option<TransactionId> {
        self.dirtied_by
    }
}

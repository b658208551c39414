use std::fmt;

use crate::{
    errors::InternalPoolError,
    ids::SlotId,
    types::{TypeInfo, Value},
};

/// Fixed size, write-once storage for the values of one running instance
///
/// Slot positions are assigned by the resolver, the launcher writes each slot exactly once
/// in plan order. After a successful launch the pool is only ever read.
pub struct ValuePool {
    slots: Box<[Option<Value>]>,
}
impl fmt::Debug for ValuePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for slot in self.slots.iter() {
            match slot {
                Some(value) => list.entry(&value.info.type_name),
                None => list.entry(&"<unwritten>"),
            };
        }
        list.finish()
    }
}

impl ValuePool {
    pub fn new(size: usize) -> Self {
        Self {
            slots: (0..size).map(|_| None).collect(),
        }
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Writes a slot, failing if anything has been written there before
    pub fn store(&mut self, slot: SlotId, value: Value) -> Result<(), InternalPoolError> {
        let size = self.size();
        let entry = self
            .slots
            .get_mut(slot.index())
            .ok_or(InternalPoolError::OutOfBounds { slot, size })?;

        if entry.is_some() {
            return Err(InternalPoolError::AlreadyWritten { slot });
        }

        *entry = Some(value);
        Ok(())
    }

    pub fn read(&self, slot: SlotId) -> Result<&Value, InternalPoolError> {
        self.slots
            .get(slot.index())
            .ok_or(InternalPoolError::OutOfBounds {
                slot,
                size: self.size(),
            })?
            .as_ref()
            .ok_or(InternalPoolError::Unwritten { slot })
    }

    pub fn is_written(&self, slot: SlotId) -> bool {
        matches!(self.slots.get(slot.index()), Some(Some(_)))
    }

    /// Types of every slot, `None` for slots that were never written
    pub fn shape(&self) -> Vec<Option<TypeInfo>> {
        self.slots
            .iter()
            .map(|slot| slot.as_ref().map(|value| value.info))
            .collect()
    }
}

//! Byte-level model of the vulnerable slot table.
//!
//! Slots hold a raw chunk address and a tag. Deleting a slot frees the chunk
//! but clears neither, so the slot keeps claiming its variant and every later
//! action reads its function pointer out of whatever the chunk holds now.

use common::{Action, AllocationData, CharacterKind, Handler, SlotError, SLOT_COUNT};
use log::{debug, warn};

use crate::character::Draft;
use crate::heap::{Heap, RecordLayout};
use crate::table::{slot_index, Dispatch, Release, SlotMachine};

const NULL: u64 = 0;

#[derive(Debug, Default)]
pub struct LegacyTable {
    heap: Heap,
    characters: [u64; SLOT_COUNT],
    slot_types: [Option<CharacterKind>; SLOT_COUNT],
    /// Slots that went through delete at least once
    released: [bool; SLOT_COUNT],
}

impl LegacyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunk address held by slot `index`, `None` for a null pointer
    pub fn pointer(&self, index: usize) -> Option<u64> {
        self.characters.get(index).copied().filter(|&p| p != NULL)
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    fn write_draft(&mut self, address: u64, layout: &RecordLayout, draft: &Draft) {
        let heap = &mut self.heap;
        match draft {
            Draft::Wizard { name, pet_name: second }
            | Draft::Necromancer { name, spirit_name: second } => {
                heap.write_cstr(address, layout.name, name);
                if let Some(offset) = layout.second_name {
                    heap.write_cstr(address, offset, second);
                }
            }
            Draft::Sorcerer { name } | Draft::Alchemist { name } => {
                heap.write_cstr(address, layout.name, name);
            }
            Draft::Human { name, age } => {
                heap.write_cstr(address, layout.name, name);
                // An unreadable age leaves whatever the chunk held
                if let (Some(age), Some(offset)) = (age, layout.age) {
                    heap.write(address, offset, &(*age as i32).to_le_bytes());
                }
            }
        }

        for &(action, offset) in layout.handlers {
            heap.write(address, offset, &action.handler().address().to_le_bytes());
        }
    }

    fn live(&self, index: i64) -> Result<(usize, u64), SlotError> {
        let i = slot_index(index)?;
        let address = self.pointer(i).ok_or(SlotError::SlotEmpty(i))?;
        Ok((i, address))
    }
}

impl SlotMachine for LegacyTable {
    fn check_vacant(&self, index: i64) -> Result<usize, SlotError> {
        let i = slot_index(index)?;
        match self.pointer(i) {
            Some(_) => Err(SlotError::SlotOccupied(i)),
            None => Ok(i),
        }
    }

    fn create(&mut self, index: i64, draft: &Draft) -> Result<CharacterKind, SlotError> {
        let i = self.check_vacant(index)?;
        let kind = draft.kind();
        let layout = RecordLayout::of(kind);

        let address = self.heap.malloc(layout.size);
        self.write_draft(address, &layout, draft);
        self.characters[i] = address;
        self.slot_types[i] = Some(kind);

        debug!("slot {}: {:?} at {:#x}", i, kind, address);
        Ok(kind)
    }

    fn delete(&mut self, index: i64) -> Result<Release, SlotError> {
        let (i, address) = self.live(index)?;
        self.released[i] = true;

        // Neither the pointer nor the tag is reset
        match self.heap.free(address) {
            Ok(()) => {
                debug!("slot {}: freed {:#x}, tag stays {:?}", i, address, self.slot_types[i]);
                Ok(Release::Freed)
            }
            Err(fault) => Ok(Release::Crash(fault)),
        }
    }

    fn check_live(&self, index: i64) -> Result<CharacterKind, SlotError> {
        let (i, _) = self.live(index)?;
        self.slot_types[i].ok_or(SlotError::SlotEmpty(i))
    }

    fn act(&self, index: i64, choice: Option<i64>) -> Result<Dispatch, SlotError> {
        let kind = self.check_live(index)?;
        let (i, address) = self.live(index)?;
        let layout = RecordLayout::of(kind);

        if self.is_dangling(i) {
            warn!("slot {}: dispatching {:?} through released chunk {:#x}", i, kind, address);
        }

        if kind == CharacterKind::Human {
            let name = self.heap.read_cstr(address, layout.name).unwrap_or_default();
            let age = layout
                .age
                .and_then(|offset| self.heap.read_i32(address, offset))
                .unwrap_or_default();
            return Ok(Dispatch::Describe { name, age });
        }

        let action = choice
            .and_then(|choice| Action::select(kind, choice))
            .ok_or(SlotError::InvalidChoice)?;
        let offset = layout.handler_offset(action).ok_or(SlotError::InvalidChoice)?;
        let target = self.heap.read_u64(address, offset).unwrap_or(NULL);

        match Handler::at(target) {
            Some(handler) => {
                if handler != action.handler() {
                    warn!("slot {}: {:?} redirected to {:?}", i, action, handler);
                }
                Ok(Dispatch::Invoked(handler))
            }
            None => {
                warn!("slot {}: call to unmapped address {:#x}", i, target);
                Ok(Dispatch::Crash(common::Fault::SegmentationFault { address: target }))
            }
        }
    }

    fn tag(&self, index: usize) -> Option<CharacterKind> {
        self.slot_types.get(index).copied().flatten()
    }

    fn is_dangling(&self, index: usize) -> bool {
        let Some(address) = self.pointer(index) else {
            return false;
        };
        self.released[index] || self.heap.is_freed(address) == Some(true)
    }

    fn message(&self, error: &SlotError) -> String {
        match error {
            // The target has a single message for both range and null checks
            SlotError::SlotEmpty(_) => SlotError::InvalidSlotIndex(0).to_string(),
            other => other.to_string(),
        }
    }

    fn allocations(&self) -> Vec<AllocationData> {
        self.heap.allocations()
    }
}

use common::{AllocationData, CharacterKind, Fault, Handler, SlotError, SLOT_COUNT};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::character::{Character, Draft};
use crate::legacy::LegacyTable;

/// Which rendition of the slot table a session drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Deleting a slot empties it, dispatch is a `match`
    #[default]
    Hardened,
    /// Byte-level model of the vulnerable target, stale tags included
    Legacy,
}

impl Mode {
    /// A fresh, empty table of this rendition
    pub fn build(&self, name_limit: usize) -> Box<dyn SlotMachine> {
        match self {
            Mode::Hardened => Box::new(SlotTable::new(name_limit)),
            // The target copies names without any bound
            Mode::Legacy => Box::new(LegacyTable::new()),
        }
    }
}

/// What performing an action produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Control reached a handler
    Invoked(Handler),
    /// A human introduced itself. The name is printed byte for byte.
    Describe { name: Vec<u8>, age: i32 },
    /// The target died while dispatching
    Crash(Fault),
}

/// Result of a successful delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    Freed,
    /// The allocator aborted the process
    Crash(Fault),
}

/// The allocate/select/free/dispatch state machine behind the menu.
///
/// `check_vacant` and `check_live` run before the console asks for a variant
/// or an action so that the prompts happen in the same order as the target.
pub trait SlotMachine {
    /// Fails unless `index` names a slot a record can be created in
    fn check_vacant(&self, index: i64) -> Result<usize, SlotError>;

    /// Create a record from `draft` in slot `index`
    fn create(&mut self, index: i64, draft: &Draft) -> Result<CharacterKind, SlotError>;

    /// Release the record in slot `index`
    fn delete(&mut self, index: i64) -> Result<Release, SlotError>;

    /// The tag dispatch will use for slot `index`
    fn check_live(&self, index: i64) -> Result<CharacterKind, SlotError>;

    /// Dispatch the action menu `choice` on slot `index`
    fn act(&self, index: i64, choice: Option<i64>) -> Result<Dispatch, SlotError>;

    /// Current tag of slot `index`
    fn tag(&self, index: usize) -> Option<CharacterKind>;

    /// Whether the tag of slot `index` refers to released storage
    fn is_dangling(&self, _index: usize) -> bool {
        false
    }

    /// Console line for a rejected request
    fn message(&self, error: &SlotError) -> String {
        error.to_string()
    }

    /// Allocation ledger, empty unless the table models a heap
    fn allocations(&self) -> Vec<AllocationData> {
        Vec::new()
    }
}

/// Range-check a typed slot index
pub fn slot_index(index: i64) -> Result<usize, SlotError> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < SLOT_COUNT)
        .ok_or(SlotError::InvalidSlotIndex(index))
}

/// Five slots, each owning at most one record.
///
/// The tag of a slot is derived from the record it owns, so a deleted slot
/// cannot keep claiming a variant.
#[derive(Debug)]
pub struct SlotTable {
    slots: [Option<Box<Character>>; SLOT_COUNT],
    name_limit: usize,
}

impl SlotTable {
    pub fn new(name_limit: usize) -> Self {
        Self {
            slots: Default::default(),
            name_limit,
        }
    }

    /// Record held by slot `index`, if any
    pub fn get(&self, index: usize) -> Option<&Character> {
        self.slots.get(index)?.as_deref()
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    fn live(&self, index: i64) -> Result<&Character, SlotError> {
        let i = slot_index(index)?;
        self.slots[i].as_deref().ok_or(SlotError::SlotEmpty(i))
    }
}

impl SlotMachine for SlotTable {
    fn check_vacant(&self, index: i64) -> Result<usize, SlotError> {
        let i = slot_index(index)?;
        match self.slots[i] {
            Some(_) => Err(SlotError::SlotOccupied(i)),
            None => Ok(i),
        }
    }

    fn create(&mut self, index: i64, draft: &Draft) -> Result<CharacterKind, SlotError> {
        let i = self.check_vacant(index)?;
        let character = Character::from_draft(draft, self.name_limit)?;
        let kind = character.kind();

        debug!("slot {}: created {:?}", i, kind);
        self.slots[i] = Some(Box::new(character));
        Ok(kind)
    }

    fn delete(&mut self, index: i64) -> Result<Release, SlotError> {
        let i = slot_index(index)?;
        let character = self.slots[i].take().ok_or(SlotError::SlotEmpty(i))?;

        debug!("slot {}: deleted {:?}", i, character.kind());
        Ok(Release::Freed)
    }

    fn check_live(&self, index: i64) -> Result<CharacterKind, SlotError> {
        Ok(self.live(index)?.kind())
    }

    fn act(&self, index: i64, choice: Option<i64>) -> Result<Dispatch, SlotError> {
        self.live(index)?.perform(choice)
    }

    fn tag(&self, index: usize) -> Option<CharacterKind> {
        self.get(index).map(Character::kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::NAME_LIMIT;

    fn wizard() -> Draft {
        Draft::Wizard { name: "Merlin".into(), pet_name: "Archie".into() }
    }

    #[test]
    fn test_slot_index_range() {
        assert_eq!(slot_index(0), Ok(0));
        assert_eq!(slot_index(4), Ok(4));
        assert_eq!(slot_index(5), Err(SlotError::InvalidSlotIndex(5)));
        assert_eq!(slot_index(-1), Err(SlotError::InvalidSlotIndex(-1)));
        assert_eq!(slot_index(i64::MAX), Err(SlotError::InvalidSlotIndex(i64::MAX)));
    }

    #[test]
    fn test_create_then_delete_empties_slot() {
        let mut table = SlotTable::new(NAME_LIMIT);

        assert_eq!(table.create(2, &wizard()), Ok(CharacterKind::Wizard));
        assert_eq!(table.tag(2), Some(CharacterKind::Wizard));
        assert_eq!(table.occupied(), 1);

        assert_eq!(table.delete(2), Ok(Release::Freed));
        assert_eq!(table.tag(2), None);
        assert!(table.get(2).is_none());
        assert_eq!(table.occupied(), 0);
    }

    #[test]
    fn test_rejected_create_leaves_slot_empty() {
        let mut table = SlotTable::new(NAME_LIMIT);
        let draft = Draft::Sorcerer { name: vec![b's'; 64] };

        assert!(matches!(table.create(0, &draft), Err(SlotError::NameTooLong { .. })));
        assert_eq!(table.tag(0), None);
        assert_eq!(table.check_vacant(0), Ok(0));
    }

    #[test]
    fn test_configured_name_limit() {
        let mut table = SlotTable::new(4);
        let draft = Draft::Alchemist { name: "Paracelsus".into() };

        assert_eq!(table.create(1, &draft), Err(SlotError::NameTooLong { len: 10, max: 4 }));
        assert_eq!(table.create(1, &Draft::Alchemist { name: "Nic".into() }), Ok(CharacterKind::Alchemist));
    }

    #[test]
    fn test_tag_never_outlives_record() {
        let mut table = SlotTable::new(NAME_LIMIT);
        for i in 0..SLOT_COUNT as i64 {
            table.create(i, &wizard()).unwrap();
        }
        for i in 0..SLOT_COUNT {
            table.delete(i as i64).unwrap();
            assert_eq!(table.tag(i), None);
            assert!(!table.is_dangling(i));
        }
        assert!(table.allocations().is_empty());
    }

    #[test]
    fn test_empty_slot_message() {
        let table = SlotTable::new(NAME_LIMIT);
        let error = table.check_live(3).unwrap_err();
        assert_eq!(table.message(&error), "Slot is empty.");
    }
}

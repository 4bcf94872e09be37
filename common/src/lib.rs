use ark_serialize::{
    CanonicalDeserialize, CanonicalSerialize, Compress, Read, SerializationError, Valid, Validate, Write,
};
use thiserror::Error;

/// Number of character slots in a table
pub const SLOT_COUNT: usize = 5;

/// Size of every name buffer, terminator included
pub const NAME_CAPACITY: usize = 64;

/// Longest name that fits a buffer next to its terminator
pub const NAME_LIMIT: usize = NAME_CAPACITY - 1;

/// Errors reported back to the menu loop. None of them are fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    #[error("Invalid slot.")]
    InvalidSlotIndex(i64),
    #[error("Slot already occupied.")]
    SlotOccupied(usize),
    #[error("Slot is empty.")]
    SlotEmpty(usize),
    #[error("Invalid choice.")]
    InvalidChoice,
    #[error("Name too long.")]
    NameTooLong { len: usize, max: usize },
}

impl SlotError {
    /// Status code stored in the session trace
    pub fn status(&self) -> EventStatus {
        match self {
            SlotError::InvalidSlotIndex(_) => EventStatus::InvalidSlotIndex,
            SlotError::SlotOccupied(_) => EventStatus::SlotOccupied,
            SlotError::SlotEmpty(_) => EventStatus::SlotEmpty,
            SlotError::InvalidChoice => EventStatus::InvalidChoice,
            SlotError::NameTooLong { .. } => EventStatus::NameTooLong,
        }
    }
}

/// Process-terminating faults of the simulated target
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    #[error("Segmentation fault")]
    SegmentationFault { address: u64 },
    #[error("free(): double free detected in tcache 2")]
    DoubleFree { address: u64 },
    #[error("free(): invalid pointer")]
    InvalidPointer { address: u64 },
}

impl Fault {
    /// Exit status a shell would report for the signal
    pub fn exit_code(&self) -> i32 {
        match self {
            // SIGSEGV
            Fault::SegmentationFault { .. } => 139,
            // SIGABRT
            Fault::DoubleFree { .. } | Fault::InvalidPointer { .. } => 134,
        }
    }

    pub fn address(&self) -> u64 {
        match self {
            Fault::SegmentationFault { address }
            | Fault::DoubleFree { address }
            | Fault::InvalidPointer { address } => *address,
        }
    }
}

/// The five kinds of character a slot can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacterKind {
    Wizard,
    Necromancer,
    Sorcerer,
    Alchemist,
    Human,
}

impl CharacterKind {
    pub const ALL: [CharacterKind; 5] = [
        CharacterKind::Wizard,
        CharacterKind::Necromancer,
        CharacterKind::Sorcerer,
        CharacterKind::Alchemist,
        CharacterKind::Human,
    ];

    /// Map a creation menu choice (1-5) to a kind
    pub fn from_choice(choice: i64) -> Option<Self> {
        match choice {
            1 => Some(CharacterKind::Wizard),
            2 => Some(CharacterKind::Necromancer),
            3 => Some(CharacterKind::Sorcerer),
            4 => Some(CharacterKind::Alchemist),
            5 => Some(CharacterKind::Human),
            _ => None,
        }
    }

    /// Tag code, 0 is reserved for an empty slot
    pub fn code(&self) -> u8 {
        match self {
            CharacterKind::Wizard => 1,
            CharacterKind::Necromancer => 2,
            CharacterKind::Sorcerer => 3,
            CharacterKind::Alchemist => 4,
            CharacterKind::Human => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::from_choice(code as i64)
    }

    /// Lowercase name used in prompts
    pub fn label(&self) -> &'static str {
        match self {
            CharacterKind::Wizard => "wizard",
            CharacterKind::Necromancer => "necromancer",
            CharacterKind::Sorcerer => "sorcerer",
            CharacterKind::Alchemist => "alchemist",
            CharacterKind::Human => "human",
        }
    }

    /// Actions offered by the action menu, in menu order
    pub fn actions(&self) -> &'static [Action] {
        match self {
            CharacterKind::Wizard => &[Action::Fly, Action::Magic],
            CharacterKind::Necromancer => &[Action::InvokeSpirit],
            CharacterKind::Sorcerer => &[Action::CastSpell],
            CharacterKind::Alchemist => &[Action::MixPotion],
            CharacterKind::Human => &[],
        }
    }
}

/// An ability a character can perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Fly,
    Magic,
    InvokeSpirit,
    CastSpell,
    MixPotion,
}

impl Action {
    /// Resolve a 1-based action menu choice for `kind`
    pub fn select(kind: CharacterKind, choice: i64) -> Option<Self> {
        let index = usize::try_from(choice.checked_sub(1)?).ok()?;
        kind.actions().get(index).copied()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Action::Fly => "Fly",
            Action::Magic => "Magic",
            Action::InvokeSpirit => "Invoke Spirit",
            Action::CastSpell => "Cast Spell",
            Action::MixPotion => "Mix Potion",
        }
    }

    /// The fixed handler installed for this action
    pub fn handler(&self) -> Handler {
        match self {
            Action::Fly => Handler::Fly,
            Action::Magic => Handler::Magic,
            Action::InvokeSpirit => Handler::Spirit,
            Action::CastSpell => Handler::Spell,
            Action::MixPotion => Handler::Potion,
        }
    }
}

/// Code the target image can jump to. `Win` is never installed in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Fly,
    Magic,
    Spirit,
    Spell,
    Potion,
    Win,
}

impl Handler {
    pub const ALL: [Handler; 6] = [
        Handler::Fly,
        Handler::Magic,
        Handler::Spirit,
        Handler::Spell,
        Handler::Potion,
        Handler::Win,
    ];

    /// Entry address in the (non-PIE) target image
    pub fn address(&self) -> u64 {
        match self {
            Handler::Fly => 0x401256,
            Handler::Magic => 0x401270,
            Handler::Spirit => 0x40128a,
            Handler::Spell => 0x4012a4,
            Handler::Potion => 0x4012be,
            Handler::Win => 0x4012d8,
        }
    }

    /// Reverse lookup of a code address
    pub fn at(address: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|h| h.address() == address)
    }

    /// Line printed by the handler
    pub fn line(&self) -> &'static str {
        match self {
            Handler::Fly => "The wizard flies through the skies!",
            Handler::Magic => "The wizard casts a magical spell!",
            Handler::Spirit => "The necromancer invokes a spirit from beyond.",
            Handler::Spell => "The sorcerer casts a powerful spell.",
            Handler::Potion => "The alchemist brews a mysterious potion.",
            Handler::Win => "Congratz! You're the strongest!\n Here is your flag:",
        }
    }
}

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Invalid trace format: {0}")]
    InvalidFormat(String),
}

/// One chunk handed out by the simulated heap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationData {
    pub address: u64,
    pub size: u32,
    pub is_freed: bool,
}

/// Menu operation recorded in a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Delete,
    Act,
    Exit,
}

impl Operation {
    fn code(&self) -> u8 {
        match self {
            Operation::Create => 1,
            Operation::Delete => 2,
            Operation::Act => 3,
            Operation::Exit => 4,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Operation::Create),
            2 => Some(Operation::Delete),
            3 => Some(Operation::Act),
            4 => Some(Operation::Exit),
            _ => None,
        }
    }
}

/// How an operation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Ok,
    InvalidSlotIndex,
    SlotOccupied,
    SlotEmpty,
    InvalidChoice,
    NameTooLong,
    /// Dispatch through a slot whose storage was already released
    Dangling,
    Fault,
}

impl EventStatus {
    const ORDER: [EventStatus; 8] = [
        EventStatus::Ok,
        EventStatus::InvalidSlotIndex,
        EventStatus::SlotOccupied,
        EventStatus::SlotEmpty,
        EventStatus::InvalidChoice,
        EventStatus::NameTooLong,
        EventStatus::Dangling,
        EventStatus::Fault,
    ];

    fn code(&self) -> u8 {
        Self::ORDER.iter().position(|s| s == self).unwrap_or(0) as u8
    }

    fn from_code(code: u8) -> Option<Self> {
        Self::ORDER.get(code as usize).copied()
    }
}

/// A single journal entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub operation: Operation,
    /// Slot index as typed, may be out of range
    pub slot: i64,
    /// Slot tag after the operation
    pub tag: Option<CharacterKind>,
    pub status: EventStatus,
}

/// Journal of a session plus the heap ledger, if the mode keeps one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionTrace {
    pub events: Vec<TraceEvent>,
    pub allocations: Vec<AllocationData>,
}

impl SessionTrace {
    pub fn to_bytes(&self) -> Result<Vec<u8>, TraceError> {
        let mut bytes = Vec::new();
        self.serialize_with_mode(&mut bytes, Compress::Yes)
            .map_err(|e| TraceError::Serialization(e.to_string()))?;
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TraceError> {
        Self::deserialize_with_mode(bytes, Compress::Yes, Validate::Yes)
            .map_err(|e| TraceError::InvalidFormat(e.to_string()))
    }
}

impl Valid for AllocationData {
    fn check(&self) -> Result<(), SerializationError> {
        if self.size == 0 {
            return Err(SerializationError::InvalidData);
        }
        Ok(())
    }
}

impl Valid for TraceEvent {
    fn check(&self) -> Result<(), SerializationError> {
        Ok(())
    }
}

impl Valid for SessionTrace {
    fn check(&self) -> Result<(), SerializationError> {
        for event in &self.events {
            event.check()?;
        }
        for alloc in &self.allocations {
            alloc.check()?;
        }
        Ok(())
    }
}

impl CanonicalSerialize for AllocationData {
    fn serialize_with_mode<W: Write>(&self, mut writer: W, compress: Compress) -> Result<(), SerializationError> {
        self.address.serialize_with_mode(&mut writer, compress)?;
        self.size.serialize_with_mode(&mut writer, compress)?;
        self.is_freed.serialize_with_mode(&mut writer, compress)?;
        Ok(())
    }

    fn serialized_size(&self, compress: Compress) -> usize {
        self.address.serialized_size(compress) +
        self.size.serialized_size(compress) +
        self.is_freed.serialized_size(compress)
    }
}

impl CanonicalDeserialize for AllocationData {
    fn deserialize_with_mode<R: Read>(mut reader: R, compress: Compress, validate: Validate) -> Result<Self, SerializationError> {
        let address = u64::deserialize_with_mode(&mut reader, compress, validate)?;
        let size = u32::deserialize_with_mode(&mut reader, compress, validate)?;
        let is_freed = bool::deserialize_with_mode(&mut reader, compress, validate)?;
        let alloc = Self { address, size, is_freed };
        if matches!(validate, Validate::Yes) {
            alloc.check()?;
        }
        Ok(alloc)
    }
}

impl CanonicalSerialize for TraceEvent {
    fn serialize_with_mode<W: Write>(&self, mut writer: W, compress: Compress) -> Result<(), SerializationError> {
        self.operation.code().serialize_with_mode(&mut writer, compress)?;
        (self.slot as u64).serialize_with_mode(&mut writer, compress)?;
        self.tag.map_or(0u8, |k| k.code()).serialize_with_mode(&mut writer, compress)?;
        self.status.code().serialize_with_mode(&mut writer, compress)?;
        Ok(())
    }

    fn serialized_size(&self, compress: Compress) -> usize {
        0u8.serialized_size(compress) * 3 + 0u64.serialized_size(compress)
    }
}

impl CanonicalDeserialize for TraceEvent {
    fn deserialize_with_mode<R: Read>(mut reader: R, compress: Compress, validate: Validate) -> Result<Self, SerializationError> {
        let operation = u8::deserialize_with_mode(&mut reader, compress, validate)?;
        let slot = u64::deserialize_with_mode(&mut reader, compress, validate)?;
        let tag = u8::deserialize_with_mode(&mut reader, compress, validate)?;
        let status = u8::deserialize_with_mode(&mut reader, compress, validate)?;

        let operation = Operation::from_code(operation).ok_or(SerializationError::InvalidData)?;
        let tag = match tag {
            0 => None,
            code => Some(CharacterKind::from_code(code).ok_or(SerializationError::InvalidData)?),
        };
        let status = EventStatus::from_code(status).ok_or(SerializationError::InvalidData)?;

        Ok(Self { operation, slot: slot as i64, tag, status })
    }
}

impl CanonicalSerialize for SessionTrace {
    fn serialize_with_mode<W: Write>(&self, mut writer: W, compress: Compress) -> Result<(), SerializationError> {
        (self.events.len() as u32).serialize_with_mode(&mut writer, compress)?;
        for event in &self.events {
            event.serialize_with_mode(&mut writer, compress)?;
        }

        (self.allocations.len() as u32).serialize_with_mode(&mut writer, compress)?;
        for alloc in &self.allocations {
            alloc.serialize_with_mode(&mut writer, compress)?;
        }

        Ok(())
    }

    fn serialized_size(&self, compress: Compress) -> usize {
        let mut size = 4; // event count
        for event in &self.events {
            size += event.serialized_size(compress);
        }

        size += 4; // allocation count
        for alloc in &self.allocations {
            size += alloc.serialized_size(compress);
        }

        size
    }
}

impl CanonicalDeserialize for SessionTrace {
    fn deserialize_with_mode<R: Read>(mut reader: R, compress: Compress, validate: Validate) -> Result<Self, SerializationError> {
        let event_count = u32::deserialize_with_mode(&mut reader, compress, validate)? as usize;
        let mut events = Vec::with_capacity(event_count.min(1024));
        for _ in 0..event_count {
            events.push(TraceEvent::deserialize_with_mode(&mut reader, compress, validate)?);
        }

        let alloc_count = u32::deserialize_with_mode(&mut reader, compress, validate)? as usize;
        let mut allocations = Vec::with_capacity(alloc_count.min(1024));
        for _ in 0..alloc_count {
            allocations.push(AllocationData::deserialize_with_mode(&mut reader, compress, validate)?);
        }

        Ok(Self { events, allocations })
    }
}

//! Character records for the hardened table.
//!
//! Records are a closed enum. Every action a record can perform maps to a
//! fixed handler through a `match`, so there is no stored code address that a
//! stale or reused record could redirect.

use std::fmt;

use common::{Action, CharacterKind, Handler, SlotError, NAME_LIMIT};

use crate::table::Dispatch;

/// A name that is known to fit its buffer. Names are raw bytes, the way
/// `%s` reads them; they only need to be text when displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedName(Vec<u8>);

impl BoundedName {
    /// Accept `raw` if it is at most `limit` bytes long
    pub fn new(raw: &[u8], limit: usize) -> Result<Self, SlotError> {
        let max = limit.min(NAME_LIMIT);
        if raw.len() > max {
            return Err(SlotError::NameTooLong { len: raw.len(), max });
        }
        Ok(Self(raw.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for BoundedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// Raw fields collected by the console before a record is built.
///
/// Names are exactly the bytes that were typed. `age` is `None` when the age
/// token was not a number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Draft {
    Wizard { name: Vec<u8>, pet_name: Vec<u8> },
    Necromancer { name: Vec<u8>, spirit_name: Vec<u8> },
    Sorcerer { name: Vec<u8> },
    Alchemist { name: Vec<u8> },
    Human { name: Vec<u8>, age: Option<i64> },
}

impl Draft {
    pub fn kind(&self) -> CharacterKind {
        match self {
            Draft::Wizard { .. } => CharacterKind::Wizard,
            Draft::Necromancer { .. } => CharacterKind::Necromancer,
            Draft::Sorcerer { .. } => CharacterKind::Sorcerer,
            Draft::Alchemist { .. } => CharacterKind::Alchemist,
            Draft::Human { .. } => CharacterKind::Human,
        }
    }
}

/// A live character record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Character {
    Wizard { name: BoundedName, pet_name: BoundedName },
    Necromancer { name: BoundedName, spirit_name: BoundedName },
    Sorcerer { name: BoundedName },
    Alchemist { name: BoundedName },
    Human { name: BoundedName, age: i32 },
}

impl Character {
    /// Validate a draft into a record. Oversized names and bad ages are rejected.
    pub fn from_draft(draft: &Draft, name_limit: usize) -> Result<Self, SlotError> {
        let bounded = |raw: &[u8]| BoundedName::new(raw, name_limit);

        Ok(match draft {
            Draft::Wizard { name, pet_name } => Character::Wizard {
                name: bounded(name)?,
                pet_name: bounded(pet_name)?,
            },
            Draft::Necromancer { name, spirit_name } => Character::Necromancer {
                name: bounded(name)?,
                spirit_name: bounded(spirit_name)?,
            },
            Draft::Sorcerer { name } => Character::Sorcerer { name: bounded(name)? },
            Draft::Alchemist { name } => Character::Alchemist { name: bounded(name)? },
            Draft::Human { name, age } => {
                let age = age
                    .and_then(|age| i32::try_from(age).ok())
                    .ok_or(SlotError::InvalidChoice)?;
                Character::Human { name: bounded(name)?, age }
            }
        })
    }

    pub fn kind(&self) -> CharacterKind {
        match self {
            Character::Wizard { .. } => CharacterKind::Wizard,
            Character::Necromancer { .. } => CharacterKind::Necromancer,
            Character::Sorcerer { .. } => CharacterKind::Sorcerer,
            Character::Alchemist { .. } => CharacterKind::Alchemist,
            Character::Human { .. } => CharacterKind::Human,
        }
    }

    pub fn name(&self) -> &BoundedName {
        match self {
            Character::Wizard { name, .. }
            | Character::Necromancer { name, .. }
            | Character::Sorcerer { name }
            | Character::Alchemist { name }
            | Character::Human { name, .. } => name,
        }
    }

    /// Perform the action picked from the menu. Humans take no choice.
    pub fn perform(&self, choice: Option<i64>) -> Result<Dispatch, SlotError> {
        if let Character::Human { name, age } = self {
            return Ok(Dispatch::Describe { name: name.as_bytes().to_vec(), age: *age });
        }

        let action = choice
            .and_then(|choice| Action::select(self.kind(), choice))
            .ok_or(SlotError::InvalidChoice)?;

        let handler = match (self, action) {
            (Character::Wizard { .. }, Action::Fly) => Handler::Fly,
            (Character::Wizard { .. }, Action::Magic) => Handler::Magic,
            (Character::Necromancer { .. }, Action::InvokeSpirit) => Handler::Spirit,
            (Character::Sorcerer { .. }, Action::CastSpell) => Handler::Spell,
            (Character::Alchemist { .. }, Action::MixPotion) => Handler::Potion,
            _ => return Err(SlotError::InvalidChoice),
        };
        Ok(Dispatch::Invoked(handler))
    }
}

use common::{Action, CharacterKind, NAME_CAPACITY};

/// Byte layout of a character record as the x86-64 target lays it out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    pub kind: CharacterKind,
    /// `sizeof` the record, which is what gets passed to `malloc`
    pub size: usize,
    pub name: usize,
    /// Pet or spirit name
    pub second_name: Option<usize>,
    /// Function pointer fields, one per action
    pub handlers: &'static [(Action, usize)],
    pub age: Option<usize>,
}

impl RecordLayout {
    pub fn of(kind: CharacterKind) -> Self {
        const PTR: usize = 8;
        let names = |count: usize| count * NAME_CAPACITY;

        match kind {
            CharacterKind::Wizard => Self {
                kind,
                size: names(2) + 2 * PTR,
                name: 0,
                second_name: Some(NAME_CAPACITY),
                handlers: &[(Action::Fly, 128), (Action::Magic, 136)],
                age: None,
            },
            CharacterKind::Necromancer => Self {
                kind,
                size: names(2) + PTR,
                name: 0,
                second_name: Some(NAME_CAPACITY),
                handlers: &[(Action::InvokeSpirit, 128)],
                age: None,
            },
            CharacterKind::Sorcerer => Self {
                kind,
                size: names(1) + PTR,
                name: 0,
                second_name: None,
                handlers: &[(Action::CastSpell, 64)],
                age: None,
            },
            CharacterKind::Alchemist => Self {
                kind,
                size: names(1) + PTR,
                name: 0,
                second_name: None,
                handlers: &[(Action::MixPotion, 64)],
                age: None,
            },
            CharacterKind::Human => Self {
                kind,
                // char[64] followed by an int, no tail padding needed
                size: names(1) + 4,
                name: 0,
                second_name: None,
                handlers: &[],
                age: Some(NAME_CAPACITY),
            },
        }
    }

    /// Offset of the function pointer dispatched for `action`
    pub fn handler_offset(&self, action: Action) -> Option<usize> {
        self.handlers
            .iter()
            .find(|(a, _)| *a == action)
            .map(|&(_, offset)| offset)
    }
}
